//! [`MountExecutor`] adapter: real `mount(2)`/`umount2(2)` calls, grounded
//! on `LinuxSyscall::mount`/`umount2` in the teacher's
//! `libcontainer/src/syscall/linux.rs` (direct `nix::mount` calls rather
//! than spawning `/sbin/mount`, unlike `mount_generic.c`'s `spawnll`).

use std::path::Path;

use nix::mount::{mount, umount2, MntFlags, MsFlags};

use automount_core::adapters::MountExecutor;

pub struct LinuxMountExecutor;

impl MountExecutor for LinuxMountExecutor {
    fn mount(&self, target: &str, source: &str, fstype: &str, options: &str) -> std::io::Result<()> {
        std::fs::create_dir_all(target)?;
        let source = if source.is_empty() { None } else { Some(Path::new(source)) };
        let fstype = if fstype.is_empty() || fstype == "none" { None } else { Some(fstype) };
        let data = if options.is_empty() { None } else { Some(options) };
        mount(source, Path::new(target), fstype, MsFlags::empty(), data).map_err(std::io::Error::from)
    }

    fn unmount(&self, target: &str, lazy: bool) -> std::io::Result<()> {
        let flags = if lazy { MntFlags::MNT_DETACH } else { MntFlags::empty() };
        umount2(Path::new(target), flags).map_err(std::io::Error::from)
    }
}

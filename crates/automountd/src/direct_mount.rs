//! [`DirectMountRegistrar`] adapter. The real counterpart issues an
//! autofs ioctl telling the kernel a trigger exists at this path; that
//! device protocol is out of scope here (spec §1), same as
//! [`crate::adapters::kernel_channel::NullKernelChannel`]. This just logs
//! what would have been registered.

use automount_core::automount_point::{AutomountPoint, DirectMountRegistrar};
use automount_core::cache::Mapent;
use automount_core::time::Age;

pub struct LoggingDirectMountRegistrar;

impl DirectMountRegistrar for LoggingDirectMountRegistrar {
    fn register(&self, ap: &AutomountPoint, entry: &Mapent, now: Age) -> std::io::Result<()> {
        tracing::debug!(path = %ap.path, key = %entry.key, now, "direct mount trigger registered (stub)");
        Ok(())
    }
}

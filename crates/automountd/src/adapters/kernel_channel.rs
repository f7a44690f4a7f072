//! [`KernelChannel`] adapter.
//!
//! spec.md §1 scopes the kernel autofs device/pipe protocol itself out:
//! "the core consumes `(path, key, length) -> request` events from it and
//! emits `(token, status)` responses". This build does not open
//! `/dev/autofs` or issue any autofs ioctl — `recv` reports the channel
//! closed so the daemon's poll loop idles rather than spins, and
//! `AutomountPoint::submit_kernel_request` remains reachable for whatever
//! wires a real kernel channel in later.

use automount_core::adapters::KernelChannel;

pub struct NullKernelChannel;

impl KernelChannel for NullKernelChannel {
    fn recv(&self) -> std::io::Result<Option<(u64, String)>> {
        Ok(None)
    }

    fn respond(&self, token: u64, status: i32) -> std::io::Result<()> {
        tracing::debug!(token, status, "kernel channel stub: discarding response");
        Ok(())
    }
}

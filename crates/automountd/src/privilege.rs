//! Capability handling around the privileged syscalls the mount executor
//! makes. The teacher links `caps` for the same reason, around its own
//! `mount`/`umount2` calls in `syscall/linux.rs`.

use caps::{CapSet, Capability};

/// Drops every permitted capability except `CAP_SYS_ADMIN`, the one
/// `mount(2)`/`umount2(2)` require. Best-effort: failures are logged, not
/// fatal, since an unprivileged test run has nothing to drop.
pub fn drop_unneeded_capabilities() {
    let Ok(permitted) = caps::read(None, CapSet::Permitted) else {
        tracing::warn!("failed to read permitted capability set");
        return;
    };
    for cap in permitted {
        if cap == Capability::CAP_SYS_ADMIN {
            continue;
        }
        if let Err(err) = caps::drop(None, CapSet::Permitted, cap) {
            tracing::debug!(?cap, %err, "could not drop capability");
        }
    }
}

//! Signal registration (spec §4.F), grounded on the
//! `signal_hook::iterator::Signals` + dedicated-thread pattern used by
//! `nvidia_gpu_stats`'s `main.rs`.

use std::sync::Arc;

use signal_hook::consts::{SIGHUP, SIGTERM, SIGUSR1, SIGUSR2};
use signal_hook::iterator::Signals;
use tracing::{info, warn};

use automount_core::master::MasterMap;
use automount_core::signal::{dispatch, DaemonSignal};

/// Spawns a dedicated thread iterating blocked signals, translating each
/// into a [`DaemonSignal`] and applying it to `master`. `SIGHUP` instead
/// invokes `reload`, since [`dispatch`] deliberately treats `Reload` as a
/// caller-driven no-op.
pub fn spawn_signal_thread(
    master: Arc<MasterMap>,
    reload: Arc<dyn Fn() + Send + Sync>,
) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGTERM, SIGUSR1, SIGUSR2, SIGHUP])?;

    std::thread::Builder::new().name("automountd:signals".to_string()).spawn(move || {
        for signal in signals.forever() {
            match signal {
                SIGTERM => {
                    info!("SIGTERM received, shutting down gracefully");
                    dispatch(&master, DaemonSignal::Terminate);
                }
                SIGUSR2 => {
                    info!("SIGUSR2 received, forcing shutdown");
                    dispatch(&master, DaemonSignal::ForceTerminate);
                }
                SIGUSR1 => {
                    info!("SIGUSR1 received, pruning unreferenced mounts");
                    dispatch(&master, DaemonSignal::Prune);
                }
                SIGHUP => {
                    info!("SIGHUP received, reloading master map");
                    reload();
                }
                other => warn!(signal = other, "unexpected signal delivered"),
            }
        }
    })?;

    Ok(())
}

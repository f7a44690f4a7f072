//! Signal-driven state fan-out (spec §4.F).
//!
//! The core has no idea what a `SIGTERM` is — `automountd` owns the
//! actual signal registration (via `signal-hook`) and translates each
//! delivered signal into a [`DaemonSignal`] before calling [`dispatch`].

use tracing::info;

use crate::master::MasterMap;
use crate::state_machine::{self, State};

/// The signals the daemon reacts to, decoupled from any particular OS
/// signal-handling crate (spec §4.F).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonSignal {
    /// `SIGTERM`: graceful shutdown of every automount point.
    Terminate,
    /// `SIGUSR2`: forced/lazy shutdown of every automount point.
    ForceTerminate,
    /// `SIGUSR1`: prune all currently unreferenced mounts.
    Prune,
    /// `SIGHUP`: re-read the master map.
    Reload,
}

/// Applies `signal` to every registered master entry, propagating the
/// resulting state down each entry's submount tree (spec §4.E "Submount
/// propagation", §4.F).
///
/// `SIGHUP` is handled by the caller re-driving `read_master` — it has no
/// direct state-machine transition of its own, so it isn't dispatched
/// here.
pub fn dispatch(master: &MasterMap, signal: DaemonSignal) {
    let state = match signal {
        DaemonSignal::Terminate => State::ShutdownPending,
        DaemonSignal::ForceTerminate => State::ShutdownForce,
        DaemonSignal::Prune => State::Prune,
        DaemonSignal::Reload => {
            info!("SIGHUP received, master map reload must be driven by the caller");
            return;
        }
    };

    for entry in master.entries_snapshot() {
        let ap = &entry.automount_point;
        if signal == DaemonSignal::Prune && ap.state() != State::Ready {
            // PRUNE is only meaningful for an automount point that is
            // actively serving requests (spec §4.F: asserted in the
            // original; here we skip rather than abort the process).
            continue;
        }
        state_machine::notify_submounts(ap, state);
        ap.nextstate(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prune_skips_non_ready_points() {
        let master = MasterMap::new();
        let entry = master.new_entry("/home", 1, true, 300).unwrap();
        assert_eq!(entry.automount_point.state(), State::Init);
        // Should not panic even though the point never reached READY.
        dispatch(&master, DaemonSignal::Prune);
    }

    #[test]
    fn reload_is_a_no_op_here() {
        let master = MasterMap::new();
        master.new_entry("/home", 1, true, 300).unwrap();
        dispatch(&master, DaemonSignal::Reload);
    }
}

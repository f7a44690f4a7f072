//! The per-mount-point worker state machine (spec §4.E).

use std::sync::mpsc::{Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::automount_point::{AutomountPoint, DirectMountRegistrar};
use crate::error::StateMachineError;
use crate::time::Age;

/// States an `AutomountPoint` worker can be in (spec §4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum State {
    Init,
    Ready,
    Expire,
    Prune,
    Readmap,
    ShutdownPending,
    ShutdownForce,
    Shutdown,
    /// Sentinel meaning "no valid state observed".
    Inval,
}

/// Returns whether `from -> to` is one of the legal edges in spec §4.E's
/// transition table.
pub fn valid_transition(from: State, to: State) -> bool {
    use State::*;
    matches!(
        (from, to),
        (Init, Ready)
            | (Ready, Expire)
            | (Ready, Prune)
            | (Ready, Readmap)
            | (Ready, ShutdownPending)
            | (Ready, ShutdownForce)
            | (Expire, Ready)
            | (Prune, Ready)
            | (Readmap, Ready)
            | (ShutdownPending, Shutdown)
            | (ShutdownForce, Shutdown)
    )
}

/// A kernel-delivered mount request (spec §4.G "Kernel autofs channel"):
/// `(token, path-under-root)`.
#[derive(Debug, Clone)]
pub struct KernelRequest {
    pub token: u64,
    pub name: String,
}

/// Events delivered to a worker's control channel — the Rust encoding of
/// the original's two inputs, kernel requests and `state_pipe` bytes,
/// unified onto one `mpsc` channel so the worker loop only ever blocks on
/// one `recv` (spec §4.E, §5).
#[derive(Debug, Clone)]
pub enum WorkerEvent {
    State(State),
    Kernel(KernelRequest),
}

/// What the worker loop does in response to reaching a state. Kept as a
/// trait so `automountd` can supply the adapters (mount executor, kernel
/// channel response, direct-mount registrar) without the core crate
/// depending on any of their concrete implementations (spec §4.G).
pub trait WorkerCallbacks: Send + Sync {
    /// Resolve and mount `name` under `ap`, returning whether the kernel
    /// request should be acknowledged as successful.
    fn handle_kernel_request(&self, ap: &AutomountPoint, req: &KernelRequest, now: Age) -> bool;
    /// Scan for and unmount idle mounts. `force` is set for `Prune`
    /// (unconditional) as opposed to `Expire` (idle-only).
    fn expire(&self, ap: &AutomountPoint, now: Age, force: bool);
    /// Re-run the NSS `read_map` pipeline and reconcile the cache.
    /// Returns whether the source reported `Unavail` (in which case the
    /// cache must be left untouched, spec §4.E "Failure semantics").
    fn readmap(&self, ap: &AutomountPoint, now: Age) -> bool;
    /// Ghost (or, for `/-`, register) every cache entry.
    fn materialize(&self, ap: &AutomountPoint, now: Age);
    /// Attempt graceful (`lazy = false`) or forced (`lazy = true`) unmount
    /// of every child mount.
    fn shutdown(&self, ap: &AutomountPoint, lazy: bool);
}

/// Depth-first walk of `ap`'s submount tree, signalling each child with
/// its own state before climbing back out (spec §4.E "Submount
/// propagation"). Lock order: `parent.mounts_mutex` → release →
/// `child.state_mutex`; the snapshot-then-release pattern in
/// `AutomountPoint::submounts_snapshot` gives us that without holding the
/// parent's lock across the recursive call.
pub fn notify_submounts(ap: &AutomountPoint, state: State) {
    for child in ap.submounts_snapshot() {
        if child.has_submounts() {
            notify_submounts(&child, state);
        }
        child.nextstate(state);
    }
}

/// Runs the worker loop for one `AutomountPoint` until it reaches
/// `Shutdown`. Intended to be the body of a detached thread spawned by the
/// registry (spec §4.D `master_do_mount` / §4.E).
pub fn run_worker(
    ap: Arc<AutomountPoint>,
    events: Receiver<WorkerEvent>,
    callbacks: Arc<dyn WorkerCallbacks>,
    registrar: Option<Arc<dyn DirectMountRegistrar>>,
    now_fn: Arc<dyn Fn() -> Age + Send + Sync>,
    started: Sender<Result<(), StateMachineError>>,
) {
    let span = tracing::info_span!("automount_point", path = %ap.path);
    let _enter = span.enter();

    // `ap.state()`, not a hardcoded `State::Init`: a worker is only ever
    // spawned for a point the registry has just created (genuinely Init)
    // or, if the registry's bookkeeping ever regresses, we want the
    // `valid_transition` check inside `transition` to catch a respawn onto
    // a point that was never actually reset, rather than silently forcing
    // it back to Ready.
    transition(&ap, ap.state(), State::Ready);
    let _ = started.send(Ok(()));
    materialize_or_register(&ap, &*callbacks, registrar.as_deref(), now_fn());
    info!("worker ready");

    loop {
        // Jitter the expire-timer wakeup by up to 10% so that many
        // automount points configured with the same timeout don't all
        // wake and scan in lockstep.
        let base = ap.check_period.max(1);
        let jitter = fastrand::u64(0..=base / 10);
        let timeout = Duration::from_secs(base + jitter);
        match events.recv_timeout(timeout) {
            Ok(WorkerEvent::Kernel(req)) => {
                let now = now_fn();
                let ok = callbacks.handle_kernel_request(&ap, &req, now);
                debug!(token = req.token, name = %req.name, ok, "kernel request handled");
            }
            Ok(WorkerEvent::State(target)) => {
                if !drive(&ap, target, &*callbacks, registrar.as_deref(), &now_fn) {
                    break;
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let now = now_fn();
                if ap.state() == State::Ready {
                    transition(&ap, State::Ready, State::Expire);
                    callbacks.expire(&ap, now, false);
                    transition(&ap, State::Expire, State::Ready);
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }

    ap.detach_worker_channel();
    info!("worker exiting");
}

/// Drives one externally-requested transition to completion, returning
/// `false` if the worker should exit (reached `Shutdown`).
fn drive(
    ap: &AutomountPoint,
    target: State,
    callbacks: &dyn WorkerCallbacks,
    registrar: Option<&dyn DirectMountRegistrar>,
    now_fn: &(dyn Fn() -> Age + Send + Sync),
) -> bool {
    let current = ap.state();
    if !valid_transition(current, target) {
        warn!(?current, ?target, "ignoring illegal transition request");
        return true;
    }
    let now = now_fn();
    transition(ap, current, target);
    match target {
        State::Expire => {
            callbacks.expire(ap, now, false);
            transition(ap, State::Expire, State::Ready);
        }
        State::Prune => {
            callbacks.expire(ap, now, true);
            transition(ap, State::Prune, State::Ready);
        }
        State::Readmap => {
            let unavail = callbacks.readmap(ap, now);
            if !unavail {
                materialize_or_register(ap, callbacks, registrar, now);
            }
            transition(ap, State::Readmap, State::Ready);
        }
        State::ShutdownPending => {
            callbacks.shutdown(ap, false);
            transition(ap, State::ShutdownPending, State::Shutdown);
            return false;
        }
        State::ShutdownForce => {
            callbacks.shutdown(ap, true);
            transition(ap, State::ShutdownForce, State::Shutdown);
            return false;
        }
        _ => {}
    }
    true
}

fn materialize_or_register(
    ap: &AutomountPoint,
    callbacks: &dyn WorkerCallbacks,
    registrar: Option<&dyn DirectMountRegistrar>,
    now: Age,
) {
    if ap.is_direct() {
        if let Some(registrar) = registrar {
            let guard = ap.cache.enumerate_readlock();
            for entry in guard.iter() {
                if let Err(err) = registrar.register(ap, entry, now) {
                    warn!(key = %entry.key, %err, "failed to register direct mount");
                }
            }
        }
    } else {
        callbacks.materialize(ap, now);
    }
}

fn transition(ap: &AutomountPoint, from: State, to: State) {
    debug_assert!(valid_transition(from, to), "illegal transition {from:?} -> {to:?}");
    ap.set_state(to);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ready_can_reach_every_named_transition() {
        for target in
            [State::Expire, State::Prune, State::Readmap, State::ShutdownPending, State::ShutdownForce]
        {
            assert!(valid_transition(State::Ready, target), "{target:?}");
        }
    }

    #[test]
    fn terminal_states_have_no_outgoing_edges() {
        for from in [State::Shutdown, State::Inval] {
            for to in
                [State::Init, State::Ready, State::Expire, State::Prune, State::Readmap, State::Shutdown]
            {
                assert!(!valid_transition(from, to));
            }
        }
    }

    #[test]
    fn expire_prune_readmap_return_to_ready_only() {
        for from in [State::Expire, State::Prune, State::Readmap] {
            assert!(valid_transition(from, State::Ready));
            assert!(!valid_transition(from, State::ShutdownPending));
        }
    }

    #[test]
    fn shutdown_states_only_reach_terminal_shutdown() {
        assert!(valid_transition(State::ShutdownPending, State::Shutdown));
        assert!(valid_transition(State::ShutdownForce, State::Shutdown));
        assert!(!valid_transition(State::Shutdown, State::Ready));
    }

    #[test]
    #[should_panic(expected = "illegal transition")]
    fn transition_rejects_a_from_state_that_disagrees_with_the_point() {
        // A worker must never be able to force a dead point back to Ready
        // just by calling `transition` with a stale `from` — it has to
        // match what the point is actually in.
        let ap = AutomountPoint::new("/home", true, 300);
        ap.set_state(State::Shutdown);
        transition(&ap, State::Shutdown, State::Ready);
    }
}

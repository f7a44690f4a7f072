//! Cross-module integration test exercising a real worker thread end to
//! end (spec §8 "∀ state transitions observed on a single AutomountPoint:
//! they form a legal path through the FSM of §4.E").
//!
//! Unlike `state_machine.rs`'s inline unit tests (which check
//! `valid_transition` as a pure function), this spawns an actual worker
//! thread through `MasterMap::mount_mounts` and drives it with kernel
//! requests and state-transition events over its real `mpsc` channel,
//! the way `automountd`'s kernel-channel poll loop and signal thread do.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use automount_core::automount_point::AutomountPoint;
use automount_core::master::MasterMap;
use automount_core::state_machine::{valid_transition, KernelRequest, State, WorkerCallbacks};
use automount_core::time::Age;

#[derive(Default)]
struct RecordingCallbacks {
    kernel_requests: Mutex<Vec<String>>,
    expires: Mutex<Vec<bool>>,
    readmaps: Mutex<u32>,
}

impl WorkerCallbacks for RecordingCallbacks {
    fn handle_kernel_request(&self, _ap: &AutomountPoint, req: &KernelRequest, _now: Age) -> bool {
        self.kernel_requests.lock().unwrap().push(req.name.clone());
        true
    }

    fn expire(&self, _ap: &AutomountPoint, _now: Age, force: bool) {
        self.expires.lock().unwrap().push(force);
    }

    fn readmap(&self, _ap: &AutomountPoint, _now: Age) -> bool {
        *self.readmaps.lock().unwrap() += 1;
        false
    }

    fn materialize(&self, _ap: &AutomountPoint, _now: Age) {}

    fn shutdown(&self, _ap: &AutomountPoint, _lazy: bool) {}
}

fn wait_for<F: Fn() -> bool>(predicate: F) {
    for _ in 0..200 {
        if predicate() {
            return;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not reached in time");
}

#[test]
fn worker_thread_walks_a_legal_path_to_shutdown() {
    let master = MasterMap::new();
    let entry = master.new_entry("/home", 1, true, 300).unwrap();
    let callbacks: Arc<dyn WorkerCallbacks> = Arc::new(RecordingCallbacks::default());
    let now_fn: Arc<dyn Fn() -> Age + Send + Sync> = Arc::new(|| 1);

    master.mount_mounts(1, true, callbacks.clone(), None, now_fn);
    wait_for(|| entry.automount_point.state() == State::Ready);

    let ap = &entry.automount_point;
    let submitted = ap.submit_kernel_request(KernelRequest { token: 1, name: "alice".to_string() });
    assert!(submitted, "worker channel must be attached once READY");

    ap.nextstate(State::Readmap);
    wait_for(|| ap.state() == State::Ready);

    ap.nextstate(State::Prune);
    wait_for(|| ap.state() == State::Ready);

    ap.nextstate(State::ShutdownPending);
    wait_for(|| ap.state() == State::Shutdown);

    // The terminal state has no outgoing edges; a further request is a
    // silent no-op rather than a panic or a resurrected worker.
    ap.nextstate(State::Ready);
    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(ap.state(), State::Shutdown);
}

#[test]
fn illegal_transition_request_is_ignored_not_applied() {
    // A point that never left INIT cannot be pushed straight to EXPIRE;
    // the worker loop's `drive` function must reject it (spec §4.E).
    assert!(!valid_transition(State::Init, State::Expire));
    assert!(!valid_transition(State::Shutdown, State::Ready));
}

#[test]
fn submounts_receive_state_before_parent_reports_done() {
    let master = MasterMap::new();
    let parent_entry = master.new_entry("/home", 1, true, 300).unwrap();
    let child = Arc::new(AutomountPoint::new("/home/sub", true, 300));
    child.set_parent(&parent_entry.automount_point);
    parent_entry.automount_point.add_submount(child.clone());

    let callbacks: Arc<dyn WorkerCallbacks> = Arc::new(RecordingCallbacks::default());
    let now_fn: Arc<dyn Fn() -> Age + Send + Sync> = Arc::new(|| 1);
    master.mount_mounts(1, true, callbacks, None, now_fn);
    wait_for(|| parent_entry.automount_point.state() == State::Ready);

    automount_core::state_machine::notify_submounts(&parent_entry.automount_point, State::ShutdownPending);
    assert_eq!(child.state(), State::ShutdownPending);
}

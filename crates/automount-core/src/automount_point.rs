//! The live state of one managed mount point (spec §3 "AutomountPoint",
//! §4.E).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Sender;
use std::sync::{Mutex, RwLock, Weak};

use crate::cache::MapentCache;
use crate::state_machine::{KernelRequest, State, WorkerEvent};
use crate::time::Age;

/// The pseudo-root reserved for direct mounts (spec §3, §6).
pub const DIRECT_MOUNT_ROOT: &str = "/-";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MountKind {
    Direct,
    Indirect,
}

/// The live state of a mount point (spec §3).
pub struct AutomountPoint {
    pub path: String,
    pub kind: MountKind,
    ghost: AtomicBool,
    pub timeout: Age,
    pub check_period: Age,
    parent: Mutex<Option<Weak<AutomountPoint>>>,
    /// Children submounts; protected by `mounts_mutex` in the spec — here
    /// that's just this field's own lock, taken and released following the
    /// documented order (registry → entry → ap.mounts → ap.state → cache).
    submounts: Mutex<Vec<std::sync::Arc<AutomountPoint>>>,
    state: Mutex<State>,
    /// The per-entry communication channel driving state transitions
    /// (spec's `state_pipe`). `None` until the worker thread is launched —
    /// mirrors the original checking `fstat(state_pipe)` to decide whether
    /// a worker is already running.
    worker_channel: RwLock<Option<Sender<WorkerEvent>>>,
    pub cache: MapentCache,
}

impl AutomountPoint {
    pub fn new(path: &str, ghost: bool, timeout: Age) -> Self {
        let kind = if path == DIRECT_MOUNT_ROOT { MountKind::Direct } else { MountKind::Indirect };
        AutomountPoint {
            path: path.to_string(),
            kind,
            // Ghosting is forbidden under the direct-mount root (spec §3).
            ghost: AtomicBool::new(ghost && kind == MountKind::Indirect),
            timeout,
            check_period: crate::time::check_period(timeout),
            parent: Mutex::new(None),
            submounts: Mutex::new(Vec::new()),
            state: Mutex::new(State::Init),
            worker_channel: RwLock::new(None),
            cache: MapentCache::new(),
        }
    }

    pub fn is_direct(&self) -> bool {
        self.kind == MountKind::Direct
    }

    pub fn ghost_enabled(&self) -> bool {
        self.ghost.load(Ordering::Relaxed)
    }

    fn lock_state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|_| std::process::abort())
    }

    pub fn state(&self) -> State {
        *self.lock_state()
    }

    /// Set the in-memory state field. Does not itself validate the
    /// transition — the worker loop in [`crate::state_machine`] is the one
    /// place that calls this, after checking
    /// [`crate::state_machine::valid_transition`].
    pub(crate) fn set_state(&self, state: State) {
        *self.lock_state() = state;
    }

    /// `true` once a worker thread has attached its channel — the
    /// equivalent of the original's `fstat(state_pipe) != -1` check in
    /// `mount_mounts` (spec §4.D).
    pub fn has_worker(&self) -> bool {
        self.worker_channel.read().unwrap_or_else(|_| std::process::abort()).is_some()
    }

    /// `true` once this point has been asked to shut down or has finished
    /// doing so. A dying point's registry entry must never be revived by a
    /// later master-map read touching the same path — the read has to wait
    /// for the registry to free the old entry and mint a fresh one (spec
    /// §3 "MasterEntry is born from a successful master-map read").
    pub fn is_dying(&self) -> bool {
        matches!(self.state(), State::ShutdownPending | State::ShutdownForce | State::Shutdown)
    }

    pub(crate) fn attach_worker_channel(&self, tx: Sender<WorkerEvent>) {
        *self.worker_channel.write().unwrap_or_else(|_| std::process::abort()) = Some(tx);
    }

    pub(crate) fn detach_worker_channel(&self) {
        *self.worker_channel.write().unwrap_or_else(|_| std::process::abort()) = None;
    }

    /// Sends a state-transition event to the worker's channel, if attached.
    /// No-op (not an error) if the worker hasn't started yet — mirrors the
    /// original's `fstat` guard around `nextstate()`.
    pub fn nextstate(&self, state: State) {
        let guard = self.worker_channel.read().unwrap_or_else(|_| std::process::abort());
        if let Some(tx) = guard.as_ref() {
            let _ = tx.send(WorkerEvent::State(state));
        }
    }

    /// Delivers a kernel-originated mount request to this point's worker
    /// (spec §4.G "the core consumes `(path, key, length) -> request`
    /// events"). No-op, returning `false`, if no worker is attached yet —
    /// mirrors `nextstate`'s guard.
    pub fn submit_kernel_request(&self, request: KernelRequest) -> bool {
        let guard = self.worker_channel.read().unwrap_or_else(|_| std::process::abort());
        match guard.as_ref() {
            Some(tx) => tx.send(WorkerEvent::Kernel(request)).is_ok(),
            None => false,
        }
    }

    pub fn set_parent(&self, parent: &std::sync::Arc<AutomountPoint>) {
        *self.parent.lock().unwrap_or_else(|_| std::process::abort()) =
            Some(std::sync::Arc::downgrade(parent));
    }

    pub fn parent(&self) -> Option<std::sync::Arc<AutomountPoint>> {
        self.parent.lock().unwrap_or_else(|_| std::process::abort()).as_ref().and_then(Weak::upgrade)
    }

    pub fn add_submount(&self, child: std::sync::Arc<AutomountPoint>) {
        self.submounts.lock().unwrap_or_else(|_| std::process::abort()).push(child);
    }

    pub fn remove_submount(&self, path: &str) {
        self.submounts.lock().unwrap_or_else(|_| std::process::abort()).retain(|c| c.path != path);
    }

    /// Depth-first walk used by [`crate::state_machine::notify_submounts`].
    /// Takes and releases `mounts_mutex` once per level, exactly as spec
    /// §4.E describes, instead of holding it for the whole recursive walk.
    pub fn submounts_snapshot(&self) -> Vec<std::sync::Arc<AutomountPoint>> {
        self.submounts.lock().unwrap_or_else(|_| std::process::abort()).clone()
    }

    pub fn has_submounts(&self) -> bool {
        !self.submounts.lock().unwrap_or_else(|_| std::process::abort()).is_empty()
    }
}

/// Invoked once per cache entry, under the enumerate read-lock, to tell
/// the kernel that a direct mount trigger exists (spec §4.E "Direct-mount
/// enumeration", §4.J in SPEC_FULL.md). Supplied by the daemon binary; the
/// core only knows it needs to call back into "the world" once per
/// registered direct mount.
pub trait DirectMountRegistrar: Send + Sync {
    fn register(&self, ap: &AutomountPoint, entry: &crate::cache::Mapent, now: Age) -> std::io::Result<()>;
}

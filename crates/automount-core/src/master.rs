//! The master-map registry (spec §3 "MasterEntry"/"MapSource", §4.D).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::thread;

use tracing::{info, warn};

use crate::automount_point::{AutomountPoint, DirectMountRegistrar};
use crate::error::RegistryError;
use crate::state_machine::{self, State, WorkerCallbacks, WorkerEvent};
use crate::time::Age;

/// A configured backend for key→entry resolution (spec §3 "MapSource").
///
/// The opened lookup module handle itself is intentionally not held here:
/// the core defines the *contract* ([`crate::lookup::LookupModule`]) but
/// ownership of concrete handles lives with whatever adapter the daemon
/// wires up, keyed by `(source_type, format, argv)` — keeping this struct
/// free of a type parameter on the lookup backend.
pub struct MapSource {
    pub source_type: String,
    pub format: String,
    pub argv: Vec<String>,
    age: Mutex<Age>,
    stale: AtomicBool,
    /// Set when this source has been identified as a duplicate of a
    /// previously-seen `+name` inclusion (spec §4.B "File source").
    recurse: AtomicBool,
    instances: Mutex<Vec<Arc<MapSource>>>,
}

impl MapSource {
    fn new(source_type: &str, format: &str, argv: &[String], age: Age) -> Self {
        MapSource {
            source_type: source_type.to_string(),
            format: format.to_string(),
            argv: argv.to_vec(),
            age: Mutex::new(age),
            stale: AtomicBool::new(false),
            recurse: AtomicBool::new(false),
            instances: Mutex::new(Vec::new()),
        }
    }

    fn matches(&self, source_type: &str, format: &str, argv: &[String]) -> bool {
        self.source_type == source_type && self.format == format && self.argv == argv
    }

    pub fn age(&self) -> Age {
        *self.age.lock().unwrap_or_else(|_| std::process::abort())
    }

    fn set_age(&self, age: Age) {
        *self.age.lock().unwrap_or_else(|_| std::process::abort()) = age;
    }

    pub fn mark_stale(&self) {
        self.stale.store(true, Ordering::Relaxed);
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::Relaxed)
    }

    pub fn set_recurse(&self) {
        self.recurse.store(true, Ordering::Relaxed);
    }

    pub fn recursing(&self) -> bool {
        self.recurse.load(Ordering::Relaxed)
    }
}

/// One registered mount path and everything that resolves it (spec §3
/// "MasterEntry").
pub struct MasterEntry {
    pub path: String,
    age: Mutex<Age>,
    sources: Mutex<Vec<Arc<MapSource>>>,
    pub automount_point: Arc<AutomountPoint>,
}

impl MasterEntry {
    pub fn age(&self) -> Age {
        *self.age.lock().unwrap_or_else(|_| std::process::abort())
    }

    pub fn sources_snapshot(&self) -> Vec<Arc<MapSource>> {
        self.sources.lock().unwrap_or_else(|_| std::process::abort()).clone()
    }

    /// Bumps `age` to mark this entry as seen in the current master-map
    /// re-read (spec §3 "age stamp — last time it was seen in a re-read of
    /// the master map"). Called by whichever lookup module drives
    /// `read_master` when it finds the path already registered.
    pub fn touch(&self, age: Age) {
        *self.age.lock().unwrap_or_else(|_| std::process::abort()) = age;
    }
}

/// The master-map registry: the top-level collection of [`MasterEntry`]
/// values (spec §4.D).
///
/// `instance_mutex` is deliberately a separate lock from `entries` so that
/// discovering a runtime-specialised [`MapSource`] instance never
/// contends with the primary registry lock (spec §4.D
/// `find_source_instance`/`add_source_instance`).
pub struct MasterMap {
    entries: Mutex<Vec<Arc<MasterEntry>>>,
    instance_mutex: Mutex<()>,
}

impl Default for MasterMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MasterMap {
    pub fn new() -> Self {
        MasterMap { entries: Mutex::new(Vec::new()), instance_mutex: Mutex::new(()) }
    }

    fn lock_entries(&self) -> std::sync::MutexGuard<'_, Vec<Arc<MasterEntry>>> {
        self.entries.lock().unwrap_or_else(|_| std::process::abort())
    }

    /// `find(path)`: linear search under the registry lock.
    ///
    /// An entry whose point is dying (shutdown requested or completed) is
    /// swept out of the registry and reported as not found, rather than
    /// handed back to the caller — a dying `AutomountPoint` must never be
    /// touched back to life by a fresh master-map read that happens to
    /// reuse its path; the path is reborn through [`Self::new_entry`]
    /// instead (spec §3 "MasterEntry is born from a successful master-map
    /// read"). This also closes the registry leak that would otherwise
    /// require a separate sweep: the dying entry never needs to wait for
    /// `mount_mounts` to notice `Shutdown` once something has already
    /// looked it up.
    pub fn find(&self, path: &str) -> Option<Arc<MasterEntry>> {
        let mut entries = self.lock_entries();
        let idx = entries.iter().position(|e| e.path == path)?;
        if entries[idx].automount_point.is_dying() {
            entries.remove(idx);
            return None;
        }
        Some(entries[idx].clone())
    }

    /// `new_entry(path, age)` + `add_entry(entry)`: creates the
    /// `AutomountPoint` alongside the entry and appends it, rejecting a
    /// duplicate path.
    pub fn new_entry(
        &self,
        path: &str,
        age: Age,
        ghost: bool,
        timeout: Age,
    ) -> Result<Arc<MasterEntry>, RegistryError> {
        let mut entries = self.lock_entries();
        if entries.iter().any(|e| e.path == path) {
            return Err(RegistryError::DuplicatePath(path.to_string()));
        }
        let entry = Arc::new(MasterEntry {
            path: path.to_string(),
            age: Mutex::new(age),
            sources: Mutex::new(Vec::new()),
            automount_point: Arc::new(AutomountPoint::new(path, ghost, timeout)),
        });
        entries.push(entry.clone());
        Ok(entry)
    }

    /// `free_entry(entry)`: detaches it from the registry. Its
    /// `MapSource`s and `AutomountPoint` are dropped (closing any lookup
    /// module handles the daemon associated with them) once the last
    /// `Arc` reference goes away — Rust's ownership model gives us this
    /// for free in place of the original's explicit `free_map_source`
    /// walk.
    pub fn free_entry(&self, path: &str) {
        self.lock_entries().retain(|e| e.path != path);
    }

    /// `add_map_source(entry, type, format, age, argv)`: deduplicates by
    /// `(type, format, argv)`.
    pub fn add_map_source(
        &self,
        entry: &MasterEntry,
        source_type: &str,
        format: &str,
        argv: &[String],
        age: Age,
    ) -> Result<Arc<MapSource>, RegistryError> {
        let mut sources = entry.sources.lock().unwrap_or_else(|_| std::process::abort());
        if let Some(existing) = sources.iter().find(|s| s.matches(source_type, format, argv)) {
            warn!(path = %entry.path, source_type, "duplicate map source rejected");
            existing.set_age(age);
            return Err(RegistryError::DuplicateSource(source_type.to_string()));
        }
        let source = Arc::new(MapSource::new(source_type, format, argv, age));
        sources.push(source.clone());
        Ok(source)
    }

    /// `find_source_instance` / `add_source_instance`: instance lookup
    /// and creation under `instance_mutex`, never the primary registry
    /// lock.
    pub fn find_source_instance(
        &self,
        source: &MapSource,
        source_type: &str,
        format: &str,
        argv: &[String],
    ) -> Option<Arc<MapSource>> {
        let _guard = self.instance_mutex.lock().unwrap_or_else(|_| std::process::abort());
        source
            .instances
            .lock()
            .unwrap_or_else(|_| std::process::abort())
            .iter()
            .find(|i| i.matches(source_type, format, argv))
            .cloned()
    }

    pub fn add_source_instance(
        &self,
        source: &MapSource,
        source_type: &str,
        format: &str,
        argv: &[String],
        age: Age,
    ) -> Arc<MapSource> {
        let _guard = self.instance_mutex.lock().unwrap_or_else(|_| std::process::abort());
        let mut instances = source.instances.lock().unwrap_or_else(|_| std::process::abort());
        if let Some(existing) = instances.iter().find(|i| i.matches(source_type, format, argv)) {
            existing.set_age(age);
            return existing.clone();
        }
        let instance = Arc::new(MapSource::new(source_type, format, argv, age));
        instances.push(instance.clone());
        instance
    }

    /// `entries_snapshot`: a copy of the registered entries, used by
    /// `mount_mounts` and by signal fan-out (spec §4.F) to walk the
    /// registry without holding its lock across worker-thread operations.
    pub fn entries_snapshot(&self) -> Vec<Arc<MasterEntry>> {
        self.lock_entries().clone()
    }

    /// `mount_mounts(epoch, readall)`: the reconciliation pass run after
    /// every master-map re-read (spec §4.D).
    ///
    /// For each registered entry: if it's gone stale (not touched by the
    /// read that bumped `epoch`), drive it towards death and, once dead,
    /// remove it from the registry (spec.md:60 "dies when a later re-read
    /// completes without touching it"; Concrete Scenario 5: "a third read
    /// does not find it"). Otherwise reconcile its sources; launch its
    /// worker thread if one isn't running yet (so a brand-new entry always
    /// gets a channel to receive events on); then, if reconciliation found
    /// something changed (or the caller asked to treat every entry as
    /// changed via `readall`), request a `READMAP` — after the worker
    /// exists, never before, since `nextstate` on an unattached point is a
    /// silent no-op and a worker just spawned still needs this nudge to
    /// populate its cache for the first time.
    #[allow(clippy::too_many_arguments)]
    pub fn mount_mounts(
        &self,
        epoch: Age,
        readall: bool,
        callbacks: Arc<dyn WorkerCallbacks>,
        registrar: Option<Arc<dyn DirectMountRegistrar>>,
        now_fn: Arc<dyn Fn() -> Age + Send + Sync>,
    ) {
        for entry in self.entries_snapshot() {
            if entry.age() < epoch {
                match entry.automount_point.state() {
                    State::Shutdown => {
                        info!(path = %entry.path, "stale master entry finished shutdown, freeing");
                        self.free_entry(&entry.path);
                    }
                    State::Ready => {
                        info!(path = %entry.path, "master entry stale, shutting down");
                        entry.automount_point.nextstate(State::ShutdownPending);
                    }
                    _ if !entry.automount_point.has_worker() => {
                        info!(path = %entry.path, "stale master entry never started a worker, freeing");
                        self.free_entry(&entry.path);
                    }
                    // Mid-transition (e.g. Expire/Prune/Readmap on its way
                    // back to Ready, or shutdown already requested): leave
                    // it be, this pass will catch it once it settles.
                    _ => {}
                }
                continue;
            }
            let needs_readmap = check_update_map_sources(&entry, epoch, readall);
            if !entry.automount_point.has_worker() {
                if let Err(err) = spawn_worker(
                    &entry.automount_point,
                    callbacks.clone(),
                    registrar.clone(),
                    now_fn.clone(),
                ) {
                    warn!(path = %entry.path, %err, "failed to start automount point worker");
                    continue;
                }
            }
            if needs_readmap {
                entry.automount_point.nextstate(State::Readmap);
            }
        }
    }
}

/// `check_update_map_sources`: drops sources that weren't refreshed this
/// epoch, special-cases a `null` source type by clearing the cache, and
/// reports whether the entry needs a `READMAP`.
fn check_update_map_sources(entry: &MasterEntry, epoch: Age, readall: bool) -> bool {
    let mut sources = entry.sources.lock().unwrap_or_else(|_| std::process::abort());
    let before = sources.len();
    sources.retain(|s| s.age() >= epoch && !s.is_stale());
    let dropped = before != sources.len();

    let mut has_null = false;
    for source in sources.iter() {
        if source.source_type == "null" {
            has_null = true;
        }
    }
    if has_null {
        entry.automount_point.cache.clean(u64::MAX);
    }

    dropped || has_null || readall
}

/// Launches the worker thread for one `AutomountPoint`, synchronising
/// start-up so the caller only proceeds once the worker has signalled
/// readiness or failure (spec §4.D "launch the worker").
fn spawn_worker(
    ap: &Arc<AutomountPoint>,
    callbacks: Arc<dyn WorkerCallbacks>,
    registrar: Option<Arc<dyn DirectMountRegistrar>>,
    now_fn: Arc<dyn Fn() -> Age + Send + Sync>,
) -> Result<(), RegistryError> {
    let (tx, rx) = mpsc::channel::<WorkerEvent>();
    let (started_tx, started_rx) = mpsc::channel();
    let worker_ap = ap.clone();

    thread::Builder::new()
        .name(format!("automount:{}", ap.path))
        .spawn(move || {
            state_machine::run_worker(worker_ap, rx, callbacks, registrar, now_fn, started_tx);
        })
        .map_err(|err| RegistryError::WorkerSpawn(ap.path.clone(), err))?;

    ap.attach_worker_channel(tx);

    match started_rx.recv() {
        Ok(Ok(())) => Ok(()),
        Ok(Err(_)) | Err(_) => Err(RegistryError::WorkerSpawn(
            ap.path.clone(),
            std::io::Error::other("worker failed to start"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_path_is_rejected() {
        let master = MasterMap::new();
        master.new_entry("/home", 1, true, 300).unwrap();
        let err = master.new_entry("/home", 2, true, 300).unwrap_err();
        assert!(matches!(err, RegistryError::DuplicatePath(_)));
    }

    #[test]
    fn duplicate_source_is_rejected_but_refreshes_age() {
        let master = MasterMap::new();
        let entry = master.new_entry("/home", 1, true, 300).unwrap();
        master.add_map_source(&entry, "file", "sun", &["/etc/auto.home".to_string()], 1).unwrap();
        let err = master
            .add_map_source(&entry, "file", "sun", &["/etc/auto.home".to_string()], 5)
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateSource(_)));
        assert_eq!(entry.sources_snapshot()[0].age(), 5);
    }

    #[test]
    fn stale_entry_requests_shutdown() {
        let master = MasterMap::new();
        let entry = master.new_entry("/home", 1, true, 300).unwrap();
        let cache = MapSourceTestHarness::noop_callbacks();
        master.mount_mounts(5, false, cache, None, std::sync::Arc::new(|| 5));
        // No worker was ever attached (the entry was never reconciled with
        // readall/a changed source before going stale), so there was
        // nothing to shut down — it's freed on the spot.
        assert_eq!(entry.automount_point.state(), State::Init);
        assert!(master.find("/home").is_none());
    }

    #[test]
    fn stale_entry_with_a_worker_is_freed_only_after_shutdown_completes() {
        // Concrete Scenario 5: a path seen in one master-map read, absent
        // from the next, is driven to shutdown and then — on a further
        // reconciliation that observes it has actually reached Shutdown —
        // removed from the registry so "a third read does not find it".
        let master = MasterMap::new();
        let entry = master.new_entry("/home", 1, true, 300).unwrap();
        let callbacks = MapSourceTestHarness::noop_callbacks();
        let now_fn: Arc<dyn Fn() -> Age + Send + Sync> = Arc::new(|| 1);

        // First read: brand new, gets a worker and reaches READY.
        master.mount_mounts(1, true, callbacks.clone(), None, now_fn.clone());
        for _ in 0..200 {
            if entry.automount_point.state() == State::Ready {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(entry.automount_point.state(), State::Ready);

        // Second read: this path is no longer present, so it's stale.
        // Shutdown is requested but hasn't completed yet — still findable.
        master.mount_mounts(2, false, callbacks.clone(), None, now_fn.clone());
        for _ in 0..200 {
            if entry.automount_point.state() == State::Shutdown {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert_eq!(entry.automount_point.state(), State::Shutdown);
        assert!(master.find("/home").is_some(), "not freed until a reconciliation observes Shutdown");

        // Third read: the worker has finished shutting down, so this pass
        // removes the dead entry from the registry.
        master.mount_mounts(3, false, callbacks, None, now_fn);
        assert!(master.find("/home").is_none());
    }

    #[test]
    fn fresh_entry_gets_a_worker_and_an_initial_readmap() {
        // Regression test: a brand-new entry reconciled with readall=true
        // (exactly what `automountd::daemon::run` passes on startup) must
        // not just silently drop its READMAP nudge because no worker was
        // attached yet — it must spawn the worker first.
        use std::sync::atomic::{AtomicU32, Ordering};
        use std::sync::Arc;

        struct CountingReadmap(Arc<AtomicU32>);
        impl WorkerCallbacks for CountingReadmap {
            fn handle_kernel_request(
                &self,
                _ap: &AutomountPoint,
                _req: &crate::state_machine::KernelRequest,
                _now: Age,
            ) -> bool {
                true
            }
            fn expire(&self, _ap: &AutomountPoint, _now: Age, _force: bool) {}
            fn readmap(&self, _ap: &AutomountPoint, _now: Age) -> bool {
                self.0.fetch_add(1, Ordering::SeqCst);
                false
            }
            fn materialize(&self, _ap: &AutomountPoint, _now: Age) {}
            fn shutdown(&self, _ap: &AutomountPoint, _lazy: bool) {}
        }

        let master = MasterMap::new();
        let entry = master.new_entry("/home", 1, true, 300).unwrap();
        let count = Arc::new(AtomicU32::new(0));
        let callbacks: Arc<dyn WorkerCallbacks> = Arc::new(CountingReadmap(count.clone()));
        master.mount_mounts(1, true, callbacks, None, Arc::new(|| 1));

        for _ in 0..200 {
            if entry.automount_point.has_worker() && count.load(Ordering::SeqCst) > 0 {
                break;
            }
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
        assert!(entry.automount_point.has_worker(), "worker must be spawned on first reconciliation");
        assert!(count.load(Ordering::SeqCst) > 0, "fresh worker must receive an initial READMAP");
    }

    struct MapSourceTestHarness;
    impl MapSourceTestHarness {
        fn noop_callbacks() -> Arc<dyn WorkerCallbacks> {
            struct Noop;
            impl WorkerCallbacks for Noop {
                fn handle_kernel_request(
                    &self,
                    _ap: &AutomountPoint,
                    _req: &crate::state_machine::KernelRequest,
                    _now: Age,
                ) -> bool {
                    true
                }
                fn expire(&self, _ap: &AutomountPoint, _now: Age, _force: bool) {}
                fn readmap(&self, _ap: &AutomountPoint, _now: Age) -> bool {
                    false
                }
                fn materialize(&self, _ap: &AutomountPoint, _now: Age) {}
                fn shutdown(&self, _ap: &AutomountPoint, _lazy: bool) {}
            }
            Arc::new(Noop)
        }
    }
}

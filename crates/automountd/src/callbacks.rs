//! [`WorkerCallbacks`] implementation: the "what a state means" half of
//! the control plane, wired to the NSS pipeline, the parser, and the
//! mount executor (spec §4.E, §4.G).

use std::os::unix::fs::{MetadataExt, PermissionsExt};
use std::sync::Arc;

use tracing::{debug, warn};

use automount_core::adapters::{MountExecutor, Parser};
use automount_core::automount_point::AutomountPoint;
use automount_core::cache::MapentCache;
use automount_core::error::{LookupError, NssStatus};
use automount_core::lookup::LookupModuleRegistry;
use automount_core::master::MasterMap;
use automount_core::nss::{self, NssSource, SourceInvoker};
use automount_core::state_machine::{KernelRequest, WorkerCallbacks};
use automount_core::time::{Age, NEGATIVE_TIMEOUT};

/// Routes one named source through the shared [`LookupModuleRegistry`].
/// `format`/`map_arg` are fixed per call since every source in a single
/// `read_map`/`mount` traversal resolves against the same master entry
/// (spec §4.C).
struct RegistryInvoker<'a> {
    registry: &'a LookupModuleRegistry,
    cache: &'a MapentCache,
    format: &'a str,
    map_arg: &'a str,
}

impl SourceInvoker for RegistryInvoker<'_> {
    fn invoke_read_map(
        &self,
        source_name: &str,
        effective_arg: Option<&str>,
        age: Age,
    ) -> Result<NssStatus, LookupError> {
        let argv = [effective_arg.unwrap_or(self.map_arg).to_string()];
        match self.registry.open(source_name, self.format, &argv)? {
            Some(module) => module.read_map(self.cache, age),
            None => Ok(NssStatus::Unavail),
        }
    }

    fn invoke_mount(
        &self,
        source_name: &str,
        key: &str,
        effective_arg: Option<&str>,
        age: Age,
    ) -> Result<NssStatus, LookupError> {
        let argv = [effective_arg.unwrap_or(self.map_arg).to_string()];
        match self.registry.open(source_name, self.format, &argv)? {
            Some(module) => module.mount(self.cache, key, age),
            None => Ok(NssStatus::Unavail),
        }
    }
}

pub struct DaemonWorkerCallbacks {
    pub master: Arc<MasterMap>,
    pub registry: Arc<LookupModuleRegistry>,
    pub nss_sources: Arc<Vec<NssSource>>,
    pub mount_executor: Arc<dyn MountExecutor>,
    pub parser: Arc<dyn Parser>,
}

/// The empty-string sentinel `automount-lookup`'s master-line parser
/// writes for "no explicit `type:` prefix" (spec §4.B "File source") is
/// the signal to defer to the nsswitch pipeline instead of a forced type.
fn forced_type(source_type: &str) -> Option<&str> {
    if source_type.is_empty() {
        None
    } else {
        Some(source_type)
    }
}

/// Where the parsed mount lands on disk: the key verbatim for direct
/// mounts and already-absolute keys, else `path/key` (spec §3
/// "AutomountPoint.path").
fn mount_target(ap: &AutomountPoint, key: &str) -> String {
    if ap.is_direct() || key.starts_with('/') {
        key.to_string()
    } else {
        format!("{}/{}", ap.path.trim_end_matches('/'), key)
    }
}

impl DaemonWorkerCallbacks {
    fn primary_source(&self, ap: &AutomountPoint) -> Option<Arc<automount_core::master::MapSource>> {
        let entry = self.master.find(&ap.path)?;
        entry.sources_snapshot().into_iter().next()
    }

    fn resolve_and_mount(&self, ap: &AutomountPoint, key: &str, now: Age) -> bool {
        if let Some(cached) = ap.cache.lookup_distinct(key) {
            if cached.is_negative(now) {
                return false;
            }
        }

        let Some(source) = self.primary_source(ap) else {
            warn!(path = %ap.path, "no master entry/source found for mount point");
            return false;
        };
        let map_arg = match source.argv.first() {
            Some(arg) => arg.as_str(),
            None => {
                warn!(path = %ap.path, "map source has no argument");
                return false;
            }
        };
        let invoker = RegistryInvoker {
            registry: &self.registry,
            cache: &ap.cache,
            format: &source.format,
            map_arg,
        };

        let found = match nss::mount(&self.nss_sources, forced_type(&source.source_type), map_arg, key, now, &invoker) {
            Ok(found) => found,
            Err(err) => {
                warn!(%key, %err, "nss mount traversal failed");
                false
            }
        };
        if !found {
            return false;
        }

        let Some(entry) = ap.cache.lookup_distinct(key) else { return false };
        if entry.is_negative(now) {
            return false;
        }

        match self.parser.parse_mount(key, &entry.entry) {
            Ok(parsed) => {
                let target = mount_target(ap, key);
                match self.mount_executor.mount(&target, &parsed.source, &parsed.fstype, &parsed.options) {
                    Ok(()) => true,
                    Err(err) => {
                        warn!(%key, %target, %err, "mount executor failed");
                        false
                    }
                }
            }
            Err(rejected) => {
                debug!(%key, reason = %rejected.0, "parser rejected mapent, caching negative");
                ap.cache.set_negative(key, now, NEGATIVE_TIMEOUT);
                false
            }
        }
    }
}

impl WorkerCallbacks for DaemonWorkerCallbacks {
    fn handle_kernel_request(&self, ap: &AutomountPoint, req: &KernelRequest, now: Age) -> bool {
        self.resolve_and_mount(ap, &req.name, now)
    }

    fn expire(&self, ap: &AutomountPoint, now: Age, force: bool) {
        let mut idle_keys = Vec::new();
        {
            let guard = ap.cache.enumerate_readlock();
            for entry in guard.iter() {
                let idle = now.saturating_sub(entry.age) >= ap.timeout;
                if force || idle {
                    idle_keys.push(entry.key.clone());
                }
            }
        }
        for key in idle_keys {
            let target = mount_target(ap, &key);
            // PRUNE (force) only widens which keys are unmounted, unlike
            // SHUTDOWN_FORCE it does not imply a lazy unmount (spec §4.E).
            match self.mount_executor.unmount(&target, false) {
                Ok(()) => {
                    ap.cache.delete(&key);
                }
                Err(err) => debug!(%key, %target, %err, "unmount skipped, still busy"),
            }
        }
    }

    fn readmap(&self, ap: &AutomountPoint, now: Age) -> bool {
        let Some(source) = self.primary_source(ap) else { return true };
        let map_arg = match source.argv.first() {
            Some(arg) => arg.as_str(),
            None => return true,
        };
        let invoker =
            RegistryInvoker { registry: &self.registry, cache: &ap.cache, format: &source.format, map_arg };

        match nss::read_map(&self.nss_sources, forced_type(&source.source_type), map_arg, &ap.cache, now, &invoker) {
            Ok(_) => false,
            Err(err) => {
                warn!(path = %ap.path, %err, "read_map pipeline reported unavailable");
                true
            }
        }
    }

    fn materialize(&self, ap: &AutomountPoint, _now: Age) {
        if !ap.ghost_enabled() {
            return;
        }
        let keys: Vec<String> = {
            let guard = ap.cache.enumerate_readlock();
            guard.iter().map(|e| e.key.clone()).collect()
        };
        for key in keys {
            if key == "*" || key.starts_with('/') {
                continue;
            }
            let path = format!("{}/{}", ap.path.trim_end_matches('/'), key);
            if let Err(err) = std::fs::create_dir(&path) {
                if err.kind() != std::io::ErrorKind::AlreadyExists {
                    warn!(%path, %err, "failed to ghost directory");
                    continue;
                }
            }
            if let Err(err) = std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o555)) {
                warn!(%path, %err, "failed to set ghost directory permissions");
                continue;
            }
            match std::fs::metadata(&path) {
                Ok(meta) => ap.cache.set_ghost_dev_ino(&key, meta.dev(), meta.ino()),
                Err(err) => warn!(%path, %err, "failed to stat ghosted directory"),
            }
        }
    }

    fn shutdown(&self, ap: &AutomountPoint, lazy: bool) {
        let keys: Vec<String> = {
            let guard = ap.cache.enumerate_readlock();
            guard.iter().map(|e| e.key.clone()).collect()
        };
        for key in keys {
            let target = mount_target(ap, &key);
            if let Err(err) = self.mount_executor.unmount(&target, lazy) {
                debug!(%key, %target, %err, "unmount during shutdown failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use automount_core::automount_point::AutomountPoint;

    struct AlwaysOkMount;
    impl MountExecutor for AlwaysOkMount {
        fn mount(&self, _t: &str, _s: &str, _f: &str, _o: &str) -> std::io::Result<()> {
            Ok(())
        }
        fn unmount(&self, _t: &str, _lazy: bool) -> std::io::Result<()> {
            Ok(())
        }
    }

    struct AlwaysOkParser;
    impl Parser for AlwaysOkParser {
        fn parse_mount(
            &self,
            _key: &str,
            text: &str,
        ) -> Result<automount_core::adapters::ParsedMount, automount_core::adapters::ParseRejected> {
            Ok(automount_core::adapters::ParsedMount {
                source: text.to_string(),
                fstype: "none".to_string(),
                options: String::new(),
            })
        }
    }

    fn callbacks() -> DaemonWorkerCallbacks {
        DaemonWorkerCallbacks {
            master: Arc::new(MasterMap::new()),
            registry: Arc::new(LookupModuleRegistry::new()),
            nss_sources: Arc::new(Vec::new()),
            mount_executor: Arc::new(AlwaysOkMount),
            parser: Arc::new(AlwaysOkParser),
        }
    }

    #[test]
    fn expire_unmounts_idle_entries_only() {
        let cb = callbacks();
        let ap = AutomountPoint::new("/home", true, 300);
        ap.cache.update("alice", "srv:/home/alice", 1).unwrap();
        ap.cache.update("bob", "srv:/home/bob", 100).unwrap();
        cb.expire(&ap, 400, false);
        assert!(ap.cache.lookup("alice").is_none());
        assert!(ap.cache.lookup("bob").is_some());
    }

    #[test]
    fn force_expire_unmounts_everything() {
        let cb = callbacks();
        let ap = AutomountPoint::new("/home", true, 300);
        ap.cache.update("alice", "srv:/home/alice", 100).unwrap();
        cb.expire(&ap, 101, true);
        assert!(ap.cache.lookup("alice").is_none());
    }

    #[test]
    fn mount_target_prefixes_indirect_keys() {
        let ap = AutomountPoint::new("/home", true, 300);
        assert_eq!(mount_target(&ap, "alice"), "/home/alice");
    }

    #[test]
    fn mount_target_passes_through_direct_keys() {
        let ap = AutomountPoint::new("/-", false, 300);
        assert_eq!(mount_target(&ap, "/mnt/alice"), "/mnt/alice");
    }

    #[test]
    fn forced_type_treats_empty_string_as_none() {
        assert_eq!(forced_type(""), None);
        assert_eq!(forced_type("nis"), Some("nis"));
    }
}

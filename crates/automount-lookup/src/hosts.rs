//! The `hosts` lookup module (spec §4.B item 2 "directory-service
//! sources" — here backed by the local hostname table rather than a
//! remote query, matching how autofs's `-hosts` map enumerates exported
//! hosts rather than a single file's key/value pairs).
//!
//! A key is a hostname or one of its aliases; resolving one yields a
//! synthesized NFS mount spec for that host, letting `/net/<host>`-style
//! indirect mounts come up without a hand-maintained map file.

use std::path::PathBuf;

use tracing::warn;

use automount_core::cache::MapentCache;
use automount_core::error::{LookupError, NssStatus};
use automount_core::lookup::{LookupModule, LookupModuleFactory};
use automount_core::master::MasterMap;
use automount_core::time::Age;

fn default_fstype_spec(host: &str) -> String {
    format!("-fstype=nfs {host}:/")
}

struct HostEntry {
    names: Vec<String>,
}

fn read_hosts_table(path: &std::path::Path) -> Option<Vec<HostEntry>> {
    let contents = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            warn!(path = %path.display(), %err, "hosts table unavailable");
            return None;
        }
    };
    let mut table = Vec::new();
    for line in contents.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let mut fields = line.split_whitespace();
        if fields.next().is_none() {
            continue;
        }
        let names: Vec<String> = fields.map(|s| s.to_string()).collect();
        if !names.is_empty() {
            table.push(HostEntry { names });
        }
    }
    Some(table)
}

pub struct HostsLookupModuleFactory;

impl LookupModuleFactory for HostsLookupModuleFactory {
    fn source_type(&self) -> &str {
        "hosts"
    }

    fn open(
        &self,
        _format: &str,
        argv: &[String],
    ) -> Result<Option<Box<dyn LookupModule>>, LookupError> {
        let path = argv.first().cloned().unwrap_or_else(|| "/etc/hosts".to_string());
        Ok(Some(Box::new(HostsLookupModule { path: PathBuf::from(path) })))
    }
}

pub struct HostsLookupModule {
    path: PathBuf,
}

impl LookupModule for HostsLookupModule {
    /// The hosts map has no master-map concept of its own — real autofs
    /// wires it in only as an indirect-mount source, never as a master
    /// source type.
    fn read_master(&self, _master: &MasterMap, _age: Age) -> Result<NssStatus, LookupError> {
        warn!("hosts source does not support read_master");
        Ok(NssStatus::Unavail)
    }

    fn read_map(&self, cache: &MapentCache, age: Age) -> Result<NssStatus, LookupError> {
        let Some(table) = read_hosts_table(&self.path) else {
            return Ok(NssStatus::Unavail);
        };
        for entry in &table {
            let Some(primary) = entry.names.first() else { continue };
            let spec = default_fstype_spec(primary);
            for name in &entry.names {
                if let Err(err) = cache.update(name, &spec, age) {
                    warn!(key = %name, %err, "rejected hosts entry");
                }
            }
        }
        Ok(NssStatus::Success)
    }

    fn mount(&self, cache: &MapentCache, key: &str, age: Age) -> Result<NssStatus, LookupError> {
        let Some(table) = read_hosts_table(&self.path) else {
            return Ok(NssStatus::Unavail);
        };
        for entry in &table {
            if entry.names.iter().any(|n| n == key) {
                let spec = default_fstype_spec(&entry.names[0]);
                return match cache.update(key, &spec, age) {
                    Ok(_) => Ok(NssStatus::Success),
                    Err(err) => {
                        warn!(%key, %err, "rejected hosts entry");
                        Ok(NssStatus::NotFound)
                    }
                };
            }
        }
        Ok(NssStatus::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_hosts(dir: &tempfile::TempDir, contents: &str) -> PathBuf {
        let path = dir.path().join("hosts");
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    #[test]
    fn mount_resolves_by_alias() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_hosts(&dir, "10.0.0.1 fileserver fs1\n");
        let module = HostsLookupModule { path };
        let cache = MapentCache::new();
        let status = module.mount(&cache, "fs1", 1).unwrap();
        assert_eq!(status, NssStatus::Success);
        assert_eq!(cache.lookup("fs1").unwrap().entry, "-fstype=nfs fileserver:/");
    }

    #[test]
    fn mount_returns_notfound_for_unknown_host() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_hosts(&dir, "10.0.0.1 fileserver\n");
        let module = HostsLookupModule { path };
        let cache = MapentCache::new();
        assert_eq!(module.mount(&cache, "nope", 1).unwrap(), NssStatus::NotFound);
    }

    #[test]
    fn read_map_populates_every_alias() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_hosts(&dir, "10.0.0.1 fileserver fs1\n10.0.0.2 backup\n");
        let module = HostsLookupModule { path };
        let cache = MapentCache::new();
        module.read_map(&cache, 1).unwrap();
        assert!(cache.lookup("fileserver").is_some());
        assert!(cache.lookup("fs1").is_some());
        assert!(cache.lookup("backup").is_some());
    }
}

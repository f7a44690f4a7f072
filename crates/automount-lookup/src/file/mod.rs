//! The `file` lookup module (spec §4.B item 1): reads Sun-style map files
//! straight off disk, following `+name` inclusion and honouring the
//! `*` wildcard key.

pub mod lexer;

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, warn};

use automount_core::cache::MapentCache;
use automount_core::error::{LookupError, NssStatus};
use automount_core::lookup::{LookupModule, LookupModuleFactory};
use automount_core::master::MasterMap;
use automount_core::time::{Age, MAX_INCLUDE_DEPTH};

use lexer::parse_all;

/// `[type[,format]:]name` — the grammar of a `+name` include payload and
/// of a master-map source field (spec §4.B, §6).
fn include_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:([A-Za-z0-9_.-]+)(?:,([A-Za-z0-9_.-]+))?:)?(.+)$").unwrap())
}

fn read_file_or_unavail(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(contents) => Some(contents),
        Err(err) => {
            warn!(path = %path.display(), %err, "file map unavailable");
            None
        }
    }
}

/// Opens `file`-typed map sources: the first argument is the absolute map
/// path (spec §4.B item 1 "takes an absolute pathname as its first
/// argument").
pub struct FileLookupModuleFactory {
    default_timeout: Age,
    default_ghost: bool,
}

impl FileLookupModuleFactory {
    pub fn new(default_timeout: Age, default_ghost: bool) -> Self {
        FileLookupModuleFactory { default_timeout, default_ghost }
    }
}

impl LookupModuleFactory for FileLookupModuleFactory {
    fn source_type(&self) -> &str {
        "file"
    }

    fn open(
        &self,
        _format: &str,
        argv: &[String],
    ) -> Result<Option<Box<dyn LookupModule>>, LookupError> {
        let Some(path) = argv.first() else {
            return Err(LookupError::Unavailable("file: missing map path".to_string()));
        };
        let path = PathBuf::from(path);
        if !path.is_absolute() {
            return Err(LookupError::Unavailable(format!(
                "file: map path {path:?} must be absolute"
            )));
        }
        Ok(Some(Box::new(FileLookupModule {
            path,
            default_timeout: self.default_timeout,
            default_ghost: self.default_ghost,
        })))
    }
}

pub struct FileLookupModule {
    path: PathBuf,
    default_timeout: Age,
    default_ghost: bool,
}

/// The source spec and per-path options parsed from one master-map
/// value (everything after the mount path).
struct MasterLine {
    source_type: Option<String>,
    format: String,
    argv: Vec<String>,
    ghost: bool,
    timeout: Age,
}

/// Resolution of one `+name`/`[type:]name` include directive, relative to
/// the file that named it.
struct Include {
    source_type: Option<String>,
    name: String,
    resolved: PathBuf,
}

impl FileLookupModule {
    fn resolve_include(&self, raw_key: &str) -> Option<Include> {
        let payload = raw_key.strip_prefix('+')?;
        let caps = include_pattern().captures(payload)?;
        let source_type = caps.get(1).map(|m| m.as_str().to_string());
        let name = caps.get(3)?.as_str().to_string();
        let resolved = if name.starts_with('/') {
            PathBuf::from(&name)
        } else {
            self.path.parent().map(|dir| dir.join(&name)).unwrap_or_else(|| PathBuf::from(&name))
        };
        Some(Include { source_type, name, resolved })
    }

    /// Spec §4.B item 1: "a self-include (same basename, or same absolute
    /// path) sets the `recurse` guard ... immediate UNAVAIL on a second
    /// entry". The guard is scoped to *this* module's own map, not to the
    /// file currently being read in a nested include.
    fn is_self_include(&self, include: &Include) -> bool {
        if include.resolved == self.path {
            return true;
        }
        !include.name.starts_with('/')
            && include.resolved.file_name() == self.path.file_name()
    }

    fn parse_master_line(&self, value: &str) -> MasterLine {
        let mut tokens = value.split_whitespace();
        let mut source_type = None;
        let mut format = "sun".to_string();
        let mut argv = Vec::new();
        if let Some(first) = tokens.next() {
            match include_pattern().captures(first) {
                Some(caps) => {
                    source_type = caps.get(1).map(|m| m.as_str().to_string());
                    if let Some(f) = caps.get(2) {
                        format = f.as_str().to_string();
                    }
                    if let Some(name) = caps.get(3) {
                        argv.push(name.as_str().to_string());
                    }
                }
                None => argv.push(first.to_string()),
            }
        }

        let mut ghost = self.default_ghost;
        let mut timeout = self.default_timeout;
        for tok in tokens {
            if tok == "-ghost" || tok == "--ghost" {
                ghost = true;
            } else if tok == "-nobrowse" || tok == "--nobrowse" {
                ghost = false;
            } else if let Some(n) = tok.strip_prefix("--timeout=").or_else(|| tok.strip_prefix("-timeout=")) {
                if let Ok(parsed) = n.parse::<Age>() {
                    timeout = parsed;
                }
            } else {
                argv.push(tok.to_string());
            }
        }
        MasterLine { source_type, format, argv, ghost, timeout }
    }

    fn read_master_into(&self, master: &MasterMap, age: Age, depth: u32) -> Result<NssStatus, LookupError> {
        let Some(contents) = read_file_or_unavail(&self.path) else {
            return Ok(NssStatus::Unavail);
        };
        for raw in parse_all(&contents) {
            if let Some(include) = self.resolve_include(&raw.key) {
                self.follow_master_include(&include, master, age, depth);
                continue;
            }
            let parsed = self.parse_master_line(&raw.value);
            let entry = match master.find(&raw.key) {
                Some(existing) => {
                    existing.touch(age);
                    existing
                }
                None => match master.new_entry(&raw.key, age, parsed.ghost, parsed.timeout) {
                    Ok(entry) => entry,
                    Err(err) => {
                        warn!(path = %raw.key, %err, "failed to register master entry");
                        continue;
                    }
                },
            };
            if let Err(err) = master.add_map_source(
                &entry,
                parsed.source_type.as_deref().unwrap_or(""),
                &parsed.format,
                &parsed.argv,
                age,
            ) {
                debug!(path = %raw.key, %err, "map source not added");
            }
        }
        Ok(NssStatus::Success)
    }

    fn follow_master_include(&self, include: &Include, master: &MasterMap, age: Age, depth: u32) {
        if include.source_type.as_deref().is_some_and(|t| t != "file") {
            warn!(name = %include.name, "master include names a non-file source, unsupported by the file backend");
            return;
        }
        if self.is_self_include(include) {
            warn!(name = %include.name, "include cycle detected in master map, skipping");
            return;
        }
        if depth + 1 >= MAX_INCLUDE_DEPTH {
            warn!(name = %include.name, "maximum include depth exceeded, skipping");
            return;
        }
        let included = FileLookupModule {
            path: include.resolved.clone(),
            default_timeout: self.default_timeout,
            default_ghost: self.default_ghost,
        };
        if let Err(err) = included.read_master_into(master, age, depth + 1) {
            warn!(name = %include.name, %err, "included master map failed");
        }
    }

    fn read_map_into(&self, path: &Path, cache: &MapentCache, age: Age, depth: u32) -> Result<NssStatus, LookupError> {
        let Some(contents) = read_file_or_unavail(path) else {
            return Ok(NssStatus::Unavail);
        };
        for raw in parse_all(&contents) {
            if let Some(include) = self.resolve_include(&raw.key) {
                self.follow_map_include(&include, cache, age, depth);
                continue;
            }
            if let Err(err) = cache.update(&raw.key, &raw.value, age) {
                warn!(key = %raw.key, %err, "rejected map entry");
            }
        }
        Ok(NssStatus::Success)
    }

    fn follow_map_include(&self, include: &Include, cache: &MapentCache, age: Age, depth: u32) {
        if include.source_type.as_deref().is_some_and(|t| t != "file") {
            warn!(name = %include.name, "include names a non-file source, unsupported by the file backend");
            return;
        }
        if self.is_self_include(include) {
            warn!(name = %include.name, "include cycle detected, skipping");
            return;
        }
        if depth + 1 >= MAX_INCLUDE_DEPTH {
            warn!(name = %include.name, "maximum include depth exceeded, skipping");
            return;
        }
        if let Err(err) = self.read_map_into(&include.resolved, cache, age, depth + 1) {
            warn!(name = %include.name, %err, "included map failed");
        }
    }

    fn mount_one(&self, path: &Path, cache: &MapentCache, key: &str, age: Age, depth: u32) -> Result<NssStatus, LookupError> {
        let Some(contents) = read_file_or_unavail(path) else {
            return Ok(NssStatus::Unavail);
        };
        let entries = parse_all(&contents);

        if let Some(hit) = entries.iter().find(|e| e.key == key) {
            return match cache.update(key, &hit.value, age) {
                Ok(_) => Ok(NssStatus::Success),
                Err(err) => {
                    warn!(%key, %err, "rejected map entry");
                    Ok(NssStatus::NotFound)
                }
            };
        }

        // Spec §9 open question resolved: `wild` is matched against the
        // explicit set of "entry present" cache outcomes rather than
        // treated as a truthy integer, so there is nothing ambiguous left
        // to encode here — `CacheStatus::Missing` is the only variant that
        // means "not present", and it never reaches this branch.
        if let Some(wild) = entries.iter().find(|e| e.key == "*") {
            let value = wild.value.replace('&', key);
            return match cache.update(key, &value, age) {
                Ok(_) => Ok(NssStatus::Success),
                Err(err) => {
                    warn!(%key, %err, "rejected wildcard substitution");
                    Ok(NssStatus::NotFound)
                }
            };
        }

        if depth + 1 < MAX_INCLUDE_DEPTH {
            for raw in &entries {
                let Some(include) = self.resolve_include(&raw.key) else { continue };
                if include.source_type.as_deref().is_some_and(|t| t != "file") {
                    continue;
                }
                if self.is_self_include(&include) {
                    continue;
                }
                if let Ok(NssStatus::Success) = self.mount_one(&include.resolved, cache, key, age, depth + 1) {
                    return Ok(NssStatus::Success);
                }
            }
        }

        Ok(NssStatus::NotFound)
    }
}

impl LookupModule for FileLookupModule {
    fn read_master(&self, master: &MasterMap, age: Age) -> Result<NssStatus, LookupError> {
        self.read_master_into(master, age, 0)
    }

    fn read_map(&self, cache: &MapentCache, age: Age) -> Result<NssStatus, LookupError> {
        self.read_map_into(&self.path, cache, age, 0)
    }

    fn mount(&self, cache: &MapentCache, key: &str, age: Age) -> Result<NssStatus, LookupError> {
        self.mount_one(&self.path, cache, key, age, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_map(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn module(path: PathBuf) -> FileLookupModule {
        FileLookupModule { path, default_timeout: 300, default_ghost: true }
    }

    #[test]
    fn read_map_populates_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_map(&dir, "auto.home", "home -fstype=nfs srv:/home\n");
        let cache = MapentCache::new();
        let status = module(path).read_map(&cache, 1).unwrap();
        assert_eq!(status, NssStatus::Success);
        assert_eq!(cache.lookup("home").unwrap().entry, "-fstype=nfs srv:/home");
    }

    #[test]
    fn missing_file_is_unavail_not_an_error() {
        let cache = MapentCache::new();
        let status = module(PathBuf::from("/nonexistent/auto.none")).read_map(&cache, 1).unwrap();
        assert_eq!(status, NssStatus::Unavail);
    }

    #[test]
    fn mount_substitutes_ampersand_in_wildcard() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_map(&dir, "auto.home", "* -fstype=nfs srv:/home/&\n");
        let cache = MapentCache::new();
        let status = module(path).mount(&cache, "alice", 1).unwrap();
        assert_eq!(status, NssStatus::Success);
        assert_eq!(cache.lookup("alice").unwrap().entry, "-fstype=nfs srv:/home/alice");
    }

    #[test]
    fn mount_returns_notfound_when_no_entry_or_wildcard_matches() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_map(&dir, "auto.home", "bob -fstype=nfs srv:/home/bob\n");
        let cache = MapentCache::new();
        let status = module(path).mount(&cache, "alice", 1).unwrap();
        assert_eq!(status, NssStatus::NotFound);
    }

    #[test]
    fn self_include_by_basename_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_map(&dir, "auto.master", "+auto.master\nhome auto.home\n");
        let cache = MapentCache::new();
        let master = MasterMap::new();
        let status = module(path).read_master(&master, 1).unwrap();
        assert_eq!(status, NssStatus::Success);
        assert!(master.find("home").is_some());
        let _ = cache;
    }

    #[test]
    fn include_pulls_entries_from_another_file() {
        let dir = tempfile::tempdir().unwrap();
        write_map(&dir, "auto.extra", "extra srv:/extra\n");
        let path = write_map(&dir, "auto.home", "+auto.extra\nhome srv:/home\n");
        let cache = MapentCache::new();
        let status = module(path).read_map(&cache, 1).unwrap();
        assert_eq!(status, NssStatus::Success);
        assert!(cache.lookup("home").is_some());
        assert!(cache.lookup("extra").is_some());
    }

    #[test]
    fn read_master_registers_path_and_map_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_map(&dir, "auto.master", "/home auto.home --timeout=120\n");
        let master = MasterMap::new();
        module(path).read_master(&master, 1).unwrap();
        let entry = master.find("/home").unwrap();
        assert_eq!(entry.automount_point.timeout, 120);
        assert_eq!(entry.sources_snapshot()[0].argv, vec!["auto.home".to_string()]);
    }

    #[test]
    fn rereading_master_touches_existing_entry_age() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_map(&dir, "auto.master", "/home auto.home\n");
        let master = MasterMap::new();
        let m = module(path);
        m.read_master(&master, 1).unwrap();
        m.read_master(&master, 2).unwrap();
        assert_eq!(master.find("/home").unwrap().age(), 2);
    }
}

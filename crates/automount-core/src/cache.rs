//! The in-memory key to [`Mapent`] index feeding both lookup and expiration
//! (spec §3 "Mapent", §4.A "Cache").

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{RwLock, RwLockReadGuard};

use crate::error::CacheError;
use crate::time::{Age, KEY_MAX_LEN, MAPENT_MAX_LEN};

/// Identifies the [`MapentCache`] that created a [`Mapent`], so
/// [`MapentCache::lookup_distinct`] can tell "mine" from "a shared
/// parent's" apart even when both are visible through the same lookup
/// path (multi-mount parent/child relationships, spec §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheId(u64);

static NEXT_CACHE_ID: AtomicU64 = AtomicU64::new(1);

impl CacheId {
    fn next() -> Self {
        CacheId(NEXT_CACHE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// A single key → entry resolution (spec §3 "Mapent").
#[derive(Debug, Clone)]
pub struct Mapent {
    pub key: String,
    /// Raw, un-interpreted entry text; format interpretation belongs to the
    /// external parser (spec §1, out of scope for the core).
    pub entry: String,
    pub age: Age,
    /// While `Some(deadline)` with `deadline > now`, the key is treated as
    /// definitively absent (negative caching, spec §4.A).
    pub status: Option<Age>,
    /// Device/inode of a ghosted subdirectory, recorded so later stat
    /// comparisons can detect user tampering (spec §4.E "Ghosting").
    pub ghost_dev_ino: Option<(u64, u64)>,
    /// Key of the Mapent that is the root of a multi-mount this entry
    /// belongs to, enabling shared locking of all siblings (spec §3). A
    /// key rather than a direct reference because both entries live in the
    /// same cache's map; looking the root back up re-takes the cache lock
    /// the caller already understands the discipline of.
    pub multi: Option<String>,
    owner: CacheId,
}

impl Mapent {
    fn new(key: &str, entry: &str, age: Age, owner: CacheId) -> Self {
        Mapent {
            key: key.to_string(),
            entry: entry.to_string(),
            age,
            status: None,
            ghost_dev_ino: None,
            multi: None,
            owner,
        }
    }

    pub fn is_negative(&self, now: Age) -> bool {
        matches!(self.status, Some(deadline) if deadline > now)
    }
}

/// Outcome of a cache mutation. The same small enum is reused by
/// `update`, `touch`, and the higher-level NSS pipeline to signal
/// "freshness changed" (spec §4.A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    /// The entry existed already and its text was unchanged.
    Ok,
    /// The entry was created, or its text changed.
    Updated,
    /// The caller asked to touch a key that isn't present and none was
    /// created.
    Missing,
}

/// Concurrent key → [`Mapent`] index scoped to one `AutomountPoint`.
///
/// Locking is per-cache; code in this crate never holds two `MapentCache`
/// locks at once (spec §4.A, §5).
pub struct MapentCache {
    id: CacheId,
    entries: RwLock<HashMap<String, Mapent>>,
}

impl Default for MapentCache {
    fn default() -> Self {
        Self::new()
    }
}

/// A held read lock over the whole cache, for the ghosting/enumeration
/// pass (spec §4.A `enumerate_readlock`/`enumerate`/`enumerate_unlock`).
/// Dropping the guard is the `enumerate_unlock` call.
pub struct EnumerateGuard<'a> {
    guard: RwLockReadGuard<'a, HashMap<String, Mapent>>,
}

impl<'a> EnumerateGuard<'a> {
    pub fn iter(&self) -> impl Iterator<Item = &Mapent> {
        self.guard.values()
    }
}

impl MapentCache {
    pub fn new() -> Self {
        MapentCache { id: CacheId::next(), entries: RwLock::new(HashMap::new()) }
    }

    pub fn id(&self) -> CacheId {
        self.id
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, Mapent>> {
        self.entries.read().unwrap_or_else(|_| std::process::abort())
    }

    #[allow(clippy::type_complexity)]
    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Mapent>> {
        self.entries.write().unwrap_or_else(|_| std::process::abort())
    }

    /// `lookup(key)`: returns a clone of the entry, or `None`.
    pub fn lookup(&self, key: &str) -> Option<Mapent> {
        self.read().get(key).cloned()
    }

    /// `lookup_distinct(key)`: as [`Self::lookup`], but `None` if the entry
    /// is physically owned by a different cache (a shared multi-mount
    /// parent).
    pub fn lookup_distinct(&self, key: &str) -> Option<Mapent> {
        self.read().get(key).filter(|e| e.owner == self.id).cloned()
    }

    /// `partial_match(key)`: the entry whose key is the longest
    /// path-component prefix of `key`, used to locate multi-mount roots.
    pub fn partial_match(&self, key: &str) -> Option<Mapent> {
        let components: Vec<&str> = key.split('/').filter(|c| !c.is_empty()).collect();
        let map = self.read();
        let mut best: Option<&Mapent> = None;
        let mut best_len = 0usize;
        for entry in map.values() {
            let entry_components: Vec<&str> =
                entry.key.split('/').filter(|c| !c.is_empty()).collect();
            if entry_components.is_empty() || entry_components.len() > components.len() {
                continue;
            }
            if components[..entry_components.len()] == entry_components[..]
                && entry_components.len() > best_len
            {
                best = Some(entry);
                best_len = entry_components.len();
            }
        }
        best.cloned()
    }

    /// `update(key, text, age)`: insert or replace.
    pub fn update(&self, key: &str, text: &str, age: Age) -> Result<CacheStatus, CacheError> {
        if key.len() > KEY_MAX_LEN {
            return Err(CacheError::KeyTooLong(key.to_string()));
        }
        if text.len() > MAPENT_MAX_LEN {
            return Err(CacheError::EntryTooLong(key.to_string()));
        }
        let mut map = self.write();
        match map.get_mut(key) {
            Some(existing) => {
                if existing.entry == text {
                    existing.age = age;
                    Ok(CacheStatus::Ok)
                } else {
                    existing.entry = text.to_string();
                    existing.age = age;
                    existing.status = None;
                    Ok(CacheStatus::Updated)
                }
            }
            None => {
                map.insert(key.to_string(), Mapent::new(key, text, age, self.id));
                Ok(CacheStatus::Updated)
            }
        }
    }

    /// Bumps `age` on an existing entry without touching its text; used
    /// during `read_map` reconciliation to mark a key "still present" this
    /// epoch. Returns `Missing` if the key isn't present (none is
    /// created) — the MISSING half of the `update` return contract (spec
    /// §4.A).
    pub fn touch(&self, key: &str, age: Age) -> CacheStatus {
        let mut map = self.write();
        match map.get_mut(key) {
            Some(existing) => {
                existing.age = age;
                CacheStatus::Ok
            }
            None => CacheStatus::Missing,
        }
    }

    /// Marks `key` as negatively cached until `now + negative_timeout`,
    /// creating a placeholder entry if necessary (spec §4.A, §7 "Parse
    /// rejection").
    pub fn set_negative(&self, key: &str, now: Age, negative_timeout: Age) {
        let mut map = self.write();
        let deadline = now + negative_timeout;
        match map.get_mut(key) {
            Some(existing) => existing.status = Some(deadline),
            None => {
                let mut entry = Mapent::new(key, "", now, self.id);
                entry.status = Some(deadline);
                map.insert(key.to_string(), entry);
            }
        }
    }

    /// `delete(key)`: returns whether anything was removed.
    pub fn delete(&self, key: &str) -> bool {
        self.write().remove(key).is_some()
    }

    /// `clean(age)`: removes entries whose `age` is strictly below
    /// `cutoff`. Returns the number removed.
    pub fn clean(&self, cutoff: Age) -> usize {
        let mut map = self.write();
        let before = map.len();
        map.retain(|_, entry| entry.age >= cutoff);
        before - map.len()
    }

    /// `enumerate_readlock()` + `enumerate(iter)`: holds the read lock for
    /// the duration of the returned guard. Dropping the guard is
    /// `enumerate_unlock()`.
    pub fn enumerate_readlock(&self) -> EnumerateGuard<'_> {
        EnumerateGuard { guard: self.read() }
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Records the device/inode of a freshly-ghosted subdirectory.
    pub fn set_ghost_dev_ino(&self, key: &str, dev: u64, ino: u64) {
        if let Some(entry) = self.write().get_mut(key) {
            entry.ghost_dev_ino = Some((dev, ino));
        }
    }

    /// Links `key` to the root Mapent of the multi-mount it belongs to.
    pub fn set_multi(&self, key: &str, root_key: &str) {
        if let Some(entry) = self.write().get_mut(key) {
            entry.multi = Some(root_key.to_string());
        }
    }

    /// Test-only: places `key` in this cache's map tagged with a foreign
    /// `owner`, the situation `lookup_distinct` exists to guard against —
    /// a multi-mount child sharing a parent's physical cache. Production
    /// code always derives `owner` from `self.id` (via `update`/
    /// `set_negative`); this bypasses that to set the scenario up directly.
    #[cfg(test)]
    fn insert_foreign(&self, key: &str, text: &str, age: Age, owner: CacheId) {
        self.write().insert(key.to_string(), Mapent::new(key, text, age, owner));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn update_then_lookup_roundtrips() {
        let cache = MapentCache::new();
        assert_eq!(cache.update("home", "-fstype=nfs srv:/home", 1).unwrap(), CacheStatus::Updated);
        let entry = cache.lookup("home").unwrap();
        assert_eq!(entry.entry, "-fstype=nfs srv:/home");
        assert!(entry.age >= 1);
    }

    #[test]
    fn repeated_identical_update_is_ok() {
        let cache = MapentCache::new();
        cache.update("home", "text", 1).unwrap();
        assert_eq!(cache.update("home", "text", 2).unwrap(), CacheStatus::Ok);
    }

    #[test]
    fn changed_update_is_updated() {
        let cache = MapentCache::new();
        cache.update("home", "text", 1).unwrap();
        assert_eq!(cache.update("home", "other", 2).unwrap(), CacheStatus::Updated);
    }

    #[test]
    fn clean_removes_entries_older_than_cutoff() {
        let cache = MapentCache::new();
        cache.update("stale", "a", 1).unwrap();
        cache.update("fresh", "b", 10).unwrap();
        assert_eq!(cache.clean(5), 1);
        assert!(cache.lookup("stale").is_none());
        assert!(cache.lookup("fresh").is_some());
    }

    #[test]
    fn delete_reports_whether_removed() {
        let cache = MapentCache::new();
        assert!(!cache.delete("missing"));
        cache.update("present", "x", 1).unwrap();
        assert!(cache.delete("present"));
        assert!(!cache.delete("present"));
    }

    #[test]
    fn lookup_distinct_excludes_foreign_owner() {
        let cache = MapentCache::new();
        cache.update("k", "mine", 1).unwrap();
        assert!(cache.lookup_distinct("k").is_some(), "an entry this cache itself populated is visible");

        // A multi-mount child can end up sharing this cache's key space
        // while being owned by a different cache instance (its own
        // point's cache) — `insert_foreign` stands in for that.
        let foreign = CacheId::next();
        cache.insert_foreign("k", "theirs", 2, foreign);

        assert!(cache.lookup("k").is_some(), "plain lookup ignores ownership");
        assert!(
            cache.lookup_distinct("k").is_none(),
            "lookup_distinct hides an entry owned by a different cache"
        );
    }

    #[test]
    fn partial_match_returns_longest_prefix() {
        let cache = MapentCache::new();
        cache.update("a", "root", 1).unwrap();
        cache.update("a/b", "child", 1).unwrap();
        let m = cache.partial_match("a/b/c").unwrap();
        assert_eq!(m.key, "a/b");
    }

    #[test]
    fn negative_cache_window() {
        let cache = MapentCache::new();
        cache.set_negative("k", 100, 60);
        let entry = cache.lookup("k").unwrap();
        assert!(entry.is_negative(110));
        assert!(!entry.is_negative(161));
    }

    #[test]
    fn touch_reports_missing_for_absent_key() {
        let cache = MapentCache::new();
        assert_eq!(cache.touch("nope", 1), CacheStatus::Missing);
        cache.update("present", "x", 1).unwrap();
        assert_eq!(cache.touch("present", 2), CacheStatus::Ok);
    }

    #[test]
    fn oversized_key_is_rejected() {
        let cache = MapentCache::new();
        let huge = "a".repeat(KEY_MAX_LEN + 1);
        assert!(matches!(cache.update(&huge, "v", 1), Err(CacheError::KeyTooLong(_))));
    }
}

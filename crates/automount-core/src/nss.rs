//! The name-service-switch lookup pipeline (spec §4.C).
//!
//! Resolves either `read_map` or `mount` through an ordered list of
//! [`NssSource`]s, each carrying per-status actions parsed from the
//! system nsswitch configuration for the `automount` database. The core
//! never reads that configuration itself (spec §6 names it an external
//! adapter concern) — it only runs the traversal once given the parsed
//! source list and a way to actually invoke each named source's lookup
//! module, via [`SourceInvoker`].

use tracing::warn;

use crate::cache::MapentCache;
use crate::error::{LookupError, NssError, NssStatus};
use crate::time::Age;

/// What a source does for one observed [`NssStatus`] (spec §4.C).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NssActionKind {
    Continue,
    Return,
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NssAction {
    pub kind: NssActionKind,
    pub negated: bool,
}

impl NssAction {
    pub const fn new(kind: NssActionKind, negated: bool) -> Self {
        NssAction { kind, negated }
    }
}

fn status_index(status: NssStatus) -> usize {
    NssStatus::ALL.iter().position(|s| *s == status).expect("NssStatus::ALL is exhaustive")
}

/// One entry of the ordered nsswitch source list, with its four
/// per-status action slots (spec §4.C).
#[derive(Debug, Clone)]
pub struct NssSource {
    pub name: String,
    actions: [NssAction; 4],
}

impl NssSource {
    /// Conventional nsswitch defaults: `SUCCESS=return`, everything else
    /// `=continue`. Callers parsing an explicit `[...]` qualifier should
    /// override individual slots with [`Self::set_action`].
    pub fn new(name: impl Into<String>) -> Self {
        NssSource {
            name: name.into(),
            actions: [
                NssAction::new(NssActionKind::Return, false),
                NssAction::new(NssActionKind::Continue, false),
                NssAction::new(NssActionKind::Continue, false),
                NssAction::new(NssActionKind::Continue, false),
            ],
        }
    }

    pub fn set_action(&mut self, status: NssStatus, action: NssAction) {
        self.actions[status_index(status)] = action;
    }

    pub fn action_for(&self, status: NssStatus) -> NssAction {
        self.actions[status_index(status)]
    }
}

/// The world a pipeline run needs: the ability to invoke one named
/// source's module. `effective_arg` carries the `/etc/<name>` path
/// substitution computed for the `files` source (spec §4.C "Tie-breaks");
/// it is `None` for every other source.
pub trait SourceInvoker {
    fn invoke_read_map(
        &self,
        source_name: &str,
        effective_arg: Option<&str>,
        age: Age,
    ) -> Result<NssStatus, LookupError>;

    fn invoke_mount(
        &self,
        source_name: &str,
        key: &str,
        effective_arg: Option<&str>,
        age: Age,
    ) -> Result<NssStatus, LookupError>;
}

enum Outcome {
    Continue,
    ReturnSuccess,
    ReturnFailure,
}

/// Step 4 of the traversal algorithm: negated actions are checked first,
/// then the direct action for the observed status (spec §4.C).
fn action_outcome(source: &NssSource, status: NssStatus) -> Outcome {
    for candidate in NssStatus::ALL {
        let action = source.action_for(candidate);
        if action.negated && action.kind == NssActionKind::Return && status != candidate {
            return if status == NssStatus::Success {
                Outcome::ReturnSuccess
            } else {
                Outcome::ReturnFailure
            };
        }
    }
    let action = source.action_for(status);
    match (status, action.kind) {
        (NssStatus::Success, NssActionKind::Continue) => Outcome::Continue,
        (NssStatus::Success, _) => Outcome::ReturnSuccess,
        (NssStatus::NotFound | NssStatus::Unavail | NssStatus::TryAgain, NssActionKind::Return) => {
            Outcome::ReturnFailure
        }
        _ => Outcome::Continue,
    }
}

/// Computes the `/etc/<name>` substitution for the first `files` source
/// encountered, reused verbatim by every later `files` occurrence (spec
/// §4.C "Tie-breaks").
fn files_path(map_arg: &str) -> String {
    format!("/etc/{map_arg}")
}

/// Drives `read_map(ap, age)` through the pipeline (spec §4.C steps 1-6).
///
/// `forced_type` is the master entry's explicitly named source type, if
/// any (step 1). `map_arg` is the first element of the map source's
/// argument vector — the map name (steps 2-3).
pub fn read_map(
    sources: &[NssSource],
    forced_type: Option<&str>,
    map_arg: &str,
    cache: &MapentCache,
    age: Age,
    invoker: &dyn SourceInvoker,
) -> Result<bool, NssError> {
    if let Some(forced) = forced_type {
        let status = invoker.invoke_read_map(forced, None, age)?;
        cache.clean(age);
        return Ok(status == NssStatus::Success);
    }
    if map_arg.starts_with('/') {
        let status = invoker.invoke_read_map("file", None, age)?;
        cache.clean(age);
        return Ok(status == NssStatus::Success);
    }
    if sources.is_empty() {
        warn!(%map_arg, "no nsswitch sources configured for automount database");
        return Err(NssError::NoSources);
    }

    let mut substituted_files_path: Option<String> = None;
    for source in sources {
        let effective = if source.name == "files" {
            Some(
                substituted_files_path
                    .get_or_insert_with(|| files_path(map_arg))
                    .clone(),
            )
        } else {
            None
        };
        let status = invoker.invoke_read_map(&source.name, effective.as_deref(), age)?;
        match action_outcome(source, status) {
            Outcome::Continue => continue,
            Outcome::ReturnSuccess => {
                cache.clean(age);
                return Ok(true);
            }
            Outcome::ReturnFailure => return Ok(false),
        }
    }
    Ok(true)
}

/// Drives `mount(ap, key)` through the pipeline; identical traversal to
/// [`read_map`] but no `cache.clean` on success (spec §4.C).
pub fn mount(
    sources: &[NssSource],
    forced_type: Option<&str>,
    map_arg: &str,
    key: &str,
    age: Age,
    invoker: &dyn SourceInvoker,
) -> Result<bool, NssError> {
    if let Some(forced) = forced_type {
        let status = invoker.invoke_mount(forced, key, None, age)?;
        return Ok(status == NssStatus::Success);
    }
    if map_arg.starts_with('/') {
        let status = invoker.invoke_mount("file", key, None, age)?;
        return Ok(status == NssStatus::Success);
    }
    if sources.is_empty() {
        warn!(%map_arg, "no nsswitch sources configured for automount database");
        return Err(NssError::NoSources);
    }

    let mut substituted_files_path: Option<String> = None;
    for source in sources {
        let effective = if source.name == "files" {
            Some(
                substituted_files_path
                    .get_or_insert_with(|| files_path(map_arg))
                    .clone(),
            )
        } else {
            None
        };
        let status = invoker.invoke_mount(&source.name, key, effective.as_deref(), age)?;
        match action_outcome(source, status) {
            Outcome::Continue => continue,
            Outcome::ReturnSuccess => return Ok(true),
            Outcome::ReturnFailure => return Ok(false),
        }
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    struct RecordingInvoker {
        read_map_statuses: Vec<(String, NssStatus)>,
        calls: RefCell<Vec<String>>,
    }

    impl SourceInvoker for RecordingInvoker {
        fn invoke_read_map(
            &self,
            source_name: &str,
            _effective_arg: Option<&str>,
            _age: Age,
        ) -> Result<NssStatus, LookupError> {
            self.calls.borrow_mut().push(source_name.to_string());
            Ok(self
                .read_map_statuses
                .iter()
                .find(|(n, _)| n == source_name)
                .map(|(_, s)| *s)
                .unwrap_or(NssStatus::NotFound))
        }

        fn invoke_mount(
            &self,
            source_name: &str,
            _key: &str,
            _effective_arg: Option<&str>,
            _age: Age,
        ) -> Result<NssStatus, LookupError> {
            self.invoke_read_map(source_name, None, 0)
        }
    }

    #[test]
    fn continue_on_success_calls_both_sources() {
        let mut files = NssSource::new("files");
        files.set_action(NssStatus::Success, NssAction::new(NssActionKind::Continue, false));
        let ldap = NssSource::new("ldap");
        let sources = vec![files, ldap];
        let invoker = RecordingInvoker {
            read_map_statuses: vec![
                ("files".into(), NssStatus::Success),
                ("ldap".into(), NssStatus::Success),
            ],
            calls: RefCell::new(Vec::new()),
        };
        let cache = MapentCache::new();
        let ok = read_map(&sources, None, "auto.home", &cache, 1, &invoker).unwrap();
        assert!(ok);
        assert_eq!(*invoker.calls.borrow(), vec!["files", "ldap"]);
    }

    #[test]
    fn return_on_notfound_short_circuits() {
        let mut files = NssSource::new("files");
        files.set_action(NssStatus::NotFound, NssAction::new(NssActionKind::Return, false));
        let sources = vec![files, NssSource::new("ldap")];
        let invoker = RecordingInvoker {
            read_map_statuses: vec![("files".into(), NssStatus::NotFound)],
            calls: RefCell::new(Vec::new()),
        };
        let cache = MapentCache::new();
        let ok = read_map(&sources, None, "auto.home", &cache, 1, &invoker).unwrap();
        assert!(!ok);
        assert_eq!(*invoker.calls.borrow(), vec!["files"]);
    }

    #[test]
    fn negated_return_terminates_on_mismatch() {
        let mut files = NssSource::new("files");
        files.set_action(NssStatus::Success, NssAction::new(NssActionKind::Return, true));
        let sources = vec![files];
        let invoker = RecordingInvoker {
            read_map_statuses: vec![("files".into(), NssStatus::NotFound)],
            calls: RefCell::new(Vec::new()),
        };
        let cache = MapentCache::new();
        let ok = read_map(&sources, None, "auto.home", &cache, 1, &invoker).unwrap();
        assert!(!ok, "NOTFOUND != SUCCESS under a negated SUCCESS=return should fail");
    }

    #[test]
    fn no_sources_is_an_error() {
        let invoker =
            RecordingInvoker { read_map_statuses: vec![], calls: RefCell::new(Vec::new()) };
        let cache = MapentCache::new();
        let err = read_map(&[], None, "auto.home", &cache, 1, &invoker).unwrap_err();
        assert!(matches!(err, NssError::NoSources));
    }

    #[test]
    fn absolute_map_argument_forces_file_type() {
        let invoker = RecordingInvoker {
            read_map_statuses: vec![("file".into(), NssStatus::Success)],
            calls: RefCell::new(Vec::new()),
        };
        let cache = MapentCache::new();
        let ok = read_map(&[NssSource::new("ldap")], None, "/etc/auto.direct", &cache, 1, &invoker)
            .unwrap();
        assert!(ok);
        assert_eq!(*invoker.calls.borrow(), vec!["file"]);
    }
}

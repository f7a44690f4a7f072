//! A stub directory-service lookup module modeling the framing shared by
//! `nisplus`, `hesiod`, `yp` and `ldap` backends (spec §4.B item 2),
//! without linking any of their actual resolver libraries.
//!
//! Grounded on `examples/original_source/modules/lookup_hesiod.c`: that
//! module's `lookup_read_map` unconditionally returns `NSS_STATUS_UNAVAIL`
//! (directory-service sources are point-queried per key, not bulk-read),
//! and `lookup_mount` resolves one record through the configured resolver
//! before handing the result to the parser. This backend reproduces the
//! same two-operation shape as a documented placeholder: `read_map` always
//! reports `Unavail`, and `mount` reports `Unavail` rather than fabricating
//! a resolved record, since no real directory-service client is linked.
//!
//! The hesiod module's `chdir("/")` before every resolver call (spec §9
//! Open Question, resolved in SPEC_FULL.md §4.K) is deliberately *not*
//! reproduced here: it exists to work around a quirk of the real
//! `libhesiod` resolver, which this stub never calls.

use automount_core::cache::MapentCache;
use automount_core::error::{LookupError, NssStatus};
use automount_core::lookup::{LookupModule, LookupModuleFactory};
use automount_core::master::MasterMap;
use automount_core::time::Age;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirectoryServiceKind {
    Nisplus,
    Hesiod,
    Yp,
    Ldap,
}

impl DirectoryServiceKind {
    fn source_type(self) -> &'static str {
        match self {
            DirectoryServiceKind::Nisplus => "nisplus",
            DirectoryServiceKind::Hesiod => "hesiod",
            DirectoryServiceKind::Yp => "yp",
            DirectoryServiceKind::Ldap => "ldap",
        }
    }
}

pub struct DirectoryServiceLookupModuleFactory {
    kind: DirectoryServiceKind,
}

impl DirectoryServiceLookupModuleFactory {
    pub fn new(kind: DirectoryServiceKind) -> Self {
        DirectoryServiceLookupModuleFactory { kind }
    }
}

impl LookupModuleFactory for DirectoryServiceLookupModuleFactory {
    fn source_type(&self) -> &str {
        self.kind.source_type()
    }

    fn open(
        &self,
        _format: &str,
        argv: &[String],
    ) -> Result<Option<Box<dyn LookupModule>>, LookupError> {
        Ok(Some(Box::new(DirectoryServiceLookupModule {
            kind: self.kind,
            argv: argv.to_vec(),
        })))
    }
}

pub struct DirectoryServiceLookupModule {
    kind: DirectoryServiceKind,
    argv: Vec<String>,
}

impl LookupModule for DirectoryServiceLookupModule {
    fn read_master(&self, _master: &MasterMap, _age: Age) -> Result<NssStatus, LookupError> {
        tracing::warn!(kind = self.kind.source_type(), "directory-service stub does not support read_master");
        Ok(NssStatus::Unavail)
    }

    fn read_map(&self, _cache: &MapentCache, _age: Age) -> Result<NssStatus, LookupError> {
        tracing::debug!(
            kind = self.kind.source_type(),
            argv = ?self.argv,
            "directory-service stub: read_map always unavailable, matching a point-query backend"
        );
        Ok(NssStatus::Unavail)
    }

    fn mount(&self, _cache: &MapentCache, key: &str, _age: Age) -> Result<NssStatus, LookupError> {
        tracing::warn!(
            kind = self.kind.source_type(),
            %key,
            "directory-service stub: no resolver linked, reporting unavailable"
        );
        Ok(NssStatus::Unavail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_always_reports_unavail() {
        let module = DirectoryServiceLookupModule {
            kind: DirectoryServiceKind::Hesiod,
            argv: vec!["filsys".to_string()],
        };
        let cache = MapentCache::new();
        assert_eq!(module.read_map(&cache, 1).unwrap(), NssStatus::Unavail);
        assert_eq!(module.mount(&cache, "k", 1).unwrap(), NssStatus::Unavail);
    }

    #[test]
    fn factory_reports_its_configured_source_type() {
        let factory = DirectoryServiceLookupModuleFactory::new(DirectoryServiceKind::Nisplus);
        assert_eq!(factory.source_type(), "nisplus");
    }
}

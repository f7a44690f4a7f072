//! The pluggable lookup-module contract (spec §4.B).
//!
//! A lookup module is a source-type-agnostic capability: file maps,
//! directory-service maps and hostname tables all implement the same four
//! operations. The core only ever talks to a `dyn LookupModule`; concrete
//! backends live in `automount-lookup`.

use crate::cache::MapentCache;
use crate::error::{LookupError, NssStatus};
use crate::master::MasterMap;
use crate::time::Age;

/// One open instance of a source-type backend (spec §4.B).
///
/// Implementations must be re-entrant across `AutomountPoint`s: the same
/// `LookupModule` can be asked to `read_map` several different caches
/// concurrently (e.g. a shared `ldap` instance backing several indirect
/// mounts).
pub trait LookupModule: Send + Sync {
    /// Populates the master registry from this source.
    fn read_master(&self, master: &MasterMap, age: Age) -> Result<NssStatus, LookupError>;

    /// Populates `cache` from this source's map.
    fn read_map(&self, cache: &MapentCache, age: Age) -> Result<NssStatus, LookupError>;

    /// On-demand resolution of a single key, writing the result (or a
    /// negative-cache marker) into `cache`.
    fn mount(&self, cache: &MapentCache, key: &str, age: Age) -> Result<NssStatus, LookupError>;
}

/// Opens a concrete lookup module by logical type (spec §4.B `open`).
///
/// `automount-lookup` registers its backends by implementing this trait
/// once per source type and the daemon wires a small registry of them
/// together at startup; the core never needs to know the set of types
/// that exist.
pub trait LookupModuleFactory: Send + Sync {
    /// The logical source type this factory opens (`"file"`, `"yp"`, …).
    fn source_type(&self) -> &str;

    /// `open(type, format, argv) → handle | unavailable`. Returns `Ok(None)`
    /// for "unavailable" rather than an error, matching the NSS convention
    /// that an unreachable source is routine, not exceptional.
    fn open(&self, format: &str, argv: &[String]) -> Result<Option<Box<dyn LookupModule>>, LookupError>;
}

/// A minimal in-process registry of [`LookupModuleFactory`]s, keyed by
/// source type. The daemon binary populates one of these at startup from
/// whichever `automount-lookup` features are compiled in.
#[derive(Default)]
pub struct LookupModuleRegistry {
    factories: Vec<Box<dyn LookupModuleFactory>>,
}

impl LookupModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Box<dyn LookupModuleFactory>) {
        self.factories.push(factory);
    }

    pub fn open(
        &self,
        source_type: &str,
        format: &str,
        argv: &[String],
    ) -> Result<Option<Box<dyn LookupModule>>, LookupError> {
        match self.factories.iter().find(|f| f.source_type() == source_type) {
            Some(factory) => factory.open(format, argv),
            None => Err(LookupError::Unavailable(source_type.to_string())),
        }
    }
}

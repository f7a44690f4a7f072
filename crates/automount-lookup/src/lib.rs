//! Concrete lookup-module backends for `automount-core`'s
//! [`automount_core::lookup::LookupModule`] contract (spec §4.B).
//!
//! Each backend lives behind its own Cargo feature so a daemon build can
//! drop what it doesn't need, mirroring how the teacher workspace gates
//! cgroup backends behind `v1`/`v2`/`systemd` features.

#[cfg(feature = "file")]
pub mod file;

#[cfg(feature = "hosts")]
pub mod hosts;

#[cfg(feature = "directory-service")]
pub mod directory_service;

use automount_core::lookup::LookupModuleRegistry;
use automount_core::time::Age;

/// Builds a [`LookupModuleRegistry`] populated with every backend this
/// build was compiled with, using `default_timeout`/`default_ghost` for
/// any master entries the `file` backend creates without explicit
/// per-path overrides (spec §4.I).
pub fn default_registry(default_timeout: Age, default_ghost: bool) -> LookupModuleRegistry {
    let mut registry = LookupModuleRegistry::new();

    #[cfg(feature = "file")]
    registry.register(Box::new(file::FileLookupModuleFactory::new(default_timeout, default_ghost)));

    #[cfg(feature = "hosts")]
    registry.register(Box::new(hosts::HostsLookupModuleFactory));

    #[cfg(feature = "directory-service")]
    {
        use directory_service::{DirectoryServiceKind, DirectoryServiceLookupModuleFactory};
        registry.register(Box::new(DirectoryServiceLookupModuleFactory::new(DirectoryServiceKind::Nisplus)));
        registry.register(Box::new(DirectoryServiceLookupModuleFactory::new(DirectoryServiceKind::Hesiod)));
        registry.register(Box::new(DirectoryServiceLookupModuleFactory::new(DirectoryServiceKind::Yp)));
        registry.register(Box::new(DirectoryServiceLookupModuleFactory::new(DirectoryServiceKind::Ldap)));
    }

    registry
}

//! Control-plane library for an automount daemon.
//!
//! This crate owns the parts of the daemon that have nothing to do with
//! any particular kernel, filesystem, or directory service: the master
//! map registry, the mapent cache, the NSS lookup pipeline, and the
//! per-mount-point state machine. Everything that touches the outside
//! world — mount(2)/umount2(2), the kernel autofs channel, nsswitch.conf,
//! concrete lookup backends — is expressed as a trait in [`adapters`] and
//! [`lookup`], implemented by the `automountd` binary and
//! `automount-lookup` crate.

pub mod adapters;
pub mod automount_point;
pub mod cache;
pub mod config;
pub mod error;
pub mod lookup;
pub mod master;
pub mod nss;
pub mod signal;
pub mod state_machine;
pub mod time;

pub use automount_point::{AutomountPoint, DirectMountRegistrar, MountKind};
pub use cache::{CacheStatus, MapentCache};
pub use config::DaemonConfig;
pub use master::{MapSource, MasterEntry, MasterMap};
pub use state_machine::{State, WorkerCallbacks, WorkerEvent};
pub use time::Age;

//! Error kinds for the control plane, one enum per component boundary.
//!
//! These map 1:1 onto the rows of the error-handling table in the
//! specification: allocation failure has no variant (the allocator aborts
//! the process instead), and lock failure has no variant either (a
//! poisoned lock is treated as fatal and aborts at the call site rather
//! than being threaded through a `Result`).

use thiserror::Error;

/// Errors raised while mutating or querying a [`crate::cache::MapentCache`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("key {0:?} exceeds KEY_MAX_LEN")]
    KeyTooLong(String),
    #[error("entry for key {0:?} exceeds MAPENT_MAX_LEN")]
    EntryTooLong(String),
}

/// Status returned by a lookup module, matching the NSS status convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NssStatus {
    Success,
    NotFound,
    Unavail,
    TryAgain,
}

impl NssStatus {
    pub const ALL: [NssStatus; 4] = [
        NssStatus::Success,
        NssStatus::NotFound,
        NssStatus::Unavail,
        NssStatus::TryAgain,
    ];
}

/// Errors a lookup module can surface beyond a plain [`NssStatus`].
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("lookup module unavailable: {0}")]
    Unavailable(String),
    #[error("include cycle or depth exceeded in {0}")]
    IncludeCycle(String),
    #[error("map entry rejected by parser: {0}")]
    ParseRejected(String),
    #[error("mount helper failed: {0}")]
    MountHelperFailed(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Errors surfaced while running the NSS source traversal.
#[derive(Debug, Error)]
pub enum NssError {
    #[error("no sources found in nsswitch configuration")]
    NoSources,
    #[error("relative path invalid in files map name: {0}")]
    RelativeFilesPath(String),
    #[error(transparent)]
    Lookup(#[from] LookupError),
}

/// Errors surfaced by the master-map registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("a master entry for path {0:?} already exists")]
    DuplicatePath(String),
    #[error("a map source {0:?} duplicates an existing (type, format, argv) tuple")]
    DuplicateSource(String),
    #[error("no master entry for path {0:?}")]
    NotFound(String),
    #[error("failed to start worker thread for {0:?}: {1}")]
    WorkerSpawn(String, std::io::Error),
    #[error(transparent)]
    Nss(#[from] NssError),
}

/// Errors surfaced by the mount-point state machine.
#[derive(Debug, Error)]
pub enum StateMachineError {
    #[error("illegal transition from {from:?} to {to:?}")]
    IllegalTransition { from: crate::state_machine::State, to: crate::state_machine::State },
    #[error("worker channel disconnected")]
    ChannelClosed,
}

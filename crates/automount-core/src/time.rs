//! Age/epoch bookkeeping.
//!
//! The original daemon threads a single `time_t now` (or `time_t age`)
//! through nearly every call instead of reaching for the clock internally;
//! that makes every cache and registry decision a pure function of its
//! inputs and trivially testable without sleeping. We keep that shape: an
//! [`Age`] is just a monotonically non-decreasing counter supplied by the
//! caller (the daemon's main loop bumps it once per master-map re-read or
//! once per second for the expire timer; tests bump it by hand).

/// A monotonically non-decreasing stamp. Comparisons are the only thing
/// that matters — callers are free to seed it from `SystemTime`,
/// `Instant`, or a plain counter.
pub type Age = u64;

/// Default seconds an automount point waits before expiring an idle mount,
/// overridden by the `DEFAULT_TIMEOUT` environment variable (spec §6).
pub const DEFAULT_TIMEOUT: Age = 300;

/// Divides `exp_timeout` to get how often the expire timer fires.
pub const CHECK_RATIO: Age = 4;

/// How long a failed parse suppresses further resolution attempts for a key.
pub const NEGATIVE_TIMEOUT: Age = 60;

/// Maximum depth of nested `+name` map inclusions before it's treated as a
/// cycle.
pub const MAX_INCLUDE_DEPTH: u32 = 16;

/// Maximum length of a map key, in bytes.
pub const KEY_MAX_LEN: usize = 2048;

/// Maximum length of a map entry's raw text, in bytes.
pub const MAPENT_MAX_LEN: usize = 16384;

/// `ceil(timeout / CHECK_RATIO)`, matching the original's
/// `exp_runfreq` computation.
pub fn check_period(timeout: Age) -> Age {
    timeout.div_ceil(CHECK_RATIO)
}

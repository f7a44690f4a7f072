//! Daemon-wide configuration sourced from the environment (spec §6
//! "Environment").

use std::path::PathBuf;

use crate::time::{Age, DEFAULT_TIMEOUT};

/// Parsed configuration; construct with [`DaemonConfig::from_env`] in
/// `automountd`, or directly in tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonConfig {
    pub default_timeout: Age,
    pub browse_mode: bool,
    /// Where to read nsswitch source lists from. Overridable so tests can
    /// point at a fixture instead of `/etc/nsswitch.conf`.
    pub nsswitch_path: PathBuf,
    /// The nsswitch database name this daemon's sources are configured
    /// under.
    pub nsswitch_database: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        DaemonConfig {
            default_timeout: DEFAULT_TIMEOUT,
            browse_mode: true,
            nsswitch_path: PathBuf::from("/etc/nsswitch.conf"),
            nsswitch_database: "automount".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Reads `DEFAULT_TIMEOUT` and `DEFAULT_BROWSE_MODE` the way the
    /// original does: a non-numeric or absent `DEFAULT_TIMEOUT` falls
    /// back to the compiled-in default, and `DEFAULT_BROWSE_MODE` only
    /// disables ghosting for `"0"` or `"no"` (case-insensitive); anything
    /// else (including unset) leaves browsing enabled. `NSSWITCH_PATH` is
    /// not part of the original environment table; it exists purely as a
    /// test seam (spec §4.I supplement).
    pub fn from_env() -> Self {
        let mut config = DaemonConfig::default();
        if let Ok(raw) = std::env::var("DEFAULT_TIMEOUT") {
            if let Ok(parsed) = raw.parse::<Age>() {
                config.default_timeout = parsed;
            }
        }
        if let Ok(raw) = std::env::var("DEFAULT_BROWSE_MODE") {
            let lowered = raw.to_ascii_lowercase();
            if lowered == "0" || lowered == "no" {
                config.browse_mode = false;
            }
        }
        if let Ok(raw) = std::env::var("NSSWITCH_PATH") {
            config.nsswitch_path = PathBuf::from(raw);
        }
        config
    }
}

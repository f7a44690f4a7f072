//! Logging setup (spec.md §4.H supplement). Replaces the original's
//! `logopt`-gated `debug()`/`info()`/`warn()`/`crit()` macros with a
//! `tracing-subscriber` JSON formatter whose level follows `-v`/`-vv` unless
//! `RUST_LOG` is set, in which case the environment wins.

use tracing_subscriber::EnvFilter;

pub fn init(verbosity: u8) {
    let default_level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).json().init();
}

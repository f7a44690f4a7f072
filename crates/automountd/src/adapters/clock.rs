//! [`Clock`] adapter backed by the wall-clock epoch (spec §3 "Age stamps").

use std::time::{SystemTime, UNIX_EPOCH};

use automount_core::adapters::Clock;
use automount_core::time::Age;

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Age {
        SystemTime::now().duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
    }
}

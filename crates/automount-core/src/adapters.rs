//! External adapter contracts (spec §4.G). The core never talks to a
//! kernel device node, spawns `mount(8)`, or reads `/etc/nsswitch.conf`
//! itself — it only calls through these traits, which `automountd`
//! implements concretely.

use crate::nss::NssSource;
use crate::time::Age;

/// The kernel autofs channel: an opaque pair of endpoints the core reads
/// `(token, path-under-root)` requests from and writes `(token, errno)`
/// responses to (spec §4.G).
pub trait KernelChannel: Send + Sync {
    /// Blocks until a request is available, or returns `Ok(None)` if the
    /// channel was closed (daemon shutting down).
    fn recv(&self) -> std::io::Result<Option<(u64, String)>>;
    /// `0` for success, an `errno` value otherwise.
    fn respond(&self, token: u64, status: i32) -> std::io::Result<()>;
}

/// `mount(target, source, type, options) → status` (spec §4.G).
pub trait MountExecutor: Send + Sync {
    fn mount(&self, target: &str, source: &str, fstype: &str, options: &str) -> std::io::Result<()>;
    /// `umount2`, `lazy` selecting `MNT_DETACH` (spec §4.E "SHUTDOWN_FORCE").
    fn unmount(&self, target: &str, lazy: bool) -> std::io::Result<()>;
}

/// `parse_mount(ap, key, text, ctx) → status` (spec §4.G). The core hands
/// over raw Mapent text and gets back a go/no-go outcome plus the pieces
/// a [`MountExecutor`] needs.
pub trait Parser: Send + Sync {
    fn parse_mount(&self, key: &str, text: &str) -> Result<ParsedMount, ParseRejected>;
}

pub struct ParsedMount {
    pub source: String,
    pub fstype: String,
    pub options: String,
}

/// Returned by a [`Parser`] when `text` is malformed; the caller marks
/// the Mapent negative (spec §4.A "Negative caching", §7).
#[derive(Debug, Clone)]
pub struct ParseRejected(pub String);

/// `parse() → list<NssSource>`, a pure function over system configuration
/// (spec §4.G, §6 "Environment").
pub trait NsswitchReader: Send + Sync {
    fn parse(&self) -> std::io::Result<Vec<NssSource>>;
}

/// Supplies the current epoch. A trait rather than a bare function
/// pointer so it composes with `Arc<dyn ...>` the same way the other
/// adapters do; `automountd` backs it with a monotonic clock, tests back
/// it with a counter (spec §3 "Age stamps").
pub trait Clock: Send + Sync {
    fn now(&self) -> Age;
}

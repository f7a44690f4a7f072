//! Concrete implementations of `automount_core::adapters`' external
//! adapter traits (spec §4.G): the things the core deliberately does not
//! know how to do itself.

pub mod clock;
pub mod kernel_channel;
pub mod mount_executor;
pub mod nsswitch;
pub mod parser;

pub use clock::SystemClock;
pub use kernel_channel::NullKernelChannel;
pub use mount_executor::LinuxMountExecutor;
pub use nsswitch::FileNsswitchReader;
pub use parser::SunMapParser;

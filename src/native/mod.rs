//! Native port handles and the platform configuration translator.
//!
//! One abstract [`PortSettings`](crate::PortSettings) record is translated
//! into two structurally different native control blocks: termios on POSIX
//! targets and DCB/COMMTIMEOUTS on Windows. Both branches must produce the
//! same externally observable read blocking, timeout, and framing behavior.
//!
//! The [`NativePort`] trait is the seam: the lifecycle manager owns a boxed
//! implementation, the real one is selected at build time, and
//! [`MockPort`](mock::MockPort) stands in for hardware in tests.

pub mod mock;

#[cfg(unix)]
pub mod posix;

#[cfg(windows)]
pub mod windows;

use crate::error::Result;
use crate::settings::PortSettings;

#[cfg(unix)]
pub use posix::PosixPort as SystemPort;

#[cfg(windows)]
pub use windows::ComPort as SystemPort;

/// Operations on an open native descriptor or handle.
///
/// Reads never block: `read` returns `Ok(0)` when no data is available, and
/// `readable` is a zero-timeout readiness probe. The caller serializes all
/// access through the port lock.
pub trait NativePort: Send + std::fmt::Debug {
    /// Read up to `buf.len()` bytes. `Ok(0)` means no data was available.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Write bytes, returning the count accepted by the OS. May be less
    /// than `buf.len()`; this layer never retries partial writes.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Probe whether the descriptor has data available, without blocking.
    fn readable(&mut self) -> Result<bool>;

    /// Translate the abstract settings into the native control block and
    /// commit it immediately.
    fn apply_settings(&mut self, settings: &PortSettings) -> Result<()>;
}

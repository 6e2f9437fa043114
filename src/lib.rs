//! Cross-platform serial port handle with async read streams.
//!
//! This crate opens a serial device path, negotiates line configuration
//! (baud rate, parity, data bits, stop bits, flow control, read
//! timeout/threshold), and exposes byte-oriented writes plus three derived
//! read views over one shared read pipeline: raw chunks, individual bytes,
//! and newline-delimited UTF-8 lines.
//!
//! # Modules
//!
//! - `error`: the [`SerialError`] taxonomy
//! - `settings`: [`BaudRate`], [`PortSettings`], and the other line
//!   configuration value types
//! - `native`: the per-platform control-block translators (termios on
//!   POSIX, DCB/COMMTIMEOUTS on Windows) and the mock port for tests
//! - `pipeline`: the read-distribution pipeline and its stream handles
//! - `port`: the [`SerialPort`] lifecycle manager and write path
//!
//! # Concurrency model
//!
//! One background dispatcher per open-with-receive session is the sole
//! producer of chunks; derived byte/line streams are one-time fan-outs
//! computed by consumer tasks. A single exclusive lock guards every state
//! transition and every touch of the native descriptor. Closing the port
//! cancels the dispatcher and lets channel closure cascade through the
//! derived streams; values published before the close are still delivered.

pub mod error;
pub mod native;
pub mod pipeline;
pub mod port;
pub mod settings;

// Re-export commonly used types for convenience
pub use error::{Result, SerialError};
pub use native::mock::MockPort;
pub use native::NativePort;
pub use pipeline::{ByteStream, ChunkStream, LineStream, PortStream, UTF8_DECODE_FAILURE};
pub use port::SerialPort;
pub use settings::{BaudRate, DataBits, Parity, PortMode, PortSettings, StopBits};

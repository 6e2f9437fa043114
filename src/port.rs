//! Port lifecycle manager and write path.
//!
//! A [`SerialPort`] owns the native descriptor behind a single exclusive
//! lock. Every state transition (open, configure, close) and every accessor
//! that touches the descriptor — including the per-chunk read inside the
//! pipeline dispatcher — goes through that lock, so no caller can observe a
//! half-transitioned state and no close races an in-flight read.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::info;

use crate::error::{Result, SerialError};
use crate::native::NativePort;
#[cfg(any(unix, windows))]
use crate::native::SystemPort;
use crate::pipeline::{ByteStream, ChunkStream, LineStream, ReadPipeline};
use crate::settings::{PortMode, PortSettings};

/// Shared mutable state: the native handle exists iff the port is open,
/// the pipeline iff the session has receive capability.
pub(crate) struct Inner {
    pub(crate) native: Option<Box<dyn NativePort>>,
    pub(crate) pipeline: Option<ReadPipeline>,
}

/// A handle to a serial communication endpoint.
///
/// The device path is stored verbatim and not validated until
/// [`open`](Self::open). Closing is idempotent and also happens on drop.
///
/// # Example
///
/// ```no_run
/// use serial_stream::{PortMode, PortSettings, SerialPort};
///
/// # async fn example() -> serial_stream::Result<()> {
/// let port = SerialPort::new("/dev/ttyUSB0");
/// port.open(PortMode::ReceiveAndTransmit)?;
/// port.apply_settings(&PortSettings::default())?;
///
/// let lines = port.line_stream()?;
/// port.write_str("AT\n")?;
/// if let Some(reply) = lines.next().await {
///     println!("{reply}");
/// }
/// port.close();
/// # Ok(())
/// # }
/// ```
pub struct SerialPort {
    path: PathBuf,
    inner: Arc<Mutex<Inner>>,
}

impl SerialPort {
    /// Create a handle for the device at `path` without touching it.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: Arc::new(Mutex::new(Inner {
                native: None,
                pipeline: None,
            })),
        }
    }

    /// The device path this handle addresses.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open the device with the given direction mode.
    ///
    /// When `mode` includes receive, the read-distribution pipeline is
    /// activated, which requires a running Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`SerialError::InvalidPath`] if the path is empty (checked before
    ///   any native call)
    /// - [`SerialError::AlreadyOpen`] if the port is already open
    /// - [`SerialError::FailedToOpen`] if the native open call fails
    #[cfg(any(unix, windows))]
    pub fn open(&self, mode: PortMode) -> Result<()> {
        let mut guard = self.inner.lock();
        if self.path.as_os_str().is_empty() {
            return Err(SerialError::InvalidPath);
        }
        if guard.native.is_some() {
            return Err(SerialError::AlreadyOpen);
        }

        let native = SystemPort::open(&self.path, mode)?;
        self.install(&mut guard, Box::new(native), mode);
        Ok(())
    }

    /// Open around an already-constructed native port.
    ///
    /// This is the dependency-injection seam used to run the full lifecycle
    /// and pipeline against [`MockPort`](crate::native::mock::MockPort) in
    /// tests. The same state checks as [`open`](Self::open) apply.
    pub fn open_with(&self, native: Box<dyn NativePort>, mode: PortMode) -> Result<()> {
        let mut guard = self.inner.lock();
        if self.path.as_os_str().is_empty() {
            return Err(SerialError::InvalidPath);
        }
        if guard.native.is_some() {
            return Err(SerialError::AlreadyOpen);
        }

        self.install(&mut guard, native, mode);
        Ok(())
    }

    fn install(&self, guard: &mut Inner, native: Box<dyn NativePort>, mode: PortMode) {
        guard.native = Some(native);
        if mode.receives() {
            guard.pipeline = Some(ReadPipeline::activate(Arc::clone(&self.inner)));
        }
        info!(path = %self.path.display(), ?mode, "port opened");
    }

    /// Close the port: cancel the readiness registration, discard derived
    /// streams, and release the native handle. Idempotent; closing a port
    /// that was never opened is a no-op.
    pub fn close(&self) {
        let mut guard = self.inner.lock();
        if let Some(pipeline) = guard.pipeline.take() {
            pipeline.cancel();
        }
        if guard.native.take().is_some() {
            info!(path = %self.path.display(), "port closed");
        }
    }

    /// Whether the port is currently open.
    pub fn is_open(&self) -> bool {
        self.inner.lock().native.is_some()
    }

    /// Translate and commit line settings on the open port.
    ///
    /// # Errors
    ///
    /// - [`SerialError::MustBeOpen`] if the port is closed
    /// - [`SerialError::InvalidPort`] if the native configuration call
    ///   rejects the settings
    pub fn apply_settings(&self, settings: &PortSettings) -> Result<()> {
        let mut guard = self.inner.lock();
        guard
            .native
            .as_mut()
            .ok_or(SerialError::MustBeOpen)?
            .apply_settings(settings)
    }

    /// Write raw bytes, returning how many the OS accepted. Partial writes
    /// are returned as-is and never retried here.
    pub fn write_bytes(&self, data: &[u8]) -> Result<usize> {
        let mut guard = self.inner.lock();
        guard
            .native
            .as_mut()
            .ok_or(SerialError::MustBeOpen)?
            .write(data)
    }

    /// Write a string as its UTF-8 bytes.
    pub fn write_str(&self, data: &str) -> Result<usize> {
        self.write_bytes(data.as_bytes())
    }

    /// Write a single character as its UTF-8 bytes.
    pub fn write_char(&self, ch: char) -> Result<usize> {
        let mut buf = [0u8; 4];
        self.write_bytes(ch.encode_utf8(&mut buf).as_bytes())
    }

    /// The long-lived raw chunk stream for this open session.
    ///
    /// Fails with [`SerialError::MustBeOpen`] unless the port is open with
    /// receive capability.
    pub fn raw_chunks(&self) -> Result<ChunkStream> {
        let guard = self.inner.lock();
        Ok(guard
            .pipeline
            .as_ref()
            .ok_or(SerialError::MustBeOpen)?
            .chunks())
    }

    /// The derived byte stream; created on first call, cached afterwards.
    pub fn byte_stream(&self) -> Result<ByteStream> {
        let mut guard = self.inner.lock();
        Ok(guard
            .pipeline
            .as_mut()
            .ok_or(SerialError::MustBeOpen)?
            .bytes())
    }

    /// The derived line stream; created on first call, cached afterwards.
    pub fn line_stream(&self) -> Result<LineStream> {
        let mut guard = self.inner.lock();
        Ok(guard
            .pipeline
            .as_mut()
            .ok_or(SerialError::MustBeOpen)?
            .lines())
    }
}

impl Drop for SerialPort {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for SerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SerialPort")
            .field("path", &self.path)
            .field("open", &self.is_open())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::native::mock::MockPort;
    use crate::settings::{BaudRate, PortSettings};
    use pretty_assertions::assert_eq;

    fn mock_port(path: &str) -> (SerialPort, MockPort) {
        (SerialPort::new(path), MockPort::new())
    }

    #[tokio::test]
    async fn test_open_empty_path_fails() {
        let (port, mock) = mock_port("");
        let err = port
            .open_with(Box::new(mock), PortMode::ReceiveAndTransmit)
            .unwrap_err();
        assert!(matches!(err, SerialError::InvalidPath));
        assert!(!port.is_open());
    }

    #[tokio::test]
    async fn test_double_open_fails() {
        let (port, mock) = mock_port("MOCK0");
        port.open_with(Box::new(mock.clone()), PortMode::Transmit)
            .unwrap();
        let err = port
            .open_with(Box::new(mock), PortMode::Transmit)
            .unwrap_err();
        assert!(matches!(err, SerialError::AlreadyOpen));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let (port, mock) = mock_port("MOCK0");
        port.close(); // never opened

        port.open_with(Box::new(mock), PortMode::ReceiveAndTransmit)
            .unwrap();
        assert!(port.is_open());

        port.close();
        assert!(!port.is_open());
        port.close(); // already closed
        assert!(!port.is_open());
    }

    #[tokio::test]
    async fn test_closed_port_rejects_operations() {
        let port = SerialPort::new("MOCK0");

        assert!(matches!(
            port.apply_settings(&PortSettings::default()),
            Err(SerialError::MustBeOpen)
        ));
        assert!(matches!(
            port.write_bytes(b"hi"),
            Err(SerialError::MustBeOpen)
        ));
        assert!(matches!(port.raw_chunks(), Err(SerialError::MustBeOpen)));
        assert!(matches!(port.byte_stream(), Err(SerialError::MustBeOpen)));
        assert!(matches!(port.line_stream(), Err(SerialError::MustBeOpen)));
    }

    #[tokio::test]
    async fn test_transmit_only_session_has_no_streams() {
        let (port, mock) = mock_port("MOCK0");
        port.open_with(Box::new(mock), PortMode::Transmit).unwrap();

        assert!(matches!(port.raw_chunks(), Err(SerialError::MustBeOpen)));
        assert!(matches!(port.byte_stream(), Err(SerialError::MustBeOpen)));
        assert!(matches!(port.line_stream(), Err(SerialError::MustBeOpen)));
        assert_eq!(port.write_bytes(b"out").unwrap(), 3);
    }

    #[tokio::test]
    async fn test_partial_write_is_reported_not_raised() {
        let (port, mock) = mock_port("MOCK0");
        mock.set_write_limit(2);
        port.open_with(Box::new(mock.clone()), PortMode::Transmit)
            .unwrap();

        assert_eq!(port.write_bytes(b"abcdef").unwrap(), 2);
        assert_eq!(mock.write_log(), vec![b"ab".to_vec()]);
    }

    #[tokio::test]
    async fn test_string_and_char_writes() {
        let (port, mock) = mock_port("MOCK0");
        port.open_with(Box::new(mock.clone()), PortMode::Transmit)
            .unwrap();

        assert_eq!(port.write_str("hé").unwrap(), 3);
        assert_eq!(port.write_char('√').unwrap(), 3);
        assert_eq!(
            mock.write_log(),
            vec!["hé".as_bytes().to_vec(), "√".as_bytes().to_vec()]
        );
    }

    #[tokio::test]
    async fn test_settings_reach_the_translator() {
        let (port, mock) = mock_port("MOCK0");
        port.open_with(Box::new(mock.clone()), PortMode::ReceiveAndTransmit)
            .unwrap();

        let settings = PortSettings {
            rx_baud: BaudRate::Baud115200,
            tx_baud: BaudRate::Baud115200,
            ..PortSettings::default()
        };
        port.apply_settings(&settings).unwrap();
        assert_eq!(mock.applied_settings(), vec![settings]);
    }

    #[tokio::test]
    async fn test_settings_do_not_survive_reopen() {
        let (port, mock) = mock_port("MOCK0");
        port.open_with(Box::new(mock.clone()), PortMode::ReceiveAndTransmit)
            .unwrap();
        port.apply_settings(&PortSettings::default()).unwrap();
        port.close();

        let fresh = MockPort::new();
        port.open_with(Box::new(fresh.clone()), PortMode::ReceiveAndTransmit)
            .unwrap();
        assert!(fresh.applied_settings().is_empty());
        port.close();
    }
}

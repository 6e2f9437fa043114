//! Error taxonomy for serial port operations.
//!
//! Every failure surfaced by this crate is a [`SerialError`]. Transient
//! zero-length reads inside the read-distribution pipeline are defined as
//! "no data yet" and are deliberately not represented here.

use thiserror::Error;

/// A specialized `Result` type for serial port operations.
pub type Result<T> = std::result::Result<T, SerialError>;

/// Errors that can occur while opening, configuring, or using a serial port.
#[derive(Debug, Error)]
pub enum SerialError {
    /// The device path is empty. Raised before any native call is attempted.
    #[error("device path is empty")]
    InvalidPath,

    /// Attempted to open a port that is already open.
    #[error("port is already open")]
    AlreadyOpen,

    /// The operation requires an open port, but the port is closed.
    #[error("operation requires an open port")]
    MustBeOpen,

    /// The native open call reported an error.
    #[error("failed to open device: {0}")]
    FailedToOpen(#[source] std::io::Error),

    /// The native configuration call rejected the settings, or a numeric
    /// value does not map to a recognized line parameter.
    #[error("invalid port configuration: {0}")]
    InvalidPort(String),

    /// Neither receive nor transmit direction was requested at open.
    #[error("port must be opened for receive, transmit, or both")]
    MustReceiveOrTransmit,

    /// The payload cannot be represented as UTF-8 bytes.
    #[error("payload is not valid UTF-8")]
    InvalidEncoding,

    /// The device link was lost while the port was open.
    #[error("device is no longer connected")]
    DeviceNotConnected,

    /// Another I/O error occurred during a native read or write.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl SerialError {
    /// Create an `InvalidPort` error from a message.
    pub fn invalid_port(message: impl Into<String>) -> Self {
        Self::InvalidPort(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(SerialError::InvalidPath.to_string(), "device path is empty");
        assert_eq!(SerialError::AlreadyOpen.to_string(), "port is already open");
        assert_eq!(
            SerialError::MustBeOpen.to_string(),
            "operation requires an open port"
        );

        let err = SerialError::invalid_port("unsupported baud rate: 12345");
        assert_eq!(
            err.to_string(),
            "invalid port configuration: unsupported baud rate: 12345"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied");
        let err: SerialError = io.into();
        assert!(matches!(err, SerialError::Io(_)));
        assert!(err.to_string().contains("denied"));
    }
}

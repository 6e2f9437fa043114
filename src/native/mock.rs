//! Mock native port for testing.
//!
//! Simulates a serial device without hardware: incoming bytes are scripted
//! through a shared queue, writes are logged for inspection, and partial
//! writes and read failures can be injected. Cloning a `MockPort` yields a
//! handle over the same state, so a test can keep feeding data after the
//! port has been handed to a [`SerialPort`](crate::SerialPort).

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use super::NativePort;
use crate::error::{Result, SerialError};
use crate::settings::PortSettings;

#[derive(Debug, Default)]
struct MockState {
    /// Bytes returned by subsequent reads.
    read_queue: VecDeque<u8>,
    /// Every buffer passed to `write`, in order.
    write_log: Vec<Vec<u8>>,
    /// Cap on how many bytes a single write accepts.
    write_limit: Option<usize>,
    /// Fail the next read with an I/O error.
    fail_next_read: bool,
    /// Settings records applied through the translator seam.
    applied_settings: Vec<PortSettings>,
}

/// Scriptable in-memory stand-in for a native port.
#[derive(Clone, Default)]
pub struct MockPort {
    state: Arc<Mutex<MockState>>,
}

impl MockPort {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes to the incoming queue, as if the device had sent them.
    pub fn push_incoming(&self, data: &[u8]) {
        self.state.lock().read_queue.extend(data);
    }

    /// Cap the number of bytes a single write call accepts.
    pub fn set_write_limit(&self, limit: usize) {
        self.state.lock().write_limit = Some(limit);
    }

    /// Make the next read fail with an I/O error.
    pub fn fail_next_read(&self) {
        self.state.lock().fail_next_read = true;
    }

    /// All buffers written so far.
    pub fn write_log(&self) -> Vec<Vec<u8>> {
        self.state.lock().write_log.clone()
    }

    /// Settings applied so far, oldest first.
    pub fn applied_settings(&self) -> Vec<PortSettings> {
        self.state.lock().applied_settings.clone()
    }

    /// Bytes still queued for reading.
    pub fn pending_bytes(&self) -> usize {
        self.state.lock().read_queue.len()
    }
}

impl NativePort for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.state.lock();

        if state.fail_next_read {
            state.fail_next_read = false;
            return Err(SerialError::Io(std::io::Error::other(
                "injected read failure",
            )));
        }

        let mut read = 0;
        for slot in buf.iter_mut() {
            match state.read_queue.pop_front() {
                Some(byte) => {
                    *slot = byte;
                    read += 1;
                }
                None => break,
            }
        }
        Ok(read)
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let mut state = self.state.lock();
        let accepted = state.write_limit.map_or(buf.len(), |limit| buf.len().min(limit));
        state.write_log.push(buf[..accepted].to_vec());
        Ok(accepted)
    }

    fn readable(&mut self) -> Result<bool> {
        let state = self.state.lock();
        Ok(state.fail_next_read || !state.read_queue.is_empty())
    }

    fn apply_settings(&mut self, settings: &PortSettings) -> Result<()> {
        self.state.lock().applied_settings.push(*settings);
        Ok(())
    }
}

impl std::fmt::Debug for MockPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockPort")
            .field("pending_bytes", &self.pending_bytes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_push_and_read() {
        let mock = MockPort::new();
        mock.push_incoming(b"Hello");

        let mut handle = mock.clone();
        let mut buf = [0u8; 10];
        let n = handle.read(&mut buf).unwrap();
        assert_eq!(n, 5);
        assert_eq!(&buf[..n], b"Hello");
    }

    #[test]
    fn test_empty_read_returns_zero() {
        let mut mock = MockPort::new();
        let mut buf = [0u8; 4];
        assert_eq!(mock.read(&mut buf).unwrap(), 0);
        assert!(!mock.readable().unwrap());
    }

    #[test]
    fn test_write_logging_and_limit() {
        let mock = MockPort::new();
        let mut handle = mock.clone();

        assert_eq!(handle.write(b"abcdef").unwrap(), 6);

        mock.set_write_limit(2);
        assert_eq!(handle.write(b"abcdef").unwrap(), 2);

        let log = mock.write_log();
        assert_eq!(log, vec![b"abcdef".to_vec(), b"ab".to_vec()]);
    }

    #[test]
    fn test_injected_read_failure_is_one_shot() {
        let mut mock = MockPort::new();
        mock.fail_next_read();
        mock.push_incoming(b"x");

        let mut buf = [0u8; 1];
        assert!(mock.read(&mut buf).is_err());
        assert_eq!(mock.read(&mut buf).unwrap(), 1);
    }

    #[test]
    fn test_settings_are_recorded() {
        let mock = MockPort::new();
        let mut handle = mock.clone();
        handle.apply_settings(&PortSettings::default()).unwrap();
        assert_eq!(mock.applied_settings(), vec![PortSettings::default()]);
    }
}

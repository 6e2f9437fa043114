//! Read-distribution pipeline.
//!
//! One dispatcher task per open-with-receive session multiplexes the native
//! descriptor into the derived consumer views. On every readiness signal it
//! performs exactly one bounded read under the port lock and publishes the
//! result as a chunk; zero-length and transiently failing reads publish
//! nothing and are not errors. The byte and line streams are lazy one-time
//! fan-outs of the chunk stream and never read the device themselves.
//!
//! Closing the port cancels the dispatcher; channel closure then cascades
//! through the derived tasks, so every stream terminates after delivering
//! whatever was already published.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::Stream;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::port::Inner;

/// Upper bound on the bytes consumed by a single read.
pub const CHUNK_SIZE: usize = 1024;

/// How often the dispatcher probes the descriptor for readiness.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Emitted in place of a line whose bytes are not valid UTF-8. The line
/// stream stays alive across malformed framing instead of terminating.
pub const UTF8_DECODE_FAILURE: &str = "<utf-8 decode error>";

/// A single-subscriber sequence of values produced by the pipeline.
///
/// Clones share one underlying receiver: requesting the same stream kind
/// twice hands out handles over the identical stream rather than a second
/// independent reader, so values are never duplicated. Iterating one
/// logical stream from several handles concurrently is unsupported.
pub struct PortStream<T> {
    rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<T>>>,
}

/// Raw device chunks, one per read call.
pub type ChunkStream = PortStream<Vec<u8>>;

/// Individual bytes, flattened from the chunk stream in arrival order.
pub type ByteStream = PortStream<u8>;

/// UTF-8 lines delimited by `\n` (delimiter stripped).
pub type LineStream = PortStream<String>;

impl<T> Clone for PortStream<T> {
    fn clone(&self) -> Self {
        Self { rx: Arc::clone(&self.rx) }
    }
}

impl<T> std::fmt::Debug for PortStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortStream").finish_non_exhaustive()
    }
}

impl<T: Send + 'static> PortStream<T> {
    fn new(rx: mpsc::UnboundedReceiver<T>) -> Self {
        Self {
            rx: Arc::new(AsyncMutex::new(rx)),
        }
    }

    /// Wait for the next value. Returns `None` once the pipeline has been
    /// cancelled and all published values were delivered.
    pub async fn next(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Adapt this handle into a [`futures::Stream`].
    pub fn into_stream(self) -> impl Stream<Item = T> {
        futures::stream::unfold(self, |handle| async move {
            let value = handle.next().await?;
            Some((value, handle))
        })
    }
}

/// Pipeline state attached to an open receive-capable session.
///
/// The chunk stream exists from activation; the byte and line streams are
/// derived on first request and cached. Dropping the pipeline (on close)
/// only discards the cached handles; consumers holding clones keep
/// draining until the channels close.
pub(crate) struct ReadPipeline {
    chunks: ChunkStream,
    bytes: Option<ByteStream>,
    lines: Option<LineStream>,
    cancelled: Arc<AtomicBool>,
}

impl ReadPipeline {
    /// Register the dispatcher for a freshly opened session. Exactly one
    /// dispatcher exists per open session; reopening creates a new one.
    pub(crate) fn activate(inner: Arc<Mutex<Inner>>) -> Self {
        let cancelled = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch(inner, tx, Arc::clone(&cancelled)));
        Self {
            chunks: PortStream::new(rx),
            bytes: None,
            lines: None,
            cancelled,
        }
    }

    pub(crate) fn chunks(&self) -> ChunkStream {
        self.chunks.clone()
    }

    /// Derive (once) and return the byte stream.
    pub(crate) fn bytes(&mut self) -> ByteStream {
        if let Some(bytes) = &self.bytes {
            return bytes.clone();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let chunks = self.chunks.clone();
        tokio::spawn(async move {
            while let Some(chunk) = chunks.next().await {
                for byte in chunk {
                    if tx.send(byte).is_err() {
                        return;
                    }
                }
            }
            trace!("byte stream source terminated");
        });

        let stream = PortStream::new(rx);
        self.bytes = Some(stream.clone());
        stream
    }

    /// Derive (once) and return the line stream, built atop the byte
    /// stream.
    pub(crate) fn lines(&mut self) -> LineStream {
        if let Some(lines) = &self.lines {
            return lines.clone();
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let bytes = self.bytes();
        tokio::spawn(async move {
            let mut pending = Vec::new();
            while let Some(byte) = bytes.next().await {
                if byte != b'\n' {
                    pending.push(byte);
                    continue;
                }
                // Accumulation resets whether or not the decode succeeds.
                let line = match String::from_utf8(std::mem::take(&mut pending)) {
                    Ok(line) => line,
                    Err(err) => {
                        warn!(%err, "line was not valid UTF-8, emitting sentinel");
                        UTF8_DECODE_FAILURE.to_string()
                    }
                };
                if tx.send(line).is_err() {
                    return;
                }
            }
            trace!("line stream source terminated");
        });

        let stream = PortStream::new(rx);
        self.lines = Some(stream.clone());
        stream
    }

    /// Tear down the readiness registration. The dispatcher exits on its
    /// next tick, which closes the chunk channel and finalizes every
    /// derived stream.
    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }
}

/// Dispatcher loop: probe readiness, read one chunk under the port lock,
/// publish. Runs until cancelled, the port is gone, or every chunk
/// consumer has dropped.
async fn dispatch(
    inner: Arc<Mutex<Inner>>,
    tx: mpsc::UnboundedSender<Vec<u8>>,
    cancelled: Arc<AtomicBool>,
) {
    let mut interval = tokio::time::interval(POLL_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        interval.tick().await;
        if cancelled.load(Ordering::Acquire) {
            break;
        }

        // The lock spans the readiness probe and the read so a concurrent
        // close can never race an in-flight read. Never held across await.
        let chunk = {
            let mut guard = inner.lock();
            let Some(port) = guard.native.as_mut() else {
                break;
            };
            match port.readable() {
                Ok(true) => match port.read(&mut buf) {
                    Ok(n) if n > 0 => Some(buf[..n].to_vec()),
                    // No data yet; drop the signal without emitting.
                    Ok(_) => None,
                    Err(err) => {
                        warn!(%err, "dropping failed read");
                        None
                    }
                },
                Ok(false) => None,
                Err(err) => {
                    warn!(%err, "readiness probe failed");
                    None
                }
            }
        };

        if let Some(chunk) = chunk {
            trace!(len = chunk.len(), "publishing chunk");
            if tx.send(chunk).is_err() {
                break;
            }
        }
    }

    debug!("read dispatcher stopped");
}

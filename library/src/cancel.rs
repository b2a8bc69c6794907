use std::io::{ErrorKind, Read};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::Context;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};

/// How long a blocked caller waits on the worker before looking at the
/// token again.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

const CHUNK_SIZE: usize = 64 * 1024;

/// Chunks buffered between the worker and the reader.
const CHANNEL_DEPTH: usize = 4;

/// Lets another thread abort an update in progress. Clones share the same
/// flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Marker error placed inside the io::Error returned once a read is
/// cancelled, so callers can tell cancellation apart from a broken stream.
#[derive(Debug)]
pub struct Cancelled;

impl std::fmt::Display for Cancelled {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "operation cancelled")
    }
}

impl std::error::Error for Cancelled {}

enum Chunk {
    Data(Vec<u8>),
    Failed(std::io::Error),
    End,
}

/// A response body read on a worker thread.
///
/// A blocking request cannot be interrupted once it is waiting on the
/// socket, so the request and the body reads run on a separate thread and
/// hand their bytes over a channel. The reader waits on that channel in
/// short slices and gives up as soon as the token is cancelled. The
/// abandoned worker exits the next time its read returns, which also drops
/// the connection.
pub struct CancellableReader {
    chunks: Receiver<Chunk>,
    pending: Vec<u8>,
    position: usize,
    finished: bool,
    token: Option<CancellationToken>,
}

impl CancellableReader {
    /// Runs `open` (which sends the request) on a worker thread and waits
    /// for it to return a body. Fails with [`Cancelled`] if the token fires
    /// first.
    pub fn spawn<F>(open: F, token: Option<CancellationToken>) -> anyhow::Result<Self>
    where
        F: FnOnce() -> anyhow::Result<Box<dyn Read + Send>> + Send + 'static,
    {
        let (opened_tx, opened_rx) = bounded::<anyhow::Result<()>>(1);
        let (chunk_tx, chunk_rx) = bounded::<Chunk>(CHANNEL_DEPTH);

        thread::Builder::new()
            .name("mmdb-fetch".to_string())
            .spawn(move || {
                let mut body = match open() {
                    Ok(body) => body,
                    Err(e) => {
                        let _ = opened_tx.send(Err(e));
                        return;
                    }
                };
                if opened_tx.send(Ok(())).is_err() {
                    return;
                }
                let mut buf = vec![0u8; CHUNK_SIZE];
                loop {
                    let chunk = match body.read(&mut buf) {
                        Ok(0) => Chunk::End,
                        Ok(n) => Chunk::Data(buf[..n].to_vec()),
                        Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                        Err(e) => Chunk::Failed(e),
                    };
                    let last = !matches!(chunk, Chunk::Data(_));
                    // A send error means the reader was dropped (cancelled).
                    if chunk_tx.send(chunk).is_err() || last {
                        return;
                    }
                }
            })
            .context("Failed to spawn fetch thread")?;

        loop {
            if token.as_ref().is_some_and(|t| t.is_cancelled()) {
                return Err(anyhow::Error::new(Cancelled));
            }
            match opened_rx.recv_timeout(POLL_INTERVAL) {
                Ok(Ok(())) => break,
                Ok(Err(e)) => return Err(e),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    anyhow::bail!("Fetch thread exited before sending a response")
                }
            }
        }

        Ok(Self {
            chunks: chunk_rx,
            pending: Vec::new(),
            position: 0,
            finished: false,
            token,
        })
    }

    fn is_cancelled(&self) -> bool {
        self.token.as_ref().is_some_and(|t| t.is_cancelled())
    }
}

impl Read for CancellableReader {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        loop {
            if self.is_cancelled() {
                return Err(std::io::Error::new(ErrorKind::Other, Cancelled));
            }
            if self.position < self.pending.len() {
                let available = &self.pending[self.position..];
                let n = available.len().min(buf.len());
                buf[..n].copy_from_slice(&available[..n]);
                self.position += n;
                return Ok(n);
            }
            if self.finished {
                return Ok(0);
            }
            match self.chunks.recv_timeout(POLL_INTERVAL) {
                Ok(Chunk::Data(data)) => {
                    self.pending = data;
                    self.position = 0;
                }
                Ok(Chunk::End) => self.finished = true,
                Ok(Chunk::Failed(e)) => {
                    self.finished = true;
                    return Err(e);
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    self.finished = true;
                    return Err(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        "fetch thread exited before the body ended",
                    ));
                }
            }
        }
    }
}

/// True if `error` is the one produced by a cancelled [`CancellableReader`],
/// however deeply the decoders wrapped it.
pub fn is_cancellation(error: &std::io::Error) -> bool {
    let mut source = error.get_ref().map(|e| e as &(dyn std::error::Error + 'static));
    while let Some(err) = source {
        if err.is::<Cancelled>() {
            return true;
        }
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            if let Some(inner) = io.get_ref() {
                source = Some(inner as &(dyn std::error::Error + 'static));
                continue;
            }
        }
        source = err.source();
    }
    false
}

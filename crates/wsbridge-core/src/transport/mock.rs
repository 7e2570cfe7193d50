//! In-memory adapter for tests and embedders.
//!
//! [`MockAdapter`] implements the full [`Adapter`] contract without a
//! network: bytes pushed through the paired [`MockClient`] come out of
//! `read`, and everything passed to `write` is recorded for inspection.

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};

use crate::adapter::{Adapter, HandshakeRequest};
use crate::error::TransportError;

type Chunk = Result<Vec<u8>, io::ErrorKind>;

/// State shared between the adapter and its client handle.
struct Shared {
    sender: StdMutex<Option<mpsc::UnboundedSender<Chunk>>>,
    written: StdMutex<Vec<u8>>,
    written_len: watch::Sender<usize>,
    closed: watch::Sender<bool>,
    close_calls: AtomicUsize,
    pings: AtomicUsize,
    binary_mode: AtomicBool,
    fail_ping: AtomicBool,
    stall_ping: AtomicBool,
}

struct ReadState {
    inbound: mpsc::UnboundedReceiver<Chunk>,
    pending: Vec<u8>,
}

pub struct MockAdapter {
    shared: Arc<Shared>,
    reader: Mutex<ReadState>,
    request: HandshakeRequest,
    remote_addr: String,
    fail_binary_mode: bool,
}

/// Test-side handle of a [`MockAdapter`].
#[derive(Clone)]
pub struct MockClient {
    shared: Arc<Shared>,
}

impl MockAdapter {
    /// Creates an adapter whose remote address is `mock-client`.
    pub fn new(request: HandshakeRequest) -> (Self, MockClient) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (written_len, _) = watch::channel(0);
        let (closed, _) = watch::channel(false);
        let shared = Arc::new(Shared {
            sender: StdMutex::new(Some(tx)),
            written: StdMutex::new(Vec::new()),
            written_len,
            closed,
            close_calls: AtomicUsize::new(0),
            pings: AtomicUsize::new(0),
            binary_mode: AtomicBool::new(false),
            fail_ping: AtomicBool::new(false),
            stall_ping: AtomicBool::new(false),
        });

        let adapter = Self {
            shared: Arc::clone(&shared),
            reader: Mutex::new(ReadState {
                inbound: rx,
                pending: Vec::new(),
            }),
            request,
            remote_addr: "mock-client".to_string(),
            fail_binary_mode: false,
        };
        (adapter, MockClient { shared })
    }

    pub fn with_remote_addr(mut self, addr: impl Into<String>) -> Self {
        self.remote_addr = addr.into();
        self
    }

    /// Makes `set_binary_mode` fail.
    pub fn failing_binary_mode(mut self) -> Self {
        self.fail_binary_mode = true;
        self
    }

    fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }
}

#[async_trait]
impl Adapter for MockAdapter {
    async fn read(&self, buf: &mut [u8]) -> Result<usize, TransportError> {
        let mut closed = self.shared.closed.subscribe();
        if *closed.borrow() {
            return Err(TransportError::Closed);
        }

        let mut reader = self.reader.lock().await;
        while reader.pending.is_empty() {
            let next = tokio::select! {
                _ = closed.wait_for(|done| *done) => return Err(TransportError::Closed),
                next = reader.inbound.recv() => next,
            };
            match next {
                None => return Ok(0),
                Some(Ok(chunk)) => reader.pending = chunk,
                Some(Err(kind)) => return Err(TransportError::Io(io::Error::from(kind))),
            }
        }

        let n = reader.pending.len().min(buf.len());
        buf[..n].copy_from_slice(&reader.pending[..n]);
        reader.pending.drain(..n);
        Ok(n)
    }

    async fn write(&self, data: &[u8]) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let len = {
            let mut written = self.shared.written.lock().expect("lock poisoned");
            written.extend_from_slice(data);
            written.len()
        };
        self.shared.written_len.send_replace(len);
        Ok(())
    }

    async fn close(&self) -> Result<(), TransportError> {
        self.shared.close_calls.fetch_add(1, Ordering::SeqCst);
        self.shared.closed.send_replace(true);
        Ok(())
    }

    fn remote_addr(&self) -> String {
        self.remote_addr.clone()
    }

    async fn set_binary_mode(&self) -> Result<(), TransportError> {
        if self.fail_binary_mode {
            return Err(TransportError::Protocol(
                "binary frames not supported".to_string(),
            ));
        }
        self.shared.binary_mode.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn request(&self) -> &HandshakeRequest {
        &self.request
    }

    async fn ping(&self) -> Result<(), TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        self.shared.pings.fetch_add(1, Ordering::SeqCst);
        if self.shared.stall_ping.load(Ordering::SeqCst) {
            // A client that stopped reading: the ping never completes.
            std::future::pending::<()>().await;
        }
        if self.shared.fail_ping.load(Ordering::SeqCst) {
            return Err(TransportError::Io(io::Error::from(io::ErrorKind::BrokenPipe)));
        }
        Ok(())
    }
}

impl MockClient {
    /// Queues bytes for the adapter's next `read`.  Ignored after `finish`.
    pub fn send(&self, bytes: Vec<u8>) {
        self.push(Ok(bytes));
    }

    /// Makes the adapter's next `read` fail with `kind`.
    pub fn send_error(&self, kind: io::ErrorKind) {
        self.push(Err(kind));
    }

    /// Ends the client's send side: `read` returns `Ok(0)` once the queue drains.
    pub fn finish(&self) {
        self.shared.sender.lock().expect("lock poisoned").take();
    }

    /// Makes every later `ping` fail.
    pub fn fail_pings(&self) {
        self.shared.fail_ping.store(true, Ordering::SeqCst);
    }

    /// Makes every later `ping` hang forever, even across `close`.
    pub fn stall_pings(&self) {
        self.shared.stall_ping.store(true, Ordering::SeqCst);
    }

    /// Everything the adapter has written so far.
    pub fn received(&self) -> Vec<u8> {
        self.shared.written.lock().expect("lock poisoned").clone()
    }

    /// Waits until at least `len` bytes were written; returns what was
    /// received, or `None` on timeout.
    pub async fn wait_received(&self, len: usize, limit: Duration) -> Option<Vec<u8>> {
        let mut written = self.shared.written_len.subscribe();
        tokio::time::timeout(limit, written.wait_for(|n| *n >= len))
            .await
            .ok()?
            .ok()?;
        Some(self.received())
    }

    /// Waits until the adapter is closed; `false` on timeout.
    pub async fn wait_closed(&self, limit: Duration) -> bool {
        let mut closed = self.shared.closed.subscribe();
        tokio::time::timeout(limit, closed.wait_for(|done| *done))
            .await
            .map(|res| res.is_ok())
            .unwrap_or(false)
    }

    pub fn is_closed(&self) -> bool {
        *self.shared.closed.borrow()
    }

    pub fn close_calls(&self) -> usize {
        self.shared.close_calls.load(Ordering::SeqCst)
    }

    pub fn ping_count(&self) -> usize {
        self.shared.pings.load(Ordering::SeqCst)
    }

    pub fn binary_mode(&self) -> bool {
        self.shared.binary_mode.load(Ordering::SeqCst)
    }

    fn push(&self, chunk: Chunk) {
        if let Some(tx) = self.shared.sender.lock().expect("lock poisoned").as_ref() {
            let _ = tx.send(chunk);
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

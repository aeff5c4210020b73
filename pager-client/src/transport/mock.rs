//! Mock transport for testing.
//!
//! Frames pushed with [`MockTransport::push_frame`] are handed out by `recv()`
//! in order; `recv()` waits while none are queued, like a live socket.
//! Sent frames are captured for verification.

use super::{Transport, TransportError};
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, Mutex as AsyncMutex, Notify};

/// Mock transport for testing.
///
/// Clones share state, so a test can keep one clone while the session owns
/// another.
#[derive(Debug, Clone)]
pub struct MockTransport {
    inner: Arc<Mutex<MockTransportInner>>,
    inbound_tx: mpsc::UnboundedSender<Inbound>,
    inbound_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Inbound>>>,
    sent_tx: mpsc::UnboundedSender<Vec<u8>>,
    sent_rx: Arc<AsyncMutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

#[derive(Debug, Default)]
struct MockTransportInner {
    connected: bool,
    connected_address: Option<String>,
    connect_attempts: usize,
    close_calls: usize,
    sent_messages: Vec<Vec<u8>>,
    connect_gate: Option<Arc<Notify>>,
    close_gate: Option<Arc<Notify>>,
    fail_next_connect: Option<String>,
    fail_next_send: Option<String>,
    fail_next_recv: Option<String>,
}

#[derive(Debug)]
enum Inbound {
    Frame(Vec<u8>),
    Close,
}

impl MockTransport {
    /// Create a new mock transport.
    pub fn new() -> Self {
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        let (sent_tx, sent_rx) = mpsc::unbounded_channel();
        Self {
            inner: Arc::new(Mutex::new(MockTransportInner::default())),
            inbound_tx,
            inbound_rx: Arc::new(AsyncMutex::new(inbound_rx)),
            sent_tx,
            sent_rx: Arc::new(AsyncMutex::new(sent_rx)),
        }
    }

    /// Queue a frame to be returned by a `recv()` call.
    pub fn push_frame(&self, data: impl Into<Vec<u8>>) {
        let _ = self.inbound_tx.send(Inbound::Frame(data.into()));
    }

    /// Make a pending or future `recv()` report that the remote end closed.
    pub fn close_remote(&self) {
        let _ = self.inbound_tx.send(Inbound::Close);
    }

    /// Get all messages that were sent.
    pub fn sent_messages(&self) -> Vec<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.clone()
    }

    /// Get the last message that was sent.
    pub fn last_sent(&self) -> Option<Vec<u8>> {
        let inner = self.inner.lock().unwrap();
        inner.sent_messages.last().cloned()
    }

    /// Wait for the next sent frame (in send order).
    pub async fn next_sent(&self) -> Option<Vec<u8>> {
        self.sent_rx.lock().await.recv().await
    }

    /// Get the address that was connected to.
    pub fn connected_address(&self) -> Option<String> {
        let inner = self.inner.lock().unwrap();
        inner.connected_address.clone()
    }

    /// Number of `connect()` calls so far, including failed and held ones.
    pub fn connect_attempts(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.connect_attempts
    }

    /// Whether the mock currently considers itself connected.
    pub fn is_connected(&self) -> bool {
        let inner = self.inner.lock().unwrap();
        inner.connected
    }

    /// Number of `close()` calls so far, including held ones.
    pub fn close_calls(&self) -> usize {
        let inner = self.inner.lock().unwrap();
        inner.close_calls
    }

    /// Hold every subsequent `connect()` until [`release_connect`](Self::release_connect).
    pub fn hold_connect(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.connect_gate = Some(Arc::new(Notify::new()));
    }

    /// Let a held `connect()` proceed.
    pub fn release_connect(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(gate) = inner.connect_gate.take() {
            gate.notify_one();
        }
    }

    /// Hold every subsequent `close()` until [`release_close`](Self::release_close).
    pub fn hold_close(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.close_gate = Some(Arc::new(Notify::new()));
    }

    /// Let a held `close()` proceed.
    pub fn release_close(&self) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(gate) = inner.close_gate.take() {
            gate.notify_one();
        }
    }

    /// Cause the next connect() to fail with the given error.
    pub fn fail_next_connect(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_connect = Some(error.to_string());
    }

    /// Cause the next send() to fail with the given error.
    pub fn fail_next_send(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_send = Some(error.to_string());
    }

    /// Cause the next recv() to fail with the given error.
    pub fn fail_next_recv(&self, error: &str) {
        let mut inner = self.inner.lock().unwrap();
        inner.fail_next_recv = Some(error.to_string());
    }
}

impl Default for MockTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn connect(&self, address: &str) -> Result<(), TransportError> {
        let gate = {
            let mut inner = self.inner.lock().unwrap();
            inner.connect_attempts += 1;
            inner.connect_gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        let mut inner = self.inner.lock().unwrap();

        // Check for forced failure
        if let Some(error) = inner.fail_next_connect.take() {
            return Err(TransportError::ConnectionFailed(error));
        }

        inner.connected = true;
        inner.connected_address = Some(address.to_string());
        Ok(())
    }

    async fn send(&self, data: &[u8]) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();

        if !inner.connected {
            return Err(TransportError::NotConnected);
        }

        // Check for forced failure
        if let Some(error) = inner.fail_next_send.take() {
            return Err(TransportError::SendFailed(error));
        }

        inner.sent_messages.push(data.to_vec());
        let _ = self.sent_tx.send(data.to_vec());
        Ok(())
    }

    async fn recv(&self) -> Result<Vec<u8>, TransportError> {
        {
            let mut inner = self.inner.lock().unwrap();

            if !inner.connected {
                return Err(TransportError::NotConnected);
            }

            // Check for forced failure
            if let Some(error) = inner.fail_next_recv.take() {
                return Err(TransportError::ReceiveFailed(error));
            }
        }

        let mut inbound = self.inbound_rx.lock().await;
        match inbound.recv().await {
            Some(Inbound::Frame(data)) => Ok(data),
            Some(Inbound::Close) | None => {
                self.inner.lock().unwrap().connected = false;
                Err(TransportError::ConnectionClosed)
            }
        }
    }

    async fn close(&self) -> Result<(), TransportError> {
        let gate = {
            let mut inner = self.inner.lock().unwrap();
            inner.close_calls += 1;
            inner.close_gate.clone()
        };
        if let Some(gate) = gate {
            gate.notified().await;
        }

        self.inner.lock().unwrap().connected = false;
        Ok(())
    }
}

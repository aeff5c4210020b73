//! Connection lifecycle over a [`Transport`].
//!
//! A [`Connection`] owns one transport to a fixed endpoint and moves through
//! `Idle → Connecting → Connected → Idle`. Transport I/O runs in spawned
//! tasks; their completions are posted back and applied by
//! [`Connection::drive`] on the owner's task, so all state changes happen in
//! one place.
//!
//! Every transport session gets a generation number. Tearing down bumps the
//! generation before `Idle` is published, so completions that were already in
//! flight for the old transport are discarded instead of leaking frames past
//! `Idle`.
//!
//! Transport closes are chained: each close waits for the one before it, and
//! a new connect waits for the latest close, even if an earlier connect was
//! abandoned.

use crate::transport::{Transport, TransportError};
use futures_util::future::{BoxFuture, FutureExt, Shared};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Completes once the most recent transport close has finished.
type CloseChain = Shared<BoxFuture<'static, ()>>;

/// Lifecycle state of a [`Connection`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// No transport is open.
    Idle,
    /// The transport is being opened.
    Connecting,
    /// The transport is open; frames flow both ways.
    Connected,
}

/// Published to every subscriber, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// The connection moved to a new state.
    StateChanged(ConnectionState),
    /// A frame arrived while connected.
    Frame(Vec<u8>),
}

/// Completion posted by a transport task.
#[derive(Debug)]
enum IoEvent {
    Opened {
        generation: u64,
    },
    OpenFailed {
        generation: u64,
        error: TransportError,
    },
    Frame {
        generation: u64,
        data: Vec<u8>,
    },
    ReceiveFailed {
        generation: u64,
        error: TransportError,
    },
    SendFailed {
        generation: u64,
        error: TransportError,
    },
}

impl IoEvent {
    fn generation(&self) -> u64 {
        match self {
            IoEvent::Opened { generation }
            | IoEvent::OpenFailed { generation, .. }
            | IoEvent::Frame { generation, .. }
            | IoEvent::ReceiveFailed { generation, .. }
            | IoEvent::SendFailed { generation, .. } => *generation,
        }
    }
}

/// One duplex session with the server.
///
/// Nothing here fails synchronously: `send` while not connected is dropped,
/// and any transport error collapses the connection to `Idle`. There is no
/// automatic reconnect.
pub struct Connection<T: Transport + 'static> {
    transport: Arc<T>,
    endpoint: String,
    state: ConnectionState,
    generation: u64,
    tasks: Vec<JoinHandle<()>>,
    outgoing: Option<mpsc::UnboundedSender<Vec<u8>>>,
    closing: Option<CloseChain>,
    io_tx: mpsc::UnboundedSender<IoEvent>,
    io_rx: mpsc::UnboundedReceiver<IoEvent>,
    observers: Vec<mpsc::UnboundedSender<ConnectionEvent>>,
}

impl<T: Transport + 'static> Connection<T> {
    /// Create an idle connection to `endpoint`.
    pub fn new(transport: T, endpoint: impl Into<String>) -> Self {
        let (io_tx, io_rx) = mpsc::unbounded_channel();
        Self {
            transport: Arc::new(transport),
            endpoint: endpoint.into(),
            state: ConnectionState::Idle,
            generation: 0,
            tasks: Vec::new(),
            outgoing: None,
            closing: None,
            io_tx,
            io_rx,
            observers: Vec::new(),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Subscribe to state changes and inbound frames.
    ///
    /// The current state is delivered first.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<ConnectionEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(ConnectionEvent::StateChanged(self.state));
        self.observers.push(tx);
        rx
    }

    /// Open the transport. No-op unless idle.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&mut self) {
        if self.state != ConnectionState::Idle {
            tracing::debug!(state = ?self.state, "connection already started");
            return;
        }

        self.generation += 1;
        let generation = self.generation;
        tracing::info!(endpoint = %self.endpoint, generation, "connecting");
        self.publish_state(ConnectionState::Connecting);

        let transport = Arc::clone(&self.transport);
        let endpoint = self.endpoint.clone();
        let previous_close = self.closing.clone();
        let io = self.io_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            if let Some(close) = previous_close {
                close.await;
            }
            let event = match transport.connect(&endpoint).await {
                Ok(()) => IoEvent::Opened { generation },
                Err(error) => IoEvent::OpenFailed { generation, error },
            };
            let _ = io.send(event);
        }));
    }

    /// Queue a frame for sending. No-op unless connected.
    pub fn send(&mut self, data: Vec<u8>) {
        match (&self.outgoing, self.state) {
            (Some(outgoing), ConnectionState::Connected) => {
                tracing::debug!(bytes = data.len(), "queueing frame");
                let _ = outgoing.send(data);
            }
            _ => tracing::debug!(state = ?self.state, "dropping frame, not connected"),
        }
    }

    /// Tear the transport down and go idle. No-op when idle.
    pub fn close(&mut self) {
        if self.state == ConnectionState::Idle {
            return;
        }
        tracing::info!(endpoint = %self.endpoint, "closing connection");
        self.teardown();
    }

    /// Wait for the next transport completion and apply it.
    ///
    /// Cancel-safe: a completion is either applied or stays queued.
    pub async fn drive(&mut self) {
        if let Some(event) = self.io_rx.recv().await {
            self.apply(event);
        }
    }

    fn apply(&mut self, event: IoEvent) {
        if event.generation() != self.generation {
            tracing::debug!(?event, current = self.generation, "discarding stale completion");
            return;
        }

        match event {
            IoEvent::Opened { generation } => self.opened(generation),
            IoEvent::OpenFailed { error, .. } => {
                tracing::warn!(endpoint = %self.endpoint, %error, "connection failed");
                self.teardown();
            }
            IoEvent::Frame { data, .. } => {
                if self.state == ConnectionState::Connected {
                    tracing::debug!(bytes = data.len(), "frame received");
                    self.publish(ConnectionEvent::Frame(data));
                }
            }
            IoEvent::ReceiveFailed { error, .. } => {
                match error {
                    TransportError::ConnectionClosed => {
                        tracing::info!(endpoint = %self.endpoint, "connection closed by remote")
                    }
                    error => tracing::warn!(%error, "receive failed"),
                }
                self.teardown();
            }
            IoEvent::SendFailed { error, .. } => {
                tracing::warn!(%error, "send failed");
                self.teardown();
            }
        }
    }

    fn opened(&mut self, generation: u64) {
        if self.state != ConnectionState::Connecting {
            return;
        }
        self.tasks.retain(|task| !task.is_finished());

        let (outgoing, mut queued) = mpsc::unbounded_channel::<Vec<u8>>();
        let transport = Arc::clone(&self.transport);
        let io = self.io_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            while let Some(frame) = queued.recv().await {
                if let Err(error) = transport.send(&frame).await {
                    let _ = io.send(IoEvent::SendFailed { generation, error });
                    break;
                }
            }
        }));

        let transport = Arc::clone(&self.transport);
        let io = self.io_tx.clone();
        self.tasks.push(tokio::spawn(async move {
            loop {
                match transport.recv().await {
                    Ok(data) => {
                        if io.send(IoEvent::Frame { generation, data }).is_err() {
                            break;
                        }
                    }
                    Err(error) => {
                        let _ = io.send(IoEvent::ReceiveFailed { generation, error });
                        break;
                    }
                }
            }
        }));

        self.outgoing = Some(outgoing);
        tracing::info!(endpoint = %self.endpoint, "connected");
        self.publish_state(ConnectionState::Connected);
    }

    fn teardown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.outgoing = None;
        self.generation += 1;

        let transport = Arc::clone(&self.transport);
        let previous = self.closing.take();
        let close = tokio::spawn(async move {
            if let Some(previous) = previous {
                previous.await;
            }
            if let Err(error) = transport.close().await {
                tracing::warn!(%error, "transport close failed");
            }
        });
        self.closing = Some(
            async move {
                let _ = close.await;
            }
            .boxed()
            .shared(),
        );

        self.publish_state(ConnectionState::Idle);
    }

    fn publish_state(&mut self, state: ConnectionState) {
        self.state = state;
        self.publish(ConnectionEvent::StateChanged(state));
    }

    fn publish(&mut self, event: ConnectionEvent) {
        self.observers
            .retain(|observer| observer.send(event.clone()).is_ok());
    }
}

impl<T: Transport + 'static> Drop for Connection<T> {
    fn drop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl<T: Transport + 'static> std::fmt::Debug for Connection<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("generation", &self.generation)
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::MockTransport;
    use std::time::Duration;
    use tokio::time::timeout;

    const ENDPOINT: &str = "ws://test/ws";

    fn connection() -> (Connection<MockTransport>, MockTransport) {
        let transport = MockTransport::new();
        (Connection::new(transport.clone(), ENDPOINT), transport)
    }

    async fn drive(connection: &mut Connection<MockTransport>) {
        timeout(Duration::from_secs(1), connection.drive())
            .await
            .expect("no transport completion");
    }

    async fn next(events: &mut mpsc::UnboundedReceiver<ConnectionEvent>) -> ConnectionEvent {
        timeout(Duration::from_secs(1), events.recv())
            .await
            .expect("no connection event")
            .expect("event stream closed")
    }

    async fn connected() -> (
        Connection<MockTransport>,
        MockTransport,
        mpsc::UnboundedReceiver<ConnectionEvent>,
    ) {
        let (mut connection, transport) = connection();
        let mut events = connection.subscribe();
        connection.start();
        drive(&mut connection).await;
        assert_eq!(connection.state(), ConnectionState::Connected);

        // Idle, Connecting, Connected
        for _ in 0..3 {
            next(&mut events).await;
        }
        (connection, transport, events)
    }

    // ===========================================
    // Lifecycle Tests
    // ===========================================

    #[tokio::test]
    async fn subscribe_delivers_current_state_first() {
        let (mut connection, _transport) = connection();
        let mut events = connection.subscribe();

        assert_eq!(
            next(&mut events).await,
            ConnectionEvent::StateChanged(ConnectionState::Idle)
        );
    }

    #[tokio::test]
    async fn start_connects_to_endpoint() {
        let (mut connection, transport) = connection();
        let mut events = connection.subscribe();

        connection.start();
        assert_eq!(connection.state(), ConnectionState::Connecting);
        drive(&mut connection).await;

        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(transport.connected_address(), Some(ENDPOINT.to_string()));

        let mut seen = Vec::new();
        for _ in 0..3 {
            seen.push(next(&mut events).await);
        }
        assert_eq!(
            seen,
            vec![
                ConnectionEvent::StateChanged(ConnectionState::Idle),
                ConnectionEvent::StateChanged(ConnectionState::Connecting),
                ConnectionEvent::StateChanged(ConnectionState::Connected),
            ]
        );
    }

    #[tokio::test]
    async fn start_is_noop_unless_idle() {
        let (mut connection, transport) = connection();
        transport.hold_connect();

        connection.start();
        connection.start();
        transport.release_connect();
        drive(&mut connection).await;
        connection.start();

        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(transport.connect_attempts(), 1);
    }

    #[tokio::test]
    async fn connect_failure_goes_idle() {
        let (mut connection, transport) = connection();
        let mut events = connection.subscribe();
        transport.fail_next_connect("refused");

        connection.start();
        drive(&mut connection).await;

        assert_eq!(connection.state(), ConnectionState::Idle);
        next(&mut events).await;
        next(&mut events).await;
        assert_eq!(
            next(&mut events).await,
            ConnectionEvent::StateChanged(ConnectionState::Idle)
        );
    }

    #[tokio::test]
    async fn close_is_noop_when_idle() {
        let (mut connection, transport) = connection();
        let mut events = connection.subscribe();
        next(&mut events).await;

        connection.close();

        assert_eq!(connection.state(), ConnectionState::Idle);
        assert!(events.try_recv().is_err());
        assert_eq!(transport.close_calls(), 0);
    }

    #[tokio::test]
    async fn close_while_connecting_discards_late_open() {
        let (mut connection, transport) = connection();
        transport.hold_connect();

        connection.start();
        connection.close();
        assert_eq!(connection.state(), ConnectionState::Idle);

        transport.release_connect();
        let _ = timeout(Duration::from_millis(50), connection.drive()).await;
        assert_eq!(connection.state(), ConnectionState::Idle);
    }

    // ===========================================
    // Frame Tests
    // ===========================================

    #[tokio::test]
    async fn send_is_noop_when_not_connected() {
        let (mut connection, transport) = connection();

        connection.send(b"dropped".to_vec());
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert!(transport.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn sends_frames_in_order() {
        let (mut connection, transport, _events) = connected().await;

        connection.send(b"one".to_vec());
        connection.send(b"two".to_vec());
        connection.send(b"three".to_vec());

        assert_eq!(transport.next_sent().await, Some(b"one".to_vec()));
        assert_eq!(transport.next_sent().await, Some(b"two".to_vec()));
        assert_eq!(transport.next_sent().await, Some(b"three".to_vec()));
    }

    #[tokio::test]
    async fn forwards_inbound_frames() {
        let (mut connection, transport, mut events) = connected().await;

        transport.push_frame(b"hello".to_vec());
        drive(&mut connection).await;

        assert_eq!(
            next(&mut events).await,
            ConnectionEvent::Frame(b"hello".to_vec())
        );
    }

    #[tokio::test]
    async fn every_subscriber_sees_frames() {
        let (mut connection, transport, mut first) = connected().await;
        let mut second = connection.subscribe();
        assert_eq!(
            next(&mut second).await,
            ConnectionEvent::StateChanged(ConnectionState::Connected)
        );

        transport.push_frame(b"shared".to_vec());
        drive(&mut connection).await;

        assert_eq!(next(&mut first).await, ConnectionEvent::Frame(b"shared".to_vec()));
        assert_eq!(next(&mut second).await, ConnectionEvent::Frame(b"shared".to_vec()));
    }

    // ===========================================
    // Failure and Teardown Tests
    // ===========================================

    #[tokio::test]
    async fn remote_close_goes_idle() {
        let (mut connection, transport, mut events) = connected().await;

        transport.close_remote();
        drive(&mut connection).await;

        assert_eq!(connection.state(), ConnectionState::Idle);
        assert_eq!(
            next(&mut events).await,
            ConnectionEvent::StateChanged(ConnectionState::Idle)
        );
    }

    #[tokio::test]
    async fn send_failure_goes_idle() {
        let (mut connection, transport, _events) = connected().await;
        transport.fail_next_send("broken pipe");

        connection.send(b"doomed".to_vec());
        drive(&mut connection).await;

        assert_eq!(connection.state(), ConnectionState::Idle);
    }

    #[tokio::test]
    async fn no_frames_after_idle() {
        let (mut connection, transport, mut events) = connected().await;

        transport.push_frame(b"late".to_vec());
        // Let the reader pick the frame up before tearing down.
        tokio::time::sleep(Duration::from_millis(20)).await;
        connection.close();

        assert_eq!(
            next(&mut events).await,
            ConnectionEvent::StateChanged(ConnectionState::Idle)
        );
        let _ = timeout(Duration::from_millis(50), connection.drive()).await;
        assert!(events.try_recv().is_err());
    }

    #[tokio::test]
    async fn restart_after_close_waits_for_previous_close() {
        let (mut connection, transport, _events) = connected().await;

        connection.close();
        connection.start();
        drive(&mut connection).await;

        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(transport.close_calls(), 1);
        assert_eq!(transport.connect_attempts(), 2);
    }

    #[tokio::test]
    async fn abandoned_start_keeps_closes_ordered() {
        let (mut connection, transport, _events) = connected().await;
        transport.hold_close();

        connection.close();
        connection.start();
        connection.close();
        tokio::time::sleep(Duration::from_millis(20)).await;

        assert_eq!(transport.close_calls(), 1);
        assert_eq!(transport.connect_attempts(), 1);

        transport.release_close();
        timeout(Duration::from_secs(1), async {
            while transport.close_calls() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("second close never ran");

        connection.start();
        drive(&mut connection).await;
        assert_eq!(connection.state(), ConnectionState::Connected);
        assert_eq!(transport.connect_attempts(), 2);
    }
}

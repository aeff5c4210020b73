//! Session orchestration: login handshake and sync loop.
//!
//! A session runs as a single Tokio task (the actor) that owns the
//! [`Connection`], the state machine and the [`SyncDriver`]. Callers hold a
//! cheap, clonable [`SessionManager`] and talk to the actor over a command
//! channel.
//!
//! ```text
//! Idle --connecting--> Connecting --connected--> SigningIn
//!   ^                                               |
//!   |                                   logged_in   v
//!   +---disconnected--- Closing <--bad frame--- SignedIn <-- sync_updates
//! ```
//!
//! The actor loop is biased toward connection events, so anything the
//! connection already published is dispatched before the next caller command
//! is looked at.

use crate::config::SessionConfig;
use crate::connection::{Connection, ConnectionEvent, ConnectionState};
use crate::ready::{ReadyHandle, ReadyResult};
use crate::transport::Transport;
use crate::SessionError;
use beep_pager_core::{
    StateId, StateMachine, StateMachineEvent, SyncCoordinator, SyncDriver, SyncError,
};
use beep_pager_types::{
    Command, LoginCommand, Pts, SendMessageCommand, ServerEvent, SyncCommand,
};
use std::fmt;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};

/// Credentials of the signed-in account.
#[derive(Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// Token identifying the user.
    pub user_token: String,
    /// Secret proving the user's identity.
    pub secret_key: String,
}

impl AccountInfo {
    /// Create account credentials.
    pub fn new(user_token: impl Into<String>, secret_key: impl Into<String>) -> Self {
        Self {
            user_token: user_token.into(),
            secret_key: secret_key.into(),
        }
    }
}

impl fmt::Debug for AccountInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccountInfo")
            .field("user_token", &self.user_token)
            .field("secret_key", &"[REDACTED]")
            .finish()
    }
}

/// Observable phase of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionPhase {
    /// No connection.
    Idle,
    /// Opening the connection.
    Connecting,
    /// Connected, waiting for `logged_in`.
    SigningIn,
    /// Logged in; sync is running.
    SignedIn,
    /// Tearing the connection down after a protocol failure.
    Closing,
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionPhase::Idle => "idle",
            SessionPhase::Connecting => "connecting",
            SessionPhase::SigningIn => "signing in",
            SessionPhase::SignedIn => "signed in",
            SessionPhase::Closing => "closing",
        };
        f.write_str(name)
    }
}

/// Events driving the session state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// The connection went idle.
    Disconnected,
    /// The connection started opening.
    Connecting,
    /// The connection is open.
    Connected,
    /// A frame arrived.
    DataReceived(Vec<u8>),
}

/// Lookup key of a [`SessionEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionEventKind {
    /// See [`SessionEvent::Disconnected`].
    Disconnected,
    /// See [`SessionEvent::Connecting`].
    Connecting,
    /// See [`SessionEvent::Connected`].
    Connected,
    /// See [`SessionEvent::DataReceived`].
    DataReceived,
}

impl StateMachineEvent for SessionEvent {
    type Kind = SessionEventKind;

    fn kind(&self) -> SessionEventKind {
        match self {
            SessionEvent::Disconnected => SessionEventKind::Disconnected,
            SessionEvent::Connecting => SessionEventKind::Connecting,
            SessionEvent::Connected => SessionEventKind::Connected,
            SessionEvent::DataReceived(_) => SessionEventKind::DataReceived,
        }
    }
}

impl From<ConnectionEvent> for SessionEvent {
    fn from(event: ConnectionEvent) -> Self {
        match event {
            ConnectionEvent::StateChanged(ConnectionState::Idle) => SessionEvent::Disconnected,
            ConnectionEvent::StateChanged(ConnectionState::Connecting) => SessionEvent::Connecting,
            ConnectionEvent::StateChanged(ConnectionState::Connected) => SessionEvent::Connected,
            ConnectionEvent::Frame(data) => SessionEvent::DataReceived(data),
        }
    }
}

/// Requests handled by the session actor.
enum SessionCommand {
    SignIn {
        account: AccountInfo,
        reply: oneshot::Sender<ReadyResult>,
    },
    RequestSync {
        from: Pts,
    },
    TriggerSync,
    SendMessage {
        command: SendMessageCommand,
        reply: oneshot::Sender<Result<(), SessionError>>,
    },
}

impl fmt::Debug for SessionCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionCommand::SignIn { account, .. } => {
                f.debug_struct("SignIn").field("account", account).finish()
            }
            SessionCommand::RequestSync { from } => {
                f.debug_struct("RequestSync").field("from", from).finish()
            }
            SessionCommand::TriggerSync => f.write_str("TriggerSync"),
            SessionCommand::SendMessage { command, .. } => {
                f.debug_struct("SendMessage").field("command", command).finish()
            }
        }
    }
}

/// The driver's way back into the session.
///
/// Holds only a weak inbox sender so the driver never keeps the session
/// alive.
#[derive(Debug)]
struct SessionLink {
    inbox: mpsc::WeakUnboundedSender<SessionCommand>,
}

impl SyncCoordinator for SessionLink {
    fn request_sync(&self, from: Pts) -> Result<(), SyncError> {
        let inbox = self.inbox.upgrade().ok_or(SyncError::CoordinatorGone)?;
        inbox
            .send(SessionCommand::RequestSync { from })
            .map_err(|_| SyncError::CoordinatorGone)
    }
}

/// Everything the state machine's actions operate on.
struct SessionCore<T: Transport + 'static> {
    connection: Connection<T>,
    account: Option<AccountInfo>,
    device_token: String,
    ready: Option<ReadyHandle>,
    sync: SyncDriver<SessionLink>,
    phase: watch::Sender<SessionPhase>,
}

impl<T: Transport + 'static> SessionCore<T> {
    fn set_phase(&self, phase: SessionPhase) {
        let changed = self.phase.send_if_modified(|current| {
            if *current == phase {
                return false;
            }
            *current = phase;
            true
        });
        if changed {
            tracing::info!(%phase, "session phase changed");
        }
    }

    fn send_command(&mut self, command: Command) {
        match command.to_bytes() {
            Ok(bytes) => {
                tracing::debug!(cmd = command.name(), "sending command");
                self.connection.send(bytes);
            }
            Err(error) => tracing::error!(cmd = command.name(), %error, "failed to encode command"),
        }
    }

    fn reject_pending(&mut self) {
        if let Some(mut ready) = self.ready.take() {
            ready.reject(SessionError::ConnectionLost);
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct SessionStates {
    idle: StateId,
    connecting: StateId,
    signing_in: StateId,
    signed_in: StateId,
    closing: StateId,
}

type SessionMachine<T> = StateMachine<SessionEvent, SessionCore<T>>;

fn build_machine<T: Transport + 'static>() -> (SessionMachine<T>, SessionStates) {
    use SessionEventKind::{Connected, Connecting, DataReceived, Disconnected};

    let mut machine = SessionMachine::<T>::new();
    let states = SessionStates {
        idle: machine.add_state("Idle"),
        connecting: machine.add_state("Connecting"),
        signing_in: machine.add_state("SigningIn"),
        signed_in: machine.add_state("SignedIn"),
        closing: machine.add_state("Closing"),
    };
    let SessionStates {
        idle,
        connecting,
        signing_in,
        signed_in,
        closing,
    } = states;

    machine.add_transition(idle, idle, Disconnected);
    machine.add_transition(idle, connecting, Connecting);
    machine.add_transition(connecting, idle, Disconnected);
    machine.add_transition(connecting, signing_in, Connected);
    machine.add_transition(signing_in, idle, Disconnected);
    machine.add_decision(signing_in, DataReceived, move |_, event| {
        match decode(event) {
            Some(ServerEvent::LoggedIn) => signed_in,
            Some(other) => {
                tracing::warn!(?other, "unexpected event while signing in");
                closing
            }
            None => closing,
        }
    });
    machine.add_decision(signed_in, DataReceived, move |core, event| {
        match decode(event) {
            Some(ServerEvent::SyncUpdates(updates)) => {
                match core.sync.handle_sync_result(&updates) {
                    Ok(()) => signed_in,
                    Err(error) => {
                        tracing::warn!(%error, "sync failed");
                        closing
                    }
                }
            }
            Some(other) => {
                tracing::warn!(?other, "unexpected event while signed in");
                closing
            }
            None => closing,
        }
    });
    machine.add_transition(signed_in, idle, Disconnected);
    machine.add_transition(closing, idle, Disconnected);
    machine.add_transition(closing, closing, DataReceived);

    machine.on_enter(idle, |core, _| {
        core.set_phase(SessionPhase::Idle);
        core.reject_pending();
    });
    machine.on_reenter(idle, |core, _| core.reject_pending());
    machine.on_enter(connecting, |core, _| core.set_phase(SessionPhase::Connecting));
    machine.on_enter(signing_in, |core, _| {
        core.set_phase(SessionPhase::SigningIn);
        let Some(account) = core.account.clone() else {
            panic!("invariant violation: signing in without an account");
        };
        let login = LoginCommand {
            user_token: account.user_token,
            device_token: core.device_token.clone(),
            secret_key: account.secret_key,
        };
        core.send_command(Command::Login(login));
    });
    machine.on_enter(signed_in, |core, _| {
        core.set_phase(SessionPhase::SignedIn);
        match core.ready.as_mut() {
            Some(ready) => ready.resolve(),
            None => panic!("invariant violation: signed in without a ready handle"),
        }
        if let Err(error) = core.sync.perform_sync() {
            tracing::warn!(%error, "initial sync failed");
        }
    });
    machine.on_exit(signed_in, |core, _| {
        core.ready = None;
        core.sync.reset();
    });
    machine.on_enter(closing, |core, _| {
        core.set_phase(SessionPhase::Closing);
        core.connection.close();
    });

    (machine, states)
}

fn decode(event: &SessionEvent) -> Option<ServerEvent> {
    let SessionEvent::DataReceived(data) = event else {
        return None;
    };
    match ServerEvent::from_bytes(data) {
        Ok(event) => Some(event),
        Err(error) => {
            tracing::warn!(%error, bytes = data.len(), "failed to decode server event");
            None
        }
    }
}

struct SessionActor<T: Transport + 'static> {
    machine: SessionMachine<T>,
    states: SessionStates,
    core: SessionCore<T>,
    connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    inbox: mpsc::UnboundedReceiver<SessionCommand>,
}

impl<T: Transport + 'static> SessionActor<T> {
    async fn run(mut self) {
        loop {
            tokio::select! {
                biased;

                Some(event) = self.connection_events.recv() => {
                    self.machine.handle_event(&mut self.core, event.into());
                }
                () = self.core.connection.drive() => {}
                command = self.inbox.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
            }
        }
        tracing::debug!("session handles dropped, stopping");
    }

    fn is_in(&self, state: StateId) -> bool {
        self.machine.current() == Some(state)
    }

    fn handle_command(&mut self, command: SessionCommand) {
        match command {
            SessionCommand::SignIn { account, reply } => self.sign_in(account, reply),
            SessionCommand::RequestSync { from } => {
                if self.is_in(self.states.signed_in) {
                    self.core
                        .send_command(Command::Sync(SyncCommand { device_pts: from }));
                } else {
                    tracing::warn!(%from, "not signed in, dropping sync request");
                }
            }
            SessionCommand::TriggerSync => {
                if let Err(error) = self.core.sync.perform_sync() {
                    tracing::warn!(%error, "sync request failed");
                }
            }
            SessionCommand::SendMessage { command, reply } => {
                let result = if self.is_in(self.states.signed_in) {
                    self.core.send_command(Command::SendMessage(command));
                    Ok(())
                } else {
                    Err(SessionError::NotSignedIn)
                };
                let _ = reply.send(result);
            }
        }
    }

    fn sign_in(&mut self, account: AccountInfo, reply: oneshot::Sender<ReadyResult>) {
        match &self.core.account {
            None => self.core.account = Some(account),
            Some(stored) if *stored != account => {
                tracing::warn!(
                    user_token = %account.user_token,
                    "another account is already stored, ignoring"
                );
            }
            Some(_) => {}
        }

        if self.is_in(self.states.idle) {
            self.core.ready = Some(ReadyHandle::new());
            self.core.connection.start();
        }
        self.core
            .ready
            .get_or_insert_with(ReadyHandle::new)
            .attach(reply);
    }
}

/// Handle to a running session.
///
/// Clones share the session. The session task stops once every handle is
/// dropped.
#[derive(Debug, Clone)]
pub struct SessionManager {
    inbox: mpsc::UnboundedSender<SessionCommand>,
    phase: watch::Receiver<SessionPhase>,
    sign_in_timeout: Option<Duration>,
}

impl SessionManager {
    /// Spawn a session over `transport`.
    ///
    /// Nothing is opened until [`sign_in`](Self::sign_in). Must be called
    /// from within a Tokio runtime.
    pub fn spawn<T: Transport + 'static>(config: SessionConfig, transport: T) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (phase_tx, phase_rx) = watch::channel(SessionPhase::Idle);

        let mut connection = Connection::new(transport, config.endpoint.clone());
        let connection_events = connection.subscribe();
        let core = SessionCore {
            connection,
            account: None,
            device_token: config.device_token.clone(),
            ready: None,
            sync: SyncDriver::new(SessionLink {
                inbox: inbox_tx.downgrade(),
            }),
            phase: phase_tx,
        };

        let (machine, states) = build_machine();
        let mut actor = SessionActor {
            machine,
            states,
            core,
            connection_events,
            inbox: inbox_rx,
        };
        actor.machine.start(&mut actor.core, states.idle);
        tokio::spawn(actor.run());

        Self {
            inbox: inbox_tx,
            phase: phase_rx,
            sign_in_timeout: config.sign_in_timeout(),
        }
    }

    /// Sign in and wait until the session is ready.
    ///
    /// The first account passed in is kept for the life of the session.
    /// Concurrent calls share one connection attempt and see the same
    /// outcome.
    ///
    /// # Errors
    ///
    /// - [`SessionError::ConnectionLost`] if the connection or login failed
    /// - [`SessionError::Timeout`] if the configured deadline passed
    /// - [`SessionError::SessionClosed`] if the session task is gone
    pub async fn sign_in(&self, user_token: &str, secret_key: &str) -> Result<(), SessionError> {
        let (reply, outcome) = oneshot::channel();
        self.send(SessionCommand::SignIn {
            account: AccountInfo::new(user_token, secret_key),
            reply,
        })?;

        let outcome = async { outcome.await.unwrap_or(Err(SessionError::SessionClosed)) };
        match self.sign_in_timeout {
            Some(limit) => tokio::time::timeout(limit, outcome)
                .await
                .map_err(|_| SessionError::Timeout)?,
            None => outcome.await,
        }
    }

    /// Ask for a sync round. Ignored unless signed in.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::SessionClosed`] if the session task is gone.
    pub fn request_sync(&self) -> Result<(), SessionError> {
        self.send(SessionCommand::TriggerSync)
    }

    /// Send a message to `receiver`.
    ///
    /// # Errors
    ///
    /// - [`SessionError::NotSignedIn`] unless the session is signed in
    /// - [`SessionError::SessionClosed`] if the session task is gone
    pub async fn send_message(&self, receiver: &str, contents: &str) -> Result<(), SessionError> {
        let (reply, outcome) = oneshot::channel();
        self.send(SessionCommand::SendMessage {
            command: SendMessageCommand {
                receiver: receiver.to_string(),
                contents: contents.to_string(),
            },
            reply,
        })?;
        outcome.await.unwrap_or(Err(SessionError::SessionClosed))
    }

    /// The current phase.
    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// A receiver notified on every phase change.
    pub fn watch_phase(&self) -> watch::Receiver<SessionPhase> {
        self.phase.clone()
    }

    fn send(&self, command: SessionCommand) -> Result<(), SessionError> {
        self.inbox
            .send(command)
            .map_err(|_| SessionError::SessionClosed)
    }
}

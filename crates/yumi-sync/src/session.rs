//! # State Session
//!
//! One persistent Ynison state-channel connection for one identity.
//!
//! ## Session Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Session Lifecycle                                 │
//! │                                                                         │
//! │   Idle ──► Resolving ──► Connecting ──► Connected ──► Disconnected     │
//! │              │               │              │              │            │
//! │              │ fresh         │ ticket in    │ initial      │ health     │
//! │              │ redirect      │ subprotocol  │ snapshot     │ tick       │
//! │              │ every time    │ header       │ sent first   │ reconnects │
//! │              ▼               ▼              ▼              ▼            │
//! │          (tickets are single-use: reconnect always re-resolves)         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The session owns the write half of its connection. The read half moves
//! into a spawned reader task that does nothing but parse frames and push
//! them onto the coordinator's single event channel, so all reaction logic
//! stays on one consumer.

use std::fmt;
use std::time::Duration;

use chrono::Utc;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};
use uuid::Uuid;

use yumi_core::model::{DeviceIdentity, InboundMessage, Role, StateEnvelope};
use yumi_core::snapshot::initial_snapshot;

use crate::error::{SyncError, SyncResult};
use crate::redirect::{handshake_request, subprotocol_header, RedirectResolver};

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, WsMessage>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

// =============================================================================
// Session Events
// =============================================================================

/// Event pushed from a session's reader task to the coordinator.
///
/// Tagged with the session index so one mpsc channel can carry every
/// session's traffic in arrival order.
#[derive(Debug)]
pub enum SessionEvent {
    /// A state message arrived on the session's channel.
    Message {
        /// Index of the originating session (0 is always the leader).
        session: usize,
        /// Leniently parsed payload.
        message: Box<InboundMessage>,
    },

    /// The session's channel closed or failed.
    Closed {
        /// Index of the affected session.
        session: usize,
        /// Connection generation the closing reader belonged to. A close
        /// from an older generation is stale and must not tear down a
        /// newer connection.
        generation: u64,
    },
}

// =============================================================================
// Session State
// =============================================================================

/// Connection state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Never connected.
    Idle,
    /// Redirect handshake in progress.
    Resolving,
    /// State channel handshake in progress.
    Connecting,
    /// Live channel, initial snapshot sent.
    Connected,
    /// Channel lost; waiting for a health tick.
    Disconnected,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "idle",
            SessionState::Resolving => "resolving",
            SessionState::Connecting => "connecting",
            SessionState::Connected => "connected",
            SessionState::Disconnected => "disconnected",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// State Session
// =============================================================================

/// One identity's persistent state-channel session.
pub struct StateSession {
    /// Position in the coordinator's session table (0 is the leader).
    index: usize,

    /// Display name used in logs and readouts.
    name: String,

    /// OAuth token for this identity.
    token: String,

    /// Leader or participant; decides the announced capabilities.
    role: Role,

    /// Device identity announced in the initial snapshot.
    identity: DeviceIdentity,

    /// Redirect handshake performer.
    resolver: RedirectResolver,

    /// Origin header for the state channel handshake.
    origin: String,

    /// State channel connection ceiling.
    connect_timeout: Duration,

    /// Shared event channel into the coordinator.
    events_tx: mpsc::Sender<SessionEvent>,

    /// Write half of the live connection.
    writer: Option<WsSink>,

    /// Reader task for the live connection.
    reader: Option<JoinHandle<()>>,

    /// Host this session is currently routed to.
    host: Option<String>,

    /// Current lifecycle state.
    state: SessionState,

    /// Connection generation, incremented on every successful connect.
    /// Stamped onto close events so stale readers cannot tear down a
    /// reconnected channel.
    generation: u64,

    /// Whether the display name came from a successful account lookup.
    name_resolved: bool,
}

impl StateSession {
    /// Creates a session in the `Idle` state.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        index: usize,
        name: String,
        token: String,
        role: Role,
        identity: DeviceIdentity,
        resolver: RedirectResolver,
        origin: String,
        connect_timeout: Duration,
        events_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        StateSession {
            index,
            name,
            token,
            role,
            identity,
            resolver,
            origin,
            connect_timeout,
            events_tx,
            writer: None,
            reader: None,
            host: None,
            state: SessionState::Idle,
            generation: 0,
            name_resolved: false,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Session index (0 is the leader).
    pub fn index(&self) -> usize {
        self.index
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Updates the display name from a successful account lookup.
    /// The announced device title follows the name.
    pub fn set_name(&mut self, name: String) {
        self.identity.title = name.clone();
        self.name = name;
        self.name_resolved = true;
    }

    /// True once the display name came from the account API rather than
    /// the configured fallback.
    pub fn name_resolved(&self) -> bool {
        self.name_resolved
    }

    /// Current connection generation.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Device identity announced by this session.
    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// This identity's OAuth token.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Leader or participant.
    pub fn role(&self) -> Role {
        self.role
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// True when the channel is live.
    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected
    }

    /// Host this session is routed to, when connected.
    pub fn host(&self) -> Option<&str> {
        self.host.as_deref()
    }

    // =========================================================================
    // Connection
    // =========================================================================

    /// Opens (or reopens) the state channel.
    ///
    /// Performs a fresh redirect handshake, connects to the routed host,
    /// announces presence with an initial snapshot and spawns the reader
    /// task. Returns the routed host for the coordinator's uniqueness
    /// check.
    pub async fn connect(&mut self) -> SyncResult<String> {
        self.teardown().await;

        self.state = SessionState::Resolving;
        let target = match self.resolver.resolve(&self.token).await {
            Ok(target) => target,
            Err(e) => {
                self.state = SessionState::Disconnected;
                return Err(e);
            }
        };

        self.state = SessionState::Connecting;
        let url = format!(
            "wss://{}/ynison_state.YnisonStateService/PutYnisonState",
            target.host
        );
        let subprotocol =
            subprotocol_header(&self.identity.device_id, Some(&target.redirect_ticket));
        let request = handshake_request(&url, &self.token, &self.origin, &subprotocol)?;

        debug!(session = %self.name, host = %target.host, "Opening state channel");
        let connect_result = timeout(self.connect_timeout, connect_async(request)).await;
        let ws_stream = match connect_result {
            Ok(Ok((stream, _response))) => stream,
            Ok(Err(e)) => {
                self.state = SessionState::Disconnected;
                return Err(SyncError::from(e));
            }
            Err(_) => {
                self.state = SessionState::Disconnected;
                return Err(SyncError::Timeout(self.connect_timeout.as_secs()));
            }
        };

        let (mut writer, reader) = ws_stream.split();

        // Presence announcement: the service expects a full state as the
        // first message on the channel.
        let snapshot = initial_snapshot(
            &self.identity,
            self.role,
            Utc::now().timestamp_millis(),
            Uuid::new_v4().to_string(),
        );
        let json = snapshot.to_json()?;
        if let Err(e) = writer.send(WsMessage::Text(json.into())).await {
            self.state = SessionState::Disconnected;
            return Err(SyncError::from(e));
        }

        self.generation += 1;
        self.reader = Some(self.spawn_reader(reader));
        self.writer = Some(writer);
        self.host = Some(target.host.clone());
        self.state = SessionState::Connected;

        info!(session = %self.name, host = %target.host, "State channel connected");
        Ok(target.host)
    }

    /// Spawns the reader task for a freshly split connection.
    fn spawn_reader(&self, mut reader: WsSource) -> JoinHandle<()> {
        let events_tx = self.events_tx.clone();
        let session = self.index;
        let generation = self.generation;
        let name = self.name.clone();

        tokio::spawn(async move {
            while let Some(frame) = reader.next().await {
                match frame {
                    Ok(WsMessage::Text(text)) => {
                        let message = Box::new(InboundMessage::from_json(text.as_str()));
                        if events_tx
                            .send(SessionEvent::Message { session, message })
                            .await
                            .is_err()
                        {
                            // Coordinator gone; nothing left to report to.
                            return;
                        }
                    }
                    Ok(WsMessage::Ping(_) | WsMessage::Pong(_)) => {}
                    Ok(WsMessage::Close(frame)) => {
                        debug!(session = %name, ?frame, "State channel closed by peer");
                        break;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!(session = %name, error = %e, "State channel read error");
                        break;
                    }
                }
            }
            let _ = events_tx
                .send(SessionEvent::Closed {
                    session,
                    generation,
                })
                .await;
        })
    }

    // =========================================================================
    // Sending
    // =========================================================================

    /// Sends a state envelope on the live channel.
    ///
    /// Returns false without error when the session is not connected or the
    /// write fails; a failed write flips the session to `Disconnected` so
    /// the next health tick picks it up.
    pub async fn send(&mut self, envelope: &StateEnvelope) -> bool {
        let Some(writer) = self.writer.as_mut() else {
            return false;
        };

        let json = match envelope.to_json() {
            Ok(json) => json,
            Err(e) => {
                warn!(session = %self.name, error = %e, "Envelope serialization failed");
                return false;
            }
        };

        match writer.send(WsMessage::Text(json.into())).await {
            Ok(()) => true,
            Err(e) => {
                warn!(session = %self.name, error = %e, "State channel write failed");
                self.mark_disconnected();
                false
            }
        }
    }

    // =========================================================================
    // Teardown
    // =========================================================================

    /// Flags the session as disconnected without touching the reader task
    /// (it observes the broken stream and reports `Closed` on its own).
    pub fn mark_disconnected(&mut self) {
        self.writer = None;
        self.host = None;
        self.state = SessionState::Disconnected;
    }

    /// Closes the channel and stops the reader task.
    pub async fn teardown(&mut self) {
        if let Some(mut writer) = self.writer.take() {
            let _ = writer.close().await;
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.host = None;
        if self.state == SessionState::Connected {
            self.state = SessionState::Disconnected;
        }
    }
}

impl fmt::Debug for StateSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSession")
            .field("index", &self.index)
            .field("name", &self.name)
            .field("role", &self.role)
            .field("state", &self.state)
            .field("host", &self.host)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn test_session(index: usize, events_tx: mpsc::Sender<SessionEvent>) -> StateSession {
        let role = if index == 0 {
            Role::Leader
        } else {
            Role::Participant
        };
        StateSession::new(
            index,
            format!("session-{}", index),
            "token".into(),
            role,
            DeviceIdentity {
                device_id: "dev-1".into(),
                title: "Bridge".into(),
            },
            RedirectResolver::new(
                "wss://redirector.invalid/GetRedirectToYnison",
                "http://music.yandex.ru",
                "dev-1",
                Duration::from_millis(50),
            ),
            "http://music.yandex.ru".into(),
            Duration::from_millis(50),
            events_tx,
        )
    }

    #[test]
    fn test_new_session_is_idle() {
        let (tx, _rx) = mpsc::channel(8);
        let session = test_session(0, tx);
        assert_eq!(session.state(), SessionState::Idle);
        assert!(!session.is_connected());
        assert!(session.host().is_none());
        assert_eq!(session.role(), Role::Leader);
        assert_eq!(session.generation(), 0);
        assert!(!session.name_resolved());
    }

    #[test]
    fn test_set_name_marks_resolved() {
        let (tx, _rx) = mpsc::channel(8);
        let mut session = test_session(1, tx);
        session.set_name("Alice".into());
        assert!(session.name_resolved());
        assert_eq!(session.name(), "Alice");
        assert_eq!(session.identity().title, "Alice");
    }

    #[tokio::test]
    async fn test_send_without_connection_returns_false() {
        let (tx, _rx) = mpsc::channel(8);
        let mut session = test_session(1, tx);

        let envelope = initial_snapshot(
            &DeviceIdentity {
                device_id: "dev-1".into(),
                title: "Bridge".into(),
            },
            Role::Participant,
            1_000,
            "rid-1".to_string(),
        );
        assert!(!session.send(&envelope).await);
        // Not an error state: the session was never connected.
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test]
    async fn test_failed_connect_leaves_disconnected() {
        let (tx, _rx) = mpsc::channel(8);
        let mut session = test_session(1, tx);

        // The redirector host is unresolvable, so connect must fail fast
        // and leave the session in a state the health tick will retry.
        let result = session.connect().await;
        assert!(result.is_err());
        assert_eq!(session.state(), SessionState::Disconnected);
        assert!(result.unwrap_err().is_retryable());
        // The generation only moves on a successful connect; a failed
        // attempt never produces a reader that could emit close events.
        assert_eq!(session.generation(), 0);
    }

    #[test]
    fn test_state_display() {
        assert_eq!(SessionState::Connected.to_string(), "connected");
        assert_eq!(SessionState::Disconnected.to_string(), "disconnected");
    }
}

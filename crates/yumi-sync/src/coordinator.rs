//! # Sync Coordinator
//!
//! Owns every session and runs the whole bridge on one event loop.
//!
//! ## Event Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Coordinator Event Loop                            │
//! │                                                                         │
//! │   reader tasks (one per session)                                        │
//! │   ┌──────────┐ ┌──────────┐ ┌──────────┐                               │
//! │   │ leader   │ │ part. 1  │ │ part. N  │   parse only, no logic        │
//! │   └────┬─────┘ └────┬─────┘ └────┬─────┘                               │
//! │        └────────────┼────────────┘                                     │
//! │                     ▼                                                   │
//! │            one mpsc<SessionEvent>          ┌──────────────┐            │
//! │                     │              ┌───────│ health tick  │            │
//! │                     ▼              ▼       │ (10s default)│            │
//! │            ┌─────────────────────────┐     └──────────────┘            │
//! │            │  single select loop     │                                  │
//! │            │                         │                                  │
//! │            │  leader msg:            │                                  │
//! │            │    verify hosts (once)  │                                  │
//! │            │    rate gate ──► drop?  │                                  │
//! │            │    translate + fan out  │                                  │
//! │            │  participant msg:       │                                  │
//! │            │    now-playing readout  │                                  │
//! │            │  closed: mark session   │                                  │
//! │            │  tick: reconnect parts  │                                  │
//! │            └─────────────────────────┘                                  │
//! │                                                                         │
//! │   One consumer means every event applies in arrival order with no       │
//! │   locks and no reordering.                                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The leader is session 0 and is never auto-reconnected: when its channel
//! drops, the run keeps serving whatever state participants last received
//! and surfaces the loss through the disconnected status only. The operator
//! restarts the process to resume mirroring.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use yumi_core::model::{InboundMessage, Role};
use yumi_core::translate::translate;

use crate::config::BridgeConfig;
use crate::error::{SyncError, SyncResult};
use crate::gate::BroadcastGate;
use crate::metadata::MetadataClient;
use crate::readout;
use crate::redirect::RedirectResolver;
use crate::registry::HostRegistry;
use crate::session::{SessionEvent, StateSession};

/// Capacity of the shared session event channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Run State
// =============================================================================

/// Lifecycle state of a coordinator run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    /// Sessions are being brought up.
    Starting,
    /// Waiting for the first leader message to verify host uniqueness.
    HostVerification,
    /// Hosts verified; mirroring is live.
    Active,
    /// Run ended (shutdown or fatal error).
    Stopped,
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunState::Starting => "starting",
            RunState::HostVerification => "host-verification",
            RunState::Active => "active",
            RunState::Stopped => "stopped",
        };
        write!(f, "{}", s)
    }
}

// =============================================================================
// Sync Coordinator
// =============================================================================

/// Coordinates one leader session and N participant sessions.
pub struct SyncCoordinator {
    /// Bridge configuration (validated at load time).
    config: BridgeConfig,

    /// All sessions; index 0 is the leader.
    sessions: Vec<StateSession>,

    /// Single consumer end of the shared event channel.
    events_rx: mpsc::Receiver<SessionEvent>,

    /// Lossy floor on leader broadcast frequency.
    gate: BroadcastGate,

    /// Host-uniqueness safety gate. Built once on the first leader
    /// message, untouched afterwards.
    registry: HostRegistry,

    /// Read-only metadata collaborator.
    metadata: Arc<MetadataClient>,

    /// Current run state.
    state: RunState,

    /// Successful envelope deliveries across all fan-outs.
    deliveries: u64,
}

impl SyncCoordinator {
    /// Creates a coordinator and its sessions from a validated config.
    pub fn new(config: BridgeConfig) -> Self {
        let (events_tx, events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);

        let resolver = RedirectResolver::new(
            &config.endpoints.redirect_url,
            &config.endpoints.origin,
            config.device_id(),
            Duration::from_secs(config.sync.redirect_timeout_secs),
        );
        let connect_timeout = Duration::from_secs(config.sync.connect_timeout_secs);

        let mut sessions = Vec::with_capacity(1 + config.participants.len());
        let leader_name = config.leader_name();
        sessions.push(StateSession::new(
            0,
            leader_name.clone(),
            config.leader.token.clone(),
            Role::Leader,
            config.identity_for(&leader_name),
            resolver.clone(),
            config.endpoints.origin.clone(),
            connect_timeout,
            events_tx.clone(),
        ));

        for (i, participant) in config.participants.iter().enumerate() {
            let name = config.participant_name(i);
            sessions.push(StateSession::new(
                i + 1,
                name.clone(),
                participant.token.clone(),
                Role::Participant,
                config.identity_for(&name),
                resolver.clone(),
                config.endpoints.origin.clone(),
                connect_timeout,
                events_tx.clone(),
            ));
        }

        let metadata = Arc::new(MetadataClient::new(&config.endpoints.api_base_url));
        let gate = BroadcastGate::new(config.sync.min_broadcast_interval_ms);

        SyncCoordinator {
            config,
            sessions,
            events_rx,
            gate,
            registry: HostRegistry::new(),
            metadata,
            state: RunState::Stopped,
            deliveries: 0,
        }
    }

    /// Current run state.
    pub fn run_state(&self) -> RunState {
        self.state
    }

    /// Number of sessions (leader included).
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    // =========================================================================
    // Run Loop
    // =========================================================================

    /// Brings up all sessions and runs the event loop until a fatal error
    /// occurs or the future is dropped (shutdown).
    pub async fn run(&mut self) -> SyncResult<()> {
        self.state = RunState::Starting;
        info!(
            participants = self.sessions.len() - 1,
            "Bringing up bridge sessions"
        );

        self.resolve_names().await;
        self.connect_all().await?;

        self.state = RunState::HostVerification;
        info!("Sessions up, awaiting first leader message for host verification");

        let mut health = interval(Duration::from_secs(
            self.config.sync.health_check_interval_secs,
        ));
        health.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick fires immediately; burn it so the first
        // real health check happens one full period after startup.
        health.tick().await;

        loop {
            tokio::select! {
                event = self.events_rx.recv() => {
                    match event {
                        Some(SessionEvent::Message { session, message }) => {
                            self.handle_message(session, *message).await?;
                        }
                        Some(SessionEvent::Closed { session, generation }) => {
                            self.handle_closed(session, generation).await;
                        }
                        None => {
                            // Every sender dropped; nothing can happen anymore.
                            self.shutdown().await;
                            return Err(SyncError::ChannelError(
                                "session event channel closed".into(),
                            ));
                        }
                    }
                }
                _ = health.tick() => {
                    self.health_check().await;
                }
            }
        }
    }

    /// Resolves account display names, degrading to configured names.
    /// Sessions left unresolved here are retried on every health tick.
    async fn resolve_names(&mut self) {
        for i in 0..self.sessions.len() {
            self.ensure_name(i).await;
        }
    }

    /// Resolves one session's display name if a lookup has not yet
    /// succeeded. Failure keeps the configured name and is retried later.
    async fn ensure_name(&mut self, index: usize) {
        if self.sessions[index].name_resolved() {
            return;
        }

        match self.metadata.account_status(self.sessions[index].token()).await {
            Ok(account) => {
                debug!(
                    session = %self.sessions[index].name(),
                    account = %account.display_name,
                    plus = account.has_plus,
                    "Resolved account"
                );
                self.sessions[index].set_name(account.display_name);
            }
            Err(e) => {
                warn!(
                    session = %self.sessions[index].name(),
                    error = %e,
                    "Account lookup failed, keeping configured name"
                );
            }
        }
    }

    /// Connects every session at startup, leader first.
    ///
    /// A leader failure aborts the run (there would be nothing to mirror).
    /// A participant failure is logged and left for the health tick.
    async fn connect_all(&mut self) -> SyncResult<()> {
        for i in 0..self.sessions.len() {
            match self.sessions[i].connect().await {
                Ok(host) => {
                    debug!(session = %self.sessions[i].name(), host = %host, "Session up");
                }
                Err(e) if i == 0 => {
                    error!(error = %e, "Leader session failed to connect");
                    self.shutdown().await;
                    return Err(e);
                }
                Err(e) => {
                    warn!(
                        session = %self.sessions[i].name(),
                        error = %e,
                        "Participant failed to connect, will retry on health tick"
                    );
                }
            }
        }
        Ok(())
    }

    // =========================================================================
    // Host Verification
    // =========================================================================

    /// Verifies that every connected identity resolved to a distinct host.
    ///
    /// Runs exactly once, triggered by the first leader message, before
    /// any broadcast. Two identities on one host would let the service
    /// echo the bridge's own broadcasts back as leader input, so a
    /// collision ends the run.
    fn verify_hosts(&mut self) -> SyncResult<()> {
        for i in 0..self.sessions.len() {
            let Some(host) = self.sessions[i].host() else {
                continue;
            };
            let host = host.to_string();
            let name = self.sessions[i].name().to_string();
            // Keyed by session index: display names are not unique
            // across accounts and must not mask a shared host.
            self.registry.register(i, &name, &host)?;
        }
        info!(hosts = self.registry.len(), "All session hosts are unique");
        Ok(())
    }

    // =========================================================================
    // Event Handling
    // =========================================================================

    /// Reacts to a state message from a session.
    async fn handle_message(&mut self, session: usize, message: InboundMessage) -> SyncResult<()> {
        if session != 0 {
            self.handle_participant_message(session, message);
            return Ok(());
        }

        if self.state == RunState::HostVerification {
            if let Err(e) = self.verify_hosts() {
                error!(error = %e, "Host verification failed, stopping run");
                self.shutdown().await;
                return Err(e);
            }
            self.state = RunState::Active;
            info!("Bridge active");
        }

        let now_ms = Utc::now().timestamp_millis();
        if !self.gate.accept(now_ms) {
            return Ok(());
        }

        if message.player_state.is_none() {
            debug!("Leader message carries no player state, nothing to mirror");
            return Ok(());
        }

        let mut attempted = 0usize;
        let mut delivered = 0usize;
        for session in self.sessions.iter_mut().skip(1) {
            if !session.is_connected() {
                continue;
            }
            attempted += 1;

            let identity = session.identity().clone();
            let envelope =
                match translate(&message, &identity, now_ms, Uuid::new_v4().to_string()) {
                    Ok(envelope) => envelope,
                    Err(e) => {
                        debug!(error = %e, "Translation skipped");
                        continue;
                    }
                };

            if session.send(&envelope).await {
                delivered += 1;
            }
        }
        self.deliveries += delivered as u64;

        if attempted > 0 {
            info!("{}", readout::broadcast_line(attempted, delivered));
        }
        Ok(())
    }

    /// Emits a now-playing readout for a participant message.
    ///
    /// The track lookup is fire-and-continue: a slow or failing catalog
    /// API degrades the readout text, never message dispatch. Messages
    /// without a resolvable current track mean nothing to display.
    fn handle_participant_message(&self, session: usize, message: InboundMessage) {
        let Some(track_id) = message.current_playable_id().map(str::to_string) else {
            return;
        };

        let metadata = Arc::clone(&self.metadata);
        let name = self.sessions[session].name().to_string();

        tokio::spawn(async move {
            let track = match metadata.track_info(&track_id).await {
                Ok(track) => Some(track),
                Err(e) => {
                    debug!(track_id = %track_id, error = %e, "Track lookup failed");
                    None
                }
            };
            info!(
                "{}",
                readout::now_playing_line(&name, track.as_ref(), &track_id, &message)
            );
        });
    }

    /// Reacts to a session's channel closing.
    ///
    /// Close events carry the connection generation they belong to. A
    /// reader that outlives a reconnect reports the OLD generation; acting
    /// on it would tear down the fresh connection, so stale events are
    /// dropped here.
    ///
    /// A lost participant waits for the health tick. A lost leader is
    /// surfaced but does not end the run: participants keep the state
    /// they last received until the operator restarts.
    async fn handle_closed(&mut self, session: usize, generation: u64) {
        if generation != self.sessions[session].generation() {
            debug!(
                session = %self.sessions[session].name(),
                stale = generation,
                current = self.sessions[session].generation(),
                "Ignoring close event from a superseded connection"
            );
            return;
        }

        let name = self.sessions[session].name().to_string();
        self.sessions[session].mark_disconnected();

        if session == 0 {
            warn!(
                session = %name,
                "Leader channel lost; mirroring suspended until restart"
            );
        } else {
            warn!(session = %name, "Participant channel lost, will retry on health tick");
        }
    }

    /// Retries unresolved account names and reconnects disconnected
    /// participants. The leader channel is never retried.
    async fn health_check(&mut self) {
        for i in 0..self.sessions.len() {
            self.ensure_name(i).await;
        }

        for i in 1..self.sessions.len() {
            if self.sessions[i].is_connected() {
                continue;
            }

            let name = self.sessions[i].name().to_string();
            info!(session = %name, "Health check reconnecting participant");
            match self.sessions[i].connect().await {
                Ok(host) => {
                    info!(session = %name, host = %host, "Participant reconnected");
                }
                Err(e) => {
                    warn!(session = %name, error = %e, "Reconnect failed");
                }
            }
        }
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Tears down every session and reports run statistics.
    pub async fn shutdown(&mut self) {
        if self.state == RunState::Stopped {
            return;
        }

        for session in &mut self.sessions {
            session.teardown().await;
        }
        self.state = RunState::Stopped;

        info!(
            accepted = self.gate.accepted(),
            dropped = self.gate.dropped(),
            deliveries = self.deliveries,
            "Bridge stopped"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CredentialSettings;
    use crate::session::SessionState;

    fn test_config(participants: usize) -> BridgeConfig {
        let mut config = BridgeConfig::default();
        config.leader.token = "leader-token".into();
        for i in 0..participants {
            config.participants.push(CredentialSettings {
                token: format!("p{}-token", i + 1),
                name: String::new(),
            });
        }
        config
    }

    #[test]
    fn test_sessions_built_from_config() {
        let coordinator = SyncCoordinator::new(test_config(2));
        assert_eq!(coordinator.session_count(), 3);
        assert_eq!(coordinator.sessions[0].role(), Role::Leader);
        assert_eq!(coordinator.sessions[0].name(), "Leader");
        assert_eq!(coordinator.sessions[1].role(), Role::Participant);
        assert_eq!(coordinator.sessions[2].name(), "Participant-2");
        assert_eq!(coordinator.run_state(), RunState::Stopped);
    }

    #[test]
    fn test_all_sessions_share_device_id() {
        let coordinator = SyncCoordinator::new(test_config(2));
        let leader_id = coordinator.sessions[0].identity().device_id.clone();
        for session in &coordinator.sessions {
            assert_eq!(session.identity().device_id, leader_id);
        }
    }

    #[tokio::test]
    async fn test_first_leader_message_completes_verification() {
        let mut coordinator = SyncCoordinator::new(test_config(1));
        coordinator.state = RunState::HostVerification;

        // No connected sessions means no hosts to collide; the run goes
        // live on the first leader message.
        let message = InboundMessage::from_json(
            r#"{"player_state": {"status": {"paused": false}}}"#,
        );
        coordinator.handle_message(0, message).await.unwrap();
        assert_eq!(coordinator.run_state(), RunState::Active);
        assert_eq!(coordinator.gate.accepted(), 1);
    }

    #[tokio::test]
    async fn test_participant_message_never_fans_out() {
        let mut coordinator = SyncCoordinator::new(test_config(1));
        coordinator.state = RunState::Active;
        let message = InboundMessage::from_json(
            r#"{"player_state": {"status": {"paused": false}}}"#,
        );
        // No gate consumption, no delivery attempt, no state change.
        coordinator.handle_message(1, message).await.unwrap();
        assert_eq!(coordinator.gate.accepted(), 0);
        assert_eq!(coordinator.deliveries, 0);
    }

    #[tokio::test]
    async fn test_leader_close_keeps_run_alive() {
        let mut coordinator = SyncCoordinator::new(test_config(1));
        coordinator.state = RunState::Active;
        coordinator.handle_closed(0, 0).await;
        // Surfaced via session status only; the run itself continues.
        assert_eq!(coordinator.run_state(), RunState::Active);
        assert!(!coordinator.sessions[0].is_connected());
    }

    #[tokio::test]
    async fn test_participant_close_is_survivable() {
        let mut coordinator = SyncCoordinator::new(test_config(1));
        coordinator.state = RunState::Active;
        coordinator.handle_closed(1, 0).await;
        assert_eq!(coordinator.run_state(), RunState::Active);
    }

    #[tokio::test]
    async fn test_stale_close_event_is_ignored() {
        let mut coordinator = SyncCoordinator::new(test_config(1));
        coordinator.state = RunState::Active;
        // A reader left over from a previous connection reports its own
        // generation; a mismatch must not touch the current session state.
        coordinator.handle_closed(1, 7).await;
        assert_eq!(coordinator.sessions[1].state(), SessionState::Idle);
        assert_eq!(coordinator.run_state(), RunState::Active);
    }

    #[tokio::test]
    async fn test_gate_consumed_before_player_state_check() {
        let mut coordinator = SyncCoordinator::new(test_config(0));
        coordinator.state = RunState::Active;
        // A leader message without player_state still consumes the gate
        // window, matching the order the checks are applied in.
        let empty = InboundMessage::from_json("{}");
        coordinator.handle_message(0, empty).await.unwrap();
        assert_eq!(coordinator.gate.accepted(), 1);
        assert_eq!(coordinator.deliveries, 0);
    }
}

//! # Sync Error Types
//!
//! Error types for the bridge's sync engine.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │    Redirect     │  │     Connection          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  RedirectFailed │  │  ConnectionFailed       │ │
//! │  │  MissingToken   │  │  RedirectTimeout│  │  Disconnected           │ │
//! │  │  InvalidUrl     │  │  MissingHost    │  │  WebSocketError / Tls   │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │     Safety      │  │    Metadata     │  │      Protocol           │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  HostCollision  │  │  LookupFailed   │  │  SerializationFailed    │ │
//! │  │  (FATAL)        │  │  (degrade only) │  │  ChannelError           │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Retry policy: redirect and connection failures are retried wholesale on
//! the next health tick; a host collision stops the whole run; metadata
//! failures only ever degrade a readout.

use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering all possible bridge failures.
///
/// ## Design Principles
/// - Each variant includes enough context for debugging
/// - Errors are categorized for different handling strategies
/// - All errors are `Send + Sync` for async compatibility
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid bridge configuration.
    #[error("Invalid bridge configuration: {0}")]
    InvalidConfig(String),

    /// Missing leader token (required for the bridge to do anything).
    #[error("Leader token not configured. Supply it via bridge.toml or YUMI_LEADER_TOKEN.")]
    MissingLeaderToken,

    /// Invalid endpoint URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Redirect Errors
    // =========================================================================
    /// Redirect handshake failed.
    #[error("Redirect handshake failed: {0}")]
    RedirectFailed(String),

    /// Redirect handshake timed out.
    #[error("Redirect handshake timed out after {0} seconds")]
    RedirectTimeout(u64),

    /// Redirect payload carried no host field.
    #[error("Redirect payload has no host: {0}")]
    MissingHost(String),

    // =========================================================================
    // Connection Errors
    // =========================================================================
    /// Failed to open the state channel.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// State channel disconnected.
    #[error("Disconnected from state channel")]
    Disconnected,

    /// Connection timeout.
    #[error("Connection timeout after {0} seconds")]
    Timeout(u64),

    /// TLS/SSL error.
    #[error("TLS error: {0}")]
    TlsError(String),

    /// WebSocket protocol error.
    #[error("WebSocket error: {0}")]
    WebSocketError(String),

    // =========================================================================
    // Safety Errors
    // =========================================================================
    /// Two local identities resolved to the same routing host.
    ///
    /// Broadcasting one identity's state into the other would create a
    /// feedback loop indistinguishable from self-sync, so this is fatal to
    /// the entire run - stop everything, never retry.
    #[error("Host collision: '{second}' resolved to the same host as '{first}': {host}")]
    HostCollision {
        /// Identity that registered the host first.
        first: String,
        /// Identity that collided.
        second: String,
        /// The shared routing host.
        host: String,
    },

    // =========================================================================
    // Protocol Errors
    // =========================================================================
    /// Failed to serialize an outbound envelope.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    // =========================================================================
    // Metadata Errors
    // =========================================================================
    /// Metadata collaborator HTTP call failed.
    ///
    /// Degrades the affected readout only; never propagates to connection
    /// logic.
    #[error("Metadata lookup failed: {0}")]
    MetadataLookupFailed(String),

    /// Metadata payload missing an expected field.
    #[error("Malformed metadata payload: {0}")]
    MalformedMetadata(String),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for SyncError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error as WsError;
        match err {
            WsError::ConnectionClosed => SyncError::Disconnected,
            WsError::AlreadyClosed => SyncError::Disconnected,
            WsError::Protocol(p) => SyncError::WebSocketError(p.to_string()),
            WsError::Io(io) => SyncError::ConnectionFailed(io.to_string()),
            WsError::Tls(tls) => SyncError::TlsError(tls.to_string()),
            other => SyncError::WebSocketError(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        SyncError::MetadataLookupFailed(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if this error is recoverable and the session can be
    /// retried wholesale on the next health tick.
    ///
    /// ## Retryable Errors
    /// - Redirect handshake failures and timeouts
    /// - Connection failures and disconnections
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Host collisions (fatal to the run)
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::RedirectFailed(_)
                | SyncError::RedirectTimeout(_)
                | SyncError::MissingHost(_)
                | SyncError::ConnectionFailed(_)
                | SyncError::Disconnected
                | SyncError::Timeout(_)
                | SyncError::WebSocketError(_)
                | SyncError::TlsError(_)
        )
    }

    /// Returns true if this error must stop the entire run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::HostCollision { .. })
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::MissingLeaderToken
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }

    /// Returns true if this error only degrades a readout.
    pub fn is_metadata_error(&self) -> bool {
        matches!(
            self,
            SyncError::MetadataLookupFailed(_) | SyncError::MalformedMetadata(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::RedirectFailed("boom".into()).is_retryable());
        assert!(SyncError::ConnectionFailed("network error".into()).is_retryable());
        assert!(SyncError::Disconnected.is_retryable());
        assert!(SyncError::RedirectTimeout(30).is_retryable());

        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::MissingLeaderToken.is_retryable());
    }

    #[test]
    fn test_host_collision_is_fatal_not_retryable() {
        let err = SyncError::HostCollision {
            first: "leader".into(),
            second: "participant-1".into(),
            host: "ynison.example".into(),
        };
        assert!(err.is_fatal());
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("ynison.example"));
        assert!(err.to_string().contains("participant-1"));
    }

    #[test]
    fn test_metadata_errors_degrade_only() {
        let err = SyncError::MetadataLookupFailed("503".into());
        assert!(err.is_metadata_error());
        assert!(!err.is_retryable());
        assert!(!err.is_fatal());
    }
}

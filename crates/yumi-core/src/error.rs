//! # Translation Error Types
//!
//! Error types for the pure translation layer.

use thiserror::Error;

/// Errors from the leader-to-participant state translation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TranslateError {
    /// The leader snapshot carries no player state yet.
    ///
    /// This signals "not yet applicable", not a hard failure: the caller
    /// should skip the broadcast cycle, not abort the run.
    #[error("leader message has no player_state; nothing to translate")]
    MissingPlayerState,
}

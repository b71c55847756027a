//! # Host Registry
//!
//! Feedback-loop protection. All bridge sessions present the same device
//! id; if two of them were routed to the same backend host, the service
//! could treat a participant's mirrored state as fresh leader input and
//! the bridge would amplify its own broadcasts forever. The registry
//! records which session claimed which host and refuses duplicates.
//!
//! A collision is fatal to the whole run, never retried.

use std::collections::HashMap;

use tracing::debug;

use crate::error::{SyncError, SyncResult};

/// Host-uniqueness safety gate.
///
/// Claims are keyed by session index, not display name: two accounts can
/// resolve to the same display name, and the gate must still trip when
/// they share a host. Names are carried along for error reporting only.
#[derive(Debug, Default)]
pub struct HostRegistry {
    /// host -> (session key, display name) of the first claimant.
    claims: HashMap<String, (usize, String)>,
}

impl HostRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `host` for the session `key` (displayed as `name`).
    ///
    /// Re-registering the same key on any host is fine (reconnects
    /// re-resolve and may land elsewhere). A host already claimed by a
    /// DIFFERENT key is a collision.
    pub fn register(&mut self, key: usize, name: &str, host: &str) -> SyncResult<()> {
        // Drop the key's previous claim first so a reconnect that
        // happens to land on its own old host is not a self-collision.
        self.claims.retain(|_, (owner, _)| *owner != key);

        if let Some((_, first)) = self.claims.get(host) {
            return Err(SyncError::HostCollision {
                first: first.clone(),
                second: name.to_string(),
                host: host.to_string(),
            });
        }

        debug!(key, name = %name, host = %host, "Host claimed");
        self.claims.insert(host.to_string(), (key, name.to_string()));
        Ok(())
    }

    /// Number of live claims.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// True when no host is claimed.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }
}

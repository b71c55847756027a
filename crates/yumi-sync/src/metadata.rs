//! # Metadata Client
//!
//! Read-only HTTP collaborator against the public catalog API. Used for two
//! things only: resolving account info when the bridge starts, and resolving
//! track titles for the now-playing readout.
//!
//! Failures here never touch connection logic. A failed lookup degrades the
//! affected readout to the raw track id and nothing else.
//!
//! Parsing is split into pure functions over `serde_json::Value` so the
//! payload handling unit-tests without HTTP.

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::error::{SyncError, SyncResult};
use crate::redirect::USER_AGENT;

/// Per-request ceiling for metadata lookups. A hung catalog API must not
/// stall startup or pin readout tasks forever.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Types
// =============================================================================

/// Resolved account info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountInfo {
    /// Numeric account id.
    pub uid: Option<i64>,

    /// Account login.
    pub login: String,

    /// Display name, falling back to the login.
    pub display_name: String,

    /// Whether the account has an active Plus subscription.
    pub has_plus: bool,

    /// Whether an auto-renewable subscription is active.
    pub subscription_active: bool,
}

/// Resolved track info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    /// Track id.
    pub id: String,

    /// Track title.
    pub title: String,

    /// Track duration in milliseconds.
    pub duration_ms: i64,

    /// Artist names in catalog order.
    pub artists: Vec<String>,

    /// First album title, when the track belongs to one.
    pub album: Option<String>,

    /// Cover image URI.
    pub cover: Option<String>,
}

impl TrackInfo {
    /// Formats as `Title - Artist, Artist`.
    pub fn display(&self) -> String {
        if self.artists.is_empty() {
            self.title.clone()
        } else {
            format!("{} - {}", self.title, self.artists.join(", "))
        }
    }
}

// =============================================================================
// Payload Parsing
// =============================================================================

/// Extracts account info from an `/account/status` payload.
pub fn parse_account(payload: &Value) -> SyncResult<AccountInfo> {
    let result = payload
        .get("result")
        .ok_or_else(|| SyncError::MalformedMetadata("no result".into()))?;
    let account = result
        .get("account")
        .ok_or_else(|| SyncError::MalformedMetadata("no result.account".into()))?;

    let login = account
        .get("login")
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::MalformedMetadata("no account login".into()))?
        .to_string();
    let display_name = account
        .get("displayName")
        .and_then(Value::as_str)
        .unwrap_or(&login)
        .to_string();

    let subscription_active = result
        .get("subscription")
        .and_then(|s| s.get("autoRenewable"))
        .and_then(Value::as_array)
        .is_some_and(|a| !a.is_empty());

    Ok(AccountInfo {
        uid: account.get("uid").and_then(Value::as_i64),
        login,
        display_name,
        has_plus: result
            .get("plus")
            .and_then(|p| p.get("hasPlus"))
            .and_then(Value::as_bool)
            .unwrap_or(false),
        subscription_active,
    })
}

/// Extracts track info from a `/tracks/{id}/full-info` payload.
pub fn parse_track(payload: &Value) -> SyncResult<TrackInfo> {
    let track = payload
        .get("result")
        .and_then(|r| r.get("track"))
        .ok_or_else(|| SyncError::MalformedMetadata("no result.track".into()))?;

    let title = track
        .get("title")
        .and_then(Value::as_str)
        .ok_or_else(|| SyncError::MalformedMetadata("no track title".into()))?;

    let artists = track
        .get("artists")
        .and_then(Value::as_array)
        .map(|list| {
            list.iter()
                .filter_map(|a| a.get("name").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let album = track
        .get("albums")
        .and_then(|a| a.get(0))
        .and_then(|a| a.get("title"))
        .and_then(Value::as_str)
        .map(str::to_string);

    let cover = track
        .get("ogImage")
        .or_else(|| track.get("coverUri"))
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(TrackInfo {
        id: track
            .get("id")
            .map(|id| match id {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .unwrap_or_default(),
        title: title.to_string(),
        duration_ms: track.get("durationMs").and_then(Value::as_i64).unwrap_or(0),
        artists,
        album,
        cover,
    })
}

// =============================================================================
// Metadata Client
// =============================================================================

/// HTTP client for read-only metadata lookups.
#[derive(Debug, Clone)]
pub struct MetadataClient {
    /// Shared connection pool.
    http: Client,

    /// Catalog API base URL.
    base_url: String,
}

impl MetadataClient {
    /// Creates a client against the given API base. Every request carries
    /// a hard timeout so lookups always resolve one way or the other.
    pub fn new(base_url: &str) -> Self {
        let http = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_else(|_| Client::new());
        MetadataClient {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Resolves account info for a token.
    pub async fn account_status(&self, token: &str) -> SyncResult<AccountInfo> {
        let url = format!("{}/account/status", self.base_url);
        debug!(url = %url, "Fetching account status");

        let payload: Value = self
            .http
            .get(&url)
            .header("Authorization", format!("OAuth {}", token))
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_account(&payload)
    }

    /// Resolves a track's title and artists. The endpoint is public; no
    /// token is needed.
    pub async fn track_info(&self, track_id: &str) -> SyncResult<TrackInfo> {
        let url = format!("{}/tracks/{}/full-info", self.base_url, track_id);
        debug!(url = %url, "Fetching track info");

        let payload: Value = self
            .http
            .get(&url)
            .header("User-Agent", USER_AGENT)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        parse_track(&payload)
    }
}

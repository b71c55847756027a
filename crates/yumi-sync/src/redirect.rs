//! # Redirect Handshake
//!
//! The short-lived first phase of the Ynison handshake: a token plus a
//! device identity is exchanged for a routing target (host + single-use
//! ticket) that the persistent state channel is then opened against.
//!
//! ## Handshake Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Two-Phase Handshake                                │
//! │                                                                         │
//! │  PHASE 1 (this module)                                                 │
//! │  ─────────────────────                                                 │
//! │  open wss://…/GetRedirectToYnison                                      │
//! │    Sec-WebSocket-Protocol: Bearer, v2, {"Ynison-Device-Id":…,          │
//! │                                         "Ynison-Device-Info":…}        │
//! │    Authorization: OAuth <token>                                        │
//! │  ◄── one message: { host, redirect_ticket, … }                         │
//! │  close immediately (this is NOT the session channel)                   │
//! │                                                                         │
//! │  PHASE 2 (session module)                                              │
//! │  ────────────────────────                                              │
//! │  open wss://{host}/…/PutYnisonState with the ticket added to the       │
//! │  subprotocol header                                                    │
//! │                                                                         │
//! │  Tickets are single-use: every reconnect re-resolves from scratch.     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use futures_util::StreamExt;
use serde::Deserialize;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::tungstenite::handshake::client::Request;
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tracing::{debug, info};

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Constants
// =============================================================================

/// Device info announced in the subprotocol header.
pub const DEVICE_INFO: &str = r#"{"app_name":"Yandex Music API","type":1}"#;

/// User agent presented on both handshake phases.
pub const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

// =============================================================================
// Routing Target
// =============================================================================

/// The result of a redirect handshake.
///
/// Consumed immediately to open the persistent connection; never reused
/// across reconnects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingTarget {
    /// Routing host assigned by the redirector.
    pub host: String,

    /// Single-use ticket for the state channel handshake.
    pub redirect_ticket: String,
}

/// Raw redirect payload as received from the redirector.
#[derive(Debug, Default, Deserialize)]
struct RedirectPayload {
    #[serde(default)]
    host: Option<String>,

    #[serde(default)]
    redirect_ticket: Option<String>,
}

/// Parses a redirect payload, requiring the `host` field.
pub fn parse_redirect(text: &str) -> SyncResult<RoutingTarget> {
    let payload: RedirectPayload = serde_json::from_str(text)
        .map_err(|e| SyncError::RedirectFailed(format!("unparsable payload: {}", e)))?;

    match payload.host {
        Some(host) if !host.is_empty() => Ok(RoutingTarget {
            host,
            redirect_ticket: payload.redirect_ticket.unwrap_or_default(),
        }),
        _ => Err(SyncError::MissingHost(truncate(text, 200))),
    }
}

fn truncate(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

// =============================================================================
// Subprotocol Header
// =============================================================================

/// Builds the `Sec-WebSocket-Protocol` capability announcement.
///
/// The service multiplexes auth scheme, protocol version and device
/// identity through this single header: `Bearer, v2, {json}`. The state
/// channel handshake adds the redirect ticket to the same JSON object.
pub fn subprotocol_header(device_id: &str, ticket: Option<&str>) -> String {
    let mut proto = serde_json::Map::new();
    proto.insert(
        "Ynison-Device-Id".to_string(),
        serde_json::Value::String(device_id.to_string()),
    );
    proto.insert(
        "Ynison-Device-Info".to_string(),
        serde_json::Value::String(DEVICE_INFO.to_string()),
    );
    if let Some(ticket) = ticket {
        proto.insert(
            "Ynison-Redirect-Ticket".to_string(),
            serde_json::Value::String(ticket.to_string()),
        );
    }

    format!("Bearer, v2, {}", serde_json::Value::Object(proto))
}

/// Builds a WebSocket client request with the Ynison handshake headers.
pub fn handshake_request(
    url: &str,
    token: &str,
    origin: &str,
    subprotocol: &str,
) -> SyncResult<Request> {
    let mut request = url
        .into_client_request()
        .map_err(|e| SyncError::InvalidUrl(e.to_string()))?;

    let headers = request.headers_mut();
    headers.insert(
        "Sec-WebSocket-Protocol",
        header_value(subprotocol)?,
    );
    headers.insert("Origin", header_value(origin)?);
    headers.insert("Authorization", header_value(&format!("OAuth {}", token))?);
    headers.insert("User-Agent", header_value(USER_AGENT)?);

    Ok(request)
}

fn header_value(value: &str) -> SyncResult<HeaderValue> {
    HeaderValue::from_str(value)
        .map_err(|e| SyncError::RedirectFailed(format!("invalid header value: {}", e)))
}

// =============================================================================
// Redirect Resolver
// =============================================================================

/// Performs the redirect handshake for one identity.
#[derive(Debug, Clone)]
pub struct RedirectResolver {
    /// Fixed redirector endpoint.
    redirect_url: String,

    /// Origin header expected by the service.
    origin: String,

    /// Stable device id embedded in the capability announcement.
    device_id: String,

    /// Handshake ceiling.
    timeout: Duration,
}

impl RedirectResolver {
    /// Creates a resolver.
    pub fn new(redirect_url: &str, origin: &str, device_id: &str, timeout: Duration) -> Self {
        RedirectResolver {
            redirect_url: redirect_url.to_string(),
            origin: origin.to_string(),
            device_id: device_id.to_string(),
            timeout,
        }
    }

    /// Resolves a token into a routing target.
    ///
    /// Opens a short-lived connection to the redirector, reads exactly one
    /// message and closes. Fails when the connection cannot be opened, the
    /// ceiling elapses, or the payload carries no `host`.
    pub async fn resolve(&self, token: &str) -> SyncResult<RoutingTarget> {
        debug!(device_id = %self.device_id, "Requesting redirect");

        let subprotocol = subprotocol_header(&self.device_id, None);
        let request = handshake_request(&self.redirect_url, token, &self.origin, &subprotocol)?;

        let target = timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| SyncError::RedirectTimeout(self.timeout.as_secs()))??;

        info!(host = %target.host, "Redirect received");
        Ok(target)
    }

    /// Opens the redirector connection and reads exactly one message.
    async fn exchange(&self, request: Request) -> SyncResult<RoutingTarget> {
        let (mut ws_stream, response) = connect_async(request)
            .await
            .map_err(SyncError::from)?;
        debug!(status = ?response.status(), "Redirector handshake complete");

        // The redirector sends one payload and has nothing else to say.
        let target = loop {
            match ws_stream.next().await {
                Some(Ok(WsMessage::Text(text))) => break parse_redirect(&text)?,
                Some(Ok(WsMessage::Ping(_) | WsMessage::Pong(_))) => continue,
                Some(Ok(WsMessage::Close(frame))) => {
                    return Err(SyncError::RedirectFailed(format!(
                        "redirector closed before payload: {:?}",
                        frame
                    )));
                }
                Some(Ok(other)) => {
                    return Err(SyncError::RedirectFailed(format!(
                        "unexpected redirector frame: {:?}",
                        other
                    )));
                }
                Some(Err(e)) => return Err(SyncError::from(e)),
                None => {
                    return Err(SyncError::RedirectFailed(
                        "redirector stream ended before payload".into(),
                    ));
                }
            }
        };

        // Not the session channel - close immediately.
        let _ = ws_stream.close(None).await;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_redirect_with_host() {
        let target =
            parse_redirect(r#"{"host": "ynison.host.example", "redirect_ticket": "t-1"}"#).unwrap();
        assert_eq!(target.host, "ynison.host.example");
        assert_eq!(target.redirect_ticket, "t-1");
    }

    #[test]
    fn test_parse_redirect_without_host() {
        let err = parse_redirect(r#"{"error": "denied"}"#).unwrap_err();
        assert!(matches!(err, SyncError::MissingHost(_)));

        let err = parse_redirect(r#"{"host": ""}"#).unwrap_err();
        assert!(matches!(err, SyncError::MissingHost(_)));
    }

    #[test]
    fn test_parse_redirect_malformed() {
        let err = parse_redirect("not json").unwrap_err();
        assert!(matches!(err, SyncError::RedirectFailed(_)));
    }

    #[test]
    fn test_subprotocol_header_without_ticket() {
        let header = subprotocol_header("dev-1", None);
        assert!(header.starts_with("Bearer, v2, {"));
        assert!(header.contains("\"Ynison-Device-Id\":\"dev-1\""));
        assert!(header.contains("Ynison-Device-Info"));
        assert!(!header.contains("Ynison-Redirect-Ticket"));
    }

    #[test]
    fn test_subprotocol_header_with_ticket() {
        let header = subprotocol_header("dev-1", Some("ticket-9"));
        assert!(header.contains("\"Ynison-Redirect-Ticket\":\"ticket-9\""));
    }

    #[test]
    fn test_handshake_request_headers() {
        let subprotocol = subprotocol_header("dev-1", None);
        let request = handshake_request(
            "wss://redirector.example/GetRedirectToYnison",
            "tok",
            "http://music.yandex.ru",
            &subprotocol,
        )
        .unwrap();

        let headers = request.headers();
        assert_eq!(
            headers.get("Authorization").unwrap().to_str().unwrap(),
            "OAuth tok"
        );
        assert_eq!(
            headers.get("Origin").unwrap().to_str().unwrap(),
            "http://music.yandex.ru"
        );
        assert!(headers
            .get("Sec-WebSocket-Protocol")
            .unwrap()
            .to_str()
            .unwrap()
            .starts_with("Bearer, v2,"));
    }
}

//! # Ynison Wire Model
//!
//! Typed schemas for the Ynison JSON wire format.
//!
//! ## Schema Policy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Wire Schema Policy                                 │
//! │                                                                         │
//! │  OUTBOUND (strict, canonical)       │  INBOUND (lenient)                │
//! │  ────────────────────────────       │  ─────────────────                │
//! │  • Every field enumerated           │  • Every field defaulted          │
//! │  • Unset optionals serialize as     │  • Unknown fields ignored         │
//! │    explicit null, NOT omitted       │  • Malformed payloads become      │
//! │    (the service distinguishes       │    "nothing actionable", never    │
//! │    absent from present-but-null)    │    a parse panic                  │
//! │                                     │                                   │
//! │  OUTBOUND ENVELOPE                                                      │
//! │  ─────────────────                                                      │
//! │  { update_full_state: { player_state, device, is_currently_active },    │
//! │    rid, player_action_timestamp_ms, activity_interception_type }        │
//! │                                                                         │
//! │  INBOUND MESSAGE                                                        │
//! │  ───────────────                                                        │
//! │  { player_state: { status, player_queue }, devices: [ ... ] }           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Wire Constants
// =============================================================================

/// Entity type used for a queue that is not tied to a single entity.
pub const ENTITY_TYPE_VARIOUS: &str = "VARIOUS";

/// Default repeat mode.
pub const REPEAT_MODE_NONE: &str = "NONE";

/// Default entity context for queues.
pub const ENTITY_CONTEXT_DEFAULT: &str = "BASED_ON_ENTITY_BY_DEFAULT";

/// Default activity interception policy for relay-originated updates.
pub const INTERCEPTION_DEFAULT: &str = "DO_NOT_INTERCEPT_BY_DEFAULT";

/// Device type reported to the service.
pub const DEVICE_TYPE_WEB: &str = "WEB";

/// Volume applied when no playback-capable leader device is found.
pub const FALLBACK_VOLUME: f64 = 0.85;

// =============================================================================
// Role
// =============================================================================

/// The role an identity plays in the bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// The identity whose playback state is authoritative.
    Leader,
    /// An identity that receives translated state and never originates it.
    Participant,
}

impl Role {
    /// Returns true if this role may act as a remote controller.
    ///
    /// Only participants announce remote-controller capability in their
    /// initial snapshot; the leader's own state is authoritative already.
    pub fn can_be_remote_controller(&self) -> bool {
        matches!(self, Role::Participant)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Leader => write!(f, "leader"),
            Role::Participant => write!(f, "participant"),
        }
    }
}

// =============================================================================
// Device Identity
// =============================================================================

/// The local device identity presented to the service.
///
/// The id must stay stable for the whole process run: the service registers
/// a new device per unknown id, so an unstable id pollutes the account's
/// device list with one ghost entry per restart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    /// Stable device id (UUID v4, fixed for the process lifetime).
    pub device_id: String,

    /// Human-readable title shown in the service's device list.
    pub title: String,
}

// =============================================================================
// Version Stamp
// =============================================================================

/// Causality metadata attached to every mutable sub-state.
///
/// The service resolves concurrent updates across devices with
/// last-writer-wins ordering over `version`, which must therefore be
/// non-decreasing per `device_id`. Wall-clock milliseconds satisfy that
/// within a single process run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionStamp {
    /// Device this stamp belongs to.
    pub device_id: String,

    /// Monotonic version (milliseconds since epoch).
    pub version: i64,

    /// Stamp creation time in milliseconds.
    ///
    /// Translated snapshots force this to 0 - the service's "unset" sentinel
    /// for relay-originated updates. Flagged as a possible protocol quirk;
    /// do not change without verification against the live service.
    pub timestamp_ms: i64,
}

impl VersionStamp {
    /// Creates a stamp for `device_id` at `now_ms`.
    pub fn at(device_id: &str, now_ms: i64) -> Self {
        VersionStamp {
            device_id: device_id.to_string(),
            version: now_ms,
            timestamp_ms: now_ms,
        }
    }

    /// Creates a relay stamp: fresh version, zeroed timestamp.
    pub fn relay(device_id: &str, now_ms: i64) -> Self {
        VersionStamp {
            device_id: device_id.to_string(),
            version: now_ms,
            timestamp_ms: 0,
        }
    }
}

// =============================================================================
// Device Descriptor (outbound)
// =============================================================================

/// Capability flags announced for a device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Capabilities {
    /// Whether this device can play audio itself.
    pub can_be_player: bool,

    /// Whether this device can remote-control another player.
    pub can_be_remote_controller: bool,

    /// Number of discrete volume steps the device supports.
    pub volume_granularity: u32,
}

/// Static device information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Stable device id.
    pub device_id: String,

    /// Device type tag (always "WEB" for the bridge).
    #[serde(rename = "type")]
    pub device_type: String,

    /// Title shown in the service's device list.
    pub title: String,

    /// Application name.
    pub app_name: String,

    /// Application version (only sent on translated snapshots).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub app_version: Option<String>,
}

/// Volume state for a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VolumeInfo {
    /// Volume level.
    pub volume: f64,

    /// Version stamp for the volume value (explicit null when unset).
    pub version: Option<VersionStamp>,
}

/// Full outbound device descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Device {
    /// Flat volume value (only present on translated snapshots).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,

    /// Capability flags.
    pub capabilities: Capabilities,

    /// Static device information.
    pub info: DeviceInfo,

    /// Volume state.
    pub volume_info: VolumeInfo,

    /// Shadow devices are hidden from the device list.
    pub is_shadow: bool,
}

// =============================================================================
// Playback Status
// =============================================================================

/// Playback position and pause state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStatus {
    /// Track duration in milliseconds.
    pub duration_ms: i64,

    /// Pause flag.
    pub paused: bool,

    /// Playback speed multiplier.
    pub playback_speed: f64,

    /// Playback position in milliseconds.
    pub progress_ms: i64,

    /// Version stamp for this status.
    pub version: VersionStamp,
}

// =============================================================================
// Play Queue (outbound)
// =============================================================================

/// A track in the canonical outbound field set.
///
/// Unset optional fields serialize as explicit `null` rather than being
/// omitted: the service treats absent and present-but-null differently for
/// several of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueTrack {
    /// Album id, passed through verbatim from the leader (null when unset).
    pub album_id_optional: Option<Value>,

    /// Source context the track was queued from.
    pub from: String,

    /// Track id.
    pub playable_id: String,

    /// Playable type ("TRACK" by default).
    pub playable_type: String,

    /// Track title.
    pub title: String,

    /// Cover URL, passed through verbatim (null when unset).
    pub cover_url_optional: Option<Value>,

    /// Navigation id (never set by the bridge).
    pub navigation_id_optional: Option<Value>,

    /// Playback action id (never set by the bridge).
    pub playback_action_id_optional: Option<Value>,
}

/// Queue repeat options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueOptions {
    /// Repeat mode ("NONE", "ONE", "ALL").
    pub repeat_mode: String,
}

impl Default for QueueOptions {
    fn default() -> Self {
        QueueOptions {
            repeat_mode: REPEAT_MODE_NONE.to_string(),
        }
    }
}

/// Full outbound play queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerQueue {
    /// Id of the entity (album, playlist, ...) the queue was built from.
    pub entity_id: String,

    /// Type of that entity.
    pub entity_type: String,

    /// Index of the current track in `playable_list` (-1 = none).
    pub current_playable_index: i32,

    /// Ordered track list.
    pub playable_list: Vec<QueueTrack>,

    /// Shuffle permutation (null when not shuffled).
    pub shuffle_optional: Option<Value>,

    /// Repeat options.
    pub options: QueueOptions,

    /// Entity context tag.
    pub entity_context: String,

    /// Queue source context (null when unset).
    pub from_optional: Option<Value>,

    /// Initial entity (never set by the bridge).
    pub initial_entity_optional: Option<Value>,

    /// Adding options (never set by the bridge).
    pub adding_options_optional: Option<Value>,

    /// Nested queue variant (never set by the bridge).
    pub queue: Option<Value>,

    /// Version stamp for this queue.
    pub version: VersionStamp,
}

// =============================================================================
// Player State + Full State (outbound)
// =============================================================================

/// Combined playback state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerState {
    /// Playback position and pause state.
    pub status: PlaybackStatus,

    /// Play queue.
    pub player_queue: PlayerQueue,
}

/// Full state snapshot exchanged over the state channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FullState {
    /// Combined playback state.
    pub player_state: PlayerState,

    /// Descriptor of the sending device.
    pub device: Device,

    /// Whether the sending device considers itself the active player.
    pub is_currently_active: bool,

    /// EOV sync state (explicit null on translated snapshots, omitted on
    /// the initial snapshot).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sync_state_from_eov_optional: Option<Value>,
}

/// Outbound wire envelope for `PutYnisonState`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateEnvelope {
    /// Full state snapshot.
    pub update_full_state: FullState,

    /// Fresh random request id (UUID v4) per message.
    pub rid: String,

    /// Wall-clock time of the action in milliseconds.
    pub player_action_timestamp_ms: i64,

    /// Interception policy for the update.
    pub activity_interception_type: String,
}

impl StateEnvelope {
    /// Serializes to a JSON wire string.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

// =============================================================================
// Inbound Message (lenient)
// =============================================================================

/// Playback status as received from the service. Every field may be absent.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundStatus {
    #[serde(default)]
    pub duration_ms: Option<i64>,

    #[serde(default)]
    pub progress_ms: Option<i64>,

    #[serde(default)]
    pub paused: Option<bool>,

    #[serde(default)]
    pub playback_speed: Option<f64>,
}

/// A track as received from the service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundTrack {
    #[serde(default)]
    pub playable_id: Option<String>,

    #[serde(default)]
    pub playable_type: Option<String>,

    #[serde(default)]
    pub title: Option<String>,

    #[serde(default)]
    pub album_id_optional: Option<Value>,

    #[serde(default)]
    pub cover_url_optional: Option<Value>,

    #[serde(default)]
    pub from: Option<String>,
}

/// Queue options as received from the service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundQueueOptions {
    #[serde(default)]
    pub repeat_mode: Option<String>,
}

/// Play queue as received from the service.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundQueue {
    #[serde(default)]
    pub entity_id: Option<String>,

    #[serde(default)]
    pub entity_type: Option<String>,

    #[serde(default)]
    pub current_playable_index: Option<i32>,

    #[serde(default)]
    pub playable_list: Vec<InboundTrack>,

    #[serde(default)]
    pub options: InboundQueueOptions,

    #[serde(default)]
    pub entity_context: Option<String>,

    #[serde(default)]
    pub from_optional: Option<Value>,
}

/// Combined inbound playback state.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundPlayerState {
    #[serde(default)]
    pub status: InboundStatus,

    #[serde(default)]
    pub player_queue: InboundQueue,
}

/// Capability flags of a peer device.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundCapabilities {
    #[serde(default)]
    pub can_be_player: bool,

    #[serde(default)]
    pub can_be_remote_controller: bool,
}

/// A peer device descriptor from the inbound device list.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundDevice {
    #[serde(default)]
    pub capabilities: InboundCapabilities,

    #[serde(default)]
    pub is_offline: bool,

    /// Flat volume value as relayed by the service.
    #[serde(default)]
    pub volume: Option<f64>,
}

/// A full inbound message from the state channel.
///
/// The service sends `player_state` and `devices` at the top level of the
/// message. Anything that fails to parse into this shape is simply not
/// actionable for the bridge.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InboundMessage {
    #[serde(default)]
    pub player_state: Option<InboundPlayerState>,

    #[serde(default)]
    pub devices: Vec<InboundDevice>,
}

impl InboundMessage {
    /// Parses an inbound wire string, degrading to an empty message when
    /// the payload is not an object of the expected shape.
    pub fn from_json(json: &str) -> Self {
        serde_json::from_str(json).unwrap_or_default()
    }

    /// Returns the id of the currently playing track, if the message
    /// carries a queue with a valid index.
    pub fn current_playable_id(&self) -> Option<&str> {
        let state = self.player_state.as_ref()?;
        let queue = &state.player_queue;
        let index = queue.current_playable_index?;
        if index < 0 {
            return None;
        }
        queue
            .playable_list
            .get(index as usize)?
            .playable_id
            .as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_stamp_relay_zeroes_timestamp() {
        let stamp = VersionStamp::relay("dev-1", 1_700_000_000_000);
        assert_eq!(stamp.version, 1_700_000_000_000);
        assert_eq!(stamp.timestamp_ms, 0);
        assert_eq!(stamp.device_id, "dev-1");
    }

    #[test]
    fn test_role_remote_controller() {
        assert!(Role::Participant.can_be_remote_controller());
        assert!(!Role::Leader.can_be_remote_controller());
    }

    #[test]
    fn test_queue_track_explicit_nulls() {
        let track = QueueTrack {
            album_id_optional: None,
            from: "".to_string(),
            playable_id: "123".to_string(),
            playable_type: "TRACK".to_string(),
            title: "".to_string(),
            cover_url_optional: None,
            navigation_id_optional: None,
            playback_action_id_optional: None,
        };
        let json = serde_json::to_string(&track).unwrap();
        assert!(json.contains("\"album_id_optional\":null"));
        assert!(json.contains("\"cover_url_optional\":null"));
        assert!(json.contains("\"navigation_id_optional\":null"));
        assert!(json.contains("\"playback_action_id_optional\":null"));
    }

    #[test]
    fn test_inbound_parses_scenario_message() {
        let json = r#"{
            "player_state": {
                "status": {"paused": false, "duration_ms": 200000, "progress_ms": 5000},
                "player_queue": {
                    "current_playable_index": 0,
                    "playable_list": [{"playable_id": "123"}]
                }
            }
        }"#;
        let msg = InboundMessage::from_json(json);
        let state = msg.player_state.as_ref().expect("player_state");
        assert_eq!(state.status.paused, Some(false));
        assert_eq!(state.status.duration_ms, Some(200_000));
        assert_eq!(msg.current_playable_id(), Some("123"));
    }

    #[test]
    fn test_inbound_garbage_is_not_actionable() {
        let msg = InboundMessage::from_json("not json at all");
        assert!(msg.player_state.is_none());
        assert!(msg.devices.is_empty());

        let msg = InboundMessage::from_json(r#"{"ping": 1}"#);
        assert!(msg.player_state.is_none());
    }

    #[test]
    fn test_current_playable_id_edge_cases() {
        // Index -1 means "no current track".
        let json = r#"{
            "player_state": {
                "player_queue": {
                    "current_playable_index": -1,
                    "playable_list": [{"playable_id": "123"}]
                }
            }
        }"#;
        assert_eq!(InboundMessage::from_json(json).current_playable_id(), None);

        // Index beyond the list.
        let json = r#"{
            "player_state": {
                "player_queue": {
                    "current_playable_index": 5,
                    "playable_list": [{"playable_id": "123"}]
                }
            }
        }"#;
        assert_eq!(InboundMessage::from_json(json).current_playable_id(), None);

        // Missing queue entirely.
        let json = r#"{"player_state": {}}"#;
        assert_eq!(InboundMessage::from_json(json).current_playable_id(), None);
    }
}

//! # Leader State Translation
//!
//! Pure transform from a leader's inbound full-state message into the
//! snapshot a participant sends for itself.
//!
//! ## Translation Rules
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     Leader → Participant Translation                    │
//! │                                                                         │
//! │  status        copied verbatim; absent fields default to               │
//! │                { paused: true, duration: 0, progress: 0, speed: 1.0 }  │
//! │  version       device_id ← participant, version ← now_ms,              │
//! │                timestamp_ms ← 0 (relay sentinel)                       │
//! │  queue         copied verbatim; each track re-mapped to the canonical  │
//! │                field set, unset optionals as explicit null             │
//! │  capabilities  forced to { can_be_player: false,                       │
//! │                can_be_remote_controller: true }                        │
//! │  volume        sourced from the leader's first online playback-capable │
//! │                device; 0.85 when none found                            │
//! │  identity      ALWAYS the participant's own device id - never taken    │
//! │                from the inbound device list                            │
//! │                                                                         │
//! │  Determinism: identical inputs with `now_ms` and `rid` held fixed      │
//! │  always produce structurally identical output.                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use serde_json::Value;

use crate::error::TranslateError;
use crate::model::{
    Capabilities, Device, DeviceIdentity, DeviceInfo, FullState, InboundDevice, InboundMessage,
    InboundTrack, PlaybackStatus, PlayerQueue, PlayerState, QueueOptions, QueueTrack,
    StateEnvelope, VersionStamp, VolumeInfo, DEVICE_TYPE_WEB, ENTITY_CONTEXT_DEFAULT,
    ENTITY_TYPE_VARIOUS, FALLBACK_VOLUME, INTERCEPTION_DEFAULT, REPEAT_MODE_NONE,
};

/// Volume granularity announced on translated snapshots.
const TRANSLATED_VOLUME_GRANULARITY: u32 = 20;

/// Translates a leader's inbound message into a participant snapshot.
///
/// Fails only when the message carries no `player_state` - a "not yet
/// applicable" signal telling the caller to skip this broadcast cycle.
pub fn translate(
    inbound: &InboundMessage,
    participant: &DeviceIdentity,
    now_ms: i64,
    rid: String,
) -> Result<StateEnvelope, TranslateError> {
    let state = inbound
        .player_state
        .as_ref()
        .ok_or(TranslateError::MissingPlayerState)?;

    // The leader's own playback device is located only to source a volume
    // value. The translated snapshot's identity is always the participant's.
    let volume = leader_volume(&inbound.devices);

    let status = PlaybackStatus {
        duration_ms: state.status.duration_ms.unwrap_or(0),
        progress_ms: state.status.progress_ms.unwrap_or(0),
        paused: state.status.paused.unwrap_or(true),
        playback_speed: state.status.playback_speed.unwrap_or(1.0),
        version: VersionStamp::relay(&participant.device_id, now_ms),
    };

    let queue = &state.player_queue;
    let player_queue = PlayerQueue {
        entity_id: queue.entity_id.clone().unwrap_or_default(),
        entity_type: queue
            .entity_type
            .clone()
            .unwrap_or_else(|| ENTITY_TYPE_VARIOUS.to_string()),
        current_playable_index: queue.current_playable_index.unwrap_or(-1),
        playable_list: queue.playable_list.iter().map(canonical_track).collect(),
        shuffle_optional: None,
        options: QueueOptions {
            repeat_mode: queue
                .options
                .repeat_mode
                .clone()
                .unwrap_or_else(|| REPEAT_MODE_NONE.to_string()),
        },
        entity_context: queue
            .entity_context
            .clone()
            .unwrap_or_else(|| ENTITY_CONTEXT_DEFAULT.to_string()),
        from_optional: queue.from_optional.clone(),
        initial_entity_optional: None,
        adding_options_optional: None,
        queue: None,
        version: VersionStamp::relay(&participant.device_id, now_ms),
    };

    Ok(StateEnvelope {
        update_full_state: FullState {
            player_state: PlayerState {
                status,
                player_queue,
            },
            device: Device {
                volume: Some(volume),
                capabilities: Capabilities {
                    can_be_player: false,
                    can_be_remote_controller: true,
                    volume_granularity: TRANSLATED_VOLUME_GRANULARITY,
                },
                info: DeviceInfo {
                    device_id: participant.device_id.clone(),
                    device_type: DEVICE_TYPE_WEB.to_string(),
                    title: format!("Sync - {}", participant.title),
                    app_name: "YUMI".to_string(),
                    app_version: Some("1.0".to_string()),
                },
                volume_info: VolumeInfo {
                    volume,
                    version: None,
                },
                is_shadow: false,
            },
            is_currently_active: false,
            sync_state_from_eov_optional: Some(Value::Null),
        },
        rid,
        player_action_timestamp_ms: now_ms,
        activity_interception_type: INTERCEPTION_DEFAULT.to_string(),
    })
}

/// Volume of the leader's first online playback-capable device.
fn leader_volume(devices: &[InboundDevice]) -> f64 {
    devices
        .iter()
        .find(|d| d.capabilities.can_be_player && !d.is_offline)
        .and_then(|d| d.volume)
        .unwrap_or(FALLBACK_VOLUME)
}

/// Re-maps an inbound track to the canonical outbound field set.
fn canonical_track(track: &InboundTrack) -> QueueTrack {
    QueueTrack {
        album_id_optional: track.album_id_optional.clone(),
        from: track.from.clone().unwrap_or_default(),
        playable_id: track.playable_id.clone().unwrap_or_default(),
        playable_type: track
            .playable_type
            .clone()
            .unwrap_or_else(|| "TRACK".to_string()),
        title: track.title.clone().unwrap_or_default(),
        cover_url_optional: track.cover_url_optional.clone(),
        navigation_id_optional: None,
        playback_action_id_optional: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000_000;

    fn participant() -> DeviceIdentity {
        DeviceIdentity {
            device_id: "p-device".to_string(),
            title: "Participant-1".to_string(),
        }
    }

    fn leader_message() -> InboundMessage {
        InboundMessage::from_json(
            r#"{
                "player_state": {
                    "status": {
                        "paused": false,
                        "duration_ms": 200000,
                        "progress_ms": 5000,
                        "playback_speed": 1.0
                    },
                    "player_queue": {
                        "entity_id": "album-9",
                        "entity_type": "ALBUM",
                        "current_playable_index": 0,
                        "playable_list": [
                            {"playable_id": "123", "title": "First", "album_id_optional": 9},
                            {"playable_id": "456", "title": "Second"},
                            {"playable_id": "789", "title": "Third"}
                        ],
                        "options": {"repeat_mode": "ALL"}
                    }
                },
                "devices": [
                    {"capabilities": {"can_be_player": true}, "is_offline": true, "volume": 0.3},
                    {"capabilities": {"can_be_player": true}, "is_offline": false, "volume": 0.6},
                    {"capabilities": {"can_be_player": false}, "is_offline": false, "volume": 0.9}
                ]
            }"#,
        )
    }

    #[test]
    fn test_translate_is_pure() {
        let msg = leader_message();
        let a = translate(&msg, &participant(), NOW, "rid".into()).unwrap();
        let b = translate(&msg, &participant(), NOW, "rid".into()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_capability_invariant() {
        let env = translate(&leader_message(), &participant(), NOW, "rid".into()).unwrap();
        let caps = &env.update_full_state.device.capabilities;
        assert!(!caps.can_be_player);
        assert!(caps.can_be_remote_controller);
    }

    #[test]
    fn test_queue_fidelity() {
        let env = translate(&leader_message(), &participant(), NOW, "rid".into()).unwrap();
        let list = &env.update_full_state.player_state.player_queue.playable_list;
        assert_eq!(list.len(), 3);
        assert_eq!(list[0].playable_id, "123");
        assert_eq!(list[1].playable_id, "456");
        assert_eq!(list[2].playable_id, "789");
        assert_eq!(list[0].album_id_optional, Some(serde_json::json!(9)));
        assert_eq!(list[1].album_id_optional, None);
    }

    #[test]
    fn test_status_copied_verbatim() {
        let env = translate(&leader_message(), &participant(), NOW, "rid".into()).unwrap();
        let status = &env.update_full_state.player_state.status;
        assert!(!status.paused);
        assert_eq!(status.duration_ms, 200_000);
        assert_eq!(status.progress_ms, 5_000);
    }

    #[test]
    fn test_version_stamps_rewritten() {
        let env = translate(&leader_message(), &participant(), NOW, "rid".into()).unwrap();
        let status_version = &env.update_full_state.player_state.status.version;
        assert_eq!(status_version.device_id, "p-device");
        assert_eq!(status_version.version, NOW);
        assert_eq!(status_version.timestamp_ms, 0);

        let queue_version = &env.update_full_state.player_state.player_queue.version;
        assert_eq!(queue_version.device_id, "p-device");
        assert_eq!(queue_version.timestamp_ms, 0);
    }

    #[test]
    fn test_volume_from_first_online_player_device() {
        let env = translate(&leader_message(), &participant(), NOW, "rid".into()).unwrap();
        // First device is a player but offline; second is the match.
        assert_eq!(env.update_full_state.device.volume, Some(0.6));
        assert_eq!(env.update_full_state.device.volume_info.volume, 0.6);
    }

    #[test]
    fn test_volume_fallback_when_no_player_device() {
        let msg = InboundMessage::from_json(r#"{"player_state": {}}"#);
        let env = translate(&msg, &participant(), NOW, "rid".into()).unwrap();
        assert_eq!(env.update_full_state.device.volume, Some(FALLBACK_VOLUME));
    }

    #[test]
    fn test_status_defaults_when_absent() {
        let msg = InboundMessage::from_json(r#"{"player_state": {}}"#);
        let env = translate(&msg, &participant(), NOW, "rid".into()).unwrap();
        let status = &env.update_full_state.player_state.status;
        assert!(status.paused);
        assert_eq!(status.duration_ms, 0);
        assert_eq!(status.progress_ms, 0);
        assert_eq!(status.playback_speed, 1.0);

        let queue = &env.update_full_state.player_state.player_queue;
        assert_eq!(queue.current_playable_index, -1);
        assert_eq!(queue.entity_type, ENTITY_TYPE_VARIOUS);
        assert_eq!(queue.options.repeat_mode, REPEAT_MODE_NONE);
    }

    #[test]
    fn test_missing_player_state_is_a_skip() {
        let msg = InboundMessage::from_json(r#"{"devices": []}"#);
        let err = translate(&msg, &participant(), NOW, "rid".into()).unwrap_err();
        assert_eq!(err, TranslateError::MissingPlayerState);
    }

    #[test]
    fn test_translated_wire_shape() {
        let env = translate(&leader_message(), &participant(), NOW, "rid-42".into()).unwrap();
        let json = env.to_json().unwrap();
        assert!(json.contains("\"update_full_state\""));
        assert!(json.contains("\"rid\":\"rid-42\""));
        assert!(json.contains("\"activity_interception_type\":\"DO_NOT_INTERCEPT_BY_DEFAULT\""));
        // Present-but-null fields the service expects on translated snapshots.
        assert!(json.contains("\"sync_state_from_eov_optional\":null"));
        assert!(json.contains("\"shuffle_optional\":null"));
        assert!(json.contains("\"queue\":null"));
    }
}

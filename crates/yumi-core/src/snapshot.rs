//! # Initial Snapshot Construction
//!
//! Builds the first full-state snapshot a session sends right after its
//! state channel opens: an empty, paused state that registers the device
//! with the service without claiming any playback.

use crate::model::{
    Capabilities, Device, DeviceIdentity, DeviceInfo, FullState, PlaybackStatus, PlayerQueue,
    PlayerState, QueueOptions, Role, StateEnvelope, VersionStamp, VolumeInfo,
    DEVICE_TYPE_WEB, ENTITY_CONTEXT_DEFAULT, ENTITY_TYPE_VARIOUS, INTERCEPTION_DEFAULT,
};

/// Volume granularity announced on the initial snapshot.
const INITIAL_VOLUME_GRANULARITY: u32 = 16;

/// Volume announced on the initial snapshot.
const INITIAL_VOLUME: f64 = 50.0;

/// Builds the initial full-state snapshot for a session.
///
/// Pure: the caller supplies the wall clock (`now_ms`) and the request id
/// (`rid`), so identical inputs always produce identical output.
///
/// The snapshot is seeded with an empty queue (`current_playable_index = -1`)
/// and `paused = true`; capability flags depend on the role - only
/// participants announce `can_be_remote_controller`.
pub fn initial_snapshot(
    device: &DeviceIdentity,
    role: Role,
    now_ms: i64,
    rid: String,
) -> StateEnvelope {
    let capabilities = Capabilities {
        can_be_player: false,
        can_be_remote_controller: role.can_be_remote_controller(),
        volume_granularity: INITIAL_VOLUME_GRANULARITY,
    };

    let player_state = PlayerState {
        status: PlaybackStatus {
            duration_ms: 0,
            paused: true,
            playback_speed: 1.0,
            progress_ms: 0,
            version: VersionStamp::at(&device.device_id, now_ms),
        },
        player_queue: PlayerQueue {
            entity_id: String::new(),
            entity_type: ENTITY_TYPE_VARIOUS.to_string(),
            current_playable_index: -1,
            playable_list: Vec::new(),
            shuffle_optional: None,
            options: QueueOptions::default(),
            entity_context: ENTITY_CONTEXT_DEFAULT.to_string(),
            from_optional: None,
            initial_entity_optional: None,
            adding_options_optional: None,
            queue: None,
            version: VersionStamp::at(&device.device_id, now_ms),
        },
    };

    StateEnvelope {
        update_full_state: FullState {
            player_state,
            device: Device {
                volume: None,
                capabilities,
                info: DeviceInfo {
                    device_id: device.device_id.clone(),
                    device_type: DEVICE_TYPE_WEB.to_string(),
                    title: format!("YUMI - {}", device.title),
                    app_name: "Sync".to_string(),
                    app_version: None,
                },
                volume_info: VolumeInfo {
                    volume: INITIAL_VOLUME,
                    version: None,
                },
                is_shadow: false,
            },
            is_currently_active: false,
            sync_state_from_eov_optional: None,
        },
        rid,
        player_action_timestamp_ms: now_ms,
        activity_interception_type: INTERCEPTION_DEFAULT.to_string(),
    }
}

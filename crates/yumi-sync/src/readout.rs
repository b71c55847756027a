//! # Now-Playing Readout
//!
//! Human-facing formatting of participant playback state. Pure string
//! building; the coordinator decides when to emit these lines.

use yumi_core::model::InboundMessage;

use crate::metadata::TrackInfo;

/// Formats a millisecond position as `m:ss` (e.g. `3:07`).
///
/// Negative inputs clamp to `0:00`.
pub fn format_time(ms: i64) -> String {
    let total_secs = (ms.max(0)) / 1_000;
    format!("{}:{:02}", total_secs / 60, total_secs % 60)
}

/// One line describing what a participant is playing.
///
/// `track` is None when the metadata lookup failed; the readout then
/// degrades to the raw track id rather than being suppressed.
pub fn now_playing_line(
    session_name: &str,
    track: Option<&TrackInfo>,
    track_id: &str,
    message: &InboundMessage,
) -> String {
    let what = match track {
        Some(info) => info.display(),
        None => format!("track {}", track_id),
    };

    let (progress, duration, paused) = message
        .player_state
        .as_ref()
        .map(|ps| {
            (
                ps.status.progress_ms.unwrap_or(0),
                ps.status.duration_ms.unwrap_or(0),
                ps.status.paused.unwrap_or(true),
            )
        })
        .unwrap_or((0, 0, true));

    let marker = if paused { "paused" } else { "playing" };

    format!(
        "[{}] {} ({}) {} / {}",
        session_name,
        what,
        marker,
        format_time(progress),
        format_time(duration)
    )
}

/// One line summarizing a fan-out pass.
pub fn broadcast_line(attempted: usize, delivered: usize) -> String {
    format!("mirrored to {}/{} participants", delivered, attempted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yumi_core::model::InboundMessage;

    fn message_with_status(progress_ms: i64, duration_ms: i64, paused: bool) -> InboundMessage {
        InboundMessage::from_json(&format!(
            r#"{{"player_state": {{"status": {{
                "progress_ms": {}, "duration_ms": {}, "paused": {}, "playback_speed": 1.0
            }}}}}}"#,
            progress_ms, duration_ms, paused
        ))
    }

    #[test]
    fn test_format_time() {
        assert_eq!(format_time(0), "0:00");
        assert_eq!(format_time(59_999), "0:59");
        assert_eq!(format_time(187_000), "3:07");
        assert_eq!(format_time(-5_000), "0:00");
    }

    #[test]
    fn test_now_playing_with_metadata() {
        let track = TrackInfo {
            id: "123".into(),
            title: "Intro".into(),
            duration_ms: 180_000,
            artists: vec!["First".into()],
            album: None,
            cover: None,
        };
        let message = message_with_status(30_000, 180_000, false);
        let line = now_playing_line("Alice", Some(&track), "123", &message);
        assert_eq!(line, "[Alice] Intro - First (playing) 0:30 / 3:00");
    }

    #[test]
    fn test_now_playing_degrades_to_track_id() {
        let message = message_with_status(0, 0, true);
        let line = now_playing_line("Alice", None, "123", &message);
        assert!(line.contains("track 123"));
        assert!(line.contains("paused"));
    }

    #[test]
    fn test_broadcast_line() {
        assert_eq!(broadcast_line(3, 2), "mirrored to 2/3 participants");
    }
}

//! # Broadcast Rate Gate
//!
//! Lossy floor on broadcast frequency. A leader client scrubbing the seek
//! bar emits a burst of near-identical full states; forwarding every one
//! would hammer N participant connections with redundant envelopes. The
//! gate drops (never queues) updates that arrive inside the window, since
//! each full state supersedes the previous one entirely.

use tracing::trace;

/// Minimum-interval gate over leader broadcasts.
///
/// Pure per-call state machine: the caller injects the wall clock, so the
/// gate itself never reads time.
#[derive(Debug)]
pub struct BroadcastGate {
    /// Minimum accepted spacing in milliseconds. Zero disables the gate.
    min_interval_ms: i64,

    /// Timestamp of the last accepted broadcast.
    last_accepted_ms: Option<i64>,

    /// Total accepted broadcasts, for run statistics.
    accepted_count: u64,

    /// Total dropped broadcasts, for run statistics.
    dropped_count: u64,
}

impl BroadcastGate {
    /// Creates a gate with the given floor.
    pub fn new(min_interval_ms: i64) -> Self {
        BroadcastGate {
            min_interval_ms,
            last_accepted_ms: None,
            accepted_count: 0,
            dropped_count: 0,
        }
    }

    /// Decides whether a broadcast at `now_ms` passes the floor.
    ///
    /// The first call always passes. Subsequent calls pass only when at
    /// least the configured interval has elapsed since the last accepted
    /// one. Dropped updates are gone; nothing is queued for later.
    pub fn accept(&mut self, now_ms: i64) -> bool {
        let passes = match self.last_accepted_ms {
            Some(last) => now_ms - last >= self.min_interval_ms,
            None => true,
        };

        if passes {
            self.last_accepted_ms = Some(now_ms);
            self.accepted_count += 1;
        } else {
            self.dropped_count += 1;
            trace!(now_ms, "Broadcast dropped by rate gate");
        }

        passes
    }

    /// Broadcasts accepted so far.
    pub fn accepted(&self) -> u64 {
        self.accepted_count
    }

    /// Broadcasts dropped so far.
    pub fn dropped(&self) -> u64 {
        self.dropped_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_broadcast_always_passes() {
        let mut gate = BroadcastGate::new(100);
        assert!(gate.accept(5));
        assert_eq!(gate.accepted(), 1);
    }

    #[test]
    fn test_burst_collapses_to_first() {
        let mut gate = BroadcastGate::new(100);
        assert!(gate.accept(1_000));
        assert!(!gate.accept(1_030));
        assert!(!gate.accept(1_060));
        assert!(!gate.accept(1_099));
        assert_eq!(gate.accepted(), 1);
        assert_eq!(gate.dropped(), 3);
    }

    #[test]
    fn test_window_measured_from_last_accepted() {
        let mut gate = BroadcastGate::new(100);
        assert!(gate.accept(1_000));
        assert!(!gate.accept(1_050)); // dropped, does not move the window
        assert!(gate.accept(1_100)); // 100ms after the ACCEPTED one
        assert!(!gate.accept(1_150));
    }

    #[test]
    fn test_zero_interval_disables_gate() {
        let mut gate = BroadcastGate::new(0);
        assert!(gate.accept(10));
        assert!(gate.accept(10));
        assert!(gate.accept(11));
        assert_eq!(gate.dropped(), 0);
    }
}

//! ==============================================================================
//! liveness.rs - is the device still checking in?
//! ==============================================================================
//!
//! the device cannot be pinged, so the only signal we get is its own
//! check-ins. every check-in is a heartbeat; the status is derived lazily
//! from the gap between `now` and the last heartbeat:
//!
//! ```text
//!     NeverSeen ──heartbeat──► Connected ──gap >= timeout──► Disconnected
//!                                  ▲                              │
//!                                  └──────────heartbeat───────────┘
//! ```
//!
//! nothing here does i/o and nothing is stored besides the last heartbeat.
//!
//! ==============================================================================

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// firmware reports every 5 minutes; allow two extra minutes of slack
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 420;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LivenessState {
    NeverSeen,
    Connected,
    Disconnected,
}

impl LivenessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LivenessState::NeverSeen => "never_seen",
            LivenessState::Connected => "connected",
            LivenessState::Disconnected => "disconnected",
        }
    }

    pub fn is_connected(&self) -> bool {
        matches!(self, LivenessState::Connected)
    }
}

#[derive(Clone, Debug)]
pub struct LivenessTracker {
    timeout: Duration,
    last_heartbeat: Option<DateTime<Utc>>,
}

impl LivenessTracker {
    pub fn new(timeout: std::time::Duration) -> Self {
        let timeout = Duration::from_std(timeout).unwrap_or(Duration::seconds(DEFAULT_TIMEOUT_SECONDS as i64));
        Self { timeout, last_heartbeat: None }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat
    }

    /// Record a check-in. A heartbeat older than the one we already hold is
    /// ignored so a delayed request cannot make the device look stale.
    pub fn record_heartbeat(&mut self, now: DateTime<Utc>) {
        match self.last_heartbeat {
            Some(last) if last > now => {}
            _ => self.last_heartbeat = Some(now),
        }
    }

    pub fn status(&self, now: DateTime<Utc>) -> LivenessState {
        match self.last_heartbeat {
            None => LivenessState::NeverSeen,
            Some(last) if now - last < self.timeout => LivenessState::Connected,
            Some(_) => LivenessState::Disconnected,
        }
    }

    /// Seconds since the last heartbeat, `None` if the device was never seen.
    /// Clamped at zero if the clock went backwards.
    pub fn seconds_since_contact(&self, now: DateTime<Utc>) -> Option<f64> {
        self.last_heartbeat.map(|last| {
            let gap = (now - last).num_milliseconds().max(0);
            gap as f64 / 1000.0
        })
    }
}

impl Default for LivenessTracker {
    fn default() -> Self {
        Self::new(std::time::Duration::from_secs(DEFAULT_TIMEOUT_SECONDS))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn never_seen_until_first_heartbeat() {
        let tracker = LivenessTracker::default();
        assert_eq!(tracker.status(t0()), LivenessState::NeverSeen);
        assert_eq!(tracker.seconds_since_contact(t0()), None);
    }

    #[test]
    fn flips_to_disconnected_at_the_timeout() {
        let mut tracker = LivenessTracker::default();
        tracker.record_heartbeat(t0());
        let timeout = Duration::seconds(DEFAULT_TIMEOUT_SECONDS as i64);

        assert_eq!(tracker.status(t0() + timeout - Duration::seconds(1)), LivenessState::Connected);
        assert_eq!(tracker.status(t0() + timeout), LivenessState::Disconnected);
        assert_eq!(tracker.status(t0() + timeout + Duration::seconds(1)), LivenessState::Disconnected);
    }

    #[test]
    fn reconnects_on_any_later_heartbeat() {
        let mut tracker = LivenessTracker::new(std::time::Duration::from_secs(120));
        tracker.record_heartbeat(t0());
        let later = t0() + Duration::seconds(600);
        assert_eq!(tracker.status(later), LivenessState::Disconnected);

        tracker.record_heartbeat(later);
        assert_eq!(tracker.status(later), LivenessState::Connected);
        assert_eq!(tracker.seconds_since_contact(later + Duration::milliseconds(1500)), Some(1.5));
    }

    #[test]
    fn stale_heartbeat_does_not_move_backwards() {
        let mut tracker = LivenessTracker::default();
        tracker.record_heartbeat(t0());
        tracker.record_heartbeat(t0() - Duration::seconds(30));
        assert_eq!(tracker.last_heartbeat(), Some(t0()));
    }
}

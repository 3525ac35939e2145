//! Conversion statistics.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Counters describing what the dispatcher has done since start.
#[derive(Debug, Clone, Serialize)]
pub struct DispatchStats {
    /// Wall-clock start time.
    pub started_at: DateTime<Utc>,

    /// Media messages received.
    pub received: u64,

    /// Conversions delivered back to the user.
    pub converted: u64,

    /// Inputs refused (too long, unsupported).
    pub rejected: u64,

    /// Conversions that failed.
    pub failed: u64,

    #[serde(skip)]
    started: Instant,
}

impl Default for DispatchStats {
    fn default() -> Self {
        Self::new()
    }
}

impl DispatchStats {
    /// Creates zeroed statistics starting now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            started_at: Utc::now(),
            received: 0,
            converted: 0,
            rejected: 0,
            failed: 0,
            started: Instant::now(),
        }
    }

    pub fn record_received(&mut self) {
        self.received += 1;
    }

    pub fn record_converted(&mut self) {
        self.converted += 1;
    }

    pub fn record_rejected(&mut self) {
        self.rejected += 1;
    }

    pub fn record_failed(&mut self) {
        self.failed += 1;
    }

    /// Messages currently being worked on.
    #[must_use]
    pub const fn in_flight(&self) -> u64 {
        self.received
            .saturating_sub(self.converted + self.rejected + self.failed)
    }

    /// Time since the dispatcher started.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.started.elapsed()
    }
}

/// Formats a duration as a compact human-readable string.
#[must_use]
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs < 86_400 {
        let hours = secs / 3600;
        let mins = (secs % 3600) / 60;
        format!("{hours}h {mins}m")
    } else {
        let days = secs / 86_400;
        let hours = (secs % 86_400) / 3600;
        format!("{days}d {hours}h")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_stats() {
        let stats = DispatchStats::default();
        assert_eq!(stats.received, 0);
        assert_eq!(stats.in_flight(), 0);
    }

    #[test]
    fn test_in_flight() {
        let mut stats = DispatchStats::new();
        stats.record_received();
        stats.record_received();
        stats.record_received();
        stats.record_converted();
        stats.record_rejected();
        assert_eq!(stats.in_flight(), 1);

        stats.record_failed();
        assert_eq!(stats.in_flight(), 0);
    }

    #[test]
    fn test_format_uptime() {
        assert_eq!(format_uptime(Duration::from_secs(42)), "42s");
        assert_eq!(format_uptime(Duration::from_secs(125)), "2m 5s");
        assert_eq!(format_uptime(Duration::from_secs(3660)), "1h 1m");
        assert_eq!(format_uptime(Duration::from_secs(90_000)), "1d 1h");
    }

    #[test]
    fn test_serializes_counters() {
        let mut stats = DispatchStats::new();
        stats.record_received();
        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["received"], 1);
        assert!(json.get("started").is_none());
    }
}

//! Time remaining until a sale closes
//!
//! Computed from the clock on every call; nothing is stored or toggled when a
//! sale runs out.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Remaining time split for display
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Countdown {
    /// Whole hours remaining (not wrapped at 24)
    pub hours: u64,
    /// Minutes past the whole hours
    pub minutes: u64,
    /// Seconds past the whole minutes
    pub seconds: u64,
    /// Remaining milliseconds, a partial millisecond counting as one
    pub total: u64,
}

impl Countdown {
    /// Countdown of a closed sale
    pub const EXPIRED: Countdown = Countdown {
        hours: 0,
        minutes: 0,
        seconds: 0,
        total: 0,
    };

    /// Time from `now` until `end`; all zeros once `end` has passed
    pub fn until(end: DateTime<Utc>, now: DateTime<Utc>) -> Self {
        let remaining = end - now;
        if remaining <= TimeDelta::zero() {
            return Self::EXPIRED;
        }

        let whole = remaining.num_milliseconds();
        let total = if remaining > TimeDelta::milliseconds(whole) {
            whole as u64 + 1
        } else {
            whole as u64
        };
        let secs = total / 1_000;
        Self {
            hours: secs / 3_600,
            minutes: (secs % 3_600) / 60,
            seconds: secs % 60,
            total,
        }
    }

    /// No time left
    pub fn is_expired(&self) -> bool {
        self.total == 0
    }
}

impl fmt::Display for Countdown {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)
    }
}

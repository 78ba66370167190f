// src/rest.rs - Cool-down after sustained printing
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

/// When to rest and for how long.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RestPolicy {
    /// Completed prints before a rest. Zero disables resting.
    pub after_prints: u32,
    pub duration: Duration,
}

impl RestPolicy {
    pub fn from_minutes(after_prints: u32, minutes: f64) -> Self {
        let millis = (minutes.max(0.0) * 60_000.0).round() as i64;
        Self {
            after_prints,
            duration: Duration::milliseconds(millis),
        }
    }
}

/// Point-in-time view of the governor, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RestSnapshot {
    pub resting: bool,
    pub resting_until: Option<DateTime<Utc>>,
    pub completed_since_rest: u32,
}

/// Counts completed prints and holds the printer off while it rests.
///
/// State lives only as long as the process; a restart is itself a rest.
#[derive(Debug, Default)]
pub struct RestGovernor {
    completed: u32,
    resting_until: Option<DateTime<Utc>>,
}

impl RestGovernor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one finished print. Returns true when this completion starts a rest.
    pub fn record_completion(&mut self, policy: RestPolicy, now: DateTime<Utc>) -> bool {
        if policy.after_prints == 0 {
            return false;
        }
        self.completed += 1;
        if self.completed < policy.after_prints {
            return false;
        }
        self.completed = 0;
        let wake_at = now + policy.duration;
        self.resting_until = Some(wake_at);
        tracing::info!(
            rest_minutes = policy.duration.num_seconds() as f64 / 60.0,
            wake_at = %wake_at,
            "Printer resting"
        );
        true
    }

    pub fn is_resting(&self, now: DateTime<Utc>) -> bool {
        self.resting_until.is_some_and(|wake_at| now < wake_at)
    }

    pub fn completed_since_rest(&self) -> u32 {
        self.completed
    }

    pub fn snapshot(&self, now: DateTime<Utc>) -> RestSnapshot {
        let resting = self.is_resting(now);
        RestSnapshot {
            resting,
            resting_until: self.resting_until.filter(|_| resting),
            completed_since_rest: self.completed,
        }
    }
}

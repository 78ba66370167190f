// src/orphan.rs - When an unpaired half-page job gets the stock photo instead
use chrono::{DateTime, Utc};

/// Age of a job in fractional minutes. Jobs stamped in the future count as zero.
pub fn job_age_minutes(created_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    let millis = (now - created_at).num_milliseconds().max(0);
    millis as f64 / 60_000.0
}

/// Resolve an orphan against filler only once it has waited strictly longer
/// than the threshold and a filler image is actually available.
pub fn should_resolve(age_minutes: f64, threshold_minutes: f64, filler_available: bool) -> bool {
    filler_available && age_minutes > threshold_minutes
}

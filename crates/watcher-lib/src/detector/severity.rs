//! Severity tiers for anomaly scores
//!
//! Decision scores are negative for outliers; the more negative, the more
//! anomalous. Ties at a boundary resolve to the stricter tier.

use crate::models::Severity;

/// Scores at or below this are HIGH
pub const HIGH_SEVERITY_THRESHOLD: f64 = -0.5;

/// Scores at or below this (and above HIGH) are MEDIUM
pub const MEDIUM_SEVERITY_THRESHOLD: f64 = -0.2;

/// Map an anomaly score to its severity tier
pub fn severity(score: f64) -> Severity {
    if score <= HIGH_SEVERITY_THRESHOLD {
        Severity::High
    } else if score <= MEDIUM_SEVERITY_THRESHOLD {
        Severity::Medium
    } else {
        Severity::Low
    }
}

//! SLA classification: a pure function of (stage start, now, SLA).
//!
//! Rules:
//! 1. No SLA → `Ok`, whatever the elapsed time.
//! 2. `elapsed >= sla` → `Breached`.
//! 3. `elapsed >= ratio * sla` → `Warning` (the warning window, default last 10%).
//! 4. Otherwise `Ok`.
//!
//! Comparisons happen on whole milliseconds so boundary values classify
//! exactly, without floating-point drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Fraction of the SLA after which reminders start.
pub const DEFAULT_WARNING_RATIO: f64 = 0.9;

const MILLIS_PER_HOUR: f64 = 3_600_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlaStatus {
    Ok,
    Warning,
    Breached,
}

/// Classify with the default 90% warning window.
pub fn classify(
    stage_started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    sla_hours: Option<f64>,
) -> SlaStatus {
    classify_with_ratio(stage_started_at, now, sla_hours, DEFAULT_WARNING_RATIO)
}

pub fn classify_with_ratio(
    stage_started_at: DateTime<Utc>,
    now: DateTime<Utc>,
    sla_hours: Option<f64>,
    warning_ratio: f64,
) -> SlaStatus {
    let Some(sla_hours) = sla_hours else {
        return SlaStatus::Ok;
    };

    let elapsed_ms = (now - stage_started_at).num_milliseconds();
    let breach_ms = hours_to_millis(sla_hours);
    let warning_ms = hours_to_millis(sla_hours * warning_ratio);

    if elapsed_ms >= breach_ms {
        SlaStatus::Breached
    } else if elapsed_ms >= warning_ms {
        SlaStatus::Warning
    } else {
        SlaStatus::Ok
    }
}

/// Hours spent in the current stage.  Negative if `now` precedes the start.
pub fn elapsed_hours(stage_started_at: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - stage_started_at).num_milliseconds() as f64 / MILLIS_PER_HOUR
}

fn hours_to_millis(hours: f64) -> i64 {
    (hours * MILLIS_PER_HOUR).round() as i64
}

// ============================================================
// Unit tests
// ============================================================
#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn at(elapsed: Duration, sla: Option<f64>) -> SlaStatus {
        let now = Utc::now();
        classify(now - elapsed, now, sla)
    }

    #[test]
    fn no_sla_is_always_ok() {
        for hours in [0, 1, 24, 1_000, 100_000] {
            assert_eq!(at(Duration::hours(hours), None), SlaStatus::Ok);
        }
        assert_eq!(at(Duration::hours(-5), None), SlaStatus::Ok);
    }

    #[test]
    fn boundaries_for_a_24_hour_sla() {
        let sla = Some(24.0);
        assert_eq!(at(Duration::zero(), sla), SlaStatus::Ok);
        assert_eq!(at(Duration::hours(2), sla), SlaStatus::Ok);
        // 21.6h is exactly 90% of 24h.
        assert_eq!(at(Duration::minutes(1296) - Duration::milliseconds(1), sla), SlaStatus::Ok);
        assert_eq!(at(Duration::minutes(1296), sla), SlaStatus::Warning);
        assert_eq!(at(Duration::hours(22), sla), SlaStatus::Warning);
        assert_eq!(at(Duration::hours(24) - Duration::milliseconds(1), sla), SlaStatus::Warning);
        assert_eq!(at(Duration::hours(24), sla), SlaStatus::Breached);
        assert_eq!(at(Duration::hours(48), sla), SlaStatus::Breached);
    }

    #[test]
    fn fractional_sla_hours() {
        // 30 minutes: warning from 27 minutes on.
        let sla = Some(0.5);
        assert_eq!(at(Duration::minutes(26), sla), SlaStatus::Ok);
        assert_eq!(at(Duration::minutes(27), sla), SlaStatus::Warning);
        assert_eq!(at(Duration::minutes(30), sla), SlaStatus::Breached);
    }

    #[test]
    fn clock_skew_before_stage_start_is_ok() {
        assert_eq!(at(Duration::hours(-3), Some(1.0)), SlaStatus::Ok);
    }

    #[test]
    fn custom_warning_ratio() {
        let now = Utc::now();
        let start = now - Duration::hours(12);
        assert_eq!(classify_with_ratio(start, now, Some(24.0), 0.5), SlaStatus::Warning);
        assert_eq!(classify_with_ratio(start, now, Some(24.0), 0.75), SlaStatus::Ok);
        // A ratio of 1.0 disables the warning window.
        let late = now - Duration::hours(23);
        assert_eq!(classify_with_ratio(late, now, Some(24.0), 1.0), SlaStatus::Ok);
    }

    #[test]
    fn elapsed_hours_is_fractional() {
        let now = Utc::now();
        assert_eq!(elapsed_hours(now - Duration::minutes(90), now), 1.5);
        assert_eq!(elapsed_hours(now, now), 0.0);
    }
}

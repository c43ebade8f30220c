use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Sampling cadence of a tracked item.
///
/// Items start in `Minute`: one sample per minute, capturing the
/// high-resolution early engagement curve. After [`MINUTE_PHASE_SAMPLES`]
/// successful samples the item coarsens to `HalfHour` and stays there for
/// the rest of its tracked life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplePhase {
    Minute,
    HalfHour,
}

/// Samples taken in the `Minute` phase before coarsening.
pub const MINUTE_PHASE_SAMPLES: i64 = 60;

/// Resample interval while in the `Minute` phase.
pub const MINUTE_INTERVAL_SECS: i64 = 60;

/// Resample interval while in the `HalfHour` phase.
pub const HALF_HOUR_INTERVAL_SECS: i64 = 1800;

impl SamplePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SamplePhase::Minute => "minute",
            SamplePhase::HalfHour => "halfhour",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "minute" => Some(SamplePhase::Minute),
            "halfhour" => Some(SamplePhase::HalfHour),
            _ => None,
        }
    }
}

impl std::fmt::Display for SamplePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Phase and next due time after a successful sample.
///
/// `update_count` is the post-increment count. The `Minute -> HalfHour`
/// transition happens exactly once, when the count reaches
/// [`MINUTE_PHASE_SAMPLES`]; it never reverts.
pub fn advance_schedule(
    phase: SamplePhase,
    update_count: i64,
    now: DateTime<Utc>,
) -> (SamplePhase, DateTime<Utc>) {
    match phase {
        SamplePhase::Minute if update_count >= MINUTE_PHASE_SAMPLES => (
            SamplePhase::HalfHour,
            now + Duration::seconds(HALF_HOUR_INTERVAL_SECS),
        ),
        SamplePhase::Minute => (
            SamplePhase::Minute,
            now + Duration::seconds(MINUTE_INTERVAL_SECS),
        ),
        SamplePhase::HalfHour => (
            SamplePhase::HalfHour,
            now + Duration::seconds(HALF_HOUR_INTERVAL_SECS),
        ),
    }
}

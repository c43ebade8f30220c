use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schedule::SamplePhase;

// --- Engagement Metrics ---

/// One point-in-time reading of a post's engagement counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngagementCounts {
    pub replies: i64,
    pub reposts: i64,
    pub likes: i64,
    pub views: i64,
}

// --- Feed Observations ---

/// Direction of a feed reveal (scroll) action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrollDirection {
    Up,
    Down,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
        }
    }
}

/// A single on-screen observation of a feed post, as reported by a content
/// source. Any field may be absent when its extraction failed; consumers
/// decide whether the observation is still usable for their pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VisibleItem {
    pub id: Option<String>,
    pub author: Option<String>,
    pub text: Option<String>,
    pub posted_at: Option<DateTime<Utc>>,
    pub counts: Option<EngagementCounts>,
}

// --- Tracked Items ---

/// A feed post under engagement tracking: the immutable discovery snapshot,
/// the accumulated per-sample series, and the scheduling state that decides
/// when it is next due. The four metric series and the offset series are
/// index-aligned and always `update_count` long.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedItem {
    pub id: String,
    pub author: String,
    pub text: String,
    /// When this process first saw the item. Proxy for post age; never updated.
    pub created_at: DateTime<Utc>,
    pub replies_series: Vec<i64>,
    pub reposts_series: Vec<i64>,
    pub likes_series: Vec<i64>,
    pub views_series: Vec<i64>,
    /// Seconds since `created_at` at the moment of each sample.
    pub sample_offsets: Vec<i64>,
    pub phase: SamplePhase,
    pub update_count: i64,
    pub next_update_due: DateTime<Utc>,
}

/// Insert payload for a newly discovered item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewItem {
    pub id: String,
    pub author: String,
    pub text: String,
}

impl NewItem {
    /// Builds the payload from an observation, if it carries everything a
    /// new record needs. Metrics are not required at discovery time.
    pub fn from_visible(item: &VisibleItem) -> Option<Self> {
        Some(Self {
            id: item.id.clone()?,
            author: item.author.clone()?,
            text: item.text.clone()?,
        })
    }
}

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

use pulsefeed_common::{EngagementCounts, VisibleItem};

// --- Wire types ---

/// Request body for opening a deck session.
#[derive(Debug, Clone, Serialize)]
pub(crate) struct OpenSessionRequest<'a> {
    pub url: &'a str,
}

/// Session metadata returned by the sidecar.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct SessionData {
    #[serde(rename = "sessionId")]
    pub session_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ItemsResponse {
    pub items: Vec<RenderedItem>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct ScrollRequest<'a> {
    pub direction: &'a str,
    #[serde(rename = "amountPx", skip_serializing_if = "Option::is_none")]
    pub amount_px: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ScrollResponse {
    #[serde(rename = "newContent")]
    pub new_content: bool,
}

/// A single rendered post as the sidecar extracted it from the deck DOM.
/// Count fields carry the rendered label text ("1.2K"), not numbers; any
/// field the sidecar failed to extract arrives as null.
#[derive(Debug, Clone, Deserialize)]
pub struct RenderedItem {
    #[serde(rename = "itemId")]
    pub item_id: Option<String>,
    #[serde(rename = "authorHandle")]
    pub author_handle: Option<String>,
    pub text: Option<String>,
    #[serde(rename = "postedAt")]
    pub posted_at: Option<DateTime<Utc>>,
    #[serde(rename = "replyCount")]
    pub reply_count: Option<String>,
    #[serde(rename = "repostCount")]
    pub repost_count: Option<String>,
    #[serde(rename = "likeCount")]
    pub like_count: Option<String>,
    #[serde(rename = "viewCount")]
    pub view_count: Option<String>,
}

impl RenderedItem {
    /// Convert to the platform-agnostic observation the tracker consumes.
    ///
    /// If none of the four count labels yields a number, the whole counts
    /// block is absent (a metrics-extraction failure); otherwise missing
    /// individual labels read as zero.
    pub fn into_visible(self) -> VisibleItem {
        let replies = self.reply_count.as_deref().and_then(parse_compact_count);
        let reposts = self.repost_count.as_deref().and_then(parse_compact_count);
        let likes = self.like_count.as_deref().and_then(parse_compact_count);
        let views = self.view_count.as_deref().and_then(parse_compact_count);

        let counts = if replies.is_none() && reposts.is_none() && likes.is_none() && views.is_none()
        {
            None
        } else {
            Some(EngagementCounts {
                replies: replies.unwrap_or(0),
                reposts: reposts.unwrap_or(0),
                likes: likes.unwrap_or(0),
                views: views.unwrap_or(0),
            })
        };

        VisibleItem {
            id: self.item_id,
            author: self.author_handle,
            text: self.text,
            posted_at: self.posted_at,
            counts,
        }
    }
}

// --- Count labels ---

static COUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9][0-9,.]*)\s*([KM])?").expect("valid count regex"));

/// Parse a rendered engagement-count label into a number.
///
/// Handles the compact forms feeds render: "12", "1,234", "1.2K", "3M",
/// with trailing words ("1,234 Replies") ignored. Labels without a leading
/// number are `None`, not zero, so callers can tell "nothing extracted"
/// from "rendered as 0". Decimals only appear with a K/M suffix; a bare
/// "3.5" is malformed and reads as `None`.
pub fn parse_compact_count(label: &str) -> Option<i64> {
    let caps = COUNT_RE.captures(label.trim())?;
    let number = caps.get(1)?.as_str().replace(',', "");
    match caps.get(2).map(|m| m.as_str()) {
        Some("K") => Some((number.parse::<f64>().ok()? * 1_000.0).round() as i64),
        Some("M") => Some((number.parse::<f64>().ok()? * 1_000_000.0).round() as i64),
        _ => number.parse::<i64>().ok(),
    }
}

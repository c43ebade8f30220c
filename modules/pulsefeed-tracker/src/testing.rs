// Test doubles for the crawl controller and backfill crawler.
//
// One mock covering the single trait boundary:
// - ScriptedSource (ContentSource): plays back a scripted sequence of
//   rendered frames
//
// Plus helpers for constructing VisibleItem, EngagementCounts, NewItem
// and a fully populated Config.

use std::sync::Mutex;

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use pulsefeed_common::config::Config;
use pulsefeed_common::types::{EngagementCounts, NewItem, ScrollDirection, VisibleItem};

use crate::source::ContentSource;

// ---------------------------------------------------------------------------
// ScriptedSource
// ---------------------------------------------------------------------------

/// One scripted state of the rendered feed.
enum Frame {
    Items {
        items: Vec<VisibleItem>,
        new_content: bool,
    },
    Error(String),
}

/// Inner mutable state for ScriptedSource.
struct ScriptedSourceInner {
    frames: Vec<Frame>,
    position: usize,
    fail_reveals: bool,
    reveal_count: u32,
    top_reveal_count: u32,
    end_reveal_count: u32,
}

impl ScriptedSourceInner {
    /// Step one frame forward. Returns whether the arrived-at frame
    /// carries new content; false when already at the last frame.
    fn advance(&mut self) -> bool {
        if self.position + 1 >= self.frames.len() {
            return false;
        }
        self.position += 1;
        match &self.frames[self.position] {
            Frame::Items { new_content, .. } => *new_content,
            Frame::Error(_) => true,
        }
    }
}

/// Scripted content source. Every movement call (`reveal`,
/// `reveal_to_end`) steps one frame forward through the script;
/// `reveal_to_top` rewinds to the first frame. Enumeration returns the
/// current frame, an error for `Error` frames, and an empty list past
/// the end of the script.
///
/// Builder pattern: `.frame()`, `.stale_frame()`, `.error_frame()`,
/// `.failing_reveals()`.
pub struct ScriptedSource {
    inner: Mutex<ScriptedSourceInner>,
}

impl ScriptedSource {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(ScriptedSourceInner {
                frames: Vec::new(),
                position: 0,
                fail_reveals: false,
                reveal_count: 0,
                top_reveal_count: 0,
                end_reveal_count: 0,
            }),
        }
    }

    /// Append a frame that counts as newly revealed content.
    pub fn frame(self, items: Vec<VisibleItem>) -> Self {
        self.inner.lock().unwrap().frames.push(Frame::Items {
            items,
            new_content: true,
        });
        self
    }

    /// Append a frame the source reports as bringing nothing new.
    pub fn stale_frame(self, items: Vec<VisibleItem>) -> Self {
        self.inner.lock().unwrap().frames.push(Frame::Items {
            items,
            new_content: false,
        });
        self
    }

    /// Append a frame whose enumeration fails.
    pub fn error_frame(self, message: &str) -> Self {
        self.inner
            .lock()
            .unwrap()
            .frames
            .push(Frame::Error(message.to_string()));
        self
    }

    /// Make every `reveal` call return an error. `reveal_to_top` and
    /// `reveal_to_end` still work.
    pub fn failing_reveals(self) -> Self {
        self.inner.lock().unwrap().fail_reveals = true;
        self
    }

    pub fn reveal_count(&self) -> u32 {
        self.inner.lock().unwrap().reveal_count
    }

    pub fn top_reveal_count(&self) -> u32 {
        self.inner.lock().unwrap().top_reveal_count
    }

    pub fn end_reveal_count(&self) -> u32 {
        self.inner.lock().unwrap().end_reveal_count
    }
}

#[async_trait]
impl ContentSource for ScriptedSource {
    async fn visible_items(&self) -> Result<Vec<VisibleItem>> {
        let inner = self.inner.lock().unwrap();
        match inner.frames.get(inner.position) {
            Some(Frame::Items { items, .. }) => Ok(items.clone()),
            Some(Frame::Error(message)) => bail!("ScriptedSource: {message}"),
            None => Ok(Vec::new()),
        }
    }

    async fn reveal(&self, _direction: ScrollDirection, _amount_px: u32) -> Result<bool> {
        let mut inner = self.inner.lock().unwrap();
        inner.reveal_count += 1;
        if inner.fail_reveals {
            bail!("ScriptedSource: reveal failure requested");
        }
        Ok(inner.advance())
    }

    async fn reveal_to_top(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.top_reveal_count += 1;
        inner.position = 0;
        Ok(())
    }

    async fn reveal_to_end(&self) -> Result<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.end_reveal_count += 1;
        inner.advance();
        Ok(())
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

// ---------------------------------------------------------------------------
// Item constructors
// ---------------------------------------------------------------------------

/// Fully rendered item with default (all-zero) engagement counts.
pub fn visible(id: &str, author: &str, text: &str) -> VisibleItem {
    VisibleItem {
        id: Some(id.to_string()),
        author: Some(author.to_string()),
        text: Some(text.to_string()),
        posted_at: None,
        counts: Some(EngagementCounts::default()),
    }
}

/// Item whose engagement row failed to render.
pub fn visible_without_counts(id: &str, author: &str, text: &str) -> VisibleItem {
    VisibleItem {
        counts: None,
        ..visible(id, author, text)
    }
}

/// Timestamped item for backfill sweeps.
pub fn visible_at(id: &str, posted_at: DateTime<Utc>) -> VisibleItem {
    VisibleItem {
        posted_at: Some(posted_at),
        ..visible(id, "poster", "archived feed item")
    }
}

pub fn counts(replies: i64, reposts: i64, likes: i64, views: i64) -> EngagementCounts {
    EngagementCounts {
        replies,
        reposts,
        likes,
        views,
    }
}

pub fn new_item(id: &str) -> NewItem {
    NewItem {
        id: id.to_string(),
        author: "poster".to_string(),
        text: format!("tracked item {id}"),
    }
}

/// Config with every knob at its production default except the stall
/// backoff, which is zeroed so stall tests do not sleep.
pub fn test_config() -> Config {
    Config {
        database_path: ":memory:".to_string(),
        recent_updates_path: "recent_updates.json".to_string(),
        deckview_url: "http://localhost:4110".to_string(),
        deckview_token: None,
        feed_url: "https://deck.example/feed".to_string(),
        source_surface: "deck".to_string(),
        source_call_timeout_secs: 5,
        scroll_step_px: 1000,
        max_cycle_seconds: 55,
        min_update_spacing_seconds: 60,
        tracking_window_hours: 24,
        due_batch_limit: 500,
        backfill_cutoff_hours: 25,
        backfill_window_slack_hours: 1,
        stall_threshold: 20,
        stall_backoff_secs: 0,
        max_scroll_attempts: 10000,
        max_corrective_reveals: 3,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn script_plays_back_in_order() {
        let source = ScriptedSource::new()
            .frame(vec![visible("a", "ana", "first")])
            .stale_frame(vec![visible("a", "ana", "first")])
            .frame(vec![visible("b", "ben", "second")]);

        let first = source.visible_items().await.unwrap();
        assert_eq!(first[0].id.as_deref(), Some("a"));

        // Stale frame arrives without new content, fresh frame with it.
        assert!(!source.reveal(ScrollDirection::Down, 1000).await.unwrap());
        assert!(source.reveal(ScrollDirection::Down, 1000).await.unwrap());
        let third = source.visible_items().await.unwrap();
        assert_eq!(third[0].id.as_deref(), Some("b"));

        // Past the end: no movement, empty enumeration is not an error.
        assert!(!source.reveal(ScrollDirection::Down, 1000).await.unwrap());
        assert_eq!(source.reveal_count(), 3);
    }

    #[tokio::test]
    async fn rewind_returns_to_the_first_frame() {
        let source = ScriptedSource::new()
            .frame(vec![visible("a", "ana", "first")])
            .frame(vec![visible("b", "ben", "second")]);

        source.reveal(ScrollDirection::Down, 1000).await.unwrap();
        source.reveal_to_top().await.unwrap();

        let items = source.visible_items().await.unwrap();
        assert_eq!(items[0].id.as_deref(), Some("a"));
        assert_eq!(source.top_reveal_count(), 1);
    }

    #[tokio::test]
    async fn error_frame_fails_enumeration_until_moved() {
        let source = ScriptedSource::new()
            .error_frame("render hiccup")
            .frame(vec![visible("a", "ana", "first")]);

        assert!(source.visible_items().await.is_err());
        // The frame stays current until a movement call.
        assert!(source.visible_items().await.is_err());

        source.reveal(ScrollDirection::Down, 1000).await.unwrap();
        assert_eq!(source.visible_items().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn failing_reveals_still_allow_end_reveal() {
        let source = ScriptedSource::new()
            .frame(vec![visible("a", "ana", "first")])
            .frame(vec![visible("b", "ben", "second")])
            .failing_reveals();

        assert!(source.reveal(ScrollDirection::Down, 1000).await.is_err());
        source.reveal_to_end().await.unwrap();
        let items = source.visible_items().await.unwrap();
        assert_eq!(items[0].id.as_deref(), Some("b"));
        assert_eq!(source.end_reveal_count(), 1);
    }

    #[tokio::test]
    async fn empty_script_enumerates_nothing() {
        let source = ScriptedSource::new();
        assert!(source.visible_items().await.unwrap().is_empty());
        assert!(!source.reveal(ScrollDirection::Down, 1000).await.unwrap());
    }
}

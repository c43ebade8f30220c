//! Content source seam: the one interface the crawl passes drive.
//!
//! A content source is a rendered feed with a single scroll cursor. One
//! conforming implementation exists per rendering surface; the surface is
//! picked at configuration time, so scheduler and controller logic never
//! branches on where the items come from.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;

use deckview_client::DeckSession;
use pulsefeed_common::{ScrollDirection, VisibleItem};

#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Enumerate the currently rendered items, in visual order.
    async fn visible_items(&self) -> Result<Vec<VisibleItem>>;

    /// Reveal more content by one scroll step. Returns whether the source
    /// believes new content loaded.
    async fn reveal(&self, direction: ScrollDirection, amount_px: u32) -> Result<bool>;

    /// Jump back to the top of the feed.
    async fn reveal_to_top(&self) -> Result<()>;

    /// Force-load through to the end of the currently loadable feed.
    async fn reveal_to_end(&self) -> Result<()>;

    /// Release any server-side session state.
    async fn close(&self) -> Result<()> {
        Ok(())
    }

    fn name(&self) -> &str;
}

/// Content source backed by a DeckView sidecar session.
///
/// Every call is capped by a timeout so a hung sidecar degrades to a
/// per-call error the passes can absorb, never a wedged process.
pub struct DeckSource {
    session: DeckSession,
    call_timeout: Duration,
}

impl DeckSource {
    pub fn new(session: DeckSession, call_timeout_secs: u64) -> Self {
        Self {
            session,
            call_timeout: Duration::from_secs(call_timeout_secs),
        }
    }
}

#[async_trait]
impl ContentSource for DeckSource {
    async fn visible_items(&self) -> Result<Vec<VisibleItem>> {
        let rendered = tokio::time::timeout(self.call_timeout, self.session.items())
            .await
            .context("Deck item enumeration timed out")??;
        Ok(rendered.into_iter().map(|item| item.into_visible()).collect())
    }

    async fn reveal(&self, direction: ScrollDirection, amount_px: u32) -> Result<bool> {
        let loaded = tokio::time::timeout(self.call_timeout, self.session.scroll(direction, amount_px))
            .await
            .context("Deck scroll timed out")??;
        Ok(loaded)
    }

    async fn reveal_to_top(&self) -> Result<()> {
        tokio::time::timeout(self.call_timeout, self.session.scroll_to_top())
            .await
            .context("Deck scroll to top timed out")??;
        Ok(())
    }

    async fn reveal_to_end(&self) -> Result<()> {
        tokio::time::timeout(self.call_timeout, self.session.scroll_to_end())
            .await
            .context("Deck scroll to end timed out")??;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        tokio::time::timeout(self.call_timeout, self.session.close())
            .await
            .context("Deck session close timed out")??;
        Ok(())
    }

    fn name(&self) -> &str {
        "deckview"
    }
}

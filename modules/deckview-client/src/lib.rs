pub mod error;
pub mod types;

pub use error::{DeckViewError, Result};
pub use types::{parse_compact_count, RenderedItem};

use std::time::Duration;

use tracing::debug;

use pulsefeed_common::ScrollDirection;
use types::{ItemsResponse, OpenSessionRequest, ScrollRequest, ScrollResponse, SessionData};

pub struct DeckViewClient {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl DeckViewClient {
    pub fn new(base_url: &str, token: Option<&str>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to build HTTP client");

        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.map(String::from),
        }
    }

    /// Open a rendered deck session on the given feed URL.
    pub async fn open_deck(&self, feed_url: &str) -> Result<DeckSession> {
        let endpoint = with_token(format!("{}/session", self.base_url), &self.token);
        let resp = self
            .client
            .post(&endpoint)
            .json(&OpenSessionRequest { url: feed_url })
            .send()
            .await?;
        let resp = error_for_status(resp).await?;

        let session: SessionData = resp.json().await?;
        if session.session_id.is_empty() {
            return Err(DeckViewError::Session(
                "sidecar returned an empty session id".to_string(),
            ));
        }
        debug!(session_id = %session.session_id, feed_url, "Deck session opened");

        Ok(DeckSession {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            token: self.token.clone(),
            session_id: session.session_id,
        })
    }
}

/// A live rendered feed session. Scroll position is server-side state; the
/// sidecar exposes a single cursor per session.
pub struct DeckSession {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    session_id: String,
}

impl DeckSession {
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Currently rendered items, in visual top-to-bottom order.
    pub async fn items(&self) -> Result<Vec<RenderedItem>> {
        let resp = self.client.get(self.endpoint("/items")).send().await?;
        let resp = error_for_status(resp).await?;
        let body: ItemsResponse = resp.json().await?;
        Ok(body.items)
    }

    /// Scroll the deck by a pixel amount. Returns whether the sidecar
    /// believes the step loaded new content.
    pub async fn scroll(&self, direction: ScrollDirection, amount_px: u32) -> Result<bool> {
        self.scroll_raw(direction.as_str(), Some(amount_px)).await
    }

    /// Jump back to the top of the deck.
    pub async fn scroll_to_top(&self) -> Result<()> {
        self.scroll_raw("top", None).await?;
        Ok(())
    }

    /// Force-load through to the end of the currently loadable feed.
    pub async fn scroll_to_end(&self) -> Result<()> {
        self.scroll_raw("end", None).await?;
        Ok(())
    }

    async fn scroll_raw(&self, direction: &str, amount_px: Option<u32>) -> Result<bool> {
        let resp = self
            .client
            .post(self.endpoint("/scroll"))
            .json(&ScrollRequest {
                direction,
                amount_px,
            })
            .send()
            .await?;
        let resp = error_for_status(resp).await?;
        let body: ScrollResponse = resp.json().await?;
        Ok(body.new_content)
    }

    /// Tear down the server-side session.
    pub async fn close(&self) -> Result<()> {
        let resp = self.client.delete(self.endpoint("")).send().await?;
        error_for_status(resp).await?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        with_token(
            format!("{}/session/{}{path}", self.base_url, self.session_id),
            &self.token,
        )
    }
}

fn with_token(mut endpoint: String, token: &Option<String>) -> String {
    if let Some(token) = token {
        endpoint.push_str(&format!("?token={token}"));
    }
    endpoint
}

async fn error_for_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(DeckViewError::Api {
        status: status.as_u16(),
        message,
    })
}

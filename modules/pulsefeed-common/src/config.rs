use std::env;

use tracing::{info, warn};
use url::Url;

use crate::error::PulseError;
use crate::schedule::{HALF_HOUR_INTERVAL_SECS, MINUTE_INTERVAL_SECS};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Storage
    pub database_path: String,
    pub recent_updates_path: String,

    // DeckView sidecar
    pub deckview_url: String,
    pub deckview_token: Option<String>,
    pub feed_url: String,
    pub source_surface: String,
    pub source_call_timeout_secs: u64,
    pub scroll_step_px: u32,

    // Live tracking
    pub max_cycle_seconds: u64,
    pub min_update_spacing_seconds: u64,
    pub tracking_window_hours: u32,
    pub due_batch_limit: u32,

    // Backfill
    pub backfill_cutoff_hours: u32,
    pub backfill_window_slack_hours: u32,
    pub stall_threshold: u32,
    pub stall_backoff_secs: u64,
    pub max_scroll_attempts: u32,
    pub max_corrective_reveals: u32,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        Self {
            database_path: env::var("DATABASE_PATH")
                .unwrap_or_else(|_| "pulsefeed.db".to_string()),
            recent_updates_path: env::var("RECENT_UPDATES_PATH")
                .unwrap_or_else(|_| "recent_updates.json".to_string()),
            deckview_url: required_env("DECKVIEW_URL"),
            deckview_token: env::var("DECKVIEW_TOKEN").ok(),
            feed_url: required_env("FEED_URL"),
            source_surface: env::var("SOURCE_SURFACE").unwrap_or_else(|_| "deck".to_string()),
            source_call_timeout_secs: numeric_env("SOURCE_CALL_TIMEOUT_SECS", "30"),
            scroll_step_px: numeric_env("SCROLL_STEP_PX", "1000"),
            max_cycle_seconds: numeric_env("MAX_CYCLE_SECONDS", "55"),
            min_update_spacing_seconds: numeric_env("MIN_UPDATE_SPACING_SECONDS", "60"),
            tracking_window_hours: numeric_env("TRACKING_WINDOW_HOURS", "24"),
            due_batch_limit: numeric_env("DUE_BATCH_LIMIT", "500"),
            backfill_cutoff_hours: numeric_env("BACKFILL_CUTOFF_HOURS", "25"),
            backfill_window_slack_hours: numeric_env("BACKFILL_WINDOW_SLACK_HOURS", "1"),
            stall_threshold: numeric_env("STALL_THRESHOLD", "20"),
            stall_backoff_secs: numeric_env("STALL_BACKOFF_SECS", "5"),
            max_scroll_attempts: numeric_env("MAX_SCROLL_ATTEMPTS", "10000"),
            max_corrective_reveals: numeric_env("MAX_CORRECTIVE_REVEALS", "3"),
        }
    }

    /// Semantic checks that go beyond "is a number". Fatal misconfiguration
    /// is an error; dubious-but-workable settings only warn.
    pub fn validate(&self) -> Result<(), PulseError> {
        let url = Url::parse(&self.feed_url)
            .map_err(|e| PulseError::Config(format!("FEED_URL is not a valid URL: {e}")))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(PulseError::Config(format!(
                "FEED_URL must be http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.min_update_spacing_seconds == 0 {
            return Err(PulseError::Config(
                "MIN_UPDATE_SPACING_SECONDS must be greater than zero".to_string(),
            ));
        }
        if self.min_update_spacing_seconds >= HALF_HOUR_INTERVAL_SECS as u64 {
            return Err(PulseError::Config(format!(
                "MIN_UPDATE_SPACING_SECONDS ({}) must be below the half-hour resample interval ({HALF_HOUR_INTERVAL_SECS}s) or coarse-phase items starve",
                self.min_update_spacing_seconds
            )));
        }
        if self.min_update_spacing_seconds < MINUTE_INTERVAL_SECS as u64 {
            warn!(
                spacing = self.min_update_spacing_seconds,
                "MIN_UPDATE_SPACING_SECONDS is below the minute resample interval; expect redundant samples"
            );
        }

        if self.backfill_cutoff_hours == 0 {
            return Err(PulseError::Config(
                "BACKFILL_CUTOFF_HOURS must be greater than zero".to_string(),
            ));
        }
        if self.stall_threshold == 0 {
            return Err(PulseError::Config(
                "STALL_THRESHOLD must be greater than zero".to_string(),
            ));
        }
        if self.tracking_window_hours == 0 {
            return Err(PulseError::Config(
                "TRACKING_WINDOW_HOURS must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    /// Log the loaded configuration with secrets redacted.
    pub fn log_redacted(&self) {
        info!(
            database_path = %self.database_path,
            recent_updates_path = %self.recent_updates_path,
            deckview_url = %self.deckview_url,
            deckview_token = if self.deckview_token.is_some() { "set" } else { "unset" },
            feed_url = %self.feed_url,
            source_surface = %self.source_surface,
            max_cycle_seconds = self.max_cycle_seconds,
            min_update_spacing_seconds = self.min_update_spacing_seconds,
            tracking_window_hours = self.tracking_window_hours,
            due_batch_limit = self.due_batch_limit,
            "Configuration loaded"
        );
    }
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

fn numeric_env<T: std::str::FromStr>(key: &str, default: &str) -> T {
    env::var(key)
        .unwrap_or_else(|_| default.to_string())
        .parse()
        .unwrap_or_else(|_| panic!("{key} must be a number"))
}

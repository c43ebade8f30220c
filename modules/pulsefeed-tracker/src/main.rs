use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use deckview_client::DeckViewClient;
use pulsefeed_common::Config;
use pulsefeed_store::{ItemStore, RecentUpdates};
use pulsefeed_tracker::backfill::BackfillCrawler;
use pulsefeed_tracker::controller::CrawlController;
use pulsefeed_tracker::source::{ContentSource, DeckSource};

#[derive(Parser)]
#[command(name = "pulsefeed-tracker")]
#[command(about = "Engagement tracker for short-lived feed posts")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run rolling discovery and resample cycles
    Live {
        /// Run a single cycle and exit
        #[arg(long)]
        once: bool,
    },

    /// Run one historical sweep back to the age cutoff
    Backfill {
        /// Override the configured age cutoff in hours
        #[arg(long)]
        cutoff_hours: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("pulsefeed_tracker=info".parse()?)
                .add_directive("pulsefeed_store=info".parse()?)
                .add_directive("deckview_client=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    info!("PulseFeed tracker starting...");

    // Load config
    let mut config = Config::from_env();
    if let Command::Backfill {
        cutoff_hours: Some(hours),
    } = &cli.command
    {
        config.backfill_cutoff_hours = *hours;
    }
    config.validate()?;
    config.log_redacted();

    let run_id = uuid::Uuid::new_v4().to_string();

    let store = ItemStore::connect(&config.database_path).await?;

    let source: Arc<dyn ContentSource> = match config.source_surface.as_str() {
        "deck" => {
            let client =
                DeckViewClient::new(&config.deckview_url, config.deckview_token.as_deref());
            let session = client.open_deck(&config.feed_url).await?;
            info!(session_id = session.session_id(), "Deck session opened");
            Arc::new(DeckSource::new(session, config.source_call_timeout_secs))
        }
        other => bail!("Unknown source surface: {other}"),
    };

    let result = match cli.command {
        Command::Live { once } => {
            let recent = RecentUpdates::load(&config.recent_updates_path);
            let shutdown = Arc::new(AtomicBool::new(false));
            {
                let shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if tokio::signal::ctrl_c().await.is_ok() {
                        info!("Interrupt received, finishing current cycle");
                        shutdown.store(true, Ordering::Relaxed);
                    }
                });
            }

            let mut controller =
                CrawlController::new(source.clone(), store, recent, &config, run_id, shutdown);
            controller.run_live(once).await
        }
        Command::Backfill { .. } => {
            let crawler = BackfillCrawler::new(source.clone(), store, &config, run_id);
            crawler.run().await.map(|_| ()).map_err(Into::into)
        }
    };

    // Release the rendered session regardless of how the run went.
    if let Err(e) = source.close().await {
        warn!(error = %e, "Failed to close content source session");
    }

    result
}

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use pulsefeed_common::config::Config;
use pulsefeed_common::types::{ScrollDirection, VisibleItem};
use pulsefeed_store::{ItemStore, RecentUpdates, StoreError};

use crate::discovery::{run_discovery_pass, DiscoveryState};
use crate::scheduler::{UpdateDecision, UpdateScheduler};
use crate::source::ContentSource;
use crate::stats::{CycleStats, SummaryCoalescer};

/// Sweeps in a row allowed to produce neither an update nor newly
/// revealed content before the cycle gives up on its remaining due set.
const MAX_FRUITLESS_SWEEPS: u32 = 3;

/// Drives the rolling discovery and resample loop against a feed.
///
/// Each cycle snapshots the due set, returns to the top of the feed,
/// registers whatever is visible there, then sweeps downward updating
/// due items until the due set is drained, the cycle budget runs out,
/// or the feed stops yielding anything useful.
pub struct CrawlController {
    source: Arc<dyn ContentSource>,
    store: ItemStore,
    recent: RecentUpdates,
    scheduler: UpdateScheduler,
    discovery: DiscoveryState,
    coalescer: SummaryCoalescer,
    run_id: String,
    max_cycle_seconds: u64,
    tracking_window_hours: u32,
    due_batch_limit: u32,
    scroll_step_px: u32,
    shutdown: Arc<AtomicBool>,
}

impl CrawlController {
    pub fn new(
        source: Arc<dyn ContentSource>,
        store: ItemStore,
        recent: RecentUpdates,
        config: &Config,
        run_id: String,
        shutdown: Arc<AtomicBool>,
    ) -> Self {
        Self {
            source,
            store,
            recent,
            scheduler: UpdateScheduler::new(config.min_update_spacing_seconds),
            discovery: DiscoveryState::new(),
            coalescer: SummaryCoalescer::new(),
            run_id,
            max_cycle_seconds: config.max_cycle_seconds,
            tracking_window_hours: config.tracking_window_hours,
            due_batch_limit: config.due_batch_limit,
            scroll_step_px: config.scroll_step_px,
            shutdown,
        }
    }

    /// Run live tracking cycles until shutdown (or once, for `--once`).
    pub async fn run_live(&mut self, run_once: bool) -> Result<()> {
        info!(
            run_id = %self.run_id,
            source = self.source.name(),
            "Live tracking starting"
        );

        let result = self.run_live_inner(run_once).await;

        // Always persist the spacing cache, even when a cycle failed.
        if let Err(e) = self.recent.persist() {
            error!("Failed to persist recent-update cache: {e}");
        }

        result
    }

    async fn run_live_inner(&mut self, run_once: bool) -> Result<()> {
        loop {
            let stats = self.run_cycle().await?;

            if let Err(e) = self.recent.persist() {
                warn!(error = %e, "Failed to persist recent-update cache");
            }

            if let Some(emitted) = self.coalescer.observe(stats) {
                if emitted.suppressed_before > 0 {
                    info!(
                        count = emitted.suppressed_before,
                        "Identical cycle summaries suppressed"
                    );
                }
                info!(run_id = %self.run_id, "Cycle finished: {}", emitted.stats);
            }

            if run_once {
                return Ok(());
            }
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping live tracking");
                return Ok(());
            }
        }
    }

    /// One full cycle: due snapshot, discovery at the top of the feed,
    /// then reveal-and-update sweeps.
    pub async fn run_cycle(&mut self) -> Result<CycleStats> {
        let cycle_start = Utc::now();
        let mut stats = CycleStats::default();

        // Snapshot the due set up front. Items discovered during this
        // cycle become resample targets from the next cycle on.
        let due_items = self
            .store
            .items_due_for_update(
                self.tracking_window_hours,
                Some(self.due_batch_limit),
                cycle_start,
            )
            .await
            .context("Failed to query items due for update")?;
        let due_ids: HashSet<String> = due_items.into_iter().map(|item| item.id).collect();
        let mut pending = due_ids.clone();

        debug!(due = due_ids.len(), "Cycle starting");

        // New items render at the top of the feed, so discovery scans there.
        if let Err(e) = self.source.reveal_to_top().await {
            warn!(error = %e, "Could not return to top of feed");
        }
        let visible = self.visible_or_empty().await;
        match run_discovery_pass(&mut self.discovery, &visible, &self.store, Utc::now()).await {
            Ok(inserted) => stats.new_items = inserted,
            Err(e) => warn!(error = %e, "Discovery pass failed, continuing cycle"),
        }

        let mut fruitless_sweeps = 0u32;

        loop {
            if self.shutdown.load(Ordering::Relaxed) {
                info!("Shutdown requested, ending cycle early");
                break;
            }

            stats.scroll_scans += 1;
            let visible = self.visible_or_empty().await;
            let mut swept_updates = 0u32;
            let mut earliest_posted: Option<DateTime<Utc>> = None;
            let mut latest_posted: Option<DateTime<Utc>> = None;

            for item in &visible {
                let Some(id) = item.id.as_deref() else {
                    continue;
                };
                if let Some(posted_at) = item.posted_at {
                    earliest_posted = Some(earliest_posted.map_or(posted_at, |t| t.min(posted_at)));
                    latest_posted = Some(latest_posted.map_or(posted_at, |t| t.max(posted_at)));
                }
                if !pending.contains(id) {
                    continue;
                }
                let Some(counts) = item.counts else {
                    // Engagement row did not render. Leave the item pending
                    // with its skip counter untouched; a later sweep retries.
                    warn!(item_id = %id, "Engagement counts missing, will retry");
                    continue;
                };

                let now = Utc::now();
                let decision =
                    self.scheduler
                        .decide(id, &due_ids, self.recent.last_update(id), now);
                match decision {
                    UpdateDecision::Ignored => {}
                    UpdateDecision::Skip => stats.skipped += 1,
                    UpdateDecision::Update | UpdateDecision::Force => {
                        match self.store.record_sample(id, &counts, now).await {
                            Ok(recorded) => {
                                self.recent.mark_updated(id, now);
                                pending.remove(id);
                                swept_updates += 1;
                                if decision == UpdateDecision::Force {
                                    stats.forced += 1;
                                    info!(item_id = %id, "Spacing overridden after repeated skips");
                                } else {
                                    stats.updated += 1;
                                }
                                debug!(
                                    item_id = %id,
                                    update_count = recorded.update_count,
                                    phase = ?recorded.phase,
                                    next_due = %recorded.next_update_due,
                                    "Recorded engagement sample"
                                );
                            }
                            Err(StoreError::NotFound(_)) => {
                                warn!(item_id = %id, "Due item vanished from the store");
                                pending.remove(id);
                            }
                            Err(e) => {
                                warn!(item_id = %id, error = %e, "Failed to record sample")
                            }
                        }
                    }
                }
            }

            if pending.is_empty() {
                debug!(scans = stats.scroll_scans, "All due items handled");
                break;
            }

            let elapsed = (Utc::now() - cycle_start).num_seconds();
            if elapsed >= self.max_cycle_seconds as i64 {
                info!(
                    elapsed,
                    still_pending = pending.len(),
                    "Cycle budget reached, restarting top scan"
                );
                break;
            }

            debug!(
                missing = pending.len(),
                earliest_visible = ?earliest_posted,
                latest_visible = ?latest_posted,
                "Due items still missing, revealing more"
            );
            let revealed = match self
                .source
                .reveal(ScrollDirection::Down, self.scroll_step_px)
                .await
            {
                Ok(new_content) => new_content,
                Err(e) => {
                    warn!(error = %e, "Reveal failed");
                    false
                }
            };

            if swept_updates == 0 && !revealed {
                fruitless_sweeps += 1;
                if fruitless_sweeps >= MAX_FRUITLESS_SWEEPS {
                    info!(
                        still_pending = pending.len(),
                        "No progress after repeated sweeps, ending cycle"
                    );
                    break;
                }
            } else {
                fruitless_sweeps = 0;
            }
        }

        stats.still_pending = pending.len() as u32;
        Ok(stats)
    }

    async fn visible_or_empty(&self) -> Vec<VisibleItem> {
        match self.source.visible_items().await {
            Ok(items) => items,
            Err(e) => {
                warn!(error = %e, "Could not enumerate visible items");
                Vec::new()
            }
        }
    }
}

// SQLite persistence for tracked items and backfill snapshots.

use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;

use pulsefeed_common::schedule::advance_schedule;
use pulsefeed_common::{EngagementCounts, NewItem, SamplePhase, TrackedItem};

use crate::error::{Result, StoreError};

/// Re-read retries when a compare-and-append update loses a race to a
/// concurrent writer of the same item.
const CAS_RETRIES: u32 = 4;

#[derive(Clone)]
pub struct ItemStore {
    pool: SqlitePool,
}

/// A row from the items table. Series columns are JSON arrays.
#[derive(Debug, Clone, sqlx::FromRow)]
struct ItemRow {
    item_id: String,
    author: String,
    text: String,
    created_at: DateTime<Utc>,
    replies_series: Json<Vec<i64>>,
    reposts_series: Json<Vec<i64>>,
    likes_series: Json<Vec<i64>>,
    views_series: Json<Vec<i64>>,
    sample_offsets: Json<Vec<i64>>,
    phase: String,
    update_count: i64,
    next_update_due: DateTime<Utc>,
}

impl ItemRow {
    fn into_item(self) -> Result<TrackedItem> {
        let phase = SamplePhase::parse(&self.phase).ok_or_else(|| {
            StoreError::Corrupt(format!(
                "item {} has unknown phase '{}'",
                self.item_id, self.phase
            ))
        })?;
        Ok(TrackedItem {
            id: self.item_id,
            author: self.author,
            text: self.text,
            created_at: self.created_at,
            replies_series: self.replies_series.0,
            reposts_series: self.reposts_series.0,
            likes_series: self.likes_series.0,
            views_series: self.views_series.0,
            sample_offsets: self.sample_offsets.0,
            phase,
            update_count: self.update_count,
            next_update_due: self.next_update_due,
        })
    }
}

/// Outcome of a recorded sample, for logging at the call site.
#[derive(Debug, Clone, Copy)]
pub struct SampleRecorded {
    pub phase: SamplePhase,
    pub update_count: i64,
    pub next_update_due: DateTime<Utc>,
}

/// Point-in-time engagement snapshot written by the backfill sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct ArchivedSnapshot {
    pub item_id: String,
    pub author: String,
    pub text: String,
    pub posted_at: DateTime<Utc>,
    pub counts: EngagementCounts,
    pub collected_at: DateTime<Utc>,
}

impl ItemStore {
    /// Open (creating if missing) the database file and run migrations.
    /// WAL with a busy timeout so a live tracker and a backfill job can
    /// share the file.
    pub async fn connect(path: &str) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(StdDuration::from_secs(5));
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// In-memory database for tests. Pinned to a single pooled connection;
    /// a second connection would see a different empty database.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        let store = Self { pool };
        store.migrate().await?;
        Ok(store)
    }

    /// Run the embedded SQL migrations.
    async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Database(e.into()))?;
        Ok(())
    }

    /// Insert an item with default schedule state: minute phase, zero
    /// samples, due immediately. Returns whether a row was actually
    /// inserted; re-discovery of a known id is a no-op.
    pub async fn insert_if_absent(&self, item: &NewItem, now: DateTime<Utc>) -> Result<bool> {
        let inserted = self
            .insert_new_items(std::slice::from_ref(item), now)
            .await?;
        Ok(inserted > 0)
    }

    /// Bulk variant of [`insert_if_absent`](Self::insert_if_absent) for a
    /// discovery pass: one transaction, returns how many rows were new.
    pub async fn insert_new_items(&self, batch: &[NewItem], now: DateTime<Utc>) -> Result<u32> {
        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u32;
        for item in batch {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO items
                    (item_id, author, text, created_at, phase, update_count, next_update_due)
                VALUES (?, ?, ?, ?, ?, 0, ?)
                "#,
            )
            .bind(&item.id)
            .bind(&item.author)
            .bind(&item.text)
            .bind(now)
            .bind(SamplePhase::Minute.as_str())
            .bind(now)
            .execute(&mut *tx)
            .await?;
            inserted += result.rows_affected() as u32;
        }
        tx.commit().await?;
        Ok(inserted)
    }

    /// Items eligible for resampling: due at or before `now`, created
    /// within the last `hours_back` hours, oldest-due first (ties broken
    /// by id for determinism), optionally capped in count.
    pub async fn items_due_for_update(
        &self,
        hours_back: u32,
        limit: Option<u32>,
        now: DateTime<Utc>,
    ) -> Result<Vec<TrackedItem>> {
        let window_start = now - Duration::hours(i64::from(hours_back));
        // SQLite treats a negative LIMIT as unlimited.
        let rows = sqlx::query_as::<_, ItemRow>(
            r#"
            SELECT * FROM items
            WHERE next_update_due <= ? AND created_at >= ?
            ORDER BY next_update_due ASC, item_id ASC
            LIMIT ?
            "#,
        )
        .bind(now)
        .bind(window_start)
        .bind(limit.map(i64::from).unwrap_or(-1))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ItemRow::into_item).collect()
    }

    /// Append one engagement sample and advance the item's schedule:
    /// records the four counters plus the seconds-since-creation offset,
    /// bumps `update_count`, and reschedules per the sampling phase.
    ///
    /// The write is guarded by a compare-and-append on `update_count`, so
    /// two processes sharing the store serialize per item; a lost race
    /// re-reads and retries a bounded number of times.
    pub async fn record_sample(
        &self,
        id: &str,
        counts: &EngagementCounts,
        now: DateTime<Utc>,
    ) -> Result<SampleRecorded> {
        for _ in 0..CAS_RETRIES {
            let row = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE item_id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
            let Some(row) = row else {
                return Err(StoreError::NotFound(id.to_string()));
            };
            let mut item = row.into_item()?;

            let offset = (now - item.created_at).num_seconds();
            item.replies_series.push(counts.replies);
            item.reposts_series.push(counts.reposts);
            item.likes_series.push(counts.likes);
            item.views_series.push(counts.views);
            item.sample_offsets.push(offset);
            let new_count = item.update_count + 1;
            let (phase, next_update_due) = advance_schedule(item.phase, new_count, now);

            let result = sqlx::query(
                r#"
                UPDATE items
                SET replies_series = ?, reposts_series = ?, likes_series = ?,
                    views_series = ?, sample_offsets = ?, phase = ?,
                    update_count = ?, next_update_due = ?
                WHERE item_id = ? AND update_count = ?
                "#,
            )
            .bind(Json(&item.replies_series))
            .bind(Json(&item.reposts_series))
            .bind(Json(&item.likes_series))
            .bind(Json(&item.views_series))
            .bind(Json(&item.sample_offsets))
            .bind(phase.as_str())
            .bind(new_count)
            .bind(next_update_due)
            .bind(id)
            .bind(item.update_count)
            .execute(&self.pool)
            .await?;

            if result.rows_affected() > 0 {
                return Ok(SampleRecorded {
                    phase,
                    update_count: new_count,
                    next_update_due,
                });
            }
            // Lost the race; loop re-reads the winner's state.
        }
        Err(StoreError::Conflict(id.to_string()))
    }

    /// Fetch a single tracked item.
    pub async fn get(&self, id: &str) -> Result<Option<TrackedItem>> {
        let row = sqlx::query_as::<_, ItemRow>("SELECT * FROM items WHERE item_id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(ItemRow::into_item).transpose()
    }

    pub async fn tracked_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Write a backfill snapshot. Re-archiving an id replaces its row.
    pub async fn archive_snapshot(&self, snap: &ArchivedSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT OR REPLACE INTO archived_items
                (item_id, author, text, posted_at, replies, reposts, likes, views, collected_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&snap.item_id)
        .bind(&snap.author)
        .bind(&snap.text)
        .bind(snap.posted_at)
        .bind(snap.counts.replies)
        .bind(snap.counts.reposts)
        .bind(snap.counts.likes)
        .bind(snap.counts.views)
        .bind(snap.collected_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn archived_count(&self) -> Result<i64> {
        let count = sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM archived_items")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

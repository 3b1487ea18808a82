//! SQLite-backed stores for the watchlist, price snapshots and dismissals.
//!
//! Queries are bound at runtime so the crate builds without a prepared
//! database. Each store is a thin clone-able handle over the shared pool.

use chrono::{Duration, Utc};
use serde::Deserialize;
use sqlx::SqlitePool;
use tracing::warn;

use crate::config::DISMISSAL_WINDOW_DAYS;
use crate::db::models::{join_grades, CardRow, DismissalRow, SnapshotRow};
use crate::error::Result;
use crate::types::{DismissalRecord, PriceSnapshot, WatchlistCard};

// ---------------------------------------------------------------------------
// Watchlist
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct NewCard {
    pub player: String,
    pub sport: String,
    pub year: i64,
    pub brand: String,
    pub set_name: String,
    pub parallel: Option<String>,
    #[serde(default)]
    pub grades_monitored: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority_score: i64,
}

fn default_priority() -> i64 {
    50
}

#[derive(Clone)]
pub struct WatchlistStore {
    pool: SqlitePool,
}

impl WatchlistStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Active cards, highest priority first, capped at `limit`.
    pub async fn list_active(&self, limit: usize) -> Result<Vec<WatchlistCard>> {
        let rows = sqlx::query_as::<_, CardRow>(
            r#"
            SELECT id, player, sport, year, brand, set_name, parallel,
                   grades_monitored, priority_score, active
            FROM cards
            WHERE active = 1
            ORDER BY priority_score DESC
            LIMIT ?
            "#,
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WatchlistCard::from).collect())
    }

    pub async fn list_all(&self) -> Result<Vec<WatchlistCard>> {
        let rows = sqlx::query_as::<_, CardRow>(
            r#"
            SELECT id, player, sport, year, brand, set_name, parallel,
                   grades_monitored, priority_score, active
            FROM cards
            ORDER BY priority_score DESC
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(WatchlistCard::from).collect())
    }

    pub async fn insert(&self, card: &NewCard) -> Result<i64> {
        let grades = join_grades(&card.grades_monitored);
        let result = sqlx::query(
            r#"
            INSERT INTO cards (player, sport, year, brand, set_name, parallel,
                               grades_monitored, priority_score, active)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, 1)
            "#,
        )
        .bind(&card.player)
        .bind(&card.sport)
        .bind(card.year)
        .bind(&card.brand)
        .bind(&card.set_name)
        .bind(&card.parallel)
        .bind(grades)
        .bind(card.priority_score.clamp(0, 100))
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }
}

// ---------------------------------------------------------------------------
// Price snapshots
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct SnapshotStore {
    pool: SqlitePool,
}

impl SnapshotStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Most recent snapshot for an exact (card, grader, grade) triple.
    /// Grade labels are never conflated; "PSA 9" and "PSA 10" are distinct
    /// lookups.
    pub async fn latest(
        &self,
        card_id: i64,
        grader: &str,
        grade: &str,
    ) -> Result<Option<PriceSnapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT card_id, snapshot_date, grade, grader,
                   mean, median, p25, p75, stddev, volume, confidence
            FROM price_snapshots
            WHERE card_id = ? AND grader = ? AND grade = ?
            ORDER BY snapshot_date DESC
            LIMIT 1
            "#,
        )
        .bind(card_id)
        .bind(grader)
        .bind(grade)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(PriceSnapshot::from))
    }

    /// Full snapshot history for a card, newest first.
    pub async fn history(&self, card_id: i64) -> Result<Vec<PriceSnapshot>> {
        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT card_id, snapshot_date, grade, grader,
                   mean, median, p25, p75, stddev, volume, confidence
            FROM price_snapshots
            WHERE card_id = ?
            ORDER BY snapshot_date DESC, grader, grade
            "#,
        )
        .bind(card_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(PriceSnapshot::from).collect())
    }

    async fn upsert_one(&self, s: &PriceSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO price_snapshots (
                card_id, snapshot_date, grade, grader,
                mean, median, p25, p75, stddev, volume, confidence
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (card_id, snapshot_date, grade, grader) DO UPDATE SET
                mean = excluded.mean,
                median = excluded.median,
                p25 = excluded.p25,
                p75 = excluded.p75,
                stddev = excluded.stddev,
                volume = excluded.volume,
                confidence = excluded.confidence
            "#,
        )
        .bind(s.card_id)
        .bind(s.snapshot_date)
        .bind(&s.grade)
        .bind(&s.grader)
        .bind(s.mean)
        .bind(s.median)
        .bind(s.p25)
        .bind(s.p75)
        .bind(s.stddev)
        .bind(s.volume)
        .bind(s.confidence)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Upsert a batch inside one transaction. If the transaction fails, fall
    /// back to individual inserts — a partial collection run is worth more
    /// than a discarded one. Returns the number of rows persisted.
    pub async fn upsert_batch(&self, snapshots: &[PriceSnapshot]) -> Result<usize> {
        if snapshots.is_empty() {
            return Ok(0);
        }

        match self.upsert_all_tx(snapshots).await {
            Ok(()) => Ok(snapshots.len()),
            Err(e) => {
                warn!("Snapshot batch write failed ({e}); retrying individually");
                let mut stored = 0;
                for snapshot in snapshots {
                    match self.upsert_one(snapshot).await {
                        Ok(()) => stored += 1,
                        Err(e) => warn!(
                            "Snapshot insert failed for card {} {} {}: {e}",
                            snapshot.card_id, snapshot.grader, snapshot.grade
                        ),
                    }
                }
                Ok(stored)
            }
        }
    }

    async fn upsert_all_tx(&self, snapshots: &[PriceSnapshot]) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        for s in snapshots {
            sqlx::query(
                r#"
                INSERT INTO price_snapshots (
                    card_id, snapshot_date, grade, grader,
                    mean, median, p25, p75, stddev, volume, confidence
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (card_id, snapshot_date, grade, grader) DO UPDATE SET
                    mean = excluded.mean,
                    median = excluded.median,
                    p25 = excluded.p25,
                    p75 = excluded.p75,
                    stddev = excluded.stddev,
                    volume = excluded.volume,
                    confidence = excluded.confidence
                "#,
            )
            .bind(s.card_id)
            .bind(s.snapshot_date)
            .bind(&s.grade)
            .bind(&s.grader)
            .bind(s.mean)
            .bind(s.median)
            .bind(s.p25)
            .bind(s.p75)
            .bind(s.stddev)
            .bind(s.volume)
            .bind(s.confidence)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Dismissals
// ---------------------------------------------------------------------------

#[derive(Clone)]
pub struct DismissalStore {
    pool: SqlitePool,
}

impl DismissalStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Membership test the scanner consumes: is this listing currently
    /// suppressed (dismissed and not yet expired)?
    pub async fn is_dismissed(&self, item_id: &str) -> Result<bool> {
        let now = Utc::now();
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT id FROM dismissed_items WHERE item_id = ? AND expires_at > ? LIMIT 1",
        )
        .bind(item_id)
        .bind(now)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.is_some())
    }

    pub async fn dismiss(
        &self,
        item_id: &str,
        card_id: i64,
        title: &str,
        price: f64,
        note: Option<&str>,
    ) -> Result<i64> {
        let now = Utc::now();
        let expires = now + Duration::days(DISMISSAL_WINDOW_DAYS);
        let result = sqlx::query(
            r#"
            INSERT INTO dismissed_items (item_id, card_id, title, price,
                                         dismissed_at, expires_at, note)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(item_id)
        .bind(card_id)
        .bind(title)
        .bind(price)
        .bind(now)
        .bind(expires)
        .bind(note)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// Remove a dismissal so the listing can resurface. Returns whether a
    /// row was actually deleted.
    pub async fn restore(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM dismissed_items WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn cleanup_expired(&self) -> Result<u64> {
        let now = Utc::now();
        let result = sqlx::query("DELETE FROM dismissed_items WHERE expires_at <= ?")
            .bind(now)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn list(&self, include_expired: bool) -> Result<Vec<DismissalRecord>> {
        let now = Utc::now();
        let rows = if include_expired {
            sqlx::query_as::<_, DismissalRow>(
                r#"
                SELECT id, item_id, card_id, title, price, dismissed_at, expires_at, note
                FROM dismissed_items
                ORDER BY dismissed_at DESC
                "#,
            )
            .fetch_all(&self.pool)
            .await?
        } else {
            sqlx::query_as::<_, DismissalRow>(
                r#"
                SELECT id, item_id, card_id, title, price, dismissed_at, expires_at, note
                FROM dismissed_items
                WHERE expires_at > ?
                ORDER BY dismissed_at DESC
                "#,
            )
            .bind(now)
            .fetch_all(&self.pool)
            .await?
        };

        Ok(rows.into_iter().map(DismissalRecord::from).collect())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

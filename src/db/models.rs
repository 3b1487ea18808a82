//! Database row types used by sqlx runtime queries.

use chrono::{DateTime, NaiveDate, Utc};

use crate::types::{DismissalRecord, PriceSnapshot, WatchlistCard};

#[derive(Debug, sqlx::FromRow)]
pub struct CardRow {
    pub id: i64,
    pub player: String,
    pub sport: String,
    pub year: i64,
    pub brand: String,
    pub set_name: String,
    pub parallel: Option<String>,
    pub grades_monitored: String,
    pub priority_score: i64,
    pub active: i64,
}

impl From<CardRow> for WatchlistCard {
    fn from(row: CardRow) -> Self {
        WatchlistCard {
            id: row.id,
            player: row.player,
            sport: row.sport,
            year: row.year,
            brand: row.brand,
            set_name: row.set_name,
            parallel: row.parallel,
            grades_monitored: split_grades(&row.grades_monitored),
            priority_score: row.priority_score,
            active: row.active != 0,
        }
    }
}

/// "PSA 9,PSA 10,Raw" → ["PSA 9", "PSA 10", "Raw"].
pub fn split_grades(s: &str) -> Vec<String> {
    s.split(',')
        .map(|g| g.trim().to_string())
        .filter(|g| !g.is_empty())
        .collect()
}

pub fn join_grades(grades: &[String]) -> String {
    grades.join(",")
}

#[derive(Debug, sqlx::FromRow)]
pub struct SnapshotRow {
    pub card_id: i64,
    pub snapshot_date: NaiveDate,
    pub grade: String,
    pub grader: String,
    pub mean: f64,
    pub median: f64,
    pub p25: f64,
    pub p75: f64,
    pub stddev: f64,
    pub volume: i64,
    pub confidence: f64,
}

impl From<SnapshotRow> for PriceSnapshot {
    fn from(row: SnapshotRow) -> Self {
        PriceSnapshot {
            card_id: row.card_id,
            snapshot_date: row.snapshot_date,
            grade: row.grade,
            grader: row.grader,
            mean: row.mean,
            median: row.median,
            p25: row.p25,
            p75: row.p75,
            stddev: row.stddev,
            volume: row.volume,
            confidence: row.confidence,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
pub struct DismissalRow {
    pub id: i64,
    pub item_id: String,
    pub card_id: i64,
    pub title: String,
    pub price: f64,
    pub dismissed_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub note: Option<String>,
}

impl From<DismissalRow> for DismissalRecord {
    fn from(row: DismissalRow) -> Self {
        DismissalRecord {
            id: row.id,
            item_id: row.item_id,
            card_id: row.card_id,
            title: row.title,
            price: row.price,
            dismissed_at: row.dismissed_at,
            expires_at: row.expires_at,
            note: row.note,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grades_round_trip() {
        let grades = vec!["PSA 9".to_string(), "PSA 10".to_string(), "Raw".to_string()];
        assert_eq!(split_grades(&join_grades(&grades)), grades);
        assert!(split_grades("").is_empty());
        assert_eq!(split_grades(" PSA 8 , Raw "), vec!["PSA 8", "Raw"]);
    }
}

//! Persistence contracts (§4.7): narrow interfaces decoupling the core from
//! any particular database. One sqlx/SQLite implementation is shipped in
//! [`sqlite`]; an alternative backend can be substituted without touching
//! the Aggregator, Detector, or Orchestrator.

pub mod sqlite;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::models::{DiffBet, DiffRecord, OddsHistoryPoint, OddsSnapshot};

pub use sqlite::SqliteStore;

#[async_trait]
pub trait DiffBetStorage: Send + Sync {
    /// Inserts the diff; ON-CONFLICT-DO-NOTHING on
    /// `(match_group_key, bet_key, calculated_at)`. Returns whether a new row
    /// was actually inserted.
    async fn store_diff_bet(&self, diff: &DiffBet) -> anyhow::Result<bool>;

    /// Most recent prior persisted record for this key, excluding the given
    /// timestamp. `None` when no such record exists.
    async fn get_last_diff_bet(
        &self,
        match_group_key: &str,
        bet_key: &str,
        exclude_calculated_at: DateTime<Utc>,
    ) -> anyhow::Result<Option<DiffRecord>>;

    async fn clean_diff_bets(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait OddsSnapshotStorage: Send + Sync {
    /// Upserts keyed by `(match_group_key, bet_key, bookmaker)`, maintaining
    /// monotonic `max_odd`/`min_odd` extremes.
    async fn store_odds_snapshot(&self, snapshot: &OddsSnapshot) -> anyhow::Result<()>;

    async fn get_last_odds_snapshot(
        &self,
        match_group_key: &str,
        bet_key: &str,
        bookmaker: &str,
    ) -> anyhow::Result<Option<OddsSnapshot>>;

    async fn append_odds_history(&self, point: &OddsHistoryPoint) -> anyhow::Result<()>;

    /// Oldest-first history, most recent `limit` points.
    async fn get_odds_history(
        &self,
        match_group_key: &str,
        bet_key: &str,
        bookmaker: &str,
        limit: i64,
    ) -> anyhow::Result<Vec<OddsHistoryPoint>>;

    /// Resets `max_odd`/`min_odd` to `current_odd` after an alert fires, so
    /// the same range does not re-alert.
    async fn reset_extremes_after_alert(
        &self,
        match_group_key: &str,
        bet_key: &str,
        bookmaker: &str,
        current_odd: f64,
    ) -> anyhow::Result<()>;

    /// Purges rows whose `start_time < now`.
    async fn clean_snapshots_for_started_matches(&self) -> anyhow::Result<()>;

    /// Cheap reachability check for `/health`; callers bound it with their
    /// own timeout (5 s per §5).
    async fn health_check(&self) -> anyhow::Result<()>;
}

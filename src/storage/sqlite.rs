//! `sqlx`-backed implementation of the [`super::DiffBetStorage`] and
//! [`super::OddsSnapshotStorage`] contracts, against SQLite.

use std::env;
use std::str::FromStr;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Row, SqlitePool};

use crate::models::{DiffBet, DiffRecord, OddsHistoryPoint, OddsSnapshot};

use super::{DiffBetStorage, OddsSnapshotStorage};

pub async fn create_pool() -> Result<SqlitePool> {
    let database_url =
        env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:./data/calculator.db".to_string());

    let file_path = database_url
        .strip_prefix("sqlite:///")
        .or_else(|| database_url.strip_prefix("sqlite://"))
        .or_else(|| database_url.strip_prefix("sqlite:"))
        .unwrap_or(&database_url);

    if let Some(parent) = std::path::Path::new(file_path).parent() {
        if !parent.as_os_str().is_empty() {
            tokio::fs::create_dir_all(parent).await.ok();
        }
    }

    let options = SqliteConnectOptions::from_str(&database_url)?.create_if_missing(true);
    let pool = SqlitePool::connect_with(options).await?;
    Ok(pool)
}

pub async fn init_schema(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS diff_bets (
            match_group_key TEXT NOT NULL,
            match_name      TEXT NOT NULL,
            sport           TEXT NOT NULL,
            start_time      TEXT NOT NULL,
            bet_key         TEXT NOT NULL,
            min_bookmaker   TEXT NOT NULL,
            min_odd         REAL NOT NULL,
            max_bookmaker   TEXT NOT NULL,
            max_odd         REAL NOT NULL,
            diff_abs        REAL NOT NULL,
            diff_percent    REAL NOT NULL,
            bookmaker_count INTEGER NOT NULL,
            calculated_at   TEXT NOT NULL,
            UNIQUE(match_group_key, bet_key, calculated_at)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS odds_snapshots (
            match_group_key TEXT NOT NULL,
            bet_key         TEXT NOT NULL,
            bookmaker       TEXT NOT NULL,
            odd             REAL NOT NULL,
            max_odd         REAL NOT NULL,
            min_odd         REAL NOT NULL,
            recorded_at     TEXT NOT NULL,
            match_name      TEXT NOT NULL,
            sport           TEXT NOT NULL,
            event_type      TEXT NOT NULL,
            outcome_type    TEXT NOT NULL,
            parameter       TEXT NOT NULL,
            start_time      TEXT NOT NULL,
            PRIMARY KEY (match_group_key, bet_key, bookmaker)
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS odds_snapshot_history (
            match_group_key TEXT NOT NULL,
            bet_key         TEXT NOT NULL,
            bookmaker       TEXT NOT NULL,
            odd             REAL NOT NULL,
            recorded_at     TEXT NOT NULL,
            start_time      TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_snapshots_key ON odds_snapshots(match_group_key, bet_key, bookmaker)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_diff_bets_calculated_at ON diff_bets(calculated_at DESC)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_snapshots_start_time ON odds_snapshots(start_time)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_history_key ON odds_snapshot_history(match_group_key, bet_key, bookmaker)")
        .execute(pool)
        .await?;

    tracing::info!("storage schema initialized");
    Ok(())
}

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn row_to_snapshot(row: sqlx::sqlite::SqliteRow) -> Result<OddsSnapshot> {
    Ok(OddsSnapshot {
        match_group_key: row.get("match_group_key"),
        bet_key: row.get("bet_key"),
        bookmaker: row.get("bookmaker"),
        odd: row.get("odd"),
        max_odd: row.get("max_odd"),
        min_odd: row.get("min_odd"),
        recorded_at: DateTime::parse_from_rfc3339(&row.get::<String, _>("recorded_at"))?
            .with_timezone(&Utc),
        match_name: row.get("match_name"),
        sport: row.get("sport"),
        event_type: row.get("event_type"),
        outcome_type: row.get("outcome_type"),
        parameter: row.get("parameter"),
        start_time: DateTime::parse_from_rfc3339(&row.get::<String, _>("start_time"))?
            .with_timezone(&Utc),
    })
}

#[async_trait]
impl DiffBetStorage for SqliteStore {
    async fn store_diff_bet(&self, diff: &DiffBet) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO diff_bets
            (match_group_key, match_name, sport, start_time, bet_key, min_bookmaker, min_odd,
             max_bookmaker, max_odd, diff_abs, diff_percent, bookmaker_count, calculated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&diff.match_group_key)
        .bind(&diff.match_name)
        .bind(&diff.sport)
        .bind(diff.start_time.to_rfc3339())
        .bind(&diff.bet_key)
        .bind(&diff.min_bookmaker)
        .bind(diff.min_odd)
        .bind(&diff.max_bookmaker)
        .bind(diff.max_odd)
        .bind(diff.diff_abs)
        .bind(diff.diff_percent)
        .bind(diff.bookmaker_count as i64)
        .bind(diff.calculated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_last_diff_bet(
        &self,
        match_group_key: &str,
        bet_key: &str,
        exclude_calculated_at: DateTime<Utc>,
    ) -> Result<Option<DiffRecord>> {
        let row = sqlx::query(
            r#"
            SELECT match_group_key, bet_key, diff_percent, calculated_at
            FROM diff_bets
            WHERE match_group_key = ? AND bet_key = ? AND calculated_at != ?
            ORDER BY calculated_at DESC
            LIMIT 1
            "#,
        )
        .bind(match_group_key)
        .bind(bet_key)
        .bind(exclude_calculated_at.to_rfc3339())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            None => Ok(None),
            Some(row) => Ok(Some(DiffRecord {
                match_group_key: row.get("match_group_key"),
                bet_key: row.get("bet_key"),
                diff_percent: row.get("diff_percent"),
                calculated_at: DateTime::parse_from_rfc3339(&row.get::<String, _>("calculated_at"))?
                    .with_timezone(&Utc),
            })),
        }
    }

    async fn clean_diff_bets(&self) -> Result<()> {
        sqlx::query("DELETE FROM diff_bets").execute(&self.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl OddsSnapshotStorage for SqliteStore {
    async fn store_odds_snapshot(&self, snapshot: &OddsSnapshot) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO odds_snapshots
            (match_group_key, bet_key, bookmaker, odd, max_odd, min_odd, recorded_at,
             match_name, sport, event_type, outcome_type, parameter, start_time)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(match_group_key, bet_key, bookmaker) DO UPDATE SET
                odd         = excluded.odd,
                max_odd     = MAX(odds_snapshots.max_odd, excluded.max_odd),
                min_odd     = MIN(odds_snapshots.min_odd, excluded.min_odd),
                recorded_at = excluded.recorded_at,
                match_name  = excluded.match_name,
                sport       = excluded.sport,
                start_time  = excluded.start_time
            "#,
        )
        .bind(&snapshot.match_group_key)
        .bind(&snapshot.bet_key)
        .bind(&snapshot.bookmaker)
        .bind(snapshot.odd)
        .bind(snapshot.max_odd)
        .bind(snapshot.min_odd)
        .bind(snapshot.recorded_at.to_rfc3339())
        .bind(&snapshot.match_name)
        .bind(&snapshot.sport)
        .bind(&snapshot.event_type)
        .bind(&snapshot.outcome_type)
        .bind(&snapshot.parameter)
        .bind(snapshot.start_time.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_last_odds_snapshot(
        &self,
        match_group_key: &str,
        bet_key: &str,
        bookmaker: &str,
    ) -> Result<Option<OddsSnapshot>> {
        let row = sqlx::query(
            "SELECT * FROM odds_snapshots WHERE match_group_key = ? AND bet_key = ? AND bookmaker = ?",
        )
        .bind(match_group_key)
        .bind(bet_key)
        .bind(bookmaker)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_snapshot).transpose()
    }

    async fn append_odds_history(&self, point: &OddsHistoryPoint) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO odds_snapshot_history
            (match_group_key, bet_key, bookmaker, odd, recorded_at, start_time)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&point.match_group_key)
        .bind(&point.bet_key)
        .bind(&point.bookmaker)
        .bind(point.odd)
        .bind(point.recorded_at.to_rfc3339())
        .bind(point.start_time.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_odds_history(
        &self,
        match_group_key: &str,
        bet_key: &str,
        bookmaker: &str,
        limit: i64,
    ) -> Result<Vec<OddsHistoryPoint>> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM (
                SELECT match_group_key, bet_key, bookmaker, odd, recorded_at, start_time
                FROM odds_snapshot_history
                WHERE match_group_key = ? AND bet_key = ? AND bookmaker = ?
                ORDER BY recorded_at DESC
                LIMIT ?
            ) ORDER BY recorded_at ASC
            "#,
        )
        .bind(match_group_key)
        .bind(bet_key)
        .bind(bookmaker)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            out.push(OddsHistoryPoint {
                match_group_key: row.get("match_group_key"),
                bet_key: row.get("bet_key"),
                bookmaker: row.get("bookmaker"),
                odd: row.get("odd"),
                recorded_at: DateTime::parse_from_rfc3339(&row.get::<String, _>("recorded_at"))?
                    .with_timezone(&Utc),
                start_time: DateTime::parse_from_rfc3339(&row.get::<String, _>("start_time"))?
                    .with_timezone(&Utc),
            });
        }
        Ok(out)
    }

    async fn reset_extremes_after_alert(
        &self,
        match_group_key: &str,
        bet_key: &str,
        bookmaker: &str,
        current_odd: f64,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE odds_snapshots SET max_odd = ?, min_odd = ? WHERE match_group_key = ? AND bet_key = ? AND bookmaker = ?",
        )
        .bind(current_odd)
        .bind(current_odd)
        .bind(match_group_key)
        .bind(bet_key)
        .bind(bookmaker)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn clean_snapshots_for_started_matches(&self) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        sqlx::query("DELETE FROM odds_snapshots WHERE start_time < ?")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        sqlx::query("DELETE FROM odds_snapshot_history WHERE start_time < ?")
            .bind(&now)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

//! Line-Movement Detector (C3): per `(group, bet_key, bookmaker)` maintains
//! odd + running max/min + history; emits movements exceeding a percentage
//! threshold.

use chrono::Utc;

use crate::aggregator::{build_groups, meta_for};
use crate::models::{LineMovement, Match, OddsHistoryPoint, OddsSnapshot};
use crate::storage::OddsSnapshotStorage;

/// DetectMovements: builds the current snapshot (shared build-up with C2),
/// compares each `(group, bet_key, bookmaker)` against its stored extremes,
/// emits movements crossing `threshold_percent`, and persists the updated
/// snapshot + one history point for every key regardless of whether it
/// alerted.
pub async fn detect_movements(
    matches: &[Match],
    threshold_percent: f64,
    storage: &dyn OddsSnapshotStorage,
) -> anyhow::Result<Vec<LineMovement>> {
    let groups = build_groups(matches);
    let now = Utc::now();
    let mut movements = Vec::new();

    for ((group_key, bet_key), books) in &groups.odds {
        let meta = meta_for(&groups, group_key, now);
        let bet_key_str = bet_key.to_string();

        for (bookmaker, &current) in books {
            let prior = storage
                .get_last_odds_snapshot(group_key, &bet_key_str, bookmaker)
                .await?;

            let (prior_max, prior_min) = match &prior {
                Some(s) => (s.max_odd, s.min_odd),
                None => (0.0, 0.0),
            };

            let drop_pct = if prior_max > 0.0 {
                (prior_max - current) / prior_max * 100.0
            } else {
                0.0
            };
            let rise_pct = if prior_min > 0.0 {
                (current - prior_min) / prior_min * 100.0
            } else {
                0.0
            };

            let mut pushed_for_key = Vec::new();

            if prior_max > 0.0 && drop_pct >= threshold_percent {
                pushed_for_key.push(LineMovement {
                    match_group_key: group_key.clone(),
                    match_name: meta.match_name.clone(),
                    sport: meta.sport.clone(),
                    start_time: meta.start_time,
                    bet_key: bet_key_str.clone(),
                    bookmaker: bookmaker.clone(),
                    previous_odd: prior_max,
                    current_odd: current,
                    change_abs: current - prior_max,
                    change_percent: -drop_pct,
                    detected_at: now,
                    history_timeline: String::new(),
                });
            }
            if prior_min > 0.0 && rise_pct >= threshold_percent {
                pushed_for_key.push(LineMovement {
                    match_group_key: group_key.clone(),
                    match_name: meta.match_name.clone(),
                    sport: meta.sport.clone(),
                    start_time: meta.start_time,
                    bet_key: bet_key_str.clone(),
                    bookmaker: bookmaker.clone(),
                    previous_odd: prior_min,
                    current_odd: current,
                    change_abs: current - prior_min,
                    change_percent: rise_pct,
                    detected_at: now,
                    history_timeline: String::new(),
                });
            }

            let new_max = if prior_max > 0.0 { prior_max.max(current) } else { current };
            let new_min = if prior_min > 0.0 { prior_min.min(current) } else { current };

            storage
                .store_odds_snapshot(&OddsSnapshot {
                    match_group_key: group_key.clone(),
                    bet_key: bet_key_str.clone(),
                    bookmaker: bookmaker.clone(),
                    odd: current,
                    max_odd: new_max,
                    min_odd: new_min,
                    recorded_at: now,
                    match_name: meta.match_name.clone(),
                    sport: meta.sport.clone(),
                    event_type: bet_key.event_type.clone(),
                    outcome_type: bet_key.outcome_type.clone(),
                    parameter: bet_key.parameter.clone(),
                    start_time: meta.start_time,
                })
                .await?;

            storage
                .append_odds_history(&OddsHistoryPoint {
                    match_group_key: group_key.clone(),
                    bet_key: bet_key_str.clone(),
                    bookmaker: bookmaker.clone(),
                    odd: current,
                    recorded_at: now,
                    start_time: meta.start_time,
                })
                .await?;

            if !pushed_for_key.is_empty() {
                let history = storage
                    .get_odds_history(group_key, &bet_key_str, bookmaker, 20)
                    .await?;
                let timeline = crate::utils::render_timeline(&history, now);
                for movement in &mut pushed_for_key {
                    movement.history_timeline = timeline.clone();
                }
            }
            movements.extend(pushed_for_key);
        }
    }

    Ok(movements)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, Outcome};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        snapshots: Mutex<std::collections::HashMap<(String, String, String), OddsSnapshot>>,
    }

    #[async_trait]
    impl OddsSnapshotStorage for FakeStore {
        async fn store_odds_snapshot(&self, s: &OddsSnapshot) -> anyhow::Result<()> {
            self.snapshots.lock().unwrap().insert(
                (s.match_group_key.clone(), s.bet_key.clone(), s.bookmaker.clone()),
                s.clone(),
            );
            Ok(())
        }

        async fn get_last_odds_snapshot(
            &self,
            group: &str,
            bet_key: &str,
            bookmaker: &str,
        ) -> anyhow::Result<Option<OddsSnapshot>> {
            Ok(self
                .snapshots
                .lock()
                .unwrap()
                .get(&(group.to_string(), bet_key.to_string(), bookmaker.to_string()))
                .cloned())
        }

        async fn append_odds_history(&self, _point: &OddsHistoryPoint) -> anyhow::Result<()> {
            Ok(())
        }

        async fn get_odds_history(
            &self,
            _group: &str,
            _bet_key: &str,
            _bookmaker: &str,
            _limit: i64,
        ) -> anyhow::Result<Vec<OddsHistoryPoint>> {
            Ok(vec![])
        }

        async fn reset_extremes_after_alert(
            &self,
            group: &str,
            bet_key: &str,
            bookmaker: &str,
            current_odd: f64,
        ) -> anyhow::Result<()> {
            if let Some(s) = self
                .snapshots
                .lock()
                .unwrap()
                .get_mut(&(group.to_string(), bet_key.to_string(), bookmaker.to_string()))
            {
                s.max_odd = current_odd;
                s.min_odd = current_odd;
            }
            Ok(())
        }

        async fn clean_snapshots_for_started_matches(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn health_check(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn match_at(home: &str, away: &str, odd: f64) -> Match {
        Match {
            id: "m".into(),
            name: String::new(),
            home_team: home.into(),
            away_team: away.into(),
            start_time: Utc.with_ymd_and_hms(2026, 6, 1, 20, 0, 0).unwrap(),
            sport: "football".into(),
            tournament: None,
            bookmaker: None,
            events: vec![Event {
                id: "e".into(),
                event_type: "main_match".into(),
                market_name: String::new(),
                bookmaker: None,
                outcomes: vec![Outcome {
                    id: "o".into(),
                    outcome_type: "home_win".into(),
                    parameter: None,
                    odd,
                    bookmaker: Some("W".into()),
                }],
            }],
        }
    }

    #[tokio::test]
    async fn s3_line_movement_drop_sequence() {
        let store = FakeStore::default();

        // pass 1: 2.00 — nothing to compare against yet
        let m1 = match_at("A", "B", 2.00);
        let moves1 = detect_movements(&[m1], 5.0, &store).await.unwrap();
        assert!(moves1.is_empty());

        // pass 2: 1.90 vs max 2.00 -> drop_pct == 5.0, threshold met, emits
        let m2 = match_at("A", "B", 1.90);
        let moves2 = detect_movements(&[m2], 5.0, &store).await.unwrap();
        assert_eq!(moves2.len(), 1);
        assert!((moves2[0].change_percent + 5.0).abs() < 1e-6);

        // pass 3: 1.50 vs max 2.00 -> drop_pct == 25%, emits
        let m3 = match_at("A", "B", 1.50);
        let moves3 = detect_movements(&[m3], 5.0, &store).await.unwrap();
        assert_eq!(moves3.len(), 1);
        assert!((moves3[0].previous_odd - 2.00).abs() < 1e-9);
        assert!((moves3[0].current_odd - 1.50).abs() < 1e-9);
        assert!((moves3[0].change_percent + 25.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn monotonic_extremes_track_min_and_max() {
        let store = FakeStore::default();
        for odd in [2.0, 1.5, 2.5, 1.2] {
            let m = match_at("A", "B", odd);
            detect_movements(&[m], 1000.0, &store).await.unwrap();
        }
        let snap = store
            .get_last_odds_snapshot("football|a|b|2026-06-01T20:00:00+00:00", "main_match|home_win|", "W")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(snap.max_odd, 2.5);
        assert_eq!(snap.min_odd, 1.2);
    }
}

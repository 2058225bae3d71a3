//! Alert Orchestrator (C4): periodic worker that fetches a fresh snapshot,
//! runs the Aggregator and Detector, applies the dedup policy, and enqueues
//! survivors into the Dispatcher. Also exposes the start/stop/partial-disable
//! controls backing the HTTP surface.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{watch, Notify};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::aggregator::{compute_diffs, compute_value_bets};
use crate::config::{
    Config, DEFAULT_ALERT_COOLDOWN_MINUTES, DEFAULT_ALERT_MIN_INCREASE, DEFAULT_ALERT_THRESHOLD, DEFAULT_ASYNC_ENABLED,
    DEFAULT_ASYNC_INTERVAL_SECS, DEFAULT_LINE_MOVEMENT_THRESHOLD_PERCENT, DEFAULT_MIN_VALUE_PERCENT,
};
use crate::detector::detect_movements;
use crate::dispatcher::DispatcherHandle;
use crate::models::AlertMessage;
use crate::parser_client::ParserClient;
use crate::storage::{DiffBetStorage, OddsSnapshotStorage};

/// Top-N kept per pass before dedup/filtering; generous relative to the
/// HTTP surface's own small `limit` clamps so nothing above threshold is
/// missed because of early truncation.
const PASS_KEEP_TOP: usize = 200;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Stopped,
    Running,
    Stopping,
}

struct OrchestratorState {
    status: WorkerStatus,
    alerts_value_enabled: bool,
    alerts_line_movement_enabled: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorStatus {
    pub status: WorkerStatus,
    pub alerts_value_enabled: bool,
    pub alerts_line_movement_enabled: bool,
}

/// Last alerted `value_percent` per `(group, bet_key, bookmaker)`. ValueBets
/// have no persisted storage contract (§4.7 defines one only for diffs and
/// snapshots), so this dedup memory is process-local and resets on restart;
/// see DESIGN.md for the rationale.
type ValueBetMemory = Mutex<HashMap<(String, String, String), (f64, DateTime<Utc>)>>;

pub struct Orchestrator {
    config: Arc<Config>,
    parser: Arc<ParserClient>,
    diff_storage: Arc<dyn DiffBetStorage>,
    odds_storage: Arc<dyn OddsSnapshotStorage>,
    dispatcher: DispatcherHandle,
    state: Mutex<OrchestratorState>,
    value_memory: ValueBetMemory,
    notify: Notify,
}

/// Cheap handle shared with the HTTP layer; cloning shares the same
/// underlying Orchestrator.
#[derive(Clone)]
pub struct OrchestratorHandle(Arc<Orchestrator>);

impl OrchestratorHandle {
    pub fn start(&self) -> OrchestratorStatus {
        let mut state = self.0.state.lock().unwrap();
        if state.status != WorkerStatus::Running {
            state.status = WorkerStatus::Running;
            self.0.notify.notify_one();
        }
        snapshot(&state)
    }

    pub fn stop(&self) -> OrchestratorStatus {
        let mut state = self.0.state.lock().unwrap();
        if state.status == WorkerStatus::Running {
            state.status = WorkerStatus::Stopping;
        }
        snapshot(&state)
    }

    pub fn stop_values(&self) -> OrchestratorStatus {
        let mut state = self.0.state.lock().unwrap();
        state.alerts_value_enabled = false;
        snapshot(&state)
    }

    pub fn stop_overlays(&self) -> OrchestratorStatus {
        let mut state = self.0.state.lock().unwrap();
        state.alerts_line_movement_enabled = false;
        snapshot(&state)
    }

    pub fn status(&self) -> OrchestratorStatus {
        snapshot(&self.0.state.lock().unwrap())
    }
}

fn snapshot(state: &OrchestratorState) -> OrchestratorStatus {
    OrchestratorStatus {
        status: state.status,
        alerts_value_enabled: state.alerts_value_enabled,
        alerts_line_movement_enabled: state.alerts_line_movement_enabled,
    }
}

/// Spawns the worker task. Runs one pass immediately if auto-start is
/// configured, then one pass per tick, until `shutdown` fires.
pub fn spawn(
    config: Arc<Config>,
    parser: Arc<ParserClient>,
    diff_storage: Arc<dyn DiffBetStorage>,
    odds_storage: Arc<dyn OddsSnapshotStorage>,
    dispatcher: DispatcherHandle,
    mut shutdown: watch::Receiver<bool>,
) -> (OrchestratorHandle, tokio::task::JoinHandle<()>) {
    let initial_status = if config.async_enabled.unwrap_or(DEFAULT_ASYNC_ENABLED) {
        WorkerStatus::Running
    } else {
        WorkerStatus::Stopped
    };

    let orchestrator = Arc::new(Orchestrator {
        config: config.clone(),
        parser,
        diff_storage,
        odds_storage,
        dispatcher,
        state: Mutex::new(OrchestratorState {
            status: initial_status,
            alerts_value_enabled: true,
            alerts_line_movement_enabled: true,
        }),
        value_memory: Mutex::new(HashMap::new()),
        notify: Notify::new(),
    });

    let handle = OrchestratorHandle(orchestrator.clone());

    let join = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(config.async_interval_secs.unwrap_or(DEFAULT_ASYNC_INTERVAL_SECS)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            let running = { orchestrator.state.lock().unwrap().status == WorkerStatus::Running };
            if running {
                if let Err(err) = orchestrator.run_pass(&mut shutdown).await {
                    warn!(error = %err, "orchestrator pass failed, skipping");
                }
                let mut state = orchestrator.state.lock().unwrap();
                if state.status == WorkerStatus::Stopping {
                    state.status = WorkerStatus::Stopped;
                    info!("orchestrator stopped");
                }
            }

            tokio::select! {
                biased;
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        break;
                    }
                }
                _ = ticker.tick() => {}
                _ = orchestrator.notify.notified() => {}
            }
        }
    });

    (handle, join)
}

impl Orchestrator {
    async fn run_pass(&self, shutdown: &mut watch::Receiver<bool>) -> anyhow::Result<()> {
        match tokio::time::timeout(Duration::from_secs(60), self.odds_storage.clean_snapshots_for_started_matches()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!(error = %err, "cleaning started-match snapshots failed"),
            Err(_) => warn!("cleaning started-match snapshots timed out"),
        }

        let matches = self.parser.fetch_matches(shutdown).await?;
        info!(count = matches.len(), "orchestrator fetched matches");

        let diffs = compute_diffs(&matches, PASS_KEEP_TOP);
        let min_value_percent = self.config.min_value_percent.unwrap_or(DEFAULT_MIN_VALUE_PERCENT);
        let line_movement_threshold_percent = self
            .config
            .line_movement_threshold_percent
            .unwrap_or(DEFAULT_LINE_MOVEMENT_THRESHOLD_PERCENT);
        let value_bets = compute_value_bets(&matches, &self.config.bookmaker_weights, min_value_percent, PASS_KEEP_TOP);
        let movements = detect_movements(&matches, line_movement_threshold_percent, self.odds_storage.as_ref()).await?;

        let (alerts_value_enabled, alerts_line_movement_enabled) = {
            let state = self.state.lock().unwrap();
            (state.alerts_value_enabled, state.alerts_line_movement_enabled)
        };

        let alert_threshold = self.config.alert_threshold.unwrap_or(DEFAULT_ALERT_THRESHOLD);

        self.process_diffs(&diffs, alert_threshold).await;
        self.process_value_bets(&value_bets, alerts_value_enabled);
        self.process_movements(&movements, alerts_line_movement_enabled).await;

        Ok(())
    }

    /// Diffs are the Orchestrator's primary signal (§4.4) and are not gated
    /// by `alerts_value_enabled`/`alerts_line_movement_enabled` — only by
    /// dedup and the `max_odds` cutoff, both already applied here.
    async fn process_diffs(&self, diffs: &[crate::models::DiffBet], alert_threshold: f64) {
        for diff in diffs {
            if diff.diff_percent < alert_threshold {
                continue;
            }
            let crosses = self.diff_crosses_dedup(diff.match_group_key.clone(), diff.bet_key.clone(), diff.diff_percent, diff.calculated_at).await;

            let inserted = self.diff_storage.store_diff_bet(diff).await.unwrap_or_else(|err| {
                warn!(error = %err, "persisting diff failed");
                false
            });
            debug!(match_name = %diff.match_name, diff_percent = diff.diff_percent, inserted, "diff evaluated");

            if !crosses {
                continue;
            }
            if let Some(cutoff) = self.config.max_odds {
                if diff.max_odd > cutoff {
                    continue;
                }
            }
            self.dispatcher.enqueue(AlertMessage::Diff(diff.clone()));
        }
    }

    fn process_value_bets(&self, value_bets: &[crate::models::ValueBet], alerts_value_enabled: bool) {
        for value_bet in value_bets {
            let key = (value_bet.match_group_key.clone(), value_bet.bet_key.clone(), value_bet.bookmaker.clone());
            let crosses = self.value_bet_crosses_dedup(&key, value_bet.value_percent, value_bet.calculated_at);
            debug!(match_name = %value_bet.match_name, value_percent = value_bet.value_percent, crosses, "value bet evaluated");
            if crosses && alerts_value_enabled {
                self.dispatcher.enqueue(AlertMessage::Value(value_bet.clone()));
            }
        }
    }

    /// The extremes reset only happens when the movement alert actually
    /// fires (§4.4's "after an alert is dispatched"); with overlays
    /// disabled, a swing must stay live so it isn't lost once re-enabled.
    async fn process_movements(&self, movements: &[crate::models::LineMovement], alerts_line_movement_enabled: bool) {
        for movement in movements {
            // The current_odd > 8.0 cutoff is an operational filter on the
            // /line-movements/top endpoint's listing only, not a suppression
            // of alerting here.
            debug!(match_name = %movement.match_name, change_percent = movement.change_percent, "movement evaluated");
            if alerts_line_movement_enabled {
                self.odds_storage
                    .reset_extremes_after_alert(&movement.match_group_key, &movement.bet_key, &movement.bookmaker, movement.current_odd)
                    .await
                    .unwrap_or_else(|err| warn!(error = %err, "resetting movement extremes failed"));
                self.dispatcher.enqueue(AlertMessage::Movement(movement.clone()));
            }
        }
    }

    /// Dedup policy for diffs (§4.4): fetch prior persisted record for the
    /// same key, alert on first crossing, after cooldown expiry, or on a
    /// sufficient further increase. A storage read failure degrades to
    /// "alert anyway".
    async fn diff_crosses_dedup(&self, group_key: String, bet_key: String, current_percent: f64, calculated_at: DateTime<Utc>) -> bool {
        let alert_threshold = self.config.alert_threshold.unwrap_or(DEFAULT_ALERT_THRESHOLD);
        let cooldown = self.config.alert_cooldown_minutes.unwrap_or(DEFAULT_ALERT_COOLDOWN_MINUTES);
        let min_increase = self.config.alert_min_increase.unwrap_or(DEFAULT_ALERT_MIN_INCREASE);
        match self.diff_storage.get_last_diff_bet(&group_key, &bet_key, calculated_at).await {
            Ok(None) => true,
            Ok(Some(prior)) => {
                if prior.diff_percent < alert_threshold {
                    true
                } else {
                    let since_last = calculated_at - prior.calculated_at;
                    if since_last.num_minutes() > cooldown {
                        true
                    } else {
                        current_percent - prior.diff_percent >= min_increase
                    }
                }
            }
            Err(err) => {
                warn!(error = %err, "dedup store read failed, alerting anyway");
                true
            }
        }
    }

    fn value_bet_crosses_dedup(&self, key: &(String, String, String), current_percent: f64, calculated_at: DateTime<Utc>) -> bool {
        let min_value_percent = self.config.min_value_percent.unwrap_or(DEFAULT_MIN_VALUE_PERCENT);
        let cooldown = self.config.alert_cooldown_minutes.unwrap_or(DEFAULT_ALERT_COOLDOWN_MINUTES);
        let min_increase = self.config.alert_min_increase.unwrap_or(DEFAULT_ALERT_MIN_INCREASE);
        let mut memory = self.value_memory.lock().unwrap();
        let decision = match memory.get(key) {
            None => true,
            Some((prior_percent, prior_at)) => {
                if *prior_percent < min_value_percent {
                    true
                } else if (calculated_at - *prior_at).num_minutes() > cooldown {
                    true
                } else {
                    current_percent - prior_percent >= min_increase
                }
            }
        };
        if decision {
            memory.insert(key.clone(), (current_percent, calculated_at));
        }
        decision
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher;
    use crate::models::{DiffBet, DiffRecord, LineMovement, OddsHistoryPoint, OddsSnapshot, ValueBet};
    use async_trait::async_trait;
    use chrono::TimeZone;

    #[derive(Default)]
    struct FakeDiffStore {
        last: Mutex<HashMap<(String, String), DiffRecord>>,
    }

    #[async_trait]
    impl DiffBetStorage for FakeDiffStore {
        async fn store_diff_bet(&self, diff: &DiffBet) -> anyhow::Result<bool> {
            self.last.lock().unwrap().insert(
                (diff.match_group_key.clone(), diff.bet_key.clone()),
                DiffRecord {
                    match_group_key: diff.match_group_key.clone(),
                    bet_key: diff.bet_key.clone(),
                    diff_percent: diff.diff_percent,
                    calculated_at: diff.calculated_at,
                },
            );
            Ok(true)
        }

        async fn get_last_diff_bet(&self, group: &str, bet_key: &str, _exclude: DateTime<Utc>) -> anyhow::Result<Option<DiffRecord>> {
            Ok(self.last.lock().unwrap().get(&(group.to_string(), bet_key.to_string())).cloned())
        }

        async fn clean_diff_bets(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeOddsStore {
        snapshots: Mutex<HashMap<(String, String, String), OddsSnapshot>>,
        reset_calls: Mutex<usize>,
    }

    #[async_trait]
    impl OddsSnapshotStorage for FakeOddsStore {
        async fn store_odds_snapshot(&self, s: &OddsSnapshot) -> anyhow::Result<()> {
            self.snapshots
                .lock()
                .unwrap()
                .insert((s.match_group_key.clone(), s.bet_key.clone(), s.bookmaker.clone()), s.clone());
            Ok(())
        }

        async fn get_last_odds_snapshot(&self, group: &str, bet_key: &str, bookmaker: &str) -> anyhow::Result<Option<OddsSnapshot>> {
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

        async fn get_odds_history(&self, _group: &str, _bet_key: &str, _bookmaker: &str, _limit: i64) -> anyhow::Result<Vec<OddsHistoryPoint>> {
            Ok(vec![])
        }

        async fn reset_extremes_after_alert(&self, _group: &str, _bet_key: &str, _bookmaker: &str, _current_odd: f64) -> anyhow::Result<()> {
            *self.reset_calls.lock().unwrap() += 1;
            Ok(())
        }

        async fn clean_snapshots_for_started_matches(&self) -> anyhow::Result<()> {
            Ok(())
        }

        async fn health_check(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn test_config() -> Config {
        Config {
            config_path: None,
            listen_addr: "0.0.0.0:3000".into(),
            parser_url: None,
            async_enabled: Some(false),
            async_interval_secs: Some(DEFAULT_ASYNC_INTERVAL_SECS),
            alert_threshold: Some(DEFAULT_ALERT_THRESHOLD),
            alert_threshold_20: None,
            alert_threshold_10: None,
            alert_cooldown_minutes: Some(DEFAULT_ALERT_COOLDOWN_MINUTES),
            alert_min_increase: Some(DEFAULT_ALERT_MIN_INCREASE),
            line_movement_threshold_percent: Some(DEFAULT_LINE_MOVEMENT_THRESHOLD_PERCENT),
            max_odds: None,
            min_value_percent: Some(DEFAULT_MIN_VALUE_PERCENT),
            notifier_bot_token: None,
            notifier_chat_id: None,
            bookmaker_weights: crate::models::BookmakerWeights(HashMap::new()),
        }
    }

    fn test_orchestrator(config: Config, diff_storage: Arc<dyn DiffBetStorage>, odds_storage: Arc<dyn OddsSnapshotStorage>, dispatcher: DispatcherHandle) -> Orchestrator {
        Orchestrator {
            config: Arc::new(config),
            parser: Arc::new(ParserClient::new(String::new())),
            diff_storage,
            odds_storage,
            dispatcher,
            state: Mutex::new(OrchestratorState {
                status: WorkerStatus::Stopped,
                alerts_value_enabled: true,
                alerts_line_movement_enabled: true,
            }),
            value_memory: Mutex::new(HashMap::new()),
            notify: Notify::new(),
        }
    }

    fn diff_at(percent: f64, calculated_at: DateTime<Utc>) -> DiffBet {
        DiffBet {
            match_group_key: "g".into(),
            match_name: "A vs B".into(),
            sport: "football".into(),
            start_time: Utc.with_ymd_and_hms(2026, 6, 1, 20, 0, 0).unwrap(),
            bet_key: "bk".into(),
            min_bookmaker: "X".into(),
            min_odd: 1.5,
            max_bookmaker: "Y".into(),
            max_odd: 2.0,
            diff_abs: 0.5,
            diff_percent: percent,
            bookmaker_count: 2,
            calculated_at,
        }
    }

    fn movement_at(bookmaker: &str) -> LineMovement {
        LineMovement {
            match_group_key: "g".into(),
            match_name: "A vs B".into(),
            sport: "football".into(),
            start_time: Utc.with_ymd_and_hms(2026, 6, 1, 20, 0, 0).unwrap(),
            bet_key: "bk".into(),
            bookmaker: bookmaker.into(),
            previous_odd: 2.0,
            current_odd: 1.5,
            change_abs: -0.5,
            change_percent: -25.0,
            detected_at: Utc::now(),
            history_timeline: String::new(),
        }
    }

    /// S5 (cooldown suppression): a diff above threshold does not re-alert
    /// within cooldown unless it climbs by at least `alert_min_increase`.
    #[tokio::test]
    async fn s5_diff_dedup_suppresses_within_cooldown_then_allows_on_increase() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (dispatcher, _join) = dispatcher::spawn(Arc::new(crate::notifier::NullNotifier), shutdown_rx);
        let diff_storage: Arc<dyn DiffBetStorage> = Arc::new(FakeDiffStore::default());
        let odds_storage: Arc<dyn OddsSnapshotStorage> = Arc::new(FakeOddsStore::default());
        let orch = test_orchestrator(test_config(), diff_storage.clone(), odds_storage, dispatcher);

        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        assert!(orch.diff_crosses_dedup("g".into(), "bk".into(), 12.0, t0).await);
        diff_storage.store_diff_bet(&diff_at(12.0, t0)).await.unwrap();

        // 10 minutes later, below DEFAULT_ALERT_MIN_INCREASE (5.0) and inside
        // the 60-minute cooldown: suppressed.
        let t1 = t0 + chrono::Duration::minutes(10);
        assert!(!orch.diff_crosses_dedup("g".into(), "bk".into(), 14.0, t1).await);

        // Same window, but the increase now clears alert_min_increase: allowed.
        assert!(orch.diff_crosses_dedup("g".into(), "bk".into(), 18.0, t1).await);
    }

    #[tokio::test]
    async fn s5_value_bet_dedup_suppresses_within_cooldown_then_allows_after_expiry() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (dispatcher, _join) = dispatcher::spawn(Arc::new(crate::notifier::NullNotifier), shutdown_rx);
        let diff_storage: Arc<dyn DiffBetStorage> = Arc::new(FakeDiffStore::default());
        let odds_storage: Arc<dyn OddsSnapshotStorage> = Arc::new(FakeOddsStore::default());
        let orch = test_orchestrator(test_config(), diff_storage, odds_storage, dispatcher);

        let key = ("g".to_string(), "bk".to_string(), "X".to_string());
        let t0 = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
        assert!(orch.value_bet_crosses_dedup(&key, 8.0, t0));

        let t1 = t0 + chrono::Duration::minutes(10);
        assert!(!orch.value_bet_crosses_dedup(&key, 9.0, t1));

        // Past the 60-minute cooldown: allowed even without a further increase.
        let t2 = t0 + chrono::Duration::minutes(61);
        assert!(orch.value_bet_crosses_dedup(&key, 9.0, t2));
    }

    /// Diffs are the primary signal and must not be gated by
    /// `alerts_value_enabled` (the bug this regression test guards against:
    /// `POST /async/stop_values` previously silenced diff alerts too).
    #[tokio::test]
    async fn diffs_enqueue_even_when_value_alerts_disabled() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (dispatcher, _join) = dispatcher::spawn(Arc::new(crate::notifier::NullNotifier), shutdown_rx);
        let diff_storage: Arc<dyn DiffBetStorage> = Arc::new(FakeDiffStore::default());
        let odds_storage: Arc<dyn OddsSnapshotStorage> = Arc::new(FakeOddsStore::default());
        let orch = test_orchestrator(test_config(), diff_storage, odds_storage, dispatcher.clone());

        let diff = diff_at(15.0, Utc::now());
        orch.process_diffs(std::slice::from_ref(&diff), DEFAULT_ALERT_THRESHOLD).await;

        let drained = dispatcher.clear_queue().await;
        assert_eq!(drained, 1, "diff alert must enqueue regardless of alerts_value_enabled");
    }

    /// With line-movement alerts disabled, neither the enqueue nor the
    /// extremes reset happens, so a genuine swing survives to be detected
    /// again once overlays are re-enabled.
    #[tokio::test]
    async fn movement_reset_and_enqueue_both_skipped_when_overlays_disabled() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (dispatcher, _join) = dispatcher::spawn(Arc::new(crate::notifier::NullNotifier), shutdown_rx);
        let diff_storage: Arc<dyn DiffBetStorage> = Arc::new(FakeDiffStore::default());
        let odds_store = Arc::new(FakeOddsStore::default());
        let odds_storage: Arc<dyn OddsSnapshotStorage> = odds_store.clone();
        let orch = test_orchestrator(test_config(), diff_storage, odds_storage, dispatcher.clone());

        let movement = movement_at("X");
        orch.process_movements(std::slice::from_ref(&movement), false).await;

        assert_eq!(*odds_store.reset_calls.lock().unwrap(), 0, "extremes must not reset while overlays are disabled");
        let drained = dispatcher.clear_queue().await;
        assert_eq!(drained, 0, "movement alert must not enqueue while overlays are disabled");
    }

    #[tokio::test]
    async fn movement_reset_and_enqueue_both_happen_when_overlays_enabled() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (dispatcher, _join) = dispatcher::spawn(Arc::new(crate::notifier::NullNotifier), shutdown_rx);
        let diff_storage: Arc<dyn DiffBetStorage> = Arc::new(FakeDiffStore::default());
        let odds_store = Arc::new(FakeOddsStore::default());
        let odds_storage: Arc<dyn OddsSnapshotStorage> = odds_store.clone();
        let orch = test_orchestrator(test_config(), diff_storage, odds_storage, dispatcher.clone());

        let movement = movement_at("X");
        orch.process_movements(std::slice::from_ref(&movement), true).await;

        assert_eq!(*odds_store.reset_calls.lock().unwrap(), 1);
        let drained = dispatcher.clear_queue().await;
        assert_eq!(drained, 1);
    }

    fn value_bet_at(bookmaker: &str) -> ValueBet {
        ValueBet {
            match_group_key: "g".into(),
            match_name: "A vs B".into(),
            sport: "football".into(),
            start_time: Utc.with_ymd_and_hms(2026, 6, 1, 20, 0, 0).unwrap(),
            bet_key: "bk".into(),
            bookmaker: bookmaker.into(),
            odd: 2.2,
            fair_probability: 0.5,
            fair_odd: 2.0,
            value_percent: 8.0,
            expected_value: 0.1,
            calculated_at: Utc::now(),
        }
    }

    /// Unlike diffs, ValueBet alerts ARE gated by `alerts_value_enabled`.
    #[tokio::test]
    async fn value_bets_do_not_enqueue_when_value_alerts_disabled() {
        let (_shutdown_tx, shutdown_rx) = watch::channel(false);
        let (dispatcher, _join) = dispatcher::spawn(Arc::new(crate::notifier::NullNotifier), shutdown_rx);
        let diff_storage: Arc<dyn DiffBetStorage> = Arc::new(FakeDiffStore::default());
        let odds_storage: Arc<dyn OddsSnapshotStorage> = Arc::new(FakeOddsStore::default());
        let orch = test_orchestrator(test_config(), diff_storage, odds_storage, dispatcher.clone());

        let value_bet = value_bet_at("X");
        orch.process_value_bets(std::slice::from_ref(&value_bet), false);

        let drained = dispatcher.clear_queue().await;
        assert_eq!(drained, 0);
    }
}

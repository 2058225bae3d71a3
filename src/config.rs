use std::collections::HashMap;
use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde::Deserialize;

use crate::models::BookmakerWeights;

/// Default knobs applied only after CLI/env/file merging (§4.8), so a
/// config-file value is never shadowed by a premature clap default.
pub const DEFAULT_ASYNC_ENABLED: bool = true;
pub const DEFAULT_ASYNC_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_ALERT_THRESHOLD: f64 = 10.0;
pub const DEFAULT_ALERT_COOLDOWN_MINUTES: i64 = 60;
pub const DEFAULT_ALERT_MIN_INCREASE: f64 = 5.0;
pub const DEFAULT_LINE_MOVEMENT_THRESHOLD_PERCENT: f64 = 5.0;
pub const DEFAULT_MIN_VALUE_PERCENT: f64 = 3.0;

/// Calculator configuration: CLI flags and env vars always available, with an
/// optional TOML file applied first and overridden by both (§4.8).
#[derive(Parser, Debug, Clone)]
#[command(name = "odds-calculator")]
#[command(about = "Cross-bookmaker odds diff, value-bet, and line-movement analytics engine")]
pub struct Config {
    /// Path to an optional TOML configuration file.
    #[arg(long, env = "CONFIG_PATH")]
    pub config_path: Option<String>,

    /// HTTP listen address, e.g. "0.0.0.0:3000".
    #[arg(long, env = "LISTEN_ADDR", default_value = "0.0.0.0:3000")]
    pub listen_addr: String,

    /// Upstream Parser `/matches` base URL.
    #[arg(long, env = "PARSER_URL")]
    pub parser_url: Option<String>,

    /// Whether the periodic Orchestrator worker auto-starts. Defaults to
    /// `true` (see [`resolve_defaults`](Config::resolve_defaults)) — left
    /// without a clap `default_value` so a config-file value isn't shadowed
    /// by a default clap would otherwise bake in before the file is read.
    #[arg(long, env = "ASYNC_ENABLED")]
    pub async_enabled: Option<bool>,

    /// Orchestrator tick interval, in seconds. Defaults to 30.
    #[arg(long, env = "ASYNC_INTERVAL_SECS")]
    pub async_interval_secs: Option<u64>,

    /// Canonical diff-alert threshold, in percent.
    #[arg(long, env = "ALERT_THRESHOLD")]
    pub alert_threshold: Option<f64>,

    /// Deprecated alias for `alert_threshold` (precedence: single > 20 > 10).
    #[arg(long, env = "ALERT_THRESHOLD_20")]
    pub alert_threshold_20: Option<f64>,

    /// Deprecated alias for `alert_threshold` (precedence: single > 20 > 10).
    #[arg(long, env = "ALERT_THRESHOLD_10")]
    pub alert_threshold_10: Option<f64>,

    /// Minimum time between two alerts for the same (match, bet) pair. Defaults to 60.
    #[arg(long, env = "ALERT_COOLDOWN_MINUTES")]
    pub alert_cooldown_minutes: Option<i64>,

    /// Minimum metric increase (percentage points) required to re-alert within
    /// cooldown. Defaults to 5.0.
    #[arg(long, env = "ALERT_MIN_INCREASE")]
    pub alert_min_increase: Option<f64>,

    /// Line-movement alert threshold, in percent. Defaults to 5.0.
    #[arg(long, env = "LINE_MOVEMENT_THRESHOLD_PERCENT")]
    pub line_movement_threshold_percent: Option<f64>,

    /// Diffs above this max odd are not alerted (still persisted).
    #[arg(long, env = "MAX_ODDS")]
    pub max_odds: Option<f64>,

    /// Minimum value percent for a ValueBet to be emitted. Defaults to 3.0.
    #[arg(long, env = "MIN_VALUE_PERCENT")]
    pub min_value_percent: Option<f64>,

    /// Telegram bot token used by the Notification Dispatcher.
    #[arg(long, env = "NOTIFIER_BOT_TOKEN")]
    pub notifier_bot_token: Option<String>,

    /// Telegram chat identifier used by the Notification Dispatcher.
    #[arg(long, env = "NOTIFIER_CHAT_ID")]
    pub notifier_chat_id: Option<String>,

    /// Case-insensitive per-bookmaker weights for the value-bet consensus.
    /// Only settable via the config file; absent from CLI/env.
    #[arg(skip)]
    pub bookmaker_weights: BookmakerWeights,
}

/// Subset of [`Config`] loadable from a TOML file; CLI/env fields are merged
/// in afterwards and take precedence over anything set here.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    parser_url: Option<String>,
    async_enabled: Option<bool>,
    async_interval_secs: Option<u64>,
    alert_threshold: Option<f64>,
    alert_threshold_20: Option<f64>,
    alert_threshold_10: Option<f64>,
    alert_cooldown_minutes: Option<i64>,
    alert_min_increase: Option<f64>,
    line_movement_threshold_percent: Option<f64>,
    max_odds: Option<f64>,
    min_value_percent: Option<f64>,
    notifier_bot_token: Option<String>,
    notifier_chat_id: Option<String>,
    #[serde(default)]
    bookmaker_weights: HashMap<String, f64>,
}

impl Config {
    /// Parses CLI/env, applies an optional TOML file underneath it, resolves
    /// the deprecated alert-threshold aliases, and validates the result.
    pub fn load() -> Result<Self> {
        let mut config = Config::parse();

        if let Some(path) = config.config_path.clone() {
            config.apply_file(&path)?;
        }

        config.resolve_alert_threshold_aliases();
        config.resolve_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Fills in defaults for knobs left unset by CLI, env, and the config
    /// file, once all three have been merged. Keeping these fields `Option`
    /// all the way through (rather than a clap `default_value`) is what lets
    /// `apply_file` tell "unset" apart from "user passed the default".
    fn resolve_defaults(&mut self) {
        self.async_enabled.get_or_insert(DEFAULT_ASYNC_ENABLED);
        self.async_interval_secs.get_or_insert(DEFAULT_ASYNC_INTERVAL_SECS);
        self.alert_cooldown_minutes.get_or_insert(DEFAULT_ALERT_COOLDOWN_MINUTES);
        self.alert_min_increase.get_or_insert(DEFAULT_ALERT_MIN_INCREASE);
        self.line_movement_threshold_percent.get_or_insert(DEFAULT_LINE_MOVEMENT_THRESHOLD_PERCENT);
        self.min_value_percent.get_or_insert(DEFAULT_MIN_VALUE_PERCENT);
    }

    fn apply_file(&mut self, path: &str) -> Result<()> {
        let contents = std::fs::read_to_string(Path::new(path))
            .with_context(|| format!("reading config file {path}"))?;
        let file: FileConfig = toml::from_str(&contents).context("parsing config file as TOML")?;

        // Every field here is merged the same way: the file only fills in
        // what CLI/env left unset, so CLI/env always wins over the file.
        if self.parser_url.is_none() {
            self.parser_url = file.parser_url;
        }
        if self.async_enabled.is_none() {
            self.async_enabled = file.async_enabled;
        }
        if self.async_interval_secs.is_none() {
            self.async_interval_secs = file.async_interval_secs;
        }
        if self.alert_threshold.is_none() {
            self.alert_threshold = file.alert_threshold;
        }
        if self.alert_threshold_20.is_none() {
            self.alert_threshold_20 = file.alert_threshold_20;
        }
        if self.alert_threshold_10.is_none() {
            self.alert_threshold_10 = file.alert_threshold_10;
        }
        if self.alert_cooldown_minutes.is_none() {
            self.alert_cooldown_minutes = file.alert_cooldown_minutes;
        }
        if self.alert_min_increase.is_none() {
            self.alert_min_increase = file.alert_min_increase;
        }
        if self.line_movement_threshold_percent.is_none() {
            self.line_movement_threshold_percent = file.line_movement_threshold_percent;
        }
        if self.max_odds.is_none() {
            self.max_odds = file.max_odds;
        }
        if self.min_value_percent.is_none() {
            self.min_value_percent = file.min_value_percent;
        }
        if self.notifier_bot_token.is_none() {
            self.notifier_bot_token = file.notifier_bot_token;
        }
        if self.notifier_chat_id.is_none() {
            self.notifier_chat_id = file.notifier_chat_id;
        }
        self.bookmaker_weights = BookmakerWeights(
            file.bookmaker_weights
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v))
                .collect(),
        );

        Ok(())
    }

    /// Legacy aliases `alert_threshold_10`/`alert_threshold_20` fold into the
    /// single canonical `alert_threshold` knob. Precedence: single > 20 > 10.
    fn resolve_alert_threshold_aliases(&mut self) {
        if self.alert_threshold.is_some() {
            return;
        }
        if let Some(v) = self.alert_threshold_20 {
            tracing::warn!("alert_threshold_20 is deprecated, use alert_threshold");
            self.alert_threshold = Some(v);
        } else if let Some(v) = self.alert_threshold_10 {
            tracing::warn!("alert_threshold_10 is deprecated, use alert_threshold");
            self.alert_threshold = Some(v);
        } else {
            self.alert_threshold = Some(DEFAULT_ALERT_THRESHOLD);
        }
    }

    fn validate(&self) -> Result<()> {
        if self.async_interval_secs.unwrap_or(DEFAULT_ASYNC_INTERVAL_SECS) == 0 {
            bail!("async_interval_secs must be > 0");
        }
        if self.alert_cooldown_minutes.unwrap_or(DEFAULT_ALERT_COOLDOWN_MINUTES) < 0 {
            bail!("alert_cooldown_minutes must be >= 0");
        }
        if self.alert_min_increase.unwrap_or(DEFAULT_ALERT_MIN_INCREASE) < 0.0 {
            bail!("alert_min_increase must be >= 0");
        }
        if self.min_value_percent.unwrap_or(DEFAULT_MIN_VALUE_PERCENT) < 0.0 {
            bail!("min_value_percent must be >= 0");
        }
        if let Some(max_odds) = self.max_odds {
            if max_odds <= 1.0 {
                bail!("max_odds must be > 1.0 when set");
            }
        }
        if self.line_movement_threshold_percent.unwrap_or(DEFAULT_LINE_MOVEMENT_THRESHOLD_PERCENT) <= 0.0 {
            bail!("line_movement_threshold_percent must be > 0");
        }
        if self.async_enabled.unwrap_or(DEFAULT_ASYNC_ENABLED) {
            let url = self
                .parser_url
                .as_ref()
                .context("parser_url must be set when async_enabled is true")?;
            reqwest::Url::parse(url).context("parser_url is not a valid URL")?;
        }
        self.listen_addr
            .parse::<std::net::SocketAddr>()
            .with_context(|| format!("listen_addr {} is not a valid socket address", self.listen_addr))?;
        Ok(())
    }
}

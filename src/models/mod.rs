use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// One priced selection inside an [`Event`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Outcome {
    pub id: String,
    pub outcome_type: String,
    #[serde(default)]
    pub parameter: Option<String>,
    pub odd: f64,
    #[serde(default)]
    pub bookmaker: Option<String>,
}

/// A market within a [`Match`], e.g. main match result or total corners.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: String,
    pub event_type: String,
    #[serde(default)]
    pub market_name: String,
    #[serde(default)]
    pub bookmaker: Option<String>,
    #[serde(default)]
    pub outcomes: Vec<Outcome>,
}

/// A scheduled contest as returned by the upstream Parser's `/matches` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Match {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub home_team: String,
    pub away_team: String,
    pub start_time: DateTime<Utc>,
    pub sport: String,
    #[serde(default)]
    pub tournament: Option<String>,
    #[serde(default)]
    pub bookmaker: Option<String>,
    #[serde(default)]
    pub events: Vec<Event>,
}

impl Match {
    /// "home_team vs away_team", falling back to the display name if one side is blank.
    pub fn display_name(&self) -> String {
        if !self.name.is_empty() {
            self.name.clone()
        } else {
            format!("{} vs {}", self.home_team, self.away_team)
        }
    }
}

/// `(event_type, outcome_type, parameter)` — uniquely names a priced selection within a match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BetKey {
    pub event_type: String,
    pub outcome_type: String,
    pub parameter: String,
}

impl BetKey {
    pub fn new(event_type: &str, outcome_type: &str, parameter: &str) -> Self {
        Self {
            event_type: event_type.to_string(),
            outcome_type: outcome_type.to_string(),
            parameter: parameter.to_string(),
        }
    }
}

impl fmt::Display for BetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}|{}|{}", self.event_type, self.outcome_type, self.parameter)
    }
}

/// Arbitrage-style price gap for one match group and bet key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffBet {
    pub match_group_key: String,
    pub match_name: String,
    pub sport: String,
    pub start_time: DateTime<Utc>,
    pub bet_key: String,
    pub min_bookmaker: String,
    pub min_odd: f64,
    pub max_bookmaker: String,
    pub max_odd: f64,
    pub diff_abs: f64,
    pub diff_percent: f64,
    pub bookmaker_count: usize,
    pub calculated_at: DateTime<Utc>,
}

/// A single bookmaker's price judged against the cross-bookmaker consensus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValueBet {
    pub match_group_key: String,
    pub match_name: String,
    pub sport: String,
    pub start_time: DateTime<Utc>,
    pub bet_key: String,
    pub bookmaker: String,
    pub odd: f64,
    pub fair_probability: f64,
    pub fair_odd: f64,
    pub value_percent: f64,
    pub expected_value: f64,
    pub calculated_at: DateTime<Utc>,
}

/// Persistent row tracking one bookmaker's running extremes for one bet.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OddsSnapshot {
    pub match_group_key: String,
    pub bet_key: String,
    pub bookmaker: String,
    pub odd: f64,
    pub max_odd: f64,
    pub min_odd: f64,
    pub recorded_at: DateTime<Utc>,
    pub match_name: String,
    pub sport: String,
    pub event_type: String,
    pub outcome_type: String,
    pub parameter: String,
    pub start_time: DateTime<Utc>,
}

/// Append-only price history point used for alert timeline rendering.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OddsHistoryPoint {
    pub match_group_key: String,
    pub bet_key: String,
    pub bookmaker: String,
    pub odd: f64,
    pub recorded_at: DateTime<Utc>,
    pub start_time: DateTime<Utc>,
}

/// Persistent DiffBet row, keyed for dedup lookups.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct DiffRecord {
    pub match_group_key: String,
    pub bet_key: String,
    pub diff_percent: f64,
    pub calculated_at: DateTime<Utc>,
}

/// Ephemeral line-movement signal: a bookmaker's price drifting from its own extreme.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineMovement {
    pub match_group_key: String,
    pub match_name: String,
    pub sport: String,
    pub start_time: DateTime<Utc>,
    pub bet_key: String,
    pub bookmaker: String,
    pub previous_odd: f64,
    pub current_odd: f64,
    pub change_abs: f64,
    pub change_percent: f64,
    pub detected_at: DateTime<Utc>,
    /// Collapsed, relative-time-annotated price history rendered for the
    /// alert text (see the Dispatcher's timeline rendering rule).
    #[serde(default)]
    pub history_timeline: String,
}

/// Status classification used by `/diffs/top` and `/value-bets/top`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchStatus {
    Live,
    Upcoming,
}

impl Match {
    pub fn status(&self, now: DateTime<Utc>) -> Option<MatchStatus> {
        if self.start_time > now {
            Some(MatchStatus::Upcoming)
        } else if now <= self.start_time + chrono::Duration::hours(3) {
            Some(MatchStatus::Live)
        } else {
            None
        }
    }
}

/// Body of the upstream Parser's `/matches` response.
#[derive(Debug, Clone, Deserialize)]
pub struct ParserMatchesResponse {
    pub matches: Vec<Match>,
    #[serde(default)]
    pub meta: ParserMeta,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ParserMeta {
    #[serde(default)]
    pub count: Option<u64>,
    #[serde(default)]
    pub duration: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// A rendered notification ready for the Dispatcher, tagged by the signal that produced it.
#[derive(Debug, Clone)]
pub enum AlertMessage {
    Diff(DiffBet),
    Value(ValueBet),
    Movement(LineMovement),
    Test(String),
}

impl AlertMessage {
    /// Plain-text, Markdown-escaped rendering suitable for the chat notifier.
    pub fn render(&self) -> String {
        match self {
            AlertMessage::Diff(d) => format!(
                "*Diff alert*\n{} ({})\n{} — {:.3} vs {} — {:.3}\nGap: {:.2} abs, {:.2}%",
                escape_markdown(&d.match_name),
                escape_markdown(&d.bet_key),
                escape_markdown(&d.min_bookmaker),
                d.min_odd,
                escape_markdown(&d.max_bookmaker),
                d.max_odd,
                d.diff_abs,
                d.diff_percent,
            ),
            AlertMessage::Value(v) => format!(
                "*Value bet*\n{} ({})\n{} @ {:.3} vs fair {:.3}\nValue: {:.2}%, EV: {:.3}",
                escape_markdown(&v.match_name),
                escape_markdown(&v.bet_key),
                escape_markdown(&v.bookmaker),
                v.odd,
                v.fair_odd,
                v.value_percent,
                v.expected_value,
            ),
            AlertMessage::Movement(m) => format!(
                "*Line movement*\n{} ({})\n{}: {:.3} -> {:.3} ({:+.2}%)\n{}",
                escape_markdown(&m.match_name),
                escape_markdown(&m.bet_key),
                escape_markdown(&m.bookmaker),
                m.previous_odd,
                m.current_odd,
                m.change_percent,
                escape_markdown(&m.history_timeline),
            ),
            AlertMessage::Test(text) => format!("*Test alert*\n{}", escape_markdown(text)),
        }
    }
}

fn escape_markdown(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        if matches!(
            c,
            '_' | '*' | '[' | ']' | '(' | ')' | '~' | '`' | '>' | '#' | '+' | '-' | '=' | '|' | '{' | '}' | '.' | '!'
        ) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Case-insensitive bookmaker weight table, used by the Aggregator's value computation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookmakerWeights(pub HashMap<String, f64>);

impl BookmakerWeights {
    pub fn weight_for(&self, bookmaker: &str) -> f64 {
        let key = bookmaker.to_lowercase();
        self.0.get(&key).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

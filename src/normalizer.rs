//! Match Normalizer (C1): canonicalizes team names into a stable, deterministic
//! cross-bookmaker grouping key. Pure function over plain data tables — no I/O,
//! no shared mutable state.

use std::sync::OnceLock;

use chrono::{DateTime, Timelike, Utc};
use regex::Regex;

use crate::models::Match;

/// Club-designator suffixes dropped from the trailing end of a team name.
const GENERIC_SUFFIXES: &[&str] = &[
    "fc", "sc", "cf", "sfc", "afc", "bk", "bb", "hd", "fk", "sk", "if", "ik", "club",
    "united", "city",
];

/// Prepositions dropped wherever they occur as a standalone word.
const PREPOSITIONS: &[&str] = &["de", "da", "do", "di", "del", "la"];

/// Leading words skipped when picking the first 1-2 significant words of a
/// multi-word name (e.g. "Real Madrid" -> "madrid", not "real").
const SKIPPED_PREFIXES: &[&str] = &["real", "atletico", "athletic", "deportivo", "sporting"];

/// Known canonical forms for names that wouldn't otherwise normalize to the
/// same token. Checked against the whitespace-collapsed, lowercased name
/// before suffix/preposition stripping.
const CANONICAL_PATTERNS: &[(&str, &str)] = &[
    ("man utd", "manchester"),
    ("man united", "manchester"),
    ("man city", "manchester"),
    ("spurs", "tottenham"),
    ("wolves", "wolverhampton"),
];

const SEPARATORS: &[&str] = &[" vs ", " - ", " — ", " – "];

fn punctuation_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[-.']").unwrap())
}

fn whitespace_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Normalizes a single team display name into its canonical token.
/// Deterministic and idempotent: `normalize(normalize(s)) == normalize(s)`.
pub fn normalize_team(name: &str) -> String {
    let lower = name.trim().to_lowercase();
    let collapsed = whitespace_re().replace_all(&lower, " ").trim().to_string();

    if let Some((_, canonical)) = CANONICAL_PATTERNS.iter().find(|(pat, _)| *pat == collapsed) {
        return canonical.to_string();
    }

    let stripped = punctuation_re().replace_all(&collapsed, "");
    let stripped = whitespace_re().replace_all(&stripped, " ");

    let mut words: Vec<&str> = stripped
        .split_whitespace()
        .filter(|w| !PREPOSITIONS.contains(w))
        .collect();

    // Drop a trailing generic/club-designator word, e.g. "chelsea fc" -> "chelsea".
    if let Some(last) = words.last() {
        if GENERIC_SUFFIXES.contains(last) && words.len() > 1 {
            words.pop();
        }
    }

    if words.is_empty() {
        return String::new();
    }

    let start = if words.len() > 1 && SKIPPED_PREFIXES.contains(&words[0]) {
        1
    } else {
        0
    };
    let take = (words.len() - start).min(2);

    words[start..start + take].join(" ")
}

fn truncate_30min(t: DateTime<Utc>) -> DateTime<Utc> {
    let minute = (t.minute() / 30) * 30;
    t.with_minute(minute)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// Parses a display name like "Arsenal vs Chelsea" into (home, away) when the
/// structured home/away fields failed to normalize.
fn split_display_name(name: &str) -> Option<(String, String)> {
    for sep in SEPARATORS {
        if let Some((home, away)) = name.split_once(sep) {
            return Some((home.trim().to_string(), away.trim().to_string()));
        }
    }
    None
}

/// Builds the canonical cross-bookmaker group key for a match, or an empty
/// string if the match cannot be normalized (caller should skip it).
pub fn group_key(m: &Match) -> String {
    let (mut home, mut away) = (normalize_team(&m.home_team), normalize_team(&m.away_team));

    if home.is_empty() || away.is_empty() {
        if let Some((h, a)) = split_display_name(&m.display_name()) {
            home = normalize_team(&h);
            away = normalize_team(&a);
        }
    }

    if home.is_empty() || away.is_empty() {
        return String::new();
    }

    let mut teams = [home, away];
    teams.sort();

    let time_bucket = truncate_30min(m.start_time).to_rfc3339();

    format!("{}|{}|{}|{}", m.sport.to_lowercase(), teams[0], teams[1], time_bucket)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_match(home: &str, away: &str, sport: &str, hour: u32, minute: u32) -> Match {
        Match {
            id: "m1".into(),
            name: String::new(),
            home_team: home.into(),
            away_team: away.into(),
            start_time: Utc.with_ymd_and_hms(2026, 1, 1, hour, minute, 0).unwrap(),
            sport: sport.into(),
            tournament: None,
            bookmaker: None,
            events: vec![],
        }
    }

    #[test]
    fn normalize_is_idempotent() {
        for name in ["Manchester United FC", "Real Madrid C.F.", "St. Pauli", "man utd"] {
            let once = normalize_team(name);
            let twice = normalize_team(&once);
            assert_eq!(once, twice, "not idempotent for {name}");
        }
    }

    #[test]
    fn strips_club_suffix() {
        assert_eq!(normalize_team("Chelsea FC"), "chelsea");
        assert_eq!(normalize_team("Arsenal"), "arsenal");
    }

    #[test]
    fn skips_leading_prefix() {
        assert_eq!(normalize_team("Real Madrid"), "madrid");
        assert_eq!(normalize_team("Atletico Madrid"), "madrid");
    }

    #[test]
    fn canonical_pattern_table() {
        assert_eq!(normalize_team("Man Utd"), "manchester");
    }

    #[test]
    fn group_key_is_home_away_symmetric() {
        let a = sample_match("Arsenal", "Chelsea FC", "football", 20, 0);
        let b = sample_match("Chelsea FC", "Arsenal", "football", 20, 0);
        assert_eq!(group_key(&a), group_key(&b));
    }

    #[test]
    fn group_key_truncates_to_30_minutes() {
        let a = sample_match("Arsenal", "Chelsea", "football", 20, 10);
        let b = sample_match("Arsenal", "Chelsea", "football", 20, 29);
        assert_eq!(group_key(&a), group_key(&b));

        let c = sample_match("Arsenal", "Chelsea", "football", 20, 31);
        assert_ne!(group_key(&a), group_key(&c));
    }

    #[test]
    fn unnormalizable_team_falls_back_to_display_name() {
        let mut m = sample_match("", "", "football", 20, 0);
        m.name = "Arsenal vs Chelsea".to_string();
        assert!(!group_key(&m).is_empty());
    }

    #[test]
    fn empty_team_and_no_display_name_yields_empty_key() {
        let m = sample_match("", "", "football", 20, 0);
        assert_eq!(group_key(&m), "");
    }
}

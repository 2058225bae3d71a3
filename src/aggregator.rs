//! Aggregator (C2): merges a snapshot of matches into cross-bookmaker groupings
//! and computes diffs and value bets from them.

use std::cmp::Ordering;
use std::collections::HashMap;

use chrono::{DateTime, Utc};

use crate::models::{BetKey, BookmakerWeights, DiffBet, Match, ValueBet};
use crate::normalizer::group_key;

/// Odds at or below this are treated as unpriced/invalid and silently dropped.
const MIN_ODD: f64 = 1.000001;

#[derive(Clone)]
pub(crate) struct GroupMeta {
    pub match_name: String,
    pub sport: String,
    pub start_time: DateTime<Utc>,
}

pub(crate) struct Groups {
    pub meta: HashMap<String, GroupMeta>,
    pub odds: HashMap<(String, BetKey), HashMap<String, f64>>,
}

/// Shared build-up: iterate matches, keep the maximum odd per (group, bet,
/// bookmaker) when a bookmaker quotes the same bet more than once in a
/// snapshot. Invalid odds and empty event/outcome/bookmaker labels are
/// filtered silently, not errored. Exposed crate-wide so the Detector (C3)
/// shares this exact build-up with the Aggregator (C2), per spec.
pub(crate) fn build_groups(matches: &[Match]) -> Groups {
    let mut meta: HashMap<String, GroupMeta> = HashMap::new();
    let mut odds: HashMap<(String, BetKey), HashMap<String, f64>> = HashMap::new();

    for m in matches {
        let gk = group_key(m);
        if gk.is_empty() {
            continue;
        }
        meta.entry(gk.clone()).or_insert_with(|| GroupMeta {
            match_name: m.display_name(),
            sport: m.sport.clone(),
            start_time: m.start_time,
        });

        for event in &m.events {
            if event.event_type.is_empty() {
                continue;
            }
            for outcome in &event.outcomes {
                if !outcome.odd.is_finite() || outcome.odd <= MIN_ODD {
                    continue;
                }
                if outcome.outcome_type.is_empty() {
                    continue;
                }
                let bookmaker = outcome
                    .bookmaker
                    .clone()
                    .or_else(|| event.bookmaker.clone())
                    .or_else(|| m.bookmaker.clone())
                    .unwrap_or_default();
                if bookmaker.is_empty() {
                    continue;
                }

                let bet_key = BetKey::new(
                    &event.event_type,
                    &outcome.outcome_type,
                    outcome.parameter.as_deref().unwrap_or(""),
                );

                let books = odds.entry((gk.clone(), bet_key)).or_default();
                let current = books.entry(bookmaker).or_insert(outcome.odd);
                if outcome.odd > *current {
                    *current = outcome.odd;
                }
            }
        }
    }

    Groups { meta, odds }
}

pub(crate) fn meta_for(groups: &Groups, gk: &str, now: DateTime<Utc>) -> GroupMeta {
    groups.meta.get(gk).cloned().unwrap_or_else(|| GroupMeta {
        match_name: String::new(),
        sport: String::new(),
        start_time: now,
    })
}

/// ComputeDiffs: ordered list of DiffBet, sorted by descending percent gap,
/// truncated to `keep_top`.
pub fn compute_diffs(matches: &[Match], keep_top: usize) -> Vec<DiffBet> {
    let groups = build_groups(matches);
    let now = Utc::now();
    let mut out = Vec::new();

    for ((gk, bet_key), books) in &groups.odds {
        if books.len() < 2 {
            continue;
        }

        let mut min_bookmaker = None;
        let mut min_odd = f64::INFINITY;
        let mut max_bookmaker = None;
        let mut max_odd = f64::NEG_INFINITY;

        for (bookmaker, odd) in books {
            if *odd < min_odd {
                min_odd = *odd;
                min_bookmaker = Some(bookmaker.clone());
            }
            if *odd > max_odd {
                max_odd = *odd;
                max_bookmaker = Some(bookmaker.clone());
            }
        }

        if max_odd <= min_odd {
            continue;
        }

        let meta = meta_for(&groups, gk, now);
        out.push(DiffBet {
            match_group_key: gk.clone(),
            match_name: meta.match_name,
            sport: meta.sport,
            start_time: meta.start_time,
            bet_key: bet_key.to_string(),
            min_bookmaker: min_bookmaker.expect("non-empty book map has a min"),
            min_odd,
            max_bookmaker: max_bookmaker.expect("non-empty book map has a max"),
            max_odd,
            diff_abs: max_odd - min_odd,
            diff_percent: (max_odd / min_odd - 1.0) * 100.0,
            bookmaker_count: books.len(),
            calculated_at: now,
        });
    }

    out.sort_by(|a, b| {
        b.diff_percent
            .partial_cmp(&a.diff_percent)
            .unwrap_or(Ordering::Equal)
    });
    out.truncate(keep_top);
    out
}

/// ComputeValueBets: ordered list of ValueBet, sorted by descending value percent.
pub fn compute_value_bets(
    matches: &[Match],
    weights: &BookmakerWeights,
    min_value_percent: f64,
    keep_top: usize,
) -> Vec<ValueBet> {
    let groups = build_groups(matches);
    let now = Utc::now();
    let mut out = Vec::new();

    for ((gk, bet_key), books) in &groups.odds {
        if books.len() < 2 {
            continue;
        }

        let mut weighted_sum = 0.0;
        let mut weight_total = 0.0;
        for (bookmaker, odd) in books {
            let w = weights.weight_for(bookmaker);
            weighted_sum += w * (1.0 / odd);
            weight_total += w;
        }
        if weight_total <= 0.0 {
            continue;
        }

        let fair_prob = weighted_sum / weight_total;
        if !(fair_prob > 0.0 && fair_prob < 1.0) {
            continue;
        }
        let fair_odd = 1.0 / fair_prob;
        let meta = meta_for(&groups, gk, now);

        for (bookmaker, odd) in books {
            let value_percent = (odd / fair_odd - 1.0) * 100.0;
            if value_percent < min_value_percent {
                continue;
            }
            out.push(ValueBet {
                match_group_key: gk.clone(),
                match_name: meta.match_name.clone(),
                sport: meta.sport.clone(),
                start_time: meta.start_time,
                bet_key: bet_key.to_string(),
                bookmaker: bookmaker.clone(),
                odd: *odd,
                fair_probability: fair_prob,
                fair_odd,
                value_percent,
                expected_value: odd * fair_prob - 1.0,
                calculated_at: now,
            });
        }
    }

    out.sort_by(|a, b| {
        b.value_percent
            .partial_cmp(&a.value_percent)
            .unwrap_or(Ordering::Equal)
    });
    out.truncate(keep_top);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Event, Outcome};
    use chrono::TimeZone;

    fn outcome(outcome_type: &str, odd: f64, bookmaker: &str) -> Outcome {
        Outcome {
            id: format!("{outcome_type}-{bookmaker}"),
            outcome_type: outcome_type.to_string(),
            parameter: None,
            odd,
            bookmaker: Some(bookmaker.to_string()),
        }
    }

    fn match_with_outcomes(home: &str, away: &str, outcomes: Vec<Outcome>) -> Match {
        Match {
            id: "m1".into(),
            name: String::new(),
            home_team: home.into(),
            away_team: away.into(),
            start_time: Utc.with_ymd_and_hms(2026, 1, 1, 20, 0, 0).unwrap(),
            sport: "football".into(),
            tournament: None,
            bookmaker: None,
            events: vec![Event {
                id: "e1".into(),
                event_type: "main_match".into(),
                market_name: "Match result".into(),
                bookmaker: None,
                outcomes,
            }],
        }
    }

    #[test]
    fn s1_diff_detection() {
        let m = match_with_outcomes(
            "A",
            "B",
            vec![outcome("home_win", 1.80, "X"), outcome("home_win", 2.20, "Y")],
        );
        let diffs = compute_diffs(&[m], 10);
        assert_eq!(diffs.len(), 1);
        let d = &diffs[0];
        assert_eq!(d.min_bookmaker, "X");
        assert_eq!(d.min_odd, 1.80);
        assert_eq!(d.max_bookmaker, "Y");
        assert_eq!(d.max_odd, 2.20);
        assert!((d.diff_abs - 0.40).abs() < 1e-9);
        assert!((d.diff_percent - 22.222222).abs() < 1e-3);
    }

    #[test]
    fn s2_value_bet_on_three_books() {
        let m = match_with_outcomes(
            "A",
            "B",
            vec![
                outcome("home_win", 2.00, "X"),
                outcome("home_win", 2.00, "Y"),
                outcome("home_win", 2.20, "Z"),
            ],
        );
        let weights = BookmakerWeights::default();
        let value_bets = compute_value_bets(&[m], &weights, 3.0, 10);
        assert_eq!(value_bets.len(), 1);
        assert_eq!(value_bets[0].bookmaker, "Z");
        assert!((value_bets[0].fair_odd - 2.0625).abs() < 1e-3);
        assert!((value_bets[0].value_percent - 6.67).abs() < 0.05);
    }

    #[test]
    fn fair_price_identity_suppresses_value_bets() {
        let m = match_with_outcomes(
            "A",
            "B",
            vec![outcome("home_win", 2.0, "X"), outcome("home_win", 2.0, "Y")],
        );
        let weights = BookmakerWeights::default();
        let value_bets = compute_value_bets(&[m], &weights, 0.01, 10);
        assert!(value_bets.is_empty());
    }

    #[test]
    fn single_bookmaker_emits_no_diff() {
        let m = match_with_outcomes("A", "B", vec![outcome("home_win", 1.8, "X")]);
        assert!(compute_diffs(&[m], 10).is_empty());
    }

    #[test]
    fn invalid_odds_are_filtered_silently() {
        let m = match_with_outcomes(
            "A",
            "B",
            vec![
                outcome("home_win", f64::NAN, "X"),
                outcome("home_win", 0.5, "Y"),
                outcome("home_win", 1.9, "Z"),
            ],
        );
        assert!(compute_diffs(&[m], 10).is_empty());
    }
}

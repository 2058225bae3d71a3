use chrono::{DateTime, Utc};

use crate::models::OddsHistoryPoint;

/// Renders a movement's price history as a compact timeline: consecutive
/// points with an unchanged odd collapse down to their first and last
/// occurrence, each annotated with a relative time (§4.5).
pub fn render_timeline(points: &[OddsHistoryPoint], now: DateTime<Utc>) -> String {
    let Some(last) = points.last() else {
        return String::new();
    };

    let mut collapsed: Vec<&OddsHistoryPoint> = vec![&points[0]];
    for i in 1..points.len() {
        if (points[i].odd - points[i - 1].odd).abs() > f64::EPSILON {
            if collapsed.last().unwrap().recorded_at != points[i - 1].recorded_at {
                collapsed.push(&points[i - 1]);
            }
            collapsed.push(&points[i]);
        }
    }
    if collapsed.last().unwrap().recorded_at != last.recorded_at {
        collapsed.push(last);
    }

    collapsed
        .iter()
        .map(|p| format!("{:.3} ({})", p.odd, relative_time(p.recorded_at, now)))
        .collect::<Vec<_>>()
        .join(" -> ")
}

fn relative_time(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let minutes = (now - at).num_minutes();
    if minutes <= 0 {
        "now".to_string()
    } else {
        format!("{minutes} min ago")
    }
}

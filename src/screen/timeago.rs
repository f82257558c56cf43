//! Relative time rendering ("3 minutes ago").

use chrono::{DateTime, Utc};

/// Successive unit divisors: seconds -> minutes -> hours -> days -> weeks ->
/// months -> years.
const DIVISORS: [f64; 6] = [60.0, 60.0, 24.0, 7.0, 365.0 / 7.0 / 12.0, 12.0];

const UNITS: [&str; 7] = ["second", "minute", "hour", "day", "week", "month", "year"];

/// Render `then` relative to `now`, e.g. "just now", "5 minutes ago",
/// "in 2 days".
pub fn time_ago(then: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let millis = (now - then).num_milliseconds();
    let future = millis < 0;
    let mut diff = millis.unsigned_abs() as f64 / 1000.0;

    let mut unit = 0;
    while unit < DIVISORS.len() && diff >= DIVISORS[unit] {
        diff /= DIVISORS[unit];
        unit += 1;
    }
    let n = diff.floor() as u64;

    // Under ten seconds collapses to "just now".
    if unit == 0 && n <= 9 {
        return if future { "right now" } else { "just now" }.to_string();
    }

    let name = UNITS[unit];
    let phrase = if n == 1 {
        format!("1 {}", name)
    } else {
        format!("{} {}s", n, name)
    };

    if future {
        format!("in {}", phrase)
    } else {
        format!("{} ago", phrase)
    }
}

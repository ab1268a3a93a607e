//! Small shared helpers.

const INTERVALS: [(&str, i64); 5] = [
    ("weeks", 604800),
    ("days", 86400),
    ("hours", 3600),
    ("minutes", 60),
    ("seconds", 1),
];

/// Format a number of seconds for human display, e.g. "2 hours, 10 minutes".
///
/// At most two units are shown; this is used for the `state_elapsed` value
/// included in alert notifications.
pub fn display_duration(seconds: i64) -> String {
    let mut remaining = seconds.max(0);
    let mut parts = Vec::new();
    for (name, count) in INTERVALS {
        let value = remaining / count;
        if value > 0 {
            remaining -= value * count;
            let unit = if value == 1 {
                name.trim_end_matches('s')
            } else {
                name
            };
            parts.push(format!("{value} {unit}"));
        }
    }
    parts.truncate(2);
    parts.join(", ")
}

/// Truncate a string to at most `max` characters, respecting char boundaries.
pub fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

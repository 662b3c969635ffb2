//! Utility functions and helpers

use std::time::Duration;

/// Format duration as human-readable string
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs_f64();

    if secs >= 60.0 {
        let mins = (secs / 60.0).floor() as u64;
        let remaining_secs = secs - (mins as f64 * 60.0);
        format!("{}m {:.2}s", mins, remaining_secs)
    } else if secs >= 1.0 {
        format!("{:.2}s", secs)
    } else {
        format!("{:.0}ms", secs * 1000.0)
    }
}

/// Format a list of chunk ids, eliding the middle of long lists
pub fn format_chunk_ids<'a, I>(ids: I) -> String
where
    I: IntoIterator<Item = &'a u64>,
{
    const SHOWN: usize = 8;

    let ids: Vec<String> = ids.into_iter().map(|id| id.to_string()).collect();
    match ids.len() {
        0 => "none".to_string(),
        n if n <= SHOWN => ids.join(", "),
        n => format!(
            "{}, … {} more, {}",
            ids[..SHOWN - 1].join(", "),
            n - SHOWN,
            ids[n - 1]
        ),
    }
}

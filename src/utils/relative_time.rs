// src/utils/relative_time.rs

//! Human-readable relative times for job listings, bucketed at
//! second/minute/hour/day granularity with no fractional values.

use chrono::DateTime;

const MINUTE: f64 = 60.0;
const HOUR: f64 = 3600.0;
const DAY: f64 = 86400.0;

/// "12s ago" / "3m ago" / "5h ago" / "2d ago"; `Unknown` when the epoch is
/// missing from the payload.
pub fn time_ago_in_words(epoch: Option<f64>, now: f64) -> String {
    let Some(epoch) = epoch else {
        return "Unknown".to_string();
    };

    let diff = (now - epoch).max(0.0);
    if diff < MINUTE {
        format!("{}s ago", diff as u64)
    } else if diff < HOUR {
        format!("{}m ago", (diff / MINUTE) as u64)
    } else if diff < DAY {
        format!("{}h ago", (diff / HOUR) as u64)
    } else {
        format!("{}d ago", (diff / DAY) as u64)
    }
}

/// "in 12s" / "in 3m" / ...; `Now` when the epoch is missing or already due.
pub fn time_until_in_words(epoch: Option<f64>, now: f64) -> String {
    let Some(epoch) = epoch else {
        return "Now".to_string();
    };

    let diff = epoch - now;
    if diff <= 0.0 {
        return "Now".to_string();
    }

    if diff < MINUTE {
        format!("in {}s", diff as u64)
    } else if diff < HOUR {
        format!("in {}m", (diff / MINUTE) as u64)
    } else if diff < DAY {
        format!("in {}h", (diff / HOUR) as u64)
    } else {
        format!("in {}d", (diff / DAY) as u64)
    }
}

/// Epoch seconds as "YYYY-MM-DD HH:MM:SS", or None when absent/out of range.
pub fn format_epoch(epoch: Option<f64>) -> Option<String> {
    let epoch = epoch?;
    let ts = DateTime::from_timestamp(epoch as i64, 0)?;
    Some(ts.format("%Y-%m-%d %H:%M:%S").to_string())
}

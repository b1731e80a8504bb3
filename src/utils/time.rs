use chrono::DateTime;

/// Render a unix timestamp as `YYYY-MM-DD HH:MM:SS (unix)` for log lines.
pub fn format_ts(ts: i64) -> String {
    match DateTime::from_timestamp(ts, 0) {
        Some(dt) => format!("{} ({})", dt.format("%Y-%m-%d %H:%M:%S"), ts),
        None => ts.to_string(),
    }
}

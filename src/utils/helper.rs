use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Get current timestamp in milliseconds since epoch
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Keep the head of a batch for log lines.
pub fn first_as_json<T: serde::Serialize>(items: &[T]) -> String {
    items
        .first()
        .and_then(|item| serde_json::to_string(item).ok())
        .unwrap_or_else(|| "none".to_string())
}

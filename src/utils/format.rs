use chrono::{DateTime, Utc};

/// Format remaining session time as `M:SS` for the countdown display.
pub fn format_countdown(remaining_ms: i64) -> String {
    let total_seconds = (remaining_ms.max(0)) / 1000;
    let minutes = total_seconds / 60;
    let seconds = total_seconds % 60;
    format!("{}:{:02}", minutes, seconds)
}

/// Format the distance to a due date as `3d 4h 5m`, or `Expired` once passed.
pub fn format_due_distance(due: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let distance_ms = (due - now).num_milliseconds();
    if distance_ms <= 0 {
        return "Expired".to_string();
    }

    let minutes_total = distance_ms / (1000 * 60);
    let days = minutes_total / (60 * 24);
    let hours = (minutes_total / 60) % 24;
    let minutes = minutes_total % 60;

    format!("{}d {}h {}m", days, hours, minutes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_format_countdown() {
        assert_eq!(format_countdown(0), "0:00");
        assert_eq!(format_countdown(999), "0:00");
        assert_eq!(format_countdown(5_000), "0:05");
        assert_eq!(format_countdown(65_000), "1:05");
        assert_eq!(format_countdown(600_000), "10:00");
        assert_eq!(format_countdown(-500), "0:00");
    }

    #[test]
    fn test_format_due_distance() {
        let now = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        let due = now
            + chrono::Duration::days(3)
            + chrono::Duration::hours(4)
            + chrono::Duration::minutes(5);
        assert_eq!(format_due_distance(due, now), "3d 4h 5m");

        assert_eq!(format_due_distance(now, now), "Expired");
        assert_eq!(format_due_distance(now - chrono::Duration::hours(1), now), "Expired");

        let soon = now + chrono::Duration::minutes(42);
        assert_eq!(format_due_distance(soon, now), "0d 0h 42m");
    }
}

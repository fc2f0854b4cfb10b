// Timestamp helpers for version metadata and list output.

use chrono::{DateTime, Utc};

/// The current instant, recorded in metadata as RFC 3339.
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

/// Renders an installation timestamp as a relative description for the
/// `list` output ("3 days ago", "just now").
pub fn time_since(when: &DateTime<Utc>) -> String {
    let elapsed = Utc::now().signed_duration_since(*when);
    if elapsed.num_days() > 0 {
        format!("{} days ago", elapsed.num_days())
    } else if elapsed.num_hours() > 0 {
        format!("{} hours ago", elapsed.num_hours())
    } else if elapsed.num_minutes() > 0 {
        format!("{} minutes ago", elapsed.num_minutes())
    } else {
        "just now".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn relative_descriptions_pick_the_largest_unit() {
        let now = Utc::now();
        assert_eq!(time_since(&now), "just now");
        assert_eq!(time_since(&(now - Duration::minutes(5))), "5 minutes ago");
        assert_eq!(time_since(&(now - Duration::hours(3))), "3 hours ago");
        assert_eq!(time_since(&(now - Duration::days(2))), "2 days ago");
    }
}

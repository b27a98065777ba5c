use chrono::{DateTime, Utc};

use oselya_db::models::UserRef;
use oselya_types::api::UserSummary;

pub const DISPLAY_TIME_FORMAT: &str = "%d.%m.%Y %H:%M";

pub fn format_time(t: DateTime<Utc>) -> String {
    t.format(DISPLAY_TIME_FORMAT).to_string()
}

/// Human "last seen" text relative to `now`. Empty when never seen.
pub fn last_seen_human(last_seen: Option<DateTime<Utc>>, now: DateTime<Utc>) -> String {
    let Some(seen) = last_seen else {
        return String::new();
    };

    let seconds = (now - seen).num_seconds();
    if seconds < 60 {
        "щойно".to_string()
    } else if seconds < 3600 {
        format!("{} хв тому", seconds / 60)
    } else if seconds < 86_400 {
        format!("{} год тому", seconds / 3600)
    } else if seconds < 2 * 86_400 {
        "вчора".to_string()
    } else {
        format_time(seen)
    }
}

pub fn user_summary(user: &UserRef) -> UserSummary {
    let display_name = if user.full_name.trim().is_empty() {
        user.username.clone()
    } else {
        user.full_name.clone()
    };
    UserSummary {
        id: user.id,
        username: user.username.clone(),
        display_name,
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, TimeZone};

    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 10, 18, 30, 0).unwrap()
    }

    #[test]
    fn buckets() {
        let at = |secs: i64| last_seen_human(Some(now() - Duration::seconds(secs)), now());
        assert_eq!(last_seen_human(None, now()), "");
        assert_eq!(at(0), "щойно");
        assert_eq!(at(59), "щойно");
        assert_eq!(at(60), "1 хв тому");
        assert_eq!(at(3599), "59 хв тому");
        assert_eq!(at(3600), "1 год тому");
        assert_eq!(at(86_399), "23 год тому");
        assert_eq!(at(86_400), "вчора");
        assert_eq!(at(2 * 86_400), "08.03.2026 18:30");
    }

    #[test]
    fn display_name_falls_back_to_username() {
        let mut user = UserRef {
            id: 1,
            username: "olena".into(),
            full_name: "  ".into(),
            last_seen_at: None,
        };
        assert_eq!(user_summary(&user).display_name, "olena");
        user.full_name = "Олена Коваль".into();
        assert_eq!(user_summary(&user).display_name, "Олена Коваль");
    }
}

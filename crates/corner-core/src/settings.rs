//! Per-user reminder settings kept in the `user_settings` table.

use std::future::Future;

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

/// Days without a sign-in before the weekly reminder fires.
pub const WEEKLY_REMINDER_INACTIVE_DAYS: i64 = 7;

const REMINDER_TIME_FORMAT: &str = "%H:%M";

/// Reminder preferences for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSettings {
    /// Wall-clock minute of the daily reminder.
    #[serde(
        serialize_with = "serialize_reminder_time",
        deserialize_with = "deserialize_reminder_time"
    )]
    pub reminder_time: NaiveTime,
    #[serde(default, deserialize_with = "deserialize_flag")]
    pub enable_weekly_reminder: bool,
}

impl Default for UserSettings {
    fn default() -> Self {
        Self {
            reminder_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or(NaiveTime::MIN),
            enable_weekly_reminder: false,
        }
    }
}

impl UserSettings {
    /// `HH:MM` form used in the table and shown to users.
    pub fn reminder_time_label(&self) -> String {
        self.reminder_time.format(REMINDER_TIME_FORMAT).to_string()
    }
}

/// Parse `HH:MM`, also accepting the `HH:MM:SS` form Postgres `time` columns return.
pub fn parse_reminder_time(raw: &str) -> Result<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, REMINDER_TIME_FORMAT)
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .map(|time| time.with_second(0).unwrap_or(time))
        .map_err(|_| Error::InvalidInput(format!("reminder time '{raw}' is not HH:MM")))
}

fn serialize_reminder_time<S: Serializer>(
    time: &NaiveTime,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(&time.format(REMINDER_TIME_FORMAT).to_string())
}

fn deserialize_reminder_time<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<NaiveTime, D::Error> {
    let raw = String::deserialize(deserializer)?;
    parse_reminder_time(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_flag<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> std::result::Result<bool, D::Error> {
    Ok(Option::<bool>::deserialize(deserializer)?.unwrap_or(false))
}

/// Read and write one user's settings row.
pub trait SettingsStore {
    /// `None` until the user saves settings for the first time.
    fn fetch_settings(&self, user_id: &str) -> impl Future<Output = Result<Option<UserSettings>>>;

    fn save_settings(
        &self,
        user_id: &str,
        settings: &UserSettings,
    ) -> impl Future<Output = Result<()>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_to_nine_without_weekly_reminder() {
        let settings = UserSettings::default();
        assert_eq!(settings.reminder_time_label(), "09:00");
        assert!(!settings.enable_weekly_reminder);
    }

    #[test]
    fn reminder_time_accepts_table_and_user_forms() {
        assert_eq!(parse_reminder_time("07:30").unwrap().to_string(), "07:30:00");
        assert_eq!(parse_reminder_time(" 21:05:42 ").unwrap().to_string(), "21:05:00");
        assert!(parse_reminder_time("7pm").is_err());
        assert!(parse_reminder_time("25:00").is_err());
    }

    #[test]
    fn rows_decode_with_missing_flag() {
        let settings: UserSettings =
            serde_json::from_str(r#"{"reminder_time":"08:15:00","enable_weekly_reminder":null}"#)
                .unwrap();
        assert_eq!(settings.reminder_time_label(), "08:15");
        assert!(!settings.enable_weekly_reminder);

        let encoded = serde_json::to_value(settings).unwrap();
        assert_eq!(
            encoded,
            serde_json::json!({"reminder_time": "08:15", "enable_weekly_reminder": false})
        );
    }
}

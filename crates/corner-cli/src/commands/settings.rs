use chrono::NaiveTime;
use corner_core::settings::{SettingsStore, UserSettings, WEEKLY_REMINDER_INACTIVE_DAYS};
use corner_core::shell::View;

use crate::commands::common::App;
use crate::error::CliError;

/// Fields given on the command line; absent ones keep their stored value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsChange {
    pub reminder_time: Option<NaiveTime>,
    pub weekly_reminder: Option<bool>,
}

impl SettingsChange {
    pub const fn is_empty(&self) -> bool {
        self.reminder_time.is_none() && self.weekly_reminder.is_none()
    }

    pub fn apply(&self, settings: UserSettings) -> UserSettings {
        UserSettings {
            reminder_time: self.reminder_time.unwrap_or(settings.reminder_time),
            enable_weekly_reminder: self
                .weekly_reminder
                .unwrap_or(settings.enable_weekly_reminder),
        }
    }
}

pub async fn run_settings(app: &mut App, change: SettingsChange) -> Result<(), CliError> {
    app.open(View::Settings)?;
    let user_id = app.session.user_id()?.to_string();
    let store = app.settings_store()?;

    let settings = update_settings(&store, &user_id, change).await?;
    if !change.is_empty() {
        eprintln!("Saved reminder settings");
    }
    for line in describe_settings(&settings) {
        println!("{line}");
    }
    Ok(())
}

/// Stored settings (defaults before the first save) with `change` applied and saved.
pub async fn update_settings(
    store: &impl SettingsStore,
    user_id: &str,
    change: SettingsChange,
) -> Result<UserSettings, CliError> {
    let current = store.fetch_settings(user_id).await?.unwrap_or_default();
    if change.is_empty() {
        return Ok(current);
    }
    let updated = change.apply(current);
    store.save_settings(user_id, &updated).await?;
    Ok(updated)
}

pub fn describe_settings(settings: &UserSettings) -> Vec<String> {
    let weekly = if settings.enable_weekly_reminder {
        "on"
    } else {
        "off"
    };
    vec![
        format!("Daily reminder at {}", settings.reminder_time_label()),
        format!(
            "Reminder after {WEEKLY_REMINDER_INACTIVE_DAYS} days without signing in: {weekly}"
        ),
    ]
}

//! Scheduled jobs: reminder selection and cleanup of deleted accounts.

use chrono::{DateTime, Duration, FixedOffset, Timelike, Utc};
use corner_core::settings::WEEKLY_REMINDER_INACTIVE_DAYS;
use futures_util::future::BoxFuture;
use reqwest::{Client, Request, StatusCode};
use serde::Serialize;

use crate::config::AppConfig;
use crate::database::{SettingsRow, UserActivity};
use crate::error::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ReminderKind {
    Daily,
    Weekly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DueReminder {
    pub user_id: String,
    pub kind: ReminderKind,
}

/// Reminders owed at `now`.
///
/// A daily reminder is due when the user's reminder minute matches the
/// current minute at `offset`. A weekly one is due when it is enabled and
/// the last sign-in is at least [`WEEKLY_REMINDER_INACTIVE_DAYS`] old. Users
/// with no recorded sign-in never get the weekly reminder.
pub fn due_reminders(
    settings: &[SettingsRow],
    activity: &[UserActivity],
    now: DateTime<Utc>,
    offset: FixedOffset,
) -> Vec<DueReminder> {
    let local = now.with_timezone(&offset).time();
    let inactive_after = Duration::days(WEEKLY_REMINDER_INACTIVE_DAYS);
    let mut due = Vec::new();

    for row in settings {
        let reminder = row.settings.reminder_time;
        if reminder.hour() == local.hour() && reminder.minute() == local.minute() {
            due.push(DueReminder {
                user_id: row.user_id.clone(),
                kind: ReminderKind::Daily,
            });
        }

        if !row.settings.enable_weekly_reminder {
            continue;
        }
        let last_sign_in = activity
            .iter()
            .find(|user| user.user_id == row.user_id)
            .and_then(|user| user.last_sign_in);
        if last_sign_in.is_some_and(|seen| now - seen >= inactive_after) {
            due.push(DueReminder {
                user_id: row.user_id.clone(),
                kind: ReminderKind::Weekly,
            });
        }
    }
    due
}

/// Account directory consulted before a `users` row is removed.
pub trait IdentityDirectory: Send + Sync {
    /// `Ok(false)` only when the directory says the account is gone.
    fn user_exists<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<bool, AppError>>;
}

/// Supabase auth admin API, called with the service key.
pub struct SupabaseAdminDirectory {
    admin_url: String,
    service_key: String,
    client: Client,
}

impl std::fmt::Debug for SupabaseAdminDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SupabaseAdminDirectory")
            .field("admin_url", &self.admin_url)
            .field("service_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

impl SupabaseAdminDirectory {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            admin_url: format!(
                "{}/auth/v1/admin/users",
                config.supabase_url.trim_end_matches('/')
            ),
            service_key: config.supabase_service_key.clone(),
            client: Client::new(),
        }
    }

    fn lookup_request(&self, user_id: &str) -> Result<Request, AppError> {
        self.client
            .get(format!(
                "{}/{}",
                self.admin_url,
                urlencoding::encode(user_id)
            ))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .build()
            .map_err(|error| AppError::internal(format!("Failed to build user lookup: {error}")))
    }

    async fn lookup(&self, user_id: &str) -> Result<bool, AppError> {
        let request = self.lookup_request(user_id)?;
        let response = self
            .client
            .execute(request)
            .await
            .map_err(|error| AppError::external(format!("User lookup failed: {error}")))?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(AppError::external(format!(
                "User lookup returned {status}"
            ))),
        }
    }
}

impl IdentityDirectory for SupabaseAdminDirectory {
    fn user_exists<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<bool, AppError>> {
        Box::pin(self.lookup(user_id))
    }
}

/// Length-checked comparison that looks at every byte.
pub fn secrets_match(expected: &str, presented: &str) -> bool {
    let (expected, presented) = (expected.as_bytes(), presented.as_bytes());
    expected.len() == presented.len()
        && expected
            .iter()
            .zip(presented)
            .fold(0_u8, |diff, (left, right)| diff | (left ^ right))
            == 0
}

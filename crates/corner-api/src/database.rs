//! Rows in the hosted Postgres, written through PostgREST with the service key.

use std::fmt;

use chrono::{DateTime, Utc};
use corner_core::settings::UserSettings;
use corner_core::util::error_detail;
use corner_core::{MediaKind, RecordingId};
use futures_util::future::BoxFuture;
use reqwest::{Client, Request};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::config::AppConfig;
use crate::error::AppError;

/// Row inserted after a recording lands in the bucket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewRecording {
    pub user_id: String,
    pub file_url: String,
    pub file_type: MediaKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

/// Profile row keyed by `user_id`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserRow {
    pub user_id: String,
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub last_sign_in: DateTime<Utc>,
}

/// One `user_settings` row.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SettingsRow {
    pub user_id: String,
    #[serde(flatten)]
    pub settings: UserSettings,
}

/// The part of a `users` row the maintenance jobs read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UserActivity {
    pub user_id: String,
    #[serde(default)]
    pub last_sign_in: Option<DateTime<Utc>>,
}

pub trait Database: Send + Sync {
    fn insert_recording(&self, row: NewRecording) -> BoxFuture<'_, Result<RecordingId, AppError>>;

    fn upsert_user(&self, row: UserRow) -> BoxFuture<'_, Result<(), AppError>>;

    fn list_settings(&self) -> BoxFuture<'_, Result<Vec<SettingsRow>, AppError>>;

    fn list_users(&self) -> BoxFuture<'_, Result<Vec<UserActivity>, AppError>>;

    fn delete_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<(), AppError>>;
}

#[derive(Clone)]
pub struct PostgrestDatabase {
    rest_url: String,
    service_key: String,
    client: Client,
}

impl fmt::Debug for PostgrestDatabase {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("PostgrestDatabase")
            .field("rest_url", &self.rest_url)
            .field("service_key", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Deserialize)]
struct InsertedRow {
    id: RecordingId,
}

impl PostgrestDatabase {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            rest_url: format!("{}/rest/v1", config.supabase_url.trim_end_matches('/')),
            service_key: config.supabase_service_key.clone(),
            client: Client::new(),
        }
    }

    fn insert_recording_request(&self, row: &NewRecording) -> Result<Request, AppError> {
        self.client
            .post(format!("{}/recordings", self.rest_url))
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=representation")
            .json(&[row])
            .build()
            .map_err(|error| AppError::internal(format!("Failed to build insert: {error}")))
    }

    fn upsert_user_request(&self, row: &UserRow) -> Result<Request, AppError> {
        self.client
            .post(format!("{}/users", self.rest_url))
            .query(&[("on_conflict", "user_id")])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(&[row])
            .build()
            .map_err(|error| AppError::internal(format!("Failed to build upsert: {error}")))
    }

    fn select_request(&self, table: &str, columns: &str) -> Result<Request, AppError> {
        self.client
            .get(format!("{}/{table}", self.rest_url))
            .query(&[("select", columns)])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .build()
            .map_err(|error| AppError::internal(format!("Failed to build select: {error}")))
    }

    fn delete_user_request(&self, user_id: &str) -> Result<Request, AppError> {
        self.client
            .delete(format!("{}/users", self.rest_url))
            .query(&[("user_id", format!("eq.{user_id}"))])
            .header("apikey", &self.service_key)
            .bearer_auth(&self.service_key)
            .header("Prefer", "return=minimal")
            .build()
            .map_err(|error| AppError::internal(format!("Failed to build delete: {error}")))
    }

    async fn execute(&self, table: &str, request: Request) -> Result<reqwest::Response, AppError> {
        let response = self.client.execute(request).await.map_err(|error| {
            AppError::external(format!("{table} request failed: {error}"))
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(AppError::external(format!(
            "{table} request failed with HTTP {}: {}",
            status.as_u16(),
            error_detail(&body)
        )))
    }

    async fn insert(&self, row: NewRecording) -> Result<RecordingId, AppError> {
        let request = self.insert_recording_request(&row)?;
        let response = self.execute("recordings", request).await?;
        let rows: Vec<InsertedRow> = response.json().await.map_err(|error| {
            AppError::external(format!("recordings insert returned invalid JSON: {error}"))
        })?;
        rows.into_iter()
            .next()
            .map(|row| row.id)
            .ok_or_else(|| AppError::external("recordings insert returned no row"))
    }

    async fn upsert(&self, row: UserRow) -> Result<(), AppError> {
        let request = self.upsert_user_request(&row)?;
        self.execute("users", request).await?;
        Ok(())
    }

    async fn select<T: DeserializeOwned>(
        &self,
        table: &str,
        columns: &str,
    ) -> Result<Vec<T>, AppError> {
        let request = self.select_request(table, columns)?;
        let response = self.execute(table, request).await?;
        response.json().await.map_err(|error| {
            AppError::external(format!("{table} select returned invalid JSON: {error}"))
        })
    }

    async fn delete(&self, user_id: &str) -> Result<(), AppError> {
        let request = self.delete_user_request(user_id)?;
        self.execute("users", request).await?;
        Ok(())
    }
}

impl Database for PostgrestDatabase {
    fn insert_recording(&self, row: NewRecording) -> BoxFuture<'_, Result<RecordingId, AppError>> {
        Box::pin(self.insert(row))
    }

    fn upsert_user(&self, row: UserRow) -> BoxFuture<'_, Result<(), AppError>> {
        Box::pin(self.upsert(row))
    }

    fn list_settings(&self) -> BoxFuture<'_, Result<Vec<SettingsRow>, AppError>> {
        Box::pin(self.select("user_settings", "user_id,reminder_time,enable_weekly_reminder"))
    }

    fn list_users(&self) -> BoxFuture<'_, Result<Vec<UserActivity>, AppError>> {
        Box::pin(self.select("users", "user_id,last_sign_in"))
    }

    fn delete_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(self.delete(user_id))
    }
}

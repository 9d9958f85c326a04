//! Supabase-backed stores: recordings (PostgREST rows plus storage bucket)
//! and the user settings row.

use std::fmt;

use reqwest::{Client, RequestBuilder, Response};

use serde::Serialize;

use crate::catalog::RecordingStore;
use crate::models::{Recording, RecordingId};
use crate::settings::{SettingsStore, UserSettings};
use crate::util::{error_detail, normalize_base_url};
use crate::{Error, Result};

const RECORDINGS_TABLE: &str = "recordings";
const SETTINGS_TABLE: &str = "user_settings";

/// Talks to the hosted data API on behalf of one signed-in user.
#[derive(Clone)]
pub struct SupabaseRecordingStore {
    base_url: String,
    anon_key: String,
    access_token: String,
    bucket: String,
    client: Client,
}

impl fmt::Debug for SupabaseRecordingStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SupabaseRecordingStore")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .field("bucket", &self.bucket)
            .finish_non_exhaustive()
    }
}

impl SupabaseRecordingStore {
    pub fn new(
        supabase_url: &str,
        anon_key: impl Into<String>,
        access_token: impl Into<String>,
        bucket: impl Into<String>,
    ) -> Result<Self> {
        let base_url = normalize_base_url(supabase_url, "Supabase URL").map_err(Error::InvalidInput)?;
        Ok(Self {
            base_url,
            anon_key: anon_key.into(),
            access_token: access_token.into(),
            bucket: bucket.into(),
            client: Client::builder().build()?,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.access_token)
    }

    fn table_url(&self) -> String {
        format!("{}/rest/v1/{RECORDINGS_TABLE}", self.base_url)
    }
}

impl RecordingStore for SupabaseRecordingStore {
    async fn fetch_recordings(&self, user_id: &str) -> Result<Vec<Recording>> {
        let request = self.authorized(self.client.get(self.table_url()).query(&[
            ("select", "*".to_string()),
            ("user_id", format!("eq.{user_id}")),
            ("order", "created_at.desc".to_string()),
        ]));
        let response = ensure_success("catalog", request.send().await?).await?;
        Ok(response.json::<Vec<Recording>>().await?)
    }

    async fn delete_object(&self, recording: &Recording) -> Result<()> {
        let path = object_path_from_url(&recording.file_url, &self.bucket).ok_or_else(|| {
            Error::Storage(format!(
                "cannot locate object for {} in bucket {}",
                recording.file_url, self.bucket
            ))
        })?;
        let encoded_path = path
            .split('/')
            .map(|segment| urlencoding::encode(segment).into_owned())
            .collect::<Vec<_>>()
            .join("/");
        let url = format!(
            "{}/storage/v1/object/{}/{encoded_path}",
            self.base_url, self.bucket
        );

        let response = self.authorized(self.client.delete(url)).send().await?;
        ensure_success("storage", response).await?;
        Ok(())
    }

    async fn delete_row(&self, id: &RecordingId) -> Result<()> {
        let request = self.authorized(
            self.client
                .delete(self.table_url())
                .query(&[("id", format!("eq.{id}"))])
                .header("Prefer", "return=representation"),
        );
        let response = ensure_success("catalog", request.send().await?).await?;
        let deleted: Vec<serde_json::Value> = response.json().await?;
        if deleted.is_empty() {
            // Row-level security hides rows the caller cannot delete.
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }
}

/// Reads and upserts the signed-in user's `user_settings` row.
#[derive(Clone)]
pub struct SupabaseSettingsStore {
    table_url: String,
    anon_key: String,
    access_token: String,
    client: Client,
}

impl fmt::Debug for SupabaseSettingsStore {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("SupabaseSettingsStore")
            .field("table_url", &self.table_url)
            .field("anon_key", &"[REDACTED]")
            .field("access_token", &"[REDACTED]")
            .finish_non_exhaustive()
    }
}

#[derive(Serialize)]
struct SettingsRow<'a> {
    user_id: &'a str,
    #[serde(flatten)]
    settings: &'a UserSettings,
}

impl SupabaseSettingsStore {
    pub fn new(
        supabase_url: &str,
        anon_key: impl Into<String>,
        access_token: impl Into<String>,
    ) -> Result<Self> {
        let base_url = normalize_base_url(supabase_url, "Supabase URL").map_err(Error::InvalidInput)?;
        Ok(Self {
            table_url: format!("{base_url}/rest/v1/{SETTINGS_TABLE}"),
            anon_key: anon_key.into(),
            access_token: access_token.into(),
            client: Client::builder().build()?,
        })
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.access_token)
    }
}

impl SettingsStore for SupabaseSettingsStore {
    async fn fetch_settings(&self, user_id: &str) -> Result<Option<UserSettings>> {
        let request = self.authorized(self.client.get(&self.table_url).query(&[
            ("select", "reminder_time,enable_weekly_reminder".to_string()),
            ("user_id", format!("eq.{user_id}")),
        ]));
        let response = ensure_success("settings", request.send().await?).await?;
        let rows: Vec<UserSettings> = response.json().await?;
        Ok(rows.into_iter().next())
    }

    async fn save_settings(&self, user_id: &str, settings: &UserSettings) -> Result<()> {
        let request = self.authorized(
            self.client
                .post(&self.table_url)
                .query(&[("on_conflict", "user_id")])
                .header("Prefer", "resolution=merge-duplicates,return=minimal")
                .json(&[SettingsRow { user_id, settings }]),
        );
        ensure_success("settings", request.send().await?).await?;
        tracing::info!("Saved reminder settings");
        Ok(())
    }
}

async fn ensure_success(service: &'static str, response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(Error::Api {
        service,
        status: status.as_u16(),
        detail: error_detail(&body),
    })
}

/// Object path inside `bucket` for a public media URL.
///
/// Accepts both `/storage/v1/object/public/<bucket>/<path>` links and custom
/// CDN bases that end in `/<bucket>/<path>`.
pub fn object_path_from_url(url: &str, bucket: &str) -> Option<String> {
    let without_query = url.split(['?', '#']).next()?;
    let marker = format!("/{bucket}/");
    let start = without_query.find(&marker)? + marker.len();
    let raw = &without_query[start..];
    if raw.is_empty() {
        return None;
    }
    urlencoding::decode(raw).ok().map(std::borrow::Cow::into_owned)
}

//! Client configuration.
//!
//! Front ends need three public endpoints: the MyCorner API (uploads and
//! prompts), the Supabase project (auth, catalog rows, media bucket) and its
//! anon key. None of these are secrets.

use serde::{Deserialize, Serialize};

use crate::util::{normalize_base_url, normalize_text_option};

pub const ENV_API_BASE_URL: &str = "CORNER_API_BASE_URL";
pub const ENV_SUPABASE_URL: &str = "SUPABASE_URL";
pub const ENV_SUPABASE_ANON_KEY: &str = "SUPABASE_ANON_KEY";
pub const ENV_RECORDINGS_BUCKET: &str = "RECORDINGS_BUCKET";

pub const DEFAULT_API_BASE_URL: &str = "http://127.0.0.1:8080";
pub const DEFAULT_RECORDINGS_BUCKET: &str = "recordings";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub api_base_url: String,
    pub supabase_url: Option<String>,
    pub supabase_anon_key: Option<String>,
    pub recordings_bucket: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            supabase_url: None,
            supabase_anon_key: None,
            recordings_bucket: DEFAULT_RECORDINGS_BUCKET.to_string(),
        }
    }
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, String> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, String> {
        let api_base_url = normalize_text_option(lookup(ENV_API_BASE_URL))
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
        let api_base_url = normalize_base_url(&api_base_url, ENV_API_BASE_URL)?;

        let supabase_url = normalize_text_option(lookup(ENV_SUPABASE_URL))
            .map(|url| normalize_base_url(&url, ENV_SUPABASE_URL))
            .transpose()?;
        let supabase_anon_key = normalize_text_option(lookup(ENV_SUPABASE_ANON_KEY));
        let recordings_bucket = normalize_text_option(lookup(ENV_RECORDINGS_BUCKET))
            .unwrap_or_else(|| DEFAULT_RECORDINGS_BUCKET.to_string());

        if recordings_bucket.contains('/') {
            return Err(format!("{ENV_RECORDINGS_BUCKET} must not contain '/'"));
        }

        Ok(Self {
            api_base_url,
            supabase_url,
            supabase_anon_key,
            recordings_bucket,
        })
    }

    /// Supabase URL and anon key, when both are set.
    pub fn supabase(&self) -> Option<(&str, &str)> {
        Some((
            self.supabase_url.as_deref()?,
            self.supabase_anon_key.as_deref()?,
        ))
    }
}

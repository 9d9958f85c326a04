use std::collections::HashMap;
use std::env;
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_OPENROUTER_URL: &str = "https://openrouter.ai/api/v1/chat/completions";
pub const DEFAULT_OPENROUTER_MODEL: &str = "deepseek/deepseek-r1:free";
const DEFAULT_MAX_UPLOAD_BYTES: &str = "104857600";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub supabase_url: String,
    pub supabase_service_key: String,
    pub supabase_jwks_url: String,
    pub supabase_jwt_issuer: String,
    pub supabase_jwt_audience: String,
    pub jwks_cache_ttl: Duration,
    pub auth_clock_skew: Duration,
    pub recordings_bucket: String,
    pub media_public_base_url: String,
    pub max_upload_bytes: usize,
    pub openrouter_api_key: Option<String>,
    pub openrouter_model: String,
    pub openrouter_url: String,
    pub rate_limit_window: Duration,
    pub upload_rate_limit_per_window: u32,
    pub prompt_rate_limit_per_window: u32,
    pub user_sync_rate_limit_per_window: u32,
    pub cors_origins: Vec<String>,
    pub storage: Option<ObjectStorageConfig>,
    /// Shared secret for the scheduled maintenance routes; unset disables them.
    pub maintenance_secret: Option<String>,
    /// Offset of the clock users set their reminder times in.
    pub reminder_utc_offset_minutes: i32,
}

/// S3-compatible credentials for the recordings bucket.
#[derive(Clone, PartialEq, Eq)]
pub struct ObjectStorageConfig {
    pub endpoint_url: String,
    pub region: String,
    pub access_key_id: String,
    pub secret_access_key: String,
}

impl fmt::Debug for ObjectStorageConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("ObjectStorageConfig")
            .field("endpoint_url", &self.endpoint_url)
            .field("region", &self.region)
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"[REDACTED]")
            .finish()
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AppConfig")
            .field("bind_addr", &self.bind_addr)
            .field("supabase_url", &self.supabase_url)
            .field("supabase_service_key", &"[REDACTED]")
            .field("supabase_jwks_url", &self.supabase_jwks_url)
            .field("supabase_jwt_issuer", &self.supabase_jwt_issuer)
            .field("supabase_jwt_audience", &self.supabase_jwt_audience)
            .field("jwks_cache_ttl", &self.jwks_cache_ttl)
            .field("auth_clock_skew", &self.auth_clock_skew)
            .field("recordings_bucket", &self.recordings_bucket)
            .field("media_public_base_url", &self.media_public_base_url)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field(
                "openrouter_api_key",
                &self.openrouter_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .field("openrouter_model", &self.openrouter_model)
            .field("openrouter_url", &self.openrouter_url)
            .field("rate_limit_window", &self.rate_limit_window)
            .field(
                "upload_rate_limit_per_window",
                &self.upload_rate_limit_per_window,
            )
            .field(
                "prompt_rate_limit_per_window",
                &self.prompt_rate_limit_per_window,
            )
            .field(
                "user_sync_rate_limit_per_window",
                &self.user_sync_rate_limit_per_window,
            )
            .field("cors_origins", &self.cors_origins)
            .field("storage", &self.storage)
            .field(
                "maintenance_secret",
                &self.maintenance_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field(
                "reminder_utc_offset_minutes",
                &self.reminder_utc_offset_minutes,
            )
            .finish()
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let bind_addr = value_or_default(&lookup, "CORNER_API_BIND_ADDR", "127.0.0.1:8080");

        let supabase_url = trim_trailing(&required_trimmed(&lookup, "SUPABASE_URL")?).to_string();
        require_http_url(&supabase_url, "SUPABASE_URL")?;
        let supabase_service_key = required_trimmed(&lookup, "SUPABASE_SERVICE_KEY")?;

        let default_jwks = format!("{supabase_url}/auth/v1/.well-known/jwks.json");
        let supabase_jwks_url = value_or_default(&lookup, "SUPABASE_JWKS_URL", &default_jwks);
        require_http_url(&supabase_jwks_url, "SUPABASE_JWKS_URL")?;

        let default_issuer = format!("{supabase_url}/auth/v1");
        let supabase_jwt_issuer = value_or_default(&lookup, "SUPABASE_JWT_ISSUER", &default_issuer);
        let supabase_jwt_audience =
            value_or_default(&lookup, "SUPABASE_JWT_AUDIENCE", "authenticated");

        let jwks_cache_ttl_secs: u64 =
            bounded(&lookup, "SUPABASE_JWKS_CACHE_TTL_SECS", "300", 30..=86_400)?;
        let auth_clock_skew_secs: u64 = bounded(&lookup, "AUTH_CLOCK_SKEW_SECS", "60", 0..=300)?;

        let recordings_bucket = value_or_default(&lookup, "RECORDINGS_BUCKET", "recordings");
        if recordings_bucket.contains('/') {
            return Err(ConfigError::Invalid(
                "RECORDINGS_BUCKET must not contain '/'".to_string(),
            ));
        }

        let default_public_base =
            format!("{supabase_url}/storage/v1/object/public/{recordings_bucket}");
        let media_public_base_url = trim_trailing(&value_or_default(
            &lookup,
            "MEDIA_PUBLIC_BASE_URL",
            &default_public_base,
        ))
        .to_string();
        if url::Url::parse(&media_public_base_url).is_err() {
            return Err(ConfigError::Invalid(
                "MEDIA_PUBLIC_BASE_URL must be an absolute URL".to_string(),
            ));
        }

        let max_upload_bytes: usize = bounded(
            &lookup,
            "MAX_UPLOAD_BYTES",
            DEFAULT_MAX_UPLOAD_BYTES,
            1_024..=1_073_741_824,
        )?;

        let openrouter_api_key = optional_trimmed(&lookup, "OPENROUTER_API_KEY");
        let openrouter_model = value_or_default(&lookup, "OPENROUTER_MODEL", DEFAULT_OPENROUTER_MODEL);
        let openrouter_url = value_or_default(&lookup, "OPENROUTER_URL", DEFAULT_OPENROUTER_URL);
        require_http_url(&openrouter_url, "OPENROUTER_URL")?;

        let rate_limit_window_secs: u64 =
            bounded(&lookup, "RATE_LIMIT_WINDOW_SECS", "60", 10..=3_600)?;
        let upload_rate_limit_per_window =
            bounded(&lookup, "UPLOAD_RATE_LIMIT_PER_WINDOW", "30", 1..=1_000)?;
        let prompt_rate_limit_per_window =
            bounded(&lookup, "PROMPT_RATE_LIMIT_PER_WINDOW", "20", 1..=1_000)?;
        let user_sync_rate_limit_per_window =
            bounded(&lookup, "USER_SYNC_RATE_LIMIT_PER_WINDOW", "20", 1..=1_000)?;

        let cors_origins = optional_trimmed(&lookup, "CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(str::trim)
                    .filter(|origin| !origin.is_empty())
                    .map(|origin| trim_trailing(origin).to_string())
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        for origin in &cors_origins {
            require_http_url(origin, "CORS_ORIGINS")?;
        }

        let storage = parse_storage_config(&lookup, &supabase_url)?;

        let maintenance_secret = optional_trimmed(&lookup, "MAINTENANCE_SECRET");
        let reminder_utc_offset_minutes: i32 =
            bounded(&lookup, "REMINDER_UTC_OFFSET_MINUTES", "0", -720..=840)?;

        Ok(Self {
            bind_addr,
            supabase_url,
            supabase_service_key,
            supabase_jwks_url,
            supabase_jwt_issuer,
            supabase_jwt_audience,
            jwks_cache_ttl: Duration::from_secs(jwks_cache_ttl_secs),
            auth_clock_skew: Duration::from_secs(auth_clock_skew_secs),
            recordings_bucket,
            media_public_base_url,
            max_upload_bytes,
            openrouter_api_key,
            openrouter_model,
            openrouter_url,
            rate_limit_window: Duration::from_secs(rate_limit_window_secs),
            upload_rate_limit_per_window,
            prompt_rate_limit_per_window,
            user_sync_rate_limit_per_window,
            cors_origins,
            storage,
            maintenance_secret,
            reminder_utc_offset_minutes,
        })
    }
}

/// Credentials are optional as a pair; the endpoint defaults to the project's S3 gateway.
fn parse_storage_config(
    lookup: impl Fn(&str) -> Option<String>,
    supabase_url: &str,
) -> Result<Option<ObjectStorageConfig>, ConfigError> {
    let access_key_id = optional_trimmed(&lookup, "S3_ACCESS_KEY_ID");
    let secret_access_key = optional_trimmed(&lookup, "S3_SECRET_ACCESS_KEY");
    if access_key_id.is_none() && secret_access_key.is_none() {
        return Ok(None);
    }

    let access_key_id = access_key_id.ok_or(ConfigError::MissingVar("S3_ACCESS_KEY_ID"))?;
    let secret_access_key =
        secret_access_key.ok_or(ConfigError::MissingVar("S3_SECRET_ACCESS_KEY"))?;

    let default_endpoint = format!("{supabase_url}/storage/v1/s3");
    let endpoint_url = value_or_default(&lookup, "S3_ENDPOINT_URL", &default_endpoint);
    require_http_url(&endpoint_url, "S3_ENDPOINT_URL")?;
    let region = value_or_default(&lookup, "S3_REGION", "auto");

    Ok(Some(ObjectStorageConfig {
        endpoint_url,
        region,
        access_key_id,
        secret_access_key,
    }))
}

fn bounded<T>(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: &str,
    range: RangeInclusive<T>,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialOrd + fmt::Display,
{
    let invalid = || {
        ConfigError::Invalid(format!(
            "{name} must be an integer in [{}, {}]",
            range.start(),
            range.end()
        ))
    };
    let value = value_or_default(lookup, name, default)
        .parse::<T>()
        .map_err(|_| invalid())?;
    if range.contains(&value) {
        Ok(value)
    } else {
        Err(invalid())
    }
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    corner_core::util::normalize_text_option(lookup(name))
}

fn require_http_url(value: &str, name: &str) -> Result<(), ConfigError> {
    if corner_core::util::is_http_url(value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must start with http:// or https://"
        )))
    }
}

fn trim_trailing(value: &str) -> &str {
    value.trim_end_matches('/')
}

#[cfg(test)]
pub(crate) fn test_config(extra: &[(&str, &str)]) -> AppConfig {
    let mut map: HashMap<&str, &str> = HashMap::new();
    map.insert("SUPABASE_URL", "https://project.supabase.co");
    map.insert("SUPABASE_SERVICE_KEY", "service-role-key");
    for (key, value) in extra {
        map.insert(*key, *value);
    }
    AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string())).unwrap()
}

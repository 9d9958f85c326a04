//! Recording media in an S3-compatible bucket.

use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use aws_types::region::Region;
use chrono::{DateTime, Utc};
use corner_core::MediaKind;
use futures_util::future::BoxFuture;
use uuid::Uuid;

use crate::config::{AppConfig, ObjectStorageConfig};
use crate::error::AppError;

/// Write side of the media bucket.
pub trait ObjectStore: Send + Sync {
    fn put_object<'a>(
        &'a self,
        object_key: &'a str,
        bytes: Vec<u8>,
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<(), AppError>>;

    /// URL under which a stored object is served.
    fn public_url(&self, object_key: &str) -> String;
}

#[derive(Clone)]
pub struct S3ObjectStore {
    bucket: String,
    public_base_url: String,
    client: Client,
}

impl S3ObjectStore {
    pub fn from_config(config: &AppConfig) -> Option<Self> {
        config.storage.clone().map(|storage| {
            Self::new(
                storage,
                config.recordings_bucket.clone(),
                config.media_public_base_url.clone(),
            )
        })
    }

    pub fn new(config: ObjectStorageConfig, bucket: String, public_base_url: String) -> Self {
        let credentials = Credentials::new(
            config.access_key_id,
            config.secret_access_key,
            None,
            None,
            "corner-api-storage",
        );

        let s3_config = aws_sdk_s3::Config::builder()
            .region(Region::new(config.region))
            .endpoint_url(config.endpoint_url)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Self {
            bucket,
            public_base_url,
            client: Client::from_conf(s3_config),
        }
    }

    async fn upload(&self, object_key: &str, bytes: Vec<u8>, content_type: &str) -> Result<(), AppError> {
        let object_key = normalize_object_key(object_key)?;
        let size = bytes.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(&object_key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|error| {
                AppError::external(format!(
                    "Failed to store recording in bucket {}: {}",
                    self.bucket,
                    sanitize(&aws_sdk_s3::error::DisplayErrorContext(&error))
                ))
            })?;
        tracing::debug!(bucket = %self.bucket, size, "Stored recording object");
        Ok(())
    }
}

impl ObjectStore for S3ObjectStore {
    fn put_object<'a>(
        &'a self,
        object_key: &'a str,
        bytes: Vec<u8>,
        content_type: &'a str,
    ) -> BoxFuture<'a, Result<(), AppError>> {
        Box::pin(self.upload(object_key, bytes, content_type))
    }

    fn public_url(&self, object_key: &str) -> String {
        public_object_url(&self.public_base_url, object_key)
    }
}

/// Object key `{user_id}/{timestamp_ms}-{uuid}.{ext}` for a new recording.
pub fn recording_object_key(
    user_id: &str,
    kind: MediaKind,
    content_type: &str,
    now: DateTime<Utc>,
) -> Result<String, AppError> {
    let user_id = user_id.trim();
    if user_id.is_empty() || user_id.contains('/') || user_id.contains("..") {
        return Err(AppError::bad_request("user id cannot be used as a storage prefix"));
    }
    Ok(format!(
        "{user_id}/{}-{}.{}",
        now.timestamp_millis(),
        Uuid::now_v7(),
        kind.extension_for(content_type)
    ))
}

pub fn public_object_url(base_url: &str, object_key: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        object_key.trim_start_matches('/')
    )
}

fn normalize_object_key(raw: &str) -> Result<String, AppError> {
    let key = raw.trim().trim_start_matches('/').to_string();
    if key.is_empty() {
        return Err(AppError::bad_request("object key is required"));
    }
    if key.contains("..") {
        return Err(AppError::bad_request(
            "object key must not contain path traversal segments",
        ));
    }
    Ok(key)
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

use std::sync::Arc;

use axum::extract::multipart::MultipartError;
use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, Multipart, Request, State};
use axum::http::StatusCode;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use chrono::{DateTime, FixedOffset, Utc};
use corner_core::prompts::{PromptRequest, PromptResponse};
use corner_core::util::normalize_text_option;
use corner_core::{MediaKind, RecordingId, Tag};
use http::HeaderValue;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::auth::{extract_bearer_token, AuthenticatedUser, SupabaseJwtVerifier, TokenVerifier};
use crate::config::AppConfig;
use crate::database::{Database, NewRecording, PostgrestDatabase, UserRow};
use crate::error::AppError;
use crate::maintenance::{
    due_reminders, secrets_match, DueReminder, IdentityDirectory, SupabaseAdminDirectory,
};
use crate::prompts::PromptService;
use crate::rate_limit::{
    user_fingerprint, EndpointRateLimiter, ProtectedEndpoint, RateLimitMetricsSnapshot,
};
use crate::storage::{recording_object_key, ObjectStore, S3ObjectStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    verifier: Arc<dyn TokenVerifier>,
    objects: Option<Arc<dyn ObjectStore>>,
    database: Arc<dyn Database>,
    directory: Arc<dyn IdentityDirectory>,
    prompts: Arc<PromptService>,
    rate_limiter: Arc<EndpointRateLimiter>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> Result<Self, AppError> {
        let objects = S3ObjectStore::from_config(&config)
            .map(|store| Arc::new(store) as Arc<dyn ObjectStore>);
        if objects.is_none() {
            tracing::warn!("S3 credentials are not set; uploads will be refused");
        }
        let prompts = PromptService::from_config(&config)?;
        if !prompts.is_configured() {
            tracing::warn!("OPENROUTER_API_KEY is not set; prompts come from the fallback table");
        }
        if config.maintenance_secret.is_none() {
            tracing::warn!("MAINTENANCE_SECRET is not set; maintenance routes will be refused");
        }

        Ok(Self::with_backends(
            config.clone(),
            Arc::new(SupabaseJwtVerifier::new(config.clone())),
            objects,
            Arc::new(PostgrestDatabase::from_config(&config)),
            Arc::new(SupabaseAdminDirectory::from_config(&config)),
            prompts,
        ))
    }

    fn with_backends(
        config: Arc<AppConfig>,
        verifier: Arc<dyn TokenVerifier>,
        objects: Option<Arc<dyn ObjectStore>>,
        database: Arc<dyn Database>,
        directory: Arc<dyn IdentityDirectory>,
        prompts: PromptService,
    ) -> Self {
        Self {
            rate_limiter: Arc::new(EndpointRateLimiter::from_config(&config)),
            config,
            verifier,
            objects,
            database,
            directory,
            prompts: Arc::new(prompts),
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let upload_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);
    let protected_routes = Router::new()
        .route(
            "/recordings/upload",
            post(upload_recording).layer(upload_limit),
        )
        .route("/prompts/generate", post(generate_prompt))
        .route("/users/sync", post(sync_user))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_auth));

    let maintenance_routes = Router::new()
        .route("/reminder/check-reminders", post(check_reminders))
        .route("/sync/check-deletions", post(check_deletions))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            require_maintenance_secret,
        ));

    Router::new()
        .route("/healthz", get(healthz))
        .merge(protected_routes)
        .merge(maintenance_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&state.config.cors_origins))
        .with_state(state)
}

/// Any origin when none are configured.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_headers(Any).allow_methods(Any);
    if origins.is_empty() {
        return layer.allow_origin(Any);
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();
    layer.allow_origin(AllowOrigin::list(origins))
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    storage_configured: bool,
    prompts_configured: bool,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        storage_configured: state.objects.is_some(),
        prompts_configured: state.prompts.is_configured(),
        rate_limit: state.rate_limiter.metrics_snapshot(),
    })
}

async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(request.headers())?;
    let user = state.verifier.verify(token).await?;
    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}

/// Header carrying the shared secret of the scheduler that calls maintenance routes.
pub const MAINTENANCE_SECRET_HEADER: &str = "x-maintenance-secret";

async fn require_maintenance_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let expected = state.config.maintenance_secret.as_deref().ok_or_else(|| {
        AppError::Config("Maintenance secret is not configured on the backend".to_string())
    })?;
    let presented = request
        .headers()
        .get(MAINTENANCE_SECRET_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    if !secrets_match(expected, presented) {
        return Err(AppError::unauthorized("Maintenance secret is missing or wrong"));
    }
    Ok(next.run(request).await)
}

#[derive(Debug, Serialize)]
struct UploadResponse {
    message: &'static str,
    url: String,
    recording_id: RecordingId,
}

async fn upload_recording(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    state
        .rate_limiter
        .check(ProtectedEndpoint::Upload, &user.user_id)
        .await?;

    let upload = UploadForm::read(multipart).await?.validate(&user)?;
    let objects = state.objects.as_ref().ok_or_else(|| {
        AppError::Config("Object storage is not configured on the backend".to_string())
    })?;

    let user_hash = user_fingerprint(&user.user_id);
    let object_key =
        recording_object_key(&user.user_id, upload.kind, &upload.content_type, Utc::now())?;
    let size = upload.bytes.len();
    objects
        .put_object(&object_key, upload.bytes, &upload.content_type)
        .await?;
    let url = objects.public_url(&object_key);

    let row = NewRecording {
        user_id: user.user_id.clone(),
        file_url: url.clone(),
        file_type: upload.kind,
        note: upload.note,
        tags: upload.tags,
        created_at: Utc::now(),
    };
    let recording_id = state.database.insert_recording(row).await.inspect_err(|error| {
        tracing::warn!(
            user = user_hash,
            object_key_len = object_key.len(),
            "Stored object has no catalog row: {error}"
        );
    })?;

    tracing::info!(
        endpoint = "upload",
        user = user_hash,
        kind = upload.kind.as_str(),
        size,
        "Stored recording"
    );
    Ok(Json(UploadResponse {
        message: "Recording uploaded successfully",
        url,
        recording_id,
    }))
}

#[derive(Debug, Default)]
struct UploadForm {
    file: Option<FilePart>,
    file_type: Option<String>,
    user_id: Option<String>,
    note: Option<String>,
    tags: Option<String>,
}

#[derive(Debug)]
struct FilePart {
    content_type: Option<String>,
    bytes: Vec<u8>,
}

#[derive(Debug)]
struct ValidatedUpload {
    kind: MediaKind,
    content_type: String,
    bytes: Vec<u8>,
    note: Option<String>,
    tags: Vec<String>,
}

impl UploadForm {
    async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = Self::default();
        while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "file" => {
                    let content_type = field.content_type().map(str::to_string);
                    let bytes = field.bytes().await.map_err(multipart_error)?.to_vec();
                    form.file = Some(FilePart {
                        content_type,
                        bytes,
                    });
                }
                "file_type" => form.file_type = Some(field.text().await.map_err(multipart_error)?),
                "user_id" => form.user_id = Some(field.text().await.map_err(multipart_error)?),
                "note" => form.note = Some(field.text().await.map_err(multipart_error)?),
                "tags" => form.tags = Some(field.text().await.map_err(multipart_error)?),
                other => tracing::debug!(field = other, "Ignoring unknown upload field"),
            }
        }
        Ok(form)
    }

    fn validate(self, user: &AuthenticatedUser) -> Result<ValidatedUpload, AppError> {
        if let Some(claimed) = normalize_text_option(self.user_id) {
            if claimed != user.user_id {
                return Err(AppError::forbidden(
                    "user_id does not match the signed-in user",
                ));
            }
        }

        let kind = normalize_text_option(self.file_type)
            .ok_or_else(|| AppError::bad_request("file_type is required"))?
            .parse::<MediaKind>()
            .map_err(AppError::bad_request)?;

        let file = self
            .file
            .ok_or_else(|| AppError::bad_request("file is required"))?;
        if file.bytes.is_empty() {
            return Err(AppError::bad_request("file is empty"));
        }
        let content_type = normalize_text_option(file.content_type)
            .ok_or_else(|| AppError::bad_request("file content type is required"))?;
        if !kind.accepts_mime(&content_type) {
            return Err(AppError::bad_request(format!(
                "Invalid {kind} file type: {content_type}"
            )));
        }

        Ok(ValidatedUpload {
            kind,
            content_type,
            bytes: file.bytes,
            note: normalize_text_option(self.note),
            tags: parse_tags(self.tags.as_deref())?,
        })
    }
}

/// JSON list of selectable tag labels, deduplicated in order.
fn parse_tags(raw: Option<&str>) -> Result<Vec<String>, AppError> {
    let Some(raw) = raw.map(str::trim).filter(|raw| !raw.is_empty()) else {
        return Ok(Vec::new());
    };
    let labels: Vec<String> = serde_json::from_str(raw)
        .map_err(|_| AppError::bad_request("tags must be a JSON list of labels"))?;

    let mut tags: Vec<Tag> = Vec::with_capacity(labels.len());
    for label in labels {
        let tag = label
            .parse::<Tag>()
            .map_err(|error| AppError::bad_request(error.to_string()))?;
        if !tag.is_selectable() {
            return Err(AppError::bad_request(format!(
                "Tag '{tag}' cannot be chosen for a recording"
            )));
        }
        if !tags.contains(&tag) {
            tags.push(tag);
        }
    }
    Ok(tags.into_iter().map(|tag| tag.label().to_string()).collect())
}

fn multipart_error(error: MultipartError) -> AppError {
    if error.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(error.body_text())
    } else {
        AppError::bad_request(error.body_text())
    }
}

fn json_error(rejection: JsonRejection) -> AppError {
    AppError::bad_request(rejection.body_text())
}

async fn generate_prompt(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<PromptRequest>, JsonRejection>,
) -> Result<Json<PromptResponse>, AppError> {
    state
        .rate_limiter
        .check(ProtectedEndpoint::Prompt, &user.user_id)
        .await?;

    let Json(request) = payload.map_err(json_error)?;
    let prompt_type = request.prompt_type.trim();
    if prompt_type.is_empty() {
        return Err(AppError::bad_request("promptType is required"));
    }

    let prompt = state.prompts.generate(prompt_type).await?;
    tracing::info!(
        endpoint = "prompt",
        user = user_fingerprint(&user.user_id),
        prompt_type,
        "Generated journal prompt"
    );
    Ok(Json(PromptResponse { prompt }))
}

#[derive(Debug, Default, Deserialize)]
struct UserSyncRequest {
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    email: Option<String>,
    profile_image_url: Option<String>,
    last_sign_in: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize)]
struct MessageResponse {
    message: &'static str,
}

async fn sync_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthenticatedUser>,
    payload: Result<Json<UserSyncRequest>, JsonRejection>,
) -> Result<Json<MessageResponse>, AppError> {
    state
        .rate_limiter
        .check(ProtectedEndpoint::UserSync, &user.user_id)
        .await?;

    let Json(request) = payload.map_err(json_error)?;
    let row = UserRow {
        user_id: user.user_id.clone(),
        email: normalize_text_option(request.email).or_else(|| user.email.clone()),
        username: normalize_text_option(request.username),
        first_name: normalize_text_option(request.first_name),
        last_name: normalize_text_option(request.last_name),
        profile_image_url: normalize_text_option(request.profile_image_url),
        last_sign_in: request.last_sign_in.unwrap_or_else(Utc::now),
    };
    state.database.upsert_user(row).await?;

    tracing::info!(
        endpoint = "user_sync",
        user = user_fingerprint(&user.user_id),
        "Synced user profile"
    );
    Ok(Json(MessageResponse {
        message: "User data synced successfully",
    }))
}

#[derive(Debug, Serialize)]
struct ReminderCheckResponse {
    message: String,
    reminders: Vec<DueReminder>,
}

async fn check_reminders(
    State(state): State<AppState>,
) -> Result<Json<ReminderCheckResponse>, AppError> {
    let offset = FixedOffset::east_opt(state.config.reminder_utc_offset_minutes * 60)
        .ok_or_else(|| AppError::Config("Reminder UTC offset is out of range".to_string()))?;
    let settings = state.database.list_settings().await?;
    let activity = state.database.list_users().await?;

    let reminders = due_reminders(&settings, &activity, Utc::now(), offset);
    // Delivery is the log line until a mail relay is configured.
    for reminder in &reminders {
        tracing::info!(
            endpoint = "reminders",
            user = user_fingerprint(&reminder.user_id),
            kind = ?reminder.kind,
            "Reminder due"
        );
    }
    Ok(Json(ReminderCheckResponse {
        message: format!("Processing reminders for {} users", reminders.len()),
        reminders,
    }))
}

#[derive(Debug, Default, Serialize)]
struct CleanupResponse {
    checked: usize,
    deleted: usize,
    kept_on_error: usize,
}

/// Remove `users` rows whose account the directory no longer knows.
///
/// Lookup or delete failures keep the row.
async fn check_deletions(
    State(state): State<AppState>,
) -> Result<Json<CleanupResponse>, AppError> {
    let users = state.database.list_users().await?;
    let mut summary = CleanupResponse::default();

    for user in users {
        summary.checked += 1;
        let user_hash = user_fingerprint(&user.user_id);
        match state.directory.user_exists(&user.user_id).await {
            Ok(true) => {}
            Ok(false) => match state.database.delete_user(&user.user_id).await {
                Ok(()) => {
                    summary.deleted += 1;
                    tracing::info!(user = user_hash, "Removed row of deleted account");
                }
                Err(error) => {
                    summary.kept_on_error += 1;
                    tracing::warn!(user = user_hash, "Failed to remove deleted account: {error}");
                }
            },
            Err(error) => {
                summary.kept_on_error += 1;
                tracing::warn!(user = user_hash, "Keeping user after failed lookup: {error}");
            }
        }
    }

    tracing::info!(
        endpoint = "user_cleanup",
        checked = summary.checked,
        deleted = summary.deleted,
        "User cleanup finished"
    );
    Ok(Json(summary))
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use axum::body::Body;
    use axum::http::header;
    use futures_util::future::BoxFuture;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use super::*;
    use crate::config::test_config;
    use crate::database::{SettingsRow, UserActivity};

    const BOUNDARY: &str = "corner-test-boundary";

    struct PrefixVerifier;

    impl TokenVerifier for PrefixVerifier {
        fn verify<'a>(
            &'a self,
            token: &'a str,
        ) -> BoxFuture<'a, Result<AuthenticatedUser, AppError>> {
            Box::pin(async move {
                token
                    .strip_prefix("token-")
                    .map(|user_id| AuthenticatedUser {
                        user_id: user_id.to_string(),
                        email: Some(format!("{user_id}@example.com")),
                        session_id: None,
                    })
                    .ok_or_else(|| AppError::unauthorized("Token validation failed"))
            })
        }
    }

    #[derive(Default)]
    struct MemoryObjects {
        stored: Mutex<Vec<(String, Vec<u8>, String)>>,
    }

    impl ObjectStore for MemoryObjects {
        fn put_object<'a>(
            &'a self,
            object_key: &'a str,
            bytes: Vec<u8>,
            content_type: &'a str,
        ) -> BoxFuture<'a, Result<(), AppError>> {
            Box::pin(async move {
                self.stored.lock().unwrap().push((
                    object_key.to_string(),
                    bytes,
                    content_type.to_string(),
                ));
                Ok(())
            })
        }

        fn public_url(&self, object_key: &str) -> String {
            format!("https://cdn.test/recordings/{object_key}")
        }
    }

    #[derive(Default)]
    struct MemoryDatabase {
        recordings: Mutex<Vec<NewRecording>>,
        users: Mutex<Vec<UserRow>>,
        settings: Mutex<Vec<SettingsRow>>,
        activity: Mutex<Vec<UserActivity>>,
        deleted: Mutex<Vec<String>>,
    }

    impl Database for MemoryDatabase {
        fn insert_recording(
            &self,
            row: NewRecording,
        ) -> BoxFuture<'_, Result<RecordingId, AppError>> {
            Box::pin(async move {
                let mut recordings = self.recordings.lock().unwrap();
                recordings.push(row);
                Ok(RecordingId::new(format!("rec-{}", recordings.len())))
            })
        }

        fn upsert_user(&self, row: UserRow) -> BoxFuture<'_, Result<(), AppError>> {
            Box::pin(async move {
                self.users.lock().unwrap().push(row);
                Ok(())
            })
        }

        fn list_settings(&self) -> BoxFuture<'_, Result<Vec<SettingsRow>, AppError>> {
            Box::pin(async move { Ok(self.settings.lock().unwrap().clone()) })
        }

        fn list_users(&self) -> BoxFuture<'_, Result<Vec<UserActivity>, AppError>> {
            Box::pin(async move { Ok(self.activity.lock().unwrap().clone()) })
        }

        fn delete_user<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<(), AppError>> {
            Box::pin(async move {
                self.activity
                    .lock()
                    .unwrap()
                    .retain(|user| user.user_id != user_id);
                self.deleted.lock().unwrap().push(user_id.to_string());
                Ok(())
            })
        }
    }

    /// Accounts prefixed `gone_` are deleted and `flaky_` lookups fail.
    struct PrefixDirectory;

    impl IdentityDirectory for PrefixDirectory {
        fn user_exists<'a>(&'a self, user_id: &'a str) -> BoxFuture<'a, Result<bool, AppError>> {
            Box::pin(async move {
                if user_id.starts_with("flaky_") {
                    return Err(AppError::external("User lookup returned 503"));
                }
                Ok(!user_id.starts_with("gone_"))
            })
        }
    }

    struct Harness {
        router: Router,
        objects: Arc<MemoryObjects>,
        database: Arc<MemoryDatabase>,
    }

    fn harness_with(extra: &[(&str, &str)], with_storage: bool) -> Harness {
        let config = Arc::new(test_config(extra));
        let objects = Arc::new(MemoryObjects::default());
        let database = Arc::new(MemoryDatabase::default());
        let prompts = PromptService::from_config(&config).unwrap();
        let state = AppState::with_backends(
            config,
            Arc::new(PrefixVerifier),
            with_storage.then(|| objects.clone() as Arc<dyn ObjectStore>),
            database.clone(),
            Arc::new(PrefixDirectory),
            prompts,
        );
        Harness {
            router: app_router(state),
            objects,
            database,
        }
    }

    fn harness() -> Harness {
        harness_with(&[], true)
    }

    fn text_part(name: &str, value: &str) -> Vec<u8> {
        format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
        )
        .into_bytes()
    }

    fn file_part(content_type: &str, bytes: &[u8]) -> Vec<u8> {
        let mut part = format!(
            "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"clip\"\r\nContent-Type: {content_type}\r\n\r\n"
        )
        .into_bytes();
        part.extend_from_slice(bytes);
        part.extend_from_slice(b"\r\n");
        part
    }

    fn upload_request(token: Option<&str>, parts: Vec<Vec<u8>>) -> axum::http::Request<Body> {
        let mut body: Vec<u8> = parts.concat();
        body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());

        let mut builder = axum::http::Request::builder()
            .method("POST")
            .uri("/recordings/upload")
            .header(
                header::CONTENT_TYPE,
                format!("multipart/form-data; boundary={BOUNDARY}"),
            );
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        builder.body(Body::from(body)).unwrap()
    }

    fn json_request(uri: &str, token: &str, body: &str) -> axum::http::Request<Body> {
        axum::http::Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn send(router: &Router, request: axum::http::Request<Body>) -> (StatusCode, Value) {
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    fn audio_parts() -> Vec<Vec<u8>> {
        vec![
            file_part("audio/webm", b"RIFFdata"),
            text_part("file_type", "audio"),
            text_part("user_id", "user_1"),
            text_part("note", " first entry "),
            text_part("tags", r#"["Love","sad","Love"]"#),
        ]
    }

    #[tokio::test]
    async fn healthz_is_public() {
        let harness = harness_with(&[], false);
        let request = axum::http::Request::builder()
            .uri("/healthz")
            .body(Body::empty())
            .unwrap();

        let (status, body) = send(&harness.router, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["storage_configured"], false);
        assert_eq!(body["prompts_configured"], false);
    }

    #[tokio::test]
    async fn upload_requires_bearer_token() {
        let harness = harness();

        let (status, body) = send(&harness.router, upload_request(None, audio_parts())).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body["detail"].as_str().unwrap().contains("Authorization"));

        let (status, _) = send(
            &harness.router,
            upload_request(Some("forged"), audio_parts()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(harness.objects.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_stores_object_and_inserts_row() {
        let harness = harness();

        let (status, body) = send(
            &harness.router,
            upload_request(Some("token-user_1"), audio_parts()),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "Recording uploaded successfully");
        assert_eq!(body["recording_id"], "rec-1");

        let stored = harness.objects.stored.lock().unwrap();
        assert_eq!(stored.len(), 1);
        let (key, bytes, content_type) = &stored[0];
        assert!(key.starts_with("user_1/"));
        assert!(key.ends_with(".webm"));
        assert_eq!(bytes.as_slice(), b"RIFFdata");
        assert_eq!(content_type, "audio/webm");
        assert_eq!(body["url"], format!("https://cdn.test/recordings/{key}"));

        let rows = harness.database.recordings.lock().unwrap();
        assert_eq!(rows[0].user_id, "user_1");
        assert_eq!(rows[0].file_type, MediaKind::Audio);
        assert_eq!(rows[0].note.as_deref(), Some("first entry"));
        assert_eq!(rows[0].tags, vec!["Love", "Sad"]);
        assert_eq!(rows[0].file_url, body["url"].as_str().unwrap());
    }

    #[tokio::test]
    async fn upload_for_another_user_is_forbidden() {
        let harness = harness();

        let (status, body) = send(
            &harness.router,
            upload_request(Some("token-user_2"), audio_parts()),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(
            body,
            json!({"detail": "Forbidden: user_id does not match the signed-in user"})
        );
        assert!(harness.objects.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_rejects_mismatched_media_and_tags() {
        let harness = harness();

        let wrong_kind = vec![
            file_part("audio/webm", b"data"),
            text_part("file_type", "video"),
        ];
        let (status, body) = send(
            &harness.router,
            upload_request(Some("token-user_1"), wrong_kind),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("Invalid video file type"));

        let reserved_tag = vec![
            file_part("audio/wav", b"data"),
            text_part("file_type", "audio"),
            text_part("tags", r#"["Depression"]"#),
        ];
        let (status, _) = send(
            &harness.router,
            upload_request(Some("token-user_1"), reserved_tag),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let empty_file = vec![file_part("audio/wav", b""), text_part("file_type", "audio")];
        let (status, body) = send(
            &harness.router,
            upload_request(Some("token-user_1"), empty_file),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["detail"], "Invalid request: file is empty");

        assert!(harness.database.recordings.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn oversized_upload_is_rejected() {
        let harness = harness_with(&[("MAX_UPLOAD_BYTES", "1024")], true);
        let parts = vec![
            file_part("audio/wav", &[7_u8; 4096]),
            text_part("file_type", "audio"),
        ];

        let (status, _) = send(&harness.router, upload_request(Some("token-user_1"), parts)).await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert!(harness.objects.stored.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn upload_without_storage_is_a_server_error() {
        let harness = harness_with(&[], false);

        let (status, body) = send(
            &harness.router,
            upload_request(Some("token-user_1"), audio_parts()),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("not configured"));
    }

    #[tokio::test]
    async fn prompt_route_answers_from_fallbacks_without_model_key() {
        let harness = harness();

        let (status, body) = send(
            &harness.router,
            json_request(
                "/prompts/generate",
                "token-user_1",
                r#"{"promptType":"reflective questions about your day"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body,
            json!({"prompt": "What moments from today made you feel most connected to your authentic self?"})
        );

        let (status, _) = send(
            &harness.router,
            json_request("/prompts/generate", "token-user_1", r#"{"prompt":"x"}"#),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn prompt_route_is_rate_limited_per_user() {
        let harness = harness_with(&[("PROMPT_RATE_LIMIT_PER_WINDOW", "1")], true);
        let body = r#"{"promptType":"gratitude-focused questions"}"#;

        let (status, _) = send(
            &harness.router,
            json_request("/prompts/generate", "token-user_1", body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let response = harness
            .router
            .clone()
            .oneshot(json_request("/prompts/generate", "token-user_1", body))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert!(response.headers().contains_key(header::RETRY_AFTER));

        let (status, _) = send(
            &harness.router,
            json_request("/prompts/generate", "token-user_2", body),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn user_sync_upserts_token_subject() {
        let harness = harness();

        let (status, body) = send(
            &harness.router,
            json_request(
                "/users/sync",
                "token-user_1",
                r#"{"user_id":"someone-else","username":"mia","first_name":" Mia ","last_sign_in":"2024-03-01T12:00:00Z"}"#,
            ),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["message"], "User data synced successfully");

        let users = harness.database.users.lock().unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].user_id, "user_1");
        assert_eq!(users[0].first_name.as_deref(), Some("Mia"));
        assert_eq!(users[0].email.as_deref(), Some("user_1@example.com"));
        assert_eq!(users[0].last_sign_in.to_rfc3339(), "2024-03-01T12:00:00+00:00");
    }

    fn maintenance_request(uri: &str, secret: Option<&str>) -> axum::http::Request<Body> {
        let mut builder = axum::http::Request::builder().method("POST").uri(uri);
        if let Some(secret) = secret {
            builder = builder.header(MAINTENANCE_SECRET_HEADER, secret);
        }
        builder.body(Body::empty()).unwrap()
    }

    fn activity(user_id: &str, days_ago: i64) -> UserActivity {
        UserActivity {
            user_id: user_id.to_string(),
            last_sign_in: Some(Utc::now() - chrono::Duration::days(days_ago)),
        }
    }

    #[tokio::test]
    async fn maintenance_routes_require_the_configured_secret() {
        let unconfigured = harness();
        let (status, body) = send(
            &unconfigured.router,
            maintenance_request("/reminder/check-reminders", Some("cron-secret")),
        )
        .await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert!(body["detail"].as_str().unwrap().contains("not configured"));

        let harness = harness_with(&[("MAINTENANCE_SECRET", "cron-secret")], true);
        for secret in [None, Some("guess"), Some("token-user_1")] {
            let (status, _) = send(
                &harness.router,
                maintenance_request("/sync/check-deletions", secret),
            )
            .await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
        assert!(harness.database.deleted.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn reminder_check_lists_inactive_weekly_subscribers() {
        let harness = harness_with(&[("MAINTENANCE_SECRET", "cron-secret")], true);
        let at_noon = corner_core::settings::parse_reminder_time("12:00").unwrap();
        harness.database.settings.lock().unwrap().extend([
            SettingsRow {
                user_id: "idle".to_string(),
                settings: corner_core::settings::UserSettings {
                    reminder_time: at_noon,
                    enable_weekly_reminder: true,
                },
            },
            SettingsRow {
                user_id: "active".to_string(),
                settings: corner_core::settings::UserSettings {
                    reminder_time: at_noon,
                    enable_weekly_reminder: true,
                },
            },
        ]);
        harness
            .database
            .activity
            .lock()
            .unwrap()
            .extend([activity("idle", 10), activity("active", 1)]);

        let (status, body) = send(
            &harness.router,
            maintenance_request("/reminder/check-reminders", Some("cron-secret")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        let weekly: Vec<&Value> = body["reminders"]
            .as_array()
            .unwrap()
            .iter()
            .filter(|reminder| reminder["kind"] == "weekly")
            .collect();
        assert_eq!(weekly, vec![&json!({"user_id": "idle", "kind": "weekly"})]);
        assert!(body["message"]
            .as_str()
            .unwrap()
            .starts_with("Processing reminders for"));
    }

    #[tokio::test]
    async fn cleanup_removes_only_accounts_the_directory_lost() {
        let harness = harness_with(&[("MAINTENANCE_SECRET", "cron-secret")], true);
        harness.database.activity.lock().unwrap().extend([
            activity("user_1", 0),
            activity("gone_2", 30),
            activity("flaky_3", 30),
        ]);

        let (status, body) = send(
            &harness.router,
            maintenance_request("/sync/check-deletions", Some("cron-secret")),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"checked": 3, "deleted": 1, "kept_on_error": 1}));
        assert_eq!(*harness.database.deleted.lock().unwrap(), vec!["gone_2"]);
    }

    #[test]
    fn tags_parse_as_unique_selectable_labels() {
        assert_eq!(parse_tags(None).unwrap(), Vec::<String>::new());
        assert_eq!(parse_tags(Some("  ")).unwrap(), Vec::<String>::new());
        assert_eq!(
            parse_tags(Some(r#"["trigger warning","Happy","Happy"]"#)).unwrap(),
            vec!["Trigger Warning", "Happy"]
        );
        assert!(parse_tags(Some("Love,Happy")).is_err());
        assert!(parse_tags(Some(r#"["Weather"]"#)).is_err());
    }
}

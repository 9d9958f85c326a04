//! Upload workflow: send a captured or picked file with its note and tags.

mod progress;

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use reqwest::{multipart, Body, Client, Request};
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;

use crate::capture::CapturedMedia;
use crate::models::{MediaKind, RecordingId, Tag};
use crate::session::SessionContext;
use crate::util::{error_detail, normalize_base_url, normalize_text_option};

pub use progress::{progress_chunks, ProgressTracker, PROGRESS_CHUNK_BYTES};

/// Route of the upload endpoint, relative to the API base URL.
pub const UPLOAD_PATH: &str = "/recordings/upload";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("Invalid upload: {0}")]
    InvalidInput(String),

    #[error("An upload is already in progress")]
    AlreadyInFlight,

    #[error("Sign in before uploading")]
    NotSignedIn,

    #[error("Upload failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Upload rejected ({status}): {detail}")]
    Rejected { status: u16, detail: String },

    #[error("Unexpected upload response: {0}")]
    InvalidResponse(String),
}

/// File bytes plus the metadata the multipart part needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl UploadFile {
    /// Read a file from disk, guessing its content type from the extension.
    pub fn from_path(path: &Path) -> crate::Result<Self> {
        let bytes = std::fs::read(path)?;
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .map(str::to_string)
            .ok_or_else(|| crate::Error::InvalidInput(format!("{} has no file name", path.display())))?;
        let mime_type = mime_guess::from_path(path)
            .first_raw()
            .unwrap_or("application/octet-stream")
            .to_string();

        Ok(Self {
            file_name,
            mime_type,
            bytes,
        })
    }

    pub fn extension(&self) -> Option<&str> {
        Path::new(&self.file_name)
            .extension()
            .and_then(|extension| extension.to_str())
    }

    /// Relabel the content type for `kind`.
    ///
    /// Extension guessing alone reads every `.webm` as video, so an audio
    /// upload of one needs the kind to pick `audio/webm`. Extensions `kind`
    /// does not know keep the guessed type.
    #[must_use]
    pub fn for_kind(mut self, kind: MediaKind) -> Self {
        if let Some(mime_type) = self
            .extension()
            .and_then(|extension| kind.mime_type_for_extension(extension))
        {
            self.mime_type = mime_type.to_string();
        }
        self
    }
}

impl From<&CapturedMedia> for UploadFile {
    fn from(media: &CapturedMedia) -> Self {
        Self {
            file_name: media.file_name.clone(),
            mime_type: media.mime_type.clone(),
            bytes: media.bytes.clone(),
        }
    }
}

/// Everything the user submits from the upload dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub file: UploadFile,
    pub kind: MediaKind,
    pub note: Option<String>,
    pub tags: Vec<Tag>,
}

impl UploadRequest {
    pub fn new(file: UploadFile, kind: MediaKind) -> Self {
        Self {
            file,
            kind,
            note: None,
            tags: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_note(mut self, note: Option<String>) -> Self {
        self.note = normalize_text_option(note);
        self
    }

    #[must_use]
    pub fn with_tags(mut self, tags: impl IntoIterator<Item = Tag>) -> Self {
        self.tags = tags.into_iter().collect();
        self
    }

    /// Check the request before anything is transmitted.
    pub fn validate(&self) -> Result<(), UploadError> {
        if self.file.bytes.is_empty() {
            return Err(UploadError::InvalidInput("file is empty".to_string()));
        }
        if !self.kind.accepts_mime(&self.file.mime_type) {
            return Err(UploadError::InvalidInput(format!(
                "{} is not an accepted {} type (expected one of {})",
                self.file.mime_type,
                self.kind,
                self.kind.allowed_mime_types().join(", ")
            )));
        }
        if let Some(tag) = self.tags.iter().find(|tag| !tag.is_selectable()) {
            return Err(UploadError::InvalidInput(format!(
                "tag '{tag}' cannot be attached to an upload"
            )));
        }
        Ok(())
    }

    fn unique_tags(&self) -> Vec<Tag> {
        let mut unique = Vec::with_capacity(self.tags.len());
        for tag in &self.tags {
            if !unique.contains(tag) {
                unique.push(*tag);
            }
        }
        unique
    }
}

/// Body of a successful upload response.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    pub message: String,
    pub url: String,
    #[serde(default)]
    pub recording_id: Option<RecordingId>,
}

/// HTTP client for the upload endpoint.
#[derive(Debug, Clone)]
pub struct UploadClient {
    endpoint: String,
    client: Client,
}

impl UploadClient {
    pub fn new(api_base_url: &str) -> Result<Self, UploadError> {
        let base = normalize_base_url(api_base_url, "API base URL").map_err(UploadError::InvalidInput)?;
        Ok(Self {
            endpoint: format!("{base}{UPLOAD_PATH}"),
            client: Client::builder().build()?,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Validate and send one upload. Single attempt, no retry.
    pub async fn upload(
        &self,
        session: &SessionContext,
        request: &UploadRequest,
        progress: Option<UnboundedSender<u8>>,
    ) -> Result<UploadReceipt, UploadError> {
        request.validate()?;
        let user_id = session.user_id().map_err(|_| UploadError::NotSignedIn)?;
        let access_token = session.access_token().map_err(|_| UploadError::NotSignedIn)?;

        let http_request = self.build_request(request, user_id, access_token, progress.clone())?;
        tracing::info!(
            kind = %request.kind,
            bytes = request.file.bytes.len(),
            tags = request.tags.len(),
            "Uploading recording"
        );

        let response = self.client.execute(http_request).await?;
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let detail = error_detail(&body);
            tracing::warn!(status = status.as_u16(), "Upload rejected: {detail}");
            return Err(UploadError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let receipt: UploadReceipt = serde_json::from_str(&body)
            .map_err(|error| UploadError::InvalidResponse(error.to_string()))?;
        let mut finisher = ProgressTracker::new(0, progress);
        finisher.complete();
        tracing::info!(url = %receipt.url, "Upload finished");
        Ok(receipt)
    }

    /// Build the multipart request without sending it.
    pub fn build_request(
        &self,
        request: &UploadRequest,
        user_id: &str,
        access_token: &str,
        progress: Option<UnboundedSender<u8>>,
    ) -> Result<Request, UploadError> {
        let total = request.file.bytes.len() as u64;
        let tracker = ProgressTracker::new(total, progress);
        let body = Body::wrap_stream(progress_chunks(
            request.file.bytes.clone(),
            PROGRESS_CHUNK_BYTES,
            tracker,
        ));

        let file_part = multipart::Part::stream_with_length(body, total)
            .file_name(request.file.file_name.clone())
            .mime_str(&request.file.mime_type)?;

        let mut form = multipart::Form::new()
            .part("file", file_part)
            .text("file_type", request.kind.as_str())
            .text("user_id", user_id.to_string());
        if let Some(note) = &request.note {
            form = form.text("note", note.clone());
        }
        let tags = request.unique_tags();
        if !tags.is_empty() {
            let encoded = serde_json::to_string(&tags)
                .map_err(|error| UploadError::InvalidInput(error.to_string()))?;
            form = form.text("tags", encoded);
        }

        Ok(self
            .client
            .post(&self.endpoint)
            .bearer_auth(access_token)
            .multipart(form)
            .build()?)
    }
}

/// One upload dialog: rejects a second submit while the first is running.
#[derive(Debug)]
pub struct UploadDialog {
    client: UploadClient,
    in_flight: AtomicBool,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl UploadDialog {
    pub const fn new(client: UploadClient) -> Self {
        Self {
            client,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_uploading(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub async fn submit(
        &self,
        session: &SessionContext,
        request: &UploadRequest,
        progress: Option<UnboundedSender<u8>>,
    ) -> Result<UploadReceipt, UploadError> {
        let _guard = self.try_begin()?;
        self.client.upload(session, request, progress).await
    }

    fn try_begin(&self) -> Result<InFlightGuard<'_>, UploadError> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .map_err(|_| UploadError::AlreadyInFlight)?;
        Ok(InFlightGuard(&self.in_flight))
    }
}

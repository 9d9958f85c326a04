use std::io;

use corner_core::auth::AuthError;
use corner_core::capture::CaptureError;
use corner_core::catalog::CatalogError;
use corner_core::shell::ShellError;
use corner_core::upload::UploadError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] corner_core::Error),
    #[error(transparent)]
    Capture(#[from] CaptureError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Shell(#[from] ShellError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Authentication error: {0}")]
    Auth(String),
    #[error("Profile sync failed: {0}")]
    ProfileSync(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Failed to load recordings: {0}")]
    CatalogUnavailable(String),
    #[error("Recording ID cannot be empty")]
    EmptyRecordingId,
    #[error("Cannot tell whether {0} is audio or video; pass --kind")]
    UnknownMediaKind(String),
    #[error(
        "Sign-in is not configured. Set SUPABASE_URL and SUPABASE_ANON_KEY in the environment or a .env file."
    )]
    AuthNotConfigured,
}

impl From<AuthError> for CliError {
    fn from(error: AuthError) -> Self {
        match error {
            AuthError::NotConfigured => Self::AuthNotConfigured,
            other => Self::Auth(other.to_string()),
        }
    }
}

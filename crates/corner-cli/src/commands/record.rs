use std::path::PathBuf;
use std::time::Duration;

use corner_core::capture::{CaptureOptions, CaptureSession};
use corner_core::shell::View;
use corner_core::upload::{UploadFile, UploadRequest};
use corner_core::{MediaKind, Tag};

use crate::commands::common::App;
use crate::commands::upload::upload_and_refresh;
use crate::device::default_device;
use crate::error::CliError;

pub struct RecordOptions {
    pub kind: MediaKind,
    pub seconds: u64,
    pub note: Option<String>,
    pub tags: Vec<Tag>,
    pub output: Option<PathBuf>,
}

pub async fn run_record(app: &mut App, options: RecordOptions) -> Result<(), CliError> {
    app.open(View::Capture)?;

    let capture_options = CaptureOptions {
        preview_dir: preview_dir(),
        ..CaptureOptions::default()
    };
    let mut session = CaptureSession::with_options(default_device(), options.kind, capture_options);
    session.start().await?;

    eprintln!(
        "Recording {} for up to {}s, press Ctrl-C to stop early",
        options.kind, options.seconds
    );
    tokio::select! {
        recorded = session.record_for(Duration::from_secs(options.seconds)) => recorded?,
        _ = tokio::signal::ctrl_c() => eprintln!("Stopping"),
    }

    let media = session.stop()?;
    eprintln!(
        "Captured {} ({} bytes)",
        media.file_name,
        media.bytes.len()
    );

    if let Some(path) = options.output {
        std::fs::write(&path, &media.bytes)?;
        println!("{}", path.display());
        return Ok(());
    }

    let request = UploadRequest::new(UploadFile::from(media), options.kind)
        .with_note(options.note)
        .with_tags(options.tags);
    let uploaded = upload_and_refresh(app, &request).await;
    session.close();
    uploaded
}

/// Previews land in the user cache directory when there is one.
pub fn preview_dir() -> PathBuf {
    dirs::cache_dir().map_or_else(
        || CaptureOptions::default().preview_dir,
        |cache| cache.join("corner").join("previews"),
    )
}

use std::io::{self, Write};
use std::path::Path;

use corner_core::shell::View;
use corner_core::upload::{UploadClient, UploadDialog, UploadFile, UploadReceipt, UploadRequest};
use corner_core::{MediaKind, Tag};
use tokio::sync::mpsc;

use crate::commands::common::App;
use crate::error::CliError;

pub async fn run_upload(
    app: &mut App,
    path: &Path,
    kind: Option<MediaKind>,
    note: Option<String>,
    tags: Vec<Tag>,
) -> Result<(), CliError> {
    app.open(View::Capture)?;

    let file = UploadFile::from_path(path)?;
    let kind = kind
        .or_else(|| guess_kind(&file))
        .ok_or_else(|| CliError::UnknownMediaKind(path.display().to_string()))?;
    let request = UploadRequest::new(file.for_kind(kind), kind)
        .with_note(note)
        .with_tags(tags);

    upload_and_refresh(app, &request).await
}

/// Media kind of a picked file when `--kind` is absent.
///
/// Known extensions decide on their own, and `webm`/`mp4` hold either kind so
/// they decide nothing. Unknown extensions fall back to the guessed type.
pub fn guess_kind(file: &UploadFile) -> Option<MediaKind> {
    let kinds = [MediaKind::Audio, MediaKind::Video];
    if let Some(extension) = file.extension() {
        if kinds
            .iter()
            .any(|kind| kind.mime_type_for_extension(extension).is_some())
        {
            return MediaKind::from_extension(extension);
        }
    }
    kinds
        .into_iter()
        .find(|kind| kind.accepts_mime(&file.mime_type))
}

/// Upload, print the stored URL, then re-fetch the catalog.
pub async fn upload_and_refresh(app: &App, request: &UploadRequest) -> Result<(), CliError> {
    let receipt = upload_with_progress(app, request).await?;
    println!("{}", receipt.url);

    match app.load_catalog().await {
        Ok(catalog) => eprintln!("{} recordings in your corner", catalog.recordings().len()),
        Err(error) => tracing::warn!("Uploaded, but the catalog could not be refreshed: {}", error),
    }
    Ok(())
}

async fn upload_with_progress(
    app: &App,
    request: &UploadRequest,
) -> Result<UploadReceipt, CliError> {
    let dialog = UploadDialog::new(UploadClient::new(&app.config.api_base_url)?);
    let (sender, mut receiver) = mpsc::unbounded_channel();

    let submit = dialog.submit(&app.session, request, Some(sender));
    tokio::pin!(submit);
    let result = loop {
        tokio::select! {
            result = &mut submit => break result,
            Some(percent) = receiver.recv() => render_progress(percent),
        }
    };
    while let Ok(percent) = receiver.try_recv() {
        render_progress(percent);
    }
    eprintln!();

    Ok(result?)
}

fn render_progress(percent: u8) {
    eprint!("\rUploading {percent:>3}%");
    io::stderr().flush().ok();
}

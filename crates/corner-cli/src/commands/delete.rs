use corner_core::shell::View;
use corner_core::RecordingId;

use crate::commands::common::App;
use crate::error::CliError;

pub async fn run_delete(app: &mut App, id: &str) -> Result<(), CliError> {
    let id = normalize_recording_id(id)?;
    app.open(View::Catalog)?;

    let mut catalog = app.load_catalog().await?;
    catalog.delete(&id).await?;
    println!("{id}");
    Ok(())
}

pub fn normalize_recording_id(id: &str) -> Result<RecordingId, CliError> {
    let id = id.trim();
    if id.is_empty() {
        return Err(CliError::EmptyRecordingId);
    }
    Ok(RecordingId::new(id))
}

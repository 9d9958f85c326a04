//! Storage seam behind the recording catalog.

use std::future::Future;

use crate::models::{Recording, RecordingId};
use crate::Result;

/// Query and delete operations on the hosted recordings table and bucket.
pub trait RecordingStore {
    /// All recordings owned by `user_id`.
    fn fetch_recordings(&self, user_id: &str) -> impl Future<Output = Result<Vec<Recording>>>;

    /// Remove the stored media object behind `recording`.
    fn delete_object(&self, recording: &Recording) -> impl Future<Output = Result<()>>;

    /// Remove the catalog row.
    fn delete_row(&self, id: &RecordingId) -> impl Future<Output = Result<()>>;
}

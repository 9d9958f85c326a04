//! Recording catalog: the user's recordings with date and tag filters.

mod store;

use chrono::{FixedOffset, Local, NaiveDate};
use thiserror::Error;

use crate::models::{Recording, RecordingId, Tag};

pub use store::RecordingStore;

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("Recording {0} is not in the catalog")]
    NotFound(RecordingId),

    #[error("Failed to delete media for recording {id}: {source}")]
    Storage {
        id: RecordingId,
        #[source]
        source: crate::Error,
    },

    /// The media is gone but the row survived; the entry stays listed.
    #[error("Deleted media for recording {id} but not its catalog entry: {source}")]
    PartialDelete {
        id: RecordingId,
        #[source]
        source: crate::Error,
    },
}

/// At most one date and one tag.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterState {
    pub date: Option<NaiveDate>,
    pub tag: Option<Tag>,
}

impl FilterState {
    pub const fn is_empty(&self) -> bool {
        self.date.is_none() && self.tag.is_none()
    }

    /// Date predicate then tag predicate.
    pub fn matches(&self, recording: &Recording, offset: &FixedOffset) -> bool {
        self.date
            .is_none_or(|date| recording.local_date(offset) == date)
            && self.tag.is_none_or(|tag| recording.has_tag(tag))
    }
}

/// Narrow `recordings` to those matching `filter`, keeping order.
pub fn apply_filter(
    recordings: &[Recording],
    filter: &FilterState,
    offset: &FixedOffset,
) -> Vec<Recording> {
    recordings
        .iter()
        .filter(|recording| filter.matches(recording, offset))
        .cloned()
        .collect()
}

/// Client-side view of one user's recordings.
#[derive(Debug)]
pub struct RecordingCatalog<S> {
    store: S,
    offset: FixedOffset,
    recordings: Vec<Recording>,
    filter: FilterState,
    filtered: Vec<Recording>,
    loading: bool,
    last_error: Option<String>,
}

impl<S: RecordingStore> RecordingCatalog<S> {
    /// Catalog showing days in the machine's local time zone.
    pub fn new(store: S) -> Self {
        let offset = *Local::now().offset();
        Self::with_offset(store, offset)
    }

    pub const fn with_offset(store: S, offset: FixedOffset) -> Self {
        Self {
            store,
            offset,
            recordings: Vec::new(),
            filter: FilterState {
                date: None,
                tag: None,
            },
            filtered: Vec::new(),
            loading: false,
            last_error: None,
        }
    }

    pub fn recordings(&self) -> &[Recording] {
        &self.recordings
    }

    pub fn filtered(&self) -> &[Recording] {
        &self.filtered
    }

    pub const fn filter(&self) -> FilterState {
        self.filter
    }

    pub const fn is_loading(&self) -> bool {
        self.loading
    }

    /// Message from the last failed refresh, if any.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub const fn store(&self) -> &S {
        &self.store
    }

    /// Re-fetch the user's recordings, newest first.
    ///
    /// A failed fetch is logged and leaves the catalog empty.
    pub async fn refresh(&mut self, user_id: &str) -> &[Recording] {
        self.loading = true;
        let fetched = self.store.fetch_recordings(user_id).await;
        match fetched {
            Ok(mut recordings) => {
                recordings.sort_by(|left, right| right.created_at.cmp(&left.created_at));
                tracing::debug!(count = recordings.len(), "Fetched recordings");
                self.recordings = recordings;
                self.last_error = None;
            }
            Err(error) => {
                tracing::error!("Failed to fetch recordings: {}", error);
                self.recordings.clear();
                self.last_error = Some(error.to_string());
            }
        }
        self.loading = false;
        self.recompute();
        &self.filtered
    }

    pub fn select_date(&mut self, date: Option<NaiveDate>) -> &[Recording] {
        self.filter.date = date;
        self.recompute();
        &self.filtered
    }

    pub fn select_tag(&mut self, tag: Option<Tag>) -> &[Recording] {
        self.filter.tag = tag;
        self.recompute();
        &self.filtered
    }

    pub fn clear_filters(&mut self) -> &[Recording] {
        self.filter = FilterState::default();
        self.recompute();
        &self.filtered
    }

    /// Distinct local days with at least one recording, newest first.
    pub fn available_dates(&self) -> Vec<NaiveDate> {
        let mut dates: Vec<NaiveDate> = self
            .recordings
            .iter()
            .map(|recording| recording.local_date(&self.offset))
            .collect();
        dates.sort_unstable_by(|left, right| right.cmp(left));
        dates.dedup();
        dates
    }

    /// Tags used by at least one recording, in vocabulary order.
    pub fn available_tags(&self) -> Vec<Tag> {
        Tag::ALL
            .into_iter()
            .filter(|tag| self.recordings.iter().any(|recording| recording.has_tag(*tag)))
            .collect()
    }

    /// Delete the stored media, then the row.
    ///
    /// The entry leaves the list only after both steps succeed.
    pub async fn delete(&mut self, id: &RecordingId) -> Result<(), CatalogError> {
        let recording = self
            .recordings
            .iter()
            .find(|recording| &recording.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(id.clone()))?;

        if let Err(source) = self.store.delete_object(&recording).await {
            tracing::warn!(recording = %id, "Failed to delete recording media: {}", source);
            return Err(CatalogError::Storage {
                id: id.clone(),
                source,
            });
        }

        if let Err(source) = self.store.delete_row(id).await {
            tracing::warn!(recording = %id, "Media deleted but catalog row remains: {}", source);
            return Err(CatalogError::PartialDelete {
                id: id.clone(),
                source,
            });
        }

        self.recordings.retain(|recording| &recording.id != id);
        self.recompute();
        tracing::info!(recording = %id, "Recording deleted");
        Ok(())
    }

    fn recompute(&mut self) {
        self.filtered = apply_filter(&self.recordings, &self.filter, &self.offset);
    }
}

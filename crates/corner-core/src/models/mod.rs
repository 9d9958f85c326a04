//! Data models for MyCorner

mod media_kind;
mod recording;
mod tag;

pub use media_kind::MediaKind;
pub use recording::{Recording, RecordingId};
pub use tag::{ParseTagError, Tag};

//! corner-core - Core library for MyCorner
//!
//! Shared models and client-side workflows used by every MyCorner front end:
//! capturing audio/video clips, uploading them with notes and tags, and
//! browsing the recording catalog kept in the hosted backend, and keeping
//! reminder settings.

pub mod auth;
pub mod capture;
pub mod catalog;
pub mod config;
pub mod error;
pub mod models;
pub mod prompts;
pub mod session;
pub mod settings;
pub mod shell;
pub mod supabase;
pub mod upload;
pub mod util;

#[cfg(test)]
mod test_support;

pub use error::{Error, Result};
pub use models::{MediaKind, Recording, RecordingId, Tag};

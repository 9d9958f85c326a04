pub mod auth_cmd;
pub mod common;
pub mod completions;
pub mod delete;
pub mod list;
pub mod prompt;
pub mod record;
pub mod settings;
pub mod tags;
pub mod upload;

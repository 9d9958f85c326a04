use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand, ValueEnum};
use corner_core::prompts::PromptCategory;
use corner_core::{MediaKind, Tag};

#[derive(Parser)]
#[command(name = "corner")]
#[command(about = "Keep an audio and video journal from the command line")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Sign in, sign up or inspect the stored session
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Record a clip from the microphone and upload it
    Record {
        /// Media kind to capture
        #[arg(long, value_parser = parse_kind, default_value = "audio")]
        kind: MediaKind,
        /// Recording length in seconds
        #[arg(short, long, default_value_t = 30)]
        seconds: u64,
        /// Note attached to the recording
        #[arg(long)]
        note: Option<String>,
        /// Tag to attach (repeatable)
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<Tag>,
        /// Save the recording to this path instead of uploading it
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
    /// Upload an existing audio or video file
    Upload {
        /// File to upload
        path: PathBuf,
        /// Media kind; guessed from the file type when omitted
        #[arg(long, value_parser = parse_kind)]
        kind: Option<MediaKind>,
        /// Note attached to the recording
        #[arg(long)]
        note: Option<String>,
        /// Tag to attach (repeatable)
        #[arg(long = "tag", value_parser = parse_tag)]
        tags: Vec<Tag>,
    },
    /// List your recordings, newest first
    #[command(alias = "ls")]
    List {
        /// Only recordings from this local day (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        date: Option<NaiveDate>,
        /// Only recordings carrying this tag
        #[arg(long, value_parser = parse_tag)]
        tag: Option<Tag>,
        /// Print the days that have recordings instead
        #[arg(long)]
        dates: bool,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Delete a recording and its media
    #[command(alias = "rm")]
    Delete {
        /// Recording ID
        id: String,
    },
    /// Ask for a journaling prompt
    Prompt {
        /// Prompt category
        #[arg(value_parser = parse_category, default_value = "day")]
        category: PromptCategory,
    },
    /// Show the tag vocabulary
    Tags {
        /// Only tags used by your recordings
        #[arg(long)]
        used: bool,
    },
    /// Show or change reminder settings
    Settings {
        /// Daily reminder time (HH:MM)
        #[arg(long, value_name = "HH:MM", value_parser = parse_time)]
        reminder_time: Option<NaiveTime>,
        /// Remind after 7 days of inactivity
        #[arg(long, value_name = "BOOL")]
        weekly_reminder: Option<bool>,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Sign in with email and password and keep the session in the keychain
    #[command(alias = "login")]
    SignIn {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
    },
    /// Create an account
    SignUp {
        #[arg(long, value_name = "EMAIL")]
        email: String,
        #[arg(long, value_name = "PASSWORD")]
        password: String,
        #[arg(long)]
        username: Option<String>,
        #[arg(long)]
        first_name: Option<String>,
        #[arg(long)]
        last_name: Option<String>,
    },
    /// Show who is signed in
    Status,
    /// Sign out and clear the stored session
    #[command(alias = "logout")]
    SignOut,
}

fn parse_kind(raw: &str) -> Result<MediaKind, String> {
    raw.parse()
}

fn parse_tag(raw: &str) -> Result<Tag, String> {
    raw.parse::<Tag>().map_err(|error| error.to_string())
}

fn parse_category(raw: &str) -> Result<PromptCategory, String> {
    raw.parse()
}

fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Expected a date like 2024-03-01, got '{raw}'"))
}

fn parse_time(raw: &str) -> Result<NaiveTime, String> {
    corner_core::settings::parse_reminder_time(raw).map_err(|error| error.to_string())
}

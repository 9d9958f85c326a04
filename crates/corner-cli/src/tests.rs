use std::cell::RefCell;

use chrono::{Duration, FixedOffset, NaiveDate, NaiveTime, TimeZone, Utc};
use clap::{CommandFactory, Parser};
use corner_core::auth::{AuthSession, AuthUser};
use corner_core::config::ClientConfig;
use corner_core::prompts::PromptCategory;
use corner_core::session::SessionContext;
use corner_core::settings::{SettingsStore, UserSettings};
use corner_core::shell::View;
use corner_core::upload::UploadFile;
use corner_core::{MediaKind, Recording, RecordingId, Tag};
use pretty_assertions::assert_eq;

use crate::cli::{AuthCommands, Cli, Commands, CompletionShell};
use crate::commands::auth_cmd::status_line;
use crate::commands::common::{
    format_recording_lines_at, format_relative_time, note_preview, recording_to_list_item, App,
};
use crate::commands::completions::run_completions;
use crate::commands::delete::{normalize_recording_id, run_delete};
use crate::commands::list::{run_list, ListOptions};
use crate::commands::prompt::run_prompt;
use crate::commands::settings::{
    describe_settings, run_settings, update_settings, SettingsChange,
};
use crate::commands::tags::run_tags;
use crate::commands::upload::{guess_kind, run_upload};
use crate::error::CliError;

fn session(user_id: &str) -> AuthSession {
    AuthSession {
        access_token: format!("token-{user_id}"),
        refresh_token: "refresh".to_string(),
        expires_at: 1_709_294_400,
        user: AuthUser {
            id: user_id.to_string(),
            email: Some(format!("{user_id}@example.com")),
            username: None,
            first_name: Some("Ada".to_string()),
            last_name: None,
            image_url: None,
        },
    }
}

fn signed_out_app() -> App {
    App::with_session(ClientConfig::default(), None, SessionContext::signed_out())
}

fn recording(id: &str, note: Option<&str>, tags: &[&str]) -> Recording {
    Recording {
        id: RecordingId::new(id),
        user_id: "user_1".to_string(),
        kind: MediaKind::Audio,
        file_url: format!("https://cdn.example.com/recordings/user_1/{id}.wav"),
        note: note.map(str::to_string),
        tags: tags.iter().map(|tag| (*tag).to_string()).collect(),
        created_at: Utc.with_ymd_and_hms(2024, 3, 1, 23, 30, 0).unwrap(),
    }
}

#[test]
fn cli_definition_is_consistent() {
    Cli::command().debug_assert();
}

#[test]
fn list_flags_parse_into_typed_filters() {
    let cli = Cli::try_parse_from(["corner", "list", "--tag", "trigger-warning", "--date", "2024-03-01"])
        .unwrap();
    let Commands::List { date, tag, .. } = cli.command else {
        panic!("expected list");
    };
    assert_eq!(date, NaiveDate::from_ymd_opt(2024, 3, 1));
    assert_eq!(tag, Some(Tag::TriggerWarning));
}

#[test]
fn unknown_tags_and_bad_dates_are_rejected_by_the_parser() {
    assert!(Cli::try_parse_from(["corner", "list", "--tag", "Grief"]).is_err());
    assert!(Cli::try_parse_from(["corner", "list", "--date", "03/01/2024"]).is_err());
    assert!(Cli::try_parse_from(["corner", "upload", "clip.wav", "--kind", "photo"]).is_err());
}

#[test]
fn record_defaults_to_thirty_seconds_of_audio() {
    let cli = Cli::try_parse_from(["corner", "record", "--tag", "love", "--tag", "Work"]).unwrap();
    let Commands::Record {
        kind,
        seconds,
        tags,
        output,
        ..
    } = cli.command
    else {
        panic!("expected record");
    };
    assert_eq!(kind, MediaKind::Audio);
    assert_eq!(seconds, 30);
    assert_eq!(tags, vec![Tag::Love, Tag::Work]);
    assert!(output.is_none());
}

#[test]
fn prompt_category_defaults_to_day_and_accepts_slugs() {
    let cli = Cli::try_parse_from(["corner", "prompt"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Prompt {
            category: PromptCategory::Day
        }
    ));

    let cli = Cli::try_parse_from(["corner", "prompt", "gratitude"]).unwrap();
    assert!(matches!(
        cli.command,
        Commands::Prompt {
            category: PromptCategory::Gratitude
        }
    ));
}

#[test]
fn auth_login_alias_maps_to_sign_in() {
    let cli =
        Cli::try_parse_from(["corner", "auth", "login", "--email", "a@b.c", "--password", "pw"])
            .unwrap();
    assert!(matches!(
        cli.command,
        Commands::Auth {
            command: AuthCommands::SignIn { .. }
        }
    ));
}

#[test]
fn protected_views_require_a_session() {
    let mut app = signed_out_app();
    assert_eq!(app.current_view(), View::SignIn);

    let error = app.open(View::Catalog).unwrap_err();
    assert_eq!(error.to_string(), "Sign in first to open catalog");
    assert_eq!(app.current_view(), View::SignIn);

    assert_eq!(app.sign_in(session("user_1")), View::Catalog);
    assert_eq!(app.open(View::Capture).unwrap(), View::Capture);

    assert_eq!(app.sign_out(), View::SignIn);
    assert!(app.open(View::Prompts).is_err());
}

#[tokio::test]
async fn protected_commands_fail_before_any_request_when_signed_out() {
    let mut app = signed_out_app();

    let error = run_list(
        &mut app,
        ListOptions {
            date: None,
            tag: None,
            dates: false,
            json: false,
        },
    )
    .await
    .unwrap_err();
    assert!(matches!(error, CliError::Shell(_)));

    let error = run_prompt(&mut app, PromptCategory::Growth)
        .await
        .unwrap_err();
    assert_eq!(error.to_string(), "Sign in first to open prompts");

    let error = run_delete(&mut app, "42").await.unwrap_err();
    assert_eq!(error.to_string(), "Sign in first to open catalog");

    assert!(run_tags(&mut app, true).await.is_err());
}

#[tokio::test]
async fn tag_vocabulary_is_public() {
    let mut app = signed_out_app();
    run_tags(&mut app, false).await.unwrap();
}

#[test]
fn catalog_needs_supabase_configuration() {
    let app = App::with_session(
        ClientConfig::default(),
        None,
        SessionContext::from_session(session("user_1")),
    );
    assert!(matches!(app.catalog(), Err(CliError::AuthNotConfigured)));
    assert!(matches!(app.auth(), Err(CliError::AuthNotConfigured)));
}

#[test]
fn catalog_is_built_for_the_signed_in_user() {
    let config = ClientConfig {
        supabase_url: Some("https://project.supabase.co".to_string()),
        supabase_anon_key: Some("anon".to_string()),
        ..ClientConfig::default()
    };
    let signed_in = App::with_session(
        config.clone(),
        None,
        SessionContext::from_session(session("user_1")),
    );
    assert!(signed_in.catalog().is_ok());

    let signed_out = App::with_session(config, None, SessionContext::signed_out());
    assert!(matches!(
        signed_out.catalog(),
        Err(CliError::Core(corner_core::Error::NotSignedIn))
    ));
}

#[test]
fn normalize_recording_id_rejects_empty() {
    assert!(matches!(
        normalize_recording_id("   "),
        Err(CliError::EmptyRecordingId)
    ));
    assert_eq!(normalize_recording_id(" 42 ").unwrap(), RecordingId::new("42"));
}

fn picked(file_name: &str, mime_type: &str) -> UploadFile {
    UploadFile {
        file_name: file_name.to_string(),
        mime_type: mime_type.to_string(),
        bytes: vec![1],
    }
}

#[test]
fn media_kind_is_guessed_only_when_the_file_settles_it() {
    assert_eq!(guess_kind(&picked("note.m4a", "audio/m4a")), Some(MediaKind::Audio));
    assert_eq!(guess_kind(&picked("note.mp3", "audio/mpeg")), Some(MediaKind::Audio));
    assert_eq!(guess_kind(&picked("clip.m4v", "video/x-m4v")), Some(MediaKind::Video));
    assert_eq!(guess_kind(&picked("voice.webm", "video/webm")), None);
    assert_eq!(guess_kind(&picked("clip.mp4", "video/mp4")), None);
    assert_eq!(guess_kind(&picked("stream", "audio/wav")), Some(MediaKind::Audio));
    assert_eq!(guess_kind(&picked("photo.png", "image/png")), None);
}

#[tokio::test]
async fn ambiguous_upload_without_kind_asks_for_one() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("voice.webm");
    std::fs::write(&path, b"clip").unwrap();
    let mut app = App::with_session(
        ClientConfig::default(),
        None,
        SessionContext::from_session(session("user_1")),
    );

    let error = run_upload(&mut app, &path, None, None, Vec::new())
        .await
        .unwrap_err();
    assert!(matches!(error, CliError::UnknownMediaKind(_)));
    assert!(error.to_string().contains("--kind"));
}

#[test]
fn format_relative_time_units() {
    let now = Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap();
    assert_eq!(format_relative_time(now - Duration::seconds(30), now), "just now");
    assert_eq!(format_relative_time(now - Duration::minutes(2), now), "2m ago");
    assert_eq!(format_relative_time(now - Duration::hours(2), now), "2h ago");
    assert_eq!(format_relative_time(now - Duration::days(3), now), "3d ago");
    assert_eq!(format_relative_time(now + Duration::minutes(5), now), "just now");
}

#[test]
fn note_preview_truncates_with_ellipsis() {
    assert_eq!(note_preview("walked\n to  the lake", 40), "walked to the lake");
    assert_eq!(note_preview("abcdefghijkl", 8), "abcde...");
}

#[test]
fn recording_lines_show_local_day_and_tags() {
    let now = Utc.with_ymd_and_hms(2024, 3, 2, 0, 30, 0).unwrap();
    let plus_two = FixedOffset::east_opt(2 * 3600).unwrap();
    let lines = format_recording_lines_at(
        &[
            recording("101", Some("late walk"), &["Trigger Warning", "Love"]),
            recording("102", None, &[]),
        ],
        &plus_two,
        now,
    );

    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("101"));
    assert!(lines[0].contains("2024-03-02"));
    assert!(lines[0].contains("1h ago"));
    assert!(lines[0].ends_with("#Trigger-Warning #Love"));
    assert!(lines[1].contains("audio"));
    assert!(!lines[1].contains('#'));
}

#[test]
fn list_items_serialize_kind_and_url() {
    let item = recording_to_list_item(&recording("7", Some("hi"), &["Happy"]));
    let value = serde_json::to_value(&item).unwrap();
    assert_eq!(value["id"], "7");
    assert_eq!(value["kind"], "audio");
    assert_eq!(value["tags"], serde_json::json!(["Happy"]));
    assert_eq!(value["created_at"], "2024-03-01T23:30:00Z");
}

#[test]
fn status_line_names_user_and_expiry() {
    let line = status_line(&session("user_1"));
    assert_eq!(
        line,
        "Signed in as Ada <user_1@example.com> (session expires 2024-03-01T12:00:00+00:00)"
    );
}

#[test]
fn run_completions_writes_bash_script_file() {
    let dir = tempfile::tempdir().unwrap();
    let output_path = dir.path().join("corner.bash");

    run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("_corner()"));
    assert!(script.contains("complete -F _corner"));
}

#[derive(Default)]
struct MemorySettings {
    row: RefCell<Option<UserSettings>>,
    saves: RefCell<usize>,
}

impl SettingsStore for MemorySettings {
    async fn fetch_settings(&self, _user_id: &str) -> corner_core::Result<Option<UserSettings>> {
        Ok(*self.row.borrow())
    }

    async fn save_settings(
        &self,
        _user_id: &str,
        settings: &UserSettings,
    ) -> corner_core::Result<()> {
        *self.row.borrow_mut() = Some(*settings);
        *self.saves.borrow_mut() += 1;
        Ok(())
    }
}

#[test]
fn settings_flags_parse_time_and_toggle() {
    let cli = Cli::try_parse_from([
        "corner",
        "settings",
        "--reminder-time",
        "21:15",
        "--weekly-reminder",
        "true",
    ])
    .unwrap();
    let Commands::Settings {
        reminder_time,
        weekly_reminder,
    } = cli.command
    else {
        panic!("expected settings");
    };
    assert_eq!(reminder_time, NaiveTime::from_hms_opt(21, 15, 0));
    assert_eq!(weekly_reminder, Some(true));

    assert!(Cli::try_parse_from(["corner", "settings", "--reminder-time", "9pm"]).is_err());
}

#[tokio::test]
async fn settings_show_defaults_without_saving() {
    let store = MemorySettings::default();

    let settings = update_settings(&store, "user_1", SettingsChange::default())
        .await
        .unwrap();
    assert_eq!(settings, UserSettings::default());
    assert_eq!(*store.saves.borrow(), 0);
    assert_eq!(
        describe_settings(&settings),
        vec![
            "Daily reminder at 09:00".to_string(),
            "Reminder after 7 days without signing in: off".to_string(),
        ]
    );
}

#[tokio::test]
async fn settings_change_keeps_unspecified_fields() {
    let store = MemorySettings::default();
    *store.row.borrow_mut() = Some(UserSettings {
        reminder_time: NaiveTime::from_hms_opt(7, 45, 0).unwrap(),
        enable_weekly_reminder: false,
    });

    let settings = update_settings(
        &store,
        "user_1",
        SettingsChange {
            reminder_time: None,
            weekly_reminder: Some(true),
        },
    )
    .await
    .unwrap();

    assert_eq!(settings.reminder_time_label(), "07:45");
    assert!(settings.enable_weekly_reminder);
    assert_eq!(*store.row.borrow(), Some(settings));
    assert_eq!(*store.saves.borrow(), 1);
}

#[tokio::test]
async fn settings_view_requires_a_session() {
    let mut app = signed_out_app();
    let error = run_settings(&mut app, SettingsChange::default())
        .await
        .unwrap_err();
    assert_eq!(error.to_string(), "Sign in first to open settings");
}

use chrono::{DateTime, FixedOffset, Local, Utc};
use corner_core::auth::AuthSession;
use corner_core::catalog::RecordingCatalog;
use corner_core::config::ClientConfig;
use corner_core::session::SessionContext;
use corner_core::shell::{NavigationShell, View};
use corner_core::supabase::{SupabaseRecordingStore, SupabaseSettingsStore};
use corner_core::{MediaKind, Recording};
use serde::Serialize;

use crate::auth::SupabaseAuthService;
use crate::error::CliError;

/// Everything one CLI invocation works with.
///
/// Protected commands go through [`App::open`], which asks the navigation
/// shell whether the current session may see the view.
pub struct App {
    pub config: ClientConfig,
    pub session: SessionContext,
    auth: Option<SupabaseAuthService>,
    shell: NavigationShell,
}

impl App {
    /// Build the context and restore any stored session.
    ///
    /// A session that cannot be restored is logged and treated as signed out.
    pub async fn load(config: ClientConfig) -> Result<Self, CliError> {
        let auth = config
            .supabase()
            .map(|(url, anon_key)| SupabaseAuthService::new(url, anon_key))
            .transpose()?;

        let session = match &auth {
            Some(service) => match service.restore_session().await {
                Ok(Some(session)) => SessionContext::from_session(session),
                Ok(None) => SessionContext::signed_out(),
                Err(error) => {
                    tracing::warn!("Failed to restore stored session: {}", error);
                    SessionContext::signed_out()
                }
            },
            None => SessionContext::signed_out(),
        };

        Ok(Self::with_session(config, auth, session))
    }

    pub fn with_session(
        config: ClientConfig,
        auth: Option<SupabaseAuthService>,
        session: SessionContext,
    ) -> Self {
        let shell = NavigationShell::for_session(&session);
        Self {
            config,
            session,
            auth,
            shell,
        }
    }

    pub fn auth(&self) -> Result<&SupabaseAuthService, CliError> {
        self.auth.as_ref().ok_or(CliError::AuthNotConfigured)
    }

    /// Switch to `view`, refusing protected views while signed out.
    pub fn open(&mut self, view: View) -> Result<View, CliError> {
        Ok(self.shell.require(view, &self.session)?)
    }

    pub const fn current_view(&self) -> View {
        self.shell.current()
    }

    pub fn sign_in(&mut self, session: AuthSession) -> View {
        self.session.sign_in(session);
        self.shell.on_signed_in()
    }

    pub fn sign_out(&mut self) -> View {
        self.session.sign_out();
        self.shell.on_signed_out()
    }

    /// Catalog of the signed-in user's recordings, not yet fetched.
    pub fn catalog(&self) -> Result<RecordingCatalog<SupabaseRecordingStore>, CliError> {
        let (url, anon_key) = self.config.supabase().ok_or(CliError::AuthNotConfigured)?;
        let store = SupabaseRecordingStore::new(
            url,
            anon_key,
            self.session.access_token()?,
            self.config.recordings_bucket.clone(),
        )?;
        Ok(RecordingCatalog::new(store))
    }

    /// Store for the signed-in user's reminder settings.
    pub fn settings_store(&self) -> Result<SupabaseSettingsStore, CliError> {
        let (url, anon_key) = self.config.supabase().ok_or(CliError::AuthNotConfigured)?;
        Ok(SupabaseSettingsStore::new(
            url,
            anon_key,
            self.session.access_token()?,
        )?)
    }

    /// Catalog freshly loaded for the signed-in user.
    pub async fn load_catalog(
        &self,
    ) -> Result<RecordingCatalog<SupabaseRecordingStore>, CliError> {
        let user_id = self.session.user_id()?.to_string();
        let mut catalog = self.catalog()?;
        catalog.refresh(&user_id).await;
        if let Some(error) = catalog.last_error() {
            return Err(CliError::CatalogUnavailable(error.to_string()));
        }
        Ok(catalog)
    }
}

#[derive(Serialize)]
pub struct RecordingListItem {
    pub id: String,
    pub kind: MediaKind,
    pub url: String,
    pub note: Option<String>,
    pub tags: Vec<String>,
    pub created_at: DateTime<Utc>,
}

pub fn recording_to_list_item(recording: &Recording) -> RecordingListItem {
    RecordingListItem {
        id: recording.id.to_string(),
        kind: recording.kind,
        url: recording.file_url.clone(),
        note: recording.note.clone(),
        tags: recording.tags.clone(),
        created_at: recording.created_at,
    }
}

pub fn format_recording_lines(recordings: &[Recording]) -> Vec<String> {
    let offset = *Local::now().offset();
    format_recording_lines_at(recordings, &offset, Utc::now())
}

pub fn format_recording_lines_at(
    recordings: &[Recording],
    offset: &FixedOffset,
    now: DateTime<Utc>,
) -> Vec<String> {
    recordings
        .iter()
        .map(|recording| {
            let id = recording.id.to_string();
            let short_id = id.chars().take(13).collect::<String>();
            let day = recording.local_date(offset);
            let relative_time = format_relative_time(recording.created_at, now);
            let note = note_preview(recording.note.as_deref().unwrap_or(""), 40);
            let tags = render_tags(recording);

            if tags.is_empty() {
                format!(
                    "{short_id:<13}  {:<5}  {day}  {relative_time:<8}  {note}",
                    recording.kind
                )
            } else {
                format!(
                    "{short_id:<13}  {:<5}  {day}  {relative_time:<8}  {note:<40}  {tags}",
                    recording.kind
                )
            }
        })
        .collect()
}

pub fn note_preview(note: &str, max_chars: usize) -> String {
    let single_line = note.split_whitespace().collect::<Vec<_>>().join(" ");
    if single_line.chars().count() <= max_chars {
        return single_line;
    }
    let truncated = single_line
        .chars()
        .take(max_chars.saturating_sub(3))
        .collect::<String>();
    format!("{truncated}...")
}

fn render_tags(recording: &Recording) -> String {
    recording
        .tags
        .iter()
        .map(|tag| format!("#{}", tag.replace(' ', "-")))
        .collect::<Vec<_>>()
        .join(" ")
}

pub fn format_relative_time(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let diff = (now - timestamp).num_seconds().max(0);
    let minute = 60;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

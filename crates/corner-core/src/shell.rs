//! Navigation shell: which view is showing and who may see it.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use crate::session::SessionContext;

/// Top-level views of the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    SignIn,
    SignUp,
    Home,
    Capture,
    Catalog,
    Prompts,
    Settings,
}

impl View {
    pub const ALL: [Self; 7] = [
        Self::SignIn,
        Self::SignUp,
        Self::Home,
        Self::Capture,
        Self::Catalog,
        Self::Prompts,
        Self::Settings,
    ];

    pub const fn requires_auth(self) -> bool {
        !matches!(self, Self::SignIn | Self::SignUp)
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SignIn => "sign-in",
            Self::SignUp => "sign-up",
            Self::Home => "home",
            Self::Capture => "capture",
            Self::Catalog => "catalog",
            Self::Prompts => "prompts",
            Self::Settings => "settings",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|view| view.as_str() == wanted)
            .ok_or_else(|| format!("Unknown view '{wanted}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ShellError {
    #[error("Sign in first to open {0}")]
    SignInRequired(View),
}

/// Gatekeeper for view changes.
///
/// Protected views redirect to `SignIn` while signed out; the requested view
/// is remembered and opened once sign-in completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigationShell {
    current: View,
    pending: Option<View>,
}

impl Default for NavigationShell {
    fn default() -> Self {
        Self {
            current: View::SignIn,
            pending: None,
        }
    }
}

impl NavigationShell {
    /// Shell whose starting view matches the session state.
    pub fn for_session(session: &SessionContext) -> Self {
        let current = if session.is_signed_in() {
            View::Home
        } else {
            View::SignIn
        };
        Self {
            current,
            pending: None,
        }
    }

    pub const fn current(&self) -> View {
        self.current
    }

    pub const fn pending(&self) -> Option<View> {
        self.pending
    }

    /// Move to `view`, or to `SignIn` when it needs a session that is absent.
    pub fn navigate(&mut self, view: View, session: &SessionContext) -> View {
        if view.requires_auth() && !session.is_signed_in() {
            tracing::debug!(requested = %view, "Redirecting to sign-in");
            self.pending = Some(view);
            self.current = View::SignIn;
        } else {
            self.current = view;
        }
        self.current
    }

    /// Like [`navigate`](Self::navigate) but refuses instead of redirecting.
    pub fn require(&mut self, view: View, session: &SessionContext) -> Result<View, ShellError> {
        if view.requires_auth() && !session.is_signed_in() {
            self.pending = Some(view);
            self.current = View::SignIn;
            return Err(ShellError::SignInRequired(view));
        }
        self.current = view;
        Ok(view)
    }

    /// Resume the remembered view after a successful sign-in.
    pub fn on_signed_in(&mut self) -> View {
        self.current = self.pending.take().unwrap_or(View::Home);
        self.current
    }

    pub fn on_signed_out(&mut self) -> View {
        self.pending = None;
        self.current = View::SignIn;
        self.current
    }
}

//! Authenticated-user context passed to the components that need it.

use crate::auth::{AuthSession, AuthUser};
use crate::{Error, Result};

/// Holds the signed-in user for one front end instance.
///
/// Populated on sign-in and cleared on sign-out; components borrow it rather
/// than reaching for a global.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    session: Option<AuthSession>,
}

impl SessionContext {
    pub const fn signed_out() -> Self {
        Self { session: None }
    }

    pub const fn from_session(session: AuthSession) -> Self {
        Self {
            session: Some(session),
        }
    }

    pub fn sign_in(&mut self, session: AuthSession) {
        tracing::debug!("Session context populated");
        self.session = Some(session);
    }

    pub fn sign_out(&mut self) -> Option<AuthSession> {
        self.session.take()
    }

    pub const fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    pub fn user(&self) -> Option<&AuthUser> {
        self.session.as_ref().map(|session| &session.user)
    }

    pub const fn session(&self) -> Option<&AuthSession> {
        self.session.as_ref()
    }

    /// User id of the signed-in user, or [`Error::NotSignedIn`].
    pub fn user_id(&self) -> Result<&str> {
        self.user()
            .map(|user| user.id.as_str())
            .ok_or(Error::NotSignedIn)
    }

    /// Bearer token for backend calls, or [`Error::NotSignedIn`].
    pub fn access_token(&self) -> Result<&str> {
        self.session
            .as_ref()
            .map(|session| session.access_token.as_str())
            .ok_or(Error::NotSignedIn)
    }
}

#[cfg(test)]
pub(crate) fn test_session(user_id: &str) -> AuthSession {
    AuthSession {
        access_token: format!("token-{user_id}"),
        refresh_token: "refresh".to_string(),
        expires_at: i64::MAX,
        user: AuthUser {
            id: user_id.to_string(),
            email: Some(format!("{user_id}@example.com")),
            username: None,
            first_name: None,
            last_name: None,
            image_url: None,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_in_and_out_toggle_identity() {
        let mut context = SessionContext::signed_out();
        assert!(matches!(context.user_id(), Err(Error::NotSignedIn)));

        context.sign_in(test_session("user_1"));
        assert_eq!(context.user_id().unwrap(), "user_1");
        assert_eq!(context.access_token().unwrap(), "token-user_1");

        let previous = context.sign_out().unwrap();
        assert_eq!(previous.user.id, "user_1");
        assert!(!context.is_signed_in());
        assert!(context.access_token().is_err());
    }
}

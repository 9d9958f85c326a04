//! CLI Supabase auth/session helpers with secure keychain persistence.

#[cfg(test)]
use std::collections::HashMap;
#[cfg(test)]
use std::sync::{Mutex, OnceLock};

#[cfg(not(test))]
use keyring::Entry;

use chrono::Utc;
use corner_core::auth::{
    AuthResult, SessionPersistence, SignUpOutcome, SignUpProfile, SupabaseAuthClient,
};
pub use corner_core::auth::{AuthError, AuthSession};
use corner_core::util::error_detail;
use reqwest::{Client, Request};
use serde::Serialize;

use crate::error::CliError;

#[cfg(not(test))]
const KEYRING_SERVICE_NAME: &str = "corner-cli";

/// Route that mirrors the signed-in user into the profile table.
pub const USER_SYNC_PATH: &str = "/users/sync";

/// Keychain slot for one Supabase project.
#[derive(Clone)]
struct SessionStore {
    username: String,
}

impl SessionStore {
    fn new(supabase_url: &str) -> Self {
        Self {
            username: format!("supabase_session:{}", supabase_url.trim_end_matches('/')),
        }
    }

    #[cfg(test)]
    fn test_store() -> &'static Mutex<HashMap<String, String>> {
        static STORE: OnceLock<Mutex<HashMap<String, String>>> = OnceLock::new();
        STORE.get_or_init(|| Mutex::new(HashMap::new()))
    }

    #[cfg(not(test))]
    fn entry(&self) -> AuthResult<Entry> {
        Entry::new(KEYRING_SERVICE_NAME, &self.username)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))
    }
}

impl SessionPersistence for SessionStore {
    #[cfg(not(test))]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let entry = self.entry()?;
        match entry.get_password() {
            Ok(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard
            .get(&self.username)
            .map(|raw| serde_json::from_str(raw))
            .transpose()
            .map_err(AuthError::from)
    }

    #[cfg(not(test))]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        self.entry()?
            .set_password(&raw)
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        Ok(())
    }

    #[cfg(test)]
    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        let raw = serde_json::to_string(session)?;
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.insert(self.username.clone(), raw);
        Ok(())
    }

    #[cfg(not(test))]
    fn clear_session(&self) -> AuthResult<()> {
        let entry = self.entry()?;
        match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(error) => Err(AuthError::SecureStorage(error.to_string())),
        }
    }

    #[cfg(test)]
    fn clear_session(&self) -> AuthResult<()> {
        let mut guard = Self::test_store()
            .lock()
            .map_err(|error| AuthError::SecureStorage(error.to_string()))?;
        guard.remove(&self.username);
        Ok(())
    }
}

#[derive(Clone)]
pub struct SupabaseAuthService {
    inner: SupabaseAuthClient<SessionStore>,
    store: SessionStore,
}

impl SupabaseAuthService {
    pub fn new(url: &str, anon_key: &str) -> AuthResult<Self> {
        let store = SessionStore::new(url);
        Ok(Self {
            inner: SupabaseAuthClient::new(url, anon_key.to_string(), store.clone())?,
            store,
        })
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        self.inner.sign_in(email, password).await
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
    ) -> AuthResult<SignUpOutcome> {
        self.inner.sign_up(email, password, profile).await
    }

    /// Stored session, refreshed when it has expired.
    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        self.inner.restore_session().await
    }

    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        self.inner.sign_out(access_token).await
    }

    /// Forget the local session without contacting the identity provider.
    pub fn forget(&self) -> AuthResult<()> {
        self.store.clear_session()
    }
}

/// Profile fields mirrored into the backend's `users` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserSyncPayload {
    pub email: Option<String>,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub last_sign_in: chrono::DateTime<Utc>,
}

impl UserSyncPayload {
    pub fn from_session(session: &AuthSession) -> Self {
        let user = &session.user;
        Self {
            email: user.email.clone(),
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            profile_image_url: user.image_url.clone(),
            last_sign_in: Utc::now(),
        }
    }
}

pub fn user_sync_request(
    client: &Client,
    api_base_url: &str,
    session: &AuthSession,
) -> Result<Request, CliError> {
    client
        .post(format!(
            "{}{USER_SYNC_PATH}",
            api_base_url.trim_end_matches('/')
        ))
        .bearer_auth(&session.access_token)
        .json(&UserSyncPayload::from_session(session))
        .build()
        .map_err(|error| CliError::ProfileSync(format!("could not build request: {error}")))
}

/// Push the signed-in profile to the backend.
pub async fn sync_user_profile(api_base_url: &str, session: &AuthSession) -> Result<(), CliError> {
    let client = Client::new();
    let request = user_sync_request(&client, api_base_url, session)?;
    let response = client
        .execute(request)
        .await
        .map_err(|error| CliError::ProfileSync(error.to_string()))?;

    let status = response.status();
    if status.is_success() {
        tracing::debug!("Synced user profile");
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(CliError::ProfileSync(format!(
        "HTTP {}: {}",
        status.as_u16(),
        error_detail(&body)
    )))
}

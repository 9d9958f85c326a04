//! Client for the hosted identity provider (Supabase GoTrue API).

#[cfg(test)]
use std::collections::HashMap;
use std::fmt;
#[cfg(test)]
use std::sync::{Arc, Mutex};

use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{error_detail, normalize_text_option, unix_timestamp_now};

const EXPIRY_SKEW_SECONDS: i64 = 60;

/// The signed-in user and the profile fields shown in the shell header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl AuthUser {
    /// Name used when greeting the user.
    pub fn display_name(&self) -> String {
        match (&self.first_name, &self.last_name) {
            (Some(first), Some(last)) => format!("{first} {last}"),
            (Some(first), None) => first.clone(),
            _ => self
                .username
                .clone()
                .or_else(|| self.email.clone())
                .unwrap_or_else(|| self.id.clone()),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("access_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

/// Profile captured on the sign-up form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SignUpProfile {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignUpOutcome {
    SignedIn(AuthSession),
    ConfirmationRequired,
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Sign-in is not configured. Set SUPABASE_URL and SUPABASE_ANON_KEY.")]
    NotConfigured,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(&'static str),
    #[error("{0}")]
    MissingCredentials(&'static str),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Where a session survives between runs (OS keychain in the CLI).
pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Process-local persistence, shared between clones.
#[cfg(test)]
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    sessions: Arc<Mutex<HashMap<&'static str, AuthSession>>>,
}

#[cfg(test)]
impl SessionPersistence for MemorySessionStore {
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        let sessions = self
            .sessions
            .lock()
            .map_err(|_| AuthError::SecureStorage("session store poisoned".to_string()))?;
        Ok(sessions.get("current").cloned())
    }

    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        self.sessions
            .lock()
            .map_err(|_| AuthError::SecureStorage("session store poisoned".to_string()))?
            .insert("current", session.clone());
        Ok(())
    }

    fn clear_session(&self) -> AuthResult<()> {
        self.sessions
            .lock()
            .map_err(|_| AuthError::SecureStorage("session store poisoned".to_string()))?
            .remove("current");
        Ok(())
    }
}

#[derive(Clone)]
pub struct SupabaseAuthClient<S: SessionPersistence> {
    auth_url: String,
    anon_key: String,
    client: Client,
    store: S,
}

impl<S: SessionPersistence> SupabaseAuthClient<S> {
    pub fn new(url: impl AsRef<str>, anon_key: impl Into<String>, store: S) -> AuthResult<Self> {
        let auth_url = normalize_auth_url(url.as_ref())?;
        let anon_key = anon_key.into().trim().to_string();
        if anon_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Supabase anon key must not be empty",
            ));
        }

        Ok(Self {
            auth_url,
            anon_key,
            client: Client::builder().build()?,
            store,
        })
    }

    /// Load the persisted session, refreshing it when it is about to expire.
    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored) = self.store.load_session()? else {
            return Ok(None);
        };

        if !stored.is_expired() {
            return Ok(Some(stored));
        }

        match self.refresh_session(&stored.refresh_token).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(error) => {
                tracing::warn!("Failed to refresh persisted session: {}", error);
                self.store.clear_session()?;
                Ok(None)
            }
        }
    }

    pub async fn sign_up(
        &self,
        email: &str,
        password: &str,
        profile: &SignUpProfile,
    ) -> AuthResult<SignUpOutcome> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email.trim(),
            "password": password,
            "data": profile,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/signup", self.auth_url))
                .json(&payload),
        );
        let response = self.send_auth_request(request).await?;
        match response.into_session()? {
            Some(session) => {
                self.store.save_session(&session)?;
                Ok(SignUpOutcome::SignedIn(session))
            }
            None => Ok(SignUpOutcome::ConfirmationRequired),
        }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> AuthResult<AuthSession> {
        validate_credentials(email, password)?;

        let payload = serde_json::json!({
            "email": email.trim(),
            "password": password,
        });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "password")])
                .json(&payload),
        );

        let response = self.send_auth_request(request).await?;
        let session = response.into_session()?.ok_or_else(|| {
            AuthError::Api("Sign-in response did not include an active session".to_string())
        })?;

        self.store.save_session(&session)?;
        tracing::info!("Signed in");
        Ok(session)
    }

    pub async fn refresh_session(&self, refresh_token: &str) -> AuthResult<AuthSession> {
        if refresh_token.trim().is_empty() {
            return Err(AuthError::MissingCredentials("Refresh token must not be empty"));
        }

        let payload = serde_json::json!({ "refresh_token": refresh_token });
        let request = self.public_request(
            self.client
                .post(format!("{}/token", self.auth_url))
                .query(&[("grant_type", "refresh_token")])
                .json(&payload),
        );
        let response = self.send_auth_request(request).await?;
        let session = response.into_session()?.ok_or_else(|| {
            AuthError::Api("Refresh response did not include an active session".to_string())
        })?;

        self.store.save_session(&session)?;
        Ok(session)
    }

    /// Revoke the session remotely and forget it locally.
    ///
    /// An already expired token (401) still clears the local copy.
    pub async fn sign_out(&self, access_token: &str) -> AuthResult<()> {
        let response = self
            .client
            .post(format!("{}/logout", self.auth_url))
            .header("apikey", &self.anon_key)
            .bearer_auth(access_token)
            .send()
            .await?;

        let status = response.status();
        if !(status.is_success() || status == StatusCode::UNAUTHORIZED) {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(format_api_error(status, &body)));
        }

        self.store.clear_session()?;
        tracing::info!("Signed out");
        Ok(())
    }

    fn public_request(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.anon_key)
    }

    async fn send_auth_request(&self, request: RequestBuilder) -> AuthResult<GoTrueResponse> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(format_api_error(status, &body)));
        }
        Ok(response.json::<GoTrueResponse>().await?)
    }
}

pub fn normalize_auth_url(url: &str) -> AuthResult<String> {
    let base = crate::util::normalize_base_url(url, "Supabase URL")
        .map_err(|_| AuthError::InvalidConfiguration("Supabase URL must be an http(s) URL"))?;
    if base.ends_with("/auth/v1") {
        Ok(base)
    } else {
        Ok(format!("{base}/auth/v1"))
    }
}

/// Both values or neither; one without the other is a configuration error.
pub fn resolve_optional_supabase_config(
    url: Option<String>,
    anon_key: Option<String>,
) -> AuthResult<Option<(String, String)>> {
    match (normalize_text_option(url), normalize_text_option(anon_key)) {
        (None, None) => Ok(None),
        (Some(url), Some(anon_key)) => Ok(Some((url, anon_key))),
        _ => Err(AuthError::NotConfigured),
    }
}

fn validate_credentials(email: &str, password: &str) -> AuthResult<()> {
    if email.trim().is_empty() {
        return Err(AuthError::MissingCredentials("Email is required"));
    }
    if password.is_empty() {
        return Err(AuthError::MissingCredentials("Password is required"));
    }
    Ok(())
}

fn format_api_error(status: StatusCode, body: &str) -> String {
    format!("{} ({})", error_detail(body), status.as_u16())
}

#[derive(Debug, Deserialize)]
struct GoTrueResponse {
    access_token: Option<String>,
    refresh_token: Option<String>,
    expires_at: Option<i64>,
    expires_in: Option<i64>,
    user: Option<GoTrueUser>,
    session: Option<Box<GoTrueResponse>>,
}

impl GoTrueResponse {
    fn into_session(self) -> AuthResult<Option<AuthSession>> {
        if let Some(nested) = self.session {
            if self.access_token.is_none() {
                let mut nested = *nested;
                nested.user = nested.user.or(self.user);
                return nested.into_session();
            }
        }

        let expires_at = self.expires_at.or_else(|| {
            self.expires_in
                .map(|expires_in| unix_timestamp_now().saturating_add(expires_in))
        });

        match (self.access_token, self.refresh_token, expires_at, self.user) {
            (Some(access_token), Some(refresh_token), Some(expires_at), Some(user)) => {
                Ok(Some(AuthSession {
                    access_token,
                    refresh_token,
                    expires_at,
                    user: user.into(),
                }))
            }
            (None, None, None, Some(_)) => Ok(None),
            _ => Err(AuthError::Api(
                "Auth response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GoTrueUser {
    id: String,
    email: Option<String>,
    #[serde(default)]
    user_metadata: Option<UserMetadata>,
}

#[derive(Debug, Default, Deserialize)]
struct UserMetadata {
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    #[serde(alias = "avatar_url")]
    image_url: Option<String>,
}

impl From<GoTrueUser> for AuthUser {
    fn from(value: GoTrueUser) -> Self {
        let metadata = value.user_metadata.unwrap_or_default();
        Self {
            id: value.id,
            email: value.email,
            username: normalize_text_option(metadata.username),
            first_name: normalize_text_option(metadata.first_name),
            last_name: normalize_text_option(metadata.last_name),
            image_url: normalize_text_option(metadata.image_url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{spawn_stub_server, StubResponse};
    use pretty_assertions::assert_eq;

    fn user(id: &str) -> AuthUser {
        AuthUser {
            id: id.to_string(),
            email: None,
            username: None,
            first_name: None,
            last_name: None,
            image_url: None,
        }
    }

    #[test]
    fn normalize_auth_url_appends_auth_path() {
        assert_eq!(
            normalize_auth_url("https://demo.supabase.co/").unwrap(),
            "https://demo.supabase.co/auth/v1"
        );
        assert_eq!(
            normalize_auth_url("https://demo.supabase.co/auth/v1").unwrap(),
            "https://demo.supabase.co/auth/v1"
        );
        assert!(normalize_auth_url("demo.supabase.co").is_err());
    }

    #[test]
    fn signup_without_session_means_confirmation_required() {
        let response: GoTrueResponse =
            serde_json::from_str(r#"{"user":{"id":"user_1","email":"a@example.com"}}"#).unwrap();
        assert!(response.into_session().unwrap().is_none());
    }

    #[test]
    fn nested_session_and_metadata_are_read() {
        let response: GoTrueResponse = serde_json::from_str(
            r#"{
                "user": {"id": "user_1", "email": "a@example.com",
                         "user_metadata": {"first_name": "Ada", "last_name": " ", "avatar_url": "https://img"}},
                "session": {"access_token": "at", "refresh_token": "rt", "expires_in": 3600}
            }"#,
        )
        .unwrap();
        let session = response.into_session().unwrap().unwrap();
        assert_eq!(session.access_token, "at");
        assert_eq!(session.user.first_name.as_deref(), Some("Ada"));
        assert_eq!(session.user.last_name, None);
        assert_eq!(session.user.image_url.as_deref(), Some("https://img"));
        assert_eq!(session.user.display_name(), "Ada");
    }

    #[test]
    fn session_debug_redacts_tokens() {
        let session = AuthSession {
            access_token: "secret-access-token".to_string(),
            refresh_token: "secret-refresh-token".to_string(),
            expires_at: 1_700_000_000,
            user: user("user"),
        };
        let rendered = format!("{session:?}");
        assert!(!rendered.contains("secret-access-token"));
        assert!(!rendered.contains("secret-refresh-token"));
        assert!(rendered.contains("[REDACTED]"));
    }

    #[test]
    fn resolve_config_requires_both_values() {
        assert!(resolve_optional_supabase_config(None, None).unwrap().is_none());
        assert!(matches!(
            resolve_optional_supabase_config(Some("https://x".into()), None),
            Err(AuthError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn sign_in_posts_password_grant_and_persists_session() {
        let (base_url, server) = spawn_stub_server(vec![StubResponse::json(
            "200 OK",
            r#"{"access_token":"at","refresh_token":"rt","expires_in":3600,"user":{"id":"user_1","email":"a@example.com"}}"#,
        )])
        .await;
        let store = MemorySessionStore::default();
        let client = SupabaseAuthClient::new(&base_url, "anon", store.clone()).unwrap();

        let session = client.sign_in("a@example.com", "hunter2").await.unwrap();
        assert_eq!(session.user.id, "user_1");
        assert_eq!(store.load_session().unwrap(), Some(session));

        let requests = server.await.unwrap();
        assert_eq!(
            requests[0].request_line(),
            "POST /auth/v1/token?grant_type=password HTTP/1.1"
        );
        assert_eq!(requests[0].header("apikey").as_deref(), Some("anon"));
    }

    #[tokio::test]
    async fn sign_in_surfaces_provider_message() {
        let (base_url, _server) = spawn_stub_server(vec![StubResponse::json(
            "400 Bad Request",
            r#"{"error":"invalid_grant","error_description":"Invalid login credentials"}"#,
        )])
        .await;
        let client =
            SupabaseAuthClient::new(&base_url, "anon", MemorySessionStore::default()).unwrap();

        let error = client.sign_in("a@example.com", "wrong").await.unwrap_err();
        assert_eq!(error.to_string(), "Auth API error: Invalid login credentials (400)");
    }

    #[tokio::test]
    async fn expired_session_that_cannot_refresh_is_cleared() {
        let (base_url, _server) = spawn_stub_server(vec![StubResponse::json(
            "400 Bad Request",
            r#"{"msg":"Invalid Refresh Token"}"#,
        )])
        .await;
        let store = MemorySessionStore::default();
        store
            .save_session(&AuthSession {
                access_token: "old".to_string(),
                refresh_token: "rt".to_string(),
                expires_at: 0,
                user: user("user_1"),
            })
            .unwrap();
        let client = SupabaseAuthClient::new(&base_url, "anon", store.clone()).unwrap();

        assert!(client.restore_session().await.unwrap().is_none());
        assert!(store.load_session().unwrap().is_none());
    }
}

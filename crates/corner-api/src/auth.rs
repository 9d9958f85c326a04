use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use futures_util::future::BoxFuture;
use jsonwebtoken::{decode, decode_header, Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::config::AppConfig;
use crate::error::AppError;

/// Identity taken from a verified access token; the subject is the user id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: Option<String>,
    pub session_id: Option<String>,
}

/// Turns a bearer token into a user, or refuses it.
pub trait TokenVerifier: Send + Sync {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<AuthenticatedUser, AppError>>;
}

/// RS256 verification against the project's JWKS document.
#[derive(Clone)]
pub struct SupabaseJwtVerifier {
    client: reqwest::Client,
    config: Arc<AppConfig>,
    cache: Arc<RwLock<JwksCache>>,
}

impl TokenVerifier for SupabaseJwtVerifier {
    fn verify<'a>(&'a self, token: &'a str) -> BoxFuture<'a, Result<AuthenticatedUser, AppError>> {
        Box::pin(self.verify_access_token(token))
    }
}

impl SupabaseJwtVerifier {
    pub fn new(config: Arc<AppConfig>) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
            cache: Arc::new(RwLock::new(JwksCache::default())),
        }
    }

    pub async fn verify_access_token(&self, token: &str) -> Result<AuthenticatedUser, AppError> {
        let header = decode_header(token).map_err(|error| {
            AppError::unauthorized(format!("Token header decode failed: {}", sanitize(&error)))
        })?;
        let kid = header
            .kid
            .ok_or_else(|| AppError::unauthorized("Token header missing `kid`"))?;

        let key = self.find_key(&kid).await?;

        let mut validation = Validation::new(Algorithm::RS256);
        // Audience and time claims are checked below with the configured skew.
        validation.validate_aud = false;
        validation.validate_exp = false;
        validation.required_spec_claims.clear();
        validation.set_issuer(&[self.config.supabase_jwt_issuer.as_str()]);

        let decoded = decode::<AccessClaims>(token, &key, &validation).map_err(|error| {
            AppError::unauthorized(format!("Token validation failed: {}", sanitize(&error)))
        })?;

        check_claims(
            &decoded.claims,
            &self.config.supabase_jwt_audience,
            self.config.auth_clock_skew,
            chrono::Utc::now().timestamp(),
        )?;

        let claims = decoded.claims;
        Ok(AuthenticatedUser {
            user_id: claims.sub,
            email: claims.email.filter(|email| !email.trim().is_empty()),
            session_id: claims.session_id.or(claims.jti),
        })
    }

    async fn find_key(&self, kid: &str) -> Result<DecodingKey, AppError> {
        let ttl = self.config.jwks_cache_ttl;
        if let Some(key) = self.cache.read().await.fresh_key(kid, ttl) {
            return Ok(key);
        }

        let mut cache = self.cache.write().await;
        // Another request may have refreshed while we waited for the lock.
        if let Some(key) = cache.fresh_key(kid, ttl) {
            return Ok(key);
        }

        cache.keys = fetch_jwks(&self.client, &self.config.supabase_jwks_url).await?;
        cache.fetched_at = Some(Instant::now());
        tracing::debug!(keys = cache.keys.len(), "Refreshed JWKS cache");

        cache
            .keys
            .get(kid)
            .cloned()
            .ok_or_else(|| AppError::unauthorized("Signing key not found in JWKS"))
    }
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, AppError> {
    let header = headers
        .get("authorization")
        .ok_or_else(|| AppError::unauthorized("Missing Authorization header"))?
        .to_str()
        .map_err(|_| AppError::unauthorized("Authorization header is not valid UTF-8"))?;

    let (scheme, token) = header
        .split_once(' ')
        .ok_or_else(|| AppError::unauthorized("Authorization header must be `Bearer <token>`"))?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(AppError::unauthorized(
            "Authorization scheme must be `Bearer`",
        ));
    }
    let token = token.trim();
    if token.is_empty() {
        return Err(AppError::unauthorized("Bearer token is empty"));
    }

    Ok(token)
}

#[derive(Default)]
struct JwksCache {
    keys: HashMap<String, DecodingKey>,
    fetched_at: Option<Instant>,
}

impl JwksCache {
    fn fresh_key(&self, kid: &str, ttl: Duration) -> Option<DecodingKey> {
        let fresh = self.fetched_at.is_some_and(|at| at.elapsed() <= ttl);
        if fresh {
            self.keys.get(kid).cloned()
        } else {
            None
        }
    }
}

#[derive(Debug, Deserialize)]
struct JwksDocument {
    keys: Vec<Jwk>,
}

#[derive(Debug, Deserialize)]
struct Jwk {
    kid: Option<String>,
    kty: Option<String>,
    #[serde(rename = "use")]
    usage: Option<String>,
    n: Option<String>,
    e: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccessClaims {
    sub: String,
    aud: Option<Value>,
    role: Option<String>,
    email: Option<String>,
    exp: Option<i64>,
    iat: Option<i64>,
    nbf: Option<i64>,
    jti: Option<String>,
    session_id: Option<String>,
}

fn check_claims(
    claims: &AccessClaims,
    audience: &str,
    clock_skew: Duration,
    now: i64,
) -> Result<(), AppError> {
    if !audience_matches(claims.aud.as_ref(), audience) {
        return Err(AppError::unauthorized("Token audience is not allowed"));
    }
    if claims.sub.trim().is_empty() {
        return Err(AppError::unauthorized("Token subject is missing"));
    }
    if claims.role.as_deref() != Some("authenticated") {
        return Err(AppError::unauthorized("Token role is not allowed"));
    }

    let skew = i64::try_from(clock_skew.as_secs()).unwrap_or(0);

    let exp = claims
        .exp
        .ok_or_else(|| AppError::unauthorized("Token missing `exp` claim"))?;
    if exp <= now.saturating_sub(skew) {
        return Err(AppError::unauthorized("Token is expired"));
    }

    let iat = claims
        .iat
        .ok_or_else(|| AppError::unauthorized("Token missing `iat` claim"))?;
    if iat > now.saturating_add(skew) {
        return Err(AppError::unauthorized("Token `iat` is in the future"));
    }

    if claims.nbf.is_some_and(|nbf| nbf > now.saturating_add(skew)) {
        return Err(AppError::unauthorized("Token is not yet valid"));
    }

    Ok(())
}

async fn fetch_jwks(
    client: &reqwest::Client,
    jwks_url: &str,
) -> Result<HashMap<String, DecodingKey>, AppError> {
    let response = client
        .get(jwks_url)
        .header("Accept", "application/json")
        .send()
        .await
        .map_err(|error| {
            AppError::external(format!("JWKS request failed: {}", sanitize(&error)))
        })?;

    if !response.status().is_success() {
        return Err(AppError::external(format!(
            "JWKS request failed with HTTP {}",
            response.status().as_u16()
        )));
    }

    let payload = response.json::<JwksDocument>().await.map_err(|error| {
        AppError::external(format!("JWKS JSON parse failed: {}", sanitize(&error)))
    })?;

    let keys = decoding_keys(payload)?;
    if keys.is_empty() {
        return Err(AppError::external(
            "JWKS did not include any usable RSA signing keys",
        ));
    }
    Ok(keys)
}

fn decoding_keys(document: JwksDocument) -> Result<HashMap<String, DecodingKey>, AppError> {
    let mut out = HashMap::new();
    for key in document.keys {
        if key.kty.as_deref() != Some("RSA") || key.usage.as_deref().is_some_and(|u| u != "sig") {
            continue;
        }
        let (Some(kid), Some(n), Some(e)) = (key.kid, key.n, key.e) else {
            continue;
        };
        let decoding = DecodingKey::from_rsa_components(&n, &e).map_err(|error| {
            AppError::external(format!("Invalid JWKS RSA key: {}", sanitize(&error)))
        })?;
        out.insert(kid, decoding);
    }
    Ok(out)
}

fn audience_matches(aud: Option<&Value>, expected: &str) -> bool {
    match aud {
        Some(Value::String(value)) => value == expected,
        Some(Value::Array(values)) => values
            .iter()
            .filter_map(Value::as_str)
            .any(|value| value == expected),
        _ => false,
    }
}

fn sanitize(error: &impl std::fmt::Display) -> String {
    error.to_string().replace('\n', " ").trim().to_string()
}

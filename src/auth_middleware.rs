use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
    RequestPartsExt,
};
use axum_extra::TypedHeader;
use cached::{Cached, TimedSizedCache};
use headers::{authorization::Bearer, Authorization};
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::{config::AuthSettings, error::AppError, AppState};

const SESSION_CACHE_SIZE: usize = 4096;
const SESSION_CACHE_TTL_SECS: u64 = 300;

// --- Claims ---

/// Claims of the backend's session token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub email: Option<String>,
    pub exp: usize,
    pub iss: Option<String>,
}

impl Claims {
    pub fn email(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.sub)
    }
}

// --- Session cache ---

// Token -> email for sessions resolved through the backend (when no JWT secret is configured).
static SESSIONS: Lazy<Mutex<TimedSizedCache<String, String>>> = Lazy::new(|| {
    Mutex::new(TimedSizedCache::with_size_and_lifespan(
        SESSION_CACHE_SIZE,
        SESSION_CACHE_TTL_SECS,
    ))
});

fn cached_session(token: &str) -> Option<String> {
    SESSIONS.lock().ok()?.cache_get(token).cloned()
}

fn remember_session(token: &str, email: &str) {
    if let Ok(mut sessions) = SESSIONS.lock() {
        sessions.cache_set(token.to_string(), email.to_string());
    }
}

pub fn forget_session(token: &str) {
    if let Ok(mut sessions) = SESSIONS.lock() {
        sessions.cache_remove(token);
    }
}

// --- Token verification ---

/// Validates an HS256 session token against the configured secret (and issuer, if set).
pub fn verify_token(token: &str, settings: &AuthSettings) -> Result<Claims, AppError> {
    let secret = settings.jwt_secret.as_deref().ok_or_else(|| {
        AppError::InternalServerError(anyhow::anyhow!("JWT secret is not configured"))
    })?;

    let mut validation = Validation::new(Algorithm::HS256);
    if let Some(issuer) = &settings.jwt_issuer {
        validation.set_issuer(&[issuer]);
    }

    let decoded = decode::<Claims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation).map_err(|e| {
        warn!("Token validation failed: {}", e);
        match e.kind() {
            jsonwebtoken::errors::ErrorKind::ExpiredSignature => AppError::unauthorized("Session expired"),
            jsonwebtoken::errors::ErrorKind::InvalidIssuer => AppError::unauthorized("Invalid token issuer"),
            _ => AppError::unauthorized("Invalid token"),
        }
    })?;

    debug!("Token validated for user: {}", decoded.claims.sub);
    Ok(decoded.claims)
}

// Email behind a token: from the JWT when a secret is configured, otherwise from the backend.
async fn resolve_email(token: &str, state: &AppState) -> Result<String, AppError> {
    if state.settings.auth.jwt_secret.is_some() {
        return verify_token(token, &state.settings.auth).map(|claims| claims.email().to_string());
    }
    if let Some(email) = cached_session(token) {
        return Ok(email);
    }
    let user = state.auth.me(token).await.map_err(|e| {
        warn!("Backend rejected session token: {:?}", e);
        AppError::unauthorized("Invalid session")
    })?;
    remember_session(token, &user.email);
    Ok(user.email)
}

// --- Extractors ---

/// Signed-in user. Rejects with 401 and a login URL pointing back at the request.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub email: String,
    pub token: String,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = AppState::from_ref(state);
        let redirect = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        let with_login = |e: AppError| match e {
            AppError::Unauthorized { message, .. } => AppError::Unauthorized {
                message,
                login_url: Some(app_state.auth.login_url(&redirect)),
            },
            other => other,
        };

        let TypedHeader(Authorization(bearer)) = parts
            .extract::<TypedHeader<Authorization<Bearer>>>()
            .await
            .map_err(|e| {
                debug!("No usable Authorization header: {}", e);
                with_login(AppError::unauthorized("Please sign in to continue"))
            })?;

        let token = bearer.token().to_string();
        let email = resolve_email(&token, &app_state).await.map_err(with_login)?;
        Ok(AuthenticatedUser { email, token })
    }
}

/// Optional sign-in for browse routes. A bad or missing token means anonymous.
#[derive(Debug, Clone)]
pub struct MaybeUser(pub Option<AuthenticatedUser>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeUser
where
    S: Send + Sync,
    AppState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match AuthenticatedUser::from_request_parts(parts, state).await {
            Ok(user) => Ok(MaybeUser(Some(user))),
            Err(AppError::Unauthorized { .. }) => Ok(MaybeUser(None)),
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn settings(secret: &str) -> AuthSettings {
        AuthSettings {
            jwt_secret: Some(secret.into()),
            jwt_issuer: Some("carlot".into()),
            login_url: "https://example.com/login".into(),
        }
    }

    fn token(secret: &str, issuer: &str, exp_offset: i64) -> String {
        let claims = Claims {
            sub: "user-1".into(),
            email: Some("buyer@example.com".into()),
            exp: (chrono::Utc::now().timestamp() + exp_offset) as usize,
            iss: Some(issuer.into()),
        };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes())).unwrap()
    }

    #[test]
    fn accepts_valid_token() {
        let claims = verify_token(&token("s3cret", "carlot", 3600), &settings("s3cret")).unwrap();
        assert_eq!(claims.email(), "buyer@example.com");
    }

    #[test]
    fn rejects_wrong_secret_issuer_and_expiry() {
        for bad in [
            token("other", "carlot", 3600),
            token("s3cret", "someone-else", 3600),
            token("s3cret", "carlot", -3600),
            "not-a-jwt".to_string(),
        ] {
            assert!(matches!(
                verify_token(&bad, &settings("s3cret")),
                Err(AppError::Unauthorized { .. })
            ));
        }
    }

    #[test]
    fn session_cache_round_trip() {
        remember_session("cache-test-token", "a@example.com");
        assert_eq!(cached_session("cache-test-token").as_deref(), Some("a@example.com"));
        forget_session("cache-test-token");
        assert!(cached_session("cache-test-token").is_none());
    }
}

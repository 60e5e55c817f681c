use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    extract::{FromRef, FromRequestParts},
    http::{HeaderMap, StatusCode, header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    config::AppConfig,
    error::{AppError, AuthErrorCode},
    i18n::cookie_value,
    models::{User, UserProfile},
    repository::RepositoryState,
    session::{SessionState, resolve_session},
};

/// Name of the cookie carrying the access token for browser navigations.
pub const SESSION_COOKIE: &str = "session";

/// Role given to profiles that do not carry one.
pub const DEFAULT_ROLE: &str = "user";

/// Claims
///
/// Payload of the access token issued by the auth provider. Validated on every request
/// that needs a session.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the user id, also the primary key of the `users` profile.
    pub sub: Uuid,
    pub exp: usize,
    pub iat: usize,
    pub aud: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// AuthUser
///
/// The resolved identity of an authenticated request: token subject plus the fields of
/// the user's profile.
#[derive(Debug, Clone, PartialEq)]
pub struct AuthUser {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
}

impl From<User> for AuthUser {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            role: user.role.unwrap_or_else(|| DEFAULT_ROLE.to_string()),
        }
    }
}

impl From<AuthUser> for UserProfile {
    fn from(user: AuthUser) -> Self {
        Self {
            id: user.id,
            email: user.email,
            display_name: user.display_name,
            role: user.role,
        }
    }
}

/// AuthUser Extractor Implementation
///
/// Makes `AuthUser` usable as a handler argument on the JSON API. Reuses the session
/// already resolved by the page guard when present, otherwise resolves it here.
///
/// Rejection: `AppError::NotAuthenticated` (401) for anonymous callers.
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
    RepositoryState: FromRef<S>,
    AppConfig: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        if let Some(SessionState::Authenticated(user)) = parts.extensions.get::<SessionState>() {
            return Ok(user.clone());
        }

        let repo = RepositoryState::from_ref(state);
        let config = AppConfig::from_ref(state);

        match resolve_session(&parts.headers, &repo, &config).await? {
            SessionState::Authenticated(user) => Ok(user),
            _ => Err(AppError::NotAuthenticated),
        }
    }
}

/// session_token
///
/// The access token of a request: `Authorization: Bearer <token>` first, then the
/// `session` cookie.
pub fn session_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .or_else(|| cookie_value(headers, SESSION_COOKIE))
        .filter(|token| !token.is_empty())
}

/// decode_token
///
/// Validates signature, expiry and audience. `None` for any invalid token.
pub fn decode_token(token: &str, config: &AppConfig) -> Option<Claims> {
    let decoding_key = DecodingKey::from_secret(config.jwt_secret.as_bytes());

    let mut validation = Validation::new(Algorithm::HS256);
    validation.validate_exp = true;
    validation.set_audience(&[config.jwt_audience.as_str()]);

    match decode::<Claims>(token, &decoding_key, &validation) {
        Ok(data) => Some(data.claims),
        Err(e) => {
            match e.kind() {
                ErrorKind::ExpiredSignature => tracing::debug!("session token expired"),
                other => tracing::debug!("session token rejected: {:?}", other),
            }
            None
        }
    }
}

/// Set-Cookie value storing the access token.
pub fn session_cookie(token: &str) -> String {
    format!("{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax")
}

/// Set-Cookie value expiring the access token.
pub fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; Max-Age=0; HttpOnly; SameSite=Lax")
}

// --- Auth Provider ---

/// AuthSession
///
/// Result of a successful sign-up or sign-in. `access_token` is `None` when the provider
/// requires email confirmation before issuing a session.
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user_id: Uuid,
    pub email: String,
    pub access_token: Option<String>,
}

/// AuthProvider
///
/// Contract of the hosted authentication service.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AppError>;
    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AppError>;
    async fn sign_out(&self, access_token: &str) -> Result<(), AppError>;
}

/// AuthState
///
/// The concrete type used to share the auth provider across the application state.
pub type AuthState = Arc<dyn AuthProvider>;

/// GoTrueAuthProvider
///
/// `AuthProvider` backed by a GoTrue server (Supabase Auth) over its REST API.
#[derive(Clone)]
pub struct GoTrueAuthProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Deserialize)]
struct GoTrueUser {
    id: Uuid,
    email: Option<String>,
}

#[derive(Deserialize)]
struct GoTrueSession {
    access_token: String,
    user: GoTrueUser,
}

/// `/signup` returns a session when auto-confirm is on, or just the user otherwise.
#[derive(Deserialize)]
#[serde(untagged)]
enum SignUpResponse {
    Session(GoTrueSession),
    User(GoTrueUser),
}

#[derive(Deserialize, Default)]
struct GoTrueError {
    error_code: Option<String>,
    // Legacy OAuth-style error field used by the token endpoint.
    error: Option<String>,
}

impl GoTrueAuthProvider {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        }
    }

    async fn post_credentials(
        &self,
        path: &str,
        email: &str,
        password: &str,
    ) -> Result<reqwest::Response, AppError> {
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .header("apikey", &self.api_key)
            .json(&serde_json::json!({ "email": email, "password": password }))
            .send()
            .await
            .map_err(|e| AppError::AuthProvider(e.to_string()))?;

        if response.status().is_success() {
            Ok(response)
        } else {
            Err(rejection(response).await)
        }
    }
}

/// Maps a non-success provider response to `AppError::Auth`.
async fn rejection(response: reqwest::Response) -> AppError {
    let status = response.status();
    let body: GoTrueError = response.json().await.unwrap_or_default();

    let code = if status == StatusCode::TOO_MANY_REQUESTS {
        AuthErrorCode::TooManyRequests
    } else {
        body.error_code
            .or(body.error)
            .map(|code| AuthErrorCode::from_provider_code(&code))
            .unwrap_or(AuthErrorCode::Unknown)
    };
    tracing::info!(%status, code = code.code(), "auth provider rejected request");
    AppError::Auth(code)
}

#[async_trait]
impl AuthProvider for GoTrueAuthProvider {
    async fn sign_up(&self, email: &str, password: &str) -> Result<AuthSession, AppError> {
        let response = self.post_credentials("/auth/v1/signup", email, password).await?;
        let body = response
            .json::<SignUpResponse>()
            .await
            .map_err(|e| AppError::AuthProvider(e.to_string()))?;

        let (user, access_token) = match body {
            SignUpResponse::Session(session) => (session.user, Some(session.access_token)),
            SignUpResponse::User(user) => (user, None),
        };
        Ok(AuthSession {
            user_id: user.id,
            email: user.email.unwrap_or_else(|| email.to_string()),
            access_token,
        })
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<AuthSession, AppError> {
        let response = self
            .post_credentials("/auth/v1/token?grant_type=password", email, password)
            .await?;
        let session = response
            .json::<GoTrueSession>()
            .await
            .map_err(|e| AppError::AuthProvider(e.to_string()))?;

        Ok(AuthSession {
            user_id: session.user.id,
            email: session.user.email.unwrap_or_else(|| email.to_string()),
            access_token: Some(session.access_token),
        })
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        let response = self
            .client
            .post(format!("{}/auth/v1/logout", self.base_url))
            .header("apikey", &self.api_key)
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| AppError::AuthProvider(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }
}

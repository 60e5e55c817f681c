use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use uuid::Uuid;

use crate::{
    AppState,
    auth::{AuthUser, decode_token, session_token},
    config::{AppConfig, Env},
    error::AppError,
    i18n::Locale,
    repository::RepositoryState,
};

pub const SIGNIN_ROUTE: &str = "/signin";
pub const REGISTER_ROUTE: &str = "/register";
pub const LANDING_ROUTE: &str = "/generalmap";

/// SessionState
///
/// Authentication state of a navigation. Every request starts `Unresolved` and is
/// resolved exactly once by `resolve_session`.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum SessionState {
    #[default]
    Unresolved,
    Authenticated(AuthUser),
    Anonymous,
}

impl SessionState {
    pub fn user(&self) -> Option<&AuthUser> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.user().is_some()
    }

    /// The signed-in user, or `NotAuthenticated`.
    pub fn require_user(&self) -> Result<&AuthUser, AppError> {
        self.user().ok_or(AppError::NotAuthenticated)
    }
}

/// RouteAccess
///
/// Access rule attached to a page route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    /// Only enterable once authenticated.
    RequiresAuth,
    /// Only enterable while not authenticated.
    GuestOnly,
    Open,
}

impl RouteAccess {
    /// Access rule of a page path.
    pub fn for_path(path: &str) -> Self {
        match path {
            SIGNIN_ROUTE | REGISTER_ROUTE => RouteAccess::GuestOnly,
            LANDING_ROUTE | "/generalmap/more" => RouteAccess::RequiresAuth,
            p if p.starts_with("/landmark/") => RouteAccess::RequiresAuth,
            _ => RouteAccess::Open,
        }
    }
}

/// Navigation
///
/// Outcome of the guard for one navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Navigation {
    Proceed,
    Redirect(&'static str),
}

/// navigate
///
/// Guard transition rules: a protected page needs `Authenticated` and otherwise sends the
/// user to sign-in; a guest-only page sends an authenticated user to the landing page.
pub fn navigate(state: &SessionState, access: RouteAccess) -> Navigation {
    match (access, state.is_authenticated()) {
        (RouteAccess::RequiresAuth, false) => Navigation::Redirect(SIGNIN_ROUTE),
        (RouteAccess::GuestOnly, true) => Navigation::Redirect(LANDING_ROUTE),
        _ => Navigation::Proceed,
    }
}

/// resolve_session
///
/// One-shot session resolution, bounded by `config.session_timeout`. A slow backend yields
/// `AppError::SessionTimeout` instead of holding the navigation forever.
pub async fn resolve_session(
    headers: &HeaderMap,
    repo: &RepositoryState,
    config: &AppConfig,
) -> Result<SessionState, AppError> {
    match tokio::time::timeout(config.session_timeout, resolve(headers, repo, config)).await {
        Ok(resolved) => resolved,
        Err(_) => {
            tracing::warn!(
                timeout_ms = config.session_timeout.as_millis() as u64,
                "session resolution timed out"
            );
            Err(AppError::SessionTimeout)
        }
    }
}

async fn resolve(
    headers: &HeaderMap,
    repo: &RepositoryState,
    config: &AppConfig,
) -> Result<SessionState, AppError> {
    // Local development bypass: a known profile id in `x-user-id` stands in for a token.
    if config.env == Env::Local {
        let bypass_id = headers
            .get("x-user-id")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| Uuid::parse_str(value).ok());
        if let Some(user_id) = bypass_id {
            if let Some(user) = repo.get_user(user_id).await? {
                return Ok(SessionState::Authenticated(user.into()));
            }
        }
    }

    let Some(claims) = session_token(headers).and_then(|token| decode_token(token, config)) else {
        return Ok(SessionState::Anonymous);
    };

    // A valid token without a profile is treated as signed out.
    Ok(match repo.get_user(claims.sub).await? {
        Some(user) => SessionState::Authenticated(user.into()),
        None => SessionState::Anonymous,
    })
}

/// session_guard
///
/// Middleware for page routes. Resolves the session, applies `navigate` for the requested
/// path and either redirects or hands the resolved `SessionState` to the handler through
/// the request extensions.
pub async fn session_guard(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let access = RouteAccess::for_path(request.uri().path());
    let locale = Locale::from_headers(request.headers());

    let session = match resolve_session(request.headers(), &state.repo, &state.config).await {
        Ok(session) => session,
        Err(e) => return e.localize(locale).into_response(),
    };

    match navigate(&session, access) {
        Navigation::Proceed => {
            request.extensions_mut().insert(session);
            next.run(request).await
        }
        Navigation::Redirect(to) => {
            tracing::debug!(from = %request.uri(), to, "session guard redirect");
            Redirect::to(to).into_response()
        }
    }
}

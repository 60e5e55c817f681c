use crate::{AppState, handlers};
use axum::{
    Router,
    routing::{get, post},
};

/// Public Router Module
///
/// Endpoints reachable without a session: the gateway into the identity flow and the
/// language preference.
pub fn public_routes() -> Router<AppState> {
    Router::new()
        // GET /health
        // Liveness check for load balancers.
        .route("/health", get(|| async { "ok" }))
        // POST /register
        // Account creation with the auth provider plus the mirrored profile.
        .route("/register", post(handlers::register_user))
        // POST /signin
        // Email/password sign-in. Sets the `session` cookie.
        .route("/signin", post(handlers::sign_in))
        // GET/PUT /locale
        // Reads or stores the interface language kept in the `locale` cookie.
        .route("/locale", get(handlers::get_locale).put(handlers::set_locale))
}

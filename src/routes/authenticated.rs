use crate::{AppState, handlers};
use axum::{
    Router,
    extract::DefaultBodyLimit,
    routing::{get, post},
};

/// Upper bound of a landmark submission body (all photos together).
pub const MAX_SUBMISSION_BYTES: usize = 25 * 1024 * 1024;

/// Authenticated Router Module
///
/// JSON API for signed-in users. Every handler takes the `AuthUser` extractor, and the
/// router is additionally wrapped in the auth middleware in `create_router`.
pub fn authenticated_routes() -> Router<AppState> {
    Router::<AppState>::new()
        // POST /signout
        // Revokes the session and drops the user's cached map state.
        .route("/signout", post(handlers::sign_out))
        // GET /me
        // The signed-in user's profile.
        .route("/me", get(handlers::get_me))
        // GET /landmarks?mine=&cursor=
        // Paginated listing, newest first.
        // POST /landmarks
        // Multipart submission with photos. Gets a larger body limit than the default.
        .route(
            "/landmarks",
            get(handlers::list_landmarks)
                .post(handlers::create_landmark)
                .layer(DefaultBodyLimit::max(MAX_SUBMISSION_BYTES)),
        )
        // GET /landmarks/top
        // The ten best-scoring landmarks of the newest page.
        .route("/landmarks/top", get(handlers::get_top_landmarks))
        // GET /landmarks/{id}
        .route("/landmarks/{id}", get(handlers::get_landmark))
        // POST /landmarks/{id}/rating
        // Read-modify-write of the caller's rating.
        .route("/landmarks/{id}/rating", post(handlers::rate_landmark))
}

use axum::{
    extract::{FromRef, Request},
    http::HeaderName,
    Router,
    middleware::{self, Next},
    response::Response,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::{DefaultOnResponse, TraceLayer},
};
use tracing::{Level, Span};

// --- Module Structure ---

// Core application services and components.
pub mod auth;
pub mod config;
pub mod error;
pub mod handlers;
pub mod i18n;
pub mod landmarks;
pub mod models;
pub mod pages;
pub mod repository;
pub mod score;
pub mod session;
pub mod storage;
pub mod store;

// Routing segregated by access rule (Public, Authenticated, Pages).
pub mod routes;
use routes::{authenticated, pages as page_routes, public};
use auth::AuthUser;

// --- Public Re-exports ---

pub use auth::{AuthState, GoTrueAuthProvider};
pub use config::AppConfig;
pub use error::AppError;
pub use repository::{PostgresRepository, RepositoryState};
pub use storage::{MockStorageService, S3StorageClient, StorageState};
pub use store::StoreRegistry;

/// ApiDoc
///
/// OpenAPI document of the JSON API, served at `/api-docs/openapi.json`.
#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::register_user, handlers::sign_in, handlers::sign_out, handlers::get_me,
        handlers::list_landmarks, handlers::get_top_landmarks, handlers::get_landmark,
        handlers::create_landmark, handlers::rate_landmark, handlers::get_locale,
        handlers::set_locale
    ),
    components(
        schemas(
            models::Landmark, models::RankedLandmark, models::LandmarkMarker,
            models::LandmarkPage, models::UserProfile, models::SessionResponse,
            models::RegisterUserRequest, models::SignInRequest, models::RateLandmarkRequest,
            models::SetLocaleRequest, models::LocaleResponse, models::LandmarkUpload,
            i18n::Locale, i18n::LocaleInfo, error::ErrorBody,
        )
    ),
    tags(
        (name = "landmark-share", description = "Landmark sharing API")
    )
)]
struct ApiDoc;

/// AppState
///
/// The single, cloneable container of every service a request handler may need. Handlers
/// receive it explicitly through axum's `State`; nothing is process-global.
#[derive(Clone)]
pub struct AppState {
    /// Document store (`users`, `landmarks`).
    pub repo: RepositoryState,
    /// Blob store for landmark photos.
    pub storage: StorageState,
    /// Hosted authentication provider.
    pub auth: AuthState,
    /// Per-user landmark view state.
    pub stores: StoreRegistry,
    /// The loaded, immutable environment configuration.
    pub config: AppConfig,
}

// --- Axum FromRef Extractor Implementations ---

impl FromRef<AppState> for RepositoryState {
    fn from_ref(app_state: &AppState) -> RepositoryState {
        app_state.repo.clone()
    }
}

impl FromRef<AppState> for StorageState {
    fn from_ref(app_state: &AppState) -> StorageState {
        app_state.storage.clone()
    }
}

impl FromRef<AppState> for AuthState {
    fn from_ref(app_state: &AppState) -> AuthState {
        app_state.auth.clone()
    }
}

impl FromRef<AppState> for AppConfig {
    fn from_ref(app_state: &AppState) -> AppConfig {
        app_state.config.clone()
    }
}

/// auth_middleware
///
/// Enforces authentication for the JSON API. Extracting `AuthUser` rejects anonymous
/// callers with a 401 before the handler runs; the resolved session is stored in the
/// request extensions so the handler's own `AuthUser` does not resolve it again.
async fn auth_middleware(
    auth_user: AuthUser,
    mut request: Request,
    next: Next,
) -> Response {
    request
        .extensions_mut()
        .insert(session::SessionState::Authenticated(auth_user));
    next.run(request).await
}

/// create_router
///
/// Assembles the routing structure, applies global and scoped middleware and registers
/// the application state.
pub fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_methods(Any)
        .allow_origin(Any)
        .allow_headers(Any);

    let x_request_id = HeaderName::from_static("x-request-id");

    let base_router = Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .merge(public::public_routes())
        .merge(
            authenticated::authenticated_routes()
                .route_layer(middleware::from_fn_with_state(
                    state.clone(),
                    auth_middleware
                ))
        )
        // Page routes carry their own session guard.
        .merge(page_routes::page_routes(state.clone()))
        .with_state(state);

    base_router
        .layer(
             ServiceBuilder::new()
                 .layer(SetRequestIdLayer::new(
                     x_request_id.clone(),
                     MakeRequestUuid,
                 ))
                 .layer(
                     TraceLayer::new_for_http()
                         .make_span_with(trace_span_logger)
                         .on_response(
                             DefaultOnResponse::new()
                                 .level(Level::INFO)
                                 .latency_unit(tower_http::LatencyUnit::Millis)
                         )
                 )
                 .layer(PropagateRequestIdLayer::new(x_request_id))
        )
        .layer(cors)
}

/// trace_span_logger
///
/// Builds the per-request span, tagging every log line of a request with its
/// `x-request-id`.
fn trace_span_logger(request: &axum::http::Request<axum::body::Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|value| value.to_str().ok())
        .unwrap_or("unknown");

    tracing::info_span!(
        "http_request",
        method = ?request.method(),
        uri = ?request.uri(),
        req_id = %request_id,
    )
}

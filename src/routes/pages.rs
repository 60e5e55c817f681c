use crate::{AppState, pages, session};
use axum::{Router, middleware, routing::get};

/// Page Router Module
///
/// Browser navigations. The whole router sits behind `session_guard`:
/// - `/signin`, `/register`: guest-only, authenticated users go to `/generalmap`.
/// - `/generalmap`, `/generalmap/more`, `/landmark/{id}`: authenticated only, everyone
///   else goes to `/signin`.
pub fn page_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/", get(pages::root))
        .route(session::SIGNIN_ROUTE, get(pages::signin_page))
        .route(session::REGISTER_ROUTE, get(pages::register_page))
        .route(session::LANDING_ROUTE, get(pages::general_map))
        .route("/generalmap/more", get(pages::general_map_more))
        .route("/landmark/{id}", get(pages::landmark_page))
        .route_layer(middleware::from_fn_with_state(state, session::session_guard))
}

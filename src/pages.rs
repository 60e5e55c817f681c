//! Page routes. Every handler here runs behind `session::session_guard`, which has
//! already resolved the session and applied the access rules; handlers read the resolved
//! `SessionState` from the request extensions and return JSON view models.

use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::Redirect,
};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    AppState,
    error::{AppError, LocalizedError},
    i18n::Locale,
    models::{GeneralMapView, GuestPageView, LandmarkDetailView, RankedLandmark},
    score,
    session::{SIGNIN_ROUTE, SessionState},
    store::{LandmarkFilter, LandmarkStore},
};

#[derive(Debug, Default, Deserialize)]
pub struct MapQuery {
    #[serde(default)]
    pub mine: bool,
}

pub async fn root() -> Redirect {
    Redirect::to(SIGNIN_ROUTE)
}

pub async fn signin_page(locale: Locale) -> Json<GuestPageView> {
    Json(GuestPageView {
        page: "signin".to_string(),
        locale,
    })
}

pub async fn register_page(locale: Locale) -> Json<GuestPageView> {
    Json(GuestPageView {
        page: "register".to_string(),
        locale,
    })
}

/// general_map
///
/// The main map. Every visit reloads the first page for the requested `mine` filter, so
/// submissions and ratings from other users show up on the next navigation.
pub async fn general_map(
    State(state): State<AppState>,
    Extension(session): Extension<SessionState>,
    locale: Locale,
    Query(query): Query<MapQuery>,
) -> Result<Json<GeneralMapView>, LocalizedError> {
    let user = session.require_user().map_err(|e| e.localize(locale))?;
    let filter = LandmarkFilter::from_mine(query.mine);

    let store = state
        .stores
        .store_for(user.id, &state.repo, &state.storage, state.config.page_size)
        .await;
    let mut store = store.lock().await;

    store
        .fetch(&session, filter)
        .await
        .map_err(|e| e.localize(locale))?;
    Ok(Json(map_view(&store)))
}

/// general_map_more
///
/// Appends the next page to the map the user is looking at.
pub async fn general_map_more(
    State(state): State<AppState>,
    Extension(session): Extension<SessionState>,
    locale: Locale,
) -> Result<Json<GeneralMapView>, LocalizedError> {
    let user = session.require_user().map_err(|e| e.localize(locale))?;

    let store = state
        .stores
        .store_for(user.id, &state.repo, &state.storage, state.config.page_size)
        .await;
    let mut store = store.lock().await;

    if store.is_loaded() {
        store
            .fetch_more(&session)
            .await
            .map_err(|e| e.localize(locale))?;
    } else {
        let filter = store.filter();
        store
            .fetch(&session, filter)
            .await
            .map_err(|e| e.localize(locale))?;
    }
    Ok(Json(map_view(&store)))
}

/// landmark_page
///
/// Detail page of one landmark. Always read from the repository; a cached copy in the
/// user's map is replaced with the fresh record.
pub async fn landmark_page(
    State(state): State<AppState>,
    Extension(session): Extension<SessionState>,
    locale: Locale,
    Path(id): Path<Uuid>,
) -> Result<Json<LandmarkDetailView>, LocalizedError> {
    let user = session.require_user().map_err(|e| e.localize(locale))?;

    let landmark = state
        .repo
        .get_landmark(id)
        .await
        .map_err(|e| e.localize(locale))?
        .ok_or_else(|| AppError::LandmarkNotFound.localize(locale))?;
    if let Some(store) = state.stores.existing(user.id).await {
        store.lock().await.refresh(&landmark);
    }

    let my_rating = landmark.user_ratings.get(&user.id).copied();
    Ok(Json(LandmarkDetailView {
        landmark: RankedLandmark {
            score: score::landmark_score(&landmark),
            landmark,
        },
        my_rating,
    }))
}

fn map_view(store: &LandmarkStore) -> GeneralMapView {
    GeneralMapView {
        mine: store.filter() == LandmarkFilter::Mine,
        landmarks: store.ranked(),
        top: store.top(score::TOP_LANDMARKS),
        markers: store.markers(),
        has_more: store.has_more(),
    }
}

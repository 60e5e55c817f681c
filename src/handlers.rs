use crate::{
    AppState,
    auth::{AuthUser, DEFAULT_ROLE, clear_session_cookie, session_cookie, session_token},
    error::{AppError, AuthErrorCode, ErrorBody, LocalizedError},
    i18n::Locale,
    landmarks,
    models::{
        Landmark, LandmarkForm, LandmarkPage, LandmarkUpload, LocaleResponse, PhotoUpload,
        RankedLandmark, RateLandmarkRequest, RegisterUserRequest, SessionResponse,
        SetLocaleRequest, SignInRequest, User, UserProfile,
    },
    score,
    session::SessionState,
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State, multipart::Field},
    http::{HeaderMap, StatusCode, header},
    response::{AppendHeaders, IntoResponse},
};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

// --- Query Structs ---

/// LandmarkQuery
///
/// Query parameters of GET /landmarks.
#[derive(Debug, Default, Deserialize, utoipa::IntoParams)]
#[into_params(parameter_in = Query)]
pub struct LandmarkQuery {
    /// Only the caller's own submissions.
    #[serde(default)]
    pub mine: bool,
    /// Id of the last landmark of the previous page.
    pub cursor: Option<Uuid>,
}

// --- Session Handlers ---

/// register_user
///
/// [Public Route] Creates the account with the auth provider, mirrors a profile into
/// `users` with the default role and, when the provider returned a session, signs the
/// caller in by setting the session cookie.
#[utoipa::path(
    post,
    path = "/register",
    request_body = RegisterUserRequest,
    responses(
        (status = 200, description = "Registered", body = SessionResponse),
        (status = 409, description = "Email already registered", body = ErrorBody),
        (status = 400, description = "Rejected by the auth provider", body = ErrorBody)
    )
)]
pub async fn register_user(
    State(state): State<AppState>,
    locale: Locale,
    Json(payload): Json<RegisterUserRequest>,
) -> Result<impl IntoResponse, LocalizedError> {
    let session = state
        .auth
        .sign_up(&payload.email, &payload.password)
        .await
        .map_err(|e| e.localize(locale))?;

    let display_name = Some(payload.display_name).filter(|name| !name.trim().is_empty());
    let user = state
        .repo
        .create_user(User {
            id: session.user_id,
            email: session.email,
            display_name,
            role: Some(DEFAULT_ROLE.to_string()),
            created_at: Utc::now(),
        })
        .await
        .map_err(|e| e.localize(locale))?;

    tracing::info!(user_id = %user.id, "user registered");
    Ok(session_response(user, session.access_token))
}

/// sign_in
///
/// [Public Route] Authenticates with the auth provider and loads the caller's profile.
/// A provider account without a profile is reported as an unknown user.
#[utoipa::path(
    post,
    path = "/signin",
    request_body = SignInRequest,
    responses(
        (status = 200, description = "Signed in", body = SessionResponse),
        (status = 401, description = "Bad credentials", body = ErrorBody)
    )
)]
pub async fn sign_in(
    State(state): State<AppState>,
    locale: Locale,
    Json(payload): Json<SignInRequest>,
) -> Result<impl IntoResponse, LocalizedError> {
    let session = state
        .auth
        .sign_in(&payload.email, &payload.password)
        .await
        .map_err(|e| e.localize(locale))?;

    let user = state
        .repo
        .get_user(session.user_id)
        .await
        .map_err(|e| e.localize(locale))?
        .ok_or_else(|| AppError::Auth(AuthErrorCode::UserNotFound).localize(locale))?;

    tracing::info!(user_id = %user.id, "user signed in");
    Ok(session_response(user, session.access_token))
}

fn session_response(user: User, access_token: Option<String>) -> impl IntoResponse {
    let cookies: Vec<_> = access_token
        .as_deref()
        .map(|token| (header::SET_COOKIE, session_cookie(token)))
        .into_iter()
        .collect();
    let body = SessionResponse {
        user: AuthUser::from(user).into(),
        access_token,
    };
    (AppendHeaders(cookies), Json(body))
}

/// sign_out
///
/// [Authenticated Route] Revokes the session with the auth provider, drops the caller's
/// cached landmark store and expires the session cookie.
#[utoipa::path(
    post,
    path = "/signout",
    responses(
        (status = 204, description = "Signed out"),
        (status = 502, description = "Auth provider failure", body = ErrorBody)
    )
)]
pub async fn sign_out(
    user: AuthUser,
    State(state): State<AppState>,
    locale: Locale,
    headers: HeaderMap,
) -> Result<impl IntoResponse, LocalizedError> {
    if let Some(token) = session_token(&headers) {
        state
            .auth
            .sign_out(token)
            .await
            .map_err(|e| e.localize(locale))?;
    }
    state.stores.remove(user.id).await;

    tracing::info!(user_id = %user.id, "user signed out");
    Ok((
        StatusCode::NO_CONTENT,
        [(header::SET_COOKIE, clear_session_cookie())],
    ))
}

/// get_me
///
/// [Authenticated Route] The signed-in user's profile.
#[utoipa::path(
    get,
    path = "/me",
    responses((status = 200, description = "Profile", body = UserProfile))
)]
pub async fn get_me(user: AuthUser) -> Json<UserProfile> {
    Json(user.into())
}

// --- Landmark Handlers ---

/// list_landmarks
///
/// [Authenticated Route] One page of landmarks, newest first. `mine=true` restricts the
/// page to the caller's submissions; `cursor` continues after a previous page.
#[utoipa::path(
    get,
    path = "/landmarks",
    params(LandmarkQuery),
    responses((status = 200, description = "Landmark page", body = LandmarkPage))
)]
pub async fn list_landmarks(
    user: AuthUser,
    State(state): State<AppState>,
    locale: Locale,
    Query(query): Query<LandmarkQuery>,
) -> Result<Json<LandmarkPage>, LocalizedError> {
    let owner = query.mine.then_some(user.id);
    let page = landmarks::fetch_page(
        state.repo.as_ref(),
        owner,
        query.cursor,
        state.config.page_size,
    )
    .await
    .map_err(|e| e.localize(locale))?;
    Ok(Json(page))
}

/// get_top_landmarks
///
/// [Authenticated Route] The ten best-scoring landmarks of the newest page.
///
/// Only the first `PAGE_SIZE` landmarks by creation time are ranked. The `top` list of
/// `/generalmap` ranks every page loaded into the caller's map, so the two can differ.
#[utoipa::path(
    get,
    path = "/landmarks/top",
    description = "Ranks only the newest page (PAGE_SIZE landmarks, newest first) and \
        returns its ten best-scoring entries. The map page's top list ranks every page \
        loaded into the caller's map instead.",
    responses((status = 200, description = "Top landmarks", body = [RankedLandmark]))
)]
pub async fn get_top_landmarks(
    _user: AuthUser,
    State(state): State<AppState>,
    locale: Locale,
) -> Result<Json<Vec<RankedLandmark>>, LocalizedError> {
    let page = landmarks::fetch_page(state.repo.as_ref(), None, None, state.config.page_size)
        .await
        .map_err(|e| e.localize(locale))?;
    Ok(Json(score::top(&page.items, score::TOP_LANDMARKS)))
}

/// get_landmark
///
/// [Authenticated Route] A single landmark with its score.
#[utoipa::path(
    get,
    path = "/landmarks/{id}",
    params(("id" = Uuid, Path, description = "Landmark ID")),
    responses(
        (status = 200, description = "Found", body = RankedLandmark),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn get_landmark(
    _user: AuthUser,
    State(state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
) -> Result<Json<RankedLandmark>, LocalizedError> {
    let landmark = state
        .repo
        .get_landmark(id)
        .await
        .map_err(|e| e.localize(locale))?
        .ok_or_else(|| AppError::LandmarkNotFound.localize(locale))?;

    Ok(Json(RankedLandmark {
        score: score::landmark_score(&landmark),
        landmark,
    }))
}

/// create_landmark
///
/// [Authenticated Route] Submits a landmark from a multipart form. Photos are uploaded in
/// the order they appear in the body; the created record is also prepended to the
/// caller's cached map list.
#[utoipa::path(
    post,
    path = "/landmarks",
    request_body(content = LandmarkUpload, content_type = "multipart/form-data"),
    responses(
        (status = 201, description = "Created", body = Landmark),
        (status = 400, description = "Invalid form", body = ErrorBody),
        (status = 502, description = "Photo upload failed", body = ErrorBody)
    )
)]
pub async fn create_landmark(
    user: AuthUser,
    State(state): State<AppState>,
    locale: Locale,
    multipart: Multipart,
) -> Result<impl IntoResponse, LocalizedError> {
    let form = read_landmark_form(multipart)
        .await
        .map_err(|e| e.localize(locale))?;

    let store = state
        .stores
        .store_for(user.id, &state.repo, &state.storage, state.config.page_size)
        .await;
    let landmark = store
        .lock()
        .await
        .submit(&SessionState::Authenticated(user), form)
        .await
        .map_err(|e| e.localize(locale))?;

    Ok((StatusCode::CREATED, Json(landmark)))
}

/// rate_landmark
///
/// [Authenticated Route] Records the caller's rating (1-5), replacing any earlier rating
/// of theirs, and returns the updated landmark.
#[utoipa::path(
    post,
    path = "/landmarks/{id}/rating",
    params(("id" = Uuid, Path, description = "Landmark ID")),
    request_body = RateLandmarkRequest,
    responses(
        (status = 200, description = "Rated", body = Landmark),
        (status = 400, description = "Rating out of range", body = ErrorBody),
        (status = 404, description = "Not Found", body = ErrorBody)
    )
)]
pub async fn rate_landmark(
    user: AuthUser,
    State(state): State<AppState>,
    locale: Locale,
    Path(id): Path<Uuid>,
    Json(payload): Json<RateLandmarkRequest>,
) -> Result<Json<Landmark>, LocalizedError> {
    let store = state
        .stores
        .store_for(user.id, &state.repo, &state.storage, state.config.page_size)
        .await;
    let landmark = store
        .lock()
        .await
        .rate(&SessionState::Authenticated(user), id, payload.rating)
        .await
        .map_err(|e| e.localize(locale))?;

    Ok(Json(landmark))
}

// --- Locale Handlers ---

/// get_locale
///
/// [Public Route] The caller's interface language and the supported languages.
#[utoipa::path(
    get,
    path = "/locale",
    responses((status = 200, description = "Locale", body = LocaleResponse))
)]
pub async fn get_locale(locale: Locale) -> Json<LocaleResponse> {
    Json(LocaleResponse {
        current: locale,
        supported: Locale::supported(),
    })
}

/// set_locale
///
/// [Public Route] Persists the chosen interface language in the `locale` cookie.
#[utoipa::path(
    put,
    path = "/locale",
    request_body = SetLocaleRequest,
    responses((status = 200, description = "Locale stored", body = LocaleResponse))
)]
pub async fn set_locale(Json(payload): Json<SetLocaleRequest>) -> impl IntoResponse {
    (
        [(header::SET_COOKIE, payload.locale.cookie())],
        Json(LocaleResponse {
            current: payload.locale,
            supported: Locale::supported(),
        }),
    )
}

// --- Multipart Parsing ---

/// read_landmark_form
///
/// Reads the landmark submission fields. `photos` may repeat and keeps body order;
/// unknown fields are ignored.
pub async fn read_landmark_form(mut multipart: Multipart) -> Result<LandmarkForm, AppError> {
    let mut name = None;
    let mut description = String::new();
    let mut latitude = None;
    let mut longitude = None;
    let mut user_rating = None;
    let mut photos = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::MalformedPayload(e.to_string()))?
    {
        let field_name = field.name().unwrap_or_default().to_string();
        match field_name.as_str() {
            "photos" => {
                let filename = field.file_name().unwrap_or("photo").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::MalformedPayload(e.to_string()))?;
                photos.push(PhotoUpload {
                    filename,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            "name" => name = Some(text(field).await?),
            "description" => description = text(field).await?,
            "latitude" => latitude = Some(number(field).await?),
            "longitude" => longitude = Some(number(field).await?),
            "userRating" => user_rating = Some(number::<i32>(field).await?),
            _ => {}
        }
    }

    let missing = |field: &str| AppError::MalformedPayload(format!("missing field `{field}`"));
    Ok(LandmarkForm {
        name: name.filter(|n| !n.trim().is_empty()).ok_or_else(|| missing("name"))?,
        description,
        latitude: latitude.ok_or_else(|| missing("latitude"))?,
        longitude: longitude.ok_or_else(|| missing("longitude"))?,
        user_rating: user_rating.ok_or_else(|| missing("userRating"))?,
        photos,
    })
}

async fn text(field: Field<'_>) -> Result<String, AppError> {
    field
        .text()
        .await
        .map_err(|e| AppError::MalformedPayload(e.to_string()))
}

async fn number<T>(field: Field<'_>) -> Result<T, AppError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let field_name = field.name().unwrap_or_default().to_string();
    let raw = text(field).await?;
    raw.trim()
        .parse()
        .map_err(|e| AppError::MalformedPayload(format!("`{field_name}`: {e}")))
}

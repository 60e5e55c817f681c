use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use ts_rs::TS;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::i18n::{Locale, LocaleInfo};

// --- Core Application Schemas (Mapped to Database) ---

/// User
///
/// The profile record stored in the `users` table, keyed by the auth provider's user id.
/// `role` stays optional because profiles created outside registration may lack it.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct User {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: Option<String>,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
}

/// Landmark
///
/// A submitted landmark from the `landmarks` table.
///
/// `average_rating` is the mean of `user_ratings` rounded to two decimals and
/// `visit_count` never drops below the number of raters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, FromRow, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct Landmark {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_by: Uuid,
    #[ts(type = "string")]
    pub created_at: DateTime<Utc>,
    pub average_rating: f64,
    pub visit_count: i32,
    pub photos: Vec<String>,
    // Stored as JSONB: user id -> rating. One entry per user, last write wins.
    #[sqlx(json)]
    #[ts(type = "Record<string, number>")]
    #[schema(value_type = Object)]
    pub user_ratings: BTreeMap<Uuid, i32>,
}

/// NewLandmark
///
/// Insert payload assembled by the submission flow once all photos are uploaded.
#[derive(Debug, Clone)]
pub struct NewLandmark {
    pub name: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub created_by: Uuid,
    pub created_at: DateTime<Utc>,
    pub average_rating: f64,
    pub visit_count: i32,
    pub photos: Vec<String>,
    pub user_ratings: BTreeMap<Uuid, i32>,
}

/// RatingUpdate
///
/// The three fields rewritten by a rating.
#[derive(Debug, Clone, PartialEq)]
pub struct RatingUpdate {
    pub average_rating: f64,
    pub visit_count: i32,
    pub user_ratings: BTreeMap<Uuid, i32>,
}

// --- View Models (Output) ---

/// RankedLandmark
///
/// A landmark with its popularity score attached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RankedLandmark {
    #[serde(flatten)]
    pub landmark: Landmark,
    pub score: f64,
}

/// LandmarkMarker
///
/// The reduced form of a landmark used to place a pin on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LandmarkMarker {
    pub id: Uuid,
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    pub average_rating: f64,
}

impl From<&Landmark> for LandmarkMarker {
    fn from(landmark: &Landmark) -> Self {
        Self {
            id: landmark.id,
            name: landmark.name.clone(),
            latitude: landmark.latitude,
            longitude: landmark.longitude,
            average_rating: landmark.average_rating,
        }
    }
}

/// LandmarkPage
///
/// One page of landmarks, newest first. `next_cursor` is the id of the last item.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LandmarkPage {
    pub items: Vec<Landmark>,
    pub next_cursor: Option<Uuid>,
    pub has_more: bool,
}

/// UserProfile
///
/// Output schema for the signed-in user (GET /me, register, sign-in).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS, ToSchema, Default)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct UserProfile {
    pub id: Uuid,
    pub email: String,
    pub display_name: Option<String>,
    pub role: String,
}

/// SessionResponse
///
/// Returned by register and sign-in. `access_token` is absent when the provider requires
/// email confirmation before issuing a session.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct SessionResponse {
    pub user: UserProfile,
    pub access_token: Option<String>,
}

/// GeneralMapView
///
/// Payload of the `/generalmap` page: the cached list ranked by score, the top ten and
/// the map markers.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct GeneralMapView {
    pub mine: bool,
    pub landmarks: Vec<RankedLandmark>,
    pub top: Vec<RankedLandmark>,
    pub markers: Vec<LandmarkMarker>,
    pub has_more: bool,
}

/// LandmarkDetailView
///
/// Payload of the `/landmark/{id}` page.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct LandmarkDetailView {
    pub landmark: RankedLandmark,
    pub my_rating: Option<i32>,
}

/// GuestPageView
///
/// Payload of the guest-only pages (`/signin`, `/register`).
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct GuestPageView {
    pub page: String,
    pub locale: Locale,
}

/// LocaleResponse
#[derive(Debug, Clone, Serialize, TS, ToSchema)]
#[ts(export)]
pub struct LocaleResponse {
    pub current: Locale,
    pub supported: Vec<LocaleInfo>,
}

// --- Request Payloads (Input Schemas) ---

/// RegisterUserRequest
///
/// Input payload for POST /register. The password is forwarded to the auth provider and
/// never stored or logged here.
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct RegisterUserRequest {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

/// SignInRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SignInRequest {
    pub email: String,
    pub password: String,
}

/// RateLandmarkRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct RateLandmarkRequest {
    #[schema(example = 5)]
    pub rating: i32,
}

/// SetLocaleRequest
#[derive(Debug, Clone, Serialize, Deserialize, TS, ToSchema)]
#[ts(export)]
pub struct SetLocaleRequest {
    pub locale: Locale,
}

/// PhotoUpload
///
/// One file of a landmark submission, read from the multipart body.
#[derive(Debug, Clone, Default)]
pub struct PhotoUpload {
    pub filename: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// LandmarkForm
///
/// A parsed landmark submission. Photos keep their upload order.
#[derive(Debug, Clone, Default)]
pub struct LandmarkForm {
    pub name: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    pub user_rating: i32,
    pub photos: Vec<PhotoUpload>,
}

/// LandmarkUpload
///
/// Documentation schema of the multipart body accepted by POST /landmarks.
#[derive(Debug, ToSchema)]
#[schema(rename_all = "camelCase")]
#[allow(dead_code)]
pub struct LandmarkUpload {
    pub name: String,
    pub description: String,
    pub latitude: f64,
    pub longitude: f64,
    #[schema(example = 4)]
    pub user_rating: i32,
    #[schema(value_type = Vec<String>)]
    pub photos: Vec<Vec<u8>>,
}

use std::collections::BTreeMap;

use chrono::Utc;
use uuid::Uuid;

use crate::{
    auth::AuthUser,
    error::AppError,
    models::{Landmark, LandmarkForm, LandmarkPage, NewLandmark, RatingUpdate},
    repository::Repository,
    session::SessionState,
    storage::{StorageService, photo_key},
};

pub const MIN_RATING: i32 = 1;
pub const MAX_RATING: i32 = 5;

pub fn validate_rating(rating: i32) -> Result<i32, AppError> {
    if (MIN_RATING..=MAX_RATING).contains(&rating) {
        Ok(rating)
    } else {
        Err(AppError::InvalidRating(rating))
    }
}

/// Rounds to two decimal places, half away from zero.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// submit
///
/// Creates a landmark for the signed-in caller. Photos are uploaded one at a time in form
/// order before the record is written; an upload or insert failure aborts the submission
/// and leaves earlier uploads in place.
pub async fn submit(
    repo: &dyn Repository,
    storage: &dyn StorageService,
    session: &SessionState,
    form: LandmarkForm,
) -> Result<Landmark, AppError> {
    let user = session.require_user()?;
    let rating = validate_rating(form.user_rating)?;

    let mut photos = Vec::with_capacity(form.photos.len());
    for photo in form.photos {
        let key = photo_key(Utc::now().timestamp_millis(), &photo.filename);
        let url = storage
            .upload(&key, &photo.content_type, photo.bytes)
            .await
            .map_err(|e| {
                tracing::error!(key, "photo upload failed: {}", e);
                AppError::Storage(e)
            })?;
        photos.push(url);
    }

    let landmark = repo
        .insert_landmark(NewLandmark {
            name: form.name,
            description: form.description,
            latitude: form.latitude,
            longitude: form.longitude,
            created_by: user.id,
            created_at: Utc::now(),
            average_rating: f64::from(rating),
            visit_count: 1,
            photos,
            user_ratings: BTreeMap::from([(user.id, rating)]),
        })
        .await?;

    tracing::info!(landmark_id = %landmark.id, user_id = %user.id, "landmark submitted");
    Ok(landmark)
}

/// fetch_page
///
/// One page of landmarks, newest first, starting after `cursor`. `has_more` is set when
/// the page came back full.
pub async fn fetch_page(
    repo: &dyn Repository,
    owner: Option<Uuid>,
    cursor: Option<Uuid>,
    page_size: i64,
) -> Result<LandmarkPage, AppError> {
    let items = repo.list_landmarks(owner, cursor, page_size).await?;
    let has_more = i64::try_from(items.len()).is_ok_and(|len| len == page_size);
    let next_cursor = items.last().map(|landmark| landmark.id);

    Ok(LandmarkPage {
        items,
        next_cursor,
        has_more,
    })
}

/// apply_rating
///
/// Merges `user`'s rating into the landmark's ratings (replacing any earlier one from the
/// same user) and recomputes the derived fields.
pub fn apply_rating(landmark: &Landmark, user: Uuid, rating: i32) -> RatingUpdate {
    let mut user_ratings = landmark.user_ratings.clone();
    user_ratings.insert(user, rating);

    let total: i64 = user_ratings.values().map(|&r| i64::from(r)).sum();
    let average_rating = round2(total as f64 / user_ratings.len() as f64);
    let raters = i32::try_from(user_ratings.len()).unwrap_or(i32::MAX);

    RatingUpdate {
        average_rating,
        visit_count: landmark.visit_count.max(raters),
        user_ratings,
    }
}

/// rate
///
/// Read-modify-write of a landmark's ratings. Not transactional: two raters writing at
/// the same time can overwrite each other's merge.
pub async fn rate(
    repo: &dyn Repository,
    session: &SessionState,
    landmark_id: Uuid,
    rating: i32,
) -> Result<Landmark, AppError> {
    let user: &AuthUser = session.require_user()?;
    let rating = validate_rating(rating)?;

    let current = repo
        .get_landmark(landmark_id)
        .await?
        .ok_or(AppError::LandmarkNotFound)?;

    let update = apply_rating(&current, user.id, rating);
    let updated = repo
        .update_rating(landmark_id, update)
        .await?
        .ok_or(AppError::LandmarkNotFound)?;

    tracing::info!(
        landmark_id = %landmark_id,
        user_id = %user.id,
        average_rating = updated.average_rating,
        visit_count = updated.visit_count,
        "landmark rated"
    );
    Ok(updated)
}

use crate::error::AppError;
use crate::models::{Landmark, NewLandmark, RatingUpdate, User};
use async_trait::async_trait;
use sqlx::{PgPool, types::Json};
use std::sync::Arc;
use uuid::Uuid;

/// Repository Trait
///
/// The document-store contract. Handlers, the landmark store and the session guard only
/// see this trait, so tests can swap the Postgres implementation for an in-memory one.
///
/// Every method propagates backend failures; nothing here retries.
#[async_trait]
pub trait Repository: Send + Sync {
    // --- Profiles ---
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError>;
    // Creates or overwrites the profile keyed by `user.id`.
    async fn create_user(&self, user: User) -> Result<User, AppError>;

    // --- Landmarks ---
    async fn insert_landmark(&self, landmark: NewLandmark) -> Result<Landmark, AppError>;
    async fn get_landmark(&self, id: Uuid) -> Result<Option<Landmark>, AppError>;

    /// Newest first (ties broken by id), at most `limit` rows, optionally restricted to one
    /// creator, starting strictly after the landmark `after`.
    async fn list_landmarks(
        &self,
        owner: Option<Uuid>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Landmark>, AppError>;

    /// Rewrites the rating fields. `None` when the landmark no longer exists.
    async fn update_rating(
        &self,
        id: Uuid,
        update: RatingUpdate,
    ) -> Result<Option<Landmark>, AppError>;
}

/// RepositoryState
///
/// The concrete type used to share the persistence layer access across the application state.
pub type RepositoryState = Arc<dyn Repository>;

const LANDMARK_COLUMNS: &str = "id, name, description, latitude, longitude, created_by, \
     created_at, average_rating, visit_count, photos, user_ratings";

/// PostgresRepository
///
/// The concrete implementation of the `Repository` trait, backed by PostgreSQL.
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Applies the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        let user = sqlx::query_as::<_, User>(
            "SELECT id, email, display_name, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(user)
    }

    async fn create_user(&self, user: User) -> Result<User, AppError> {
        let created = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, email, display_name, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE
                SET email = EXCLUDED.email,
                    display_name = EXCLUDED.display_name,
                    role = EXCLUDED.role
            RETURNING id, email, display_name, role, created_at
            "#,
        )
        .bind(user.id)
        .bind(&user.email)
        .bind(&user.display_name)
        .bind(&user.role)
        .bind(user.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(created)
    }

    async fn insert_landmark(&self, landmark: NewLandmark) -> Result<Landmark, AppError> {
        let sql = format!(
            r#"
            INSERT INTO landmarks
                (name, description, latitude, longitude, created_by, created_at,
                 average_rating, visit_count, photos, user_ratings)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING {LANDMARK_COLUMNS}
            "#
        );
        let inserted = sqlx::query_as::<_, Landmark>(&sql)
            .bind(&landmark.name)
            .bind(&landmark.description)
            .bind(landmark.latitude)
            .bind(landmark.longitude)
            .bind(landmark.created_by)
            .bind(landmark.created_at)
            .bind(landmark.average_rating)
            .bind(landmark.visit_count)
            .bind(&landmark.photos)
            .bind(Json(&landmark.user_ratings))
            .fetch_one(&self.pool)
            .await?;
        Ok(inserted)
    }

    async fn get_landmark(&self, id: Uuid) -> Result<Option<Landmark>, AppError> {
        let sql = format!("SELECT {LANDMARK_COLUMNS} FROM landmarks WHERE id = $1");
        let landmark = sqlx::query_as::<_, Landmark>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(landmark)
    }

    /// list_landmarks
    ///
    /// Keyset pagination on `(created_at, id)`. A cursor that no longer resolves to a row
    /// yields an empty page.
    async fn list_landmarks(
        &self,
        owner: Option<Uuid>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Landmark>, AppError> {
        let sql = format!(
            r#"
            SELECT {LANDMARK_COLUMNS}
            FROM landmarks
            WHERE ($1::uuid IS NULL OR created_by = $1)
              AND ($2::uuid IS NULL
                   OR (created_at, id) < (SELECT c.created_at, c.id FROM landmarks c WHERE c.id = $2))
            ORDER BY created_at DESC, id DESC
            LIMIT $3
            "#
        );
        let landmarks = sqlx::query_as::<_, Landmark>(&sql)
            .bind(owner)
            .bind(after)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::error!("list_landmarks error: {:?}", e);
                e
            })?;
        Ok(landmarks)
    }

    async fn update_rating(
        &self,
        id: Uuid,
        update: RatingUpdate,
    ) -> Result<Option<Landmark>, AppError> {
        let sql = format!(
            r#"
            UPDATE landmarks
            SET average_rating = $2, visit_count = $3, user_ratings = $4
            WHERE id = $1
            RETURNING {LANDMARK_COLUMNS}
            "#
        );
        let updated = sqlx::query_as::<_, Landmark>(&sql)
            .bind(id)
            .bind(update.average_rating)
            .bind(update.visit_count)
            .bind(Json(&update.user_ratings))
            .fetch_optional(&self.pool)
            .await?;
        Ok(updated)
    }
}

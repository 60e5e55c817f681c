#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, http::Response};
use chrono::{Duration as ChronoDuration, Utc};
use jsonwebtoken::{EncodingKey, Header, encode};
use landmark_share::{
    AppState, MockStorageService, StoreRegistry,
    auth::{AuthProvider, AuthSession, AuthState, Claims},
    config::{AppConfig, Env},
    error::{AppError, AuthErrorCode},
    models::{Landmark, NewLandmark, RatingUpdate, User},
    repository::{Repository, RepositoryState},
    storage::StorageState,
};
use serde::de::DeserializeOwned;
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex},
    time::{Duration, SystemTime},
};
use uuid::Uuid;

// --- In-Memory Repository ---

/// Document store double. Keeps rows in memory and mirrors the ordering and cursor rules of
/// the Postgres implementation.
#[derive(Default)]
pub struct InMemoryRepository {
    pub users: Mutex<HashMap<Uuid, User>>,
    pub landmarks: Mutex<Vec<Landmark>>,
    // Every insert fails with a database error.
    pub fail_inserts: bool,
    // Every profile lookup sleeps this long first.
    pub user_lookup_delay: Option<Duration>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(self, user: User) -> Self {
        self.users.lock().unwrap().insert(user.id, user);
        self
    }

    pub fn with_landmarks(self, landmarks: Vec<Landmark>) -> Self {
        self.landmarks.lock().unwrap().extend(landmarks);
        self
    }

    pub fn stored_landmarks(&self) -> Vec<Landmark> {
        self.landmarks.lock().unwrap().clone()
    }

    pub fn stored_user(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().get(&id).cloned()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn get_user(&self, id: Uuid) -> Result<Option<User>, AppError> {
        if let Some(delay) = self.user_lookup_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.users.lock().unwrap().get(&id).cloned())
    }

    async fn create_user(&self, user: User) -> Result<User, AppError> {
        self.users.lock().unwrap().insert(user.id, user.clone());
        Ok(user)
    }

    async fn insert_landmark(&self, landmark: NewLandmark) -> Result<Landmark, AppError> {
        if self.fail_inserts {
            return Err(AppError::Database(sqlx::Error::PoolTimedOut));
        }
        let created = Landmark {
            id: Uuid::new_v4(),
            name: landmark.name,
            description: landmark.description,
            latitude: landmark.latitude,
            longitude: landmark.longitude,
            created_by: landmark.created_by,
            created_at: landmark.created_at,
            average_rating: landmark.average_rating,
            visit_count: landmark.visit_count,
            photos: landmark.photos,
            user_ratings: landmark.user_ratings,
        };
        self.landmarks.lock().unwrap().push(created.clone());
        Ok(created)
    }

    async fn get_landmark(&self, id: Uuid) -> Result<Option<Landmark>, AppError> {
        Ok(self
            .landmarks
            .lock()
            .unwrap()
            .iter()
            .find(|landmark| landmark.id == id)
            .cloned())
    }

    async fn list_landmarks(
        &self,
        owner: Option<Uuid>,
        after: Option<Uuid>,
        limit: i64,
    ) -> Result<Vec<Landmark>, AppError> {
        let mut rows: Vec<Landmark> = self
            .landmarks
            .lock()
            .unwrap()
            .iter()
            .filter(|landmark| owner.is_none_or(|owner| landmark.created_by == owner))
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));

        let start = match after {
            None => 0,
            Some(cursor) => match rows.iter().position(|landmark| landmark.id == cursor) {
                Some(index) => index + 1,
                None => return Ok(Vec::new()),
            },
        };
        Ok(rows
            .into_iter()
            .skip(start)
            .take(usize::try_from(limit).unwrap_or(0))
            .collect())
    }

    async fn update_rating(
        &self,
        id: Uuid,
        update: RatingUpdate,
    ) -> Result<Option<Landmark>, AppError> {
        let mut landmarks = self.landmarks.lock().unwrap();
        Ok(landmarks
            .iter_mut()
            .find(|landmark| landmark.id == id)
            .map(|landmark| {
                landmark.average_rating = update.average_rating;
                landmark.visit_count = update.visit_count;
                landmark.user_ratings = update.user_ratings;
                landmark.clone()
            }))
    }
}

// --- Auth Provider Double ---

/// Auth provider double with canned outcomes. Records every revoked token.
pub struct StubAuthProvider {
    pub sign_up_result: Result<AuthSession, AuthErrorCode>,
    pub sign_in_result: Result<AuthSession, AuthErrorCode>,
    pub signed_out: Mutex<Vec<String>>,
}

impl StubAuthProvider {
    /// Every call succeeds for `user_id` and issues a valid token.
    pub fn accepting(user_id: Uuid, email: &str) -> Self {
        let session = AuthSession {
            user_id,
            email: email.to_string(),
            access_token: Some(token_for(user_id)),
        };
        Self {
            sign_up_result: Ok(session.clone()),
            sign_in_result: Ok(session),
            signed_out: Mutex::new(Vec::new()),
        }
    }

    /// Every call fails with `code`.
    pub fn rejecting(code: AuthErrorCode) -> Self {
        Self {
            sign_up_result: Err(code),
            sign_in_result: Err(code),
            signed_out: Mutex::new(Vec::new()),
        }
    }

    pub fn revoked_tokens(&self) -> Vec<String> {
        self.signed_out.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuthProvider for StubAuthProvider {
    async fn sign_up(&self, _email: &str, _password: &str) -> Result<AuthSession, AppError> {
        self.sign_up_result.clone().map_err(AppError::Auth)
    }

    async fn sign_in(&self, _email: &str, _password: &str) -> Result<AuthSession, AppError> {
        self.sign_in_result.clone().map_err(AppError::Auth)
    }

    async fn sign_out(&self, access_token: &str) -> Result<(), AppError> {
        self.signed_out
            .lock()
            .unwrap()
            .push(access_token.to_string());
        Ok(())
    }
}

// --- State & Token Utilities ---

pub const PAGE_SIZE: i64 = 3;

/// Test configuration. Production mode so the local `x-user-id` bypass is off.
pub fn test_config() -> AppConfig {
    AppConfig {
        env: Env::Production,
        page_size: PAGE_SIZE,
        ..AppConfig::default()
    }
}

pub fn test_state(
    repo: Arc<InMemoryRepository>,
    storage: MockStorageService,
    auth: Arc<StubAuthProvider>,
) -> AppState {
    AppState {
        repo: repo as RepositoryState,
        storage: Arc::new(storage) as StorageState,
        auth: auth as AuthState,
        stores: StoreRegistry::default(),
        config: test_config(),
    }
}

/// A session token accepted by `test_config()`, valid for an hour.
pub fn token_for(user_id: Uuid) -> String {
    signed_token(user_id, 3600)
}

/// A session token expiring `offset_secs` from now (negative for already expired).
pub fn signed_token(user_id: Uuid, offset_secs: i64) -> String {
    let now = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;
    let claims = Claims {
        sub: user_id,
        iat: now as usize,
        exp: (now + offset_secs) as usize,
        aud: "authenticated".to_string(),
        email: None,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(AppConfig::default().jwt_secret.as_bytes()),
    )
    .unwrap()
}

// --- Fixtures ---

pub fn user(id: Uuid, email: &str) -> User {
    User {
        id,
        email: email.to_string(),
        display_name: Some("Tester".to_string()),
        role: None,
        created_at: Utc::now(),
    }
}

/// A landmark created `minutes_ago` minutes ago with `ratings` (user id, rating).
pub fn landmark(created_by: Uuid, minutes_ago: i64, ratings: &[(Uuid, i32)]) -> Landmark {
    let user_ratings: BTreeMap<Uuid, i32> = ratings.iter().copied().collect();
    let average_rating = if user_ratings.is_empty() {
        0.0
    } else {
        user_ratings.values().sum::<i32>() as f64 / user_ratings.len() as f64
    };
    Landmark {
        id: Uuid::new_v4(),
        name: format!("Landmark {minutes_ago}"),
        description: "A place".to_string(),
        latitude: 53.9,
        longitude: 27.56,
        created_by,
        created_at: Utc::now() - ChronoDuration::minutes(minutes_ago),
        average_rating,
        visit_count: user_ratings.len() as i32,
        photos: Vec::new(),
        user_ratings,
    }
}

pub async fn body_json<T: DeserializeOwned>(response: Response<Body>) -> T {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    error::AppError,
    landmarks,
    models::{Landmark, LandmarkForm, LandmarkMarker, RankedLandmark},
    repository::RepositoryState,
    score,
    session::SessionState,
    storage::StorageState,
};

/// LandmarkFilter
///
/// Which landmarks a store lists: everyone's, or only the caller's own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LandmarkFilter {
    #[default]
    All,
    Mine,
}

impl LandmarkFilter {
    pub fn from_mine(mine: bool) -> Self {
        if mine { Self::Mine } else { Self::All }
    }
}

/// LandmarkStore
///
/// View state of one user's map: the cached lists, the active filter and the pagination
/// cursor. All backend work goes through the `landmarks` adapter; the store only keeps
/// its cached copies consistent with what the backend returned.
pub struct LandmarkStore {
    repo: RepositoryState,
    storage: StorageState,
    page_size: i64,
    landmarks: Vec<Landmark>,
    user_landmarks: Vec<Landmark>,
    filter: LandmarkFilter,
    cursor: Option<Uuid>,
    has_more: bool,
}

impl LandmarkStore {
    pub fn new(repo: RepositoryState, storage: StorageState, page_size: i64) -> Self {
        Self {
            repo,
            storage,
            page_size,
            landmarks: Vec::new(),
            user_landmarks: Vec::new(),
            filter: LandmarkFilter::All,
            cursor: None,
            has_more: true,
        }
    }

    pub fn landmarks(&self) -> &[Landmark] {
        &self.landmarks
    }

    pub fn user_landmarks(&self) -> &[Landmark] {
        &self.user_landmarks
    }

    pub fn filter(&self) -> LandmarkFilter {
        self.filter
    }

    pub fn cursor(&self) -> Option<Uuid> {
        self.cursor
    }

    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// The list backing the active filter.
    pub fn current(&self) -> &[Landmark] {
        match self.filter {
            LandmarkFilter::All => &self.landmarks,
            LandmarkFilter::Mine => &self.user_landmarks,
        }
    }

    /// Whether the active filter's first page has been loaded.
    pub fn is_loaded(&self) -> bool {
        self.cursor.is_some() || !self.has_more
    }

    /// submit
    ///
    /// Submits a landmark and puts the new record at the front of both cached lists. The
    /// submitter owns the record, so it belongs to "mine" as well.
    pub async fn submit(
        &mut self,
        session: &SessionState,
        form: LandmarkForm,
    ) -> Result<Landmark, AppError> {
        let landmark =
            landmarks::submit(self.repo.as_ref(), self.storage.as_ref(), session, form).await?;
        self.landmarks.insert(0, landmark.clone());
        self.user_landmarks.insert(0, landmark.clone());
        Ok(landmark)
    }

    /// fetch
    ///
    /// Loads the first page for `filter`, replacing the cached list. Switching filter
    /// clears the store first so the cursor never carries over.
    pub async fn fetch(
        &mut self,
        session: &SessionState,
        filter: LandmarkFilter,
    ) -> Result<(), AppError> {
        if filter != self.filter {
            self.clear();
            self.filter = filter;
        }
        let owner = self.owner(session)?;

        let page = landmarks::fetch_page(self.repo.as_ref(), owner, None, self.page_size).await?;
        self.cursor = page.next_cursor;
        self.has_more = page.has_more;
        match self.filter {
            LandmarkFilter::All => self.landmarks = page.items,
            LandmarkFilter::Mine => self.user_landmarks = page.items,
        }
        Ok(())
    }

    /// fetch_more
    ///
    /// Appends the page after the cursor. No-op once the last page was seen.
    pub async fn fetch_more(&mut self, session: &SessionState) -> Result<(), AppError> {
        if !self.has_more {
            return Ok(());
        }
        let owner = self.owner(session)?;

        let page =
            landmarks::fetch_page(self.repo.as_ref(), owner, self.cursor, self.page_size).await?;
        // An empty page keeps the old cursor.
        if page.next_cursor.is_some() {
            self.cursor = page.next_cursor;
        }
        self.has_more = page.has_more;
        match self.filter {
            LandmarkFilter::All => self.landmarks.extend(page.items),
            LandmarkFilter::Mine => self.user_landmarks.extend(page.items),
        }
        Ok(())
    }

    /// rate
    ///
    /// Rates a landmark and replaces every cached copy of it with the updated record.
    pub async fn rate(
        &mut self,
        session: &SessionState,
        landmark_id: Uuid,
        rating: i32,
    ) -> Result<Landmark, AppError> {
        let updated = landmarks::rate(self.repo.as_ref(), session, landmark_id, rating).await?;
        self.refresh(&updated);
        Ok(updated)
    }

    /// Replaces every cached copy of `landmark` with the given record.
    pub fn refresh(&mut self, landmark: &Landmark) {
        for cached in self
            .landmarks
            .iter_mut()
            .chain(self.user_landmarks.iter_mut())
            .filter(|cached| cached.id == landmark.id)
        {
            *cached = landmark.clone();
        }
    }

    /// Drops both lists and resets pagination.
    pub fn clear(&mut self) {
        self.landmarks.clear();
        self.user_landmarks.clear();
        self.cursor = None;
        self.has_more = true;
    }

    /// Looks a landmark up in the cached lists.
    pub fn cached(&self, landmark_id: Uuid) -> Option<&Landmark> {
        self.landmarks
            .iter()
            .chain(self.user_landmarks.iter())
            .find(|landmark| landmark.id == landmark_id)
    }

    /// The active list ordered by score.
    pub fn ranked(&self) -> Vec<RankedLandmark> {
        score::rank(self.current())
    }

    /// The `n` best-scoring landmarks of the active list.
    pub fn top(&self, n: usize) -> Vec<RankedLandmark> {
        score::top(self.current(), n)
    }

    pub fn markers(&self) -> Vec<LandmarkMarker> {
        self.current().iter().map(LandmarkMarker::from).collect()
    }

    fn owner(&self, session: &SessionState) -> Result<Option<Uuid>, AppError> {
        match self.filter {
            LandmarkFilter::All => Ok(None),
            LandmarkFilter::Mine => Ok(Some(session.require_user()?.id)),
        }
    }
}

/// Idle time after which a user's store is dropped by default.
pub const DEFAULT_STORE_IDLE_TTL: Duration = Duration::from_secs(30 * 60);

struct StoreEntry {
    store: Arc<Mutex<LandmarkStore>>,
    last_used: Instant,
}

/// StoreRegistry
///
/// Per-user landmark stores. Each store sits behind its own async mutex so one user's
/// requests are serialized without blocking other users.
///
/// Stores idle for longer than `idle_ttl` are swept whenever the registry is accessed, so
/// users who never sign out do not keep their lists alive. A store still held by a
/// request is never swept.
#[derive(Clone)]
pub struct StoreRegistry {
    stores: Arc<Mutex<HashMap<Uuid, StoreEntry>>>,
    idle_ttl: Duration,
}

impl Default for StoreRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_STORE_IDLE_TTL)
    }
}

impl StoreRegistry {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            stores: Arc::default(),
            idle_ttl,
        }
    }

    /// The store of `user_id`, created on first use.
    pub async fn store_for(
        &self,
        user_id: Uuid,
        repo: &RepositoryState,
        storage: &StorageState,
        page_size: i64,
    ) -> Arc<Mutex<LandmarkStore>> {
        let mut stores = self.stores.lock().await;
        self.sweep(&mut stores);

        let entry = stores.entry(user_id).or_insert_with(|| StoreEntry {
            store: Arc::new(Mutex::new(LandmarkStore::new(
                repo.clone(),
                storage.clone(),
                page_size,
            ))),
            last_used: Instant::now(),
        });
        entry.last_used = Instant::now();
        entry.store.clone()
    }

    /// The store of `user_id` if one exists, without creating it.
    pub async fn existing(&self, user_id: Uuid) -> Option<Arc<Mutex<LandmarkStore>>> {
        let mut stores = self.stores.lock().await;
        self.sweep(&mut stores);

        stores.get_mut(&user_id).map(|entry| {
            entry.last_used = Instant::now();
            entry.store.clone()
        })
    }

    /// Drops the store of `user_id` (sign-out).
    pub async fn remove(&self, user_id: Uuid) {
        self.stores.lock().await.remove(&user_id);
    }

    /// Number of live stores.
    pub async fn len(&self) -> usize {
        let mut stores = self.stores.lock().await;
        self.sweep(&mut stores);
        stores.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn sweep(&self, stores: &mut HashMap<Uuid, StoreEntry>) {
        let before = stores.len();
        stores.retain(|_, entry| {
            entry.last_used.elapsed() < self.idle_ttl || Arc::strong_count(&entry.store) > 1
        });
        let evicted = before - stores.len();
        if evicted > 0 {
            tracing::debug!(evicted, "idle landmark stores dropped");
        }
    }
}

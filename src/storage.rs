use async_trait::async_trait;
use aws_sdk_s3 as s3;
use s3::primitives::ByteStream;
use std::sync::{Arc, Mutex};

// 1. StorageService Contract
/// StorageService
///
/// The blob-store contract used for landmark photos. The real S3 client and the in-memory
/// mock both implement it, so the submission flow never knows which one it talks to.
#[async_trait]
pub trait StorageService: Send + Sync {
    /// Ensures the configured bucket exists. Used in the `Env::Local` setup to provision
    /// the MinIO bucket.
    async fn ensure_bucket_exists(&self);

    /// Stores `bytes` under `key` and returns a durable download URL for it.
    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, String>;
}

/// photo_key
///
/// Object key for an uploaded landmark photo: `landmarks/<unix-millis>_<filename>`.
/// Two photos with the same name uploaded within the same millisecond collide.
pub fn photo_key(timestamp_millis: i64, filename: &str) -> String {
    format!("landmarks/{}_{}", timestamp_millis, sanitize_filename(filename))
}

/// sanitize_filename
///
/// Keeps only the last path segment of a client-supplied filename so it cannot escape
/// the `landmarks/` prefix.
fn sanitize_filename(filename: &str) -> String {
    let name = filename
        .rsplit(['/', '\\'])
        .find(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .unwrap_or("photo");
    name.to_string()
}

// 2. The Real Implementation (S3/MinIO/Supabase)
/// S3StorageClient
///
/// The concrete implementation using the AWS SDK for S3. Talks to MinIO locally and to
/// Supabase Storage in production.
///
/// `force_path_style(true)` is required by both MinIO and Supabase.
#[derive(Clone)]
pub struct S3StorageClient {
    client: s3::Client,
    bucket_name: String,
    public_url: String,
}

impl S3StorageClient {
    pub async fn new(
        endpoint: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
        bucket: &str,
        public_url: &str,
    ) -> Self {
        let credentials =
            s3::config::Credentials::new(access_key, secret_key, None, None, "static");

        let config = s3::Config::builder()
            .credentials_provider(credentials)
            .endpoint_url(endpoint)
            .region(s3::config::Region::new(region.to_string()))
            .behavior_version_latest()
            .force_path_style(true)
            .build();

        let client = s3::Client::from_conf(config);

        Self {
            client,
            bucket_name: bucket.to_string(),
            public_url: public_url.trim_end_matches('/').to_string(),
        }
    }

    /// Download URL of an object in the configured bucket.
    pub fn object_url(&self, key: &str) -> String {
        format!("{}/{}/{}", self.public_url, self.bucket_name, key)
    }
}

#[async_trait]
impl StorageService for S3StorageClient {
    /// Calls CreateBucket; failures (including "already exists") are only logged.
    async fn ensure_bucket_exists(&self) {
        if let Err(e) = self
            .client
            .create_bucket()
            .bucket(&self.bucket_name)
            .send()
            .await
        {
            tracing::debug!("create_bucket skipped: {}", e);
        }
    }

    async fn upload(&self, key: &str, content_type: &str, bytes: Vec<u8>) -> Result<String, String> {
        self.client
            .put_object()
            .bucket(&self.bucket_name)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(bytes))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        tracing::debug!(key, "photo uploaded");
        Ok(self.object_url(key))
    }
}

// 3. The Mock Implementation (For Tests)
/// MockStorageService
///
/// In-memory `StorageService` for tests. Records every upload key in order and can be
/// told to fail after a number of successful uploads.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// Number of uploads that succeed before every further upload fails. `None` never fails.
    pub fail_after: Option<usize>,
    uploads: Arc<Mutex<Vec<String>>>,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_failing() -> Self {
        Self::failing_after(0)
    }

    pub fn failing_after(successes: usize) -> Self {
        Self {
            fail_after: Some(successes),
            ..Self::default()
        }
    }

    /// Keys of all successful uploads, in upload order.
    pub fn uploaded_keys(&self) -> Vec<String> {
        self.uploads
            .lock()
            .map(|uploads| uploads.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn ensure_bucket_exists(&self) {}

    async fn upload(
        &self,
        key: &str,
        _content_type: &str,
        _bytes: Vec<u8>,
    ) -> Result<String, String> {
        let mut uploads = self.uploads.lock().map_err(|e| e.to_string())?;
        if self.fail_after.is_some_and(|limit| uploads.len() >= limit) {
            return Err("Mock Storage Error: Simulation requested".to_string());
        }
        uploads.push(key.to_string());

        Ok(format!("http://localhost:9000/mock-bucket/{}", key))
    }
}

/// StorageState
///
/// The concrete type used to share the storage service access across the application state.
pub type StorageState = Arc<dyn StorageService>;

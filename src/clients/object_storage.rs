//! Object storage for avatar binaries.
//!
//! Buckets are modelled as top-level prefixes of one `object_store` backend,
//! with a `.bucket` marker object recording that the bucket was created.
//! Presigned URLs are HMAC-SHA256 signed links into the `/assets` route.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use bytes::Bytes;
use hmac::{Hmac, Mac};
use object_store::path::Path as ObjectPath;
use object_store::{Attribute, Attributes, ObjectStore, PutOptions, PutPayload};
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::config::StorageConfig;

const BUCKET_MARKER: &str = ".bucket";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Invalid storage configuration: {0}")]
    Config(String),

    #[error("Presigned URL has expired")]
    Expired,

    #[error("Presigned URL signature mismatch")]
    BadSignature,

    #[error("Object store error: {0}")]
    Backend(String),
}

impl From<object_store::Error> for StorageError {
    fn from(err: object_store::Error) -> Self {
        match err {
            object_store::Error::NotFound { path, .. } => Self::NotFound(path),
            other => Self::Backend(other.to_string()),
        }
    }
}

/// A stored object as returned by [`ObjectStorage::get_object`].
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub content: Bytes,
    pub content_type: Option<String>,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError>;

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError>;

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError>;

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), StorageError>;

    /// Time-bounded read URL for one object.
    async fn presign_get(&self, bucket: &str, key: &str, ttl: Duration)
    -> Result<Url, StorageError>;

    /// Checks a signature produced by [`ObjectStorage::presign_get`].
    fn verify_presigned(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> Result<(), StorageError>;
}

/// Signs and verifies `/assets` links.
#[derive(Clone)]
pub struct UrlSigner {
    key: Vec<u8>,
    public_url: Url,
}

impl UrlSigner {
    pub fn new(key: &str, public_url: &str) -> Result<Self, StorageError> {
        let public_url = Url::parse(public_url)
            .map_err(|e| StorageError::Config(format!("Invalid public_url '{public_url}': {e}")))?;
        if public_url.cannot_be_a_base() {
            return Err(StorageError::Config(format!(
                "public_url '{public_url}' cannot carry a path"
            )));
        }

        Ok(Self {
            key: key.as_bytes().to_vec(),
            public_url,
        })
    }

    fn mac(&self, bucket: &str, key: &str, expires: i64) -> Result<Hmac<Sha256>, StorageError> {
        let mut mac = <Hmac<Sha256>>::new_from_slice(&self.key)
            .map_err(|e| StorageError::Config(format!("Invalid signing key: {e}")))?;
        mac.update(bucket.as_bytes());
        mac.update(b"/");
        mac.update(key.as_bytes());
        mac.update(b":");
        mac.update(expires.to_string().as_bytes());
        Ok(mac)
    }

    pub fn sign(&self, bucket: &str, key: &str, expires: i64) -> Result<Url, StorageError> {
        let signature = URL_SAFE_NO_PAD.encode(self.mac(bucket, key, expires)?.finalize().into_bytes());

        let mut url = self.public_url.clone();
        url.path_segments_mut()
            .map_err(|()| StorageError::Config("public_url cannot carry a path".to_string()))?
            .pop_if_empty()
            .push(bucket)
            .extend(key.split('/'));
        url.query_pairs_mut()
            .append_pair("expires", &expires.to_string())
            .append_pair("signature", &signature);

        Ok(url)
    }

    pub fn verify(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
        now: i64,
    ) -> Result<(), StorageError> {
        let provided = URL_SAFE_NO_PAD
            .decode(signature)
            .map_err(|_| StorageError::BadSignature)?;

        self.mac(bucket, key, expires)?
            .verify_slice(&provided)
            .map_err(|_| StorageError::BadSignature)?;

        if expires <= now {
            return Err(StorageError::Expired);
        }

        Ok(())
    }
}

pub struct ObjectStoreClient {
    store: Arc<dyn ObjectStore>,
    root: ObjectPath,
    signer: UrlSigner,
    /// `LocalFileSystem` rejects object attributes, so content types are only
    /// recorded on backends that keep them.
    attributes: bool,
}

impl ObjectStoreClient {
    /// Supported URLs: `memory://`, `file:///path/to/dir`, `s3://bucket/prefix`.
    ///
    /// S3 credentials come from `AWS_ACCESS_KEY_ID`, `AWS_SECRET_ACCESS_KEY`,
    /// `AWS_REGION` and (for MinIO and friends) `AWS_ENDPOINT`.
    pub fn from_config(config: &StorageConfig) -> Result<Self, StorageError> {
        let signer = UrlSigner::new(&config.signing_key, &config.public_url)?;
        let parsed = Url::parse(&config.url)
            .map_err(|e| StorageError::Config(format!("Invalid storage URL '{}': {e}", config.url)))?;

        let (store, root, attributes): (Arc<dyn ObjectStore>, ObjectPath, bool) =
            match parsed.scheme() {
                "memory" => (
                    Arc::new(object_store::memory::InMemory::new()),
                    ObjectPath::default(),
                    true,
                ),
                "file" => {
                    let path = parsed.path();
                    std::fs::create_dir_all(path).map_err(|e| {
                        StorageError::Config(format!("Failed to create storage directory '{path}': {e}"))
                    })?;
                    let store = object_store::local::LocalFileSystem::new_with_prefix(path)?;
                    (Arc::new(store), ObjectPath::default(), false)
                }
                "s3" => {
                    let bucket = parsed.host_str().ok_or_else(|| {
                        StorageError::Config("S3 URL must include bucket name as host".to_string())
                    })?;
                    let mut builder = object_store::aws::AmazonS3Builder::new()
                        .with_bucket_name(bucket)
                        .with_region(
                            std::env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
                        );
                    if let Ok(key_id) = std::env::var("AWS_ACCESS_KEY_ID") {
                        builder = builder.with_access_key_id(key_id);
                    }
                    if let Ok(secret) = std::env::var("AWS_SECRET_ACCESS_KEY") {
                        builder = builder.with_secret_access_key(secret);
                    }
                    if let Ok(endpoint) = std::env::var("AWS_ENDPOINT") {
                        builder = builder
                            .with_endpoint(endpoint)
                            .with_virtual_hosted_style_request(false);
                    }
                    let prefix = parsed.path().trim_matches('/');
                    (Arc::new(builder.build()?), ObjectPath::from(prefix), true)
                }
                other => {
                    return Err(StorageError::Config(format!(
                        "Unsupported storage scheme '{other}'. Supported: memory, file, s3"
                    )));
                }
            };

        info!(scheme = parsed.scheme(), "Object storage configured");

        Ok(Self {
            store,
            root,
            signer,
            attributes,
        })
    }

    /// Wraps an existing store, mainly for tests.
    #[must_use]
    pub fn with_store(store: Arc<dyn ObjectStore>, signer: UrlSigner) -> Self {
        Self {
            store,
            root: ObjectPath::default(),
            signer,
            attributes: true,
        }
    }

    fn object_path(&self, bucket: &str, key: &str) -> ObjectPath {
        let relative = format!("{bucket}/{key}");
        if self.root.as_ref().is_empty() {
            ObjectPath::from(relative)
        } else {
            ObjectPath::from(format!("{}/{relative}", self.root))
        }
    }
}

#[async_trait]
impl ObjectStorage for ObjectStoreClient {
    async fn bucket_exists(&self, bucket: &str) -> Result<bool, StorageError> {
        match self.store.head(&self.object_path(bucket, BUCKET_MARKER)).await {
            Ok(_) => Ok(true),
            Err(object_store::Error::NotFound { .. }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn create_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        self.store
            .put(
                &self.object_path(bucket, BUCKET_MARKER),
                PutPayload::from_static(b""),
            )
            .await?;
        info!(bucket, "Created bucket");
        Ok(())
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        content: Bytes,
        content_type: &str,
    ) -> Result<(), StorageError> {
        let path = self.object_path(bucket, key);
        let mut opts = PutOptions::default();
        if self.attributes {
            let mut attributes = Attributes::new();
            attributes.insert(Attribute::ContentType, content_type.to_string().into());
            opts.attributes = attributes;
        }

        let size = content.len();
        self.store
            .put_opts(&path, PutPayload::from(content), opts)
            .await?;
        debug!(bucket, key, size, "Stored object");
        Ok(())
    }

    async fn get_object(&self, bucket: &str, key: &str) -> Result<StoredObject, StorageError> {
        let result = self.store.get(&self.object_path(bucket, key)).await?;
        let content_type = result
            .attributes
            .get(&Attribute::ContentType)
            .map(|v| v.as_ref().to_string());
        let content = result.bytes().await?;

        Ok(StoredObject {
            content,
            content_type,
        })
    }

    async fn remove_object(&self, bucket: &str, key: &str) -> Result<(), StorageError> {
        self.store.delete(&self.object_path(bucket, key)).await?;
        Ok(())
    }

    async fn presign_get(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<Url, StorageError> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StorageError::Config(format!("Presign TTL out of range: {e}")))?;
        let expires = (chrono::Utc::now() + ttl).timestamp();
        self.signer.sign(bucket, key, expires)
    }

    fn verify_presigned(
        &self,
        bucket: &str,
        key: &str,
        expires: i64,
        signature: &str,
    ) -> Result<(), StorageError> {
        self.signer
            .verify(bucket, key, expires, signature, chrono::Utc::now().timestamp())
    }
}

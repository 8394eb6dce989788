//! Avatar upload and presigning.
//!
//! An upload validates the image, writes the object, then records the avatar
//! and links the account in one transaction. If that transaction fails the
//! object stays behind as an orphan for out-of-band cleanup.

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use crate::clients::object_storage::ObjectStorage;
use crate::config::StorageConfig;
use crate::db::Store;
use crate::domain::{AccountId, AvatarId};
use crate::models::{Account, UploadInput};
use crate::services::auth_service::AuthError;
use crate::services::identity_cache::IdentityCache;
use crate::services::image::{ImageType, sanitize_file_name};

#[derive(Clone)]
pub struct AvatarPipeline {
    store: Store,
    storage: Arc<dyn ObjectStorage>,
    cache: IdentityCache,
    config: StorageConfig,
}

impl AvatarPipeline {
    #[must_use]
    pub fn new(
        store: Store,
        storage: Arc<dyn ObjectStorage>,
        cache: IdentityCache,
        config: StorageConfig,
    ) -> Self {
        Self {
            store,
            storage,
            cache,
            config,
        }
    }

    fn validate(&self, input: &UploadInput) -> Result<ImageType, AuthError> {
        if input.content.is_empty() || input.size == 0 {
            return Err(AuthError::Validation("Uploaded file is empty".to_string()));
        }

        let size = input.size.max(input.content.len());
        if size > self.config.max_upload_bytes {
            return Err(AuthError::Validation(format!(
                "File exceeds the {} byte limit",
                self.config.max_upload_bytes
            )));
        }

        ImageType::detect(&input.content).ok_or_else(|| {
            AuthError::Validation("File is not a supported image type".to_string())
        })
    }

    pub async fn upload_avatar(
        &self,
        account_id: AccountId,
        input: UploadInput,
    ) -> Result<Account, AuthError> {
        let image_type = self.validate(&input)?;

        if input
            .declared_content_type
            .as_deref()
            .is_some_and(|declared| declared != image_type.mime())
        {
            warn!(
                declared = ?input.declared_content_type,
                detected = image_type.mime(),
                "Declared content type does not match upload"
            );
        }

        if self.store.get_account(account_id).await?.is_none() {
            return Err(AuthError::NotFound(format!("Account {account_id} not found")));
        }

        let bucket = if input.bucket.is_empty() {
            self.config.default_bucket.as_str()
        } else {
            input.bucket.as_str()
        };

        if !self.storage.bucket_exists(bucket).await? {
            self.storage.create_bucket(bucket).await?;
        }

        let key = format!("{}-{}", uuid::Uuid::new_v4(), sanitize_file_name(&input.name));
        self.storage
            .put_object(bucket, &key, input.content, image_type.mime())
            .await?;

        let account = self
            .store
            .attach_new_avatar(account_id, bucket, &key)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("Account {account_id} not found")))?;

        self.cache.invalidate(account_id).await;

        info!(account_id = %account_id, bucket, key, "Avatar updated");
        Ok(account.sanitized())
    }

    /// Presigned read URL. Defaults to the configured TTL and never exceeds the maximum.
    pub async fn get_avatar_url(
        &self,
        avatar_id: AvatarId,
        ttl: Option<Duration>,
    ) -> Result<Url, AuthError> {
        let avatar = self
            .store
            .get_avatar(avatar_id)
            .await?
            .ok_or_else(|| AuthError::NotFound(format!("Avatar {avatar_id} not found")))?;

        let ttl = ttl
            .unwrap_or_else(|| self.config.presign_ttl())
            .min(self.config.max_presign_ttl());

        Ok(self
            .storage
            .presign_get(&avatar.bucket, &avatar.file_path, ttl)
            .await?)
    }
}

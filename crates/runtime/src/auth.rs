use agentrun_storage::{api_keys::verify_key, ApiKey, StorageGateway};

use crate::error::{AppError, ErrorContext};

const PREFIX_LEN: usize = 8;

pub struct Authenticator {
    storage: StorageGateway,
}

impl Authenticator {
    pub fn new(storage: StorageGateway) -> Self {
        Self { storage }
    }

    /// Extracts the prefix, looks it up (indexed), verifies the full key
    /// against `key_hash` with a constant-time comparator. Updates
    /// `last_used_at` best-effort on success.
    pub async fn authenticate(&self, presented_key: &str) -> Result<ApiKey, AppError> {
        if presented_key.len() < PREFIX_LEN {
            return Err(AppError::Unauthorized(ErrorContext::new("key shorter than its prefix length")));
        }
        let prefix = &presented_key[..PREFIX_LEN];
        let record = self
            .storage
            .find_api_key_by_prefix(prefix)
            .await?
            .ok_or_else(|| AppError::Unauthorized(ErrorContext::new("unknown key prefix")))?;

        if let Some(expires_at) = record.expires_at {
            if expires_at < chrono::Utc::now() {
                return Err(AppError::Unauthorized(ErrorContext::new("key expired")));
            }
        }

        if !verify_key(presented_key, &record.key_hash) {
            return Err(AppError::Unauthorized(ErrorContext::new("key verification failed")));
        }

        self.storage.touch_api_key_last_used(record.id).await;
        Ok(record)
    }
}

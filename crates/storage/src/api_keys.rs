use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::json_map::JsonMap;
use crate::models::ApiKey;
use crate::{StorageError, StorageGateway};

const PREFIX_LEN: usize = 8;

/// Salted one-way hash of a presented key. The salt is stored alongside
/// the hash (`salt:hash`, both hex) so verification needs no extra
/// lookups. Not a password hash — keys are high-entropy random tokens, so
/// a fast digest plus per-key salt is enough to block a stolen-row
/// rainbow-table attack without the cost of a slow KDF.
fn hash_key(plaintext: &str, salt: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(plaintext.as_bytes());
    let digest = hasher.finalize();
    format!("{}:{}", hex::encode(salt), hex::encode(digest))
}

pub fn verify_key(plaintext: &str, stored_hash: &str) -> bool {
    let Some((salt_hex, _)) = stored_hash.split_once(':') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let candidate = hash_key(plaintext, &salt);
    constant_time_eq(candidate.as_bytes(), stored_hash.as_bytes())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

pub struct NewApiKey {
    pub organization_id: Option<String>,
    pub user_id: Option<String>,
    pub rate_limit_per_minute: i32,
    pub roles: Vec<String>,
    pub metadata: JsonMap,
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// The plaintext key is returned exactly once, at creation time; it is
/// never recoverable from storage afterward.
pub struct IssuedApiKey {
    pub plaintext: String,
    pub record: ApiKey,
}

impl StorageGateway {
    pub async fn create_api_key(&self, new: NewApiKey) -> Result<IssuedApiKey, StorageError> {
        let mut raw = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut raw);
        let plaintext = format!("ar_{}", hex::encode(raw));
        let prefix = plaintext.chars().take(PREFIX_LEN).collect::<String>();

        let mut salt = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut salt);
        let key_hash = hash_key(&plaintext, &salt);
        let roles = Value::from(new.roles);

        let record = sqlx::query_as::<_, ApiKey>(
            r#"
            INSERT INTO api_keys (key_hash, key_prefix, organization_id, user_id, rate_limit_per_minute, roles, metadata, expires_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id, key_hash, key_prefix, organization_id, user_id, rate_limit_per_minute, roles, metadata, expires_at, created_at, last_used_at
            "#,
        )
        .bind(&key_hash)
        .bind(&prefix)
        .bind(&new.organization_id)
        .bind(&new.user_id)
        .bind(new.rate_limit_per_minute)
        .bind(&roles)
        .bind(new.metadata)
        .bind(new.expires_at)
        .fetch_one(&self.pool)
        .await?;

        Ok(IssuedApiKey { plaintext, record })
    }

    pub async fn find_api_key_by_prefix(&self, prefix: &str) -> Result<Option<ApiKey>, StorageError> {
        let row = sqlx::query_as::<_, ApiKey>(
            r#"
            SELECT id, key_hash, key_prefix, organization_id, user_id, rate_limit_per_minute, roles, metadata, expires_at, created_at, last_used_at
            FROM api_keys WHERE key_prefix = $1
            "#,
        )
        .bind(prefix)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }

    pub async fn touch_api_key_last_used(&self, id: Uuid) {
        // best-effort: a failure here must not fail authentication
        let _ = sqlx::query("UPDATE api_keys SET last_used_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_accepts_matching_plaintext() {
        let salt = b"0123456789abcdef";
        let hash = hash_key("ar_secret", salt);
        assert!(verify_key("ar_secret", &hash));
    }

    #[test]
    fn verify_rejects_wrong_plaintext() {
        let salt = b"0123456789abcdef";
        let hash = hash_key("ar_secret", salt);
        assert!(!verify_key("ar_other", &hash));
    }

    #[test]
    fn verify_rejects_malformed_hash() {
        assert!(!verify_key("ar_secret", "not-a-valid-hash"));
    }

    #[test]
    fn constant_time_eq_requires_equal_length() {
        assert!(!constant_time_eq(b"abc", b"abcd"));
        assert!(constant_time_eq(b"abc", b"abc"));
    }
}

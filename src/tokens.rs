//! Store-backed denylist for revoked tokens and per-user cutoffs.
//!
//! Entries live exactly as long as the token they revoke; the per-user
//! cutoff invalidates every token issued before a moment in time (password
//! change, forced logout) and expires after the longest refresh lifetime.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::auth::decode_expiry_unverified;
use crate::config::SECONDS_PER_DAY;
use crate::error::AppResult;
use crate::store::KeyedStore;

const TOKEN_KEY_PREFIX: &str = "blacklist:token:";
const USER_KEY_PREFIX: &str = "blacklist:user:";
const USER_CUTOFF_TTL_SECS: i64 = 7 * SECONDS_PER_DAY;

#[derive(Debug, Serialize, Deserialize)]
struct UserCutoff {
    /// Millisecond timestamp; tokens issued before this are rejected
    #[serde(rename = "blacklistedAt")]
    blacklisted_at: i64,
}

#[derive(Clone)]
pub struct TokenDenylist {
    store: KeyedStore,
}

impl TokenDenylist {
    pub fn new(store: KeyedStore) -> Self {
        Self { store }
    }

    /// Deny a token until its natural expiry. An already-expired or
    /// undecodable token needs no marker.
    pub async fn blacklist_token(&self, token: &str) -> AppResult<()> {
        let exp = match decode_expiry_unverified(token) {
            Some(exp) => exp,
            None => return Ok(()),
        };
        let remaining = exp - Utc::now().timestamp();
        if remaining <= 0 {
            return Ok(());
        }

        let key = format!("{}{}", TOKEN_KEY_PREFIX, token);
        let mut store = self.store.clone();
        store.set_ex(&key, "1", remaining as u64).await?;
        Ok(())
    }

    pub async fn is_blacklisted(&self, token: &str) -> AppResult<bool> {
        let key = format!("{}{}", TOKEN_KEY_PREFIX, token);
        let mut store = self.store.clone();
        Ok(store.exists(&key).await?)
    }

    /// Invalidate every token the user holds as of now.
    pub async fn blacklist_user(&self, user_id: &str) -> AppResult<()> {
        let cutoff = UserCutoff {
            blacklisted_at: Utc::now().timestamp_millis(),
        };
        let key = format!("{}{}", USER_KEY_PREFIX, user_id);
        let mut store = self.store.clone();
        store
            .set_ex(
                &key,
                &serde_json::to_string(&cutoff).unwrap_or_default(),
                USER_CUTOFF_TTL_SECS as u64,
            )
            .await?;
        tracing::info!(user_id = %user_id, "blacklisted all user tokens");
        Ok(())
    }

    /// True when a cutoff exists and the token was issued before it.
    pub async fn is_user_blacklisted_at(&self, user_id: &str, iat_ms: i64) -> AppResult<bool> {
        let key = format!("{}{}", USER_KEY_PREFIX, user_id);
        let mut store = self.store.clone();
        let raw: Option<String> = store.get(&key).await?;
        match raw {
            Some(json) => {
                let cutoff: UserCutoff = serde_json::from_str(&json)
                    .map_err(|e| crate::error::AppError::internal(format!(
                        "corrupt user cutoff entry: {}",
                        e
                    )))?;
                Ok(iat_ms < cutoff.blacklisted_at)
            }
            None => Ok(false),
        }
    }
}

use crate::domain_model::{TokenHash, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Persisted state of one refresh-token chain.
///
/// `previous_token_hash` is written as an empty string until the first rotation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionFamily {
    pub user_id: UserId,
    pub current_token_hash: TokenHash,
    #[serde(default, with = "empty_as_none")]
    pub previous_token_hash: Option<TokenHash>,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
}

impl SessionFamily {
    pub fn new(user_id: UserId, current_token_hash: TokenHash, ttl: Duration) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            current_token_hash,
            previous_token_hash: None,
            expires_at: now + ttl,
            created_at: now,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    /// The record after one rotation step: current moves to previous.
    pub fn rotated(&self, new_token_hash: TokenHash, expires_at: DateTime<Utc>) -> Self {
        Self {
            user_id: self.user_id,
            previous_token_hash: Some(self.current_token_hash.clone()),
            current_token_hash: new_token_hash,
            expires_at,
            created_at: self.created_at,
        }
    }
}

mod empty_as_none {
    use crate::domain_model::TokenHash;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(value: &Option<TokenHash>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(value.as_ref().map(TokenHash::as_str).unwrap_or(""))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<TokenHash>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok((!s.is_empty()).then_some(TokenHash(s)))
    }
}

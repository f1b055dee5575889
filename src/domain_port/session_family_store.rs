use crate::domain_model::*;
use chrono::{DateTime, Utc};
use std::time::Duration;

/// Keyed storage for session families plus the per-user index used for bulk revocation.
///
/// `rotate` must be a single indivisible step against the backing store; the other
/// operations only need single-key consistency. Index maintenance is best-effort.
#[async_trait::async_trait]
pub trait SessionFamilyStore: Send + Sync {
    async fn create(
        &self,
        family_id: &FamilyId,
        record: &SessionFamily,
        ttl: Duration,
    ) -> Result<(), SessionStoreError>;

    /// `Ok(None)` means the family is unknown or already evicted.
    async fn get(&self, family_id: &FamilyId) -> Result<Option<SessionFamily>, SessionStoreError>;

    /// Move current to previous, install `new_token_hash`, slide expiry to `now + ttl`.
    /// Returns the `expires_at` that was written.
    ///
    /// Applies only while the stored current hash still equals `expected_current`;
    /// otherwise fails with `RotationConflict` and leaves the record untouched.
    async fn rotate(
        &self,
        family_id: &FamilyId,
        expected_current: &TokenHash,
        new_token_hash: &TokenHash,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, SessionStoreError>;

    async fn delete(&self, family_id: &FamilyId) -> Result<(), SessionStoreError>;

    async fn delete_all_by_user_id(&self, user_id: UserId) -> Result<(), SessionStoreError>;

    /// Family ids currently indexed for the user. May include stale entries.
    async fn family_ids_by_user_id(
        &self,
        user_id: UserId,
    ) -> Result<Vec<FamilyId>, SessionStoreError>;
}

#[derive(Debug, thiserror::Error)]
pub enum SessionStoreError {
    #[error("session family not found")]
    FamilyNotFound,
    #[error("session family was rotated concurrently")]
    RotationConflict,
    #[error("infra error: {0}")]
    Store(String),
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

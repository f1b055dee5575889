use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::{SessionFamilyStore, SessionStoreError};
use crate::logger::*;
use chrono::Utc;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sliding lifetime of a session family.
    pub refresh_ttl: Duration,
    /// Upper bound on every round-trip to the session store.
    pub store_timeout: Duration,
}

/// Rotating refresh tokens with replay detection.
///
/// A family is Active while `expires_at` is in the future, Expired once it has passed
/// (noticed on the next refresh, which deletes it), and Gone when no record exists.
/// Only the current generation can be exchanged; presenting the one before it
/// revokes the whole family.
pub struct RealTokenLifecycleService {
    store: Arc<dyn SessionFamilyStore>,
    access_issuer: Arc<dyn AccessTokenIssuer>,
    cfg: SessionConfig,
}

impl RealTokenLifecycleService {
    pub fn new(
        store: Arc<dyn SessionFamilyStore>,
        access_issuer: Arc<dyn AccessTokenIssuer>,
        cfg: SessionConfig,
    ) -> Self {
        Self {
            store,
            access_issuer,
            cfg,
        }
    }

    /// Store calls that outlive the deadline fail closed.
    async fn bounded<T>(
        &self,
        op: &'static str,
        fut: impl Future<Output = Result<T, SessionStoreError>>,
    ) -> Result<T, SessionStoreError> {
        match tokio::time::timeout(self.cfg.store_timeout, fut).await {
            Ok(result) => result,
            Err(_) => {
                warn!(op = op, timeout = ?self.cfg.store_timeout, "session store call timed out");
                Err(SessionStoreError::Store(format!("{} timed out", op)))
            }
        }
    }

    async fn revoke(&self, family_id: &FamilyId) {
        if let Err(e) = self.bounded("delete", self.store.delete(family_id)).await {
            warn!(%family_id, error = %e, "failed to delete session family");
        }
    }

    async fn rotate(
        &self,
        family_id: &FamilyId,
        record: &SessionFamily,
    ) -> Result<AuthTokens, AuthError> {
        let refresh_token = RefreshTokenCodec::generate_with_family(family_id);
        let new_hash = RefreshTokenCodec::hash(refresh_token.as_str());

        // Minted first: once the rotation commits, the presented token is spent.
        let (access_token, access_exp) = self.access_issuer.issue(record.user_id).await?;

        let rotated = self
            .bounded(
                "rotate",
                self.store.rotate(
                    family_id,
                    &record.current_token_hash,
                    &new_hash,
                    self.cfg.refresh_ttl,
                ),
            )
            .await;
        let refresh_exp = match rotated {
            Ok(expires_at) => expires_at,
            Err(SessionStoreError::RotationConflict) => {
                warn!(
                    %family_id,
                    user_id = %record.user_id,
                    "refresh token superseded by a concurrent rotation, revoking family"
                );
                self.revoke(family_id).await;
                return Err(AuthError::RefreshTokenReused);
            }
            Err(e) => return Err(e.into()),
        };

        debug!(%family_id, user_id = %record.user_id, "refresh token rotated");

        Ok(AuthTokens {
            access_token,
            refresh_token,
            access_token_expires_at: access_exp,
            refresh_token_expires_at: refresh_exp,
        })
    }
}

#[async_trait::async_trait]
impl TokenLifecycleService for RealTokenLifecycleService {
    async fn issue(&self, user_id: UserId) -> Result<AuthTokens, AuthError> {
        let (access_token, access_exp) = self.access_issuer.issue(user_id).await?;

        let (refresh_token, family_id) = RefreshTokenCodec::generate();
        let record = SessionFamily::new(
            user_id,
            RefreshTokenCodec::hash(refresh_token.as_str()),
            self.cfg.refresh_ttl,
        );
        self.bounded(
            "create",
            self.store.create(&family_id, &record, self.cfg.refresh_ttl),
        )
        .await?;

        info!(%user_id, %family_id, "session family issued");

        Ok(AuthTokens {
            access_token,
            refresh_token,
            access_token_expires_at: access_exp,
            refresh_token_expires_at: record.expires_at,
        })
    }

    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError> {
        let family_id = RefreshTokenCodec::extract_family_id(refresh_token)?;

        let record = self
            .bounded("get", self.store.get(&family_id))
            .await?
            .ok_or(AuthError::InvalidRefreshToken)?;

        if record.is_expired_at(Utc::now()) {
            info!(%family_id, user_id = %record.user_id, "session family expired");
            self.revoke(&family_id).await;
            return Err(AuthError::RefreshTokenExpired);
        }

        let incoming = RefreshTokenCodec::hash(refresh_token);

        if RefreshTokenCodec::compare_hashes(&incoming, &record.current_token_hash) {
            return self.rotate(&family_id, &record).await;
        }

        let is_previous = record
            .previous_token_hash
            .as_ref()
            .is_some_and(|previous| RefreshTokenCodec::compare_hashes(&incoming, previous));
        if is_previous {
            warn!(
                %family_id,
                user_id = %record.user_id,
                "refresh token reuse detected, revoking family"
            );
            self.revoke(&family_id).await;
            return Err(AuthError::RefreshTokenReused);
        }

        // Older generations are rejected without touching the family.
        debug!(%family_id, "refresh token matches no live generation");
        Err(AuthError::InvalidRefreshToken)
    }

    async fn logout(&self, refresh_token: &str) {
        match RefreshTokenCodec::extract_family_id(refresh_token) {
            Ok(family_id) => self.revoke(&family_id).await,
            Err(_) => debug!("logout with malformed refresh token ignored"),
        }
    }

    async fn logout_all(&self, user_id: UserId) -> Result<(), AuthError> {
        self.bounded(
            "delete_all_by_user_id",
            self.store.delete_all_by_user_id(user_id),
        )
        .await?;
        info!(%user_id, "all session families revoked");
        Ok(())
    }

    async fn list_sessions(&self, user_id: UserId) -> Result<Vec<SessionSummary>, AuthError> {
        let family_ids = self
            .bounded(
                "family_ids_by_user_id",
                self.store.family_ids_by_user_id(user_id),
            )
            .await?;

        let now = Utc::now();
        let mut sessions = Vec::with_capacity(family_ids.len());
        for family_id in family_ids {
            let Some(record) = self.bounded("get", self.store.get(&family_id)).await? else {
                continue;
            };
            if record.user_id != user_id || record.is_expired_at(now) {
                continue;
            }
            sessions.push(SessionSummary {
                family_id,
                created_at: record.created_at,
                expires_at: record.expires_at,
            });
        }
        sessions.sort_by_key(|s| s.created_at);

        Ok(sessions)
    }

    async fn verify_access_token(&self, token: &str) -> Result<UserId, AuthError> {
        self.access_issuer
            .verify(&AccessToken(token.to_string()))
            .await
    }
}

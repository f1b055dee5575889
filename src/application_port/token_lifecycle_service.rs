use crate::application_port::AccessToken;
use crate::domain_model::{FamilyId, RefreshToken, TokenFormatError, UserId};
use crate::domain_port::SessionStoreError;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid refresh token")]
    InvalidRefreshToken,
    #[error("refresh token expired")]
    RefreshTokenExpired,
    #[error("refresh token reused")]
    RefreshTokenReused,
    #[error("token invalid")]
    TokenInvalid,
    #[error("token expired")]
    TokenExpired,
    #[error("store error: {0}")]
    Store(String),
    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<TokenFormatError> for AuthError {
    fn from(_: TokenFormatError) -> Self {
        AuthError::InvalidRefreshToken
    }
}

impl From<SessionStoreError> for AuthError {
    fn from(err: SessionStoreError) -> Self {
        match err {
            // The family vanished between read and rotation (logout or a racing revocation).
            SessionStoreError::FamilyNotFound => AuthError::InvalidRefreshToken,
            // The presented token stopped being current while this request was in flight.
            SessionStoreError::RotationConflict => AuthError::RefreshTokenReused,
            SessionStoreError::Store(e) => AuthError::Store(e),
            SessionStoreError::InternalError(e) => AuthError::InternalError(e.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct AuthTokens {
    pub access_token: AccessToken,
    pub refresh_token: RefreshToken,
    pub access_token_expires_at: DateTime<Utc>,
    pub refresh_token_expires_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub family_id: FamilyId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[async_trait::async_trait]
pub trait TokenLifecycleService: Send + Sync {
    /// Start a new session family for a user who just logged in or registered.
    async fn issue(&self, user_id: UserId) -> Result<AuthTokens, AuthError>;
    /// Exchange the current refresh token for a new pair, or detect replay.
    async fn refresh(&self, refresh_token: &str) -> Result<AuthTokens, AuthError>;
    /// Revoke the family the token belongs to. Never fails.
    async fn logout(&self, refresh_token: &str);
    async fn logout_all(&self, user_id: UserId) -> Result<(), AuthError>;
    async fn list_sessions(&self, user_id: UserId) -> Result<Vec<SessionSummary>, AuthError>;
    async fn verify_access_token(&self, token: &str) -> Result<UserId, AuthError>;
}

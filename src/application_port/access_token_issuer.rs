use crate::application_port::AuthError;
use crate::domain_model::UserId;
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
#[serde(transparent)]
pub struct AccessToken(pub String);

/// Short-lived bearer tokens. Stateless; nothing is persisted.
#[async_trait::async_trait]
pub trait AccessTokenIssuer: Send + Sync {
    async fn issue(&self, user_id: UserId) -> Result<(AccessToken, DateTime<Utc>), AuthError>;
    async fn verify(&self, token: &AccessToken) -> Result<UserId, AuthError>;
}

use crate::application_port::{AccessToken, AccessTokenIssuer, AuthError};
use crate::domain_model::UserId;
use chrono::{DateTime, Duration, Utc};

const FAKE_PREFIX: &str = "fake-access-token:";

#[derive(Debug, Default)]
pub struct FakeAccessTokenIssuer;

impl FakeAccessTokenIssuer {
    pub fn new() -> Self {
        Self
    }
}

// Unsigned tokens for tests and local runs only.
#[async_trait::async_trait]
impl AccessTokenIssuer for FakeAccessTokenIssuer {
    async fn issue(&self, user_id: UserId) -> Result<(AccessToken, DateTime<Utc>), AuthError> {
        Ok((
            AccessToken(format!("{}{}", FAKE_PREFIX, user_id)),
            Utc::now() + Duration::minutes(15),
        ))
    }

    async fn verify(&self, token: &AccessToken) -> Result<UserId, AuthError> {
        token
            .0
            .strip_prefix(FAKE_PREFIX)
            .and_then(|id| id.parse::<UserId>().ok())
            .ok_or(AuthError::TokenInvalid)
    }
}

use super::error::*;
use crate::application_port::{AuthTokens, SessionSummary, TokenLifecycleService};
use crate::domain_model::UserId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use warp::{self, reject};

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        ApiResponse {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(code: ApiErrorCode, message: impl Into<String>) -> Self {
        ApiResponse {
            success: false,
            data: None,
            error: Some(ApiError {
                code,
                message: message.into(),
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

pub async fn refresh(
    body: RefreshTokenRequest,
    token_service: Arc<dyn TokenLifecycleService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let tokens: AuthTokens = token_service
        .refresh(&body.refresh_token)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(tokens)))
}

pub async fn logout(
    body: RefreshTokenRequest,
    token_service: Arc<dyn TokenLifecycleService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    token_service.logout(&body.refresh_token).await;

    Ok(warp::reply::json(&ApiResponse::ok(())))
}

pub async fn logout_all(
    user_id: UserId,
    token_service: Arc<dyn TokenLifecycleService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    token_service
        .logout_all(user_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(())))
}

pub async fn list_sessions(
    user_id: UserId,
    token_service: Arc<dyn TokenLifecycleService>,
) -> Result<impl warp::Reply, warp::Rejection> {
    let sessions: Vec<SessionSummary> = token_service
        .list_sessions(user_id)
        .await
        .map_err(ApiErrorCode::from)
        .map_err(reject::custom)?;

    Ok(warp::reply::json(&ApiResponse::ok(sessions)))
}

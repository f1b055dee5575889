use super::error::*;
use super::handler;
use crate::application_port::TokenLifecycleService;
use crate::domain_model::UserId;
use crate::server::*;
use std::convert::Infallible;
use std::sync::Arc;
use warp::{Filter, http, reject};

const MAX_BODY_BYTES: u64 = 4 * 1024;

pub fn routes(
    server: Arc<Server>,
) -> impl Filter<Extract = (impl warp::Reply,), Error = warp::Rejection> + Clone {
    let refresh = warp::post()
        .and(warp::path("refresh"))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.token_service.clone()))
        .and_then(handler::refresh);

    let logout = warp::post()
        .and(warp::path("logout"))
        .and(warp::path::end())
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with(server.token_service.clone()))
        .and_then(handler::logout);

    let logout_all = warp::post()
        .and(warp::path("logout_all"))
        .and(warp::path::end())
        .and(with_verification(server.token_service.clone()))
        .and(with(server.token_service.clone()))
        .and_then(handler::logout_all);

    let sessions = warp::get()
        .and(warp::path("sessions"))
        .and(warp::path::end())
        .and(with_verification(server.token_service.clone()))
        .and(with(server.token_service.clone()))
        .and_then(handler::list_sessions);

    refresh.or(logout).or(logout_all).or(sessions)
}

fn with<ServiceType>(
    service: Arc<ServiceType>,
) -> impl Filter<Extract = (Arc<ServiceType>,), Error = Infallible> + Clone
where
    ServiceType: Send + Sync + ?Sized,
{
    warp::any().map(move || service.clone())
}

fn with_verification(
    token_service: Arc<dyn TokenLifecycleService>,
) -> impl Filter<Extract = (UserId,), Error = warp::Rejection> + Clone {
    warp::header::<String>(http::header::AUTHORIZATION.as_ref()).and_then(move |token: String| {
        let token_service = token_service.clone();
        async move {
            if let Some(token) = token.strip_prefix("Bearer ") {
                let user_id = token_service
                    .verify_access_token(token)
                    .await
                    .map_err(ApiErrorCode::from)
                    .map_err(reject::custom)?;
                Ok(user_id)
            } else {
                Err(reject::custom(ApiErrorCode::InvalidToken))
            }
        }
    })
}

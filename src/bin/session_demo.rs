/// Walks one session family through issue, rotation and replay against the
/// configured backend.
///
/// $ cargo run --bin session_demo -- --settings=settings/dev.toml
use refrain::application_port::AuthError;
use refrain::domain_model::UserId;
use refrain::logger::*;
use refrain::server::Server;
use refrain::settings::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let logger = Logger::new_bootstrap();

    let project_settings = parse_settings(cli.settings.as_deref())?;
    logger.reload_from_config(&LogConfig {
        filter: cli.log_filter.unwrap_or_else(|| "debug".to_string()),
    })?;

    let server = Server::try_new(&project_settings).await?;
    let service = server.token_service.clone();
    let user_id = UserId(uuid::Uuid::new_v4());

    let first = service.issue(user_id).await?;
    info!(refresh_token = %first.refresh_token.as_str(), "issued");

    let second = service.refresh(first.refresh_token.as_str()).await?;
    info!(refresh_token = %second.refresh_token.as_str(), "rotated");

    match service.refresh(first.refresh_token.as_str()).await {
        Err(AuthError::RefreshTokenReused) => info!("replay of the first token was detected"),
        other => warn!(?other, "unexpected outcome for replayed token"),
    }

    match service.refresh(second.refresh_token.as_str()).await {
        Err(AuthError::InvalidRefreshToken) => info!("family is gone after replay"),
        other => warn!(?other, "unexpected outcome after revocation"),
    }

    let sessions = service.list_sessions(user_id).await?;
    info!(remaining = sessions.len(), "done");

    server.shutdown().await;
    Ok(())
}

use crate::application_impl::*;
use crate::application_port::*;
use crate::domain_port::*;
use crate::infra_memory::*;
use crate::infra_redis::*;
use crate::logger::*;
use crate::settings::Settings;
use std::sync::Arc;
use std::time::Duration;

const SIGNING_KEY_ENV: &str = "JWT_SIGNING_KEY";

pub struct Server {
    pub token_service: Arc<dyn TokenLifecycleService>,
}

impl Server {
    pub fn new(token_service: Arc<dyn TokenLifecycleService>) -> Self {
        Self { token_service }
    }

    pub async fn try_new(settings: &Settings) -> anyhow::Result<Self> {
        let session = &settings.session;

        let store: Arc<dyn SessionFamilyStore> = match session.backend.as_str() {
            "memory" => {
                warn!("in-memory session store selected, rotation is only atomic within this process");
                Arc::new(InMemorySessionFamilyStore::new(session.expired_retention()))
            }
            "redis" => {
                let redis_client = redis::Client::open(settings.redis.dsn.as_str())?;
                let redis_manager = redis_client.get_connection_manager().await?;
                Arc::new(RedisSessionFamilyStore::new(
                    redis_manager,
                    settings.redis.prefix.clone(),
                    session.expired_retention(),
                ))
            }
            other => return Err(anyhow::anyhow!("Unknown session backend: {}", other)),
        };

        let signing_key =
            std::env::var(SIGNING_KEY_ENV).unwrap_or_else(|_| settings.jwt.signing_key.clone());
        if signing_key.is_empty() {
            return Err(anyhow::anyhow!(
                "JWT signing key is empty, set {} or jwt.signing_key",
                SIGNING_KEY_ENV
            ));
        }
        let access_issuer: Arc<dyn AccessTokenIssuer> =
            Arc::new(JwtAccessTokenIssuer::new(JwtConfig {
                issuer: settings.jwt.issuer.clone(),
                audience: settings.jwt.audience.clone(),
                access_ttl: Duration::from_secs(settings.jwt.access_ttl_secs),
                signing_key: signing_key.into_bytes(),
            }));

        let token_service: Arc<dyn TokenLifecycleService> =
            Arc::new(RealTokenLifecycleService::new(
                store,
                access_issuer,
                SessionConfig {
                    refresh_ttl: session.refresh_ttl(),
                    store_timeout: session.store_timeout(),
                },
            ));

        info!(backend = %session.backend, "server started");

        Ok(Self::new(token_service))
    }

    /// Store handles close when the last service reference drops.
    pub async fn shutdown(&self) {
        info!("server shutting down...");
    }
}

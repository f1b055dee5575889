use crate::domain_model::*;
use crate::domain_port::*;
use crate::logger::*;
use anyhow::anyhow;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Script};
use std::time::Duration;
const REFRESH_TOKEN_ROTATE: &str = include_str!("refresh_token_rotate.lua");

/// Redis-backed family store. Rotation runs as a Lua script, so it is atomic per key.
///
/// Keys live for `ttl + retention`: an elapsed family stays readable for a while so
/// a late refresh is reported as expired rather than unknown.
pub struct RedisSessionFamilyStore {
    conn: ConnectionManager,
    prefix: String,
    retention: Duration,
    rotate_script: Script,
}

impl RedisSessionFamilyStore {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>, retention: Duration) -> Self {
        RedisSessionFamilyStore {
            conn,
            prefix: prefix.into(),
            retention,
            rotate_script: Script::new(REFRESH_TOKEN_ROTATE),
        }
    }

    fn namespaced(&self, key: String) -> String {
        if self.prefix.is_empty() {
            key
        } else {
            format!("{}:{}", self.prefix, key)
        }
    }

    fn family_key(&self, family_id: &FamilyId) -> String {
        self.namespaced(format!("refresh_token:{}", family_id))
    }

    fn user_key(&self, user_id: impl std::fmt::Display) -> String {
        self.namespaced(format!("user_refresh_tokens:{}", user_id))
    }

    fn key_ttl_secs(&self, ttl: Duration) -> u64 {
        (ttl + self.retention).as_secs().max(1)
    }

    async fn extend_index(
        &self,
        conn: &mut ConnectionManager,
        user_key: &str,
        ttl_secs: u64,
    ) -> redis::RedisResult<()> {
        let _: () = conn.expire(user_key, ttl_secs as i64).await?;
        Ok(())
    }
}

fn store_err(e: redis::RedisError) -> SessionStoreError {
    SessionStoreError::Store(e.to_string())
}

#[async_trait::async_trait]
impl SessionFamilyStore for RedisSessionFamilyStore {
    async fn create(
        &self,
        family_id: &FamilyId,
        record: &SessionFamily,
        ttl: Duration,
    ) -> Result<(), SessionStoreError> {
        let key = self.family_key(family_id);
        let payload = serde_json::to_string(record).map_err(|e| anyhow!(e))?;
        let ttl_secs = self.key_ttl_secs(ttl);
        let mut conn = self.conn.clone();

        let _: () = conn
            .set_ex(&key, payload, ttl_secs)
            .await
            .map_err(store_err)?;

        let user_key = self.user_key(record.user_id);
        let indexed: redis::RedisResult<()> = conn.sadd(&user_key, family_id.as_str()).await;
        let indexed = match indexed {
            Ok(()) => self.extend_index(&mut conn, &user_key, ttl_secs).await,
            Err(e) => Err(e),
        };
        if let Err(e) = indexed {
            warn!(%family_id, user_id = %record.user_id, error = %e, "failed to index session family");
        }

        Ok(())
    }

    async fn get(&self, family_id: &FamilyId) -> Result<Option<SessionFamily>, SessionStoreError> {
        let key = self.family_key(family_id);
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(&key).await.map_err(store_err)?;

        raw.map(|raw| {
            serde_json::from_str::<SessionFamily>(&raw)
                .map_err(|e| SessionStoreError::from(anyhow!(e)))
        })
        .transpose()
    }

    async fn rotate(
        &self,
        family_id: &FamilyId,
        expected_current: &TokenHash,
        new_token_hash: &TokenHash,
        ttl: Duration,
    ) -> Result<DateTime<Utc>, SessionStoreError> {
        let key = self.family_key(family_id);
        // The script writes microsecond precision; return exactly what is stored.
        let expires_at = (Utc::now() + ttl).trunc_subsecs(6);
        let ttl_secs = self.key_ttl_secs(ttl);
        let mut conn = self.conn.clone();

        let (status, user_id): (i64, String) = self
            .rotate_script
            .key(&key)
            .arg(expected_current.as_str())
            .arg(new_token_hash.as_str())
            .arg(expires_at.to_rfc3339_opts(SecondsFormat::Micros, true))
            .arg(ttl_secs)
            .invoke_async(&mut conn)
            .await
            .map_err(store_err)?;

        match status {
            1 => {
                let user_key = self.user_key(&user_id);
                if let Err(e) = self.extend_index(&mut conn, &user_key, ttl_secs).await {
                    warn!(%family_id, %user_id, error = %e, "failed to extend session index ttl");
                }
                Ok(expires_at)
            }
            0 => Err(SessionStoreError::RotationConflict),
            -1 => Err(SessionStoreError::FamilyNotFound),
            _ => Err(SessionStoreError::InternalError(anyhow!(
                "unknown script status"
            ))),
        }
    }

    async fn delete(&self, family_id: &FamilyId) -> Result<(), SessionStoreError> {
        let key = self.family_key(family_id);
        let mut conn = self.conn.clone();

        let raw: Option<String> = conn.get(&key).await.map_err(store_err)?;
        let Some(raw) = raw else {
            return Ok(());
        };
        let _: () = conn.del(&key).await.map_err(store_err)?;

        match serde_json::from_str::<SessionFamily>(&raw) {
            Ok(record) => {
                let user_key = self.user_key(record.user_id);
                let removed: redis::RedisResult<()> =
                    conn.srem(&user_key, family_id.as_str()).await;
                if let Err(e) = removed {
                    warn!(%family_id, user_id = %record.user_id, error = %e, "failed to unindex session family");
                }
            }
            Err(e) => warn!(%family_id, error = %e, "deleted unreadable session family"),
        }

        Ok(())
    }

    async fn delete_all_by_user_id(&self, user_id: UserId) -> Result<(), SessionStoreError> {
        let user_key = self.user_key(user_id);
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(&user_key).await.map_err(store_err)?;

        let mut failed = 0usize;
        for member in &members {
            let key = self.namespaced(format!("refresh_token:{}", member));
            let deleted: redis::RedisResult<()> = conn.del(&key).await;
            if let Err(e) = deleted {
                warn!(%user_id, family_id = %member, error = %e, "failed to delete session family");
                failed += 1;
            }
        }

        // Keep the index when something is left behind so a later call can finish the job.
        if failed > 0 {
            return Err(SessionStoreError::Store(format!(
                "{} of {} session families could not be deleted",
                failed,
                members.len()
            )));
        }

        let _: () = conn.del(&user_key).await.map_err(store_err)?;
        Ok(())
    }

    async fn family_ids_by_user_id(
        &self,
        user_id: UserId,
    ) -> Result<Vec<FamilyId>, SessionStoreError> {
        let user_key = self.user_key(user_id);
        let mut conn = self.conn.clone();
        let members: Vec<String> = conn.smembers(&user_key).await.map_err(store_err)?;

        Ok(members
            .iter()
            .filter_map(|member| member.parse::<FamilyId>().ok())
            .collect())
    }
}

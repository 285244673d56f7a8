//! Redis-backed lease keeping one retention run active across instances.

use async_trait::async_trait;
use chronicle_application::{RetentionLease, RetentionLeaseCoordinator};
use chronicle_core::{AppError, AppResult};
use redis::Script;

const RELEASE_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('DEL', KEYS[1])
else
  return 0
end
"#;

const RENEW_LEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
  return redis.call('EXPIRE', KEYS[1], ARGV[2])
else
  return 0
end
"#;

/// Redis implementation of retention lease coordination.
#[derive(Clone)]
pub struct RedisRetentionLeaseCoordinator {
    client: redis::Client,
    key_prefix: String,
}

impl RedisRetentionLeaseCoordinator {
    /// Creates one coordinator adapter.
    #[must_use]
    pub fn new(client: redis::Client, key_prefix: impl Into<String>) -> Self {
        Self {
            client,
            key_prefix: key_prefix.into(),
        }
    }

    fn key_for(&self, scope_key: &str) -> String {
        format!("{}:{scope_key}", self.key_prefix)
    }

    async fn connection(&self) -> AppResult<redis::aio::MultiplexedConnection> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|error| AppError::Internal(format!("failed to connect to redis: {error}")))
    }
}

#[async_trait]
impl RetentionLeaseCoordinator for RedisRetentionLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<RetentionLease>> {
        if scope_key.trim().is_empty() {
            return Err(AppError::Validation(
                "retention lease scope_key must not be empty".to_owned(),
            ));
        }

        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "retention lease holder_id must not be empty".to_owned(),
            ));
        }

        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "retention lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let key = self.key_for(scope_key);
        let token = format!("{holder_id}:{}", uuid::Uuid::new_v4());
        let mut connection = self.connection().await?;

        // Token and TTL are written by one command; the key never exists without expiry.
        let reply: Option<String> = redis::cmd("SET")
            .arg(key.as_str())
            .arg(token.as_str())
            .arg("NX")
            .arg("EX")
            .arg(u64::from(lease_seconds))
            .query_async(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to acquire retention lease: {error}"))
            })?;

        if reply.is_none() {
            return Ok(None);
        }

        Ok(Some(RetentionLease {
            scope_key: scope_key.to_owned(),
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release_lease(&self, lease: &RetentionLease) -> AppResult<()> {
        let key = self.key_for(lease.scope_key.as_str());
        let mut connection = self.connection().await?;

        Script::new(RELEASE_LEASE_SCRIPT)
            .key(key)
            .arg(lease.token.as_str())
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to release retention lease: {error}"))
            })?;

        Ok(())
    }

    async fn renew_lease(&self, lease: &RetentionLease, lease_seconds: u32) -> AppResult<bool> {
        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "retention lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let key = self.key_for(lease.scope_key.as_str());
        let mut connection = self.connection().await?;

        let renewed = Script::new(RENEW_LEASE_SCRIPT)
            .key(key)
            .arg(lease.token.as_str())
            .arg(i64::from(lease_seconds))
            .invoke_async::<i32>(&mut connection)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to renew retention lease: {error}"))
            })?;

        Ok(renewed > 0)
    }
}

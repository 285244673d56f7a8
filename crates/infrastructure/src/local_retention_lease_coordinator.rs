//! In-process lease for single-instance deployments without Redis.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use chronicle_application::{RetentionLease, RetentionLeaseCoordinator};
use chronicle_core::{AppError, AppResult};
use tokio::sync::Mutex;
use tokio::time::{Duration, Instant};

#[derive(Debug)]
struct HeldLease {
    token: String,
    expires_at: Instant,
}

/// Process-local implementation of retention lease coordination.
#[derive(Debug, Default)]
pub struct LocalRetentionLeaseCoordinator {
    leases: Mutex<HashMap<String, HeldLease>>,
    sequence: AtomicU64,
}

impl LocalRetentionLeaseCoordinator {
    /// Creates an empty coordinator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RetentionLeaseCoordinator for LocalRetentionLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<RetentionLease>> {
        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "retention lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        if leases
            .get(scope_key)
            .is_some_and(|held| held.expires_at > now)
        {
            return Ok(None);
        }

        let token = format!(
            "{holder_id}:{}",
            self.sequence.fetch_add(1, Ordering::Relaxed) + 1
        );
        leases.insert(
            scope_key.to_owned(),
            HeldLease {
                token: token.clone(),
                expires_at: now + Duration::from_secs(u64::from(lease_seconds)),
            },
        );

        Ok(Some(RetentionLease {
            scope_key: scope_key.to_owned(),
            token,
            holder_id: holder_id.to_owned(),
        }))
    }

    async fn release_lease(&self, lease: &RetentionLease) -> AppResult<()> {
        let mut leases = self.leases.lock().await;
        if leases
            .get(lease.scope_key.as_str())
            .is_some_and(|held| held.token == lease.token)
        {
            leases.remove(lease.scope_key.as_str());
        }
        Ok(())
    }

    async fn renew_lease(&self, lease: &RetentionLease, lease_seconds: u32) -> AppResult<bool> {
        let now = Instant::now();
        let mut leases = self.leases.lock().await;
        let Some(held) = leases.get_mut(lease.scope_key.as_str()) else {
            return Ok(false);
        };

        if held.token != lease.token || held.expires_at <= now {
            return Ok(false);
        }

        held.expires_at = now + Duration::from_secs(u64::from(lease_seconds));
        Ok(true)
    }
}

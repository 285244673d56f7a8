use async_trait::async_trait;
use chronicle_core::AppResult;

/// One distributed retention lease claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionLease {
    /// Coordination scope key.
    pub scope_key: String,
    /// Lease token used for safe release.
    pub token: String,
    /// Lease holder identity.
    pub holder_id: String,
}

/// Distributed coordination port guaranteeing one active retention run.
#[async_trait]
pub trait RetentionLeaseCoordinator: Send + Sync {
    /// Attempts to acquire one lease for the given scope.
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<RetentionLease>>;

    /// Releases one lease using token compare-and-delete semantics.
    async fn release_lease(&self, lease: &RetentionLease) -> AppResult<()>;

    /// Renews one existing lease and returns false when token ownership changed.
    async fn renew_lease(&self, lease: &RetentionLease, lease_seconds: u32) -> AppResult<bool>;
}

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chronicle_core::AppResult;
use chronicle_domain::{AuditRecord, AuditRecordId, AuditRecordView, NewAuditRecord};

use super::query::{AuditFilter, AuditListQuery, AuditListSlice, ExpiredRecordCursor};

/// Port for the durable append-only audit table.
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persists one record and returns it with its assigned id.
    async fn append(&self, record: NewAuditRecord) -> AppResult<AuditRecord>;

    /// Reads one record joined with actor fields.
    async fn find(&self, id: AuditRecordId) -> AppResult<Option<AuditRecordView>>;

    /// Lists one filtered, sorted page and the total match count.
    async fn list(&self, query: &AuditListQuery) -> AppResult<AuditListSlice>;

    /// Reads matching records newest first (by id), strictly before `before`.
    async fn export_batch(
        &self,
        filter: &AuditFilter,
        before: Option<AuditRecordId>,
        limit: usize,
    ) -> AppResult<Vec<AuditRecordView>>;

    /// Reads records created before `cutoff`, ascending by (`created_at`, `id`),
    /// strictly after `after`.
    async fn select_expired_batch(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<ExpiredRecordCursor>,
        limit: usize,
    ) -> AppResult<Vec<AuditRecordView>>;

    /// Deletes exactly the given records in one operation and returns the deleted count.
    async fn delete_by_ids(&self, ids: &[AuditRecordId]) -> AppResult<u64>;

    /// Returns the column names the backing table currently has.
    async fn stored_columns(&self) -> AppResult<Vec<String>>;
}

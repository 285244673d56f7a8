use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use chronicle_application::{
    AuditFilter, AuditListQuery, AuditListSlice, AuditStore, ExpiredRecordCursor,
};
use chronicle_core::{ActorId, AppResult};
use chronicle_domain::{
    ActorProfile, AuditRecord, AuditRecordId, AuditRecordView, ExportSchema, NewAuditRecord,
};

#[derive(Default)]
struct InMemoryAuditState {
    records: Vec<AuditRecord>,
    actors: HashMap<ActorId, ActorProfile>,
    next_id: i64,
}

impl InMemoryAuditState {
    fn view(&self, record: &AuditRecord) -> AuditRecordView {
        AuditRecordView::new(record.clone(), self.actors.get(&record.actor_id).cloned())
    }

    fn views_matching(&self, filter: &AuditFilter) -> Vec<AuditRecordView> {
        self.records
            .iter()
            .map(|record| self.view(record))
            .filter(|view| filter.matches(view))
            .collect()
    }
}

/// In-memory audit store used by local development and tests.
#[derive(Default)]
pub struct InMemoryAuditStore {
    state: RwLock<InMemoryAuditState>,
}

impl InMemoryAuditStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers display fields joined onto records of `actor_id`.
    pub async fn register_actor(&self, actor_id: ActorId, profile: ActorProfile) {
        self.state.write().await.actors.insert(actor_id, profile);
    }

    /// Returns the number of stored records.
    pub async fn len(&self) -> usize {
        self.state.read().await.records.len()
    }

    /// Returns whether the store holds no record.
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.records.is_empty()
    }
}

#[async_trait]
impl AuditStore for InMemoryAuditStore {
    async fn append(&self, record: NewAuditRecord) -> AppResult<AuditRecord> {
        let mut state = self.state.write().await;
        state.next_id += 1;
        let record = AuditRecord::from_new(AuditRecordId::from_i64(state.next_id), record);
        state.records.push(record.clone());
        Ok(record)
    }

    async fn find(&self, id: AuditRecordId) -> AppResult<Option<AuditRecordView>> {
        let state = self.state.read().await;
        Ok(state
            .records
            .iter()
            .find(|record| record.id == id)
            .map(|record| state.view(record)))
    }

    async fn list(&self, query: &AuditListQuery) -> AppResult<AuditListSlice> {
        let mut matching = self.state.read().await.views_matching(&query.filter);
        matching.sort_by(|left, right| query.sort.compare(left, right));

        let total = matching.len() as u64;
        let offset = usize::try_from(query.offset()).unwrap_or(usize::MAX);
        let items = matching
            .into_iter()
            .skip(offset)
            .take(query.page_size as usize)
            .collect();

        Ok(AuditListSlice { items, total })
    }

    async fn export_batch(
        &self,
        filter: &AuditFilter,
        before: Option<AuditRecordId>,
        limit: usize,
    ) -> AppResult<Vec<AuditRecordView>> {
        let mut matching: Vec<AuditRecordView> = self
            .state
            .read()
            .await
            .views_matching(filter)
            .into_iter()
            .filter(|view| before.is_none_or(|before| view.record.id < before))
            .collect();
        matching.sort_by(|left, right| right.record.id.cmp(&left.record.id));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn select_expired_batch(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<ExpiredRecordCursor>,
        limit: usize,
    ) -> AppResult<Vec<AuditRecordView>> {
        let state = self.state.read().await;
        let mut expired: Vec<AuditRecordView> = state
            .records
            .iter()
            .filter(|record| record.created_at < cutoff)
            .map(|record| state.view(record))
            .filter(|view| after.is_none_or(|cursor| cursor.precedes(view)))
            .collect();
        expired.sort_by_key(|view| (view.record.created_at, view.record.id));
        expired.truncate(limit);
        Ok(expired)
    }

    async fn delete_by_ids(&self, ids: &[AuditRecordId]) -> AppResult<u64> {
        let mut state = self.state.write().await;
        let before = state.records.len();
        state.records.retain(|record| !ids.contains(&record.id));
        Ok((before - state.records.len()) as u64)
    }

    async fn stored_columns(&self) -> AppResult<Vec<String>> {
        Ok(ExportSchema::current()
            .stored_column_names()
            .into_iter()
            .map(ToOwned::to_owned)
            .collect())
    }
}

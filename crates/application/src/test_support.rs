//! Port fakes shared by service tests.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Duration, TimeZone, Utc};
use chronicle_core::{ActorId, AppError, AppResult};
use chronicle_domain::{
    ActorProfile, ArchiveFile, ArchiveFileName, AuditModule, AuditRecord, AuditRecordId,
    AuditRecordView, AuditStatus, ExportSchema, NewAuditRecord, OperationType,
};
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::{
    ArchiveDraft, ArchiveStorage, AuditFilter, AuditListQuery, AuditListSlice, AuditStore,
    ExpiredRecordCursor, RetentionLease, RetentionLeaseCoordinator,
};

pub(crate) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 10, 1, 2, 0, 0)
        .single()
        .unwrap_or_default()
}

pub(crate) fn actor(value: i64) -> ActorId {
    ActorId::new(value).unwrap_or_else(|error| panic!("test actor id is invalid: {error}"))
}

pub(crate) fn new_record(description: &str, created_at: DateTime<Utc>) -> NewAuditRecord {
    NewAuditRecord {
        actor_id: actor(7),
        operation_type: OperationType::Update,
        module: AuditModule::Banner,
        description: description.to_owned(),
        target_type: Some("banner".to_owned()),
        target_id: Some("42".to_owned()),
        ip_address: Some("198.51.100.4".to_owned()),
        request_params: None,
        status: AuditStatus::Success,
        created_at,
    }
}

#[derive(Default)]
pub(crate) struct FakeAuditStore {
    rows: Mutex<Vec<AuditRecordView>>,
    next_id: AtomicI64,
    pub(crate) fail_appends: AtomicBool,
    pub(crate) fail_selects: AtomicBool,
    pub(crate) fail_deletes: AtomicBool,
    pub(crate) select_delay_secs: AtomicU64,
    pub(crate) delete_calls: Mutex<Vec<Vec<AuditRecordId>>>,
}

impl FakeAuditStore {
    pub(crate) async fn seed_days_ago(&self, description: &str, days: i64) -> AuditRecordId {
        let created_at = fixed_now() - Duration::days(days);
        match self.append(new_record(description, created_at)).await {
            Ok(record) => record.id,
            Err(error) => panic!("seeding fake store failed: {error}"),
        }
    }

    pub(crate) async fn len(&self) -> usize {
        self.rows.lock().await.len()
    }

    pub(crate) async fn descriptions(&self) -> Vec<String> {
        self.rows
            .lock()
            .await
            .iter()
            .map(|view| view.record.description.clone())
            .collect()
    }
}

#[async_trait]
impl AuditStore for FakeAuditStore {
    async fn append(&self, record: NewAuditRecord) -> AppResult<AuditRecord> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(AppError::Internal("audit store unavailable".to_owned()));
        }

        let id = AuditRecordId::from_i64(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let record = AuditRecord::from_new(id, record);
        self.rows.lock().await.push(AuditRecordView::new(
            record.clone(),
            Some(ActorProfile {
                username: format!("admin{}", record.actor_id),
                email: Some("admin@example.com".to_owned()),
                phone: Some("13800000000".to_owned()),
            }),
        ));
        Ok(record)
    }

    async fn find(&self, id: AuditRecordId) -> AppResult<Option<AuditRecordView>> {
        Ok(self
            .rows
            .lock()
            .await
            .iter()
            .find(|view| view.record.id == id)
            .cloned())
    }

    async fn list(&self, query: &AuditListQuery) -> AppResult<AuditListSlice> {
        let mut matching: Vec<AuditRecordView> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|view| query.filter.matches(view))
            .cloned()
            .collect();
        matching.sort_by(|left, right| query.sort.compare(left, right));
        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.offset() as usize)
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
            .rows
            .lock()
            .await
            .iter()
            .filter(|view| filter.matches(view))
            .filter(|view| before.is_none_or(|before| view.record.id < before))
            .cloned()
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
        let delay = self.select_delay_secs.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(std::time::Duration::from_secs(delay)).await;
        }
        if self.fail_selects.load(Ordering::SeqCst) {
            return Err(AppError::Internal("audit store unavailable".to_owned()));
        }

        let mut matching: Vec<AuditRecordView> = self
            .rows
            .lock()
            .await
            .iter()
            .filter(|view| view.record.created_at < cutoff)
            .filter(|view| after.is_none_or(|cursor| cursor.precedes(view)))
            .cloned()
            .collect();
        matching.sort_by_key(|view| (view.record.created_at, view.record.id));
        matching.truncate(limit);
        Ok(matching)
    }

    async fn delete_by_ids(&self, ids: &[AuditRecordId]) -> AppResult<u64> {
        self.delete_calls.lock().await.push(ids.to_vec());
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Internal("audit store unavailable".to_owned()));
        }

        let mut rows = self.rows.lock().await;
        let before = rows.len();
        rows.retain(|view| !ids.contains(&view.record.id));
        Ok((before - rows.len()) as u64)
    }

    async fn stored_columns(&self) -> AppResult<Vec<String>> {
        Ok(ExportSchema::current()
            .stored_column_names()
            .into_iter()
            .map(ToOwned::to_owned)
            .collect())
    }
}

#[derive(Debug, Clone)]
pub(crate) struct StoredArchive {
    pub(crate) file: ArchiveFile,
    pub(crate) rows: Vec<AuditRecordId>,
}

#[derive(Default)]
pub(crate) struct FakeArchiveStorage {
    archives: Arc<Mutex<BTreeMap<String, StoredArchive>>>,
    sequence: Arc<AtomicI64>,
    pub(crate) fail_appends: AtomicBool,
    pub(crate) fail_deletes: AtomicBool,
    pub(crate) discarded: Arc<AtomicI64>,
}

impl FakeArchiveStorage {
    pub(crate) async fn archives(&self) -> Vec<StoredArchive> {
        self.archives.lock().await.values().cloned().collect()
    }

    pub(crate) async fn insert_existing(&self, generated_at: DateTime<Utc>) -> ArchiveFileName {
        let name = ArchiveFileName::new(generated_at - Duration::days(90), generated_at);
        self.archives.lock().await.insert(
            name.as_str().to_owned(),
            StoredArchive {
                file: ArchiveFile {
                    name: name.clone(),
                    created_at: generated_at,
                    size_bytes: 128,
                    record_count: None,
                },
                rows: Vec::new(),
            },
        );
        name
    }
}

struct FakeArchiveDraft {
    name: ArchiveFileName,
    archives: Arc<Mutex<BTreeMap<String, StoredArchive>>>,
    sequence: Arc<AtomicI64>,
    discarded: Arc<AtomicI64>,
    fail_appends: bool,
    rows: Vec<AuditRecordId>,
}

#[async_trait]
impl ArchiveStorage for FakeArchiveStorage {
    async fn begin_archive(
        &self,
        name: ArchiveFileName,
        _schema: &ExportSchema,
    ) -> AppResult<Box<dyn ArchiveDraft>> {
        Ok(Box::new(FakeArchiveDraft {
            name,
            archives: self.archives.clone(),
            sequence: self.sequence.clone(),
            discarded: self.discarded.clone(),
            fail_appends: self.fail_appends.load(Ordering::SeqCst),
            rows: Vec::new(),
        }))
    }

    async fn inspect_archive(&self, name: &ArchiveFileName) -> AppResult<Option<ArchiveFile>> {
        Ok(self
            .archives
            .lock()
            .await
            .get(name.as_str())
            .map(|archive| archive.file.clone()))
    }

    async fn list_archives(&self) -> AppResult<Vec<ArchiveFile>> {
        Ok(self
            .archives
            .lock()
            .await
            .values()
            .map(|archive| archive.file.clone())
            .collect())
    }

    async fn delete_archive(&self, name: &ArchiveFileName) -> AppResult<()> {
        if self.fail_deletes.load(Ordering::SeqCst) {
            return Err(AppError::Internal("backup directory is read-only".to_owned()));
        }

        self.archives.lock().await.remove(name.as_str());
        Ok(())
    }
}

#[async_trait]
impl ArchiveDraft for FakeArchiveDraft {
    async fn append(&mut self, rows: &[AuditRecordView]) -> AppResult<()> {
        if self.fail_appends {
            return Err(AppError::Internal("no space left on device".to_owned()));
        }

        self.rows.extend(rows.iter().map(|view| view.record.id));
        Ok(())
    }

    fn rows_written(&self) -> u64 {
        self.rows.len() as u64
    }

    async fn finish(self: Box<Self>) -> AppResult<ArchiveFile> {
        let Self {
            name,
            archives,
            sequence,
            rows,
            ..
        } = *self;
        let sequence = sequence.fetch_add(1, Ordering::SeqCst);
        let file = ArchiveFile {
            name: name.clone(),
            created_at: fixed_now() + Duration::seconds(sequence),
            size_bytes: 64 + rows.len() as u64,
            record_count: Some(rows.len() as u64),
        };
        archives.lock().await.insert(
            name.as_str().to_owned(),
            StoredArchive {
                file: file.clone(),
                rows,
            },
        );
        Ok(file)
    }

    async fn discard(self: Box<Self>) -> AppResult<()> {
        self.discarded.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Lease fake honouring the requested TTL on the tokio clock.
#[derive(Default)]
pub(crate) struct FakeLeaseCoordinator {
    held: Mutex<Option<(RetentionLease, Instant)>>,
    pub(crate) deny_acquire: AtomicBool,
    pub(crate) renewals: AtomicUsize,
    /// 1-based renewal call at which the lease is taken away.
    pub(crate) lose_on_renewal: AtomicUsize,
}

fn lease_deadline(lease_seconds: u32) -> Instant {
    Instant::now() + std::time::Duration::from_secs(u64::from(lease_seconds))
}

#[async_trait]
impl RetentionLeaseCoordinator for FakeLeaseCoordinator {
    async fn try_acquire_lease(
        &self,
        scope_key: &str,
        holder_id: &str,
        lease_seconds: u32,
    ) -> AppResult<Option<RetentionLease>> {
        if self.deny_acquire.load(Ordering::SeqCst) {
            return Ok(None);
        }

        let mut held = self.held.lock().await;
        if held
            .as_ref()
            .is_some_and(|(_, expires_at)| *expires_at > Instant::now())
        {
            return Ok(None);
        }

        let lease = RetentionLease {
            scope_key: scope_key.to_owned(),
            token: format!("{holder_id}:1"),
            holder_id: holder_id.to_owned(),
        };
        *held = Some((lease.clone(), lease_deadline(lease_seconds)));
        Ok(Some(lease))
    }

    async fn release_lease(&self, lease: &RetentionLease) -> AppResult<()> {
        let mut held = self.held.lock().await;
        if held.as_ref().is_some_and(|(current, _)| current == lease) {
            *held = None;
        }
        Ok(())
    }

    async fn renew_lease(&self, lease: &RetentionLease, lease_seconds: u32) -> AppResult<bool> {
        let call = self.renewals.fetch_add(1, Ordering::SeqCst) + 1;
        let mut held = self.held.lock().await;
        if self.lose_on_renewal.load(Ordering::SeqCst) == call {
            *held = None;
            return Ok(false);
        }

        match held.as_mut() {
            Some((current, expires_at)) if current == lease && *expires_at > Instant::now() => {
                *expires_at = lease_deadline(lease_seconds);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

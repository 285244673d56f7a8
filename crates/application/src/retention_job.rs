use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, Utc};
use chronicle_core::{AppError, AppResult};
use chronicle_domain::{ArchiveFile, ArchiveFileName, AuditRecordId, AuditRecordView};
use tracing::{error, info, warn};

use crate::archive_builder::discard_quietly;
use crate::{
    ArchiveBuilder, ArchiveDraft, ArchiveRotation, AuditStore, ExpiredRecordCursor,
    RetentionLease, RetentionLeaseCoordinator, SchemaProjector,
};

/// Lease scope shared by every retention worker instance.
pub const RETENTION_LEASE_SCOPE: &str = "audit_retention";

/// Validated retention settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionPolicy {
    retention_days: u32,
    keep_count: usize,
    batch_size: usize,
    lease_seconds: u32,
    holder_id: String,
}

impl RetentionPolicy {
    /// Creates a policy; every numeric setting must be positive.
    pub fn new(
        retention_days: u32,
        keep_count: usize,
        batch_size: usize,
        lease_seconds: u32,
        holder_id: impl Into<String>,
    ) -> AppResult<Self> {
        if retention_days == 0 {
            return Err(AppError::Validation(
                "retention_days must be greater than zero".to_owned(),
            ));
        }
        if keep_count == 0 {
            return Err(AppError::Validation(
                "archive keep_count must be greater than zero".to_owned(),
            ));
        }
        if batch_size == 0 {
            return Err(AppError::Validation(
                "retention batch_size must be greater than zero".to_owned(),
            ));
        }
        if lease_seconds == 0 {
            return Err(AppError::Validation(
                "retention lease_seconds must be greater than zero".to_owned(),
            ));
        }

        let holder_id = holder_id.into();
        if holder_id.trim().is_empty() {
            return Err(AppError::Validation(
                "retention holder_id must not be empty".to_owned(),
            ));
        }

        Ok(Self {
            retention_days,
            keep_count,
            batch_size,
            lease_seconds,
            holder_id,
        })
    }

    /// Records created strictly before this instant are eligible.
    #[must_use]
    pub fn cutoff(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - Duration::days(i64::from(self.retention_days))
    }

    /// Returns the retention window in days.
    #[must_use]
    pub fn retention_days(&self) -> u32 {
        self.retention_days
    }

    /// Returns the number of archives kept after rotation.
    #[must_use]
    pub fn keep_count(&self) -> usize {
        self.keep_count
    }

    /// Returns the selection batch size.
    #[must_use]
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Returns the lease holder identity of this instance.
    #[must_use]
    pub fn holder_id(&self) -> &str {
        self.holder_id.as_str()
    }
}

/// Steps of one retention run, used in log fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetentionPhase {
    /// Reading expired rows.
    Selecting,
    /// Writing rows into the archive draft.
    Building,
    /// Checking the finished archive.
    Verifying,
    /// Deleting archived rows.
    Purging,
    /// Removing old archives.
    Rotating,
}

impl RetentionPhase {
    /// Returns the log value of this phase.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Selecting => "selecting",
            Self::Building => "building",
            Self::Verifying => "verifying",
            Self::Purging => "purging",
            Self::Rotating => "rotating",
        }
    }
}

/// Why a tick did not run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another run is active in this process.
    AlreadyRunning,
    /// Another instance holds the retention lease.
    LeaseHeld,
}

/// Summary of a run that archived and purged rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetentionRunReport {
    /// Records created before this instant were eligible.
    pub cutoff: DateTime<Utc>,
    /// Archive holding the purged rows.
    pub archive: ArchiveFile,
    /// Rows written to the archive.
    pub exported: u64,
    /// Rows deleted from the store.
    pub deleted: u64,
    /// Archives removed by rotation.
    pub rotated: Vec<ArchiveFileName>,
}

/// Result of one scheduled tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetentionRunOutcome {
    /// The tick did not run.
    Skipped(SkipReason),
    /// No record was older than the cutoff.
    NothingToArchive {
        /// Cutoff used for selection.
        cutoff: DateTime<Utc>,
    },
    /// Rows were archived and purged.
    Completed(RetentionRunReport),
}

struct RunGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> RunGuard<'a> {
    fn try_acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { running })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

/// Scheduled archive-then-purge of expired audit records.
///
/// Rows are deleted only after they were written to an archive that was
/// verified on disk, and only by the exact id set that was written.
#[derive(Clone)]
pub struct RetentionJob {
    store: Arc<dyn AuditStore>,
    builder: ArchiveBuilder,
    rotation: ArchiveRotation,
    projector: SchemaProjector,
    lease_coordinator: Arc<dyn RetentionLeaseCoordinator>,
    policy: RetentionPolicy,
    running: Arc<AtomicBool>,
}

impl RetentionJob {
    /// Creates a retention job.
    #[must_use]
    pub fn new(
        store: Arc<dyn AuditStore>,
        builder: ArchiveBuilder,
        rotation: ArchiveRotation,
        lease_coordinator: Arc<dyn RetentionLeaseCoordinator>,
        policy: RetentionPolicy,
    ) -> Self {
        Self {
            projector: SchemaProjector::new(store.clone()),
            store,
            builder,
            rotation,
            lease_coordinator,
            policy,
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the active policy.
    #[must_use]
    pub fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Executes one tick at `now`.
    pub async fn run(&self, now: DateTime<Utc>) -> AppResult<RetentionRunOutcome> {
        let Some(_guard) = RunGuard::try_acquire(self.running.as_ref()) else {
            warn!("audit retention run skipped, previous run still active");
            return Ok(RetentionRunOutcome::Skipped(SkipReason::AlreadyRunning));
        };

        let Some(lease) = self
            .lease_coordinator
            .try_acquire_lease(
                RETENTION_LEASE_SCOPE,
                self.policy.holder_id.as_str(),
                self.policy.lease_seconds,
            )
            .await?
        else {
            info!(
                holder_id = %self.policy.holder_id,
                "audit retention run skipped, lease held by another instance"
            );
            return Ok(RetentionRunOutcome::Skipped(SkipReason::LeaseHeld));
        };

        let outcome = self.run_with_lease(now, &lease).await;

        if let Err(error) = self.lease_coordinator.release_lease(&lease).await {
            warn!(error = %error, "failed to release audit retention lease");
        }

        outcome
    }

    async fn run_with_lease(
        &self,
        now: DateTime<Utc>,
        lease: &RetentionLease,
    ) -> AppResult<RetentionRunOutcome> {
        let cutoff = self.policy.cutoff(now);
        info!(
            phase = RetentionPhase::Selecting.as_str(),
            cutoff = %cutoff,
            retention_days = self.policy.retention_days,
            "audit retention run started"
        );

        let first_batch = self
            .store
            .select_expired_batch(cutoff, None, self.policy.batch_size)
            .await
            .inspect_err(|error| log_abort(RetentionPhase::Selecting, error))?;
        if first_batch.is_empty() {
            info!(cutoff = %cutoff, "no audit records older than cutoff");
            return Ok(RetentionRunOutcome::NothingToArchive { cutoff });
        }

        let schema = self.projector.project().await;
        let name = ArchiveFileName::new(cutoff, now);
        let mut draft = self
            .builder
            .begin(name.clone(), &schema)
            .await
            .inspect_err(|error| log_abort(RetentionPhase::Building, error))?;

        let ids = match self
            .write_expired(draft.as_mut(), &name, lease, cutoff, first_batch)
            .await
        {
            Ok(ids) => ids,
            Err(error) => {
                discard_quietly(draft).await;
                return Err(error);
            }
        };

        let archive = self
            .seal(draft, &ids)
            .await
            .inspect_err(|error| log_abort(RetentionPhase::Verifying, error))?;
        let exported = ids.len() as u64;
        info!(
            phase = RetentionPhase::Verifying.as_str(),
            archive = archive.name.as_str(),
            size_bytes = archive.size_bytes,
            rows = exported,
            "audit archive verified"
        );

        if !self
            .lease_coordinator
            .renew_lease(lease, self.policy.lease_seconds)
            .await?
        {
            let error = AppError::Conflict(format!(
                "retention lease lost before purge, archive '{}' retained and no rows deleted",
                archive.name.as_str()
            ));
            log_abort(RetentionPhase::Purging, &error);
            return Err(error);
        }

        let deleted = match self.store.delete_by_ids(&ids).await {
            Ok(deleted) => deleted,
            Err(purge_error) => {
                error!(
                    phase = RetentionPhase::Purging.as_str(),
                    archive = archive.name.as_str(),
                    rows = exported,
                    error = %purge_error,
                    "audit purge failed, archived rows remain in the store"
                );
                return Err(AppError::Internal(format!(
                    "audit purge failed after writing archive '{}': {purge_error}",
                    archive.name.as_str()
                )));
            }
        };
        if deleted < exported {
            warn!(
                phase = RetentionPhase::Purging.as_str(),
                exported,
                deleted,
                "fewer audit rows deleted than archived"
            );
        }

        let rotated = match self.rotation.enforce_retention(self.policy.keep_count).await {
            Ok(rotated) => rotated,
            Err(error) => {
                warn!(
                    phase = RetentionPhase::Rotating.as_str(),
                    error = %error,
                    "audit archive rotation failed"
                );
                Vec::new()
            }
        };

        info!(
            archive = archive.name.as_str(),
            exported,
            deleted,
            rotated = rotated.len(),
            "audit retention run completed"
        );

        Ok(RetentionRunOutcome::Completed(RetentionRunReport {
            cutoff,
            archive,
            exported,
            deleted,
            rotated,
        }))
    }

    /// Streams every expired row into `draft`, renewing the lease after each
    /// batch so long runs keep ownership.
    async fn write_expired(
        &self,
        draft: &mut dyn ArchiveDraft,
        name: &ArchiveFileName,
        lease: &RetentionLease,
        cutoff: DateTime<Utc>,
        first_batch: Vec<AuditRecordView>,
    ) -> AppResult<Vec<AuditRecordId>> {
        let mut ids = Vec::new();
        let mut batch = first_batch;

        loop {
            draft
                .append(&batch)
                .await
                .inspect_err(|error| log_abort(RetentionPhase::Building, error))?;
            ids.extend(batch.iter().map(|view| view.record.id));
            self.keep_lease(lease, name).await?;

            let Some(last) = batch.last() else {
                break;
            };
            if batch.len() < self.policy.batch_size {
                break;
            }

            let cursor = ExpiredRecordCursor::after(last);
            batch = self
                .store
                .select_expired_batch(cutoff, Some(cursor), self.policy.batch_size)
                .await
                .inspect_err(|error| log_abort(RetentionPhase::Selecting, error))?;
            if batch.is_empty() {
                break;
            }
        }

        self.keep_lease(lease, name).await?;
        Ok(ids)
    }

    async fn keep_lease(
        &self,
        lease: &RetentionLease,
        archive: &ArchiveFileName,
    ) -> AppResult<()> {
        let renewed = self
            .lease_coordinator
            .renew_lease(lease, self.policy.lease_seconds)
            .await
            .inspect_err(|error| log_abort(RetentionPhase::Building, error))?;
        if renewed {
            return Ok(());
        }

        let error = AppError::Conflict(format!(
            "retention lease lost while building archive '{}', nothing purged",
            archive.as_str()
        ));
        log_abort(RetentionPhase::Building, &error);
        Err(error)
    }

    async fn seal(
        &self,
        draft: Box<dyn ArchiveDraft>,
        ids: &[AuditRecordId],
    ) -> AppResult<ArchiveFile> {
        let expected_rows = ids.len() as u64;
        if draft.rows_written() != expected_rows {
            let rows_written = draft.rows_written();
            discard_quietly(draft).await;
            return Err(AppError::Internal(format!(
                "archive draft holds {rows_written} rows, expected {expected_rows}"
            )));
        }

        let archive = draft.finish().await?;
        self.builder.verify(&archive, expected_rows).await?;
        Ok(archive)
    }
}

fn log_abort(phase: RetentionPhase, error: &AppError) {
    error!(
        phase = phase.as_str(),
        error = %error,
        "audit retention run aborted, nothing purged"
    );
}

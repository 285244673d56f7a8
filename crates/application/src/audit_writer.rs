use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use chronicle_core::{ActorId, AppResult, NonEmptyString};
use chronicle_domain::{
    AuditModule, AuditRecord, AuditStatus, NewAuditRecord, OperationType, RequestContext,
};
use tracing::{error, info};

use crate::AuditStore;

/// Caller-supplied fields of one audit event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordAuditInput {
    /// Acting principal.
    pub actor_id: ActorId,
    /// Kind of mutation.
    pub operation_type: OperationType,
    /// Functional area.
    pub module: AuditModule,
    /// Human-readable summary.
    pub description: String,
    /// Optional target type tag.
    pub target_type: Option<String>,
    /// Optional stringified target identifier.
    pub target_id: Option<String>,
    /// Action outcome.
    pub status: AuditStatus,
}

impl RecordAuditInput {
    /// Creates a successful event without a target reference.
    #[must_use]
    pub fn new(
        actor_id: ActorId,
        operation_type: OperationType,
        module: AuditModule,
        description: impl Into<String>,
    ) -> Self {
        Self {
            actor_id,
            operation_type,
            module,
            description: description.into(),
            target_type: None,
            target_id: None,
            status: AuditStatus::Success,
        }
    }

    /// Attaches the affected entity.
    #[must_use]
    pub fn with_target(mut self, target_type: impl Into<String>, target_id: impl ToString) -> Self {
        self.target_type = Some(target_type.into());
        self.target_id = Some(target_id.to_string());
        self
    }

    /// Overrides the outcome.
    #[must_use]
    pub fn with_status(mut self, status: AuditStatus) -> Self {
        self.status = status;
        self
    }
}

/// Best-effort audit ingest used by every privileged business operation.
///
/// Persistence failures never reach the caller; they are logged under the
/// `audit` target and counted so the host can alert on lost rows.
#[derive(Clone)]
pub struct AuditWriter {
    store: Arc<dyn AuditStore>,
    failed_writes: Arc<AtomicU64>,
}

impl AuditWriter {
    /// Creates a writer over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn AuditStore>) -> Self {
        Self {
            store,
            failed_writes: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Records one event; returns `None` when the row could not be persisted.
    pub async fn record(
        &self,
        input: RecordAuditInput,
        context: &RequestContext,
    ) -> Option<AuditRecord> {
        let actor_id = input.actor_id;
        let module = input.module;
        let operation_type = input.operation_type;

        match self.try_record(input, context).await {
            Ok(record) => {
                info!(
                    target: "audit",
                    audit_id = %record.id,
                    actor_id = %actor_id,
                    module = module.as_str(),
                    operation = operation_type.as_str(),
                    "audit record stored"
                );
                Some(record)
            }
            Err(error) => {
                let failed_total = self.failed_writes.fetch_add(1, Ordering::Relaxed) + 1;
                error!(
                    target: "audit",
                    actor_id = %actor_id,
                    module = module.as_str(),
                    operation = operation_type.as_str(),
                    failed_total,
                    error = %error,
                    "audit record lost"
                );
                None
            }
        }
    }

    /// Number of events lost since start-up.
    #[must_use]
    pub fn failed_writes(&self) -> u64 {
        self.failed_writes.load(Ordering::Relaxed)
    }

    async fn try_record(
        &self,
        input: RecordAuditInput,
        context: &RequestContext,
    ) -> AppResult<AuditRecord> {
        let description = NonEmptyString::new(input.description)?;

        self.store
            .append(NewAuditRecord {
                actor_id: input.actor_id,
                operation_type: input.operation_type,
                module: input.module,
                description: description.into(),
                target_type: non_blank(input.target_type),
                target_id: non_blank(input.target_id),
                ip_address: non_blank(context.ip_address.clone()),
                request_params: context.sanitized_params(),
                status: input.status,
                created_at: Utc::now(),
            })
            .await
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

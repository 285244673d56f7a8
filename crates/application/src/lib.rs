//! Application services and ports for audit ingest, query and retention.

#![forbid(unsafe_code)]

mod archive_builder;
mod archive_ports;
mod archive_rotation;
mod audit_ports;
mod audit_query_service;
mod audit_writer;
mod retention_job;
mod retention_ports;
mod schema_projector;

#[cfg(test)]
mod test_support;

pub use archive_builder::ArchiveBuilder;
pub use archive_ports::{ArchiveDraft, ArchiveStorage};
pub use archive_rotation::ArchiveRotation;
pub use audit_ports::{
    AuditFilter, AuditListQuery, AuditListSlice, AuditPage, AuditSort, AuditSortField,
    AuditStore, DEFAULT_PAGE_SIZE, ExpiredRecordCursor, MAX_PAGE_SIZE, SortDirection,
};
pub use audit_query_service::{AuditQueryService, DEFAULT_EXPORT_BATCH_SIZE};
pub use audit_writer::{AuditWriter, RecordAuditInput};
pub use retention_job::{
    RETENTION_LEASE_SCOPE, RetentionJob, RetentionPhase, RetentionPolicy, RetentionRunOutcome,
    RetentionRunReport, SkipReason,
};
pub use retention_ports::{RetentionLease, RetentionLeaseCoordinator};
pub use schema_projector::SchemaProjector;

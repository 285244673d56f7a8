//! Domain entities and invariants.

#![forbid(unsafe_code)]

mod archive;
mod audit;
pub mod csv;
mod export_schema;
mod request_context;
mod schedule;

pub use archive::{ArchiveFile, ArchiveFileName};
pub use audit::{
    ActorProfile, AuditModule, AuditRecord, AuditRecordId, AuditRecordView, AuditStatus,
    NewAuditRecord, OperationType,
};
pub use export_schema::{ExportColumn, ExportSchema};
pub use request_context::{REDACTED_MARKER, RequestContext, is_sensitive_key, redact_value};
pub use schedule::QuarterlySchedule;

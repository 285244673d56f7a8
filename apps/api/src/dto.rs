mod audit;
mod common;

pub use audit::{
    ActorResponse, AuditPageResponse, AuditRecordResponse, RecordAuditRequest,
    RecordAuditResponse, RequestSnapshot,
};
pub use common::HealthResponse;

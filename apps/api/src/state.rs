use std::sync::Arc;

use chronicle_application::{AuditQueryService, AuditWriter};
use ipnet::IpNet;

/// Shared API application state.
#[derive(Clone)]
pub struct AppState {
    pub query_service: AuditQueryService,
    pub audit_writer: AuditWriter,
    pub ingest_secret: Arc<str>,
    pub trusted_proxies: Arc<[IpNet]>,
}

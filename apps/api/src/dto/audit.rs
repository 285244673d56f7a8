use std::collections::BTreeMap;

use chrono::SecondsFormat;
use chronicle_application::AuditPage;
use chronicle_domain::{ActorProfile, AuditRecord, AuditRecordView};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

/// API representation of the acting administrative user.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/audit-actor-response.ts"
)]
pub struct ActorResponse {
    pub username: String,
    pub email: Option<String>,
    pub phone: Option<String>,
}

/// API representation of one audit record.
///
/// Identifiers are rendered as decimal strings so 64-bit values survive
/// JavaScript clients.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/audit-record-response.ts"
)]
pub struct AuditRecordResponse {
    pub id: String,
    pub actor_id: String,
    pub operation_type: String,
    pub module: String,
    pub description: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub ip_address: Option<String>,
    #[ts(type = "unknown")]
    pub request_params: Option<Value>,
    pub status: String,
    pub created_at: String,
    pub actor: Option<ActorResponse>,
    #[ts(type = "Record<string, unknown>")]
    pub extra_fields: BTreeMap<String, Value>,
}

/// One page of audit records.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/audit-page-response.ts"
)]
pub struct AuditPageResponse {
    pub items: Vec<AuditRecordResponse>,
    #[ts(type = "number")]
    pub total: u64,
    pub page: u32,
    pub page_size: u32,
    #[ts(type = "number")]
    pub total_pages: u64,
}

/// Request data captured by the calling module, redacted before storage.
#[derive(Debug, Default, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/request-snapshot.ts"
)]
pub struct RequestSnapshot {
    #[ts(type = "unknown")]
    pub query: Option<Value>,
    #[ts(type = "unknown")]
    pub body: Option<Value>,
    #[ts(type = "unknown")]
    pub params: Option<Value>,
}

/// Incoming audit event from an out-of-process module.
#[derive(Debug, Deserialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/record-audit-request.ts"
)]
pub struct RecordAuditRequest {
    #[ts(type = "number")]
    pub actor_id: i64,
    pub operation_type: String,
    pub module: String,
    pub description: String,
    pub target_type: Option<String>,
    pub target_id: Option<String>,
    pub status: Option<String>,
    /// End-user address as seen by the calling module.
    pub client_ip: Option<String>,
    #[serde(default)]
    #[ts(optional)]
    pub request: Option<RequestSnapshot>,
}

/// Ingest acknowledgement; `recorded` is false when the row was lost.
#[derive(Debug, Serialize, TS)]
#[ts(
    export,
    export_to = "../../../packages/api-types/src/generated/record-audit-response.ts"
)]
pub struct RecordAuditResponse {
    pub recorded: bool,
    pub id: Option<String>,
}

impl From<ActorProfile> for ActorResponse {
    fn from(value: ActorProfile) -> Self {
        Self {
            username: value.username,
            email: value.email,
            phone: value.phone,
        }
    }
}

impl From<AuditRecordView> for AuditRecordResponse {
    fn from(value: AuditRecordView) -> Self {
        let AuditRecordView {
            record,
            actor,
            extra_fields,
        } = value;

        Self {
            id: record.id.to_string(),
            actor_id: record.actor_id.to_string(),
            operation_type: record.operation_type.as_str().to_owned(),
            module: record.module.as_str().to_owned(),
            description: record.description,
            target_type: record.target_type,
            target_id: record.target_id,
            ip_address: record.ip_address,
            request_params: record.request_params,
            status: record.status.as_str().to_owned(),
            created_at: record
                .created_at
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            actor: actor.map(ActorResponse::from),
            extra_fields,
        }
    }
}

impl From<AuditPage> for AuditPageResponse {
    fn from(value: AuditPage) -> Self {
        Self {
            items: value
                .items
                .into_iter()
                .map(AuditRecordResponse::from)
                .collect(),
            total: value.total,
            page: value.page,
            page_size: value.page_size,
            total_pages: value.total_pages,
        }
    }
}

impl From<Option<AuditRecord>> for RecordAuditResponse {
    fn from(value: Option<AuditRecord>) -> Self {
        Self {
            recorded: value.is_some(),
            id: value.map(|record| record.id.to_string()),
        }
    }
}

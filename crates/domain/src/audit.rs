use std::collections::BTreeMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chronicle_core::{ActorId, AppError};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Store-assigned audit record identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuditRecordId(i64);

impl AuditRecordId {
    /// Wraps a raw identifier assigned by the store.
    #[must_use]
    pub fn from_i64(value: i64) -> Self {
        Self(value)
    }

    /// Returns the raw identifier value.
    #[must_use]
    pub fn as_i64(&self) -> i64 {
        self.0
    }
}

impl Display for AuditRecordId {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}", self.0)
    }
}

/// Kind of privileged mutation that was audited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationType {
    /// A resource was created.
    Create,
    /// A resource was updated.
    Update,
    /// A resource was deleted.
    Delete,
    /// A resource was published.
    Publish,
    /// A resource was taken offline.
    Unpublish,
    /// A resource was enabled.
    Enable,
    /// A resource was disabled.
    Disable,
}

impl OperationType {
    /// Returns a stable storage value for this operation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Publish => "publish",
            Self::Unpublish => "unpublish",
            Self::Enable => "enable",
            Self::Disable => "disable",
        }
    }

    /// Returns all known operation types.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[OperationType] = &[
            OperationType::Create,
            OperationType::Update,
            OperationType::Delete,
            OperationType::Publish,
            OperationType::Unpublish,
            OperationType::Enable,
            OperationType::Disable,
        ];

        ALL
    }
}

impl FromStr for OperationType {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "create" => Ok(Self::Create),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "publish" => Ok(Self::Publish),
            "unpublish" => Ok(Self::Unpublish),
            "enable" => Ok(Self::Enable),
            "disable" => Ok(Self::Disable),
            _ => Err(AppError::Validation(format!(
                "unknown operation type '{value}'"
            ))),
        }
    }
}

/// Functional area of the content-management backend that was acted upon.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditModule {
    /// Home page banners.
    Banner,
    /// News articles.
    News,
    /// Customer case studies.
    CaseStudy,
    /// Product catalogue.
    Product,
    /// Customer showcase.
    Customer,
    /// Recruitment postings.
    Recruitment,
    /// Media library.
    Media,
    /// Administrative users.
    User,
    /// Roles and permissions.
    Role,
    /// Site-wide settings.
    SystemSetting,
}

impl AuditModule {
    /// Returns a stable storage value for this module.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Banner => "banner",
            Self::News => "news",
            Self::CaseStudy => "case_study",
            Self::Product => "product",
            Self::Customer => "customer",
            Self::Recruitment => "recruitment",
            Self::Media => "media",
            Self::User => "user",
            Self::Role => "role",
            Self::SystemSetting => "system_setting",
        }
    }

    /// Returns all known modules.
    #[must_use]
    pub fn all() -> &'static [Self] {
        const ALL: &[AuditModule] = &[
            AuditModule::Banner,
            AuditModule::News,
            AuditModule::CaseStudy,
            AuditModule::Product,
            AuditModule::Customer,
            AuditModule::Recruitment,
            AuditModule::Media,
            AuditModule::User,
            AuditModule::Role,
            AuditModule::SystemSetting,
        ];

        ALL
    }
}

impl FromStr for AuditModule {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "banner" => Ok(Self::Banner),
            "news" => Ok(Self::News),
            "case_study" => Ok(Self::CaseStudy),
            "product" => Ok(Self::Product),
            "customer" => Ok(Self::Customer),
            "recruitment" => Ok(Self::Recruitment),
            "media" => Ok(Self::Media),
            "user" => Ok(Self::User),
            "role" => Ok(Self::Role),
            "system_setting" => Ok(Self::SystemSetting),
            _ => Err(AppError::Validation(format!("unknown audit module '{value}'"))),
        }
    }
}

/// Outcome of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// The action completed.
    #[default]
    Success,
    /// The action was attempted and failed.
    Failed,
}

impl AuditStatus {
    /// Returns a stable storage value for this status.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl FromStr for AuditStatus {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!("unknown audit status '{value}'"))),
        }
    }
}

/// Audit row as written by the ingest path, before the store assigns an id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewAuditRecord {
    /// Acting principal.
    pub actor_id: ActorId,
    /// Kind of mutation.
    pub operation_type: OperationType,
    /// Functional area.
    pub module: AuditModule,
    /// Human-readable summary supplied by the caller.
    pub description: String,
    /// Optional target type tag.
    pub target_type: Option<String>,
    /// Optional stringified target identifier.
    pub target_id: Option<String>,
    /// Best-effort client address.
    pub ip_address: Option<String>,
    /// Redacted request snapshot.
    pub request_params: Option<Value>,
    /// Action outcome.
    pub status: AuditStatus,
    /// Creation timestamp, the ordering and retention key.
    pub created_at: DateTime<Utc>,
}

/// One immutable persisted audit row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecord {
    /// Store-assigned identifier.
    pub id: AuditRecordId,
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
    /// Best-effort client address.
    pub ip_address: Option<String>,
    /// Redacted request snapshot.
    pub request_params: Option<Value>,
    /// Action outcome.
    pub status: AuditStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl AuditRecord {
    /// Materializes a persisted record from an ingest payload and its assigned id.
    #[must_use]
    pub fn from_new(id: AuditRecordId, record: NewAuditRecord) -> Self {
        Self {
            id,
            actor_id: record.actor_id,
            operation_type: record.operation_type,
            module: record.module,
            description: record.description,
            target_type: record.target_type,
            target_id: record.target_id,
            ip_address: record.ip_address,
            request_params: record.request_params,
            status: record.status,
            created_at: record.created_at,
        }
    }
}

/// Display fields of the acting administrative user.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct ActorProfile {
    /// Login name.
    pub username: String,
    /// Contact email.
    pub email: Option<String>,
    /// Contact phone.
    pub phone: Option<String>,
}

/// Audit record joined with actor display fields, as read back for listing and export.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditRecordView {
    /// The stored record.
    pub record: AuditRecord,
    /// Actor display fields; absent when the actor row no longer exists.
    pub actor: Option<ActorProfile>,
    /// Stored columns not covered by the export schema.
    pub extra_fields: BTreeMap<String, Value>,
}

impl AuditRecordView {
    /// Creates a view without extra columns.
    #[must_use]
    pub fn new(record: AuditRecord, actor: Option<ActorProfile>) -> Self {
        Self {
            record,
            actor,
            extra_fields: BTreeMap::new(),
        }
    }
}

use chrono::SecondsFormat;
use serde_json::Value;

use crate::audit::AuditRecordView;

/// Columns written by every audit CSV export, in header order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExportColumn {
    /// Record identifier.
    Id,
    /// Acting principal identifier.
    ActorId,
    /// Operation storage value.
    OperationType,
    /// Module storage value.
    Module,
    /// Free-text summary.
    Description,
    /// Target type tag.
    TargetType,
    /// Target identifier.
    TargetId,
    /// Client address.
    IpAddress,
    /// Redacted request snapshot as compact JSON.
    RequestParams,
    /// Outcome storage value.
    Status,
    /// Creation timestamp in ISO-8601 UTC.
    CreatedAt,
    /// Stored columns outside this schema, as a JSON object.
    ExtraFields,
    /// Joined actor login name.
    ActorUsername,
    /// Joined actor email.
    ActorEmail,
    /// Joined actor phone.
    ActorPhone,
}

impl ExportColumn {
    /// Returns the header name of this column.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::Id => "id",
            Self::ActorId => "actor_id",
            Self::OperationType => "operation_type",
            Self::Module => "module",
            Self::Description => "description",
            Self::TargetType => "target_type",
            Self::TargetId => "target_id",
            Self::IpAddress => "ip_address",
            Self::RequestParams => "request_params",
            Self::Status => "status",
            Self::CreatedAt => "created_at",
            Self::ExtraFields => "extra_fields",
            Self::ActorUsername => "actor_username",
            Self::ActorEmail => "actor_email",
            Self::ActorPhone => "actor_phone",
        }
    }

    /// Returns whether the column is joined from the actor table rather than stored.
    #[must_use]
    pub fn is_joined(&self) -> bool {
        matches!(
            self,
            Self::ActorUsername | Self::ActorEmail | Self::ActorPhone | Self::ExtraFields
        )
    }

    /// Extracts this column's cell text from one record; absent values become `""`.
    #[must_use]
    pub fn extract(&self, view: &AuditRecordView) -> String {
        let record = &view.record;
        match self {
            Self::Id => record.id.as_i64().to_string(),
            Self::ActorId => record.actor_id.as_i64().to_string(),
            Self::OperationType => record.operation_type.as_str().to_owned(),
            Self::Module => record.module.as_str().to_owned(),
            Self::Description => record.description.clone(),
            Self::TargetType => record.target_type.clone().unwrap_or_default(),
            Self::TargetId => record.target_id.clone().unwrap_or_default(),
            Self::IpAddress => record.ip_address.clone().unwrap_or_default(),
            Self::RequestParams => record
                .request_params
                .as_ref()
                .filter(|value| !value.is_null())
                .map(Value::to_string)
                .unwrap_or_default(),
            Self::Status => record.status.as_str().to_owned(),
            Self::CreatedAt => record
                .created_at
                .to_rfc3339_opts(SecondsFormat::Micros, true),
            Self::ExtraFields => {
                if view.extra_fields.is_empty() {
                    String::new()
                } else {
                    Value::Object(
                        view.extra_fields
                            .iter()
                            .map(|(key, value)| (key.clone(), value.clone()))
                            .collect(),
                    )
                    .to_string()
                }
            }
            Self::ActorUsername => view
                .actor
                .as_ref()
                .map(|actor| actor.username.clone())
                .unwrap_or_default(),
            Self::ActorEmail => view
                .actor
                .as_ref()
                .and_then(|actor| actor.email.clone())
                .unwrap_or_default(),
            Self::ActorPhone => view
                .actor
                .as_ref()
                .and_then(|actor| actor.phone.clone())
                .unwrap_or_default(),
        }
    }
}

/// Explicit, versioned export contract shared by scheduled archives and
/// on-demand exports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSchema {
    version: u16,
    columns: Vec<ExportColumn>,
}

impl ExportSchema {
    /// Returns the schema currently written by exports.
    #[must_use]
    pub fn current() -> Self {
        Self {
            version: 1,
            columns: vec![
                ExportColumn::Id,
                ExportColumn::ActorId,
                ExportColumn::OperationType,
                ExportColumn::Module,
                ExportColumn::Description,
                ExportColumn::TargetType,
                ExportColumn::TargetId,
                ExportColumn::IpAddress,
                ExportColumn::RequestParams,
                ExportColumn::Status,
                ExportColumn::CreatedAt,
                ExportColumn::ExtraFields,
                ExportColumn::ActorUsername,
                ExportColumn::ActorEmail,
                ExportColumn::ActorPhone,
            ],
        }
    }

    /// Returns the schema version.
    #[must_use]
    pub fn version(&self) -> u16 {
        self.version
    }

    /// Returns the ordered columns.
    #[must_use]
    pub fn columns(&self) -> &[ExportColumn] {
        self.columns.as_slice()
    }

    /// Returns the ordered header names.
    #[must_use]
    pub fn column_names(&self) -> Vec<&'static str> {
        self.columns.iter().map(ExportColumn::name).collect()
    }

    /// Returns the stored column names this schema maps directly.
    #[must_use]
    pub fn stored_column_names(&self) -> Vec<&'static str> {
        self.columns
            .iter()
            .filter(|column| !column.is_joined())
            .map(ExportColumn::name)
            .collect()
    }

    /// Extracts all cells of one record in column order.
    #[must_use]
    pub fn row(&self, view: &AuditRecordView) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| column.extract(view))
            .collect()
    }
}

use std::cmp::Ordering;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use chronicle_core::{AppError, AppResult};
use chronicle_domain::{AuditModule, AuditRecordId, AuditRecordView, AuditStatus, OperationType};

/// Default number of rows on one listing page.
pub const DEFAULT_PAGE_SIZE: u32 = 20;
/// Largest accepted listing page.
pub const MAX_PAGE_SIZE: u32 = 100;

/// Filters shared by listing and on-demand export.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditFilter {
    /// Case-insensitive substring over actor username or phone.
    pub actor_keyword: Option<String>,
    /// Exact module match.
    pub module: Option<AuditModule>,
    /// Exact operation match.
    pub operation_type: Option<OperationType>,
    /// Exact status match.
    pub status: Option<AuditStatus>,
    /// Inclusive lower creation bound.
    pub created_from: Option<DateTime<Utc>>,
    /// Exclusive upper creation bound.
    pub created_to: Option<DateTime<Utc>>,
    /// Case-insensitive substring over description or target id.
    pub keyword: Option<String>,
}

impl AuditFilter {
    /// Normalizes blank keywords away and checks the time range.
    pub fn normalized(self) -> AppResult<Self> {
        if let (Some(from), Some(to)) = (self.created_from, self.created_to) {
            if from > to {
                return Err(AppError::Validation(
                    "created_from must not be later than created_to".to_owned(),
                ));
            }
        }

        Ok(Self {
            actor_keyword: normalize_keyword(self.actor_keyword),
            keyword: normalize_keyword(self.keyword),
            ..self
        })
    }

    /// Evaluates the filter against one record in memory.
    #[must_use]
    pub fn matches(&self, view: &AuditRecordView) -> bool {
        let record = &view.record;

        if self.module.is_some_and(|module| module != record.module)
            || self
                .operation_type
                .is_some_and(|operation| operation != record.operation_type)
            || self.status.is_some_and(|status| status != record.status)
            || self.created_from.is_some_and(|from| record.created_at < from)
            || self.created_to.is_some_and(|to| record.created_at >= to)
        {
            return false;
        }

        if let Some(actor_keyword) = self.actor_keyword.as_deref() {
            let actor_matches = view.actor.as_ref().is_some_and(|actor| {
                contains_ignore_case(actor.username.as_str(), actor_keyword)
                    || actor
                        .phone
                        .as_deref()
                        .is_some_and(|phone| contains_ignore_case(phone, actor_keyword))
            });
            if !actor_matches {
                return false;
            }
        }

        if let Some(keyword) = self.keyword.as_deref() {
            let keyword_matches = contains_ignore_case(record.description.as_str(), keyword)
                || record
                    .target_id
                    .as_deref()
                    .is_some_and(|target_id| contains_ignore_case(target_id, keyword));
            if !keyword_matches {
                return false;
            }
        }

        true
    }
}

/// Allow-listed listing sort fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuditSortField {
    /// Creation time.
    #[default]
    CreatedAt,
    /// Module storage value.
    Module,
    /// Status storage value.
    Status,
    /// Operation storage value.
    OperationType,
    /// Actor username.
    Actor,
}

impl AuditSortField {
    /// Returns the transport value of this field.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::Module => "module",
            Self::Status => "status",
            Self::OperationType => "operation_type",
            Self::Actor => "actor",
        }
    }
}

impl FromStr for AuditSortField {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "created_at" | "time" => Ok(Self::CreatedAt),
            "module" => Ok(Self::Module),
            "status" => Ok(Self::Status),
            "operation_type" => Ok(Self::OperationType),
            "actor" => Ok(Self::Actor),
            _ => Err(AppError::Validation(format!(
                "unsupported audit sort field '{value}'"
            ))),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortDirection {
    /// Smallest first.
    Ascending,
    /// Largest first.
    #[default]
    Descending,
}

impl FromStr for SortDirection {
    type Err = AppError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(Self::Ascending),
            "desc" | "descending" => Ok(Self::Descending),
            _ => Err(AppError::Validation(format!(
                "unsupported sort direction '{value}'"
            ))),
        }
    }
}

/// Listing order; ties are broken by record id in the same direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct AuditSort {
    /// Primary sort field.
    pub field: AuditSortField,
    /// Sort direction.
    pub direction: SortDirection,
}

impl AuditSort {
    /// Orders two records in memory the way stores order them.
    #[must_use]
    pub fn compare(&self, left: &AuditRecordView, right: &AuditRecordView) -> Ordering {
        let primary = match self.field {
            AuditSortField::CreatedAt => left.record.created_at.cmp(&right.record.created_at),
            AuditSortField::Module => left
                .record
                .module
                .as_str()
                .cmp(right.record.module.as_str()),
            AuditSortField::Status => left
                .record
                .status
                .as_str()
                .cmp(right.record.status.as_str()),
            AuditSortField::OperationType => left
                .record
                .operation_type
                .as_str()
                .cmp(right.record.operation_type.as_str()),
            AuditSortField::Actor => actor_username(left).cmp(actor_username(right)),
        };
        let ordering = primary.then_with(|| left.record.id.cmp(&right.record.id));

        match self.direction {
            SortDirection::Ascending => ordering,
            SortDirection::Descending => ordering.reverse(),
        }
    }
}

/// Validated listing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditListQuery {
    /// Record filters.
    pub filter: AuditFilter,
    /// 1-based page number.
    pub page: u32,
    /// Rows per page.
    pub page_size: u32,
    /// Result order.
    pub sort: AuditSort,
}

impl AuditListQuery {
    /// Builds a listing request, applying pagination defaults and bounds.
    pub fn new(
        filter: AuditFilter,
        page: Option<u32>,
        page_size: Option<u32>,
        sort: AuditSort,
    ) -> AppResult<Self> {
        Ok(Self {
            filter: filter.normalized()?,
            page: page.unwrap_or(1).max(1),
            page_size: page_size
                .unwrap_or(DEFAULT_PAGE_SIZE)
                .clamp(1, MAX_PAGE_SIZE),
            sort,
        })
    }

    /// Number of rows skipped before this page.
    #[must_use]
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.page_size)
    }
}

/// One listing page with total count.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditPage {
    /// Records on this page.
    pub items: Vec<AuditRecordView>,
    /// Total matching records.
    pub total: u64,
    /// 1-based page number.
    pub page: u32,
    /// Rows per page.
    pub page_size: u32,
    /// Number of pages for `total`.
    pub total_pages: u64,
}

/// Rows of one listing slice as returned by a store.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditListSlice {
    /// Records on the requested page.
    pub items: Vec<AuditRecordView>,
    /// Total matching records.
    pub total: u64,
}

/// Keyset position inside the ascending (`created_at`, `id`) archival scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiredRecordCursor {
    /// Creation time of the last row read.
    pub created_at: DateTime<Utc>,
    /// Identifier of the last row read.
    pub id: AuditRecordId,
}

impl ExpiredRecordCursor {
    /// Returns the cursor positioned after `view`.
    #[must_use]
    pub fn after(view: &AuditRecordView) -> Self {
        Self {
            created_at: view.record.created_at,
            id: view.record.id,
        }
    }

    /// Returns whether `view` sorts after this cursor.
    #[must_use]
    pub fn precedes(&self, view: &AuditRecordView) -> bool {
        (view.record.created_at, view.record.id) > (self.created_at, self.id)
    }
}

fn normalize_keyword(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

fn contains_ignore_case(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(&needle.to_lowercase())
}

fn actor_username(view: &AuditRecordView) -> &str {
    view.actor
        .as_ref()
        .map(|actor| actor.username.as_str())
        .unwrap_or_default()
}

use std::str::FromStr;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use chronicle_application::{AuditFilter, AuditListQuery, AuditSort, AuditSortField, SortDirection};
use chronicle_core::AppError;
use chronicle_domain::{AuditModule, AuditRecordId, AuditStatus, OperationType};
use futures::TryStreamExt;
use serde::Deserialize;

use crate::dto::{AuditPageResponse, AuditRecordResponse};
use crate::error::ApiResult;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct AuditFilterQuery {
    pub actor: Option<String>,
    pub module: Option<String>,
    pub operation_type: Option<String>,
    pub status: Option<String>,
    pub created_from: Option<String>,
    pub created_to: Option<String>,
    pub keyword: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

impl AuditFilterQuery {
    fn into_filter(self) -> Result<AuditFilter, AppError> {
        Ok(AuditFilter {
            actor_keyword: self.actor,
            module: parse_optional::<AuditModule>(self.module)?,
            operation_type: parse_optional::<OperationType>(self.operation_type)?,
            status: parse_optional::<AuditStatus>(self.status)?,
            created_from: parse_timestamp("created_from", self.created_from)?,
            created_to: parse_timestamp("created_to", self.created_to)?,
            keyword: self.keyword,
        })
    }
}

impl AuditListParams {
    fn into_query(self, filter: AuditFilterQuery) -> Result<AuditListQuery, AppError> {
        let sort = AuditSort {
            field: parse_optional::<AuditSortField>(self.sort_by)?.unwrap_or_default(),
            direction: parse_optional::<SortDirection>(self.sort_order)?.unwrap_or_default(),
        };

        AuditListQuery::new(filter.into_filter()?, self.page, self.page_size, sort)
    }
}

pub async fn list_audit_logs_handler(
    State(state): State<AppState>,
    Query(params): Query<AuditListParams>,
    Query(filter): Query<AuditFilterQuery>,
) -> ApiResult<Json<AuditPageResponse>> {
    let page = state.query_service.list(params.into_query(filter)?).await?;
    Ok(Json(AuditPageResponse::from(page)))
}

pub async fn get_audit_log_handler(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> ApiResult<Json<AuditRecordResponse>> {
    let view = state
        .query_service
        .find(AuditRecordId::from_i64(id))
        .await?;
    Ok(Json(AuditRecordResponse::from(view)))
}

pub async fn export_audit_logs_handler(
    State(state): State<AppState>,
    Query(query): Query<AuditFilterQuery>,
) -> ApiResult<Response> {
    let chunks = state.query_service.export_csv(query.into_filter()?)?;
    // Headers are already sent once streaming starts; later failures cut the body short.
    let body = Body::from_stream(chunks.map_err(|error| std::io::Error::other(error.to_string())));

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_owned()),
            (
                header::CONTENT_DISPOSITION,
                format!(
                    "attachment; filename=\"{}\"",
                    export_file_name(Utc::now())
                ),
            ),
        ],
        body,
    )
        .into_response())
}

pub(crate) fn export_file_name(now: DateTime<Utc>) -> String {
    format!("audit_logs_{}.csv", now.format("%Y%m%d%H%M%S"))
}

fn parse_optional<T>(value: Option<String>) -> Result<Option<T>, AppError>
where
    T: FromStr<Err = AppError>,
{
    value
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
        .map(|value| T::from_str(value.as_str()))
        .transpose()
}

fn parse_timestamp(name: &str, value: Option<String>) -> Result<Option<DateTime<Utc>>, AppError> {
    value
        .filter(|value| !value.trim().is_empty())
        .map(|value| {
            DateTime::parse_from_rfc3339(value.trim())
                .map(|timestamp| timestamp.with_timezone(&Utc))
                .map_err(|error| {
                    AppError::Validation(format!("{name} must be an RFC 3339 timestamp: {error}"))
                })
        })
        .transpose()
}

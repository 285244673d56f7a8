use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::postgres::PgArguments;
use sqlx::query::QueryAs;
use sqlx::{FromRow, PgPool, Postgres};

use chronicle_application::{
    AuditFilter, AuditListQuery, AuditListSlice, AuditSortField, AuditStore, ExpiredRecordCursor,
    SortDirection,
};
use chronicle_core::{ActorId, AppError, AppResult};
use chronicle_domain::{
    ActorProfile, AuditRecord, AuditRecordId, AuditRecordView, ExportSchema, NewAuditRecord,
};

const SELECT_VIEW: &str = r#"
    SELECT
        l.id,
        l.actor_id,
        l.operation_type,
        l.module,
        l.description,
        l.target_type,
        l.target_id,
        l.ip_address,
        l.request_params,
        l.status,
        l.created_at,
        u.username AS actor_username,
        u.email AS actor_email,
        u.phone AS actor_phone,
        to_jsonb(l) AS raw_row
    FROM audit_logs l
    LEFT JOIN admin_users u ON u.id = l.actor_id
"#;

// Binds $1..$7 in the order used by `bind_filter`.
const FILTER_PREDICATE: &str = r#"
    ($1::TEXT IS NULL OR u.username ILIKE $1 ESCAPE '\' OR u.phone ILIKE $1 ESCAPE '\')
    AND ($2::TEXT IS NULL OR l.module = $2)
    AND ($3::TEXT IS NULL OR l.operation_type = $3)
    AND ($4::TEXT IS NULL OR l.status = $4)
    AND ($5::TIMESTAMPTZ IS NULL OR l.created_at >= $5)
    AND ($6::TIMESTAMPTZ IS NULL OR l.created_at < $6)
    AND ($7::TEXT IS NULL OR l.description ILIKE $7 ESCAPE '\' OR l.target_id ILIKE $7 ESCAPE '\')
"#;

/// PostgreSQL-backed audit store over the `audit_logs` table.
#[derive(Clone)]
pub struct PostgresAuditStore {
    pool: PgPool,
}

impl PostgresAuditStore {
    /// Creates a store with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AuditRecordRow {
    id: i64,
    actor_id: i64,
    operation_type: String,
    module: String,
    description: String,
    target_type: Option<String>,
    target_id: Option<String>,
    ip_address: Option<String>,
    request_params: Option<Value>,
    status: String,
    created_at: DateTime<Utc>,
    actor_username: Option<String>,
    actor_email: Option<String>,
    actor_phone: Option<String>,
    raw_row: Value,
}

impl TryFrom<AuditRecordRow> for AuditRecordView {
    type Error = AppError;

    fn try_from(row: AuditRecordRow) -> Result<Self, Self::Error> {
        let record = AuditRecord {
            id: AuditRecordId::from_i64(row.id),
            actor_id: ActorId::new(row.actor_id)?,
            operation_type: row.operation_type.parse()?,
            module: row.module.parse()?,
            description: row.description,
            target_type: row.target_type,
            target_id: row.target_id,
            ip_address: row.ip_address,
            request_params: row.request_params,
            status: row.status.parse()?,
            created_at: row.created_at,
        };
        let actor = row.actor_username.map(|username| ActorProfile {
            username,
            email: row.actor_email,
            phone: row.actor_phone,
        });

        let mut view = AuditRecordView::new(record, actor);
        if let Value::Object(mut columns) = row.raw_row {
            for mapped in ExportSchema::current().stored_column_names() {
                columns.remove(mapped);
            }
            view.extra_fields = columns.into_iter().collect();
        }

        Ok(view)
    }
}

fn into_views(rows: Vec<AuditRecordRow>) -> AppResult<Vec<AuditRecordView>> {
    rows.into_iter().map(AuditRecordView::try_from).collect()
}

fn like_pattern(keyword: &str) -> String {
    let mut pattern = String::with_capacity(keyword.len() + 2);
    pattern.push('%');
    for character in keyword.chars() {
        if matches!(character, '\\' | '%' | '_') {
            pattern.push('\\');
        }
        pattern.push(character);
    }
    pattern.push('%');
    pattern
}

fn bind_filter<'q, O>(
    query: QueryAs<'q, Postgres, O, PgArguments>,
    filter: &AuditFilter,
) -> QueryAs<'q, Postgres, O, PgArguments> {
    query
        .bind(filter.actor_keyword.as_deref().map(like_pattern))
        .bind(filter.module.map(|module| module.as_str()))
        .bind(filter.operation_type.map(|operation| operation.as_str()))
        .bind(filter.status.map(|status| status.as_str()))
        .bind(filter.created_from)
        .bind(filter.created_to)
        .bind(filter.keyword.as_deref().map(like_pattern))
}

fn order_by_clause(query: &AuditListQuery) -> String {
    let column = match query.sort.field {
        AuditSortField::CreatedAt => "l.created_at",
        AuditSortField::Module => "l.module",
        AuditSortField::Status => "l.status",
        AuditSortField::OperationType => "l.operation_type",
        AuditSortField::Actor => "COALESCE(u.username, '')",
    };
    let direction = match query.sort.direction {
        SortDirection::Ascending => "ASC",
        SortDirection::Descending => "DESC",
    };

    format!("ORDER BY {column} {direction}, l.id {direction}")
}

fn to_i64(value: u64, what: &str) -> AppResult<i64> {
    i64::try_from(value).map_err(|_| AppError::Validation(format!("{what} is out of range")))
}

#[async_trait]
impl AuditStore for PostgresAuditStore {
    async fn append(&self, record: NewAuditRecord) -> AppResult<AuditRecord> {
        let (id,) = sqlx::query_as::<_, (i64,)>(
            r#"
            INSERT INTO audit_logs (
                actor_id,
                operation_type,
                module,
                description,
                target_type,
                target_id,
                ip_address,
                request_params,
                status,
                created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            RETURNING id
            "#,
        )
        .bind(record.actor_id.as_i64())
        .bind(record.operation_type.as_str())
        .bind(record.module.as_str())
        .bind(record.description.as_str())
        .bind(record.target_type.as_deref())
        .bind(record.target_id.as_deref())
        .bind(record.ip_address.as_deref())
        .bind(record.request_params.clone())
        .bind(record.status.as_str())
        .bind(record.created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to append audit record: {error}")))?;

        Ok(AuditRecord::from_new(AuditRecordId::from_i64(id), record))
    }

    async fn find(&self, id: AuditRecordId) -> AppResult<Option<AuditRecordView>> {
        let row = sqlx::query_as::<_, AuditRecordRow>(&format!("{SELECT_VIEW} WHERE l.id = $1"))
            .bind(id.as_i64())
            .fetch_optional(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to find audit record '{id}': {error}"))
            })?;

        row.map(AuditRecordView::try_from).transpose()
    }

    async fn list(&self, query: &AuditListQuery) -> AppResult<AuditListSlice> {
        let count_sql = format!(
            "SELECT COUNT(*) FROM audit_logs l LEFT JOIN admin_users u ON u.id = l.actor_id WHERE {FILTER_PREDICATE}"
        );
        let (total,) = bind_filter(sqlx::query_as::<_, (i64,)>(&count_sql), &query.filter)
            .fetch_one(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to count audit records: {error}")))?;

        let page_sql = format!(
            "{SELECT_VIEW} WHERE {FILTER_PREDICATE} {} LIMIT $8 OFFSET $9",
            order_by_clause(query)
        );
        let rows = bind_filter(sqlx::query_as::<_, AuditRecordRow>(&page_sql), &query.filter)
            .bind(i64::from(query.page_size))
            .bind(to_i64(query.offset(), "page offset")?)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| AppError::Internal(format!("failed to list audit records: {error}")))?;

        Ok(AuditListSlice {
            items: into_views(rows)?,
            total: u64::try_from(total).unwrap_or_default(),
        })
    }

    async fn export_batch(
        &self,
        filter: &AuditFilter,
        before: Option<AuditRecordId>,
        limit: usize,
    ) -> AppResult<Vec<AuditRecordView>> {
        let sql = format!(
            "{SELECT_VIEW} WHERE {FILTER_PREDICATE} AND ($8::BIGINT IS NULL OR l.id < $8) ORDER BY l.id DESC LIMIT $9"
        );
        let rows = bind_filter(sqlx::query_as::<_, AuditRecordRow>(&sql), filter)
            .bind(before.map(|id| id.as_i64()))
            .bind(to_i64(limit as u64, "export batch size")?)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to read audit export batch: {error}"))
            })?;

        into_views(rows)
    }

    async fn select_expired_batch(
        &self,
        cutoff: DateTime<Utc>,
        after: Option<ExpiredRecordCursor>,
        limit: usize,
    ) -> AppResult<Vec<AuditRecordView>> {
        let sql = format!(
            r#"
            {SELECT_VIEW}
            WHERE l.created_at < $1
                AND ($2::TIMESTAMPTZ IS NULL OR (l.created_at, l.id) > ($2::TIMESTAMPTZ, $3::BIGINT))
            ORDER BY l.created_at ASC, l.id ASC
            LIMIT $4
            "#
        );
        let rows = sqlx::query_as::<_, AuditRecordRow>(&sql)
            .bind(cutoff)
            .bind(after.map(|cursor| cursor.created_at))
            .bind(after.map(|cursor| cursor.id.as_i64()))
            .bind(to_i64(limit as u64, "retention batch size")?)
            .fetch_all(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to select expired audit records: {error}"))
            })?;

        into_views(rows)
    }

    async fn delete_by_ids(&self, ids: &[AuditRecordId]) -> AppResult<u64> {
        if ids.is_empty() {
            return Ok(0);
        }

        let ids: Vec<i64> = ids.iter().map(AuditRecordId::as_i64).collect();
        let result = sqlx::query("DELETE FROM audit_logs WHERE id = ANY($1)")
            .bind(ids)
            .execute(&self.pool)
            .await
            .map_err(|error| {
                AppError::Internal(format!("failed to delete archived audit records: {error}"))
            })?;

        Ok(result.rows_affected())
    }

    async fn stored_columns(&self) -> AppResult<Vec<String>> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT column_name::TEXT
            FROM information_schema.columns
            WHERE table_schema = current_schema()
                AND table_name = 'audit_logs'
            ORDER BY ordinal_position
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to read audit_logs columns: {error}")))
    }
}

#[cfg(test)]
mod tests;

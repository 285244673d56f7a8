use chrono::{Duration, TimeZone, Utc};
use chronicle_application::{AuditFilter, AuditListQuery, AuditSort, AuditStore, ExpiredRecordCursor};
use chronicle_core::ActorId;
use chronicle_domain::{AuditModule, AuditStatus, NewAuditRecord, OperationType};
use serde_json::json;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use sqlx::postgres::PgPoolOptions;

use super::{PostgresAuditStore, like_pattern};

static MIGRATOR: Migrator = sqlx::migrate!("./migrations");

async fn test_pool() -> Option<PgPool> {
    let Ok(database_url) = std::env::var("DATABASE_URL") else {
        return None;
    };

    let pool = match PgPoolOptions::new()
        .max_connections(2)
        .connect(database_url.as_str())
        .await
    {
        Ok(pool) => pool,
        Err(error) => panic!("failed to connect to DATABASE_URL in test: {error}"),
    };

    if let Err(error) = MIGRATOR.run(&pool).await {
        panic!("failed to run migrations for postgres audit store tests: {error}");
    }

    Some(pool)
}

async fn create_admin(pool: &PgPool, phone: &str) -> (ActorId, String) {
    let username = format!("admin_{}", uuid::Uuid::new_v4().simple());
    let inserted = sqlx::query_as::<_, (i64,)>(
        r#"
            INSERT INTO admin_users (username, email, phone)
            VALUES ($1, $2, $3)
            RETURNING id
            "#,
    )
    .bind(username.as_str())
    .bind(format!("{username}@example.com"))
    .bind(phone)
    .fetch_one(pool)
    .await;

    let Ok((id,)) = inserted else {
        panic!("failed to insert admin user");
    };
    let Ok(actor_id) = ActorId::new(id) else {
        panic!("admin id should be positive");
    };
    (actor_id, username)
}

fn record(
    actor_id: ActorId,
    module: AuditModule,
    description: &str,
    created_at: chrono::DateTime<Utc>,
) -> NewAuditRecord {
    NewAuditRecord {
        actor_id,
        operation_type: OperationType::Update,
        module,
        description: description.to_owned(),
        target_type: Some("banner".to_owned()),
        target_id: Some("42".to_owned()),
        ip_address: Some("203.0.113.9".to_owned()),
        request_params: Some(json!({"body": {"title": "Spring"}})),
        status: AuditStatus::Success,
        created_at,
    }
}

#[test]
fn like_pattern_escapes_wildcards() {
    assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
    assert_eq!(like_pattern("a\\b"), "%a\\\\b%");
}

#[tokio::test]
async fn appended_records_are_listed_with_actor_fields() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresAuditStore::new(pool.clone());
    let (actor_id, username) = create_admin(&pool, "13800000001").await;
    let now = Utc::now();

    let first = store
        .append(record(actor_id, AuditModule::Banner, "updated banner, \"hero\"", now))
        .await;
    let second = store
        .append(record(actor_id, AuditModule::News, "updated news", now))
        .await;
    assert!(first.is_ok());
    assert!(second.is_ok());

    let filter = AuditFilter {
        actor_keyword: Some(username.clone()),
        module: Some(AuditModule::Banner),
        ..AuditFilter::default()
    };
    let Ok(query) = AuditListQuery::new(filter, None, None, AuditSort::default()) else {
        panic!("query should be valid");
    };
    let listed = store.list(&query).await;

    let Ok(slice) = listed else {
        panic!("listing should succeed");
    };
    assert_eq!(slice.total, 1);
    assert_eq!(slice.items[0].record.description, "updated banner, \"hero\"");
    assert_eq!(
        slice.items[0].actor.as_ref().map(|actor| actor.username.as_str()),
        Some(username.as_str())
    );
    assert!(slice.items[0].extra_fields.is_empty());

    let Ok(first) = first else {
        return;
    };
    let found = store.find(first.id).await;
    assert!(matches!(found, Ok(Some(ref view)) if view.record.request_params == Some(json!({"body": {"title": "Spring"}}))));
}

#[tokio::test]
async fn export_batches_walk_newest_first_by_id() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresAuditStore::new(pool.clone());
    let (actor_id, username) = create_admin(&pool, "13800000002").await;
    let now = Utc::now();

    let mut ids = Vec::new();
    for index in 0..5 {
        let appended = store
            .append(record(actor_id, AuditModule::Product, &format!("event {index}"), now))
            .await;
        let Ok(appended) = appended else {
            panic!("append should succeed");
        };
        ids.push(appended.id);
    }

    let filter = AuditFilter {
        actor_keyword: Some(username),
        ..AuditFilter::default()
    };
    let first = store.export_batch(&filter, None, 3).await.unwrap_or_default();
    let Some(last) = first.last() else {
        panic!("first batch should not be empty");
    };
    let second = store
        .export_batch(&filter, Some(last.record.id), 3)
        .await
        .unwrap_or_default();

    let exported: Vec<_> = first
        .iter()
        .chain(second.iter())
        .map(|view| view.record.id)
        .collect();
    ids.reverse();
    assert_eq!(exported, ids);
}

#[tokio::test]
async fn expired_rows_are_selected_in_keyset_order_and_deleted_by_id() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresAuditStore::new(pool.clone());
    let (actor_id, _) = create_admin(&pool, "13800000003").await;
    let Some(base) = Utc.with_ymd_and_hms(1999, 1, 1, 0, 0, 0).single() else {
        panic!("fixed timestamp should be valid");
    };

    let mut ids = Vec::new();
    for offset in [2, 0, 1] {
        let appended = store
            .append(record(
                actor_id,
                AuditModule::Media,
                "expired",
                base + Duration::seconds(offset),
            ))
            .await;
        let Ok(appended) = appended else {
            panic!("append should succeed");
        };
        ids.push(appended.id);
    }
    let cutoff = base + Duration::days(1);

    let mut selected = Vec::new();
    let mut cursor: Option<ExpiredRecordCursor> = None;
    loop {
        let batch = store
            .select_expired_batch(cutoff, cursor, 2)
            .await
            .unwrap_or_default();
        let Some(last) = batch.last() else {
            break;
        };
        cursor = Some(ExpiredRecordCursor::after(last));
        selected.extend(
            batch
                .iter()
                .map(|view| view.record.id)
                .filter(|id| ids.contains(id)),
        );
    }

    assert_eq!(selected, vec![ids[1], ids[2], ids[0]]);
    assert!(matches!(store.delete_by_ids(&ids).await, Ok(3)));
    assert!(matches!(store.find(ids[0]).await, Ok(None)));
}

#[tokio::test]
async fn stored_columns_cover_the_export_schema() {
    let Some(pool) = test_pool().await else {
        return;
    };
    let store = PostgresAuditStore::new(pool);

    let columns = store.stored_columns().await.unwrap_or_default();
    for expected in chronicle_domain::ExportSchema::current().stored_column_names() {
        assert!(columns.iter().any(|column| column == expected));
    }
}

#[tokio::test]
async fn non_positive_actor_ids_are_rejected_by_the_table() {
    let Some(pool) = test_pool().await else {
        return;
    };

    for actor_id in [0_i64, -3] {
        let inserted = sqlx::query(
            r#"
            INSERT INTO audit_logs (actor_id, operation_type, module, description)
            VALUES ($1, 'create', 'banner', 'invalid actor')
            "#,
        )
        .bind(actor_id)
        .execute(&pool)
        .await;

        let Err(sqlx::Error::Database(error)) = inserted else {
            panic!("actor_id {actor_id} should violate the check constraint");
        };
        assert_eq!(error.code().as_deref(), Some("23514"));
    }
}

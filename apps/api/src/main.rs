//! Chronicle audit API composition root.

#![forbid(unsafe_code)]

mod api_config;
mod api_router;
mod dto;
mod error;
mod handlers;
mod middleware;
mod request_context;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use chronicle_application::{AuditQueryService, AuditStore, AuditWriter, SchemaProjector};
use chronicle_core::AppError;
use chronicle_infrastructure::PostgresAuditStore;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::api_config::ApiConfig;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = ApiConfig::load()?;

    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&config.database_url)
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    sqlx::migrate!("../../crates/infrastructure/migrations")
        .run(&pool)
        .await
        .map_err(|error| AppError::Internal(format!("failed to run migrations: {error}")))?;

    if config.migrate_only {
        info!("database migrations applied successfully");
        return Ok(());
    }

    let store: Arc<dyn AuditStore> = Arc::new(PostgresAuditStore::new(pool));
    let schema = SchemaProjector::new(store.clone()).project().await;
    let query_service = AuditQueryService::new(store.clone())
        .with_schema(schema)
        .with_export_batch_size(config.export_batch_size);

    let app_state = AppState {
        query_service,
        audit_writer: AuditWriter::new(store),
        ingest_secret: Arc::from(config.ingest_secret.as_str()),
        trusted_proxies: Arc::from(config.trusted_proxies.as_slice()),
    };

    let app = api_router::build_router(app_state, &config.frontend_url)?;
    let address = config.socket_address()?;
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .map_err(|error| AppError::Internal(format!("failed to bind listener: {error}")))?;

    info!(%address, "chronicle-api listening");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .map_err(|error| AppError::Internal(format!("api server error: {error}")))
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

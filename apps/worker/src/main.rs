//! Chronicle audit retention worker.
//!
//! Sleeps until the next quarterly tick, then archives expired audit records
//! and purges exactly the archived rows.

#![forbid(unsafe_code)]

mod worker_config;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use chronicle_application::{
    ArchiveBuilder, ArchiveRotation, ArchiveStorage, AuditStore, RetentionJob,
    RetentionLeaseCoordinator, RetentionRunOutcome,
};
use chronicle_core::{AppError, AppResult};
use chronicle_infrastructure::{
    LocalArchiveStorage, LocalRetentionLeaseCoordinator, PostgresAuditStore,
    RedisRetentionLeaseCoordinator,
};
use sqlx::postgres::PgPoolOptions;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::worker_config::WorkerConfig;

const LEASE_KEY_PREFIX: &str = "chronicle:lease";

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let job = build_retention_job(&config).await?;

    info!(
        worker_id = %config.policy.holder_id(),
        archive_dir = %config.archive_dir.display(),
        retention_days = config.policy.retention_days(),
        keep_count = config.policy.keep_count(),
        batch_size = config.policy.batch_size(),
        distributed_lease = config.redis_url.is_some(),
        "chronicle-worker started"
    );

    if config.run_once {
        log_outcome(job.run(Utc::now()).await);
        return Ok(());
    }

    loop {
        let now = Utc::now();
        let next_tick = config.schedule.next_after(now);
        let wait = (next_tick - now).to_std().unwrap_or(Duration::ZERO);
        info!(next_tick = %next_tick, "next audit retention run scheduled");

        tokio::time::sleep(wait).await;
        log_outcome(job.run(Utc::now()).await);
    }
}

async fn build_retention_job(config: &WorkerConfig) -> AppResult<RetentionJob> {
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(config.database_url.as_str())
        .await
        .map_err(|error| AppError::Internal(format!("failed to connect to database: {error}")))?;

    let archives = LocalArchiveStorage::new(config.archive_dir.clone());
    archives.ensure_directory().await?;

    let store: Arc<dyn AuditStore> = Arc::new(PostgresAuditStore::new(pool));
    let storage: Arc<dyn ArchiveStorage> = Arc::new(archives);
    let lease_coordinator: Arc<dyn RetentionLeaseCoordinator> = match &config.redis_url {
        Some(redis_url) => {
            let client = redis::Client::open(redis_url.as_str()).map_err(|error| {
                AppError::Validation(format!("invalid REDIS_URL: {error}"))
            })?;
            Arc::new(RedisRetentionLeaseCoordinator::new(client, LEASE_KEY_PREFIX))
        }
        None => {
            warn!("REDIS_URL not set, retention runs are only exclusive within this process");
            Arc::new(LocalRetentionLeaseCoordinator::new())
        }
    };

    Ok(RetentionJob::new(
        store,
        ArchiveBuilder::new(storage.clone()),
        ArchiveRotation::new(storage),
        lease_coordinator,
        config.policy.clone(),
    ))
}

fn log_outcome(outcome: AppResult<RetentionRunOutcome>) {
    match outcome {
        Ok(RetentionRunOutcome::Completed(report)) => info!(
            archive = %report.archive.name.as_str(),
            exported = report.exported,
            deleted = report.deleted,
            rotated = report.rotated.len(),
            cutoff = %report.cutoff,
            "audit retention run completed"
        ),
        Ok(RetentionRunOutcome::NothingToArchive { cutoff }) => {
            info!(cutoff = %cutoff, "no audit records older than the retention window")
        }
        Ok(RetentionRunOutcome::Skipped(reason)) => {
            info!(reason = ?reason, "audit retention run skipped")
        }
        Err(error) => error!(error = %error, "audit retention run failed"),
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

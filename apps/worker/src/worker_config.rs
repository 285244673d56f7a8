use std::env;
use std::path::PathBuf;

use chronicle_application::{DEFAULT_EXPORT_BATCH_SIZE, RetentionPolicy};
use chronicle_core::{AppError, AppResult};
use chronicle_domain::QuarterlySchedule;

#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub database_url: String,
    pub redis_url: Option<String>,
    pub archive_dir: PathBuf,
    pub schedule: QuarterlySchedule,
    pub policy: RetentionPolicy,
    pub run_once: bool,
}

impl WorkerConfig {
    pub fn load() -> AppResult<Self> {
        Self::from_lookup(|name| env::var(name).ok(), env::args().nth(1).as_deref())
    }

    fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        command: Option<&str>,
    ) -> AppResult<Self> {
        let database_url = lookup("DATABASE_URL")
            .ok_or_else(|| AppError::Validation("DATABASE_URL is required".to_owned()))?;
        let redis_url = lookup("REDIS_URL")
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        let archive_dir = PathBuf::from(
            lookup("AUDIT_ARCHIVE_DIR").unwrap_or_else(|| "./backups/audit-logs".to_owned()),
        );

        let schedule = QuarterlySchedule::parse(
            parse_value(&lookup, "AUDIT_ARCHIVE_DAY_OF_MONTH", 1_u32)?,
            lookup("AUDIT_ARCHIVE_TIME")
                .unwrap_or_else(|| "02:00".to_owned())
                .as_str(),
            lookup("AUDIT_ARCHIVE_UTC_OFFSET")
                .unwrap_or_else(|| "+08:00".to_owned())
                .as_str(),
        )?;

        let worker_id = lookup("WORKER_ID")
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("retention-{}", std::process::id()));
        let policy = RetentionPolicy::new(
            parse_value(&lookup, "AUDIT_RETENTION_DAYS", 90_u32)?,
            parse_value(&lookup, "AUDIT_ARCHIVE_KEEP_COUNT", 12_usize)?,
            parse_value(&lookup, "AUDIT_EXPORT_BATCH_SIZE", DEFAULT_EXPORT_BATCH_SIZE)?,
            parse_value(&lookup, "RETENTION_LEASE_SECONDS", 3_600_u32)?,
            worker_id,
        )?;

        Ok(Self {
            database_url,
            redis_url,
            archive_dir,
            schedule,
            policy,
            run_once: command == Some("run-once"),
        })
    }
}

fn parse_value<T>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> AppResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        Some(value) => value.trim().parse::<T>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        None => Ok(default),
    }
}

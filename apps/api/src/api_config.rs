use std::env;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;

use chronicle_application::DEFAULT_EXPORT_BATCH_SIZE;
use chronicle_core::AppError;
use ipnet::IpNet;

const DEFAULT_TRUSTED_PROXIES: &str = "127.0.0.1/32,::1/128";

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub migrate_only: bool,
    pub database_url: String,
    pub frontend_url: String,
    pub api_host: String,
    pub api_port: u16,
    pub ingest_secret: String,
    pub export_batch_size: usize,
    pub trusted_proxies: Vec<IpNet>,
}

impl ApiConfig {
    pub fn load() -> Result<Self, AppError> {
        let migrate_only = env::args().nth(1).as_deref() == Some("migrate");

        let database_url = required_env("DATABASE_URL")?;
        let frontend_url =
            env::var("FRONTEND_URL").unwrap_or_else(|_| "http://localhost:3000".to_owned());

        let api_host = env::var("API_HOST").unwrap_or_else(|_| "127.0.0.1".to_owned());
        let api_port = env::var("API_PORT")
            .ok()
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(3001);

        let ingest_secret = required_env("AUDIT_INGEST_SECRET")?;
        if ingest_secret.trim().len() < 16 {
            return Err(AppError::Validation(
                "AUDIT_INGEST_SECRET must be at least 16 characters".to_owned(),
            ));
        }

        let export_batch_size = match env::var("AUDIT_EXPORT_BATCH_SIZE") {
            Ok(value) => value
                .parse::<usize>()
                .ok()
                .filter(|value| *value > 0)
                .ok_or_else(|| {
                    AppError::Validation(format!(
                        "AUDIT_EXPORT_BATCH_SIZE must be a positive integer, got '{value}'"
                    ))
                })?,
            Err(_) => DEFAULT_EXPORT_BATCH_SIZE,
        };

        let trusted_proxies = parse_trusted_proxies(
            env::var("API_TRUSTED_PROXIES")
                .unwrap_or_else(|_| DEFAULT_TRUSTED_PROXIES.to_owned())
                .as_str(),
        )?;

        Ok(Self {
            migrate_only,
            database_url,
            frontend_url,
            api_host,
            api_port,
            ingest_secret,
            export_batch_size,
            trusted_proxies,
        })
    }

    pub fn socket_address(&self) -> Result<SocketAddr, AppError> {
        let host = IpAddr::from_str(&self.api_host).map_err(|error| {
            AppError::Internal(format!("invalid API_HOST '{}': {error}", self.api_host))
        })?;
        Ok(SocketAddr::from((host, self.api_port)))
    }
}

/// Parses a comma-separated CIDR list; bare addresses become host networks.
pub fn parse_trusted_proxies(value: &str) -> Result<Vec<IpNet>, AppError> {
    value
        .split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            IpNet::from_str(entry)
                .ok()
                .or_else(|| IpAddr::from_str(entry).ok().map(IpNet::from))
                .ok_or_else(|| {
                    AppError::Validation(format!("invalid API_TRUSTED_PROXIES entry '{entry}'"))
                })
        })
        .collect()
}

fn required_env(name: &str) -> Result<String, AppError> {
    env::var(name).map_err(|_| AppError::Validation(format!("{name} is required")))
}

//! Core runtime configuration.
//!
//! Configuration is resolved once at process startup and then passed into core services. Request
//! handling and jobs never read process-wide environment variables.

use crate::constants::{
    DEFAULT_BRANCH_NAME, DEFAULT_CACHE_TTL_SECS, DEFAULT_DATABASE_PATH,
    DEFAULT_JOB_INTERVAL_SECS, DEFAULT_RESERVATION_MINUTES, DEFAULT_REST_ADDR,
};
use crate::{HmsError, HmsResult};
use hms_types::NonEmptyText;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Core configuration resolved at startup.
#[derive(Clone, Debug)]
pub struct CoreConfig {
    database_path: PathBuf,
    rest_addr: String,
    cache_ttl: Duration,
    reservation_window: chrono::Duration,
    job_interval: Duration,
    default_branch: NonEmptyText,
}

impl CoreConfig {
    pub fn new(
        database_path: PathBuf,
        rest_addr: String,
        cache_ttl_secs: u64,
        reservation_minutes: u64,
        job_interval_secs: u64,
        default_branch: &str,
    ) -> HmsResult<Self> {
        if rest_addr.trim().is_empty() {
            return Err(HmsError::InvalidInput("rest_addr cannot be empty".into()));
        }
        if reservation_minutes == 0 {
            return Err(HmsError::InvalidInput(
                "reservation window must be at least one minute".into(),
            ));
        }
        if job_interval_secs == 0 {
            return Err(HmsError::InvalidInput(
                "job interval must be at least one second".into(),
            ));
        }
        let reservation_minutes = i64::try_from(reservation_minutes)
            .map_err(|_| HmsError::InvalidInput("reservation window is too large".into()))?;
        let default_branch = NonEmptyText::new(default_branch)
            .map_err(|_| HmsError::InvalidInput("default branch name cannot be empty".into()))?;

        Ok(Self {
            database_path,
            rest_addr,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            reservation_window: chrono::Duration::minutes(reservation_minutes),
            job_interval: Duration::from_secs(job_interval_secs),
            default_branch,
        })
    }

    /// Builds a configuration from optional raw values, typically read from the environment by
    /// a binary's `main`. Missing or blank values fall back to the defaults.
    pub fn from_env_values(values: EnvValues) -> HmsResult<Self> {
        let database_path = values
            .database_path
            .and_then(non_blank)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATABASE_PATH));
        let rest_addr = values
            .rest_addr
            .and_then(non_blank)
            .unwrap_or_else(|| DEFAULT_REST_ADDR.to_string());
        let default_branch = values
            .default_branch
            .and_then(non_blank)
            .unwrap_or_else(|| DEFAULT_BRANCH_NAME.to_string());

        Self::new(
            database_path,
            rest_addr,
            parse_u64("HMS_CACHE_TTL_SECS", values.cache_ttl_secs, DEFAULT_CACHE_TTL_SECS)?,
            parse_u64(
                "HMS_RESERVATION_MINUTES",
                values.reservation_minutes,
                DEFAULT_RESERVATION_MINUTES,
            )?,
            parse_u64(
                "HMS_JOB_INTERVAL_SECS",
                values.job_interval_secs,
                DEFAULT_JOB_INTERVAL_SECS,
            )?,
            &default_branch,
        )
    }

    pub fn database_path(&self) -> &Path {
        &self.database_path
    }

    pub fn rest_addr(&self) -> &str {
        &self.rest_addr
    }

    pub fn cache_ttl(&self) -> Duration {
        self.cache_ttl
    }

    pub fn reservation_window(&self) -> chrono::Duration {
        self.reservation_window
    }

    pub fn job_interval(&self) -> Duration {
        self.job_interval
    }

    pub fn default_branch(&self) -> &NonEmptyText {
        &self.default_branch
    }
}

/// Raw configuration values, one per supported environment variable.
#[derive(Clone, Debug, Default)]
pub struct EnvValues {
    pub database_path: Option<String>,
    pub rest_addr: Option<String>,
    pub cache_ttl_secs: Option<String>,
    pub reservation_minutes: Option<String>,
    pub job_interval_secs: Option<String>,
    pub default_branch: Option<String>,
}

impl EnvValues {
    /// Reads every `HMS_*` variable from the process environment.
    pub fn from_process_env() -> Self {
        let var = |name: &str| std::env::var(name).ok();
        Self {
            database_path: var("HMS_DATABASE_PATH"),
            rest_addr: var("HMS_REST_ADDR"),
            cache_ttl_secs: var("HMS_CACHE_TTL_SECS"),
            reservation_minutes: var("HMS_RESERVATION_MINUTES"),
            job_interval_secs: var("HMS_JOB_INTERVAL_SECS"),
            default_branch: var("HMS_DEFAULT_BRANCH"),
        }
    }
}

fn non_blank(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_u64(name: &str, value: Option<String>, default: u64) -> HmsResult<u64> {
    match value.and_then(non_blank) {
        None => Ok(default),
        Some(v) => v
            .parse::<u64>()
            .map_err(|_| HmsError::InvalidInput(format!("{name} must be a whole number, got {v}"))),
    }
}

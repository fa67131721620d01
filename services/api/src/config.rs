//! services/api/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use adaptive_quiz_core::{EligibilityRules, QuizConfig, SelectionMode};
use chrono::Duration;
use std::net::SocketAddr;
use std::str::FromStr;
use tracing::Level;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub bind_address: SocketAddr,
    pub database_url: String,
    pub log_level: Level,
    pub db_max_connections: u32,
    pub cors_origin: String,
    /// Seconds between priority recalculation passes; 0 disables the job.
    pub priority_recalc_interval_secs: u64,
    /// Seconds between daily pre-build passes; 0 disables the job.
    pub daily_prebuild_interval_secs: u64,
    /// How many days beyond today the pre-build job prepares.
    pub daily_horizon_days: u32,
    pub daily_repeat_avoid_days: u32,
    pub recent_answer_cooldown_minutes: u32,
    pub job_concurrency: usize,
    pub selection_mode: SelectionMode,
    pub rng_seed: Option<u64>,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        // Only load from .env in non-test mode to avoid contamination.
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }

        // --- Load Server and Database Settings ---
        let bind_address: SocketAddr = parse_var("BIND_ADDRESS", "0.0.0.0:3000")?;

        let database_url = std::env::var("DATABASE_URL")
            .map_err(|_| ConfigError::MissingVar("DATABASE_URL".to_string()))?;

        let log_level_str = std::env::var("RUST_LOG").unwrap_or_else(|_| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let db_max_connections = parse_var("DB_MAX_CONNECTIONS", "5")?;
        let cors_origin =
            std::env::var("CORS_ORIGIN").unwrap_or_else(|_| "http://localhost:3000".to_string());

        // --- Background Jobs ---
        let priority_recalc_interval_secs = parse_var("PRIORITY_RECALC_INTERVAL_SECS", "3600")?;
        let daily_prebuild_interval_secs = parse_var("DAILY_PREBUILD_INTERVAL_SECS", "900")?;
        let daily_horizon_days = parse_var("DAILY_HORIZON_DAYS", "0")?;
        let job_concurrency: usize = parse_var("JOB_CONCURRENCY", "4")?;
        if job_concurrency == 0 {
            return Err(ConfigError::InvalidValue(
                "JOB_CONCURRENCY".to_string(),
                "must be at least 1".to_string(),
            ));
        }

        // --- Selection Engine ---
        let daily_repeat_avoid_days = parse_var("DAILY_REPEAT_AVOID_DAYS", "7")?;
        let recent_answer_cooldown_minutes = parse_var("RECENT_ANSWER_COOLDOWN_MINUTES", "60")?;
        let selection_mode = parse_var("SELECTION_MODE", "weighted")?;
        let rng_seed = match std::env::var("RNG_SEED") {
            Ok(raw) => Some(raw.trim().parse::<u64>().map_err(|e| {
                ConfigError::InvalidValue("RNG_SEED".to_string(), e.to_string())
            })?),
            Err(_) => None,
        };

        Ok(Self {
            bind_address,
            database_url,
            log_level,
            db_max_connections,
            cors_origin,
            priority_recalc_interval_secs,
            daily_prebuild_interval_secs,
            daily_horizon_days,
            daily_repeat_avoid_days,
            recent_answer_cooldown_minutes,
            job_concurrency,
            selection_mode,
            rng_seed,
        })
    }

    /// The selection engine settings derived from this configuration.
    pub fn quiz_config(&self) -> QuizConfig {
        QuizConfig {
            rules: EligibilityRules {
                recent_answer_cooldown: Duration::minutes(i64::from(
                    self.recent_answer_cooldown_minutes,
                )),
                daily_repeat_avoid_days: self.daily_repeat_avoid_days,
                ..EligibilityRules::default()
            },
            selection_mode: self.selection_mode,
            rng_seed: self.rng_seed,
        }
    }
}

/// Reads `name`, falling back to `default` when unset, and parses it.
fn parse_var<T>(name: &str, default: &str) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = std::env::var(name).unwrap_or_else(|_| default.to_string());
    raw.trim()
        .parse::<T>()
        .map_err(|e| ConfigError::InvalidValue(name.to_string(), e.to_string()))
}

use std::env;
use std::path::PathBuf;

use crate::error::AppError;

/// Default ceiling for a form cycle, in days.
pub const DEFAULT_MAX_CYCLE_DAYS: u32 = 365;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub database: DatabaseConfig,
    pub logging: LoggingConfig,
    pub scheduling: SchedulingConfig,
}

/// Database configuration
#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

/// Logging configuration
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

/// Log output format
#[derive(Debug, Clone, PartialEq)]
pub enum LogFormat {
    Pretty,
    Json,
}

/// Scheduling engine configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SchedulingConfig {
    /// Longest cycle (LCM of form frequencies) a phase may have.
    pub max_cycle_days: u32,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, AppError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        let database = DatabaseConfig {
            path: PathBuf::from(
                env::var("DATABASE_PATH").unwrap_or_else(|_| "./data/study.db".to_string()),
            ),
            max_connections: env::var("DATABASE_MAX_CONNECTIONS")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(5),
        };

        let logging = LoggingConfig {
            level: env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            format: match env::var("LOG_FORMAT")
                .unwrap_or_else(|_| "pretty".to_string())
                .to_lowercase()
                .as_str()
            {
                "json" => LogFormat::Json,
                _ => LogFormat::Pretty,
            },
        };

        let scheduling = SchedulingConfig::from_env()?;

        Ok(Config {
            database,
            logging,
            scheduling,
        })
    }
}

impl SchedulingConfig {
    /// Read `MAX_CYCLE_DAYS`; a value that is not a positive integer is
    /// rejected instead of falling back to the default.
    pub fn from_env() -> Result<Self, AppError> {
        let max_cycle_days = match env::var("MAX_CYCLE_DAYS") {
            Ok(raw) => match raw.trim().parse::<u32>() {
                Ok(days) if days > 0 => days,
                _ => {
                    return Err(AppError::Config {
                        message: format!("MAX_CYCLE_DAYS must be a positive integer, got '{}'", raw),
                    })
                }
            },
            Err(_) => DEFAULT_MAX_CYCLE_DAYS,
        };

        Ok(Self { max_cycle_days })
    }
}

impl Default for SchedulingConfig {
    fn default() -> Self {
        Self {
            max_cycle_days: DEFAULT_MAX_CYCLE_DAYS,
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/study.db"),
            max_connections: 5,
        }
    }
}

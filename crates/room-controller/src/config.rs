//! Room Controller configuration.
//!
//! Configuration is loaded from environment variables. The database URL is
//! redacted in Debug output.

use crate::repositories::filter::validate_identifier;
use std::collections::HashMap;
use std::env;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Default maximum number of concurrent rooms.
pub const DEFAULT_ROOM_NUMBER_LIMIT: u64 = 20;

/// Default schema holding the documents table.
pub const DEFAULT_DATABASE_SCHEMA: &str = "room_controller";

/// Default HTTP bind address for the operational endpoints.
pub const DEFAULT_BIND_ADDRESS: &str = "0.0.0.0:8080";

/// Default pool size.
pub const DEFAULT_DB_MAX_CONNECTIONS: u32 = 20;

/// Default per-statement timeout in seconds.
pub const DEFAULT_DB_STATEMENT_TIMEOUT_SECONDS: u32 = 5;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(ConfigError::InvalidLogFormat(format!(
                "LOG_FORMAT must be 'text' or 'json', got '{}'",
                other
            ))),
        }
    }
}

/// Room Controller configuration.
#[derive(Clone)]
pub struct Config {
    /// PostgreSQL connection URL.
    pub database_url: String,

    /// Schema holding the documents table (default: "room_controller").
    pub database_schema: String,

    /// Server bind address (default: "0.0.0.0:8080").
    pub bind_address: String,

    /// Maximum number of rooms that may exist at once (default: 20).
    pub room_number_limit: u64,

    /// Enforce room name and creator uniqueness in the store (default: false).
    pub room_uniqueness_enforced: bool,

    pub db_max_connections: u32,

    pub db_statement_timeout_seconds: u32,

    pub log_format: LogFormat,
}

/// Custom Debug implementation that redacts sensitive fields.
impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_url", &"[REDACTED]")
            .field("database_schema", &self.database_schema)
            .field("bind_address", &self.bind_address)
            .field("room_number_limit", &self.room_number_limit)
            .field("room_uniqueness_enforced", &self.room_uniqueness_enforced)
            .field("db_max_connections", &self.db_max_connections)
            .field(
                "db_statement_timeout_seconds",
                &self.db_statement_timeout_seconds,
            )
            .field("log_format", &self.log_format)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid room number limit configuration: {0}")]
    InvalidRoomNumberLimit(String),

    #[error("Invalid database schema: {0}")]
    InvalidDatabaseSchema(String),

    #[error("Invalid database pool configuration: {0}")]
    InvalidDatabasePool(String),

    #[error("Invalid boolean flag: {0}")]
    InvalidFlag(String),

    #[error("Invalid log format: {0}")]
    InvalidLogFormat(String),
}

/// Parse `name` as a positive integer, falling back to `default` when unset.
fn parse_positive<T>(
    vars: &HashMap<String, String>,
    name: &str,
    default: T,
    error: fn(String) -> ConfigError,
) -> Result<T, ConfigError>
where
    T: FromStr + PartialEq + Default,
    T::Err: fmt::Display,
{
    let Some(value_str) = vars.get(name) else {
        return Ok(default);
    };

    let value: T = value_str.parse().map_err(|e| {
        error(format!(
            "{} must be a valid positive integer, got '{}': {}",
            name, value_str, e
        ))
    })?;

    if value == T::default() {
        return Err(error(format!("{} must be greater than 0", name)));
    }

    Ok(value)
}

fn parse_flag(vars: &HashMap<String, String>, name: &str) -> Result<bool, ConfigError> {
    match vars.get(name).map(|v| v.to_ascii_lowercase()) {
        None => Ok(false),
        Some(v) if v == "true" || v == "1" => Ok(true),
        Some(v) if v == "false" || v == "0" => Ok(false),
        Some(v) => Err(ConfigError::InvalidFlag(format!(
            "{} must be one of true/false/1/0, got '{}'",
            name, v
        ))),
    }
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_vars(&env::vars().collect())
    }

    /// Load configuration from a HashMap (for testing).
    pub fn from_vars(vars: &HashMap<String, String>) -> Result<Self, ConfigError> {
        let database_url = vars
            .get("DATABASE_URL")
            .ok_or_else(|| ConfigError::MissingEnvVar("DATABASE_URL".to_string()))?
            .clone();

        let database_schema = vars
            .get("DATABASE_SCHEMA")
            .cloned()
            .unwrap_or_else(|| DEFAULT_DATABASE_SCHEMA.to_string());
        if validate_identifier(&database_schema).is_err() {
            return Err(ConfigError::InvalidDatabaseSchema(format!(
                "DATABASE_SCHEMA must be a plain SQL identifier, got '{}'",
                database_schema
            )));
        }

        let bind_address = vars
            .get("BIND_ADDRESS")
            .cloned()
            .unwrap_or_else(|| DEFAULT_BIND_ADDRESS.to_string());

        let room_number_limit = parse_positive(
            vars,
            "ROOM_NUMBER_LIMIT",
            DEFAULT_ROOM_NUMBER_LIMIT,
            ConfigError::InvalidRoomNumberLimit,
        )?;

        let room_uniqueness_enforced = parse_flag(vars, "ROOM_UNIQUENESS_ENFORCED")?;

        let db_max_connections = parse_positive(
            vars,
            "DB_MAX_CONNECTIONS",
            DEFAULT_DB_MAX_CONNECTIONS,
            ConfigError::InvalidDatabasePool,
        )?;

        let db_statement_timeout_seconds = parse_positive(
            vars,
            "DB_STATEMENT_TIMEOUT_SECONDS",
            DEFAULT_DB_STATEMENT_TIMEOUT_SECONDS,
            ConfigError::InvalidDatabasePool,
        )?;

        let log_format = vars
            .get("LOG_FORMAT")
            .map(|v| v.parse::<LogFormat>())
            .transpose()?
            .unwrap_or_default();

        Ok(Config {
            database_url,
            database_schema,
            bind_address,
            room_number_limit,
            room_uniqueness_enforced,
            db_max_connections,
            db_statement_timeout_seconds,
            log_format,
        })
    }
}

//! Startup configuration.
//!
//! Everything is read once from the environment (optionally seeded from a
//! `.env` file) into [`WardenConfig`], which is then passed by value into the
//! task constructors.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::{OverlapPolicy, RetryPolicy};

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required environment variable {0}")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

/// Server location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MongoConnection {
    pub host: String,
    pub port: u16,
}

/// Credential plus the database it authenticates against.
///
/// The password never appears in `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct MongoUser {
    pub username: String,
    pub password: String,
    pub database: Option<String>,
}

impl MongoUser {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            database: None,
        }
    }

    pub fn with_database(mut self, database: impl Into<String>) -> Self {
        self.database = Some(database.into());
        self
    }
}

impl fmt::Debug for MongoUser {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoUser")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("database", &self.database)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

/// Console verbosity. Accepts the winston names `silly` and `verbose` next to
/// the usual tracing levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "silly" | "trace" => Ok(Self::Trace),
            "verbose" | "debug" => Ok(Self::Debug),
            "info" | "http" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            other => Err(format!(
                "unknown log level '{other}', expected one of silly, verbose, debug, info, warn, error"
            )),
        }
    }
}

impl From<LogLevel> for tracing::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => tracing::Level::TRACE,
            LogLevel::Debug => tracing::Level::DEBUG,
            LogLevel::Info => tracing::Level::INFO,
            LogLevel::Warn => tracing::Level::WARN,
            LogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub level: LogLevel,
    pub format: LogFormat,
}

/// Longest accepted `CLEANLOGS_DAYSTOKEEP`, one century.
pub const MAX_DAYS_TO_KEEP: u32 = 36_500;

#[derive(Debug, Clone)]
pub struct CleanLogsConfig {
    pub app_name: String,
    pub cron_schedule: String,
    pub days_to_keep: u32,
    pub overlap: OverlapPolicy,
}

#[derive(Debug, Clone)]
pub struct MongoConfig {
    pub connection: MongoConnection,
    pub admin: MongoUser,
    /// The principal that is provisioned and later prunes the logs.
    pub logging: MongoUser,
    pub availability_retry: RetryPolicy,
    pub create_user_retry: RetryPolicy,
    pub clean_logs: CleanLogsConfig,
}

#[derive(Debug, Clone)]
pub struct WardenConfig {
    pub logging: LoggingConfig,
    /// `None` when `LOGGING_MONGODB_USE` is not `true`.
    pub mongo: Option<MongoConfig>,
}

impl WardenConfig {
    /// Load from the process environment, after applying `.env` if present.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load from an arbitrary key lookup.
    ///
    /// | Env Var                          | Default      |
    /// |----------------------------------|--------------|
    /// | `LOGGING_CONSOLE_LEVEL`          | `info`       |
    /// | `LOGGING_CONSOLE_FORMAT`         | `pretty`     |
    /// | `LOGGING_MONGODB_USE`            | `false`      |
    /// | `LOGGING_MONGODB_HOST`           | required     |
    /// | `LOGGING_MONGODB_PORT`           | `27017`      |
    /// | `LOGGING_MONGODB_ADMIN_USERNAME` | required     |
    /// | `LOGGING_MONGODB_ADMIN_PASSWORD` | required     |
    /// | `LOGGING_MONGODB_USERNAME`       | required     |
    /// | `LOGGING_MONGODB_PASSWORD`       | required     |
    /// | `LOGGING_MONGODB_DATABASE`       | required     |
    /// | `CLEANLOGS_APP_NAME`             | `CleanLogs`  |
    /// | `CLEANLOGS_CRON_SCHEDULE`        | `0 0 * * *`  |
    /// | `CLEANLOGS_DAYSTOKEEP`           | `30`         |
    /// | `CLEANLOGS_OVERLAP`              | `skip`       |
    /// | `AVAILABILITY_MAX_ATTEMPTS`      | `5`          |
    /// | `AVAILABILITY_DELAY_MS`          | `5000`       |
    /// | `CREATE_USER_MAX_ATTEMPTS`       | `2`          |
    /// | `CREATE_USER_DELAY_MS`           | `10000`      |
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env(lookup);

        let format = match env.or("LOGGING_CONSOLE_FORMAT", "pretty").to_ascii_lowercase().as_str() {
            "pretty" => LogFormat::Pretty,
            "json" => LogFormat::Json,
            other => {
                return Err(ConfigError::Invalid {
                    key: "LOGGING_CONSOLE_FORMAT",
                    reason: format!("expected 'pretty' or 'json', got '{other}'"),
                });
            }
        };
        let level = env
            .or("LOGGING_CONSOLE_LEVEL", "info")
            .parse::<LogLevel>()
            .map_err(|reason| ConfigError::Invalid {
                key: "LOGGING_CONSOLE_LEVEL",
                reason,
            })?;
        let logging = LoggingConfig { level, format };

        if env.or("LOGGING_MONGODB_USE", "false") != "true" {
            return Ok(Self {
                logging,
                mongo: None,
            });
        }

        let connection = MongoConnection {
            host: env.required("LOGGING_MONGODB_HOST")?,
            port: env.parsed("LOGGING_MONGODB_PORT", 27017)?,
        };
        let admin = MongoUser::new(
            env.required("LOGGING_MONGODB_ADMIN_USERNAME")?,
            env.required("LOGGING_MONGODB_ADMIN_PASSWORD")?,
        );
        let logging_user = MongoUser::new(
            env.required("LOGGING_MONGODB_USERNAME")?,
            env.required("LOGGING_MONGODB_PASSWORD")?,
        )
        .with_database(env.required("LOGGING_MONGODB_DATABASE")?);

        let overlap = env
            .or("CLEANLOGS_OVERLAP", "skip")
            .parse::<OverlapPolicy>()
            .map_err(|reason| ConfigError::Invalid {
                key: "CLEANLOGS_OVERLAP",
                reason,
            })?;
        let days_to_keep: u32 = env.parsed("CLEANLOGS_DAYSTOKEEP", 30)?;
        if days_to_keep > MAX_DAYS_TO_KEEP {
            return Err(ConfigError::Invalid {
                key: "CLEANLOGS_DAYSTOKEEP",
                reason: format!("{days_to_keep} exceeds the maximum of {MAX_DAYS_TO_KEEP} days"),
            });
        }
        let clean_logs = CleanLogsConfig {
            app_name: env.or("CLEANLOGS_APP_NAME", "CleanLogs"),
            cron_schedule: env.or("CLEANLOGS_CRON_SCHEDULE", "0 0 * * *"),
            days_to_keep,
            overlap,
        };

        let availability_retry = RetryPolicy::new(
            env.parsed("AVAILABILITY_MAX_ATTEMPTS", 5)?,
            Duration::from_millis(env.parsed("AVAILABILITY_DELAY_MS", 5000)?),
        );
        let create_user_retry = RetryPolicy::new(
            env.parsed("CREATE_USER_MAX_ATTEMPTS", 2)?,
            Duration::from_millis(env.parsed("CREATE_USER_DELAY_MS", 10_000)?),
        );

        Ok(Self {
            logging,
            mongo: Some(MongoConfig {
                connection,
                admin,
                logging: logging_user,
                availability_retry,
                create_user_retry,
                clean_logs,
            }),
        })
    }
}

struct Env<F>(F);

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key).filter(|v| !v.trim().is_empty())
    }

    fn or(&self, key: &str, default: &str) -> String {
        self.get(key).unwrap_or_else(|| default.to_string())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parsed<T>(&self, key: &'static str, default: T) -> Result<T, ConfigError>
    where
        T: std::str::FromStr,
        T::Err: fmt::Display,
    {
        match self.get(key) {
            Some(raw) => raw.trim().parse().map_err(|e: T::Err| ConfigError::Invalid {
                key,
                reason: e.to_string(),
            }),
            None => Ok(default),
        }
    }
}

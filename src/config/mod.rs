pub mod cli;

use crate::adapters::http::RetryPolicy;
use crate::utils::error::{EtlError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_positive_number, validate_range, validate_url, Validate,
};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub use cli::{CliArgs, RunMode};

const RUN_AT_FORMAT: &str = "%H:%M";

fn default_timeout_seconds() -> u64 {
    30
}

fn default_max_pages() -> usize {
    10_000
}

fn default_db_port() -> u16 {
    5432
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    pub base_url: String,
    pub token: String,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,
}

impl SourceConfig {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            token: token.into(),
            page_size: None,
            timeout_seconds: default_timeout_seconds(),
            max_pages: default_max_pages(),
        }
    }
}

impl std::fmt::Debug for SourceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceConfig")
            .field("base_url", &self.base_url)
            .field("token", &"***")
            .field("page_size", &self.page_size)
            .field("timeout_seconds", &self.timeout_seconds)
            .field("max_pages", &self.max_pages)
            .finish()
    }
}

#[derive(Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub server: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("server", &self.server)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"***")
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Local wall-clock time, `HH:MM`.
    pub run_at: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            run_at: "22:00".to_string(),
        }
    }
}

impl ScheduleConfig {
    pub fn run_at_time(&self) -> Result<NaiveTime> {
        NaiveTime::parse_from_str(self.run_at.trim(), RUN_AT_FORMAT).map_err(|e| {
            EtlError::InvalidConfigValueError {
                field: "schedule.run_at".to_string(),
                value: self.run_at.clone(),
                reason: format!("expected HH:MM ({})", e),
            }
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    pub attempts: u32,
    pub delay_seconds: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            attempts: 3,
            delay_seconds: 2,
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.attempts, Duration::from_secs(self.delay_seconds))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    pub output_dir: String,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: "reports".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub dir: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: "logs".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub source_1: SourceConfig,
    pub source_2: SourceConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub report: ReportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn required(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(EtlError::MissingConfigError {
            field: key.to_string(),
        }),
    }
}

fn parsed<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e: T::Err| EtlError::InvalidConfigValueError {
                field: key.to_string(),
                value: raw.clone(),
                reason: e.to_string(),
            }),
        _ => Ok(None),
    }
}

impl AppConfig {
    /// `.env` first, then either the TOML file or the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenvy::dotenv().ok();
        match path {
            Some(path) => Self::from_file(path),
            None => Self::from_env(),
        }
    }

    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the config from any key → value lookup using the environment key names.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let timeout_seconds =
            parsed(&lookup, "ETL_REQUEST_TIMEOUT_SECONDS")?.unwrap_or_else(default_timeout_seconds);

        let source = |url_key: &str, token_key: &str, page_key: &str| -> Result<SourceConfig> {
            Ok(SourceConfig {
                base_url: required(&lookup, url_key)?,
                token: required(&lookup, token_key)?,
                page_size: parsed(&lookup, page_key)?,
                timeout_seconds,
                max_pages: default_max_pages(),
            })
        };

        let source_1 = source("API_1_URL", "API_1_TOKEN", "API_1_PAGE_SIZE")?;
        let source_2 = source("API_2_URL", "API_2_TOKEN", "API_2_PAGE_SIZE")?;

        let database = DatabaseConfig {
            server: required(&lookup, "DB_SERVER")?,
            port: parsed(&lookup, "DB_PORT")?.unwrap_or_else(default_db_port),
            database: required(&lookup, "DB_DATABASE")?,
            username: required(&lookup, "DB_USERNAME")?,
            password: required(&lookup, "DB_PASSWORD")?,
            max_connections: parsed(&lookup, "DB_MAX_CONNECTIONS")?
                .unwrap_or_else(default_max_connections),
        };

        let defaults = RetrySettings::default();
        let retry = RetrySettings {
            attempts: parsed(&lookup, "ETL_RETRY_ATTEMPTS")?.unwrap_or(defaults.attempts),
            delay_seconds: parsed(&lookup, "ETL_RETRY_DELAY_SECONDS")?
                .unwrap_or(defaults.delay_seconds),
        };

        Ok(Self {
            source_1,
            source_2,
            database,
            schedule: ScheduleConfig {
                run_at: lookup("ETL_RUN_AT").unwrap_or_else(|| ScheduleConfig::default().run_at),
            },
            retry,
            report: ReportConfig {
                output_dir: lookup("ETL_REPORT_DIR")
                    .unwrap_or_else(|| ReportConfig::default().output_dir),
            },
            logging: LoggingConfig {
                dir: lookup("ETL_LOG_DIR").unwrap_or_else(|| LoggingConfig::default().dir),
            },
        })
    }

    /// Reads a TOML settings file. `${VAR}` references are expanded from the environment.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(EtlError::IoError)?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        toml::from_str(&processed_content).map_err(|e| EtlError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// Unset variables are left as written.
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| EtlError::ConfigError {
            message: format!("invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }
}

fn validate_source(prefix: &str, source: &SourceConfig) -> Result<()> {
    validate_url(&format!("{prefix}.base_url"), &source.base_url)?;
    validate_non_empty_string(&format!("{prefix}.token"), &source.token)?;
    if let Some(page_size) = source.page_size {
        validate_positive_number(&format!("{prefix}.page_size"), page_size, 1)?;
    }
    validate_range(&format!("{prefix}.timeout_seconds"), source.timeout_seconds, 1, 3600)?;
    validate_positive_number(&format!("{prefix}.max_pages"), source.max_pages, 1)?;
    Ok(())
}

impl Validate for AppConfig {
    fn validate(&self) -> Result<()> {
        validate_source("source_1", &self.source_1)?;
        validate_source("source_2", &self.source_2)?;

        validate_non_empty_string("database.server", &self.database.server)?;
        validate_non_empty_string("database.database", &self.database.database)?;
        validate_non_empty_string("database.username", &self.database.username)?;
        validate_non_empty_string("database.password", &self.database.password)?;
        validate_range("database.max_connections", self.database.max_connections, 1, 100)?;

        validate_range("retry.attempts", self.retry.attempts, 1, 10)?;
        self.schedule.run_at_time()?;
        validate_non_empty_string("report.output_dir", &self.report.output_dir)?;
        validate_non_empty_string("logging.dir", &self.logging.dir)?;
        Ok(())
    }
}

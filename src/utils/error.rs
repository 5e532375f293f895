use thiserror::Error;

/// Extraction failures raised by the HTTP fetcher.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("network error calling {url}: {source}")]
    Network {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} answered with non-retryable status {status}: {body}")]
    Status { url: String, status: u16, body: String },

    #[error("response from {url} is not valid JSON: {source}")]
    Parse {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("response from {url} has an unexpected shape: {detail}")]
    UnexpectedShape { url: String, detail: String },

    #[error("giving up on {url} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        url: String,
        attempts: u32,
        last_error: String,
    },

    #[error("pagination exceeded {limit} pages starting from {url}")]
    PageLimit { url: String, limit: usize },

    #[error("invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("invalid header value for {header}")]
    InvalidHeader { header: &'static str },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl FetchError {
    /// Transient conditions the fetcher is allowed to retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network { .. } => true,
            FetchError::Status { status, .. } => is_retryable_status(*status),
            _ => false,
        }
    }
}

pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

/// Raised when the first record lacks fields a pipeline requires.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("Schema validation failed: dataset is empty")]
    EmptyDataset,

    #[error("Schema validation failed: missing required fields {0:?}")]
    MissingFields(Vec<String>),
}

#[derive(Error, Debug)]
pub enum InsertError {
    #[error("invalid identifier '{identifier}': {reason}")]
    InvalidIdentifier { identifier: String, reason: String },

    #[error("record {row} does not match the batch columns (missing: {missing:?}, unexpected: {unexpected:?})")]
    ColumnMismatch {
        row: usize,
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    #[error("database write into {table} failed: {source}")]
    Database {
        table: String,
        #[source]
        source: sqlx::Error,
    },
}

#[derive(Error, Debug)]
pub enum EtlError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Insert(#[from] InsertError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing configuration value: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Configuration validation failed for {field}: {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

/// Umbrella error a pipeline run surfaces to its caller.
#[derive(Error, Debug)]
#[error("ETL {pipeline} failed: {source}")]
pub struct PipelineError {
    pub pipeline: String,
    #[source]
    pub source: EtlError,
}

impl PipelineError {
    pub fn new(pipeline: impl Into<String>, source: impl Into<EtlError>) -> Self {
        Self {
            pipeline: pipeline.into(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Extraction,
    Validation,
    Storage,
    Configuration,
    System,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl EtlError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            EtlError::Fetch(_) => ErrorCategory::Extraction,
            EtlError::Schema(_) | EtlError::ProcessingError { .. } => ErrorCategory::Validation,
            EtlError::Insert(_) => ErrorCategory::Storage,
            EtlError::ConfigError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::ConfigValidationError { .. } => ErrorCategory::Configuration,
            EtlError::IoError(_) | EtlError::SerializationError(_) => ErrorCategory::System,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            EtlError::Fetch(FetchError::RetriesExhausted { .. })
            | EtlError::Fetch(FetchError::Network { .. }) => ErrorSeverity::Medium,
            EtlError::Fetch(_)
            | EtlError::Schema(_)
            | EtlError::Insert(_)
            | EtlError::ProcessingError { .. } => ErrorSeverity::High,
            _ => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            EtlError::Fetch(FetchError::RetriesExhausted { .. })
            | EtlError::Fetch(FetchError::Network { .. }) => {
                "The API was unreachable or overloaded; the next scheduled run will try again"
            }
            EtlError::Fetch(FetchError::Status { .. }) => {
                "Check the API URL and that the bearer token is still valid"
            }
            EtlError::Fetch(_) => "The API returned data in an unexpected format; check the source",
            EtlError::Schema(_) => "The API payload no longer carries the expected fields",
            EtlError::Insert(InsertError::Database { .. }) => {
                "Check database connectivity, credentials and that the target table exists"
            }
            EtlError::Insert(_) => "The records do not share one column layout; inspect the payload",
            EtlError::ConfigError { .. }
            | EtlError::MissingConfigError { .. }
            | EtlError::InvalidConfigValueError { .. }
            | EtlError::ConfigValidationError { .. } => {
                "Review the environment variables or the --config file"
            }
            EtlError::IoError(_) => "Check file permissions and free disk space",
            EtlError::SerializationError(_) | EtlError::ProcessingError { .. } => {
                "Re-run with --verbose for details"
            }
        }
    }

    /// Process exit code: 0 low, 1 pipeline failure, 2 transient, 3 config or system.
    pub fn exit_code(&self) -> i32 {
        match self.severity() {
            ErrorSeverity::Low => 0,
            ErrorSeverity::Medium => 2,
            ErrorSeverity::High => 1,
            ErrorSeverity::Critical => 3,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self.category() {
            ErrorCategory::Extraction => format!("Could not fetch data: {}", self),
            ErrorCategory::Validation => format!("Received data failed validation: {}", self),
            ErrorCategory::Storage => format!("Could not store data: {}", self),
            ErrorCategory::Configuration => format!("Configuration problem: {}", self),
            ErrorCategory::System => format!("System error: {}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, EtlError>;

use thiserror::Error;

/// Failure of a single call against a vendor HTTP API.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApiError {
    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("request timed out")]
    Timeout,

    #[error("transport error: {0}")]
    Transport(String),

    #[error("unexpected response body: {0}")]
    Decode(String),

    #[error("pagination stalled: {0}")]
    Stalled(String),
}

impl ApiError {
    /// Transport hiccups, throttling and server errors are worth another attempt.
    /// Anything else (bad token, unknown list) will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ApiError::Timeout | ApiError::Transport(_) => true,
            ApiError::Status { status, .. } => *status == 429 || *status >= 500,
            ApiError::Decode(_) | ApiError::Stalled(_) => false,
        }
    }

    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Status { status: 401 | 403, .. })
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

/// A page of a destination list could not be retrieved. Always fatal for the run.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("fetching list {list_id} failed at {request} after {attempts} attempt(s): {source}")]
pub struct FetchError {
    pub list_id: String,
    pub request: String,
    pub attempts: u32,
    #[source]
    pub source: ApiError,
}

/// A telemetry lookup that produced no usable answer.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QueryFailure {
    #[error("telemetry authentication failed: {0}")]
    Auth(String),

    #[error("telemetry query timed out")]
    Timeout,

    #[error("telemetry server error: {0}")]
    Server(String),

    #[error("telemetry request rejected: {0}")]
    Client(String),

    #[error("telemetry transport error: {0}")]
    Transport(String),

    #[error("malformed telemetry response: {0}")]
    Malformed(String),
}

impl From<ApiError> for QueryFailure {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::Status { status, body } if status == 401 || status == 403 => {
                QueryFailure::Auth(format!("HTTP {}: {}", status, body))
            }
            ApiError::Status { status, body } if status >= 500 => {
                QueryFailure::Server(format!("HTTP {}: {}", status, body))
            }
            ApiError::Status { status, body } => {
                QueryFailure::Client(format!("HTTP {}: {}", status, body))
            }
            ApiError::Timeout => QueryFailure::Timeout,
            ApiError::Transport(msg) => QueryFailure::Transport(msg),
            ApiError::Decode(msg) | ApiError::Stalled(msg) => QueryFailure::Malformed(msg),
        }
    }
}

#[derive(Error, Debug)]
pub enum CleanupError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Deletion not confirmed")]
    ConfirmationDenied,

    #[error("Run cancelled during {stage}")]
    Cancelled { stage: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

impl CleanupError {
    /// Errors that mean the run produced nothing trustworthy.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CleanupError::ConfirmationDenied)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, CleanupError::Cancelled { .. })
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            CleanupError::Fetch(e) if e.source.is_auth() => format!(
                "The destination list API rejected the credentials for list {}",
                e.list_id
            ),
            CleanupError::Fetch(e) => format!(
                "Could not retrieve the complete destination list {}; nothing was deleted",
                e.list_id
            ),
            CleanupError::ConfigError { .. }
            | CleanupError::InvalidConfigValueError { .. }
            | CleanupError::MissingConfigError { .. } => {
                format!("Configuration problem: {}", self)
            }
            CleanupError::ConfirmationDenied => "Deletion was not confirmed".to_string(),
            CleanupError::Cancelled { stage } => {
                format!("Run interrupted during {}; nothing was deleted", stage)
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            CleanupError::Fetch(e) if e.source.is_auth() => {
                "Refresh the list API token and check its scopes"
            }
            CleanupError::Fetch(_) => "Check connectivity to the list API and re-run",
            CleanupError::ConfigError { .. }
            | CleanupError::InvalidConfigValueError { .. }
            | CleanupError::MissingConfigError { .. } => {
                "Fix the configuration file or the command-line overrides"
            }
            CleanupError::ConfirmationDenied => "Re-run with --live and confirm both prompts",
            CleanupError::Cancelled { .. } => "Re-run the cleanup; no batch was issued",
            CleanupError::IoError(_) | CleanupError::CsvError(_) => {
                "Check that the output path is writable"
            }
            _ => "Re-run with --verbose for more detail",
        }
    }
}

pub type Result<T> = std::result::Result<T, CleanupError>;

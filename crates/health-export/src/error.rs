use thiserror::Error;

/// Main error type for health-export
#[derive(Error, Debug)]
pub enum HealthError {
    #[error("Parse error at byte {offset} (line {line}): {message}")]
    Parse {
        offset: u64,
        line: u64,
        message: String,
    },

    #[error("Archive error: {0}")]
    Archive(String),

    #[error("Unknown unit '{unit}' for metric {metric}")]
    Unit { metric: String, unit: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Incompatible database schema: found version {found}, expected {expected}")]
    Schema { found: String, expected: i64 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown timezone: {0}")]
    InvalidTimezone(String),

    #[error("Invalid date format: {0}. Expected YYYY-MM-DD")]
    InvalidDateFormat(String),

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, HealthError>;

impl HealthError {
    /// Create a parse error at a position in the input
    pub fn parse(offset: u64, line: u64, msg: impl Into<String>) -> Self {
        Self::Parse {
            offset,
            line,
            message: msg.into(),
        }
    }

    /// Create an archive error from a message
    pub fn archive(msg: impl Into<String>) -> Self {
        Self::Archive(msg.into())
    }

    /// Create a storage error from a message
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a configuration error from a message
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid parameter error from a message
    pub fn invalid_param(msg: impl Into<String>) -> Self {
        Self::InvalidParameter(msg.into())
    }
}

impl From<rusqlite::Error> for HealthError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<zip::result::ZipError> for HealthError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}

/// One-line message for the terminal, with a hint where the user can act on it
pub fn format_user_error(err: &HealthError) -> String {
    match err {
        HealthError::Schema { .. } => format!(
            "{}. Remove the database (health reset --hard) and import again.",
            err
        ),
        HealthError::Archive(_) => format!(
            "{}. Unzip the export and pass export.xml directly.",
            err
        ),
        _ => err.to_string(),
    }
}

use thiserror::Error;
use std::time::Duration;

#[derive(Error, Debug)]
pub enum DataHubError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("HTTP request error: {0}")]
    RequestError(#[from] reqwest::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    ArrowError(#[from] arrow::error::ArrowError),

    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),

    #[error("Config file error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Date parsing error: {0}")]
    DateError(#[from] chrono::ParseError),

    /// The session could not be validated even after a fresh acquisition.
    #[error("session unavailable: {0}")]
    CookieAcquisition(String),

    #[error("Browser error: {0}")]
    BrowserError(String),

    #[error("Persistence error: {0}")]
    PersistenceError(String),

    #[error("Config error: {0}")]
    ConfigError(String),

    #[error("Data error: {0}")]
    DataError(String),
}

impl DataHubError {
    /// True for the failures that mean no usable session exists.
    pub fn is_session_unavailable(&self) -> bool {
        matches!(
            self,
            DataHubError::CookieAcquisition(_) | DataHubError::BrowserError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, DataHubError>;

/// Why a single endpoint fetch failed. Carried as data, never raised.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchFailure {
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("unexpected HTTP status {0}")]
    Status(u16),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed body: {0}")]
    MalformedBody(String),
}

impl FetchFailure {
    /// The origin answered but refused the session.
    pub fn is_rejection(&self) -> bool {
        matches!(self, FetchFailure::Status(401) | FetchFailure::Status(403))
    }
}

//! Error types for Postdeck

use thiserror::Error;

use crate::types::Platform;

pub type Result<T> = std::result::Result<T, PostdeckError>;

#[derive(Error, Debug)]
pub enum PostdeckError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Content generation failed: {0}")]
    Generation(#[from] GenerationError),

    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),
}

impl PostdeckError {
    /// Returns true for errors the caller caused (bad ids, bad state transitions)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            PostdeckError::InvalidInput(_)
                | PostdeckError::NotFound(_)
                | PostdeckError::Conflict(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {message}")]
    InvalidValue { field: String, message: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt column {column}: {message}")]
    Decode { column: &'static str, message: String },
}

/// Errors raised inside a platform adapter.
///
/// These never cross the adapter boundary: `Platform::post` renders them into
/// the `error` field of a failed `PostResult`. Upstream messages are passed
/// through unchanged.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PlatformError {
    #[error("{0} not configured")]
    NotConfigured(Platform),

    #[error("{0}")]
    Authentication(String),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Posting(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for PlatformError {
    fn from(error: reqwest::Error) -> Self {
        PlatformError::Network(error.to_string())
    }
}

#[derive(Error, Debug)]
pub enum GenerationError {
    #[error("OpenAI API key not configured")]
    NotConfigured,

    #[error("API error: {0}")]
    Api(String),

    #[error("Invalid response format: {0}")]
    InvalidFormat(String),

    #[error("Network error: {0}")]
    Network(String),
}

#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("Unknown platform: {0}")]
    UnknownPlatform(String),

    #[error("{platform} OAuth not configured. Add {env_var} to environment.")]
    NotConfigured {
        platform: Platform,
        env_var: &'static str,
    },

    #[error("invalid_state")]
    InvalidState,

    #[error("token_exchange_failed")]
    TokenExchange(String),

    #[error("Network error: {0}")]
    Network(String),
}

impl From<reqwest::Error> for OAuthError {
    fn from(error: reqwest::Error) -> Self {
        OAuthError::Network(error.to_string())
    }
}

//! Error types for Postpilot

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PostPilotError>;

#[derive(Error, Debug)]
pub enum PostPilotError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Platform error: {0}")]
    Platform(#[from] PlatformError),

    #[error("Credential error: {0}")]
    Credential(#[from] CredentialError),

    #[error("Generation error: {0}")]
    Generation(#[from] GenerationError),

    #[error("Approval channel error: {0}")]
    ApprovalSend(#[from] ApprovalSendError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl PostPilotError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            PostPilotError::InvalidInput(_) => 3,
            PostPilotError::Platform(PlatformError::AuthExpired(_)) => 2,
            PostPilotError::Credential(_) => 2,
            PostPilotError::Platform(_) => 1,
            PostPilotError::Generation(_) => 1,
            PostPilotError::ApprovalSend(_) => 1,
            PostPilotError::Config(_) => 1,
            PostPilotError::Database(_) => 1,
        }
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

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Database operation failed: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration failed: {0}")]
    MigrationError(#[from] sqlx::migrate::MigrateError),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

/// Failure from a publisher adapter after a credential was judged valid.
#[derive(Error, Debug, Clone)]
pub enum PlatformError {
    #[error("Authorization expired: {0}")]
    AuthExpired(String),

    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Content validation failed: {0}")]
    Validation(String),

    #[error("Publishing failed: {0}")]
    Unknown(String),
}

impl PlatformError {
    /// Whether the failure is transient in nature.
    ///
    /// Publish failures are terminal either way; this only steers log
    /// severity and gives a future requeue sweep something to classify on.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlatformError::RateLimited(_) | PlatformError::Unknown(_)
        )
    }
}

/// Failure resolving a usable access token before a publish attempt.
#[derive(Error, Debug, Clone)]
pub enum CredentialError {
    #[error("Credential expired and no refresh token is available")]
    Expired,

    #[error("No credential stored for this user and platform")]
    Missing,

    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
}

/// Content generator failure, isolated to a single post/platform.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct GenerationError(pub String);

/// Approval channel unreachable while sending an approval request.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct ApprovalSendError(pub String);

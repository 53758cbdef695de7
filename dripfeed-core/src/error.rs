use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Reddit API error: {0}")]
    RedditApi(#[from] RedditApiError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Audit error: {0}")]
    Audit(#[from] AuditError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid run state: expected {expected}, found {actual}")]
    InvalidState { expected: String, actual: String },
}

/// Errors returned by the platform when submitting a comment or reading
/// subreddit metadata.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RedditApiError {
    #[error("Authentication failed: {reason}")]
    AuthenticationFailed { reason: String },

    #[error("Rate limit exceeded. Retry after {retry_after} seconds")]
    RateLimitExceeded { retry_after: u64 },

    #[error("Forbidden access to resource: {resource}")]
    Forbidden { resource: String },

    #[error("Account banned from r/{subreddit}")]
    Banned { subreddit: String },

    #[error("Thread is locked: {thread_id}")]
    ThreadLocked { thread_id: String },

    #[error("Thread is archived: {thread_id}")]
    ThreadArchived { thread_id: String },

    #[error("Subreddit not found: {subreddit}")]
    SubredditNotFound { subreddit: String },

    #[error("Thread not found: {thread_id}")]
    ThreadNotFound { thread_id: String },

    #[error("Invalid OAuth token")]
    InvalidToken,

    #[error("Request timeout")]
    RequestTimeout,

    #[error("Invalid API response: {details}")]
    InvalidResponse { details: String },

    #[error("Server error: {status_code}")]
    ServerError { status_code: u16 },

    #[error("Network error: {details}")]
    Network { details: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },

    #[error("Invalid configuration format: {details}")]
    InvalidFormat { details: String },

    #[error("Invalid value for {field}: {value}")]
    InvalidValue { field: String, value: String },

    #[error("Template pool is empty: {pool}")]
    EmptyPool { pool: String },

    #[error("Environment variable not set: {var_name}")]
    MissingEnvironmentVariable { var_name: String },

    #[error("Configuration parsing error: {0}")]
    Parse(#[from] toml::de::Error),
}

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Failed to write audit record: {0}")]
    Write(#[from] std::io::Error),

    #[error("Failed to encode audit record: {0}")]
    Encode(#[from] serde_json::Error),
}

use crate::error::*;
use std::time::Duration;
use tracing::{error, info, warn};

pub trait ErrorExt {
    fn log_error(&self) -> &Self;
    fn log_warn(&self) -> &Self;
    fn is_retryable(&self) -> bool;
    fn retry_after(&self) -> Option<Duration>;
    fn user_friendly_message(&self) -> String;
    fn error_code(&self) -> String;
}

impl ErrorExt for CoreError {
    fn log_error(&self) -> &Self {
        error!("CoreError: {}", self);
        match self {
            CoreError::RedditApi(e) => {
                error!("Reddit API error details: {:?}", e);
            }
            CoreError::Config(e) => {
                error!("Configuration error details: {:?}", e);
            }
            CoreError::Audit(e) => {
                error!("Audit error details: {:?}", e);
            }
            _ => {}
        }
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("CoreError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            CoreError::RedditApi(e) => e.is_retryable(),
            CoreError::Config(e) => e.is_retryable(),
            CoreError::Audit(e) => e.is_retryable(),
            CoreError::Io(_) => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            CoreError::RedditApi(e) => e.retry_after(),
            _ if self.is_retryable() => Some(Duration::from_secs(5)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.user_friendly_message(),
            CoreError::Config(e) => e.user_friendly_message(),
            CoreError::Audit(e) => e.user_friendly_message(),
            CoreError::InvalidState { actual, .. } => {
                format!("This run has already finished ({}). Start a new run.", actual)
            }
            _ => "An unexpected error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            CoreError::RedditApi(e) => e.error_code(),
            CoreError::Config(e) => e.error_code(),
            CoreError::Audit(e) => e.error_code(),
            CoreError::Io(_) => "IO".to_string(),
            CoreError::InvalidState { .. } => "INVALID_STATE".to_string(),
        }
    }
}

impl ErrorExt for RedditApiError {
    fn log_error(&self) -> &Self {
        error!("RedditApiError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("RedditApiError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        match self {
            RedditApiError::RateLimitExceeded { .. } => true,
            RedditApiError::RequestTimeout => true,
            RedditApiError::ServerError { status_code } => *status_code >= 500,
            RedditApiError::Network { .. } => true,
            _ => false,
        }
    }

    fn retry_after(&self) -> Option<Duration> {
        match self {
            RedditApiError::RateLimitExceeded { retry_after } => {
                Some(Duration::from_secs(*retry_after))
            }
            _ if self.is_retryable() => Some(Duration::from_secs(30)),
            _ => None,
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => {
                "Reddit authentication failed. Please log in again.".to_string()
            }
            RedditApiError::RateLimitExceeded { retry_after } => format!(
                "Reddit is rate limiting this account. Wait {} seconds before posting again.",
                retry_after
            ),
            RedditApiError::Forbidden { resource } => {
                format!("Reddit refused access to {}.", resource)
            }
            RedditApiError::Banned { subreddit } => {
                format!("This account is banned from r/{}.", subreddit)
            }
            RedditApiError::ThreadLocked { .. } => {
                "The thread is locked and no longer accepts comments.".to_string()
            }
            RedditApiError::ThreadArchived { .. } => {
                "The thread is archived and no longer accepts comments.".to_string()
            }
            RedditApiError::SubredditNotFound { subreddit } => {
                format!("Subreddit '{}' not found or is private.", subreddit)
            }
            RedditApiError::ThreadNotFound { .. } => {
                "The thread could not be found.".to_string()
            }
            RedditApiError::InvalidToken => {
                "Reddit authentication token is invalid. Please re-authenticate.".to_string()
            }
            RedditApiError::RequestTimeout => {
                "Request to Reddit timed out. Please try again.".to_string()
            }
            _ => "Reddit API error occurred. Please try again later.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            RedditApiError::AuthenticationFailed { .. } => "REDDIT_AUTH_FAILED".to_string(),
            RedditApiError::RateLimitExceeded { .. } => "REDDIT_RATE_LIMIT".to_string(),
            RedditApiError::Forbidden { .. } => "REDDIT_FORBIDDEN".to_string(),
            RedditApiError::Banned { .. } => "REDDIT_BANNED".to_string(),
            RedditApiError::ThreadLocked { .. } => "REDDIT_THREAD_LOCKED".to_string(),
            RedditApiError::ThreadArchived { .. } => "REDDIT_THREAD_ARCHIVED".to_string(),
            RedditApiError::SubredditNotFound { .. } => "REDDIT_SUBREDDIT_NOT_FOUND".to_string(),
            RedditApiError::ThreadNotFound { .. } => "REDDIT_THREAD_NOT_FOUND".to_string(),
            RedditApiError::InvalidToken => "REDDIT_INVALID_TOKEN".to_string(),
            RedditApiError::RequestTimeout => "REDDIT_TIMEOUT".to_string(),
            RedditApiError::InvalidResponse { .. } => "REDDIT_INVALID_RESPONSE".to_string(),
            RedditApiError::ServerError { .. } => "REDDIT_SERVER_ERROR".to_string(),
            RedditApiError::Network { .. } => "REDDIT_NETWORK".to_string(),
        }
    }
}

impl ErrorExt for ConfigError {
    fn log_error(&self) -> &Self {
        error!("ConfigError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("ConfigError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        false // Config errors need the user to fix the input
    }

    fn retry_after(&self) -> Option<Duration> {
        None
    }

    fn user_friendly_message(&self) -> String {
        match self {
            ConfigError::FileNotFound { path } => {
                format!("Configuration file '{}' not found.", path)
            }
            ConfigError::InvalidFormat { .. } => {
                "Configuration file format is invalid. Please check the settings.".to_string()
            }
            ConfigError::InvalidValue { field, .. } => {
                format!("Invalid value for configuration field '{}'.", field)
            }
            ConfigError::EmptyPool { pool } => {
                format!("The '{}' template pool needs at least one entry.", pool)
            }
            ConfigError::MissingEnvironmentVariable { var_name } => format!(
                "Environment variable '{}' is required but not set.",
                var_name
            ),
            ConfigError::Parse(_) => {
                "Configuration file could not be parsed. Please check the syntax.".to_string()
            }
        }
    }

    fn error_code(&self) -> String {
        match self {
            ConfigError::FileNotFound { .. } => "CONFIG_FILE_NOT_FOUND".to_string(),
            ConfigError::InvalidFormat { .. } => "CONFIG_INVALID_FORMAT".to_string(),
            ConfigError::InvalidValue { .. } => "CONFIG_INVALID_VALUE".to_string(),
            ConfigError::EmptyPool { .. } => "CONFIG_EMPTY_POOL".to_string(),
            ConfigError::MissingEnvironmentVariable { .. } => "CONFIG_MISSING_ENV_VAR".to_string(),
            ConfigError::Parse(_) => "CONFIG_PARSE_ERROR".to_string(),
        }
    }
}

impl ErrorExt for AuditError {
    fn log_error(&self) -> &Self {
        error!("AuditError: {}", self);
        self
    }

    fn log_warn(&self) -> &Self {
        warn!("AuditError (warning): {}", self);
        self
    }

    fn is_retryable(&self) -> bool {
        matches!(self, AuditError::Write(_))
    }

    fn retry_after(&self) -> Option<Duration> {
        if self.is_retryable() {
            Some(Duration::from_secs(1))
        } else {
            None
        }
    }

    fn user_friendly_message(&self) -> String {
        match self {
            AuditError::Write(_) => {
                "Could not write to the audit log. Check disk space and permissions.".to_string()
            }
            AuditError::Encode(_) => "Could not encode an audit record.".to_string(),
        }
    }

    fn error_code(&self) -> String {
        match self {
            AuditError::Write(_) => "AUDIT_WRITE_FAILED".to_string(),
            AuditError::Encode(_) => "AUDIT_ENCODE_FAILED".to_string(),
        }
    }
}

pub struct ErrorReporter {
    report_errors: bool,
    report_warnings: bool,
}

impl ErrorReporter {
    pub fn new() -> Self {
        Self {
            report_errors: true,
            report_warnings: true,
        }
    }

    pub fn with_error_reporting(mut self, enabled: bool) -> Self {
        self.report_errors = enabled;
        self
    }

    pub fn with_warning_reporting(mut self, enabled: bool) -> Self {
        self.report_warnings = enabled;
        self
    }

    pub fn report_error(&self, error: &CoreError) {
        if self.report_errors {
            error.log_error();
            info!("Error code: {}", error.error_code());
            info!("User message: {}", error.user_friendly_message());
        }
    }

    pub fn report_warning(&self, error: &CoreError) {
        if self.report_warnings {
            error.log_warn();
        }
    }
}

impl Default for ErrorReporter {
    fn default() -> Self {
        Self::new()
    }
}

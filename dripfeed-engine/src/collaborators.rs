//! Seams to the systems the engine does not own: the platform poster, the
//! subreddit rule source and audit persistence.

use async_trait::async_trait;
use dripfeed_core::{ActionRecord, AuditError, RedditApiError, SubredditRules};
use std::sync::Arc;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostReceipt {
    pub comment_id: Option<String>,
    pub permalink: Option<String>,
}

/// Submits one comment. A call either fully posts or returns an error; the
/// engine never retries.
#[async_trait]
pub trait Poster: Send + Sync {
    async fn submit(
        &self,
        subreddit: &str,
        thread_id: &str,
        text: &str,
    ) -> Result<PostReceipt, RedditApiError>;
}

#[async_trait]
impl<T: Poster + ?Sized> Poster for Arc<T> {
    async fn submit(
        &self,
        subreddit: &str,
        thread_id: &str,
        text: &str,
    ) -> Result<PostReceipt, RedditApiError> {
        (**self).submit(subreddit, thread_id, text).await
    }
}

/// Current rule metadata for a subreddit. Staleness is the caller's concern.
pub trait RuleOracle: Send + Sync {
    fn rules_for(&self, subreddit: &str) -> SubredditRules;
}

/// Receives action records in append order.
pub trait AuditSink: Send {
    fn append(&mut self, record: &ActionRecord) -> Result<(), AuditError>;

    fn flush(&mut self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Poster used for dry runs. The controller never calls it, so reaching it
/// is a bug.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPoster;

#[async_trait]
impl Poster for NoopPoster {
    async fn submit(
        &self,
        _subreddit: &str,
        thread_id: &str,
        _text: &str,
    ) -> Result<PostReceipt, RedditApiError> {
        tracing::error!(thread_id, "NoopPoster reached; live posting is not configured");
        Err(RedditApiError::AuthenticationFailed {
            reason: "No poster configured".to_string(),
        })
    }
}

//! Remote platform seams.
//!
//! Business logic talks to the platform only through these traits. The
//! reqwest-backed [`GitHubClient`] implements all of them; tests provide
//! in-memory implementations.

pub mod graphql;
pub mod rest;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{
    FetchedThread, NewReview, PullRequest, PullRequestRef, Review, ReviewComment, Verdict,
};
use crate::recovery::BreakerError;

pub use rest::GitHubClient;

/// Errors from platform calls. The `Display` text is what error
/// categorization matches on, so it always carries the HTTP status.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request failed: {0}")]
    Transport(String),

    #[error("GraphQL error: {0}")]
    GraphQl(String),

    #[error("unexpected response: {0}")]
    Decode(String),

    #[error("{0}")]
    Unavailable(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl ApiError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Transport(format!("request timed out: {err}"))
        } else if err.is_decode() {
            ApiError::Decode(err.to_string())
        } else {
            ApiError::Transport(err.to_string())
        }
    }
}

impl From<BreakerError<ApiError>> for ApiError {
    fn from(err: BreakerError<ApiError>) -> Self {
        match err {
            BreakerError::Inner(inner) => inner,
            other => ApiError::Unavailable(other.to_string()),
        }
    }
}

/// Result of asking the platform to create a review.
#[derive(Debug, Clone)]
pub enum CreateReviewOutcome {
    Created(Review),
    /// The identity already owns a pending review on this pull request.
    PendingConflict,
}

/// One page of review threads.
#[derive(Debug, Clone, Default)]
pub struct ThreadPage {
    pub threads: Vec<ThreadPageEntry>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// A thread with its first page of comments and where that page ended.
#[derive(Debug, Clone)]
pub struct ThreadPageEntry {
    pub thread: FetchedThread,
    pub comments_has_next_page: bool,
    pub comments_end_cursor: Option<String>,
}

/// One page of a single thread's comments.
#[derive(Debug, Clone, Default)]
pub struct CommentPage {
    pub comments: Vec<ReviewComment>,
    pub has_next_page: bool,
    pub end_cursor: Option<String>,
}

/// Review and pull request operations (REST).
#[async_trait]
pub trait ReviewApi: Send + Sync {
    /// Login of the identity the token belongs to.
    async fn authenticated_user(&self) -> Result<String, ApiError>;

    async fn pull_request(&self, pr: &PullRequestRef) -> Result<PullRequest, ApiError>;

    /// All reviews, each with the inline comments submitted with it.
    async fn list_reviews(&self, pr: &PullRequestRef) -> Result<Vec<Review>, ApiError>;

    /// Inline review comments, flat.
    async fn list_review_comments(&self, pr: &PullRequestRef) -> Result<Vec<ReviewComment>, ApiError>;

    /// General conversation comments.
    async fn list_issue_comments(&self, pr: &PullRequestRef) -> Result<Vec<ReviewComment>, ApiError>;

    async fn list_changed_files(&self, pr: &PullRequestRef) -> Result<Vec<String>, ApiError>;

    async fn create_review(
        &self,
        pr: &PullRequestRef,
        review: &NewReview,
    ) -> Result<CreateReviewOutcome, ApiError>;

    /// Submit an existing pending review.
    async fn submit_review(
        &self,
        pr: &PullRequestRef,
        review_id: u64,
        verdict: Verdict,
        body: &str,
    ) -> Result<Review, ApiError>;

    async fn dismiss_review(
        &self,
        pr: &PullRequestRef,
        review_id: u64,
        message: &str,
    ) -> Result<(), ApiError>;

    /// Discard a pending review. Pending reviews cannot be dismissed, only deleted.
    async fn discard_pending_review(&self, pr: &PullRequestRef, review_id: u64) -> Result<(), ApiError>;

    async fn request_reviewers(&self, pr: &PullRequestRef, reviewers: &[String]) -> Result<(), ApiError>;

    /// Decoded file content at a git ref.
    async fn file_content_at_ref(
        &self,
        pr: &PullRequestRef,
        path: &str,
        git_ref: &str,
    ) -> Result<String, ApiError>;

    async fn commit_exists(&self, pr: &PullRequestRef, sha: &str) -> Result<bool, ApiError>;
}

/// Review thread queries and mutations (GraphQL).
#[async_trait]
pub trait ThreadApi: Send + Sync {
    async fn fetch_threads_page(
        &self,
        pr: &PullRequestRef,
        after: Option<&str>,
        page_size: u32,
        comment_page_size: u32,
    ) -> Result<ThreadPage, ApiError>;

    async fn fetch_thread_comments_page(
        &self,
        thread_id: &str,
        after: Option<&str>,
        page_size: u32,
    ) -> Result<CommentPage, ApiError>;

    /// Reply to a thread; returns the new comment's id.
    async fn add_reply(&self, thread_id: &str, body: &str) -> Result<String, ApiError>;

    async fn resolve_thread(&self, thread_id: &str) -> Result<(), ApiError>;
}

/// The comment that carries the review tracking marker.
#[async_trait]
pub trait TrackingCommentStore: Send + Sync {
    async fn read(&self, pr: &PullRequestRef, comment_id: u64) -> Result<String, ApiError>;
    async fn write(&self, pr: &PullRequestRef, comment_id: u64, body: &str) -> Result<(), ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recovery::{ErrorCategory, categorize};
    use std::time::Duration;

    #[test]
    fn http_errors_categorize_by_status() {
        let forbidden = ApiError::Http {
            status: 403,
            message: "Resource not accessible by integration".into(),
        };
        assert_eq!(categorize(&forbidden), ErrorCategory::Permission);

        let missing = ApiError::Http {
            status: 404,
            message: "Not Found".into(),
        };
        assert!(missing.is_not_found());
        assert_eq!(categorize(&missing), ErrorCategory::NotFound);
    }

    #[test]
    fn breaker_errors_unwrap_inner() {
        let err: ApiError = BreakerError::Inner(ApiError::GraphQl("boom".into())).into();
        assert!(matches!(err, ApiError::GraphQl(_)));

        let err: ApiError = BreakerError::<ApiError>::Timeout {
            name: "threads page".into(),
            after: Duration::from_secs(30),
        }
        .into();
        assert_eq!(categorize(&err), ErrorCategory::Network);
    }
}

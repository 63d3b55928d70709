//! Incremental review window.
//!
//! The tracking comment records the last reviewed commit. When that
//! commit is still reachable the next review only needs `base..head`;
//! otherwise (force-push, rebase, no marker) the whole pull request is
//! reviewed again.

use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::github::{ApiError, ReviewApi, TrackingCommentStore};
use crate::models::PullRequestRef;
use crate::models::metadata::extract_review_metadata;
use crate::recovery::ErrorRecovery;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FullReviewReason {
    NoTrackingComment,
    /// The comment exists but carries no valid marker.
    NoPreviousReview,
    /// The recorded commit is gone from history, or could not be checked.
    ReviewedCommitMissing,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReviewWindow {
    UpToDate { head: String },
    Incremental { base: String, head: String },
    Full { head: String, reason: FullReviewReason },
}

impl ReviewWindow {
    pub fn head(&self) -> &str {
        match self {
            ReviewWindow::UpToDate { head }
            | ReviewWindow::Incremental { head, .. }
            | ReviewWindow::Full { head, .. } => head,
        }
    }
}

/// Work out what the next review has to cover.
///
/// Only failures to load the pull request itself are errors. A missing or
/// unreadable marker, or a reviewed commit that cannot be looked up,
/// degrades to a full review.
pub async fn determine_window(
    api: &dyn ReviewApi,
    store: &dyn TrackingCommentStore,
    recovery: &ErrorRecovery,
    pr: &PullRequestRef,
    tracking_comment_id: Option<u64>,
) -> Result<ReviewWindow, ApiError> {
    let head = recovery
        .run("get pull request", true, || api.pull_request(pr))
        .await?
        .map(|pull| pull.head_sha)
        .ok_or_else(|| ApiError::Unavailable("pull request details unavailable".to_string()))?;

    let full = |reason| ReviewWindow::Full {
        head: head.clone(),
        reason,
    };

    let Some(comment_id) = tracking_comment_id else {
        return Ok(full(FullReviewReason::NoTrackingComment));
    };

    let body = recovery
        .run_or("read tracking comment", false, String::new(), || store.read(pr, comment_id))
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(%pr, comment_id, "tracking comment unreadable: {err}");
            String::new()
        });
    let Some(metadata) = extract_review_metadata(&body) else {
        return Ok(full(FullReviewReason::NoPreviousReview));
    };

    let base = metadata.last_reviewed_sha;
    if head.starts_with(&base) {
        return Ok(ReviewWindow::UpToDate { head });
    }

    let exists = recovery
        .run_or("check reviewed commit", false, false, || api.commit_exists(pr, &base))
        .await
        .unwrap_or_else(|err| {
            tracing::warn!(%pr, sha = %base, "reviewed commit lookup failed: {err}");
            false
        });
    if !exists {
        tracing::info!(%pr, sha = %base, "previously reviewed commit no longer exists, reviewing everything");
        return Ok(full(FullReviewReason::ReviewedCommitMissing));
    }

    Ok(ReviewWindow::Incremental { base, head })
}

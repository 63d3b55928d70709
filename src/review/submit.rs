//! Formal review submission.
//!
//! The platform allows one pending review per identity per pull request,
//! so submission first looks for one and merges into it instead of
//! creating a second. A create call that still hits the conflict gets a
//! single recovery pass through the merge path.
//!
//! ```text
//! Idle -> CheckingPending -> MergingPending -> PostProcessing -> Done
//!                         \-> SubmittingNew  -/
//! SubmittingNew --conflict--> ErrorRecovery -> MergingPending
//! MergingPending --submit failed, discarded--> SubmittingNew
//! ```
//!
//! Post-processing never fails a submission whose verdict is already recorded.

use std::future::Future;

use serde::Serialize;
use strum::{AsRefStr, Display};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::github::{ApiError, CreateReviewOutcome, ReviewApi, TrackingCommentStore};
use crate::models::metadata::upsert_metadata_marker;
use crate::models::{NewReview, PendingReview, PullRequestRef, Review, ReviewMetadata, Verdict};
use crate::recovery::ErrorRecovery;
use crate::review::dismiss::{DEFAULT_DISMISS_MESSAGE, DismissalReport, dismiss_change_requests_by};
use crate::security::Sanitizer;

pub const BODY_SEPARATOR: &str = "\n\n---\n\n";

#[derive(Error, Debug)]
pub enum SubmitError {
    #[error("a {0} review requires a non-empty body")]
    EmptyBody(Verdict),

    #[error(
        "{pr}: an identity can only have one pending review per pull request, and the existing one \
         could not be merged. Submit or delete it on the pull request, then try again"
    )]
    PendingConflict { pr: String },

    #[error(
        "could not submit pending review {review_id} ({submit_error}) and could not discard it ({discard_error})"
    )]
    PendingUnrecoverable {
        review_id: u64,
        submit_error: String,
        discard_error: String,
    },

    #[error(transparent)]
    Api(#[from] ApiError),
}

/// What to submit.
#[derive(Debug, Clone)]
pub struct SubmitRequest {
    pub pr: PullRequestRef,
    pub verdict: Verdict,
    pub body: String,
    /// Defaults to the pull request's head.
    pub commit_id: Option<String>,
    /// Issue comment that carries the review tracking marker.
    pub tracking_comment_id: Option<u64>,
}

/// How the verdict reached the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SubmissionPath {
    Created,
    MergedPending,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum MetadataOutcome {
    NotRequested,
    Written { marker: ReviewMetadata },
    Failed { message: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmissionReport {
    pub review: Review,
    pub path: SubmissionPath,
    pub commit_id: String,
    pub metadata: MetadataOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dismissal: Option<DismissalReport>,
}

/// Submission states. `Idle` is the validation done before the loop starts.
#[derive(Debug)]
enum State {
    CheckingPending,
    MergingPending(PendingReview),
    SubmittingNew,
    ErrorRecovery,
    PostProcessing(Review, SubmissionPath),
    Done(Box<SubmissionReport>),
}

impl State {
    fn name(&self) -> &'static str {
        match self {
            State::CheckingPending => "checking_pending",
            State::MergingPending(_) => "merging_pending",
            State::SubmittingNew => "submitting_new",
            State::ErrorRecovery => "error_recovery",
            State::PostProcessing(..) => "post_processing",
            State::Done(_) => "done",
        }
    }
}

/// Join a pending review's body with a new one.
pub fn merge_bodies(existing: &str, new: &str) -> String {
    match (existing.trim().is_empty(), new.trim().is_empty()) {
        (false, false) => format!("{existing}{BODY_SEPARATOR}{new}"),
        (false, true) => existing.to_string(),
        _ => new.to_string(),
    }
}

pub struct ReviewSubmitter<'a> {
    api: &'a dyn ReviewApi,
    store: &'a dyn TrackingCommentStore,
    recovery: &'a ErrorRecovery,
    sanitizer: &'a dyn Sanitizer,
}

/// Everything the states share, fixed once validation passes.
struct Submission<'r> {
    request: &'r SubmitRequest,
    login: String,
    body: String,
    commit_id: String,
}

impl<'a> ReviewSubmitter<'a> {
    pub fn new(
        api: &'a dyn ReviewApi,
        store: &'a dyn TrackingCommentStore,
        recovery: &'a ErrorRecovery,
        sanitizer: &'a dyn Sanitizer,
    ) -> Self {
        Self {
            api,
            store,
            recovery,
            sanitizer,
        }
    }

    pub async fn submit(&self, request: &SubmitRequest) -> Result<SubmissionReport, SubmitError> {
        let body = self.sanitizer.sanitize(&request.body);
        if request.verdict.requires_body() && body.trim().is_empty() {
            return Err(SubmitError::EmptyBody(request.verdict));
        }

        let pr = &request.pr;
        let api = self.api;
        let login = self
            .read("resolve authenticated identity", || api.authenticated_user())
            .await?;
        let commit_id = match &request.commit_id {
            Some(sha) => sha.clone(),
            None => self.read("get pull request", || api.pull_request(pr)).await?.head_sha,
        };

        let submission = Submission {
            request,
            login,
            body,
            commit_id,
        };
        let mut conflict_recovered = false;
        let mut state = State::CheckingPending;

        loop {
            debug!(%pr, state = state.name(), "review submission");
            state = match state {
                State::CheckingPending => match self.find_pending(&submission).await? {
                    Some(pending) => State::MergingPending(pending),
                    None => State::SubmittingNew,
                },
                State::MergingPending(pending) => self.merge_pending(&submission, pending).await?,
                State::SubmittingNew => {
                    let new_review = NewReview {
                        verdict: request.verdict,
                        body: submission.body.clone(),
                        commit_id: submission.commit_id.clone(),
                    };
                    match api.create_review(pr, &new_review).await? {
                        CreateReviewOutcome::Created(review) => {
                            State::PostProcessing(review, SubmissionPath::Created)
                        }
                        CreateReviewOutcome::PendingConflict if !conflict_recovered => {
                            conflict_recovered = true;
                            warn!(%pr, "create review hit a pending review conflict, attempting recovery");
                            State::ErrorRecovery
                        }
                        CreateReviewOutcome::PendingConflict => {
                            return Err(SubmitError::PendingConflict { pr: pr.to_string() });
                        }
                    }
                }
                State::ErrorRecovery => match self.find_pending(&submission).await? {
                    Some(pending) => State::MergingPending(pending),
                    None => return Err(SubmitError::PendingConflict { pr: pr.to_string() }),
                },
                State::PostProcessing(review, path) => {
                    let report = self.post_process(&submission, review, path).await;
                    State::Done(Box::new(report))
                }
                State::Done(report) => {
                    info!(
                        %pr,
                        review = report.review.id,
                        verdict = %request.verdict,
                        path = report.path.as_ref(),
                        "review submitted"
                    );
                    return Ok(*report);
                }
            };
        }
    }

    /// Critical read through the recovery layer.
    async fn read<T, F, Fut>(&self, name: &str, operation: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ApiError>>,
    {
        self.recovery
            .run(name, true, operation)
            .await?
            .ok_or_else(|| ApiError::Unavailable(format!("{name} returned no result")))
    }

    async fn find_pending(&self, submission: &Submission<'_>) -> Result<Option<PendingReview>, ApiError> {
        let api = self.api;
        let pr = &submission.request.pr;
        let reviews = self.read("list reviews", || api.list_reviews(pr)).await?;
        Ok(PendingReview::find(&reviews, &submission.login))
    }

    /// Submit the pending review with the merged body; on failure discard
    /// it so a fresh review can be created.
    async fn merge_pending(
        &self,
        submission: &Submission<'_>,
        pending: PendingReview,
    ) -> Result<State, SubmitError> {
        let pr = &submission.request.pr;
        let merged = merge_bodies(&self.sanitizer.sanitize(&pending.body), &submission.body);
        info!(%pr, review = pending.id, "merging into existing pending review");

        let submit_error = match self
            .api
            .submit_review(pr, pending.id, submission.request.verdict, &merged)
            .await
        {
            Ok(review) => return Ok(State::PostProcessing(review, SubmissionPath::MergedPending)),
            Err(err) => err,
        };

        warn!(
            %pr,
            review = pending.id,
            "could not submit pending review ({submit_error}); discarding it so a new review can be created"
        );
        match self.api.discard_pending_review(pr, pending.id).await {
            Ok(()) => Ok(State::SubmittingNew),
            Err(discard_error) => Err(SubmitError::PendingUnrecoverable {
                review_id: pending.id,
                submit_error: submit_error.to_string(),
                discard_error: discard_error.to_string(),
            }),
        }
    }

    async fn post_process(
        &self,
        submission: &Submission<'_>,
        review: Review,
        path: SubmissionPath,
    ) -> SubmissionReport {
        let request = submission.request;
        let commit_id = review
            .commit_id
            .clone()
            .unwrap_or_else(|| submission.commit_id.clone());

        let metadata = match request.tracking_comment_id {
            None => MetadataOutcome::NotRequested,
            Some(comment_id) => {
                let marker = ReviewMetadata::now(&commit_id, Some(review.id));
                let store = self.store;
                let pr = &request.pr;
                let marker_ref = &marker;
                let written = self
                    .recovery
                    .run("write review metadata", false, move || async move {
                        let body = store.read(pr, comment_id).await?;
                        store
                            .write(pr, comment_id, &upsert_metadata_marker(&body, marker_ref))
                            .await
                    })
                    .await;
                match written {
                    Ok(Some(())) => MetadataOutcome::Written { marker },
                    Ok(None) => MetadataOutcome::Failed {
                        message: format!("tracking comment {comment_id} could not be updated"),
                    },
                    Err(err) => MetadataOutcome::Failed {
                        message: err.to_string(),
                    },
                }
            }
        };
        if let MetadataOutcome::Failed { message } = &metadata {
            warn!(pr = %request.pr, "review metadata not written: {message}");
        }

        let dismissal = if request.verdict == Verdict::Comment {
            let report = dismiss_change_requests_by(
                self.api,
                self.recovery,
                &request.pr,
                &submission.login,
                DEFAULT_DISMISS_MESSAGE,
            )
            .await;
            if !report.success {
                warn!(pr = %request.pr, errors = report.errors.len(), "stale change requests remain");
            }
            Some(report)
        } else {
            None
        };

        SubmissionReport {
            review,
            path,
            commit_id,
            metadata,
            dismissal,
        }
    }
}

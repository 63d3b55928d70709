//! In-memory GitHub used by the integration tests.
//!
//! Implements every platform trait over shared mutable state and logs each
//! call so tests can assert on what reached the "platform".

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use threadkeeper::github::{
    ApiError, CommentPage, CreateReviewOutcome, ReviewApi, ThreadApi, ThreadPage, ThreadPageEntry,
    TrackingCommentStore,
};
use threadkeeper::models::{
    FetchedThread, NewReview, PullRequest, PullRequestRef, Review, ReviewComment, ReviewState, Verdict,
};
use threadkeeper::session::Clients;

pub const BOT: &str = "review-bot";
pub const AUTHOR: &str = "pr-author";
pub const HEAD_SHA: &str = "deadbeefcafe0000111122223333444455556666";

pub fn pr() -> PullRequestRef {
    PullRequestRef::new("octo", "widgets", 7)
}

pub fn review(id: u64, author: &str, state: ReviewState, body: &str) -> Review {
    Review {
        id,
        author: author.to_string(),
        state,
        body: body.to_string(),
        commit_id: None,
        submitted_at: None,
        comments: vec![],
    }
}

pub fn comment(id: &str, author: &str, body: &str, file: Option<(&str, u32)>) -> ReviewComment {
    ReviewComment {
        id: Some(id.to_string()),
        body: body.to_string(),
        author: author.to_string(),
        created_at: None,
        file: file.map(|(f, _)| f.to_string()),
        line: file.map(|(_, l)| l),
        thread_id: None,
        review_id: None,
        is_minimized: false,
    }
}

pub fn thread(id: &str, file: &str, line: u32, resolved: bool, comments: Vec<ReviewComment>) -> FetchedThread {
    FetchedThread {
        id: id.to_string(),
        file: file.to_string(),
        line: Some(line),
        is_resolved: resolved,
        is_outdated: false,
        comments,
    }
}

/// The review state a successful submission ends up in.
fn state_after(verdict: Verdict) -> ReviewState {
    match verdict {
        Verdict::Approve => ReviewState::Approved,
        Verdict::RequestChanges => ReviewState::ChangesRequested,
        Verdict::Comment => ReviewState::Commented,
    }
}

fn http(status: u16, message: &str) -> ApiError {
    ApiError::Http {
        status,
        message: message.to_string(),
    }
}

#[derive(Default)]
pub struct State {
    pub reviews: Vec<Review>,
    pub next_review_id: u64,
    /// Remaining create calls that report a pending-review conflict.
    pub create_conflicts: usize,
    /// Inserted into `reviews` the first time a conflict is reported.
    pub pending_on_conflict: Option<Review>,
    pub fail_submit: bool,
    pub fail_discard: bool,
    pub fail_dismiss: HashSet<u64>,
    pub fail_list_reviews: bool,

    pub tracking: HashMap<u64, String>,
    pub fail_tracking_write: bool,
    pub commits: HashSet<String>,
    pub fail_commit_lookup: bool,

    pub threads: Vec<FetchedThread>,
    pub fail_threads: bool,
    pub issue_comments: Vec<ReviewComment>,
    pub review_comments: Vec<ReviewComment>,
    pub changed_files: Vec<String>,
    pub reject_threads: HashSet<String>,
    pub resolved: Vec<String>,
    pub replies: Vec<(String, String)>,
    pub requested_reviewers: Vec<String>,

    pub calls: Vec<String>,
}

#[derive(Clone)]
pub struct FakeGitHub {
    pub state: Arc<Mutex<State>>,
}

impl FakeGitHub {
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(State {
                next_review_id: 1000,
                ..State::default()
            })),
        }
    }

    pub fn with<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        f(&mut self.state.lock().unwrap())
    }

    pub fn calls(&self) -> Vec<String> {
        self.with(|s| s.calls.clone())
    }

    pub fn called(&self, name: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == name).count()
    }

    pub fn clients(&self) -> Clients {
        let shared = Arc::new(self.clone());
        Clients {
            reviews: shared.clone(),
            threads: shared.clone(),
            tracking: shared,
        }
    }

    fn log(&self, call: &str) {
        self.with(|s| s.calls.push(call.to_string()));
    }
}

#[async_trait]
impl ReviewApi for FakeGitHub {
    async fn authenticated_user(&self) -> Result<String, ApiError> {
        self.log("authenticated_user");
        Ok(BOT.to_string())
    }

    async fn pull_request(&self, pr: &PullRequestRef) -> Result<PullRequest, ApiError> {
        self.log("pull_request");
        Ok(PullRequest {
            number: pr.number,
            author: AUTHOR.to_string(),
            head_sha: HEAD_SHA.to_string(),
            base_sha: "0123456789abcdef0123456789abcdef01234567".to_string(),
            title: "Add widgets".to_string(),
        })
    }

    async fn list_reviews(&self, _pr: &PullRequestRef) -> Result<Vec<Review>, ApiError> {
        self.log("list_reviews");
        self.with(|s| {
            if s.fail_list_reviews {
                return Err(http(401, "Bad credentials"));
            }
            Ok(s.reviews.clone())
        })
    }

    async fn list_review_comments(&self, _pr: &PullRequestRef) -> Result<Vec<ReviewComment>, ApiError> {
        self.log("list_review_comments");
        Ok(self.with(|s| s.review_comments.clone()))
    }

    async fn list_issue_comments(&self, _pr: &PullRequestRef) -> Result<Vec<ReviewComment>, ApiError> {
        self.log("list_issue_comments");
        Ok(self.with(|s| s.issue_comments.clone()))
    }

    async fn list_changed_files(&self, _pr: &PullRequestRef) -> Result<Vec<String>, ApiError> {
        self.log("list_changed_files");
        Ok(self.with(|s| s.changed_files.clone()))
    }

    async fn create_review(
        &self,
        _pr: &PullRequestRef,
        review: &NewReview,
    ) -> Result<CreateReviewOutcome, ApiError> {
        self.log("create_review");
        Ok(self.with(|s| {
            if s.create_conflicts > 0 {
                s.create_conflicts -= 1;
                if let Some(pending) = s.pending_on_conflict.take() {
                    s.reviews.push(pending);
                }
                return CreateReviewOutcome::PendingConflict;
            }
            s.next_review_id += 1;
            let created = Review {
                id: s.next_review_id,
                author: BOT.to_string(),
                state: state_after(review.verdict),
                body: review.body.clone(),
                commit_id: Some(review.commit_id.clone()),
                submitted_at: None,
                comments: vec![],
            };
            s.reviews.push(created.clone());
            CreateReviewOutcome::Created(created)
        }))
    }

    async fn submit_review(
        &self,
        _pr: &PullRequestRef,
        review_id: u64,
        verdict: Verdict,
        body: &str,
    ) -> Result<Review, ApiError> {
        self.log("submit_review");
        self.with(|s| {
            if s.fail_submit {
                return Err(http(422, "Unprocessable Entity"));
            }
            let review = s
                .reviews
                .iter_mut()
                .find(|r| r.id == review_id)
                .ok_or_else(|| http(404, "Not Found"))?;
            review.state = state_after(verdict);
            review.body = body.to_string();
            review.commit_id = Some(HEAD_SHA.to_string());
            Ok(review.clone())
        })
    }

    async fn dismiss_review(&self, _pr: &PullRequestRef, review_id: u64, _message: &str) -> Result<(), ApiError> {
        self.log("dismiss_review");
        self.with(|s| {
            if s.fail_dismiss.contains(&review_id) {
                return Err(http(422, "Validation Failed: review cannot be dismissed"));
            }
            if let Some(review) = s.reviews.iter_mut().find(|r| r.id == review_id) {
                review.state = ReviewState::Dismissed;
            }
            Ok(())
        })
    }

    async fn discard_pending_review(&self, _pr: &PullRequestRef, review_id: u64) -> Result<(), ApiError> {
        self.log("discard_pending_review");
        self.with(|s| {
            if s.fail_discard {
                return Err(http(403, "Forbidden"));
            }
            s.reviews.retain(|r| r.id != review_id);
            Ok(())
        })
    }

    async fn request_reviewers(&self, _pr: &PullRequestRef, reviewers: &[String]) -> Result<(), ApiError> {
        self.log("request_reviewers");
        self.with(|s| s.requested_reviewers.extend(reviewers.iter().cloned()));
        Ok(())
    }

    async fn file_content_at_ref(&self, _pr: &PullRequestRef, path: &str, git_ref: &str) -> Result<String, ApiError> {
        self.log("file_content_at_ref");
        Ok(format!("{path}@{git_ref}"))
    }

    async fn commit_exists(&self, _pr: &PullRequestRef, sha: &str) -> Result<bool, ApiError> {
        self.log("commit_exists");
        self.with(|s| {
            if s.fail_commit_lookup {
                return Err(http(403, "Resource not accessible by integration"));
            }
            Ok(s.commits.contains(sha))
        })
    }
}

#[async_trait]
impl ThreadApi for FakeGitHub {
    async fn fetch_threads_page(
        &self,
        _pr: &PullRequestRef,
        after: Option<&str>,
        page_size: u32,
        _comment_page_size: u32,
    ) -> Result<ThreadPage, ApiError> {
        self.log("fetch_threads_page");
        self.with(|s| {
            if s.fail_threads {
                return Err(ApiError::GraphQl(
                    "Could not resolve to a PullRequest with the number of 7".to_string(),
                ));
            }
            let start: usize = after.and_then(|c| c.parse().ok()).unwrap_or(0);
            let end = (start + page_size as usize).min(s.threads.len());
            let threads = s.threads[start..end]
                .iter()
                .cloned()
                .map(|thread| ThreadPageEntry {
                    thread,
                    comments_has_next_page: false,
                    comments_end_cursor: None,
                })
                .collect();
            Ok(ThreadPage {
                threads,
                has_next_page: end < s.threads.len(),
                end_cursor: Some(end.to_string()),
            })
        })
    }

    async fn fetch_thread_comments_page(
        &self,
        _thread_id: &str,
        _after: Option<&str>,
        _page_size: u32,
    ) -> Result<CommentPage, ApiError> {
        self.log("fetch_thread_comments_page");
        Ok(CommentPage::default())
    }

    async fn add_reply(&self, thread_id: &str, body: &str) -> Result<String, ApiError> {
        self.log("add_reply");
        self.with(|s| {
            if s.reject_threads.contains(thread_id) {
                return Err(ApiError::GraphQl(format!(
                    "Could not resolve to a node with the global id of '{thread_id}'"
                )));
            }
            s.replies.push((thread_id.to_string(), body.to_string()));
            Ok(format!("reply-{}", s.replies.len()))
        })
    }

    async fn resolve_thread(&self, thread_id: &str) -> Result<(), ApiError> {
        self.log("resolve_thread");
        self.with(|s| {
            if s.reject_threads.contains(thread_id) {
                return Err(ApiError::GraphQl(format!(
                    "Could not resolve to a node with the global id of '{thread_id}'"
                )));
            }
            s.resolved.push(thread_id.to_string());
            Ok(())
        })
    }
}

#[async_trait]
impl TrackingCommentStore for FakeGitHub {
    async fn read(&self, _pr: &PullRequestRef, comment_id: u64) -> Result<String, ApiError> {
        self.log("tracking_read");
        self.with(|s| s.tracking.get(&comment_id).cloned().ok_or_else(|| http(404, "Not Found")))
    }

    async fn write(&self, _pr: &PullRequestRef, comment_id: u64, body: &str) -> Result<(), ApiError> {
        self.log("tracking_write");
        self.with(|s| {
            if s.fail_tracking_write {
                return Err(http(403, "Resource not accessible by integration"));
            }
            s.tracking.insert(comment_id, body.to_string());
            Ok(())
        })
    }
}

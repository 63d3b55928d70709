//! REST side of the GitHub client.
//!
//! Wire payloads are deserialized into private response structs and
//! mapped into [`crate::models`] types here; nothing above this layer
//! sees raw JSON.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use reqwest::header::ACCEPT;
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{ApiError, CreateReviewOutcome, ReviewApi, TrackingCommentStore};
use crate::config::GitHubConfig;
use crate::constants;
use crate::models::{
    NewReview, PullRequest, PullRequestRef, Review, ReviewComment, ReviewState, Verdict,
};

/// Substring of the 422 response GitHub returns when the identity
/// already owns a pending review. This couples us to upstream wording;
/// it is matched here and nowhere else.
pub const PENDING_REVIEW_CONFLICT: &str = "one pending review";

/// Listing endpoints are walked at most this many pages deep.
const MAX_LIST_PAGES: u32 = 30;
const PER_PAGE: usize = 100;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Login reported for comments whose author account was deleted.
const GHOST_LOGIN: &str = "ghost";

/// reqwest-backed client for the GitHub REST and GraphQL APIs.
#[derive(Clone)]
pub struct GitHubClient {
    pub(super) http: reqwest::Client,
    pub(super) api_url: String,
    pub(super) graphql_url: String,
    pub(super) token: String,
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url)
            .field("graphql_url", &self.graphql_url)
            .finish_non_exhaustive()
    }
}

impl GitHubClient {
    pub fn new(config: &GitHubConfig) -> Result<Self, ApiError> {
        let token = config
            .require_token()
            .map_err(|err| ApiError::Configuration(err.to_string()))?
            .to_string();
        let http = reqwest::Client::builder()
            .user_agent(constants::USER_AGENT)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            graphql_url: config.graphql_url.clone(),
            token,
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.api_url))
            .bearer_auth(&self.token)
            .header(ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", constants::GITHUB_API_VERSION)
    }

    /// Send and turn non-2xx responses into [`ApiError::Http`].
    pub(super) async fn send(request: RequestBuilder) -> Result<Response, ApiError> {
        let response = request.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(ApiError::Http {
            status: status.as_u16(),
            message: error_message(&body, status.canonical_reason().unwrap_or("error")),
        })
    }

    async fn send_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ApiError> {
        Self::send(request)
            .await?
            .json::<T>()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Walk a page-numbered listing endpoint.
    async fn get_all<T: DeserializeOwned>(&self, path: &str) -> Result<Vec<T>, ApiError> {
        let mut items = Vec::new();
        for page in 1..=MAX_LIST_PAGES {
            let batch: Vec<T> = Self::send_json(
                self.request(Method::GET, path)
                    .query(&[("per_page", PER_PAGE.to_string()), ("page", page.to_string())]),
            )
            .await?;
            let last = batch.len() < PER_PAGE;
            items.extend(batch);
            if last {
                return Ok(items);
            }
        }
        tracing::warn!(path, pages = MAX_LIST_PAGES, "listing truncated");
        Ok(items)
    }
}

fn repo_path(pr: &PullRequestRef) -> String {
    format!("/repos/{}/{}", pr.owner, pr.repo)
}

fn pull_path(pr: &PullRequestRef) -> String {
    format!("{}/pulls/{}", repo_path(pr), pr.number)
}

/// Pull a readable message out of a GitHub error body.
///
/// GitHub puts the specific reason in `errors`, which may hold plain
/// strings or objects with a `message` field.
fn error_message(body: &str, fallback: &str) -> String {
    let Ok(json) = serde_json::from_str::<serde_json::Value>(body) else {
        let body = body.trim();
        return if body.is_empty() { fallback.to_string() } else { body.to_string() };
    };

    let mut parts: Vec<String> = Vec::new();
    if let Some(message) = json.get("message").and_then(|m| m.as_str()) {
        parts.push(message.to_string());
    }
    if let Some(errors) = json.get("errors").and_then(|e| e.as_array()) {
        for error in errors {
            match error {
                serde_json::Value::String(s) => parts.push(s.clone()),
                other => {
                    if let Some(message) = other.get("message").and_then(|m| m.as_str()) {
                        parts.push(message.to_string());
                    }
                }
            }
        }
    }

    if parts.is_empty() { fallback.to_string() } else { parts.join(": ") }
}

// ── Wire types ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct UserResponse {
    login: String,
}

fn login(user: Option<UserResponse>) -> String {
    user.map(|u| u.login).unwrap_or_else(|| GHOST_LOGIN.to_string())
}

#[derive(Debug, Deserialize)]
struct PullRequestResponse {
    number: u64,
    #[serde(default)]
    title: String,
    user: Option<UserResponse>,
    head: CommitRefResponse,
    base: CommitRefResponse,
}

#[derive(Debug, Deserialize)]
struct CommitRefResponse {
    sha: String,
}

#[derive(Debug, Deserialize)]
struct ReviewResponse {
    id: u64,
    user: Option<UserResponse>,
    state: ReviewState,
    body: Option<String>,
    commit_id: Option<String>,
    submitted_at: Option<DateTime<Utc>>,
}

impl ReviewResponse {
    fn into_review(self, comments: Vec<ReviewComment>) -> Review {
        Review {
            id: self.id,
            author: login(self.user),
            state: self.state,
            body: self.body.unwrap_or_default(),
            commit_id: self.commit_id,
            submitted_at: self.submitted_at,
            comments,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ReviewCommentResponse {
    id: u64,
    body: String,
    user: Option<UserResponse>,
    created_at: Option<DateTime<Utc>>,
    path: String,
    line: Option<u32>,
    original_line: Option<u32>,
    pull_request_review_id: Option<u64>,
}

impl From<ReviewCommentResponse> for ReviewComment {
    fn from(c: ReviewCommentResponse) -> Self {
        ReviewComment {
            id: Some(c.id.to_string()),
            body: c.body,
            author: login(c.user),
            created_at: c.created_at,
            file: Some(c.path),
            line: c.line.or(c.original_line),
            thread_id: None,
            review_id: c.pull_request_review_id,
            is_minimized: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct IssueCommentResponse {
    id: u64,
    body: Option<String>,
    user: Option<UserResponse>,
    created_at: Option<DateTime<Utc>>,
}

impl From<IssueCommentResponse> for ReviewComment {
    fn from(c: IssueCommentResponse) -> Self {
        ReviewComment {
            id: Some(c.id.to_string()),
            body: c.body.unwrap_or_default(),
            author: login(c.user),
            created_at: c.created_at,
            file: None,
            line: None,
            thread_id: None,
            review_id: None,
            is_minimized: false,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ChangedFileResponse {
    filename: String,
}

#[derive(Debug, Deserialize)]
struct ContentResponse {
    content: Option<String>,
    encoding: Option<String>,
}

#[derive(Debug, Serialize)]
struct CreateReviewRequest<'a> {
    commit_id: &'a str,
    body: &'a str,
    event: &'a str,
}

#[derive(Debug, Serialize)]
struct SubmitReviewRequest<'a> {
    body: &'a str,
    event: &'a str,
}

// ── Trait impls ─────────────────────────────────────────────────────

#[async_trait]
impl ReviewApi for GitHubClient {
    async fn authenticated_user(&self) -> Result<String, ApiError> {
        let user: UserResponse = Self::send_json(self.request(Method::GET, "/user")).await?;
        Ok(user.login)
    }

    async fn pull_request(&self, pr: &PullRequestRef) -> Result<PullRequest, ApiError> {
        let response: PullRequestResponse =
            Self::send_json(self.request(Method::GET, &pull_path(pr))).await?;
        Ok(PullRequest {
            number: response.number,
            author: login(response.user),
            head_sha: response.head.sha,
            base_sha: response.base.sha,
            title: response.title,
        })
    }

    async fn list_reviews(&self, pr: &PullRequestRef) -> Result<Vec<Review>, ApiError> {
        let reviews: Vec<ReviewResponse> = self.get_all(&format!("{}/reviews", pull_path(pr))).await?;
        let mut by_review: HashMap<u64, Vec<ReviewComment>> = HashMap::new();
        for comment in self.list_review_comments(pr).await? {
            if let Some(review_id) = comment.review_id {
                by_review.entry(review_id).or_default().push(comment);
            }
        }
        Ok(reviews
            .into_iter()
            .map(|r| {
                let comments = by_review.remove(&r.id).unwrap_or_default();
                r.into_review(comments)
            })
            .collect())
    }

    async fn list_review_comments(&self, pr: &PullRequestRef) -> Result<Vec<ReviewComment>, ApiError> {
        let comments: Vec<ReviewCommentResponse> =
            self.get_all(&format!("{}/comments", pull_path(pr))).await?;
        Ok(comments.into_iter().map(ReviewComment::from).collect())
    }

    async fn list_issue_comments(&self, pr: &PullRequestRef) -> Result<Vec<ReviewComment>, ApiError> {
        let comments: Vec<IssueCommentResponse> = self
            .get_all(&format!("{}/issues/{}/comments", repo_path(pr), pr.number))
            .await?;
        Ok(comments.into_iter().map(ReviewComment::from).collect())
    }

    async fn list_changed_files(&self, pr: &PullRequestRef) -> Result<Vec<String>, ApiError> {
        let files: Vec<ChangedFileResponse> =
            self.get_all(&format!("{}/files", pull_path(pr))).await?;
        Ok(files.into_iter().map(|f| f.filename).collect())
    }

    async fn create_review(
        &self,
        pr: &PullRequestRef,
        review: &NewReview,
    ) -> Result<CreateReviewOutcome, ApiError> {
        let request = self
            .request(Method::POST, &format!("{}/reviews", pull_path(pr)))
            .json(&CreateReviewRequest {
                commit_id: &review.commit_id,
                body: &review.body,
                event: review.verdict.as_event(),
            });
        match Self::send_json::<ReviewResponse>(request).await {
            Ok(created) => Ok(CreateReviewOutcome::Created(created.into_review(Vec::new()))),
            Err(ApiError::Http { status: 422, message })
                if message.to_lowercase().contains(PENDING_REVIEW_CONFLICT) =>
            {
                Ok(CreateReviewOutcome::PendingConflict)
            }
            Err(err) => Err(err),
        }
    }

    async fn submit_review(
        &self,
        pr: &PullRequestRef,
        review_id: u64,
        verdict: Verdict,
        body: &str,
    ) -> Result<Review, ApiError> {
        let request = self
            .request(
                Method::POST,
                &format!("{}/reviews/{review_id}/events", pull_path(pr)),
            )
            .json(&SubmitReviewRequest {
                body,
                event: verdict.as_event(),
            });
        let submitted: ReviewResponse = Self::send_json(request).await?;
        Ok(submitted.into_review(Vec::new()))
    }

    async fn dismiss_review(
        &self,
        pr: &PullRequestRef,
        review_id: u64,
        message: &str,
    ) -> Result<(), ApiError> {
        let request = self
            .request(
                Method::PUT,
                &format!("{}/reviews/{review_id}/dismissals", pull_path(pr)),
            )
            .json(&serde_json::json!({ "message": message, "event": "DISMISS" }));
        Self::send(request).await?;
        Ok(())
    }

    async fn discard_pending_review(&self, pr: &PullRequestRef, review_id: u64) -> Result<(), ApiError> {
        let request = self.request(
            Method::DELETE,
            &format!("{}/reviews/{review_id}", pull_path(pr)),
        );
        Self::send(request).await?;
        Ok(())
    }

    async fn request_reviewers(&self, pr: &PullRequestRef, reviewers: &[String]) -> Result<(), ApiError> {
        let request = self
            .request(
                Method::POST,
                &format!("{}/requested_reviewers", pull_path(pr)),
            )
            .json(&serde_json::json!({ "reviewers": reviewers }));
        Self::send(request).await?;
        Ok(())
    }

    async fn file_content_at_ref(
        &self,
        pr: &PullRequestRef,
        path: &str,
        git_ref: &str,
    ) -> Result<String, ApiError> {
        let request = self
            .request(
                Method::GET,
                &format!("{}/contents/{}", repo_path(pr), path.trim_start_matches('/')),
            )
            .query(&[("ref", git_ref)]);
        let response: ContentResponse = Self::send_json(request).await?;
        decode_content(response)
    }

    async fn commit_exists(&self, pr: &PullRequestRef, sha: &str) -> Result<bool, ApiError> {
        let request = self.request(Method::GET, &format!("{}/commits/{sha}", repo_path(pr)));
        match Self::send(request).await {
            Ok(_) => Ok(true),
            // 422 is returned for SHAs that no longer resolve after a force-push.
            Err(ApiError::Http { status: 404 | 422, .. }) => Ok(false),
            Err(err) => Err(err),
        }
    }
}

fn decode_content(response: ContentResponse) -> Result<String, ApiError> {
    let content = response
        .content
        .ok_or_else(|| ApiError::Decode("path is not a file".to_string()))?;
    match response.encoding.as_deref() {
        Some("base64") | None => {
            let compact: String = content.chars().filter(|c| !c.is_whitespace()).collect();
            let bytes = BASE64
                .decode(compact)
                .map_err(|e| ApiError::Decode(format!("invalid base64 content: {e}")))?;
            String::from_utf8(bytes).map_err(|_| ApiError::Decode("file is not UTF-8".to_string()))
        }
        Some(other) => Err(ApiError::Decode(format!("unsupported content encoding: {other}"))),
    }
}

#[async_trait]
impl TrackingCommentStore for GitHubClient {
    async fn read(&self, pr: &PullRequestRef, comment_id: u64) -> Result<String, ApiError> {
        let comment: IssueCommentResponse = Self::send_json(self.request(
            Method::GET,
            &format!("{}/issues/comments/{comment_id}", repo_path(pr)),
        ))
        .await?;
        Ok(comment.body.unwrap_or_default())
    }

    async fn write(&self, pr: &PullRequestRef, comment_id: u64, body: &str) -> Result<(), ApiError> {
        let request = self
            .request(
                Method::PATCH,
                &format!("{}/issues/comments/{comment_id}", repo_path(pr)),
            )
            .json(&serde_json::json!({ "body": body }));
        Self::send(request).await?;
        Ok(())
    }
}

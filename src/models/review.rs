//! Review, verdict and pull request types.
//!
//! These are the explicit shapes the GitHub client maps its wire
//! payloads into; business logic never sees raw JSON.

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use std::fmt;

use super::thread::ReviewComment;

/// The decision requested when submitting a review.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    /// Approve the pull request.
    Approve,
    /// Block the pull request until changes are made.
    RequestChanges,
    /// Leave non-blocking feedback.
    Comment,
}

impl Verdict {
    /// Whether the platform rejects this verdict without a body.
    pub fn requires_body(self) -> bool {
        !matches!(self, Verdict::Approve)
    }

    /// The `event` string expected by the reviews API.
    pub fn as_event(self) -> &'static str {
        match self {
            Verdict::Approve => "APPROVE",
            Verdict::RequestChanges => "REQUEST_CHANGES",
            Verdict::Comment => "COMMENT",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_event())
    }
}

impl std::str::FromStr for Verdict {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().replace('-', "_").as_str() {
            "APPROVE" => Ok(Verdict::Approve),
            "REQUEST_CHANGES" => Ok(Verdict::RequestChanges),
            "COMMENT" => Ok(Verdict::Comment),
            _ => Err(format!(
                "unknown verdict: '{s}'. Expected one of: approve, request-changes, comment"
            )),
        }
    }
}

/// State of a review as reported by the platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReviewState {
    Approved,
    ChangesRequested,
    Commented,
    Dismissed,
    /// Started but not yet submitted. Only visible to its author.
    Pending,
    #[serde(other)]
    Unknown,
}

impl fmt::Display for ReviewState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReviewState::Approved => "APPROVED",
            ReviewState::ChangesRequested => "CHANGES_REQUESTED",
            ReviewState::Commented => "COMMENTED",
            ReviewState::Dismissed => "DISMISSED",
            ReviewState::Pending => "PENDING",
            ReviewState::Unknown => "UNKNOWN",
        };
        f.write_str(s)
    }
}

/// A review on a pull request, with the inline comments it carries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub id: u64,
    pub author: String,
    pub state: ReviewState,
    #[serde(default)]
    pub body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub submitted_at: Option<DateTime<Utc>>,
    /// Inline comments attached to this review.
    #[serde(default)]
    pub comments: Vec<ReviewComment>,
}

impl Review {
    /// Whether this review was authored by `login` (case-insensitive, as logins are).
    pub fn is_authored_by(&self, login: &str) -> bool {
        self.author.eq_ignore_ascii_case(login)
    }
}

/// A started-but-unsubmitted review owned by the authenticated identity.
///
/// The platform allows at most one per identity per pull request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingReview {
    pub id: u64,
    pub body: String,
}

impl PendingReview {
    /// Find the pending review owned by `login`, if any.
    pub fn find(reviews: &[Review], login: &str) -> Option<Self> {
        reviews
            .iter()
            .find(|r| r.state == ReviewState::Pending && r.is_authored_by(login))
            .map(|r| PendingReview {
                id: r.id,
                body: r.body.clone(),
            })
    }
}

/// Identifies a pull request on the platform.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PullRequestRef {
    pub owner: String,
    pub repo: String,
    pub number: u64,
}

impl PullRequestRef {
    pub fn new(owner: impl Into<String>, repo: impl Into<String>, number: u64) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            number,
        }
    }
}

impl fmt::Display for PullRequestRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}#{}", self.owner, self.repo, self.number)
    }
}

/// The subset of pull request details the core needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PullRequest {
    pub number: u64,
    pub author: String,
    pub head_sha: String,
    pub base_sha: String,
    #[serde(default)]
    pub title: String,
}

/// A review to be created.
#[derive(Debug, Clone, Serialize)]
pub struct NewReview {
    pub verdict: Verdict,
    pub body: String,
    pub commit_id: String,
}

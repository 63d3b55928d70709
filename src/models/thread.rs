//! Review thread and comment types.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::review::ReviewState;

/// Build the key used for threads reconstructed from flat comments:
/// `"<path>:<line>"`, or `"<path>:null"` for file-level comments.
pub fn synthesized_thread_id(path: &str, line: Option<u32>) -> String {
    match line {
        Some(line) => format!("{path}:{line}"),
        None => format!("{path}:null"),
    }
}

/// One inline or general comment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewComment {
    /// Stable platform identity. Comments without one cannot be deduplicated.
    pub id: Option<String>,
    pub body: String,
    pub author: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Present only for inline comments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// The review this comment was submitted with, for inline comments.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_id: Option<u64>,
    /// Hidden by a maintainer ("minimized") on the platform.
    #[serde(default)]
    pub is_minimized: bool,
}

impl ReviewComment {
    /// Whether `login` wrote this comment.
    pub fn is_by(&self, login: &str) -> bool {
        self.author.eq_ignore_ascii_case(login)
    }
}

/// Where a thread's `is_resolved` flag came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    /// The platform's own resolution flag.
    Native,
    /// Derived from the verdicts of the reviews touching the thread.
    Verdicts,
}

/// A conversation anchored at a file location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewThread {
    /// Native GraphQL id, or a synthesized `path:line` key.
    pub id: String,
    pub file: String,
    pub line: Option<u32>,
    pub is_resolved: bool,
    pub resolution_source: ResolutionSource,
    pub is_relevant: bool,
    pub last_commenter: Option<String>,
    pub author_responded: bool,
    pub ready_for_resolution: bool,
    /// In arrival order.
    pub comments: Vec<ReviewComment>,
    pub review_states: BTreeSet<ReviewState>,
}

impl ReviewThread {
    /// A fresh, unclassified thread.
    pub fn new(id: impl Into<String>, file: impl Into<String>, line: Option<u32>) -> Self {
        Self {
            id: id.into(),
            file: file.into(),
            line,
            is_resolved: false,
            resolution_source: ResolutionSource::Verdicts,
            is_relevant: false,
            last_commenter: None,
            author_responded: false,
            ready_for_resolution: false,
            comments: Vec::new(),
            review_states: BTreeSet::new(),
        }
    }

    /// Whether the id is a platform id that mutations can target.
    pub fn has_native_id(&self) -> bool {
        self.id != synthesized_thread_id(&self.file, self.line)
    }

    /// `path:line` for display.
    pub fn location(&self) -> String {
        match self.line {
            Some(line) => format!("{}:{line}", self.file),
            None => self.file.clone(),
        }
    }
}

/// A thread as returned by the paginated fetcher, before classification.
#[derive(Debug, Clone)]
pub struct FetchedThread {
    pub id: String,
    pub file: String,
    pub line: Option<u32>,
    pub is_resolved: bool,
    pub is_outdated: bool,
    pub comments: Vec<ReviewComment>,
}

/// A comment after merging the general and inline comment listings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeduplicatedComment {
    pub id: String,
    pub body: String,
    pub author: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    /// Whether the entry came from the inline review comment listing.
    pub is_review_comment: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_id_formats_null_line() {
        assert_eq!(synthesized_thread_id("src/a.ts", Some(10)), "src/a.ts:10");
        assert_eq!(synthesized_thread_id("README.md", None), "README.md:null");
    }

    #[test]
    fn native_id_detection() {
        let reconstructed = ReviewThread::new("src/a.ts:10", "src/a.ts", Some(10));
        assert!(!reconstructed.has_native_id());

        let fetched = ReviewThread::new("PRRT_kwDOAbc123", "src/a.ts", Some(10));
        assert!(fetched.has_native_id());
    }

    #[test]
    fn location_omits_missing_line() {
        assert_eq!(ReviewThread::new("x", "a.rs", Some(3)).location(), "a.rs:3");
        assert_eq!(ReviewThread::new("x", "a.rs", None).location(), "a.rs");
    }
}

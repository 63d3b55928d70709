//! Review tracking metadata embedded in a comment as an HTML marker.
//!
//! Format (compact JSON, `reviewId` optional):
//!
//! ```text
//! <!-- pr-review-metadata-v1: {"lastReviewedSha":"abc1234","reviewDate":"2025-01-01T00:00:00Z","reviewId":"42"} -->
//! ```
//!
//! The record is advisory. Readers must treat a missing or malformed
//! marker as "no previous review".

use std::sync::LazyLock;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};

const MARKER_PREFIX: &str = "<!-- pr-review-metadata-v1: ";
const MARKER_SUFFIX: &str = " -->";

static MARKER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)<!--\s*pr-review-metadata-v1:\s*(\{.*?\})\s*-->").unwrap()
});

static SHA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-f0-9]{7,40}$").unwrap());

/// What was reviewed last, and when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewMetadata {
    pub last_reviewed_sha: String,
    /// ISO-8601 timestamp, kept verbatim so the marker round-trips.
    pub review_date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub review_id: Option<String>,
}

impl ReviewMetadata {
    /// Metadata for a review submitted now.
    pub fn now(sha: impl Into<String>, review_id: Option<u64>) -> Self {
        Self {
            last_reviewed_sha: sha.into(),
            review_date: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            review_id: review_id.map(|id| id.to_string()),
        }
    }

    /// Parsed `review_date`. Always `Some` for values returned by [`extract_review_metadata`].
    pub fn reviewed_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.review_date)
            .ok()
            .map(|d| d.with_timezone(&Utc))
    }

    fn is_valid(&self) -> bool {
        SHA_RE.is_match(&self.last_reviewed_sha) && self.reviewed_at().is_some()
    }
}

/// Wire shape: every field optional so missing fields are a validation
/// failure rather than a parse failure.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMetadata {
    last_reviewed_sha: Option<String>,
    review_date: Option<String>,
    review_id: Option<String>,
}

/// Extract the metadata marker from a comment body.
///
/// Returns `None` for an empty body, a missing marker, malformed JSON,
/// missing required fields, a SHA that is not 7–40 lowercase hex
/// characters, or an unparsable date.
pub fn extract_review_metadata(text: &str) -> Option<ReviewMetadata> {
    if text.trim().is_empty() {
        return None;
    }

    let json = MARKER_RE.captures(text)?.get(1)?.as_str();
    let raw: RawMetadata = serde_json::from_str(json).ok()?;

    let metadata = ReviewMetadata {
        last_reviewed_sha: raw.last_reviewed_sha?,
        review_date: raw.review_date?,
        review_id: raw.review_id,
    };

    metadata.is_valid().then_some(metadata)
}

/// Render the marker for `metadata`.
pub fn generate_metadata_comment(metadata: &ReviewMetadata) -> String {
    // Serializing a struct of strings cannot fail.
    let json = serde_json::to_string(metadata).unwrap_or_default();
    format!("{MARKER_PREFIX}{json}{MARKER_SUFFIX}")
}

/// Write `metadata` into `body`, replacing an existing marker or
/// appending one. Exactly one marker remains afterwards.
pub fn upsert_metadata_marker(body: &str, metadata: &ReviewMetadata) -> String {
    let marker = generate_metadata_comment(metadata);

    let Some(first) = MARKER_RE.find(body) else {
        let trimmed = body.trim_end();
        return if trimmed.is_empty() {
            marker
        } else {
            format!("{trimmed}\n\n{marker}")
        };
    };

    let mut updated = String::with_capacity(body.len() + marker.len());
    updated.push_str(&body[..first.start()]);
    updated.push_str(&marker);
    // Drop any stale duplicates after the first marker.
    updated.push_str(&MARKER_RE.replace_all(&body[first.end()..], ""));
    updated
}

//! Thread reconstruction and classification.
//!
//! Two entry points share the classification pipeline:
//!
//! - [`analyze`] rebuilds threads from the inline comments attached to
//!   each review, and derives resolution from the reviews' verdicts.
//! - [`analyze_fetched`] classifies threads obtained by the paginated
//!   fetcher, trusting the platform's own resolution flag.
//!
//! Readiness detection is a keyword heuristic over the pull request
//! author's replies. It produces suggestions, not decisions.

use std::collections::BTreeMap;

use indexmap::IndexMap;
use serde::Serialize;
use thiserror::Error;

use crate::models::{
    FetchedThread, ResolutionSource, Review, ReviewComment, ReviewState, ReviewThread,
    synthesized_thread_id,
};

/// Phrases in an author reply that suggest the feedback was handled.
pub const RESOLUTION_KEYWORDS: [&str; 10] = [
    "fixed",
    "addressed",
    "updated",
    "changed",
    "done",
    "thanks",
    "good point",
    "you're right",
    "agreed",
    "implemented",
];

/// Closing messages, picked by the first keyword group the author's replies match.
const CLOSING_MESSAGES: &[(&[&str], &str)] = &[
    (&["fixed"], "Thanks for addressing this feedback!"),
    (
        &["updated", "changed"],
        "Resolved - changes implemented as requested",
    ),
    (
        &["done", "implemented"],
        "Perfect, thanks for implementing this!",
    ),
    (&["thanks", "good point"], "Glad this was helpful - resolved"),
];

const GENERIC_CLOSING_MESSAGE: &str = "Resolved - the author has responded to this feedback";

const REASON_FILE_NOT_IN_PR: &str = "file is no longer part of this pull request";
const REASON_CODE_CHANGED: &str = "code has changed since this comment was made";
const REASON_NO_PATH: &str = "comment is not anchored to a file";

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("inline comment {0} has no file path")]
    MissingPath(String),
}

/// Counts over all classified threads.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ThreadStats {
    pub total: usize,
    pub resolved: usize,
    pub unresolved: usize,
    pub outdated: usize,
    pub ready_for_resolution: usize,
}

/// Per-file rollup, used to prioritize review effort.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FileThreadSummary {
    pub active_threads: usize,
    pub resolved_threads: usize,
    pub total_comments: usize,
    pub thread_ids: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct OutdatedThread {
    pub thread: ReviewThread,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvableThread {
    pub thread: ReviewThread,
    pub suggested_message: String,
}

/// Result of classifying a pull request's threads.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ThreadAnalysis {
    /// Every thread, classified.
    pub threads: Vec<ReviewThread>,
    /// Unresolved threads on relevant files.
    pub valid_threads: Vec<ReviewThread>,
    pub outdated_threads: Vec<OutdatedThread>,
    /// Valid threads that look ready to close.
    pub threads_to_resolve: Vec<ResolvableThread>,
    pub stats: ThreadStats,
    pub files: BTreeMap<String, FileThreadSummary>,
}

/// Reconstruct threads from reviews and classify them.
///
/// `changed_files` of `None` (or empty) means the change set is unknown
/// and every anchored thread is assumed relevant. Failures degrade to an
/// empty analysis.
pub fn analyze(reviews: &[Review], changed_files: Option<&[String]>, pr_author: &str) -> ThreadAnalysis {
    match reconstruct_threads(reviews) {
        Ok(threads) => classify(threads, changed_files, pr_author, |_| None),
        Err(err) => {
            tracing::warn!("thread analysis unavailable: {err}");
            ThreadAnalysis::default()
        }
    }
}

/// Classify fetched threads using their native resolution flag.
pub fn analyze_fetched(
    fetched: Vec<FetchedThread>,
    changed_files: Option<&[String]>,
    pr_author: &str,
) -> ThreadAnalysis {
    let mut outdated_on_platform = std::collections::HashSet::new();
    let threads = fetched
        .into_iter()
        .map(|f| {
            if f.is_outdated {
                outdated_on_platform.insert(f.id.clone());
            }
            let mut thread = ReviewThread::new(f.id, f.file, f.line);
            thread.is_resolved = f.is_resolved;
            thread.resolution_source = ResolutionSource::Native;
            thread.comments = f.comments;
            thread
        })
        .collect();

    classify(threads, changed_files, pr_author, |thread| {
        outdated_on_platform
            .contains(&thread.id)
            .then_some(REASON_CODE_CHANGED)
    })
}

/// Group every review's inline comments into threads keyed by `path:line`.
///
/// The first comment seen establishes a thread's location. Each review's
/// verdict is recorded on every thread it has a comment in.
pub fn reconstruct_threads(reviews: &[Review]) -> Result<Vec<ReviewThread>, AnalysisError> {
    let mut threads: IndexMap<String, ReviewThread> = IndexMap::new();

    for review in reviews {
        for comment in &review.comments {
            let path = comment
                .file
                .as_deref()
                .ok_or_else(|| AnalysisError::MissingPath(comment.id.clone().unwrap_or_default()))?;
            let key = synthesized_thread_id(path, comment.line);
            let thread = threads
                .entry(key.clone())
                .or_insert_with(|| ReviewThread::new(key, path, comment.line));

            let mut comment = comment.clone();
            comment.thread_id = Some(thread.id.clone());
            thread.comments.push(comment);
            thread.review_states.insert(review.state);
        }
    }

    Ok(threads
        .into_values()
        .map(|mut thread| {
            thread.is_resolved = resolved_by_verdicts(&thread);
            thread
        })
        .collect())
}

/// Approved at least once and no change request outstanding.
fn resolved_by_verdicts(thread: &ReviewThread) -> bool {
    thread.review_states.contains(&ReviewState::Approved)
        && !thread.review_states.contains(&ReviewState::ChangesRequested)
}

fn is_relevant(file: &str, changed_files: Option<&[String]>) -> bool {
    match changed_files {
        Some(files) if !files.is_empty() => files.iter().any(|f| f == file),
        _ => !file.is_empty(),
    }
}

/// Comments newest first. Undated comments sort oldest; ties keep arrival order reversed.
fn newest_first(comments: &[ReviewComment]) -> Vec<&ReviewComment> {
    let mut ordered: Vec<(usize, &ReviewComment)> = comments.iter().enumerate().collect();
    ordered.sort_by(|(ia, a), (ib, b)| b.created_at.cmp(&a.created_at).then(ib.cmp(ia)));
    ordered.into_iter().map(|(_, c)| c).collect()
}

fn mentions_resolution(body: &str) -> bool {
    let body = body.to_lowercase();
    RESOLUTION_KEYWORDS.iter().any(|k| body.contains(k))
}

/// Pick a closing message from the author's replies.
pub fn suggested_closing_message(thread: &ReviewThread, pr_author: &str) -> &'static str {
    let replies = thread
        .comments
        .iter()
        .filter(|c| c.is_by(pr_author))
        .map(|c| c.body.to_lowercase())
        .collect::<Vec<_>>()
        .join("\n");

    CLOSING_MESSAGES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| replies.contains(k)))
        .map(|(_, message)| *message)
        .unwrap_or(GENERIC_CLOSING_MESSAGE)
}

/// Fill in the derived fields of a thread whose `is_resolved` is already set.
fn classify_thread(thread: &mut ReviewThread, changed_files: Option<&[String]>, pr_author: &str) {
    thread.is_relevant = is_relevant(&thread.file, changed_files);

    let ordered = newest_first(&thread.comments);
    thread.last_commenter = ordered.first().map(|c| c.author.clone());
    thread.author_responded = thread.comments.iter().any(|c| c.is_by(pr_author));

    let author_spoke_last = thread
        .last_commenter
        .as_deref()
        .is_some_and(|login| login.eq_ignore_ascii_case(pr_author));
    let author_acknowledged = thread
        .comments
        .iter()
        .any(|c| c.is_by(pr_author) && mentions_resolution(&c.body));

    thread.ready_for_resolution = thread.is_relevant
        && !thread.is_resolved
        && (author_spoke_last || author_acknowledged);
}

fn classify(
    mut threads: Vec<ReviewThread>,
    changed_files: Option<&[String]>,
    pr_author: &str,
    stale_reason: impl Fn(&ReviewThread) -> Option<&'static str>,
) -> ThreadAnalysis {
    let mut analysis = ThreadAnalysis::default();

    for thread in &mut threads {
        classify_thread(thread, changed_files, pr_author);

        // Platform-outdated threads are treated as no longer relevant.
        let reason = if thread.file.is_empty() {
            Some(REASON_NO_PATH)
        } else if !thread.is_relevant {
            Some(REASON_FILE_NOT_IN_PR)
        } else {
            stale_reason(thread)
        };
        if let Some(reason) = reason {
            thread.is_relevant = false;
            thread.ready_for_resolution = false;
            analysis.outdated_threads.push(OutdatedThread {
                thread: thread.clone(),
                reason: reason.to_string(),
            });
        } else if !thread.is_resolved {
            analysis.valid_threads.push(thread.clone());
            if thread.ready_for_resolution {
                analysis.threads_to_resolve.push(ResolvableThread {
                    suggested_message: suggested_closing_message(thread, pr_author).to_string(),
                    thread: thread.clone(),
                });
            }
        }

        let summary = analysis.files.entry(thread.file.clone()).or_default();
        if thread.is_resolved {
            summary.resolved_threads += 1;
        } else if thread.is_relevant {
            summary.active_threads += 1;
        }
        summary.total_comments += thread.comments.len();
        summary.thread_ids.push(thread.id.clone());
    }

    let resolved = threads.iter().filter(|t| t.is_resolved).count();
    analysis.stats = ThreadStats {
        total: threads.len(),
        resolved,
        unresolved: threads.len() - resolved,
        outdated: analysis.outdated_threads.len(),
        ready_for_resolution: analysis.threads_to_resolve.len(),
    };
    analysis.threads = threads;
    analysis
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use pretty_assertions::assert_eq;

    const AUTHOR: &str = "pr-author";

    fn inline(id: &str, author: &str, body: &str, file: &str, line: Option<u32>, minute: u32) -> ReviewComment {
        ReviewComment {
            id: Some(id.to_string()),
            body: body.to_string(),
            author: author.to_string(),
            created_at: Some(Utc.with_ymd_and_hms(2025, 1, 1, 12, minute, 0).unwrap()),
            file: Some(file.to_string()),
            line,
            thread_id: None,
            review_id: None,
            is_minimized: false,
        }
    }

    fn review(id: u64, state: ReviewState, comments: Vec<ReviewComment>) -> Review {
        Review {
            id,
            author: "reviewer".to_string(),
            state,
            body: String::new(),
            commit_id: None,
            submitted_at: None,
            comments,
        }
    }

    fn changed(files: &[&str]) -> Vec<String> {
        files.iter().map(|f| f.to_string()).collect()
    }

    #[test]
    fn author_fix_reply_makes_thread_ready() {
        let reviews = vec![
            review(1, ReviewState::Commented, vec![inline("1", "reviewer", "Please handle null here", "src/a.ts", Some(10), 0)]),
            review(2, ReviewState::Commented, vec![inline("2", AUTHOR, "fixed in latest commit", "src/a.ts", Some(10), 5)]),
        ];
        let files = changed(&["src/a.ts"]);
        let analysis = analyze(&reviews, Some(&files), AUTHOR);

        assert_eq!(analysis.stats.total, 1);
        let thread = &analysis.threads[0];
        assert_eq!(thread.id, "src/a.ts:10");
        assert_eq!(thread.comments.len(), 2);
        assert!(thread.ready_for_resolution);
        assert!(thread.author_responded);
        assert_eq!(thread.last_commenter.as_deref(), Some(AUTHOR));
        assert_eq!(analysis.threads_to_resolve.len(), 1);
        assert_eq!(
            analysis.threads_to_resolve[0].suggested_message,
            "Thanks for addressing this feedback!"
        );
    }

    #[test]
    fn closing_message_templates() {
        let cases = [
            ("updated the handler", "Resolved - changes implemented as requested"),
            ("Done!", "Perfect, thanks for implementing this!"),
            ("good point, will keep in mind", "Glad this was helpful - resolved"),
            ("you're right", GENERIC_CLOSING_MESSAGE),
        ];
        for (reply, expected) in cases {
            let mut thread = ReviewThread::new("t", "a.rs", Some(1));
            thread.comments = vec![inline("1", AUTHOR, reply, "a.rs", Some(1), 0)];
            assert_eq!(suggested_closing_message(&thread, AUTHOR), expected, "reply: {reply}");
        }
    }

    #[test]
    fn keyword_from_earlier_author_reply_counts() {
        let reviews = vec![review(
            1,
            ReviewState::Commented,
            vec![
                inline("1", "reviewer", "rename this", "a.rs", Some(3), 0),
                inline("2", AUTHOR, "agreed", "a.rs", Some(3), 1),
                inline("3", "reviewer", "also the test", "a.rs", Some(3), 2),
            ],
        )];
        let analysis = analyze(&reviews, None, AUTHOR);
        let thread = &analysis.threads[0];
        assert_eq!(thread.last_commenter.as_deref(), Some("reviewer"));
        assert!(thread.ready_for_resolution);
    }

    #[test]
    fn unanswered_thread_is_valid_but_not_ready() {
        let reviews = vec![review(1, ReviewState::ChangesRequested, vec![inline("1", "reviewer", "bug here", "a.rs", Some(3), 0)])];
        let analysis = analyze(&reviews, None, AUTHOR);
        assert_eq!(analysis.valid_threads.len(), 1);
        assert!(analysis.threads_to_resolve.is_empty());
        assert!(!analysis.threads[0].author_responded);
    }

    #[test]
    fn verdicts_drive_resolution() {
        let approved_only = vec![
            review(1, ReviewState::Commented, vec![inline("1", "reviewer", "nit", "a.rs", Some(1), 0)]),
            review(2, ReviewState::Approved, vec![inline("2", "reviewer", "ok now", "a.rs", Some(1), 1)]),
        ];
        let analysis = analyze(&approved_only, None, AUTHOR);
        assert!(analysis.threads[0].is_resolved);
        assert_eq!(analysis.threads[0].resolution_source, ResolutionSource::Verdicts);
        assert!(analysis.valid_threads.is_empty());
        assert_eq!(analysis.stats.resolved, 1);

        let contested = vec![
            review(1, ReviewState::ChangesRequested, vec![inline("1", "reviewer", "no", "a.rs", Some(1), 0)]),
            review(2, ReviewState::Approved, vec![inline("2", "other", "fine by me", "a.rs", Some(1), 1)]),
        ];
        let analysis = analyze(&contested, None, AUTHOR);
        assert!(!analysis.threads[0].is_resolved);
        assert_eq!(
            analysis.threads[0].review_states.iter().copied().collect::<Vec<_>>(),
            vec![ReviewState::Approved, ReviewState::ChangesRequested]
        );
    }

    #[test]
    fn files_outside_change_set_are_outdated() {
        let reviews = vec![review(
            1,
            ReviewState::Commented,
            vec![
                inline("1", "reviewer", "a", "kept.rs", Some(1), 0),
                inline("2", AUTHOR, "fixed", "removed.rs", Some(2), 1),
            ],
        )];
        let files = changed(&["kept.rs"]);
        let analysis = analyze(&reviews, Some(&files), AUTHOR);

        assert_eq!(analysis.outdated_threads.len(), 1);
        let outdated = &analysis.outdated_threads[0];
        assert_eq!(outdated.thread.file, "removed.rs");
        assert_eq!(outdated.reason, REASON_FILE_NOT_IN_PR);
        assert!(!outdated.thread.ready_for_resolution);
        assert_eq!(analysis.stats.outdated, 1);
    }

    #[test]
    fn empty_change_set_assumes_relevance() {
        let reviews = vec![review(1, ReviewState::Commented, vec![inline("1", "reviewer", "a", "x.rs", None, 0)])];
        let analysis = analyze(&reviews, Some(&[]), AUTHOR);
        assert!(analysis.threads[0].is_relevant);
        assert_eq!(analysis.threads[0].id, "x.rs:null");
    }

    #[test]
    fn missing_path_degrades_to_empty_analysis() {
        let mut bad = inline("9", "reviewer", "?", "", None, 0);
        bad.file = None;
        let analysis = analyze(&[review(1, ReviewState::Commented, vec![bad])], None, AUTHOR);
        assert_eq!(analysis.stats, ThreadStats::default());
        assert!(analysis.threads.is_empty());
    }

    #[test]
    fn readiness_implies_relevant_and_unresolved() {
        let reviews = vec![
            review(1, ReviewState::Approved, vec![inline("1", AUTHOR, "done", "a.rs", Some(1), 0)]),
            review(2, ReviewState::Commented, vec![inline("2", AUTHOR, "done", "b.rs", Some(1), 0)]),
            review(3, ReviewState::Commented, vec![inline("3", AUTHOR, "done", "gone.rs", Some(1), 0)]),
        ];
        let files = changed(&["a.rs", "b.rs"]);
        let analysis = analyze(&reviews, Some(&files), AUTHOR);
        for thread in &analysis.threads {
            if thread.ready_for_resolution {
                assert!(thread.is_relevant && !thread.is_resolved, "{}", thread.id);
            }
        }
        assert_eq!(analysis.threads_to_resolve.len(), 1);
        assert_eq!(analysis.threads_to_resolve[0].thread.file, "b.rs");
    }

    #[test]
    fn per_file_rollup() {
        let reviews = vec![review(
            1,
            ReviewState::Commented,
            vec![
                inline("1", "reviewer", "a", "a.rs", Some(1), 0),
                inline("2", "reviewer", "b", "a.rs", Some(1), 1),
                inline("3", "reviewer", "c", "a.rs", Some(9), 2),
            ],
        )];
        let analysis = analyze(&reviews, None, AUTHOR);
        let summary = &analysis.files["a.rs"];
        assert_eq!(summary.active_threads, 2);
        assert_eq!(summary.total_comments, 3);
        assert_eq!(summary.thread_ids, vec!["a.rs:1".to_string(), "a.rs:9".to_string()]);
    }

    #[test]
    fn fetched_threads_trust_native_flag() {
        let fetched = vec![
            FetchedThread {
                id: "PRRT_1".to_string(),
                file: "a.rs".to_string(),
                line: Some(1),
                is_resolved: true,
                is_outdated: false,
                comments: vec![inline("1", "reviewer", "x", "a.rs", Some(1), 0)],
            },
            FetchedThread {
                id: "PRRT_2".to_string(),
                file: "a.rs".to_string(),
                line: Some(2),
                is_resolved: false,
                is_outdated: false,
                comments: vec![
                    inline("2", "reviewer", "y", "a.rs", Some(2), 0),
                    inline("3", AUTHOR, "thanks, changed it", "a.rs", Some(2), 1),
                ],
            },
            FetchedThread {
                id: "PRRT_3".to_string(),
                file: "a.rs".to_string(),
                line: Some(3),
                is_resolved: false,
                is_outdated: true,
                comments: vec![inline("4", "reviewer", "z", "a.rs", Some(3), 0)],
            },
        ];
        let analysis = analyze_fetched(fetched, None, AUTHOR);

        assert!(analysis.threads[0].is_resolved);
        assert_eq!(analysis.threads[0].resolution_source, ResolutionSource::Native);
        assert_eq!(analysis.threads_to_resolve.len(), 1);
        assert_eq!(analysis.threads_to_resolve[0].thread.id, "PRRT_2");
        assert_eq!(
            analysis.threads_to_resolve[0].suggested_message,
            "Resolved - changes implemented as requested"
        );
        assert_eq!(analysis.outdated_threads.len(), 1);
        assert_eq!(analysis.outdated_threads[0].reason, REASON_CODE_CHANGED);
        assert_eq!(analysis.stats.resolved, 1);
        assert_eq!(analysis.stats.unresolved, 2);
    }
}

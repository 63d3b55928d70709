//! Comment deduplication across the general and inline listings.
//!
//! The same comment can appear in both listings. Entries are keyed by
//! comment id alone: general comments go in first, and an inline comment
//! only fills in the location fields a general entry lacks. Comments on
//! outdated threads, and comments without an id, are dropped.

use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::models::{DeduplicatedComment, ReviewComment, ReviewThread, synthesized_thread_id};
use crate::threads::analysis::ThreadAnalysis;

/// Maps comments to the thread they belong to, and knows which threads are outdated.
#[derive(Debug, Clone, Default)]
pub struct ThreadIndex {
    thread_of_comment: HashMap<String, String>,
    outdated: HashSet<String>,
}

impl ThreadIndex {
    pub fn from_threads<'a>(
        threads: impl IntoIterator<Item = &'a ReviewThread>,
        outdated: impl IntoIterator<Item = String>,
    ) -> Self {
        let mut thread_of_comment = HashMap::new();
        for thread in threads {
            for comment in &thread.comments {
                if let Some(id) = &comment.id {
                    thread_of_comment.insert(id.clone(), thread.id.clone());
                }
            }
        }
        Self {
            thread_of_comment,
            outdated: outdated.into_iter().collect(),
        }
    }

    pub fn from_analysis(analysis: &ThreadAnalysis) -> Self {
        Self::from_threads(
            &analysis.threads,
            analysis.outdated_threads.iter().map(|o| o.thread.id.clone()),
        )
    }

    /// The thread a comment belongs to: its own back-reference, the
    /// index, or the `path:line` key for inline comments.
    pub fn thread_for(&self, comment: &ReviewComment) -> Option<String> {
        if let Some(thread_id) = &comment.thread_id {
            return Some(thread_id.clone());
        }
        if let Some(thread_id) = comment.id.as_ref().and_then(|id| self.thread_of_comment.get(id)) {
            return Some(thread_id.clone());
        }
        comment
            .file
            .as_deref()
            .map(|file| synthesized_thread_id(file, comment.line))
    }

    pub fn is_outdated(&self, thread_id: &str) -> bool {
        self.outdated.contains(thread_id)
    }
}

/// Merge the two listings into one entry per comment id.
///
/// Output follows insertion order; callers needing a specific order
/// should sort.
pub fn dedupe(
    general: &[ReviewComment],
    review: &[ReviewComment],
    index: &ThreadIndex,
) -> Vec<DeduplicatedComment> {
    let mut merged: IndexMap<String, DeduplicatedComment> = IndexMap::new();

    for comment in general.iter().filter(|c| !c.is_minimized) {
        let Some(id) = &comment.id else { continue };
        merged
            .entry(id.clone())
            .or_insert_with(|| to_deduplicated(id, comment, index, false));
    }

    for comment in review {
        let Some(id) = &comment.id else { continue };
        match merged.entry(id.clone()) {
            Entry::Occupied(mut existing) => {
                let existing = existing.get_mut();
                if existing.file.is_none() {
                    existing.file = comment.file.clone();
                }
                if existing.line.is_none() {
                    existing.line = comment.line;
                }
                if existing.thread_id.is_none() {
                    existing.thread_id = index.thread_for(comment);
                }
            }
            Entry::Vacant(slot) => {
                slot.insert(to_deduplicated(id, comment, index, true));
            }
        }
    }

    merged
        .into_values()
        .filter(|c| !c.thread_id.as_deref().is_some_and(|t| index.is_outdated(t)))
        .collect()
}

fn to_deduplicated(
    id: &str,
    comment: &ReviewComment,
    index: &ThreadIndex,
    is_review_comment: bool,
) -> DeduplicatedComment {
    DeduplicatedComment {
        id: id.to_string(),
        body: comment.body.clone(),
        author: comment.author.clone(),
        created_at: comment.created_at,
        file: comment.file.clone(),
        line: comment.line,
        thread_id: index.thread_for(comment),
        is_review_comment,
    }
}

//! Turns a thread analysis into concrete actions.

use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::models::{DeduplicatedComment, ReviewThread};
use crate::threads::analysis::ThreadAnalysis;

const REPLY_AWAITING_AUTHOR: &str = "This feedback hasn't been addressed yet. \
    Let me know if anything is unclear or if you'd like to discuss an alternative.";
const REPLY_FOLLOW_UP: &str = "Following up on this thread: it is still open and waiting \
    on a response from the author.";
const REPLY_CONTINUING: &str = "Thanks for the follow-up. This still needs another look \
    before it can be resolved.";

/// Why a thread is being closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, AsRefStr)]
pub enum ResolveReason {
    #[strum(serialize = "no longer relevant")]
    #[serde(rename = "no longer relevant")]
    NoLongerRelevant,
    #[strum(serialize = "author responded")]
    #[serde(rename = "author responded")]
    AuthorResponded,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolveAction {
    pub thread_id: String,
    /// False for synthesized `path:line` ids, which mutations cannot target.
    pub has_native_id: bool,
    pub location: String,
    pub reason: ResolveReason,
    /// Posted as a reply before resolving, when present.
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReplyAction {
    pub thread_id: String,
    pub has_native_id: bool,
    pub location: String,
    pub suggested_reply: String,
}

/// What to do with a pull request's threads.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ThreadPlan {
    pub threads_to_resolve: Vec<ResolveAction>,
    pub threads_to_reply_to: Vec<ReplyAction>,
    /// Whether any comments remain after filtering, i.e. there is fresh
    /// review content beyond thread housekeeping.
    pub new_comments_needed: bool,
}

impl ThreadPlan {
    pub fn is_empty(&self) -> bool {
        self.threads_to_resolve.is_empty() && self.threads_to_reply_to.is_empty()
    }
}

/// Build the action plan.
///
/// Outdated threads are closed regardless of readiness, followed by ready
/// threads with their suggested closing message. Remaining valid threads
/// get a reply.
///
/// Outdated threads that are already resolved produce no action, so
/// `threads_to_resolve` can hold fewer entries than
/// `analysis.outdated_threads`.
pub fn plan(analysis: &ThreadAnalysis, comments: &[DeduplicatedComment]) -> ThreadPlan {
    let outdated = analysis
        .outdated_threads
        .iter()
        .filter(|o| !o.thread.is_resolved)
        .map(|o| ResolveAction {
            thread_id: o.thread.id.clone(),
            has_native_id: o.thread.has_native_id(),
            location: o.thread.location(),
            reason: ResolveReason::NoLongerRelevant,
            message: None,
        });

    let ready = analysis.threads_to_resolve.iter().map(|r| ResolveAction {
        thread_id: r.thread.id.clone(),
        has_native_id: r.thread.has_native_id(),
        location: r.thread.location(),
        reason: ResolveReason::AuthorResponded,
        message: Some(r.suggested_message.clone()),
    });

    let threads_to_reply_to = analysis
        .valid_threads
        .iter()
        .filter(|t| !t.is_resolved && t.is_relevant && !t.ready_for_resolution)
        .map(|t| ReplyAction {
            thread_id: t.id.clone(),
            has_native_id: t.has_native_id(),
            location: t.location(),
            suggested_reply: suggested_reply(t).to_string(),
        })
        .collect();

    ThreadPlan {
        threads_to_resolve: outdated.chain(ready).collect(),
        threads_to_reply_to,
        new_comments_needed: !comments.is_empty(),
    }
}

fn suggested_reply(thread: &ReviewThread) -> &'static str {
    if thread.author_responded {
        REPLY_CONTINUING
    } else if thread.comments.len() > 1 {
        REPLY_FOLLOW_UP
    } else {
        REPLY_AWAITING_AUTHOR
    }
}

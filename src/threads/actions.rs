//! Carries out a [`ThreadPlan`] against the platform.
//!
//! Replies and resolutions run as non-critical batches with bounded
//! concurrency: one failing thread never stops the others. Threads known
//! only by a synthesized `path:line` key are reported as skipped.

use serde::Serialize;
use tracing::{debug, info};

use crate::github::{ApiError, ThreadApi};
use crate::recovery::{BatchOptions, ErrorCategory, ErrorRecovery};
use crate::security::Sanitizer;
use crate::threads::planner::ThreadPlan;

pub const SKIP_SYNTHESIZED: &str = "thread has no platform id";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedAction {
    pub thread_id: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FailedAction {
    pub thread_id: String,
    pub category: ErrorCategory,
    pub message: String,
}

/// What was done (or, in a dry run, would be done).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ActionReport {
    pub dry_run: bool,
    pub resolved: Vec<String>,
    pub replied: Vec<String>,
    pub skipped: Vec<SkippedAction>,
    pub failed: Vec<FailedAction>,
}

impl ActionReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

/// A reply to post, sanitized up front.
#[derive(Debug, Clone)]
struct Reply {
    thread_id: String,
    body: String,
}

/// Whether `id` has the `path:line` / `path:null` shape of a reconstructed thread.
pub fn is_synthesized_id(id: &str) -> bool {
    match id.rsplit_once(':') {
        Some((path, suffix)) => {
            !path.is_empty()
                && (suffix == "null" || (!suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit())))
        }
        None => false,
    }
}

pub struct ThreadActions<'a> {
    api: &'a dyn ThreadApi,
    recovery: &'a ErrorRecovery,
    sanitizer: &'a dyn Sanitizer,
    options: BatchOptions,
}

impl<'a> ThreadActions<'a> {
    pub fn new(
        api: &'a dyn ThreadApi,
        recovery: &'a ErrorRecovery,
        sanitizer: &'a dyn Sanitizer,
        options: BatchOptions,
    ) -> Self {
        Self {
            api,
            recovery,
            sanitizer,
            options: BatchOptions {
                critical: false,
                ..options
            },
        }
    }

    /// Post the plan's replies, then resolve its threads.
    ///
    /// A resolution with a closing message posts the message first; if
    /// that reply fails, the thread is left open.
    pub async fn execute_plan(&self, plan: &ThreadPlan, dry_run: bool) -> Result<ActionReport, ApiError> {
        let mut report = ActionReport {
            dry_run,
            ..ActionReport::default()
        };

        let mut replies = Vec::new();
        for action in &plan.threads_to_reply_to {
            if action.has_native_id {
                replies.push(self.reply(&action.thread_id, &action.suggested_reply));
            } else {
                report.skipped.push(skip(&action.thread_id));
            }
        }

        let mut resolutions = Vec::new();
        for action in &plan.threads_to_resolve {
            if action.has_native_id {
                resolutions.push((action.thread_id.clone(), action.message.clone()));
            } else {
                report.skipped.push(skip(&action.thread_id));
            }
        }

        report.replied = self.post_replies(replies, dry_run, &mut report.failed).await?;
        report.resolved = self.resolve(resolutions, dry_run, &mut report.failed).await?;

        info!(
            dry_run,
            resolved = report.resolved.len(),
            replied = report.replied.len(),
            skipped = report.skipped.len(),
            failed = report.failed.len(),
            "applied thread plan"
        );
        Ok(report)
    }

    /// Resolve arbitrary threads, optionally posting `message` on each first.
    pub async fn bulk_resolve(
        &self,
        thread_ids: &[String],
        message: Option<&str>,
        dry_run: bool,
    ) -> Result<ActionReport, ApiError> {
        let mut report = ActionReport {
            dry_run,
            ..ActionReport::default()
        };

        let mut resolutions = Vec::new();
        for id in thread_ids {
            if is_synthesized_id(id) {
                report.skipped.push(skip(id));
            } else if !resolutions.iter().any(|(seen, _): &(String, _)| seen == id) {
                resolutions.push((id.clone(), message.map(str::to_string)));
            }
        }

        report.resolved = self.resolve(resolutions, dry_run, &mut report.failed).await?;
        info!(
            dry_run,
            resolved = report.resolved.len(),
            failed = report.failed.len(),
            "bulk resolve finished"
        );
        Ok(report)
    }

    fn reply(&self, thread_id: &str, body: &str) -> Reply {
        Reply {
            thread_id: thread_id.to_string(),
            body: self.sanitizer.sanitize(body),
        }
    }

    /// Post replies; returns the threads that got one.
    async fn post_replies(
        &self,
        replies: Vec<Reply>,
        dry_run: bool,
        failed: &mut Vec<FailedAction>,
    ) -> Result<Vec<String>, ApiError> {
        if dry_run {
            for reply in &replies {
                debug!(thread = %reply.thread_id, body = %reply.body, "would reply");
            }
            return Ok(replies.into_iter().map(|r| r.thread_id).collect());
        }
        if replies.is_empty() {
            return Ok(Vec::new());
        }

        let api = self.api;
        let outcome = self
            .recovery
            .run_batch(&replies, "reply to review thread", self.options, |reply| {
                let Reply { thread_id, body } = reply.clone();
                async move { api.add_reply(&thread_id, &body).await }
            })
            .await?;

        let mut posted = Vec::new();
        for (reply, result) in replies.iter().zip(&outcome.results) {
            if result.is_some() {
                posted.push(reply.thread_id.clone());
            }
        }
        failed.extend(outcome.errors.into_iter().map(|e| FailedAction {
            thread_id: e.item.thread_id,
            category: e.category,
            message: e.message,
        }));
        Ok(posted)
    }

    /// Post closing messages, then resolve; returns the resolved threads.
    async fn resolve(
        &self,
        resolutions: Vec<(String, Option<String>)>,
        dry_run: bool,
        failed: &mut Vec<FailedAction>,
    ) -> Result<Vec<String>, ApiError> {
        let closing: Vec<Reply> = resolutions
            .iter()
            .filter_map(|(id, message)| message.as_deref().map(|m| self.reply(id, m)))
            .collect();
        let closed = self.post_replies(closing, dry_run, failed).await?;

        let ready: Vec<String> = resolutions
            .into_iter()
            .filter(|(id, message)| message.is_none() || closed.contains(id))
            .map(|(id, _)| id)
            .collect();

        if dry_run {
            for id in &ready {
                debug!(thread = %id, "would resolve");
            }
            return Ok(ready);
        }
        if ready.is_empty() {
            return Ok(Vec::new());
        }

        let api = self.api;
        let outcome = self
            .recovery
            .run_batch(&ready, "resolve review thread", self.options, |id| {
                let id = id.clone();
                async move { api.resolve_thread(&id).await }
            })
            .await?;

        let resolved = ready
            .iter()
            .zip(&outcome.results)
            .filter(|(_, result)| result.is_some())
            .map(|(id, _)| id.clone())
            .collect();
        failed.extend(outcome.errors.into_iter().map(|e| FailedAction {
            thread_id: e.item,
            category: e.category,
            message: e.message,
        }));
        Ok(resolved)
    }
}

fn skip(thread_id: &str) -> SkippedAction {
    SkippedAction {
        thread_id: thread_id.to_string(),
        reason: SKIP_SYNTHESIZED.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::github::{CommentPage, ThreadPage};
    use crate::models::PullRequestRef;
    use crate::security::PassthroughSanitizer;
    use crate::telemetry::MemoryObserver;
    use crate::threads::planner::{ReplyAction, ResolveAction, ResolveReason};
    use async_trait::async_trait;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingApi {
        calls: Mutex<Vec<String>>,
        reject: Vec<&'static str>,
    }

    impl RecordingApi {
        fn calls(&self) -> Vec<String> {
            self.calls.lock().unwrap().clone()
        }

        fn check(&self, thread_id: &str) -> Result<(), ApiError> {
            if self.reject.contains(&thread_id) {
                return Err(ApiError::GraphQl(format!(
                    "Could not resolve to a node with the global id of '{thread_id}'"
                )));
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ThreadApi for RecordingApi {
        async fn fetch_threads_page(
            &self,
            _pr: &PullRequestRef,
            _after: Option<&str>,
            _page_size: u32,
            _comment_page_size: u32,
        ) -> Result<ThreadPage, ApiError> {
            unreachable!()
        }

        async fn fetch_thread_comments_page(
            &self,
            _thread_id: &str,
            _after: Option<&str>,
            _page_size: u32,
        ) -> Result<CommentPage, ApiError> {
            unreachable!()
        }

        async fn add_reply(&self, thread_id: &str, body: &str) -> Result<String, ApiError> {
            self.check(thread_id)?;
            self.calls.lock().unwrap().push(format!("reply {thread_id}: {body}"));
            Ok("c1".to_string())
        }

        async fn resolve_thread(&self, thread_id: &str) -> Result<(), ApiError> {
            self.check(thread_id)?;
            self.calls.lock().unwrap().push(format!("resolve {thread_id}"));
            Ok(())
        }
    }

    fn resolve_action(id: &str, native: bool, message: Option<&str>) -> ResolveAction {
        ResolveAction {
            thread_id: id.to_string(),
            has_native_id: native,
            location: "src/a.rs:1".to_string(),
            reason: ResolveReason::AuthorResponded,
            message: message.map(str::to_string),
        }
    }

    fn sample_plan() -> ThreadPlan {
        ThreadPlan {
            threads_to_resolve: vec![
                resolve_action("PRRT_1", true, None),
                resolve_action("PRRT_2", true, Some("Thanks!")),
                resolve_action("src/a.rs:3", false, None),
            ],
            threads_to_reply_to: vec![ReplyAction {
                thread_id: "PRRT_3".to_string(),
                has_native_id: true,
                location: "src/b.rs:9".to_string(),
                suggested_reply: "Still open.".to_string(),
            }],
            new_comments_needed: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn executes_replies_then_closing_messages_then_resolves() {
        let api = RecordingApi::default();
        let recovery = ErrorRecovery::new(MemoryObserver::new());
        let actions = ThreadActions::new(&api, &recovery, &PassthroughSanitizer, BatchOptions::default());

        let report = actions.execute_plan(&sample_plan(), false).await.unwrap();

        assert_eq!(
            api.calls(),
            vec![
                "reply PRRT_3: Still open.",
                "reply PRRT_2: Thanks!",
                "resolve PRRT_1",
                "resolve PRRT_2",
            ]
        );
        assert_eq!(report.resolved, vec!["PRRT_1", "PRRT_2"]);
        assert_eq!(report.replied, vec!["PRRT_3"]);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].thread_id, "src/a.rs:3");
        assert!(!report.has_failures());
    }

    #[tokio::test(start_paused = true)]
    async fn dry_run_makes_no_calls() {
        let api = RecordingApi::default();
        let recovery = ErrorRecovery::new(MemoryObserver::new());
        let actions = ThreadActions::new(&api, &recovery, &PassthroughSanitizer, BatchOptions::default());

        let report = actions.execute_plan(&sample_plan(), true).await.unwrap();
        assert!(api.calls().is_empty());
        assert!(report.dry_run);
        assert_eq!(report.resolved, vec!["PRRT_1", "PRRT_2"]);
        assert_eq!(report.replied, vec!["PRRT_3"]);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_closing_reply_leaves_thread_open() {
        let api = RecordingApi {
            reject: vec!["PRRT_2"],
            ..RecordingApi::default()
        };
        let observer = MemoryObserver::new();
        let recovery = ErrorRecovery::new(observer.clone());
        let actions = ThreadActions::new(&api, &recovery, &PassthroughSanitizer, BatchOptions::default());

        let report = actions.execute_plan(&sample_plan(), false).await.unwrap();
        assert_eq!(report.resolved, vec!["PRRT_1"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].thread_id, "PRRT_2");
        assert_eq!(report.failed[0].category, ErrorCategory::NotFound);
        assert!(!api.calls().contains(&"resolve PRRT_2".to_string()));
        assert_eq!(observer.errors().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_resolve_skips_synthesized_and_duplicate_ids() {
        let api = RecordingApi::default();
        let recovery = ErrorRecovery::new(MemoryObserver::new());
        let actions = ThreadActions::new(&api, &recovery, &PassthroughSanitizer, BatchOptions::default());

        let ids: Vec<String> = ["PRRT_a", "README.md:null", "PRRT_a", "PRRT_b"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let report = actions.bulk_resolve(&ids, Some("Closing"), false).await.unwrap();

        assert_eq!(report.resolved, vec!["PRRT_a", "PRRT_b"]);
        assert_eq!(report.skipped[0].thread_id, "README.md:null");
        assert_eq!(api.calls().iter().filter(|c| c.starts_with("reply")).count(), 2);
    }

    #[test]
    fn synthesized_id_shapes() {
        assert!(is_synthesized_id("src/a.ts:10"));
        assert!(is_synthesized_id("README.md:null"));
        assert!(!is_synthesized_id("PRRT_kwDOAbc123"));
        assert!(!is_synthesized_id("weird:id"));
        assert!(!is_synthesized_id(":12"));
    }
}

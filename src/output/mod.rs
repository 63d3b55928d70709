//! Output renderers: terminal and JSON.

pub mod json;
pub mod terminal;

use std::collections::BTreeMap;

use serde::Serialize;

use crate::models::PullRequestRef;
use crate::recovery::hints::help_for;
use crate::review::{DismissalReport, ReviewWindow, SubmissionReport};
use crate::threads::ActionReport;
use crate::threads::analysis::{FileThreadSummary, ThreadAnalysis, ThreadStats};
use crate::threads::planner::ThreadPlan;

pub use json::JsonRenderer;
pub use terminal::TerminalRenderer;

/// An outdated thread, as shown to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutdatedEntry {
    pub thread_id: String,
    pub location: String,
    pub reason: String,
}

/// Classification and plan for one pull request.
#[derive(Debug, Clone, Serialize)]
pub struct ThreadReport {
    pub pull_request: String,
    pub stats: ThreadStats,
    pub files: BTreeMap<String, FileThreadSummary>,
    pub outdated: Vec<OutdatedEntry>,
    pub plan: ThreadPlan,
    /// Comments left after deduplication and outdated-thread filtering.
    pub comment_count: usize,
}

impl ThreadReport {
    pub fn new(pr: &PullRequestRef, analysis: &ThreadAnalysis, plan: ThreadPlan, comment_count: usize) -> Self {
        Self {
            pull_request: pr.to_string(),
            stats: analysis.stats.clone(),
            files: analysis.files.clone(),
            outdated: analysis
                .outdated_threads
                .iter()
                .map(|o| OutdatedEntry {
                    thread_id: o.thread.id.clone(),
                    location: o.thread.location(),
                    reason: o.reason.clone(),
                })
                .collect(),
            plan,
            comment_count,
        }
    }
}

/// User-facing failure, with a corrective hint when one is known.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub help: Option<&'static str>,
}

impl ErrorPayload {
    pub fn from_message(message: impl Into<String>) -> Self {
        let error = message.into();
        let help = help_for(&error);
        Self { error, help }
    }
}

/// Renders command results to a string.
pub trait ReportRenderer {
    fn render_threads(&self, report: &ThreadReport) -> String;
    fn render_actions(&self, report: &ActionReport) -> String;
    fn render_submission(&self, report: &SubmissionReport) -> String;
    fn render_dismissal(&self, report: &DismissalReport) -> String;
    fn render_window(&self, window: &ReviewWindow) -> String;
    fn render_error(&self, payload: &ErrorPayload) -> String;
}

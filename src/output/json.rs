//! JSON output renderer.
//!
//! Every result is printed as a pretty JSON document, so scripts can
//! consume it directly.

use serde::Serialize;

use crate::output::{ErrorPayload, ReportRenderer, ThreadReport};
use crate::review::{DismissalReport, ReviewWindow, SubmissionReport};
use crate::threads::ActionReport;

pub struct JsonRenderer;

fn to_json<T: Serialize>(value: &T) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

impl ReportRenderer for JsonRenderer {
    fn render_threads(&self, report: &ThreadReport) -> String {
        to_json(report)
    }

    fn render_actions(&self, report: &ActionReport) -> String {
        to_json(report)
    }

    fn render_submission(&self, report: &SubmissionReport) -> String {
        to_json(report)
    }

    fn render_dismissal(&self, report: &DismissalReport) -> String {
        to_json(report)
    }

    fn render_window(&self, window: &ReviewWindow) -> String {
        to_json(window)
    }

    fn render_error(&self, payload: &ErrorPayload) -> String {
        to_json(payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::window::FullReviewReason;
    use crate::threads::actions::SkippedAction;

    #[test]
    fn window_is_tagged_by_mode() {
        let output = JsonRenderer.render_window(&ReviewWindow::Full {
            head: "abc1234".into(),
            reason: FullReviewReason::ReviewedCommitMissing,
        });
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["mode"], "full");
        assert_eq!(parsed["reason"], "reviewed_commit_missing");
    }

    #[test]
    fn action_report_fields() {
        let report = ActionReport {
            dry_run: true,
            resolved: vec!["PRRT_1".into()],
            replied: vec![],
            skipped: vec![SkippedAction {
                thread_id: "a.rs:1".into(),
                reason: "thread has no platform id".into(),
            }],
            failed: vec![],
        };
        let parsed: serde_json::Value = serde_json::from_str(&JsonRenderer.render_actions(&report)).unwrap();
        assert_eq!(parsed["dry_run"], true);
        assert_eq!(parsed["resolved"][0], "PRRT_1");
        assert_eq!(parsed["skipped"][0]["thread_id"], "a.rs:1");
    }

    #[test]
    fn error_payload_shape() {
        let output = JsonRenderer.render_error(&ErrorPayload::from_message("HTTP 404: Not Found"));
        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["error"], "HTTP 404: Not Found");
        assert!(parsed["help"].as_str().unwrap().contains("not found"));
    }
}

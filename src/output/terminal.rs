//! Terminal renderer: styled flowing text grouped by file.

use colored::Colorize;

use crate::output::{ErrorPayload, ReportRenderer, ThreadReport};
use crate::review::submit::MetadataOutcome;
use crate::review::window::ReviewWindow;
use crate::review::{DismissalReport, SubmissionReport};
use crate::threads::ActionReport;

const RULE: &str = "───────────────────────────────────";

pub struct TerminalRenderer;

fn plural(n: usize, one: &str, many: &str) -> String {
    format!("{} {}", n.to_string().bold(), if n == 1 { one } else { many })
}

impl ReportRenderer for TerminalRenderer {
    fn render_threads(&self, report: &ThreadReport) -> String {
        let stats = &report.stats;
        if stats.total == 0 {
            return format!("{}", format!("  ✔ No review threads on {}.\n", report.pull_request).green());
        }

        let mut output = format!(" {}\n\n", report.pull_request.bold());

        for (file, summary) in &report.files {
            output.push_str(&format!(
                " {} {}  {} active, {} resolved, {}\n",
                "▸".cyan(),
                file.bold(),
                summary.active_threads,
                summary.resolved_threads,
                plural(summary.total_comments, "comment", "comments"),
            ));
        }

        if !report.outdated.is_empty() {
            output.push('\n');
            for entry in &report.outdated {
                output.push_str(&format!(
                    " {} {} {}\n",
                    "○".dimmed(),
                    entry.location,
                    format!("({})", entry.reason).dimmed()
                ));
            }
        }

        let plan = &report.plan;
        if !plan.is_empty() {
            output.push('\n');
        }
        for action in &plan.threads_to_resolve {
            output.push_str(&format!(" {} resolve {} ({})\n", "✔".green(), action.location.bold(), action.reason));
            if let Some(message) = &action.message {
                output.push_str(&format!("   {} {}\n", "→".cyan(), message));
            }
        }
        for action in &plan.threads_to_reply_to {
            output.push_str(&format!(" {} reply to {}\n", "↩".yellow(), action.location.bold()));
            output.push_str(&format!("   {} {}\n", "→".cyan(), action.suggested_reply));
        }

        output.push_str(&format!("\n{}\n", RULE.dimmed()));
        output.push_str(&format!(
            " {}: {} resolved, {} unresolved, {} outdated, {} ready to resolve\n",
            plural(stats.total, "thread", "threads"),
            stats.resolved.to_string().green(),
            stats.unresolved.to_string().yellow(),
            stats.outdated.to_string().dimmed(),
            stats.ready_for_resolution.to_string().cyan(),
        ));
        if plan.new_comments_needed {
            output.push_str(&format!(" {}\n", plural(report.comment_count, "active comment", "active comments")));
        }
        output
    }

    fn render_actions(&self, report: &ActionReport) -> String {
        let mut output = String::new();
        let verb = if report.dry_run { "would resolve" } else { "resolved" };
        for id in &report.resolved {
            output.push_str(&format!(" {} {verb} {id}\n", "✔".green()));
        }
        let verb = if report.dry_run { "would reply to" } else { "replied to" };
        for id in &report.replied {
            output.push_str(&format!(" {} {verb} {id}\n", "↩".yellow()));
        }
        for skipped in &report.skipped {
            output.push_str(&format!(
                " {} skipped {} {}\n",
                "○".dimmed(),
                skipped.thread_id,
                format!("({})", skipped.reason).dimmed()
            ));
        }
        for failed in &report.failed {
            output.push_str(&format!(
                " {} {} {} — {}\n",
                "✖".red().bold(),
                failed.thread_id.bold(),
                format!("[{}]", failed.category).red(),
                failed.message
            ));
        }
        output.push_str(&format!("{}\n", RULE.dimmed()));
        output.push_str(&format!(
            " {} resolved, {} replied, {} skipped, {} failed{}\n",
            report.resolved.len().to_string().green().bold(),
            report.replied.len().to_string().yellow().bold(),
            report.skipped.len(),
            report.failed.len().to_string().red().bold(),
            if report.dry_run { " (dry run)" } else { "" },
        ));
        output
    }

    fn render_submission(&self, report: &SubmissionReport) -> String {
        let review = &report.review;
        let mut output = format!(
            " {} review {} {} on {} ({})\n",
            "✔".green(),
            review.id.to_string().bold(),
            review.state,
            report.commit_id.get(..7).unwrap_or(&report.commit_id),
            report.path,
        );
        match &report.metadata {
            MetadataOutcome::NotRequested => {}
            MetadataOutcome::Written { marker } => {
                output.push_str(&format!("   {} tracking marker set to {}\n", "→".cyan(), marker.last_reviewed_sha));
            }
            MetadataOutcome::Failed { message } => {
                output.push_str(&format!("   {} tracking marker not written: {message}\n", "⚠".yellow().bold()));
            }
        }
        if let Some(dismissal) = &report.dismissal {
            output.push_str(&indent(&self.render_dismissal(dismissal)));
        }
        output
    }

    fn render_dismissal(&self, report: &DismissalReport) -> String {
        let icon = if report.success { "✔".green() } else { "✖".red().bold() };
        let mut output = format!(
            " {icon} dismissed {}\n",
            plural(report.dismissed_count, "change request", "change requests")
        );
        for error in &report.errors {
            let target = error
                .review_id
                .map(|id| format!("review {id}"))
                .unwrap_or_else(|| "listing".to_string());
            output.push_str(&format!("   {} {target}: {}\n", "✖".red(), error.message));
        }
        output
    }

    fn render_window(&self, window: &ReviewWindow) -> String {
        match window {
            ReviewWindow::UpToDate { head } => {
                format!(" {} already reviewed up to {}\n", "✔".green(), head.bold())
            }
            ReviewWindow::Incremental { base, head } => {
                format!(" {} incremental review {}..{}\n", "▸".cyan(), base, head.bold())
            }
            ReviewWindow::Full { head, reason } => {
                format!(" {} full review at {} {}\n", "▸".yellow(), head.bold(), format!("({reason})").dimmed())
            }
        }
    }

    fn render_error(&self, payload: &ErrorPayload) -> String {
        let mut output = format!("{} {}\n", "Error:".red().bold(), payload.error);
        if let Some(help) = payload.help {
            output.push_str(&format!("  {} {help}\n", "help:".cyan().bold()));
        }
        output
    }
}

fn indent(text: &str) -> String {
    text.lines().map(|l| format!("  {l}\n")).collect()
}

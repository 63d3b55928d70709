//! Clap argument types and validation.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use threadkeeper::models::Verdict;
use threadkeeper::output::{JsonRenderer, ReportRenderer, TerminalRenderer};

/// Review thread reconciliation and review submission for GitHub pull requests.
#[derive(Parser, Debug)]
#[command(name = "threadkeeper", version)]
pub struct Cli {
    /// Repository as owner/name (default: GITHUB_REPOSITORY or config).
    #[arg(long, global = true)]
    pub repo: Option<String>,

    /// Pull request number.
    #[arg(long, global = true)]
    pub pr: Option<u64>,

    /// Output format.
    #[arg(long, global = true, value_enum, default_value_t = OutputFormat::Terminal)]
    pub format: OutputFormat,

    /// Path to the repository root, where `.threadkeeper.toml` is looked up.
    #[arg(long, global = true, default_value = ".")]
    pub path: PathBuf,

    /// Debug-level logging (RUST_LOG takes precedence).
    #[arg(long, short, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available commands.
#[derive(clap::Subcommand, Debug)]
pub enum Command {
    /// Fetch, classify and plan review threads.
    Threads,

    /// Carry out the thread plan: post replies and resolve threads.
    Apply(ApplyArgs),

    /// Resolve specific threads by id.
    Resolve(ResolveArgs),

    /// Submit a formal review.
    Submit(SubmitArgs),

    /// Dismiss this identity's earlier change requests.
    DismissStale(DismissArgs),

    /// Request reviews from users.
    RequestReviewers(RequestReviewersArgs),

    /// Show what the next review needs to cover.
    Window(WindowArgs),

    /// Print a file's content at a ref (default: the pull request head).
    Show(ShowArgs),
}

#[derive(Parser, Debug)]
pub struct ApplyArgs {
    /// Report what would be done without changing anything.
    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
pub struct ResolveArgs {
    /// Review thread ids.
    #[arg(required = true)]
    pub thread_ids: Vec<String>,

    /// Reply posted on each thread before resolving it.
    #[arg(long)]
    pub message: Option<String>,

    #[arg(long, default_value_t = false)]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
pub struct SubmitArgs {
    #[arg(long, value_enum)]
    pub verdict: Verdict,

    /// Review body.
    #[arg(long, conflicts_with = "body_file")]
    pub body: Option<String>,

    /// Read the review body from a file.
    #[arg(long)]
    pub body_file: Option<PathBuf>,

    /// Commit to review (default: the pull request head).
    #[arg(long)]
    pub commit: Option<String>,

    /// Issue comment id that carries the review tracking marker.
    #[arg(long)]
    pub tracking_comment: Option<u64>,
}

impl SubmitArgs {
    /// The body text, read from `--body-file` when given.
    pub fn read_body(&self) -> std::io::Result<String> {
        match (&self.body, &self.body_file) {
            (Some(body), _) => Ok(body.clone()),
            (None, Some(path)) => std::fs::read_to_string(path),
            (None, None) => Ok(String::new()),
        }
    }
}

#[derive(Parser, Debug)]
pub struct DismissArgs {
    /// Dismissal message shown on each review.
    #[arg(long)]
    pub message: Option<String>,
}

#[derive(Parser, Debug)]
pub struct RequestReviewersArgs {
    /// GitHub logins.
    #[arg(required = true)]
    pub reviewers: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct WindowArgs {
    /// Issue comment id that carries the review tracking marker.
    #[arg(long)]
    pub tracking_comment: Option<u64>,
}

#[derive(Parser, Debug)]
pub struct ShowArgs {
    /// Path within the repository.
    pub path: String,

    /// Branch, tag or commit.
    #[arg(long = "ref")]
    pub git_ref: Option<String>,
}

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Terminal,
    Json,
}

impl OutputFormat {
    pub fn renderer(self) -> Box<dyn ReportRenderer> {
        match self {
            OutputFormat::Terminal => Box::new(TerminalRenderer),
            OutputFormat::Json => Box::new(JsonRenderer),
        }
    }
}

//! threadkeeper: pull request review thread reconciliation and review submission.
//!
//! Entry point and error handling boundary. Uses `anyhow` for
//! ergonomic error propagation and user-facing messages.

mod cli;

use std::process;

use anyhow::{Context, Result, bail};
use clap::Parser;

use threadkeeper::config::Config;
use threadkeeper::constants;
use threadkeeper::env::Env;
use threadkeeper::output::ErrorPayload;
use threadkeeper::review::SubmitRequest;
use threadkeeper::session::Session;
use threadkeeper::telemetry;

use cli::args::{Cli, Command};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    cli::init_logging(cli.verbose);
    let renderer = cli.format.renderer();

    if let Err(err) = run(cli).await {
        let payload = ErrorPayload::from_message(format!("{err:#}"));
        eprint!("{}", renderer.render_error(&payload));
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<()> {
    let env = Env::real();
    let mut config = Config::load(Some(&cli.path), &env).context("failed to load configuration")?;
    if let Some(repo) = cli.repo {
        config.github.repository = Some(repo);
    }

    let pr_number = match cli.pr {
        Some(n) => n,
        None => match env.get(constants::ENV_PR_NUMBER) {
            Some(value) => value
                .parse()
                .with_context(|| format!("{} is not a pull request number: '{value}'", constants::ENV_PR_NUMBER))?,
            None => bail!("no pull request given: pass --pr <number> or set {}", constants::ENV_PR_NUMBER),
        },
    };

    let run_id = telemetry::new_run_id();
    let session = Session::connect(&config, pr_number, &cli.path, &run_id)?;
    let renderer = cli.format.renderer();
    tracing::debug!(run_id = %run_id, pr = %session.pull_request(), "session started");

    match cli.command {
        Command::Threads => {
            let report = session.thread_report().await?;
            print!("{}", renderer.render_threads(&report));
        }
        Command::Apply(args) => {
            let report = session.apply(args.dry_run).await?;
            print!("{}", renderer.render_actions(&report));
            if report.has_failures() {
                bail!("{} thread action(s) failed", report.failed.len());
            }
        }
        Command::Resolve(args) => {
            let report = session
                .resolve_threads(&args.thread_ids, args.message.as_deref(), args.dry_run)
                .await?;
            print!("{}", renderer.render_actions(&report));
            if report.has_failures() {
                bail!("{} thread(s) could not be resolved", report.failed.len());
            }
        }
        Command::Submit(args) => {
            let body = args.read_body().context("failed to read review body")?;
            let request = SubmitRequest {
                pr: session.pull_request().clone(),
                verdict: args.verdict,
                body,
                commit_id: args.commit,
                tracking_comment_id: args.tracking_comment,
            };
            let report = session.submit(&request).await?;
            print!("{}", renderer.render_submission(&report));
        }
        Command::DismissStale(args) => {
            let report = session.dismiss_stale(args.message.as_deref()).await;
            print!("{}", renderer.render_dismissal(&report));
            if !report.success {
                let first = report.errors.first().map(|e| e.message.as_str()).unwrap_or("unknown error");
                bail!("could not dismiss previous change requests: {first}");
            }
        }
        Command::RequestReviewers(args) => {
            session.request_reviewers(&args.reviewers).await?;
            eprintln!("Requested reviews from {}", args.reviewers.join(", "));
        }
        Command::Window(args) => {
            let window = session.review_window(args.tracking_comment).await?;
            print!("{}", renderer.render_window(&window));
        }
        Command::Show(args) => {
            let content = session.file_at_ref(&args.path, args.git_ref.as_deref()).await?;
            print!("{content}");
        }
    }

    Ok(())
}

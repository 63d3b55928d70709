//! Per-invocation wiring.
//!
//! A [`Session`] owns everything one command needs: the platform clients,
//! the circuit breaker guarding the paginated fetch, the recovery layer
//! and its observer, and the sanitizer. Nothing here is global; a second
//! session gets a fresh breaker.

use std::path::Path;
use std::sync::Arc;

use thiserror::Error;
use tracing::{info, warn};

use crate::config::{Config, ConfigError, PaginationConfig};
use crate::github::{ApiError, GitHubClient, ReviewApi, ThreadApi, TrackingCommentStore};
use crate::models::{DeduplicatedComment, PullRequestRef};
use crate::output::ThreadReport;
use crate::recovery::{BatchOptions, CircuitBreaker, ErrorRecovery};
use crate::review::dismiss::{DEFAULT_DISMISS_MESSAGE, dismiss_previous_change_requests};
use crate::review::{
    DismissalReport, ReviewSubmitter, ReviewWindow, SubmissionReport, SubmitError, SubmitRequest,
    determine_window,
};
use crate::security::{RuleError, Sanitizer, sanitizer_for};
use crate::telemetry::{Observer, TracingObserver, WebhookObserver};
use crate::threads::{
    ActionReport, ThreadActions, ThreadAnalysis, ThreadFetcher, ThreadIndex, ThreadPlan, analyze,
    analyze_fetched, dedupe, plan,
};

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Rules(#[from] RuleError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Submit(#[from] SubmitError),
}

/// Everything known about a pull request's threads after one pass.
#[derive(Debug, Clone)]
pub struct ThreadOverview {
    pub analysis: ThreadAnalysis,
    pub comments: Vec<DeduplicatedComment>,
    pub plan: ThreadPlan,
}

/// The platform collaborators a session talks to.
#[derive(Clone)]
pub struct Clients {
    pub reviews: Arc<dyn ReviewApi>,
    pub threads: Arc<dyn ThreadApi>,
    pub tracking: Arc<dyn TrackingCommentStore>,
}

impl Clients {
    /// All three seams served by one GitHub client.
    pub fn github(client: GitHubClient) -> Self {
        let client = Arc::new(client);
        Self {
            reviews: client.clone(),
            threads: client.clone(),
            tracking: client,
        }
    }
}

pub struct Session {
    pr: PullRequestRef,
    clients: Clients,
    breaker: CircuitBreaker,
    recovery: ErrorRecovery,
    sanitizer: Arc<dyn Sanitizer>,
    pagination: PaginationConfig,
    batch: BatchOptions,
}

impl Session {
    /// Connect to GitHub as configured.
    pub fn connect(
        config: &Config,
        pr_number: u64,
        repo_root: &Path,
        run_id: &str,
    ) -> Result<Self, SessionError> {
        let (owner, repo) = config.github.owner_and_repo()?;
        let clients = Clients::github(GitHubClient::new(&config.github)?);
        let observer: Arc<dyn Observer> = match &config.telemetry.endpoint {
            Some(endpoint) => Arc::new(WebhookObserver::new(endpoint.clone(), run_id)),
            None => Arc::new(TracingObserver::new(run_id)),
        };
        let sanitizer = sanitizer_for(&config.secrets, repo_root)?;
        Ok(Self::new(
            config,
            PullRequestRef::new(owner, repo, pr_number),
            clients,
            observer,
            sanitizer,
        ))
    }

    pub fn new(
        config: &Config,
        pr: PullRequestRef,
        clients: Clients,
        observer: Arc<dyn Observer>,
        sanitizer: Arc<dyn Sanitizer>,
    ) -> Self {
        Self {
            pr,
            clients,
            breaker: CircuitBreaker::new(config.breaker.settings(), observer.clone()),
            recovery: ErrorRecovery::new(observer),
            sanitizer,
            pagination: config.pagination.clone(),
            batch: config.batch.options(),
        }
    }

    pub fn pull_request(&self) -> &PullRequestRef {
        &self.pr
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    /// Fetch, classify, deduplicate and plan.
    ///
    /// Threads come from the paginated fetch with their native resolution
    /// flag. If that fetch fails outright, threads are rebuilt from the
    /// reviews' inline comments instead.
    pub async fn analyze_threads(&self) -> Result<ThreadOverview, SessionError> {
        let pr = &self.pr;
        let reviews = self.clients.reviews.as_ref();

        let pull = self
            .recovery
            .run("get pull request", true, || reviews.pull_request(pr))
            .await?
            .ok_or_else(|| ApiError::Unavailable("pull request details unavailable".to_string()))?;

        let changed_files = self
            .recovery
            .run_or("list changed files", false, Vec::new(), || reviews.list_changed_files(pr))
            .await?;
        let changed = (!changed_files.is_empty()).then_some(changed_files.as_slice());

        let fetcher = ThreadFetcher::new(
            self.clients.threads.as_ref(),
            &self.breaker,
            &self.recovery,
            &self.pagination,
        );
        let analysis = match fetcher.fetch_all(pr).await {
            Ok(fetched) => analyze_fetched(fetched, changed, &pull.author),
            Err(err) => {
                warn!(%pr, "thread fetch failed, rebuilding threads from reviews: {err}");
                let all_reviews = self
                    .recovery
                    .run_or("list reviews", false, Vec::new(), || reviews.list_reviews(pr))
                    .await?;
                analyze(&all_reviews, changed, &pull.author)
            }
        };

        let general = self
            .recovery
            .run_or("list issue comments", false, Vec::new(), || reviews.list_issue_comments(pr))
            .await?;
        let inline = self
            .recovery
            .run_or("list review comments", false, Vec::new(), || reviews.list_review_comments(pr))
            .await?;
        let comments = dedupe(&general, &inline, &ThreadIndex::from_analysis(&analysis));
        let plan = plan(&analysis, &comments);

        info!(
            %pr,
            threads = analysis.stats.total,
            to_resolve = plan.threads_to_resolve.len(),
            to_reply = plan.threads_to_reply_to.len(),
            comments = comments.len(),
            "thread analysis complete"
        );

        Ok(ThreadOverview {
            analysis,
            comments,
            plan,
        })
    }

    pub async fn thread_report(&self) -> Result<ThreadReport, SessionError> {
        let overview = self.analyze_threads().await?;
        Ok(ThreadReport::new(
            &self.pr,
            &overview.analysis,
            overview.plan,
            overview.comments.len(),
        ))
    }

    /// Analyze and carry out the resulting plan.
    pub async fn apply(&self, dry_run: bool) -> Result<ActionReport, SessionError> {
        let overview = self.analyze_threads().await?;
        Ok(self.actions().execute_plan(&overview.plan, dry_run).await?)
    }

    pub async fn resolve_threads(
        &self,
        thread_ids: &[String],
        message: Option<&str>,
        dry_run: bool,
    ) -> Result<ActionReport, SessionError> {
        Ok(self.actions().bulk_resolve(thread_ids, message, dry_run).await?)
    }

    pub async fn submit(&self, request: &SubmitRequest) -> Result<SubmissionReport, SessionError> {
        let submitter = ReviewSubmitter::new(
            self.clients.reviews.as_ref(),
            self.clients.tracking.as_ref(),
            &self.recovery,
            self.sanitizer.as_ref(),
        );
        Ok(submitter.submit(request).await?)
    }

    pub async fn dismiss_stale(&self, message: Option<&str>) -> DismissalReport {
        let message = self.sanitizer.sanitize(message.unwrap_or(DEFAULT_DISMISS_MESSAGE));
        dismiss_previous_change_requests(self.clients.reviews.as_ref(), &self.recovery, &self.pr, &message).await
    }

    pub async fn request_reviewers(&self, reviewers: &[String]) -> Result<(), SessionError> {
        let api = self.clients.reviews.as_ref();
        let pr = &self.pr;
        self.recovery
            .run("request reviewers", true, || api.request_reviewers(pr, reviewers))
            .await?;
        info!(%pr, ?reviewers, "requested reviewers");
        Ok(())
    }

    pub async fn review_window(&self, tracking_comment_id: Option<u64>) -> Result<ReviewWindow, SessionError> {
        Ok(determine_window(
            self.clients.reviews.as_ref(),
            self.clients.tracking.as_ref(),
            &self.recovery,
            &self.pr,
            tracking_comment_id,
        )
        .await?)
    }

    /// File content at `git_ref`, or at the pull request's head.
    pub async fn file_at_ref(&self, path: &str, git_ref: Option<&str>) -> Result<String, SessionError> {
        let api = self.clients.reviews.as_ref();
        let pr = &self.pr;
        let git_ref = match git_ref {
            Some(r) => r.to_string(),
            None => self
                .recovery
                .run("get pull request", true, || api.pull_request(pr))
                .await?
                .map(|pull| pull.head_sha)
                .ok_or_else(|| ApiError::Unavailable("pull request details unavailable".to_string()))?,
        };
        let git_ref = git_ref.as_str();
        let content = self
            .recovery
            .run("get file content", true, || api.file_content_at_ref(pr, path, git_ref))
            .await?
            .ok_or_else(|| ApiError::Unavailable(format!("{path} unavailable at {git_ref}")))?;
        Ok(content)
    }

    fn actions(&self) -> ThreadActions<'_> {
        ThreadActions::new(
            self.clients.threads.as_ref(),
            &self.recovery,
            self.sanitizer.as_ref(),
            self.batch,
        )
    }
}

//! Error classification and recovery around remote calls.
//!
//! A failed operation is categorized by its message, mapped to a
//! strategy, and the strategy is executed:
//!
//! | Category | Strategy |
//! |---|---|
//! | `rate_limit` | retry ×3, 10 s → 60 s |
//! | `network`, `server_error` | retry ×5 (critical) or ×2, 2 s → 15 s |
//! | `authentication`, `permission`, `validation` | fail fast |
//! | `not_found` | fail fast (critical) or skip |
//! | `unknown` | retry once (critical) or skip |
//!
//! Skips and raises are reported to the [`Observer`].

pub mod breaker;
pub mod hints;
pub mod retry;

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use strum::{AsRefStr, Display as StrumDisplay};

use crate::telemetry::{DiagnosticContext, Observer};

pub use breaker::{BreakerError, BreakerSettings, CircuitBreaker, CircuitState};
pub use retry::{RetryPolicy, retry_with_backoff, retry_with_backoff_if};

/// Broad failure classes, derived from error messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, StrumDisplay, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorCategory {
    Network,
    RateLimit,
    Authentication,
    NotFound,
    Validation,
    Permission,
    ServerError,
    Unknown,
}

impl ErrorCategory {
    /// Structural failures that will not go away by themselves.
    pub fn is_structural(self) -> bool {
        matches!(
            self,
            ErrorCategory::Authentication | ErrorCategory::Permission | ErrorCategory::Validation
        )
    }
}

/// What to do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, StrumDisplay, AsRefStr)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecoveryStrategy {
    Retry,
    Skip,
    FailFast,
    /// Continue with a caller-supplied fallback value.
    Degrade,
}

/// Chosen strategy plus retry parameters when retrying.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RecoveryPlan {
    pub strategy: RecoveryStrategy,
    pub retry: Option<RetryPolicy>,
}

/// Substrings checked in order; the first matching category wins.
const CATEGORY_PATTERNS: &[(ErrorCategory, &[&str])] = &[
    (
        ErrorCategory::RateLimit,
        &["rate limit", "429", "too many requests", "abuse detection"],
    ),
    (
        ErrorCategory::Authentication,
        &["401", "unauthorized", "bad credentials", "requires authentication"],
    ),
    (
        ErrorCategory::Permission,
        &["403", "forbidden", "permission", "resource not accessible"],
    ),
    (
        ErrorCategory::NotFound,
        &["404", "not found", "could not resolve to"],
    ),
    (
        ErrorCategory::Validation,
        &["422", "invalid", "validation", "unprocessable"],
    ),
    (
        ErrorCategory::ServerError,
        &[
            "500",
            "502",
            "503",
            "504",
            "internal server error",
            "bad gateway",
            "service unavailable",
        ],
    ),
    (
        ErrorCategory::Network,
        &[
            "timeout",
            "timed out",
            "econnreset",
            "econnrefused",
            "connection",
            "network",
            "dns error",
        ],
    ),
];

/// Categorize an error by case-insensitive substring match on its message.
pub fn categorize(error: &dyn Display) -> ErrorCategory {
    let message = error.to_string().to_lowercase();
    CATEGORY_PATTERNS
        .iter()
        .find(|(_, needles)| needles.iter().any(|n| message.contains(n)))
        .map(|(category, _)| *category)
        .unwrap_or(ErrorCategory::Unknown)
}

/// Map a category to a strategy.
pub fn plan_recovery(category: ErrorCategory, critical: bool) -> RecoveryPlan {
    let retry = |policy| RecoveryPlan {
        strategy: RecoveryStrategy::Retry,
        retry: Some(policy),
    };
    let without_retry = |strategy| RecoveryPlan {
        strategy,
        retry: None,
    };

    match category {
        ErrorCategory::RateLimit => retry(RetryPolicy::new(
            3,
            Duration::from_secs(10),
            Duration::from_secs(60),
        )),
        ErrorCategory::Network | ErrorCategory::ServerError => retry(RetryPolicy::new(
            if critical { 5 } else { 2 },
            Duration::from_secs(2),
            Duration::from_secs(15),
        )),
        ErrorCategory::Authentication | ErrorCategory::Permission | ErrorCategory::Validation => {
            without_retry(RecoveryStrategy::FailFast)
        }
        ErrorCategory::NotFound if critical => without_retry(RecoveryStrategy::FailFast),
        ErrorCategory::NotFound => without_retry(RecoveryStrategy::Skip),
        ErrorCategory::Unknown if critical => retry(RetryPolicy::new(
            1,
            Duration::from_secs(2),
            Duration::from_secs(15),
        )),
        ErrorCategory::Unknown => without_retry(RecoveryStrategy::Skip),
    }
}

/// Options for [`ErrorRecovery::run_batch`].
#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub max_concurrent: usize,
    pub fail_on_any_error: bool,
    pub critical: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 5,
            fail_on_any_error: false,
            critical: false,
        }
    }
}

/// An item that did not produce a result.
#[derive(Debug, Clone)]
pub struct BatchFailure<I> {
    pub item: I,
    pub category: ErrorCategory,
    pub message: String,
}

/// Positional results plus per-item failures.
#[derive(Debug)]
pub struct BatchOutcome<I, T> {
    /// One entry per attempted item, `None` where the item failed.
    pub results: Vec<Option<T>>,
    pub errors: Vec<BatchFailure<I>>,
}

enum Attempt<T, E> {
    Success(T),
    /// Failed, but the caller may continue without a value.
    Skipped(E),
    /// Failed, and the error must propagate.
    Failed(E),
}

/// Executes recovery plans and reports what happened.
#[derive(Clone)]
pub struct ErrorRecovery {
    observer: Arc<dyn Observer>,
}

impl ErrorRecovery {
    pub fn new(observer: Arc<dyn Observer>) -> Self {
        Self { observer }
    }

    pub fn observer(&self) -> &Arc<dyn Observer> {
        &self.observer
    }

    /// Run `operation`, recovering according to the category of any failure.
    ///
    /// Returns `Ok(None)` when a non-critical failure was skipped or its
    /// retries were exhausted. Critical failures, and fail-fast categories
    /// regardless of criticality, propagate.
    pub async fn run<T, E, F, Fut>(&self, name: &str, critical: bool, operation: F) -> Result<Option<T>, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        match self.attempt(name, critical, operation).await {
            Attempt::Success(value) => Ok(Some(value)),
            Attempt::Skipped(_) => Ok(None),
            Attempt::Failed(err) => Err(err),
        }
    }

    /// Like [`run`](Self::run), but a skipped failure yields `fallback`.
    pub async fn run_or<T, E, F, Fut>(
        &self,
        name: &str,
        critical: bool,
        fallback: T,
        operation: F,
    ) -> Result<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        match self.attempt(name, critical, operation).await {
            Attempt::Success(value) => Ok(value),
            Attempt::Skipped(err) => {
                tracing::warn!(operation = name, "degrading to fallback after: {err}");
                self.observer.add_breadcrumb(
                    &format!("{name} degraded to fallback"),
                    "error_recovery",
                    serde_json::json!({ "strategy": RecoveryStrategy::Degrade.as_ref() }),
                );
                Ok(fallback)
            }
            Attempt::Failed(err) => Err(err),
        }
    }

    /// Run `operation` over `items` in chunks of `max_concurrent`.
    ///
    /// Items within a chunk run concurrently; a chunk starts only after
    /// the previous one has settled. `results` is positional. With
    /// `fail_on_any_error`, the first failure aborts the batch.
    pub async fn run_batch<I, T, E, F, Fut>(
        &self,
        items: &[I],
        name: &str,
        options: BatchOptions,
        operation: F,
    ) -> Result<BatchOutcome<I, T>, E>
    where
        I: Clone,
        F: Fn(&I) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let mut outcome = BatchOutcome {
            results: Vec::with_capacity(items.len()),
            errors: Vec::new(),
        };
        let operation = &operation;

        for chunk in items.chunks(options.max_concurrent.max(1)) {
            let attempts = join_all(
                chunk
                    .iter()
                    .map(|item| self.attempt(name, options.critical, move || operation(item))),
            )
            .await;

            for (item, attempt) in chunk.iter().zip(attempts) {
                let err = match attempt {
                    Attempt::Success(value) => {
                        outcome.results.push(Some(value));
                        continue;
                    }
                    Attempt::Skipped(err) | Attempt::Failed(err) => err,
                };
                if options.fail_on_any_error {
                    return Err(err);
                }
                outcome.results.push(None);
                outcome.errors.push(BatchFailure {
                    item: item.clone(),
                    category: categorize(&err),
                    message: err.to_string(),
                });
            }
        }

        if !outcome.errors.is_empty() {
            tracing::warn!(
                operation = name,
                failed = outcome.errors.len(),
                total = items.len(),
                "batch completed with failures"
            );
        }

        Ok(outcome)
    }

    async fn attempt<T, E, F, Fut>(&self, name: &str, critical: bool, mut operation: F) -> Attempt<T, E>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        let err = match operation().await {
            Ok(value) => return Attempt::Success(value),
            Err(err) => err,
        };

        let category = categorize(&err);
        let plan = plan_recovery(category, critical);
        tracing::warn!(
            operation = name,
            category = category.as_ref(),
            strategy = plan.strategy.as_ref(),
            critical,
            "operation failed: {err}"
        );
        self.observer.add_breadcrumb(
            &format!("{name} failed"),
            "error_recovery",
            serde_json::json!({
                "category": category.as_ref(),
                "strategy": plan.strategy.as_ref(),
                "critical": critical,
            }),
        );

        match plan.strategy {
            RecoveryStrategy::Retry => {
                let policy = plan.retry.unwrap_or_default();
                // The first failure already happened here, so the primitive
                // picks up the schedule at its second delay.
                tokio::time::sleep(policy.backoff(0)).await;
                let retried = retry_with_backoff_if(&policy.advanced(), &mut operation, |e| {
                    !categorize(e).is_structural()
                })
                .await;
                match retried {
                    Ok(value) => Attempt::Success(value),
                    Err(err) => {
                        let category = categorize(&err);
                        self.report(name, category, RecoveryStrategy::Retry, critical, &err);
                        if critical || category.is_structural() {
                            Attempt::Failed(err)
                        } else {
                            Attempt::Skipped(err)
                        }
                    }
                }
            }
            RecoveryStrategy::Skip | RecoveryStrategy::Degrade => {
                self.report(name, category, plan.strategy, critical, &err);
                Attempt::Skipped(err)
            }
            RecoveryStrategy::FailFast => {
                self.report(name, category, plan.strategy, critical, &err);
                Attempt::Failed(err)
            }
        }
    }

    fn report(
        &self,
        name: &str,
        category: ErrorCategory,
        strategy: RecoveryStrategy,
        critical: bool,
        err: &dyn Display,
    ) {
        self.observer.report_error(
            &err.to_string(),
            &DiagnosticContext::new(name)
                .with_category(category)
                .with_strategy(strategy)
                .critical(critical),
        );
    }
}

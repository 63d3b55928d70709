//! Circuit breaker guarding a flaky remote dependency.
//!
//! ```text
//! closed ──(failures ≥ threshold)──▶ open ──(reset timeout elapsed)──▶ half-open
//!   ▲                                  ▲                                   │
//!   └──────────(probe succeeds)────────┼───────────(probe fails)───────────┘
//! ```
//!
//! One instance guards one dependency for the lifetime of an invocation.
//! Every call is raced against a timeout; a timeout counts as a failure.

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;

use crate::telemetry::{DiagnosticContext, Observer};

/// Circuit breaker states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation: all calls pass through.
    Closed,
    /// Failing fast: calls are rejected immediately.
    Open,
    /// Testing recovery: one probe call is allowed.
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Per-instance tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub call_timeout: Duration,
    pub reset_timeout: Duration,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            call_timeout: Duration::from_secs(30),
            reset_timeout: Duration::from_secs(60),
        }
    }
}

/// Why a guarded call did not produce a value.
#[derive(Error, Debug)]
pub enum BreakerError<E> {
    #[error("circuit open for {name}: rejecting call, retry in {}s", retry_in.as_secs())]
    Open { name: String, retry_in: Duration },

    #[error("{name} timed out after {}ms", after.as_millis())]
    Timeout { name: String, after: Duration },

    #[error("{0}")]
    Inner(E),
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    last_failure: Option<Instant>,
    probe_in_flight: bool,
}

/// Circuit breaker over async operations.
pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<BreakerState>,
    observer: Arc<dyn Observer>,
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings, observer: Arc<dyn Observer>) -> Self {
        Self {
            settings,
            inner: Mutex::new(BreakerState {
                state: CircuitState::Closed,
                failure_count: 0,
                last_failure: None,
                probe_in_flight: false,
            }),
            observer,
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }

    /// Run `operation` through the breaker.
    ///
    /// While open, the operation is not invoked at all until the reset
    /// timeout has elapsed since the last failure; the first call after
    /// that is let through as a probe.
    pub async fn execute<T, E, F, Fut>(&self, name: &str, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.admit(name)?;

        match tokio::time::timeout(self.settings.call_timeout, operation()).await {
            Ok(Ok(value)) => {
                self.on_success();
                Ok(value)
            }
            Ok(Err(err)) => {
                self.on_failure(name);
                Err(BreakerError::Inner(err))
            }
            Err(_) => {
                self.on_failure(name);
                Err(BreakerError::Timeout {
                    name: name.to_string(),
                    after: self.settings.call_timeout,
                })
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn admit<E>(&self, name: &str) -> Result<(), BreakerError<E>> {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed => Ok(()),
            CircuitState::HalfOpen if !inner.probe_in_flight => {
                inner.probe_in_flight = true;
                Ok(())
            }
            CircuitState::HalfOpen => Err(BreakerError::Open {
                name: name.to_string(),
                retry_in: Duration::ZERO,
            }),
            CircuitState::Open => {
                let elapsed = inner
                    .last_failure
                    .map(|at| at.elapsed())
                    .unwrap_or(self.settings.reset_timeout);
                if elapsed >= self.settings.reset_timeout {
                    tracing::info!(dependency = name, "circuit half-open, sending probe");
                    inner.state = CircuitState::HalfOpen;
                    inner.probe_in_flight = true;
                    Ok(())
                } else {
                    Err(BreakerError::Open {
                        name: name.to_string(),
                        retry_in: self.settings.reset_timeout - elapsed,
                    })
                }
            }
        }
    }

    fn on_success(&self) {
        let mut inner = self.lock();
        if inner.state != CircuitState::Closed {
            tracing::info!("circuit closed after successful probe");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.probe_in_flight = false;
    }

    fn on_failure(&self, name: &str) {
        let tripped = {
            let mut inner = self.lock();
            inner.failure_count += 1;
            inner.last_failure = Some(Instant::now());
            inner.probe_in_flight = false;

            let should_open = inner.state == CircuitState::HalfOpen
                || inner.failure_count >= self.settings.failure_threshold;
            if should_open && inner.state != CircuitState::Open {
                inner.state = CircuitState::Open;
                Some(inner.failure_count)
            } else {
                None
            }
        };

        // Reported outside the lock; observers may do arbitrary work.
        if let Some(failures) = tripped {
            tracing::warn!(dependency = name, failures, "circuit opened");
            self.observer.report_error(
                &format!("circuit breaker opened for {name} after {failures} failures"),
                &DiagnosticContext::new(name)
                    .with_category("circuit_breaker")
                    .critical(true)
                    .with_extra(serde_json::json!({ "failure_count": failures })),
            );
        }
    }
}

//! Diagnostic events: error reports and breadcrumbs.
//!
//! Every remote call that ends in a raise or a skip emits a structured
//! event through an [`Observer`]. Observers are fire-and-forget: they
//! never block the caller and never fail it.
//!
//! - [`TracingObserver`] writes events as `tracing` records (default).
//! - [`WebhookObserver`] additionally POSTs each event to a collector.
//! - [`MemoryObserver`] keeps events in memory for tests and dry runs.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;

/// Maximum time we'll wait for a webhook POST before giving up.
const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(2);

/// Structured context attached to an error report.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DiagnosticContext {
    pub operation: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<String>,
    pub critical: bool,
    #[serde(skip_serializing_if = "serde_json::Value::is_null")]
    pub extra: serde_json::Value,
}

impl DiagnosticContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            operation: operation.into(),
            ..Self::default()
        }
    }

    pub fn with_category(mut self, category: impl ToString) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_strategy(mut self, strategy: impl ToString) -> Self {
        self.strategy = Some(strategy.to_string());
        self
    }

    pub fn critical(mut self, critical: bool) -> Self {
        self.critical = critical;
        self
    }

    pub fn with_extra(mut self, extra: serde_json::Value) -> Self {
        self.extra = extra;
        self
    }
}

/// A single diagnostic event, as sent to an external collector.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiagnosticEvent {
    Error {
        run_id: String,
        message: String,
        context: DiagnosticContext,
    },
    Breadcrumb {
        run_id: String,
        message: String,
        category: String,
        data: serde_json::Value,
    },
}

/// Receives diagnostic events. Implementations must not block or panic.
pub trait Observer: Send + Sync {
    fn report_error(&self, message: &str, context: &DiagnosticContext);
    fn add_breadcrumb(&self, message: &str, category: &str, data: serde_json::Value);
}

/// Create a random identifier for one invocation.
pub fn new_run_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Writes events to the `tracing` subscriber.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    run_id: String,
}

impl TracingObserver {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }
}

impl Observer for TracingObserver {
    fn report_error(&self, message: &str, context: &DiagnosticContext) {
        tracing::error!(
            run_id = %self.run_id,
            operation = %context.operation,
            category = context.category.as_deref().unwrap_or("-"),
            strategy = context.strategy.as_deref().unwrap_or("-"),
            critical = context.critical,
            "{message}"
        );
    }

    fn add_breadcrumb(&self, message: &str, category: &str, data: serde_json::Value) {
        tracing::debug!(run_id = %self.run_id, category, %data, "{message}");
    }
}

/// Forwards events to a collector endpoint, and to `tracing`.
///
/// Each POST is spawned onto the runtime and its result discarded.
#[derive(Debug, Clone)]
pub struct WebhookObserver {
    endpoint: String,
    client: reqwest::Client,
    local: TracingObserver,
    run_id: String,
}

impl WebhookObserver {
    pub fn new(endpoint: impl Into<String>, run_id: impl Into<String>) -> Self {
        let run_id = run_id.into();
        let client = reqwest::Client::builder()
            .timeout(WEBHOOK_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            endpoint: endpoint.into(),
            client,
            local: TracingObserver::new(run_id.clone()),
            run_id,
        }
    }

    fn send(&self, event: DiagnosticEvent) {
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        // Outside a runtime there is nowhere to run the POST; the tracing
        // record has already been written.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            handle.spawn(async move {
                let _ = client.post(&endpoint).json(&event).send().await;
            });
        }
    }
}

impl Observer for WebhookObserver {
    fn report_error(&self, message: &str, context: &DiagnosticContext) {
        self.local.report_error(message, context);
        self.send(DiagnosticEvent::Error {
            run_id: self.run_id.clone(),
            message: message.to_string(),
            context: context.clone(),
        });
    }

    fn add_breadcrumb(&self, message: &str, category: &str, data: serde_json::Value) {
        self.local.add_breadcrumb(message, category, data.clone());
        self.send(DiagnosticEvent::Breadcrumb {
            run_id: self.run_id.clone(),
            message: message.to_string(),
            category: category.to_string(),
            data,
        });
    }
}

/// Keeps every event in memory.
#[derive(Debug, Default)]
pub struct MemoryObserver {
    events: Mutex<Vec<DiagnosticEvent>>,
}

impl MemoryObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<DiagnosticEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    /// Contexts of all reported errors, in order.
    pub fn errors(&self) -> Vec<DiagnosticContext> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DiagnosticEvent::Error { context, .. } => Some(context),
                DiagnosticEvent::Breadcrumb { .. } => None,
            })
            .collect()
    }

    pub fn breadcrumb_count(&self) -> usize {
        self.events()
            .iter()
            .filter(|e| matches!(e, DiagnosticEvent::Breadcrumb { .. }))
            .count()
    }

    fn push(&self, event: DiagnosticEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

impl Observer for MemoryObserver {
    fn report_error(&self, message: &str, context: &DiagnosticContext) {
        self.push(DiagnosticEvent::Error {
            run_id: String::new(),
            message: message.to_string(),
            context: context.clone(),
        });
    }

    fn add_breadcrumb(&self, message: &str, category: &str, data: serde_json::Value) {
        self.push(DiagnosticEvent::Breadcrumb {
            run_id: String::new(),
            message: message.to_string(),
            category: category.to_string(),
            data,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_event_serializes_with_kind_tag() {
        let event = DiagnosticEvent::Error {
            run_id: "run-1".to_string(),
            message: "boom".to_string(),
            context: DiagnosticContext::new("fetch_threads")
                .with_category("network")
                .with_strategy("retry")
                .critical(true),
        };
        let json = serde_json::to_value(&event).expect("serialization should succeed");
        assert_eq!(json["kind"], "error");
        assert_eq!(json["context"]["operation"], "fetch_threads");
        assert_eq!(json["context"]["category"], "network");
        assert_eq!(json["context"]["critical"], true);
        assert!(json["context"].get("extra").is_none());
    }

    #[test]
    fn run_id_is_a_uuid() {
        uuid::Uuid::parse_str(&new_run_id()).expect("run_id should be valid UUID");
    }

    #[test]
    fn memory_observer_records_in_order() {
        let observer = MemoryObserver::new();
        observer.add_breadcrumb("page fetched", "pagination", serde_json::json!({"page": 1}));
        observer.report_error("failed", &DiagnosticContext::new("op"));
        assert_eq!(observer.events().len(), 2);
        assert_eq!(observer.breadcrumb_count(), 1);
        assert_eq!(observer.errors()[0].operation, "op");
    }

    #[tokio::test]
    async fn webhook_observer_does_not_panic_on_unreachable_endpoint() {
        let observer = WebhookObserver::new("http://127.0.0.1:9/diagnostics", new_run_id());
        observer.report_error("unreachable", &DiagnosticContext::new("op"));
        // Give the spawned task a moment to run
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    #[test]
    fn webhook_observer_outside_runtime_is_silent() {
        let observer = WebhookObserver::new("http://127.0.0.1:9/diagnostics", "run");
        observer.add_breadcrumb("no runtime", "test", serde_json::Value::Null);
    }
}

//! Dismissal of an identity's earlier change requests.

use serde::Serialize;
use tracing::{info, warn};

use crate::github::ReviewApi;
use crate::models::{PullRequestRef, ReviewState};
use crate::recovery::{BatchOptions, ErrorRecovery};

pub const DEFAULT_DISMISS_MESSAGE: &str =
    "Superseded by a newer review; the requested changes are no longer blocking.";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DismissalError {
    /// `None` when the failure happened before any review was targeted.
    pub review_id: Option<u64>,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DismissalReport {
    /// False only when a listing call failed, or every targeted dismissal did.
    pub success: bool,
    pub dismissed_count: usize,
    pub dismissed_review_ids: Vec<u64>,
    pub errors: Vec<DismissalError>,
}

impl DismissalReport {
    fn listing_failed(message: String) -> Self {
        Self {
            success: false,
            dismissed_count: 0,
            dismissed_review_ids: Vec::new(),
            errors: vec![DismissalError {
                review_id: None,
                message,
            }],
        }
    }
}

/// Dismiss every `CHANGES_REQUESTED` review left by the authenticated identity.
pub async fn dismiss_previous_change_requests(
    api: &dyn ReviewApi,
    recovery: &ErrorRecovery,
    pr: &PullRequestRef,
    message: &str,
) -> DismissalReport {
    let login = recovery
        .run("resolve authenticated identity", true, || api.authenticated_user())
        .await;
    match login {
        Ok(Some(login)) => dismiss_change_requests_by(api, recovery, pr, &login, message).await,
        Ok(None) => DismissalReport::listing_failed("authenticated identity unavailable".to_string()),
        Err(err) => DismissalReport::listing_failed(err.to_string()),
    }
}

/// Dismiss every `CHANGES_REQUESTED` review authored by `login`.
///
/// Each dismissal is attempted independently.
pub async fn dismiss_change_requests_by(
    api: &dyn ReviewApi,
    recovery: &ErrorRecovery,
    pr: &PullRequestRef,
    login: &str,
    message: &str,
) -> DismissalReport {
    let reviews = match recovery.run("list reviews", true, || api.list_reviews(pr)).await {
        Ok(Some(reviews)) => reviews,
        Ok(None) => return DismissalReport::listing_failed("review listing unavailable".to_string()),
        Err(err) => return DismissalReport::listing_failed(err.to_string()),
    };

    let targets: Vec<u64> = reviews
        .iter()
        .filter(|r| r.state == ReviewState::ChangesRequested && r.is_authored_by(login))
        .map(|r| r.id)
        .collect();

    if targets.is_empty() {
        return DismissalReport {
            success: true,
            dismissed_count: 0,
            dismissed_review_ids: Vec::new(),
            errors: Vec::new(),
        };
    }

    let outcome = recovery
        .run_batch(&targets, "dismiss review", BatchOptions::default(), |id| {
            let id = *id;
            async move { api.dismiss_review(pr, id, message).await }
        })
        .await;

    let (dismissed_review_ids, errors) = match outcome {
        Ok(outcome) => {
            let dismissed = targets
                .iter()
                .zip(&outcome.results)
                .filter(|(_, result)| result.is_some())
                .map(|(id, _)| *id)
                .collect::<Vec<_>>();
            let errors = outcome
                .errors
                .into_iter()
                .map(|e| DismissalError {
                    review_id: Some(e.item),
                    message: e.message,
                })
                .collect::<Vec<_>>();
            (dismissed, errors)
        }
        // Not reachable without fail_on_any_error, but keep the failure visible.
        Err(err) => (
            Vec::new(),
            vec![DismissalError {
                review_id: None,
                message: err.to_string(),
            }],
        ),
    };

    if errors.is_empty() {
        info!(%pr, count = dismissed_review_ids.len(), "dismissed previous change requests");
    } else {
        warn!(
            %pr,
            dismissed = dismissed_review_ids.len(),
            failed = errors.len(),
            "some change requests could not be dismissed"
        );
    }

    DismissalReport {
        success: !dismissed_review_ids.is_empty(),
        dismissed_count: dismissed_review_ids.len(),
        dismissed_review_ids,
        errors,
    }
}

//! Formal review submission and its follow-up operations.

pub mod dismiss;
pub mod submit;
pub mod window;

pub use dismiss::{DismissalReport, dismiss_change_requests_by, dismiss_previous_change_requests};
pub use submit::{ReviewSubmitter, SubmissionReport, SubmitError, SubmitRequest};
pub use window::{ReviewWindow, determine_window};

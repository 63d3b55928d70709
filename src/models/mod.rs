//! Shared types used across all modules.
//!
//! This module defines the data structures for reviews, threads,
//! comments and tracking metadata. Other modules import from here
//! rather than reaching into each other's internals.

pub mod metadata;
pub mod review;
pub mod thread;

pub use metadata::ReviewMetadata;
pub use review::{NewReview, PendingReview, PullRequest, PullRequestRef, Review, ReviewState, Verdict};
pub use thread::{
    DeduplicatedComment, FetchedThread, ResolutionSource, ReviewComment, ReviewThread,
    synthesized_thread_id,
};

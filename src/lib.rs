//! threadkeeper: review thread reconciliation and review submission
//! for GitHub pull requests (library crate).
//!
//! Re-exports public modules for integration tests and external use.

pub mod config;
pub mod constants;
pub mod env;
pub mod github;
pub mod models;
pub mod output;
pub mod recovery;
pub mod review;
pub mod security;
pub mod session;
pub mod telemetry;
pub mod threads;

//! Configuration loading and layering.
//!
//! Handles `.threadkeeper.toml` loading and environment variable
//! resolution. The result is built once at process entry and passed by
//! reference into everything else.

pub mod loader;

pub use loader::{
    BatchConfig, BreakerConfig, Config, ConfigError, GitHubConfig, PaginationConfig,
    SecretsConfig, TelemetryConfig,
};

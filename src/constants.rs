//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! and API defaults so a rename only requires changing this file.

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "threadkeeper";

/// Local config filename (e.g. `.threadkeeper.toml` in repo root).
pub const CONFIG_FILENAME: &str = ".threadkeeper.toml";

/// Directory name under `~/.config/` for global config.
pub const CONFIG_DIR: &str = "threadkeeper";

/// Sent as `User-Agent` on every API request.
pub const USER_AGENT: &str = concat!("threadkeeper/", env!("CARGO_PKG_VERSION"));

pub const DEFAULT_API_URL: &str = "https://api.github.com";
pub const DEFAULT_GRAPHQL_URL: &str = "https://api.github.com/graphql";

/// REST API version header value.
pub const GITHUB_API_VERSION: &str = "2022-11-28";

// ── Environment variable names ──────────────────────────────────────

pub const ENV_TOKEN: &str = "THREADKEEPER_TOKEN";
pub const ENV_GITHUB_TOKEN: &str = "GITHUB_TOKEN";
pub const ENV_REPOSITORY: &str = "GITHUB_REPOSITORY";
pub const ENV_API_URL: &str = "GITHUB_API_URL";
pub const ENV_GRAPHQL_URL: &str = "GITHUB_GRAPHQL_URL";
pub const ENV_MAX_CONCURRENT: &str = "THREADKEEPER_MAX_CONCURRENT";
pub const ENV_TELEMETRY_ENDPOINT: &str = "THREADKEEPER_TELEMETRY_ENDPOINT";
pub const ENV_SECRETS: &str = "THREADKEEPER_SECRETS";
/// Pull request number, when `--pr` is not given.
pub const ENV_PR_NUMBER: &str = "THREADKEEPER_PR";

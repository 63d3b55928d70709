//! Secret rule loading.
//!
//! Rules use the gitleaks TOML format. A small built-in set covers the
//! credentials most likely to end up pasted into review text; more can be
//! loaded from a file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::Deserialize;
use thiserror::Error;

/// Some gitleaks patterns use large bounded repetitions whose DFA exceeds
/// the default 10 MB limit.
const REGEX_SIZE_LIMIT: usize = 50 * 1024 * 1024;

const BUILTIN_RULES_TOML: &str = r#"
title = "threadkeeper built-in rules"

[[rules]]
id = "github-pat"
description = "GitHub personal access token"
regex = '''ghp_[0-9a-zA-Z]{36}'''
keywords = ["ghp_"]

[[rules]]
id = "github-fine-grained-pat"
description = "GitHub fine-grained personal access token"
regex = '''github_pat_[0-9a-zA-Z_]{82}'''
keywords = ["github_pat_"]

[[rules]]
id = "github-app-token"
description = "GitHub app installation or user-to-server token"
regex = '''(?:ghu|ghs)_[0-9a-zA-Z]{36}'''
keywords = ["ghu_", "ghs_"]

[[rules]]
id = "github-oauth"
description = "GitHub OAuth access token"
regex = '''gho_[0-9a-zA-Z]{36}'''
keywords = ["gho_"]

[[rules]]
id = "aws-access-token"
description = "AWS access key id"
regex = '''\b(?:A3T[A-Z0-9]|AKIA|ASIA|ABIA|ACCA)[A-Z0-9]{16}\b'''
keywords = ["akia", "asia", "abia", "acca", "a3t"]

[[rules]]
id = "slack-token"
description = "Slack bot, user or app token"
regex = '''xox[baprs]-[0-9]{10,13}-[0-9a-zA-Z-]{10,}'''
keywords = ["xoxb", "xoxa", "xoxp", "xoxr", "xoxs"]

[[rules]]
id = "private-key"
description = "PEM private key block"
regex = '''(?i)-----BEGIN[ A-Z0-9_-]{0,100}PRIVATE KEY(?: BLOCK)?-----[\s\S]*?-----END[ A-Z0-9_-]{0,100}PRIVATE KEY(?: BLOCK)?-----'''
keywords = ["-----begin"]

[[rules]]
id = "bearer-token"
description = "HTTP bearer credential"
regex = '''(?i)\bbearer\s+([a-z0-9\-._~+/]{20,}=*)'''
secretGroup = 1
entropy = 3.5
keywords = ["bearer"]

[[rules]]
id = "generic-api-key"
description = "Credential assigned to a key-like name"
regex = '''(?i)\b(?:api[_-]?key|secret|access[_-]?token|auth[_-]?token|password|passwd)\b["']?\s*[:=]\s*["']?([0-9a-z_\-./+=]{16,})'''
secretGroup = 1
entropy = 3.5
keywords = ["api_key", "api-key", "apikey", "secret", "token", "password", "passwd"]
[rules.allowlist]
regexes = ['''(?i)example''', '''(?i)^x{8,}$''', '''(?i)placeholder''']
"#;

#[derive(Error, Debug)]
pub enum RuleError {
    #[error("failed to read rules file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse rules from {origin}: {source}")]
    Parse {
        origin: String,
        source: toml::de::Error,
    },
}

/// A secret rule with its patterns compiled.
#[derive(Debug, Clone)]
pub struct SecretRule {
    pub id: String,
    pub description: String,
    pub regex: Regex,
    /// Lowercased; at least one must occur in the text for the rule to run.
    pub keywords: Vec<String>,
    /// Minimum Shannon entropy of the secret (0.0 to disable).
    pub entropy_threshold: f64,
    /// Capture group holding the secret; 0 means the whole match.
    pub secret_group: usize,
    /// A secret matching any of these is a false positive.
    pub allowlist: Vec<Regex>,
}

#[derive(Debug, Deserialize)]
struct GitleaksConfig {
    #[serde(default)]
    rules: Vec<GitleaksRule>,
    #[serde(flatten)]
    _extra: HashMap<String, toml::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GitleaksRule {
    id: String,
    #[serde(default)]
    description: String,
    /// Path-only rules have no pattern and are skipped.
    #[serde(default)]
    regex: Option<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    entropy: f64,
    #[serde(default)]
    secret_group: Option<usize>,
    #[serde(default)]
    allowlist: Option<GitleaksAllowlist>,
    /// gitleaks v8 also accepts `[[rules.allowlists]]`.
    #[serde(default)]
    allowlists: Vec<GitleaksAllowlist>,
}

#[derive(Debug, Deserialize)]
struct GitleaksAllowlist {
    #[serde(default)]
    regexes: Vec<String>,
    #[serde(flatten)]
    _extra: HashMap<String, toml::Value>,
}

fn compile(pattern: &str) -> Result<Regex, regex::Error> {
    regex::RegexBuilder::new(pattern)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
}

impl GitleaksRule {
    /// Compile the rule. Invalid patterns are logged and the rule skipped.
    fn compile(self) -> Option<SecretRule> {
        let pattern = self.regex?;
        let regex = match compile(&pattern) {
            Ok(re) => re,
            Err(e) => {
                tracing::warn!(rule = %self.id, "skipping secret rule with invalid regex: {e}");
                return None;
            }
        };

        let allowlist = self
            .allowlist
            .into_iter()
            .chain(self.allowlists)
            .flat_map(|a| a.regexes)
            .filter_map(|p| match compile(&p) {
                Ok(re) => Some(re),
                Err(e) => {
                    tracing::warn!(rule = %self.id, "skipping allowlist pattern: {e}");
                    None
                }
            })
            .collect();

        // A group the pattern doesn't have would never match; fall back to the whole match.
        let secret_group = self
            .secret_group
            .filter(|g| *g < regex.captures_len())
            .unwrap_or(0);

        Some(SecretRule {
            id: self.id,
            description: self.description,
            regex,
            keywords: self.keywords.iter().map(|k| k.to_lowercase()).collect(),
            entropy_threshold: self.entropy,
            secret_group,
            allowlist,
        })
    }
}

fn parse_rules(toml_text: &str, origin: &str) -> Result<Vec<SecretRule>, RuleError> {
    let config: GitleaksConfig = toml::from_str(toml_text).map_err(|source| RuleError::Parse {
        origin: origin.to_string(),
        source,
    })?;
    Ok(config.rules.into_iter().filter_map(GitleaksRule::compile).collect())
}

/// The built-in rule set.
pub fn builtin_rules() -> Result<Vec<SecretRule>, RuleError> {
    parse_rules(BUILTIN_RULES_TOML, "built-in rules")
}

/// Load additional rules from a gitleaks-format TOML file.
pub fn load_rules_from_file(path: &Path) -> Result<Vec<SecretRule>, RuleError> {
    let content = std::fs::read_to_string(path).map_err(|source| RuleError::ReadFile {
        path: path.to_path_buf(),
        source,
    })?;
    parse_rules(&content, &path.display().to_string())
}

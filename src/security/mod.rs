//! Credential redaction for review text.
//!
//! Bodies pass through a [`Sanitizer`] before they are posted, logged or
//! reported. Detected secrets are replaced by `[REDACTED:<rule-id>]`.

pub mod rules;
pub mod scanner;

use std::path::Path;
use std::sync::Arc;

use crate::config::SecretsConfig;

pub use rules::{RuleError, SecretRule};
pub use scanner::{SecretMatch, scan_content};

/// Strips credential-shaped substrings from text.
pub trait Sanitizer: Send + Sync {
    fn sanitize(&self, text: &str) -> String;
}

/// Leaves text untouched. Used when scanning is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughSanitizer;

impl Sanitizer for PassthroughSanitizer {
    fn sanitize(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Rule-based sanitizer.
#[derive(Debug, Clone)]
pub struct SecretSanitizer {
    rules: Vec<SecretRule>,
}

impl SecretSanitizer {
    pub fn new(rules: Vec<SecretRule>) -> Self {
        Self { rules }
    }

    /// The built-in rules, plus the configured rules file if any.
    pub fn from_config(config: &SecretsConfig, repo_root: &Path) -> Result<Self, RuleError> {
        let mut rules = rules::builtin_rules()?;
        if let Some(extra) = &config.additional_rules {
            let path = repo_root.join(extra);
            let loaded = rules::load_rules_from_file(&path)?;
            tracing::debug!(path = %path.display(), count = loaded.len(), "loaded additional secret rules");
            rules.extend(loaded);
        }
        Ok(Self::new(rules))
    }

    pub fn rule_count(&self) -> usize {
        self.rules.len()
    }
}

impl Sanitizer for SecretSanitizer {
    fn sanitize(&self, text: &str) -> String {
        let (redacted, matches) = redact(text, &self.rules);
        if !matches.is_empty() {
            let rule_ids: Vec<&str> = matches.iter().map(|m| m.rule_id.as_str()).collect();
            tracing::warn!(count = matches.len(), rules = ?rule_ids, "redacted secrets from text");
        }
        redacted
    }
}

/// Build the sanitizer the configuration asks for.
pub fn sanitizer_for(config: &SecretsConfig, repo_root: &Path) -> Result<Arc<dyn Sanitizer>, RuleError> {
    if !config.enabled {
        return Ok(Arc::new(PassthroughSanitizer));
    }
    Ok(Arc::new(SecretSanitizer::from_config(config, repo_root)?))
}

/// Replace every detected secret and return the matches that were applied.
///
/// Overlapping matches collapse into the earliest one.
pub fn redact(content: &str, rules: &[SecretRule]) -> (String, Vec<SecretMatch>) {
    let mut applied = Vec::new();
    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;

    for m in scan_content(content, rules) {
        if m.start < cursor {
            continue;
        }
        out.push_str(&content[cursor..m.start]);
        out.push_str(&format!("[REDACTED:{}]", m.rule_id));
        cursor = m.end;
        applied.push(m);
    }
    out.push_str(&content[cursor..]);

    (out, applied)
}

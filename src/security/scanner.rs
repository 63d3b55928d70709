//! Secret detection over free text.
//!
//! Each rule runs over the whole text (so multi-line keys match) once a
//! keyword prefilter passes. Candidates below the rule's entropy
//! threshold, or matching its allowlist, are dropped.

use super::rules::SecretRule;

/// A secret located in scanned text.
#[derive(Debug, Clone, PartialEq)]
pub struct SecretMatch {
    pub rule_id: String,
    /// 1-based line of the secret's first byte.
    pub line_number: u32,
    /// Byte range of the secret itself (the rule's secret group).
    pub start: usize,
    pub end: usize,
}

/// Shannon entropy in bits per byte.
///
/// Random tokens land well above 4; words and repeated filler sit lower.
pub fn shannon_entropy(s: &str) -> f64 {
    if s.is_empty() {
        return 0.0;
    }
    let mut freq = [0u32; 256];
    for &byte in s.as_bytes() {
        freq[byte as usize] += 1;
    }
    let len = s.len() as f64;
    freq.iter()
        .filter(|&&n| n > 0)
        .map(|&n| {
            let p = f64::from(n) / len;
            -p * p.log2()
        })
        .sum()
}

/// Find every secret in `content`, ordered by position.
pub fn scan_content(content: &str, rules: &[SecretRule]) -> Vec<SecretMatch> {
    let lowered = content.to_lowercase();
    let mut matches = Vec::new();

    for rule in rules {
        if !rule.keywords.is_empty() && !rule.keywords.iter().any(|k| lowered.contains(k.as_str())) {
            continue;
        }

        for caps in rule.regex.captures_iter(content) {
            let Some(secret) = caps.get(rule.secret_group) else {
                continue;
            };
            let text = secret.as_str();
            if rule.entropy_threshold > 0.0 && shannon_entropy(text) < rule.entropy_threshold {
                continue;
            }
            if rule.allowlist.iter().any(|re| re.is_match(text)) {
                continue;
            }
            matches.push(SecretMatch {
                rule_id: rule.id.clone(),
                line_number: line_of(content, secret.start()),
                start: secret.start(),
                end: secret.end(),
            });
        }
    }

    matches.sort_by_key(|m| (m.start, std::cmp::Reverse(m.end)));
    matches
}

fn line_of(content: &str, offset: usize) -> u32 {
    content[..offset].bytes().filter(|&b| b == b'\n').count() as u32 + 1
}

//! Corrective hints for failures surfaced to the user.

/// Known platform error phrases and the help shown for them.
/// Checked in order against the lowercased message.
const HINTS: &[(&[&str], &str)] = &[
    (
        &["insufficient permissions", "resource not accessible", "403"],
        "The token lacks permission for this operation. Check that it has \
         `pull-requests: write` (and `contents: read`) on the repository.",
    ),
    (
        &["could not resolve to a node", "invalid id", "invalid node id"],
        "A thread or review id was not recognised. It may belong to another \
         pull request or have been deleted; re-fetch threads and try again.",
    ),
    (
        &["one pending review"],
        "A pending review from this account already exists on the pull request. \
         Submit or delete it in the web UI, then retry.",
    ),
    (
        &["not found", "404"],
        "The repository, pull request or review was not found. Check the \
         repository slug and pull request number, and that the token can see it.",
    ),
    (
        &["unprocessable", "422"],
        "The platform rejected the request as invalid. Check that the review body \
         is non-empty for comment and request-changes verdicts, and that the \
         commit belongs to the pull request.",
    ),
];

/// Help text for an error message, if it matches a known phrase.
pub fn help_for(message: &str) -> Option<&'static str> {
    let message = message.to_lowercase();
    HINTS
        .iter()
        .find(|(needles, _)| needles.iter().any(|n| message.contains(n)))
        .map(|(_, help)| *help)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_known_phrases() {
        assert!(help_for("Resource not accessible by integration").unwrap().contains("permission"));
        assert!(help_for("Could not resolve to a node with the global id of 'x'").unwrap().contains("not recognised"));
        assert!(help_for("User can only have one pending review per pull request").unwrap().contains("pending review"));
        assert!(help_for("HTTP 404: Not Found").unwrap().contains("not found"));
        assert!(help_for("422 Unprocessable Entity").unwrap().contains("rejected"));
    }

    #[test]
    fn pending_conflict_takes_precedence_over_unprocessable() {
        let help = help_for("HTTP 422: User can only have one pending review per pull request").unwrap();
        assert!(help.contains("pending review"));
    }

    #[test]
    fn unknown_message_has_no_hint() {
        assert_eq!(help_for("something else"), None);
    }
}

//! Classification of operation failures as dead sessions.

use std::fmt::Display;

/// Decides whether an operation error means the resource's session is no
/// longer usable (invalid or expired token, 401/403, exhausted session).
///
/// Matching is a case-insensitive substring search over the error's
/// `Display` output.
#[derive(Debug, Clone, Default)]
pub struct SessionFailureClassifier {
    markers: Vec<String>,
}

impl SessionFailureClassifier {
    /// Build a classifier from a set of markers. Empty markers are ignored.
    pub fn new<I, S>(markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            markers: markers
                .into_iter()
                .map(|m| m.as_ref().trim().to_lowercase())
                .filter(|m| !m.is_empty())
                .collect(),
        }
    }

    /// The normalized markers
    pub fn markers(&self) -> &[String] {
        &self.markers
    }

    /// Whether `err` should invalidate the session it came from.
    pub fn is_session_failure<E: Display + ?Sized>(&self, err: &E) -> bool {
        if self.markers.is_empty() {
            return false;
        }
        let message = err.to_string().to_lowercase();
        self.markers.iter().any(|m| message.contains(m.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;
    use crate::config::DEFAULT_SESSION_MARKERS;

    fn classifier() -> SessionFailureClassifier {
        SessionFailureClassifier::new(DEFAULT_SESSION_MARKERS)
    }

    #[rstest]
    #[case("Token request failed: 401 Unauthorized")]
    #[case("upstream returned 403")]
    #[case("Failed to parse access token response")]
    #[case("Failed to extract LSD token from page")]
    #[case("Session exhausted even after refresh")]
    #[case("INVALID TOKEN")]
    #[case("request forbidden by upstream")]
    fn default_markers_match(#[case] message: &str) {
        assert!(classifier().is_session_failure(message));
    }

    #[rstest]
    #[case("connection reset by peer")]
    #[case("response too short to be useful")]
    #[case("500 Internal Server Error")]
    fn unrelated_errors_do_not_match(#[case] message: &str) {
        assert!(!classifier().is_session_failure(message));
    }

    #[test]
    fn custom_markers_replace_defaults() {
        let classifier = SessionFailureClassifier::new(["  Bad Cookie ", ""]);
        assert_eq!(classifier.markers(), ["bad cookie".to_string()]);
        assert!(classifier.is_session_failure("got a bad cookie"));
        assert!(!classifier.is_session_failure("401"));
    }

    #[test]
    fn no_markers_never_match() {
        let classifier = SessionFailureClassifier::new(Vec::<String>::new());
        assert!(!classifier.is_session_failure("session expired"));
    }

    #[test]
    fn matches_error_types_through_display() {
        let err = std::io::Error::other("access token expired");
        assert!(classifier().is_session_failure(&err));
    }
}

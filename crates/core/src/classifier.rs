//! Transient vs fatal error classification

use crate::error::ErrorSignature;

/// Signatures of failures worth retrying: timeouts, dropped connections,
/// protocol hiccups, crashed or closed automation targets.
pub const DEFAULT_RETRYABLE_ERRORS: &[&str] = &[
    "TimeoutError",
    "NetworkError",
    "ProtocolError",
    "Target closed",
    "Page crashed",
    "Navigation timeout",
];

/// True iff any signature is a substring of the error's name, message or type name
pub fn is_retryable<E, S>(error: &E, signatures: &[S]) -> bool
where
    E: ErrorSignature + ?Sized,
    S: AsRef<str>,
{
    let name = error.name();
    let message = error.message();
    let type_name = error.type_name();

    signatures.iter().any(|signature| {
        let signature: &str = signature.as_ref();
        name.contains(signature) || message.contains(signature) || type_name.contains(signature)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DriverError, ErrorDetails};

    #[test]
    fn test_default_signatures_match_transient_errors() {
        let transient = [
            DriverError::timeout("page.screenshot", 30000),
            DriverError::Network("connection reset".into()),
            DriverError::Protocol("Runtime.callFunctionOn".into()),
            DriverError::TargetClosed("browser has disconnected".into()),
            DriverError::PageCrashed("renderer gone".into()),
            DriverError::NavigationTimeout("30000ms".into()),
        ];
        for err in &transient {
            assert!(is_retryable(err, DEFAULT_RETRYABLE_ERRORS), "{:?}", err);
        }
    }

    #[test]
    fn test_logic_errors_are_fatal() {
        let err = DriverError::Assertion("expected 3 rows".into());
        assert!(!is_retryable(&err, DEFAULT_RETRYABLE_ERRORS));

        let err = DriverError::ElementNotFound("#missing".into());
        assert!(!is_retryable(&err, DEFAULT_RETRYABLE_ERRORS));
    }

    #[test]
    fn test_matches_message_substring() {
        let err = DriverError::other("Error", "locator.click: Target closed unexpectedly");
        assert!(is_retryable(&err, DEFAULT_RETRYABLE_ERRORS));
    }

    #[test]
    fn test_matches_type_name() {
        let err = DriverError::Assertion("boom".into());
        assert!(is_retryable(&err, &["DriverError"]));
        assert!(!is_retryable(&err, &["ErrorDetails"]));
    }

    #[test]
    fn test_empty_signatures_never_retry() {
        let err = DriverError::timeout("wait", 10);
        let none: [&str; 0] = [];
        assert!(!is_retryable(&err, &none));
    }

    #[test]
    fn test_classification_is_deterministic() {
        let err = ErrorDetails {
            name: "TimeoutError".into(),
            message: "waiting for selector".into(),
        };
        let signatures = vec!["TimeoutError".to_string()];
        let first = is_retryable(&err, &signatures);
        for _ in 0..10 {
            assert_eq!(is_retryable(&err, &signatures), first);
        }
        assert!(first);
    }
}

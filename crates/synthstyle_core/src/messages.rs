//! crates/synthstyle_core/src/messages.rs
//!
//! Maps internal errors onto the short messages shown to shoppers.

use crate::ports::PortError;

const DEFAULT_MESSAGE: &str = "An unexpected error occurred.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    UserNotFound,
    ProductNotFound,
    Network,
    Server,
    StorageUnavailable,
    PermissionDenied,
}

static USER_MESSAGES: &[(ErrorKind, &str)] = &[
    (
        ErrorKind::UserNotFound,
        "We couldn't find your account. Please try logging in again.",
    ),
    (
        ErrorKind::ProductNotFound,
        "The product you're looking for is no longer available.",
    ),
    (
        ErrorKind::Network,
        "Please check your internet connection and try again.",
    ),
    (
        ErrorKind::Server,
        "Something went wrong. Please try again later.",
    ),
    (
        ErrorKind::StorageUnavailable,
        "Extension storage is unavailable. Please reload the extension.",
    ),
    (
        ErrorKind::PermissionDenied,
        "Permission was denied. Please allow access and try again.",
    ),
];

pub fn classify(error: &PortError) -> Option<ErrorKind> {
    match error {
        PortError::NotFound(what) if what.starts_with("User") => Some(ErrorKind::UserNotFound),
        PortError::NotFound(what) if what.starts_with("Product") => {
            Some(ErrorKind::ProductNotFound)
        }
        PortError::Unavailable(_) | PortError::Timeout => Some(ErrorKind::Network),
        PortError::Unexpected(_) => Some(ErrorKind::Server),
        PortError::StorageUnavailable(_) => Some(ErrorKind::StorageUnavailable),
        PortError::Unauthorized => Some(ErrorKind::PermissionDenied),
        PortError::NotFound(_) | PortError::Invalid(_) => None,
    }
}

/// The shopper-facing text for `error`, falling back to a generic message.
pub fn user_message(error: &PortError) -> &'static str {
    classify(error)
        .and_then(|kind| {
            USER_MESSAGES
                .iter()
                .find(|(k, _)| *k == kind)
                .map(|(_, message)| *message)
        })
        .unwrap_or(DEFAULT_MESSAGE)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_errors_map_to_friendly_text() {
        assert_eq!(
            user_message(&PortError::NotFound("Product B0TEST not found".to_string())),
            "The product you're looking for is no longer available."
        );
        assert_eq!(
            user_message(&PortError::Timeout),
            "Please check your internet connection and try again."
        );
        assert_eq!(
            user_message(&PortError::StorageUnavailable("missing".to_string())),
            "Extension storage is unavailable. Please reload the extension."
        );
    }

    #[test]
    fn unmapped_errors_use_the_default() {
        assert_eq!(
            user_message(&PortError::Invalid("maxPrice".to_string())),
            "An unexpected error occurred."
        );
        assert_eq!(
            user_message(&PortError::NotFound("Session abc".to_string())),
            "An unexpected error occurred."
        );
    }

    #[test]
    fn every_kind_has_a_message() {
        for kind in [
            ErrorKind::UserNotFound,
            ErrorKind::ProductNotFound,
            ErrorKind::Network,
            ErrorKind::Server,
            ErrorKind::StorageUnavailable,
            ErrorKind::PermissionDenied,
        ] {
            assert!(USER_MESSAGES.iter().any(|(k, _)| *k == kind), "{:?}", kind);
        }
    }
}

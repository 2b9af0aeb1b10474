//! Error types for reconciliation.
//!
//! Errors are categorized so the engine can tell a missing item (routed to
//! the create path) apart from auth, network and validation failures, which
//! must never be mistaken for absence.

use std::fmt;
use std::path::PathBuf;

/// Result type alias for reconciliation operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Categories of reconciliation errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The item does not exist in the store.
    NotFound,
    /// The store rejected the credentials.
    Auth,
    /// Connectivity or transport failure (transient, retryable).
    Network,
    /// The request itself was malformed (bad manifest, bad connection settings).
    Validation,
    /// The item graph cannot be applied as-is (e.g. flow without an entry operation).
    Conflict,
    /// Other/unknown errors.
    Other,
}

impl ErrorCategory {
    /// Whether this error category is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Network)
    }

    /// Get a user-friendly description of this error category.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::NotFound => "Item not found",
            Self::Auth => "Authentication failed",
            Self::Network => "Network connectivity issue",
            Self::Validation => "Invalid request",
            Self::Conflict => "Item cannot be applied",
            Self::Other => "Unexpected error",
        }
    }

    /// Get actionable advice for resolving this error category.
    #[must_use]
    pub fn advice(&self) -> &'static str {
        match self {
            Self::NotFound => "Check the selection ids against the source instance",
            Self::Auth => "Check the static token configured for this instance",
            Self::Network => "Check the instance URL and your network connection",
            Self::Validation => "Check the manifest file or connection settings",
            Self::Conflict => "Fix the flow's operation graph on the source instance",
            Self::Other => "Check the error details for more information",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.description())
    }
}

/// Errors that can occur while reading, comparing or applying configuration.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The requested item does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The store rejected the token.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// HTTP request failed.
    #[error("HTTP request failed: {message}")]
    Http {
        /// Error message, taken from the response body when available.
        message: String,
        /// HTTP status code if available.
        status: Option<u16>,
    },

    /// Response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// Request validation failed before any work was done.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The store refused a write.
    #[error("{0}")]
    Rejected(String),

    /// A flow's operations have no single entry point.
    #[error("flow {flow} has no unique entry operation ({} candidates: {})", .candidates.len(), .candidates.join(", "))]
    NoUniqueEntry {
        /// Flow id.
        flow: String,
        /// Operations with no incoming resolve/reject reference.
        candidates: Vec<String>,
    },

    /// An operation points at an operation that is not part of the flow.
    #[error("operation {operation} {via}s to unknown operation {target}")]
    DanglingReference {
        /// Referencing operation id.
        operation: String,
        /// `resolve` or `reject`.
        via: &'static str,
        /// Missing target id.
        target: String,
    },

    /// Manifest file I/O.
    #[error("failed to access {}: {source}", .path.display())]
    Io {
        /// File path.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Get the category of this error.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::NotFound(_) => ErrorCategory::NotFound,
            Self::Unauthorized(_) => ErrorCategory::Auth,
            Self::Http { status, .. } => match status {
                None => ErrorCategory::Network,
                Some(code) if *code >= 500 => ErrorCategory::Network,
                Some(_) => ErrorCategory::Other,
            },
            Self::InvalidRequest(_) => ErrorCategory::Validation,
            Self::NoUniqueEntry { .. } | Self::DanglingReference { .. } => ErrorCategory::Conflict,
            Self::InvalidResponse(_) | Self::Rejected(_) | Self::Io { .. } => ErrorCategory::Other,
        }
    }

    /// Whether this error means the item is absent.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Whether this error is typically transient and worth retrying.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.category().is_retryable()
    }
}

impl From<ureq::Error> for Error {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(code) => Self::Http {
                message: format!("HTTP {code}"),
                status: Some(code),
            },
            other => Self::Http {
                message: other.to_string(),
                status: None,
            },
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::InvalidResponse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_category() {
        let err = Error::NotFound("collections/articles".into());
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_http_categories() {
        let transport = Error::Http {
            message: "connection refused".into(),
            status: None,
        };
        assert_eq!(transport.category(), ErrorCategory::Network);
        assert!(transport.is_retryable());

        let server = Error::Http {
            message: "bad gateway".into(),
            status: Some(502),
        };
        assert!(server.is_retryable());

        let client = Error::Http {
            message: "bad payload".into(),
            status: Some(400),
        };
        assert_eq!(client.category(), ErrorCategory::Other);
        assert!(!client.is_not_found());
    }

    #[test]
    fn test_auth_is_not_absence() {
        let err = Error::Unauthorized("invalid token".into());
        assert_eq!(err.category(), ErrorCategory::Auth);
        assert!(!err.is_not_found());
    }

    #[test]
    fn test_no_unique_entry_message() {
        let err = Error::NoUniqueEntry {
            flow: "f1".into(),
            candidates: vec!["a".into(), "b".into()],
        };
        assert_eq!(
            err.to_string(),
            "flow f1 has no unique entry operation (2 candidates: a, b)"
        );
        assert_eq!(err.category(), ErrorCategory::Conflict);
    }

    #[test]
    fn test_dangling_reference_message() {
        let err = Error::DanglingReference {
            operation: "a".into(),
            via: "resolve",
            target: "zz".into(),
        };
        assert_eq!(err.to_string(), "operation a resolves to unknown operation zz");
    }

    #[test]
    fn test_from_ureq_status() {
        let err: Error = ureq::Error::StatusCode(404).into();
        match err {
            Error::Http { status, .. } => assert_eq!(status, Some(404)),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_category_advice() {
        assert!(!ErrorCategory::Network.advice().is_empty());
        assert_eq!(ErrorCategory::Auth.to_string(), "Authentication failed");
    }
}

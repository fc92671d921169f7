//! Error types for the OneDrive database synchronisation crate.
//!
//! All public API surfaces in this crate return `SyncResult<T>`.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Convenience alias.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error codes for connector operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SyncErrorCode {
    /// OAuth2 / token error.
    AuthFailed,
    /// User, drive, or folder lookup found no match.
    ResolutionFailed,
    /// Non-success, non-retryable HTTP status during upload/download.
    TransferFailed,
    /// A bounded retry loop ran out of attempts.
    RetriesExhausted,
    /// Rate-limited (HTTP 429).
    RateLimited,
    /// Resource (file, folder, drive) not found.
    NotFound,
    /// Conflict (name collision, edit conflict).
    Conflict,
    /// Bad request / invalid parameter.
    InvalidRequest,
    /// Network / connectivity error.
    NetworkError,
    /// (De)serialization error.
    SerializationError,
    /// Local database or file-system error.
    LocalStore,
    /// Catch-all internal error.
    InternalError,
}

impl fmt::Display for SyncErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Structured error returned by every public function.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncError {
    pub code: SyncErrorCode,
    pub message: String,
    pub status: Option<u16>,
    pub graph_error_code: Option<String>,
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)?;
        if let Some(ref gc) = self.graph_error_code {
            write!(f, " (graph: {})", gc)?;
        }
        Ok(())
    }
}

impl std::error::Error for SyncError {}

impl SyncError {
    /// Create from a code + message.
    pub fn new(code: SyncErrorCode, msg: impl Into<String>) -> Self {
        Self {
            code,
            message: msg.into(),
            status: None,
            graph_error_code: None,
        }
    }

    /// Shortcut: auth failure.
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorCode::AuthFailed, msg)
    }

    /// Shortcut: resolution failure.
    pub fn resolution(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorCode::ResolutionFailed, msg)
    }

    /// Shortcut: transfer failure.
    pub fn transfer(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorCode::TransferFailed, msg)
    }

    /// Shortcut: a retry budget ran dry.
    pub fn retries_exhausted(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorCode::RetriesExhausted, msg)
    }

    /// Shortcut: not found.
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorCode::NotFound, msg)
    }

    /// Shortcut: network error.
    pub fn network(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorCode::NetworkError, msg)
    }

    /// Shortcut: local storage error.
    pub fn local_store(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorCode::LocalStore, msg)
    }

    /// Shortcut: internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(SyncErrorCode::InternalError, msg)
    }

    /// Whether a retry could plausibly change the outcome.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code,
            SyncErrorCode::RateLimited
                | SyncErrorCode::NetworkError
                | SyncErrorCode::InternalError
        )
    }

    /// Build an error from a Graph API error response body.
    pub fn from_graph_response(status: u16, body: &str) -> Self {
        let code = match status {
            401 | 403 => SyncErrorCode::AuthFailed,
            404 => SyncErrorCode::NotFound,
            409 => SyncErrorCode::Conflict,
            429 => SyncErrorCode::RateLimited,
            _ if status >= 500 => SyncErrorCode::InternalError,
            _ => SyncErrorCode::InvalidRequest,
        };

        let (graph_code, graph_msg) = Self::parse_graph_error_body(body);
        let message = graph_msg
            .unwrap_or_else(|| format!("Graph API error (HTTP {})", status));

        Self {
            code,
            message,
            status: Some(status),
            graph_error_code: graph_code,
        }
    }

    /// Try to extract the Graph error JSON envelope:
    /// `{ "error": { "code": "...", "message": "..." } }`.
    fn parse_graph_error_body(body: &str) -> (Option<String>, Option<String>) {
        let Ok(v) = serde_json::from_str::<serde_json::Value>(body) else {
            return (None, None);
        };
        let err = &v["error"];
        let code = err["code"].as_str().map(String::from);
        let msg = err["message"].as_str().map(String::from);
        (code, msg)
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::network(format!("Request timed out: {}", err))
        } else if err.is_connect() {
            Self::network(format!("Connection failed: {}", err))
        } else {
            Self::internal(format!("HTTP error: {}", err))
        }
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        Self::new(
            SyncErrorCode::SerializationError,
            format!("JSON error: {}", err),
        )
    }
}

impl From<sqlx::Error> for SyncError {
    fn from(err: sqlx::Error) -> Self {
        Self::local_store(format!("SQLite error: {}", err))
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        Self::local_store(format!("I/O error: {}", err))
    }
}

// ═══════════════════════════════════════════════════════════════════════
//  Tests
// ═══════════════════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_graph_response_404() {
        let body = r#"{"error":{"code":"itemNotFound","message":"Item does not exist"}}"#;
        let err = SyncError::from_graph_response(404, body);
        assert_eq!(err.code, SyncErrorCode::NotFound);
        assert_eq!(err.graph_error_code.as_deref(), Some("itemNotFound"));
        assert_eq!(err.message, "Item does not exist");
    }

    #[test]
    fn test_from_graph_response_401() {
        let err = SyncError::from_graph_response(401, "");
        assert_eq!(err.code, SyncErrorCode::AuthFailed);
        assert_eq!(err.status, Some(401));
    }

    #[test]
    fn test_from_graph_response_429() {
        let err = SyncError::from_graph_response(429, "");
        assert_eq!(err.code, SyncErrorCode::RateLimited);
        assert!(err.is_transient());
    }

    #[test]
    fn test_from_graph_response_500() {
        let err = SyncError::from_graph_response(502, "bad gateway");
        assert_eq!(err.code, SyncErrorCode::InternalError);
        assert!(err.is_transient());
    }

    #[test]
    fn test_not_found_not_transient() {
        let err = SyncError::not_found("missing");
        assert!(!err.is_transient());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError {
            code: SyncErrorCode::TransferFailed,
            message: "chunk rejected".into(),
            status: Some(416),
            graph_error_code: Some("invalidRange".into()),
        };
        let s = format!("{}", err);
        assert!(s.contains("chunk rejected"));
        assert!(s.contains("invalidRange"));
    }

    #[test]
    fn test_from_sqlx_error() {
        let err: SyncError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code, SyncErrorCode::LocalStore);
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::{NETWORK_ERROR_MESSAGE, SESSION_EXPIRED_MESSAGE};

/// Broad category of a failed operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Rejected locally before any network call
    Validation,
    /// Reported by the server (non-2xx response)
    Rejected,
    /// The server reported the bearer credential as expired
    SessionExpired,
    /// No response was received
    Network,
    /// Anything else, e.g. an unreadable success body
    Unexpected,
}

/// Uniform error shape returned by every remote operation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub message: String,
    /// Offending form field, when the error is field-scoped
    pub field: Option<String>,
    /// HTTP status, 0 when no response was received
    pub status: u16,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn validation(message: impl Into<String>, field: Option<&str>) -> Self {
        Self {
            kind: ErrorKind::Validation,
            message: message.into(),
            field: field.map(str::to_string),
            status: 0,
        }
    }

    pub fn rejected(status: u16, message: impl Into<String>, field: Option<String>) -> Self {
        Self {
            kind: ErrorKind::Rejected,
            message: message.into(),
            field,
            status,
        }
    }

    pub fn session_expired(status: u16) -> Self {
        Self {
            kind: ErrorKind::SessionExpired,
            message: SESSION_EXPIRED_MESSAGE.to_string(),
            field: None,
            status,
        }
    }

    pub fn network() -> Self {
        Self {
            kind: ErrorKind::Network,
            message: NETWORK_ERROR_MESSAGE.to_string(),
            field: None,
            status: 0,
        }
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self {
            kind: ErrorKind::Unexpected,
            message: message.into(),
            field: None,
            status: 0,
        }
    }

    /// Build the normalized error for a non-2xx response
    pub(crate) fn from_response(status: u16, body: &[u8]) -> Self {
        let body: ErrorBody = serde_json::from_slice(body).unwrap_or_default();

        if status == 401 && body.reports_expired_token() {
            return Self::session_expired(status);
        }

        let message = body
            .error
            .filter(|e| !e.is_empty())
            .unwrap_or_else(|| format!("HTTP {}", status));
        Self::rejected(status, message, body.field.filter(|f| !f.is_empty()))
    }

    /// Replace an empty message with an operation-specific fallback
    pub fn or_message(mut self, fallback: &str) -> Self {
        if self.message.trim().is_empty() {
            self.message = fallback.to_string();
        }
        self
    }

    pub fn is_field_scoped(&self) -> bool {
        self.field.is_some()
    }

    pub fn is_session_expired(&self) -> bool {
        self.kind == ErrorKind::SessionExpired
    }
}

/// Error body as sent by the server
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    error: Option<String>,
    field: Option<String>,
    token_expired: Option<bool>,
    code: Option<String>,
}

impl ErrorBody {
    fn reports_expired_token(&self) -> bool {
        self.token_expired.unwrap_or(false)
            || self.code.as_deref() == Some("TOKEN_EXPIRED")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_scoped_rejection() {
        let err = ApiError::from_response(
            409,
            br#"{"error":"Username already taken","field":"username"}"#,
        );
        assert_eq!(err.kind, ErrorKind::Rejected);
        assert_eq!(err.message, "Username already taken");
        assert_eq!(err.field.as_deref(), Some("username"));
        assert_eq!(err.status, 409);
        assert!(err.is_field_scoped());
    }

    #[test]
    fn test_missing_error_message_falls_back_to_status() {
        let err = ApiError::from_response(500, b"<html>oops</html>");
        assert_eq!(err.kind, ErrorKind::Rejected);
        assert_eq!(err.message, "HTTP 500");
        assert_eq!(err.field, None);
    }

    #[test]
    fn test_expired_token_is_distinguished() {
        let flagged = ApiError::from_response(401, br#"{"error":"jwt expired","tokenExpired":true}"#);
        assert!(flagged.is_session_expired());
        assert_eq!(flagged.message, SESSION_EXPIRED_MESSAGE);

        let coded = ApiError::from_response(401, br#"{"code":"TOKEN_EXPIRED"}"#);
        assert!(coded.is_session_expired());

        // A plain 401 is an ordinary credential rejection
        let plain = ApiError::from_response(401, br#"{"error":"Invalid credentials"}"#);
        assert_eq!(plain.kind, ErrorKind::Rejected);
        assert_eq!(plain.message, "Invalid credentials");
    }

    #[test]
    fn test_network_error_shape() {
        let err = ApiError::network();
        assert_eq!(err.status, 0);
        assert_eq!(err.field, None);
        assert_eq!(err.to_string(), NETWORK_ERROR_MESSAGE);
    }

    #[test]
    fn test_or_message() {
        let err = ApiError::rejected(400, "", None).or_message("Login failed");
        assert_eq!(err.message, "Login failed");

        let err = ApiError::rejected(400, "Bad input", None).or_message("Login failed");
        assert_eq!(err.message, "Bad input");
    }
}

//! API error types returned by the lab API client
//!
//! Every failed remote call is normalized into one closed [`ApiError`] shape.
//! The `Display` output is the human-readable message shown to the user: the
//! server's `detail` field verbatim when present, otherwise a fixed fallback.

use thiserror::Error;

/// Fallback message when a failed response carries no usable `detail`
pub const GENERIC_ERROR_MESSAGE: &str = "An unexpected error occurred";

/// Fallback for a 401 on a public endpoint (login, password reset)
pub const INVALID_CREDENTIALS_MESSAGE: &str = "Invalid credentials";

/// The request was sent but the configured timeout elapsed first
pub const TIMEOUT_MESSAGE: &str = "The server took too long to respond. Please try again.";

/// The server could not be reached at all
pub const CONNECT_MESSAGE: &str =
    "Could not connect to the server. Please check your connection and try again.";

/// Fallback for a 401 on an authenticated endpoint
pub const UNAUTHORIZED_MESSAGE: &str = "Unauthorized";

/// Errors that can occur when talking to the lab API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiError {
    /// 401 - bad credentials on a public endpoint, or an expired session
    #[error("{message}")]
    Unauthorized {
        message: String,
        /// True when the 401 came from a non-public endpoint and was broadcast
        session_expired: bool,
    },
    /// 403 - authenticated but not allowed (role mismatch, CSRF rejection)
    #[error("{message}")]
    Forbidden { message: String },
    /// 404
    #[error("{message}")]
    NotFound { message: String },
    /// 409 - e.g. email already registered
    #[error("{message}")]
    Conflict { message: String },
    /// 400 / 422 - request rejected by server-side validation
    #[error("{message}")]
    Validation { message: String },
    /// Any other non-2xx status
    #[error("{message}")]
    Http { status: u16, message: String },
    /// Connection refused, timeout, TLS failure
    #[error("{message}")]
    Network { message: String },
    /// 2xx response whose body did not match the expected shape
    #[error("{message}")]
    Parse { message: String },
}

impl ApiError {
    /// Map a non-2xx status and optional server `detail` to an error.
    ///
    /// `public_endpoint` selects the 401 fallback text and whether the 401
    /// counts as an expired session.
    pub fn from_status(status: u16, detail: Option<String>, public_endpoint: bool) -> Self {
        match status {
            401 => {
                let fallback = if public_endpoint {
                    INVALID_CREDENTIALS_MESSAGE
                } else {
                    UNAUTHORIZED_MESSAGE
                };
                ApiError::Unauthorized {
                    message: detail.unwrap_or_else(|| fallback.to_string()),
                    session_expired: !public_endpoint,
                }
            }
            403 => ApiError::Forbidden {
                message: detail.unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()),
            },
            404 => ApiError::NotFound {
                message: detail.unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()),
            },
            409 => ApiError::Conflict {
                message: detail.unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()),
            },
            400 | 422 => ApiError::Validation {
                message: detail.unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()),
            },
            _ => ApiError::Http {
                status,
                message: detail.unwrap_or_else(|| GENERIC_ERROR_MESSAGE.to_string()),
            },
        }
    }

    /// Create a network error
    pub fn network(message: impl Into<String>) -> Self {
        ApiError::Network {
            message: message.into(),
        }
    }

    /// Create a parse error
    pub fn parse(message: impl Into<String>) -> Self {
        ApiError::Parse {
            message: message.into(),
        }
    }

    /// The user-facing message
    pub fn message(&self) -> &str {
        match self {
            ApiError::Unauthorized { message, .. }
            | ApiError::Forbidden { message }
            | ApiError::NotFound { message }
            | ApiError::Conflict { message }
            | ApiError::Validation { message }
            | ApiError::Http { message, .. }
            | ApiError::Network { message }
            | ApiError::Parse { message } => message,
        }
    }

    /// HTTP status, when the error came from a response
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Unauthorized { .. } => Some(401),
            ApiError::Forbidden { .. } => Some(403),
            ApiError::NotFound { .. } => Some(404),
            ApiError::Conflict { .. } => Some(409),
            ApiError::Validation { .. } => Some(400),
            ApiError::Http { status, .. } => Some(*status),
            ApiError::Network { .. } | ApiError::Parse { .. } => None,
        }
    }

    /// Check if this error was a session expiry on an authenticated endpoint
    pub fn is_session_expired(&self) -> bool {
        matches!(
            self,
            ApiError::Unauthorized {
                session_expired: true,
                ..
            }
        )
    }
}

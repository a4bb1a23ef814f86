//! Error types for the xhs client.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, XhsError>;

/// Errors surfaced by the session and publish subsystem.
///
/// Transient topic-lookup failures never appear here - the resolver recovers
/// them locally by dropping the tag. Session-verification failures become an
/// `Expired` state transition instead of an error.
#[derive(Debug, Error)]
pub enum XhsError {
    /// No valid session. The caller must authenticate before retrying.
    #[error("not authenticated: log in before publishing")]
    NotAuthenticated,

    /// Browser-based signing failed on every attempt. Fatal to the calling
    /// operation; not retried further up the stack.
    #[error("request signing failed after {attempts} attempts")]
    SigningExhausted { attempts: u32 },

    /// The platform's API rejected the request.
    #[error("platform rejected request (code {code}): {msg}")]
    Platform { code: i64, msg: String },

    /// The platform answered but the response is missing an expected field.
    #[error("unexpected platform response: {0}")]
    UnexpectedResponse(String),

    /// Browser automation failed outside the signing script itself.
    #[error("browser automation error: {0}")]
    Browser(String),

    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

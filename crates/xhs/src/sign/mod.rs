//! Request signing for the platform's private API.
//!
//! Every outbound call must carry `x-s`/`x-t` header values computed by the
//! platform's own client-side script (`window._webmsxyw`). The only reliable
//! way to run that script is inside a real browser page, so signing is
//! modeled as a pluggable backend; [`BrowserSigner`] is the chromiumoxide
//! implementation.

mod browser;

pub use browser::{BrowserSigner, SignerConfig};

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde_json::Value;

use crate::error::{Result, XhsError};

/// One signing request.
///
/// `a1` is the anonymous device-identity cookie value and must be supplied
/// even when the call carries no payload.
#[derive(Debug, Clone)]
pub struct SignRequest {
    /// Target URI (path plus query), exactly as it will be requested.
    pub uri: String,
    /// JSON payload for POST calls, `None` for GETs.
    pub payload: Option<Value>,
    /// The `a1` device identity of the current session.
    pub a1: String,
}

/// Header values produced by the platform's signing script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeaders {
    pub x_s: String,
    pub x_t: String,
}

/// Computes signature headers for outbound API calls.
///
/// Implementations block the calling task until a signature is available or
/// every attempt has failed; callers must treat `sign` as blocking regardless
/// of how the backend executes internally.
#[async_trait]
pub trait SignatureBackend: Send + Sync {
    async fn sign(&self, request: &SignRequest) -> Result<SignatureHeaders>;
}

/// Run `attempt` up to `max_attempts` times, returning the first success.
///
/// Attempt failures are logged and retried immediately, with no backoff
/// between attempts. Exhaustion maps to [`XhsError::SigningExhausted`].
pub(crate) async fn sign_with_attempts<'a, F>(
    max_attempts: u32,
    mut attempt: F,
) -> Result<SignatureHeaders>
where
    F: FnMut(u32) -> BoxFuture<'a, Result<SignatureHeaders>>,
{
    for n in 1..=max_attempts {
        match attempt(n).await {
            Ok(headers) => return Ok(headers),
            Err(err) => {
                tracing::warn!(attempt = n, max_attempts, error = %err, "signing attempt failed, retrying");
            }
        }
    }
    Err(XhsError::SigningExhausted {
        attempts: max_attempts,
    })
}

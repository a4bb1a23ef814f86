//! Signed client for the Xiaohongshu private web API.
//!
//! This crate provides:
//! - Browser-based request signing via chromiumoxide (`sign`)
//! - Persistent-cookie session lifecycle (`session`)
//! - Rate-limited hashtag-to-topic resolution (`topics`)
//! - The publish orchestration state machine (`publish`)
//!
//! Every API call is signed: the platform's private endpoints reject requests
//! that do not carry the `x-s`/`x-t` header values computed by its own
//! client-side script, so the [`ApiClient`] asks a [`SignatureBackend`] for
//! those values before each request.

pub mod api;
pub mod error;
pub mod publish;
pub mod session;
pub mod sign;
pub mod topics;

// Re-export main types
pub use api::ApiClient;
pub use error::{Result, XhsError};
pub use publish::{PublishRequest, PublishResult, Publisher, PublisherConfig, Visibility};
pub use session::{SessionManager, SessionState, SessionStore};
pub use sign::{BrowserSigner, SignRequest, SignatureBackend, SignatureHeaders, SignerConfig};
pub use topics::{ResolverConfig, Topic, TopicResolution, TopicResolver};

//! Publish orchestration.
//!
//! One publish attempt walks a fixed sequence: verify the session, resolve
//! topics, assemble the final body, pause like a user finishing an edit, and
//! submit. Session failure is the only locally-handled error; everything the
//! submission call raises propagates unmodified.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use serde_json::Value;

use crate::api::ApiClient;
use crate::error::{Result, XhsError};
use crate::session::SessionManager;
use crate::topics::{jitter, TopicResolver};

/// Whether the note is visible to other users.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Private,
    Public,
}

impl Visibility {
    #[must_use]
    pub fn is_private(self) -> bool {
        matches!(self, Visibility::Private)
    }
}

/// One note to publish.
#[derive(Debug, Clone)]
pub struct PublishRequest {
    pub title: String,
    pub body: String,
    /// Cover and content images, in display order.
    pub images: Vec<PathBuf>,
    /// Raw delimiter-separated tag string; resolved to topics at publish time.
    pub tags: String,
    pub visibility: Visibility,
}

/// The platform's response to a successful submission, returned verbatim.
#[derive(Debug)]
pub struct PublishResult {
    pub response: Value,
}

impl PublishResult {
    /// Note id, when the platform response carries one.
    #[must_use]
    pub fn note_id(&self) -> Option<&str> {
        self.response.get("id").and_then(Value::as_str)
    }
}

/// Configuration for [`Publisher`].
#[derive(Debug, Clone)]
pub struct PublisherConfig {
    /// Pause range before submission, emulating a user finishing an edit.
    /// This delay is intentional pacing, not an incidental cost.
    pub edit_pause_min: Duration,
    pub edit_pause_max: Duration,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            edit_pause_min: Duration::from_secs(2),
            edit_pause_max: Duration::from_secs(3),
        }
    }
}

/// Top-level publish state machine.
pub struct Publisher {
    session: SessionManager,
    resolver: TopicResolver,
    api: Arc<ApiClient>,
    config: PublisherConfig,
}

impl Publisher {
    #[must_use]
    pub fn new(session: SessionManager, resolver: TopicResolver, api: Arc<ApiClient>) -> Self {
        Self::with_config(session, resolver, api, PublisherConfig::default())
    }

    #[must_use]
    pub fn with_config(
        session: SessionManager,
        resolver: TopicResolver,
        api: Arc<ApiClient>,
        config: PublisherConfig,
    ) -> Self {
        Self {
            session,
            resolver,
            api,
            config,
        }
    }

    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    /// Run one publish attempt.
    ///
    /// The session is re-verified synchronously up front - an `Authenticated`
    /// label alone is not trusted - and failure aborts before any topic
    /// lookup or signing happens. Submission errors are not retried here.
    pub async fn publish(&mut self, request: PublishRequest) -> Result<PublishResult> {
        if !self.session.verify().await {
            return Err(XhsError::NotAuthenticated);
        }

        tracing::info!(tags = %request.tags, "resolving topics");
        let resolution = self.resolver.resolve(&request.tags).await;
        if !resolution.topics.is_empty() {
            tracing::info!(
                matched = resolution.topics.len(),
                discarded = resolution.discarded,
                "matched topics"
            );
        }

        let body = format!("{}{}", request.body, resolution.suffix);

        tokio::time::sleep(jitter(self.config.edit_pause_min, self.config.edit_pause_max)).await;

        let post_time = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let response = self
            .api
            .create_image_note(
                &request.title,
                &body,
                &request.images,
                &resolution.topics,
                request.visibility.is_private(),
                &post_time,
            )
            .await?;

        tracing::info!(title = %request.title, images = request.images.len(), "note submitted");
        Ok(PublishResult { response })
    }
}

//! Hashtag-to-topic resolution.
//!
//! Free-text tags become platform topic entities through the suggest-topic
//! lookup. Resolution is deliberately best-effort: a failed lookup drops that
//! tag and moves on, and lookups are paced with a random pause so a publish
//! attempt does not look like a burst of automated requests.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// A platform-recognized topic entity.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct Topic {
    pub id: String,
    pub name: String,
    /// Always `"topic"` on the wire.
    #[serde(rename = "type")]
    pub kind: String,
    pub link: String,
}

/// Raw suggestion as returned by the topic search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TopicSuggestion {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub link: String,
}

/// Source of topic suggestions. Implemented by [`crate::ApiClient`]; tests
/// substitute a stub.
#[async_trait]
pub trait SuggestTopics: Send + Sync {
    async fn suggest_topic(&self, keyword: &str) -> Result<Vec<TopicSuggestion>>;
}

/// Configuration for [`TopicResolver`].
#[derive(Debug, Clone)]
pub struct ResolverConfig {
    /// Tags are truncated to this count before any network call; the cap
    /// exists to bound API request volume per publish attempt.
    pub max_topics: usize,
    /// Pause range between consecutive lookups (none before the first).
    pub pause_min: Duration,
    pub pause_max: Duration,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            max_topics: 3,
            pause_min: Duration::from_secs(1),
            pause_max: Duration::from_secs(2),
        }
    }
}

/// Outcome of resolving a tag string.
///
/// `discarded` counts tags dropped to a failed or empty lookup; zero resolved
/// topics is a valid outcome, not an error.
#[derive(Debug, Default)]
pub struct TopicResolution {
    pub topics: Vec<Topic>,
    /// Ready-to-append inline-topic markup, prefixed with a newline; empty
    /// when nothing resolved.
    pub suffix: String,
    pub discarded: usize,
}

/// Resolves free-text tags into platform topics, tolerating partial failure.
pub struct TopicResolver {
    lookup: Arc<dyn SuggestTopics>,
    config: ResolverConfig,
}

impl TopicResolver {
    #[must_use]
    pub fn new(lookup: Arc<dyn SuggestTopics>) -> Self {
        Self::with_config(lookup, ResolverConfig::default())
    }

    #[must_use]
    pub fn with_config(lookup: Arc<dyn SuggestTopics>, config: ResolverConfig) -> Self {
        Self { lookup, config }
    }

    /// Resolve a delimiter-separated tag string into at most
    /// `config.max_topics` topics, preserving first-seen order.
    pub async fn resolve(&self, tags: &str) -> TopicResolution {
        let candidates = normalize_tags(tags, self.config.max_topics);

        let mut topics = Vec::new();
        let mut discarded = 0;
        for (i, tag) in candidates.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(jitter(self.config.pause_min, self.config.pause_max)).await;
            }

            match self.lookup.suggest_topic(tag).await {
                Ok(suggestions) => match suggestions.into_iter().next() {
                    Some(suggestion) => topics.push(Topic {
                        id: suggestion.id,
                        name: suggestion.name,
                        kind: "topic".to_string(),
                        link: suggestion.link,
                    }),
                    None => {
                        discarded += 1;
                        tracing::debug!(tag, "no topic suggestion, skipping tag");
                    }
                },
                Err(err) => {
                    // One bad tag must not fail the whole resolution.
                    discarded += 1;
                    tracing::warn!(tag, error = %err, "topic lookup failed, skipping tag");
                }
            }
        }

        let suffix = topic_suffix(&topics);
        TopicResolution {
            topics,
            suffix,
            discarded,
        }
    }
}

/// Split a raw tag string on full-width and half-width delimiters, trim,
/// drop empties, and truncate to `max` entries.
fn normalize_tags(tags: &str, max: usize) -> Vec<String> {
    tags.replace('#', "")
        .replace(['，', '、'], ",")
        .split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .take(max)
        .collect()
}

/// Build the inline-topic markup suffix appended to the note body.
fn topic_suffix(topics: &[Topic]) -> String {
    if topics.is_empty() {
        return String::new();
    }
    let parts: Vec<String> = topics
        .iter()
        .map(|topic| format!("#{}[话题]#", topic.name))
        .collect();
    format!("\n{}", parts.join(" "))
}

/// Uniform random duration in `[min, max]`.
pub(crate) fn jitter(min: Duration, max: Duration) -> Duration {
    use rand::Rng;
    if max <= min {
        return min;
    }
    let span = (max - min).as_secs_f64();
    min + Duration::from_secs_f64(rand::thread_rng().gen_range(0.0..span))
}

//! Web search via the Tavily API.
//!
//! Search is strictly best-effort grounding for content generation: every
//! failure path collapses to an empty context string and the pipeline writes
//! the post without it.

use anyhow::Result;
use serde::Deserialize;
use serde_json::{json, Value};

const DEFAULT_SEARCH_BASE: &str = "https://api.tavily.com";
const MAX_CONTEXT_SOURCES: usize = 6;
const SNIPPET_CHARS: usize = 300;

#[derive(Debug, Clone, Deserialize)]
struct SearchHit {
    #[serde(default)]
    title: String,
    #[serde(default)]
    content: String,
    #[serde(default)]
    url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

/// Tavily search client.
pub struct SearchClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl SearchClient {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, DEFAULT_SEARCH_BASE)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        })
    }

    /// Run one search query and return the raw response.
    pub async fn search(
        &self,
        query: &str,
        max_results: usize,
        search_depth: &str,
    ) -> Result<Value> {
        let payload = json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": max_results,
            "search_depth": search_depth,
            "include_answer": true,
        });
        let response = self
            .http
            .post(format!("{}/search", self.base_url))
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }

    /// Search the theme from two angles and format the merged results as a
    /// grounding block for the content prompt. Returns an empty string when
    /// nothing usable came back; never an error.
    pub async fn search_for_context(&self, theme: &str) -> String {
        let queries = [
            format!("{theme} 真实评价 具体地址"),
            format!("{theme} 推荐 2024 2025"),
        ];

        let mut hits: Vec<SearchHit> = Vec::new();
        let mut seen_urls = Vec::new();
        for query in &queries {
            match self.search(query, 3, "advanced").await {
                Ok(raw) => {
                    let parsed: SearchResponse = match serde_json::from_value(raw) {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            tracing::warn!(error = %err, "unparseable search response");
                            continue;
                        }
                    };
                    for hit in parsed.results {
                        if !seen_urls.contains(&hit.url) {
                            seen_urls.push(hit.url.clone());
                            hits.push(hit);
                        }
                    }
                }
                Err(err) => {
                    tracing::warn!(query, error = %err, "search query failed");
                }
            }
        }

        format_context(&hits)
    }
}

/// Render hits into the numbered source block the content prompt embeds.
fn format_context(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return String::new();
    }

    let mut parts = vec![
        "⚠️ 重要：以下是联网搜索到的【真实数据】，请务必基于这些真实信息创作内容：".to_string(),
        String::new(),
    ];
    for (i, hit) in hits.iter().take(MAX_CONTEXT_SOURCES).enumerate() {
        let snippet: String = hit.content.chars().take(SNIPPET_CHARS).collect();
        parts.push(format!("【来源{}】{}", i + 1, source_host(&hit.url)));
        parts.push(format!("标题: {}", hit.title));
        parts.push(format!("内容: {snippet}"));
        parts.push(format!("链接: {}", hit.url));
        parts.push(String::new());
    }
    parts.join("\n")
}

/// Host part of a URL, used as the source label.
fn source_host(url: &str) -> &str {
    url.splitn(3, '/').nth(2).map_or("未知来源", |rest| {
        rest.split('/').next().unwrap_or("未知来源")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn hit(title: &str, content: &str, url: &str) -> SearchHit {
        SearchHit {
            title: title.to_string(),
            content: content.to_string(),
            url: url.to_string(),
        }
    }

    #[test]
    fn formats_numbered_sources_with_host_labels() {
        let hits = vec![
            hit("探店", "环境不错", "https://www.example.com/post/1"),
            hit("测评", "值得一去", "https://blog.example.org/2"),
        ];
        let context = format_context(&hits);

        assert!(context.contains("【来源1】www.example.com"));
        assert!(context.contains("【来源2】blog.example.org"));
        assert!(context.contains("标题: 探店"));
        assert!(context.contains("链接: https://blog.example.org/2"));
    }

    #[test]
    fn empty_hits_format_to_empty_string() {
        assert_eq!(format_context(&[]), "");
    }

    #[test]
    fn long_snippets_truncate_on_character_boundaries() {
        let long = "好".repeat(400);
        let hits = vec![hit("t", &long, "https://a.example/x")];
        let context = format_context(&hits);
        assert!(context.contains(&"好".repeat(300)));
        assert!(!context.contains(&"好".repeat(301)));
    }

    #[test]
    fn source_host_handles_malformed_urls() {
        assert_eq!(source_host("https://www.example.com/a/b"), "www.example.com");
        assert_eq!(source_host("not a url"), "未知来源");
    }

    #[tokio::test]
    async fn context_merges_queries_and_dedupes_urls() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "results": [
                    { "title": "a", "content": "c1", "url": "https://x.example/1" },
                    { "title": "b", "content": "c2", "url": "https://x.example/2" }
                ]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = SearchClient::with_base_url("key", server.uri()).unwrap();
        let context = client.search_for_context("咖啡").await;

        // Both queries answered the same two urls; each appears once.
        assert!(context.contains("【来源1】"));
        assert!(context.contains("【来源2】"));
        assert!(!context.contains("【来源3】"));
    }

    #[tokio::test]
    async fn failed_searches_yield_empty_context() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/search"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let client = SearchClient::with_base_url("key", server.uri()).unwrap();
        assert_eq!(client.search_for_context("咖啡").await, "");
    }
}

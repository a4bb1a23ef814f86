//! Chat client for any OpenAI-compatible completion API.
//!
//! Structured output goes through forced function calling; models that answer
//! with plain JSON text instead of a tool call are handled by a parse
//! fallback. A short conversation history is kept so refinement requests see
//! the post they are refining.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

const MAX_TOKENS: u32 = 4096;
const TEMPERATURE: f64 = 0.7;

#[derive(Debug, Clone, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

/// One tool invocation requested by the model.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub name: String,
    pub arguments: Value,
}

/// Parsed model reply: free text, tool calls, or both.
#[derive(Debug)]
pub struct ChatOutcome {
    pub content: Option<String>,
    pub tool_calls: Vec<ToolCall>,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<RawToolCall>,
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    function: RawFunction,
}

#[derive(Debug, Deserialize)]
struct RawFunction {
    name: String,
    /// JSON-encoded argument object, as the wire format specifies.
    arguments: String,
}

/// Client for an OpenAI-compatible `/chat/completions` endpoint.
pub struct LlmClient {
    http: reqwest::Client,
    model: String,
    base_url: String,
    api_key: String,
    history: Vec<ChatMessage>,
}

impl LlmClient {
    pub fn new(
        model: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()?;
        Ok(Self {
            http,
            model: model.into(),
            base_url: base_url.into(),
            api_key: api_key.into(),
            history: Vec::new(),
        })
    }

    /// Send one chat turn. `tools`/`tool_choice` are forwarded verbatim when
    /// present. The turn is appended to the conversation history.
    pub async fn chat(
        &mut self,
        user_message: &str,
        system_prompt: Option<&str>,
        tools: Option<Value>,
        tool_choice: Option<Value>,
    ) -> Result<ChatOutcome> {
        let mut messages = Vec::new();
        if let Some(system) = system_prompt {
            messages.push(json!({ "role": "system", "content": system }));
        }
        for msg in &self.history {
            messages.push(json!({ "role": msg.role, "content": msg.content }));
        }
        messages.push(json!({ "role": "user", "content": user_message }));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": TEMPERATURE,
            "max_tokens": MAX_TOKENS,
        });
        if let Some(tools) = tools {
            body["tools"] = tools;
            if let Some(choice) = tool_choice {
                body["tool_choice"] = choice;
            }
        }

        tracing::debug!(model = %self.model, "chat request");
        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()
            .context("chat completion request failed")?;

        let parsed: ChatResponse = response.json().await?;
        let choice = parsed
            .choices
            .into_iter()
            .next()
            .context("chat completion returned no choices")?;

        let mut tool_calls = Vec::new();
        for call in choice.message.tool_calls {
            let arguments: Value = serde_json::from_str(&call.function.arguments)
                .with_context(|| format!("tool call `{}` carried invalid JSON", call.function.name))?;
            tool_calls.push(ToolCall {
                name: call.function.name,
                arguments,
            });
        }

        self.history.push(ChatMessage {
            role: "user",
            content: user_message.to_string(),
        });
        if let Some(content) = &choice.message.content {
            if !content.is_empty() {
                self.history.push(ChatMessage {
                    role: "assistant",
                    content: content.clone(),
                });
            }
        }
        if self.history.last().map(|m| m.role) != Some("assistant") {
            if let Some(call) = tool_calls.first() {
                // A tool-only reply still needs an assistant turn in the
                // history, or the next request would show two user turns.
                self.history.push(ChatMessage {
                    role: "assistant",
                    content: call.arguments.to_string(),
                });
            }
        }

        Ok(ChatOutcome {
            content: choice.message.content,
            tool_calls,
        })
    }

    /// Force a function call and return its arguments.
    ///
    /// Models that ignore the forced tool choice and emit the JSON object as
    /// plain message content are accepted too.
    pub async fn chat_with_function(
        &mut self,
        user_message: &str,
        system_prompt: &str,
        function_name: &str,
        function_schema: Value,
    ) -> Result<Value> {
        let tools = json!([{
            "type": "function",
            "function": {
                "name": function_name,
                "description": function_schema["description"],
                "parameters": function_schema["parameters"],
            }
        }]);
        let tool_choice = json!({
            "type": "function",
            "function": { "name": function_name },
        });

        let outcome = self
            .chat(user_message, Some(system_prompt), Some(tools), Some(tool_choice))
            .await?;

        if let Some(call) = outcome.tool_calls.into_iter().next() {
            return Ok(call.arguments);
        }
        if let Some(content) = outcome.content {
            if let Ok(value) = serde_json::from_str::<Value>(&content) {
                return Ok(value);
            }
        }
        bail!("model returned no structured output for `{function_name}`")
    }

    /// Plain chat, returning only the text content.
    pub async fn simple_chat(
        &mut self,
        user_message: &str,
        system_prompt: Option<&str>,
    ) -> Result<String> {
        let outcome = self.chat(user_message, system_prompt, None, None).await?;
        Ok(outcome.content.unwrap_or_default())
    }

    /// Drop the conversation history, keeping the last `keep_last` exchanges.
    pub fn clear_history(&mut self, keep_last: usize) {
        if keep_last == 0 {
            self.history.clear();
        } else {
            let keep = (keep_last * 2).min(self.history.len());
            self.history.drain(..self.history.len() - keep);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn schema() -> Value {
        json!({
            "description": "test function",
            "parameters": {
                "type": "object",
                "properties": { "标题": { "type": "string" } },
                "required": ["标题"]
            }
        })
    }

    #[tokio::test]
    async fn returns_tool_call_arguments() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": {
                        "content": null,
                        "tool_calls": [{
                            "id": "call_1",
                            "type": "function",
                            "function": {
                                "name": "xhs_creator",
                                "arguments": "{\"标题\": \"今日份快乐\"}"
                            }
                        }]
                    },
                    "finish_reason": "tool_calls"
                }]
            })))
            .mount(&server)
            .await;

        let mut llm = LlmClient::new("test-model", server.uri(), "key").unwrap();
        let args = llm
            .chat_with_function("主题：快乐", "system", "xhs_creator", schema())
            .await
            .unwrap();

        assert_eq!(args["标题"], "今日份快乐");
    }

    #[tokio::test]
    async fn falls_back_to_json_in_message_content() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": { "content": "{\"标题\": \"备用路径\"}" },
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let mut llm = LlmClient::new("test-model", server.uri(), "key").unwrap();
        let args = llm
            .chat_with_function("主题", "system", "xhs_creator", schema())
            .await
            .unwrap();

        assert_eq!(args["标题"], "备用路径");
    }

    #[tokio::test]
    async fn unstructured_reply_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": { "content": "好的，我来帮你写。" },
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let mut llm = LlmClient::new("test-model", server.uri(), "key").unwrap();
        let result = llm
            .chat_with_function("主题", "system", "xhs_creator", schema())
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn history_accumulates_user_and_assistant_turns() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "choices": [{
                    "message": { "content": "回复" },
                    "finish_reason": "stop"
                }]
            })))
            .mount(&server)
            .await;

        let mut llm = LlmClient::new("test-model", server.uri(), "key").unwrap();
        llm.simple_chat("第一问", None).await.unwrap();
        llm.simple_chat("第二问", None).await.unwrap();
        assert_eq!(llm.history.len(), 4);

        llm.clear_history(1);
        assert_eq!(llm.history.len(), 2);

        llm.clear_history(0);
        assert!(llm.history.is_empty());
    }
}

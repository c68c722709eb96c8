//! Anthropic Messages API client

use crate::config::ProviderConfig;
use crate::error::Result;
use crate::llm_client::{LlmClient, ModelRequest, ModelResponse};
use crate::message::{Message, ToolInvocation};
use crate::providers::{endpoint, ensure_success, ModelProvider};
use crate::types::TokenUsage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

const ANTHROPIC_VERSION: &str = "2023-06-01";

/// Anthropic API client
pub struct AnthropicClient {
    client: Client,
    config: ProviderConfig,
}

impl AnthropicClient {
    /// Create a new Anthropic client with the given configuration
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_request(&self, request: &ModelRequest) -> MessagesRequest {
        let mut messages: Vec<WireMessage> = Vec::new();

        for message in request.dialogue() {
            let (role, blocks) = match message {
                Message::User { content } => ("user", vec![Block::text(content)]),
                Message::Assistant { content, tool_calls } => {
                    let mut blocks = Vec::new();
                    if !content.is_empty() {
                        blocks.push(Block::text(content));
                    }
                    blocks.extend(tool_calls.iter().map(|call| Block::ToolUse {
                        id: call.id.clone(),
                        name: call.name.clone(),
                        input: call.arguments.clone(),
                    }));
                    ("assistant", blocks)
                }
                Message::Tool {
                    content,
                    tool_call_id,
                    is_error,
                    ..
                } => (
                    "user",
                    vec![Block::ToolResult {
                        tool_use_id: tool_call_id.clone(),
                        content: content.clone(),
                        is_error: *is_error,
                    }],
                ),
                Message::System { .. } => continue,
            };

            if blocks.is_empty() {
                continue;
            }

            // Roles must alternate, so consecutive same-role turns share one message.
            match messages.last_mut() {
                Some(last) if last.role == role => last.content.extend(blocks),
                _ => messages.push(WireMessage {
                    role,
                    content: blocks,
                }),
            }
        }

        let tools = request
            .tools
            .iter()
            .map(|tool| WireTool {
                name: tool.name.clone(),
                description: tool.description.clone(),
                input_schema: tool.parameters.clone(),
            })
            .collect();

        MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            system: request.system_instruction(),
            messages,
            tools,
        }
    }
}

#[async_trait]
impl LlmClient for AnthropicClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse> {
        let url = endpoint(&self.config.base_url, "v1/messages");
        let body = self.build_request(&request);

        let response = self
            .client
            .post(&url)
            .header("x-api-key", self.config.api_key())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(ModelProvider::Anthropic, response).await?;

        let reply: MessagesResponse = response.json().await?;
        Ok(reply.into_model_response())
    }

    fn provider(&self) -> &str {
        ModelProvider::Anthropic.as_str()
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<WireMessage>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<WireTool>,
}

#[derive(Debug, Serialize)]
struct WireMessage {
    role: &'static str,
    content: Vec<Block>,
}

#[derive(Debug, Serialize)]
struct WireTool {
    name: String,
    description: String,
    input_schema: Value,
}

/// Content block, shared by requests and responses
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Block {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        input: Value,
    },
    ToolResult {
        tool_use_id: String,
        content: String,
        #[serde(default, skip_serializing_if = "std::ops::Not::not")]
        is_error: bool,
    },
    #[serde(other)]
    Other,
}

impl Block {
    fn text(text: &str) -> Self {
        Self::Text {
            text: text.to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<Block>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    input_tokens: u64,
    output_tokens: u64,
}

impl MessagesResponse {
    fn into_model_response(self) -> ModelResponse {
        let mut text = Vec::new();
        let mut tool_calls = Vec::new();

        for block in self.content {
            match block {
                Block::Text { text: part } => text.push(part),
                Block::ToolUse { id, name, input } => {
                    tool_calls.push(ToolInvocation::new(id, name, input))
                }
                Block::ToolResult { .. } | Block::Other => {}
            }
        }

        ModelResponse {
            message: Message::assistant_with_tools(text.join("\n"), tool_calls),
            usage: self
                .usage
                .map(|usage| TokenUsage::new(usage.input_tokens, usage.output_tokens))
                .unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::ToolDefinition;
    use serde_json::json;
    use url::Url;

    fn client_for(server: &mockito::ServerGuard) -> AnthropicClient {
        let config = ProviderConfig::new(ModelProvider::Anthropic, "sk-ant-test")
            .with_base_url(Url::parse(&server.url()).unwrap())
            .with_model("claude-test");
        AnthropicClient::new(config).unwrap()
    }

    #[test]
    fn test_tool_results_are_merged_into_one_user_turn() {
        let config = ProviderConfig::new(ModelProvider::Anthropic, "k");
        let client = AnthropicClient::new(config).unwrap();
        let request = ModelRequest::new(vec![
            Message::system("math only"),
            Message::user("Calculate 15 + 25 and then multiply by 3"),
            Message::assistant_with_tools(
                "Working on it",
                vec![
                    ToolInvocation::new("t1", "add", json!({"a": 15, "b": 25})),
                    ToolInvocation::new("t2", "multiply", json!({"a": 40, "b": 3})),
                ],
            ),
            Message::tool("40", "t1", "add"),
            Message::tool_error("boom", "t2", "multiply"),
        ]);

        let wire = serde_json::to_value(client.build_request(&request)).unwrap();

        assert_eq!(wire["system"], "math only");
        let messages = wire["messages"].as_array().unwrap();
        assert_eq!(messages.len(), 3);
        assert_eq!(messages[1]["content"][1]["type"], "tool_use");
        assert_eq!(messages[2]["role"], "user");
        assert_eq!(
            messages[2]["content"],
            json!([
                {"type": "tool_result", "tool_use_id": "t1", "content": "40"},
                {"type": "tool_result", "tool_use_id": "t2", "content": "boom", "is_error": true}
            ])
        );
        assert!(wire.get("tools").is_none());
    }

    #[tokio::test]
    async fn test_complete_reads_text_and_tool_use() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v1/messages")
            .match_header("x-api-key", "sk-ant-test")
            .match_header("anthropic-version", ANTHROPIC_VERSION)
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "claude-test",
                "tools": [{"name": "web_search", "input_schema": {"type": "object"}}]
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "id": "msg_1",
                    "type": "message",
                    "role": "assistant",
                    "content": [
                        {"type": "thinking", "thinking": "hmm"},
                        {"type": "text", "text": "Let me search."},
                        {"type": "tool_use", "id": "toolu_1", "name": "web_search", "input": {"query": "mayor of NYC"}}
                    ],
                    "stop_reason": "tool_use",
                    "usage": {"input_tokens": 20, "output_tokens": 9}
                })
                .to_string(),
            )
            .create_async()
            .await;

        let request = ModelRequest::new(vec![Message::user("Who is the mayor of NYC?")])
            .with_tools(vec![ToolDefinition {
                name: "web_search".to_string(),
                description: "Search the web".to_string(),
                parameters: json!({"type": "object"}),
            }]);

        let response = client_for(&server).complete(request).await.unwrap();
        mock.assert_async().await;

        assert_eq!(response.message.content(), "Let me search.");
        assert_eq!(
            response.message.tool_calls(),
            &[ToolInvocation::new("toolu_1", "web_search", json!({"query": "mayor of NYC"}))]
        );
        assert_eq!(response.usage, TokenUsage::new(20, 9));
    }
}

//! OpenAI Chat Completions client

use crate::config::ProviderConfig;
use crate::error::{Error, Result};
use crate::llm_client::{LlmClient, ModelRequest, ModelResponse, ToolDefinition};
use crate::message::{Message, ToolInvocation};
use crate::providers::{endpoint, ensure_success, ModelProvider};
use crate::types::TokenUsage;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

/// OpenAI API client
pub struct OpenAiClient {
    /// HTTP client
    client: Client,
    /// Configuration
    config: ProviderConfig,
}

impl OpenAiClient {
    /// Create a new OpenAI client with the given configuration
    pub fn new(config: ProviderConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { client, config })
    }

    /// Get the configuration
    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    fn build_request(&self, request: &ModelRequest) -> ChatRequest {
        let messages = request.messages.iter().map(ChatMessage::from).collect();

        let tools = if request.tools.is_empty() {
            None
        } else {
            Some(request.tools.iter().map(ChatTool::from).collect())
        };

        ChatRequest {
            model: self.config.model.clone(),
            messages,
            temperature: Some(self.config.temperature),
            max_tokens: Some(self.config.max_tokens),
            tools,
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse> {
        let url = endpoint(&self.config.base_url, "chat/completions");
        let body = self.build_request(&request);

        let response = self
            .client
            .post(&url)
            .bearer_auth(self.config.api_key())
            .json(&body)
            .send()
            .await?;
        let response = ensure_success(ModelProvider::OpenAi, response).await?;

        let completion: ChatResponse = response.json().await?;
        completion.into_model_response()
    }

    fn provider(&self) -> &str {
        ModelProvider::OpenAi.as_str()
    }

    fn model(&self) -> &str {
        &self.config.model
    }
}

/// Chat completion request body
#[derive(Debug, Clone, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    tools: Option<Vec<ChatTool>>,
}

/// Message in the chat wire format
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    #[serde(default)]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_calls: Option<Vec<ChatToolCall>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_call_id: Option<String>,
}

impl From<&Message> for ChatMessage {
    fn from(message: &Message) -> Self {
        let tool_calls = if message.has_pending_tool_calls() {
            Some(message.tool_calls().iter().map(ChatToolCall::from).collect())
        } else {
            None
        };
        let tool_call_id = match message {
            Message::Tool { tool_call_id, .. } => Some(tool_call_id.clone()),
            _ => None,
        };

        Self {
            role: message.role().as_str().to_string(),
            content: Some(message.content().to_string()),
            tool_calls,
            tool_call_id,
        }
    }
}

/// Tool definition for function calling
#[derive(Debug, Clone, Serialize)]
struct ChatTool {
    #[serde(rename = "type")]
    tool_type: &'static str,
    function: FunctionDefinition,
}

#[derive(Debug, Clone, Serialize)]
struct FunctionDefinition {
    name: String,
    description: String,
    parameters: serde_json::Value,
}

impl From<&ToolDefinition> for ChatTool {
    fn from(tool: &ToolDefinition) -> Self {
        Self {
            tool_type: "function",
            function: FunctionDefinition {
                name: tool.name.clone(),
                description: tool.description.clone(),
                parameters: tool.parameters.clone(),
            },
        }
    }
}

/// Tool call from the assistant
#[derive(Debug, Clone, Serialize, Deserialize)]
struct ChatToolCall {
    id: String,
    #[serde(rename = "type", default = "function_type")]
    tool_type: String,
    function: FunctionCall,
}

fn function_type() -> String {
    "function".to_string()
}

/// Function call details; arguments travel as a JSON string
#[derive(Debug, Clone, Serialize, Deserialize)]
struct FunctionCall {
    name: String,
    arguments: String,
}

impl From<&ToolInvocation> for ChatToolCall {
    fn from(call: &ToolInvocation) -> Self {
        Self {
            id: call.id.clone(),
            tool_type: function_type(),
            function: FunctionCall {
                name: call.name.clone(),
                arguments: call.arguments.to_string(),
            },
        }
    }
}

impl From<ChatToolCall> for ToolInvocation {
    fn from(call: ChatToolCall) -> Self {
        let arguments = serde_json::from_str(&call.function.arguments)
            .unwrap_or(serde_json::Value::String(call.function.arguments));
        ToolInvocation::new(call.id, call.function.name, arguments)
    }
}

/// Chat completion response
#[derive(Debug, Clone, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Clone, Deserialize)]
struct Choice {
    message: ChatMessage,
}

#[derive(Debug, Clone, Deserialize)]
struct Usage {
    prompt_tokens: u64,
    completion_tokens: u64,
}

impl ChatResponse {
    fn into_model_response(self) -> Result<ModelResponse> {
        let usage = self
            .usage
            .map(|usage| TokenUsage::new(usage.prompt_tokens, usage.completion_tokens))
            .unwrap_or_default();

        let choice = self
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::malformed(ModelProvider::OpenAi.as_str(), "no choices"))?;

        let tool_calls = choice
            .message
            .tool_calls
            .unwrap_or_default()
            .into_iter()
            .map(ToolInvocation::from)
            .collect();

        Ok(ModelResponse {
            message: Message::assistant_with_tools(
                choice.message.content.unwrap_or_default(),
                tool_calls,
            ),
            usage,
        })
    }
}

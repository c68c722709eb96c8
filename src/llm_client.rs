//! Provider-neutral LLM client trait

use crate::error::Result;
use crate::message::Message;
use crate::types::TokenUsage;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A tool the model is allowed to request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Tool name, as the model must spell it
    pub name: String,
    /// Description for function calling
    pub description: String,
    /// JSON Schema of the arguments object
    pub parameters: Value,
}

/// One model invocation
#[derive(Debug, Clone, Default)]
pub struct ModelRequest {
    /// Messages in order; system instructions come first
    pub messages: Vec<Message>,
    /// Tools offered to the model
    pub tools: Vec<ToolDefinition>,
}

impl ModelRequest {
    /// Create a request from messages
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            tools: Vec::new(),
        }
    }

    /// Set the tools
    pub fn with_tools(mut self, tools: Vec<ToolDefinition>) -> Self {
        self.tools = tools;
        self
    }

    /// Concatenated text of all system messages
    pub fn system_instruction(&self) -> Option<String> {
        let parts: Vec<&str> = self
            .messages
            .iter()
            .filter(|message| matches!(message, Message::System { .. }))
            .map(Message::content)
            .collect();

        if parts.is_empty() {
            None
        } else {
            Some(parts.join("\n\n"))
        }
    }

    /// Non-system messages in order
    pub fn dialogue(&self) -> impl Iterator<Item = &Message> {
        self.messages
            .iter()
            .filter(|message| !matches!(message, Message::System { .. }))
    }
}

/// Result of one model invocation
#[derive(Debug, Clone)]
pub struct ModelResponse {
    /// Always an assistant message
    pub message: Message,
    /// Token usage reported by the provider
    pub usage: TokenUsage,
}

/// Unified trait for the hosted model backends
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Send a completion request
    async fn complete(&self, request: ModelRequest) -> Result<ModelResponse>;

    /// Provider selector, for logging
    fn provider(&self) -> &str;

    /// Model identifier used for completions
    fn model(&self) -> &str;
}

//! Role-specialised agents
//!
//! An agent step is a single model call: the role instruction goes first,
//! then the whole conversation, and only the role's tools are offered. The
//! reply is appended as exactly one assistant message. The instruction is
//! never written into the conversation.

use crate::classifier::RoutingDecision;
use crate::error::{Error, Result};
use crate::llm_client::{LlmClient, ModelRequest};
use crate::message::{Conversation, Message};
use crate::tools::{SearchBackend, ToolSet};
use crate::types::TokenUsage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;

const MATH_INSTRUCTION: &str = "You are a math agent specialized in numerical calculations. \
Use the math tools available to perform accurate calculations. \
Show your work step by step and provide clear final answers.";

const RESEARCH_INSTRUCTION: &str = "You are a research agent specialized in web search and information gathering. \
Use the search tools available to find current, accurate information. \
Provide detailed answers with sources when possible.";

/// Specialisation of an agent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    /// Arithmetic with the math tools
    Math,
    /// Information lookup with the search tool
    Research,
}

impl AgentRole {
    /// Node name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Math => "math_agent",
            Self::Research => "research_agent",
        }
    }

    /// Built-in instruction for the role
    pub fn default_instruction(&self) -> &'static str {
        match self {
            Self::Math => MATH_INSTRUCTION,
            Self::Research => RESEARCH_INSTRUCTION,
        }
    }

    /// Role selected by a routing decision, if any
    pub fn from_decision(decision: RoutingDecision) -> Option<Self> {
        match decision {
            RoutingDecision::MathAgent => Some(Self::Math),
            RoutingDecision::ResearchAgent => Some(Self::Research),
            RoutingDecision::End => None,
        }
    }
}

impl fmt::Display for AgentRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Agent structure
#[derive(Debug, Clone)]
pub struct Agent {
    /// Specialisation
    pub role: AgentRole,
    /// Human-readable name for tracing and debugging
    pub name: String,
    /// Instruction prepended to every model call
    pub instruction: String,
    /// Tools this agent may request
    pub tools: ToolSet,
}

impl Agent {
    /// Create a new agent builder
    pub fn builder() -> AgentBuilder {
        AgentBuilder::new()
    }

    /// Math agent with the standard arithmetic tools
    pub fn math() -> Self {
        Self {
            role: AgentRole::Math,
            name: AgentRole::Math.as_str().to_string(),
            instruction: MATH_INSTRUCTION.to_string(),
            tools: ToolSet::math(),
        }
    }

    /// Research agent with the web-search tool over `backend`
    pub fn research(backend: Arc<dyn SearchBackend>) -> Self {
        Self {
            role: AgentRole::Research,
            name: AgentRole::Research.as_str().to_string(),
            instruction: RESEARCH_INSTRUCTION.to_string(),
            tools: ToolSet::research(backend),
        }
    }

    /// Messages sent to the model for this conversation
    pub fn prompt(&self, conversation: &Conversation) -> Vec<Message> {
        std::iter::once(Message::system(&self.instruction))
            .chain(conversation.iter().cloned())
            .collect()
    }

    /// Run one agent step and append the reply to the conversation
    pub async fn run(
        &self,
        conversation: &mut Conversation,
        client: &dyn LlmClient,
    ) -> Result<TokenUsage> {
        let request =
            ModelRequest::new(self.prompt(conversation)).with_tools(self.tools.definitions());

        tracing::debug!(
            agent = %self.name,
            provider = client.provider(),
            model = client.model(),
            messages = request.messages.len(),
            tools = ?self.tools.names(),
            "Invoking model"
        );

        let started = Instant::now();
        let response = client.complete(request).await?;

        if !matches!(response.message, Message::Assistant { .. }) {
            return Err(Error::malformed(
                client.provider(),
                format!("expected an assistant message, got {}", response.message.role()),
            ));
        }

        tracing::info!(
            agent = %self.name,
            provider = client.provider(),
            tool_calls = response.message.tool_calls().len(),
            total_tokens = response.usage.total_tokens,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Agent step complete"
        );

        conversation.push(response.message);
        Ok(response.usage)
    }
}

/// Agent builder
#[derive(Debug, Default)]
pub struct AgentBuilder {
    role: Option<AgentRole>,
    name: Option<String>,
    instruction: Option<String>,
    tools: Option<ToolSet>,
}

impl AgentBuilder {
    /// Create a new agent builder
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the role
    pub fn role(mut self, role: AgentRole) -> Self {
        self.role = Some(role);
        self
    }

    /// Set the agent name
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Override the role instruction
    pub fn instruction(mut self, instruction: impl Into<String>) -> Self {
        self.instruction = Some(instruction.into());
        self
    }

    /// Set the tool allow-list
    pub fn tools(mut self, tools: ToolSet) -> Self {
        self.tools = Some(tools);
        self
    }

    /// Build the agent
    pub fn build(self) -> Result<Agent> {
        let role = self.role.ok_or_else(|| Error::config("Agent role is required"))?;
        let tools = match (self.tools, role) {
            (Some(tools), _) => tools,
            (None, AgentRole::Math) => ToolSet::math(),
            (None, AgentRole::Research) => {
                return Err(Error::config(
                    "Research agent needs a tool set with a search backend",
                ))
            }
        };

        Ok(Agent {
            role,
            name: self.name.unwrap_or_else(|| role.as_str().to_string()),
            instruction: self
                .instruction
                .unwrap_or_else(|| role.default_instruction().to_string()),
            tools,
        })
    }
}

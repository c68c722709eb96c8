//! # Agent Router
//!
//! A small multi-agent request router. Each conversation is classified by
//! keyword and pattern heuristics, handed to a math or research agent, and
//! the agent may call the tools on its allow-list before answering.
//!
//! ## Features
//!
//! - **Heuristic routing**: keyword and arithmetic-pattern intent classifier
//! - **Specialised agents**: calculator tools for math, grounded web search for research
//! - **Explicit state machine**: classify, agent and tool states with a step bound
//! - **Provider-neutral**: Anthropic, OpenAI and Gemini behind one [`LlmClient`] trait
//! - **Traceable**: structured `tracing` events and a per-request [`RunTrace`]
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use agent_router::{Conversation, RequestConfig, RouterConfig, Supervisor};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     // Reads ANTHROPIC_API_KEY / OPENAI_API_KEY / GOOGLE_API_KEY
//!     let config = RouterConfig::from_env()?;
//!     let supervisor = Supervisor::from_config(&config)?;
//!
//!     let output = supervisor
//!         .invoke(
//!             Conversation::from_user("Calculate 15 + 25 and then multiply by 3"),
//!             &RequestConfig::with_provider("anthropic"),
//!         )
//!         .await?;
//!
//!     println!("{:?} -> {:?}", output.route, output.answer());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod agent;
pub mod classifier;
pub mod config;
pub mod error;
pub mod executor;
pub mod llm_client;
pub mod message;
pub mod providers;
pub mod supervisor;
pub mod telemetry;
pub mod tools;
pub mod trace;
pub mod types;

// Re-exports for convenience
pub use agent::{Agent, AgentBuilder, AgentRole};
pub use classifier::{IntentClassifier, RoutingDecision, RoutingMode, RoutingPolicy, TieBreak};
pub use config::{ProviderConfig, RequestConfig, RouterConfig, SearchConfig};
pub use error::{Error, Result};
pub use executor::ToolExecutor;
pub use llm_client::{LlmClient, ModelRequest, ModelResponse, ToolDefinition};
pub use message::{Conversation, Message, Role, ToolInvocation};
pub use providers::{
    AnthropicClient, GoogleClient, GoogleSearch, ModelProvider, OpenAiClient, ProviderRegistry,
};
pub use supervisor::{next_state, RouterOutput, State, Supervisor, SupervisorBuilder};
pub use tools::{SearchBackend, Tool, ToolContext, ToolOutput, ToolSet};
pub use trace::{RunTrace, StepKind, StepRecord};
pub use types::{RequestId, TokenUsage};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::classifier::{RoutingDecision, RoutingMode, RoutingPolicy};
    pub use crate::config::{RequestConfig, RouterConfig};
    pub use crate::error::{Error, Result};
    pub use crate::llm_client::LlmClient;
    pub use crate::message::{Conversation, Message};
    pub use crate::supervisor::{RouterOutput, Supervisor};
    pub use crate::tools::{SearchBackend, Tool};
    pub use crate::types::*;
}

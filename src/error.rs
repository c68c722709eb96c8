//! Error types for the agent router

use thiserror::Error;

/// Result type alias for router operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the agent router
#[derive(Debug, Error)]
pub enum Error {
    /// A model provider answered with a non-success status
    #[error("{provider} API error (status {status}): {message}")]
    Provider {
        /// Provider selector (e.g. "anthropic")
        provider: String,
        /// HTTP status code
        status: u16,
        /// Response body or summary
        message: String,
    },

    /// A model provider answered successfully but the payload was unusable
    #[error("{provider} returned an unusable response: {message}")]
    MalformedResponse {
        /// Provider selector
        provider: String,
        /// What was wrong with it
        message: String,
    },

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML configuration parse error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Tool execution error
    #[error("Tool execution error: {tool}: {message}")]
    ToolExecution {
        /// Name of the failing tool
        tool: String,
        /// What went wrong
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Maximum supervisor steps exceeded
    #[error("Maximum supervisor steps exceeded: {0}")]
    MaxStepsExceeded(u32),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a provider error
    pub fn provider(provider: impl Into<String>, status: u16, message: impl Into<String>) -> Self {
        Self::Provider {
            provider: provider.into(),
            status,
            message: message.into(),
        }
    }

    /// Create a malformed-response error
    pub fn malformed(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedResponse {
            provider: provider.into(),
            message: message.into(),
        }
    }

    /// Create a tool execution error
    pub fn tool_execution(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ToolExecution {
            tool: tool.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create an invalid input error
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create an other error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }

    /// Whether this error came from talking to a model provider
    pub fn is_provider_failure(&self) -> bool {
        matches!(
            self,
            Self::Provider { .. } | Self::MalformedResponse { .. } | Self::Http(_)
        )
    }
}

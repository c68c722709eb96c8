//! Hosted model providers
//!
//! One [`LlmClient`] implementation per provider, plus the registry that
//! turns a per-request selector string into a client.

pub mod anthropic;
pub mod google;
pub mod openai;

pub use anthropic::AnthropicClient;
pub use google::{GoogleClient, GoogleSearch};
pub use openai::OpenAiClient;

use crate::config::RouterConfig;
use crate::error::{Error, Result};
use crate::llm_client::LlmClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use url::Url;

/// Supported model providers
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Anthropic Messages API
    Anthropic,
    /// OpenAI Chat Completions API
    #[serde(rename = "openai")]
    OpenAi,
    /// Google Gemini API
    #[default]
    Google,
}

impl ModelProvider {
    /// All providers
    pub const ALL: [ModelProvider; 3] = [Self::Anthropic, Self::OpenAi, Self::Google];

    /// Selector string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anthropic => "anthropic",
            Self::OpenAi => "openai",
            Self::Google => "google",
        }
    }

    /// Resolve a selector, falling back to `default` when it is not recognized
    pub fn from_selector(selector: Option<&str>, default: ModelProvider) -> Self {
        match selector {
            None => default,
            Some(name) => name.parse().unwrap_or_else(|_| {
                tracing::warn!(
                    selector = name,
                    fallback = default.as_str(),
                    "Unrecognized model provider, using default"
                );
                default
            }),
        }
    }

    /// Environment variable holding the API key
    pub fn api_key_env(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC_API_KEY",
            Self::OpenAi => "OPENAI_API_KEY",
            Self::Google => "GOOGLE_API_KEY",
        }
    }

    /// Prefix for the other provider environment variables
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Self::Anthropic => "ANTHROPIC",
            Self::OpenAi => "OPENAI",
            Self::Google => "GOOGLE",
        }
    }

    /// Default model identifier
    pub fn default_model(&self) -> &'static str {
        match self {
            Self::Anthropic => presets::CLAUDE_SONNET,
            Self::OpenAi => presets::GPT4O,
            Self::Google => presets::GEMINI_FLASH,
        }
    }

    /// Default API base URL
    pub fn default_base_url(&self) -> Url {
        let url = match self {
            Self::Anthropic => "https://api.anthropic.com",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Google => "https://generativelanguage.googleapis.com",
        };
        Url::parse(url).expect("valid provider URL")
    }
}

impl fmt::Display for ModelProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelProvider {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "anthropic" => Ok(Self::Anthropic),
            "openai" => Ok(Self::OpenAi),
            "google" => Ok(Self::Google),
            other => Err(Error::config(format!("unknown model provider '{}'", other))),
        }
    }
}

/// Recommended model identifiers
pub mod presets {
    /// Claude Sonnet
    pub const CLAUDE_SONNET: &str = "claude-sonnet-4-20250514";

    /// GPT-4o
    pub const GPT4O: &str = "gpt-4o";

    /// Gemini Flash, also used for grounded search
    pub const GEMINI_FLASH: &str = "gemini-2.5-flash";
}

/// Clients keyed by provider
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<ModelProvider, Arc<dyn LlmClient>>,
    default_provider: ModelProvider,
}

impl ProviderRegistry {
    /// Create an empty registry
    pub fn new(default_provider: ModelProvider) -> Self {
        Self {
            clients: HashMap::new(),
            default_provider,
        }
    }

    /// Build a client for every configured provider
    pub fn from_config(config: &RouterConfig) -> Result<Self> {
        let mut registry = Self::new(config.resolved_default_provider());

        if let Some(settings) = &config.anthropic {
            registry.register(
                ModelProvider::Anthropic,
                Arc::new(AnthropicClient::new(settings.clone())?),
            );
        }
        if let Some(settings) = &config.openai {
            registry.register(
                ModelProvider::OpenAi,
                Arc::new(OpenAiClient::new(settings.clone())?),
            );
        }
        if let Some(settings) = &config.google {
            registry.register(
                ModelProvider::Google,
                Arc::new(GoogleClient::new(settings.clone())?),
            );
        }

        Ok(registry)
    }

    /// Register (or replace) the client for a provider
    pub fn register(&mut self, provider: ModelProvider, client: Arc<dyn LlmClient>) {
        self.clients.insert(provider, client);
    }

    /// Register a client, builder style
    pub fn with_client(mut self, provider: ModelProvider, client: Arc<dyn LlmClient>) -> Self {
        self.register(provider, client);
        self
    }

    /// Provider used when the request does not name a known one
    pub fn default_provider(&self) -> ModelProvider {
        self.default_provider
    }

    /// Providers with a registered client
    pub fn providers(&self) -> Vec<ModelProvider> {
        ModelProvider::ALL
            .into_iter()
            .filter(|provider| self.clients.contains_key(provider))
            .collect()
    }

    /// Resolve a per-request selector to a client
    pub fn select(&self, selector: Option<&str>) -> Result<Arc<dyn LlmClient>> {
        let provider = ModelProvider::from_selector(selector, self.default_provider);
        self.clients.get(&provider).cloned().ok_or_else(|| {
            Error::config(format!(
                "model provider '{}' is not configured (set {})",
                provider,
                provider.api_key_env()
            ))
        })
    }
}

impl fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.providers())
            .field("default_provider", &self.default_provider)
            .finish()
    }
}

/// Turn a non-success HTTP response into a provider error
pub(crate) async fn ensure_success(
    provider: ModelProvider,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }

    let status = response.status();
    let error_text = response
        .text()
        .await
        .unwrap_or_else(|_| "Unknown error".to_string());
    Err(Error::provider(provider.as_str(), status.as_u16(), error_text))
}

/// Join a relative path onto a provider base URL
pub(crate) fn endpoint(base_url: &Url, path: &str) -> String {
    format!("{}/{}", base_url.as_str().trim_end_matches('/'), path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm_client::{ModelRequest, ModelResponse};
    use crate::message::Message;
    use crate::types::TokenUsage;
    use async_trait::async_trait;

    struct NamedClient(&'static str);

    #[async_trait]
    impl LlmClient for NamedClient {
        async fn complete(&self, _request: ModelRequest) -> Result<ModelResponse> {
            Ok(ModelResponse {
                message: Message::assistant(self.0),
                usage: TokenUsage::default(),
            })
        }

        fn provider(&self) -> &str {
            self.0
        }

        fn model(&self) -> &str {
            "test-model"
        }
    }

    #[test]
    fn test_selector_parsing() {
        assert_eq!(
            ModelProvider::from_selector(Some("Anthropic"), ModelProvider::Google),
            ModelProvider::Anthropic
        );
        assert_eq!(
            ModelProvider::from_selector(Some("mistral"), ModelProvider::OpenAi),
            ModelProvider::OpenAi
        );
        assert_eq!(
            ModelProvider::from_selector(None, ModelProvider::Google),
            ModelProvider::Google
        );
    }

    #[test]
    fn test_registry_falls_back_to_default() {
        let registry = ProviderRegistry::new(ModelProvider::Google)
            .with_client(ModelProvider::Google, Arc::new(NamedClient("google")))
            .with_client(ModelProvider::OpenAi, Arc::new(NamedClient("openai")));

        assert_eq!(registry.select(Some("openai")).unwrap().provider(), "openai");
        assert_eq!(registry.select(Some("bogus")).unwrap().provider(), "google");
        assert_eq!(registry.select(None).unwrap().provider(), "google");
    }

    #[test]
    fn test_registry_rejects_unconfigured_provider() {
        let registry = ProviderRegistry::new(ModelProvider::Google)
            .with_client(ModelProvider::Google, Arc::new(NamedClient("google")));

        assert!(matches!(
            registry.select(Some("anthropic")),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_endpoint_join() {
        let base = Url::parse("https://api.openai.com/v1").unwrap();
        assert_eq!(
            endpoint(&base, "chat/completions"),
            "https://api.openai.com/v1/chat/completions"
        );
        let base = Url::parse("http://127.0.0.1:1234/").unwrap();
        assert_eq!(endpoint(&base, "v1/messages"), "http://127.0.0.1:1234/v1/messages");
    }
}

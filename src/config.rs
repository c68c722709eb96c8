//! Configuration for the agent router
//!
//! Everything is threaded explicitly: a [`RouterConfig`] builds the
//! supervisor once, and a [`RequestConfig`] travels with each request.
//! Nothing is read from process-wide state after construction.

use crate::classifier::{RoutingMode, RoutingPolicy};
use crate::error::{Error, Result};
use crate::providers::{presets, ModelProvider};
use dotenvy::dotenv;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default bound on agent and tool steps per request
pub const DEFAULT_MAX_STEPS: u32 = 25;

/// Connection and sampling settings for one model provider
#[derive(Clone)]
pub struct ProviderConfig {
    /// Provider these settings belong to
    pub provider: ModelProvider,
    /// API key
    pub api_key: SecretString,
    /// Base URL of the API
    pub base_url: Url,
    /// Model identifier
    pub model: String,
    /// Sampling temperature
    pub temperature: f32,
    /// Maximum completion tokens
    pub max_tokens: u32,
    /// Request timeout
    pub timeout: Duration,
}

impl ProviderConfig {
    /// Create settings with the provider defaults
    pub fn new(provider: ModelProvider, api_key: impl Into<String>) -> Self {
        Self {
            provider,
            api_key: SecretString::from(api_key.into()),
            base_url: provider.default_base_url(),
            model: provider.default_model().to_string(),
            temperature: 0.0,
            max_tokens: 4096,
            timeout: Duration::from_secs(120),
        }
    }

    /// Create settings from `<PROVIDER>_API_KEY`, `<PROVIDER>_MODEL` and
    /// `<PROVIDER>_BASE_URL`; `None` when no key is set
    pub fn from_env(provider: ModelProvider) -> Result<Option<Self>> {
        let Ok(api_key) = std::env::var(provider.api_key_env()) else {
            return Ok(None);
        };

        let mut config = Self::new(provider, api_key);
        if let Ok(model) = std::env::var(format!("{}_MODEL", provider.env_prefix())) {
            config.model = model;
        }
        if let Ok(base_url) = std::env::var(format!("{}_BASE_URL", provider.env_prefix())) {
            config.base_url = parse_url(&base_url)?;
        }

        Ok(Some(config))
    }

    /// Set the base URL
    pub fn with_base_url(mut self, base_url: Url) -> Self {
        self.base_url = base_url;
        self
    }

    /// Set the model
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the temperature
    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Set the maximum completion tokens
    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Set the timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Get the API key as a string
    pub fn api_key(&self) -> &str {
        self.api_key.expose_secret()
    }
}

impl std::fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("api_key", &"***REDACTED***")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout", &self.timeout)
            .finish()
    }
}

/// Settings for the grounded web-search tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Gemini model that runs the grounded search
    #[serde(default = "default_search_model")]
    pub model: String,
    /// Sampling temperature for search answers
    #[serde(default)]
    pub temperature: f32,
}

fn default_search_model() -> String {
    presets::GEMINI_FLASH.to_string()
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            model: default_search_model(),
            temperature: 0.0,
        }
    }
}

/// Top-level router configuration
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Provider used when a request names none, or names an unknown one.
    ///
    /// `None` picks a configured provider, Google first.
    pub default_provider: Option<ModelProvider>,
    /// Anthropic settings
    pub anthropic: Option<ProviderConfig>,
    /// OpenAI settings
    pub openai: Option<ProviderConfig>,
    /// Google settings; also backs the search tool
    pub google: Option<ProviderConfig>,
    /// Search tool settings
    pub search: SearchConfig,
    /// Classifier policy and supervisor mode
    pub routing: RoutingPolicy,
    /// Bound on agent and tool steps per request
    pub max_steps: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            default_provider: None,
            anthropic: None,
            openai: None,
            google: None,
            search: SearchConfig::default(),
            routing: RoutingPolicy::default(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }
}

impl RouterConfig {
    /// Create a configuration with no providers
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration from environment variables.
    ///
    /// Loads `.env` when present. At least one provider API key must be set.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        let mut config = Self::new();
        for provider in ModelProvider::ALL {
            if let Some(settings) = ProviderConfig::from_env(provider)? {
                config = config.with_provider(settings);
            }
        }

        if let Ok(default) = std::env::var("ROUTER_DEFAULT_PROVIDER") {
            config.default_provider = Some(default.parse()?);
        }
        if let Ok(mode) = std::env::var("ROUTER_MODE") {
            config.routing.mode = parse_mode(&mode)?;
        }
        if let Ok(max_steps) = std::env::var("ROUTER_MAX_STEPS") {
            config.max_steps = max_steps
                .parse()
                .map_err(|_| Error::config(format!("invalid ROUTER_MAX_STEPS '{}'", max_steps)))?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let file: RouterConfigFile = serde_yaml::from_str(yaml)?;
        let config = file.resolve()?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Add (or replace) the settings for a provider
    pub fn with_provider(mut self, settings: ProviderConfig) -> Self {
        match settings.provider {
            ModelProvider::Anthropic => self.anthropic = Some(settings),
            ModelProvider::OpenAi => self.openai = Some(settings),
            ModelProvider::Google => self.google = Some(settings),
        }
        self
    }

    /// Set the default provider
    pub fn with_default_provider(mut self, provider: ModelProvider) -> Self {
        self.default_provider = Some(provider);
        self
    }

    /// Set the routing policy
    pub fn with_routing(mut self, routing: RoutingPolicy) -> Self {
        self.routing = routing;
        self
    }

    /// Set the step bound
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Settings for a provider, if configured
    pub fn provider(&self, provider: ModelProvider) -> Option<&ProviderConfig> {
        match provider {
            ModelProvider::Anthropic => self.anthropic.as_ref(),
            ModelProvider::OpenAi => self.openai.as_ref(),
            ModelProvider::Google => self.google.as_ref(),
        }
    }

    /// Provider that serves requests without a usable selector
    pub fn resolved_default_provider(&self) -> ModelProvider {
        self.default_provider.unwrap_or_else(|| {
            std::iter::once(ModelProvider::default())
                .chain(ModelProvider::ALL)
                .find(|provider| self.provider(*provider).is_some())
                .unwrap_or_default()
        })
    }

    /// Check that the configuration can serve requests
    pub fn validate(&self) -> Result<()> {
        if ModelProvider::ALL
            .iter()
            .all(|provider| self.provider(*provider).is_none())
        {
            return Err(Error::config(
                "no model provider configured (set ANTHROPIC_API_KEY, OPENAI_API_KEY or GOOGLE_API_KEY)",
            ));
        }
        if let Some(provider) = self.default_provider {
            if self.provider(provider).is_none() {
                return Err(Error::config(format!(
                    "default provider '{}' is not configured (set {})",
                    provider,
                    provider.api_key_env()
                )));
            }
        }
        if self.max_steps == 0 {
            return Err(Error::config("max_steps must be at least 1"));
        }
        Ok(())
    }
}

/// Per-request options
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Provider selector: "anthropic", "openai" or "google"
    #[serde(default, alias = "model_name")]
    pub model_provider: Option<String>,
}

impl RequestConfig {
    /// Create request options naming a provider
    pub fn with_provider(provider: impl Into<String>) -> Self {
        Self {
            model_provider: Some(provider.into()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RouterConfigFile {
    #[serde(default)]
    default_provider: Option<ModelProvider>,
    #[serde(default)]
    providers: ProvidersFile,
    #[serde(default)]
    search: SearchConfig,
    #[serde(default)]
    routing: RoutingPolicy,
    #[serde(default = "default_max_steps")]
    max_steps: u32,
}

fn default_max_steps() -> u32 {
    DEFAULT_MAX_STEPS
}

#[derive(Debug, Default, Deserialize)]
struct ProvidersFile {
    anthropic: Option<ProviderFile>,
    openai: Option<ProviderFile>,
    google: Option<ProviderFile>,
}

#[derive(Debug, Default, Deserialize)]
struct ProviderFile {
    api_key: Option<String>,
    api_key_env: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
    timeout_secs: Option<u64>,
}

impl RouterConfigFile {
    fn resolve(self) -> Result<RouterConfig> {
        let mut config = RouterConfig {
            default_provider: self.default_provider,
            search: self.search,
            routing: self.routing,
            max_steps: self.max_steps,
            ..RouterConfig::default()
        };

        let entries = [
            (ModelProvider::Anthropic, self.providers.anthropic),
            (ModelProvider::OpenAi, self.providers.openai),
            (ModelProvider::Google, self.providers.google),
        ];
        for (provider, entry) in entries {
            if let Some(entry) = entry {
                if let Some(settings) = entry.resolve(provider)? {
                    config = config.with_provider(settings);
                }
            }
        }

        Ok(config)
    }
}

impl ProviderFile {
    fn resolve(self, provider: ModelProvider) -> Result<Option<ProviderConfig>> {
        let key_env = self
            .api_key_env
            .unwrap_or_else(|| provider.api_key_env().to_string());
        let Some(api_key) = self.api_key.or_else(|| std::env::var(&key_env).ok()) else {
            tracing::warn!(
                provider = provider.as_str(),
                env = key_env.as_str(),
                "Provider listed in config but no API key found, skipping"
            );
            return Ok(None);
        };

        let mut settings = ProviderConfig::new(provider, api_key);
        if let Some(base_url) = self.base_url {
            settings.base_url = parse_url(&base_url)?;
        }
        if let Some(model) = self.model {
            settings.model = model;
        }
        if let Some(temperature) = self.temperature {
            settings.temperature = temperature;
        }
        if let Some(max_tokens) = self.max_tokens {
            settings.max_tokens = max_tokens;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            settings.timeout = Duration::from_secs(timeout_secs);
        }

        Ok(Some(settings))
    }
}

fn parse_url(raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| Error::config(format!("invalid base URL '{}': {}", raw, e)))
}

fn parse_mode(raw: &str) -> Result<RoutingMode> {
    match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
        "simple" => Ok(RoutingMode::Simple),
        "loop_back" | "loopback" => Ok(RoutingMode::LoopBack),
        other => Err(Error::config(format!("unknown routing mode '{}'", other))),
    }
}

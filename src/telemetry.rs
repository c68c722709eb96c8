//! Log subscriber setup for binaries embedding the router

use crate::error::{Error, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

const DEFAULT_FILTER: &str = "agent_router=info,info";

/// Output format of the log subscriber
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable lines
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

impl LogFormat {
    /// Format selected by `ROUTER_LOG_FORMAT`
    pub fn from_env() -> Self {
        match std::env::var("ROUTER_LOG_FORMAT") {
            Ok(value) if value.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Pretty,
        }
    }
}

/// Install the global subscriber.
///
/// Filtering follows `RUST_LOG`, defaulting to `info`. Fails if a global
/// subscriber is already set.
pub fn init() -> Result<()> {
    init_with(LogFormat::from_env())
}

/// Install the global subscriber with an explicit format
pub fn init_with(format: LogFormat) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| DEFAULT_FILTER.into());
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).try_init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
    };

    installed.map_err(|e| Error::other(format!("Failed to install log subscriber: {}", e)))
}

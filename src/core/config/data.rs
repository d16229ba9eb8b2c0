use crate::schema::ConvertOptions;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_CACHE_TTL_MS: u64 = 5 * 60 * 1000;
pub const DEFAULT_TOOL_PREFIX: &str = "mcp_";
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_LISTEN_ADDR: &str = "127.0.0.1:8787";

/// Environment variable naming the MCP hub endpoint.
pub const HUB_URL_ENV: &str = "MCP_HUB_URL";

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct HubConfig {
    /// Hub endpoint. Absent or blank disables MCP tool integration.
    pub hub_url: Option<String>,
    /// How long a discovered tool registry is served from cache.
    pub cache_ttl_ms: u64,
    /// Prefix applied to remote tool names to keep them apart from native tools.
    pub tool_prefix: String,
    /// Let all-optional objects accept undeclared keys, for providers whose
    /// strict-schema validators reject the compatibility field otherwise.
    pub strict_provider_compat: bool,
    /// Upper bound on any single remote call, including the connect handshake.
    pub call_timeout_secs: u64,
    /// Keep the registry warm with a background refresh once per TTL.
    pub auto_refresh: bool,
    /// Bind address for the control server.
    pub listen: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            hub_url: None,
            cache_ttl_ms: DEFAULT_CACHE_TTL_MS,
            tool_prefix: DEFAULT_TOOL_PREFIX.to_string(),
            strict_provider_compat: true,
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            auto_refresh: false,
            listen: DEFAULT_LISTEN_ADDR.to_string(),
        }
    }
}

impl HubConfig {
    /// Configured hub URL, treating blank values as unset.
    pub fn hub_url(&self) -> Option<&str> {
        self.hub_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }

    pub fn convert_options(&self) -> ConvertOptions {
        ConvertOptions {
            passthrough_all_optional: self.strict_provider_compat,
        }
    }

    /// Applies environment overrides through `lookup`, so callers and tests
    /// can supply their own key-value source.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(HUB_URL_ENV) {
            self.hub_url = Some(url);
        }
    }

    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }
}

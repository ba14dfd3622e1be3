// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Tweetscope Server Configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default)]
    pub server: HttpServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub llm: LLMConfig,
    #[serde(default)]
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub relay: RelayConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HttpServerConfig {
    /// HTTP API listen address (e.g., "0.0.0.0:8080")
    #[serde(default = "default_http_addr")]
    pub listen_addr: String,

    /// Enable CORS
    #[serde(default = "default_enable_cors")]
    pub enable_cors: bool,

    /// Allowed CORS origins (empty = allow all)
    #[serde(default)]
    pub cors_origins: Vec<String>,

    /// Emit logs as JSON lines instead of human-readable text
    #[serde(default)]
    pub log_json: bool,
}

impl Default for HttpServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_http_addr(),
            enable_cors: default_enable_cors(),
            cors_origins: vec![],
            log_json: false,
        }
    }
}

/// Which upstream timeline contract the client talks to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamKind {
    /// Virtual-scroller proxy: `{"tweets": [...], "hasMore": bool}`
    Scroller,
    /// Native v1.1 `statuses/user_timeline.json`: bare array of statuses
    #[default]
    V1,
    /// Module-wrapped timeline: `{"modules": [{"status": {"data": {...}}}]}`
    Modules,
}

impl UpstreamKind {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            UpstreamKind::Scroller => "https://twitter-virtual-scroller.vercel.app",
            UpstreamKind::V1 | UpstreamKind::Modules => "https://api.twitter.com",
        }
    }

    /// Request path; `{handle}` is substituted with the screen name
    pub fn default_path(&self) -> &'static str {
        match self {
            UpstreamKind::Scroller => "/api/user_timeline/{handle}",
            UpstreamKind::V1 => "/1.1/statuses/user_timeline.json",
            UpstreamKind::Modules => "/1.1/timeline/user/{handle}.json",
        }
    }
}

impl std::str::FromStr for UpstreamKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "scroller" => Ok(UpstreamKind::Scroller),
            "v1" => Ok(UpstreamKind::V1),
            "modules" => Ok(UpstreamKind::Modules),
            other => anyhow::bail!("Unknown upstream kind: {}", other),
        }
    }
}

/// How upstream requests are authenticated
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamAuthMode {
    None,
    /// Static application bearer token
    #[default]
    Bearer,
    /// Bearer token plus a short-lived guest token with a call budget
    Guest,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UpstreamConfig {
    #[serde(default)]
    pub kind: UpstreamKind,

    /// Overrides the kind's default base URL
    pub base_url: Option<String>,

    /// Overrides the kind's default request path
    pub path: Option<String>,

    #[serde(default)]
    pub auth_mode: UpstreamAuthMode,

    /// Application bearer token (TWITTER_BEARER_TOKEN)
    pub bearer_token: Option<String>,

    /// Guest token exchange endpoint
    #[serde(default = "default_activate_url")]
    pub activate_url: String,

    /// Maximum posts the upstream returns per request
    #[serde(default = "default_page_cap")]
    pub page_cap: usize,

    /// Hard stop on requests per fetch
    #[serde(default = "default_max_pages")]
    pub max_pages: usize,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Calls allowed on a fresh guest token
    #[serde(default = "default_token_budget")]
    pub token_budget: u32,

    /// Guest token lifetime in seconds
    #[serde(default = "default_token_ttl")]
    pub token_ttl_secs: u64,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            kind: UpstreamKind::default(),
            base_url: None,
            path: None,
            auth_mode: UpstreamAuthMode::default(),
            bearer_token: None,
            activate_url: default_activate_url(),
            page_cap: default_page_cap(),
            max_pages: default_max_pages(),
            request_timeout_secs: default_request_timeout(),
            token_budget: default_token_budget(),
            token_ttl_secs: default_token_ttl(),
        }
    }
}

impl UpstreamConfig {
    pub fn resolved_base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.kind.default_base_url())
    }

    pub fn resolved_path(&self) -> &str {
        self.path
            .as_deref()
            .unwrap_or_else(|| self.kind.default_path())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn token_ttl(&self) -> Duration {
        Duration::from_secs(self.token_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LLMConfig {
    /// Anthropic API key
    pub anthropic_api_key: Option<String>,

    #[serde(default = "default_anthropic_base_url")]
    pub anthropic_base_url: String,

    #[serde(default = "default_anthropic_model")]
    pub anthropic_model: String,

    /// `2023-01-01` streams cumulative completions, later versions stream deltas
    #[serde(default = "default_anthropic_version")]
    pub anthropic_version: String,

    #[serde(default = "default_anthropic_max_tokens")]
    pub anthropic_max_tokens: u32,

    /// OpenAI API key
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible base URL (e.g., "https://api.openai.com/v1")
    pub openai_base_url: Option<String>,

    #[serde(default = "default_openai_model")]
    pub openai_model: String,

    #[serde(default = "default_openai_max_tokens")]
    pub openai_max_tokens: u16,
}

impl Default for LLMConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            anthropic_base_url: default_anthropic_base_url(),
            anthropic_model: default_anthropic_model(),
            anthropic_version: default_anthropic_version(),
            anthropic_max_tokens: default_anthropic_max_tokens(),
            openai_api_key: None,
            openai_base_url: None,
            openai_model: default_openai_model(),
            openai_max_tokens: default_openai_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnalysisConfig {
    /// Posts fetched when the request has no `count`
    #[serde(default = "default_count")]
    pub default_count: usize,

    /// Backend used when the request has no `client`
    #[serde(default = "default_client")]
    pub default_client: String,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            default_count: default_count(),
            default_client: default_client(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayConfig {
    /// Send an `Error:` frame when the backend stream fails mid-way
    #[serde(default)]
    pub emit_error_event: bool,

    /// Frames buffered between the relay task and the HTTP body
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            emit_error_event: false,
            channel_capacity: default_channel_capacity(),
        }
    }
}

// Default values
fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_enable_cors() -> bool {
    true
}

fn default_activate_url() -> String {
    "https://api.twitter.com/1.1/guest/activate.json".to_string()
}

fn default_page_cap() -> usize {
    200
}

fn default_max_pages() -> usize {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_token_budget() -> u32 {
    180
}

fn default_token_ttl() -> u64 {
    3 * 60 * 60
}

fn default_anthropic_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_anthropic_model() -> String {
    "claude-instant-1.2".to_string()
}

fn default_anthropic_version() -> String {
    "2023-01-01".to_string()
}

fn default_anthropic_max_tokens() -> u32 {
    100_000
}

fn default_openai_model() -> String {
    "gpt-3.5-turbo".to_string()
}

fn default_openai_max_tokens() -> u16 {
    1000
}

fn default_count() -> usize {
    30
}

fn default_client() -> String {
    "claude".to_string()
}

fn default_channel_capacity() -> usize {
    16
}

impl ServerConfig {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Per-user config file location (`~/.config/tweetscope/config.toml` on Linux)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("tweetscope").join("config.toml"))
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - TWEETSCOPE_HTTP_ADDR: HTTP listen address (default: 0.0.0.0:8080)
    /// - PORT: listen port on all interfaces (ignored when TWEETSCOPE_HTTP_ADDR is set)
    /// - TWEETSCOPE_UPSTREAM_KIND: scroller | v1 | modules
    /// - TWEETSCOPE_UPSTREAM_BASE_URL: upstream base URL
    /// - TWITTER_BEARER_TOKEN: upstream bearer token
    /// - ANTHROPIC_API_KEY / ANTHROPIC_BASE_URL
    /// - OPENAI_API_KEY / OPENAI_BASE_URL
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load configuration with priority: env > file > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        config.apply_env();

        Ok(config)
    }

    /// Override fields whose environment variable is set
    fn apply_env(&mut self) {
        if let Ok(addr) = std::env::var("TWEETSCOPE_HTTP_ADDR") {
            self.server.listen_addr = addr;
        } else if let Ok(port) = std::env::var("PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.listen_addr = format!("0.0.0.0:{}", port);
            }
        }

        if let Ok(kind) = std::env::var("TWEETSCOPE_UPSTREAM_KIND") {
            match kind.parse() {
                Ok(kind) => self.upstream.kind = kind,
                Err(e) => tracing::warn!("Ignoring TWEETSCOPE_UPSTREAM_KIND: {}", e),
            }
        }

        if let Ok(url) = std::env::var("TWEETSCOPE_UPSTREAM_BASE_URL") {
            self.upstream.base_url = Some(url);
        }

        if let Ok(token) = std::env::var("TWITTER_BEARER_TOKEN") {
            self.upstream.bearer_token = Some(token);
        }

        // LLM configuration
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            self.llm.anthropic_api_key = Some(key);
        }

        if let Ok(url) = std::env::var("ANTHROPIC_BASE_URL") {
            self.llm.anthropic_base_url = url;
        }

        if let Ok(key) = std::env::var("OPENAI_API_KEY") {
            self.llm.openai_api_key = Some(key);
        }

        if let Ok(url) = std::env::var("OPENAI_BASE_URL") {
            self.llm.openai_base_url = Some(url);
        }
    }

    /// Parse listen address as SocketAddr
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        Ok(self.server.listen_addr.parse()?)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.socket_addr()?;

        if self.upstream.page_cap == 0 {
            anyhow::bail!("upstream.page_cap must be greater than zero");
        }
        if self.upstream.max_pages == 0 {
            anyhow::bail!("upstream.max_pages must be greater than zero");
        }
        if self.analysis.default_count == 0 {
            anyhow::bail!("analysis.default_count must be greater than zero");
        }
        if self.relay.channel_capacity == 0 {
            anyhow::bail!("relay.channel_capacity must be greater than zero");
        }

        if self.upstream.auth_mode != UpstreamAuthMode::None && self.upstream.bearer_token.is_none()
        {
            anyhow::bail!(
                "Upstream auth mode {:?} requires a bearer token (set TWITTER_BEARER_TOKEN)",
                self.upstream.auth_mode
            );
        }

        url::Url::parse(self.upstream.resolved_base_url())?;

        Ok(())
    }
}

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

use crate::config::LLMConfig;
use dashmap::DashMap;
use futures::Stream;
use serde::{Deserialize, Serialize};
use std::pin::Pin;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

mod providers;
pub use providers::*;

/// How the text of successive stream items relates to the completion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeltaMode {
    /// Each item is the whole completion so far
    Cumulative,
    /// Each item is a delta to append
    Incremental,
}

#[derive(Error, Debug)]
pub enum CompletionError {
    #[error("LLM request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("LLM API returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("OpenAI error: {0}")]
    OpenAI(#[from] async_openai::error::OpenAIError),

    #[error("Failed to decode LLM stream event: {0}")]
    Decode(String),

    #[error("LLM stream reported an error: {0}")]
    Stream(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),
}

/// Completion text as it arrives from the backend
pub type CompletionStream = Pin<Box<dyn Stream<Item = Result<String, CompletionError>> + Send>>;

#[async_trait::async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Start a completion for `prompt`. Errors before the first byte are
    /// returned here; errors mid-stream arrive as stream items.
    async fn stream(&self, prompt: &str) -> Result<CompletionStream, CompletionError>;

    fn delta_mode(&self) -> DeltaMode;

    fn name(&self) -> &str;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderInfo {
    pub id: String,
    pub name: String,
    pub delta_mode: DeltaMode,
}

/// Completion backends keyed by the client identifier requests use
pub struct ProviderRegistry {
    providers: DashMap<String, Arc<dyn CompletionProvider>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            providers: DashMap::new(),
        }
    }

    pub fn from_config(llm_config: &LLMConfig) -> Result<Self, CompletionError> {
        let registry = Self::new();

        // Initialize Anthropic if key present
        if let Some(key) = &llm_config.anthropic_api_key {
            let provider = AnthropicProvider::new(
                key.clone(),
                llm_config.anthropic_base_url.clone(),
                llm_config.anthropic_model.clone(),
                llm_config.anthropic_version.clone(),
                llm_config.anthropic_max_tokens,
            )?;
            info!(
                model = %llm_config.anthropic_model,
                delta_mode = ?provider.delta_mode(),
                "Initialized Anthropic provider"
            );
            registry.register("claude", Arc::new(provider));
        } else {
            warn!("ANTHROPIC_API_KEY not set, Claude provider disabled");
        }

        // Initialize OpenAI if key present
        if let Some(key) = &llm_config.openai_api_key {
            let provider = OpenAIProvider::new(
                key.clone(),
                llm_config.openai_base_url.clone(),
                llm_config.openai_model.clone(),
                llm_config.openai_max_tokens,
            );
            info!(model = %llm_config.openai_model, "Initialized OpenAI provider");
            registry.register("openai", Arc::new(provider));
        } else {
            warn!("OPENAI_API_KEY not set, OpenAI provider disabled");
        }

        Ok(registry)
    }

    pub fn register(&self, id: &str, provider: Arc<dyn CompletionProvider>) {
        self.providers.insert(id.to_string(), provider);
    }

    pub fn get(&self, id: &str) -> Result<Arc<dyn CompletionProvider>, CompletionError> {
        self.providers
            .get(id)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| CompletionError::ProviderNotFound(id.to_string()))
    }

    pub fn list(&self) -> Vec<ProviderInfo> {
        let mut providers: Vec<ProviderInfo> = self
            .providers
            .iter()
            .map(|entry| ProviderInfo {
                id: entry.key().clone(),
                name: entry.value().name().to_string(),
                delta_mode: entry.value().delta_mode(),
            })
            .collect();
        providers.sort_by(|a, b| a.id.cmp(&b.id));
        providers
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_from_config_registers_keyed_providers() {
        let config = LLMConfig {
            anthropic_api_key: Some("sk-ant".to_string()),
            openai_api_key: Some("sk-oai".to_string()),
            ..Default::default()
        };
        let registry = ProviderRegistry::from_config(&config).unwrap();

        let ids: Vec<String> = registry.list().into_iter().map(|p| p.id).collect();
        assert_eq!(ids, vec!["claude".to_string(), "openai".to_string()]);
        assert_eq!(
            registry.get("claude").unwrap().delta_mode(),
            DeltaMode::Cumulative
        );
        assert_eq!(
            registry.get("openai").unwrap().delta_mode(),
            DeltaMode::Incremental
        );
    }

    #[test]
    fn test_missing_keys_disable_providers() {
        let registry = ProviderRegistry::from_config(&LLMConfig::default()).unwrap();
        assert!(registry.list().is_empty());
        assert!(matches!(
            registry.get("claude"),
            Err(CompletionError::ProviderNotFound(id)) if id == "claude"
        ));
    }
}

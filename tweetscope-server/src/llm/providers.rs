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

use super::{CompletionError, CompletionProvider, CompletionStream, DeltaMode};
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client as OpenAIClient,
};
use async_stream::stream;
use futures::StreamExt;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

/// API version whose completion stream repeats the full text in every event
pub const CUMULATIVE_ANTHROPIC_VERSION: &str = "2023-01-01";

const STOP_SEQUENCES: [&str; 2] = ["\r", "Human:"];

// Anthropic Provider
pub struct AnthropicProvider {
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    version: String,
    max_tokens: u32,
}

impl AnthropicProvider {
    pub fn new(
        api_key: String,
        base_url: String,
        model: String,
        version: String,
        max_tokens: u32,
    ) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .user_agent(concat!("tweetscope/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            http,
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
            version,
            max_tokens,
        })
    }
}

#[async_trait::async_trait]
impl CompletionProvider for AnthropicProvider {
    async fn stream(&self, prompt: &str) -> Result<CompletionStream, CompletionError> {
        let body = json!({
            "model": self.model,
            "prompt": format!("\n\nHuman: {}\n\nAssistant:", prompt),
            "max_tokens_to_sample": self.max_tokens,
            "stop_sequences": STOP_SEQUENCES,
            "stream": true,
        });

        let response = self
            .http
            .post(format!("{}/v1/complete", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", &self.version)
            .header("content-type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompletionError::Api {
                status: status.as_u16(),
                body,
            });
        }

        debug!(model = %self.model, version = %self.version, "Anthropic stream opened");

        let mut bytes = response.bytes_stream();
        let events = stream! {
            let mut lines = SseLineBuffer::default();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(CompletionError::Transport(e));
                        return;
                    }
                };
                for line in lines.push(&chunk) {
                    let Some(data) = sse_data(&line) else {
                        continue;
                    };
                    match parse_completion_event(data) {
                        Ok(Some(text)) => {
                            yield Ok(text);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            yield Err(e);
                            return;
                        }
                    }
                }
            }
        };

        Ok(Box::pin(events))
    }

    fn delta_mode(&self) -> DeltaMode {
        if self.version == CUMULATIVE_ANTHROPIC_VERSION {
            DeltaMode::Cumulative
        } else {
            DeltaMode::Incremental
        }
    }

    fn name(&self) -> &str {
        "Anthropic"
    }
}

#[derive(Debug, Deserialize)]
struct CompletionEvent {
    completion: Option<String>,
    error: Option<CompletionEventError>,
}

#[derive(Debug, Deserialize)]
struct CompletionEventError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: String,
}

/// Splits a byte stream into complete lines. A line split across network
/// chunks, including inside a multi-byte character, is held back until its
/// newline arrives.
#[derive(Debug, Default)]
struct SseLineBuffer {
    pending: Vec<u8>,
}

impl SseLineBuffer {
    fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        self.pending.extend_from_slice(chunk);
        let mut lines = Vec::new();
        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            let line = String::from_utf8_lossy(&line[..line.len() - 1]);
            lines.push(line.trim_end_matches('\r').to_string());
        }
        lines
    }
}

/// Payload of an SSE `data:` line; other fields (`event:`, comments) are ignored
fn sse_data(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(|data| data.trim_start())
}

/// Completion text carried by one event, `None` for pings and the terminator
fn parse_completion_event(data: &str) -> Result<Option<String>, CompletionError> {
    if data.is_empty() || data == "[DONE]" {
        return Ok(None);
    }
    let event: CompletionEvent =
        serde_json::from_str(data).map_err(|e| CompletionError::Decode(e.to_string()))?;
    if let Some(error) = event.error {
        return Err(CompletionError::Stream(format!(
            "{}: {}",
            error.kind, error.message
        )));
    }
    Ok(event.completion)
}

// OpenAI Provider
pub struct OpenAIProvider {
    client: OpenAIClient<OpenAIConfig>,
    model: String,
    max_tokens: u16,
}

impl OpenAIProvider {
    pub fn new(api_key: String, base_url: Option<String>, model: String, max_tokens: u16) -> Self {
        let mut config = OpenAIConfig::new().with_api_key(api_key);
        if let Some(base_url) = base_url {
            config = config.with_api_base(base_url);
        }

        Self {
            client: OpenAIClient::with_config(config),
            model,
            max_tokens,
        }
    }
}

#[async_trait::async_trait]
impl CompletionProvider for OpenAIProvider {
    async fn stream(&self, prompt: &str) -> Result<CompletionStream, CompletionError> {
        let message = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .max_tokens(self.max_tokens)
            .messages(vec![ChatCompletionRequestMessage::User(message)])
            .build()?;

        let stream = self.client.chat().create_stream(request).await?;
        debug!(model = %self.model, "OpenAI stream opened");

        let deltas = stream.filter_map(|result| async move {
            match result {
                Ok(response) => response
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.delta.content)
                    .map(Ok),
                Err(e) => Some(Err(CompletionError::OpenAI(e))),
            }
        });

        Ok(Box::pin(deltas))
    }

    fn delta_mode(&self) -> DeltaMode {
        DeltaMode::Incremental
    }

    fn name(&self) -> &str {
        "OpenAI"
    }
}

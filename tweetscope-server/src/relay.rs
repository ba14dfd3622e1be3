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

//! Completion relay
//!
//! Pulls a completion stream from a provider and forwards it to the client.
//! Every event carries the whole text produced so far, framed as
//! `Data:\n{text}\n\n`, so a client can always render the latest event alone.

use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::RelayConfig;
use crate::llm::{CompletionProvider, DeltaMode};

/// The receiving side went away
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SinkClosed;

/// Destination for framed events. Each `send` is delivered to the client as
/// its own body frame.
#[async_trait::async_trait]
pub trait ChunkSink: Send {
    async fn send(&mut self, frame: Bytes) -> Result<(), SinkClosed>;
}

#[async_trait::async_trait]
impl ChunkSink for mpsc::Sender<Bytes> {
    async fn send(&mut self, frame: Bytes) -> Result<(), SinkClosed> {
        mpsc::Sender::send(self, frame).await.map_err(|_| SinkClosed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RelayOptions {
    /// Append an `Error:` frame when the backend fails mid-stream
    pub emit_error_event: bool,
}

impl From<&RelayConfig> for RelayOptions {
    fn from(config: &RelayConfig) -> Self {
        Self {
            emit_error_event: config.emit_error_event,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayStatus {
    /// The backend finished its stream
    Completed,
    /// The backend failed; the client saw a prefix of the completion
    Truncated,
    /// The client went away
    Disconnected,
}

#[derive(Debug, Clone)]
pub struct RelayOutcome {
    pub status: RelayStatus,
    /// `Data:` events written
    pub events: usize,
    /// Completion text as of the last event
    pub text: String,
}

pub fn format_data_event(text: &str) -> Bytes {
    Bytes::from(format!("Data:\n{}\n\n", text))
}

pub fn format_error_event(message: &str) -> Bytes {
    Bytes::from(format!("Error:\n{}\n\n", message))
}

/// Plain progress line written ahead of the relay
pub fn format_status_line(message: &str) -> Bytes {
    Bytes::from(format!("\n\n{}\n\n", message))
}

/// Relay one completion to `sink`. Never fails: backend errors end the relay
/// early and are only logged, unless `options` asks for an error frame.
pub async fn stream_completion<S: ChunkSink + ?Sized>(
    provider: &dyn CompletionProvider,
    prompt: &str,
    sink: &mut S,
    options: &RelayOptions,
) -> RelayOutcome {
    let mode = provider.delta_mode();
    let mut text = String::new();
    let mut events = 0;

    let mut stream = match provider.stream(prompt).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(provider = provider.name(), error = %e, "Failed to start completion stream");
            return truncate(sink, options, &e.to_string(), events, text).await;
        }
    };

    while let Some(item) = stream.next().await {
        match item {
            Ok(chunk) => {
                match mode {
                    DeltaMode::Cumulative => text = chunk,
                    DeltaMode::Incremental => text.push_str(&chunk),
                }
                if sink.send(format_data_event(&text)).await.is_err() {
                    info!(provider = provider.name(), events, "Client disconnected during relay");
                    return RelayOutcome {
                        status: RelayStatus::Disconnected,
                        events,
                        text,
                    };
                }
                events += 1;
            }
            Err(e) => {
                warn!(
                    provider = provider.name(),
                    events,
                    error = %e,
                    "Completion stream failed, truncating output"
                );
                return truncate(sink, options, &e.to_string(), events, text).await;
            }
        }
    }

    debug!(provider = provider.name(), events, chars = text.chars().count(), "Completion relayed");
    RelayOutcome {
        status: RelayStatus::Completed,
        events,
        text,
    }
}

async fn truncate<S: ChunkSink + ?Sized>(
    sink: &mut S,
    options: &RelayOptions,
    message: &str,
    events: usize,
    text: String,
) -> RelayOutcome {
    if options.emit_error_event {
        // A closed sink here changes nothing, the relay is over either way
        let _ = sink.send(format_error_event(message)).await;
    }
    RelayOutcome {
        status: RelayStatus::Truncated,
        events,
        text,
    }
}

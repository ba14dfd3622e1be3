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

pub mod analysis;
pub mod health;

pub use analysis::{get_tweet_analysis, get_tweet_details, AnalysisParams, AnalysisRequest};
pub use health::ping;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::config::ServerConfig;
use crate::llm::{CompletionError, ProviderRegistry};
use crate::upstream::{TimelineClient, UpstreamError};

/// API error types
///
/// Every error is reported as `{"error": "..."}` with status 200; clients of
/// this API branch on the body, not the status.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("No tweets found")]
    NoTweets,

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Filter(#[from] tweetscope_core::Error),

    #[error(transparent)]
    Provider(#[from] CompletionError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match &self {
            ApiError::Upstream(e) => tracing::warn!(error = %e, "Timeline fetch failed"),
            ApiError::Provider(e) => tracing::warn!(error = %e, "Completion provider unavailable"),
            _ => tracing::debug!(error = %self, "Rejected request"),
        }

        (
            StatusCode::OK,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub timeline: Arc<TimelineClient>,
    pub providers: Arc<ProviderRegistry>,
}

impl AppState {
    pub fn new(config: ServerConfig) -> anyhow::Result<Self> {
        let timeline = TimelineClient::from_config(&config.upstream)?;
        let providers = ProviderRegistry::from_config(&config.llm)?;
        Ok(Self {
            config: Arc::new(config),
            timeline: Arc::new(timeline),
            providers: Arc::new(providers),
        })
    }
}

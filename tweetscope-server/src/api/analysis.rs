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

//! Timeline analysis endpoints

use axum::{
    body::Body,
    extract::{Query, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use bytes::Bytes;
use futures::StreamExt;
use serde::Deserialize;
use std::convert::Infallible;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info};
use tweetscope_core::{build_prompt, PostFilter, Timeline};

use super::{ApiError, AppState};
use crate::config::AnalysisConfig;
use crate::relay::{self, format_status_line, ChunkSink, RelayOptions};

const REQUESTING_MODEL_NOTICE: &str = "请求 AI 中...一分钟还没有结果请重试 orz";

/// Raw query parameters shared by the analysis and details endpoints
#[derive(Debug, Default, Deserialize)]
pub struct AnalysisParams {
    pub twitter_id: Option<String>,
    pub count: Option<String>,
    pub client: Option<String>,
    pub keyword: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub max_id: Option<String>,
}

/// Validated request
#[derive(Debug, Clone)]
pub struct AnalysisRequest {
    pub handle: String,
    pub count: usize,
    pub client: String,
    pub filter: PostFilter,
    pub cursor: Option<u64>,
}

impl AnalysisParams {
    /// Validate the raw parameters. `max_count` bounds the requested count.
    pub fn resolve(
        self,
        defaults: &AnalysisConfig,
        max_count: usize,
    ) -> Result<AnalysisRequest, ApiError> {
        let handle = non_empty(self.twitter_id)
            .ok_or_else(|| ApiError::BadRequest("Wrong Params".to_string()))?;

        let count = match non_empty(self.count) {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|count| *count > 0)
                .ok_or_else(|| {
                    ApiError::BadRequest(format!("count must be a positive integer, got {:?}", raw))
                })?,
            None => defaults.default_count,
        };
        if count > max_count {
            return Err(ApiError::BadRequest(format!(
                "count must be at most {}, got {}",
                max_count, count
            )));
        }

        let cursor = non_empty(self.max_id)
            .map(|raw| {
                raw.parse::<u64>()
                    .map_err(|_| ApiError::BadRequest(format!("invalid max_id {:?}", raw)))
            })
            .transpose()?;

        let filter = PostFilter::new(
            self.keyword.as_deref(),
            self.start_date.as_deref(),
            self.end_date.as_deref(),
        )?;

        Ok(AnalysisRequest {
            handle,
            count,
            client: non_empty(self.client).unwrap_or_else(|| defaults.default_client.clone()),
            filter,
            cursor,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Fetch the timeline and narrow it with the request's filter
async fn fetch_filtered(state: &AppState, request: &AnalysisRequest) -> Result<Timeline, ApiError> {
    let mut timeline = state
        .timeline
        .fetch_timeline(&request.handle, request.count, request.cursor)
        .await?;

    let posts = request.filter.apply(std::mem::take(&mut timeline.posts));
    let timeline = timeline.with_posts(posts);
    if timeline.is_empty() {
        return Err(ApiError::NoTweets);
    }
    Ok(timeline)
}

/// GET|POST /api/get_tweet_analysis - Stream a personality analysis of a timeline
///
/// Errors detected before streaming starts are returned as JSON. Once the
/// stream is open, two plain status lines precede the `Data:` events.
pub async fn get_tweet_analysis(
    State(state): State<AppState>,
    Query(params): Query<AnalysisParams>,
) -> Result<Response, ApiError> {
    let request = params.resolve(&state.config.analysis, state.timeline.max_posts())?;
    let provider = state.providers.get(&request.client)?;

    let timeline = fetch_filtered(&state, &request).await?;
    let Some(profile) = timeline.profile.as_ref() else {
        return Err(ApiError::NoTweets);
    };
    let prompt = build_prompt(profile, &timeline.posts);
    debug!(handle = %request.handle, chars = prompt.chars().count(), "Built analysis prompt");

    let fetched = timeline.len();
    let options = RelayOptions::from(&state.config.relay);
    let (mut tx, rx) = mpsc::channel::<Bytes>(state.config.relay.channel_capacity);

    tokio::spawn(async move {
        let preamble = [
            format_status_line(&format!("抓取数据中...本次抓取量{}条", fetched)),
            format_status_line(REQUESTING_MODEL_NOTICE),
        ];
        for line in preamble {
            if ChunkSink::send(&mut tx, line).await.is_err() {
                return;
            }
        }

        let outcome = relay::stream_completion(provider.as_ref(), &prompt, &mut tx, &options).await;
        info!(
            provider = provider.name(),
            status = ?outcome.status,
            events = outcome.events,
            "Analysis relay finished"
        );
    });

    info!(
        handle = %request.handle,
        client = %request.client,
        posts = fetched,
        "Streaming tweet analysis"
    );

    let body = Body::from_stream(ReceiverStream::new(rx).map(Ok::<_, Infallible>));
    Ok((
        [
            (header::CONTENT_TYPE, "text/event-stream; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
        ],
        body,
    )
        .into_response())
}

/// GET /api/get_tweet_details - Fetched and filtered timeline as JSON
pub async fn get_tweet_details(
    State(state): State<AppState>,
    Query(params): Query<AnalysisParams>,
) -> Result<Json<Timeline>, ApiError> {
    let request = params.resolve(&state.config.analysis, state.timeline.max_posts())?;
    let timeline = fetch_filtered(&state, &request).await?;
    Ok(Json(timeline))
}

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

//! Upstream timeline client
//!
//! Fetches a user's recent posts page by page, walking backwards with a
//! max-id cursor until the requested count is reached or the upstream runs
//! out. Any failing page aborts the whole fetch.

pub mod decode;
pub mod token;

use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use tweetscope_core::{AuthorProfile, Post, Timeline};

use crate::config::{UpstreamAuthMode, UpstreamConfig};
use decode::{decoder_for, Page, TimelineDecoder};
use token::TokenManager;

/// Header carrying the guest token on guest-mode requests
pub const GUEST_TOKEN_HEADER: &str = "x-guest-token";

/// Header the upstream uses to report the remaining call budget
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-rate-limit-remaining";

const HANDLE_PLACEHOLDER: &str = "{handle}";

#[derive(Error, Debug)]
pub enum UpstreamError {
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("Upstream returned {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),

    #[error("Guest token exchange failed: {0}")]
    TokenExchange(String),
}

impl From<serde_json::Error> for UpstreamError {
    fn from(e: serde_json::Error) -> Self {
        UpstreamError::Decode(e.to_string())
    }
}

impl From<tweetscope_core::Error> for UpstreamError {
    fn from(e: tweetscope_core::Error) -> Self {
        UpstreamError::Decode(e.to_string())
    }
}

enum UpstreamAuth {
    None,
    Bearer(String),
    Guest {
        bearer: String,
        tokens: Arc<TokenManager>,
    },
}

pub struct TimelineClient {
    http: reqwest::Client,
    base_url: String,
    path: String,
    decoder: Box<dyn TimelineDecoder>,
    auth: UpstreamAuth,
    page_cap: usize,
    max_pages: usize,
}

impl TimelineClient {
    /// Build a client from configuration. The guest token manager, when the
    /// auth mode needs one, is created here and lives as long as the client.
    pub fn from_config(config: &UpstreamConfig) -> Result<Self, UpstreamError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("tweetscope/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let bearer = || {
            config.bearer_token.clone().ok_or_else(|| {
                UpstreamError::InvalidRequest(format!(
                    "auth mode {:?} requires a bearer token",
                    config.auth_mode
                ))
            })
        };

        let auth = match config.auth_mode {
            UpstreamAuthMode::None => UpstreamAuth::None,
            UpstreamAuthMode::Bearer => UpstreamAuth::Bearer(bearer()?),
            UpstreamAuthMode::Guest => {
                let bearer = bearer()?;
                let tokens = TokenManager::new(
                    http.clone(),
                    config.activate_url.clone(),
                    bearer.clone(),
                    config.token_budget,
                    config.token_ttl(),
                );
                UpstreamAuth::Guest {
                    bearer,
                    tokens: Arc::new(tokens),
                }
            }
        };

        info!(
            kind = ?config.kind,
            base_url = config.resolved_base_url(),
            auth_mode = ?config.auth_mode,
            "Timeline client initialized"
        );

        Ok(Self {
            http,
            base_url: config.resolved_base_url().trim_end_matches('/').to_string(),
            path: config.resolved_path().to_string(),
            decoder: decoder_for(config.kind),
            auth,
            page_cap: config.page_cap.max(1),
            max_pages: config.max_pages.max(1),
        })
    }

    /// Most posts a single fetch can return, given the page size and page limit
    pub fn max_posts(&self) -> usize {
        self.page_cap.saturating_mul(self.max_pages)
    }

    /// Shared guest token manager, when running in guest mode
    pub fn token_manager(&self) -> Option<&Arc<TokenManager>> {
        match &self.auth {
            UpstreamAuth::Guest { tokens, .. } => Some(tokens),
            _ => None,
        }
    }

    /// Fetch up to `desired_count` of the newest posts of `handle`.
    ///
    /// With a `cursor`, only posts with id <= cursor are returned. The
    /// result is newest-first and free of duplicate ids; its `next_cursor`
    /// is set when the upstream may still hold older posts.
    pub async fn fetch_timeline(
        &self,
        handle: &str,
        desired_count: usize,
        cursor: Option<u64>,
    ) -> Result<Timeline, UpstreamError> {
        let handle = normalize_handle(handle)?;
        if desired_count == 0 {
            return Err(UpstreamError::InvalidRequest(
                "count must be greater than zero".to_string(),
            ));
        }

        let mut posts: Vec<Post> = Vec::with_capacity(desired_count.min(self.max_posts()));
        let mut seen = HashSet::new();
        let mut profile: Option<AuthorProfile> = None;
        let mut cursor = cursor;
        let mut exhausted = false;
        let mut requests = 0;

        while posts.len() < desired_count {
            if requests == self.max_pages {
                debug!(handle, requests, "Page limit reached");
                break;
            }
            requests += 1;

            let want = (desired_count - posts.len()).min(self.page_cap);
            let page = self.fetch_page(handle, want, cursor).await?;

            if profile.is_none() {
                profile = page.profile;
            }

            let Some(oldest) = page.posts.iter().map(|post| post.id).min() else {
                exhausted = true;
                break;
            };

            let before = posts.len();
            for post in page.posts {
                if seen.insert(post.id) {
                    posts.push(post);
                }
            }

            debug!(
                handle,
                page = requests,
                requested = want,
                added = posts.len() - before,
                total = posts.len(),
                "Fetched timeline page"
            );

            // max_id is inclusive upstream, so step past the oldest id seen
            cursor = oldest.checked_sub(1);
            if cursor.is_none() || page.has_more == Some(false) || posts.len() == before {
                exhausted = true;
                break;
            }
        }

        posts.sort_by(|a, b| b.id.cmp(&a.id));
        posts.truncate(desired_count);

        let next_cursor = if exhausted {
            None
        } else {
            posts.last().and_then(|post| post.id.checked_sub(1))
        };

        info!(handle, count = posts.len(), requests, "Fetched timeline");

        Ok(match profile {
            Some(profile) => Timeline::new(profile, posts, next_cursor),
            None => Timeline::empty(),
        })
    }

    async fn fetch_page(
        &self,
        handle: &str,
        count: usize,
        max_id: Option<u64>,
    ) -> Result<Page, UpstreamError> {
        let url = format!(
            "{}{}",
            self.base_url,
            self.path.replace(HANDLE_PLACEHOLDER, handle)
        );

        let mut query: Vec<(&str, String)> = vec![("count", count.to_string())];
        if !self.path.contains(HANDLE_PLACEHOLDER) {
            query.push(("screen_name", handle.to_string()));
        }
        if let Some(max_id) = max_id {
            query.push(("max_id", max_id.to_string()));
        }

        let mut request = self.http.get(&url).query(&query);
        let mut guest_token = None;
        match &self.auth {
            UpstreamAuth::None => {}
            UpstreamAuth::Bearer(bearer) => {
                request = request.bearer_auth(bearer);
            }
            UpstreamAuth::Guest { bearer, tokens } => {
                let token = tokens.acquire().await?;
                request = request.bearer_auth(bearer).header(GUEST_TOKEN_HEADER, &token);
                guest_token = Some(token);
            }
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                status: status.as_u16(),
                url,
            });
        }

        let reported_remaining = response
            .headers()
            .get(RATE_LIMIT_REMAINING_HEADER)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u32>().ok());

        // The call counts against the token even if the body never arrives
        if let (Some(token), UpstreamAuth::Guest { tokens, .. }) = (guest_token, &self.auth) {
            tokens.record_call(&token, reported_remaining).await;
        }

        let body = response.bytes().await?;
        self.decoder.decode(&body)
    }
}

/// Strip a leading `@` and reject anything that is not a valid screen name
fn normalize_handle(handle: &str) -> Result<&str, UpstreamError> {
    let handle = handle.trim();
    let handle = handle.strip_prefix('@').unwrap_or(handle);
    if handle.is_empty() {
        return Err(UpstreamError::InvalidRequest(
            "twitter_id must not be empty".to_string(),
        ));
    }
    if !handle
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(UpstreamError::InvalidRequest(format!(
            "invalid twitter_id: {:?}",
            handle
        )));
    }
    Ok(handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_handle() {
        assert_eq!(normalize_handle("jack").unwrap(), "jack");
        assert_eq!(normalize_handle(" @jack_2 ").unwrap(), "jack_2");
        assert!(matches!(
            normalize_handle("@"),
            Err(UpstreamError::InvalidRequest(_))
        ));
        assert!(matches!(
            normalize_handle("../admin"),
            Err(UpstreamError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_from_config_requires_bearer_for_guest_mode() {
        let config = UpstreamConfig {
            auth_mode: UpstreamAuthMode::Guest,
            bearer_token: None,
            ..Default::default()
        };
        assert!(matches!(
            TimelineClient::from_config(&config),
            Err(UpstreamError::InvalidRequest(_))
        ));
    }

    #[test]
    fn test_token_manager_only_in_guest_mode() {
        let mut config = UpstreamConfig {
            auth_mode: UpstreamAuthMode::None,
            ..Default::default()
        };
        assert!(TimelineClient::from_config(&config)
            .unwrap()
            .token_manager()
            .is_none());

        config.auth_mode = UpstreamAuthMode::Guest;
        config.bearer_token = Some("app".to_string());
        assert!(TimelineClient::from_config(&config)
            .unwrap()
            .token_manager()
            .is_some());
    }

    #[tokio::test]
    async fn test_zero_count_rejected_before_any_request() {
        let config = UpstreamConfig {
            auth_mode: UpstreamAuthMode::None,
            base_url: Some("http://127.0.0.1:9".to_string()),
            ..Default::default()
        };
        let client = TimelineClient::from_config(&config).unwrap();
        let err = client.fetch_timeline("jack", 0, None).await.unwrap_err();
        assert!(matches!(err, UpstreamError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn test_huge_count_is_bounded_by_page_limit() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/1.1/statuses/user_timeline.json")
            .match_query(mockito::Matcher::Any)
            .with_body("[]")
            .expect(1)
            .create_async()
            .await;

        let config = UpstreamConfig {
            kind: crate::config::UpstreamKind::V1,
            auth_mode: UpstreamAuthMode::None,
            base_url: Some(server.url()),
            ..Default::default()
        };
        let client = TimelineClient::from_config(&config).unwrap();
        assert_eq!(client.max_posts(), 2000);

        let timeline = client.fetch_timeline("jack", usize::MAX, None).await.unwrap();
        assert!(timeline.is_empty());
        mock.assert_async().await;
    }
}

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

//! Guest token lifecycle for the upstream timeline API
//!
//! A guest token is valid for a limited number of calls and a limited time.
//! The manager owns the single process-wide token and serializes every read,
//! refresh and decrement behind one async mutex, so concurrent requests never
//! race on the exchange.

use serde::Deserialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::UpstreamError;

/// Current guest token and its remaining call budget
#[derive(Debug, Clone)]
pub struct RateLimitToken {
    pub token: String,
    pub remaining: u32,
    pub expires_at: Instant,
}

impl RateLimitToken {
    /// A token with one call left is retired early so the last call never 429s
    pub fn needs_refresh(&self, now: Instant) -> bool {
        self.remaining <= 1 || now >= self.expires_at
    }
}

#[derive(Debug, Deserialize)]
struct ActivateResponse {
    guest_token: String,
}

pub struct TokenManager {
    http: reqwest::Client,
    activate_url: String,
    bearer_token: String,
    budget: u32,
    ttl: Duration,
    current: Mutex<Option<RateLimitToken>>,
    exchanges: AtomicU64,
}

impl TokenManager {
    pub fn new(
        http: reqwest::Client,
        activate_url: String,
        bearer_token: String,
        budget: u32,
        ttl: Duration,
    ) -> Self {
        Self {
            http,
            activate_url,
            bearer_token,
            budget,
            ttl,
            current: Mutex::new(None),
            exchanges: AtomicU64::new(0),
        }
    }

    /// Return a usable token, exchanging for a fresh one when needed
    pub async fn acquire(&self) -> Result<String, UpstreamError> {
        let mut current = self.current.lock().await;
        let now = Instant::now();

        if let Some(token) = current.as_ref() {
            if !token.needs_refresh(now) {
                return Ok(token.token.clone());
            }
            debug!(
                remaining = token.remaining,
                expired = now >= token.expires_at,
                "Guest token needs refresh"
            );
        }

        let fresh = RateLimitToken {
            token: self.exchange().await?,
            remaining: self.budget,
            expires_at: now + self.ttl,
        };
        let token = fresh.token.clone();
        *current = Some(fresh);
        Ok(token)
    }

    /// Account for one successful call made with `token`.
    ///
    /// `reported_remaining` is the upstream's own count when it sends one;
    /// it replaces the local estimate. Calls made with a token that has since
    /// been replaced are ignored.
    pub async fn record_call(&self, token: &str, reported_remaining: Option<u32>) {
        let mut current = self.current.lock().await;
        if let Some(state) = current.as_mut().filter(|state| state.token == token) {
            state.remaining = match reported_remaining {
                Some(remaining) => remaining,
                None => state.remaining.saturating_sub(1),
            };
        }
    }

    pub async fn snapshot(&self) -> Option<RateLimitToken> {
        self.current.lock().await.clone()
    }

    /// Number of token exchanges performed since startup
    pub fn exchange_count(&self) -> u64 {
        self.exchanges.load(Ordering::Relaxed)
    }

    async fn exchange(&self) -> Result<String, UpstreamError> {
        let response = self
            .http
            .post(&self.activate_url)
            .bearer_auth(&self.bearer_token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::TokenExchange(format!(
                "{} returned {}",
                self.activate_url, status
            )));
        }

        let body: ActivateResponse = response
            .json()
            .await
            .map_err(|e| UpstreamError::TokenExchange(format!("invalid activate response: {}", e)))?;

        let count = self.exchanges.fetch_add(1, Ordering::Relaxed) + 1;
        info!(exchanges = count, "Acquired fresh guest token");
        Ok(body.guest_token)
    }
}

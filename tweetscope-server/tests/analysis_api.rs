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

// End-to-end tests for the HTTP endpoints: a mock upstream timeline and a
// scripted completion provider behind the real router

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use tower::ServiceExt;
use tweetscope_server::api::AppState;
use tweetscope_server::build_router;
use tweetscope_server::config::{ServerConfig, UpstreamAuthMode};
use tweetscope_server::llm::{
    CompletionError, CompletionProvider, CompletionStream, DeltaMode, ProviderRegistry,
};
use tweetscope_server::upstream::TimelineClient;

const V1_PATH: &str = "/1.1/statuses/user_timeline.json";

/// Streams a fixed list of deltas and remembers the prompt it was given
struct ScriptedProvider {
    deltas: Vec<&'static str>,
    last_prompt: Mutex<Option<String>>,
}

#[async_trait::async_trait]
impl CompletionProvider for ScriptedProvider {
    async fn stream(&self, prompt: &str) -> Result<CompletionStream, CompletionError> {
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        let items: Vec<Result<String, CompletionError>> =
            self.deltas.iter().map(|d| Ok(d.to_string())).collect();
        Ok(Box::pin(futures::stream::iter(items)))
    }

    fn delta_mode(&self) -> DeltaMode {
        DeltaMode::Incremental
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

fn status(id: u64, created_at: &str, text: &str) -> Value {
    json!({
        "id": id,
        "id_str": id.to_string(),
        "created_at": created_at,
        "text": text,
        "entities": {"user_mentions": [{"screen_name": "bob"}]},
        "user": {
            "name": "Jack",
            "screen_name": "jack",
            "description": "just setting up",
            "followers_count": 10,
            "friends_count": 2,
            "statuses_count": 3,
            "favourites_count": 4,
            "created_at": "Tue Mar 21 20:50:14 +0000 2006"
        }
    })
}

fn two_posts() -> String {
    json!([
        status(2, "Fri Jun 16 09:00:00 +0000 2023", "learning rust today"),
        status(1, "Thu Jun 15 14:30:22 +0000 2023", "hello world"),
    ])
    .to_string()
}

fn app(upstream_url: String, provider: Arc<ScriptedProvider>) -> Router {
    let mut config = ServerConfig::default();
    config.upstream.base_url = Some(upstream_url);
    config.upstream.auth_mode = UpstreamAuthMode::None;

    let providers = ProviderRegistry::new();
    providers.register("claude", provider);

    let state = AppState {
        timeline: Arc::new(TimelineClient::from_config(&config.upstream).unwrap()),
        providers: Arc::new(providers),
        config: Arc::new(config),
    };
    build_router(state)
}

fn scripted(deltas: Vec<&'static str>) -> Arc<ScriptedProvider> {
    Arc::new(ScriptedProvider {
        deltas,
        last_prompt: Mutex::new(None),
    })
}

async fn get(app: Router, uri: &str) -> (StatusCode, header::HeaderMap, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, headers, String::from_utf8(body.to_vec()).unwrap())
}

#[tokio::test]
async fn test_ping() {
    let server = mockito::Server::new_async().await;
    let (status, headers, body) = get(app(server.url(), scripted(vec![])), "/ping").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(headers.get(header::ACCESS_CONTROL_ALLOW_ORIGIN).unwrap(), "*");
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json, json!({"message": "pong"}));
}

#[tokio::test]
async fn test_analysis_streams_status_lines_then_data_events() {
    let mut server = mockito::Server::new_async().await;
    let _timeline = server
        .mock("GET", V1_PATH)
        .match_query(mockito::Matcher::Any)
        .with_body(two_posts())
        .create_async()
        .await;

    let provider = scripted(vec!["你好", "，", "世界"]);
    let (status, headers, body) = get(
        app(server.url(), provider.clone()),
        "/api/get_tweet_analysis?twitter_id=jack&count=2",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        headers.get(header::CONTENT_TYPE).unwrap(),
        "text/event-stream; charset=utf-8"
    );
    assert_eq!(headers.get(header::CACHE_CONTROL).unwrap(), "no-cache");
    assert_eq!(
        body,
        concat!(
            "\n\n抓取数据中...本次抓取量2条\n\n",
            "\n\n请求 AI 中...一分钟还没有结果请重试 orz\n\n",
            "Data:\n你好\n\n",
            "Data:\n你好，\n\n",
            "Data:\n你好，世界\n\n",
        )
    );

    let prompt = provider.last_prompt.lock().unwrap().clone().unwrap();
    assert!(prompt.contains("这个推主的名字是Jack；ID 是jack；"));
    assert!(prompt.contains("learning rust today"));
    assert!(prompt.contains("@bob"));
}

#[tokio::test]
async fn test_analysis_accepts_post() {
    let mut server = mockito::Server::new_async().await;
    let _timeline = server
        .mock("GET", V1_PATH)
        .match_query(mockito::Matcher::Any)
        .with_body(two_posts())
        .create_async()
        .await;

    let response = app(server.url(), scripted(vec!["ok"]))
        .oneshot(
            Request::builder()
                .method(Method::POST)
                .uri("/api/get_tweet_analysis?twitter_id=jack")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();

    assert!(String::from_utf8(body.to_vec())
        .unwrap()
        .ends_with("Data:\nok\n\n"));
}

#[tokio::test]
async fn test_missing_twitter_id_is_json_error() {
    let server = mockito::Server::new_async().await;
    let (status, _, body) = get(
        app(server.url(), scripted(vec![])),
        "/api/get_tweet_analysis?count=10",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json, json!({"error": "Wrong Params"}));
}

#[tokio::test]
async fn test_empty_timeline_is_no_tweets_error() {
    let mut server = mockito::Server::new_async().await;
    let _timeline = server
        .mock("GET", V1_PATH)
        .match_query(mockito::Matcher::Any)
        .with_body("[]")
        .create_async()
        .await;

    let provider = scripted(vec!["never"]);
    let (_, _, body) = get(
        app(server.url(), provider.clone()),
        "/api/get_tweet_analysis?twitter_id=jack",
    )
    .await;

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json, json!({"error": "No tweets found"}));
    assert!(provider.last_prompt.lock().unwrap().is_none());
}

#[tokio::test]
async fn test_filter_removing_every_post_is_no_tweets_error() {
    let mut server = mockito::Server::new_async().await;
    let _timeline = server
        .mock("GET", V1_PATH)
        .match_query(mockito::Matcher::Any)
        .with_body(two_posts())
        .create_async()
        .await;

    let (_, _, body) = get(
        app(server.url(), scripted(vec![])),
        "/api/get_tweet_analysis?twitter_id=jack&keyword=golang",
    )
    .await;

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "No tweets found");
}

#[tokio::test]
async fn test_oversized_count_is_json_error() {
    let mut server = mockito::Server::new_async().await;
    let timeline = server
        .mock("GET", V1_PATH)
        .match_query(mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    for count in ["2001", "10000000000", "18446744073709551615"] {
        let (status, _, body) = get(
            app(server.url(), scripted(vec![])),
            &format!("/api/get_tweet_analysis?twitter_id=jack&count={}", count),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        let json: Value = serde_json::from_str(&body).unwrap();
        assert!(json["error"]
            .as_str()
            .unwrap()
            .starts_with("count must be at most 2000"));
    }
    timeline.assert_async().await;
}

#[tokio::test]
async fn test_unknown_client_is_json_error() {
    let server = mockito::Server::new_async().await;
    let (_, _, body) = get(
        app(server.url(), scripted(vec![])),
        "/api/get_tweet_analysis?twitter_id=jack&client=bard",
    )
    .await;

    let json: Value = serde_json::from_str(&body).unwrap();
    assert_eq!(json["error"], "Provider not found: bard");
}

#[tokio::test]
async fn test_upstream_failure_is_json_error() {
    let mut server = mockito::Server::new_async().await;
    let _timeline = server
        .mock("GET", V1_PATH)
        .match_query(mockito::Matcher::Any)
        .with_status(503)
        .create_async()
        .await;

    let (status, _, body) = get(
        app(server.url(), scripted(vec![])),
        "/api/get_tweet_analysis?twitter_id=jack",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    assert!(json["error"]
        .as_str()
        .unwrap()
        .starts_with("Upstream returned 503"));
}

#[tokio::test]
async fn test_details_returns_filtered_timeline() {
    let mut server = mockito::Server::new_async().await;
    let _timeline = server
        .mock("GET", V1_PATH)
        .match_query(mockito::Matcher::Any)
        .with_body(two_posts())
        .create_async()
        .await;

    let (status, _, body) = get(
        app(server.url(), scripted(vec![])),
        "/api/get_tweet_details?twitter_id=jack&start_date=2023-06-16",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let json: Value = serde_json::from_str(&body).unwrap();
    let posts = json["posts"].as_array().unwrap();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0]["text"], "learning rust today");
    assert_eq!(json["profile"]["handle"], "jack");
}

#[tokio::test]
async fn test_malformed_date_is_json_error() {
    let server = mockito::Server::new_async().await;
    let (_, _, body) = get(
        app(server.url(), scripted(vec![])),
        "/api/get_tweet_details?twitter_id=jack&end_date=June",
    )
    .await;

    let json: Value = serde_json::from_str(&body).unwrap();
    assert!(json["error"].as_str().unwrap().contains("June"));
}

#[tokio::test]
async fn test_cors_preflight() {
    let server = mockito::Server::new_async().await;
    let response = app(server.url(), scripted(vec![]))
        .oneshot(
            Request::builder()
                .method(Method::OPTIONS)
                .uri("/api/get_tweet_analysis")
                .header(header::ORIGIN, "https://example.com")
                .header(header::ACCESS_CONTROL_REQUEST_METHOD, "GET")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(
        response
            .headers()
            .get(header::ACCESS_CONTROL_ALLOW_ORIGIN)
            .unwrap(),
        "*"
    );
}

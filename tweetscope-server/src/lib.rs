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

pub mod api;
pub mod config;
pub mod llm;
pub mod relay;
pub mod upstream;

use anyhow::Result;
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::get,
    Router,
};
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    set_header::SetResponseHeaderLayer,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use api::{get_tweet_analysis, get_tweet_details, ping, AppState};
use config::{HttpServerConfig, ServerConfig};

pub async fn run_server(config: ServerConfig) -> Result<()> {
    // Initialize tracing
    let json_logs = config.server.log_json;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tweetscope_server=info,tower_http=info".into()),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer()))
        .init();

    tracing::info!("Starting Tweetscope Server");
    tracing::debug!("Configuration: {:#?}", config);

    // Validate configuration
    config.validate()?;
    let addr = config.socket_addr()?;

    let state = AppState::new(config)?;
    let providers = state.providers.list();
    if providers.is_empty() {
        tracing::warn!("No completion provider configured, analysis requests will fail");
    } else {
        tracing::info!(
            "Completion providers: {:?}",
            providers.iter().map(|p| p.id.as_str()).collect::<Vec<_>>()
        );
    }

    let app = build_router(state);

    // Run HTTP server
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("HTTP API listening on http://{}", addr);
    axum::serve(listener, app).await?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Build the application router
pub fn build_router(state: AppState) -> Router {
    let cors = cors_layer(&state.config.server);
    let allow_all = state.config.server.enable_cors && state.config.server.cors_origins.is_empty();

    let router = Router::new()
        .route(
            "/api/get_tweet_analysis",
            get(get_tweet_analysis).post(get_tweet_analysis),
        )
        .route("/api/get_tweet_details", get(get_tweet_details))
        .route("/ping", get(ping))
        .with_state(state)
        .layer(cors);

    // Wildcard origin on every response, including requests without an Origin header
    let router = if allow_all {
        router.layer(SetResponseHeaderLayer::if_not_present(
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            HeaderValue::from_static("*"),
        ))
    } else {
        router
    };

    // Add tracing
    router.layer(TraceLayer::new_for_http())
}

fn cors_layer(server: &HttpServerConfig) -> CorsLayer {
    if !server.enable_cors {
        return CorsLayer::new();
    }

    let origin = if server.cors_origins.is_empty() {
        AllowOrigin::from(Any)
    } else {
        let origins: Vec<HeaderValue> = server
            .cors_origins
            .iter()
            .filter_map(|origin| match HeaderValue::from_str(origin) {
                Ok(value) => Some(value),
                Err(_) => {
                    tracing::warn!("CORS: ignoring invalid origin {:?}", origin);
                    None
                }
            })
            .collect();
        tracing::info!("CORS: Allowing origins: {:?}", server.cors_origins);
        AllowOrigin::list(origins)
    };

    CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::OPTIONS,
            Method::PUT,
            Method::DELETE,
        ])
        .allow_headers([
            header::ORIGIN,
            HeaderName::from_static("x-requested-with"),
            header::CONTENT_TYPE,
            header::ACCEPT,
            header::AUTHORIZATION,
        ])
        .expose_headers([
            header::CONTENT_LENGTH,
            header::ACCESS_CONTROL_ALLOW_ORIGIN,
            header::ACCESS_CONTROL_ALLOW_HEADERS,
            header::CACHE_CONTROL,
            header::CONTENT_LANGUAGE,
            header::CONTENT_TYPE,
        ])
}

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
use clap::Parser;
use std::path::PathBuf;
use tweetscope_server::{config::ServerConfig, run_server};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file (TOML); defaults to the per-user config file
    #[arg(short, long, env = "TWEETSCOPE_CONFIG")]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config file)
    #[arg(long, env = "TWEETSCOPE_HTTP_ADDR")]
    http_addr: Option<String>,

    /// Upstream timeline contract: scroller, v1 or modules
    #[arg(long)]
    upstream: Option<String>,

    /// Append an error frame when a completion stream fails
    #[arg(long)]
    emit_error_event: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = ServerConfig::load(args.config.or_else(ServerConfig::default_path))?;

    // Apply CLI overrides
    if let Some(addr) = args.http_addr {
        config.server.listen_addr = addr;
    }
    if let Some(kind) = args.upstream {
        config.upstream.kind = kind.parse()?;
    }
    if args.emit_error_event {
        config.relay.emit_error_event = true;
    }

    // Run server
    run_server(config).await
}

// ABOUTME: Server entry point: logging, configuration, resource wiring, serve loop
// ABOUTME: Fails fast on misconfiguration before binding the port
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use anyhow::Result;
use chatbox_server::config::ServerConfig;
use chatbox_server::logging::init_logging;
use chatbox_server::{serve, ServerResources};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    init_logging()?;

    let config = ServerConfig::from_env()?;
    let resources = ServerResources::new(config).await?;

    serve(Arc::new(resources)).await?;
    Ok(())
}

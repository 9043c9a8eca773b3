//! Gatehouse: front-end bootstrap for a configurable reverse proxy.
//!
//! This is the process entry point. It parses the raw switches,
//! initializes tracing, normalizes and validates the runtime
//! configuration, constructs the routing engine, and hands both listeners
//! off to it. Fatal startup problems exit 1; interrupts exit 2 after
//! cleanup.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gatehouse::config::DEFAULT_LOG_FILTER;
use gatehouse::engine::NullEngine;
use gatehouse::lifecycle::{Lifecycle, EXIT_FAILURE};
use gatehouse::{http, ProxyConfig, RawOptions};

#[tokio::main]
async fn main() {
    let options = RawOptions::parse();

    // Initialize tracing with priority: CLI > env > default
    let log_filter = options
        .log_level
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(&log_filter))
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(error) = run(options).await {
        tracing::error!(%error, "startup failed");
        std::process::exit(EXIT_FAILURE);
    }
}

async fn run(options: RawOptions) -> gatehouse::Result<()> {
    Lifecycle::install_panic_hook();

    let config = ProxyConfig::from_options(&options)?;
    config.validate()?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "configuration validated");

    let engine = NullEngine::new(&config);
    let lifecycle = Arc::new(Lifecycle::new(config.pid_file.clone()));

    let result = http::serve(&engine, &config, lifecycle.clone()).await;
    lifecycle.cleanup();
    result
}

//! Twitter Cache Proxy - serve Twitter API responses from a local cache
//!
//! Loads credentials, confirms them against the API, then listens for
//! requests and answers them from the cache directory where possible.

use std::error::Error;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use reqwest::Client;
use tokio::net::TcpListener;

use twitter_cache_proxy::cache::{CacheOrchestrator, FsCacheStore};
use twitter_cache_proxy::cli::{Cli, ConfigError, StartupConfig};
use twitter_cache_proxy::upstream::{Credentials, TwitterClient};
use twitter_cache_proxy::{server, telemetry};

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = StartupConfig::from_cli(&cli)?;
    telemetry::init(config.log_level, config.log_format)?;

    tracing::info!(file = %config.twitter_auth.display(), "twitter auth file");
    tracing::debug!(cache_dir = %config.cache_dir.display(), "cache directory");
    tracing::debug!(seconds = config.ttl.as_secs(), "cache invalidates after");

    let credentials = Credentials::from_file(&config.twitter_auth)?;

    let mut http_client = Client::builder();
    if let Some(timeout) = config.upstream_timeout {
        http_client = http_client.timeout(timeout);
    }
    let client = TwitterClient::new(credentials)
        .with_client(http_client.build().map_err(ConfigError::HttpClient)?)
        .with_base_url(config.api_base_url.as_str());

    match client.verify().await.map_err(ConfigError::Authentication)? {
        Some(application) => tracing::info!(%application, "authenticated at Twitter"),
        None => tracing::info!("authenticated at Twitter"),
    }

    let store = FsCacheStore::with_dir(config.cache_dir.clone());
    let cache = CacheOrchestrator::new(Arc::new(store), Arc::new(client), config.ttl);

    let listener = TcpListener::bind(config.bind_addr)
        .await
        .map_err(|source| ConfigError::Bind {
            addr: config.bind_addr,
            source,
        })?;
    tracing::info!(addr = %config.bind_addr, "listening");

    server::serve(listener, server::build_router(cache)).await?;
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "fatal");
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

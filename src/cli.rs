//! Command-line interface parsing for the caching proxy
//!
//! Every option can also be set through a `PROXY_*` environment variable.
//! `StartupConfig::from_cli` validates the options once at startup; any error
//! it returns is fatal.

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use thiserror::Error;

use crate::cache::{default_cache_dir, parse_duration, DurationError, Ttl};
use crate::upstream::twitter::TWITTER_BASE_URL;
use crate::upstream::{CredentialsError, UpstreamError};

/// Errors that prevent the proxy from starting
#[derive(Debug, Error)]
pub enum ConfigError {
    /// `--cache-duration` is not a valid duration
    #[error("invalid --cache-duration: {0}")]
    InvalidCacheDuration(#[source] DurationError),

    /// `--upstream-timeout` is not a valid duration
    #[error("invalid --upstream-timeout: {0}")]
    InvalidTimeout(#[source] DurationError),

    /// `--hostname` does not resolve to an address
    #[error("invalid --hostname '{0}': unable to resolve address")]
    InvalidHostname(String),

    /// The credentials file is missing or malformed
    #[error(transparent)]
    Credentials(#[from] CredentialsError),

    /// The upstream rejected the credentials or could not be reached
    #[error("unable to authenticate to twitter: {0}")]
    Authentication(#[source] UpstreamError),

    /// The HTTP client could not be built
    #[error("unable to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),

    /// The logging subscriber could not be installed
    #[error("unable to initialize logging: {0}")]
    Telemetry(String),

    /// The listening socket could not be opened
    #[error("unable to listen on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        source: std::io::Error,
    },
}

/// Minimum level of log events to emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable single-line events
    #[default]
    Compact,
    /// One JSON object per event
    Json,
}

/// Caching proxy for the Twitter API
#[derive(Parser, Debug)]
#[command(name = "twitter-cache-proxy")]
#[command(about = "Caching pass-through proxy for Twitter API endpoints")]
#[command(version)]
pub struct Cli {
    /// Directory for cached response files [default: platform cache directory]
    #[arg(short = 'c', long, env = "PROXY_CACHE_DIR", value_name = "DIR")]
    pub cache_directory: Option<PathBuf>,

    /// How long cached responses stay fresh, as <integer><unit>
    ///
    /// Units: ms, s, m, h, d, w, M (months), Q (quarters), y
    #[arg(
        short = 'd',
        long,
        env = "PROXY_CACHE_DURATION",
        default_value = "7d",
        value_name = "DURATION"
    )]
    pub cache_duration: String,

    /// Address to listen on [default: all interfaces]
    #[arg(short = 'H', long, env = "PROXY_HOSTNAME", value_name = "HOST")]
    pub hostname: Option<String>,

    /// Port to listen on
    #[arg(short = 'p', long, env = "PROXY_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Log at this level and above (RUST_LOG overrides)
    #[arg(
        short = 'l',
        long,
        env = "PROXY_LOG_LEVEL",
        value_enum,
        default_value_t = LogLevel::Error
    )]
    pub log_level: LogLevel,

    /// Log output format
    #[arg(long, env = "PROXY_LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,

    /// JSON file with Twitter credentials
    #[arg(
        short = 't',
        long,
        env = "PROXY_TWITTER_AUTH",
        default_value = "./.twitter.json",
        value_name = "FILE"
    )]
    pub twitter_auth: PathBuf,

    /// Base URL of the Twitter API
    #[arg(long, env = "PROXY_API_BASE_URL", default_value = TWITTER_BASE_URL, value_name = "URL")]
    pub api_base_url: String,

    /// Timeout for upstream requests (0s disables)
    #[arg(
        long,
        env = "PROXY_UPSTREAM_TIMEOUT",
        default_value = "30s",
        value_name = "DURATION"
    )]
    pub upstream_timeout: String,
}

/// Configuration derived from CLI arguments for application startup
#[derive(Debug, Clone)]
pub struct StartupConfig {
    pub cache_dir: PathBuf,
    pub ttl: Ttl,
    pub bind_addr: SocketAddr,
    pub log_level: LogLevel,
    pub log_format: LogFormat,
    pub twitter_auth: PathBuf,
    pub api_base_url: String,
    /// `None` when upstream requests may take as long as they like
    pub upstream_timeout: Option<Duration>,
}

impl StartupConfig {
    /// Creates a StartupConfig from parsed CLI arguments.
    ///
    /// # Returns
    /// * `Ok(StartupConfig)` with durations parsed and the bind address resolved
    /// * `Err(ConfigError)` if a duration or the hostname is invalid
    pub fn from_cli(cli: &Cli) -> Result<Self, ConfigError> {
        let ttl = cli
            .cache_duration
            .parse::<Ttl>()
            .map_err(ConfigError::InvalidCacheDuration)?;

        let timeout = parse_duration(&cli.upstream_timeout).map_err(ConfigError::InvalidTimeout)?;
        let upstream_timeout = (!timeout.is_zero()).then_some(timeout);

        Ok(StartupConfig {
            cache_dir: cli
                .cache_directory
                .clone()
                .unwrap_or_else(default_cache_dir),
            ttl,
            bind_addr: resolve_bind_addr(cli.hostname.as_deref(), cli.port)?,
            log_level: cli.log_level,
            log_format: cli.log_format,
            twitter_auth: cli.twitter_auth.clone(),
            api_base_url: cli.api_base_url.clone(),
            upstream_timeout,
        })
    }
}

/// Resolves the listening address; no hostname means all interfaces
fn resolve_bind_addr(hostname: Option<&str>, port: u16) -> Result<SocketAddr, ConfigError> {
    let Some(host) = hostname else {
        return Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port));
    };

    if let Ok(ip) = host.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }

    (host, port)
        .to_socket_addrs()
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| ConfigError::InvalidHostname(host.to_string()))
}

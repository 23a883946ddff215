//! Twitter REST API v1.1 client
//!
//! Authenticates with an application-only bearer token. The token comes from
//! the credentials file or is obtained once from `oauth2/token` using the
//! consumer key and secret.

use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::OnceCell;

use super::{Upstream, UpstreamError};
use crate::cache::Params;

/// Base URL for the Twitter API
pub const TWITTER_BASE_URL: &str = "https://api.twitter.com";

/// Endpoint used to check credentials at startup
const VERIFY_ENDPOINT: &str = "application/rate_limit_status";

/// Errors from loading the credentials file
#[derive(Debug, Error)]
pub enum CredentialsError {
    /// The file could not be read
    #[error("unable to read credentials file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The file is not valid JSON
    #[error("invalid credentials file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// Neither a bearer token nor a consumer key/secret pair is present
    #[error("credentials file {} needs bearerToken or consumerKey and consumerSecret", path.display())]
    Incomplete { path: PathBuf },
}

/// Credentials file contents
///
/// `accessKey`/`accessSecret` may be present but are not used for
/// application-only authentication.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CredentialsFile {
    consumer_key: Option<String>,
    consumer_secret: Option<String>,
    bearer_token: Option<String>,
}

/// How the client authenticates against the API
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// A pre-issued application bearer token
    Bearer(String),
    /// A consumer key/secret pair exchanged for a bearer token on first use
    Consumer { key: String, secret: String },
}

impl Credentials {
    /// Loads credentials from a JSON file
    pub fn from_file(path: &Path) -> Result<Self, CredentialsError> {
        let content = std::fs::read_to_string(path).map_err(|source| CredentialsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: CredentialsFile =
            serde_json::from_str(&content).map_err(|source| CredentialsError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        match file {
            CredentialsFile {
                bearer_token: Some(token),
                ..
            } if !token.is_empty() => Ok(Credentials::Bearer(token)),
            CredentialsFile {
                consumer_key: Some(key),
                consumer_secret: Some(secret),
                ..
            } if !key.is_empty() && !secret.is_empty() => Ok(Credentials::Consumer { key, secret }),
            _ => Err(CredentialsError::Incomplete {
                path: path.to_path_buf(),
            }),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Bearer(_) => f.write_str("Credentials::Bearer(<redacted>)"),
            Credentials::Consumer { key, .. } => f
                .debug_struct("Credentials::Consumer")
                .field("key", key)
                .field("secret", &"<redacted>")
                .finish(),
        }
    }
}

/// Response from `oauth2/token`
#[derive(Debug, Deserialize)]
struct TokenResponse {
    token_type: String,
    access_token: String,
}

/// Client for the Twitter REST API
#[derive(Debug)]
pub struct TwitterClient {
    http_client: Client,
    /// Base URL for the API (allows override for testing)
    base_url: String,
    credentials: Credentials,
    token: OnceCell<String>,
}

impl TwitterClient {
    /// Creates a client against the public Twitter API
    pub fn new(credentials: Credentials) -> Self {
        Self {
            http_client: Client::new(),
            base_url: TWITTER_BASE_URL.to_string(),
            credentials,
            token: OnceCell::new(),
        }
    }

    /// Uses a custom HTTP client, e.g. one with a timeout
    pub fn with_client(mut self, client: Client) -> Self {
        self.http_client = client;
        self
    }

    /// Uses a custom base URL
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Makes one authenticated request to confirm the credentials work
    ///
    /// Returns the application the token belongs to, when the API reports it.
    pub async fn verify(&self) -> Result<Option<String>, UpstreamError> {
        let status = self.fetch(VERIFY_ENDPOINT, &Params::new()).await?;
        Ok(status
            .pointer("/rate_limit_context/application")
            .and_then(Value::as_str)
            .map(str::to_string))
    }

    fn endpoint_url(&self, endpoint: &str) -> String {
        format!("{}/1.1/{}.json", self.base_url, endpoint.trim_matches('/'))
    }

    async fn bearer_token(&self) -> Result<&str, UpstreamError> {
        self.token
            .get_or_try_init(|| self.request_bearer_token())
            .await
            .map(String::as_str)
    }

    async fn request_bearer_token(&self) -> Result<String, UpstreamError> {
        let (key, secret) = match &self.credentials {
            Credentials::Bearer(token) => return Ok(token.clone()),
            Credentials::Consumer { key, secret } => (key, secret),
        };

        tracing::debug!(base_url = %self.base_url, "requesting application bearer token");
        let response = self
            .http_client
            .post(format!("{}/oauth2/token", self.base_url))
            .basic_auth(key, Some(secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;

        let body = read_json(response).await?;
        let token: TokenResponse = serde_json::from_value(body)
            .map_err(|e| UpstreamError::InvalidResponse(e.to_string()))?;

        if !token.token_type.eq_ignore_ascii_case("bearer") {
            return Err(UpstreamError::InvalidResponse(format!(
                "unexpected token type '{}'",
                token.token_type
            )));
        }
        Ok(token.access_token)
    }
}

#[async_trait]
impl Upstream for TwitterClient {
    async fn fetch(&self, endpoint: &str, params: &Params) -> Result<Value, UpstreamError> {
        let token = self.bearer_token().await?;
        let url = self.endpoint_url(endpoint);

        let response = self
            .http_client
            .get(&url)
            .bearer_auth(token)
            .query(params)
            .send()
            .await
            .map_err(UpstreamError::from_reqwest)?;
        tracing::debug!(%url, status = response.status().as_u16(), "twitter request");

        read_json(response).await
    }
}

/// Reads a response body as JSON, turning non-success statuses into errors
///
/// Error bodies that are not JSON are passed on as a JSON string.
async fn read_json(response: reqwest::Response) -> Result<Value, UpstreamError> {
    let status = response.status();
    let bytes = response.bytes().await.map_err(UpstreamError::from_reqwest)?;

    if !status.is_success() {
        let body = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()));
        return Err(UpstreamError::Status {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_slice(&bytes).map_err(|e| UpstreamError::InvalidResponse(e.to_string()))
}

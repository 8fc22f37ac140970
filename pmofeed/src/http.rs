//! `reqwest`-backed [`Transport`]
//!
//! # Example
//!
//! ```no_run
//! use pmofeed::{HttpRequest, ReqwestTransport, Transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = ReqwestTransport::builder()
//!         .timeout(std::time::Duration::from_secs(10))
//!         .build()?;
//!
//!     let response = transport
//!         .send(HttpRequest::get("https://api.spotify.com/v1/me/playlists").query("limit", "20"))
//!         .await?;
//!     println!("{}", response.body);
//!     Ok(())
//! }
//! ```

use crate::error::{FeedError, Result};
use crate::transport::{HttpRequest, HttpResponse, Transport, TransportError};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

/// Default timeout for HTTP requests (30 seconds)
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Default User-Agent
pub const DEFAULT_USER_AGENT: &str = "PMOFeed/0.1.0 (pmofeed)";

/// HTTP transport over a shared `reqwest::Client`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Create a transport with default settings
    pub fn new() -> Result<Self> {
        Self::builder().build()
    }

    /// Create a builder for configuring the transport
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// Create a transport over an existing `reqwest::Client`
    ///
    /// Useful for sharing HTTP connection pools or custom proxy settings
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Get the internal HTTP client
    pub fn http_client(&self) -> &Client {
        &self.client
    }

    fn map_error(err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        debug!("{} with {} params", request, request.query.len());

        let mut builder = self
            .client
            .request(request.method.clone(), &request.url)
            .query(&request.query);

        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        if let Some(form) = &request.form {
            builder = builder.form(form);
        }

        let response = builder.send().await.map_err(Self::map_error)?;
        let status = response.status();
        let status_code = status.as_u16();

        debug!("Response status: {}", status);

        let body = response.text().await.map_err(Self::map_error)?;

        if !status.is_success() {
            warn!(status = status_code, "HTTP error for {}", request);
            return Err(TransportError::from_status(status_code, body));
        }

        Ok(HttpResponse::new(status_code, body))
    }
}

/// Builder for [`ReqwestTransport`]
#[derive(Debug)]
pub struct ClientBuilder {
    client: Option<Client>,
    timeout: Duration,
    user_agent: String,
    proxy: Option<String>,
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self {
            client: None,
            timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            proxy: None,
        }
    }
}

impl ClientBuilder {
    /// Create a new builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a custom HTTP client
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set a custom User-Agent header
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set a proxy URL
    pub fn proxy(mut self, proxy: impl Into<String>) -> Self {
        self.proxy = Some(proxy.into());
        self
    }

    /// Build the transport
    pub fn build(self) -> Result<ReqwestTransport> {
        let client = if let Some(client) = self.client {
            client
        } else {
            let mut builder = Client::builder()
                .user_agent(&self.user_agent)
                .timeout(self.timeout);

            if let Some(proxy_url) = &self.proxy {
                let proxy = reqwest::Proxy::all(proxy_url)
                    .map_err(|e| FeedError::other(format!("Invalid proxy: {}", e)))?;
                builder = builder.proxy(proxy);
            }

            builder
                .build()
                .map_err(|e| FeedError::other(format!("Failed to build HTTP client: {}", e)))?
        };

        Ok(ReqwestTransport { client })
    }
}

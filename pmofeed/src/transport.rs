//! Transport adapter: one call issues exactly one HTTP request
//!
//! The core never parses provider payloads at this level. It only needs to
//! tell an authorization failure (HTTP 401) apart from every other failure,
//! which is why [`TransportError::Unauthorized`] is its own variant.

use async_trait::async_trait;
use reqwest::Method;
use std::fmt;

/// HTTP status code reported for an expired or revoked access token
pub const STATUS_UNAUTHORIZED: u16 = 401;

/// A single HTTP request, independent of the underlying client
#[derive(Debug, Clone, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    /// Absolute URL
    pub url: String,
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    /// `application/x-www-form-urlencoded` body
    pub form: Option<Vec<(String, String)>>,
}

impl HttpRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            query: Vec::new(),
            headers: Vec::new(),
            form: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn post_form<K, V>(url: impl Into<String>, form: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        let mut request = Self::new(Method::POST, url);
        request.form = Some(
            form.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        );
        request
    }

    /// Appends a query parameter
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Sets a header, replacing any previous value with the same name
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        self.headers.retain(|(n, _)| !n.eq_ignore_ascii_case(&name));
        self.headers.push((name, value.into()));
        self
    }

    /// Sets the `Authorization: Bearer` header
    pub fn bearer(self, token: &str) -> Self {
        self.header("Authorization", format!("Bearer {}", token))
    }

    /// Looks up a header value (case-insensitive)
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// A successful (2xx) HTTP response
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Decodes the body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_str(&self.body)
    }
}

/// Failure of a single transport call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// HTTP 401: the access token was rejected
    #[error("Unauthorized (401): {message}")]
    Unauthorized { message: String },

    /// Any other non-success HTTP status
    #[error("HTTP error {status}: {message}")]
    Status { status: u16, message: String },

    /// The request did not complete in time
    #[error("Request timeout")]
    Timeout,

    /// Connection, DNS, TLS or body read failure
    #[error("Network error: {0}")]
    Network(String),
}

impl TransportError {
    /// Builds the error matching an HTTP status code
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            STATUS_UNAUTHORIZED => Self::Unauthorized {
                message: message.into(),
            },
            _ => Self::Status {
                status,
                message: message.into(),
            },
        }
    }

    /// HTTP status code, when the server answered
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Unauthorized { .. } => Some(STATUS_UNAUTHORIZED),
            Self::Status { status, .. } => Some(*status),
            Self::Timeout | Self::Network(_) => None,
        }
    }

    /// True for HTTP 401 only
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized { .. })
    }
}

/// Issues one HTTP request and reports its outcome
///
/// Implementations must map HTTP 401 to [`TransportError::Unauthorized`]
/// and every other non-2xx status to [`TransportError::Status`].
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        (**self).send(request).await
    }
}

impl fmt::Display for HttpRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method, self.url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_discriminates_401() {
        assert!(TransportError::from_status(401, "expired").is_unauthorized());
        assert!(!TransportError::from_status(403, "forbidden").is_unauthorized());
        assert_eq!(TransportError::from_status(500, "boom").status(), Some(500));
        assert_eq!(TransportError::Timeout.status(), None);
    }

    #[test]
    fn test_header_replaces_case_insensitively() {
        let request = HttpRequest::get("https://example.com")
            .header("authorization", "Bearer old")
            .bearer("new");

        assert_eq!(request.headers.len(), 1);
        assert_eq!(request.header_value("Authorization"), Some("Bearer new"));
    }

    #[test]
    fn test_post_form() {
        let request = HttpRequest::post_form("https://example.com/token", [("a", "1")]);
        assert_eq!(request.method, Method::POST);
        assert_eq!(
            request.form,
            Some(vec![("a".to_string(), "1".to_string())])
        );
    }
}

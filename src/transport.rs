//! Transport used to fetch resources
//!
//! The fetcher only needs "GET this key and give me JSON". `HttpTransport`
//! implements that over reqwest; tests plug in scripted transports.
//! Cancellation is by dropping the returned future.

use async_trait::async_trait;
use reqwest::Client;
use thiserror::Error;

/// Errors that can occur when fetching a resource
#[derive(Debug, Error)]
pub enum FetchError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server answered with a non-success status
    #[error("HTTP {0}")]
    Status(u16),

    /// Failed to parse JSON response
    #[error("Failed to parse JSON response: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Performs a GET for a resource key and returns its JSON body
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, key: &str) -> Result<serde_json::Value, FetchError>;
}

/// Client for fetching JSON resources over HTTP
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Option<String>,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    /// Create a new HttpTransport with default settings
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: None,
        }
    }

    /// Create a new HttpTransport with a custom HTTP client
    pub fn with_client(client: Client) -> Self {
        Self {
            client,
            base_url: None,
        }
    }

    /// Resolve relative keys against `base_url`
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    /// Turns a resource key into the URL to request
    ///
    /// Absolute `http://` and `https://` keys are used as is; anything else
    /// is joined to the base URL when one is set.
    pub fn url_for(&self, key: &str) -> String {
        if key.starts_with("http://") || key.starts_with("https://") {
            return key.to_string();
        }
        match &self.base_url {
            Some(base) => format!("{}/{}", base.trim_end_matches('/'), key.trim_start_matches('/')),
            None => key.to_string(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, key: &str) -> Result<serde_json::Value, FetchError> {
        let response = self.client.get(self.url_for(key)).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let text = response.text().await?;
        Ok(serde_json::from_str(&text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_for_absolute_key_ignores_base() {
        let transport = HttpTransport::new().with_base_url("https://api.example.com");
        assert_eq!(
            transport.url_for("https://jsonplaceholder.typicode.com/users/1"),
            "https://jsonplaceholder.typicode.com/users/1"
        );
    }

    #[test]
    fn test_url_for_joins_relative_key() {
        let transport = HttpTransport::new().with_base_url("https://api.example.com/");
        assert_eq!(transport.url_for("/users/1"), "https://api.example.com/users/1");
        assert_eq!(transport.url_for("users/1"), "https://api.example.com/users/1");
    }

    #[test]
    fn test_url_for_without_base_returns_key() {
        let transport = HttpTransport::new();
        assert_eq!(transport.url_for("users/1"), "users/1");
    }

    #[test]
    fn test_fetch_error_messages() {
        assert_eq!(FetchError::Status(404).to_string(), "HTTP 404");

        let parse = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        assert!(FetchError::from(parse).to_string().contains("Failed to parse JSON"));
    }
}

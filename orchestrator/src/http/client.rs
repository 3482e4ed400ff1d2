//! HTTP client implementation

use std::time::Duration;

use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, error};

use crate::errors::DeployError;

/// JSON-over-HTTP client for the metrics backend and webhooks
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl HttpClient {
    /// Create a new HTTP client
    pub fn new(timeout: Duration) -> Result<Self, DeployError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("deployctl/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }

    /// Make a POST request and decode the JSON response
    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        url: &str,
        body: &B,
        token: Option<&SecretString>,
    ) -> Result<T, DeployError> {
        let response = self.send_post(url, body, token).await?;
        let body = response.json().await?;
        Ok(body)
    }

    /// Make a POST request, ignoring the response body
    pub async fn post_no_content<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        token: Option<&SecretString>,
    ) -> Result<(), DeployError> {
        self.send_post(url, body, token).await?;
        Ok(())
    }

    async fn send_post<B: Serialize>(
        &self,
        url: &str,
        body: &B,
        token: Option<&SecretString>,
    ) -> Result<reqwest::Response, DeployError> {
        debug!("POST {}", url);

        let mut request = self.client.post(url).json(body);
        if let Some(token) = token {
            request = request.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            );
        }

        let response = request.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("HTTP POST failed: {} - {}", status, body);
            return Err(DeployError::HttpStatus(format!(
                "POST {} returned {}: {}",
                url, status, body
            )));
        }

        Ok(response)
    }
}

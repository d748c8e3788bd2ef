//! HTTP client for the coupon server

use crate::{error::AppError, Result};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: Client,
    base_url: String,
    service_name: String,
}

impl ServiceClient {
    pub fn new(base_url: String, service_name: String, timeout_seconds: u64) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_seconds))
            .build()
            .map_err(|e| AppError::configuration(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            service_name,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Make a POST request with extra headers.
    ///
    /// A non-2xx status comes back next to the decoded body. Only transport
    /// failures and undecodable bodies are errors.
    pub async fn post_with_headers<T, R>(
        &self,
        endpoint: &str,
        body: &T,
        headers: &[(&str, String)],
    ) -> Result<(StatusCode, R)>
    where
        T: Serialize,
        R: for<'de> Deserialize<'de>,
    {
        let url = format!("{}{}", self.base_url, endpoint);
        tracing::debug!("📤 POST {} ({})", url, self.service_name);

        let mut request = self.client.post(&url).json(body);
        for (name, value) in headers {
            request = request.header(*name, value);
        }

        let response = request.send().await.map_err(|e| self.map_reqwest_error(e))?;

        self.decode_response(response).await
    }

    /// Decode the body whatever the status was
    async fn decode_response<R>(&self, response: Response) -> Result<(StatusCode, R)>
    where
        R: for<'de> Deserialize<'de>,
    {
        let status = response.status();
        let text = response.text().await.map_err(|e| self.map_reqwest_error(e))?;

        serde_json::from_str::<R>(&text)
            .map(|body| (status, body))
            .map_err(|e| {
                AppError::external_service(
                    &self.service_name,
                    format!("HTTP {} - failed to deserialize response: {}", status, e),
                )
            })
    }

    /// Map reqwest errors to AppError
    fn map_reqwest_error(&self, error: reqwest::Error) -> AppError {
        if error.is_timeout() {
            AppError::timeout(format!("Request to {} timed out", self.service_name))
        } else if error.is_connect() {
            AppError::service_unavailable(&self.service_name)
        } else {
            AppError::external_service(&self.service_name, error.to_string())
        }
    }
}

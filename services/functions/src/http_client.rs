use crate::error::FetchError;
use async_trait::async_trait;
use bytes::Bytes;
use std::time::Duration;
use tracing::{debug, instrument};

/// Outbound HTTP used for scraping pages, oEmbed lookups and image downloads
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// GET a URL as text with the given user agent
    async fn get_text(&self, url: &str, user_agent: &str) -> Result<String, FetchError>;

    /// GET a URL as raw bytes
    async fn get_bytes(&self, url: &str) -> Result<Bytes, FetchError>;
}

/// reqwest-backed HTTP client
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> Result<Self, FetchError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self { client })
    }

    async fn get(
        &self,
        url: &str,
        user_agent: Option<&str>,
    ) -> Result<reqwest::Response, FetchError> {
        let mut request = self.client.get(url);
        if let Some(user_agent) = user_agent {
            request = request.header(reqwest::header::USER_AGENT, user_agent);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                status: status.as_u16(),
            });
        }

        Ok(response)
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    #[instrument(skip(self, user_agent))]
    async fn get_text(&self, url: &str, user_agent: &str) -> Result<String, FetchError> {
        let body = self.get(url, Some(user_agent)).await?.text().await?;
        debug!(size_bytes = body.len(), "Fetched page");
        Ok(body)
    }

    #[instrument(skip(self))]
    async fn get_bytes(&self, url: &str) -> Result<Bytes, FetchError> {
        let body = self.get(url, None).await?.bytes().await?;
        debug!(size_bytes = body.len(), "Fetched binary content");
        Ok(body)
    }
}

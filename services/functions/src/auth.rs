use crate::config::AuthConfig;
use crate::error::FunctionError;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, instrument};

/// Resolves a caller credential to a user id
#[async_trait]
pub trait AuthVerifier: Send + Sync {
    /// `credential` is the raw `Authorization` header value
    async fn verify(&self, credential: &str) -> Result<String, FunctionError>;
}

#[derive(Debug, Deserialize)]
struct AuthUser {
    id: String,
}

/// Verifies credentials against a GoTrue-style `GET {auth_url}/user` endpoint
pub struct HttpAuthVerifier {
    client: reqwest::Client,
    user_endpoint: String,
    api_key: Option<String>,
}

impl HttpAuthVerifier {
    pub fn new(config: &AuthConfig, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            user_endpoint: format!("{}/user", config.url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
        })
    }
}

#[async_trait]
impl AuthVerifier for HttpAuthVerifier {
    #[instrument(skip_all)]
    async fn verify(&self, credential: &str) -> Result<String, FunctionError> {
        let mut request = self
            .client
            .get(&self.user_endpoint)
            .header(reqwest::header::AUTHORIZATION, credential);
        if let Some(ref api_key) = self.api_key {
            request = request.header("apikey", api_key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| FunctionError::Unauthorized(e.to_string()))?;

        if !response.status().is_success() {
            return Err(FunctionError::Unauthorized(format!(
                "auth endpoint returned {}",
                response.status().as_u16()
            )));
        }

        let user: AuthUser = response
            .json()
            .await
            .map_err(|e| FunctionError::Unauthorized(e.to_string()))?;

        debug!(user_id = %user.id, "Credential verified");
        Ok(user.id)
    }
}

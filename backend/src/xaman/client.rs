use super::payload::{CreatedPayload, PayloadDetails};
use crate::{
    config::XamanConfig,
    error::{AppError, Result},
};
use serde_json::Value;
use std::time::Duration;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Thin REST client for the Xaman platform API.
#[derive(Clone)]
pub struct XamanClient {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    api_secret: String,
}

impl XamanClient {
    pub fn new(config: &XamanConfig) -> Self {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            http,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            api_secret: config.api_secret.clone(),
        }
    }

    fn ensure_credentials(&self) -> Result<()> {
        if self.api_key.is_empty() || self.api_secret.is_empty() {
            return Err(AppError::Upstream(
                "Xaman API credentials are not configured".to_string(),
            ));
        }
        Ok(())
    }

    pub async fn create_payload(&self, body: &Value) -> Result<CreatedPayload> {
        self.ensure_credentials()?;

        let response = self
            .http
            .post(format!("{}/payload", self.api_url))
            .header("X-API-Key", &self.api_key)
            .header("X-API-Secret", &self.api_secret)
            .json(body)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("create payload request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "create payload returned {}: {}",
                status, detail
            )));
        }

        response
            .json::<CreatedPayload>()
            .await
            .map_err(|e| AppError::Upstream(format!("invalid create payload response: {}", e)))
    }

    pub async fn get_payload(&self, uuid: &str) -> Result<PayloadDetails> {
        self.ensure_credentials()?;

        let response = self
            .http
            .get(format!("{}/payload/{}", self.api_url, uuid))
            .header("X-API-Key", &self.api_key)
            .header("X-API-Secret", &self.api_secret)
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("get payload request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "get payload {} returned {}: {}",
                uuid, status, detail
            )));
        }

        response
            .json::<PayloadDetails>()
            .await
            .map_err(|e| AppError::Upstream(format!("invalid payload details: {}", e)))
    }
}

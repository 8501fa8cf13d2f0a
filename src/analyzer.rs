//! Client for the external moderation/sentiment analyzer.
//!
//! Each call carries a hard deadline; callers fall back to a default
//! verdict when the analyzer is slow or down, so errors here never stall
//! the pipeline.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::AnalyzerConfig;
use crate::error::AppResult;
use crate::kafka::types::Sentiment;

#[derive(Debug, Serialize)]
struct AnalyzeRequest<'a> {
    text: &'a str,
    #[serde(rename = "messageId")]
    message_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct ModerateResponse {
    pub flagged: bool,
    #[serde(default)]
    pub reasons: Option<Vec<String>>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct SentimentResponse {
    pub sentiment: Sentiment,
    #[serde(default)]
    pub confidence: Option<f64>,
}

#[derive(Clone)]
pub struct AnalyzerClient {
    http: reqwest::Client,
    base_url: String,
    shared_secret: String,
}

impl AnalyzerClient {
    pub fn new(config: &AnalyzerConfig) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            shared_secret: config.shared_secret.clone(),
        })
    }

    pub async fn moderate(&self, message_id: &str, text: &str) -> AppResult<ModerateResponse> {
        self.post("/moderate", message_id, text).await
    }

    pub async fn sentiment(&self, message_id: &str, text: &str) -> AppResult<SentimentResponse> {
        self.post("/sentiment", message_id, text).await
    }

    async fn post<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        message_id: &str,
        text: &str,
    ) -> AppResult<T> {
        let response = self
            .http
            .post(format!("{}{}", self.base_url, path))
            .header("x-service-secret", &self.shared_secret)
            .json(&AnalyzeRequest { text, message_id })
            .send()
            .await?
            .error_for_status()?;
        Ok(response.json().await?)
    }
}

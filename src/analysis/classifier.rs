//! Classifier clients.
//!
//! The classifier is an external, untrusted and possibly slow service that
//! turns an image into a description and tags.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::ImageSnapshot;
use crate::config::ClassifierConfig;

/// What the classifier says about an image
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Classification {
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, alias = "confidence_score")]
    pub confidence: Option<f64>,
}

/// An image classification backend
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Describe an image
    async fn classify(&self, image: &ImageSnapshot) -> Result<Classification, ClassifierError>;
}

/// Build the classifier selected by configuration.
///
/// With no endpoint configured the mock classifier is used.
pub fn from_config(config: &ClassifierConfig) -> Result<Arc<dyn Classifier>, ClassifierError> {
    match &config.endpoint {
        Some(endpoint) => Ok(Arc::new(HttpClassifier::new(
            endpoint.clone(),
            config.prompt.clone(),
            config.timeout(),
        )?)),
        None => Ok(Arc::new(MockClassifier::new(Duration::from_millis(
            config.mock_delay_ms,
        )))),
    }
}

/// Classifier reached over HTTP
pub struct HttpClassifier {
    client: Client,
    endpoint: String,
    prompt: String,
    timeout: Duration,
}

#[derive(Debug, Serialize)]
struct ClassifyRequest<'a> {
    image: String,
    media_type: &'a str,
    prompt: &'a str,
}

impl HttpClassifier {
    pub fn new(
        endpoint: impl Into<String>,
        prompt: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, ClassifierError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            prompt: prompt.into(),
            timeout,
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Classifier for HttpClassifier {
    fn name(&self) -> &str {
        "http"
    }

    async fn classify(&self, image: &ImageSnapshot) -> Result<Classification, ClassifierError> {
        let body = ClassifyRequest {
            image: image.to_base64(),
            media_type: &image.media_type,
            prompt: &self.prompt,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ClassifierError::Timeout(self.timeout)
                } else if e.is_connect() {
                    ClassifierError::Unavailable
                } else {
                    ClassifierError::Request(e)
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ClassifierError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let classification: Classification = response
            .json()
            .await
            .map_err(|e| ClassifierError::InvalidResponse(e.to_string()))?;

        if classification.description.trim().is_empty() {
            return Err(ClassifierError::InvalidResponse(
                "empty description".to_string(),
            ));
        }

        Ok(classification)
    }
}

/// Stand-in model used when no classifier endpoint is configured.
///
/// Waits to simulate model latency, then always describes a house.
pub struct MockClassifier {
    delay: Duration,
}

impl MockClassifier {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl Classifier for MockClassifier {
    fn name(&self) -> &str {
        "mock"
    }

    async fn classify(&self, image: &ImageSnapshot) -> Result<Classification, ClassifierError> {
        tracing::debug!(bytes = image.len(), "Mock classifier received image");
        tokio::time::sleep(self.delay).await;

        Ok(Classification {
            description: "Based on my analysis, this appears to be a drawing of a house."
                .to_string(),
            tags: vec![
                "house".to_string(),
                "drawing".to_string(),
                "building".to_string(),
                "art".to_string(),
            ],
            confidence: Some(0.85),
        })
    }
}

/// Errors that can occur when talking to the classifier
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("classifier did not respond within {}s", .0.as_secs_f64())]
    Timeout(Duration),

    #[error("classifier unavailable")]
    Unavailable,

    #[error("classifier request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("classifier returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("classifier returned an invalid response: {0}")]
    InvalidResponse(String),

    #[error("classifier crashed: {0}")]
    Panicked(String),
}

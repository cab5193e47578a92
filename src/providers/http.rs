/*!
 * HTTP clients for the similarity and image-analysis services.
 */

use async_trait::async_trait;
use log::{debug, error};
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;
use url::Url;

use crate::app_config::CollaboratorSettings;
use crate::errors::CollaboratorError;

use super::{ImageSafetyChecker, ImageSafetyReport, SimilarityChecker, SimilarityReport};

#[derive(Debug, Serialize)]
struct SimilarityRequest<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
struct ImageSafetyRequest<'a> {
    url: &'a str,
}

/// Shared JSON-over-HTTP plumbing
#[derive(Debug, Clone)]
struct ServiceClient {
    client: Client,
    base: Url,
    api_key: String,
    timeout_secs: u64,
}

impl ServiceClient {
    fn new(endpoint: &str, api_key: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        // Without a trailing slash `join` would replace the last path segment
        let base = if endpoint.ends_with('/') {
            Url::parse(endpoint)?
        } else {
            Url::parse(&format!("{}/", endpoint))?
        };
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self {
            client,
            base,
            api_key: api_key.to_string(),
            timeout_secs,
        })
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, CollaboratorError>
    where
        B: Serialize + ?Sized,
        R: serde::de::DeserializeOwned,
    {
        let url = self
            .base
            .join(path)
            .map_err(|e| CollaboratorError::Unreachable(format!("invalid URL: {}", e)))?;

        let mut request = self.client.post(url.clone()).json(body);
        if !self.api_key.is_empty() {
            request = request.bearer_auth(&self.api_key);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                CollaboratorError::Timeout(self.timeout_secs)
            } else {
                CollaboratorError::Unreachable(e.to_string())
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to get error response text".to_string());
            error!("{} responded with {}: {}", url, status, message);
            return Err(CollaboratorError::BadResponse {
                status_code: status.as_u16(),
                message,
            });
        }

        debug!("{} responded with {}", url, status);
        response
            .json::<R>()
            .await
            .map_err(|e| CollaboratorError::Parse(e.to_string()))
    }
}

/// Similarity service client, `POST {endpoint}/similarity`
#[derive(Debug, Clone)]
pub struct HttpSimilarityChecker {
    inner: ServiceClient,
}

impl HttpSimilarityChecker {
    pub fn new(endpoint: &str, api_key: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        Ok(Self {
            inner: ServiceClient::new(endpoint, api_key, timeout_secs)?,
        })
    }

    /// Client for the configured endpoint, `None` when none is set
    pub fn from_settings(settings: &CollaboratorSettings) -> anyhow::Result<Option<Self>> {
        if settings.similarity_endpoint.is_empty() {
            return Ok(None);
        }
        Self::new(&settings.similarity_endpoint, &settings.api_key, settings.timeout_secs).map(Some)
    }
}

#[async_trait]
impl SimilarityChecker for HttpSimilarityChecker {
    async fn check_similarity(&self, text: &str) -> Result<SimilarityReport, CollaboratorError> {
        self.inner.post("similarity", &SimilarityRequest { text }).await
    }
}

/// Image-analysis service client, `POST {endpoint}/image-safety`
#[derive(Debug, Clone)]
pub struct HttpImageSafetyChecker {
    inner: ServiceClient,
}

impl HttpImageSafetyChecker {
    pub fn new(endpoint: &str, api_key: &str, timeout_secs: u64) -> anyhow::Result<Self> {
        Ok(Self {
            inner: ServiceClient::new(endpoint, api_key, timeout_secs)?,
        })
    }

    /// Client for the configured endpoint, `None` when none is set
    pub fn from_settings(settings: &CollaboratorSettings) -> anyhow::Result<Option<Self>> {
        if settings.image_endpoint.is_empty() {
            return Ok(None);
        }
        Self::new(&settings.image_endpoint, &settings.api_key, settings.timeout_secs).map(Some)
    }
}

#[async_trait]
impl ImageSafetyChecker for HttpImageSafetyChecker {
    async fn check_image_safety(&self, url: &str) -> Result<ImageSafetyReport, CollaboratorError> {
        self.inner.post("image-safety", &ImageSafetyRequest { url }).await
    }
}

//! Remote seed image fetching

use crate::error::AcquisitionError;
use async_trait::async_trait;
use craft_element::{ImagePayload, MediaType};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use std::fmt::Debug;

/// Fetches image bytes from a URL
#[async_trait]
pub trait ImageFetcher: Send + Sync + Debug {
    /// Fetch one image
    async fn fetch(&self, url: &str) -> Result<ImagePayload, AcquisitionError>;
}

/// [`ImageFetcher`] over HTTP
#[derive(Debug, Clone, Default)]
pub struct HttpImageFetcher {
    client: Client,
}

impl HttpImageFetcher {
    /// Fetcher with a default client
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetcher sharing an existing client
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ImageFetcher for HttpImageFetcher {
    async fn fetch(&self, url: &str) -> Result<ImagePayload, AcquisitionError> {
        let network = |e: reqwest::Error| AcquisitionError::Network {
            url: url.to_string(),
            message: e.to_string(),
        };

        let response = self
            .client
            .get(url)
            .header(ACCEPT, "image/*")
            .send()
            .await
            .map_err(network)?;

        let status = response.status();
        if !status.is_success() {
            return Err(AcquisitionError::Http {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let media_type = media_type_of(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|v| v.to_str().ok()),
        );
        let bytes = response.bytes().await.map_err(network)?;
        if bytes.is_empty() {
            return Err(AcquisitionError::EmptyBody {
                url: url.to_string(),
            });
        }

        tracing::debug!(url, len = bytes.len(), media_type = %media_type, "fetched remote image");
        Ok(ImagePayload::new(bytes.to_vec(), media_type))
    }
}

/// Media type from a `Content-Type` value; anything not `image/*` reads as JPEG
fn media_type_of(header: Option<&str>) -> MediaType {
    header
        .map(MediaType::new)
        .filter(MediaType::is_image)
        .unwrap_or_else(MediaType::jpeg)
}

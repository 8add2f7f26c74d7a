//! Image acquisition: HTTP download plus decode.

use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::engine::SourceImage;
use crate::error::FetchError;

/// Fetches and decodes source images.
#[async_trait]
pub trait ImageSource: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<SourceImage, FetchError>;
}

/// Downloads images over HTTP(S) and decodes them with the `image` crate.
#[derive(Debug, Clone)]
pub struct HttpImageSource {
    client: reqwest::Client,
}

impl HttpImageSource {
    /// Create a source whose downloads give up after `timeout`, if set.
    pub fn new(timeout: Option<Duration>) -> Result<Self, FetchError> {
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl ImageSource for HttpImageSource {
    async fn fetch(&self, url: &str) -> Result<SourceImage, FetchError> {
        info!(url = %url, "Downloading image");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        debug!(url = %url, status = %status, "Image response received");
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }

        let bytes = response.bytes().await?;
        info!(url = %url, bytes = bytes.len(), "Image downloaded");

        let image = tokio::task::spawn_blocking(move || image::load_from_memory(&bytes))
            .await
            .map_err(|e| FetchError::Decode(e.to_string()))?
            .map_err(|e| FetchError::Decode(e.to_string()))?;

        Ok(SourceImage {
            url: url.to_string(),
            image,
        })
    }
}

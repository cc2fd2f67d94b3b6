//! Payload resolution over HTTP

use crate::{
    backends::PayloadResolver,
    error::{Result, SmileDesignError},
    services::ImageIOService,
    types::ImagePayload,
};
use async_trait::async_trait;
use image::DynamicImage;
use reqwest::{Client, StatusCode};
use std::time::Duration;

/// Decodes inline bytes and `data:` URLs locally and downloads `http(s)` references
#[derive(Debug, Clone)]
pub struct HttpPayloadResolver {
    client: Client,
}

impl HttpPayloadResolver {
    /// Create a resolver with its own HTTP client
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| SmileDesignError::network_error("build HTTP client", e))?;
        Ok(Self { client })
    }

    /// Share an existing HTTP client
    #[must_use]
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SmileDesignError::network_error(format!("download {}", url), e))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(SmileDesignError::throttled(format!("download {}", url)));
        }
        if !status.is_success() {
            return Err(SmileDesignError::upstream(
                Some(status.as_u16()),
                format!("download {} failed", url),
            ));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| SmileDesignError::network_error("read downloaded image", e))?;
        log::debug!("Downloaded {} bytes from {}", bytes.len(), url);
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl PayloadResolver for HttpPayloadResolver {
    async fn resolve(&self, payload: &ImagePayload) -> Result<DynamicImage> {
        let bytes = match payload {
            ImagePayload::Bytes(bytes) => return ImageIOService::load_from_bytes(bytes),
            ImagePayload::Reference(location) if location.starts_with("data:") => {
                ImageIOService::decode_base64(location)?
            },
            ImagePayload::Reference(location)
                if location.starts_with("https://") || location.starts_with("http://") =>
            {
                self.download(location).await?
            },
            ImagePayload::Reference(location) => {
                return Err(SmileDesignError::upstream(
                    None,
                    format!("unsupported output reference '{}'", location),
                ));
            },
        };

        if bytes.is_empty() {
            return Err(SmileDesignError::upstream_empty("resolved output has no bytes"));
        }
        ImageIOService::load_from_bytes(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn resolver() -> HttpPayloadResolver {
        HttpPayloadResolver::new(Duration::from_secs(5)).unwrap()
    }

    #[tokio::test]
    async fn test_resolves_inline_bytes_and_data_urls() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([1, 2, 3])));

        let bytes = ImagePayload::png(&image).unwrap();
        let decoded = resolver().resolve(&bytes).await.unwrap();
        assert_eq!(decoded.to_rgb8(), image.to_rgb8());

        let url = ImagePayload::Reference(ImageIOService::encode_png_data_url(&image).unwrap());
        let decoded = resolver().resolve(&url).await.unwrap();
        assert_eq!(decoded.to_rgb8(), image.to_rgb8());
    }

    #[tokio::test]
    async fn test_rejects_unknown_scheme() {
        let payload = ImagePayload::Reference("ftp://example.com/out.png".to_string());
        let result = resolver().resolve(&payload).await;
        assert!(matches!(result, Err(SmileDesignError::Upstream { .. })));
    }
}

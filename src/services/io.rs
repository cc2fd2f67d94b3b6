//! Image I/O operations service
//!
//! This module separates file and wire encoding concerns from the masking
//! and synthesis logic, so both can be tested on in-memory images.

use crate::error::{Result, SmileDesignError};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use image::{DynamicImage, ImageFormat};
use std::io::Cursor;
use std::path::Path;

/// Service for handling image file and payload input/output
pub struct ImageIOService;

impl ImageIOService {
    /// Load an image from a file path
    ///
    /// Falls back to content sniffing when the extension is missing or wrong.
    ///
    /// # Examples
    /// ```rust,no_run
    /// use smile_design::services::ImageIOService;
    ///
    /// let image = ImageIOService::load_image("portrait.jpg")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load_image<P: AsRef<Path>>(path: P) -> Result<DynamicImage> {
        let path_ref = path.as_ref();

        if !path_ref.exists() {
            return Err(SmileDesignError::file_io_error(
                "read image file",
                path_ref,
                &std::io::Error::new(std::io::ErrorKind::NotFound, "file does not exist"),
            ));
        }

        match image::open(path_ref) {
            Ok(img) => Ok(img),
            Err(e) => {
                log::debug!(
                    "Extension-based loading failed for {}: {}. Attempting content-based detection.",
                    path_ref.display(),
                    e
                );
                let data = std::fs::read(path_ref).map_err(|io_err| {
                    SmileDesignError::file_io_error("read image data", path_ref, &io_err)
                })?;
                Self::load_from_bytes(&data)
            },
        }
    }

    /// Save an image, picking the encoder from the file extension (PNG when unknown)
    ///
    /// Parent directories are created as needed.
    pub fn save_image<P: AsRef<Path>>(image: &DynamicImage, path: P) -> Result<()> {
        let path_ref = path.as_ref();

        if let Some(parent) = path_ref.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                SmileDesignError::file_io_error("create output directory", parent, &e)
            })?;
        }

        let format = ImageFormat::from_path(path_ref).unwrap_or(ImageFormat::Png);
        let result = match format {
            // JPEG has no alpha channel
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8())
                .save_with_format(path_ref, format),
            _ => image.save_with_format(path_ref, format),
        };
        result?;

        log::debug!("Saved {:?} image to {}", format, path_ref.display());
        Ok(())
    }

    /// Decode an image from encoded bytes
    pub fn load_from_bytes(bytes: &[u8]) -> Result<DynamicImage> {
        if bytes.is_empty() {
            return Err(SmileDesignError::invalid_input("image data is empty"));
        }
        Ok(image::load_from_memory(bytes)?)
    }

    /// Encode an image as PNG bytes
    pub fn encode_png(image: &DynamicImage) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        image.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)?;
        Ok(buffer)
    }

    /// Encode an image as baseline JPEG bytes (alpha is dropped)
    pub fn encode_jpeg(image: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
        let mut buffer = Vec::new();
        {
            let mut encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(
                &mut buffer,
                quality.clamp(1, 100),
            );
            encoder.encode_image(&image.to_rgb8())?;
        }
        Ok(buffer)
    }

    /// Encode an image as a `data:image/png;base64,...` URL
    pub fn encode_png_data_url(image: &DynamicImage) -> Result<String> {
        let bytes = Self::encode_png(image)?;
        Ok(format!("data:image/png;base64,{}", BASE64.encode(bytes)))
    }

    /// Strip a `data:<mime>;base64,` header if present
    #[must_use]
    pub fn strip_data_url_header(input: &str) -> &str {
        let trimmed = input.trim();
        if trimmed.starts_with("data:") {
            trimmed.split_once(',').map_or(trimmed, |(_, body)| body)
        } else {
            trimmed
        }
    }

    /// Decode raw base64 or a `data:` URL into bytes
    pub fn decode_base64(input: &str) -> Result<Vec<u8>> {
        let body = Self::strip_data_url_header(input);
        if body.is_empty() {
            return Err(SmileDesignError::invalid_input("base64 payload is empty"));
        }
        BASE64
            .decode(body)
            .map_err(|e| SmileDesignError::invalid_input(format!("invalid base64 payload: {}", e)))
    }

    /// Decode raw base64 or a `data:` URL into an image
    pub fn decode_base64_image(input: &str) -> Result<DynamicImage> {
        let bytes = Self::decode_base64(input)?;
        Self::load_from_bytes(&bytes)
    }

    /// Check if a file path has a supported image extension
    pub fn is_supported_image_format<P: AsRef<Path>>(path: P) -> bool {
        ImageFormat::from_path(path)
            .map(|format| {
                matches!(
                    format,
                    ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::Tiff | ImageFormat::WebP
                )
            })
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};
    use tempfile::tempdir;

    #[test]
    fn test_data_url_round_trip() {
        let image = DynamicImage::ImageRgb8(RgbImage::from_pixel(3, 2, Rgb([10, 20, 30])));
        let url = ImageIOService::encode_png_data_url(&image).unwrap();
        assert!(url.starts_with("data:image/png;base64,"));

        let decoded = ImageIOService::decode_base64_image(&url).unwrap();
        assert_eq!(decoded.to_rgb8(), image.to_rgb8());
    }

    #[test]
    fn test_jpeg_encoding_drops_alpha() {
        let image = DynamicImage::new_rgba8(5, 5);
        let bytes = ImageIOService::encode_jpeg(&image, 90).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        assert_eq!(ImageIOService::load_from_bytes(&bytes).unwrap().width(), 5);
    }

    #[test]
    fn test_strip_data_url_header() {
        assert_eq!(
            ImageIOService::strip_data_url_header("data:image/jpeg;base64,AAAA"),
            "AAAA"
        );
        assert_eq!(ImageIOService::strip_data_url_header("  AAAA "), "AAAA");
    }

    #[test]
    fn test_invalid_payloads() {
        assert!(matches!(
            ImageIOService::decode_base64("data:image/png;base64,"),
            Err(SmileDesignError::InvalidInput(_))
        ));
        assert!(ImageIOService::decode_base64("not base64 !!").is_err());
        assert!(ImageIOService::load_from_bytes(&[]).is_err());
        assert!(ImageIOService::load_from_bytes(b"definitely not an image").is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("out.png");
        let image = DynamicImage::new_rgb8(8, 8);

        ImageIOService::save_image(&image, &path).unwrap();
        let loaded = ImageIOService::load_image(&path).unwrap();
        assert_eq!(loaded.width(), 8);

        let jpeg = dir.path().join("out.jpg");
        ImageIOService::save_image(&DynamicImage::new_rgba8(4, 4), &jpeg).unwrap();
        assert!(jpeg.exists());
    }

    #[test]
    fn test_missing_file() {
        let result = ImageIOService::load_image("/nonexistent/portrait.png");
        assert!(matches!(result, Err(SmileDesignError::Io(_))));
    }

    #[test]
    fn test_supported_formats() {
        assert!(ImageIOService::is_supported_image_format("a.png"));
        assert!(ImageIOService::is_supported_image_format("a.JPG"));
        assert!(!ImageIOService::is_supported_image_format("a.txt"));
    }
}

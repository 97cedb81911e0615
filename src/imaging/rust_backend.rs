//! Pure Rust image processing backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Identify | `image::ImageReader::into_dimensions` (header only) |
//! | Decode (JPEG, PNG, WebP) | `image` crate (pure Rust decoders) |
//! | Resize, `cover` | `image::DynamicImage::resize_to_fill` with `Lanczos3` |
//! | Resize, `fill` | `image::DynamicImage::resize_exact` with `Lanczos3` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder` (quality applies) |
//! | Encode → PNG | `image::codecs::png::PngEncoder` (lossless) |
//! | Encode → WebP | `image::codecs::webp::WebPEncoder::new_lossless` |
//!
//! The `image` crate only ships a lossless WebP encoder, so quality has no
//! effect on WebP or PNG output.

use super::backend::{BackendError, Dimensions, EncodedImage, ImageBackend};
use super::params::{OutputFormat, Quality, RenderParams};
use crate::options::Position;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::codecs::webp::WebPEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use std::io::Cursor;

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

fn reader(source: &[u8]) -> Result<ImageReader<Cursor<&[u8]>>, BackendError> {
    ImageReader::new(Cursor::new(source))
        .with_guessed_format()
        .map_err(|e| BackendError::Decode(format!("Failed to sniff format: {e}")))
}

/// Decode an image from memory, sniffing the format from its magic bytes.
fn load_image(source: &[u8]) -> Result<DynamicImage, BackendError> {
    reader(source)?
        .decode()
        .map_err(|e| BackendError::Decode(e.to_string()))
}

fn resize(img: DynamicImage, params: &RenderParams) -> DynamicImage {
    if img.width() == params.width && img.height() == params.height {
        return img;
    }
    match params.position {
        // Fill-resize then center-crop to exact dimensions
        Position::Cover => img.resize_to_fill(params.width, params.height, FilterType::Lanczos3),
        Position::Fill => img.resize_exact(params.width, params.height, FilterType::Lanczos3),
    }
}

/// Encode a decoded image into `format` entirely in memory.
fn encode(img: &DynamicImage, format: OutputFormat, quality: Quality) -> Result<Vec<u8>, BackendError> {
    let mut bytes = Vec::new();
    let result = match format {
        OutputFormat::Jpeg => {
            // JPEG has no alpha channel
            let rgb = DynamicImage::ImageRgb8(img.to_rgb8());
            rgb.write_with_encoder(JpegEncoder::new_with_quality(
                &mut bytes,
                quality.value() as u8,
            ))
        }
        OutputFormat::Png => img.write_with_encoder(PngEncoder::new(&mut bytes)),
        OutputFormat::WebP => {
            let pixels = if img.color().has_alpha() {
                DynamicImage::ImageRgba8(img.to_rgba8())
            } else {
                DynamicImage::ImageRgb8(img.to_rgb8())
            };
            pixels.write_with_encoder(WebPEncoder::new_lossless(&mut bytes))
        }
    };
    result.map_err(|e| BackendError::Encode {
        format,
        message: e.to_string(),
    })?;
    Ok(bytes)
}

impl ImageBackend for RustBackend {
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError> {
        let (width, height) = reader(source)?
            .into_dimensions()
            .map_err(|e| BackendError::Decode(format!("Failed to read dimensions: {e}")))?;
        Ok(Dimensions { width, height })
    }

    fn render(
        &self,
        source: &[u8],
        params: &RenderParams,
    ) -> Result<Vec<EncodedImage>, BackendError> {
        let img = resize(load_image(source)?, params);
        let (width, height) = (img.width(), img.height());

        params
            .formats
            .iter()
            .map(|&format| {
                Ok(EncodedImage {
                    format,
                    width,
                    height,
                    bytes: encode(&img, format, params.quality)?,
                })
            })
            .collect()
    }
}

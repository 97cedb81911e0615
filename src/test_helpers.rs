//! Shared test utilities for the media-derivatives test suite.
//!
//! Provides synthetic image encoders, media records, and generation jobs so
//! unit tests can exercise the pipeline without fixture files.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let media = sample_media("images/hero.jpg", 1920, 1080);
//! let job = sample_job("/src/hero.jpg", "/out");
//! let bytes = synthetic_jpeg(64, 48);
//! ```

use crate::imaging::DerivativeOutputs;
use crate::job::GenerationJob;
use crate::media::{Media, MediaKind, RasterKind};
use crate::options::Position;
use crate::sizes::SizeBucket;
use image::{ImageEncoder, RgbImage};
use std::path::Path;

// =========================================================================
// Synthetic images
// =========================================================================

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        image::Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

/// Encode a gradient image of the given size as JPEG.
pub fn synthetic_jpeg(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut buf = Vec::new();
    image::codecs::jpeg::JpegEncoder::new_with_quality(&mut buf, 90)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// Encode a gradient image of the given size as PNG.
pub fn synthetic_png(width: u32, height: u32) -> Vec<u8> {
    let img = gradient(width, height);
    let mut buf = Vec::new();
    image::codecs::png::PngEncoder::new(&mut buf)
        .write_image(img.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .unwrap();
    buf
}

/// Write a synthetic JPEG to `path`, creating parent directories.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    write_bytes(path, &synthetic_jpeg(width, height));
}

fn write_bytes(path: &Path, bytes: &[u8]) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, bytes).unwrap();
}

// =========================================================================
// Records
// =========================================================================

/// A raster media record whose id is its path. The MIME type follows the
/// extension.
pub fn sample_media(path: &str, width: u32, height: u32) -> Media {
    let name = path.rsplit('/').next().unwrap_or(path).to_string();
    let ext = name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_lowercase())
        .unwrap_or_default();
    let mime_type = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    };
    Media {
        id: path.to_string(),
        name,
        kind: RasterKind::Image,
        mime_type: mime_type.to_string(),
        width: Some(width),
        height: Some(height),
        size: 0,
        path: path.to_string(),
    }
}

/// A 640px-wide JPEG job reading `source` and writing under
/// `<out_root>/auto/`.
pub fn sample_job(source: impl AsRef<Path>, out_root: impl AsRef<Path>) -> GenerationJob {
    let source = source.as_ref();
    let stem = source
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let dir = out_root.as_ref().join("auto");
    GenerationJob {
        media_id: source
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default(),
        source: source.to_path_buf(),
        kind: MediaKind::Jpeg,
        bucket: SizeBucket {
            index: 0,
            width: 640,
            height: None,
        },
        position: Position::Cover,
        quality: 70,
        outputs: DerivativeOutputs {
            original: dir.join(format!("{stem}_0.jpg")),
            webp: dir.join(format!("{stem}_0.webp")),
        },
    }
}

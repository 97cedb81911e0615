//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the [`operations`](super::operations) module (which
//! decides what derivatives are missing and how large they must be) and the
//! [`backend`](super::backend) (which does the pixel work). This separation
//! allows swapping backends (e.g. for testing with a mock) without changing
//! operation logic.
//!
//! ## Types
//!
//! - [`Quality`]: Lossy encoding quality (1–100, default 70). Clamped on
//!   construction: option validation accepts `0`, which encodes at `1`
//!   because the JPEG encoder has no quality 0. PNG and WebP output is
//!   lossless and ignores it.
//! - [`OutputFormat`]: Encoded container of a derivative file.
//! - [`RenderParams`]: Final dimensions, crop strategy, quality and formats for one render.

use crate::options::Position;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Quality setting for lossy image encoding (1-100).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(pub u32);

impl Quality {
    /// Clamp `value` into `1..=100`; `0` becomes `1`.
    pub fn new(value: u32) -> Self {
        Self(value.clamp(1, 100))
    }

    pub fn value(self) -> u32 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(crate::options::DEFAULT_QUALITY)
    }
}

/// Encoded format of a derivative file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Jpeg,
    Png,
    WebP,
}

impl OutputFormat {
    pub fn mime_type(self) -> &'static str {
        match self {
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
            OutputFormat::WebP => "image/webp",
        }
    }

    /// Map a file extension (case-insensitive) to a format.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" | "jfif" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            "webp" => Some(OutputFormat::WebP),
            _ => None,
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            OutputFormat::Jpeg => "jpeg",
            OutputFormat::Png => "png",
            OutputFormat::WebP => "webp",
        };
        f.write_str(name)
    }
}

/// Parameters for one decode → resize → encode pass.
///
/// `width`/`height` are the final output dimensions, already clamped to the
/// source by the caller.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderParams {
    pub width: u32,
    pub height: u32,
    pub position: Position,
    pub quality: Quality,
    pub formats: Vec<OutputFormat>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quality_clamps_to_valid_range() {
        assert_eq!(Quality::new(0).value(), 1);
        assert_eq!(Quality::new(50).value(), 50);
        assert_eq!(Quality::new(150).value(), 100);
    }

    #[test]
    fn quality_default_is_70() {
        assert_eq!(Quality::default().value(), 70);
    }

    #[test]
    fn format_from_extension_is_case_insensitive() {
        assert_eq!(OutputFormat::from_extension("JPG"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::from_extension("jpeg"), Some(OutputFormat::Jpeg));
        assert_eq!(OutputFormat::from_extension("Png"), Some(OutputFormat::Png));
        assert_eq!(OutputFormat::from_extension("webp"), Some(OutputFormat::WebP));
        assert_eq!(OutputFormat::from_extension("svg"), None);
    }

    #[test]
    fn format_mime_types() {
        assert_eq!(OutputFormat::WebP.mime_type(), "image/webp");
        assert_eq!(OutputFormat::Jpeg.mime_type(), "image/jpeg");
    }
}

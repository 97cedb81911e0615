//! Media records and the index contract.
//!
//! [`Media`] describes one source asset as the content system sees it. The
//! derivative pipeline only reads media; it never decides which media exist.
//! Lookups go through the [`MediaIndex`] trait, and [`MediaCatalog`] is the
//! local implementation backed by a JSON file (or built by walking the media
//! root with [`MediaCatalog::scan`]).

use crate::imaging::OutputFormat;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum MediaIndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid media index JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Failed to walk media root: {0}")]
    Walk(#[from] walkdir::Error),
}

/// Whether a media item is a raster image at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RasterKind {
    Image,
    Other,
}

/// Processing family of a media item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Jpeg,
    Png,
    /// Everything else, including SVG. Generation is a no-op.
    Unsupported,
}

impl MediaKind {
    pub fn from_mime(mime: &str) -> Self {
        match mime.to_ascii_lowercase().as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => MediaKind::Jpeg,
            "image/png" => MediaKind::Png,
            _ => MediaKind::Unsupported,
        }
    }

    pub fn from_extension(ext: &str) -> Self {
        match OutputFormat::from_extension(ext) {
            Some(OutputFormat::Jpeg) => MediaKind::Jpeg,
            Some(OutputFormat::Png) => MediaKind::Png,
            _ => MediaKind::Unsupported,
        }
    }

    /// Format of the re-encoded original, if this kind is processed.
    pub fn output_format(self) -> Option<OutputFormat> {
        match self {
            MediaKind::Jpeg => Some(OutputFormat::Jpeg),
            MediaKind::Png => Some(OutputFormat::Png),
            MediaKind::Unsupported => None,
        }
    }
}

/// A source asset. `path` is relative to the media root and always uses
/// forward slashes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    pub id: String,
    pub name: String,
    pub kind: RasterKind,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default)]
    pub size: u64,
    pub path: String,
}

impl Media {
    /// Pixel dimensions, only for raster images with both sides known.
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        if self.kind != RasterKind::Image {
            return None;
        }
        match (self.width, self.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => Some((w, h)),
            _ => None,
        }
    }

    /// Processing family: MIME type first, then the file extension.
    pub fn media_kind(&self) -> MediaKind {
        if self.kind != RasterKind::Image {
            return MediaKind::Unsupported;
        }
        match MediaKind::from_mime(&self.mime_type) {
            MediaKind::Unsupported => self
                .extension()
                .map(MediaKind::from_extension)
                .unwrap_or(MediaKind::Unsupported),
            kind => kind,
        }
    }

    /// Extension of the source file, as written.
    pub fn extension(&self) -> Option<&str> {
        let file_name = self.path.rsplit('/').next()?;
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Some(ext),
            _ => None,
        }
    }

    /// Canonical path: the relative path without its extension and without
    /// a leading slash.
    pub fn stem_path(&self) -> &str {
        let path = self.path.trim_start_matches('/');
        match self.extension() {
            Some(ext) => &path[..path.len() - ext.len() - 1],
            None => path,
        }
    }
}

/// Read-only lookup over the media known to the content system.
pub trait MediaIndex: Send + Sync {
    fn find_one(&self, predicate: &dyn Fn(&Media) -> bool) -> Option<Media>;

    fn find_by_id(&self, id: &str) -> Option<Media> {
        self.find_one(&|media| media.id == id)
    }
}

/// In-memory [`MediaIndex`] loaded from or saved to a JSON array.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MediaCatalog {
    items: Vec<Media>,
}

const RASTER_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp"];

fn mime_for_extension(ext: &str) -> &'static str {
    match ext {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "svg" => "image/svg+xml",
        _ => "application/octet-stream",
    }
}

impl MediaCatalog {
    pub fn new(items: Vec<Media>) -> Self {
        Self { items }
    }

    pub fn items(&self) -> &[Media] {
        &self.items
    }

    pub fn load(path: &Path) -> Result<Self, MediaIndexError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), MediaIndexError> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Build a catalog by walking `root`. Hidden entries are skipped; raster
    /// dimensions are read from file headers. Items are sorted by path.
    pub fn scan(root: &Path) -> Result<Self, MediaIndexError> {
        let mut items = Vec::new();
        let walker = WalkDir::new(root)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !e.file_name().to_string_lossy().starts_with('.'));

        for entry in walker {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(rel) = entry.path().strip_prefix(root) else {
                continue;
            };
            let rel = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let ext = entry
                .path()
                .extension()
                .map(|e| e.to_string_lossy().to_lowercase())
                .unwrap_or_default();

            let raster = RASTER_EXTENSIONS.contains(&ext.as_str());
            let (width, height) = if raster {
                match image::image_dimensions(entry.path()) {
                    Ok((w, h)) => (Some(w), Some(h)),
                    Err(e) => {
                        tracing::warn!(path = %entry.path().display(), error = %e, "could not read dimensions");
                        (None, None)
                    }
                }
            } else {
                (None, None)
            };

            items.push(Media {
                id: rel.clone(),
                name: entry.file_name().to_string_lossy().into_owned(),
                kind: if raster {
                    RasterKind::Image
                } else {
                    RasterKind::Other
                },
                mime_type: mime_for_extension(&ext).to_string(),
                width,
                height,
                size: entry.metadata()?.len(),
                path: rel,
            });
        }

        items.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(Self { items })
    }
}

impl MediaIndex for MediaCatalog {
    fn find_one(&self, predicate: &dyn Fn(&Media) -> bool) -> Option<Media> {
        self.items.iter().find(|m| predicate(m)).cloned()
    }
}

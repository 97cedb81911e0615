//! High-level derivative generation.
//!
//! These functions combine calculations with backend execution and storage.
//! They decide which outputs are missing, size them against the source, call
//! the backend once for all missing formats, and write the results.
//!
//! Generation is idempotent with respect to storage: an output that already
//! exists is never rewritten, and a call with nothing missing reads nothing.

use super::backend::{BackendError, ImageBackend};
use super::calculations::plan_output_dimensions;
use super::params::{OutputFormat, Quality, RenderParams};
use crate::media::MediaKind;
use crate::options::Position;
use crate::sizes::SizeBucket;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failure of one generation job.
///
/// Clone + serializable: the same value is handed to every caller that
/// joined the job, and crosses the subprocess boundary as JSON.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum GenerateError {
    #[error("Failed to read source: {0}")]
    SourceRead(String),
    #[error("Failed to encode derivative: {0}")]
    Encode(String),
    #[error("Failed to write derivative: {0}")]
    Write(String),
    #[error("Generation timed out after {0} ms")]
    Timeout(u64),
    #[error("Generation job failed: {0}")]
    Execution(String),
}

impl From<BackendError> for GenerateError {
    fn from(err: BackendError) -> Self {
        match err {
            BackendError::Decode(_) => GenerateError::SourceRead(err.to_string()),
            BackendError::Encode { .. } => GenerateError::Encode(err.to_string()),
        }
    }
}

/// Target files for one size: the re-encoded original and its WebP copy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivativeOutputs {
    pub original: PathBuf,
    pub webp: PathBuf,
}

impl DerivativeOutputs {
    /// `(format, path)` pairs in write order.
    fn targets(&self, original: OutputFormat) -> [(OutputFormat, &Path); 2] {
        [
            (original, self.original.as_path()),
            (OutputFormat::WebP, self.webp.as_path()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    pub position: Position,
    pub quality: Quality,
}

/// What a generation call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GenerateOutcome {
    /// The media kind is not processed; nothing was read or written.
    Unsupported,
    /// Every output already existed.
    Cached,
    Generated { written: usize, width: u32, height: u32 },
}

/// Generate the derivatives of `source` for one size bucket.
///
/// Storage is checked before the source is read: when every output exists
/// the call returns [`GenerateOutcome::Cached`] without touching the source.
pub fn generate_derivative(
    backend: &dyn ImageBackend,
    storage: &dyn Storage,
    source: &Path,
    kind: MediaKind,
    bucket: &SizeBucket,
    settings: &EncodeSettings,
    outputs: &DerivativeOutputs,
) -> Result<GenerateOutcome, GenerateError> {
    let Some(format) = kind.output_format() else {
        return Ok(GenerateOutcome::Unsupported);
    };
    if outputs
        .targets(format)
        .iter()
        .all(|(_, path)| storage.exists(path))
    {
        return Ok(GenerateOutcome::Cached);
    }

    let bytes = storage
        .read(source)
        .map_err(|e| GenerateError::SourceRead(e.to_string()))?;
    generate_from_bytes(backend, storage, &bytes, kind, bucket, settings, outputs)
}

/// Generate the missing derivatives from already-loaded source bytes.
pub fn generate_from_bytes(
    backend: &dyn ImageBackend,
    storage: &dyn Storage,
    source: &[u8],
    kind: MediaKind,
    bucket: &SizeBucket,
    settings: &EncodeSettings,
    outputs: &DerivativeOutputs,
) -> Result<GenerateOutcome, GenerateError> {
    let Some(format) = kind.output_format() else {
        return Ok(GenerateOutcome::Unsupported);
    };
    let missing: Vec<(OutputFormat, &Path)> = outputs
        .targets(format)
        .into_iter()
        .filter(|(_, path)| !storage.exists(path))
        .collect();
    if missing.is_empty() {
        return Ok(GenerateOutcome::Cached);
    }

    let source_dims = backend.identify(source)?.as_tuple();
    let (width, height) = plan_output_dimensions(source_dims, bucket.width, bucket.height);

    let params = RenderParams {
        width,
        height,
        position: settings.position,
        quality: settings.quality,
        formats: missing.iter().map(|(format, _)| *format).collect(),
    };
    let images = backend.render(source, &params)?;

    for ((_, path), image) in missing.iter().zip(&images) {
        storage
            .save(path, &image.bytes)
            .map_err(|e| GenerateError::Write(e.to_string()))?;
    }

    Ok(GenerateOutcome::Generated {
        written: images.len().min(missing.len()),
        width,
        height,
    })
}

//! On-demand resolution of derivative request paths.
//!
//! A request path names one derivative file:
//!
//! ```text
//! /_se640xa-1280x720/images/banner_1.webp
//!  └───── token ────┘└─ media base ─┘└┘└──┘
//!                                 index  ext
//! ```
//!
//! [`Resolver::resolve`] walks it through the pipeline:
//!
//! 1. Parse the path ([`DerivativePath`]) and decode the option token.
//! 2. Find the media whose canonical path (relative path without extension)
//!    equals the base; fall back to the media with the longest canonical
//!    path that the base starts with.
//! 3. If the target file already exists, answer immediately; the scheduler
//!    is not involved.
//! 4. Otherwise plan a [`GenerationJob`], submit it, and block until the
//!    shared job finishes.
//!
//! Lookup failures are reported synchronously and never reach the
//! scheduler. Every outcome is a [`Resolution`] whose `status` is what an
//! HTTP layer should answer with.

use crate::imaging::{DerivativeOutputs, GenerateError, OutputFormat};
use crate::job::{DerivativeKey, GenerationJob};
use crate::media::{Media, MediaIndex};
use crate::naming::{DerivativePath, PathError};
use crate::options::{self, OptionsError, ProcessOptions};
use crate::scheduler::Scheduler;
use crate::sizes::{self, DEFAULT_LADDER};
use crate::storage::Storage;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    #[error("Method {0} not allowed")]
    MethodNotAllowed(String),
    #[error(transparent)]
    InvalidPath(#[from] PathError),
    #[error(transparent)]
    InvalidOptions(#[from] OptionsError),
    #[error("No media matches '{0}'")]
    MediaNotFound(String),
    #[error("Media '{0}' is not a processable image")]
    UnsupportedMediaKind(String),
    #[error("Size index {index} out of range ({available} sizes available)")]
    SizeOutOfRange { index: usize, available: usize },
    #[error(transparent)]
    Generation(#[from] GenerateError),
    #[error("Derivative unavailable after generation: {0}")]
    Storage(String),
}

impl ResolveError {
    /// HTTP status an outer layer should answer with.
    pub fn status_code(&self) -> u16 {
        match self {
            ResolveError::MethodNotAllowed(_) => 405,
            ResolveError::InvalidPath(_) | ResolveError::InvalidOptions(_) => 400,
            ResolveError::MediaNotFound(_) | ResolveError::SizeOutOfRange { .. } => 404,
            ResolveError::UnsupportedMediaKind(_) => 415,
            ResolveError::Generation(GenerateError::Timeout(_)) => 504,
            ResolveError::Generation(_) | ResolveError::Storage(_) => 500,
        }
    }
}

/// Answer to one resolve call, serialized for the HTTP collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Resolution {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub status: u16,
}

impl Resolution {
    fn found(path: PathBuf, format: OutputFormat, file_name: String, file_size: u64) -> Self {
        Self {
            exists: true,
            path: Some(path),
            mimetype: Some(format.mime_type().to_string()),
            file_name: Some(file_name),
            file_size: Some(file_size),
            error: None,
            status: 200,
        }
    }

    pub fn failed(error: &ResolveError) -> Self {
        Self {
            exists: false,
            path: None,
            mimetype: None,
            file_name: None,
            file_size: None,
            error: Some(error.to_string()),
            status: error.status_code(),
        }
    }
}

/// Roots and defaults the resolver applies to every request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolverSettings {
    pub input_root: PathBuf,
    pub output_root: PathBuf,
    pub ladder: Vec<u32>,
    pub default_quality: u32,
}

impl ResolverSettings {
    pub fn new(input_root: impl Into<PathBuf>, output_root: impl Into<PathBuf>) -> Self {
        Self {
            input_root: input_root.into(),
            output_root: output_root.into(),
            ladder: DEFAULT_LADDER.to_vec(),
            default_quality: options::DEFAULT_QUALITY,
        }
    }
}

fn original_extension(media: &Media, format: OutputFormat) -> String {
    media
        .extension()
        .map(str::to_string)
        .unwrap_or_else(|| match format {
            OutputFormat::Png => "png".to_string(),
            _ => "jpg".to_string(),
        })
}

pub struct Resolver {
    index: Arc<dyn MediaIndex>,
    storage: Arc<dyn Storage>,
    scheduler: Arc<Scheduler>,
    settings: ResolverSettings,
}

impl Resolver {
    pub fn new(
        index: Arc<dyn MediaIndex>,
        storage: Arc<dyn Storage>,
        scheduler: Arc<Scheduler>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            index,
            storage,
            scheduler,
            settings,
        }
    }

    pub fn scheduler(&self) -> &Arc<Scheduler> {
        &self.scheduler
    }

    pub fn settings(&self) -> &ResolverSettings {
        &self.settings
    }

    /// HTTP entry point: only GET and HEAD are served.
    pub fn resolve_request(&self, method: &str, path: &str) -> Resolution {
        if !method.eq_ignore_ascii_case("GET") && !method.eq_ignore_ascii_case("HEAD") {
            return Resolution::failed(&ResolveError::MethodNotAllowed(method.to_uppercase()));
        }
        self.resolve(path)
    }

    /// Resolve a request path, generating the derivative if needed.
    pub fn resolve(&self, request_path: &str) -> Resolution {
        match self.resolve_path(request_path) {
            Ok(resolution) => resolution,
            Err(e) => {
                tracing::debug!(path = request_path, error = %e, "resolve failed");
                Resolution::failed(&e)
            }
        }
    }

    pub fn resolve_path(&self, request_path: &str) -> Result<Resolution, ResolveError> {
        let request = DerivativePath::parse(request_path)?;
        let media = self.find_media(&request.base)?;

        let kind = media.media_kind();
        let Some(original_format) = kind.output_format() else {
            return Err(ResolveError::UnsupportedMediaKind(media.path.clone()));
        };
        let format = if request.extension == "webp" {
            OutputFormat::WebP
        } else if request.extension == original_extension(&media, original_format) {
            original_format
        } else {
            return Err(ResolveError::MediaNotFound(request.to_request_path()));
        };

        let target = self.settings.output_root.join(request.relative_path());
        if self.storage.exists(&target) {
            tracing::debug!(path = %target.display(), "derivative cache hit");
            return self.found(target, format, &request);
        }

        let options = options::decode(&request.token);
        let job = self.plan_job(
            &media,
            &request.base,
            &request.token,
            &options,
            request.size_index,
            self.settings.default_quality,
        )?;
        let key = DerivativeKey {
            media: media.id.clone(),
            token: request.token.clone(),
            base: request.base.clone(),
            size_index: request.size_index,
            format,
        };
        let outcome = self.scheduler.submit(&key, job).wait()?;
        tracing::info!(path = %target.display(), ?outcome, "derivative resolved");

        self.found(target, format, &request)
    }

    fn found(
        &self,
        target: PathBuf,
        format: OutputFormat,
        request: &DerivativePath,
    ) -> Result<Resolution, ResolveError> {
        let size = self
            .storage
            .size(&target)
            .map_err(|e| ResolveError::Storage(e.to_string()))?;
        Ok(Resolution::found(target, format, request.file_name(), size))
    }

    /// Exact canonical-path match first. Otherwise the media whose canonical
    /// path is the longest prefix of `base`, so `images/hero-extra` finds
    /// `images/hero`.
    pub fn find_media(&self, base: &str) -> Result<Media, ResolveError> {
        let base = base.trim_start_matches('/');
        if let Some(media) = self.index.find_one(&|m| m.stem_path() == base) {
            return Ok(media);
        }

        let is_prefix = |m: &Media| !m.stem_path().is_empty() && base.starts_with(m.stem_path());
        let mut best = self
            .index
            .find_one(&is_prefix)
            .ok_or_else(|| ResolveError::MediaNotFound(base.to_string()))?;
        while let Some(longer) = self
            .index
            .find_one(&|m| is_prefix(m) && m.stem_path().len() > best.stem_path().len())
        {
            best = longer;
        }
        Ok(best)
    }

    /// Build the job that writes both derivatives of `media` for one size.
    ///
    /// Output files are named after `base` under the literal `token`
    /// directory, so they land exactly where the request path points.
    pub fn plan_job(
        &self,
        media: &Media,
        base: &str,
        token: &str,
        options: &ProcessOptions,
        size_index: usize,
        default_quality: u32,
    ) -> Result<GenerationJob, ResolveError> {
        let kind = media.media_kind();
        let original_format = kind
            .output_format()
            .ok_or_else(|| ResolveError::UnsupportedMediaKind(media.path.clone()))?;

        let buckets = sizes::candidates(
            options.sizes_or_default(),
            media.dimensions(),
            &self.settings.ladder,
        );
        let bucket = *buckets
            .get(size_index)
            .ok_or(ResolveError::SizeOutOfRange {
                index: size_index,
                available: buckets.len(),
            })?;

        let original = DerivativePath::new(
            token,
            base,
            size_index,
            &original_extension(media, original_format),
        );
        let webp = original.with_extension("webp");

        Ok(GenerationJob {
            media_id: media.id.clone(),
            source: self.source_path(media),
            kind,
            bucket,
            position: options.position_or_default(),
            quality: options.quality_or(default_quality),
            outputs: DerivativeOutputs {
                original: self.settings.output_root.join(original.relative_path()),
                webp: self.settings.output_root.join(webp.relative_path()),
            },
        })
    }

    pub fn source_path(&self, media: &Media) -> PathBuf {
        let mut path = self.settings.input_root.clone();
        for segment in media.path.trim_start_matches('/').split('/') {
            path.push(segment);
        }
        path
    }
}

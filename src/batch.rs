//! Batch generation: every size of every media item through one scheduler.
//!
//! The batch path keeps one media item in flight per worker: it waits on
//! the oldest item before submitting the next, so the pool stays busy
//! without queueing the whole run. Progress is reported in media order as
//! [`BatchEvent`]s. Because it goes through the same
//! [`Scheduler`](crate::scheduler::Scheduler) as on-demand requests, a
//! derivative being generated for an HTTP request is joined rather than
//! generated twice.
//!
//! `fail_on_error` decides whether the first failed derivative aborts the
//! run or is logged and counted. An abort submits nothing further; items
//! already in the window are left to finish on the pool.

use crate::imaging::{GenerateError, GenerateOutcome};
use crate::job::DerivativeKey;
use crate::media::{Media, MediaIndex};
use crate::options::{self, ProcessOptions};
use crate::resolver::{ResolveError, Resolver, ResolverSettings};
use crate::scheduler::{JobHandle, Scheduler};
use crate::sizes::{self, SizeBucket};
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("Media '{0}' not found in index")]
    UnknownMedia(String),
    #[error("Derivative {size} of '{media}' failed: {source}")]
    Generation {
        media: String,
        size: usize,
        source: GenerateError,
    },
}

/// Per-derivative outcome shown in progress output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VariantStatus {
    Cached,
    Generated,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariantInfo {
    /// Display label, e.g. `640w` or `1280x720`.
    pub label: String,
    pub status: VariantStatus,
}

/// Progress events emitted while a batch runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchEvent {
    Started {
        media_count: usize,
        token: String,
        workers: usize,
    },
    MediaProcessed {
        index: usize,
        path: String,
        variants: Vec<VariantInfo>,
    },
    MediaSkipped {
        index: usize,
        path: String,
        reason: String,
    },
}

/// Totals for one batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub media: usize,
    pub generated: usize,
    pub cached: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BatchOptions {
    pub options: ProcessOptions,
    pub fail_on_error: bool,
    /// Quality used when `options.quality` is absent.
    pub default_quality: u32,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            options: ProcessOptions::default(),
            fail_on_error: false,
            default_quality: options::DEFAULT_BATCH_QUALITY,
        }
    }
}

fn bucket_label(bucket: &SizeBucket) -> String {
    match bucket.height {
        Some(h) => format!("{}x{}", bucket.width, h),
        None => format!("{}w", bucket.width),
    }
}

/// Submit every size of one media item. Returns the handles in size order.
pub fn generate_media(
    resolver: &Resolver,
    media: &Media,
    token: &str,
    options: &ProcessOptions,
    default_quality: u32,
) -> Result<Vec<(SizeBucket, JobHandle)>, ResolveError> {
    let Some(format) = media.media_kind().output_format() else {
        return Err(ResolveError::UnsupportedMediaKind(media.path.clone()));
    };
    let buckets = sizes::candidates(
        options.sizes_or_default(),
        media.dimensions(),
        &resolver.settings().ladder,
    );

    let mut handles = Vec::with_capacity(buckets.len());
    for bucket in buckets {
        let job = resolver.plan_job(
            media,
            media.stem_path(),
            token,
            options,
            bucket.index,
            default_quality,
        )?;
        let key = DerivativeKey {
            media: media.id.clone(),
            token: token.to_string(),
            base: media.stem_path().to_string(),
            size_index: bucket.index,
            format,
        };
        handles.push((bucket, resolver.scheduler().submit(&key, job)));
    }
    Ok(handles)
}

/// A media item whose jobs are on the pool: 1-based position, the item, and
/// its handles.
type Submitted<'a> = (
    usize,
    &'a Media,
    Result<Vec<(SizeBucket, JobHandle)>, ResolveError>,
);

/// Generate all derivatives for `media`.
///
/// Items that are not processable, or that yield no sizes, are skipped. With
/// `fail_on_error` the first failure aborts the run; otherwise it is counted
/// and the run continues.
pub fn run_batch(
    resolver: &Resolver,
    media: &[Media],
    opts: &BatchOptions,
    events: Option<Sender<BatchEvent>>,
) -> Result<BatchReport, BatchError> {
    opts.options.validate().map_err(ResolveError::from)?;
    let token = opts.options.encode();
    let emit = |event: BatchEvent| {
        if let Some(tx) = &events {
            let _ = tx.send(event);
        }
    };

    emit(BatchEvent::Started {
        media_count: media.len(),
        token: token.clone(),
        workers: resolver.scheduler().workers(),
    });
    tracing::info!(media = media.len(), %token, "batch started");

    let mut report = BatchReport {
        media: media.len(),
        ..BatchReport::default()
    };

    let window = resolver.scheduler().workers().max(1);
    let mut upcoming = media.iter().enumerate();
    let mut pending: VecDeque<Submitted<'_>> = VecDeque::with_capacity(window);

    loop {
        while pending.len() < window {
            let Some((position, item)) = upcoming.next() else {
                break;
            };
            let handles =
                generate_media(resolver, item, &token, &opts.options, opts.default_quality);
            pending.push_back((position + 1, item, handles));
        }
        let Some((index, item, handles)) = pending.pop_front() else {
            break;
        };

        let handles = match handles {
            Ok(handles) if !handles.is_empty() => handles,
            Ok(_) => {
                report.skipped += 1;
                emit(BatchEvent::MediaSkipped {
                    index,
                    path: item.path.clone(),
                    reason: "no sizes (source dimensions unknown)".into(),
                });
                continue;
            }
            Err(e) => {
                report.skipped += 1;
                emit(BatchEvent::MediaSkipped {
                    index,
                    path: item.path.clone(),
                    reason: e.to_string(),
                });
                continue;
            }
        };

        let mut variants = Vec::with_capacity(handles.len());
        let mut first_failure = None;
        for (bucket, handle) in handles {
            let status = match handle.wait() {
                Ok(GenerateOutcome::Generated { .. }) => {
                    report.generated += 1;
                    VariantStatus::Generated
                }
                Ok(_) => {
                    report.cached += 1;
                    VariantStatus::Cached
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(media = %item.path, size = bucket.index, error = %e, "derivative failed");
                    let status = VariantStatus::Failed(e.to_string());
                    if first_failure.is_none() {
                        first_failure = Some((bucket.index, e));
                    }
                    status
                }
            };
            variants.push(VariantInfo {
                label: bucket_label(&bucket),
                status,
            });
        }

        emit(BatchEvent::MediaProcessed {
            index,
            path: item.path.clone(),
            variants,
        });

        if opts.fail_on_error
            && let Some((size, source)) = first_failure
        {
            tracing::warn!(
                media = %item.path,
                abandoned = media.len() - index - pending.len(),
                "batch aborted"
            );
            return Err(BatchError::Generation {
                media: item.path.clone(),
                size,
                source,
            });
        }
    }

    tracing::info!(?report, "batch finished");
    Ok(report)
}

// ============================================================================
// Batch invocation contract
// ============================================================================

/// One-item batch request, as exchanged with external build tooling.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct JobDescription {
    pub media_id: String,
    /// Media root the item's path is relative to.
    pub input: PathBuf,
    /// Derivative output root.
    pub output: PathBuf,
    /// Structured options; wins over `token` when both are present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ProcessOptions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

impl JobDescription {
    pub fn process_options(&self) -> ProcessOptions {
        match (&self.options, &self.token) {
            (Some(options), _) => options.clone(),
            (None, Some(token)) => options::decode(token),
            (None, None) => ProcessOptions::default(),
        }
    }
}

/// Outcome of a [`JobDescription`]; the caller applies its own
/// fail-on-error policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DescriptionReport {
    pub ok: bool,
    pub media_id: String,
    pub token: String,
    pub generated: usize,
    pub cached: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Run one job description to completion.
pub fn run_job_description(
    description: &JobDescription,
    index: Arc<dyn MediaIndex>,
    storage: Arc<dyn Storage>,
    scheduler: Arc<Scheduler>,
    ladder: &[u32],
    default_quality: u32,
) -> DescriptionReport {
    let options = description.process_options();
    let token = options.encode();
    let mut report = DescriptionReport {
        ok: false,
        media_id: description.media_id.clone(),
        token: token.clone(),
        generated: 0,
        cached: 0,
        error: None,
    };

    let Some(media) = index.find_by_id(&description.media_id) else {
        report.error = Some(BatchError::UnknownMedia(description.media_id.clone()).to_string());
        return report;
    };

    let mut settings = ResolverSettings::new(&description.input, &description.output);
    settings.ladder = ladder.to_vec();
    settings.default_quality = default_quality;
    let resolver = Resolver::new(index, storage, scheduler, settings);

    let opts = BatchOptions {
        options,
        fail_on_error: true,
        default_quality,
    };
    match run_batch(&resolver, std::slice::from_ref(&media), &opts, None) {
        Ok(batch) if batch.skipped > 0 => {
            report.error = Some(format!("media '{}' is not processable", media.path));
        }
        Ok(batch) => {
            report.ok = true;
            report.generated = batch.generated;
            report.cached = batch.cached;
        }
        Err(e) => report.error = Some(e.to_string()),
    }
    report
}

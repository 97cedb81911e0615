//! Generation jobs and their identities.
//!
//! A [`GenerationJob`] is everything needed to produce the two derivative
//! files of one size: the source location, the media kind, the resolved size
//! bucket, the encoding settings and both output paths. Jobs are plain data
//! (serde) so the subprocess strategy can hand them to a child process.
//!
//! [`DerivativeKey`] names one derivative *file*. A single job writes both
//! formats of a size, so the scheduler deduplicates on the coarser
//! [`GenerationKey`] (the key without its format). Output files are named
//! after the requested base path, and two bases may resolve to one media
//! item, so the base is part of both keys.

use crate::imaging::{
    DerivativeOutputs, EncodeSettings, GenerateError, GenerateOutcome, ImageBackend, OutputFormat,
    Quality, generate_derivative,
};
use crate::media::MediaKind;
use crate::options::Position;
use crate::sizes::SizeBucket;
use crate::storage::Storage;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Identity of a single derivative file.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivativeKey {
    /// Media identifier or source path.
    pub media: String,
    pub token: String,
    /// Base path the output files are named after.
    pub base: String,
    pub size_index: usize,
    pub format: OutputFormat,
}

impl DerivativeKey {
    pub fn generation_key(&self) -> GenerationKey {
        GenerationKey {
            media: self.media.clone(),
            token: self.token.clone(),
            base: self.base.clone(),
            size_index: self.size_index,
        }
    }
}

/// Deduplication identity: every file one job writes shares this key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GenerationKey {
    pub media: String,
    pub token: String,
    pub base: String,
    pub size_index: usize,
}

impl fmt::Display for GenerationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}@{}/{}#{}",
            self.media, self.token, self.base, self.size_index
        )
    }
}

/// One unit of work for the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationJob {
    pub media_id: String,
    pub source: PathBuf,
    pub kind: MediaKind,
    pub bucket: SizeBucket,
    pub position: Position,
    pub quality: u32,
    pub outputs: DerivativeOutputs,
}

impl GenerationJob {
    pub fn settings(&self) -> EncodeSettings {
        EncodeSettings {
            position: self.position,
            quality: Quality::new(self.quality),
        }
    }
}

pub type JobResult = Result<GenerateOutcome, GenerateError>;

/// Wire form of a [`JobResult`], printed by `run-job` on stdout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobReport {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub outcome: Option<GenerateOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<GenerateError>,
}

impl From<&JobResult> for JobReport {
    fn from(result: &JobResult) -> Self {
        match result {
            Ok(outcome) => JobReport {
                ok: true,
                outcome: Some(*outcome),
                error: None,
            },
            Err(error) => JobReport {
                ok: false,
                outcome: None,
                error: Some(error.clone()),
            },
        }
    }
}

impl JobReport {
    pub fn into_result(self) -> JobResult {
        match self {
            JobReport {
                ok: true,
                outcome: Some(outcome),
                ..
            } => Ok(outcome),
            JobReport {
                ok: false,
                error: Some(error),
                ..
            } => Err(error),
            _ => Err(GenerateError::Execution("malformed job report".into())),
        }
    }
}

/// Runs jobs against a backend and a storage. Cheap to clone.
#[derive(Clone)]
pub struct Generator {
    backend: Arc<dyn ImageBackend>,
    storage: Arc<dyn Storage>,
}

impl Generator {
    pub fn new(backend: Arc<dyn ImageBackend>, storage: Arc<dyn Storage>) -> Self {
        Self { backend, storage }
    }

    pub fn storage(&self) -> &Arc<dyn Storage> {
        &self.storage
    }

    pub fn run(&self, job: &GenerationJob) -> JobResult {
        tracing::debug!(
            media = %job.media_id,
            size_index = job.bucket.index,
            width = job.bucket.width,
            "generating derivative"
        );
        let result = generate_derivative(
            self.backend.as_ref(),
            self.storage.as_ref(),
            &job.source,
            job.kind,
            &job.bucket,
            &job.settings(),
            &job.outputs,
        );
        match &result {
            Ok(outcome) => tracing::debug!(media = %job.media_id, ?outcome, "derivative ready"),
            Err(e) => tracing::warn!(media = %job.media_id, error = %e, "derivative failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::imaging::backend::tests::MockBackend;
    use crate::storage::tests::MemoryStorage;
    use crate::test_helpers::sample_job;

    #[test]
    fn generation_key_drops_format() {
        let jpg = DerivativeKey {
            media: "hero".into(),
            token: "_sa".into(),
            base: "images/hero".into(),
            size_index: 2,
            format: OutputFormat::Jpeg,
        };
        let webp = DerivativeKey {
            format: OutputFormat::WebP,
            ..jpg.clone()
        };
        assert_ne!(jpg, webp);
        assert_eq!(jpg.generation_key(), webp.generation_key());
        assert_eq!(jpg.generation_key().to_string(), "hero@_sa/images/hero#2");
    }

    #[test]
    fn quality_zero_encodes_at_one() {
        let mut job = sample_job("/src/banner.jpg", "/out");
        job.quality = 0;
        assert_eq!(job.settings().quality.value(), 1);
    }

    #[test]
    fn generation_key_separates_bases() {
        let hero = DerivativeKey {
            media: "hero".into(),
            token: "auto".into(),
            base: "images/hero".into(),
            size_index: 0,
            format: OutputFormat::Jpeg,
        };
        let alias = DerivativeKey {
            base: "images/hero-extra".into(),
            ..hero.clone()
        };
        assert_ne!(hero.generation_key(), alias.generation_key());
    }

    #[test]
    fn job_serializes_for_subprocess() {
        let job = sample_job("/src/banner.jpg", "/out");
        let json = serde_json::to_string(&job).unwrap();
        let back: GenerationJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
    }

    #[test]
    fn report_carries_error() {
        let result: JobResult = Err(GenerateError::Encode("bad".into()));
        let report = JobReport::from(&result);
        assert!(!report.ok);
        assert_eq!(report.into_result(), result);
    }

    #[test]
    fn malformed_report_is_execution_error() {
        let report: JobReport = serde_json::from_str(r#"{"ok":true}"#).unwrap();
        assert!(matches!(
            report.into_result(),
            Err(GenerateError::Execution(_))
        ));
    }

    #[test]
    fn generator_runs_job_once() {
        let backend = Arc::new(MockBackend::new());
        let storage = Arc::new(MemoryStorage::with_file("/src/banner.jpg", b"jpeg"));
        let generator = Generator::new(backend.clone(), storage.clone());
        let job = sample_job("/src/banner.jpg", "/out");

        assert!(matches!(
            generator.run(&job),
            Ok(GenerateOutcome::Generated { written: 2, .. })
        ));
        assert_eq!(generator.run(&job), Ok(GenerateOutcome::Cached));
        assert_eq!(backend.render_count(), 1);
        assert_eq!(storage.write_count(), 2);
    }
}

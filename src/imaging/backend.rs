//! Image processing backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations every backend must
//! support: identify and render. Both work on in-memory bytes so the caller
//! decides where sources come from and where derivatives go (see
//! [`Storage`](crate::storage::Storage)).
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend): pure Rust, statically
//! linked, no external processes.

use super::params::{OutputFormat, RenderParams};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode to {format} failed: {message}")]
    Encode {
        format: OutputFormat,
        message: String,
    },
}

/// Result of an identify operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl Dimensions {
    pub fn as_tuple(self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// One encoded output of a render pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedImage {
    pub format: OutputFormat,
    pub width: u32,
    pub height: u32,
    pub bytes: Vec<u8>,
}

/// Trait for image processing backends.
///
/// Implementations must be shareable across worker threads.
pub trait ImageBackend: Send + Sync {
    /// Read source dimensions without decoding pixel data where possible.
    fn identify(&self, source: &[u8]) -> Result<Dimensions, BackendError>;

    /// Decode once, resize to `params.width`x`params.height`, and encode
    /// once per entry in `params.formats`, in that order.
    fn render(
        &self,
        source: &[u8],
        params: &RenderParams,
    ) -> Result<Vec<EncodedImage>, BackendError>;
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    /// Mock backend that records operations without decoding anything.
    /// Uses Mutex (not RefCell) so it is Sync and works across worker threads.
    pub struct MockBackend {
        pub dimensions: Dimensions,
        pub failure: Option<String>,
        pub delay: Duration,
        pub operations: Mutex<Vec<RecordedOp>>,
    }

    #[derive(Debug, Clone, PartialEq)]
    pub enum RecordedOp {
        Identify,
        Render {
            width: u32,
            height: u32,
            quality: u32,
            formats: Vec<OutputFormat>,
        },
    }

    impl Default for MockBackend {
        fn default() -> Self {
            Self::with_dimensions(1920, 1080)
        }
    }

    impl MockBackend {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with_dimensions(width: u32, height: u32) -> Self {
            Self {
                dimensions: Dimensions { width, height },
                failure: None,
                delay: Duration::ZERO,
                operations: Mutex::new(Vec::new()),
            }
        }

        /// Every call fails with a decode error carrying `message`.
        pub fn failing(message: &str) -> Self {
            Self {
                failure: Some(message.to_string()),
                ..Self::default()
            }
        }

        /// Render sleeps for `delay` first, to widen race windows in tests.
        pub fn with_delay(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::default()
            }
        }

        pub fn get_operations(&self) -> Vec<RecordedOp> {
            self.operations.lock().unwrap().clone()
        }

        pub fn render_count(&self) -> usize {
            self.get_operations()
                .iter()
                .filter(|op| matches!(op, RecordedOp::Render { .. }))
                .count()
        }
    }

    impl ImageBackend for MockBackend {
        fn identify(&self, _source: &[u8]) -> Result<Dimensions, BackendError> {
            self.operations.lock().unwrap().push(RecordedOp::Identify);
            match &self.failure {
                Some(message) => Err(BackendError::Decode(message.clone())),
                None => Ok(self.dimensions),
            }
        }

        fn render(
            &self,
            _source: &[u8],
            params: &RenderParams,
        ) -> Result<Vec<EncodedImage>, BackendError> {
            if !self.delay.is_zero() {
                std::thread::sleep(self.delay);
            }
            self.operations.lock().unwrap().push(RecordedOp::Render {
                width: params.width,
                height: params.height,
                quality: params.quality.value(),
                formats: params.formats.clone(),
            });
            if let Some(message) = &self.failure {
                return Err(BackendError::Decode(message.clone()));
            }
            Ok(params
                .formats
                .iter()
                .map(|&format| EncodedImage {
                    format,
                    width: params.width,
                    height: params.height,
                    bytes: format!("{format}:{}x{}", params.width, params.height).into_bytes(),
                })
                .collect())
        }
    }

    #[test]
    fn mock_records_identify() {
        let backend = MockBackend::with_dimensions(800, 600);

        let result = backend.identify(b"ignored").unwrap();
        assert_eq!(result.width, 800);
        assert_eq!(result.height, 600);

        let ops = backend.get_operations();
        assert_eq!(ops, vec![RecordedOp::Identify]);
    }

    #[test]
    fn mock_render_emits_one_image_per_format() {
        let backend = MockBackend::new();
        let params = RenderParams {
            width: 640,
            height: 360,
            position: crate::options::Position::Cover,
            quality: super::super::params::Quality::new(55),
            formats: vec![OutputFormat::Jpeg, OutputFormat::WebP],
        };

        let images = backend.render(b"ignored", &params).unwrap();
        assert_eq!(images.len(), 2);
        assert_eq!(images[0].format, OutputFormat::Jpeg);
        assert_eq!(images[1].format, OutputFormat::WebP);
        assert_eq!(images[1].bytes, b"webp:640x360");

        assert!(matches!(
            &backend.get_operations()[0],
            RecordedOp::Render {
                width: 640,
                height: 360,
                quality: 55,
                ..
            }
        ));
        assert_eq!(backend.render_count(), 1);
    }

    #[test]
    fn failing_mock_errors_on_identify() {
        let backend = MockBackend::failing("corrupt");
        assert_eq!(
            backend.identify(b"x"),
            Err(BackendError::Decode("corrupt".to_string()))
        );
    }
}

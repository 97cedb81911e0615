//! Image processing in pure Rust, with no external processes.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Identify** | `image::ImageReader::into_dimensions` |
//! | **Resize** | Lanczos3 via `resize_to_fill` (cover) / `resize_exact` (fill) |
//! | **Encode** | JPEG (quality), PNG, lossless WebP |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for dimension math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Backend**: [`ImageBackend`] trait + [`RustBackend`]
//! - **Operations**: Idempotent derivative generation combining calculations,
//!   backend and storage

pub mod backend;
pub mod calculations;
pub mod operations;
mod params;
pub mod rust_backend;

pub use backend::{BackendError, Dimensions, EncodedImage, ImageBackend};
pub use operations::{
    DerivativeOutputs, EncodeSettings, GenerateError, GenerateOutcome, generate_derivative,
    generate_from_bytes,
};
pub use params::{OutputFormat, Quality, RenderParams};
pub use rust_backend::RustBackend;

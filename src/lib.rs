//! # Media Derivatives
//!
//! On-demand and batch generation of resized image derivatives. A request
//! path names a source image, a processing-options token, and a size index;
//! the crate answers with a file on disk, generating it first if needed.
//!
//! # Architecture: Resolve → Schedule → Generate
//!
//! ```text
//! /_se640xa-1280x720/images/hero_1.webp
//!   │
//!   ├─ naming     parse token, base path, size index, extension
//!   ├─ options    decode the token into ProcessOptions
//!   ├─ media      look the base path up in the MediaIndex
//!   ├─ sizes      turn the size spec into SizeBuckets
//!   ├─ scheduler  dedupe concurrent requests for the same derivative
//!   ├─ executor   run the job in-process or in a child process
//!   └─ imaging    decode, resize, encode original format + WebP
//! ```
//!
//! Every path that produces derivatives, whether an HTTP request or a
//! `batch` run, goes through one [`scheduler::Scheduler`], so the same
//! derivative is never generated twice at the same time.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`options`] | `ProcessOptions` and their compact path-token encoding |
//! | [`naming`] | Derivative request paths and output file names |
//! | [`sizes`] | Size candidates, nearest-bucket selection, DPR handling |
//! | [`media`] | Media records, the `MediaIndex` lookup trait, directory scanning |
//! | [`storage`] | `Storage` trait and the atomic local-filesystem implementation |
//! | [`imaging`] | Backend trait, pure-Rust backend, derivative generation |
//! | [`job`] | Generation jobs, dedup keys, and the JSON job report |
//! | [`executor`] | In-process pool and subprocess execution strategies |
//! | [`scheduler`] | In-flight deduplication and completion handles |
//! | [`resolver`] | Request path → file resolution with on-demand generation |
//! | [`batch`] | Bulk generation over many media items |
//! | [`config`] | `media-derivatives.toml` loading, merging, validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Two Files Per Job
//!
//! A job always writes the derivative in the source's own format and a WebP
//! copy. Both come from one decode, and both share one dedup key, so a
//! browser asking for `.jpg` and another asking for `.webp` wait on the same
//! work.
//!
//! ## Files Are the Cache
//!
//! A derivative whose output files exist is never regenerated. Writes go to
//! a temp file in the target directory and are renamed into place, so a
//! reader never sees a partial file.
//!
//! ## Pure-Rust Imaging
//!
//! The [`imaging`] module uses the `image` crate for decoding, Lanczos3
//! resampling and encoding. No system libraries are needed.

pub mod batch;
pub mod config;
pub mod executor;
pub mod imaging;
pub mod job;
pub mod media;
pub mod naming;
pub mod options;
pub mod output;
pub mod resolver;
pub mod scheduler;
pub mod sizes;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_helpers;

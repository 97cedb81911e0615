//! Derivative path scheme.
//!
//! Every derivative is addressed by a request path of the form
//!
//! ```text
//! /<optionToken>/<mediaPathWithoutExtension>_<sizeIndex>.<ext>
//! ```
//!
//! and is written under the output root at the same relative location:
//! - `/_se640xa-1280x720/images/banner_0.jpg` → `_se640xa-1280x720/images/banner_0.jpg`
//! - `/auto/hero_2.webp` → `auto/hero_2.webp`
//!
//! `ext` is the source's own extension or `webp`. The token is kept
//! literally, so a request path and its file location always agree.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("Invalid derivative path '{path}': {reason}")]
    Malformed { path: String, reason: &'static str },
}

/// A parsed derivative request path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DerivativePath {
    /// Option token exactly as it appeared in the path.
    pub token: String,
    /// Media path without extension, relative, `/`-separated.
    pub base: String,
    pub size_index: usize,
    /// Requested extension, as written.
    pub extension: String,
}

impl DerivativePath {
    pub fn new(token: &str, base: &str, size_index: usize, extension: &str) -> Self {
        Self {
            token: token.to_string(),
            base: base.trim_start_matches('/').to_string(),
            size_index,
            extension: extension.to_string(),
        }
    }

    /// Parse a request path. A query string or fragment is ignored.
    ///
    /// Rejects backslashes, empty segments and `.`/`..` segments so the
    /// result can never escape the output root.
    pub fn parse(path: &str) -> Result<Self, PathError> {
        let malformed = |reason| PathError::Malformed {
            path: path.to_string(),
            reason,
        };

        let clean = path.split(['?', '#']).next().unwrap_or_default();
        let clean = clean.strip_prefix('/').unwrap_or(clean);
        if clean.contains('\\') {
            return Err(malformed("backslash in path"));
        }
        if clean
            .split('/')
            .any(|segment| segment.is_empty() || segment == "." || segment == "..")
        {
            return Err(malformed("empty or relative segment"));
        }

        let (token, rest) = clean
            .split_once('/')
            .ok_or_else(|| malformed("missing option token"))?;

        let (stem, extension) = rest
            .rsplit_once('.')
            .filter(|(stem, ext)| !ext.is_empty() && !ext.contains('/') && !stem.ends_with('/'))
            .ok_or_else(|| malformed("missing extension"))?;

        let (base, index) = stem
            .rsplit_once('_')
            .filter(|(base, _)| !base.is_empty() && !base.ends_with('/'))
            .ok_or_else(|| malformed("missing size index"))?;

        if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
            return Err(malformed("size index is not a number"));
        }
        let size_index = index
            .parse::<usize>()
            .map_err(|_| malformed("size index out of range"))?;

        Ok(Self {
            token: token.to_string(),
            base: base.to_string(),
            size_index,
            extension: extension.to_string(),
        })
    }

    /// Canonical request path with a leading slash.
    pub fn to_request_path(&self) -> String {
        format!(
            "/{}/{}",
            self.token,
            derivative_file_name(&self.base, self.size_index, &self.extension)
        )
    }

    /// File location relative to the output root.
    pub fn relative_path(&self) -> PathBuf {
        let mut path = PathBuf::from(&self.token);
        let file = derivative_file_name(&self.base, self.size_index, &self.extension);
        for segment in file.split('/') {
            path.push(segment);
        }
        path
    }

    /// File name of the derivative without directories.
    pub fn file_name(&self) -> String {
        let name = self.base.rsplit('/').next().unwrap_or(&self.base);
        format!("{}_{}.{}", name, self.size_index, self.extension)
    }

    pub fn with_extension(&self, extension: &str) -> Self {
        Self {
            extension: extension.to_string(),
            ..self.clone()
        }
    }
}

/// `<base>_<index>.<ext>`, keeping any directories in `base`.
pub fn derivative_file_name(base: &str, size_index: usize, extension: &str) -> String {
    format!("{base}_{size_index}.{extension}")
}

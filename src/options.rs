//! Processing options and their path-safe token encoding.
//!
//! Every derivative lives under a directory named after the options that
//! produced it, so the encoding doubles as a cache-partition key. The token is
//! built from underscore-prefixed segments in a fixed order:
//!
//! | Segment | Meaning | Example |
//! |---|---|---|
//! | `_p<position>` | crop strategy | `_pcover`, `_pfill` |
//! | `_q<quality>` | encoder quality 0–100 | `_q70` |
//! | `_sa` | default size ladder | `_sa` |
//! | `_se<w>x<h>-…` | explicit sizes, `a` = auto height | `_se640xa-1280x720` |
//! | `_ss<n>` | `n` steps of the source size | `_ss4` |
//!
//! Options with nothing set encode to the literal `auto`.
//!
//! Decoding is lenient: unknown or malformed segments are skipped so tokens
//! written by a newer encoder still resolve to something usable, and segment
//! order does not matter. Encoding always emits the fixed order above, so two
//! equal values always produce the same token.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Token used when no processing options are supplied.
pub const AUTO_TOKEN: &str = "auto";

/// Quality applied when an on-demand request does not specify one.
pub const DEFAULT_QUALITY: u32 = 70;

/// Quality applied by the batch path when options do not specify one.
pub const DEFAULT_BATCH_QUALITY: u32 = 50;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OptionsError {
    #[error("Invalid options: {0}")]
    Invalid(String),
}

/// Crop/fit strategy for a derivative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    /// Crop so the output fills the target box.
    #[default]
    Cover,
    /// Stretch to the target box without cropping.
    Fill,
}

impl Position {
    pub fn as_str(self) -> &'static str {
        match self {
            Position::Cover => "cover",
            Position::Fill => "fill",
        }
    }
}

impl FromStr for Position {
    type Err = OptionsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cover" => Ok(Position::Cover),
            "fill" => Ok(Position::Fill),
            other => Err(OptionsError::Invalid(format!("unknown position '{other}'"))),
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One explicitly requested output size. A missing height follows the
/// source aspect ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SizeSpec {
    pub width: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

impl SizeSpec {
    pub fn width(width: u32) -> Self {
        Self {
            width,
            height: None,
        }
    }

    pub fn exact(width: u32, height: u32) -> Self {
        Self {
            width,
            height: Some(height),
        }
    }
}

/// Which set of output sizes to materialize.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sizes {
    /// The configured default ladder.
    Auto,
    /// An explicit list of target sizes.
    Exec(Vec<SizeSpec>),
    /// `n` evenly spaced fractions of the source dimensions.
    Steps(u32),
}

static AUTO_SIZES: Sizes = Sizes::Auto;

/// Processing options for one family of derivatives.
///
/// Every field is optional; an absent field is omitted from the token and
/// its default is applied when sizes are resolved and images encoded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProcessOptions {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub quality: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sizes: Option<Sizes>,
}

impl ProcessOptions {
    /// True when no field is set (encodes to [`AUTO_TOKEN`]).
    pub fn is_empty(&self) -> bool {
        self.position.is_none() && self.quality.is_none() && self.sizes.is_none()
    }

    pub fn position_or_default(&self) -> Position {
        self.position.unwrap_or_default()
    }

    pub fn quality_or(&self, default: u32) -> u32 {
        self.quality.unwrap_or(default)
    }

    /// The size specification, falling back to [`Sizes::Auto`].
    pub fn sizes_or_default(&self) -> &Sizes {
        self.sizes.as_ref().unwrap_or(&AUTO_SIZES)
    }

    /// Reject structured values that cannot produce any derivative.
    ///
    /// Tokens never need this: [`decode`] drops anything it cannot use.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if let Some(quality) = self.quality
            && quality > 100
        {
            return Err(OptionsError::Invalid(format!(
                "quality must be 0-100, got {quality}"
            )));
        }
        match &self.sizes {
            Some(Sizes::Steps(0)) => Err(OptionsError::Invalid(
                "sizes.steps must be at least 1".into(),
            )),
            Some(Sizes::Exec(specs)) if specs.is_empty() => Err(OptionsError::Invalid(
                "sizes.exec must list at least one size".into(),
            )),
            Some(Sizes::Exec(specs)) => {
                for spec in specs {
                    if spec.width == 0 || spec.height == Some(0) {
                        return Err(OptionsError::Invalid(format!(
                            "sizes.exec entries must be non-zero, got {}x{}",
                            spec.width,
                            spec.height.map_or("a".to_string(), |h| h.to_string())
                        )));
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    pub fn encode(&self) -> String {
        encode(self)
    }
}

impl fmt::Display for ProcessOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&encode(self))
    }
}

/// Encode options into their canonical token.
pub fn encode(options: &ProcessOptions) -> String {
    let mut token = String::new();

    if let Some(position) = options.position {
        token.push_str("_p");
        token.push_str(position.as_str());
    }
    if let Some(quality) = options.quality {
        token.push_str(&format!("_q{quality}"));
    }
    match &options.sizes {
        Some(Sizes::Auto) => token.push_str("_sa"),
        Some(Sizes::Exec(specs)) => {
            let parts: Vec<String> = specs
                .iter()
                .map(|spec| match spec.height {
                    Some(h) => format!("{}x{}", spec.width, h),
                    None => format!("{}xa", spec.width),
                })
                .collect();
            token.push_str("_se");
            token.push_str(&parts.join("-"));
        }
        Some(Sizes::Steps(n)) => token.push_str(&format!("_ss{n}")),
        None => {}
    }

    if token.is_empty() {
        AUTO_TOKEN.to_string()
    } else {
        token
    }
}

/// Decode a token back into options.
///
/// Never fails: `auto`, empty strings and unrecognized segments all decode
/// to whatever could be understood. A repeated segment keeps its last value.
pub fn decode(token: &str) -> ProcessOptions {
    let mut options = ProcessOptions::default();
    for segment in token.split('_').filter(|s| !s.is_empty()) {
        apply_segment(&mut options, segment);
    }
    options
}

fn apply_segment(options: &mut ProcessOptions, segment: &str) {
    if let Some(rest) = segment.strip_prefix('p') {
        if let Ok(position) = rest.parse() {
            options.position = Some(position);
        }
    } else if let Some(rest) = segment.strip_prefix('q') {
        if let Ok(quality) = rest.parse::<u32>()
            && quality <= 100
        {
            options.quality = Some(quality);
        }
    } else if let Some(rest) = segment.strip_prefix('s')
        && let Some(sizes) = parse_sizes(rest)
    {
        options.sizes = Some(sizes);
    }
}

fn parse_sizes(rest: &str) -> Option<Sizes> {
    if rest == "a" {
        return Some(Sizes::Auto);
    }
    if let Some(list) = rest.strip_prefix('e') {
        let specs = list
            .split('-')
            .map(parse_size_spec)
            .collect::<Option<Vec<_>>>()?;
        return (!specs.is_empty()).then_some(Sizes::Exec(specs));
    }
    if let Some(count) = rest.strip_prefix('s') {
        return count
            .parse::<u32>()
            .ok()
            .filter(|n| *n > 0)
            .map(Sizes::Steps);
    }
    None
}

fn parse_size_spec(part: &str) -> Option<SizeSpec> {
    let (width, height) = match part.split_once('x') {
        Some((w, h)) => (w, Some(h)),
        None => (part, None),
    };
    let width = width.parse::<u32>().ok().filter(|w| *w > 0)?;
    let height = match height {
        None | Some("a") => None,
        Some(h) => Some(h.parse::<u32>().ok().filter(|h| *h > 0)?),
    };
    Some(SizeSpec { width, height })
}

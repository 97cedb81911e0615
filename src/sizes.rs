//! Size resolution: mapping a requested display width to an output bucket.
//!
//! A size specification ([`Sizes`]) materializes into an ordered list of
//! [`SizeBucket`]s. The bucket index is what appears in derivative file
//! names (`hero_2.jpg`), so for the same inputs the list, and therefore
//! every index, is always identical.
//!
//! | Specification | Candidates |
//! |---|---|
//! | `auto` | configured ladder widths, heights from the source aspect ratio |
//! | `exec` | the literal list; a missing height follows the source aspect |
//! | `steps(n)` | fractions `1/n, 2/n, …, n/n` of the source dimensions |
//!
//! [`resolve`] picks the candidate whose width is closest to
//! `target_width * dpr`. Ties go to the lower index.

use crate::imaging::calculations::aspect_height;
use crate::options::Sizes;
use serde::{Deserialize, Serialize};

/// Widths used for [`Sizes::Auto`] when the configuration does not override them.
pub const DEFAULT_LADDER: [u32; 5] = [350, 650, 900, 1200, 1920];

/// One materialized output size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SizeBucket {
    pub index: usize,
    pub width: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

/// Materialize every candidate bucket for a size specification.
///
/// `steps(n)` needs the source dimensions and yields nothing without them.
pub fn candidates(sizes: &Sizes, source: Option<(u32, u32)>, ladder: &[u32]) -> Vec<SizeBucket> {
    let derived_height = |width: u32| source.and_then(|s| aspect_height(width, s));

    let pairs: Vec<(u32, Option<u32>)> = match sizes {
        Sizes::Auto => ladder.iter().map(|&w| (w, derived_height(w))).collect(),
        Sizes::Exec(specs) => specs
            .iter()
            .map(|spec| (spec.width, spec.height.or_else(|| derived_height(spec.width))))
            .collect(),
        // n buckets; the zero-sized fraction 0/n is never a candidate.
        Sizes::Steps(n) => match source {
            Some((src_w, src_h)) if *n > 0 => (1..=*n)
                .map(|i| {
                    let fraction = i as f64 / *n as f64;
                    let w = ((src_w as f64 * fraction).round() as u32).max(1);
                    let h = ((src_h as f64 * fraction).round() as u32).max(1);
                    (w, Some(h))
                })
                .collect(),
            _ => Vec::new(),
        },
    };

    pairs
        .into_iter()
        .enumerate()
        .map(|(index, (width, height))| SizeBucket {
            index,
            width,
            height,
        })
        .collect()
}

/// Bucket whose width is closest to `effective_width`; ties go to the
/// lowest index.
pub fn nearest(effective_width: f64, buckets: &[SizeBucket]) -> Option<SizeBucket> {
    let mut best: Option<(f64, SizeBucket)> = None;
    for bucket in buckets {
        let distance = (effective_width - bucket.width as f64).abs();
        match best {
            Some((best_distance, _)) if distance >= best_distance => {}
            _ => best = Some((distance, *bucket)),
        }
    }
    best.map(|(_, bucket)| bucket)
}

/// Normalize a device pixel ratio: missing, non-finite or non-positive
/// values mean 1.
pub fn effective_dpr(dpr: Option<f64>) -> f64 {
    match dpr {
        Some(value) if value.is_finite() && value > 0.0 => value,
        _ => 1.0,
    }
}

/// Resolve a requested display width to a size bucket.
///
/// Returns `None` only when the specification produces no candidates
/// (`steps` without known source dimensions).
pub fn resolve(
    target_width: u32,
    dpr: Option<f64>,
    sizes: &Sizes,
    source: Option<(u32, u32)>,
    ladder: &[u32],
) -> Option<SizeBucket> {
    let effective_width = target_width as f64 * effective_dpr(dpr);
    nearest(effective_width, &candidates(sizes, source, ladder))
}

//! Pure calculation functions for derivative dimensions.
//!
//! All functions here are pure and testable without any I/O or images.

/// Height that keeps the source aspect ratio at the given width.
///
/// Returns `None` when the source dimensions are unknown or degenerate.
///
/// # Examples
/// ```
/// # use media_derivatives::imaging::calculations::aspect_height;
/// assert_eq!(aspect_height(640, (1920, 1080)), Some(360));
/// assert_eq!(aspect_height(640, (0, 1080)), None);
/// ```
pub fn aspect_height(width: u32, source: (u32, u32)) -> Option<u32> {
    let (src_w, src_h) = source;
    if src_w == 0 || src_h == 0 {
        return None;
    }
    let h = (width as f64 * src_h as f64 / src_w as f64).round() as u32;
    Some(h.max(1))
}

/// Scale a target box down uniformly until it fits inside the source.
///
/// Boxes that already fit are returned unchanged. The box aspect ratio is
/// preserved so a `cover` crop keeps the requested framing.
pub fn fit_within_source(source: (u32, u32), target: (u32, u32)) -> (u32, u32) {
    let (src_w, src_h) = source;
    let (tgt_w, tgt_h) = target;
    if tgt_w <= src_w && tgt_h <= src_h {
        return (tgt_w, tgt_h);
    }

    let factor = (src_w as f64 / tgt_w as f64).min(src_h as f64 / tgt_h as f64);
    let w = ((tgt_w as f64 * factor).round() as u32).clamp(1, src_w);
    let h = ((tgt_h as f64 * factor).round() as u32).clamp(1, src_h);
    (w, h)
}

/// Final output dimensions for a derivative, never exceeding the source.
///
/// - Width only: width is clamped to the source width and the height follows
///   the source aspect ratio.
/// - Width and height: the box is scaled down uniformly if either side
///   exceeds the source (see [`fit_within_source`]).
///
/// # Arguments
/// * `source` - Decoded source dimensions (width, height)
/// * `width` - Requested output width
/// * `height` - Requested output height, if any
pub fn plan_output_dimensions(source: (u32, u32), width: u32, height: Option<u32>) -> (u32, u32) {
    let (src_w, src_h) = source;
    let width = width.max(1);
    match height {
        None => {
            let w = width.min(src_w).max(1);
            let h = aspect_height(w, source).unwrap_or(src_h).min(src_h).max(1);
            (w, h)
        }
        Some(h) => fit_within_source(source, (width, h.max(1))),
    }
}

//! CLI output formatting for resolve, batch, and scan commands.
//!
//! Output is **media-centric**: every item leads with its positional index
//! and media path, with per-size status shown as indented context lines.
//!
//! # Output Format
//!
//! ## Batch
//!
//! ```text
//! Generating _se640xa-1280x720 for 3 media (4 workers)
//! 001 banner.jpg
//!     640w: generated
//!     1280x720: cached
//! 002 logo.svg
//!     skipped: unsupported media kind 'logo.svg'
//!
//! Generated 2, cached 1, skipped 1, failed 0
//! Scheduler: 2 jobs (0 joined), 2 succeeded, 0 failed
//! ```
//!
//! ## Resolve
//!
//! ```text
//! /_sa/images/hero_2.jpg
//!     200 image/jpeg 48213 bytes
//!     Path: public/media/_sa/images/hero_2.jpg
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format functions
//! are pure: no I/O, no side effects.

use crate::batch::{BatchEvent, BatchReport, VariantStatus};
use crate::media::Media;
use crate::resolver::Resolution;
use crate::scheduler::SchedulerStats;

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

// ============================================================================
// Batch output
// ============================================================================

/// Format a single batch progress event as display lines.
pub fn format_batch_event(event: &BatchEvent) -> Vec<String> {
    match event {
        BatchEvent::Started {
            media_count,
            token,
            workers,
        } => vec![format!(
            "Generating {} for {} media ({} workers)",
            token, media_count, workers
        )],
        BatchEvent::MediaProcessed {
            index,
            path,
            variants,
        } => {
            let mut lines = vec![format!("{} {}", format_index(*index), path)];
            for variant in variants {
                let status = match &variant.status {
                    VariantStatus::Cached => "cached".to_string(),
                    VariantStatus::Generated => "generated".to_string(),
                    VariantStatus::Failed(reason) => format!("failed ({})", reason),
                };
                lines.push(format!("{}{}: {}", indent(1), variant.label, status));
            }
            lines
        }
        BatchEvent::MediaSkipped {
            index,
            path,
            reason,
        } => vec![
            format!("{} {}", format_index(*index), path),
            format!("{}skipped: {}", indent(1), reason),
        ],
    }
}

/// Format the closing summary of a batch run.
pub fn format_batch_summary(report: &BatchReport, stats: &SchedulerStats) -> Vec<String> {
    vec![
        String::new(),
        format!(
            "Generated {}, cached {}, skipped {}, failed {}",
            report.generated, report.cached, report.skipped, report.failed
        ),
        format!("Scheduler: {}", stats),
    ]
}

pub fn print_batch_summary(report: &BatchReport, stats: &SchedulerStats) {
    for line in format_batch_summary(report, stats) {
        println!("{}", line);
    }
}

// ============================================================================
// Resolve output
// ============================================================================

/// Format the answer to one resolve call.
pub fn format_resolution(request_path: &str, resolution: &Resolution) -> Vec<String> {
    let mut lines = vec![request_path.to_string()];
    if resolution.exists {
        lines.push(format!(
            "{}{} {} {} bytes",
            indent(1),
            resolution.status,
            resolution.mimetype.as_deref().unwrap_or("-"),
            resolution.file_size.unwrap_or(0)
        ));
        if let Some(path) = &resolution.path {
            lines.push(format!("{}Path: {}", indent(1), path.display()));
        }
    } else {
        lines.push(format!(
            "{}{} {}",
            indent(1),
            resolution.status,
            resolution.error.as_deref().unwrap_or("not found")
        ));
    }
    lines
}

pub fn print_resolution(request_path: &str, resolution: &Resolution) {
    for line in format_resolution(request_path, resolution) {
        println!("{}", line);
    }
}

// ============================================================================
// Scan output
// ============================================================================

/// Format the media discovered by a scan.
///
/// ```text
/// Media
/// 001 banner.jpg (1920x1080)
/// 002 notes.webp (unknown size)
/// ```
pub fn format_scan_output(media: &[Media]) -> Vec<String> {
    let mut lines = vec!["Media".to_string()];
    for (i, item) in media.iter().enumerate() {
        let size = match item.dimensions() {
            Some((w, h)) => format!("{}x{}", w, h),
            None => "unknown size".to_string(),
        };
        lines.push(format!("{} {} ({})", format_index(i + 1), item.path, size));
    }
    lines
}

pub fn print_scan_output(media: &[Media]) {
    for line in format_scan_output(media) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::VariantInfo;
    use crate::test_helpers::sample_media;
    use std::path::PathBuf;

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_pads_to_three_digits() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(1234), "1234");
    }

    #[test]
    fn indent_is_four_spaces_per_level() {
        assert_eq!(indent(0), "");
        assert_eq!(indent(2), "        ");
    }

    // =========================================================================
    // Batch output tests
    // =========================================================================

    #[test]
    fn started_event_line() {
        let lines = format_batch_event(&BatchEvent::Started {
            media_count: 3,
            token: "_sa".into(),
            workers: 4,
        });
        assert_eq!(lines, vec!["Generating _sa for 3 media (4 workers)"]);
    }

    #[test]
    fn processed_event_lists_variants() {
        let lines = format_batch_event(&BatchEvent::MediaProcessed {
            index: 1,
            path: "banner.jpg".into(),
            variants: vec![
                VariantInfo {
                    label: "640w".into(),
                    status: VariantStatus::Generated,
                },
                VariantInfo {
                    label: "1280x720".into(),
                    status: VariantStatus::Cached,
                },
                VariantInfo {
                    label: "1920w".into(),
                    status: VariantStatus::Failed("boom".into()),
                },
            ],
        });
        assert_eq!(
            lines,
            vec![
                "001 banner.jpg",
                "    640w: generated",
                "    1280x720: cached",
                "    1920w: failed (boom)",
            ]
        );
    }

    #[test]
    fn skipped_event_shows_reason() {
        let lines = format_batch_event(&BatchEvent::MediaSkipped {
            index: 2,
            path: "logo.svg".into(),
            reason: "unsupported".into(),
        });
        assert_eq!(lines, vec!["002 logo.svg", "    skipped: unsupported"]);
    }

    #[test]
    fn batch_summary_includes_scheduler_stats() {
        let report = BatchReport {
            media: 3,
            generated: 2,
            cached: 1,
            skipped: 1,
            failed: 0,
        };
        let stats = SchedulerStats {
            submitted: 2,
            joined: 1,
            succeeded: 2,
            failed: 0,
        };
        let lines = format_batch_summary(&report, &stats);
        assert_eq!(lines[1], "Generated 2, cached 1, skipped 1, failed 0");
        assert_eq!(
            lines[2],
            "Scheduler: 2 jobs (1 joined), 2 succeeded, 0 failed"
        );
    }

    // =========================================================================
    // Resolve output tests
    // =========================================================================

    #[test]
    fn found_resolution_shows_path() {
        let resolution = Resolution {
            exists: true,
            path: Some(PathBuf::from("out/_sa/hero_2.jpg")),
            mimetype: Some("image/jpeg".into()),
            file_name: Some("hero_2.jpg".into()),
            file_size: Some(512),
            error: None,
            status: 200,
        };
        let lines = format_resolution("/_sa/hero_2.jpg", &resolution);
        assert_eq!(
            lines,
            vec![
                "/_sa/hero_2.jpg",
                "    200 image/jpeg 512 bytes",
                "    Path: out/_sa/hero_2.jpg",
            ]
        );
    }

    #[test]
    fn failed_resolution_shows_error() {
        let resolution = Resolution {
            exists: false,
            path: None,
            mimetype: None,
            file_name: None,
            file_size: None,
            error: Some("Media 'nope' not found".into()),
            status: 404,
        };
        let lines = format_resolution("/_sa/nope_0.jpg", &resolution);
        assert_eq!(lines[1], "    404 Media 'nope' not found");
    }

    // =========================================================================
    // Scan output tests
    // =========================================================================

    #[test]
    fn scan_output_lists_media_with_sizes() {
        let mut unknown = sample_media("notes.webp", 1, 1);
        unknown.width = None;
        unknown.height = None;
        let media = vec![sample_media("banner.jpg", 1920, 1080), unknown];
        assert_eq!(
            format_scan_output(&media),
            vec![
                "Media",
                "001 banner.jpg (1920x1080)",
                "002 notes.webp (unknown size)",
            ]
        );
    }
}

//! CLI output formatting.
//!
//! # Display Contract
//!
//! Every served image is shown the same way, whether it came from
//! `transform` or from one job of a `batch`:
//!
//! 1. **Header line**: source → output
//! 2. **Context lines**: indented request summary and cache status
//!
//! ## Transform
//!
//! ```text
//! photos/cat.jpg → thumbs/cat.jpg
//!     Request: 400x0 crop, jpeg q90
//!     Status: encoded (18.2 KB)
//! ```
//!
//! ## Batch
//!
//! ```text
//! 001 photos/cat.jpg → thumbs/cat.jpg
//!     Request: 400x400 pad, png
//!     Status: cached (41.0 KB)
//! 002 photos/broken.jpg → thumbs/broken.jpg
//!     Status: failed: Imaging error: Decode failed: ...
//!
//! Processed 2 jobs: 1 cached, 0 encoded (1 total), 1 failed
//! ```
//!
//! # Architecture
//!
//! Each view has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::cache::CacheStats;
use crate::imaging::{OutputFormat, TransformRequest};
use std::path::Path;

/// Outcome of serving one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Cached { size: usize },
    Encoded { size: usize },
    Failed(String),
}

/// Format a 1-based positional index as 3-digit zero-padded.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Human-readable byte count.
fn format_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;
    let b = bytes as f64;
    if b >= MB {
        format!("{:.1} MB", b / MB)
    } else if b >= KB {
        format!("{:.1} KB", b / KB)
    } else {
        format!("{} B", bytes)
    }
}

/// One-line summary of a request.
///
/// ```text
/// 400x0 crop, jpeg q90
/// 800x600 default, png, no autorotate
/// ```
pub fn format_request(request: &TransformRequest) -> String {
    let mut line = format!(
        "{}x{} {}, {}",
        request.width, request.height, request.mode, request.format
    );
    if request.format == OutputFormat::Jpeg {
        line.push_str(&format!(" q{}", request.quality.value()));
    }
    if !request.autorotate {
        line.push_str(", no autorotate");
    }
    line
}

fn status_line(status: &JobStatus) -> String {
    match status {
        JobStatus::Cached { size } => format!("    Status: cached ({})", format_size(*size)),
        JobStatus::Encoded { size } => format!("    Status: encoded ({})", format_size(*size)),
        JobStatus::Failed(reason) => format!("    Status: failed: {}", reason),
    }
}

/// Format the result of a single `transform` command.
pub fn format_transform_output(
    source: &Path,
    output: &Path,
    request: &TransformRequest,
    status: &JobStatus,
) -> Vec<String> {
    vec![
        format!("{} → {}", source.display(), output.display()),
        format!("    Request: {}", format_request(request)),
        status_line(status),
    ]
}

pub fn print_transform_output(
    source: &Path,
    output: &Path,
    request: &TransformRequest,
    status: &JobStatus,
) {
    for line in format_transform_output(source, output, request, status) {
        println!("{}", line);
    }
}

/// Format one batch job. The request line is omitted when the job could not
/// be parsed into a request.
pub fn format_job(
    index: usize,
    source: &Path,
    output: &Path,
    request: Option<&TransformRequest>,
    status: &JobStatus,
) -> Vec<String> {
    let mut lines = vec![format!(
        "{} {} → {}",
        format_index(index),
        source.display(),
        output.display()
    )];
    if let Some(request) = request {
        lines.push(format!("    Request: {}", format_request(request)));
    }
    lines.push(status_line(status));
    lines
}

pub fn print_job(
    index: usize,
    source: &Path,
    output: &Path,
    request: Option<&TransformRequest>,
    status: &JobStatus,
) {
    for line in format_job(index, source, output, request, status) {
        println!("{}", line);
    }
}

/// Format the closing summary of a batch run.
pub fn format_batch_summary(jobs: usize, stats: &CacheStats, failed: usize) -> String {
    let noun = if jobs == 1 { "job" } else { "jobs" };
    if failed > 0 {
        format!("Processed {} {}: {}, {} failed", jobs, noun, stats, failed)
    } else {
        format!("Processed {} {}: {}", jobs, noun, stats)
    }
}

pub fn print_batch_summary(jobs: usize, stats: &CacheStats, failed: usize) {
    println!();
    println!("{}", format_batch_summary(jobs, stats, failed));
}

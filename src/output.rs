//! CLI output formatting for builds and checks.
//!
//! # Output Format
//!
//! ## Build
//!
//! ```text
//! Cleaned build
//! Pages (3)
//!     about.html
//!     blog/first-post.html
//!     FAILED index.html: template not found: nope.html
//! Assets: templates/static → 1 copied
//! Assets: static → 1 copied, 1 skipped
//!
//! Rendered 2 pages, 1 failed
//!     Templates: 2 read, 1 cached (3 lookups)
//!     Includes: 2 read, 4 cached (6 lookups)
//! ```
//!
//! ## Check
//!
//! ```text
//! Checked 3 pages
//!     Templates: base.html, post.html
//!     Includes: header.html, footer.html
//! Problems
//!     broken.html: include not found: gone.html
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::build::{BuildEvent, BuildReport, CheckReport};
use crate::files::MergeStats;
use std::path::Path;

// ============================================================================
// Shared helpers
// ============================================================================

/// Return indentation string: 4 spaces per depth level.
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// `1 page` / `3 pages`.
fn plural(count: usize, noun: &str) -> String {
    if count == 1 {
        format!("{count} {noun}")
    } else {
        format!("{count} {noun}s")
    }
}

/// Display a path relative to `root` when possible.
fn relative<'a>(path: &'a Path, root: Option<&Path>) -> std::borrow::Cow<'a, str> {
    match root.and_then(|r| path.strip_prefix(r).ok()) {
        Some(rel) if !rel.as_os_str().is_empty() => rel.to_string_lossy(),
        _ => path.to_string_lossy(),
    }
}

fn merge_summary(stats: &MergeStats) -> String {
    if stats.skipped == 0 {
        format!("{} copied", stats.copied)
    } else {
        format!("{} copied, {} skipped", stats.copied, stats.skipped)
    }
}

// ============================================================================
// Build progress
// ============================================================================

/// Format a single build progress event as display lines.
///
/// `root` shortens absolute paths (asset sources, output dir) for display.
pub fn format_build_event(event: &BuildEvent, root: Option<&Path>) -> Vec<String> {
    match event {
        BuildEvent::Cleaned { output } => {
            vec![format!("Cleaned {}", relative(output, root))]
        }
        BuildEvent::PagesFound { count } => vec![format!("Pages ({count})")],
        BuildEvent::PageWritten { page } => {
            vec![format!("{}{}", indent(1), page.display())]
        }
        BuildEvent::PageFailed { page, reason } => {
            vec![format!("{}FAILED {}: {}", indent(1), page.display(), reason)]
        }
        BuildEvent::AssetsMerged { source, stats } => vec![format!(
            "Assets: {} → {}",
            relative(source, root),
            merge_summary(stats)
        )],
    }
}

// ============================================================================
// Build summary
// ============================================================================

/// Format the end-of-build summary.
pub fn format_build_report(report: &BuildReport) -> Vec<String> {
    let mut lines = Vec::new();

    let mut headline = format!("Rendered {}", plural(report.written.len(), "page"));
    if !report.failures.is_empty() {
        headline.push_str(&format!(", {} failed", report.failures.len()));
    }
    lines.push(headline);
    lines.push(format!("{}Templates: {}", indent(1), report.templates));
    lines.push(format!("{}Includes: {}", indent(1), report.includes));
    if report.assets != MergeStats::default() {
        lines.push(format!("{}Assets: {}", indent(1), merge_summary(&report.assets)));
    }
    lines.push(format!("{}Output: {}", indent(1), report.output.display()));

    if !report.failures.is_empty() {
        lines.push(String::new());
        lines.push("Failed pages".to_string());
        for failure in &report.failures {
            lines.push(format!("{}{}", indent(1), failure));
        }
    }
    lines
}

pub fn print_build_report(report: &BuildReport) {
    for line in format_build_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Check
// ============================================================================

pub fn format_check_report(report: &CheckReport) -> Vec<String> {
    let mut lines = vec![format!("Checked {}", plural(report.pages, "page"))];
    if !report.templates.is_empty() {
        lines.push(format!("{}Templates: {}", indent(1), report.templates.join(", ")));
    }
    if !report.includes.is_empty() {
        lines.push(format!("{}Includes: {}", indent(1), report.includes.join(", ")));
    }

    if report.failures.is_empty() {
        lines.push("No problems found".to_string());
    } else {
        lines.push("Problems".to_string());
        for failure in &report.failures {
            lines.push(format!("{}{}", indent(1), failure));
        }
    }
    lines
}

pub fn print_check_report(report: &CheckReport) {
    for line in format_check_report(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Progress reporting and terminal summaries
//!
//! Provides real-time progress display using indicatif progress bars.

use crate::entry::ROOT_DEPTH;
use crate::output::Record;
use crate::walker::{WalkProgress, WalkResult};
use console::style;
use humansize::{format_size, BINARY};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Progress reporter that displays walk status
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a new progress reporter
    pub fn new() -> Self {
        let bar = ProgressBar::new_spinner();

        bar.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .expect("Invalid progress template")
                .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏"),
        );

        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Update the progress display
    pub fn update(&self, progress: &WalkProgress) {
        let msg = format!(
            "Dirs: {} | Files: {} | Size: {} | Rate: {:.0}/s | Workers: {}/{}",
            format_number(progress.dirs),
            format_number(progress.files),
            format_size(progress.bytes, BINARY),
            progress.files_per_second(),
            progress.active_workers,
            progress.max_workers,
        );

        self.bar.set_message(msg);
    }

    /// Set a status message
    pub fn set_status(&self, status: &str) {
        self.bar.set_message(status.to_string());
    }

    /// Finish the progress display with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Finish and clear the progress display
    pub fn finish_and_clear(&self) {
        self.bar.finish_and_clear();
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

/// Format a number with thousands separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let bytes: Vec<_> = s.bytes().rev().collect();

    let chunks: Vec<String> = bytes
        .chunks(3)
        .map(|chunk| chunk.iter().rev().map(|&b| b as char).collect::<String>())
        .collect();

    chunks.into_iter().rev().collect::<Vec<_>>().join(",")
}

/// Print a summary of the walk results
pub fn print_summary(result: &WalkResult, verbose: bool) {
    let duration_secs = result.duration.as_secs_f64();
    let rate = if duration_secs > 0.0 {
        result.files as f64 / duration_secs
    } else {
        0.0
    };

    let title = if result.completed {
        style("Walk Complete").green().bold()
    } else {
        style("Walk Stopped (stall timeout)").yellow().bold()
    };

    println!();
    println!("{}", title);
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Directories:").bold(), format_number(result.dirs));
    println!("  {} {}", style("Files:").bold(), format_number(result.files));
    println!("  {} {}", style("Total Size:").bold(), format_size(result.bytes, BINARY));
    println!("  {} {}", style("Records:").bold(), format_number(result.records));
    println!(
        "  {} {} spawned, {} inline, peak {}",
        style("Workers:").bold(),
        format_number(result.spawned),
        format_number(result.inline),
        result.peak_workers
    );
    println!(
        "  {} {:.1}s ({:.0} files/sec)",
        style("Duration:").bold(),
        duration_secs,
        rate
    );

    if !result.errors.is_empty() {
        println!(
            "  {} {}",
            style("Errors:").yellow().bold(),
            format_number(result.errors.len() as u64)
        );
        if verbose {
            for err in &result.errors {
                println!("    {} {}", style(err.path.display()).dim(), err.message);
            }
        }
    }

    if result.spawn_failures > 0 {
        println!(
            "  {} {} subtree(s) walked inline after a failed thread spawn",
            style("Spawn Failures:").yellow().bold(),
            format_number(result.spawn_failures)
        );
    }

    if result.late_flushes > 0 {
        println!(
            "  {} {} buffer(s) arrived after finalize",
            style("Dropped:").red().bold(),
            result.late_flushes
        );
    }

    let kind = if result.output.compressed { "zstd" } else { "csv" };
    println!(
        "  {} {} ({}, {})",
        style("Output:").bold(),
        result.output.path.display(),
        kind,
        format_size(result.output.bytes_out, BINARY)
    );
    println!();
}

/// Print a header at the start of the walk
pub fn print_header(root: &Path, threads: usize, output: &Path, compressed: bool) {
    println!();
    println!("{} {}", style("pwalk").cyan().bold(), env!("CARGO_PKG_VERSION"));
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Root:").bold(), root.display());
    println!("  {} {}", style("Threads:").bold(), threads);
    println!(
        "  {} {}{}",
        style("Output:").bold(),
        output.display(),
        if compressed { " (zstd)" } else { "" }
    );
    println!();
}

/// Per-extension totals
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtensionTotal {
    pub extension: String,
    pub files: u64,
    pub bytes: u64,
}

/// Totals derived from an existing output file
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileStats {
    pub records: u64,
    pub dirs: u64,
    pub files: u64,
    pub bytes: u64,
    pub max_depth: i32,

    /// Largest extensions by total size, descending
    pub top_extensions: Vec<ExtensionTotal>,
}

impl FileStats {
    pub fn from_records(records: &[Record], top: usize) -> Self {
        let mut stats = FileStats {
            max_depth: ROOT_DEPTH,
            ..FileStats::default()
        };
        let mut by_ext: HashMap<&str, (u64, u64)> = HashMap::new();

        for record in records {
            stats.records += 1;
            stats.max_depth = stats.max_depth.max(record.depth);

            if record.is_dir_row() {
                stats.dirs += 1;
                continue;
            }

            stats.files += 1;
            stats.bytes += record.size;
            let slot = by_ext.entry(record.extension.as_str()).or_default();
            slot.0 += 1;
            slot.1 += record.size;
        }

        let mut totals: Vec<ExtensionTotal> = by_ext
            .into_iter()
            .map(|(ext, (files, bytes))| ExtensionTotal {
                extension: ext.to_string(),
                files,
                bytes,
            })
            .collect();
        totals.sort_by(|a, b| b.bytes.cmp(&a.bytes).then_with(|| a.extension.cmp(&b.extension)));
        totals.truncate(top);
        stats.top_extensions = totals;

        stats
    }
}

/// Print the summary of an existing output file
pub fn print_file_stats(path: &Path, stats: &FileStats) {
    println!();
    println!("{} {}", style("Scan").cyan().bold(), path.display());
    println!("{}", style("─".repeat(50)).dim());
    println!("  {} {}", style("Records:").bold(), format_number(stats.records));
    println!("  {} {}", style("Directories:").bold(), format_number(stats.dirs));
    println!("  {} {}", style("Files:").bold(), format_number(stats.files));
    println!("  {} {}", style("Total Size:").bold(), format_size(stats.bytes, BINARY));
    println!("  {} {}", style("Max Depth:").bold(), stats.max_depth);

    if !stats.top_extensions.is_empty() {
        println!();
        println!("  {}", style("Top extensions by size").bold());
        for ext in &stats.top_extensions {
            let name = if ext.extension.is_empty() {
                "(none)"
            } else {
                ext.extension.as_str()
            };
            println!(
                "    {:<12} {:>12} files  {:>10}",
                name,
                format_number(ext.files),
                format_size(ext.bytes, BINARY)
            );
        }
    }
    println!();
}

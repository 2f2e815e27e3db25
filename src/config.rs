//! Configuration types for pwalk
//!
//! This module defines:
//! - CLI argument parsing using clap derive macros
//! - Runtime configuration with validation
//! - The entry-name ignore predicate

use crate::error::ConfigError;
use crate::output::compress::{Compression, MAX_ZSTD_LEVEL, MIN_ZSTD_LEVEL};
use clap::Parser;
use regex::Regex;
use std::ffi::OsStr;
use std::path::PathBuf;
use std::time::Duration;

/// Maximum reasonable thread count
pub const MAX_THREADS: usize = 512;

/// Default size of the worker slot table
pub const DEFAULT_MAX_THREADS: usize = 32;

/// Buffer size limits
pub const DEFAULT_BUFFER_SIZE: usize = 512 * 1024;
pub const MIN_BUFFER_SIZE: usize = 4 * 1024;
pub const MAX_BUFFER_SIZE: usize = 64 * 1024 * 1024;

/// Default zstd level
pub const DEFAULT_ZSTD_LEVEL: i32 = 1;

/// How often the completion monitor samples the active-worker count
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Directory names skipped when snapshot ignoring is on
pub const SNAPSHOT_NAMES: &[&str] = &[".snapshot"];

/// Parallel filesystem metadata walker
#[derive(Parser, Debug, Clone)]
#[command(
    name = "pwalk",
    version,
    about = "Parallel filesystem metadata walker with CSV/zstd output",
    long_about = "Walks a directory tree with a bounded pool of threads and writes one CSV \
                  record per entry plus one aggregate record per directory.\n\n\
                  Subdirectories are handed to a new thread while slots are free and walked \
                  inline otherwise.",
    after_help = "EXAMPLES:\n    \
        pwalk /data -o scan.csv\n    \
        pwalk /data -o scan.csv.zst -t 64          # zstd, picked from the extension\n    \
        pwalk /home --exclude '^\\.cache$' -x\n    \
        pwalk stats scan.csv.zst",
    args_conflicts_with_subcommands = true,
    subcommand_negates_reqs = true
)]
pub struct CliArgs {
    /// Directory to scan
    #[arg(value_name = "ROOT")]
    pub root: Option<PathBuf>,

    /// Subcommand (stats)
    #[command(subcommand)]
    pub command: Option<Command>,

    /// Output CSV file
    #[arg(short, long, default_value = "scan.csv", value_name = "FILE")]
    pub output: PathBuf,

    /// Maximum number of concurrent walker threads
    #[arg(short = 't', long, default_value_t = default_threads(), value_name = "NUM")]
    pub threads: usize,

    /// Output compression (auto = zstd when the output ends in .zst)
    #[arg(long, value_enum, default_value_t = CompressArg::Auto)]
    pub compress: CompressArg,

    /// zstd compression level (1-22)
    #[arg(long, default_value_t = DEFAULT_ZSTD_LEVEL, value_name = "LEVEL")]
    pub level: i32,

    /// Per-thread buffer size in bytes before flushing to the output
    #[arg(long, default_value_t = DEFAULT_BUFFER_SIZE, value_name = "BYTES")]
    pub buffer_size: usize,

    /// Walk .snapshot directories too
    #[arg(long)]
    pub include_snapshots: bool,

    /// Skip entries whose name matches pattern (can be repeated)
    #[arg(long = "exclude", value_name = "PATTERN", action = clap::ArgAction::Append)]
    pub exclude_patterns: Vec<String>,

    /// Do not descend into directories on other filesystems
    #[arg(short = 'x', long)]
    pub one_file_system: bool,

    /// Give up waiting for workers after this many seconds
    #[arg(long, value_name = "SECS")]
    pub stall_timeout: Option<u64>,

    /// Quiet mode - suppress progress output
    #[arg(short = 'q', long)]
    pub quiet: bool,

    /// Verbose output (debug logging, list every skipped path)
    #[arg(short = 'v', long)]
    pub verbose: bool,
}

/// Subcommands
#[derive(clap::Subcommand, Debug, Clone)]
pub enum Command {
    /// Summarize an existing scan output
    Stats {
        /// Scan output (.csv or .csv.zst)
        #[arg(value_name = "FILE")]
        input: PathBuf,

        /// Number of extensions to list
        #[arg(short = 'n', long, default_value = "10")]
        top: usize,
    },
}

/// `--compress` values
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressArg {
    Auto,
    Zstd,
    None,
}

fn default_threads() -> usize {
    // Batch schedulers tell us how many CPUs we were given
    std::env::var("SLURM_CPUS_ON_NODE")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(num_cpus::get)
        .min(MAX_THREADS)
}

/// Validated runtime configuration
#[derive(Debug, Clone)]
pub struct WalkConfig {
    /// Directory to scan
    pub root: PathBuf,

    /// Output file path
    pub output_path: PathBuf,

    /// Size of the worker slot table (root worker included)
    pub max_threads: usize,

    /// Per-thread buffer flush threshold
    pub buffer_size: usize,

    /// Output compression
    pub compression: Compression,

    /// Skip reserved snapshot directory names
    pub ignore_snapshots: bool,

    /// Compiled exclude patterns, matched against entry names
    pub exclude_patterns: Vec<Regex>,

    /// Stop at filesystem boundaries
    pub one_file_system: bool,

    /// Upper bound on waiting for workers (None = wait indefinitely)
    pub stall_timeout: Option<Duration>,

    /// Completion monitor sampling interval
    pub poll_interval: Duration,

    /// Show progress indicator
    pub show_progress: bool,

    /// Verbose logging
    pub verbose: bool,
}

impl WalkConfig {
    /// Configuration with defaults for scanning `root` into `output_path`
    pub fn new(root: impl Into<PathBuf>, output_path: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            output_path: output_path.into(),
            max_threads: DEFAULT_MAX_THREADS,
            buffer_size: DEFAULT_BUFFER_SIZE,
            compression: Compression::None,
            ignore_snapshots: true,
            exclude_patterns: Vec::new(),
            one_file_system: false,
            stall_timeout: None,
            poll_interval: DEFAULT_POLL_INTERVAL,
            show_progress: false,
            verbose: false,
        }
    }

    /// Create and validate configuration from CLI arguments
    pub fn from_args(args: CliArgs) -> Result<Self, ConfigError> {
        let root = args.root.clone().ok_or_else(|| ConfigError::InvalidRoot {
            path: PathBuf::new(),
            reason: "a directory to scan is required".to_string(),
        })?;

        // Compile exclude patterns
        let exclude_patterns = args
            .exclude_patterns
            .iter()
            .map(|p| {
                Regex::new(p).map_err(|e| ConfigError::InvalidExcludePattern {
                    pattern: p.clone(),
                    reason: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let compression = match args.compress {
            CompressArg::None => Compression::None,
            CompressArg::Zstd => Compression::Zstd { level: args.level },
            CompressArg::Auto => {
                if args.output.extension().is_some_and(|ext| ext == "zst") {
                    Compression::Zstd { level: args.level }
                } else {
                    Compression::None
                }
            }
        };

        let config = Self {
            root,
            output_path: args.output,
            max_threads: args.threads,
            buffer_size: args.buffer_size,
            compression,
            ignore_snapshots: !args.include_snapshots,
            exclude_patterns,
            one_file_system: args.one_file_system,
            stall_timeout: args.stall_timeout.map(Duration::from_secs),
            poll_interval: DEFAULT_POLL_INTERVAL,
            show_progress: !args.quiet,
            verbose: args.verbose,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check limits and paths
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_threads == 0 || self.max_threads > MAX_THREADS {
            return Err(ConfigError::InvalidThreadCount {
                count: self.max_threads,
                max: MAX_THREADS,
            });
        }

        if self.buffer_size < MIN_BUFFER_SIZE || self.buffer_size > MAX_BUFFER_SIZE {
            return Err(ConfigError::InvalidBufferSize {
                size: self.buffer_size,
                min: MIN_BUFFER_SIZE,
                max: MAX_BUFFER_SIZE,
            });
        }

        if let Compression::Zstd { level } = self.compression {
            if !(MIN_ZSTD_LEVEL..=MAX_ZSTD_LEVEL).contains(&level) {
                return Err(ConfigError::InvalidCompressionLevel {
                    level,
                    min: MIN_ZSTD_LEVEL,
                    max: MAX_ZSTD_LEVEL,
                });
            }
        }

        match std::fs::metadata(&self.root) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(ConfigError::InvalidRoot {
                    path: self.root.clone(),
                    reason: "not a directory".to_string(),
                })
            }
            Err(e) => {
                return Err(ConfigError::InvalidRoot {
                    path: self.root.clone(),
                    reason: e.to_string(),
                })
            }
        }

        if let Some(parent) = self.output_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(ConfigError::InvalidOutputPath {
                    path: self.output_path.clone(),
                    reason: format!("Parent directory '{}' does not exist", parent.display()),
                });
            }
        }

        Ok(())
    }

    /// Should a directory entry with this name be skipped entirely?
    pub fn is_ignored(&self, name: &OsStr) -> bool {
        if self.ignore_snapshots && SNAPSHOT_NAMES.iter().any(|s| name == *s) {
            return true;
        }
        if self.exclude_patterns.is_empty() {
            return false;
        }
        let name = name.to_string_lossy();
        self.exclude_patterns.iter().any(|re| re.is_match(&name))
    }
}

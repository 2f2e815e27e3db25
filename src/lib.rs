//! pwalk - Parallel Filesystem Metadata Scanner
//!
//! Walks a directory tree with a bounded pool of threads and writes one CSV
//! record per entry, plus an aggregate record per directory, to a single
//! (optionally zstd-compressed) output file.
//!
//! # Features
//!
//! - **On-demand parallelism**: a subdirectory gets its own thread while a
//!   slot is free; otherwise the current thread recurses into it inline.
//!
//! - **Per-directory aggregates**: every directory row carries the number of
//!   immediate children and the total size of its immediate files.
//!
//! - **Lock-light output**: each worker fills a private buffer; the shared
//!   output is locked only to hand over a full buffer.
//!
//! - **Streaming compression**: a single zstd frame written incrementally.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                    WalkCoordinator                        │
//! │      root slot ─► poll active count ─► finalize           │
//! └────────────────────────────┬─────────────────────────────┘
//!                              │
//!     ┌────────────────────────┼────────────────────────┐
//!     ▼                        ▼                        ▼
//! ┌─────────┐            ┌─────────┐              ┌─────────┐
//! │Worker 1 │  ...       │Worker 2 │     ...      │Worker N │
//! │ readdir │            │ readdir │              │ readdir │
//! │ lstat   │            │ lstat   │              │ lstat   │
//! │ buffer  │            │ buffer  │              │ buffer  │
//! └────┬────┘            └────┬────┘              └────┬────┘
//!      └──────────────────────┼────────────────────────┘
//!                             ▼
//!                 ┌──────────────────────┐
//!                 │     OutputSink       │
//!                 │  header, zstd, file  │
//!                 └──────────────────────┘
//! ```
//!
//! # Example
//!
//! ```bash
//! # Scan with 64 threads into a compressed file
//! pwalk /data -t 64 -o data.csv.zst
//!
//! # Summarize an existing scan
//! pwalk stats data.csv.zst
//! ```

pub mod config;
pub mod entry;
pub mod error;
pub mod output;
pub mod progress;
pub mod walker;

pub use config::WalkConfig;
pub use entry::{DirStats, Entry, EntryType};
pub use error::{Result, ScanError, WalkerError};
pub use output::{read_records, Record};
pub use walker::{WalkCoordinator, WalkResult};

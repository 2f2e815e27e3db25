//! Walk coordinator - starts the root worker and waits for the pool to drain
//!
//! The coordinator is responsible for:
//! - Validating the configuration and opening the output
//! - Granting the root worker its slot before the thread starts
//! - Polling the active-worker count until it returns to zero
//! - Enforcing the optional stall timeout
//! - Finalizing the output and collecting statistics and errors

use crate::config::WalkConfig;
use crate::entry::{Entry, ROOT_DEPTH};
use crate::error::{ConfigError, Result, ScanError, WorkerError};
use crate::output::{OutputSink, SinkSummary};
use crate::walker::worker::{spawn_root, WalkShared, WorkItem};
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Polls allowed for workers to unwind after a stall timeout
const STALL_GRACE_POLLS: u32 = 40;

/// Result of a finished walk
#[derive(Debug)]
pub struct WalkResult {
    /// What was written to the output file
    pub output: SinkSummary,

    /// Directories opened
    pub dirs: u64,

    /// Non-directory entries recorded
    pub files: u64,

    /// Sum of non-directory sizes
    pub bytes: u64,

    /// Records written (files, leaves and aggregates)
    pub records: u64,

    /// Recoverable errors, in the order they were reported
    pub errors: Vec<ScanError>,

    /// Subtrees given their own thread (root included)
    pub spawned: u64,

    /// Subtrees walked inline
    pub inline: u64,

    /// Thread spawns that failed after a slot was granted; those subtrees ran inline
    pub spawn_failures: u64,

    /// Highest number of concurrently active workers
    pub peak_workers: usize,

    /// Time taken for the walk
    pub duration: Duration,

    /// False when the stall timeout cut the walk short
    pub completed: bool,

    /// Flushes rejected because they arrived after finalize
    pub late_flushes: u64,
}

/// Progress information for display
#[derive(Debug, Clone)]
pub struct WalkProgress {
    /// Directories opened
    pub dirs: u64,

    /// Non-directory entries recorded
    pub files: u64,

    /// Sum of non-directory sizes
    pub bytes: u64,

    /// Records encoded
    pub records: u64,

    /// Workers currently holding a slot
    pub active_workers: usize,

    /// Size of the slot table
    pub max_workers: usize,

    /// Recoverable errors so far
    pub errors: u64,

    /// Elapsed time
    pub elapsed: Duration,
}

impl WalkProgress {
    /// Calculate files per second rate
    pub fn files_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.files as f64 / secs
        } else {
            0.0
        }
    }

    /// Calculate dirs per second rate
    pub fn dirs_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.dirs as f64 / secs
        } else {
            0.0
        }
    }
}

/// Coordinates one parallel scan
pub struct WalkCoordinator {
    shared: Arc<WalkShared>,
    root: WorkItem,
}

impl WalkCoordinator {
    /// Validate the configuration, stat the root and open the output
    pub fn new(config: WalkConfig) -> Result<Self> {
        config.validate()?;

        // The root is followed if it is a symlink; nothing below it is
        let meta = fs::metadata(&config.root).map_err(|e| ConfigError::InvalidRoot {
            path: config.root.clone(),
            reason: e.to_string(),
        })?;

        let root = WorkItem {
            path: config.root.clone(),
            entry: Entry::from_metadata(&meta, 0, ROOT_DEPTH),
        };

        let sink = OutputSink::create(&config.output_path, config.compression)?;
        let shared = Arc::new(WalkShared::new(config, sink, meta.dev()));

        Ok(Self { shared, root })
    }

    /// Run the walk to completion
    pub fn run(self) -> Result<WalkResult> {
        self.run_with_progress(|_| {})
    }

    /// Run the walk, reporting progress on every poll
    pub fn run_with_progress<F>(self, mut on_progress: F) -> Result<WalkResult>
    where
        F: FnMut(&WalkProgress),
    {
        let start = Instant::now();
        let shared = &self.shared;

        info!(
            root = %self.root.path.display(),
            output = %shared.sink.path().display(),
            threads = shared.pool.capacity(),
            compressed = shared.config.compression.is_enabled(),
            "Starting filesystem walk"
        );

        let slot = shared.pool.try_acquire_slot().ok_or_else(|| WorkerError::SpawnFailed {
            path: self.root.path.clone(),
            reason: "no free worker slot".to_string(),
        })?;
        spawn_root(shared, self.root.clone(), slot)?;
        shared.stats.spawned.fetch_add(1, Ordering::Relaxed);

        let completed = self.wait_for_completion(start, &mut on_progress);

        // Moves the stream out of the sink; anything flushed later is rejected
        let output = shared.sink.finalize()?;

        let panicked = shared.panicked.load(Ordering::SeqCst);
        if panicked > 0 {
            return Err(WorkerError::Panicked { count: panicked }.into());
        }

        let duration = start.elapsed();
        let errors = shared.errors.drain();
        let pool_stats = shared.pool.stats();
        let stats = &shared.stats;

        let result = WalkResult {
            output,
            dirs: stats.dirs.load(Ordering::Relaxed),
            files: stats.files.load(Ordering::Relaxed),
            bytes: stats.bytes.load(Ordering::Relaxed),
            records: stats.records.load(Ordering::Relaxed),
            errors,
            spawned: stats.spawned.load(Ordering::Relaxed),
            inline: stats.inline.load(Ordering::Relaxed),
            spawn_failures: stats.spawn_failures.load(Ordering::Relaxed),
            peak_workers: pool_stats.peak_active,
            duration,
            completed,
            late_flushes: shared.sink.stats().late_flushes(),
        };

        info!(
            dirs = result.dirs,
            files = result.files,
            bytes = result.bytes,
            errors = result.errors.len(),
            completed = result.completed,
            duration_secs = duration.as_secs(),
            "Walk completed"
        );

        Ok(result)
    }

    /// Poll the active count until it reaches zero or the stall timeout expires
    fn wait_for_completion<F>(&self, start: Instant, on_progress: &mut F) -> bool
    where
        F: FnMut(&WalkProgress),
    {
        let shared = &self.shared;
        let poll = shared.config.poll_interval;
        let deadline = shared.config.stall_timeout.map(|timeout| start + timeout);

        loop {
            if shared.pool.active() == 0 {
                on_progress(&self.progress(start));
                return true;
            }

            on_progress(&self.progress(start));

            if deadline.is_some_and(|d| Instant::now() >= d) {
                break;
            }

            thread::sleep(poll);
        }

        let stuck = shared.pool.live_paths();
        warn!(
            active = shared.pool.active(),
            "Stall timeout reached, stopping workers"
        );
        for path in &stuck {
            warn!(path = %path.display(), "Worker still active");
        }

        shared.stop.store(true, Ordering::SeqCst);

        for _ in 0..STALL_GRACE_POLLS {
            if shared.pool.active() == 0 {
                debug!("All workers stopped after stall timeout");
                return false;
            }
            thread::sleep(poll);
        }

        warn!(
            active = shared.pool.active(),
            "Finalizing output with workers still running"
        );
        false
    }

    fn progress(&self, start: Instant) -> WalkProgress {
        let shared = &self.shared;
        WalkProgress {
            dirs: shared.stats.dirs.load(Ordering::Relaxed),
            files: shared.stats.files.load(Ordering::Relaxed),
            bytes: shared.stats.bytes.load(Ordering::Relaxed),
            records: shared.stats.records.load(Ordering::Relaxed),
            active_workers: shared.pool.active(),
            max_workers: shared.pool.capacity(),
            errors: shared.errors.count(),
            elapsed: start.elapsed(),
        }
    }
}

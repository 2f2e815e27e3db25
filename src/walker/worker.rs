//! Traversal worker
//!
//! A worker walks one directory subtree depth-first. For every child
//! directory it asks the pool for a slot: granted, the subtree goes to a new
//! thread with its own buffer; refused, the worker recurses inline into the
//! same buffer. Either way the parent keeps going with its next sibling.
//!
//! A directory's aggregate record is written only after every child of that
//! directory has been encoded, handed to another worker, or reported as an
//! error. Within one buffer, records therefore come out in traversal order.

use crate::config::WalkConfig;
use crate::entry::{DirStats, Entry};
use crate::error::{ErrorCollector, ScanErrorKind, SinkError, SinkResult, WorkerError};
use crate::output::{encode_record, OutputSink, RecordBuffer};
use crate::walker::pool::{SlotId, SlotPool};
use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::{debug, error, trace, warn};

/// Typical encoded record length; the scratch line grows if a name is longer
const RECORD_HINT: usize = 256;

/// How the current traversal came to run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkMode {
    /// Own thread and buffer; flushes when done, then gives the slot back
    Spawned(SlotId),
    /// Recursion on the caller's thread, sharing the caller's buffer
    Inline,
}

/// A directory to walk, fully owned so it can move to another thread
#[derive(Debug, Clone)]
pub struct WorkItem {
    /// Path of the directory
    pub path: PathBuf,

    /// The directory's own metadata (with parent inode and depth)
    pub entry: Entry,
}

impl WorkItem {
    /// Name used for the aggregate record
    ///
    /// The final path component, or the path as given when it has none
    /// (`/`, `.`).
    pub fn name(&self) -> &OsStr {
        self.path.file_name().unwrap_or(self.path.as_os_str())
    }
}

/// Scan-wide counters
#[derive(Debug, Default)]
pub struct WalkStats {
    /// Directories successfully opened
    pub dirs: AtomicU64,

    /// Non-directory entries recorded
    pub files: AtomicU64,

    /// Sum of non-directory sizes
    pub bytes: AtomicU64,

    /// Records encoded (files, leaves and aggregates)
    pub records: AtomicU64,

    /// Subtrees handed to a new thread
    pub spawned: AtomicU64,

    /// Subtrees walked inline because no slot was free
    pub inline: AtomicU64,

    /// Thread creations that failed and fell back to inline
    pub spawn_failures: AtomicU64,
}

impl WalkStats {
    fn record_file(&self, size: u64) {
        self.files.fetch_add(1, Ordering::Relaxed);
        self.bytes.fetch_add(size, Ordering::Relaxed);
    }
}

/// State shared by every worker of one scan
pub struct WalkShared {
    pub config: WalkConfig,
    pub pool: SlotPool,
    pub sink: OutputSink,
    pub errors: ErrorCollector,
    pub stats: WalkStats,

    /// Raised on stall timeout or a fatal output failure
    pub stop: AtomicBool,

    /// Workers that unwound from a panic
    pub panicked: AtomicUsize,

    /// Device of the scan root, for the cross-device guard
    pub root_dev: u64,
}

impl WalkShared {
    pub fn new(config: WalkConfig, sink: OutputSink, root_dev: u64) -> Self {
        Self {
            pool: SlotPool::new(config.max_threads),
            config,
            sink,
            errors: ErrorCollector::new(),
            stats: WalkStats::default(),
            stop: AtomicBool::new(false),
            panicked: AtomicUsize::new(0),
            root_dev,
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stop.load(Ordering::Relaxed)
    }

    /// A worker could not write its records: stop everyone
    fn abort(&self, path: &Path, err: &SinkError) {
        match err {
            SinkError::Finalized => {
                warn!(path = %path.display(), "Worker finished after the output was finalized")
            }
            _ => error!(path = %path.display(), error = %err, "Aborting scan"),
        }
        self.stop.store(true, Ordering::SeqCst);
    }
}

/// Releases a spawned worker's slot however the worker ends
struct SlotGuard<'a> {
    shared: &'a WalkShared,
    slot: SlotId,
    path: &'a Path,
}

impl Drop for SlotGuard<'_> {
    fn drop(&mut self) {
        if thread::panicking() {
            self.shared.panicked.fetch_add(1, Ordering::SeqCst);
            error!(path = %self.path.display(), slot = self.slot.index(), "Worker panicked");
        }
        self.shared.pool.release_slot(self.slot);
    }
}

/// Start the root worker on its own thread
///
/// The slot must already be granted. On failure the slot is released and
/// the scan cannot proceed.
pub fn spawn_root(shared: &Arc<WalkShared>, item: WorkItem, slot: SlotId) -> Result<(), WorkerError> {
    let path = item.path.clone();
    spawn_thread(shared, item, slot).map_err(|(_, e)| {
        shared.pool.release_slot(slot);
        WorkerError::SpawnFailed {
            path,
            reason: e.to_string(),
        }
    })
}

/// Create the thread for a granted slot; hands the item back on failure
fn spawn_thread(
    shared: &Arc<WalkShared>,
    item: WorkItem,
    slot: SlotId,
) -> Result<(), (WorkItem, std::io::Error)> {
    let fallback = item.clone();
    let worker_shared = Arc::clone(shared);

    let spawned = thread::Builder::new()
        .name(format!("pwalk-{}", slot.index()))
        .spawn(move || run_spawned(&worker_shared, &item, slot));

    match spawned {
        Ok(handle) => {
            debug!(slot = slot.index(), path = %fallback.path.display(), "Worker spawned");
            shared.pool.attach(slot, fallback.path, handle);
            Ok(())
        }
        Err(e) => Err((fallback, e)),
    }
}

/// Body of a spawned worker thread
fn run_spawned(shared: &Arc<WalkShared>, item: &WorkItem, slot: SlotId) {
    let _guard = SlotGuard {
        shared: shared.as_ref(),
        slot,
        path: &item.path,
    };

    let mut buffer = RecordBuffer::with_capacity(shared.config.buffer_size);
    let mut line = Vec::with_capacity(RECORD_HINT);

    if let Err(e) = traverse(shared, item, &mut buffer, WorkMode::Spawned(slot), &mut line) {
        shared.abort(&item.path, &e);
    }
}

/// Walk one directory and everything below it that stays on this thread
///
/// `line` is scratch space for encoding one record. Errors returned are
/// output failures only; filesystem errors are reported to the collector and
/// the walk continues.
pub fn traverse(
    shared: &Arc<WalkShared>,
    item: &WorkItem,
    buffer: &mut RecordBuffer,
    mode: WorkMode,
    line: &mut Vec<u8>,
) -> SinkResult<()> {
    let reader = match fs::read_dir(&item.path) {
        Ok(reader) => reader,
        Err(e) => {
            shared.errors.report(&item.path, ScanErrorKind::ReadDir, &e);
            return finish(shared, buffer, mode);
        }
    };

    shared.stats.dirs.fetch_add(1, Ordering::Relaxed);
    trace!(path = %item.path.display(), "Reading directory");

    let aggregate = visit_children(shared, item, reader, buffer, line)?;

    emit(shared, buffer, line, &item.entry, item.name(), Some(&aggregate))?;

    finish(shared, buffer, mode)
}

/// Record, hand off or descend into every child of one directory
///
/// Returns the directory's aggregate. Children whose metadata cannot be read
/// are reported and left out of it.
fn visit_children<I>(
    shared: &Arc<WalkShared>,
    item: &WorkItem,
    entries: I,
    buffer: &mut RecordBuffer,
    line: &mut Vec<u8>,
) -> SinkResult<DirStats>
where
    I: IntoIterator<Item = io::Result<fs::DirEntry>>,
{
    let mut aggregate = DirStats::default();

    for dirent in entries {
        if shared.is_stopping() {
            break;
        }

        let dirent = match dirent {
            Ok(dirent) => dirent,
            Err(e) => {
                // The stream cannot be resumed; keep what was read so far
                shared.errors.report(&item.path, ScanErrorKind::ReadDir, &e);
                break;
            }
        };

        let name = dirent.file_name();
        if shared.config.is_ignored(&name) {
            continue;
        }

        let path = dirent.path();
        let meta = match dirent.metadata() {
            Ok(meta) => meta,
            Err(e) => {
                shared.errors.report(&path, ScanErrorKind::Metadata, &e);
                continue;
            }
        };

        if !meta.is_dir() {
            let entry = Entry::from_metadata(&meta, item.entry.inode, item.entry.depth);
            emit(shared, buffer, line, &entry, &name, None)?;
            shared.stats.record_file(entry.size);
            aggregate.add_file(entry.size);
            continue;
        }

        let entry = Entry::from_metadata(&meta, item.entry.inode, item.entry.depth + 1);

        if shared.config.one_file_system && entry.dev != shared.root_dev {
            debug!(path = %path.display(), "Not crossing filesystem boundary");
            emit(shared, buffer, line, &entry, &name, None)?;
            aggregate.add_dir();
            continue;
        }

        let child = WorkItem { path, entry };
        match shared.pool.try_acquire_slot() {
            Some(slot) => {
                if let Err((child, e)) = spawn_thread(shared, child, slot) {
                    shared.pool.release_slot(slot);
                    shared.stats.spawn_failures.fetch_add(1, Ordering::Relaxed);
                    warn!(path = %child.path.display(), error = %e, "Thread spawn failed, walking inline");
                    descend(shared, &child, buffer, line)?;
                } else {
                    shared.stats.spawned.fetch_add(1, Ordering::Relaxed);
                }
            }
            None => descend(shared, &child, buffer, line)?,
        }
        aggregate.add_dir();
    }

    Ok(aggregate)
}

/// Inline recursion into a child directory
fn descend(
    shared: &Arc<WalkShared>,
    child: &WorkItem,
    buffer: &mut RecordBuffer,
    line: &mut Vec<u8>,
) -> SinkResult<()> {
    shared.stats.inline.fetch_add(1, Ordering::Relaxed);
    traverse(shared, child, buffer, WorkMode::Inline, line)
}

/// End of a traversal: a spawned worker hands over everything it buffered
fn finish(shared: &WalkShared, buffer: &mut RecordBuffer, mode: WorkMode) -> SinkResult<()> {
    match mode {
        WorkMode::Spawned(_) => shared.sink.flush(buffer),
        WorkMode::Inline => Ok(()),
    }
}

fn emit(
    shared: &WalkShared,
    buffer: &mut RecordBuffer,
    line: &mut Vec<u8>,
    entry: &Entry,
    name: &OsStr,
    aggregate: Option<&DirStats>,
) -> SinkResult<()> {
    encode_record(line, entry, name, aggregate);
    shared.sink.append(buffer, line)?;
    shared.stats.records.fetch_add(1, Ordering::Relaxed);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::ROOT_DEPTH;
    use crate::output::{parse_records, Compression};
    use std::fs::File;
    use std::io::Write;

    fn shared_for(root: &Path, out: &Path, threads: usize) -> Arc<WalkShared> {
        let mut config = WalkConfig::new(root, out);
        config.max_threads = threads;
        let sink = OutputSink::create(out, Compression::None).unwrap();
        let dev = std::os::unix::fs::MetadataExt::dev(&fs::metadata(root).unwrap());
        Arc::new(WalkShared::new(config, sink, dev))
    }

    fn root_item(root: &Path) -> WorkItem {
        let meta = fs::metadata(root).unwrap();
        WorkItem {
            path: root.to_path_buf(),
            entry: Entry::from_metadata(&meta, 0, ROOT_DEPTH),
        }
    }

    #[test]
    fn test_inline_walk_orders_aggregate_after_children() {
        let tree = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let out = out_dir.path().join("out.csv");

        File::create(tree.path().join("a.txt")).unwrap().write_all(b"hello").unwrap();
        fs::create_dir(tree.path().join("sub")).unwrap();
        File::create(tree.path().join("sub/b.txt")).unwrap().write_all(b"1234567").unwrap();

        let shared = shared_for(tree.path(), &out, 1);
        let mut buffer = RecordBuffer::with_capacity(4096);
        let mut line = Vec::new();
        traverse(&shared, &root_item(tree.path()), &mut buffer, WorkMode::Inline, &mut line).unwrap();
        shared.sink.flush(&mut buffer).unwrap();
        shared.sink.finalize().unwrap();

        let records = parse_records(&fs::read(&out).unwrap()).unwrap();
        assert_eq!(records.len(), 4);

        let pos = |name: &str| records.iter().position(|r| r.filename == name).unwrap();
        let root_name = tree.path().file_name().unwrap().to_string_lossy().into_owned();
        assert!(pos("b.txt") < pos("sub"));
        assert!(pos("sub") < pos(&root_name));
        assert!(pos("a.txt") < pos(&root_name));

        let sub = &records[pos("sub")];
        assert_eq!((sub.file_count, sub.dir_sum, sub.depth), (1, 7, 0));
        let root = &records[pos(&root_name)];
        assert_eq!((root.file_count, root.dir_sum, root.depth), (2, 5, -1));

        // Files share their directory's depth
        assert_eq!(records[pos("a.txt")].depth, -1);
        assert_eq!(records[pos("b.txt")].depth, 0);

        assert_eq!(shared.stats.inline.load(Ordering::Relaxed), 1);
        assert_eq!(shared.stats.spawned.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_unreadable_root_reports_without_aggregate() {
        let out_dir = tempfile::tempdir().unwrap();
        let out = out_dir.path().join("out.csv");
        let shared = shared_for(out_dir.path(), &out, 1);

        let mut item = root_item(out_dir.path());
        item.path = out_dir.path().join("missing");

        let mut buffer = RecordBuffer::with_capacity(4096);
        let mut line = Vec::new();
        traverse(&shared, &item, &mut buffer, WorkMode::Inline, &mut line).unwrap();

        assert!(buffer.is_empty());
        let errors = shared.errors.drain();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].kind, ScanErrorKind::ReadDir);
    }

    #[test]
    fn test_stop_flag_truncates_listing() {
        let tree = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let out = out_dir.path().join("out.csv");
        for i in 0..10 {
            File::create(tree.path().join(format!("f{i}"))).unwrap();
        }

        let shared = shared_for(tree.path(), &out, 1);
        shared.stop.store(true, Ordering::SeqCst);

        let mut buffer = RecordBuffer::with_capacity(4096);
        let mut line = Vec::new();
        traverse(&shared, &root_item(tree.path()), &mut buffer, WorkMode::Inline, &mut line).unwrap();

        assert_eq!(shared.stats.files.load(Ordering::Relaxed), 0);
        assert_eq!(shared.stats.records.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_vanished_children_are_reported_and_not_counted() {
        let tree = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let out = out_dir.path().join("out.csv");
        let names = ["a", "b", "c"];
        for name in names {
            File::create(tree.path().join(name)).unwrap().write_all(b"xyz").unwrap();
        }

        let shared = shared_for(tree.path(), &out, 1);
        let item = root_item(tree.path());

        // A small listing is fetched in one batch, so every name is still
        // returned after the files are gone but each lookup fails
        let mut listing = fs::read_dir(tree.path()).unwrap();
        let first = listing.next().unwrap();
        for name in names {
            fs::remove_file(tree.path().join(name)).unwrap();
        }

        let mut buffer = RecordBuffer::with_capacity(4096);
        let mut line = Vec::new();
        let aggregate = visit_children(
            &shared,
            &item,
            std::iter::once(first).chain(listing),
            &mut buffer,
            &mut line,
        )
        .unwrap();

        assert_eq!(aggregate, DirStats::default());
        assert!(buffer.is_empty());
        assert_eq!(shared.stats.files.load(Ordering::Relaxed), 0);

        let errors = shared.errors.drain();
        assert_eq!(errors.len(), 3);
        for err in &errors {
            assert_eq!(err.kind, ScanErrorKind::Metadata);
            assert!(err.is_routine());
            assert_eq!(err.path.parent(), Some(tree.path()));
        }
    }

    #[test]
    fn test_cross_device_directories_become_leaves() {
        let tree = tempfile::tempdir().unwrap();
        let out_dir = tempfile::tempdir().unwrap();
        let out = out_dir.path().join("out.csv");
        File::create(tree.path().join("a.txt")).unwrap().write_all(b"hello").unwrap();
        fs::create_dir(tree.path().join("mnt")).unwrap();
        File::create(tree.path().join("mnt/inner.txt")).unwrap().write_all(b"far").unwrap();

        let mut config = WalkConfig::new(tree.path(), &out);
        config.one_file_system = true;
        let sink = OutputSink::create(&out, Compression::None).unwrap();
        let dev = std::os::unix::fs::MetadataExt::dev(&fs::metadata(tree.path()).unwrap());

        // Pretend the scan started on another device: every subdirectory is foreign
        let shared = Arc::new(WalkShared::new(config, sink, dev.wrapping_add(1)));

        let mut buffer = RecordBuffer::with_capacity(4096);
        let mut line = Vec::new();
        traverse(&shared, &root_item(tree.path()), &mut buffer, WorkMode::Inline, &mut line).unwrap();
        shared.sink.flush(&mut buffer).unwrap();
        shared.sink.finalize().unwrap();

        let records = parse_records(&fs::read(&out).unwrap()).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records.iter().all(|r| r.filename != "inner.txt"));

        let mnt = records.iter().find(|r| r.filename == "mnt").unwrap();
        assert!(!mnt.is_dir_row());
        assert_eq!((mnt.file_count, mnt.dir_sum, mnt.depth), (-1, 0, 0));

        let root_name = tree.path().file_name().unwrap().to_string_lossy().into_owned();
        let root = records.iter().find(|r| r.filename == root_name).unwrap();
        assert_eq!((root.file_count, root.dir_sum), (2, 5));

        assert_eq!(shared.stats.dirs.load(Ordering::Relaxed), 1);
        assert_eq!(shared.stats.inline.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_work_item_name() {
        let meta = fs::metadata("/").unwrap();
        let entry = Entry::from_metadata(&meta, 0, 0);

        let item = WorkItem {
            path: PathBuf::from("/"),
            entry: entry.clone(),
        };
        assert_eq!(item.name(), OsStr::new("/"));

        let item = WorkItem {
            path: PathBuf::from("/data/projects"),
            entry,
        };
        assert_eq!(item.name(), OsStr::new("projects"));
    }
}

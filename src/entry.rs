//! Filesystem entry types
//!
//! An [`Entry`] is one node's metadata as carried from the `lstat`-style
//! lookup to the record encoder. Entries are transient: built, encoded and
//! dropped; the walker never keeps a tree of them.

use std::fs::Metadata;
use std::os::unix::fs::MetadataExt;

/// Depth recorded for the scan root
pub const ROOT_DEPTH: i32 = -1;

/// Type of filesystem entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    /// Regular file
    File,
    /// Directory
    Directory,
    /// Symlink, device, fifo, socket
    Other,
}

impl EntryType {
    /// Classify from full mode bits
    pub fn from_mode(mode: u32) -> Self {
        match mode & 0o170000 {
            0o100000 => EntryType::File,      // S_IFREG
            0o040000 => EntryType::Directory, // S_IFDIR
            _ => EntryType::Other,
        }
    }

    /// Check if this is a directory
    pub fn is_dir(&self) -> bool {
        *self == EntryType::Directory
    }
}

/// Metadata for one filesystem node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    /// Inode number
    pub inode: u64,

    /// Inode of the containing directory (0 for the scan root)
    pub parent_inode: u64,

    /// Directory depth: the root is [`ROOT_DEPTH`], a subdirectory is one
    /// deeper than its parent, and a non-directory shares its parent's depth
    pub depth: i32,

    /// Entry type
    pub kind: EntryType,

    /// Owner user ID
    pub uid: u32,

    /// Owner group ID
    pub gid: u32,

    /// Size in bytes
    pub size: u64,

    /// Device ID
    pub dev: u64,

    /// Number of 512-byte blocks allocated
    pub blocks: u64,

    /// Number of hard links
    pub nlink: u64,

    /// Full mode (type + permissions)
    pub mode: u32,

    /// Last access time (Unix timestamp)
    pub atime: i64,

    /// Last modification time (Unix timestamp)
    pub mtime: i64,

    /// Status change time (Unix timestamp)
    pub ctime: i64,
}

impl Entry {
    /// Build an entry from metadata obtained without following symlinks
    pub fn from_metadata(meta: &Metadata, parent_inode: u64, depth: i32) -> Self {
        Self {
            inode: meta.ino(),
            parent_inode,
            depth,
            kind: EntryType::from_mode(meta.mode()),
            uid: meta.uid(),
            gid: meta.gid(),
            size: meta.size(),
            dev: meta.dev(),
            blocks: meta.blocks(),
            nlink: meta.nlink(),
            mode: meta.mode(),
            atime: meta.atime(),
            mtime: meta.mtime(),
            ctime: meta.ctime(),
        }
    }
}

/// Running aggregate for one directory's immediate children
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirStats {
    /// Immediate children with a record (files and directories)
    pub file_count: u64,

    /// Sum of immediate non-directory children's sizes
    pub dir_sum: u64,
}

impl DirStats {
    /// Account a non-directory child
    pub fn add_file(&mut self, size: u64) {
        self.file_count += 1;
        self.dir_sum += size;
    }

    /// Account a subdirectory; it never contributes to `dir_sum`
    pub fn add_dir(&mut self) {
        self.file_count += 1;
    }
}

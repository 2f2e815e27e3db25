//! Record encoder
//!
//! Turns one [`Entry`] into one CSV line. File rows and directory aggregate
//! rows share the same column layout; a non-directory row carries
//! `pw_fcount = -1` and `pw_dirsum = 0`.
//!
//! Text fields (`filename`, `fileExtension`, `st_mode`) are always quoted and
//! embedded quotes are doubled, so a plain CSV reader recovers names that
//! contain commas, quotes or newlines. Names are written as raw bytes.

use crate::entry::{DirStats, Entry};
use std::ffi::OsStr;
use std::io::Write;
use std::os::unix::ffi::OsStrExt;

/// Header line, column-compatible with the classic pwalk CSV layout
pub const CSV_HEADER: &str = "inode,parent-inode,directory-depth,\"filename\",\"fileExtension\",\
UID,GID,st_size,st_dev,st_blocks,st_nlink,\"st_mode\",st_atime,st_mtime,st_ctime,pw_fcount,pw_dirsum\n";

/// Number of columns in a record
pub const FIELD_COUNT: usize = 17;

/// `pw_fcount` value marking a non-directory row
pub const NOT_A_DIRECTORY: i64 = -1;

/// Extension of a file name: the bytes after the last `.`, or empty when the
/// only dot is the leading one (`.bashrc`) or there is none
pub fn extension(name: &[u8]) -> &[u8] {
    match name.iter().rposition(|&b| b == b'.') {
        Some(idx) if idx > 0 => &name[idx + 1..],
        _ => &[],
    }
}

/// Encode one record into `out`, replacing its previous contents
///
/// `aggregate` is `Some` for a directory's summary row and `None` for every
/// other row (including directories that were not descended into).
pub fn encode_record(out: &mut Vec<u8>, entry: &Entry, name: &OsStr, aggregate: Option<&DirStats>) {
    out.clear();

    let name = name.as_bytes();
    let (file_count, dir_sum) = match aggregate {
        Some(stats) => (stats.file_count as i64, stats.dir_sum),
        None => (NOT_A_DIRECTORY, 0),
    };

    // Writes into a Vec<u8> cannot fail
    let _ = write!(out, "{},{},{},", entry.inode, entry.parent_inode, entry.depth);
    push_quoted(out, name);
    out.push(b',');
    push_quoted(out, extension(name));
    let _ = writeln!(
        out,
        ",{},{},{},{},{},{},\"{:o}\",{},{},{},{},{}",
        entry.uid,
        entry.gid,
        entry.size,
        entry.dev,
        entry.blocks,
        entry.nlink,
        entry.mode,
        entry.atime,
        entry.mtime,
        entry.ctime,
        file_count,
        dir_sum,
    );
}

fn push_quoted(out: &mut Vec<u8>, field: &[u8]) {
    out.push(b'"');
    for &b in field {
        if b == b'"' {
            out.push(b'"');
        }
        out.push(b);
    }
    out.push(b'"');
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryType;

    fn sample_entry() -> Entry {
        Entry {
            inode: 12345,
            parent_inode: 100,
            depth: 2,
            kind: EntryType::File,
            uid: 1000,
            gid: 1001,
            size: 5,
            dev: 2049,
            blocks: 8,
            nlink: 1,
            mode: 0o100644,
            atime: 1_700_000_000,
            mtime: 1_700_000_001,
            ctime: 1_700_000_002,
        }
    }

    #[test]
    fn test_extension_rules() {
        assert_eq!(extension(b"a.txt"), b"txt");
        assert_eq!(extension(b"archive.tar.gz"), b"gz");
        assert_eq!(extension(b".bashrc"), b"");
        assert_eq!(extension(b".config.toml"), b"toml");
        assert_eq!(extension(b"Makefile"), b"");
        assert_eq!(extension(b"trailing."), b"");
    }

    #[test]
    fn test_encode_file_record() {
        let mut out = Vec::new();
        encode_record(&mut out, &sample_entry(), OsStr::new("a.txt"), None);

        assert_eq!(
            String::from_utf8(out).unwrap(),
            "12345,100,2,\"a.txt\",\"txt\",1000,1001,5,2049,8,1,\"100644\",\
             1700000000,1700000001,1700000002,-1,0\n"
        );
    }

    #[test]
    fn test_encode_aggregate_record() {
        let mut entry = sample_entry();
        entry.kind = EntryType::Directory;
        entry.mode = 0o040755;
        let stats = DirStats {
            file_count: 2,
            dir_sum: 5,
        };

        let mut out = Vec::new();
        encode_record(&mut out, &entry, OsStr::new("r"), Some(&stats));
        let line = String::from_utf8(out).unwrap();

        assert!(line.contains(",\"40755\","));
        assert!(line.ends_with(",2,5\n"));
    }

    #[test]
    fn test_encode_escapes_quotes() {
        let mut out = Vec::new();
        encode_record(&mut out, &sample_entry(), OsStr::new("say \"hi\".md"), None);
        let line = String::from_utf8(out).unwrap();

        assert!(line.contains(",\"say \"\"hi\"\".md\",\"md\","));
    }

    #[test]
    fn test_encode_reuses_buffer() {
        let mut out = Vec::new();
        encode_record(&mut out, &sample_entry(), OsStr::new("first-long-name.txt"), None);
        encode_record(&mut out, &sample_entry(), OsStr::new("b"), None);

        assert_eq!(out.iter().filter(|&&b| b == b'\n').count(), 1);
        assert!(String::from_utf8(out).unwrap().contains("\"b\",\"\""));
    }

    #[test]
    fn test_header_field_count() {
        assert_eq!(CSV_HEADER.trim_end().split(',').count(), FIELD_COUNT);
        assert!(CSV_HEADER.ends_with('\n'));
    }
}

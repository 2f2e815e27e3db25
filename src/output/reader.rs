//! Record stream decoder
//!
//! Reads back what the sink wrote: plain CSV or a zstd frame (detected by
//! magic), quoted fields with doubled quotes, and names with embedded commas
//! or newlines.

use crate::output::record::{FIELD_COUNT, NOT_A_DIRECTORY};
use std::io;
use std::path::Path;
use std::str::FromStr;

const ZSTD_MAGIC: [u8; 4] = [0x28, 0xB5, 0x2F, 0xFD];

/// One decoded row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub inode: u64,
    pub parent_inode: u64,
    pub depth: i32,
    pub filename: String,
    pub extension: String,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub dev: u64,
    pub blocks: u64,
    pub nlink: u64,
    pub mode: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub file_count: i64,
    pub dir_sum: u64,
}

impl Record {
    /// Directory aggregate rows carry a real `file_count`
    pub fn is_dir_row(&self) -> bool {
        self.file_count != NOT_A_DIRECTORY
    }
}

/// Read and decode an output file
pub fn read_records(path: &Path) -> io::Result<Vec<Record>> {
    let raw = std::fs::read(path)?;
    parse_records(&raw)
}

/// Decode an output stream held in memory
pub fn parse_records(raw: &[u8]) -> io::Result<Vec<Record>> {
    let decoded;
    let text = if raw.starts_with(&ZSTD_MAGIC) {
        decoded = zstd::stream::decode_all(raw)?;
        &decoded[..]
    } else {
        raw
    };

    let mut rows = split_rows(text)?.into_iter();

    match rows.next() {
        Some(header) if header.first().map(|f| f.as_slice()) == Some(b"inode") => {}
        _ => return Err(invalid("missing header line".to_string())),
    }

    rows.enumerate()
        .map(|(idx, fields)| parse_row(idx + 2, &fields))
        .collect()
}

/// Split CSV text into rows of unquoted fields
fn split_rows(text: &[u8]) -> io::Result<Vec<Vec<Vec<u8>>>> {
    let mut rows = Vec::new();
    let mut fields = Vec::new();
    let mut field = Vec::new();
    let mut in_quotes = false;
    let mut iter = text.iter().copied().peekable();

    while let Some(b) = iter.next() {
        if in_quotes {
            if b == b'"' {
                if iter.peek() == Some(&b'"') {
                    iter.next();
                    field.push(b'"');
                } else {
                    in_quotes = false;
                }
            } else {
                field.push(b);
            }
            continue;
        }

        match b {
            b'"' => in_quotes = true,
            b',' => fields.push(std::mem::take(&mut field)),
            b'\n' => {
                fields.push(std::mem::take(&mut field));
                rows.push(std::mem::take(&mut fields));
            }
            _ => field.push(b),
        }
    }

    if in_quotes {
        return Err(invalid("unterminated quoted field".to_string()));
    }
    if !field.is_empty() || !fields.is_empty() {
        fields.push(field);
        rows.push(fields);
    }

    Ok(rows)
}

fn parse_row(line: usize, fields: &[Vec<u8>]) -> io::Result<Record> {
    if fields.len() != FIELD_COUNT {
        return Err(invalid(format!(
            "record {line}: expected {FIELD_COUNT} fields, found {}",
            fields.len()
        )));
    }

    let text = |idx: usize| String::from_utf8_lossy(&fields[idx]).into_owned();

    Ok(Record {
        inode: number(line, &fields[0])?,
        parent_inode: number(line, &fields[1])?,
        depth: number(line, &fields[2])?,
        filename: text(3),
        extension: text(4),
        uid: number(line, &fields[5])?,
        gid: number(line, &fields[6])?,
        size: number(line, &fields[7])?,
        dev: number(line, &fields[8])?,
        blocks: number(line, &fields[9])?,
        nlink: number(line, &fields[10])?,
        mode: octal(line, &fields[11])?,
        atime: number(line, &fields[12])?,
        mtime: number(line, &fields[13])?,
        ctime: number(line, &fields[14])?,
        file_count: number(line, &fields[15])?,
        dir_sum: number(line, &fields[16])?,
    })
}

fn number<T: FromStr>(line: usize, field: &[u8]) -> io::Result<T> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| s.parse().ok())
        .ok_or_else(|| invalid(format!("record {line}: bad number '{}'", String::from_utf8_lossy(field))))
}

fn octal(line: usize, field: &[u8]) -> io::Result<u32> {
    std::str::from_utf8(field)
        .ok()
        .and_then(|s| u32::from_str_radix(s, 8).ok())
        .ok_or_else(|| invalid(format!("record {line}: bad mode '{}'", String::from_utf8_lossy(field))))
}

fn invalid(message: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, message)
}

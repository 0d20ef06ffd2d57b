//! Byte sources and line-aligned range splitting.
//!
//! The ingestion engine never looks at a file directly: it asks a
//! [`RangeSource`] for the bytes of a range and for the position of the
//! next line terminator. Two sources exist:
//!
//! - [`SliceSource`] over bytes that are already in memory (a memory map
//!   or a buffered read of the whole file)
//! - [`FileSource`], which opens an independent read handle per request
//!   and never reads past the requested end
//!
//! Every range boundary produced here sits just after a `\n` (or at the
//! start of the data or the end of the file), so a record is never split
//! across two ranges and never processed twice.

use crate::tsv::{LoadError, Result};
use memchr::memchr;
use memmap2::Mmap;
use std::borrow::Cow;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Minimum file size to use mmap (smaller files use buffered I/O)
const MMAP_THRESHOLD: u64 = 64 * 1024;

/// Block size used when scanning a file for the next line terminator.
const SCAN_BLOCK: usize = 64 * 1024;

/// A half-open byte range `[start, end)` of the input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

impl ByteRange {
    /// Create a range from `start` to `end`.
    #[inline]
    pub fn new(start: u64, end: u64) -> Self {
        Self { start, end }
    }

    /// Length in bytes.
    #[inline]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// True when the range holds no bytes.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }
}

/// Random access to the bytes of one input file.
pub trait RangeSource: Sync {
    /// Total length in bytes.
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes of `[start, end)`. Both bounds must lie within the source.
    fn read_range(&self, start: u64, end: u64) -> io::Result<Cow<'_, [u8]>>;

    /// Position of the first `\n` in `[pos, limit)`, if any.
    fn find_newline(&self, pos: u64, limit: u64) -> io::Result<Option<u64>>;
}

/// Position just after the first `\n` at or after `pos`, or `limit` when
/// there is none before it.
pub fn line_end_after<S: RangeSource + ?Sized>(
    source: &S,
    pos: u64,
    limit: u64,
) -> io::Result<u64> {
    if pos >= limit {
        return Ok(limit);
    }
    Ok(source.find_newline(pos, limit)?.map_or(limit, |nl| nl + 1))
}

/// Move `pos` forward to the start of a line.
///
/// Returns `pos` unchanged when it already starts a line (it is zero or
/// follows a `\n`); otherwise skips the tail of the line it falls into.
pub fn align_to_line_start<S: RangeSource + ?Sized>(
    source: &S,
    pos: u64,
    limit: u64,
) -> io::Result<u64> {
    if pos == 0 {
        return Ok(0);
    }
    let pos = pos.min(limit);
    line_end_after(source, pos - 1, limit)
}

/// Split off the header line.
///
/// Returns the header text (without its terminator) and the offset where
/// data lines begin. A zero-length source is an [`LoadError::EmptyFile`].
pub fn read_header<S: RangeSource + ?Sized>(source: &S) -> Result<(String, u64)> {
    let len = source.len();
    if len == 0 {
        return Err(LoadError::EmptyFile);
    }

    let header_end = source.find_newline(0, len)?.unwrap_or(len);
    let data_start = (header_end + 1).min(len);
    let bytes = source.read_range(0, header_end)?;
    Ok((String::from_utf8_lossy(&bytes).into_owned(), data_start))
}

/// Cut `[data_start, len)` into consecutive chunks of roughly `chunk_size`
/// bytes.
///
/// Every chunk except the last ends just after the first `\n` at or after
/// `start + chunk_size`; the last chunk ends at the end of the source. The
/// chunks cover the data region exactly, without gaps or overlaps.
pub fn split_chunks<S: RangeSource + ?Sized>(
    source: &S,
    data_start: u64,
    chunk_size: u64,
) -> Result<Vec<ByteRange>> {
    if chunk_size == 0 {
        return Err(LoadError::InvalidConfig(
            "chunk size must be greater than zero".to_string(),
        ));
    }

    let len = source.len();
    let mut ranges = Vec::new();
    let mut start = data_start;

    while start < len {
        let target = start.saturating_add(chunk_size);
        let end = if target >= len {
            len
        } else {
            line_end_after(source, target, len)?
        };
        ranges.push(ByteRange::new(start, end));
        start = end;
    }

    Ok(ranges)
}

// ============================================================================
// IN-MEMORY SOURCE
// ============================================================================

/// Bytes that are fully addressable in memory.
#[derive(Debug, Clone, Copy)]
pub struct SliceSource<'a> {
    data: &'a [u8],
}

impl<'a> SliceSource<'a> {
    /// Wrap bytes already in memory.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data }
    }

    /// The wrapped bytes.
    pub fn as_bytes(&self) -> &'a [u8] {
        self.data
    }
}

impl RangeSource for SliceSource<'_> {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn read_range(&self, start: u64, end: u64) -> io::Result<Cow<'_, [u8]>> {
        let (start, end) = (start as usize, end as usize);
        self.data
            .get(start..end)
            .map(Cow::Borrowed)
            .ok_or_else(|| out_of_bounds(start as u64, end as u64, self.data.len() as u64))
    }

    fn find_newline(&self, pos: u64, limit: u64) -> io::Result<Option<u64>> {
        let limit = limit.min(self.len());
        if pos >= limit {
            return Ok(None);
        }
        let window = &self.data[pos as usize..limit as usize];
        Ok(memchr(b'\n', window).map(|off| pos + off as u64))
    }
}

/// A whole input file held in memory.
pub enum FileData {
    /// Memory-mapped file (zero-copy)
    Mapped(Mmap),
    /// Small file read into a buffer
    Buffered(Vec<u8>),
}

impl FileData {
    /// Map `path` into memory, or read it when it is small.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let mut file = File::open(path)?;
        let size = file.metadata()?.len();

        if size >= MMAP_THRESHOLD {
            // SAFETY: the map is read-only and lives only for one load; the
            // report file is not expected to be modified while it is parsed.
            let mmap = unsafe { Mmap::map(&file)? };
            Ok(FileData::Mapped(mmap))
        } else {
            let mut buffer = Vec::with_capacity(size as usize);
            file.read_to_end(&mut buffer)?;
            Ok(FileData::Buffered(buffer))
        }
    }

    /// True when the file is memory-mapped.
    pub fn is_mapped(&self) -> bool {
        matches!(self, FileData::Mapped(_))
    }
}

impl Deref for FileData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            FileData::Mapped(mmap) => &mmap[..],
            FileData::Buffered(buffer) => buffer.as_slice(),
        }
    }
}

// ============================================================================
// FILE-BACKED SOURCE
// ============================================================================

/// A file read range by range through independent handles.
///
/// Each call opens its own handle, so parallel tasks never contend for a
/// shared file position.
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    len: u64,
}

impl FileSource {
    /// Record the path and length of `path`; no handle is kept open.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();
        let len = File::open(&path)?.metadata()?.len();
        Ok(Self { path, len })
    }

    /// Path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn handle_at(&self, pos: u64) -> io::Result<File> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(pos))?;
        Ok(file)
    }
}

impl RangeSource for FileSource {
    fn len(&self) -> u64 {
        self.len
    }

    fn read_range(&self, start: u64, end: u64) -> io::Result<Cow<'_, [u8]>> {
        if start > end || end > self.len {
            return Err(out_of_bounds(start, end, self.len));
        }
        let mut buffer = vec![0u8; (end - start) as usize];
        if !buffer.is_empty() {
            self.handle_at(start)?.read_exact(&mut buffer)?;
        }
        Ok(Cow::Owned(buffer))
    }

    fn find_newline(&self, pos: u64, limit: u64) -> io::Result<Option<u64>> {
        let limit = limit.min(self.len);
        if pos >= limit {
            return Ok(None);
        }

        let mut file = self.handle_at(pos)?;
        let mut block = vec![0u8; SCAN_BLOCK];
        let mut offset = pos;

        while offset < limit {
            let want = SCAN_BLOCK.min((limit - offset) as usize);
            let read = file.read(&mut block[..want])?;
            if read == 0 {
                return Err(io::Error::new(
                    io::ErrorKind::UnexpectedEof,
                    format!("file shrank while reading {}", self.path.display()),
                ));
            }
            if let Some(idx) = memchr(b'\n', &block[..read]) {
                return Ok(Some(offset + idx as u64));
            }
            offset += read as u64;
        }

        Ok(None)
    }
}

fn out_of_bounds(start: u64, end: u64, len: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::InvalidInput,
        format!("byte range {}..{} outside source of {} bytes", start, end, len),
    )
}

//! Zero-copy, sequential replay over memory-mapped `.snap` files.

use std::fs::File;
use std::path::Path;

use memmap2::Mmap;

use super::{FileHeader, Record, SnapError};

const HEADER_SIZE: usize = std::mem::size_of::<FileHeader>();
const RECORD_SIZE: usize = std::mem::size_of::<Record>();

/// A sequential replay engine over a memory-mapped snapshot file.
///
/// The dataset is treated as a contiguous stream of fixed-size [`Record`]s;
/// no allocations and no record copies happen on the hot path, and the CPU
/// only loads the bytes that are actually accessed.
///
/// The kernel owns the mapping: references returned by [`next`](Self::next),
/// [`records`](Self::records), and [`get`](Self::get) borrow from it and
/// remain valid until the kernel is dropped. Intended usage is
/// single-threaded replay in simulators and benchmarks.
pub struct ReplayKernel {
    mmap: Mmap,
    header: FileHeader,
    len: usize,
    pos: usize,
}

impl ReplayKernel {
    /// Memory-maps a `.snap` file and validates its header:
    /// magic, version, depth, record size, endian check, positive scales,
    /// payload divisibility, and record-count consistency.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, SnapError> {
        let path = path.as_ref();
        let file = File::open(path)?;
        let file_len = file.metadata()?.len();
        if file_len < HEADER_SIZE as u64 {
            return Err(SnapError::TooSmall);
        }

        // SAFETY: the mapping is read-only and held for the kernel's
        // lifetime; callers must not truncate the file while it is mapped.
        let mmap = unsafe { Mmap::map(&file)? };

        // SAFETY: the mapping is page-aligned and at least HEADER_SIZE
        // bytes long; FileHeader is Pod.
        let header = unsafe { std::ptr::read(mmap.as_ptr() as *const FileHeader) };
        let len = header.validate(file_len - HEADER_SIZE as u64)? as usize;

        tracing::debug!(
            path = %path.display(),
            records = len,
            "mapped snapshot file"
        );

        Ok(Self {
            mmap,
            header,
            len,
            pos: 0,
        })
    }

    /// The validated file header.
    pub fn header(&self) -> &FileHeader {
        &self.header
    }

    /// Total number of records in the mapped file.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Current replay cursor position in `[0, len()]`; `len()` means
    /// exhausted.
    #[inline]
    pub fn pos(&self) -> usize {
        self.pos
    }

    /// Rewinds the replay cursor to the beginning. O(1).
    #[inline]
    pub fn reset(&mut self) {
        self.pos = 0;
    }

    /// Advances the cursor and returns the next record, or `None` at
    /// end-of-stream. One predictable branch; no copies.
    #[inline]
    pub fn next(&mut self) -> Option<&Record> {
        if self.pos >= self.len {
            return None;
        }
        let idx = self.pos;
        self.pos += 1;
        Some(&self.records()[idx])
    }

    /// The full record array as a zero-copy slice, enabling tight
    /// slice-based loops independent of the cursor.
    #[inline]
    pub fn records(&self) -> &[Record] {
        // SAFETY: the header was validated, so the payload is a whole
        // number of records; the payload starts HEADER_SIZE (a multiple of
        // Record's alignment) bytes into a page-aligned mapping.
        unsafe {
            std::slice::from_raw_parts(
                self.mmap.as_ptr().add(HEADER_SIZE) as *const Record,
                self.len,
            )
        }
    }

    /// Access a record by index without touching the cursor.
    #[inline]
    pub fn get(&self, idx: usize) -> Option<&Record> {
        self.records().get(idx)
    }
}

const _: () = assert!(HEADER_SIZE % std::mem::align_of::<Record>() == 0);
const _: () = assert!(RECORD_SIZE == 656);

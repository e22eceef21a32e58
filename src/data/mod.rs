//! The `.snap` on-disk format and its producers/consumers.
//!
//! # L2 snapshot binary format
//!
//! A `.snap` file is a [`FileHeader`] (40 bytes, little-endian) followed by
//! `N x` [`Record`] (656 bytes each):
//!
//! ```text
//! [FileHeader][Record][Record]...[Record]
//! ```
//!
//! Key properties:
//!
//! * fixed-size records for O(1) random access and zero-copy mmap
//!   consumption;
//! * deterministic numeric representation (fixed-point integers, no
//!   floats);
//! * trivially copyable layouts, safe to write and read as raw bytes;
//! * explicit versioning and a self-describing header.
//!
//! Missing levels carry sentinel values: `(0, 0)` for bids and
//! `(i64::MAX, 0)` for asks, so that both ladders iterate monotonically
//! with sentinels trailing.
//!
//! The header is written provisionally with `record_count = 0` and
//! finalised at close by seeking back to the start of the file. Readers
//! accept `record_count == 0` as "unknown" and infer the count from the
//! file size.

use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use thiserror::Error;

mod convert;
mod replay;

pub use convert::{convert, ConvertSummary};
pub use replay::ReplayKernel;

/// `"L2BO"` in little-endian.
pub const MAGIC: u32 = 0x4C32_424F;
pub const VERSION: u16 = 1;
/// Number of price levels per side in a record.
pub const DEPTH: usize = 20;
/// On a little-endian system this reads back as `04 03 02 01` in memory.
pub const ENDIAN_CHECK: u32 = 0x0102_0304;

/// Stored integer -> real value: `real = stored / scale`.
pub const PRICE_SCALE: i64 = 100_000_000;
pub const QTY_SCALE: i64 = 100_000_000;

/// Sentinel price for an inactive bid level.
pub const BID_NULL_PRICE_Q: i64 = 0;
/// Sentinel price for an inactive ask level; sorts "far away".
pub const ASK_NULL_PRICE_Q: i64 = i64::MAX;
pub const NULL_QTY_Q: i64 = 0;

/// Marker trait for C-representation plain old data.
///
/// # Safety
/// Implement only for `#[repr(C)]` types containing no padding-sensitive or
/// non-POD fields; implementors are read and written as raw bytes.
pub unsafe trait Pod: Sized + Copy {}

/// Structured errors raised while mapping, reading, or producing `.snap`
/// files. The engine refuses to construct in their presence.
#[derive(Error, Debug)]
pub enum SnapError {
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
    #[error("file too small to contain a snapshot header")]
    TooSmall,
    #[error("bad magic {found:#010x}: not a .snap file")]
    BadMagic { found: u32 },
    #[error("unsupported version {found} (expected {VERSION})")]
    UnsupportedVersion { found: u16 },
    #[error("depth mismatch: file has {found}, expected {DEPTH}")]
    DepthMismatch { found: u16 },
    #[error("record size mismatch: file has {found}, expected {expected}")]
    RecordSizeMismatch { found: u32, expected: u32 },
    #[error("endian check mismatch: file written on an incompatible platform")]
    EndianMismatch,
    #[error("invalid scales in header: price_scale={price_scale}, qty_scale={qty_scale}")]
    InvalidScales { price_scale: i64, qty_scale: i64 },
    #[error("payload of {payload} bytes is not a whole number of records")]
    TruncatedPayload { payload: u64 },
    #[error("record_count mismatch: header says {header}, file size implies {inferred}")]
    RecordCountMismatch { header: u64, inferred: u64 },
    #[error("input appears empty (no CSV header): {path}")]
    EmptyInput { path: String },
    #[error("missing required column: {0}")]
    MissingColumn(String),
    #[error(
        "output size mismatch: wrote {written} records but file size implies {inferred}"
    )]
    OutputSizeMismatch { written: u64, inferred: u64 },
}

/// File header, written once at the beginning of a `.snap` file.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FileHeader {
    pub magic: u32,
    pub version: u16,
    pub depth: u16,
    pub record_size: u32,
    pub endian_check: u32,
    pub price_scale: i64,
    pub qty_scale: i64,
    /// `0` means "unknown; infer from file size".
    pub record_count: u64,
}

unsafe impl Pod for FileHeader {}

impl FileHeader {
    /// A header describing the current format with the given record count.
    pub fn new(record_count: u64) -> Self {
        Self {
            magic: MAGIC,
            version: VERSION,
            depth: DEPTH as u16,
            record_size: std::mem::size_of::<Record>() as u32,
            endian_check: ENDIAN_CHECK,
            price_scale: PRICE_SCALE,
            qty_scale: QTY_SCALE,
            record_count,
        }
    }

    /// Validates every self-description field against the compiled-in
    /// format. `payload` is the byte length of the file past the header.
    pub fn validate(&self, payload: u64) -> Result<u64, SnapError> {
        if self.magic != MAGIC {
            return Err(SnapError::BadMagic { found: self.magic });
        }
        if self.version != VERSION {
            return Err(SnapError::UnsupportedVersion {
                found: self.version,
            });
        }
        if self.depth != DEPTH as u16 {
            return Err(SnapError::DepthMismatch { found: self.depth });
        }
        let record_size = std::mem::size_of::<Record>() as u32;
        if self.record_size != record_size {
            return Err(SnapError::RecordSizeMismatch {
                found: self.record_size,
                expected: record_size,
            });
        }
        if self.endian_check != ENDIAN_CHECK {
            return Err(SnapError::EndianMismatch);
        }
        if self.price_scale <= 0 || self.qty_scale <= 0 {
            return Err(SnapError::InvalidScales {
                price_scale: self.price_scale,
                qty_scale: self.qty_scale,
            });
        }
        if payload % record_size as u64 != 0 {
            return Err(SnapError::TruncatedPayload { payload });
        }
        let inferred = payload / record_size as u64;
        if self.record_count != 0 && self.record_count != inferred {
            return Err(SnapError::RecordCountMismatch {
                header: self.record_count,
                inferred,
            });
        }
        Ok(inferred)
    }
}

/// One price level: fixed-point price and aggregate displayed quantity.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Level {
    pub price_q: i64,
    pub qty_q: i64,
}

unsafe impl Pod for Level {}

impl Level {
    #[inline]
    pub const fn bid_null() -> Self {
        Self {
            price_q: BID_NULL_PRICE_Q,
            qty_q: NULL_QTY_Q,
        }
    }

    #[inline]
    pub const fn ask_null() -> Self {
        Self {
            price_q: ASK_NULL_PRICE_Q,
            qty_q: NULL_QTY_Q,
        }
    }
}

/// One top-N snapshot.
///
/// * `ts_event_ms` — exchange event timestamp in milliseconds; `0` when the
///   feed did not provide one.
/// * `ts_recv_ns` — local receive timestamp in nanoseconds; the
///   authoritative simulator clock.
/// * `bids` — best bid at index 0 (highest price); non-increasing prices.
/// * `asks` — best ask at index 0 (lowest price); non-decreasing prices.
///
/// Missing levels use the sentinel constants.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Record {
    pub ts_event_ms: i64,
    pub ts_recv_ns: i64,
    pub bids: [Level; DEPTH],
    pub asks: [Level; DEPTH],
}

unsafe impl Pod for Record {}

impl Record {
    /// A record with every level set to its sentinel.
    pub fn new(ts_event_ms: i64, ts_recv_ns: i64) -> Self {
        Self {
            ts_event_ms,
            ts_recv_ns,
            bids: [Level::bid_null(); DEPTH],
            asks: [Level::ask_null(); DEPTH],
        }
    }

    #[inline]
    pub fn best_bid_price_q(&self) -> i64 {
        self.bids[0].price_q
    }

    #[inline]
    pub fn best_ask_price_q(&self) -> i64 {
        self.asks[0].price_q
    }

    /// Both sides have an active best level.
    #[inline]
    pub fn has_top_of_book(&self) -> bool {
        is_bid_active(&self.bids[0]) && is_ask_active(&self.asks[0])
    }
}

/// A bid level is active iff it has positive qty and a positive price.
#[inline]
pub fn is_bid_active(l: &Level) -> bool {
    l.qty_q > 0 && l.price_q > 0
}

/// An ask level is active iff it has positive qty and is not the sentinel.
#[inline]
pub fn is_ask_active(l: &Level) -> bool {
    l.qty_q > 0 && l.price_q != ASK_NULL_PRICE_Q
}

// Layout invariants: catch accidental reordering or padding changes at
// compile time.
const _: () = {
    assert!(std::mem::size_of::<Level>() == 16);
    assert!(std::mem::size_of::<FileHeader>() == 40);
    assert!(std::mem::size_of::<Record>() == 656);
    assert!(std::mem::align_of::<Record>() == 8);
    assert!(std::mem::offset_of!(Record, ts_event_ms) == 0);
    assert!(std::mem::offset_of!(Record, ts_recv_ns) == 8);
    assert!(std::mem::offset_of!(Record, bids) == 16);
    assert!(std::mem::offset_of!(Record, asks) == 16 + DEPTH * 16);
};

#[inline]
pub(crate) fn bytes_of<T: Pod>(v: &T) -> &[u8] {
    // SAFETY: T is Pod, so every byte of its representation is initialised
    // and may be viewed as a byte slice of its exact size.
    unsafe { std::slice::from_raw_parts(v as *const T as *const u8, std::mem::size_of::<T>()) }
}

/// Streams records into a `.snap` file: placeholder header first, then
/// records, then a two-phase finalise that seeks back and rewrites the
/// header with the final count.
pub struct SnapWriter<W: Write + Seek> {
    out: W,
    count: u64,
}

impl<W: Write + Seek> SnapWriter<W> {
    /// Writes the provisional header and returns the writer.
    pub fn new(mut out: W) -> Result<Self, SnapError> {
        out.write_all(bytes_of(&FileHeader::new(0)))?;
        Ok(Self { out, count: 0 })
    }

    /// Appends one record.
    pub fn push(&mut self, rec: &Record) -> Result<(), SnapError> {
        self.out.write_all(bytes_of(rec))?;
        self.count += 1;
        Ok(())
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    /// Flushes, rewrites the header with the final record count, and
    /// returns that count.
    pub fn finish(mut self) -> Result<u64, SnapError> {
        self.out.flush()?;
        self.out.seek(SeekFrom::Start(0))?;
        self.out.write_all(bytes_of(&FileHeader::new(self.count)))?;
        self.out.flush()?;
        Ok(self.count)
    }
}

/// Writes a complete `.snap` file from in-memory records.
pub fn write_snap_file<P: AsRef<Path>>(path: P, records: &[Record]) -> Result<u64, SnapError> {
    let file = std::fs::File::create(path)?;
    let mut writer = SnapWriter::new(std::io::BufWriter::new(file))?;
    for rec in records {
        writer.push(rec)?;
    }
    writer.finish()
}

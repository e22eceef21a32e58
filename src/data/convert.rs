//! Streaming `.csv.gz` -> `.snap` conversion.
//!
//! Properties:
//!
//! * streams gzip input without materialising it;
//! * header-driven column mapping (no positional assumptions);
//! * deterministic fixed-point conversion with overflow/NaN checks;
//! * missing or unparseable level cells fall back to schema sentinels;
//! * crash-safe output: writes `<output>.part`, finalises the header record
//!   count, verifies the payload size, then atomically renames, so a
//!   partially written `.snap` is never visible.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter};
use std::path::Path;

use flate2::read::GzDecoder;

use super::{
    Level, Record, SnapError, SnapWriter, DEPTH, PRICE_SCALE, QTY_SCALE,
};

const LOG_EVERY: u64 = 1_000_000;

/// Outcome of a conversion run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConvertSummary {
    pub records_written: u64,
    /// Rows dropped for a missing/unparseable `ts_recv_ns` or too few
    /// fields. Individual bad level cells do not drop a row; they become
    /// sentinels.
    pub bad_rows: u64,
}

#[derive(Debug)]
struct ColumnMap {
    ts_event_ms: Option<usize>,
    ts_recv_ns: usize,
    bid_p: [usize; DEPTH],
    bid_q: [usize; DEPTH],
    ask_p: [usize; DEPTH],
    ask_q: [usize; DEPTH],
}

fn find_col(header: &[&str], name: &str) -> Option<usize> {
    header.iter().position(|h| *h == name)
}

impl ColumnMap {
    fn build(header: &[&str]) -> Result<Self, SnapError> {
        let ts_recv_ns = find_col(header, "ts_recv_ns")
            .ok_or_else(|| SnapError::MissingColumn("ts_recv_ns".to_string()))?;

        let mut map = Self {
            ts_event_ms: find_col(header, "ts_event_ms"),
            ts_recv_ns,
            bid_p: [0; DEPTH],
            bid_q: [0; DEPTH],
            ask_p: [0; DEPTH],
            ask_q: [0; DEPTH],
        };

        for i in 0..DEPTH {
            let lvl = i + 1;
            for (slot, name) in [
                (&mut map.bid_p[i], format!("bid_p{lvl}")),
                (&mut map.bid_q[i], format!("bid_q{lvl}")),
                (&mut map.ask_p[i], format!("ask_p{lvl}")),
                (&mut map.ask_q[i], format!("ask_q{lvl}")),
            ] {
                *slot = find_col(header, &name).ok_or(SnapError::MissingColumn(name))?;
            }
        }
        Ok(map)
    }
}

fn parse_i64(s: &str) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    s.parse().ok()
}

/// Parses a decimal cell into fixed-point, rejecting empty cells, NaN/inf,
/// and values whose scaled magnitude leaves the i64 range. Rounds to
/// nearest.
fn parse_fixed(s: &str, scale: i64) -> Option<i64> {
    if s.is_empty() {
        return None;
    }
    let v: f64 = s.parse().ok()?;
    if !v.is_finite() {
        return None;
    }
    let scaled = v * scale as f64;
    if !scaled.is_finite() || !(i64::MIN as f64..=i64::MAX as f64).contains(&scaled) {
        return None;
    }
    Some(scaled.round() as i64)
}

/// Parses one CSV row into a sentinel-initialised record. Returns `false`
/// when the row must be dropped (no parseable `ts_recv_ns`).
fn parse_row(fields: &[&str], cm: &ColumnMap, rec: &mut Record) -> bool {
    *rec = Record::new(0, 0);

    if let Some(col) = cm.ts_event_ms {
        if let Some(t) = fields.get(col).and_then(|s| parse_i64(s)) {
            rec.ts_event_ms = t;
        }
    }

    match fields.get(cm.ts_recv_ns).and_then(|s| parse_i64(s)) {
        Some(t) => rec.ts_recv_ns = t,
        None => return false,
    }

    for i in 0..DEPTH {
        if let (Some(px), Some(qy)) = (
            fields.get(cm.bid_p[i]).and_then(|s| parse_fixed(s, PRICE_SCALE)),
            fields.get(cm.bid_q[i]).and_then(|s| parse_fixed(s, QTY_SCALE)),
        ) {
            if px > 0 && qy > 0 {
                rec.bids[i] = Level { price_q: px, qty_q: qy };
            }
        }

        if let (Some(px), Some(qy)) = (
            fields.get(cm.ask_p[i]).and_then(|s| parse_fixed(s, PRICE_SCALE)),
            fields.get(cm.ask_q[i]).and_then(|s| parse_fixed(s, QTY_SCALE)),
        ) {
            if px > 0 && qy > 0 {
                rec.asks[i] = Level { price_q: px, qty_q: qy };
            }
        }
    }

    true
}

/// Converts a gzipped CSV of top-N snapshots into a `.snap` file.
///
/// The input must carry a header row naming `ts_recv_ns` (required),
/// `ts_event_ms` (optional), and `bid_p{i}`/`bid_q{i}`/`ask_p{i}`/`ask_q{i}`
/// for every level `i` in `[1, 20]`.
pub fn convert<P: AsRef<Path>, Q: AsRef<Path>>(
    input: P,
    output: Q,
) -> Result<ConvertSummary, SnapError> {
    let input = input.as_ref();
    let output = output.as_ref();
    let tmp = output.with_extension(match output.extension() {
        Some(ext) => format!("{}.part", ext.to_string_lossy()),
        None => "part".to_string(),
    });

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let mut lines = BufReader::new(GzDecoder::new(File::open(input)?)).lines();
    let header_line = match lines.next() {
        Some(line) => line?,
        None => {
            return Err(SnapError::EmptyInput {
                path: input.display().to_string(),
            })
        }
    };
    let header: Vec<&str> = header_line.trim_end_matches('\r').split(',').collect();
    let cm = ColumnMap::build(&header)?;

    let mut writer = SnapWriter::new(BufWriter::new(File::create(&tmp)?))?;
    let mut summary = ConvertSummary::default();
    let mut rec = Record::new(0, 0);

    for line in lines {
        let line = line?;
        let line = line.trim_end_matches('\r');

        let fields: Vec<&str> = line.split(',').collect();
        if fields.len() < 2 {
            summary.bad_rows += 1;
            continue;
        }

        if !parse_row(&fields, &cm, &mut rec) {
            summary.bad_rows += 1;
            continue;
        }

        writer.push(&rec)?;
        summary.records_written += 1;
        if summary.records_written % LOG_EVERY == 0 {
            tracing::info!(
                records_written = summary.records_written,
                bad_rows = summary.bad_rows,
                "conversion progress"
            );
        }
    }

    let count = writer.finish()?;

    // Integrity check: file size must match the finalised header count.
    let file_sz = std::fs::metadata(&tmp)?.len();
    let payload = file_sz - std::mem::size_of::<super::FileHeader>() as u64;
    let record_size = std::mem::size_of::<Record>() as u64;
    if payload % record_size != 0 || payload / record_size != count {
        return Err(SnapError::OutputSizeMismatch {
            written: count,
            inferred: payload / record_size,
        });
    }

    // Rename over an existing output can fail on some platforms; remove it
    // first.
    let _ = std::fs::remove_file(output);
    std::fs::rename(&tmp, output)?;

    tracing::info!(
        records_written = summary.records_written,
        bad_rows = summary.bad_rows,
        output = %output.display(),
        "conversion complete"
    );
    Ok(summary)
}

//! Record normalizer
//!
//! Turns the text of a delimited file with a header row into validated
//! `NormalizedRecord`s. Parsing is pure: running it twice over the same text
//! yields the same records (apart from defaulted timestamps when no fixed
//! instant is supplied).

use chrono::{DateTime, Utc};
use std::path::Path;
use taxcat_common::time::{parse_timestamp, to_wire};
use taxcat_common::NormalizedRecord;
use thiserror::Error;
use tracing::{debug, info};

/// Header names recognized by the normalizer, in canonical order
pub const REQUIRED_HEADERS: [&str; 4] = ["latitude", "longitude", "subtotal", "timestamp"];

/// Delimiters considered when sniffing the header row; first wins on a tie
const DELIMITER_CANDIDATES: [u8; 4] = [b',', b';', b'\t', b'|'];

/// Normalizer errors
#[derive(Debug, Error)]
pub enum NormalizeError {
    /// The file structure itself is malformed
    #[error("Malformed file at line {line}: {message}")]
    Parse { line: u64, message: String },

    /// No row survived validation
    #[error("No valid rows found; expected header columns: {}", .required.join(", "))]
    EmptyOrInvalidFile { required: Vec<&'static str> },

    /// The file could not be read
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl NormalizeError {
    fn empty() -> Self {
        NormalizeError::EmptyOrInvalidFile {
            required: REQUIRED_HEADERS.to_vec(),
        }
    }
}

/// Output of a successful normalization
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized {
    /// Surviving rows, in file order
    pub records: Vec<NormalizedRecord>,
    /// Data rows dropped for latitude == 0 or a non-finite subtotal
    pub dropped: usize,
    /// Delimiter the file was read with
    pub delimiter: u8,
}

/// Column index of each recognized header
#[derive(Debug, Default, Clone, Copy)]
struct ColumnMap {
    latitude: Option<usize>,
    longitude: Option<usize>,
    subtotal: Option<usize>,
    timestamp: Option<usize>,
}

impl ColumnMap {
    /// Exact, case- and trim-insensitive match; anything else is absent
    fn resolve(headers: &csv::StringRecord) -> Self {
        let mut map = ColumnMap::default();
        for (idx, raw) in headers.iter().enumerate() {
            let name = raw.trim().trim_start_matches('\u{feff}').trim().to_lowercase();
            let slot = match name.as_str() {
                "latitude" => &mut map.latitude,
                "longitude" => &mut map.longitude,
                "subtotal" => &mut map.subtotal,
                "timestamp" => &mut map.timestamp,
                _ => continue,
            };
            // first occurrence of a duplicated header wins
            if slot.is_none() {
                *slot = Some(idx);
            }
        }
        map
    }
}

/// Normalize file text, defaulting missing timestamps to the current instant
pub fn normalize(text: &str) -> Result<Vec<NormalizedRecord>, NormalizeError> {
    normalize_at(text, Utc::now()).map(|n| n.records)
}

/// Normalize file text with a fixed instant for defaulted timestamps
pub fn normalize_at(text: &str, now: DateTime<Utc>) -> Result<Normalized, NormalizeError> {
    let delimiter = sniff_delimiter(text);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(parse_error)?.clone();
    let columns = ColumnMap::resolve(&headers);
    let delimiter_char = delimiter as char;
    debug!(?columns, delimiter = ?delimiter_char, "Resolved header columns");

    let default_timestamp = to_wire(&now);
    let mut records = Vec::new();
    let mut dropped = 0usize;

    for row in reader.records() {
        let row = row.map_err(parse_error)?;

        let latitude = coordinate(&row, columns.latitude);
        let subtotal = number(&row, columns.subtotal);

        // latitude == 0 doubles as the "missing" marker
        if latitude == 0.0 || !subtotal.is_finite() {
            dropped += 1;
            continue;
        }

        let timestamp = cell(&row, columns.timestamp)
            .and_then(parse_timestamp)
            .map(|dt| to_wire(&dt))
            .unwrap_or_else(|| default_timestamp.clone());

        records.push(NormalizedRecord {
            latitude,
            longitude: coordinate(&row, columns.longitude),
            subtotal,
            timestamp,
        });
    }

    if records.is_empty() {
        return Err(NormalizeError::empty());
    }

    info!(kept = records.len(), dropped, "Normalized delimited file");

    Ok(Normalized {
        records,
        dropped,
        delimiter,
    })
}

/// Read and normalize a file from disk
pub async fn normalize_file(path: &Path) -> Result<Normalized, NormalizeError> {
    let bytes = tokio::fs::read(path).await?;
    let text = String::from_utf8(bytes).map_err(|e| NormalizeError::Parse {
        line: 0,
        message: format!("file is not valid UTF-8: {}", e),
    })?;
    normalize_at(&text, Utc::now())
}

fn parse_error(e: csv::Error) -> NormalizeError {
    let line = e.position().map(|p| p.line()).unwrap_or(0);
    NormalizeError::Parse {
        line,
        message: e.to_string(),
    }
}

fn cell<'r>(row: &'r csv::StringRecord, idx: Option<usize>) -> Option<&'r str> {
    idx.and_then(|i| row.get(i)).filter(|v| !v.is_empty())
}

/// Parsed float; absent or unparsable cells become 0
fn number(row: &csv::StringRecord, idx: Option<usize>) -> f64 {
    cell(row, idx)
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(0.0)
}

/// Like `number`, but non-finite coordinates are treated as unparsable
fn coordinate(row: &csv::StringRecord, idx: Option<usize>) -> f64 {
    let value = number(row, idx);
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

/// Pick the candidate delimiter occurring most often on the header line
fn sniff_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    let mut best = (b',', 0usize);
    for candidate in DELIMITER_CANDIDATES {
        let count = header.bytes().filter(|b| *b == candidate).count();
        if count > best.1 {
            best = (candidate, count);
        }
    }
    best.0
}

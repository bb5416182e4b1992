//! CSV reading with header-based delimiter sniffing.
//!
//! Exports come out of spreadsheet tools with all kinds of delimiters, so
//! when no override is given we count a fixed candidate set in the header
//! line and pick the most frequent. Parsing itself is deliberately lenient:
//! flexible record lengths and whitespace trimming, since "a row is a
//! mapping from column name to string" is all the pipeline needs.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ReaderBuilder, Trim};
use tracing::info;

use crate::domain::{Row, WorkUnit};
use crate::error::InputError;

/// Delimiters considered during auto-detection, in tie-break order.
pub const DELIMITER_CANDIDATES: [char; 5] = [',', ';', '\t', '|', ':'];

/// Pick the most frequent candidate in the header line. Ties go to the
/// earlier candidate; a header with no candidate at all yields a comma.
pub fn detect_delimiter(header_line: &str) -> char {
    let mut best = ',';
    let mut best_count = -1i64;
    for candidate in DELIMITER_CANDIDATES {
        let count = header_line.matches(candidate).count() as i64;
        if count > best_count {
            best = candidate;
            best_count = count;
        }
    }
    best
}

/// Sniff the delimiter from the first line of the file (BOM-stripped).
fn detect_delimiter_from_file(path: &Path) -> Result<char, InputError> {
    let mut file = File::open(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut buf = vec![0u8; 64 * 1024];
    let n = file.read(&mut buf).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    buf.truncate(n);

    let chunk = String::from_utf8_lossy(&buf);
    let chunk = chunk.strip_prefix('\u{feff}').unwrap_or(&chunk);
    let first_line = chunk.lines().next().unwrap_or("");
    Ok(detect_delimiter(first_line))
}

/// Read all rows as column-name → string mappings.
///
/// The delimiter is decided once (override or sniffed) and then stuck to
/// for the whole file.
pub fn read_rows(
    path: &Path,
    delimiter_override: Option<char>,
) -> Result<Vec<HashMap<String, String>>, InputError> {
    let delimiter = match delimiter_override {
        Some(d) => d,
        None => detect_delimiter_from_file(path)?,
    };
    info!(delimiter = ?delimiter, "CSV: using delimiter");

    let file = File::open(path).map_err(|source| InputError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    let mut reader = ReaderBuilder::new()
        .delimiter(delimiter as u8)
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(file);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|source| InputError::Parse { delimiter, source })?
        .iter()
        .map(|h| h.trim_start_matches('\u{feff}').to_string())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|source| InputError::Parse { delimiter, source })?;
        if record.iter().all(|f| f.is_empty()) {
            continue;
        }
        let mut row = HashMap::new();
        for (i, header) in headers.iter().enumerate() {
            row.insert(
                header.clone(),
                record.get(i).unwrap_or_default().to_string(),
            );
        }
        rows.push(row);
    }

    Ok(rows)
}

/// Validate required columns and build the work list, 1-based indices.
pub fn rows_to_work(
    rows: &[HashMap<String, String>],
    col_front: &str,
    col_back: &str,
) -> Result<Vec<WorkUnit>, InputError> {
    if rows.is_empty() {
        return Err(InputError::Empty);
    }

    let mut missing = Vec::new();
    for col in [col_front, col_back] {
        if !rows[0].contains_key(col) {
            missing.push(format!("\"{col}\""));
        }
    }
    if !missing.is_empty() {
        return Err(InputError::MissingColumns(missing.join(", ")));
    }

    Ok(rows
        .iter()
        .enumerate()
        .map(|(i, r)| {
            WorkUnit::new(Row {
                index: i + 1,
                front: r.get(col_front).cloned().unwrap_or_default(),
                back: r.get(col_back).cloned().unwrap_or_default(),
            })
        })
        .collect())
}

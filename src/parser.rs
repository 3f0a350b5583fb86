//! Bounded CSV ingestion.
//!
//! The header row names the columns; every following record becomes one
//! [`Fields`] map keyed by those names. Records are pulled from the reader one
//! at a time, so hitting the row cap or the byte cap stops consumption of the
//! input there.

use std::{
    collections::HashSet,
    fs,
    io::{self, Read},
    path::Path,
};

use csv::ByteRecord;
use encoding_rs::{Encoding, UTF_8};
use log::{debug, info};

use crate::{
    data::{Fields, Value},
    error::ParseError,
    io_utils::{self, DEFAULT_CSV_DELIMITER},
    schema::{DEFAULT_MAX_FILE_SIZE, DEFAULT_MAX_ROWS, Limits},
};

#[derive(Debug, Clone, Copy)]
pub struct ParseOptions {
    /// Maximum number of data rows; one more fails the parse.
    pub limit: usize,
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    pub keep_empty_columns: bool,
    /// Maximum input size in bytes, `None` for unbounded.
    pub max_file_size: Option<u64>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            limit: DEFAULT_MAX_ROWS,
            delimiter: DEFAULT_CSV_DELIMITER,
            encoding: UTF_8,
            keep_empty_columns: false,
            max_file_size: Some(DEFAULT_MAX_FILE_SIZE),
        }
    }
}

impl ParseOptions {
    pub fn from_limits(limits: &Limits) -> Self {
        Self {
            limit: limits.max_rows,
            max_file_size: Some(limits.max_file_size),
            ..Self::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn with_encoding(mut self, encoding: &'static Encoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn keep_empty_columns(mut self, keep: bool) -> Self {
        self.keep_empty_columns = keep;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedTable {
    pub columns: Vec<String>,
    pub rows: Vec<Fields>,
}

impl ParsedTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

pub fn parse_path(path: &Path, options: &ParseOptions) -> Result<ParsedTable, ParseError> {
    if !io_utils::is_dash(path)
        && let Some(limit) = options.max_file_size
    {
        let size = fs::metadata(path)
            .map_err(|err| ParseError::malformed(format!("Reading {path:?}: {err}")))?
            .len();
        if size > limit {
            return Err(ParseError::InputTooLarge { size, limit });
        }
    }
    let reader = io_utils::open_input(path).map_err(|err| ParseError::malformed(format!("{err:#}")))?;
    parse(reader, options)
}

pub fn parse<R: Read>(reader: R, options: &ParseOptions) -> Result<ParsedTable, ParseError> {
    let bound = options.max_file_size.map_or(u64::MAX, |limit| limit.saturating_add(1));
    let source = TrackedReader::new(reader.take(bound), options.delimiter);
    let mut csv_reader = io_utils::open_csv_reader(source, options.delimiter);

    let headers = csv_reader.byte_headers().map(|record| record.clone());
    check_size(csv_reader.get_ref(), options)?;
    let raw_headers = headers?;
    if raw_headers.is_empty() {
        return Err(ParseError::malformed("input has no header row"));
    }
    let columns = normalize_headers(io_utils::decode_record(&raw_headers, options.encoding)?);

    let mut rows = Vec::new();
    let mut record = ByteRecord::new();
    loop {
        let more = csv_reader.read_byte_record(&mut record);
        check_size(csv_reader.get_ref(), options)?;
        if !more? {
            break;
        }
        if rows.len() == options.limit {
            return Err(ParseError::RowLimitExceeded {
                limit: options.limit,
            });
        }
        let cells = io_utils::decode_record(&record, options.encoding)?;
        let row = columns
            .iter()
            .enumerate()
            .map(|(position, column)| {
                let value = cells
                    .get(position)
                    .map(|cell| Value::from_cell(cell))
                    .unwrap_or_default();
                (column.clone(), value)
            })
            .collect::<Fields>();
        rows.push(row);
    }
    if csv_reader.get_ref().in_open_quote() {
        return Err(ParseError::malformed("unterminated quoted field at end of input"));
    }

    let mut table = ParsedTable { columns, rows };
    if !options.keep_empty_columns {
        prune_empty_columns(&mut table);
    }
    info!(
        "Parsed {} row(s) across {} column(s)",
        table.rows.len(),
        table.columns.len()
    );
    Ok(table)
}

fn check_size<R>(source: &TrackedReader<R>, options: &ParseOptions) -> Result<(), ParseError> {
    match options.max_file_size {
        Some(limit) if source.consumed > limit => Err(ParseError::InputTooLarge {
            size: source.consumed,
            limit,
        }),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QuoteState {
    FieldStart,
    Unquoted,
    Quoted,
    QuoteInQuoted,
}

/// Counts the bytes handed to the CSV reader and follows its quoting rules
/// closely enough to tell whether the input ended inside a quoted field.
struct TrackedReader<R> {
    inner: R,
    delimiter: u8,
    consumed: u64,
    state: QuoteState,
}

impl<R> TrackedReader<R> {
    fn new(inner: R, delimiter: u8) -> Self {
        Self {
            inner,
            delimiter,
            consumed: 0,
            state: QuoteState::FieldStart,
        }
    }

    fn in_open_quote(&self) -> bool {
        self.state == QuoteState::Quoted
    }

    fn track(&mut self, byte: u8) {
        let ends_field = byte == self.delimiter || byte == b'\n' || byte == b'\r';
        self.state = match (self.state, byte) {
            (QuoteState::Quoted, b'"') => QuoteState::QuoteInQuoted,
            (QuoteState::Quoted, _) => QuoteState::Quoted,
            (QuoteState::FieldStart, b'"') | (QuoteState::QuoteInQuoted, b'"') => {
                QuoteState::Quoted
            }
            _ if ends_field => QuoteState::FieldStart,
            _ => QuoteState::Unquoted,
        };
    }
}

impl<R: Read> Read for TrackedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = self.inner.read(buf)?;
        self.consumed += read as u64;
        for &byte in &buf[..read] {
            self.track(byte);
        }
        Ok(read)
    }
}

/// Trims header cells, names blank ones `Field {n}` (1-based) and suffixes
/// repeated names with `_{n}`.
pub fn normalize_headers(raw: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    raw.into_iter()
        .enumerate()
        .map(|(position, header)| {
            let trimmed = header.trim();
            let base = if trimmed.is_empty() {
                format!("Field {}", position + 1)
            } else {
                trimmed.to_string()
            };
            let mut name = base.clone();
            let mut suffix = 1;
            while !seen.insert(name.clone()) {
                name = format!("{base}_{suffix}");
                suffix += 1;
            }
            name
        })
        .collect()
}

fn prune_empty_columns(table: &mut ParsedTable) {
    let (kept, dropped): (Vec<String>, Vec<String>) =
        table.columns.drain(..).partition(|column| {
            table
                .rows
                .iter()
                .any(|row| row.get(column).is_some_and(|value| !value.is_absent()))
        });
    if dropped.is_empty() {
        table.columns = kept;
        return;
    }
    debug!("Dropping empty column(s): {}", dropped.join(", "));
    for row in &mut table.rows {
        for column in &dropped {
            row.remove(column);
        }
    }
    table.columns = kept;
}

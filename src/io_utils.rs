//! I/O helpers shared by the parser, the template exporter and the CLI.
//!
//! - **Delimiter resolution**: `.tsv` → tab, anything else → comma, unless the
//!   caller overrides it.
//! - **Encoding**: input bytes are decoded per field through `encoding_rs`,
//!   defaulting to UTF-8.
//! - **stdin/stdout**: the `-` path convention routes through standard streams.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8};

use crate::error::ParseError;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn resolve_output_delimiter(path: Option<&Path>, provided: Option<u8>) -> u8 {
    match (provided, path) {
        (Some(delimiter), _) => delimiter,
        (None, Some(path)) => resolve_input_delimiter(path, None),
        (None, None) => DEFAULT_CSV_DELIMITER,
    }
}

/// Rows may be shorter or longer than the header; the parser pads and
/// truncates them itself.
pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_input(path: &Path) -> Result<Box<dyn Read>> {
    if is_dash(path) {
        Ok(Box::new(io::stdin().lock()))
    } else {
        Ok(Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        )))
    }
}

pub fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    match path {
        Some(p) if !is_dash(p) => Ok(Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        ))),
        _ => Ok(Box::new(io::stdout())),
    }
}

/// CSV writer quoting only the cells that need it.
pub fn open_csv_writer<W>(writer: W, delimiter: u8) -> csv::Writer<W>
where
    W: Write,
{
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    builder.from_writer(writer)
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String, ParseError> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(ParseError::malformed(format!(
            "Failed to decode text with encoding {}",
            encoding.name()
        )))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(
    record: &csv::ByteRecord,
    encoding: &'static Encoding,
) -> Result<Vec<String>, ParseError> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tsv_extension_selects_tab() {
        assert_eq!(resolve_input_delimiter(Path::new("a.TSV"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), Some(b';')), b';');
        assert_eq!(resolve_output_delimiter(None, None), b',');
    }

    #[test]
    fn unknown_encoding_label_is_rejected() {
        assert!(resolve_encoding(Some("not-a-charset")).is_err());
        assert_eq!(resolve_encoding(Some("latin1")).unwrap().name(), "windows-1252");
    }

    #[test]
    fn decode_reports_invalid_utf8() {
        let err = decode_bytes(&[0x66, 0xff], UTF_8).unwrap_err();
        assert!(matches!(err, ParseError::MalformedInput { .. }));
    }
}

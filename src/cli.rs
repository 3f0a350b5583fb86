use std::{path::PathBuf, str::FromStr};

use clap::{Args, Parser, Subcommand};

use crate::{dataset::RowId, mapping::MappingDirective};

#[derive(Debug, Parser)]
#[command(author, version, about = "Map, validate and clean CSV imports against a schema", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Write a CSV template (header plus example row) for a schema
    Template(TemplateArgs),
    /// Map and validate a CSV file, printing every diagnostic
    Check(CheckArgs),
    /// Map, validate, apply edits and write the clean records as JSON
    Import(ImportArgs),
}

#[derive(Debug, Args)]
pub struct TemplateArgs {
    /// Schema YAML file describing the target fields
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Destination CSV file (stdout when omitted or '-')
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Only write the header row
    #[arg(long)]
    pub no_example: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
}

#[derive(Debug, Args)]
pub struct SourceArgs {
    /// Schema YAML file describing the target fields
    #[arg(short, long)]
    pub schema: PathBuf,
    /// Input CSV file ('-' reads stdin)
    #[arg(short, long)]
    pub input: PathBuf,
    /// Map a column onto a schema field, e.g. `--map "E-mail=email"`
    #[arg(long = "map", value_parser = parse_mapping, action = clap::ArgAction::Append)]
    pub maps: Vec<MappingDirective>,
    /// Keep a column as a custom passthrough field
    #[arg(long = "custom", action = clap::ArgAction::Append)]
    pub custom: Vec<String>,
    /// Ignore a column the schema file or --auto-map would otherwise map
    #[arg(long = "ignore", action = clap::ArgAction::Append)]
    pub ignore: Vec<String>,
    /// Map columns whose names match a field key or display name
    #[arg(long)]
    pub auto_map: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input file (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Override the schema's row cap
    #[arg(long)]
    pub max_rows: Option<usize>,
    /// Keep columns whose cells are all blank
    #[arg(long)]
    pub keep_empty_columns: bool,
}

impl SourceArgs {
    /// Command-line directives in application order: maps, then custom
    /// columns, then ignored columns.
    pub fn directives(&self) -> Vec<MappingDirective> {
        let custom = self.custom.iter().map(|column| MappingDirective::Custom {
            column: column.clone(),
        });
        let ignore = self.ignore.iter().map(|column| MappingDirective::Ignore {
            column: column.clone(),
        });
        self.maps.iter().cloned().chain(custom).chain(ignore).collect()
    }
}

#[derive(Debug, Args)]
pub struct CheckArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Only list error diagnostics
    #[arg(long)]
    pub errors_only: bool,
}

#[derive(Debug, Args)]
pub struct ImportArgs {
    #[command(flatten)]
    pub source: SourceArgs,
    /// Destination JSON file (stdout when omitted or '-')
    #[arg(short, long)]
    pub output: Option<PathBuf>,
    /// Replace one cell before finalizing, e.g. `--set 3:email=a@b.com`
    #[arg(long = "set", value_parser = parse_cell_edit, action = clap::ArgAction::Append)]
    pub edits: Vec<CellEdit>,
    /// Delete rows by id before finalizing
    #[arg(long = "delete", value_delimiter = ',', action = clap::ArgAction::Append)]
    pub deletes: Vec<RowId>,
    /// Delete every row still carrying an error before finalizing
    #[arg(long)]
    pub drop_invalid: bool,
    /// Pretty-print the JSON output
    #[arg(long)]
    pub pretty: bool,
}

/// A `ROW:FIELD=VALUE` edit addressed at the live dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellEdit {
    pub row: RowId,
    pub field: String,
    pub value: String,
}

impl FromStr for CellEdit {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let malformed = || format!("Edit '{value}' must look like ROW:FIELD=VALUE");
        let (row, rest) = value.split_once(':').ok_or_else(malformed)?;
        let (field, cell) = rest.split_once('=').ok_or_else(malformed)?;
        let field = field.trim();
        if field.is_empty() {
            return Err(malformed());
        }
        Ok(CellEdit {
            row: row.parse()?,
            field: field.to_string(),
            value: cell.to_string(),
        })
    }
}

pub fn parse_mapping(value: &str) -> Result<MappingDirective, String> {
    value.parse()
}

pub fn parse_cell_edit(value: &str) -> Result<CellEdit, String> {
    value.parse()
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

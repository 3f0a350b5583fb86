pub mod cli;
pub mod data;
pub mod dataset;
pub mod error;
pub mod expr;
pub mod import;
pub mod io_utils;
pub mod mapping;
pub mod parser;
pub mod report;
pub mod rules;
pub mod schema;
pub mod template;
pub mod unique;
pub mod validate;

use std::{env, io::Write, sync::OnceLock};

use anyhow::{Context, Result};
use clap::Parser;
use log::{LevelFilter, debug, info, warn};

use crate::{
    cli::{Cli, Commands},
    data::Value,
    dataset::RowId,
    import::ImportOptions,
    parser::ParseOptions,
    schema::ImportSchema,
};

static LOGGER: OnceLock<()> = OnceLock::new();

fn init_logging() {
    LOGGER.get_or_init(|| {
        let mut builder = env_logger::Builder::from_env(env_logger::Env::default());
        if env::var("RUST_LOG").is_err() {
            builder.filter_module("csv_importer", LevelFilter::Info);
        }
        let _ = builder.format_timestamp_millis().try_init();
    });
}

pub fn run() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    match cli.command {
        Commands::Template(args) => handle_template(&args),
        Commands::Check(args) => handle_check(&args),
        Commands::Import(args) => handle_import(&args),
    }
}

fn load_schema(path: &std::path::Path) -> Result<ImportSchema> {
    let schema =
        ImportSchema::load(path).with_context(|| format!("Loading schema from {path:?}"))?;
    debug!(
        "Schema declares {} field(s), {} mapping directive(s)",
        schema.fields.len(),
        schema.mappings.len()
    );
    Ok(schema)
}

fn handle_template(args: &cli::TemplateArgs) -> Result<()> {
    let schema = load_schema(&args.schema)?;
    let delimiter = io_utils::resolve_output_delimiter(args.output.as_deref(), args.delimiter);
    let writer = io_utils::open_output(args.output.as_deref())?;
    template::write_template(writer, &schema.fields, !args.no_example, delimiter)
        .context("Writing template")?;
    info!(
        "Template with {} column(s) written using delimiter '{}'",
        schema.fields.len(),
        printable_delimiter(delimiter)
    );
    Ok(())
}

fn import_options(schema: &ImportSchema, source: &cli::SourceArgs) -> Result<ImportOptions> {
    let encoding = io_utils::resolve_encoding(source.input_encoding.as_deref())?;
    let delimiter = io_utils::resolve_input_delimiter(&source.input, source.delimiter);
    let mut parse = ParseOptions::from_limits(&schema.limits)
        .with_delimiter(delimiter)
        .with_encoding(encoding)
        .keep_empty_columns(source.keep_empty_columns);
    if let Some(limit) = source.max_rows {
        parse = parse.with_limit(limit);
    }
    Ok(ImportOptions {
        parse,
        directives: source.directives(),
        auto_map: source.auto_map,
    })
}

fn load_import(source: &cli::SourceArgs) -> Result<import::Import> {
    let schema = load_schema(&source.schema)?;
    let options = import_options(&schema, source)?;
    info!(
        "Importing '{}' with delimiter '{}'",
        source.input.display(),
        printable_delimiter(options.parse.delimiter)
    );
    import::import_path(&source.input, &schema, &options)
        .with_context(|| format!("Importing {:?}", source.input))
}

fn handle_check(args: &cli::CheckArgs) -> Result<()> {
    let import = load_import(&args.source)?;
    let dataset = &import.dataset;
    print!("{}", report::render_diagnostics(dataset, args.errors_only));
    println!("{}", report::render_summary(dataset));
    Ok(())
}

fn handle_import(args: &cli::ImportArgs) -> Result<()> {
    let mut dataset = load_import(&args.source)?.dataset;

    if !args.deletes.is_empty() {
        dataset
            .delete_rows(&args.deletes)
            .context("Deleting rows")?;
    }
    for edit in &args.edits {
        dataset
            .edit_cell(edit.row, &edit.field, Value::from_cell(&edit.value))
            .with_context(|| format!("Applying edit to row {} field '{}'", edit.row, edit.field))?;
    }
    if args.drop_invalid {
        let invalid = dataset
            .rows_with_errors()
            .map(|row| row.index)
            .collect::<Vec<RowId>>();
        if !invalid.is_empty() {
            warn!("Dropping {} row(s) with errors", invalid.len());
            dataset.delete_rows(&invalid).context("Dropping invalid rows")?;
        }
    }

    let records = match dataset.finalize() {
        Ok(records) => records,
        Err(err) => {
            eprint!("{}", report::render_diagnostics(&dataset, true));
            return Err(err).context("Finalizing import");
        }
    };

    let mut writer = io_utils::open_output(args.output.as_deref())?;
    if args.pretty {
        serde_json::to_writer_pretty(&mut writer, &records)
    } else {
        serde_json::to_writer(&mut writer, &records)
    }
    .context("Writing JSON records")?;
    writeln!(writer).context("Writing JSON records")?;
    writer.flush().context("Flushing output")?;
    info!("Wrote {} record(s)", records.len());
    Ok(())
}

pub(crate) fn printable_delimiter(delimiter: u8) -> String {
    match delimiter {
        b',' => ",".to_string(),
        b'\t' => "\\t".to_string(),
        other => (other as char).to_string(),
    }
}

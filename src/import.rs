use std::{io::Read, path::Path};

use log::info;

use crate::{
    dataset::Dataset,
    error::ImportError,
    mapping::{self, ColumnMapping, MappingDirective},
    parser::{self, ParseOptions, ParsedTable},
    schema::ImportSchema,
};

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub parse: ParseOptions,
    /// Applied after the schema file's own mapping directives.
    pub directives: Vec<MappingDirective>,
    pub auto_map: bool,
}

impl ImportOptions {
    pub fn for_schema(schema: &ImportSchema) -> Self {
        Self {
            parse: ParseOptions::from_limits(&schema.limits),
            directives: Vec::new(),
            auto_map: false,
        }
    }

    pub fn with_directive(mut self, directive: MappingDirective) -> Self {
        self.directives.push(directive);
        self
    }

    pub fn auto_map(mut self, enabled: bool) -> Self {
        self.auto_map = enabled;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Import {
    pub columns: Vec<String>,
    pub dataset: Dataset,
}

pub fn import_path(
    path: &Path,
    schema: &ImportSchema,
    options: &ImportOptions,
) -> Result<Import, ImportError> {
    let table = parser::parse_path(path, &options.parse)?;
    load_table(table, schema, options)
}

pub fn import_reader<R: Read>(
    reader: R,
    schema: &ImportSchema,
    options: &ImportOptions,
) -> Result<Import, ImportError> {
    let table = parser::parse(reader, &options.parse)?;
    load_table(table, schema, options)
}

pub fn load_table(
    table: ParsedTable,
    schema: &ImportSchema,
    options: &ImportOptions,
) -> Result<Import, ImportError> {
    let mappings = resolve_table_mappings(&table.columns, schema, options)?;
    let dataset = Dataset::load(schema, mappings, &table.rows)?;
    info!(
        "Imported {} row(s) from {} column(s)",
        dataset.len(),
        table.columns.len()
    );
    Ok(Import {
        columns: table.columns,
        dataset,
    })
}

/// Schema-file directives go first so command-line directives override them.
pub fn resolve_table_mappings(
    columns: &[String],
    schema: &ImportSchema,
    options: &ImportOptions,
) -> Result<Vec<ColumnMapping>, ImportError> {
    let base = if options.auto_map {
        mapping::suggest_mappings(columns, &schema.fields)
    } else {
        mapping::ignore_all(columns)
    };
    let directives = schema
        .mappings
        .iter()
        .chain(&options.directives)
        .cloned()
        .collect::<Vec<_>>();
    Ok(mapping::resolve_mappings(
        columns,
        base,
        &directives,
        &schema.fields,
    )?)
}

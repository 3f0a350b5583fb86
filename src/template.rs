use std::io::Write;

use anyhow::{Context, Result};

use crate::{io_utils, schema::FieldSpec};

pub fn template_headers(fields: &[FieldSpec]) -> Vec<&str> {
    fields.iter().map(FieldSpec::label).collect()
}

pub fn template_example_row(fields: &[FieldSpec]) -> Vec<String> {
    fields
        .iter()
        .map(|field| match &field.example {
            Some(example) if !example.is_absent() => example.as_text().into_owned(),
            _ => field.field_type.placeholder().to_string(),
        })
        .collect()
}

pub fn write_template<W: Write>(
    writer: W,
    fields: &[FieldSpec],
    include_example_row: bool,
    delimiter: u8,
) -> Result<()> {
    let mut csv_writer = io_utils::open_csv_writer(writer, delimiter);
    csv_writer
        .write_record(template_headers(fields))
        .context("Writing template header")?;
    if include_example_row {
        csv_writer
            .write_record(template_example_row(fields))
            .context("Writing template example row")?;
    }
    csv_writer.flush().context("Flushing template")?;
    Ok(())
}

pub fn generate_template(fields: &[FieldSpec], include_example_row: bool) -> Result<String> {
    let mut buffer = Vec::new();
    write_template(
        &mut buffer,
        fields,
        include_example_row,
        io_utils::DEFAULT_CSV_DELIMITER,
    )?;
    String::from_utf8(buffer).context("Template is not valid UTF-8")
}

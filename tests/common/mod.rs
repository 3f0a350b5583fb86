#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv_importer::{
    data::{Fields, Value},
    dataset::{Dataset, RowId},
    mapping::ColumnMapping,
    schema::ImportSchema,
};
use tempfile::{TempDir, tempdir};

/// Contact schema shared by the integration tests: a required unique email,
/// a name, an optional age with a lower bound and a signup date.
pub const CONTACTS_SCHEMA: &str = r#"
fields:
  - key: email
    display_name: Email
    type: email
    required: true
    rules:
      - rule: unique
  - key: name
    display_name: Full Name
    type: string
  - key: age
    type: number
    rules:
      - rule: custom
        expression: "value >= 18"
        message: must be an adult
        severity: warning
  - key: signed_up
    display_name: Signed Up
    type: date
custom_fields:
  enabled: true
"#;

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        self.write_bytes(name, contents.as_bytes())
    }

    pub fn write_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents).expect("write temp file contents");
        path
    }
}

pub fn contacts_schema() -> ImportSchema {
    ImportSchema::from_yaml_str(CONTACTS_SCHEMA).expect("contacts schema")
}

/// Raw row keyed by source column, classified the way the parser does.
pub fn raw_row(pairs: &[(&str, &str)]) -> Fields {
    pairs
        .iter()
        .map(|(column, cell)| (column.to_string(), Value::from_cell(cell)))
        .collect()
}

/// Maps every listed column onto the field of the same key.
pub fn identity_mappings(schema: &ImportSchema, keys: &[&str]) -> Vec<ColumnMapping> {
    keys.iter()
        .map(|key| {
            let field = schema.field(key).expect("declared field");
            ColumnMapping::mapped(key, field)
        })
        .collect()
}

pub fn load(schema: &ImportSchema, keys: &[&str], rows: &[Fields]) -> Dataset {
    Dataset::load(schema, identity_mappings(schema, keys), rows).expect("load dataset")
}

pub fn message_of(dataset: &Dataset, id: u64, key: &str) -> Option<String> {
    dataset
        .row(RowId::from(id))
        .and_then(|row| row.diagnostic(key))
        .map(|diagnostic| diagnostic.message.clone())
}

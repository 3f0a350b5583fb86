use std::{fmt, str::FromStr};

use log::{debug, info};
use serde::Serialize;
use serde_json::Map;

use crate::{
    data::{Fields, Value},
    error::{ConfigError, DatasetError, FinalizeError},
    mapping::{ColumnMapping, map_row, validate_mappings},
    rules::Severity,
    schema::{CustomFieldFormat, CustomFieldPolicy, FieldSpec, ImportSchema},
    unique,
    validate::{self, Diagnostic, Diagnostics},
};

pub const CUSTOM_FIELDS_KEY: &str = "custom_fields";

pub type Record = Map<String, serde_json::Value>;

/// Stable row identity assigned at load time. Never reused, even after the
/// row is deleted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct RowId(u64);

impl RowId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for RowId {
    fn from(value: u64) -> Self {
        RowId(value)
    }
}

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RowId {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        value
            .trim()
            .parse::<u64>()
            .map(RowId)
            .map_err(|_| format!("Invalid row id '{value}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Row {
    pub index: RowId,
    pub fields: Fields,
    pub diagnostics: Diagnostics,
}

impl Row {
    pub fn has_errors(&self) -> bool {
        self.diagnostics
            .values()
            .any(|diagnostic| diagnostic.severity == Severity::Error)
    }

    pub fn diagnostic(&self, key: &str) -> Option<&Diagnostic> {
        self.diagnostics.get(key)
    }

    pub fn value(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatasetState {
    Loaded,
    Finalized,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SeverityCounts {
    pub info: usize,
    pub warning: usize,
    pub error: usize,
}

impl SeverityCounts {
    pub fn total(&self) -> usize {
        self.info + self.warning + self.error
    }
}

#[derive(Debug, Clone)]
pub struct Dataset {
    fields: Vec<FieldSpec>,
    mappings: Vec<ColumnMapping>,
    custom_fields: CustomFieldPolicy,
    rows: Vec<Row>,
    next_id: u64,
    state: DatasetState,
}

impl Dataset {
    pub fn load(
        schema: &ImportSchema,
        mappings: Vec<ColumnMapping>,
        raw_rows: &[Fields],
    ) -> Result<Self, ConfigError> {
        validate_mappings(&mappings, &schema.fields, schema.custom_fields.enabled)?;
        let rows = raw_rows
            .iter()
            .enumerate()
            .map(|(index, raw)| Row {
                index: RowId(index as u64),
                fields: map_row(raw, &mappings),
                diagnostics: Diagnostics::new(),
            })
            .collect::<Vec<_>>();
        let mut dataset = Self {
            fields: schema.fields.clone(),
            mappings,
            custom_fields: schema.custom_fields,
            next_id: rows.len() as u64,
            rows,
            state: DatasetState::Loaded,
        };
        dataset.revalidate();
        info!(
            "Loaded {} row(s); {} with errors",
            dataset.rows.len(),
            dataset.error_count()
        );
        Ok(dataset)
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row(&self, id: RowId) -> Option<&Row> {
        self.rows.iter().find(|row| row.index == id)
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn mappings(&self) -> &[ColumnMapping] {
        &self.mappings
    }

    pub fn state(&self) -> DatasetState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Next id that would be handed out; ids below it are never reused.
    pub fn next_id(&self) -> RowId {
        RowId(self.next_id)
    }

    pub fn error_count(&self) -> usize {
        self.rows.iter().filter(|row| row.has_errors()).count()
    }

    pub fn rows_with_errors(&self) -> impl Iterator<Item = &Row> {
        self.rows.iter().filter(|row| row.has_errors())
    }

    pub fn diagnostic_counts(&self) -> SeverityCounts {
        let mut counts = SeverityCounts::default();
        for diagnostic in self.rows.iter().flat_map(|row| row.diagnostics.values()) {
            match diagnostic.severity {
                Severity::Info => counts.info += 1,
                Severity::Warning => counts.warning += 1,
                Severity::Error => counts.error += 1,
            }
        }
        counts
    }

    pub fn edit_cell(
        &mut self,
        id: RowId,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<&[Row], DatasetError> {
        self.ensure_loaded()?;
        let row = self
            .rows
            .iter_mut()
            .find(|row| row.index == id)
            .ok_or(DatasetError::UnknownRow(id))?;
        let slot = row
            .fields
            .get_mut(key)
            .ok_or_else(|| DatasetError::UnknownField(key.to_string()))?;
        *slot = value.into();
        debug!("Edited row {id} field '{key}'");
        self.revalidate();
        Ok(&self.rows)
    }

    pub fn delete_rows(&mut self, ids: &[RowId]) -> Result<&[Row], DatasetError> {
        self.ensure_loaded()?;
        let before = self.rows.len();
        self.rows.retain(|row| !ids.contains(&row.index));
        debug!("Deleted {} row(s)", before - self.rows.len());
        self.revalidate();
        Ok(&self.rows)
    }

    /// Emits the clean records once no row carries an error diagnostic.
    /// Success moves the dataset to [`DatasetState::Finalized`]; failure
    /// leaves it editable.
    pub fn finalize(&mut self) -> Result<Vec<Record>, FinalizeError> {
        if self.state == DatasetState::Finalized {
            return Err(FinalizeError::AlreadyFinalized);
        }
        let count = self.error_count();
        if count > 0 {
            return Err(FinalizeError::UnresolvedErrors { count });
        }
        let records = self
            .rows
            .iter()
            .map(|row| self.build_record(row))
            .collect::<Vec<_>>();
        self.state = DatasetState::Finalized;
        info!("Finalized {} record(s)", records.len());
        Ok(records)
    }

    fn build_record(&self, row: &Row) -> Record {
        let group_custom =
            self.custom_fields.enabled && self.custom_fields.format != CustomFieldFormat::Flat;
        let mut record = Record::new();
        let mut custom = Record::new();
        for mapping in &self.mappings {
            let Some(key) = mapping.target_key() else {
                continue;
            };
            let value = row.fields.get(key).map(Value::to_json).unwrap_or_default();
            if group_custom && mapping.is_custom() {
                custom.insert(key.to_string(), value);
            } else {
                record.insert(key.to_string(), value);
            }
        }
        if group_custom && !custom.is_empty() {
            let grouped = serde_json::Value::Object(custom);
            let grouped = match self.custom_fields.format {
                CustomFieldFormat::Json => serde_json::Value::String(grouped.to_string()),
                _ => grouped,
            };
            record.insert(CUSTOM_FIELDS_KEY.to_string(), grouped);
        }
        record
    }

    fn ensure_loaded(&self) -> Result<(), DatasetError> {
        match self.state {
            DatasetState::Loaded => Ok(()),
            DatasetState::Finalized => Err(DatasetError::AlreadyFinalized),
        }
    }

    fn revalidate(&mut self) {
        validate::validate_rows(&mut self.rows, &self.fields, &self.mappings);
        unique::audit(&mut self.rows, &self.fields, &self.mappings);
        debug!(
            "Re-validated {} row(s); {} with errors",
            self.rows.len(),
            self.error_count()
        );
    }
}

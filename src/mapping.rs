use std::{collections::HashSet, str::FromStr};

use heck::ToSnakeCase;
use log::debug;
use serde::Serialize;
use uuid::Uuid;

use crate::{
    data::{Fields, Value},
    error::ConfigError,
    schema::{FieldSpec, FieldType},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Disposition {
    Ignored,
    Custom,
    Mapped {
        target_key: String,
        field_type: FieldType,
        display_name: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnMapping {
    pub id: String,
    pub source_column: String,
    pub disposition: Disposition,
}

impl ColumnMapping {
    fn with_disposition(source_column: &str, disposition: Disposition) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            source_column: source_column.to_string(),
            disposition,
        }
    }

    pub fn ignored(source_column: &str) -> Self {
        Self::with_disposition(source_column, Disposition::Ignored)
    }

    pub fn custom(source_column: &str) -> Self {
        Self::with_disposition(source_column, Disposition::Custom)
    }

    pub fn mapped(source_column: &str, field: &FieldSpec) -> Self {
        Self::with_disposition(
            source_column,
            Disposition::Mapped {
                target_key: field.key.clone(),
                field_type: field.field_type,
                display_name: field.display_name.clone(),
            },
        )
    }

    /// Key this column is written under, or `None` when ignored.
    pub fn target_key(&self) -> Option<&str> {
        match &self.disposition {
            Disposition::Ignored => None,
            Disposition::Custom => Some(&self.source_column),
            Disposition::Mapped { target_key, .. } => Some(target_key),
        }
    }

    pub fn is_custom(&self) -> bool {
        matches!(self.disposition, Disposition::Custom)
    }
}

/// Projects a raw row onto target keys. Columns missing from `row` are
/// written as [`Value::Empty`] so every mapped key is always present.
pub fn map_row(row: &Fields, mappings: &[ColumnMapping]) -> Fields {
    mappings
        .iter()
        .filter_map(|mapping| {
            mapping.target_key().map(|key| {
                let value = row
                    .get(&mapping.source_column)
                    .cloned()
                    .unwrap_or(Value::Empty);
                (key.to_string(), value)
            })
        })
        .collect()
}

pub fn target_keys(mappings: &[ColumnMapping]) -> Vec<&str> {
    mappings
        .iter()
        .filter_map(ColumnMapping::target_key)
        .collect()
}

/// True when a column is mapped onto the declared field `key`. Custom
/// passthrough columns never count.
pub fn is_mapped(mappings: &[ColumnMapping], key: &str) -> bool {
    mappings.iter().any(|mapping| {
        matches!(&mapping.disposition, Disposition::Mapped { target_key, .. } if target_key == key)
    })
}

pub fn validate_mappings(
    mappings: &[ColumnMapping],
    fields: &[FieldSpec],
    custom_fields_enabled: bool,
) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for mapping in mappings {
        match &mapping.disposition {
            Disposition::Ignored => continue,
            Disposition::Custom if !custom_fields_enabled => {
                return Err(ConfigError::CustomFieldsDisabled {
                    column: mapping.source_column.clone(),
                });
            }
            Disposition::Custom => {
                if fields.iter().any(|field| field.key == mapping.source_column) {
                    return Err(ConfigError::MappingConflict {
                        target_key: mapping.source_column.clone(),
                    });
                }
            }
            Disposition::Mapped { target_key, .. } => {
                if !fields.iter().any(|field| &field.key == target_key) {
                    return Err(ConfigError::UnknownTarget {
                        column: mapping.source_column.clone(),
                        target_key: target_key.clone(),
                    });
                }
            }
        }
        if let Some(key) = mapping.target_key()
            && !seen.insert(key)
        {
            return Err(ConfigError::MappingConflict {
                target_key: key.to_string(),
            });
        }
    }

    let missing_fields = fields
        .iter()
        .filter(|field| field.is_required() && !is_mapped(mappings, &field.key))
        .map(|field| field.key.clone())
        .collect::<Vec<_>>();
    if !missing_fields.is_empty() {
        return Err(ConfigError::MappingIncomplete { missing_fields });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MappingDirective {
    Map { column: String, field: String },
    Custom { column: String },
    Ignore { column: String },
}

impl MappingDirective {
    pub fn column(&self) -> &str {
        match self {
            MappingDirective::Map { column, .. }
            | MappingDirective::Custom { column }
            | MappingDirective::Ignore { column } => column,
        }
    }
}

impl FromStr for MappingDirective {
    type Err = String;

    /// Parses `column=field`. The split happens at the last `=` so column
    /// names may themselves contain one.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (column, field) = value
            .rsplit_once('=')
            .ok_or_else(|| format!("Mapping '{value}' must look like column=field"))?;
        let column = column.trim();
        let field = field.trim();
        if column.is_empty() || field.is_empty() {
            return Err(format!("Mapping '{value}' must look like column=field"));
        }
        Ok(MappingDirective::Map {
            column: column.to_string(),
            field: field.to_string(),
        })
    }
}

/// Builds one mapping per column. Columns without a directive keep their
/// entry from `base`, which must hold one mapping per column in column order
/// (see [`ignore_all`] and [`suggest_mappings`]). When several directives
/// name the same column the last one wins.
pub fn resolve_mappings(
    columns: &[String],
    base: Vec<ColumnMapping>,
    directives: &[MappingDirective],
    fields: &[FieldSpec],
) -> Result<Vec<ColumnMapping>, ConfigError> {
    let mut mappings = base;
    for directive in directives {
        let column = directive.column();
        let position = columns
            .iter()
            .position(|candidate| candidate == column)
            .ok_or_else(|| ConfigError::UnknownColumn {
                column: column.to_string(),
            })?;
        let mapping = match directive {
            MappingDirective::Map { field, .. } => {
                let spec = fields.iter().find(|spec| &spec.key == field).ok_or_else(|| {
                    ConfigError::UnknownTarget {
                        column: column.to_string(),
                        target_key: field.clone(),
                    }
                })?;
                ColumnMapping::mapped(column, spec)
            }
            MappingDirective::Custom { .. } => ColumnMapping::custom(column),
            MappingDirective::Ignore { .. } => ColumnMapping::ignored(column),
        };
        if let Some(slot) = mappings.get_mut(position) {
            *slot = mapping;
        }
    }
    debug!(
        "Resolved {} mapping(s): {:?}",
        mappings.len(),
        target_keys(&mappings)
    );
    Ok(mappings)
}

pub fn ignore_all(columns: &[String]) -> Vec<ColumnMapping> {
    columns
        .iter()
        .map(|column| ColumnMapping::ignored(column))
        .collect()
}

pub fn suggest_mappings(columns: &[String], fields: &[FieldSpec]) -> Vec<ColumnMapping> {
    let mut claimed = HashSet::new();
    columns
        .iter()
        .map(|column| {
            let wanted = match_token(column);
            let found = fields.iter().find(|field| {
                !claimed.contains(field.key.as_str())
                    && (match_token(&field.key) == wanted
                        || field
                            .display_name
                            .as_deref()
                            .is_some_and(|name| match_token(name) == wanted))
            });
            match found {
                Some(field) => {
                    claimed.insert(field.key.as_str());
                    ColumnMapping::mapped(column, field)
                }
                None => ColumnMapping::ignored(column),
            }
        })
        .collect()
}

fn match_token(name: &str) -> String {
    name.to_snake_case().replace('_', "")
}

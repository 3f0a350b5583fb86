//! Import schema: the target fields a file is mapped onto, plus the limits and
//! custom-field policy of an import session.
//!
//! A schema is declared once per session and is immutable afterwards. It can be
//! built in code with [`FieldSpec`] builders or loaded from YAML:
//!
//! ```yaml
//! fields:
//!   - key: email
//!     display_name: Email Address
//!     type: email
//!     required: true
//!     example: jane@example.com
//!     rules:
//!       - rule: unique
//!       - rule: regex
//!         pattern: "@example\\.com$"
//!         flags: i
//!         message: Only example.com addresses
//!         severity: warning
//!   - key: age
//!     type: number
//!     rules:
//!       - rule: custom
//!         expression: "value >= 18"
//!         message: Must be an adult
//! limits:
//!   max_rows: 1000
//!   max_file_size: 2097152
//! custom_fields:
//!   enabled: true
//!   format: object
//! mappings:
//!   - column: E-mail
//!     field: email
//!   - column: Notes
//!     custom: true
//! ```
//!
//! Loading resolves the raw YAML into typed specs and rejects unknown types,
//! duplicate keys, invalid patterns and unparsable expressions up front, so
//! validation itself never fails structurally.

use std::{collections::HashSet, fmt, fs::File, io::BufReader, path::Path, str::FromStr, sync::Arc};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::{
    data::Value,
    error::ConfigError,
    expr::CompiledExpression,
    mapping::MappingDirective,
    rules::{Predicate, RuleSpec, Severity},
};

pub const DEFAULT_MAX_ROWS: usize = 1000;
pub const DEFAULT_MAX_FILE_SIZE: u64 = 2 * 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Email,
    Date,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Email => "email",
            FieldType::Date => "date",
        }
    }

    pub fn variants() -> &'static [&'static str] {
        &["string", "number", "boolean", "email", "date"]
    }

    /// Value used in templates when a field declares no example.
    pub fn placeholder(&self) -> &'static str {
        match self {
            FieldType::String => "Example Text",
            FieldType::Number => "123",
            FieldType::Boolean => "true",
            FieldType::Email => "example@email.com",
            FieldType::Date => "2024-01-01",
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FieldType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "string" | "text" => Ok(FieldType::String),
            "number" | "numeric" | "integer" | "int" | "float" | "decimal" => Ok(FieldType::Number),
            "boolean" | "bool" => Ok(FieldType::Boolean),
            "email" | "e-mail" => Ok(FieldType::Email),
            "date" => Ok(FieldType::Date),
            _ => Err(format!(
                "Unknown field type '{value}'. Supported types: {}",
                FieldType::variants().join(", ")
            )),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub key: String,
    pub display_name: Option<String>,
    pub field_type: FieldType,
    pub required: bool,
    pub rules: Vec<RuleSpec>,
    pub example: Option<Value>,
}

impl FieldSpec {
    pub fn new(key: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            key: key.into(),
            display_name: None,
            field_type,
            required: false,
            rules: Vec::new(),
            example: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn with_rule(mut self, rule: RuleSpec) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn with_example(mut self, example: impl Into<Value>) -> Self {
        self.example = Some(example.into());
        self
    }

    /// A field is required when flagged so or when it carries a `Required`
    /// rule.
    pub fn is_required(&self) -> bool {
        self.required
            || self
                .rules
                .iter()
                .any(|rule| matches!(rule, RuleSpec::Required))
    }

    pub fn label(&self) -> &str {
        self.display_name
            .as_deref()
            .filter(|name| !name.is_empty())
            .unwrap_or(&self.key)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Limits {
    #[serde(default = "Limits::default_max_rows")]
    pub max_rows: usize,
    #[serde(default = "Limits::default_max_file_size")]
    pub max_file_size: u64,
}

impl Limits {
    const fn default_max_rows() -> usize {
        DEFAULT_MAX_ROWS
    }

    const fn default_max_file_size() -> u64 {
        DEFAULT_MAX_FILE_SIZE
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_rows: DEFAULT_MAX_ROWS,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CustomFieldFormat {
    #[default]
    Object,
    Json,
    Flat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CustomFieldPolicy {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub format: CustomFieldFormat,
}

#[derive(Debug, Clone)]
pub struct ImportSchema {
    pub fields: Vec<FieldSpec>,
    pub limits: Limits,
    pub custom_fields: CustomFieldPolicy,
    pub mappings: Vec<MappingDirective>,
}

impl ImportSchema {
    pub fn new(fields: Vec<FieldSpec>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.key.as_str()) {
                return Err(ConfigError::DuplicateField {
                    key: field.key.clone(),
                });
            }
        }
        Ok(Self {
            fields,
            limits: Limits::default(),
            custom_fields: CustomFieldPolicy::default(),
            mappings: Vec::new(),
        })
    }

    pub fn with_custom_fields(mut self, policy: CustomFieldPolicy) -> Self {
        self.custom_fields = policy;
        self
    }

    pub fn with_limits(mut self, limits: Limits) -> Self {
        self.limits = limits;
        self
    }

    pub fn field(&self, key: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|field| field.key == key)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening schema file {path:?}"))?;
        let reader = BufReader::new(file);
        let raw: SchemaFile = serde_yaml::from_reader(reader).context("Parsing schema YAML")?;
        raw.resolve()
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        let raw: SchemaFile = serde_yaml::from_str(text).context("Parsing schema YAML")?;
        raw.resolve()
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct SchemaFile {
    fields: Vec<FieldConfig>,
    #[serde(default)]
    limits: Limits,
    #[serde(default)]
    custom_fields: CustomFieldPolicy,
    #[serde(default)]
    mappings: Vec<MappingConfig>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldConfig {
    #[serde(alias = "name")]
    key: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(rename = "type")]
    type_name: String,
    #[serde(default)]
    required: bool,
    #[serde(default)]
    rules: Vec<RuleConfig>,
    #[serde(default)]
    example: Option<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "rule", rename_all = "lowercase")]
enum RuleConfig {
    Required,
    Unique {
        #[serde(default)]
        allow_empty: bool,
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        severity: Severity,
    },
    Regex {
        pattern: String,
        #[serde(default)]
        flags: String,
        message: String,
        #[serde(default)]
        severity: Severity,
    },
    Custom {
        expression: String,
        message: String,
        #[serde(default)]
        severity: Severity,
    },
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct MappingConfig {
    column: String,
    #[serde(default)]
    field: Option<String>,
    #[serde(default)]
    custom: bool,
    #[serde(default)]
    ignore: bool,
}

impl SchemaFile {
    fn resolve(self) -> Result<ImportSchema> {
        let fields = self
            .fields
            .into_iter()
            .map(FieldConfig::resolve)
            .collect::<Result<Vec<_>, ConfigError>>()?;
        let mappings = self
            .mappings
            .into_iter()
            .map(MappingConfig::resolve)
            .collect::<Result<Vec<_>>>()?;
        let mut schema = ImportSchema::new(fields)?
            .with_limits(self.limits)
            .with_custom_fields(self.custom_fields);
        schema.mappings = mappings;
        Ok(schema)
    }
}

impl FieldConfig {
    fn resolve(self) -> Result<FieldSpec, ConfigError> {
        let field_type =
            FieldType::from_str(&self.type_name).map_err(|_| ConfigError::UnknownFieldType {
                field: self.key.clone(),
                type_name: self.type_name.clone(),
                supported: FieldType::variants().join(", "),
            })?;
        let rules = self
            .rules
            .into_iter()
            .map(|rule| rule.resolve(&self.key))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FieldSpec {
            key: self.key,
            display_name: self.display_name,
            field_type,
            required: self.required,
            rules,
            example: self.example,
        })
    }
}

impl RuleConfig {
    fn resolve(self, field: &str) -> Result<RuleSpec, ConfigError> {
        match self {
            RuleConfig::Required => Ok(RuleSpec::Required),
            RuleConfig::Unique {
                allow_empty,
                message,
                severity,
            } => Ok(RuleSpec::Unique {
                allow_empty,
                message,
                severity,
            }),
            RuleConfig::Regex {
                pattern,
                flags,
                message,
                severity,
            } => RuleSpec::regex(&pattern, &flags, message)
                .map(|rule| rule.with_severity(severity))
                .map_err(|detail| ConfigError::InvalidPattern {
                    field: field.to_string(),
                    detail,
                }),
            RuleConfig::Custom {
                expression,
                message,
                severity,
            } => {
                let compiled = CompiledExpression::compile(&expression).map_err(|err| {
                    ConfigError::InvalidExpression {
                        field: field.to_string(),
                        detail: format!("{err:#}"),
                    }
                })?;
                Ok(
                    RuleSpec::custom(Predicate::Expression(Arc::new(compiled)), message)
                        .with_severity(severity),
                )
            }
        }
    }
}

impl MappingConfig {
    fn resolve(self) -> Result<MappingDirective> {
        match (self.field, self.custom, self.ignore) {
            (Some(field), false, false) => Ok(MappingDirective::Map {
                column: self.column,
                field,
            }),
            (None, true, false) => Ok(MappingDirective::Custom {
                column: self.column,
            }),
            (None, false, true) => Ok(MappingDirective::Ignore {
                column: self.column,
            }),
            _ => bail!(
                "Mapping for column '{}' must set exactly one of field, custom or ignore",
                self.column
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
fields:
  - key: email
    display_name: Email Address
    type: email
    required: true
    example: jane@example.com
    rules:
      - rule: unique
        allow_empty: true
      - rule: regex
        pattern: "@example\\.com$"
        flags: i
        message: Only example.com addresses
        severity: warning
  - key: age
    type: number
    rules:
      - rule: custom
        expression: "value >= 18"
        message: Must be an adult
limits:
  max_rows: 50
custom_fields:
  enabled: true
  format: json
mappings:
  - column: E-mail
    field: email
  - column: Notes
    custom: true
"#;

    #[test]
    fn from_yaml_str_resolves_fields_rules_and_policy() {
        let schema = ImportSchema::from_yaml_str(SAMPLE).expect("parse schema");
        assert_eq!(schema.fields.len(), 2);

        let email = schema.field("email").expect("email field");
        assert_eq!(email.field_type, FieldType::Email);
        assert_eq!(email.label(), "Email Address");
        assert!(email.is_required());
        assert_eq!(email.rules.len(), 2);
        assert_eq!(email.rules[1].severity(), Severity::Warning);
        assert!(matches!(
            email.rules[0],
            RuleSpec::Unique {
                allow_empty: true,
                ..
            }
        ));

        assert_eq!(schema.limits.max_rows, 50);
        assert_eq!(schema.limits.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert!(schema.custom_fields.enabled);
        assert_eq!(schema.custom_fields.format, CustomFieldFormat::Json);
        assert_eq!(schema.mappings.len(), 2);
    }

    #[test]
    fn unknown_type_is_a_config_error() {
        let yaml = "fields:\n  - key: when\n    type: timestamp\n";
        let err = ImportSchema::from_yaml_str(yaml).unwrap_err();
        let config = err.downcast_ref::<ConfigError>().expect("config error");
        assert!(matches!(config, ConfigError::UnknownFieldType { type_name, .. } if type_name == "timestamp"));
    }

    #[test]
    fn invalid_regex_is_a_config_error() {
        let yaml = "fields:\n  - key: code\n    type: string\n    rules:\n      - rule: regex\n        pattern: \"(\"\n        message: bad\n";
        let err = ImportSchema::from_yaml_str(yaml).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn duplicate_keys_are_rejected() {
        let err = ImportSchema::new(vec![
            FieldSpec::new("id", FieldType::Number),
            FieldSpec::new("id", FieldType::String),
        ])
        .unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateField { key } if key == "id"));
    }

    #[test]
    fn required_rule_marks_field_required() {
        let field = FieldSpec::new("name", FieldType::String).with_rule(RuleSpec::Required);
        assert!(field.is_required());
        assert_eq!(field.label(), "name");
    }

    #[test]
    fn mapping_entries_must_pick_one_disposition() {
        let yaml = "fields: []\nmappings:\n  - column: a\n    field: x\n    custom: true\n";
        assert!(ImportSchema::from_yaml_str(yaml).is_err());
    }
}

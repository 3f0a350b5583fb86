use std::{collections::BTreeMap, fmt, sync::OnceLock};

use regex::Regex;
use serde::Serialize;

use crate::{
    data::{Fields, Value, format_number, parse_calendar_date},
    dataset::Row,
    mapping::{ColumnMapping, is_mapped},
    rules::Severity,
    schema::{FieldSpec, FieldType},
};

pub const REQUIRED_MESSAGE: &str = "required";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Row,
    Table,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Origin::Row => "row",
            Origin::Table => "table",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub severity: Severity,
    pub origin: Origin,
}

impl Diagnostic {
    pub fn row(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            origin: Origin::Row,
        }
    }

    pub fn table(message: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            severity,
            origin: Origin::Table,
        }
    }
}

pub type Diagnostics = BTreeMap<String, Diagnostic>;

/// Keeps `candidate` only if it is strictly more severe than what the field
/// already carries.
pub fn merge_diagnostic(diagnostics: &mut Diagnostics, key: &str, candidate: Diagnostic) {
    match diagnostics.get(key) {
        Some(current) if current.severity >= candidate.severity => {}
        _ => {
            diagnostics.insert(key.to_string(), candidate);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvalidValue(pub FieldType);

impl fmt::Display for InvalidValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}", self.0)
    }
}

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email pattern"))
}

fn as_trimmed_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.trim().to_string(),
        Value::Number(n) => format_number(*n),
        other => other.as_text().into_owned(),
    }
}

/// Coerces a value to `field_type`. Blank values become [`Value::Empty`]
/// rather than an error. Coercing an already coerced value returns it
/// unchanged.
pub fn coerce(value: &Value, field_type: FieldType) -> Result<Value, InvalidValue> {
    if value.is_absent() {
        return Ok(Value::Empty);
    }
    let invalid = InvalidValue(field_type);
    match field_type {
        FieldType::String => Ok(Value::String(as_trimmed_text(value))),
        FieldType::Email => {
            let text = as_trimmed_text(value);
            if email_pattern().is_match(&text) {
                Ok(Value::String(text))
            } else {
                Err(invalid)
            }
        }
        FieldType::Number => match value {
            Value::Number(n) => Ok(Value::Number(*n)),
            Value::String(s) => match s.trim().parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(Value::Number(n)),
                _ => Err(invalid),
            },
            _ => Err(invalid),
        },
        FieldType::Boolean => match value {
            Value::Boolean(b) => Ok(Value::Boolean(*b)),
            Value::String(s) => {
                let trimmed = s.trim();
                if trimmed.eq_ignore_ascii_case("true") {
                    Ok(Value::Boolean(true))
                } else if trimmed.eq_ignore_ascii_case("false") {
                    Ok(Value::Boolean(false))
                } else {
                    Err(invalid)
                }
            }
            _ => Err(invalid),
        },
        FieldType::Date => match value {
            Value::Date(d) => Ok(Value::Date(*d)),
            Value::String(s) => parse_calendar_date(s).map(Value::Date).ok_or(invalid),
            _ => Err(invalid),
        },
    }
}

/// Validates one row in place: coerced values replace raw ones, values that
/// fail coercion are left untouched. Returns the row's diagnostics.
pub fn validate_row(
    values: &mut Fields,
    fields: &[FieldSpec],
    mappings: &[ColumnMapping],
) -> Diagnostics {
    let mut diagnostics = Diagnostics::new();
    let fields = fields
        .iter()
        .filter(|field| is_mapped(mappings, &field.key))
        .collect::<Vec<_>>();

    for field in &fields {
        let raw = values.get(&field.key).cloned().unwrap_or_default();
        match coerce(&raw, field.field_type) {
            Ok(coerced) => {
                if coerced.is_absent() && field.is_required() {
                    merge_diagnostic(
                        &mut diagnostics,
                        &field.key,
                        Diagnostic::row(REQUIRED_MESSAGE, Severity::Error),
                    );
                }
                if let Some(slot) = values.get_mut(&field.key) {
                    *slot = coerced;
                }
            }
            Err(invalid) => merge_diagnostic(
                &mut diagnostics,
                &field.key,
                Diagnostic::row(invalid.to_string(), Severity::Error),
            ),
        }
    }

    // Rules see the row with every field already coerced.
    for field in &fields {
        let value = values.get(&field.key).cloned().unwrap_or_default();
        if value.is_absent() && !field.is_required() {
            continue;
        }
        for rule in field.rules.iter().filter(|rule| rule.is_row_level()) {
            if !rule.evaluate(&value, values) {
                merge_diagnostic(
                    &mut diagnostics,
                    &field.key,
                    Diagnostic::row(rule.message(), rule.severity()),
                );
            }
        }
    }

    diagnostics
}

pub fn validate_rows(rows: &mut [Row], fields: &[FieldSpec], mappings: &[ColumnMapping]) {
    for row in rows.iter_mut() {
        row.diagnostics = validate_row(&mut row.fields, fields, mappings);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rules::{Predicate, RuleSpec};
    use chrono::NaiveDate;

    fn row_of(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    fn mappings_for(fields: &[FieldSpec]) -> Vec<ColumnMapping> {
        fields
            .iter()
            .map(|field| ColumnMapping::mapped(&field.key, field))
            .collect()
    }

    #[test]
    fn coerce_treats_blank_as_absent() {
        assert_eq!(coerce(&Value::from("   "), FieldType::Number), Ok(Value::Empty));
        assert_eq!(coerce(&Value::Empty, FieldType::Date), Ok(Value::Empty));
    }

    #[test]
    fn coerce_parses_each_type() {
        assert_eq!(
            coerce(&Value::from(" 12.5 "), FieldType::Number),
            Ok(Value::Number(12.5))
        );
        assert_eq!(
            coerce(&Value::from("TRUE"), FieldType::Boolean),
            Ok(Value::Boolean(true))
        );
        assert_eq!(
            coerce(&Value::from("2024-03-01"), FieldType::Date),
            Ok(Value::Date(NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()))
        );
        assert_eq!(
            coerce(&Value::from(" a@x.com "), FieldType::Email),
            Ok(Value::from("a@x.com"))
        );
        assert_eq!(
            coerce(&Value::Number(7.0), FieldType::String),
            Ok(Value::from("7"))
        );
    }

    #[test]
    fn coerce_rejects_unparseable_values() {
        assert_eq!(
            coerce(&Value::from("yes"), FieldType::Boolean),
            Err(InvalidValue(FieldType::Boolean))
        );
        assert_eq!(
            coerce(&Value::from("inf"), FieldType::Number),
            Err(InvalidValue(FieldType::Number))
        );
        assert_eq!(
            coerce(&Value::from("a@x"), FieldType::Email),
            Err(InvalidValue(FieldType::Email))
        );
        assert_eq!(
            InvalidValue(FieldType::Date).to_string(),
            "invalid date"
        );
    }

    #[test]
    fn failed_coercion_keeps_raw_value_and_reports_error() {
        let fields = vec![FieldSpec::new("age", FieldType::Number)];
        let mappings = mappings_for(&fields);
        let mut values = row_of(&[("age", Value::from("twelve"))]);
        let diagnostics = validate_row(&mut values, &fields, &mappings);
        assert_eq!(values["age"], Value::from("twelve"));
        assert_eq!(
            diagnostics["age"],
            Diagnostic::row("invalid number", Severity::Error)
        );
    }

    #[test]
    fn required_field_reports_absence() {
        let fields = vec![FieldSpec::new("name", FieldType::String).required()];
        let mappings = mappings_for(&fields);
        let mut values = row_of(&[("name", Value::from("  "))]);
        let diagnostics = validate_row(&mut values, &fields, &mappings);
        assert_eq!(values["name"], Value::Empty);
        assert_eq!(diagnostics["name"].message, REQUIRED_MESSAGE);
        assert_eq!(diagnostics["name"].origin, Origin::Row);
    }

    #[test]
    fn optional_absent_fields_skip_rules() {
        let fields = vec![
            FieldSpec::new("code", FieldType::String)
                .with_rule(RuleSpec::regex("^[A-Z]+$", "", "upper only").unwrap()),
        ];
        let mappings = mappings_for(&fields);
        let mut values = row_of(&[("code", Value::Empty)]);
        assert!(validate_row(&mut values, &fields, &mappings).is_empty());
    }

    #[test]
    fn unmapped_fields_skip_rules() {
        let fields = vec![
            FieldSpec::new("code", FieldType::String)
                .with_rule(RuleSpec::regex("^[A-Z]+$", "", "upper only").unwrap()),
        ];
        let mut values = row_of(&[("code", Value::from("abc"))]);
        assert!(validate_row(&mut values, &fields, &[]).is_empty());
    }

    #[test]
    fn passthrough_value_named_like_a_field_is_left_alone() {
        let fields = vec![FieldSpec::new("age", FieldType::Number)];
        let mappings = vec![ColumnMapping::custom("age")];
        let mut values = row_of(&[("age", Value::from("n/a"))]);
        assert!(validate_row(&mut values, &fields, &mappings).is_empty());
        assert_eq!(values["age"], Value::from("n/a"));
    }

    #[test]
    fn higher_severity_wins_regardless_of_declaration_order() {
        let warn_then_error = vec![
            FieldSpec::new("code", FieldType::String)
                .with_rule(
                    RuleSpec::regex("^x", "", "should start with x")
                        .unwrap()
                        .with_severity(Severity::Warning),
                )
                .with_rule(RuleSpec::regex("^[0-9]+$", "", "digits only").unwrap()),
        ];
        let mappings = mappings_for(&warn_then_error);
        let mut values = row_of(&[("code", Value::from("abc"))]);
        let diagnostics = validate_row(&mut values, &warn_then_error, &mappings);
        assert_eq!(diagnostics["code"].message, "digits only");
        assert_eq!(diagnostics["code"].severity, Severity::Error);
    }

    #[test]
    fn equal_severity_keeps_the_first_finding() {
        let fields = vec![
            FieldSpec::new("age", FieldType::Number)
                .with_rule(RuleSpec::custom(Predicate::native(|_, _| false), "first"))
                .with_rule(RuleSpec::custom(Predicate::native(|_, _| false), "second")),
        ];
        let mappings = mappings_for(&fields);
        let mut values = row_of(&[("age", Value::from("abc"))]);
        let diagnostics = validate_row(&mut values, &fields, &mappings);
        assert_eq!(diagnostics["age"].message, "invalid number");

        let mut values = row_of(&[("age", Value::from("4"))]);
        let diagnostics = validate_row(&mut values, &fields, &mappings);
        assert_eq!(diagnostics["age"].message, "first");
    }

    #[test]
    fn custom_rules_receive_the_coerced_row() {
        let fields = vec![
            FieldSpec::new("start", FieldType::Number),
            FieldSpec::new("end", FieldType::Number).with_rule(RuleSpec::custom(
                Predicate::native(|value, row| match (value, row.get("start")) {
                    (Value::Number(end), Some(Value::Number(start))) => end >= start,
                    _ => false,
                }),
                "end before start",
            )),
        ];
        let mappings = mappings_for(&fields);
        let mut values = row_of(&[("start", Value::from("5")), ("end", Value::from("3"))]);
        let diagnostics = validate_row(&mut values, &fields, &mappings);
        assert_eq!(diagnostics["end"].message, "end before start");
        assert!(!diagnostics.contains_key("start"));
    }

    #[test]
    fn merge_diagnostic_prefers_strictly_higher_severity() {
        let mut diagnostics = Diagnostics::new();
        merge_diagnostic(&mut diagnostics, "f", Diagnostic::row("a", Severity::Warning));
        merge_diagnostic(&mut diagnostics, "f", Diagnostic::table("b", Severity::Warning));
        assert_eq!(diagnostics["f"].message, "a");
        merge_diagnostic(&mut diagnostics, "f", Diagnostic::table("c", Severity::Error));
        assert_eq!(diagnostics["f"].message, "c");
        merge_diagnostic(&mut diagnostics, "f", Diagnostic::row("d", Severity::Info));
        assert_eq!(diagnostics["f"].message, "c");
    }
}

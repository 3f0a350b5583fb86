use itertools::Itertools;
use log::debug;

use crate::{
    data::Value,
    dataset::Row,
    mapping::{ColumnMapping, is_mapped},
    rules::RuleSpec,
    schema::FieldSpec,
    validate::{Diagnostic, merge_diagnostic},
};

const EMPTY: &Value = &Value::Empty;

fn counted(value: &Value, allow_empty: bool) -> bool {
    !(allow_empty && value.is_absent())
}

/// Flags every row whose value for a unique field occurs more than once.
/// Runs after row-level validation so the values compared are the coerced
/// ones; findings merge into the existing diagnostics by severity.
pub fn audit(rows: &mut [Row], fields: &[FieldSpec], mappings: &[ColumnMapping]) {
    for field in fields {
        if !is_mapped(mappings, &field.key) {
            continue;
        }
        for rule in &field.rules {
            let RuleSpec::Unique { allow_empty, .. } = rule else {
                continue;
            };
            let counts = rows
                .iter()
                .map(|row| row.fields.get(&field.key).unwrap_or(EMPTY))
                .filter(|value| counted(value, *allow_empty))
                .map(Value::identity_key)
                .counts();
            let mut flagged = 0usize;
            for row in rows.iter_mut() {
                let value = row.fields.get(&field.key).unwrap_or(EMPTY);
                if !counted(value, *allow_empty) {
                    continue;
                }
                if counts.get(&value.identity_key()).is_some_and(|count| *count > 1) {
                    merge_diagnostic(
                        &mut row.diagnostics,
                        &field.key,
                        Diagnostic::table(rule.message(), rule.severity()),
                    );
                    flagged += 1;
                }
            }
            if flagged > 0 {
                debug!("Field '{}' has {flagged} duplicate value(s)", field.key);
            }
        }
    }
}

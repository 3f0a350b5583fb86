use std::collections::BTreeSet;

use csv_importer::{
    data::{Fields, Value},
    mapping::{ColumnMapping, map_row},
    schema::{FieldSpec, FieldType},
    validate::coerce,
};
use proptest::prelude::*;

fn cell() -> impl Strategy<Value = String> {
    prop_oneof![
        Just(String::new()),
        Just("   ".to_string()),
        "-?[0-9]{1,6}(\\.[0-9]{1,3})?",
        "(true|false|TRUE|False)",
        "[a-z]{1,8}@[a-z]{1,8}\\.(com|org)",
        "20[0-9]{2}-(0[1-9]|1[0-2])-(0[1-9]|1[0-9]|2[0-8])",
        "[ -~]{0,12}",
    ]
}

fn field_type() -> impl Strategy<Value = FieldType> {
    prop_oneof![
        Just(FieldType::String),
        Just(FieldType::Number),
        Just(FieldType::Boolean),
        Just(FieldType::Email),
        Just(FieldType::Date),
    ]
}

/// Disposition per column: 0 ignored, 1 custom, 2 mapped onto `field_{i}`.
fn mappings_for(dispositions: &[u8]) -> Vec<ColumnMapping> {
    dispositions
        .iter()
        .enumerate()
        .map(|(index, disposition)| {
            let column = format!("col_{index}");
            match disposition {
                0 => ColumnMapping::ignored(&column),
                1 => ColumnMapping::custom(&column),
                _ => ColumnMapping::mapped(
                    &column,
                    &FieldSpec::new(format!("field_{index}"), FieldType::String),
                ),
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn coercing_twice_yields_the_same_value(raw in cell(), field_type in field_type()) {
        let value = Value::from_cell(&raw);
        if let Ok(once) = coerce(&value, field_type) {
            let twice = coerce(&once, field_type);
            prop_assert_eq!(twice, Ok(once));
        }
    }

    #[test]
    fn map_row_emits_exactly_the_non_ignored_targets(
        dispositions in proptest::collection::vec(0u8..3, 1..8),
        cells in proptest::collection::vec(cell(), 8),
        drop_column in proptest::option::of(0usize..8),
    ) {
        let mappings = mappings_for(&dispositions);
        let row = dispositions
            .iter()
            .enumerate()
            .filter(|(index, _)| Some(*index) != drop_column)
            .map(|(index, _)| (format!("col_{index}"), Value::from_cell(&cells[index])))
            .collect::<Fields>();

        let mapped = map_row(&row, &mappings);

        let expected_keys = mappings
            .iter()
            .filter_map(|mapping| mapping.target_key().map(str::to_string))
            .collect::<BTreeSet<_>>();
        prop_assert_eq!(mapped.keys().cloned().collect::<BTreeSet<_>>(), expected_keys);

        for mapping in &mappings {
            if let Some(key) = mapping.target_key() {
                let source = row.get(&mapping.source_column).cloned().unwrap_or_default();
                prop_assert_eq!(&mapped[key], &source);
            }
        }
    }

    #[test]
    fn map_row_is_independent_of_other_rows(
        dispositions in proptest::collection::vec(0u8..3, 1..6),
        first in proptest::collection::vec(cell(), 6),
        second in proptest::collection::vec(cell(), 6),
    ) {
        let mappings = mappings_for(&dispositions);
        let build = |cells: &[String]| {
            dispositions
                .iter()
                .enumerate()
                .map(|(index, _)| (format!("col_{index}"), Value::from_cell(&cells[index])))
                .collect::<Fields>()
        };
        let rows = [build(&first), build(&second)];
        let forward = rows.iter().map(|row| map_row(row, &mappings)).collect::<Vec<_>>();
        let mut backward = rows.iter().rev().map(|row| map_row(row, &mappings)).collect::<Vec<_>>();
        backward.reverse();
        prop_assert_eq!(forward, backward);
    }
}

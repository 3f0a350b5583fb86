use std::{borrow::Cow, collections::BTreeMap, fmt};

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

/// A row's cells keyed by column or target field name.
pub type Fields = BTreeMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Empty,
    String(String),
    Number(f64),
    Boolean(bool),
    Date(NaiveDate),
}

impl Value {
    /// Classifies a raw cell the way the parser does: blank cells are
    /// `Empty`, canonical decimal numbers are `Number`, everything else stays
    /// a `String` with its original text.
    pub fn from_cell(raw: &str) -> Value {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Value::Empty;
        }
        match trimmed.parse::<f64>() {
            Ok(number) if number.is_finite() && format_number(number) == trimmed => {
                Value::Number(number)
            }
            _ => Value::String(raw.to_string()),
        }
    }

    pub fn is_absent(&self) -> bool {
        match self {
            Value::Empty => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    pub fn as_text(&self) -> Cow<'_, str> {
        match self {
            Value::Empty => Cow::Borrowed(""),
            Value::String(s) => Cow::Borrowed(s.as_str()),
            Value::Number(n) => Cow::Owned(format_number(*n)),
            Value::Boolean(b) => Cow::Borrowed(if *b { "true" } else { "false" }),
            Value::Date(d) => Cow::Owned(d.format("%Y-%m-%d").to_string()),
        }
    }

    pub fn identity_key(&self) -> (u8, String) {
        if self.is_absent() {
            return (0, String::new());
        }
        let tag = match self {
            Value::Empty => 0,
            Value::String(_) => 1,
            Value::Number(_) => 2,
            Value::Boolean(_) => 3,
            Value::Date(_) => 4,
        };
        (tag, self.as_text().into_owned())
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Empty => serde_json::Value::Null,
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    serde_json::Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n)
                        .map(serde_json::Value::Number)
                        .unwrap_or(serde_json::Value::Null)
                }
            }
            Value::Boolean(b) => serde_json::Value::Bool(*b),
            Value::Date(d) => serde_json::Value::String(d.format("%Y-%m-%d").to_string()),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

/// Renders a number without a trailing `.0` for integral values.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

pub fn parse_naive_date(value: &str) -> Option<NaiveDate> {
    const DATE_FORMATS: &[&str] = &[
        "%Y-%m-%d", "%d/%m/%Y", "%m/%d/%Y", "%Y/%m/%d", "%d-%m-%Y", "%Y.%m.%d", "%d.%m.%Y",
        "%B %d, %Y", "%b %d, %Y", "%d %B %Y", "%d %b %Y",
    ];
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
}

pub fn parse_naive_datetime(value: &str) -> Option<NaiveDateTime> {
    const DATETIME_FORMATS: &[&str] = &[
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
}

pub fn parse_calendar_date(value: &str) -> Option<NaiveDate> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    parse_naive_date(trimmed)
        .or_else(|| parse_naive_datetime(trimmed).map(|dt| dt.date()))
        .or_else(|| {
            DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_cell_detects_canonical_numbers_only() {
        assert_eq!(Value::from_cell("42"), Value::Number(42.0));
        assert_eq!(Value::from_cell(" 3.5 "), Value::Number(3.5));
        assert_eq!(Value::from_cell("007"), Value::String("007".to_string()));
        assert_eq!(Value::from_cell("1e3"), Value::String("1e3".to_string()));
        assert_eq!(Value::from_cell("NaN"), Value::String("NaN".to_string()));
        assert_eq!(Value::from_cell("   "), Value::Empty);
    }

    #[test]
    fn parse_calendar_date_supports_multiple_forms() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(parse_calendar_date("2024-05-06"), Some(expected));
        assert_eq!(parse_calendar_date("2024/05/06"), Some(expected));
        assert_eq!(parse_calendar_date("2024-05-06T14:30:00"), Some(expected));
        assert_eq!(parse_calendar_date("2024-05-06T14:30:00Z"), Some(expected));
        assert_eq!(parse_calendar_date("2024-02-30"), None);
        assert_eq!(parse_calendar_date("soon"), None);
    }

    #[test]
    fn identity_key_unifies_absent_values() {
        assert_eq!(
            Value::Empty.identity_key(),
            Value::String("  ".to_string()).identity_key()
        );
        assert_ne!(
            Value::Number(1.0).identity_key(),
            Value::String("1".to_string()).identity_key()
        );
    }

    #[test]
    fn to_json_renders_integral_numbers_without_fraction() {
        assert_eq!(Value::Number(5.0).to_json(), serde_json::json!(5));
        assert_eq!(Value::Number(2.5).to_json(), serde_json::json!(2.5));
        assert_eq!(Value::Empty.to_json(), serde_json::Value::Null);
    }
}

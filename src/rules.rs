use std::{fmt, sync::Arc};

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::{
    data::{Fields, Value},
    expr::CompiledExpression,
};

pub const DEFAULT_UNIQUE_MESSAGE: &str = "must be unique";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    #[default]
    Error,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

type NativePredicate = dyn Fn(&Value, &Fields) -> bool + Send + Sync;

#[derive(Clone)]
pub enum Predicate {
    Expression(Arc<CompiledExpression>),
    Native(Arc<NativePredicate>),
}

impl Predicate {
    pub fn native<F>(check: F) -> Self
    where
        F: Fn(&Value, &Fields) -> bool + Send + Sync + 'static,
    {
        Predicate::Native(Arc::new(check))
    }

    pub fn test(&self, value: &Value, row: &Fields) -> bool {
        match self {
            Predicate::Expression(expression) => expression.test(value, row),
            Predicate::Native(check) => check(value, row),
        }
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Predicate::Expression(expression) => {
                f.debug_tuple("Expression").field(&expression.source()).finish()
            }
            Predicate::Native(_) => f.write_str("Native(..)"),
        }
    }
}

#[derive(Debug, Clone)]
pub enum RuleSpec {
    Required,
    Unique {
        allow_empty: bool,
        message: Option<String>,
        severity: Severity,
    },
    Regex {
        regex: Regex,
        flags: String,
        message: String,
        severity: Severity,
    },
    Custom {
        predicate: Predicate,
        message: String,
        severity: Severity,
    },
}

impl RuleSpec {
    pub fn unique(allow_empty: bool) -> Self {
        RuleSpec::Unique {
            allow_empty,
            message: None,
            severity: Severity::Error,
        }
    }

    /// Builds a regex rule. `flags` follows the usual single-letter
    /// convention: `i`, `m`, `s`, `x` and `u` are honoured; `g` and `y` have
    /// no meaning for a single test and are accepted and ignored.
    pub fn regex(pattern: &str, flags: &str, message: impl Into<String>) -> Result<Self, String> {
        let mut builder = RegexBuilder::new(pattern);
        for flag in flags.chars() {
            match flag {
                'i' => {
                    builder.case_insensitive(true);
                }
                'm' => {
                    builder.multi_line(true);
                }
                's' => {
                    builder.dot_matches_new_line(true);
                }
                'x' => {
                    builder.ignore_whitespace(true);
                }
                'u' | 'g' | 'y' => {}
                other => return Err(format!("unsupported regex flag '{other}'")),
            }
        }
        let regex = builder.build().map_err(|err| err.to_string())?;
        Ok(RuleSpec::Regex {
            regex,
            flags: flags.to_string(),
            message: message.into(),
            severity: Severity::Error,
        })
    }

    pub fn custom(predicate: Predicate, message: impl Into<String>) -> Self {
        RuleSpec::Custom {
            predicate,
            message: message.into(),
            severity: Severity::Error,
        }
    }

    pub fn with_severity(mut self, level: Severity) -> Self {
        match &mut self {
            RuleSpec::Required => {}
            RuleSpec::Unique { severity, .. }
            | RuleSpec::Regex { severity, .. }
            | RuleSpec::Custom { severity, .. } => *severity = level,
        }
        self
    }

    pub fn with_message(mut self, text: impl Into<String>) -> Self {
        match &mut self {
            RuleSpec::Required => {}
            RuleSpec::Unique { message, .. } => *message = Some(text.into()),
            RuleSpec::Regex { message, .. } | RuleSpec::Custom { message, .. } => {
                *message = text.into()
            }
        }
        self
    }

    pub fn severity(&self) -> Severity {
        match self {
            RuleSpec::Required => Severity::Error,
            RuleSpec::Unique { severity, .. }
            | RuleSpec::Regex { severity, .. }
            | RuleSpec::Custom { severity, .. } => *severity,
        }
    }

    pub fn message(&self) -> &str {
        match self {
            RuleSpec::Required => "required",
            RuleSpec::Unique { message, .. } => {
                message.as_deref().unwrap_or(DEFAULT_UNIQUE_MESSAGE)
            }
            RuleSpec::Regex { message, .. } | RuleSpec::Custom { message, .. } => message,
        }
    }

    pub fn is_row_level(&self) -> bool {
        matches!(self, RuleSpec::Regex { .. } | RuleSpec::Custom { .. })
    }

    /// Returns `true` when `value` passes the rule. Uniqueness always passes
    /// here; it is a table-level property.
    pub fn evaluate(&self, value: &Value, row: &Fields) -> bool {
        match self {
            RuleSpec::Required => !value.is_absent(),
            RuleSpec::Unique { .. } => true,
            RuleSpec::Regex { regex, .. } => regex.is_match(&value.as_text()),
            RuleSpec::Custom { predicate, .. } => predicate.test(value, row),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_orders_error_above_warning_above_info() {
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
        assert_eq!(Severity::default(), Severity::Error);
    }

    #[test]
    fn regex_rule_honours_case_insensitive_flag() {
        let rule = RuleSpec::regex("^abc$", "i", "bad").expect("compile");
        let row = Fields::new();
        assert!(rule.evaluate(&Value::from("ABC"), &row));
        assert!(!rule.evaluate(&Value::from("abd"), &row));
    }

    #[test]
    fn regex_rule_rejects_unknown_flags() {
        let err = RuleSpec::regex("a", "q", "bad").unwrap_err();
        assert!(err.contains("unsupported regex flag"));
    }

    #[test]
    fn custom_rule_sees_the_whole_row() {
        let rule = RuleSpec::custom(
            Predicate::native(|value, row| {
                value.as_text() != row.get("other").map(|v| v.as_text()).unwrap_or_default()
            }),
            "must differ from other",
        )
        .with_severity(Severity::Warning);
        let mut row = Fields::new();
        row.insert("other".to_string(), Value::from("x"));
        assert!(!rule.evaluate(&Value::from("x"), &row));
        assert!(rule.evaluate(&Value::from("y"), &row));
        assert_eq!(rule.severity(), Severity::Warning);
    }

    #[test]
    fn unique_rule_uses_default_message() {
        assert_eq!(RuleSpec::unique(false).message(), DEFAULT_UNIQUE_MESSAGE);
        assert_eq!(
            RuleSpec::unique(true).with_message("dup").message(),
            "dup"
        );
    }
}

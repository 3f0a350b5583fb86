use std::collections::HashSet;

use anyhow::{Context, Result};
use evalexpr::{
    ContextWithMutableFunctions, ContextWithMutableVariables, Function, HashMapContext, Node,
    Value as EvalValue, build_operator_tree,
};
use log::debug;
use regex::Regex;

use crate::data::{Fields, Value};

#[derive(Debug)]
pub struct CompiledExpression {
    source: String,
    tree: Node,
}

impl CompiledExpression {
    pub fn compile(source: &str) -> Result<Self> {
        let tree = build_operator_tree(source)
            .with_context(|| format!("Parsing expression '{source}'"))?;
        Ok(Self {
            source: source.to_string(),
            tree,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluates against one cell and its row. Evaluation failures (type
    /// mismatches, unknown variables) count as a failed check.
    pub fn test(&self, value: &Value, row: &Fields) -> bool {
        let outcome = build_context(value, row).and_then(|context| {
            self.tree
                .eval_with_context(&context)
                .with_context(|| format!("Evaluating expression '{}'", self.source))
        });
        match outcome {
            Ok(result) => eval_value_truthy(result),
            Err(err) => {
                debug!("{err:#}");
                false
            }
        }
    }
}

pub fn normalize_field_name(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            'a'..='z' | 'A'..='Z' | '0'..='9' => c,
            _ => '_',
        })
        .collect::<String>()
        .to_ascii_lowercase()
}

pub fn value_to_evalexpr(value: &Value) -> EvalValue {
    match value {
        Value::Empty => EvalValue::Empty,
        Value::String(s) => EvalValue::String(s.clone()),
        Value::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => EvalValue::Int(*n as i64),
        Value::Number(n) => EvalValue::Float(*n),
        Value::Boolean(b) => EvalValue::Boolean(*b),
        Value::Date(d) => EvalValue::String(d.format("%Y-%m-%d").to_string()),
    }
}

pub fn build_context(value: &Value, row: &Fields) -> Result<HashMapContext> {
    let mut context = HashMapContext::new();
    register_string_functions(&mut context)?;
    context
        .set_value("value".to_string(), value_to_evalexpr(value))
        .context("Binding value")?;
    let mut bound = HashSet::from(["value".to_string()]);
    for (name, cell) in row {
        let key = normalize_field_name(name);
        if !bound.insert(key.clone()) {
            continue;
        }
        context
            .set_value(key, value_to_evalexpr(cell))
            .with_context(|| format!("Binding field '{name}'"))?;
    }
    Ok(context)
}

fn register_string_functions(context: &mut HashMapContext) -> Result<()> {
    context
        .set_function(
            "lowercase".into(),
            Function::new(|argument| {
                let value = expect_string(argument, "lowercase")?;
                Ok(EvalValue::String(value.to_lowercase()))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "uppercase".into(),
            Function::new(|argument| {
                let value = expect_string(argument, "uppercase")?;
                Ok(EvalValue::String(value.to_uppercase()))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "trim".into(),
            Function::new(|argument| {
                let value = expect_string(argument, "trim")?;
                Ok(EvalValue::String(value.trim().to_string()))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "length".into(),
            Function::new(|argument| match argument {
                EvalValue::Empty => Ok(EvalValue::Int(0)),
                other => {
                    let value = expect_string(other, "length")?;
                    Ok(EvalValue::Int(value.chars().count() as i64))
                }
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "is_empty".into(),
            Function::new(|argument| {
                let empty = match argument {
                    EvalValue::Empty => true,
                    EvalValue::String(s) => s.trim().is_empty(),
                    _ => false,
                };
                Ok(EvalValue::Boolean(empty))
            }),
        )
        .map_err(anyhow::Error::from)?;

    context
        .set_function(
            "matches".into(),
            Function::new(|arguments| {
                let args = match arguments {
                    EvalValue::Tuple(values) if values.len() == 2 => values,
                    EvalValue::Tuple(values) => {
                        return Err(evalexpr::EvalexprError::wrong_function_argument_amount(
                            values.len(),
                            2,
                        ));
                    }
                    _ => return Err(eval_error("matches expects (value, pattern)")),
                };
                let value = expect_string(&args[0], "matches")?;
                let pattern = expect_string(&args[1], "matches")?;
                let regex = Regex::new(pattern)
                    .map_err(|err| eval_error(&format!("Invalid regex: {err}")))?;
                Ok(EvalValue::Boolean(regex.is_match(value)))
            }),
        )
        .map_err(anyhow::Error::from)?;

    Ok(())
}

fn eval_error(message: &str) -> evalexpr::EvalexprError {
    evalexpr::EvalexprError::CustomMessage(message.to_string())
}

fn expect_string<'a>(value: &'a EvalValue, name: &str) -> Result<&'a str, evalexpr::EvalexprError> {
    if let EvalValue::String(s) = value {
        Ok(s)
    } else {
        Err(eval_error(&format!("{name} expects a string argument")))
    }
}

pub fn eval_value_truthy(value: EvalValue) -> bool {
    match value {
        EvalValue::Boolean(b) => b,
        EvalValue::Int(i) => i != 0,
        EvalValue::Float(f) => f != 0.0,
        EvalValue::String(s) => !s.is_empty(),
        EvalValue::Tuple(values) => values.into_iter().any(eval_value_truthy),
        EvalValue::Empty => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(pairs: &[(&str, Value)]) -> Fields {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn expression_compares_numeric_value() {
        let expr = CompiledExpression::compile("value >= 18").expect("compile");
        assert!(expr.test(&Value::Number(21.0), &Fields::new()));
        assert!(!expr.test(&Value::Number(12.0), &Fields::new()));
    }

    #[test]
    fn expression_reads_other_fields_by_normalized_name() {
        let expr = CompiledExpression::compile("value != first_name").expect("compile");
        let fields = row(&[("First Name", Value::from("Ada"))]);
        assert!(!expr.test(&Value::from("Ada"), &fields));
        assert!(expr.test(&Value::from("Grace"), &fields));
    }

    #[test]
    fn expression_string_functions_are_available() {
        let expr = CompiledExpression::compile("length(trim(value)) > 2 && matches(value, \"^[a-z]+$\")")
            .expect("compile");
        assert!(expr.test(&Value::from("abc"), &Fields::new()));
        assert!(!expr.test(&Value::from("ab"), &Fields::new()));
    }

    #[test]
    fn evaluation_errors_fail_the_check() {
        let expr = CompiledExpression::compile("value > 3").expect("compile");
        assert!(!expr.test(&Value::from("text"), &Fields::new()));
    }

    #[test]
    fn compile_rejects_malformed_expressions() {
        assert!(CompiledExpression::compile("(value > 3").is_err());
    }
}

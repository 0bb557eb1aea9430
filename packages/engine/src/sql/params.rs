use std::ops::ControlFlow;

use sqlparser::ast::{Expr, Statement, UnaryOperator, Value as SqlValue};
use sqlparser::ast::{VisitMut, VisitorMut};

use crate::errors;
use crate::{FedqlError, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct PlaceholderState {
    next_ordinal: usize,
}

impl PlaceholderState {
    pub(crate) fn new() -> Self {
        Self { next_ordinal: 0 }
    }
}

/// Replaces `?`, `?N` and `$N` placeholders with the literal they refer to, so
/// that parameter routing sees caller supplied values exactly like inline
/// literals.
pub(crate) fn inline_placeholders(
    statement: &mut Statement,
    params: &[Value],
) -> Result<(), FedqlError> {
    let mut state = PlaceholderState::new();
    let mut visitor = PlaceholderInliner {
        params,
        state: &mut state,
    };
    if let ControlFlow::Break(error) = statement.visit(&mut visitor) {
        return Err(error);
    }
    Ok(())
}

struct PlaceholderInliner<'a> {
    params: &'a [Value],
    state: &'a mut PlaceholderState,
}

impl VisitorMut for PlaceholderInliner<'_> {
    type Break = FedqlError;

    fn pre_visit_value(&mut self, value: &mut SqlValue) -> ControlFlow<Self::Break> {
        let SqlValue::Placeholder(token) = value else {
            return ControlFlow::Continue(());
        };
        let index = match resolve_placeholder_index(token, self.params.len(), self.state) {
            Ok(index) => index,
            Err(error) => return ControlFlow::Break(error),
        };
        *value = engine_value_to_sql_value(&self.params[index]);
        ControlFlow::Continue(())
    }
}

pub(crate) fn resolve_placeholder_index(
    token: &str,
    params_len: usize,
    state: &mut PlaceholderState,
) -> Result<usize, FedqlError> {
    let trimmed = token.trim();

    let source_index = if trimmed.is_empty() || trimmed == "?" {
        let source_index = state.next_ordinal;
        state.next_ordinal += 1;
        source_index
    } else if let Some(numeric) = trimmed.strip_prefix('?') {
        let parsed = parse_1_based_index(trimmed, numeric)?;
        state.next_ordinal = state.next_ordinal.max(parsed);
        parsed - 1
    } else if let Some(numeric) = trimmed.strip_prefix('$') {
        let parsed = parse_1_based_index(trimmed, numeric)?;
        state.next_ordinal = state.next_ordinal.max(parsed);
        parsed - 1
    } else {
        return Err(errors::invalid_placeholder_error(format!(
            "unsupported SQL placeholder format '{trimmed}'"
        )));
    };

    if source_index >= params_len {
        return Err(errors::invalid_placeholder_error(format!(
            "placeholder '{trimmed}' references parameter {} but only {} parameters were provided",
            source_index + 1,
            params_len
        )));
    }

    Ok(source_index)
}

fn parse_1_based_index(token: &str, numeric: &str) -> Result<usize, FedqlError> {
    let parsed = numeric.parse::<usize>().map_err(|_| {
        errors::invalid_placeholder_error(format!("invalid SQL placeholder '{token}'"))
    })?;
    if parsed == 0 {
        return Err(errors::invalid_placeholder_error(format!(
            "invalid SQL placeholder '{token}'"
        )));
    }
    Ok(parsed)
}

/// Literal value of a constant expression, or `None` when the expression
/// depends on anything other than literals.
pub(crate) fn expr_to_engine_value(expr: &Expr) -> Option<Value> {
    match expr {
        Expr::Value(value) => sql_literal_to_engine_value(&value.value),
        Expr::Nested(inner) => expr_to_engine_value(inner),
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match expr_to_engine_value(expr)? {
            Value::Integer(int) => Some(Value::Integer(-int)),
            Value::Real(real) => Some(Value::Real(-real)),
            _ => None,
        },
        _ => None,
    }
}

fn sql_literal_to_engine_value(value: &SqlValue) -> Option<Value> {
    match value {
        SqlValue::Number(raw, _) => {
            if let Ok(int) = raw.parse::<i64>() {
                Some(Value::Integer(int))
            } else {
                raw.parse::<f64>().ok().map(Value::Real)
            }
        }
        SqlValue::SingleQuotedString(text)
        | SqlValue::DoubleQuotedString(text)
        | SqlValue::EscapedStringLiteral(text)
        | SqlValue::UnicodeStringLiteral(text)
        | SqlValue::NationalStringLiteral(text) => Some(Value::Text(text.clone())),
        SqlValue::DollarQuotedString(text) => Some(Value::Text(text.value.clone())),
        SqlValue::Boolean(value) => Some(Value::Integer(i64::from(*value))),
        SqlValue::Null => Some(Value::Null),
        _ => None,
    }
}

fn engine_value_to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(int) => SqlValue::Number(int.to_string(), false),
        Value::Real(real) => SqlValue::Number(real.to_string(), false),
        Value::Text(text) => SqlValue::SingleQuotedString(text.clone()),
        Value::Blob(_) => SqlValue::SingleQuotedString(value.to_string()),
    }
}

use std::fmt;

use crate::ids::{ComparisonId, TableExprId};
use crate::Value;

/// Column on the value side of a comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnOperand {
    pub qualifier: Option<String>,
    pub name: String,
}

impl fmt::Display for ColumnOperand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.qualifier {
            Some(qualifier) => write!(f, "{qualifier}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// What a parameter key is compared against.
#[derive(Debug, Clone, PartialEq)]
pub enum ParameterValue {
    Literal(Value),
    /// `IN (...)` list of literals; fans out into one request per value.
    List(Vec<Value>),
    Column(ColumnOperand),
    /// Any other expression, kept as SQL text.
    Expression(String),
}

impl ParameterValue {
    /// Constant values carried by this parameter, if it is constant at plan time.
    pub fn constants(&self) -> Option<Vec<Value>> {
        match self {
            ParameterValue::Literal(value) => Some(vec![value.clone()]),
            ParameterValue::List(values) => Some(values.clone()),
            ParameterValue::Column(_) | ParameterValue::Expression(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonParameter {
    comparison: ComparisonId,
    value: ParameterValue,
    table: Option<TableExprId>,
    ordinal: usize,
}

impl ComparisonParameter {
    pub fn new(comparison: ComparisonId, value: ParameterValue, ordinal: usize) -> Self {
        Self {
            comparison,
            value,
            table: None,
            ordinal,
        }
    }

    pub fn comparison(&self) -> ComparisonId {
        self.comparison
    }

    pub fn value(&self) -> &ParameterValue {
        &self.value
    }

    pub fn table(&self) -> Option<TableExprId> {
        self.table
    }

    /// Records the table whose call consumes this comparison. Returns the
    /// table already recorded when it differs from `table`.
    pub(crate) fn pin_table(&mut self, table: TableExprId) -> Result<(), TableExprId> {
        match self.table {
            Some(existing) if existing != table => Err(existing),
            _ => {
                self.table = Some(table);
                Ok(())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParameterMetadata {
    Comparison(ComparisonParameter),
    /// A value supplied later, e.g. an INSERT column fed from a query.
    Placeholder { ordinal: usize },
}

impl ParameterMetadata {
    pub fn ordinal(&self) -> usize {
        match self {
            ParameterMetadata::Comparison(comparison) => comparison.ordinal,
            ParameterMetadata::Placeholder { ordinal } => *ordinal,
        }
    }

    pub fn is_placeholder(&self) -> bool {
        matches!(self, ParameterMetadata::Placeholder { .. })
    }

    pub fn as_comparison(&self) -> Option<&ComparisonParameter> {
        match self {
            ParameterMetadata::Comparison(comparison) => Some(comparison),
            ParameterMetadata::Placeholder { .. } => None,
        }
    }

    pub(crate) fn as_comparison_mut(&mut self) -> Option<&mut ComparisonParameter> {
        match self {
            ParameterMetadata::Comparison(comparison) => Some(comparison),
            ParameterMetadata::Placeholder { .. } => None,
        }
    }

    pub fn value(&self) -> Option<&ParameterValue> {
        self.as_comparison().map(ComparisonParameter::value)
    }
}

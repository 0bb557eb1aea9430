use crate::ids::ComparisonId;

/// One join comparison carried by a data-flow edge: values of
/// `source_column` in the source table's response feed the `dest_column`
/// request parameter of the destination table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFlowRelation {
    pub comparison: ComparisonId,
    pub source_column: String,
    pub dest_column: String,
}

use std::fmt;

use crate::ids::TableExprId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(pub(crate) usize);

impl VertexId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for VertexId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// A routed provider table taking part in data flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFlowVertex {
    pub(crate) id: VertexId,
    pub(crate) table: TableExprId,
    pub(crate) name: String,
}

impl DataFlowVertex {
    pub fn id(&self) -> VertexId {
        self.id
    }

    pub fn table(&self) -> TableExprId {
        self.table
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

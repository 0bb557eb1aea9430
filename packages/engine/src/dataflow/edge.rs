use super::relation::DataFlowRelation;
use super::vertex::VertexId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EdgeId(pub(crate) usize);

/// All dependencies between one ordered pair of tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFlowEdge {
    pub(crate) id: EdgeId,
    pub(crate) source: VertexId,
    pub(crate) dest: VertexId,
    pub(crate) relations: Vec<DataFlowRelation>,
}

impl DataFlowEdge {
    pub fn id(&self) -> EdgeId {
        self.id
    }

    pub fn source(&self) -> VertexId {
        self.source
    }

    pub fn dest(&self) -> VertexId {
        self.dest
    }

    pub fn relations(&self) -> &[DataFlowRelation] {
        &self.relations
    }

    /// Source response column to destination request parameter.
    pub fn projection(&self) -> Vec<(String, String)> {
        self.relations
            .iter()
            .map(|relation| (relation.source_column.clone(), relation.dest_column.clone()))
            .collect()
    }
}

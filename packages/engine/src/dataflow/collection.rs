use std::collections::{BTreeSet, HashMap};

use tracing::debug;

use super::component::{analyze_component, DataFlowComponent};
use super::edge::{DataFlowEdge, EdgeId};
use super::relation::DataFlowRelation;
use super::vertex::{DataFlowVertex, VertexId};
use crate::errors;
use crate::ids::TableExprId;
use crate::FedqlError;

/// Unit of acquisition work the planner schedules independently.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataFlowUnit {
    /// A table with no data-flow edges.
    Orphan(VertexId),
    Component(DataFlowComponent),
}

/// Data-flow graph over the routed tables of one scope.
#[derive(Debug, Clone)]
pub struct DataFlowCollection {
    max_fan_in: usize,
    vertices: Vec<DataFlowVertex>,
    edges: Vec<DataFlowEdge>,
    by_table: HashMap<TableExprId, VertexId>,
    by_pair: HashMap<(VertexId, VertexId), EdgeId>,
    sorted: Vec<VertexId>,
    orphans: Vec<VertexId>,
    components: Vec<DataFlowComponent>,
}

impl DataFlowCollection {
    pub fn new(max_fan_in: usize) -> Self {
        Self {
            max_fan_in,
            vertices: Vec::new(),
            edges: Vec::new(),
            by_table: HashMap::new(),
            by_pair: HashMap::new(),
            sorted: Vec::new(),
            orphans: Vec::new(),
            components: Vec::new(),
        }
    }

    pub fn add_vertex(&mut self, table: TableExprId, name: impl Into<String>) -> VertexId {
        if let Some(existing) = self.by_table.get(&table) {
            return *existing;
        }
        let id = VertexId(self.vertices.len());
        self.vertices.push(DataFlowVertex {
            id,
            table,
            name: name.into(),
        });
        self.by_table.insert(table, id);
        id
    }

    /// Adds `relation` to the edge `source -> dest`, creating the edge on
    /// first use.
    pub fn add_or_update_edge(
        &mut self,
        source: TableExprId,
        dest: TableExprId,
        relation: DataFlowRelation,
    ) -> Result<EdgeId, FedqlError> {
        let source = self.vertex_for(source)?;
        let dest = self.vertex_for(dest)?;
        if let Some(existing) = self.by_pair.get(&(source, dest)) {
            let edge = &mut self.edges[existing.0];
            if !edge.relations.contains(&relation) {
                edge.relations.push(relation);
            }
            return Ok(*existing);
        }
        let id = EdgeId(self.edges.len());
        debug!(
            source = %self.vertices[source.0].name,
            dest = %self.vertices[dest.0].name,
            "data-flow edge added"
        );
        self.edges.push(DataFlowEdge {
            id,
            source,
            dest,
            relations: vec![relation],
        });
        self.by_pair.insert((source, dest), id);
        Ok(id)
    }

    fn vertex_for(&self, table: TableExprId) -> Result<VertexId, FedqlError> {
        self.by_table.get(&table).copied().ok_or_else(|| {
            errors::internal_error(format!("{table} has no data-flow vertex"))
        })
    }

    pub fn vertex(&self, id: VertexId) -> Option<&DataFlowVertex> {
        self.vertices.get(id.0)
    }

    pub fn vertex_by_table(&self, table: TableExprId) -> Option<&DataFlowVertex> {
        self.by_table.get(&table).and_then(|id| self.vertex(*id))
    }

    pub fn vertices(&self) -> &[DataFlowVertex] {
        &self.vertices
    }

    pub fn edge(&self, id: EdgeId) -> Option<&DataFlowEdge> {
        self.edges.get(id.0)
    }

    pub fn edges(&self) -> &[DataFlowEdge] {
        &self.edges
    }

    pub fn in_edges(&self, vertex: VertexId) -> impl Iterator<Item = &DataFlowEdge> {
        self.edges.iter().filter(move |edge| edge.dest == vertex)
    }

    pub fn out_edges(&self, vertex: VertexId) -> impl Iterator<Item = &DataFlowEdge> {
        self.edges.iter().filter(move |edge| edge.source == vertex)
    }

    /// Topologically sorts the graph, then splits it into orphans and the
    /// components hanging off each root.
    pub fn sort(&mut self) -> Result<(), FedqlError> {
        let mut in_degree = vec![0usize; self.vertices.len()];
        for edge in &self.edges {
            in_degree[edge.dest.0] += 1;
        }
        let mut ready = (0..self.vertices.len())
            .filter(|index| in_degree[*index] == 0)
            .collect::<BTreeSet<_>>();
        let mut sorted = Vec::with_capacity(self.vertices.len());
        while let Some(next) = ready.pop_first() {
            sorted.push(VertexId(next));
            for edge in self.edges.iter().filter(|edge| edge.source.0 == next) {
                in_degree[edge.dest.0] -= 1;
                if in_degree[edge.dest.0] == 0 {
                    ready.insert(edge.dest.0);
                }
            }
        }
        if sorted.len() != self.vertices.len() {
            let cyclic = self
                .vertices
                .iter()
                .filter(|vertex| in_degree[vertex.id.0] > 0)
                .map(|vertex| vertex.name.clone())
                .collect::<Vec<_>>();
            return Err(errors::cyclic_dependency_error(&cyclic));
        }

        let mut orphans = Vec::new();
        let mut roots = Vec::new();
        for vertex in &sorted {
            let has_in = self.in_edges(*vertex).next().is_some();
            let has_out = self.out_edges(*vertex).next().is_some();
            match (has_in, has_out) {
                (false, false) => orphans.push(*vertex),
                (false, true) => roots.push(*vertex),
                _ => {}
            }
        }

        let mut components = Vec::with_capacity(roots.len());
        for root in roots {
            components.push(analyze_component(self, root, &sorted, self.max_fan_in)?);
        }

        debug!(
            orphans = orphans.len(),
            components = components.len(),
            "data-flow graph sorted"
        );
        self.sorted = sorted;
        self.orphans = orphans;
        self.components = components;
        Ok(())
    }

    pub fn sorted(&self) -> &[VertexId] {
        &self.sorted
    }

    /// Orphans first, then components, each in topological order. Only
    /// meaningful after [`Self::sort`].
    pub fn units(&self) -> Vec<DataFlowUnit> {
        self.orphans
            .iter()
            .copied()
            .map(DataFlowUnit::Orphan)
            .chain(self.components.iter().cloned().map(DataFlowUnit::Component))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::{DataFlowCollection, DataFlowUnit};
    use crate::dataflow::DataFlowRelation;
    use crate::errors::ErrorCode;
    use crate::ids::{ComparisonId, TableExprId};

    fn relation(comparison: usize, source: &str, dest: &str) -> DataFlowRelation {
        DataFlowRelation {
            comparison: ComparisonId(comparison),
            source_column: source.to_string(),
            dest_column: dest.to_string(),
        }
    }

    #[test]
    fn repeated_dependencies_merge_into_one_edge() {
        let mut graph = DataFlowCollection::new(5);
        graph.add_vertex(TableExprId(0), "a");
        graph.add_vertex(TableExprId(1), "b");
        let first = graph
            .add_or_update_edge(TableExprId(0), TableExprId(1), relation(0, "id", "parent_id"))
            .unwrap();
        let second = graph
            .add_or_update_edge(TableExprId(0), TableExprId(1), relation(1, "zone", "zone"))
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(graph.edges().len(), 1);
        assert_eq!(graph.edge(first).unwrap().relations().len(), 2);
        assert_eq!(
            graph.edge(first).unwrap().projection(),
            vec![
                ("id".to_string(), "parent_id".to_string()),
                ("zone".to_string(), "zone".to_string())
            ]
        );
    }

    #[test]
    fn mutual_dependency_is_cyclic() {
        let mut graph = DataFlowCollection::new(5);
        graph.add_vertex(TableExprId(0), "a");
        graph.add_vertex(TableExprId(1), "b");
        graph
            .add_or_update_edge(TableExprId(0), TableExprId(1), relation(0, "id", "a_id"))
            .unwrap();
        graph
            .add_or_update_edge(TableExprId(1), TableExprId(0), relation(1, "id", "b_id"))
            .unwrap();
        let error = graph.sort().expect_err("a and b feed each other");
        assert_eq!(error.code, ErrorCode::CyclicDependency);
    }

    #[test]
    fn units_list_orphans_before_components() {
        let mut graph = DataFlowCollection::new(5);
        graph.add_vertex(TableExprId(0), "a");
        graph.add_vertex(TableExprId(1), "b");
        graph.add_vertex(TableExprId(2), "lonely");
        graph
            .add_or_update_edge(TableExprId(0), TableExprId(1), relation(0, "id", "a_id"))
            .unwrap();
        graph.sort().unwrap();
        let units = graph.units();
        assert_eq!(units.len(), 2);
        let DataFlowUnit::Orphan(orphan) = &units[0] else {
            panic!("expected orphan first");
        };
        assert_eq!(graph.vertex(*orphan).unwrap().name(), "lonely");
        let DataFlowUnit::Component(component) = &units[1] else {
            panic!("expected component");
        };
        assert_eq!(component.vertices().len(), 2);
        assert_eq!(component.edges().len(), 1);
    }

    #[test]
    fn vertices_are_unique_per_table() {
        let mut graph = DataFlowCollection::new(5);
        let first = graph.add_vertex(TableExprId(3), "a");
        let second = graph.add_vertex(TableExprId(3), "a again");
        assert_eq!(first, second);
        assert_eq!(graph.vertices().len(), 1);
    }
}

use std::collections::BTreeSet;

use super::collection::DataFlowCollection;
use super::edge::EdgeId;
use super::vertex::VertexId;
use crate::errors;
use crate::FedqlError;

/// Tables reachable from one root, in dependency order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataFlowComponent {
    root: VertexId,
    vertices: Vec<VertexId>,
    edges: Vec<EdgeId>,
}

impl DataFlowComponent {
    pub fn root(&self) -> VertexId {
        self.root
    }

    pub fn vertices(&self) -> &[VertexId] {
        &self.vertices
    }

    pub fn edges(&self) -> &[EdgeId] {
        &self.edges
    }
}

/// Walks the global topological order collecting everything `root` feeds.
/// A table may only be fed by tables already in the component.
pub(crate) fn analyze_component(
    graph: &DataFlowCollection,
    root: VertexId,
    sorted: &[VertexId],
    max_fan_in: usize,
) -> Result<DataFlowComponent, FedqlError> {
    let mut visited = BTreeSet::from([root]);
    let mut vertices = vec![root];
    let mut edges = Vec::new();

    for vertex in sorted {
        if visited.contains(vertex) {
            continue;
        }
        let incoming = graph.in_edges(*vertex).collect::<Vec<_>>();
        if incoming.is_empty() || !incoming.iter().any(|edge| visited.contains(&edge.source())) {
            continue;
        }
        let name = graph
            .vertex(*vertex)
            .map(|vertex| vertex.name().to_string())
            .unwrap_or_else(|| vertex.to_string());
        if incoming.len() > max_fan_in {
            return Err(errors::data_flow_too_complex_error(
                &name,
                incoming.len(),
                max_fan_in,
            ));
        }
        if let Some(outside) = incoming.iter().find(|edge| !visited.contains(&edge.source())) {
            let outside_name = graph
                .vertex(outside.source())
                .map(|vertex| vertex.name().to_string())
                .unwrap_or_default();
            return Err(errors::unsupported_data_flow_shape_error(&format!(
                "`{name}` is fed by `{outside_name}` from outside its dependency chain"
            )));
        }
        visited.insert(*vertex);
        vertices.push(*vertex);
        edges.extend(incoming.iter().map(|edge| edge.id()));
    }

    Ok(DataFlowComponent {
        root,
        vertices,
        edges,
    })
}

#[cfg(test)]
mod tests {
    use crate::dataflow::{DataFlowCollection, DataFlowRelation, DataFlowUnit};
    use crate::errors::ErrorCode;
    use crate::ids::{ComparisonId, TableExprId};

    /// root -> v1..vN -> sink
    fn fan_in_graph(width: usize) -> DataFlowCollection {
        let mut graph = DataFlowCollection::new(5);
        let root = TableExprId(0);
        let sink = TableExprId(width + 1);
        graph.add_vertex(root, "root");
        for index in 1..=width {
            graph.add_vertex(TableExprId(index), format!("v{index}"));
        }
        graph.add_vertex(sink, "sink");
        for index in 1..=width {
            let middle = TableExprId(index);
            graph
                .add_or_update_edge(
                    root,
                    middle,
                    DataFlowRelation {
                        comparison: ComparisonId(index),
                        source_column: "id".to_string(),
                        dest_column: "root_id".to_string(),
                    },
                )
                .unwrap();
            graph
                .add_or_update_edge(
                    middle,
                    sink,
                    DataFlowRelation {
                        comparison: ComparisonId(100 + index),
                        source_column: "id".to_string(),
                        dest_column: format!("v{index}_id"),
                    },
                )
                .unwrap();
        }
        graph
    }

    #[test]
    fn fan_in_at_the_ceiling_passes() {
        let mut graph = fan_in_graph(5);
        graph.sort().expect("fan-in of five is accepted");
        let units = graph.units();
        assert_eq!(units.len(), 1);
        let DataFlowUnit::Component(component) = &units[0] else {
            panic!("expected a component");
        };
        assert_eq!(component.vertices().len(), 7);
        assert_eq!(component.edges().len(), 10);
    }

    #[test]
    fn fan_in_above_the_ceiling_fails() {
        let mut graph = fan_in_graph(6);
        let error = graph.sort().expect_err("fan-in of six is rejected");
        assert_eq!(error.code, ErrorCode::DataFlowTooComplex);
    }

    #[test]
    fn node_fed_from_another_root_is_unsupported() {
        let mut graph = DataFlowCollection::new(5);
        for (index, name) in ["left", "right", "shared"].iter().enumerate() {
            graph.add_vertex(TableExprId(index), *name);
        }
        for source in [0, 1] {
            graph
                .add_or_update_edge(
                    TableExprId(source),
                    TableExprId(2),
                    DataFlowRelation {
                        comparison: ComparisonId(source),
                        source_column: "id".to_string(),
                        dest_column: format!("p{source}"),
                    },
                )
                .unwrap();
        }
        let error = graph.sort().expect_err("shared has two independent roots");
        assert_eq!(error.code, ErrorCode::UnsupportedDataFlowShape);
    }
}

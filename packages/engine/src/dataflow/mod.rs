//! Join-driven dependencies between table calls.

mod collection;
mod component;
mod edge;
mod relation;
mod vertex;

pub use collection::{DataFlowCollection, DataFlowUnit};
pub use component::DataFlowComponent;
pub use edge::{DataFlowEdge, EdgeId};
pub use relation::DataFlowRelation;
pub use vertex::{DataFlowVertex, VertexId};

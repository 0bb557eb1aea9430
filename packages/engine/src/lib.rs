mod analysis;
mod backend;
mod config;
mod dataflow;
mod engine;
mod error;
pub mod errors;
mod execution;
mod ids;
mod parameters;
mod planner;
mod router;
mod sql;
mod taxonomy;
#[cfg(test)]
mod test_support;
mod types;

pub use analysis::{
    AnnotatedAst, ComparisonRecord, ExtractedTables, Indirect, IndirectKind, Operand,
    SelectAnalysis, SelectMetadata, TableKind, TableRef, WhereParams,
};
pub use backend::{RemoteAcquirer, SqlDialect, StagingBackend};
pub use config::{
    DataFlowConfig, EngineConfig, DEFAULT_MAX_COMPONENTS, DEFAULT_MAX_DEPENDENCIES,
    DEFAULT_MAX_FAN_IN, DEFAULT_MAX_INDIRECTION_DEPTH, DEFAULT_NAMESPACE_PREFIX,
};
pub use dataflow::{
    DataFlowCollection, DataFlowComponent, DataFlowEdge, DataFlowRelation, DataFlowUnit,
    DataFlowVertex, EdgeId, VertexId,
};
pub use engine::{open_engine, Engine, OpenEngineConfig, StatementPlan};
pub use error::FedqlError;
pub use errors::ErrorCode;
pub use execution::PlanExecutor;
pub use ids::{ComparisonId, ReferenceId, SelectId, TableExprId};
pub use parameters::{
    ColumnOperand, ColumnarReference, ComparisonParameter, ParamSourceType, ParameterMap,
    ParameterMetadata, ParameterValue, TableParameterCoupling,
};
pub use planner::{
    expand_parameter_rows, AcquireInput, AcquireOutput, AcquireStep, AnnotatedTabulation,
    ArmouryBuilder, ArmourySource, DependencyPlanner, DmlRows, DmlStep, HttpArmoury, HttpRequest,
    PreparedStatementCtx, PrimitiveBuilder, ProjectionFeed, RoutePass, RoutedStatement,
    StagingDrm, StandardStagingDrm, TableDescriptor, TemplateArmouryBuilder, TxnControlCounters,
    GENERATION_ID_COLUMN, INSERT_ID_COLUMN, TXN_ID_COLUMN,
};
pub use router::{DataFlowLink, RoutingSession};
pub use taxonomy::{
    missing_required_params, resolve_hierarchy, resolve_resource_terminal, AnnotationCtx,
    Hierarchy, HierarchyIdentifiers, MethodDocument, ProviderDocument, ProviderRegistry,
    ResolutionMode, ResourceDocument, ServiceDocument, SqlVerb, StaticProviderRegistry,
};
pub use types::{ParameterRow, QueryResult, Value};

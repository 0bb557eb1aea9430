//! Resolution of table names onto provider methods.

mod annotation;
mod hierarchy;
mod registry;
mod resolve;

pub use annotation::AnnotationCtx;
pub use hierarchy::{Hierarchy, HierarchyIdentifiers};
pub use registry::{
    MethodDocument, ProviderDocument, ProviderRegistry, ResourceDocument, ServiceDocument,
    SqlVerb, StaticProviderRegistry,
};
pub use resolve::{
    missing_required_params, resolve_hierarchy, resolve_resource_terminal, ResolutionMode,
};

//! From routed tables to executable primitives.

mod armoury;
mod dependency;
mod primitive;
mod route_pass;
mod staging;

pub use armoury::{
    expand_parameter_rows, ArmouryBuilder, HttpArmoury, HttpRequest, TemplateArmouryBuilder,
};
pub use dependency::DependencyPlanner;
pub use primitive::{
    AcquireInput, AcquireOutput, AcquireStep, ArmourySource, DmlRows, DmlStep, PrimitiveBuilder,
    ProjectionFeed,
};
pub use route_pass::{RoutePass, RoutedStatement};
pub use staging::{
    AnnotatedTabulation, PreparedStatementCtx, StagingDrm, StandardStagingDrm, TableDescriptor,
    TxnControlCounters, GENERATION_ID_COLUMN, INSERT_ID_COLUMN, TXN_ID_COLUMN,
};

pub(crate) use armoury::cross_rows;

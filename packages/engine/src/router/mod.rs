//! Parameter routing: which table call consumes which predicate.

mod session;

pub use session::{DataFlowLink, RoutingSession};

//! Parameter keys and the maps the router works with.

mod columnar_reference;
mod coupling;
mod metadata;
mod parameter_map;

pub use columnar_reference::{ColumnarReference, ParamSourceType};
pub use coupling::TableParameterCoupling;
pub use metadata::{ColumnOperand, ComparisonParameter, ParameterMetadata, ParameterValue};
pub use parameter_map::ParameterMap;

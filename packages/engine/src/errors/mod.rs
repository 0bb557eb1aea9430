use crate::FedqlError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnsupportedKeyType,
    DuplicateParameter,
    RoutingConflict,
    UnknownAlias,
    ConflictingDataFlowTarget,
    UnknownReconstitutionKey,
    AmbiguousOrUnresolvableHierarchy,
    MissingRequiredParameter,
    CyclicDependency,
    DataFlowTooComplex,
    UnsupportedDataFlowShape,
    TooManyComponents,
    ComponentTooComplex,
    IndirectionTooDeep,
    SqlParse,
    UnsupportedStatement,
    InvalidPlaceholder,
    ArmouryConstruction,
    Staging,
    Remote,
    InvalidConfig,
    Internal,
}

impl ErrorCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::UnsupportedKeyType => "FEDQL_ERROR_UNSUPPORTED_KEY_TYPE",
            Self::DuplicateParameter => "FEDQL_ERROR_DUPLICATE_PARAMETER",
            Self::RoutingConflict => "FEDQL_ERROR_ROUTING_CONFLICT",
            Self::UnknownAlias => "FEDQL_ERROR_UNKNOWN_ALIAS",
            Self::ConflictingDataFlowTarget => "FEDQL_ERROR_CONFLICTING_DATA_FLOW_TARGET",
            Self::UnknownReconstitutionKey => "FEDQL_ERROR_UNKNOWN_RECONSTITUTION_KEY",
            Self::AmbiguousOrUnresolvableHierarchy => "FEDQL_ERROR_UNRESOLVABLE_HIERARCHY",
            Self::MissingRequiredParameter => "FEDQL_ERROR_MISSING_REQUIRED_PARAMETER",
            Self::CyclicDependency => "FEDQL_ERROR_CYCLIC_DEPENDENCY",
            Self::DataFlowTooComplex => "FEDQL_ERROR_DATA_FLOW_TOO_COMPLEX",
            Self::UnsupportedDataFlowShape => "FEDQL_ERROR_UNSUPPORTED_DATA_FLOW_SHAPE",
            Self::TooManyComponents => "FEDQL_ERROR_TOO_MANY_COMPONENTS",
            Self::ComponentTooComplex => "FEDQL_ERROR_COMPONENT_TOO_COMPLEX",
            Self::IndirectionTooDeep => "FEDQL_ERROR_INDIRECTION_TOO_DEEP",
            Self::SqlParse => "FEDQL_ERROR_SQL_PARSE",
            Self::UnsupportedStatement => "FEDQL_ERROR_UNSUPPORTED_STATEMENT",
            Self::InvalidPlaceholder => "FEDQL_ERROR_INVALID_PLACEHOLDER",
            Self::ArmouryConstruction => "FEDQL_ERROR_ARMOURY_CONSTRUCTION",
            Self::Staging => "FEDQL_ERROR_STAGING",
            Self::Remote => "FEDQL_ERROR_REMOTE",
            Self::InvalidConfig => "FEDQL_ERROR_INVALID_CONFIG",
            Self::Internal => "FEDQL_ERROR_INTERNAL",
        }
    }

    pub const fn all() -> &'static [Self] {
        &[
            Self::UnsupportedKeyType,
            Self::DuplicateParameter,
            Self::RoutingConflict,
            Self::UnknownAlias,
            Self::ConflictingDataFlowTarget,
            Self::UnknownReconstitutionKey,
            Self::AmbiguousOrUnresolvableHierarchy,
            Self::MissingRequiredParameter,
            Self::CyclicDependency,
            Self::DataFlowTooComplex,
            Self::UnsupportedDataFlowShape,
            Self::TooManyComponents,
            Self::ComponentTooComplex,
            Self::IndirectionTooDeep,
            Self::SqlParse,
            Self::UnsupportedStatement,
            Self::InvalidPlaceholder,
            Self::ArmouryConstruction,
            Self::Staging,
            Self::Remote,
            Self::InvalidConfig,
            Self::Internal,
        ]
    }
}

const DESCRIBE_GUIDANCE: &str =
    "Run DESCRIBE on the table to list its methods and required parameters.";

fn build_error(code: ErrorCode, description: impl Into<String>) -> FedqlError {
    FedqlError::new(code, description)
}

pub(crate) fn unsupported_key_type_error(expr: &str) -> FedqlError {
    build_error(
        ErrorCode::UnsupportedKeyType,
        format!("cannot use `{expr}` as a parameter key; expected a column or identifier"),
    )
}

pub(crate) fn duplicate_parameter_error(name: &str) -> FedqlError {
    build_error(
        ErrorCode::DuplicateParameter,
        format!("parameter '{name}' already present"),
    )
}

pub(crate) fn routing_conflict_error(column: &str, bound_to: &str, requested: &str) -> FedqlError {
    build_error(
        ErrorCode::RoutingConflict,
        format!(
            "failed parameter routing, cannot re-assign `{column}` from `{bound_to}` to `{requested}`"
        ),
    )
}

pub(crate) fn unknown_alias_error(alias: &str) -> FedqlError {
    build_error(
        ErrorCode::UnknownAlias,
        format!("alias `{alias}` does not map to any table expression"),
    )
}

pub(crate) fn conflicting_data_flow_target_error(
    comparison: &str,
    pinned: &str,
    requested: &str,
) -> FedqlError {
    build_error(
        ErrorCode::ConflictingDataFlowTarget,
        format!(
            "join condition `{comparison}` already feeds `{pinned}` and cannot also feed `{requested}`"
        ),
    )
}

pub(crate) fn unknown_reconstitution_key_error(key: &str) -> FedqlError {
    build_error(
        ErrorCode::UnknownReconstitutionKey,
        format!("no reconstitution mapping for key = '{key}'"),
    )
}

pub(crate) fn unresolvable_hierarchy_error(table: &str, detail: &str) -> FedqlError {
    build_error(
        ErrorCode::AmbiguousOrUnresolvableHierarchy,
        format!("could not locate a method for `{table}`: {detail}. {DESCRIBE_GUIDANCE}"),
    )
}

pub(crate) fn missing_required_parameter_error(table: &str, missing: &[String]) -> FedqlError {
    build_error(
        ErrorCode::MissingRequiredParameter,
        format!(
            "query for `{table}` is missing required parameters: {}. {DESCRIBE_GUIDANCE}",
            missing.join(", ")
        ),
    )
}

pub(crate) fn cyclic_dependency_error(tables: &[String]) -> FedqlError {
    build_error(
        ErrorCode::CyclicDependency,
        format!(
            "join conditions form a dependency cycle between: {}",
            tables.join(", ")
        ),
    )
}

pub(crate) fn data_flow_too_complex_error(table: &str, fan_in: usize, max: usize) -> FedqlError {
    build_error(
        ErrorCode::DataFlowTooComplex,
        format!("data flow into `{table}` has {fan_in} inputs; at most {max} are supported"),
    )
}

pub(crate) fn unsupported_data_flow_shape_error(detail: &str) -> FedqlError {
    build_error(
        ErrorCode::UnsupportedDataFlowShape,
        format!("data flow complexity not yet supported: {detail}"),
    )
}

pub(crate) fn too_many_components_error(count: usize, max: usize) -> FedqlError {
    build_error(
        ErrorCode::TooManyComponents,
        format!("query has {count} independent data flows; at most {max} are supported"),
    )
}

pub(crate) fn component_too_complex_error(edges: usize, max: usize) -> FedqlError {
    build_error(
        ErrorCode::ComponentTooComplex,
        format!("data flow has {edges} dependencies; at most {max} are supported"),
    )
}

pub(crate) fn indirection_too_deep_error(name: &str, max: usize) -> FedqlError {
    build_error(
        ErrorCode::IndirectionTooDeep,
        format!("expanding `{name}` exceeds the maximum indirection depth of {max}"),
    )
}

pub(crate) fn sql_parse_error(message: impl std::fmt::Display) -> FedqlError {
    build_error(ErrorCode::SqlParse, message.to_string())
}

pub(crate) fn unsupported_statement_error(detail: impl Into<String>) -> FedqlError {
    build_error(ErrorCode::UnsupportedStatement, detail)
}

pub(crate) fn invalid_placeholder_error(detail: impl Into<String>) -> FedqlError {
    build_error(ErrorCode::InvalidPlaceholder, detail)
}

pub(crate) fn armoury_construction_error(detail: impl Into<String>) -> FedqlError {
    build_error(ErrorCode::ArmouryConstruction, detail)
}

pub fn staging_error(detail: impl Into<String>) -> FedqlError {
    build_error(ErrorCode::Staging, detail)
}

pub fn remote_error(detail: impl Into<String>) -> FedqlError {
    build_error(ErrorCode::Remote, detail)
}

pub(crate) fn invalid_config_error(detail: impl Into<String>) -> FedqlError {
    build_error(ErrorCode::InvalidConfig, detail)
}

pub(crate) fn internal_error(detail: impl Into<String>) -> FedqlError {
    build_error(ErrorCode::Internal, detail)
}

#[cfg(test)]
mod tests {
    use super::{
        missing_required_parameter_error, routing_conflict_error, unresolvable_hierarchy_error,
        ErrorCode,
    };
    use std::collections::HashSet;

    #[test]
    fn error_code_strings_are_unique() {
        let mut seen = HashSet::new();
        for code in ErrorCode::all() {
            let inserted = seen.insert(code.as_str());
            assert!(inserted, "duplicate error code string: {}", code.as_str());
        }
    }

    #[test]
    fn hierarchy_errors_point_at_describe() {
        let unresolvable = unresolvable_hierarchy_error("google.compute.instances", "no match");
        assert_eq!(unresolvable.code, ErrorCode::AmbiguousOrUnresolvableHierarchy);
        assert!(unresolvable.description.contains("DESCRIBE"));

        let missing = missing_required_parameter_error(
            "google.compute.instances",
            &["project".to_string(), "zone".to_string()],
        );
        assert!(missing.description.contains("project, zone"));
        assert!(missing.description.contains("DESCRIBE"));
    }

    #[test]
    fn display_includes_code_string() {
        let error = routing_conflict_error("a.id", "a", "b");
        assert!(error
            .to_string()
            .starts_with("FEDQL_ERROR_ROUTING_CONFLICT: "));
    }
}

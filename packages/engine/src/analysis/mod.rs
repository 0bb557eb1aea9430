//! The annotated AST and the early passes that fill it.

mod alias_pairing;
mod annotated_ast;
mod early;
mod indirect;
mod params;
mod placeholders;
mod providers;
mod tables;

pub use annotated_ast::{
    AnnotatedAst, ComparisonRecord, Indirect, IndirectKind, Operand, SelectMetadata, TableKind,
    TableRef,
};
pub use early::SelectAnalysis;
pub use params::WhereParams;
pub use tables::ExtractedTables;

pub(crate) use early::{analyze_dml_target, analyze_select};
pub(crate) use indirect::IndirectScope;
pub(crate) use placeholders::{
    extract_assignment_params, extract_call_params, extract_insert_params,
};
pub(crate) use providers::{collect_provider_strings, provider_identifiers};

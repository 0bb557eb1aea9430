use std::collections::{BTreeSet, HashMap, HashSet};

use sqlparser::ast::Select;
use tracing::debug;

use super::alias_pairing::pair_table_aliases;
use super::annotated_ast::{AnnotatedAst, TableKind, TableRef};
use super::indirect::IndirectScope;
use super::params::{extract_on_params, extract_where_params};
use super::providers::provider_identifiers;
use super::tables::{extract_tables, ExtractedTables};
use crate::ids::{ReferenceId, SelectId, TableExprId};
use crate::parameters::ParameterMap;
use crate::FedqlError;

/// Everything the early passes learned about one SELECT scope.
#[derive(Debug, Clone)]
pub struct SelectAnalysis {
    pub select: SelectId,
    pub tables: ExtractedTables,
    pub providers: BTreeSet<String>,
    pub where_params: ParameterMap,
    /// References produced by each top level WHERE conjunct, in order.
    pub where_conjuncts: Vec<Vec<ReferenceId>>,
    pub on_params: ParameterMap,
    pub col_refs: HashMap<ReferenceId, TableExprId>,
    /// WHERE references pushed down from an enclosing scope.
    pub inherited: HashSet<ReferenceId>,
}

impl SelectAnalysis {
    pub fn provider_tables(&self) -> impl Iterator<Item = &TableRef> {
        self.tables.providers()
    }

    pub fn is_inherited(&self, id: ReferenceId) -> bool {
        self.inherited.contains(&id)
    }
}

/// Runs the early passes over one SELECT: indirect expansion and table
/// extraction, provider strings, WHERE and ON parameters, then alias pairing.
pub(crate) fn analyze_select(
    aast: &mut AnnotatedAst,
    select: &Select,
    inherited: &ParameterMap,
    scope: &IndirectScope<'_>,
    default_provider: Option<&str>,
) -> Result<SelectAnalysis, FedqlError> {
    let select_id = aast.register_select(scope.depth);
    let tables = extract_tables(aast, select_id, select, scope, default_provider)?;
    let providers = provider_strings(&tables);

    let where_extracted = extract_where_params(aast, select_id, select.selection.as_ref())?;
    let mut where_params = where_extracted.params;
    where_params.merge(inherited);
    let inherited_ids = inherited.keys().map(|key| key.id()).collect::<HashSet<_>>();
    let on_params = extract_on_params(aast, select_id, select)?;

    let col_refs = pair_table_aliases(where_params.keys().chain(on_params.keys()), &tables);
    aast.set_where_params(select_id, where_params.clone());

    debug!(
        select = %select_id,
        tables = tables.tables.len(),
        providers = providers.len(),
        where_params = where_params.len(),
        on_params = on_params.len(),
        "analysed select scope"
    );

    Ok(SelectAnalysis {
        select: select_id,
        tables,
        providers,
        where_params,
        where_conjuncts: where_extracted.conjuncts,
        on_params,
        col_refs,
        inherited: inherited_ids,
    })
}

/// Analysis of a DML target: a single provider table whose parameters come
/// from the statement itself (VALUES columns, SET assignments, CALL
/// arguments) plus its WHERE clause. `select_id` is the scope the statement
/// parameters were registered under.
pub(crate) fn analyze_dml_target(
    aast: &mut AnnotatedAst,
    select_id: SelectId,
    name: Vec<String>,
    alias: Option<String>,
    statement_params: ParameterMap,
    where_clause: Option<&sqlparser::ast::Expr>,
    scope: &IndirectScope<'_>,
    default_provider: Option<&str>,
) -> Result<SelectAnalysis, FedqlError> {
    let id = aast.ids().table();
    let kind = match provider_identifiers(&name, scope.registry, default_provider) {
        Some(identifiers) => TableKind::Provider(identifiers),
        None => TableKind::Local,
    };
    let mut tables = ExtractedTables::default();
    tables.push(TableRef {
        id,
        select: select_id,
        ordinal: 0,
        name,
        alias,
        kind,
    })?;
    aast.set_select_tables(select_id, tables.tables.clone(), tables.aliases.clone());
    let providers = provider_strings(&tables);

    let where_extracted = extract_where_params(aast, select_id, where_clause)?;
    let mut where_params = statement_params;
    where_params.merge(&where_extracted.params);
    let col_refs = pair_table_aliases(where_params.keys(), &tables);
    aast.set_where_params(select_id, where_params.clone());

    Ok(SelectAnalysis {
        select: select_id,
        tables,
        providers,
        where_params,
        where_conjuncts: where_extracted.conjuncts,
        on_params: ParameterMap::new(),
        col_refs,
        inherited: HashSet::new(),
    })
}

fn provider_strings(tables: &ExtractedTables) -> BTreeSet<String> {
    tables
        .providers()
        .filter_map(|table| match &table.kind {
            TableKind::Provider(identifiers) => Some(identifiers.table_name()),
            _ => None,
        })
        .collect()
}

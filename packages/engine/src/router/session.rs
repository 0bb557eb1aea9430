use std::collections::{BTreeMap, HashMap, HashSet};

use tracing::debug;

use crate::analysis::{SelectAnalysis, TableKind, TableRef};
use crate::dataflow::DataFlowRelation;
use crate::errors::{self, ErrorCode};
use crate::ids::{ComparisonId, ReferenceId, TableExprId};
use crate::parameters::{
    ColumnarReference, ParamSourceType, ParameterMap, ParameterValue, TableParameterCoupling,
};
use crate::taxonomy::{
    resolve_hierarchy, AnnotationCtx, Hierarchy, HierarchyIdentifiers, ProviderRegistry,
    ResolutionMode, SqlVerb,
};
use crate::FedqlError;

/// A join condition that makes one table's call depend on another table's
/// response.
#[derive(Debug, Clone, PartialEq)]
pub struct DataFlowLink {
    pub source: TableExprId,
    pub dest: TableExprId,
    pub relation: DataFlowRelation,
}

/// Routing state for one SELECT scope or DML target.
///
/// Tables are routed one at a time; every parameter a table consumes is
/// bound to it and can no longer be offered to another table.
pub struct RoutingSession<'a> {
    registry: &'a dyn ProviderRegistry,
    analysis: &'a SelectAnalysis,
    where_params: ParameterMap,
    on_params: ParameterMap,
    col_refs: HashMap<ReferenceId, TableExprId>,
    invalidated: HashSet<String>,
    pins: BTreeMap<ComparisonId, TableExprId>,
    contexts: BTreeMap<TableExprId, AnnotationCtx>,
}

impl<'a> RoutingSession<'a> {
    pub fn new(registry: &'a dyn ProviderRegistry, analysis: &'a SelectAnalysis) -> Self {
        Self {
            registry,
            analysis,
            where_params: analysis.where_params.clone(),
            on_params: analysis.on_params.clone(),
            col_refs: analysis.col_refs.clone(),
            invalidated: HashSet::new(),
            pins: BTreeMap::new(),
            contexts: BTreeMap::new(),
        }
    }

    pub fn analysis(&self) -> &SelectAnalysis {
        self.analysis
    }

    pub fn contexts(&self) -> &BTreeMap<TableExprId, AnnotationCtx> {
        &self.contexts
    }

    pub fn context(&self, table: TableExprId) -> Option<&AnnotationCtx> {
        self.contexts.get(&table)
    }

    pub fn on_params(&self) -> &ParameterMap {
        &self.on_params
    }

    /// Table a parameter reference is bound to, if any.
    pub fn consumer_of(&self, reference: ReferenceId) -> Option<TableExprId> {
        self.col_refs.get(&reference).copied()
    }

    /// Routes every provider table of the scope in FROM clause order.
    pub fn route_all(&mut self, verb: SqlVerb, method_hint: Option<&str>) -> Result<(), FedqlError> {
        let tables = self.analysis.provider_tables().cloned().collect::<Vec<_>>();
        for table in &tables {
            self.route(table, verb, method_hint)?;
        }
        Ok(())
    }

    /// Chooses the method serving `table` and the parameters its call
    /// consumes. Routing a table twice returns the first outcome.
    pub fn route(
        &mut self,
        table: &TableRef,
        verb: SqlVerb,
        method_hint: Option<&str>,
    ) -> Result<AnnotationCtx, FedqlError> {
        if let Some(ctx) = self.contexts.get(&table.id) {
            return Ok(ctx.clone());
        }
        let TableKind::Provider(identifiers) = &table.kind else {
            return Err(errors::internal_error(format!(
                "`{}` is not a provider table",
                table.display_name()
            )));
        };

        self.bind_alias_matches(table)?;
        let available = self.available_coupling(table)?;
        let (hierarchy, consumed) = self.resolve(identifiers, &available, verb, method_hint)?;

        for (key, _) in consumed.params().iter() {
            key.mark_consumed();
            self.col_refs.insert(key.id(), table.id);
            if key.source_type() == ParamSourceType::WhereParam && key.alias().is_none() {
                self.invalidated.insert(key.string_key());
            }
        }
        self.pin_on_comparisons(table, &consumed)?;

        debug!(
            table = %table.display_name(),
            method = %hierarchy.method().name,
            consumed = ?consumed.names(),
            "routed table"
        );
        let ctx = AnnotationCtx::new(table.id, hierarchy, consumed);
        self.contexts.insert(table.id, ctx.clone());
        Ok(ctx)
    }

    pub(crate) fn bind_reference(
        &mut self,
        key: &ColumnarReference,
        table: TableExprId,
    ) -> Result<(), FedqlError> {
        match self.col_refs.get(&key.id()) {
            Some(bound) if *bound != table => Err(errors::routing_conflict_error(
                &key.string_key(),
                &self.table_name(*bound),
                &self.table_name(table),
            )),
            _ => {
                self.col_refs.insert(key.id(), table);
                Ok(())
            }
        }
    }

    fn table_name(&self, table: TableExprId) -> String {
        self.analysis
            .tables
            .get(table)
            .map(TableRef::display_name)
            .unwrap_or_else(|| table.to_string())
    }

    fn bind_alias_matches(&mut self, table: &TableRef) -> Result<(), FedqlError> {
        let keys = self
            .where_params
            .keys()
            .chain(self.on_params.keys())
            .cloned()
            .collect::<Vec<_>>();
        for key in &keys {
            let Some(alias) = key.alias() else {
                continue;
            };
            match self.analysis.tables.by_alias(alias) {
                Some(owner) if owner == table.id => self.bind_reference(key, table.id)?,
                Some(_) => {}
                None if self.analysis.is_inherited(key.id()) => {}
                None => return Err(errors::unknown_alias_error(alias)),
            }
        }
        Ok(())
    }

    fn offered_to(&self, key: &ColumnarReference, table: TableExprId) -> bool {
        if let Some(owner) = key.alias().and_then(|alias| self.analysis.tables.by_alias(alias)) {
            if owner != table {
                return false;
            }
        }
        self.col_refs.get(&key.id()).map_or(true, |bound| *bound == table)
    }

    fn available_coupling(&self, table: &TableRef) -> Result<TableParameterCoupling, FedqlError> {
        let mut coupling = TableParameterCoupling::new();

        let mut where_entries = self.where_params.iter().collect::<Vec<_>>();
        where_entries.sort_by_key(|(_, metadata)| metadata.ordinal());
        let mut seen = HashSet::new();
        for (key, metadata) in where_entries {
            if !self.offered_to(key, table.id) {
                continue;
            }
            if key.alias().is_none() && self.invalidated.contains(&key.string_key()) {
                continue;
            }
            if !seen.insert(key.string_key()) {
                continue;
            }
            add_skipping_duplicates(&mut coupling, key, metadata.clone(), key.source_type())?;
        }

        for (key, metadata) in self.on_params.iter() {
            if !self.offered_to(key, table.id) {
                continue;
            }
            add_skipping_duplicates(
                &mut coupling,
                key,
                metadata.clone(),
                ParamSourceType::JoinOnParam,
            )?;
        }
        Ok(coupling)
    }

    /// Join parameters are a last resort: resolution first tries without
    /// them so that a table only waits on another when it must.
    fn resolve(
        &self,
        identifiers: &HierarchyIdentifiers,
        available: &TableParameterCoupling,
        verb: SqlVerb,
        method_hint: Option<&str>,
    ) -> Result<(Hierarchy, TableParameterCoupling), FedqlError> {
        let not_on = available.not_on_coupling();
        if not_on.len() != available.len() {
            if let Ok((hierarchy, remaining)) = resolve_hierarchy(
                self.registry,
                identifiers,
                &not_on.names(),
                verb,
                method_hint,
                ResolutionMode::Strict,
            ) {
                return Ok((hierarchy, not_on.reconstitute_consumed_params(&remaining)?));
            }
        }

        let names = available.names();
        let (hierarchy, remaining) = match resolve_hierarchy(
            self.registry,
            identifiers,
            &names,
            verb,
            method_hint,
            ResolutionMode::Strict,
        ) {
            Ok(resolved) => resolved,
            Err(error) if error.is(ErrorCode::AmbiguousOrUnresolvableHierarchy) => {
                resolve_hierarchy(
                    self.registry,
                    identifiers,
                    &names,
                    verb,
                    method_hint,
                    ResolutionMode::ClosestMatch,
                )?
            }
            Err(error) => return Err(error),
        };
        Ok((hierarchy, available.reconstitute_consumed_params(&remaining)?))
    }

    fn pin_on_comparisons(
        &mut self,
        table: &TableRef,
        consumed: &TableParameterCoupling,
    ) -> Result<(), FedqlError> {
        for (key, metadata) in consumed.params().iter() {
            if key.source_type() != ParamSourceType::JoinOnParam {
                continue;
            }
            let Some(comparison) = metadata.as_comparison().map(|c| c.comparison()) else {
                continue;
            };
            if let Some(pinned) = self.pins.get(&comparison) {
                if *pinned != table.id {
                    return Err(errors::conflicting_data_flow_target_error(
                        &key.string_key(),
                        &self.table_name(*pinned),
                        &table.display_name(),
                    ));
                }
            }
            self.pins.insert(comparison, table.id);
            if let Some(parameter) = self
                .on_params
                .get_mut_by_id(key.id())
                .and_then(|metadata| metadata.as_comparison_mut())
            {
                if let Err(pinned) = parameter.pin_table(table.id) {
                    return Err(errors::conflicting_data_flow_target_error(
                        &key.string_key(),
                        &self.table_name(pinned),
                        &table.display_name(),
                    ));
                }
            }
        }
        Ok(())
    }

    /// Turns every join comparison consumed by a table call into a data-flow
    /// link from the table on the other side of the comparison.
    pub fn on_condition_data_flows(&self) -> Result<Vec<DataFlowLink>, FedqlError> {
        let mut links = Vec::new();
        for (comparison, dest) in &self.pins {
            let Some(ctx) = self.contexts.get(dest) else {
                continue;
            };
            for (key, metadata) in ctx.parameters().params().iter() {
                let Some(parameter) = metadata.as_comparison() else {
                    continue;
                };
                if key.source_type() != ParamSourceType::JoinOnParam
                    || parameter.comparison() != *comparison
                {
                    continue;
                }
                let ParameterValue::Column(source_column) = parameter.value() else {
                    continue;
                };
                let source = self.source_table(key, *comparison, source_column.qualifier.as_deref())?;
                if source == *dest {
                    return Err(errors::unsupported_data_flow_shape_error(&format!(
                        "`{}` compares `{}` with its own column `{source_column}`",
                        key.string_key(),
                        self.table_name(*dest)
                    )));
                }
                if !self.contexts.contains_key(&source) {
                    return Err(errors::unsupported_data_flow_shape_error(&format!(
                        "`{}` depends on `{}`, which is not a provider table",
                        self.table_name(*dest),
                        self.table_name(source)
                    )));
                }
                debug!(
                    source = %self.table_name(source),
                    dest = %self.table_name(*dest),
                    column = %key.name(),
                    "join condition feeds table call"
                );
                links.push(DataFlowLink {
                    source,
                    dest: *dest,
                    relation: DataFlowRelation {
                        comparison: *comparison,
                        source_column: source_column.name.clone(),
                        dest_column: key.name().to_string(),
                    },
                });
            }
        }
        Ok(links)
    }

    fn source_table(
        &self,
        dest_key: &ColumnarReference,
        comparison: ComparisonId,
        qualifier: Option<&str>,
    ) -> Result<TableExprId, FedqlError> {
        if let Some(table) = qualifier.and_then(|alias| self.analysis.tables.by_alias(alias)) {
            return Ok(table);
        }
        self.on_params
            .iter()
            .filter(|(key, _)| key.id() != dest_key.id())
            .find(|(_, metadata)| {
                metadata
                    .as_comparison()
                    .is_some_and(|parameter| parameter.comparison() == comparison)
            })
            .and_then(|(key, _)| self.col_refs.get(&key.id()).copied())
            .ok_or_else(|| {
                errors::unsupported_data_flow_shape_error(&format!(
                    "cannot tell which table feeds `{}`",
                    dest_key.string_key()
                ))
            })
    }

    /// Consumed references that are request inputs only, i.e. not columns
    /// of the consuming table's response.
    pub fn request_only_references(&self) -> HashSet<ReferenceId> {
        let mut out = HashSet::new();
        for ctx in self.contexts.values() {
            for (key, _) in ctx.parameters().params().iter() {
                if !ctx.hierarchy().has_response_column(key.name()) {
                    out.insert(key.id());
                }
            }
        }
        out
    }
}

fn add_skipping_duplicates(
    coupling: &mut TableParameterCoupling,
    key: &ColumnarReference,
    metadata: crate::parameters::ParameterMetadata,
    source: ParamSourceType,
) -> Result<(), FedqlError> {
    match coupling.add(key, metadata, source) {
        Ok(()) => Ok(()),
        Err(error) if error.is(ErrorCode::DuplicateParameter) => {
            debug!(parameter = %key, "skipping parameter shadowed by an earlier one");
            Ok(())
        }
        Err(error) => Err(error),
    }
}

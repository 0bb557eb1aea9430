use std::collections::{BTreeMap, BTreeSet, HashSet};

use sqlparser::ast::{Query, Select, TableFactor};
use tracing::debug;

use super::armoury::{expand_parameter_rows, ArmouryBuilder};
use super::primitive::{
    AcquireInput, AcquireOutput, AcquireStep, ArmourySource, PrimitiveBuilder, ProjectionFeed,
};
use super::staging::{AnnotatedTabulation, PreparedStatementCtx, StagingDrm, TxnControlCounters};
use crate::analysis::{IndirectKind, TableKind, TableRef};
use crate::config::DataFlowConfig;
use crate::dataflow::{DataFlowCollection, DataFlowUnit, VertexId};
use crate::errors;
use crate::ids::{ReferenceId, TableExprId};
use crate::router::RoutingSession;
use crate::sql::{
    default_alias, join_conjuncts, parse_single_query, rewrite_table_factors_in_select,
    split_conjuncts, RewriteDecision,
};
use crate::taxonomy::{missing_required_params, AnnotationCtx};
use crate::FedqlError;

/// Builds the data-flow graph of a routed scope: one vertex per routed
/// table, one edge per pair of tables linked by join conditions.
pub(crate) fn collect_data_flow(
    session: &RoutingSession<'_>,
    config: &DataFlowConfig,
) -> Result<DataFlowCollection, FedqlError> {
    let mut graph = DataFlowCollection::new(config.max_fan_in);
    for table in session.contexts().keys() {
        let name = session
            .analysis()
            .tables
            .get(*table)
            .map(TableRef::display_name)
            .unwrap_or_else(|| table.to_string());
        graph.add_vertex(*table, name);
    }
    for link in session.on_condition_data_flows()? {
        graph.add_or_update_edge(link.source, link.dest, link.relation)?;
    }
    graph.sort()?;
    Ok(graph)
}

/// Turns a routed scope and its sorted data-flow graph into acquisitions
/// plus a SELECT that reads the staged rows.
pub struct DependencyPlanner<'a> {
    config: &'a DataFlowConfig,
    drm: &'a dyn StagingDrm,
    armoury: &'a dyn ArmouryBuilder,
    counters: TxnControlCounters,
    acquisitions: Vec<AcquireStep>,
    staged: BTreeMap<TableExprId, Query>,
    rewritten: Option<Select>,
}

impl<'a> DependencyPlanner<'a> {
    pub fn new(
        config: &'a DataFlowConfig,
        drm: &'a dyn StagingDrm,
        armoury: &'a dyn ArmouryBuilder,
        counters: TxnControlCounters,
    ) -> Self {
        Self {
            config,
            drm,
            armoury,
            counters,
            acquisitions: Vec::new(),
            staged: BTreeMap::new(),
            rewritten: None,
        }
    }

    /// `indirect_rewrites` holds the already planned query of every derived
    /// table and view in the scope; `request_only` the references whose
    /// WHERE conjuncts only feed requests and must not filter staged rows.
    pub fn plan(
        &mut self,
        session: &RoutingSession<'_>,
        graph: &DataFlowCollection,
        select: &Select,
        indirect_rewrites: &BTreeMap<TableExprId, Query>,
        request_only: &HashSet<ReferenceId>,
    ) -> Result<(), FedqlError> {
        let units = graph.units();
        self.check_limits(&units, graph)?;
        self.check_required_parameters(session, graph)?;

        for unit in &units {
            match unit {
                DataFlowUnit::Orphan(vertex) => self.acquire(session, graph, *vertex)?,
                DataFlowUnit::Component(component) => {
                    for vertex in component.vertices() {
                        self.acquire(session, graph, *vertex)?;
                    }
                }
            }
        }

        let rewritten = self.rewrite_select(session, select, indirect_rewrites, request_only)?;
        debug!(
            acquisitions = self.acquisitions.len(),
            select = %rewritten,
            "planned select scope"
        );
        self.rewritten = Some(rewritten);
        Ok(())
    }

    fn check_limits(
        &self,
        units: &[DataFlowUnit],
        graph: &DataFlowCollection,
    ) -> Result<(), FedqlError> {
        let components = units
            .iter()
            .filter_map(|unit| match unit {
                DataFlowUnit::Component(component) => Some(component),
                DataFlowUnit::Orphan(_) => None,
            })
            .collect::<Vec<_>>();
        if components.len() > self.config.max_components {
            return Err(errors::too_many_components_error(
                components.len(),
                self.config.max_components,
            ));
        }
        for component in components {
            if component.edges().len() > self.config.max_dependencies {
                return Err(errors::component_too_complex_error(
                    component.edges().len(),
                    self.config.max_dependencies,
                ));
            }
        }
        debug!(
            vertices = graph.vertices().len(),
            edges = graph.edges().len(),
            "data-flow limits satisfied"
        );
        Ok(())
    }

    /// A required parameter is supplied either as a constant or by a join
    /// projection from an upstream table.
    fn check_required_parameters(
        &self,
        session: &RoutingSession<'_>,
        graph: &DataFlowCollection,
    ) -> Result<(), FedqlError> {
        for (table, ctx) in session.contexts() {
            let mut supplied = ctx.static_parameters().into_keys().collect::<BTreeSet<_>>();
            if let Some(vertex) = graph.vertex_by_table(*table) {
                for edge in graph.in_edges(vertex.id()) {
                    supplied.extend(
                        edge.relations()
                            .iter()
                            .map(|relation| relation.dest_column.clone()),
                    );
                }
            }
            let missing = missing_required_params(ctx.hierarchy(), &supplied);
            if !missing.is_empty() {
                return Err(errors::missing_required_parameter_error(
                    &ctx.hierarchy().identifiers().table_name(),
                    &missing,
                ));
            }
        }
        Ok(())
    }

    fn acquire(
        &mut self,
        session: &RoutingSession<'_>,
        graph: &DataFlowCollection,
        vertex: VertexId,
    ) -> Result<(), FedqlError> {
        let Some(node) = graph.vertex(vertex) else {
            return Err(errors::internal_error(format!("unknown data-flow vertex {vertex}")));
        };
        let Some(ctx) = session.context(node.table()) else {
            return Err(errors::internal_error(format!(
                "`{}` was never routed",
                node.name()
            )));
        };
        let mut annotation: AnnotationCtx = ctx.clone();
        let static_params = annotation.static_parameters();

        let feeds = graph
            .in_edges(vertex)
            .filter_map(|edge| {
                graph.vertex(edge.source()).map(|source| ProjectionFeed {
                    from: source.table(),
                    mapping: edge.projection(),
                })
            })
            .collect::<Vec<_>>();
        let (input, armoury) = if feeds.is_empty() {
            let rows = expand_parameter_rows(&static_params);
            let armoury = self.armoury.build(annotation.hierarchy(), &rows)?;
            (AcquireInput::Empty, ArmourySource::Prepared(armoury))
        } else {
            (
                AcquireInput::Projected { feeds },
                ArmourySource::Deferred { static_params },
            )
        };
        let output = if graph.out_edges(vertex).next().is_some() {
            AcquireOutput::Projection
        } else {
            AcquireOutput::Nop
        };

        let counters = self.counters.clone_and_increment_insert_id();
        let tabulation = AnnotatedTabulation::from_hierarchy(annotation.hierarchy());
        let ddl = self.drm.generate_ddl(&tabulation);
        annotation.set_insert_ctx(self.drm.generate_insert_dml(&tabulation, &counters));
        let staged = self.drm.generate_select_dml(&tabulation, &counters);
        self.staged
            .insert(node.table(), parse_single_query(staged.sql())?);

        debug!(
            table = %node.name(),
            method = %annotation.hierarchy().method().name,
            insert_id = counters.insert_id,
            "acquisition scheduled"
        );
        self.acquisitions.push(AcquireStep {
            name: node.name().to_string(),
            annotation,
            ddl,
            armoury,
            input,
            output,
        });
        Ok(())
    }

    fn rewrite_select(
        &self,
        session: &RoutingSession<'_>,
        select: &Select,
        indirect_rewrites: &BTreeMap<TableExprId, Query>,
        request_only: &HashSet<ReferenceId>,
    ) -> Result<Select, FedqlError> {
        let analysis = session.analysis();
        let by_ordinal = analysis
            .tables
            .tables
            .iter()
            .map(|table| (table.ordinal, table))
            .collect::<BTreeMap<_, _>>();

        let mut rewritten = select.clone();
        let mut ordinal = 0usize;
        rewrite_table_factors_in_select(&mut rewritten, &mut |factor| {
            let position = ordinal;
            ordinal += 1;
            if matches!(factor, TableFactor::NestedJoin { .. }) {
                return Ok(RewriteDecision::Unchanged);
            }
            let Some(table) = by_ordinal.get(&position) else {
                return Ok(RewriteDecision::Unchanged);
            };
            let replacement = match &table.kind {
                TableKind::Provider(_) => self.staged.get(&table.id),
                TableKind::Indirect(IndirectKind::Subquery | IndirectKind::View) => {
                    indirect_rewrites.get(&table.id)
                }
                TableKind::Indirect(IndirectKind::Cte) | TableKind::Local => None,
            };
            let Some(query) = replacement else {
                return Ok(RewriteDecision::Unchanged);
            };
            let alias = factor_alias(factor).or_else(|| {
                table
                    .name
                    .last()
                    .map(|name| default_alias(name))
            });
            *factor = TableFactor::Derived {
                lateral: false,
                subquery: Box::new(query.clone()),
                alias,
            };
            Ok(RewriteDecision::Changed)
        })?;

        if let Some(selection) = &select.selection {
            let kept = split_conjuncts(selection)
                .into_iter()
                .enumerate()
                .filter(|(index, _)| {
                    analysis.where_conjuncts.get(*index).map_or(true, |refs| {
                        !refs.iter().any(|reference| request_only.contains(reference))
                    })
                })
                .map(|(_, conjunct)| conjunct.clone())
                .collect::<Vec<_>>();
            rewritten.selection = join_conjuncts(kept);
        }
        Ok(rewritten)
    }

    pub fn acquisitions(&self) -> &[AcquireStep] {
        &self.acquisitions
    }

    pub fn rewritten_select(&self) -> Option<&Select> {
        self.rewritten.as_ref()
    }

    /// Counters after every acquisition planned so far.
    pub fn counters(&self) -> TxnControlCounters {
        self.counters
    }

    /// The staged SELECT of the scope; `None` before [`Self::plan`].
    pub fn select_context(&self) -> Option<PreparedStatementCtx> {
        self.rewritten
            .as_ref()
            .map(|select| PreparedStatementCtx::new(select.to_string(), Vec::new(), self.counters))
    }

    pub fn builder(&self) -> Option<PrimitiveBuilder> {
        self.rewritten.as_ref().map(|select| {
            PrimitiveBuilder::acquire_and_select(
                self.acquisitions.clone(),
                select.to_string(),
                self.counters,
            )
        })
    }

    pub(crate) fn into_parts(self) -> (Vec<AcquireStep>, Option<Select>, TxnControlCounters) {
        (self.acquisitions, self.rewritten, self.counters)
    }
}

fn factor_alias(factor: &TableFactor) -> Option<sqlparser::ast::TableAlias> {
    match factor {
        TableFactor::Table { alias, .. } | TableFactor::Derived { alias, .. } => alias.clone(),
        _ => None,
    }
}

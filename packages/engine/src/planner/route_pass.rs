use std::collections::{BTreeMap, BTreeSet, HashSet};

use sqlparser::ast::{
    Expr, FromTable, Ident, Query, Select, SetExpr, Statement, TableFactor, TableObject,
    TableWithJoins,
};
use tracing::debug;

use super::armoury::{expand_parameter_rows, ArmouryBuilder, TemplateArmouryBuilder};
use super::dependency::{collect_data_flow, DependencyPlanner};
use super::primitive::{AcquireStep, DmlRows, DmlStep, PrimitiveBuilder};
use super::staging::{StandardStagingDrm, TxnControlCounters};
use crate::analysis::{
    analyze_dml_target, analyze_select, collect_provider_strings, extract_assignment_params,
    extract_call_params, extract_insert_params, provider_identifiers, AnnotatedAst, IndirectKind,
    IndirectScope, TableRef,
};
use crate::config::EngineConfig;
use crate::errors;
use crate::ids::{ReferenceId, SelectId};
use crate::parameters::ParameterMap;
use crate::router::RoutingSession;
use crate::sql::{expr_to_engine_value, object_name_parts, split_conjuncts};
use crate::taxonomy::{missing_required_params, AnnotationCtx, ProviderRegistry, SqlVerb};
use crate::types::ParameterRow;
use crate::{FedqlError, QueryResult, Value};

/// A statement together with its analysis and executable plan.
#[derive(Debug)]
pub struct RoutedStatement {
    pub annotated: AnnotatedAst,
    pub providers: BTreeSet<String>,
    pub root: PrimitiveBuilder,
}

/// Plans statements one at a time. Every acquisition planned by one pass
/// draws its insert id from the same counters.
pub struct RoutePass<'a> {
    registry: &'a dyn ProviderRegistry,
    config: &'a EngineConfig,
    drm: StandardStagingDrm,
    armoury: TemplateArmouryBuilder,
    counters: TxnControlCounters,
    request_only: HashSet<ReferenceId>,
}

impl<'a> RoutePass<'a> {
    pub fn new(
        registry: &'a dyn ProviderRegistry,
        config: &'a EngineConfig,
        counters: TxnControlCounters,
    ) -> Self {
        Self {
            registry,
            config,
            drm: StandardStagingDrm::new(config.dialect, config.namespace_prefix.clone()),
            armoury: TemplateArmouryBuilder,
            counters,
            request_only: HashSet::new(),
        }
    }

    pub fn counters(&self) -> TxnControlCounters {
        self.counters
    }

    fn default_provider(&self) -> Option<&str> {
        self.config.default_provider.as_deref()
    }

    pub fn plan_statement(&mut self, statement: &Statement) -> Result<RoutedStatement, FedqlError> {
        let mut annotated = AnnotatedAst::new(statement.clone());
        let providers = collect_provider_strings(statement, self.registry, self.default_provider());
        let root = match statement {
            Statement::Query(query) => {
                let mut acquisitions = Vec::new();
                let rewritten = self.plan_query(
                    &mut annotated,
                    query,
                    &BTreeMap::new(),
                    &ParameterMap::new(),
                    0,
                    &mut acquisitions,
                )?;
                self.ensure_fully_rewritten(&rewritten)?;
                PrimitiveBuilder::acquire_and_select(
                    acquisitions,
                    rewritten.to_string(),
                    self.counters,
                )
            }
            Statement::Insert(insert) => {
                let TableObject::TableName(name) = &insert.table else {
                    return self.passthrough(annotated, providers, statement);
                };
                self.plan_insert(
                    &mut annotated,
                    statement,
                    object_name_parts(name),
                    &insert.columns,
                    insert.source.as_deref(),
                )?
            }
            Statement::Update(update) => {
                let Some((parts, alias)) = single_table(&update.table) else {
                    return self.unsupported_or_passthrough(annotated, providers, statement);
                };
                let select_id = annotated.register_select(0);
                let params =
                    extract_assignment_params(&mut annotated, select_id, &update.assignments)?;
                match self.route_target(
                    &mut annotated,
                    select_id,
                    parts,
                    alias,
                    params,
                    update.selection.as_ref(),
                    SqlVerb::Update,
                    None,
                )? {
                    Some(ctx) => self.prepared_mutation(SqlVerb::Update, &ctx, None)?,
                    None => return self.unsupported_or_passthrough(annotated, providers, statement),
                }
            }
            Statement::Delete(delete) => {
                let tables = match &delete.from {
                    FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => {
                        tables
                    }
                };
                let target = match tables.as_slice() {
                    [table] => single_table(table),
                    _ => None,
                };
                let Some((parts, alias)) = target else {
                    return self.unsupported_or_passthrough(annotated, providers, statement);
                };
                let select_id = annotated.register_select(0);
                match self.route_target(
                    &mut annotated,
                    select_id,
                    parts,
                    alias,
                    ParameterMap::new(),
                    delete.selection.as_ref(),
                    SqlVerb::Delete,
                    None,
                )? {
                    Some(ctx) => self.prepared_mutation(SqlVerb::Delete, &ctx, None)?,
                    None => return self.unsupported_or_passthrough(annotated, providers, statement),
                }
            }
            Statement::Call(function) => {
                let mut parts = object_name_parts(&function.name);
                let method = if parts.len() > 1 { parts.pop() } else { None };
                let select_id = annotated.register_select(0);
                let params = extract_call_params(&mut annotated, select_id, &function.args)?;
                match self.route_target(
                    &mut annotated,
                    select_id,
                    parts,
                    None,
                    params,
                    None,
                    SqlVerb::Exec,
                    method.as_deref(),
                )? {
                    Some(ctx) => self.prepared_mutation(SqlVerb::Exec, &ctx, None)?,
                    None => return self.passthrough(annotated, providers, statement),
                }
            }
            Statement::ExplainTable { table_name, .. } => {
                let parts = object_name_parts(table_name);
                match provider_identifiers(&parts, self.registry, self.default_provider()) {
                    Some(identifiers) => PrimitiveBuilder::Describe {
                        table: identifiers.table_name(),
                        result: self.describe(&identifiers.table_name(), &identifiers)?,
                    },
                    None => return self.passthrough(annotated, providers, statement),
                }
            }
            Statement::ShowTables { .. } => PrimitiveBuilder::Show {
                result: self.show_tables(),
            },
            _ => return self.unsupported_or_passthrough(annotated, providers, statement),
        };

        debug!(plan = %root.explain(), "planned statement");
        Ok(RoutedStatement {
            annotated,
            providers,
            root,
        })
    }

    fn passthrough(
        &self,
        annotated: AnnotatedAst,
        providers: BTreeSet<String>,
        statement: &Statement,
    ) -> Result<RoutedStatement, FedqlError> {
        Ok(RoutedStatement {
            annotated,
            providers,
            root: PrimitiveBuilder::Passthrough {
                sql: statement.to_string(),
            },
        })
    }

    /// Statements naming no provider table run unchanged against the
    /// staging store.
    fn unsupported_or_passthrough(
        &self,
        annotated: AnnotatedAst,
        providers: BTreeSet<String>,
        statement: &Statement,
    ) -> Result<RoutedStatement, FedqlError> {
        if let Some(provider) = providers.iter().next() {
            return Err(errors::unsupported_statement_error(format!(
                "this statement form cannot reference provider table `{provider}`"
            )));
        }
        self.passthrough(annotated, providers, statement)
    }

    fn plan_query(
        &mut self,
        annotated: &mut AnnotatedAst,
        query: &Query,
        ctes: &BTreeMap<String, Query>,
        inherited: &ParameterMap,
        depth: usize,
        acquisitions: &mut Vec<AcquireStep>,
    ) -> Result<Query, FedqlError> {
        let mut rewritten = query.clone();
        let mut scope_ctes = ctes.clone();
        if let Some(with) = &mut rewritten.with {
            for cte in &mut with.cte_tables {
                let original = (*cte.query).clone();
                let planned = self.plan_query(
                    annotated,
                    &original,
                    &scope_ctes,
                    &ParameterMap::new(),
                    depth,
                    acquisitions,
                )?;
                *cte.query = planned;
                scope_ctes.insert(cte.alias.name.value.to_ascii_lowercase(), original);
            }
        }
        self.plan_set_expr(
            annotated,
            &mut rewritten.body,
            &scope_ctes,
            inherited,
            depth,
            acquisitions,
        )?;
        Ok(rewritten)
    }

    fn plan_set_expr(
        &mut self,
        annotated: &mut AnnotatedAst,
        body: &mut SetExpr,
        ctes: &BTreeMap<String, Query>,
        inherited: &ParameterMap,
        depth: usize,
        acquisitions: &mut Vec<AcquireStep>,
    ) -> Result<(), FedqlError> {
        match body {
            SetExpr::Select(select) => {
                let planned =
                    self.plan_select(annotated, &**select, ctes, inherited, depth, acquisitions)?;
                **select = planned;
            }
            SetExpr::Query(query) => {
                let planned =
                    self.plan_query(annotated, &**query, ctes, inherited, depth, acquisitions)?;
                **query = planned;
            }
            SetExpr::SetOperation { left, right, .. } => {
                self.plan_set_expr(annotated, left, ctes, inherited, depth, acquisitions)?;
                self.plan_set_expr(annotated, right, ctes, inherited, depth, acquisitions)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// Plans the indirects of a scope first, handing each the enclosing
    /// WHERE parameters that may apply to it, then routes and plans the
    /// scope itself.
    fn plan_select(
        &mut self,
        annotated: &mut AnnotatedAst,
        select: &Select,
        ctes: &BTreeMap<String, Query>,
        inherited: &ParameterMap,
        depth: usize,
        acquisitions: &mut Vec<AcquireStep>,
    ) -> Result<Select, FedqlError> {
        let scope = IndirectScope {
            registry: self.registry,
            ctes,
            depth,
            max_depth: self.config.max_indirection_depth,
        };
        let analysis = analyze_select(annotated, select, inherited, &scope, self.default_provider())?;

        let mut indirect_rewrites = BTreeMap::new();
        for (table, indirect) in &analysis.tables.indirects {
            if indirect.kind == IndirectKind::Cte {
                continue;
            }
            let alias = analysis
                .tables
                .get(*table)
                .and_then(TableRef::effective_alias);
            let pushed = analysis.where_params.filter(|key, _| match key.alias() {
                None => true,
                Some(qualifier) => alias
                    .as_deref()
                    .is_some_and(|alias| alias.eq_ignore_ascii_case(qualifier)),
            });
            debug!(
                indirect = %indirect.name,
                kind = %indirect.kind,
                pushed = pushed.len(),
                "planning indirect"
            );
            let planned = self.plan_query(
                annotated,
                &indirect.query,
                ctes,
                &pushed,
                indirect.depth,
                acquisitions,
            )?;
            indirect_rewrites.insert(*table, planned);
        }

        let mut session = RoutingSession::new(self.registry, &analysis);
        session.route_all(SqlVerb::Select, None)?;
        let graph = collect_data_flow(&session, &self.config.dataflow)?;
        self.request_only.extend(session.request_only_references());

        let mut planner = DependencyPlanner::new(
            &self.config.dataflow,
            &self.drm,
            &self.armoury,
            self.counters,
        );
        planner.plan(
            &session,
            &graph,
            select,
            &indirect_rewrites,
            &self.request_only,
        )?;
        let (steps, rewritten, counters) = planner.into_parts();
        self.counters = counters;
        acquisitions.extend(steps);
        rewritten.ok_or_else(|| errors::internal_error("select scope produced no plan"))
    }

    /// Provider tables left in positions the planner does not rewrite, such
    /// as expression subqueries, cannot be read.
    fn ensure_fully_rewritten(&self, query: &Query) -> Result<(), FedqlError> {
        let remaining = collect_provider_strings(query, self.registry, self.default_provider());
        match remaining.into_iter().next() {
            Some(table) => Err(errors::unsupported_statement_error(format!(
                "provider table `{table}` is only supported in FROM clauses"
            ))),
            None => Ok(()),
        }
    }

    fn route_target(
        &self,
        annotated: &mut AnnotatedAst,
        select_id: SelectId,
        parts: Vec<String>,
        alias: Option<String>,
        params: ParameterMap,
        selection: Option<&Expr>,
        verb: SqlVerb,
        method_hint: Option<&str>,
    ) -> Result<Option<AnnotationCtx>, FedqlError> {
        let ctes = BTreeMap::new();
        let scope = IndirectScope {
            registry: self.registry,
            ctes: &ctes,
            depth: 0,
            max_depth: self.config.max_indirection_depth,
        };
        let analysis = analyze_dml_target(
            annotated,
            select_id,
            parts,
            alias,
            params,
            selection,
            &scope,
            self.default_provider(),
        )?;
        let Some(table) = analysis.provider_tables().next().cloned() else {
            return Ok(None);
        };
        let mut session = RoutingSession::new(self.registry, &analysis);
        let ctx = session.route(&table, verb, method_hint)?;
        if matches!(verb, SqlVerb::Update | SqlVerb::Delete) {
            if let Some(selection) = selection {
                reject_unconsumed_conjuncts(&ctx, selection, &analysis.where_conjuncts)?;
            }
        }
        Ok(Some(ctx))
    }

    fn plan_insert(
        &mut self,
        annotated: &mut AnnotatedAst,
        statement: &Statement,
        parts: Vec<String>,
        columns: &[Ident],
        source: Option<&Query>,
    ) -> Result<PrimitiveBuilder, FedqlError> {
        if provider_identifiers(&parts, self.registry, self.default_provider()).is_none() {
            return self.plan_local_insert(annotated, statement, source);
        }
        if columns.is_empty() {
            return Err(errors::unsupported_statement_error(
                "INSERT into a provider table needs a column list",
            ));
        }
        let Some(source) = source else {
            return Err(errors::unsupported_statement_error(
                "INSERT into a provider table needs VALUES or a query",
            ));
        };

        let select_id = annotated.register_select(0);
        let params = extract_insert_params(annotated, columns);
        let Some(ctx) = self.route_target(
            annotated,
            select_id,
            parts,
            None,
            params,
            None,
            SqlVerb::Insert,
            None,
        )?
        else {
            return self.plan_local_insert(annotated, statement, Some(source));
        };
        let names = columns
            .iter()
            .map(|column| column.value.clone())
            .collect::<Vec<_>>();

        if let SetExpr::Values(values) = source.body.as_ref() {
            let mut rows = Vec::with_capacity(values.rows.len());
            for row in &values.rows {
                rows.push(values_row(&names, row)?);
            }
            return self.prepared_mutation(SqlVerb::Insert, &ctx, Some((names.as_slice(), rows)));
        }

        let supplied = names.iter().cloned().collect::<BTreeSet<_>>();
        check_required(&ctx, &supplied)?;
        let mut acquisitions = Vec::new();
        let planned = self.plan_query(
            annotated,
            source,
            &BTreeMap::new(),
            &ParameterMap::new(),
            0,
            &mut acquisitions,
        )?;
        self.ensure_fully_rewritten(&planned)?;
        let query_root =
            PrimitiveBuilder::acquire_and_select(acquisitions, planned.to_string(), self.counters);
        Ok(PrimitiveBuilder::Mutation(DmlStep {
            verb: SqlVerb::Insert,
            table: ctx.hierarchy().identifiers().table_name(),
            hierarchy: ctx.hierarchy().clone(),
            rows: DmlRows::FromQuery {
                source: Box::new(query_root),
                columns: names,
                static_params: ctx.static_parameters(),
            },
        }))
    }

    /// INSERT into a staging table, possibly selecting from provider
    /// tables: the source query is planned and the rewritten statement
    /// runs after the acquisitions.
    fn plan_local_insert(
        &mut self,
        annotated: &mut AnnotatedAst,
        statement: &Statement,
        source: Option<&Query>,
    ) -> Result<PrimitiveBuilder, FedqlError> {
        let Statement::Insert(insert) = statement else {
            return Ok(PrimitiveBuilder::Passthrough {
                sql: statement.to_string(),
            });
        };
        let Some(source) = source else {
            return Ok(PrimitiveBuilder::Passthrough {
                sql: statement.to_string(),
            });
        };
        let mut acquisitions = Vec::new();
        let planned = self.plan_query(
            annotated,
            source,
            &BTreeMap::new(),
            &ParameterMap::new(),
            0,
            &mut acquisitions,
        )?;
        self.ensure_fully_rewritten(&planned)?;
        let mut rewritten = insert.clone();
        rewritten.source = Some(Box::new(planned));
        Ok(PrimitiveBuilder::acquire_and_select(
            acquisitions,
            Statement::Insert(rewritten).to_string(),
            self.counters,
        ))
    }

    /// A mutation whose requests are all known at plan time. Explicit
    /// `rows` (INSERT VALUES) are crossed with the constant parameters;
    /// otherwise the constants alone are expanded.
    fn prepared_mutation(
        &self,
        verb: SqlVerb,
        ctx: &AnnotationCtx,
        rows: Option<(&[String], Vec<ParameterRow>)>,
    ) -> Result<PrimitiveBuilder, FedqlError> {
        let static_params = ctx.static_parameters();
        let mut supplied = static_params.keys().cloned().collect::<BTreeSet<_>>();
        let base = expand_parameter_rows(&static_params);
        let rows = match rows {
            Some((names, rows)) => {
                supplied.extend(names.iter().cloned());
                super::armoury::cross_rows(&base, &rows)
            }
            None => base,
        };
        check_required(ctx, &supplied)?;
        let armoury = self.armoury.build(ctx.hierarchy(), &rows)?;
        Ok(PrimitiveBuilder::Mutation(DmlStep {
            verb,
            table: ctx.hierarchy().identifiers().table_name(),
            hierarchy: ctx.hierarchy().clone(),
            rows: DmlRows::Prepared(armoury),
        }))
    }

    fn describe(
        &self,
        table: &str,
        identifiers: &crate::taxonomy::HierarchyIdentifiers,
    ) -> Result<QueryResult, FedqlError> {
        let resource = self
            .registry
            .provider(&identifiers.provider)
            .and_then(|provider| provider.services.get(&identifiers.service))
            .and_then(|service| service.resources.get(&identifiers.resource))
            .ok_or_else(|| {
                errors::unresolvable_hierarchy_error(table, "resource is not registered")
            })?;
        let rows = resource
            .methods
            .iter()
            .map(|method| {
                vec![
                    Value::Text(method.name.clone()),
                    Value::Text(method.sql_verb.as_str().to_string()),
                    Value::Text(method.http_method.clone()),
                    Value::Text(method.path.clone()),
                    Value::Text(method.required_params.join(", ")),
                    Value::Text(method.optional_params.join(", ")),
                ]
            })
            .collect();
        Ok(QueryResult {
            columns: [
                "name",
                "sql_verb",
                "http_method",
                "path",
                "required_params",
                "optional_params",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            rows,
        })
    }

    fn show_tables(&self) -> QueryResult {
        let mut rows = Vec::new();
        for name in self.registry.provider_names() {
            let Some(provider) = self.registry.provider(&name) else {
                continue;
            };
            for (service_name, service) in &provider.services {
                for resource_name in service.resources.keys() {
                    rows.push(vec![Value::Text(format!(
                        "{}.{service_name}.{resource_name}",
                        provider.name
                    ))]);
                }
            }
        }
        QueryResult {
            columns: vec!["name".to_string()],
            rows,
        }
    }
}

fn check_required(ctx: &AnnotationCtx, supplied: &BTreeSet<String>) -> Result<(), FedqlError> {
    let missing = missing_required_params(ctx.hierarchy(), supplied);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(errors::missing_required_parameter_error(
            &ctx.hierarchy().identifiers().table_name(),
            &missing,
        ))
    }
}

/// A mutation only addresses what its request carries, so a WHERE conjunct
/// the method does not take would otherwise be ignored.
fn reject_unconsumed_conjuncts(
    ctx: &AnnotationCtx,
    selection: &Expr,
    conjunct_refs: &[Vec<ReferenceId>],
) -> Result<(), FedqlError> {
    let consumed = ctx
        .parameters()
        .params()
        .keys()
        .map(|key| key.id())
        .collect::<HashSet<_>>();
    for (index, conjunct) in split_conjuncts(selection).into_iter().enumerate() {
        let refs = conjunct_refs.get(index).map(Vec::as_slice).unwrap_or_default();
        if refs.is_empty() || !refs.iter().all(|reference| consumed.contains(reference)) {
            return Err(errors::unsupported_statement_error(format!(
                "`{}` cannot filter `{conjunct}`; method `{}` does not take it as a parameter",
                ctx.hierarchy().identifiers().table_name(),
                ctx.hierarchy().method().name
            )));
        }
    }
    Ok(())
}

fn single_table(table: &TableWithJoins) -> Option<(Vec<String>, Option<String>)> {
    if !table.joins.is_empty() {
        return None;
    }
    match &table.relation {
        TableFactor::Table { name, alias, .. } => Some((
            object_name_parts(name),
            alias.as_ref().map(|alias| alias.name.value.clone()),
        )),
        _ => None,
    }
}

fn values_row(names: &[String], row: &[Expr]) -> Result<ParameterRow, FedqlError> {
    if row.len() != names.len() {
        return Err(errors::sql_parse_error(format!(
            "VALUES row has {} values for {} columns",
            row.len(),
            names.len()
        )));
    }
    names
        .iter()
        .zip(row)
        .map(|(name, expr)| {
            expr_to_engine_value(expr)
                .map(|value| (name.clone(), value))
                .ok_or_else(|| {
                    errors::unsupported_statement_error(format!(
                        "value `{expr}` for `{name}` is not a constant"
                    ))
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::RoutePass;
    use crate::config::EngineConfig;
    use crate::errors::ErrorCode;
    use crate::planner::{
        AcquireInput, ArmourySource, DmlRows, PrimitiveBuilder, TxnControlCounters,
    };
    use crate::sql::parse_statements;
    use crate::test_support::cloud_registry;
    use crate::Value;

    fn plan(sql: &str) -> Result<PrimitiveBuilder, crate::FedqlError> {
        plan_with(sql, &EngineConfig::default())
    }

    fn plan_with(sql: &str, config: &EngineConfig) -> Result<PrimitiveBuilder, crate::FedqlError> {
        let registry = cloud_registry();
        let mut pass = RoutePass::new(&registry, config, TxnControlCounters::new(1, 1));
        let statement = parse_statements(sql)?.remove(0);
        pass.plan_statement(&statement).map(|routed| routed.root)
    }

    fn select_sql(builder: &PrimitiveBuilder) -> &str {
        match builder {
            PrimitiveBuilder::DependentMultiAcquireAndSelect { select, .. } => select.sql(),
            other => panic!("expected acquire and select, got {other:?}"),
        }
    }

    #[test]
    fn derived_tables_receive_outer_parameters() {
        let builder = plan(
            "SELECT s.label FROM (SELECT * FROM cloud.org.children) s WHERE s.parent_id = 7",
        )
        .unwrap();
        let acquisitions = builder.acquisitions();
        assert_eq!(acquisitions.len(), 1);
        let ArmourySource::Prepared(armoury) = &acquisitions[0].armoury else {
            panic!("constant parameters are prepared");
        };
        assert_eq!(armoury.requests[0].path, "/parents/7/children");
        assert!(select_sql(&builder).contains("fedql_stage_cloud_org_children_list"));
    }

    #[test]
    fn views_expand_into_their_definition() {
        let registry = cloud_registry()
            .with_view("named_parents", "SELECT id, name FROM cloud.org.parents");
        let config = EngineConfig::default();
        let mut pass = RoutePass::new(&registry, &config, TxnControlCounters::new(1, 1));
        let statement = parse_statements("SELECT * FROM named_parents WHERE name = 'x'")
            .unwrap()
            .remove(0);
        let routed = pass.plan_statement(&statement).unwrap();
        assert_eq!(routed.root.acquisitions().len(), 1);
        let ArmourySource::Prepared(armoury) = &routed.root.acquisitions()[0].armoury else {
            panic!("prepared");
        };
        assert_eq!(
            armoury.requests[0].query.get("name").map(String::as_str),
            Some("x")
        );
        assert!(select_sql(&routed.root).contains("AS named_parents"));
    }

    #[test]
    fn self_referencing_view_hits_the_depth_limit() {
        let registry = cloud_registry().with_view("loop_v", "SELECT * FROM loop_v");
        let config = EngineConfig::default();
        let mut pass = RoutePass::new(&registry, &config, TxnControlCounters::new(1, 1));
        let statement = parse_statements("SELECT * FROM loop_v").unwrap().remove(0);
        let error = pass
            .plan_statement(&statement)
            .expect_err("the view expands into itself");
        assert_eq!(error.code, ErrorCode::IndirectionTooDeep);
        assert!(error.description.contains("loop_v"), "{error}");
    }

    #[test]
    fn cte_bodies_are_planned_in_place() {
        let builder = plan(
            "WITH p AS (SELECT * FROM cloud.org.parents WHERE id = 3) SELECT name FROM p",
        )
        .unwrap();
        assert_eq!(builder.acquisitions().len(), 1);
        let sql = select_sql(&builder);
        assert!(sql.starts_with("WITH p AS (SELECT * FROM (SELECT"));
        assert!(sql.ends_with("SELECT name FROM p"));
    }

    #[test]
    fn union_arms_draw_distinct_insert_ids() {
        let builder = plan(
            "SELECT name FROM cloud.org.parents WHERE id = 1 \
             UNION ALL SELECT name FROM cloud.org.parents WHERE id = 2",
        )
        .unwrap();
        let ids = builder
            .acquisitions()
            .iter()
            .map(|step| step.insert_ctx().unwrap().counters().insert_id)
            .collect::<Vec<_>>();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn join_scenario_feeds_the_dependent_table() {
        let builder = plan(
            "SELECT a.name, b.label FROM cloud.org.parents a \
             JOIN cloud.org.children b ON b.parent_id = a.id WHERE a.name = 'x'",
        )
        .unwrap();
        assert!(matches!(
            builder.acquisitions()[1].input,
            AcquireInput::Projected { .. }
        ));
        let explain = builder.explain();
        assert!(explain.contains("input tbl#0 {id->parent_id}"), "{explain}");
    }

    #[test]
    fn insert_values_become_one_request_per_row() {
        let builder = plan(
            "INSERT INTO cloud.compute.instances (project, zone, name) \
             VALUES ('p', 'z', 'a'), ('p', 'z', 'b')",
        )
        .unwrap();
        let PrimitiveBuilder::Mutation(step) = builder else {
            panic!("expected mutation");
        };
        assert_eq!(step.hierarchy.method().name, "insert");
        let DmlRows::Prepared(armoury) = step.rows else {
            panic!("values are prepared");
        };
        assert_eq!(armoury.len(), 2);
        assert_eq!(armoury.requests[1].body, Some(serde_json::json!({"name": "b"})));
    }

    #[test]
    fn insert_from_query_plans_the_source() {
        let builder = plan(
            "INSERT INTO cloud.compute.instances (project, zone, name) \
             SELECT 'p', 'z', name FROM cloud.org.parents",
        )
        .unwrap();
        let PrimitiveBuilder::Mutation(step) = builder else {
            panic!("expected mutation");
        };
        let DmlRows::FromQuery { source, columns, .. } = step.rows else {
            panic!("rows come from the query");
        };
        assert_eq!(columns, vec!["project", "zone", "name"]);
        assert_eq!(source.acquisitions().len(), 1);
    }

    #[test]
    fn update_and_delete_route_to_their_methods() {
        let update = plan(
            "UPDATE cloud.compute.instances SET status = 'stopped' \
             WHERE project = 'p' AND zone = 'z' AND id = 4",
        )
        .unwrap();
        let PrimitiveBuilder::Mutation(step) = update else {
            panic!("expected mutation");
        };
        assert_eq!(step.hierarchy.method().name, "patch");
        let DmlRows::Prepared(armoury) = &step.rows else {
            panic!("prepared");
        };
        assert_eq!(armoury.requests[0].path, "/projects/p/zones/z/instances/4");
        assert_eq!(
            armoury.requests[0].body,
            Some(serde_json::json!({"status": "stopped"}))
        );

        let delete = plan(
            "DELETE FROM cloud.compute.instances WHERE project = 'p' AND zone = 'z' AND id IN (1, 2)",
        )
        .unwrap();
        let PrimitiveBuilder::Mutation(step) = delete else {
            panic!("expected mutation");
        };
        let DmlRows::Prepared(armoury) = &step.rows else {
            panic!("prepared");
        };
        assert_eq!(armoury.len(), 2);
        assert_eq!(armoury.requests[0].method, "DELETE");
    }

    #[test]
    fn mutations_reject_filters_the_method_cannot_take() {
        for sql in [
            "DELETE FROM cloud.compute.instances \
             WHERE project = 'p' AND zone = 'z' AND id = 1 AND status = 'running'",
            "UPDATE cloud.compute.instances SET status = 'stopped' \
             WHERE project = 'p' AND zone = 'z' AND id = 4 AND name LIKE 'web%'",
        ] {
            let error = plan(sql).expect_err(sql);
            assert_eq!(error.code, ErrorCode::UnsupportedStatement, "{sql}");
        }
    }

    #[test]
    fn call_names_the_method() {
        let builder = plan(
            "CALL cloud.compute.instances.stop(project => 'p', zone => 'z', id => 9)",
        )
        .unwrap();
        let PrimitiveBuilder::Mutation(step) = builder else {
            panic!("expected mutation");
        };
        assert_eq!(step.hierarchy.method().name, "stop");
        let DmlRows::Prepared(armoury) = &step.rows else {
            panic!("prepared");
        };
        assert_eq!(armoury.requests[0].path, "/projects/p/zones/z/instances/9/stop");
        assert_eq!(
            armoury.requests[0].parameters.get("id"),
            Some(&Value::Integer(9))
        );
    }

    #[test]
    fn describe_and_show_list_the_registry() {
        let PrimitiveBuilder::Describe { result, .. } = plan("DESCRIBE cloud.org.parents").unwrap()
        else {
            panic!("expected describe");
        };
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.columns[0], "name");

        let PrimitiveBuilder::Show { result } = plan("SHOW TABLES").unwrap() else {
            panic!("expected show");
        };
        assert_eq!(result.rows.len(), 3);
    }

    #[test]
    fn local_statements_pass_through() {
        let builder = plan("SELECT * FROM local_t WHERE a = 1").unwrap();
        assert!(matches!(builder, PrimitiveBuilder::Passthrough { .. }));
        let builder = plan("CREATE TABLE local_t (a INTEGER)").unwrap();
        assert!(matches!(builder, PrimitiveBuilder::Passthrough { .. }));
    }

    #[test]
    fn provider_tables_in_expression_subqueries_are_rejected() {
        let error = plan(
            "SELECT * FROM local_t WHERE a IN (SELECT id FROM cloud.org.parents)",
        )
        .expect_err("expression subqueries are not rewritten");
        assert_eq!(error.code, ErrorCode::UnsupportedStatement);
    }

    #[test]
    fn nesting_past_the_limit_fails() {
        let config = EngineConfig {
            max_indirection_depth: 1,
            ..EngineConfig::default()
        };
        let error = plan_with(
            "SELECT * FROM (SELECT * FROM (SELECT * FROM cloud.org.parents) x) y",
            &config,
        )
        .expect_err("two levels of nesting");
        assert_eq!(error.code, ErrorCode::IndirectionTooDeep);
    }
}

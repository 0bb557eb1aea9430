//! Runs planned primitives against a staging store and a remote transport.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info};

use crate::backend::{RemoteAcquirer, StagingBackend};
use crate::errors;
use crate::ids::TableExprId;
use crate::planner::{
    cross_rows, expand_parameter_rows, AcquireInput, AcquireOutput, AcquireStep, ArmouryBuilder,
    ArmourySource, DmlRows, DmlStep, PrimitiveBuilder,
};
use crate::types::ParameterRow;
use crate::{FedqlError, QueryResult, Value};

pub struct PlanExecutor<'a> {
    staging: &'a dyn StagingBackend,
    remote: &'a dyn RemoteAcquirer,
    armoury: &'a dyn ArmouryBuilder,
}

impl<'a> PlanExecutor<'a> {
    pub fn new(
        staging: &'a dyn StagingBackend,
        remote: &'a dyn RemoteAcquirer,
        armoury: &'a dyn ArmouryBuilder,
    ) -> Self {
        Self {
            staging,
            remote,
            armoury,
        }
    }

    pub async fn execute(&self, root: &PrimitiveBuilder) -> Result<QueryResult, FedqlError> {
        match root {
            PrimitiveBuilder::Mutation(step) => self.execute_mutation(step).await,
            other => self.execute_query(other).await,
        }
    }

    async fn execute_query(&self, root: &PrimitiveBuilder) -> Result<QueryResult, FedqlError> {
        match root {
            PrimitiveBuilder::DependentMultiAcquireAndSelect {
                acquisitions,
                select,
            } => {
                let mut projections = BTreeMap::new();
                for step in acquisitions {
                    let staged = self.acquire(step, &projections).await?;
                    if step.output == AcquireOutput::Projection {
                        projections.insert(step.table(), staged);
                    }
                }
                self.staging.execute(select.sql(), &[]).await
            }
            PrimitiveBuilder::Describe { result, .. } | PrimitiveBuilder::Show { result } => {
                Ok(result.clone())
            }
            PrimitiveBuilder::Passthrough { sql } => self.staging.execute(sql, &[]).await,
            PrimitiveBuilder::Mutation(step) => Err(errors::internal_error(format!(
                "`{}` mutation cannot feed another statement",
                step.table
            ))),
        }
    }

    /// Stages the rows of one acquisition and returns them keyed by column.
    async fn acquire(
        &self,
        step: &AcquireStep,
        projections: &BTreeMap<TableExprId, Vec<ParameterRow>>,
    ) -> Result<Vec<ParameterRow>, FedqlError> {
        let Some(insert) = step.insert_ctx() else {
            return Err(errors::internal_error(format!(
                "`{}` has no staging insert",
                step.name
            )));
        };
        self.staging.execute(&step.ddl, &[]).await?;

        let requests = match &step.armoury {
            ArmourySource::Prepared(armoury) => armoury.requests.clone(),
            ArmourySource::Deferred { static_params } => {
                let rows = projected_rows(step, static_params, projections);
                self.armoury.build(step.hierarchy(), &rows)?.requests
            }
        };
        debug!(table = %step.name, requests = requests.len(), "acquiring");

        let counters = insert.counters().values();
        let mut staged = Vec::new();
        for request in &requests {
            debug!(method = %request.method, path = %request.path, "remote request");
            for item in self.remote.acquire(request).await? {
                let row = insert
                    .columns()
                    .iter()
                    .map(|column| {
                        let value = item
                            .get(column)
                            .or_else(|| request.parameters.get(column))
                            .cloned()
                            .unwrap_or(Value::Null);
                        (column.clone(), value)
                    })
                    .collect::<ParameterRow>();
                let mut params = insert
                    .columns()
                    .iter()
                    .map(|column| row.get(column).cloned().unwrap_or(Value::Null))
                    .collect::<Vec<_>>();
                params.extend(counters.iter().cloned());
                self.staging.execute(insert.sql(), &params).await?;
                staged.push(row);
            }
        }
        info!(table = %step.name, rows = staged.len(), "staged remote rows");
        Ok(staged)
    }

    async fn execute_mutation(&self, step: &DmlStep) -> Result<QueryResult, FedqlError> {
        let requests = match &step.rows {
            DmlRows::Prepared(armoury) => armoury.requests.clone(),
            DmlRows::FromQuery {
                source,
                columns,
                static_params,
            } => {
                let result = self.execute_query(source).await?;
                let rows = result
                    .rows
                    .iter()
                    .map(|row| {
                        columns
                            .iter()
                            .cloned()
                            .zip(row.iter().cloned())
                            .collect::<ParameterRow>()
                    })
                    .collect::<Vec<_>>();
                let rows = cross_rows(&expand_parameter_rows(static_params), &rows);
                self.armoury.build(&step.hierarchy, &rows)?.requests
            }
        };
        info!(
            table = %step.table,
            verb = %step.verb,
            requests = requests.len(),
            "sending mutation"
        );
        let mut items = Vec::new();
        for request in &requests {
            items.extend(self.remote.acquire(request).await?);
        }
        Ok(items_to_result(items))
    }
}

/// One parameter row per distinct combination of projected join keys,
/// merged with the step's constant parameters. Rows with a NULL key are
/// skipped since they can never satisfy the join.
fn projected_rows(
    step: &AcquireStep,
    static_params: &BTreeMap<String, Vec<Value>>,
    projections: &BTreeMap<TableExprId, Vec<ParameterRow>>,
) -> Vec<ParameterRow> {
    let mut rows = expand_parameter_rows(static_params);
    let AcquireInput::Projected { feeds } = &step.input else {
        return rows;
    };
    for feed in feeds {
        let mut keys: Vec<ParameterRow> = Vec::new();
        for source in projections.get(&feed.from).into_iter().flatten() {
            let key = feed
                .mapping
                .iter()
                .map(|(from, to)| {
                    (
                        to.clone(),
                        source.get(from).cloned().unwrap_or(Value::Null),
                    )
                })
                .collect::<ParameterRow>();
            if key.values().any(Value::is_null) || keys.contains(&key) {
                continue;
            }
            keys.push(key);
        }
        rows = cross_rows(&rows, &keys);
    }
    rows
}

fn items_to_result(items: Vec<ParameterRow>) -> QueryResult {
    let columns = items
        .iter()
        .flat_map(|item| item.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect::<Vec<_>>();
    let rows = items
        .iter()
        .map(|item| {
            columns
                .iter()
                .map(|column| item.get(column).cloned().unwrap_or(Value::Null))
                .collect()
        })
        .collect();
    QueryResult { columns, rows }
}

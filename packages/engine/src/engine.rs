use std::collections::BTreeSet;
use std::sync::atomic::{AtomicI64, Ordering};

use tracing::{debug, info};

use crate::backend::{RemoteAcquirer, StagingBackend};
use crate::config::EngineConfig;
use crate::errors;
use crate::execution::PlanExecutor;
use crate::planner::{PrimitiveBuilder, RoutePass, TemplateArmouryBuilder, TxnControlCounters};
use crate::sql::{inline_placeholders, parse_statements};
use crate::taxonomy::ProviderRegistry;
use crate::{FedqlError, QueryResult, Value};

pub struct OpenEngineConfig {
    pub config: EngineConfig,
    pub registry: Box<dyn ProviderRegistry + Send + Sync>,
}

/// Plan of one statement of a script.
#[derive(Debug, Clone, PartialEq)]
pub struct StatementPlan {
    /// The statement with placeholders inlined.
    pub sql: String,
    /// `provider.service.resource` names the statement references.
    pub providers: BTreeSet<String>,
    pub root: PrimitiveBuilder,
}

pub struct Engine {
    config: EngineConfig,
    registry: Box<dyn ProviderRegistry + Send + Sync>,
    generation: AtomicI64,
}

pub async fn open_engine(config: OpenEngineConfig) -> Result<Engine, FedqlError> {
    config.config.validate()?;
    info!(
        providers = ?config.registry.provider_names(),
        dialect = ?config.config.dialect,
        "engine opened"
    );
    Ok(Engine {
        config: config.config,
        registry: config.registry,
        generation: AtomicI64::new(0),
    })
}

impl Engine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn registry(&self) -> &dyn ProviderRegistry {
        self.registry.as_ref()
    }

    /// Plans every statement of `sql`. Each call opens a new generation so
    /// rows staged by earlier calls are never read back.
    pub fn plan(&self, sql: &str, params: &[Value]) -> Result<Vec<StatementPlan>, FedqlError> {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let statements = parse_statements(sql)?;
        let mut plans = Vec::with_capacity(statements.len());
        for (index, mut statement) in statements.into_iter().enumerate() {
            inline_placeholders(&mut statement, params)?;
            let txn_id = i64::try_from(index + 1)
                .map_err(|_| errors::internal_error("too many statements in one script"))?;
            let mut pass = RoutePass::new(
                self.registry.as_ref(),
                &self.config,
                TxnControlCounters::new(generation, txn_id),
            );
            let routed = pass.plan_statement(&statement)?;
            debug!(generation, txn_id, providers = ?routed.providers, "statement planned");
            plans.push(StatementPlan {
                sql: statement.to_string(),
                providers: routed.providers,
                root: routed.root,
            });
        }
        Ok(plans)
    }

    /// Plans and runs `sql`, returning one result per statement.
    pub async fn execute(
        &self,
        sql: &str,
        params: &[Value],
        staging: &dyn StagingBackend,
        remote: &dyn RemoteAcquirer,
    ) -> Result<Vec<QueryResult>, FedqlError> {
        if staging.dialect() != self.config.dialect {
            return Err(errors::invalid_config_error(format!(
                "staging backend speaks {:?} but the engine is configured for {:?}",
                staging.dialect(),
                self.config.dialect
            )));
        }
        let plans = self.plan(sql, params)?;
        let executor = PlanExecutor::new(staging, remote, &TemplateArmouryBuilder);
        let mut results = Vec::with_capacity(plans.len());
        for plan in &plans {
            results.push(executor.execute(&plan.root).await?);
        }
        Ok(results)
    }
}

use std::collections::{BTreeMap, BTreeSet};

use super::hierarchy::Hierarchy;
use crate::ids::TableExprId;
use crate::parameters::TableParameterCoupling;
use crate::planner::PreparedStatementCtx;
use crate::Value;

/// Routing outcome for one table expression: the resolved method and the
/// parameters its call consumes.
#[derive(Debug, Clone)]
pub struct AnnotationCtx {
    table: TableExprId,
    hierarchy: Hierarchy,
    parameters: TableParameterCoupling,
    insert_ctx: Option<PreparedStatementCtx>,
}

impl AnnotationCtx {
    pub fn new(table: TableExprId, hierarchy: Hierarchy, parameters: TableParameterCoupling) -> Self {
        Self {
            table,
            hierarchy,
            parameters,
            insert_ctx: None,
        }
    }

    pub fn table(&self) -> TableExprId {
        self.table
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        &self.hierarchy
    }

    pub fn parameters(&self) -> &TableParameterCoupling {
        &self.parameters
    }

    pub fn consumed_names(&self) -> BTreeSet<String> {
        self.parameters.names()
    }

    /// Consumed parameters whose values are known at plan time.
    pub fn static_parameters(&self) -> BTreeMap<String, Vec<Value>> {
        self.parameters
            .abbreviate_map()
            .into_iter()
            .filter_map(|(name, metadata)| {
                metadata
                    .value()
                    .and_then(|value| value.constants())
                    .map(|values| (name, values))
            })
            .collect()
    }

    pub fn insert_ctx(&self) -> Option<&PreparedStatementCtx> {
        self.insert_ctx.as_ref()
    }

    pub(crate) fn set_insert_ctx(&mut self, ctx: PreparedStatementCtx) {
        self.insert_ctx = Some(ctx);
    }
}

use std::collections::BTreeMap;

use sqlparser::ast::{Query, TableFactor};
use tracing::warn;

use super::annotated_ast::{Indirect, IndirectKind};
use crate::errors;
use crate::sql::{object_name_parts, parse_single_query};
use crate::taxonomy::ProviderRegistry;
use crate::FedqlError;

/// Names and limits visible while classifying the tables of one scope.
pub(crate) struct IndirectScope<'a> {
    pub registry: &'a dyn ProviderRegistry,
    /// CTEs in scope, keyed by lowercased name.
    pub ctes: &'a BTreeMap<String, Query>,
    pub depth: usize,
    pub max_depth: usize,
}

impl IndirectScope<'_> {
    fn nested(&self, kind: IndirectKind, name: String, query: Query) -> Result<Indirect, FedqlError> {
        let depth = self.depth + 1;
        if depth > self.max_depth {
            return Err(errors::indirection_too_deep_error(&name, self.max_depth));
        }
        Ok(Indirect {
            kind,
            name,
            query,
            depth,
        })
    }
}

/// Returns the indirect a table factor stands for: a derived table, a CTE
/// reference or a registered view. Anything else is `None`.
pub(crate) fn expand_indirect(
    factor: &TableFactor,
    scope: &IndirectScope<'_>,
) -> Result<Option<Indirect>, FedqlError> {
    match factor {
        TableFactor::Derived {
            subquery, alias, ..
        } => {
            let name = alias
                .as_ref()
                .map(|alias| alias.name.value.clone())
                .unwrap_or_else(|| "subquery".to_string());
            scope
                .nested(IndirectKind::Subquery, name, (**subquery).clone())
                .map(Some)
        }
        TableFactor::Table { name, .. } => {
            let parts = object_name_parts(name);
            let joined = parts.join(".");
            if let [single] = parts.as_slice() {
                if let Some(query) = scope.ctes.get(&single.to_ascii_lowercase()) {
                    return scope
                        .nested(IndirectKind::Cte, single.clone(), query.clone())
                        .map(Some);
                }
            }
            let Some(definition) = scope.registry.view_definition(&joined) else {
                return Ok(None);
            };
            match parse_single_query(definition) {
                Ok(query) => scope.nested(IndirectKind::View, joined, query).map(Some),
                Err(error) => {
                    warn!(view = %joined, error = %error, "view definition does not parse, treating as table");
                    Ok(None)
                }
            }
        }
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use sqlparser::ast::{SetExpr, TableFactor};

    use super::{expand_indirect, IndirectScope};
    use crate::analysis::IndirectKind;
    use crate::errors::ErrorCode;
    use crate::sql::parse_single_query;
    use crate::taxonomy::StaticProviderRegistry;

    fn first_factor(sql: &str) -> TableFactor {
        let query = parse_single_query(sql).expect("parse");
        let SetExpr::Select(select) = *query.body else {
            panic!("expected select");
        };
        select.from[0].relation.clone()
    }

    #[test]
    fn views_and_derived_tables_are_indirect() {
        let registry = StaticProviderRegistry::new()
            .with_view("running", "SELECT id FROM cloud.compute.instances")
            .with_view("broken", "SELEC nonsense");
        let ctes = BTreeMap::new();
        let scope = IndirectScope {
            registry: &registry,
            ctes: &ctes,
            depth: 0,
            max_depth: 8,
        };

        let view = expand_indirect(&first_factor("SELECT * FROM running"), &scope)
            .unwrap()
            .expect("running is a view");
        assert_eq!(view.kind, IndirectKind::View);
        assert_eq!(view.depth, 1);

        let derived = expand_indirect(&first_factor("SELECT * FROM (SELECT 1) AS d"), &scope)
            .unwrap()
            .expect("derived table");
        assert_eq!(derived.kind, IndirectKind::Subquery);
        assert_eq!(derived.name, "d");

        assert!(expand_indirect(&first_factor("SELECT * FROM broken"), &scope)
            .unwrap()
            .is_none());
        assert!(expand_indirect(&first_factor("SELECT * FROM plain"), &scope)
            .unwrap()
            .is_none());
    }

    #[test]
    fn depth_cap_is_enforced() {
        let registry = StaticProviderRegistry::new().with_view("v", "SELECT 1");
        let ctes = BTreeMap::new();
        let scope = IndirectScope {
            registry: &registry,
            ctes: &ctes,
            depth: 2,
            max_depth: 2,
        };
        let error = expand_indirect(&first_factor("SELECT * FROM v"), &scope)
            .expect_err("third level exceeds the cap");
        assert_eq!(error.code, ErrorCode::IndirectionTooDeep);
    }

    #[test]
    fn cte_references_resolve_by_name() {
        let registry = StaticProviderRegistry::new();
        let mut ctes = BTreeMap::new();
        ctes.insert("recent".to_string(), parse_single_query("SELECT 1 AS x").unwrap());
        let scope = IndirectScope {
            registry: &registry,
            ctes: &ctes,
            depth: 0,
            max_depth: 8,
        };
        let cte = expand_indirect(&first_factor("SELECT * FROM Recent"), &scope)
            .unwrap()
            .expect("cte reference");
        assert_eq!(cte.kind, IndirectKind::Cte);
    }
}

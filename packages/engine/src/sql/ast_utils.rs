use sqlparser::ast::{
    BinaryOperator, Expr, Ident, ObjectName, ObjectNamePart, Query, Select, Statement, TableAlias,
    TableFactor,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use crate::errors;
use crate::FedqlError;

pub(crate) fn parse_statements(sql: &str) -> Result<Vec<Statement>, FedqlError> {
    Parser::parse_sql(&GenericDialect {}, sql).map_err(errors::sql_parse_error)
}

pub(crate) fn parse_single_query(sql: &str) -> Result<Query, FedqlError> {
    let mut statements = parse_statements(sql)?;
    if statements.len() != 1 {
        return Err(errors::sql_parse_error(
            "expected a single SELECT statement",
        ));
    }
    match statements.remove(0) {
        Statement::Query(query) => Ok(*query),
        _ => Err(errors::sql_parse_error("expected SELECT statement")),
    }
}

pub(crate) fn object_name_parts(name: &ObjectName) -> Vec<String> {
    name.0
        .iter()
        .filter_map(ObjectNamePart::as_ident)
        .map(|ident| ident.value.clone())
        .collect()
}

pub(crate) fn default_alias(name: &str) -> TableAlias {
    TableAlias {
        explicit: true,
        name: Ident::new(name),
        columns: Vec::new(),
    }
}

pub(crate) fn quote_ident(value: &str) -> String {
    format!("\"{}\"", value.replace('"', "\"\""))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RewriteDecision {
    Changed,
    Unchanged,
}

impl RewriteDecision {
    fn merge(self, other: Self) -> Self {
        if self == Self::Changed || other == Self::Changed {
            Self::Changed
        } else {
            Self::Unchanged
        }
    }
}

/// Visits every table factor of a SELECT's FROM clause in source order,
/// descending into parenthesised joins. Both this and
/// [`rewrite_table_factors_in_select`] use the same order, so positions
/// recorded by one can be replayed by the other.
pub(crate) fn visit_table_factors_in_select(
    select: &Select,
    visit_table_factor: &mut dyn FnMut(&TableFactor) -> Result<(), FedqlError>,
) -> Result<(), FedqlError> {
    for table in &select.from {
        visit_table_factor_in_place(&table.relation, visit_table_factor)?;
        for join in &table.joins {
            visit_table_factor_in_place(&join.relation, visit_table_factor)?;
        }
    }
    Ok(())
}

pub(crate) fn rewrite_table_factors_in_select(
    select: &mut Select,
    rewrite_table_factor: &mut dyn FnMut(&mut TableFactor) -> Result<RewriteDecision, FedqlError>,
) -> Result<RewriteDecision, FedqlError> {
    let mut decision = RewriteDecision::Unchanged;
    for table in &mut select.from {
        decision = decision.merge(rewrite_table_factor_in_place(
            &mut table.relation,
            rewrite_table_factor,
        )?);
        for join in &mut table.joins {
            decision = decision.merge(rewrite_table_factor_in_place(
                &mut join.relation,
                rewrite_table_factor,
            )?);
        }
    }
    Ok(decision)
}

fn rewrite_table_factor_in_place(
    relation: &mut TableFactor,
    rewrite_table_factor: &mut dyn FnMut(&mut TableFactor) -> Result<RewriteDecision, FedqlError>,
) -> Result<RewriteDecision, FedqlError> {
    let mut decision = rewrite_table_factor(relation)?;
    if let TableFactor::NestedJoin {
        table_with_joins, ..
    } = relation
    {
        decision = decision.merge(rewrite_table_factor_in_place(
            &mut table_with_joins.relation,
            rewrite_table_factor,
        )?);
        for join in &mut table_with_joins.joins {
            decision = decision.merge(rewrite_table_factor_in_place(
                &mut join.relation,
                rewrite_table_factor,
            )?);
        }
    }
    Ok(decision)
}

fn visit_table_factor_in_place(
    relation: &TableFactor,
    visit_table_factor: &mut dyn FnMut(&TableFactor) -> Result<(), FedqlError>,
) -> Result<(), FedqlError> {
    visit_table_factor(relation)?;
    if let TableFactor::NestedJoin {
        table_with_joins, ..
    } = relation
    {
        visit_table_factor_in_place(&table_with_joins.relation, visit_table_factor)?;
        for join in &table_with_joins.joins {
            visit_table_factor_in_place(&join.relation, visit_table_factor)?;
        }
    }
    Ok(())
}

pub(crate) fn strip_nested(mut expr: &Expr) -> &Expr {
    while let Expr::Nested(inner) = expr {
        expr = inner;
    }
    expr
}

/// Flattens a tree of `AND`s into its conjuncts.
pub(crate) fn split_conjuncts(expr: &Expr) -> Vec<&Expr> {
    let mut out = Vec::new();
    collect_conjuncts(expr, &mut out);
    out
}

fn collect_conjuncts<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match strip_nested(expr) {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::And,
            right,
        } => {
            collect_conjuncts(left, out);
            collect_conjuncts(right, out);
        }
        other => out.push(other),
    }
}

pub(crate) fn join_conjuncts(conjuncts: Vec<Expr>) -> Option<Expr> {
    conjuncts.into_iter().reduce(|left, right| Expr::BinaryOp {
        left: Box::new(left),
        op: BinaryOperator::And,
        right: Box::new(right),
    })
}

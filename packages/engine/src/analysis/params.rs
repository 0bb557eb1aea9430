use sqlparser::ast::{BinaryOperator, Expr, JoinConstraint, JoinOperator, Select, TableFactor};

use super::annotated_ast::{AnnotatedAst, Operand};
use crate::ids::{ComparisonId, ReferenceId, SelectId};
use crate::parameters::{
    ColumnOperand, ColumnarReference, ComparisonParameter, ParamSourceType, ParameterMap,
    ParameterMetadata, ParameterValue,
};
use crate::sql::{expr_to_engine_value, split_conjuncts, strip_nested};
use crate::FedqlError;

/// WHERE parameters of one scope, with the references each top level
/// conjunct produced (parallel to [`split_conjuncts`] of the clause).
#[derive(Debug, Clone, Default)]
pub struct WhereParams {
    pub params: ParameterMap,
    pub conjuncts: Vec<Vec<ReferenceId>>,
}

pub(crate) fn extract_where_params(
    aast: &mut AnnotatedAst,
    select_id: SelectId,
    selection: Option<&Expr>,
) -> Result<WhereParams, FedqlError> {
    let mut out = WhereParams::default();
    let Some(selection) = selection else {
        return Ok(out);
    };
    for conjunct in split_conjuncts(selection) {
        let keys = extract_comparison(
            aast,
            select_id,
            conjunct,
            ParamSourceType::WhereParam,
            &mut out.params,
        )?;
        out.conjuncts.push(keys);
    }
    Ok(out)
}

/// Parameters of every `ON` constraint in the FROM clause. A column to
/// column equality registers both sides under one comparison.
pub(crate) fn extract_on_params(
    aast: &mut AnnotatedAst,
    select_id: SelectId,
    select: &Select,
) -> Result<ParameterMap, FedqlError> {
    let mut constraints = Vec::new();
    for table in &select.from {
        collect_factor_constraints(&table.relation, &mut constraints);
        for join in &table.joins {
            collect_factor_constraints(&join.relation, &mut constraints);
            if let Some(expr) = join_on_expr(&join.join_operator) {
                constraints.push(expr.clone());
            }
        }
    }

    let mut params = ParameterMap::new();
    for constraint in &constraints {
        for conjunct in split_conjuncts(constraint) {
            extract_comparison(
                aast,
                select_id,
                conjunct,
                ParamSourceType::JoinOnParam,
                &mut params,
            )?;
        }
    }
    Ok(params)
}

fn collect_factor_constraints(factor: &TableFactor, out: &mut Vec<Expr>) {
    let TableFactor::NestedJoin {
        table_with_joins, ..
    } = factor
    else {
        return;
    };
    collect_factor_constraints(&table_with_joins.relation, out);
    for join in &table_with_joins.joins {
        collect_factor_constraints(&join.relation, out);
        if let Some(expr) = join_on_expr(&join.join_operator) {
            out.push(expr.clone());
        }
    }
}

fn join_on_expr(operator: &JoinOperator) -> Option<&Expr> {
    let constraint = match operator {
        JoinOperator::AsOf { constraint, .. } => constraint,
        JoinOperator::Join(constraint)
        | JoinOperator::Inner(constraint)
        | JoinOperator::Left(constraint)
        | JoinOperator::LeftOuter(constraint)
        | JoinOperator::Right(constraint)
        | JoinOperator::RightOuter(constraint)
        | JoinOperator::FullOuter(constraint)
        | JoinOperator::CrossJoin(constraint)
        | JoinOperator::Semi(constraint)
        | JoinOperator::LeftSemi(constraint)
        | JoinOperator::RightSemi(constraint)
        | JoinOperator::Anti(constraint)
        | JoinOperator::LeftAnti(constraint)
        | JoinOperator::RightAnti(constraint)
        | JoinOperator::StraightJoin(constraint) => constraint,
        JoinOperator::CrossApply | JoinOperator::OuterApply => return None,
    };
    match constraint {
        JoinConstraint::On(expr) => Some(expr),
        _ => None,
    }
}

fn is_column(expr: &Expr) -> bool {
    matches!(expr, Expr::Identifier(_) | Expr::CompoundIdentifier(_))
}

fn column_operand(expr: &Expr) -> Option<ColumnOperand> {
    match expr {
        Expr::Identifier(ident) => Some(ColumnOperand {
            qualifier: None,
            name: ident.value.clone(),
        }),
        Expr::CompoundIdentifier(idents) => {
            let (last, rest) = idents.split_last()?;
            Some(ColumnOperand {
                qualifier: rest.last().map(|ident| ident.value.clone()),
                name: last.value.clone(),
            })
        }
        _ => None,
    }
}

fn operand_of(expr: &Expr) -> Operand {
    if let Some(column) = column_operand(expr) {
        return Operand::Column(column);
    }
    match expr_to_engine_value(expr) {
        Some(value) => Operand::Literal(value),
        None => Operand::Other(expr.to_string()),
    }
}

/// Registers the comparison `conjunct` describes, when it is one the router
/// can use, and returns the keys it added. `OR` and non-equality predicates
/// contribute nothing.
fn extract_comparison(
    aast: &mut AnnotatedAst,
    select_id: SelectId,
    conjunct: &Expr,
    source: ParamSourceType,
    params: &mut ParameterMap,
) -> Result<Vec<ReferenceId>, FedqlError> {
    match strip_nested(conjunct) {
        Expr::BinaryOp {
            left,
            op: BinaryOperator::Eq,
            right,
        } => {
            let (left, right) = (strip_nested(left), strip_nested(right));
            match (is_column(left), is_column(right)) {
                (true, true) => {
                    let comparison = register(aast, select_id, source, left, right, conjunct);
                    let mut keys = vec![add_key(aast, params, left, right, comparison, source)?];
                    if source == ParamSourceType::JoinOnParam {
                        keys.push(add_key(aast, params, right, left, comparison, source)?);
                    }
                    Ok(keys)
                }
                (true, false) => {
                    let comparison = register(aast, select_id, source, left, right, conjunct);
                    Ok(vec![add_key(aast, params, left, right, comparison, source)?])
                }
                (false, true) if expr_to_engine_value(left).is_some() => {
                    let comparison = register(aast, select_id, source, right, left, conjunct);
                    Ok(vec![add_key(aast, params, right, left, comparison, source)?])
                }
                _ => Ok(Vec::new()),
            }
        }
        Expr::InList {
            expr,
            list,
            negated: false,
        } if is_column(strip_nested(expr)) => {
            let Some(values) = list
                .iter()
                .map(expr_to_engine_value)
                .collect::<Option<Vec<_>>>()
            else {
                return Ok(Vec::new());
            };
            let column = strip_nested(expr);
            let comparison = aast.register_comparison(
                select_id,
                source,
                operand_of(column),
                Operand::List(values.clone()),
                conjunct.to_string(),
            );
            let id = aast.ids().reference();
            let metadata = ParameterMetadata::Comparison(ComparisonParameter::new(
                comparison,
                ParameterValue::List(values),
                comparison.index(),
            ));
            params.set_expr(id, column, source, metadata)?;
            Ok(vec![id])
        }
        _ => Ok(Vec::new()),
    }
}

fn register(
    aast: &mut AnnotatedAst,
    select_id: SelectId,
    source: ParamSourceType,
    key: &Expr,
    value: &Expr,
    conjunct: &Expr,
) -> ComparisonId {
    aast.register_comparison(
        select_id,
        source,
        operand_of(key),
        operand_of(value),
        conjunct.to_string(),
    )
}

fn add_key(
    aast: &mut AnnotatedAst,
    params: &mut ParameterMap,
    key: &Expr,
    value: &Expr,
    comparison: ComparisonId,
    source: ParamSourceType,
) -> Result<ReferenceId, FedqlError> {
    let value = match operand_of(value) {
        Operand::Column(column) => ParameterValue::Column(column),
        Operand::Literal(literal) => ParameterValue::Literal(literal),
        Operand::List(values) => ParameterValue::List(values),
        Operand::Other(text) => ParameterValue::Expression(text),
    };
    let id = aast.ids().reference();
    let metadata = ParameterMetadata::Comparison(ComparisonParameter::new(
        comparison,
        value,
        comparison.index(),
    ));
    let key: ColumnarReference = params.set_expr(id, key, source, metadata)?;
    Ok(key.id())
}

#[cfg(test)]
mod tests {
    use sqlparser::ast::SetExpr;

    use super::{extract_on_params, extract_where_params};
    use crate::analysis::AnnotatedAst;
    use crate::parameters::{ParamSourceType, ParameterValue};
    use crate::sql::{parse_single_query, parse_statements};
    use crate::Value;

    fn analyse(sql: &str) -> (AnnotatedAst, sqlparser::ast::Select) {
        let aast = AnnotatedAst::new(parse_statements(sql).unwrap().remove(0));
        let SetExpr::Select(select) = *parse_single_query(sql).unwrap().body else {
            panic!("expected select");
        };
        (aast, *select)
    }

    #[test]
    fn where_literals_key_the_column_side() {
        let (mut aast, select) = analyse(
            "SELECT * FROM t WHERE t.project = 'p' AND 'z1' = zone AND (n = 1 OR n = 2) AND id IN (1, 2)",
        );
        let select_id = aast.register_select(0);
        let extracted =
            extract_where_params(&mut aast, select_id, select.selection.as_ref()).unwrap();
        let keys = extracted
            .params
            .keys()
            .map(|key| key.string_key())
            .collect::<Vec<_>>();
        assert_eq!(keys, vec!["t.project", "zone", "id"]);
        assert_eq!(extracted.conjuncts.len(), 4);
        assert!(extracted.conjuncts[2].is_empty());
        let (_, id_meta) = extracted.params.iter().last().unwrap();
        assert_eq!(
            id_meta.value(),
            Some(&ParameterValue::List(vec![Value::Integer(1), Value::Integer(2)]))
        );
    }

    #[test]
    fn textually_identical_references_stay_distinct() {
        let (mut aast, select) = analyse("SELECT * FROM t WHERE a.id = 1 AND a.id = 1");
        let select_id = aast.register_select(0);
        let extracted =
            extract_where_params(&mut aast, select_id, select.selection.as_ref()).unwrap();
        assert_eq!(extracted.params.len(), 2);
        assert_eq!(extracted.params.stringified().len(), 1);
    }

    #[test]
    fn on_equality_registers_both_sides() {
        let (mut aast, select) = analyse(
            "SELECT * FROM a JOIN b ON b.parent_id = a.id AND b.kind = 'x' JOIN (c JOIN d ON d.c_id = c.id) ON c.b_id = b.id",
        );
        let select_id = aast.register_select(0);
        let params = extract_on_params(&mut aast, select_id, &select).unwrap();
        let keys = params
            .keys()
            .map(|key| key.string_key())
            .collect::<Vec<_>>();
        assert_eq!(
            keys,
            vec!["b.parent_id", "a.id", "b.kind", "d.c_id", "c.id", "c.b_id", "b.id"]
        );
        assert!(params
            .keys()
            .all(|key| key.source_type() == ParamSourceType::JoinOnParam));
        let first = params.iter().next().unwrap().1.as_comparison().unwrap().comparison();
        let second = params.iter().nth(1).unwrap().1.as_comparison().unwrap().comparison();
        assert_eq!(first, second);
        let record = aast.comparison(first).unwrap();
        assert_eq!(record.text, "b.parent_id = a.id");
    }
}

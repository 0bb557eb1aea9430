use sqlparser::ast::{
    Assignment, AssignmentTarget, Expr, FunctionArg, FunctionArgExpr, FunctionArguments, Ident,
};

use super::annotated_ast::{AnnotatedAst, Operand};
use crate::errors;
use crate::ids::SelectId;
use crate::parameters::{
    ColumnOperand, ColumnarReference, ComparisonParameter, ParamSourceType, ParameterMap,
    ParameterMetadata, ParameterValue,
};
use crate::sql::{expr_to_engine_value, object_name_parts};
use crate::FedqlError;

/// Keys for the columns of an INSERT; values arrive per row.
pub(crate) fn extract_insert_params(aast: &mut AnnotatedAst, columns: &[Ident]) -> ParameterMap {
    let mut params = ParameterMap::new();
    for (ordinal, column) in columns.iter().enumerate() {
        let id = aast.ids().reference();
        params.set(
            ColumnarReference::from_ident(id, column, ParamSourceType::Unknown),
            ParameterMetadata::Placeholder { ordinal },
        );
    }
    params
}

/// Keys for `SET column = value` assignments; values must be constant.
pub(crate) fn extract_assignment_params(
    aast: &mut AnnotatedAst,
    select_id: SelectId,
    assignments: &[Assignment],
) -> Result<ParameterMap, FedqlError> {
    let mut params = ParameterMap::new();
    for assignment in assignments {
        let AssignmentTarget::ColumnName(name) = &assignment.target else {
            return Err(errors::unsupported_statement_error(
                "tuple assignments are not supported for provider tables",
            ));
        };
        let Some(column) = object_name_parts(name).pop() else {
            continue;
        };
        bind_constant(aast, select_id, &mut params, &column, &assignment.value)?;
    }
    Ok(params)
}

/// Keys for the named arguments of `CALL provider.service.resource.method(...)`.
pub(crate) fn extract_call_params(
    aast: &mut AnnotatedAst,
    select_id: SelectId,
    args: &FunctionArguments,
) -> Result<ParameterMap, FedqlError> {
    let mut params = ParameterMap::new();
    let FunctionArguments::List(list) = args else {
        return Ok(params);
    };
    for arg in &list.args {
        match arg {
            FunctionArg::Named {
                name,
                arg: FunctionArgExpr::Expr(value),
                ..
            } => bind_constant(aast, select_id, &mut params, &name.value, value)?,
            other => {
                return Err(errors::unsupported_statement_error(format!(
                    "argument `{other}` must be written as `name => value`"
                )))
            }
        }
    }
    Ok(params)
}

fn bind_constant(
    aast: &mut AnnotatedAst,
    select_id: SelectId,
    params: &mut ParameterMap,
    column: &str,
    value: &Expr,
) -> Result<(), FedqlError> {
    let literal = expr_to_engine_value(value).ok_or_else(|| {
        errors::unsupported_statement_error(format!(
            "value `{value}` for `{column}` is not a constant"
        ))
    })?;
    let comparison = aast.register_comparison(
        select_id,
        ParamSourceType::Unknown,
        Operand::Column(ColumnOperand {
            qualifier: None,
            name: column.to_string(),
        }),
        Operand::Literal(literal.clone()),
        format!("{column} = {value}"),
    );
    let id = aast.ids().reference();
    params.set(
        ColumnarReference::from_ident(id, &Ident::new(column), ParamSourceType::Unknown),
        ParameterMetadata::Comparison(ComparisonParameter::new(
            comparison,
            ParameterValue::Literal(literal),
            comparison.index(),
        )),
    );
    Ok(())
}

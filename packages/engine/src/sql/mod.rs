mod ast_utils;
mod params;

pub(crate) use ast_utils::{
    default_alias, join_conjuncts, object_name_parts, parse_single_query, parse_statements,
    quote_ident, rewrite_table_factors_in_select, split_conjuncts, strip_nested,
    visit_table_factors_in_select, RewriteDecision,
};
pub(crate) use params::{expr_to_engine_value, inline_placeholders};

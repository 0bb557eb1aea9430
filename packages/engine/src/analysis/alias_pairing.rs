use std::collections::HashMap;

use super::tables::ExtractedTables;
use crate::ids::{ReferenceId, TableExprId};
use crate::parameters::ColumnarReference;

/// Pairs parameter references with the table expression their qualifier
/// names. With a single table in scope, unqualified references pair with it.
pub(crate) fn pair_table_aliases<'a>(
    keys: impl IntoIterator<Item = &'a ColumnarReference>,
    tables: &ExtractedTables,
) -> HashMap<ReferenceId, TableExprId> {
    let single = match tables.tables.as_slice() {
        [only] => Some(only.id),
        _ => None,
    };
    let mut col_refs = HashMap::new();
    for key in keys {
        let table = match key.alias() {
            Some(alias) => tables.by_alias(alias),
            None => single,
        };
        if let Some(table) = table {
            col_refs.insert(key.id(), table);
        }
    }
    col_refs
}

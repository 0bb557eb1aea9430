use std::collections::BTreeMap;

use sqlparser::ast::{Select, TableFactor};

use super::annotated_ast::{AnnotatedAst, Indirect, TableKind, TableRef};
use super::indirect::{expand_indirect, IndirectScope};
use super::providers::provider_identifiers;
use crate::errors;
use crate::ids::{SelectId, TableExprId};
use crate::sql::{object_name_parts, visit_table_factors_in_select};
use crate::FedqlError;

/// Table expressions of one FROM clause.
#[derive(Debug, Clone, Default)]
pub struct ExtractedTables {
    pub tables: Vec<TableRef>,
    /// Lowercased qualifier to table.
    pub aliases: BTreeMap<String, TableExprId>,
    pub indirects: BTreeMap<TableExprId, Indirect>,
}

impl ExtractedTables {
    pub fn get(&self, id: TableExprId) -> Option<&TableRef> {
        self.tables.iter().find(|table| table.id == id)
    }

    pub fn by_alias(&self, alias: &str) -> Option<TableExprId> {
        self.aliases.get(&alias.to_ascii_lowercase()).copied()
    }

    pub fn providers(&self) -> impl Iterator<Item = &TableRef> {
        self.tables.iter().filter(|table| table.is_provider())
    }

    pub(crate) fn push(&mut self, table: TableRef) -> Result<(), FedqlError> {
        if let Some(alias) = table.effective_alias() {
            let key = alias.to_ascii_lowercase();
            if self.aliases.contains_key(&key) {
                return Err(errors::sql_parse_error(format!(
                    "table alias `{alias}` is specified more than once"
                )));
            }
            self.aliases.insert(key, table.id);
        }
        self.tables.push(table);
        Ok(())
    }
}

/// Classifies every table factor of `select` as a provider table, an
/// indirect or a local table.
pub(crate) fn extract_tables(
    aast: &mut AnnotatedAst,
    select_id: SelectId,
    select: &Select,
    scope: &IndirectScope<'_>,
    default_provider: Option<&str>,
) -> Result<ExtractedTables, FedqlError> {
    let mut factors = Vec::new();
    visit_table_factors_in_select(select, &mut |factor| {
        factors.push(factor.clone());
        Ok(())
    })?;

    let mut extracted = ExtractedTables::default();
    for (ordinal, factor) in factors.iter().enumerate() {
        if matches!(factor, TableFactor::NestedJoin { .. }) {
            continue;
        }
        let id = aast.ids().table();
        let (name, alias) = factor_name_and_alias(factor);
        let kind = match expand_indirect(factor, scope)? {
            Some(indirect) => {
                let kind = TableKind::Indirect(indirect.kind);
                extracted.indirects.insert(id, indirect);
                kind
            }
            None => match provider_identifiers(&name, scope.registry, default_provider) {
                Some(identifiers) => TableKind::Provider(identifiers),
                None => TableKind::Local,
            },
        };
        extracted.push(TableRef {
            id,
            select: select_id,
            ordinal,
            name,
            alias,
            kind,
        })?;
    }
    for (id, indirect) in &extracted.indirects {
        aast.register_indirect(*id, indirect.clone());
    }
    aast.set_select_tables(select_id, extracted.tables.clone(), extracted.aliases.clone());
    Ok(extracted)
}

fn factor_name_and_alias(factor: &TableFactor) -> (Vec<String>, Option<String>) {
    match factor {
        TableFactor::Table { name, alias, .. } => (
            object_name_parts(name),
            alias.as_ref().map(|alias| alias.name.value.clone()),
        ),
        TableFactor::Derived { alias, .. } => {
            (Vec::new(), alias.as_ref().map(|alias| alias.name.value.clone()))
        }
        _ => (Vec::new(), None),
    }
}

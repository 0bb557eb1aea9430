use std::collections::{BTreeMap, HashMap};
use std::fmt;

use sqlparser::ast::{Query, Statement};

use crate::ids::{ComparisonId, NodeIdAllocator, SelectId, TableExprId};
use crate::parameters::{ColumnOperand, ParamSourceType, ParameterMap};
use crate::taxonomy::HierarchyIdentifiers;
use crate::Value;

/// One side of a registered comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Column(ColumnOperand),
    Literal(Value),
    List(Vec<Value>),
    Other(String),
}

impl Operand {
    pub fn as_column(&self) -> Option<&ColumnOperand> {
        match self {
            Operand::Column(column) => Some(column),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRecord {
    pub id: ComparisonId,
    pub select: SelectId,
    pub source: ParamSourceType,
    pub left: Operand,
    pub right: Operand,
    pub text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IndirectKind {
    View,
    Subquery,
    Cte,
}

impl fmt::Display for IndirectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IndirectKind::View => "view",
            IndirectKind::Subquery => "subquery",
            IndirectKind::Cte => "cte",
        })
    }
}

/// A table expression defined by another query.
#[derive(Debug, Clone, PartialEq)]
pub struct Indirect {
    pub kind: IndirectKind,
    pub name: String,
    pub query: Query,
    /// Nesting level of the defining query; the outermost statement is 0.
    pub depth: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TableKind {
    Provider(HierarchyIdentifiers),
    Indirect(IndirectKind),
    /// A native table of the staging store.
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableRef {
    pub id: TableExprId,
    pub select: SelectId,
    /// Position among the FROM clause's table factors.
    pub ordinal: usize,
    pub name: Vec<String>,
    pub alias: Option<String>,
    pub kind: TableKind,
}

impl TableRef {
    /// Name columns of this table are qualified with.
    pub fn effective_alias(&self) -> Option<String> {
        self.alias.clone().or_else(|| self.name.last().cloned())
    }

    pub fn display_name(&self) -> String {
        match (&self.alias, self.name.is_empty()) {
            (Some(alias), true) => alias.clone(),
            (Some(alias), false) => format!("{} AS {alias}", self.name.join(".")),
            (None, false) => self.name.join("."),
            (None, true) => self.id.to_string(),
        }
    }

    pub fn is_provider(&self) -> bool {
        matches!(self.kind, TableKind::Provider(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SelectMetadata {
    pub id: SelectId,
    pub depth: usize,
    pub tables: Vec<TableExprId>,
    pub aliases: BTreeMap<String, TableExprId>,
}

/// A parsed statement together with everything analysis learned about it.
#[derive(Debug)]
pub struct AnnotatedAst {
    statement: Statement,
    ids: NodeIdAllocator,
    tables: BTreeMap<TableExprId, TableRef>,
    selects: BTreeMap<SelectId, SelectMetadata>,
    comparisons: Vec<ComparisonRecord>,
    where_params: HashMap<SelectId, ParameterMap>,
    indirects: HashMap<TableExprId, Indirect>,
}

impl AnnotatedAst {
    pub fn new(statement: Statement) -> Self {
        Self {
            statement,
            ids: NodeIdAllocator::default(),
            tables: BTreeMap::new(),
            selects: BTreeMap::new(),
            comparisons: Vec::new(),
            where_params: HashMap::new(),
            indirects: HashMap::new(),
        }
    }

    pub fn statement(&self) -> &Statement {
        &self.statement
    }

    pub(crate) fn ids(&mut self) -> &mut NodeIdAllocator {
        &mut self.ids
    }

    pub(crate) fn register_select(&mut self, depth: usize) -> SelectId {
        let id = self.ids.select();
        self.selects.insert(
            id,
            SelectMetadata {
                id,
                depth,
                tables: Vec::new(),
                aliases: BTreeMap::new(),
            },
        );
        id
    }

    pub fn select(&self, id: SelectId) -> Option<&SelectMetadata> {
        self.selects.get(&id)
    }

    pub fn selects(&self) -> impl Iterator<Item = &SelectMetadata> {
        self.selects.values()
    }

    pub(crate) fn set_select_tables(
        &mut self,
        select: SelectId,
        tables: Vec<TableRef>,
        aliases: BTreeMap<String, TableExprId>,
    ) {
        let ids = tables.iter().map(|table| table.id).collect();
        for table in tables {
            self.tables.insert(table.id, table);
        }
        if let Some(metadata) = self.selects.get_mut(&select) {
            metadata.tables = ids;
            metadata.aliases = aliases;
        }
    }

    pub fn table(&self, id: TableExprId) -> Option<&TableRef> {
        self.tables.get(&id)
    }

    pub(crate) fn register_comparison(
        &mut self,
        select: SelectId,
        source: ParamSourceType,
        left: Operand,
        right: Operand,
        text: String,
    ) -> ComparisonId {
        let id = self.ids.comparison();
        self.comparisons.push(ComparisonRecord {
            id,
            select,
            source,
            left,
            right,
            text,
        });
        id
    }

    pub fn comparison(&self, id: ComparisonId) -> Option<&ComparisonRecord> {
        self.comparisons.get(id.index())
    }

    pub(crate) fn set_where_params(&mut self, select: SelectId, params: ParameterMap) {
        self.where_params.insert(select, params);
    }

    pub fn where_params(&self, select: SelectId) -> Option<&ParameterMap> {
        self.where_params.get(&select)
    }

    pub(crate) fn register_indirect(&mut self, table: TableExprId, indirect: Indirect) {
        self.indirects.insert(table, indirect);
    }

    pub fn indirect(&self, table: TableExprId) -> Option<&Indirect> {
        self.indirects.get(&table)
    }
}

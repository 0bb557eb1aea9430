//! Identifiers allocated while annotating a statement.
//!
//! Parameter keys, comparisons, table expressions and SELECT scopes are all
//! identified by the position at which they were first seen, never by their
//! SQL text.

use std::fmt;

macro_rules! node_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name(pub(crate) usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

node_id!(
    /// One column or identifier occurrence in the AST.
    ReferenceId,
    "ref#"
);
node_id!(
    /// One binary comparison in a WHERE or ON clause.
    ComparisonId,
    "cmp#"
);
node_id!(
    /// One table expression in a FROM clause.
    TableExprId,
    "tbl#"
);
node_id!(SelectId, "sel#");

#[derive(Debug, Default)]
pub(crate) struct NodeIdAllocator {
    next_reference: usize,
    next_comparison: usize,
    next_table: usize,
    next_select: usize,
}

impl NodeIdAllocator {
    pub(crate) fn reference(&mut self) -> ReferenceId {
        let id = ReferenceId(self.next_reference);
        self.next_reference += 1;
        id
    }

    pub(crate) fn comparison(&mut self) -> ComparisonId {
        let id = ComparisonId(self.next_comparison);
        self.next_comparison += 1;
        id
    }

    pub(crate) fn table(&mut self) -> TableExprId {
        let id = TableExprId(self.next_table);
        self.next_table += 1;
        id
    }

    pub(crate) fn select(&mut self) -> SelectId {
        let id = SelectId(self.next_select);
        self.next_select += 1;
        id
    }
}

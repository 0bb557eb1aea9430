use std::collections::BTreeMap;
use std::fmt::Write as _;

use super::armoury::HttpArmoury;
use super::staging::{PreparedStatementCtx, TxnControlCounters};
use crate::ids::TableExprId;
use crate::taxonomy::{AnnotationCtx, Hierarchy, SqlVerb};
use crate::{QueryResult, Value};

/// Where an acquisition's requests come from.
#[derive(Debug, Clone, PartialEq)]
pub enum ArmourySource {
    /// Every parameter is known at plan time.
    Prepared(HttpArmoury),
    /// Requests are rendered at execution time from projected rows merged
    /// with these constant parameters.
    Deferred {
        static_params: BTreeMap<String, Vec<Value>>,
    },
}

/// Response columns of an upstream acquisition feeding request parameters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectionFeed {
    pub from: TableExprId,
    /// Source response column to destination request parameter.
    pub mapping: Vec<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireInput {
    Empty,
    Projected { feeds: Vec<ProjectionFeed> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutput {
    Nop,
    /// Response rows are kept for downstream acquisitions.
    Projection,
}

/// Fetches one table's rows from its provider and stages them.
#[derive(Debug, Clone)]
pub struct AcquireStep {
    pub name: String,
    pub annotation: AnnotationCtx,
    pub ddl: String,
    pub armoury: ArmourySource,
    pub input: AcquireInput,
    pub output: AcquireOutput,
}

impl AcquireStep {
    pub fn table(&self) -> TableExprId {
        self.annotation.table()
    }

    pub fn hierarchy(&self) -> &Hierarchy {
        self.annotation.hierarchy()
    }

    pub fn insert_ctx(&self) -> Option<&PreparedStatementCtx> {
        self.annotation.insert_ctx()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DmlRows {
    Prepared(HttpArmoury),
    /// Rows produced by a query, mapped positionally onto `columns`.
    FromQuery {
        source: Box<PrimitiveBuilder>,
        columns: Vec<String>,
        static_params: BTreeMap<String, Vec<Value>>,
    },
}

/// A provider call made on behalf of INSERT, UPDATE, DELETE or CALL.
#[derive(Debug, Clone, PartialEq)]
pub struct DmlStep {
    pub verb: SqlVerb,
    pub table: String,
    pub hierarchy: Hierarchy,
    pub rows: DmlRows,
}

/// Root of an executable plan.
#[derive(Debug, Clone)]
pub enum PrimitiveBuilder {
    DependentMultiAcquireAndSelect {
        acquisitions: Vec<AcquireStep>,
        select: PreparedStatementCtx,
    },
    Mutation(DmlStep),
    Describe { table: String, result: QueryResult },
    Show { result: QueryResult },
    /// Runs directly against the staging store.
    Passthrough { sql: String },
}

impl PartialEq for AcquireStep {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.table() == other.table()
            && self.ddl == other.ddl
            && self.armoury == other.armoury
            && self.input == other.input
            && self.output == other.output
    }
}

impl PartialEq for PrimitiveBuilder {
    fn eq(&self, other: &Self) -> bool {
        self.explain() == other.explain()
    }
}

impl PrimitiveBuilder {
    pub(crate) fn acquire_and_select(
        acquisitions: Vec<AcquireStep>,
        sql: String,
        counters: TxnControlCounters,
    ) -> Self {
        if acquisitions.is_empty() {
            return PrimitiveBuilder::Passthrough { sql };
        }
        PrimitiveBuilder::DependentMultiAcquireAndSelect {
            acquisitions,
            select: PreparedStatementCtx::new(sql, Vec::new(), counters),
        }
    }

    pub fn acquisitions(&self) -> &[AcquireStep] {
        match self {
            PrimitiveBuilder::DependentMultiAcquireAndSelect { acquisitions, .. } => acquisitions,
            _ => &[],
        }
    }

    /// Indented rendering of the plan tree.
    pub fn explain(&self) -> String {
        let mut out = String::new();
        self.explain_into(&mut out, 0);
        out
    }

    fn explain_into(&self, out: &mut String, depth: usize) {
        let pad = "  ".repeat(depth);
        match self {
            PrimitiveBuilder::DependentMultiAcquireAndSelect {
                acquisitions,
                select,
            } => {
                let _ = writeln!(out, "{pad}DependentMultiAcquireAndSelect");
                for step in acquisitions {
                    let method = &step.hierarchy().method().name;
                    let _ = writeln!(out, "{pad}  Acquire {} via {method}", step.name);
                    match &step.input {
                        AcquireInput::Empty => {}
                        AcquireInput::Projected { feeds } => {
                            for feed in feeds {
                                let mapping = feed
                                    .mapping
                                    .iter()
                                    .map(|(source, dest)| format!("{source}->{dest}"))
                                    .collect::<Vec<_>>()
                                    .join(", ");
                                let _ =
                                    writeln!(out, "{pad}    input {} {{{mapping}}}", feed.from);
                            }
                        }
                    }
                    match &step.armoury {
                        ArmourySource::Prepared(armoury) => {
                            let _ = writeln!(out, "{pad}    requests {}", armoury.len());
                        }
                        ArmourySource::Deferred { .. } => {
                            let _ = writeln!(out, "{pad}    requests per projected row");
                        }
                    }
                    if step.output == AcquireOutput::Projection {
                        let _ = writeln!(out, "{pad}    output projection");
                    }
                }
                let _ = writeln!(out, "{pad}  Select {}", select.sql());
            }
            PrimitiveBuilder::Mutation(step) => {
                let _ = writeln!(
                    out,
                    "{pad}{} {} via {}",
                    step.verb.as_str().to_ascii_uppercase(),
                    step.table,
                    step.hierarchy.method().name
                );
                match &step.rows {
                    DmlRows::Prepared(armoury) => {
                        let _ = writeln!(out, "{pad}  requests {}", armoury.len());
                    }
                    DmlRows::FromQuery { source, columns, .. } => {
                        let _ = writeln!(out, "{pad}  rows from query ({})", columns.join(", "));
                        source.explain_into(out, depth + 2);
                    }
                }
            }
            PrimitiveBuilder::Describe { table, .. } => {
                let _ = writeln!(out, "{pad}Describe {table}");
            }
            PrimitiveBuilder::Show { result } => {
                let _ = writeln!(out, "{pad}Show {} resources", result.rows.len());
            }
            PrimitiveBuilder::Passthrough { sql } => {
                let _ = writeln!(out, "{pad}Passthrough {sql}");
            }
        }
    }
}

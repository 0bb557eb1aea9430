use crate::backend::SqlDialect;
use crate::sql::quote_ident;
use crate::taxonomy::{Hierarchy, HierarchyIdentifiers};
use crate::Value;

pub const GENERATION_ID_COLUMN: &str = "fedql_generation_id";
pub const TXN_ID_COLUMN: &str = "fedql_txn_id";
pub const INSERT_ID_COLUMN: &str = "fedql_insert_id";

/// Identifies the rows one acquisition stages: the engine generation, the
/// statement within it and the acquisition within the statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TxnControlCounters {
    pub generation_id: i64,
    pub txn_id: i64,
    pub insert_id: i64,
}

impl TxnControlCounters {
    pub fn new(generation_id: i64, txn_id: i64) -> Self {
        Self {
            generation_id,
            txn_id,
            insert_id: 0,
        }
    }

    /// Advances the insert id and returns the counters for the new
    /// acquisition.
    pub fn clone_and_increment_insert_id(&mut self) -> Self {
        self.insert_id += 1;
        *self
    }

    pub fn values(&self) -> [Value; 3] {
        [
            Value::Integer(self.generation_id),
            Value::Integer(self.txn_id),
            Value::Integer(self.insert_id),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    pub name: String,
}

/// Shape of the rows a provider method returns.
#[derive(Debug, Clone, PartialEq)]
pub struct AnnotatedTabulation {
    pub identifiers: HierarchyIdentifiers,
    pub columns: Vec<String>,
}

impl AnnotatedTabulation {
    pub fn from_hierarchy(hierarchy: &Hierarchy) -> Self {
        Self {
            identifiers: hierarchy.identifiers().clone(),
            columns: hierarchy.staged_columns(),
        }
    }
}

/// SQL text plus what is needed to bind it.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedStatementCtx {
    sql: String,
    /// Data columns bound before the control columns, in order.
    columns: Vec<String>,
    counters: TxnControlCounters,
}

impl PreparedStatementCtx {
    pub fn new(sql: impl Into<String>, columns: Vec<String>, counters: TxnControlCounters) -> Self {
        Self {
            sql: sql.into(),
            columns,
            counters,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn counters(&self) -> TxnControlCounters {
        self.counters
    }
}

/// Generates the staging-store SQL acquisitions write to and queries read
/// from.
pub trait StagingDrm {
    fn get_current_table(&self, identifiers: &HierarchyIdentifiers) -> TableDescriptor;

    fn generate_ddl(&self, tabulation: &AnnotatedTabulation) -> String;

    fn generate_insert_dml(
        &self,
        tabulation: &AnnotatedTabulation,
        counters: &TxnControlCounters,
    ) -> PreparedStatementCtx;

    fn generate_select_dml(
        &self,
        tabulation: &AnnotatedTabulation,
        counters: &TxnControlCounters,
    ) -> PreparedStatementCtx;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StandardStagingDrm {
    dialect: SqlDialect,
    namespace_prefix: String,
}

impl StandardStagingDrm {
    pub fn new(dialect: SqlDialect, namespace_prefix: impl Into<String>) -> Self {
        Self {
            dialect,
            namespace_prefix: namespace_prefix.into(),
        }
    }

    fn placeholder(&self, index: usize) -> String {
        match self.dialect {
            SqlDialect::Sqlite => format!("?{index}"),
            SqlDialect::Postgres => format!("${index}"),
        }
    }

    fn data_column_type(&self) -> &'static str {
        match self.dialect {
            SqlDialect::Sqlite => "",
            SqlDialect::Postgres => " TEXT",
        }
    }

    /// `{prefix}_{provider}_{service}_{resource}_{method}`. Parts that are not
    /// plain lowercase alphanumerics are sanitized and the name gets a
    /// `__{hash}` suffix over the raw parts, which clean names never contain.
    fn table_name(&self, identifiers: &HierarchyIdentifiers) -> String {
        let mut parts = vec![
            identifiers.provider.as_str(),
            identifiers.service.as_str(),
            identifiers.resource.as_str(),
        ];
        if let Some(method) = &identifiers.method {
            parts.push(method.as_str());
        }
        let mut name = std::iter::once(self.namespace_prefix.as_str())
            .chain(parts.iter().copied())
            .map(sanitize)
            .collect::<Vec<_>>()
            .join("_");
        if !parts.iter().all(|part| is_clean_part(part)) {
            let hash = blake3::hash(parts.join("\0").as_bytes()).to_hex();
            name.push_str("__");
            name.push_str(&hash.as_str()[..16]);
        }
        name
    }
}

fn is_clean_part(part: &str) -> bool {
    !part.is_empty()
        && part
            .chars()
            .all(|ch| ch.is_ascii_lowercase() || ch.is_ascii_digit())
}

fn sanitize(part: &str) -> String {
    part.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() { ch.to_ascii_lowercase() } else { '_' })
        .collect()
}

impl StagingDrm for StandardStagingDrm {
    fn get_current_table(&self, identifiers: &HierarchyIdentifiers) -> TableDescriptor {
        TableDescriptor {
            name: self.table_name(identifiers),
        }
    }

    fn generate_ddl(&self, tabulation: &AnnotatedTabulation) -> String {
        let table = self.get_current_table(&tabulation.identifiers);
        let mut columns = tabulation
            .columns
            .iter()
            .map(|column| format!("{}{}", quote_ident(column), self.data_column_type()))
            .collect::<Vec<_>>();
        for control in [GENERATION_ID_COLUMN, TXN_ID_COLUMN, INSERT_ID_COLUMN] {
            columns.push(format!("{} INTEGER NOT NULL", quote_ident(control)));
        }
        format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_ident(&table.name),
            columns.join(", ")
        )
    }

    fn generate_insert_dml(
        &self,
        tabulation: &AnnotatedTabulation,
        counters: &TxnControlCounters,
    ) -> PreparedStatementCtx {
        let table = self.get_current_table(&tabulation.identifiers);
        let names = tabulation
            .columns
            .iter()
            .map(String::as_str)
            .chain([GENERATION_ID_COLUMN, TXN_ID_COLUMN, INSERT_ID_COLUMN])
            .map(quote_ident)
            .collect::<Vec<_>>();
        let placeholders = (1..=names.len())
            .map(|index| self.placeholder(index))
            .collect::<Vec<_>>();
        PreparedStatementCtx::new(
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote_ident(&table.name),
                names.join(", "),
                placeholders.join(", ")
            ),
            tabulation.columns.clone(),
            *counters,
        )
    }

    fn generate_select_dml(
        &self,
        tabulation: &AnnotatedTabulation,
        counters: &TxnControlCounters,
    ) -> PreparedStatementCtx {
        let table = self.get_current_table(&tabulation.identifiers);
        let projection = if tabulation.columns.is_empty() {
            "*".to_string()
        } else {
            tabulation
                .columns
                .iter()
                .map(|column| quote_ident(column))
                .collect::<Vec<_>>()
                .join(", ")
        };
        PreparedStatementCtx::new(
            format!(
                "SELECT {projection} FROM {} WHERE {} = {} AND {} = {} AND {} = {}",
                quote_ident(&table.name),
                quote_ident(GENERATION_ID_COLUMN),
                counters.generation_id,
                quote_ident(TXN_ID_COLUMN),
                counters.txn_id,
                quote_ident(INSERT_ID_COLUMN),
                counters.insert_id
            ),
            tabulation.columns.clone(),
            *counters,
        )
    }
}

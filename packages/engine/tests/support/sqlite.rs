use std::sync::Mutex;

use async_trait::async_trait;
use fedql_engine::errors::staging_error;
use fedql_engine::{FedqlError, QueryResult, SqlDialect, StagingBackend, Value};
use rusqlite::{params_from_iter, Connection, Row};

pub struct SqliteStaging {
    conn: Mutex<Connection>,
    dialect: SqlDialect,
}

impl SqliteStaging {
    pub fn in_memory() -> Result<Self, FedqlError> {
        let conn = Connection::open_in_memory().map_err(|err| staging_error(err.to_string()))?;
        Ok(Self {
            conn: Mutex::new(conn),
            dialect: SqlDialect::Sqlite,
        })
    }

    /// Same store, reporting another dialect.
    pub fn labelled(dialect: SqlDialect) -> Result<Self, FedqlError> {
        let mut staging = Self::in_memory()?;
        staging.dialect = dialect;
        Ok(staging)
    }

    pub fn count(&self, table: &str) -> i64 {
        let conn = self.conn.lock().expect("sqlite mutex");
        conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
            row.get(0)
        })
        .expect("count staged rows")
    }
}

#[async_trait(?Send)]
impl StagingBackend for SqliteStaging {
    fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, FedqlError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| staging_error("sqlite mutex poisoned"))?;

        let mut stmt = conn.prepare(sql).map_err(|err| staging_error(err.to_string()))?;
        let columns = stmt
            .column_names()
            .into_iter()
            .map(|name| name.to_string())
            .collect::<Vec<_>>();
        let bound_params = params.iter().cloned().map(to_sql_value);
        let mut rows = stmt
            .query(params_from_iter(bound_params))
            .map_err(|err| staging_error(err.to_string()))?;
        let mut result_rows = Vec::new();
        while let Some(row) = rows.next().map_err(|err| staging_error(err.to_string()))? {
            result_rows.push(map_row(row)?);
        }
        Ok(QueryResult {
            columns,
            rows: result_rows,
        })
    }
}

fn map_row(row: &Row<'_>) -> Result<Vec<Value>, FedqlError> {
    let mut values = Vec::new();
    for idx in 0..row.as_ref().column_count() {
        let value = row.get_ref(idx).map_err(|err| staging_error(err.to_string()))?;
        values.push(match value {
            rusqlite::types::ValueRef::Null => Value::Null,
            rusqlite::types::ValueRef::Integer(value) => Value::Integer(value),
            rusqlite::types::ValueRef::Real(value) => Value::Real(value),
            rusqlite::types::ValueRef::Text(value) => {
                Value::Text(String::from_utf8_lossy(value).to_string())
            }
            rusqlite::types::ValueRef::Blob(value) => Value::Blob(value.to_vec()),
        });
    }
    Ok(values)
}

fn to_sql_value(value: Value) -> rusqlite::types::Value {
    match value {
        Value::Null => rusqlite::types::Value::Null,
        Value::Integer(value) => rusqlite::types::Value::Integer(value),
        Value::Real(value) => rusqlite::types::Value::Real(value),
        Value::Text(value) => rusqlite::types::Value::Text(value),
        Value::Blob(value) => rusqlite::types::Value::Blob(value),
    }
}

use async_trait::async_trait;

use crate::planner::HttpRequest;
use crate::{FedqlError, ParameterRow, QueryResult, Value};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlDialect {
    #[default]
    Sqlite,
    Postgres,
}

/// Local relational store used to stage remote results and run the final
/// rewritten query.
#[async_trait(?Send)]
pub trait StagingBackend {
    fn dialect(&self) -> SqlDialect;

    async fn execute(&self, sql: &str, params: &[Value]) -> Result<QueryResult, FedqlError>;
}

/// Performs one prepared remote call and returns the response items.
#[async_trait(?Send)]
pub trait RemoteAcquirer {
    async fn acquire(&self, request: &HttpRequest) -> Result<Vec<ParameterRow>, FedqlError>;
}

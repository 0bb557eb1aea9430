#![allow(dead_code)]

pub mod sqlite;

use std::collections::BTreeMap;
use std::future::Future;
use std::sync::Mutex;

use async_trait::async_trait;
use fedql_engine::{
    open_engine, Engine, EngineConfig, FedqlError, HttpRequest, OpenEngineConfig, ParameterRow,
    ProviderDocument, QueryResult, RemoteAcquirer, StaticProviderRegistry, Value,
};

pub use sqlite::SqliteStaging;

/// Runs `$body` once against an in-memory SQLite staging store.
#[macro_export]
macro_rules! federation_test {
    ($name:ident, |$fed:ident| $body:expr) => {
        paste::paste! {
            #[test]
            fn [<$name _sqlite>]() {
                std::thread::Builder::new()
                    .name(concat!(stringify!($name), "_sqlite").to_string())
                    .stack_size(8 * 1024 * 1024)
                    .spawn(|| {
                        let runtime = tokio::runtime::Builder::new_current_thread()
                            .enable_all()
                            .build()
                            .expect("failed to build tokio runtime");
                        runtime.block_on(async {
                            $crate::support::run_federation_test(
                                concat!(module_path!(), "::", stringify!($name)),
                                |$fed| $body,
                            )
                            .await;
                        });
                    })
                    .expect("failed to spawn sqlite test thread")
                    .join()
                    .expect("sqlite federation test thread panicked");
            }
        }
    };
}

pub const CLOUD_PROVIDER: &str = r#"{
    "name": "cloud",
    "services": {
        "org": {
            "resources": {
                "parents": {
                    "columns": ["id", "name"],
                    "methods": [
                        {"name": "list", "sql_verb": "select", "path": "/parents",
                         "optional_params": ["name"]},
                        {"name": "get", "sql_verb": "select", "path": "/parents/{id}",
                         "required_params": ["id"]}
                    ]
                },
                "children": {
                    "columns": ["id", "parent_id", "label"],
                    "methods": [
                        {"name": "list", "sql_verb": "select",
                         "path": "/parents/{parent_id}/children",
                         "required_params": ["parent_id"]}
                    ]
                }
            }
        },
        "compute": {
            "server_variables": ["region"],
            "resources": {
                "instances": {
                    "columns": ["id", "name", "zone", "status"],
                    "methods": [
                        {"name": "list", "sql_verb": "select",
                         "path": "/projects/{project}/zones/{zone}/instances",
                         "required_params": ["project", "zone"]},
                        {"name": "insert", "sql_verb": "insert", "http_method": "POST",
                         "path": "/projects/{project}/zones/{zone}/instances",
                         "required_params": ["project", "zone"]},
                        {"name": "patch", "sql_verb": "update", "http_method": "PATCH",
                         "path": "/projects/{project}/zones/{zone}/instances/{id}",
                         "required_params": ["project", "zone", "id"]},
                        {"name": "delete", "sql_verb": "delete", "http_method": "DELETE",
                         "path": "/projects/{project}/zones/{zone}/instances/{id}",
                         "required_params": ["project", "zone", "id"]},
                        {"name": "stop", "sql_verb": "exec", "http_method": "POST",
                         "path": "/projects/{project}/zones/{zone}/instances/{id}/stop",
                         "required_params": ["project", "zone", "id"]}
                    ]
                }
            }
        }
    }
}"#;

pub fn cloud_registry() -> StaticProviderRegistry {
    StaticProviderRegistry::new().with_provider(
        ProviderDocument::from_json_str(CLOUD_PROVIDER).expect("cloud provider parses"),
    )
}

pub const GH_PROVIDER: &str = r#"{
    "name": "gh",
    "services": {
        "repos": {
            "resources": {
                "repos": {
                    "columns": ["name", "stars"],
                    "methods": [
                        {"name": "list", "sql_verb": "select", "path": "/orgs/{org}/repos",
                         "required_params": ["org"]}
                    ]
                },
                "contributors": {
                    "columns": ["login", "contributions"],
                    "methods": [
                        {"name": "list", "sql_verb": "select",
                         "path": "/repos/{org}/{repo}/contributors",
                         "required_params": ["org", "repo"]}
                    ]
                }
            }
        }
    }
}"#;

pub fn gh_registry() -> StaticProviderRegistry {
    StaticProviderRegistry::new().with_provider(
        ProviderDocument::from_json_str(GH_PROVIDER).expect("gh provider parses"),
    )
}

pub fn row(pairs: &[(&str, Value)]) -> ParameterRow {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

pub fn text(value: &str) -> Value {
    Value::Text(value.to_string())
}

/// Answers reads from canned responses keyed by request path and echoes the
/// parameters of every mutation. Every request is recorded.
#[derive(Default)]
pub struct RecordingRemote {
    responses: BTreeMap<String, Vec<ParameterRow>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl RecordingRemote {
    pub fn respond(&mut self, path: &str, items: Vec<ParameterRow>) {
        self.responses.insert(path.to_string(), items);
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().expect("remote mutex").clone()
    }

    pub fn paths(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .map(|request| request.path)
            .collect()
    }
}

#[async_trait(?Send)]
impl RemoteAcquirer for RecordingRemote {
    async fn acquire(&self, request: &HttpRequest) -> Result<Vec<ParameterRow>, FedqlError> {
        self.requests
            .lock()
            .expect("remote mutex")
            .push(request.clone());
        if request.method == "GET" {
            return Ok(self.responses.get(&request.path).cloned().unwrap_or_default());
        }
        Ok(vec![request.parameters.clone()])
    }
}

pub struct Federation {
    pub name: String,
    pub engine: Engine,
    pub staging: SqliteStaging,
    pub remote: RecordingRemote,
}

impl Federation {
    pub async fn open(name: &str, config: EngineConfig) -> Self {
        Self::open_with(name, config, cloud_registry()).await
    }

    pub async fn open_with(
        name: &str,
        config: EngineConfig,
        registry: StaticProviderRegistry,
    ) -> Self {
        let engine = open_engine(OpenEngineConfig {
            config,
            registry: Box::new(registry),
        })
        .await
        .expect("open_engine should succeed");
        Self {
            name: name.to_string(),
            engine,
            staging: SqliteStaging::in_memory().expect("in-memory sqlite"),
            remote: RecordingRemote::default(),
        }
    }

    pub async fn execute(&self, sql: &str) -> Result<Vec<QueryResult>, FedqlError> {
        self.execute_with(sql, &[]).await
    }

    pub async fn execute_with(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Vec<QueryResult>, FedqlError> {
        self.engine
            .execute(sql, params, &self.staging, &self.remote)
            .await
    }

    pub async fn query(&self, sql: &str) -> QueryResult {
        let mut results = self
            .execute(sql)
            .await
            .unwrap_or_else(|error| panic!("{}: `{sql}` failed: {error}", self.name));
        results.pop().expect("at least one statement")
    }
}

pub async fn run_federation_test<F, Fut>(name: &str, body: F)
where
    F: FnOnce(Federation) -> Fut,
    Fut: Future<Output = ()>,
{
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    body(Federation::open(name, EngineConfig::default()).await).await;
}

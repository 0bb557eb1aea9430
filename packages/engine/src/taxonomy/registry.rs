use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::errors;
use crate::FedqlError;

/// SQL statement kind a provider method serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SqlVerb {
    Select,
    Insert,
    Update,
    Delete,
    Exec,
}

impl SqlVerb {
    pub fn as_str(self) -> &'static str {
        match self {
            SqlVerb::Select => "select",
            SqlVerb::Insert => "insert",
            SqlVerb::Update => "update",
            SqlVerb::Delete => "delete",
            SqlVerb::Exec => "exec",
        }
    }
}

impl fmt::Display for SqlVerb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_http_method() -> String {
    "GET".to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDocument {
    pub name: String,
    pub sql_verb: SqlVerb,
    #[serde(default = "default_http_method")]
    pub http_method: String,
    /// Request path; `{name}` segments are filled from parameters.
    pub path: String,
    #[serde(default)]
    pub required_params: Vec<String>,
    #[serde(default)]
    pub optional_params: Vec<String>,
    #[serde(default)]
    pub response_schema: Option<String>,
    /// Response item fields; falls back to the resource columns when empty.
    #[serde(default)]
    pub columns: Vec<String>,
}

impl MethodDocument {
    pub fn accepts(&self, name: &str) -> bool {
        self.required_params.iter().any(|param| param == name)
            || self.optional_params.iter().any(|param| param == name)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodDocument>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceDocument {
    /// Parameters resolved from provider configuration rather than the query.
    #[serde(default)]
    pub server_variables: Vec<String>,
    #[serde(default)]
    pub resources: BTreeMap<String, ResourceDocument>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderDocument {
    pub name: String,
    #[serde(default)]
    pub services: BTreeMap<String, ServiceDocument>,
}

impl ProviderDocument {
    pub fn from_json_str(raw: &str) -> Result<Self, FedqlError> {
        serde_json::from_str(raw).map_err(|error| {
            errors::invalid_config_error(format!("invalid provider document: {error}"))
        })
    }
}

/// Source of provider documents and view definitions.
pub trait ProviderRegistry {
    fn provider(&self, name: &str) -> Option<&ProviderDocument>;

    fn provider_names(&self) -> Vec<String>;

    /// SQL text of a view registered under `name`.
    fn view_definition(&self, name: &str) -> Option<&str>;
}

#[derive(Debug, Clone, Default)]
pub struct StaticProviderRegistry {
    providers: BTreeMap<String, ProviderDocument>,
    views: BTreeMap<String, String>,
}

impl StaticProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_provider(mut self, document: ProviderDocument) -> Self {
        self.register_provider(document);
        self
    }

    pub fn with_view(mut self, name: impl Into<String>, sql: impl Into<String>) -> Self {
        self.register_view(name, sql);
        self
    }

    pub fn register_provider(&mut self, document: ProviderDocument) {
        self.providers.insert(document.name.clone(), document);
    }

    pub fn register_provider_json(&mut self, raw: &str) -> Result<(), FedqlError> {
        self.register_provider(ProviderDocument::from_json_str(raw)?);
        Ok(())
    }

    pub fn register_view(&mut self, name: impl Into<String>, sql: impl Into<String>) {
        self.views.insert(name.into().to_ascii_lowercase(), sql.into());
    }
}

impl ProviderRegistry for StaticProviderRegistry {
    fn provider(&self, name: &str) -> Option<&ProviderDocument> {
        self.providers.get(name)
    }

    fn provider_names(&self) -> Vec<String> {
        self.providers.keys().cloned().collect()
    }

    fn view_definition(&self, name: &str) -> Option<&str> {
        self.views
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::{ProviderDocument, ProviderRegistry, SqlVerb, StaticProviderRegistry};

    const DOCUMENT: &str = r#"{
        "name": "google",
        "services": {
            "compute": {
                "server_variables": ["region"],
                "resources": {
                    "instances": {
                        "columns": ["id", "name", "zone"],
                        "methods": [
                            {
                                "name": "list",
                                "sql_verb": "select",
                                "path": "/projects/{project}/zones/{zone}/instances",
                                "required_params": ["project", "zone"]
                            }
                        ]
                    }
                }
            }
        }
    }"#;

    #[test]
    fn provider_documents_load_from_json() {
        let document = ProviderDocument::from_json_str(DOCUMENT).expect("document parses");
        let method = &document.services["compute"].resources["instances"].methods[0];
        assert_eq!(method.sql_verb, SqlVerb::Select);
        assert_eq!(method.http_method, "GET");
        assert!(method.accepts("zone"));
        assert!(!method.accepts("name"));
    }

    #[test]
    fn views_are_case_insensitive() {
        let registry = StaticProviderRegistry::new().with_view("Running_VMs", "SELECT 1");
        assert_eq!(registry.view_definition("running_vms"), Some("SELECT 1"));
        assert!(registry.provider("google").is_none());
    }

    #[test]
    fn invalid_documents_are_config_errors() {
        let mut registry = StaticProviderRegistry::new();
        let error = registry
            .register_provider_json("{\"services\": {}}")
            .expect_err("name is required");
        assert_eq!(error.code, crate::errors::ErrorCode::InvalidConfig);
    }
}

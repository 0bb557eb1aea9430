//! Fixtures shared by unit tests.

use std::collections::BTreeMap;

use sqlparser::ast::SetExpr;

use crate::analysis::{analyze_select, AnnotatedAst, IndirectScope, SelectAnalysis};
use crate::parameters::ParameterMap;
use crate::sql::{parse_single_query, parse_statements};
use crate::taxonomy::{ProviderDocument, StaticProviderRegistry};

pub(crate) const CLOUD_PROVIDER: &str = r#"{
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

pub(crate) fn cloud_registry() -> StaticProviderRegistry {
    StaticProviderRegistry::new()
        .with_provider(ProviderDocument::from_json_str(CLOUD_PROVIDER).expect("fixture parses"))
}

/// Early analysis of a single SELECT against `registry`.
pub(crate) fn analyse_select(
    sql: &str,
    registry: &StaticProviderRegistry,
) -> (AnnotatedAst, SelectAnalysis) {
    let mut aast = AnnotatedAst::new(parse_statements(sql).expect("parse").remove(0));
    let SetExpr::Select(select) = *parse_single_query(sql).expect("parse").body else {
        panic!("expected a plain SELECT");
    };
    let ctes = BTreeMap::new();
    let scope = IndirectScope {
        registry,
        ctes: &ctes,
        depth: 0,
        max_depth: 8,
    };
    let analysis = analyze_select(&mut aast, &select, &ParameterMap::new(), &scope, None)
        .expect("analysis succeeds");
    (aast, analysis)
}

use std::collections::BTreeSet;

use tracing::debug;

use super::hierarchy::{Hierarchy, HierarchyIdentifiers};
use super::registry::{MethodDocument, ProviderRegistry, SqlVerb};
use crate::errors;
use crate::FedqlError;

/// How hard method selection insists on required parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionMode {
    /// Only methods whose required parameters are all available.
    Strict,
    /// Falls back to the method missing the fewest required parameters,
    /// leaving the gap to be reported by the final parameter check.
    ClosestMatch,
}

/// Maps a dotted table name onto provider coordinates: `provider.service.resource`,
/// or `service.resource` when a default provider is configured.
pub fn resolve_resource_terminal(
    parts: &[String],
    default_provider: Option<&str>,
) -> Option<HierarchyIdentifiers> {
    match parts {
        [provider, service, resource] => {
            Some(HierarchyIdentifiers::new(provider, service, resource))
        }
        [service, resource] => default_provider
            .map(|provider| HierarchyIdentifiers::new(provider, service, resource)),
        _ => None,
    }
}

/// Picks the method serving `verb` on `identifiers` given the parameter
/// names on offer, and returns the names the method did not use.
pub fn resolve_hierarchy(
    registry: &dyn ProviderRegistry,
    identifiers: &HierarchyIdentifiers,
    available: &BTreeSet<String>,
    verb: SqlVerb,
    method_hint: Option<&str>,
    mode: ResolutionMode,
) -> Result<(Hierarchy, BTreeSet<String>), FedqlError> {
    let table = identifiers.table_name();
    let provider = registry.provider(&identifiers.provider).ok_or_else(|| {
        errors::unresolvable_hierarchy_error(
            &table,
            &format!("provider `{}` is not registered", identifiers.provider),
        )
    })?;
    let service = provider.services.get(&identifiers.service).ok_or_else(|| {
        errors::unresolvable_hierarchy_error(
            &table,
            &format!("service `{}` does not exist", identifiers.service),
        )
    })?;
    let resource = service.resources.get(&identifiers.resource).ok_or_else(|| {
        errors::unresolvable_hierarchy_error(
            &table,
            &format!("resource `{}` does not exist", identifiers.resource),
        )
    })?;

    let candidates = resource
        .methods
        .iter()
        .filter(|method| method.sql_verb == verb)
        .filter(|method| method_hint.map_or(true, |hint| method.name == hint))
        .collect::<Vec<_>>();
    if candidates.is_empty() {
        let detail = match method_hint {
            Some(hint) => format!("no `{verb}` method named `{hint}`"),
            None => format!("no method serves `{verb}`"),
        };
        return Err(errors::unresolvable_hierarchy_error(&table, &detail));
    }

    let chosen = match best_satisfied_method(&candidates, available) {
        Some(method) => method,
        None if mode == ResolutionMode::ClosestMatch => closest_method(&candidates, available),
        None => {
            let detail = candidates
                .iter()
                .map(|method| {
                    format!(
                        "`{}` requires [{}]",
                        method.name,
                        method.required_params.join(", ")
                    )
                })
                .collect::<Vec<_>>()
                .join("; ");
            return Err(errors::unresolvable_hierarchy_error(
                &table,
                &format!("no method matches the supplied parameters ({detail})"),
            ));
        }
    };

    let remaining = available
        .iter()
        .filter(|name| !method_uses(chosen, name))
        .filter(|name| !service.server_variables.contains(name))
        .cloned()
        .collect::<BTreeSet<_>>();

    debug!(
        table = %table,
        method = %chosen.name,
        remaining = remaining.len(),
        "resolved table to method"
    );

    Ok((
        Hierarchy::new(
            identifiers.clone(),
            chosen.clone(),
            resource.columns.clone(),
            service.server_variables.clone(),
        ),
        remaining,
    ))
}

fn method_uses(method: &MethodDocument, name: &str) -> bool {
    // Writes send unrecognised columns in the request body.
    method.accepts(name) || matches!(method.sql_verb, SqlVerb::Insert | SqlVerb::Update)
}

fn best_satisfied_method<'a>(
    candidates: &[&'a MethodDocument],
    available: &BTreeSet<String>,
) -> Option<&'a MethodDocument> {
    let mut best: Option<(&MethodDocument, usize)> = None;
    for method in candidates {
        if !method
            .required_params
            .iter()
            .all(|param| available.contains(param))
        {
            continue;
        }
        let used = available.iter().filter(|name| method.accepts(name)).count();
        if best.map_or(true, |(_, best_used)| used > best_used) {
            best = Some((method, used));
        }
    }
    best.map(|(method, _)| method)
}

fn closest_method<'a>(
    candidates: &[&'a MethodDocument],
    available: &BTreeSet<String>,
) -> &'a MethodDocument {
    let mut best = candidates[0];
    let mut best_missing = usize::MAX;
    for method in candidates {
        let missing = method
            .required_params
            .iter()
            .filter(|param| !available.contains(*param))
            .count();
        if missing < best_missing {
            best = method;
            best_missing = missing;
        }
    }
    best
}

/// Required parameters of `hierarchy` absent from `supplied`.
pub fn missing_required_params(hierarchy: &Hierarchy, supplied: &BTreeSet<String>) -> Vec<String> {
    hierarchy
        .method()
        .required_params
        .iter()
        .filter(|param| !supplied.contains(*param))
        .filter(|param| !hierarchy.server_variables().contains(param))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use super::{resolve_hierarchy, resolve_resource_terminal, ResolutionMode};
    use crate::errors::ErrorCode;
    use crate::taxonomy::registry::{ProviderDocument, SqlVerb, StaticProviderRegistry};

    fn registry() -> StaticProviderRegistry {
        let document = ProviderDocument::from_json_str(
            r#"{
                "name": "cloud",
                "services": {
                    "compute": {
                        "server_variables": ["region"],
                        "resources": {
                            "instances": {
                                "columns": ["id", "name"],
                                "methods": [
                                    {"name": "aggregated", "sql_verb": "select", "path": "/i",
                                     "required_params": ["project"]},
                                    {"name": "list", "sql_verb": "select", "path": "/i/{zone}",
                                     "required_params": ["project", "zone"],
                                     "optional_params": ["filter"]},
                                    {"name": "insert", "sql_verb": "insert", "path": "/i",
                                     "http_method": "POST", "required_params": ["project"]}
                                ]
                            }
                        }
                    }
                }
            }"#,
        )
        .expect("document parses");
        StaticProviderRegistry::new().with_provider(document)
    }

    fn names(values: &[&str]) -> BTreeSet<String> {
        values.iter().map(|value| value.to_string()).collect()
    }

    #[test]
    fn terminal_uses_default_provider_for_two_parts() {
        let parts = vec!["compute".to_string(), "instances".to_string()];
        assert!(resolve_resource_terminal(&parts, None).is_none());
        let identifiers =
            resolve_resource_terminal(&parts, Some("cloud")).expect("default provider applies");
        assert_eq!(identifiers.table_name(), "cloud.compute.instances");
    }

    #[test]
    fn prefers_method_consuming_most_parameters() {
        let identifiers = resolve_resource_terminal(
            &["cloud".into(), "compute".into(), "instances".into()],
            None,
        )
        .unwrap();
        let (hierarchy, remaining) = resolve_hierarchy(
            &registry(),
            &identifiers,
            &names(&["project", "zone", "name", "region"]),
            SqlVerb::Select,
            None,
            ResolutionMode::Strict,
        )
        .expect("list matches");
        assert_eq!(hierarchy.method().name, "list");
        assert_eq!(remaining, names(&["name"]));
        assert_eq!(hierarchy.identifiers().method.as_deref(), Some("list"));
    }

    #[test]
    fn staged_columns_append_request_only_parameters() {
        let identifiers = resolve_resource_terminal(
            &["cloud".into(), "compute".into(), "instances".into()],
            None,
        )
        .unwrap();
        let (hierarchy, _) = resolve_hierarchy(
            &registry(),
            &identifiers,
            &names(&["project", "zone"]),
            SqlVerb::Select,
            None,
            ResolutionMode::Strict,
        )
        .expect("list matches");
        assert_eq!(hierarchy.response_columns(), ["id", "name"]);
        assert_eq!(
            hierarchy.staged_columns(),
            ["id", "name", "project", "zone", "filter"]
        );
    }

    #[test]
    fn strict_mode_rejects_missing_required() {
        let identifiers = resolve_resource_terminal(
            &["cloud".into(), "compute".into(), "instances".into()],
            None,
        )
        .unwrap();
        let error = resolve_hierarchy(
            &registry(),
            &identifiers,
            &names(&["zone"]),
            SqlVerb::Select,
            None,
            ResolutionMode::Strict,
        )
        .expect_err("project is missing");
        assert_eq!(error.code, ErrorCode::AmbiguousOrUnresolvableHierarchy);
        assert!(error.description.contains("DESCRIBE"));

        let (closest, _) = resolve_hierarchy(
            &registry(),
            &identifiers,
            &names(&["zone"]),
            SqlVerb::Select,
            None,
            ResolutionMode::ClosestMatch,
        )
        .expect("closest match tolerates gaps");
        assert_eq!(closest.method().name, "aggregated");
    }

    #[test]
    fn unknown_resource_is_unresolvable() {
        let identifiers = resolve_resource_terminal(
            &["cloud".into(), "compute".into(), "disks".into()],
            None,
        )
        .unwrap();
        let error = resolve_hierarchy(
            &registry(),
            &identifiers,
            &BTreeSet::new(),
            SqlVerb::Select,
            None,
            ResolutionMode::ClosestMatch,
        )
        .expect_err("disks is not registered");
        assert_eq!(error.code, ErrorCode::AmbiguousOrUnresolvableHierarchy);
    }

    #[test]
    fn insert_columns_are_never_remaining() {
        let identifiers = resolve_resource_terminal(
            &["cloud".into(), "compute".into(), "instances".into()],
            None,
        )
        .unwrap();
        let (hierarchy, remaining) = resolve_hierarchy(
            &registry(),
            &identifiers,
            &names(&["project", "name", "machine_type"]),
            SqlVerb::Insert,
            None,
            ResolutionMode::Strict,
        )
        .expect("insert matches");
        assert_eq!(hierarchy.method().name, "insert");
        assert!(remaining.is_empty());
    }
}

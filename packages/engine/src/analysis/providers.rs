use std::collections::BTreeSet;
use std::ops::ControlFlow;

use sqlparser::ast::{ObjectName, Visit, Visitor};

use crate::sql::object_name_parts;
use crate::taxonomy::{resolve_resource_terminal, HierarchyIdentifiers, ProviderRegistry};

/// Provider coordinates of `parts` when the name points at a registered
/// provider.
pub(crate) fn provider_identifiers(
    parts: &[String],
    registry: &dyn ProviderRegistry,
    default_provider: Option<&str>,
) -> Option<HierarchyIdentifiers> {
    let identifiers = resolve_resource_terminal(parts, default_provider)?;
    registry.provider(&identifiers.provider)?;
    Some(identifiers)
}

/// `provider.service.resource` of every provider table named anywhere in
/// `node`, subqueries included.
pub(crate) fn collect_provider_strings<V: Visit>(
    node: &V,
    registry: &dyn ProviderRegistry,
    default_provider: Option<&str>,
) -> BTreeSet<String> {
    let mut collector = ProviderStringCollector {
        registry,
        default_provider,
        found: BTreeSet::new(),
    };
    let _ = node.visit(&mut collector);
    collector.found
}

struct ProviderStringCollector<'a> {
    registry: &'a dyn ProviderRegistry,
    default_provider: Option<&'a str>,
    found: BTreeSet<String>,
}

impl Visitor for ProviderStringCollector<'_> {
    type Break = ();

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<Self::Break> {
        let parts = object_name_parts(relation);
        if let Some(identifiers) = provider_identifiers(&parts, self.registry, self.default_provider) {
            self.found.insert(identifiers.table_name());
        }
        ControlFlow::Continue(())
    }
}

use std::collections::{BTreeMap, BTreeSet};

use super::{ColumnarReference, ParamSourceType, ParameterMap, ParameterMetadata, ParameterValue};
use crate::errors;
use crate::ids::ReferenceId;
use crate::{FedqlError, Value};

/// The parameters offered to one candidate table, addressable by their
/// abbreviated names.
#[derive(Debug, Clone, Default)]
pub struct TableParameterCoupling {
    params: ParameterMap,
    names: BTreeMap<String, ReferenceId>,
}

impl TableParameterCoupling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(
        &mut self,
        key: &ColumnarReference,
        metadata: ParameterMetadata,
        source: ParamSourceType,
    ) -> Result<(), FedqlError> {
        let name = key.abbreviate();
        if self.names.contains_key(&name) {
            return Err(errors::duplicate_parameter_error(&name));
        }
        let typed = key.with_source_type(source);
        self.names.insert(name, typed.id());
        self.params.set(typed, metadata);
        Ok(())
    }

    pub fn params(&self) -> &ParameterMap {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn names(&self) -> BTreeSet<String> {
        self.names.keys().cloned().collect()
    }

    pub fn contains_name(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }

    pub fn get_by_name(&self, name: &str) -> Option<(&ColumnarReference, &ParameterMetadata)> {
        let id = *self.names.get(name)?;
        let key = self.params.key_by_id(id)?;
        let metadata = self.params.get_by_id(id)?;
        Some((key, metadata))
    }

    /// Abbreviated name to metadata, leaving out parameters compared against
    /// a NULL literal. Does not modify the coupling.
    pub fn abbreviate_map(&self) -> BTreeMap<String, ParameterMetadata> {
        self.names
            .iter()
            .filter_map(|(name, id)| {
                let metadata = self.params.get_by_id(*id)?;
                if matches!(metadata.value(), Some(ParameterValue::Literal(Value::Null))) {
                    return None;
                }
                Some((name.clone(), metadata.clone()))
            })
            .collect()
    }

    /// Given the names method resolution did not use, returns the parameters
    /// that were consumed.
    pub fn reconstitute_consumed_params(
        &self,
        remainder: &BTreeSet<String>,
    ) -> Result<TableParameterCoupling, FedqlError> {
        let mut consumed = self.clone();
        for name in remainder {
            let key = self
                .names
                .get(name)
                .and_then(|id| self.params.key_by_id(*id))
                .ok_or_else(|| errors::unknown_reconstitution_key_error(name))?;
            consumed.remove(key);
        }
        Ok(consumed)
    }

    fn remove(&mut self, key: &ColumnarReference) {
        self.params.delete(key);
        self.names.retain(|_, id| *id != key.id());
    }

    pub fn on_coupling(&self) -> TableParameterCoupling {
        self.filtered(|source| source == ParamSourceType::JoinOnParam)
    }

    pub fn not_on_coupling(&self) -> TableParameterCoupling {
        self.filtered(|source| source != ParamSourceType::JoinOnParam)
    }

    fn filtered(&self, keep: impl Fn(ParamSourceType) -> bool) -> TableParameterCoupling {
        let mut out = TableParameterCoupling::new();
        for (name, id) in &self.names {
            let (Some(key), Some(metadata)) = (self.params.key_by_id(*id), self.params.get_by_id(*id))
            else {
                continue;
            };
            if keep(key.source_type()) {
                out.names.insert(name.clone(), *id);
                out.params.set(key.clone(), metadata.clone());
            }
        }
        out
    }
}

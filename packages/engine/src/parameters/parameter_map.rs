use std::collections::{BTreeMap, HashMap};

use sqlparser::ast::Expr;

use super::{ColumnarReference, ParamSourceType, ParameterMetadata};
use crate::ids::ReferenceId;
use crate::FedqlError;

/// Parameters keyed by reference identity, iterated in insertion order.
#[derive(Debug, Clone, Default)]
pub struct ParameterMap {
    entries: Vec<(ColumnarReference, ParameterMetadata)>,
    positions: HashMap<ReferenceId, usize>,
}

impl ParameterMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the key from `expr` and stores `metadata` under it.
    pub fn set_expr(
        &mut self,
        id: ReferenceId,
        expr: &Expr,
        source: ParamSourceType,
        metadata: ParameterMetadata,
    ) -> Result<ColumnarReference, FedqlError> {
        let key = ColumnarReference::from_expr(id, expr, source)?;
        self.set(key.clone(), metadata);
        Ok(key)
    }

    /// Stores `metadata` under `key`, replacing an entry with the same
    /// identity. The key's shape was checked when it was built.
    pub fn set(&mut self, key: ColumnarReference, metadata: ParameterMetadata) {
        match self.positions.get(&key.id()) {
            Some(position) => self.entries[*position] = (key, metadata),
            None => {
                self.positions.insert(key.id(), self.entries.len());
                self.entries.push((key, metadata));
            }
        }
    }

    pub fn get(&self, key: &ColumnarReference) -> Option<&ParameterMetadata> {
        self.get_by_id(key.id())
    }

    pub fn get_by_id(&self, id: ReferenceId) -> Option<&ParameterMetadata> {
        self.positions
            .get(&id)
            .map(|position| &self.entries[*position].1)
    }

    pub(crate) fn get_mut_by_id(&mut self, id: ReferenceId) -> Option<&mut ParameterMetadata> {
        let position = *self.positions.get(&id)?;
        Some(&mut self.entries[position].1)
    }

    pub fn key_by_id(&self, id: ReferenceId) -> Option<&ColumnarReference> {
        self.positions
            .get(&id)
            .map(|position| &self.entries[*position].0)
    }

    pub fn contains(&self, key: &ColumnarReference) -> bool {
        self.positions.contains_key(&key.id())
    }

    pub fn delete(&mut self, key: &ColumnarReference) -> Option<ParameterMetadata> {
        let position = self.positions.remove(&key.id())?;
        let (_, metadata) = self.entries.remove(position);
        for index in self.positions.values_mut() {
            if *index > position {
                *index -= 1;
            }
        }
        Some(metadata)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ColumnarReference, &ParameterMetadata)> {
        self.entries.iter().map(|(key, metadata)| (key, metadata))
    }

    pub fn keys(&self) -> impl Iterator<Item = &ColumnarReference> {
        self.entries.iter().map(|(key, _)| key)
    }

    /// Entries keyed by full reference text. Textually equal references
    /// collapse onto the one with the lowest ordinal.
    pub fn stringified(&self) -> BTreeMap<String, &ParameterMetadata> {
        self.project(ColumnarReference::string_key)
    }

    /// Entries keyed by unqualified name, collapsing like [`Self::stringified`].
    pub fn abbreviated(&self) -> BTreeMap<String, &ParameterMetadata> {
        self.project(ColumnarReference::abbreviate)
    }

    fn project(
        &self,
        key_fn: impl Fn(&ColumnarReference) -> String,
    ) -> BTreeMap<String, &ParameterMetadata> {
        let mut out: BTreeMap<String, &ParameterMetadata> = BTreeMap::new();
        for (key, metadata) in &self.entries {
            let projected = key_fn(key);
            match out.get(&projected) {
                Some(existing) if existing.ordinal() <= metadata.ordinal() => {}
                _ => {
                    out.insert(projected, metadata);
                }
            }
        }
        out
    }

    /// Adds every entry of `other` not already present.
    pub fn merge(&mut self, other: &ParameterMap) {
        for (key, metadata) in other.iter() {
            if !self.contains(key) {
                self.set(key.clone(), metadata.clone());
            }
        }
    }

    pub fn filter(&self, predicate: impl Fn(&ColumnarReference, &ParameterMetadata) -> bool) -> Self {
        let mut out = Self::new();
        for (key, metadata) in self.iter() {
            if predicate(key, metadata) {
                out.set(key.clone(), metadata.clone());
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use sqlparser::ast::{Expr, Ident};

    use super::ParameterMap;
    use crate::errors::ErrorCode;
    use crate::ids::{ComparisonId, ReferenceId};
    use crate::parameters::{
        ComparisonParameter, ParamSourceType, ParameterMetadata, ParameterValue,
    };
    use crate::Value;

    fn column(parts: &[&str]) -> Expr {
        Expr::CompoundIdentifier(parts.iter().map(|part| Ident::new(*part)).collect())
    }

    fn literal(ordinal: usize, text: &str) -> ParameterMetadata {
        ParameterMetadata::Comparison(ComparisonParameter::new(
            ComparisonId(ordinal),
            ParameterValue::Literal(Value::Text(text.to_string())),
            ordinal,
        ))
    }

    #[test]
    fn textually_identical_columns_are_distinct_entries() {
        let mut map = ParameterMap::new();
        let expr = column(&["a", "id"]);
        map.set_expr(ReferenceId(0), &expr, ParamSourceType::WhereParam, literal(0, "x"))
            .expect("column key");
        map.set_expr(ReferenceId(1), &expr, ParamSourceType::WhereParam, literal(1, "y"))
            .expect("column key");
        assert_eq!(map.len(), 2);
        assert_eq!(map.stringified().len(), 1);
    }

    #[test]
    fn stringified_keeps_lowest_ordinal() {
        let mut map = ParameterMap::new();
        let expr = column(&["a", "id"]);
        map.set_expr(ReferenceId(5), &expr, ParamSourceType::WhereParam, literal(3, "late"))
            .unwrap();
        map.set_expr(ReferenceId(6), &expr, ParamSourceType::WhereParam, literal(1, "early"))
            .unwrap();
        let stringified = map.stringified();
        let kept = stringified.get("a.id").expect("key present");
        assert_eq!(
            kept.value(),
            Some(&ParameterValue::Literal(Value::Text("early".to_string())))
        );
    }

    #[test]
    fn delete_keeps_positions_consistent() {
        let mut map = ParameterMap::new();
        let first = map
            .set_expr(ReferenceId(0), &column(&["a"]), ParamSourceType::Unknown, literal(0, "1"))
            .unwrap();
        let second = map
            .set_expr(ReferenceId(1), &column(&["b"]), ParamSourceType::Unknown, literal(1, "2"))
            .unwrap();
        assert!(map.delete(&first).is_some());
        assert!(map.delete(&first).is_none());
        assert!(map.get(&second).is_some());
        assert_eq!(map.keys().map(|key| key.name()).collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn set_rejects_non_column_keys() {
        let mut map = ParameterMap::new();
        let expr = Expr::Value(sqlparser::ast::Value::Boolean(true).into());
        let error = map
            .set_expr(ReferenceId(0), &expr, ParamSourceType::Unknown, literal(0, "x"))
            .expect_err("a literal is not a column");
        assert_eq!(error.code, ErrorCode::UnsupportedKeyType);
        assert!(map.is_empty());
    }
}

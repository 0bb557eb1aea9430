use std::fmt;
use std::hash::{Hash, Hasher};
use std::cell::Cell;
use std::rc::Rc;

use sqlparser::ast::{Expr, Ident};

use crate::errors;
use crate::ids::ReferenceId;
use crate::FedqlError;

/// Where a parameter reference was found.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ParamSourceType {
    #[default]
    Unknown,
    WhereParam,
    JoinOnParam,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReferenceShape {
    Column(Vec<Ident>),
    BoundIdent(Ident),
}

/// A column (optionally alias qualified) or bare identifier used as a
/// parameter key.
///
/// Two references are the same key only when they come from the same AST
/// occurrence; the text is irrelevant to identity.
#[derive(Debug, Clone)]
pub struct ColumnarReference {
    id: ReferenceId,
    shape: ReferenceShape,
    source: ParamSourceType,
    consumed: Rc<Cell<bool>>,
}

impl ColumnarReference {
    pub fn from_expr(
        id: ReferenceId,
        expr: &Expr,
        source: ParamSourceType,
    ) -> Result<Self, FedqlError> {
        let shape = match expr {
            Expr::Identifier(ident) => ReferenceShape::Column(vec![ident.clone()]),
            Expr::CompoundIdentifier(idents) if !idents.is_empty() => {
                ReferenceShape::Column(idents.clone())
            }
            other => return Err(errors::unsupported_key_type_error(&other.to_string())),
        };
        Ok(Self::with_shape(id, shape, source))
    }

    pub fn from_ident(id: ReferenceId, ident: &Ident, source: ParamSourceType) -> Self {
        Self::with_shape(id, ReferenceShape::BoundIdent(ident.clone()), source)
    }

    fn with_shape(id: ReferenceId, shape: ReferenceShape, source: ParamSourceType) -> Self {
        Self {
            id,
            shape,
            source,
            consumed: Rc::new(Cell::new(false)),
        }
    }

    pub fn id(&self) -> ReferenceId {
        self.id
    }

    pub fn source_type(&self) -> ParamSourceType {
        self.source
    }

    pub(crate) fn with_source_type(&self, source: ParamSourceType) -> Self {
        Self {
            source,
            ..self.clone()
        }
    }

    /// Full dotted text of the reference, e.g. `a.id`.
    pub fn string_key(&self) -> String {
        match &self.shape {
            ReferenceShape::Column(idents) => idents
                .iter()
                .map(|ident| ident.value.as_str())
                .collect::<Vec<_>>()
                .join("."),
            ReferenceShape::BoundIdent(ident) => ident.value.clone(),
        }
    }

    /// Unqualified column name.
    pub fn name(&self) -> &str {
        match &self.shape {
            ReferenceShape::Column(idents) => idents
                .last()
                .map(|ident| ident.value.as_str())
                .unwrap_or_default(),
            ReferenceShape::BoundIdent(ident) => &ident.value,
        }
    }

    /// Table alias qualifying the column, if any.
    pub fn alias(&self) -> Option<&str> {
        match &self.shape {
            ReferenceShape::Column(idents) if idents.len() >= 2 => {
                Some(idents[idents.len() - 2].value.as_str())
            }
            _ => None,
        }
    }

    /// Key under which the reference is offered to method resolution.
    pub fn abbreviate(&self) -> String {
        match &self.shape {
            ReferenceShape::Column(_) => self.name().to_string(),
            ReferenceShape::BoundIdent(_) => self.string_key(),
        }
    }

    pub fn is_consumed(&self) -> bool {
        self.consumed.get()
    }

    pub(crate) fn mark_consumed(&self) {
        self.consumed.set(true);
    }
}

impl PartialEq for ColumnarReference {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ColumnarReference {}

impl Hash for ColumnarReference {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for ColumnarReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.string_key())
    }
}

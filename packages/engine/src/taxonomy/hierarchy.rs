use std::fmt;

use super::registry::{MethodDocument, SqlVerb};

/// Provider / service / resource / method coordinates of a table.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HierarchyIdentifiers {
    pub provider: String,
    pub service: String,
    pub resource: String,
    pub method: Option<String>,
    pub response_schema: Option<String>,
    pub is_view: bool,
}

impl HierarchyIdentifiers {
    pub fn new(
        provider: impl Into<String>,
        service: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            provider: provider.into(),
            service: service.into(),
            resource: resource.into(),
            method: None,
            response_schema: None,
            is_view: false,
        }
    }

    /// `provider.service.resource`.
    pub fn table_name(&self) -> String {
        format!("{}.{}.{}", self.provider, self.service, self.resource)
    }
}

impl fmt::Display for HierarchyIdentifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.table_name())?;
        if let Some(method) = &self.method {
            write!(f, ".{method}")?;
        }
        Ok(())
    }
}

/// A table resolved down to the method that will serve it.
#[derive(Debug, Clone, PartialEq)]
pub struct Hierarchy {
    identifiers: HierarchyIdentifiers,
    method: MethodDocument,
    resource_columns: Vec<String>,
    server_variables: Vec<String>,
}

impl Hierarchy {
    pub(crate) fn new(
        mut identifiers: HierarchyIdentifiers,
        method: MethodDocument,
        resource_columns: Vec<String>,
        server_variables: Vec<String>,
    ) -> Self {
        identifiers.method = Some(method.name.clone());
        identifiers.response_schema = method.response_schema.clone();
        Self {
            identifiers,
            method,
            resource_columns,
            server_variables,
        }
    }

    pub fn identifiers(&self) -> &HierarchyIdentifiers {
        &self.identifiers
    }

    pub fn method(&self) -> &MethodDocument {
        &self.method
    }

    pub fn verb(&self) -> SqlVerb {
        self.method.sql_verb
    }

    pub fn server_variables(&self) -> &[String] {
        &self.server_variables
    }

    /// Columns of the rows this method returns.
    pub fn response_columns(&self) -> &[String] {
        if self.method.columns.is_empty() {
            &self.resource_columns
        } else {
            &self.method.columns
        }
    }

    pub fn has_response_column(&self, name: &str) -> bool {
        self.response_columns()
            .iter()
            .any(|column| column.eq_ignore_ascii_case(name))
    }

    /// Response columns followed by the request parameters the response does
    /// not carry. Those are staged from the request each row came from, so
    /// join conditions and projections can still refer to them.
    pub fn staged_columns(&self) -> Vec<String> {
        let mut columns = self.response_columns().to_vec();
        for param in self
            .method
            .required_params
            .iter()
            .chain(&self.method.optional_params)
        {
            if !columns.iter().any(|column| column.eq_ignore_ascii_case(param)) {
                columns.push(param.clone());
            }
        }
        columns
    }
}

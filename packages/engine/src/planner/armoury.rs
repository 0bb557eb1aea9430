use std::collections::BTreeMap;

use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Serialize;

use crate::errors;
use crate::taxonomy::Hierarchy;
use crate::types::ParameterRow;
use crate::{FedqlError, Value};

/// One remote call, fully rendered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HttpRequest {
    pub method: String,
    pub path: String,
    pub query: BTreeMap<String, String>,
    pub body: Option<serde_json::Value>,
    /// The parameter row the request was rendered from.
    pub parameters: ParameterRow,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HttpArmoury {
    pub requests: Vec<HttpRequest>,
}

impl HttpArmoury {
    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}

/// Everything outside the RFC 3986 unreserved set is escaped inside a path
/// segment.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// Renders a method's requests from parameter rows, one request per row.
pub trait ArmouryBuilder {
    fn build(&self, hierarchy: &Hierarchy, rows: &[ParameterRow]) -> Result<HttpArmoury, FedqlError>;
}

/// Fills `{name}` path segments from the row; the remaining parameters go to
/// the query string for reads and deletes, to a JSON body otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct TemplateArmouryBuilder;

impl ArmouryBuilder for TemplateArmouryBuilder {
    fn build(&self, hierarchy: &Hierarchy, rows: &[ParameterRow]) -> Result<HttpArmoury, FedqlError> {
        let method = hierarchy.method();
        let http_method = method.http_method.to_ascii_uppercase();
        let sends_body = matches!(http_method.as_str(), "POST" | "PUT" | "PATCH");
        let mut requests = Vec::with_capacity(rows.len());
        for row in rows {
            let (path, used) = render_path(&method.path, row, hierarchy.server_variables())
                .map_err(|name| {
                    errors::armoury_construction_error(format!(
                        "`{}` needs `{name}` for its request path `{}`",
                        hierarchy.identifiers(),
                        method.path
                    ))
                })?;
            let remaining = row
                .iter()
                .filter(|(name, value)| !used.contains(*name) && !value.is_null());
            let (query, body) = if sends_body {
                let body = remaining
                    .map(|(name, value)| (name.clone(), value.to_json()))
                    .collect::<serde_json::Map<_, _>>();
                (BTreeMap::new(), Some(serde_json::Value::Object(body)))
            } else {
                let query = remaining
                    .map(|(name, value)| (name.clone(), value.to_string()))
                    .collect::<BTreeMap<_, _>>();
                (query, None)
            };
            requests.push(HttpRequest {
                method: http_method.clone(),
                path,
                query,
                body,
                parameters: row.clone(),
            });
        }
        Ok(HttpArmoury { requests })
    }
}

/// Substitutes `{name}` segments with percent-encoded values. Server variables without a value stay as
/// written for the transport to fill; any other gap is returned as `Err`.
fn render_path(
    template: &str,
    row: &ParameterRow,
    server_variables: &[String],
) -> Result<(String, Vec<String>), String> {
    let mut path = String::with_capacity(template.len());
    let mut used = Vec::new();
    let mut rest = template;
    while let Some(start) = rest.find('{') {
        let Some(length) = rest[start..].find('}') else {
            break;
        };
        let name = &rest[start + 1..start + length];
        path.push_str(&rest[..start]);
        match row.get(name).filter(|value| !value.is_null()) {
            Some(value) => {
                path.extend(utf8_percent_encode(&value.to_string(), PATH_SEGMENT));
                used.push(name.to_string());
            }
            None if server_variables.iter().any(|variable| variable == name) => {
                path.push_str(&rest[start..=start + length]);
            }
            None => return Err(name.to_string()),
        }
        rest = &rest[start + length + 1..];
    }
    path.push_str(rest);
    Ok((path, used))
}

/// Cartesian product of the constant parameter values; a list contributes
/// one row per element. No parameters yields a single empty row.
pub fn expand_parameter_rows(params: &BTreeMap<String, Vec<Value>>) -> Vec<ParameterRow> {
    let mut rows = vec![ParameterRow::new()];
    for (name, values) in params {
        rows = rows
            .into_iter()
            .flat_map(|row| {
                values.iter().map(move |value| {
                    let mut next = row.clone();
                    next.insert(name.clone(), value.clone());
                    next
                })
            })
            .collect();
    }
    rows
}

/// Every combination of one row from `left` and one from `right`, merged.
pub(crate) fn cross_rows(left: &[ParameterRow], right: &[ParameterRow]) -> Vec<ParameterRow> {
    let mut out = Vec::with_capacity(left.len() * right.len());
    for l in left {
        for r in right {
            let mut merged = l.clone();
            merged.extend(r.iter().map(|(name, value)| (name.clone(), value.clone())));
            out.push(merged);
        }
    }
    out
}

//! Parsing of policy JSON into the typed document model
//!
//! The walker works on `serde_json::Value` so every failure can name the exact
//! field path, e.g. `$.Statement[0].Principal.Federated`.

use super::policy::{Condition, Effect, PolicyDocument, Statement};
use super::principal::{Principal, AWS_KEY, FEDERATED_KEY, SERVICE_KEY};
use crate::error::{PolicyError, Result};
use serde_json::{Map, Value};
use std::collections::BTreeSet;
use tracing::{debug, warn};

const DOCUMENT_FIELDS: &[&str] = &["Version", "Id", "Statement"];
const STATEMENT_FIELDS: &[&str] = &["Sid", "Effect", "Principal", "Action", "Condition"];

/// Options controlling how strictly input is parsed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseOptions {
    /// Reject unrecognized keys with `UnknownField` instead of skipping them
    pub strict: bool,
}

impl ParseOptions {
    pub fn strict() -> Self {
        ParseOptions { strict: true }
    }
}

/// Decode bytes as JSON and parse the document
pub(crate) fn from_slice(bytes: &[u8], options: ParseOptions) -> Result<PolicyDocument> {
    let value: Value = serde_json::from_slice(bytes)
        .map_err(|e| PolicyError::malformed("$", format!("invalid JSON: {}", e)))?;
    document_from_value(&value, options)
}

pub(crate) fn document_from_value(value: &Value, options: ParseOptions) -> Result<PolicyDocument> {
    let path = "$";
    let map = expect_object(value, path)?;
    check_fields(map, DOCUMENT_FIELDS, path, options)?;

    let version = expect_str(required(map, "Version", path)?, &field_path(path, "Version"))?;

    // Id names the document only; trust evaluation and canonical output ignore it
    if let Some(id) = map.get("Id") {
        warn!("Dropping policy Id {} at {}", id, path);
    }

    let statement_path = field_path(path, "Statement");
    let statements = match required(map, "Statement", path)? {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| statement_from_value(item, &format!("{}[{}]", statement_path, i), options))
            .collect::<Result<Vec<_>>>()?,
        // A lone statement object is allowed by the grammar
        obj @ Value::Object(_) => vec![statement_from_value(obj, &statement_path, options)?],
        other => {
            return Err(PolicyError::malformed(
                statement_path,
                format!("expected array or object, found {}", type_name(other)),
            ))
        }
    };

    debug!(
        "Parsed policy document version {} with {} statement(s)",
        version,
        statements.len()
    );

    Ok(PolicyDocument {
        version: version.to_string(),
        statements,
    })
}

fn statement_from_value(value: &Value, path: &str, options: ParseOptions) -> Result<Statement> {
    let map = expect_object(value, path)?;

    for inverted in ["NotPrincipal", "NotAction"] {
        if map.contains_key(inverted) {
            return Err(PolicyError::malformed(
                field_path(path, inverted),
                format!("{} is not supported in role trust policies", inverted),
            ));
        }
    }
    check_fields(map, STATEMENT_FIELDS, path, options)?;

    let sid = match map.get("Sid") {
        Some(v) => Some(expect_str(v, &field_path(path, "Sid"))?.to_string()),
        None => None,
    };

    let effect_path = field_path(path, "Effect");
    let effect = match expect_str(required(map, "Effect", path)?, &effect_path)? {
        "Allow" => Effect::Allow,
        "Deny" => Effect::Deny,
        other => {
            return Err(PolicyError::malformed(
                effect_path,
                format!("expected \"Allow\" or \"Deny\", found \"{}\"", other),
            ))
        }
    };

    let principal = principal_from_value(
        required(map, "Principal", path)?,
        &field_path(path, "Principal"),
    )?;

    let action = string_set(required(map, "Action", path)?, &field_path(path, "Action"))?;

    let mut statement = Statement::new(effect, principal);
    statement.sid = sid;
    statement.action = action;

    if let Some(condition) = map.get("Condition") {
        let condition_path = field_path(path, "Condition");
        let operators = expect_object(condition, &condition_path)?;
        for (operator, keys) in operators {
            let operator_path = field_path(&condition_path, operator);
            for (key, values) in expect_object(keys, &operator_path)? {
                let values = condition_values(values, &field_path(&operator_path, key))?;
                statement.add_condition(Condition::new(operator.as_str(), key.as_str(), values));
            }
        }
    }

    Ok(statement)
}

fn principal_from_value(value: &Value, path: &str) -> Result<Principal> {
    match value {
        Value::String(s) if s == "*" => Ok(Principal::Wildcard),
        Value::String(s) => Err(PolicyError::malformed(
            path,
            format!("string principal must be \"*\", found \"{}\"", s),
        )),
        Value::Object(map) => {
            if map.len() != 1 {
                return Err(PolicyError::malformed(
                    path,
                    format!(
                        "principal must name exactly one of {}, {}, {} (found {})",
                        AWS_KEY,
                        FEDERATED_KEY,
                        SERVICE_KEY,
                        map.len()
                    ),
                ));
            }
            let Some((kind, ids)) = map.iter().next() else {
                return Err(PolicyError::malformed(path, "empty principal object"));
            };
            let ids_path = field_path(path, kind);
            let ids = string_set(ids, &ids_path)?;
            match kind.as_str() {
                AWS_KEY if ids.len() == 1 && ids.contains("*") => Ok(Principal::Wildcard),
                AWS_KEY => Ok(Principal::Aws(ids)),
                FEDERATED_KEY => Ok(Principal::Federated(ids)),
                SERVICE_KEY => Ok(Principal::Service(ids)),
                other => Err(PolicyError::malformed(
                    ids_path,
                    format!("unsupported principal type \"{}\"", other),
                )),
            }
        }
        other => Err(PolicyError::malformed(
            path,
            format!("expected \"*\" or object, found {}", type_name(other)),
        )),
    }
}

/// String or array of strings
fn string_set(value: &Value, path: &str) -> Result<BTreeSet<String>> {
    match value {
        Value::String(s) => Ok(BTreeSet::from([s.clone()])),
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| {
                expect_str(item, &format!("{}[{}]", path, i)).map(str::to_string)
            })
            .collect(),
        other => Err(PolicyError::malformed(
            path,
            format!("expected string or array of strings, found {}", type_name(other)),
        )),
    }
}

/// Condition values also admit JSON booleans and numbers, stored as text
fn condition_values(value: &Value, path: &str) -> Result<BTreeSet<String>> {
    match value {
        Value::Array(items) => items
            .iter()
            .enumerate()
            .map(|(i, item)| scalar_text(item, &format!("{}[{}]", path, i)))
            .collect(),
        scalar => scalar_text(scalar, path).map(|s| BTreeSet::from([s])),
    }
}

fn scalar_text(value: &Value, path: &str) -> Result<String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(PolicyError::malformed(
            path,
            format!("expected string, boolean or number, found {}", type_name(other)),
        )),
    }
}

fn check_fields(
    map: &Map<String, Value>,
    allowed: &[&str],
    path: &str,
    options: ParseOptions,
) -> Result<()> {
    for key in map.keys() {
        if allowed.contains(&key.as_str()) {
            continue;
        }
        if options.strict {
            return Err(PolicyError::UnknownField {
                path: path.to_string(),
                field: key.clone(),
            });
        }
        warn!("Skipping unknown field '{}' at {}", key, path);
    }
    Ok(())
}

fn required<'a>(map: &'a Map<String, Value>, key: &str, path: &str) -> Result<&'a Value> {
    map.get(key)
        .ok_or_else(|| PolicyError::malformed(field_path(path, key), "required field is missing"))
}

fn expect_object<'a>(value: &'a Value, path: &str) -> Result<&'a Map<String, Value>> {
    value.as_object().ok_or_else(|| {
        PolicyError::malformed(path, format!("expected object, found {}", type_name(value)))
    })
}

fn expect_str<'a>(value: &'a Value, path: &str) -> Result<&'a str> {
    value.as_str().ok_or_else(|| {
        PolicyError::malformed(path, format!("expected string, found {}", type_name(value)))
    })
}

fn field_path(parent: &str, field: &str) -> String {
    format!("{}.{}", parent, field)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

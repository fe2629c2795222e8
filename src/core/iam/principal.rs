//! Trust policy principals
//!
//! The `Principal` element names who may assume the role. JSON allows a bare
//! `"*"` or an object with one principal type whose value is a string or an
//! array of strings.

use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// Principal type keys as they appear in policy JSON
pub const AWS_KEY: &str = "AWS";
pub const FEDERATED_KEY: &str = "Federated";
pub const SERVICE_KEY: &str = "Service";

/// Who a statement applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    /// Any principal (`"*"` or `{"AWS": "*"}`)
    Wildcard,
    /// IAM account ids or principal ARNs
    Aws(BTreeSet<String>),
    /// Identity-provider ARNs (OIDC or SAML)
    Federated(BTreeSet<String>),
    /// AWS service principals, e.g. `ec2.amazonaws.com`
    Service(BTreeSet<String>),
}

impl Principal {
    /// Federated principal for a single provider ARN
    pub fn federated(arn: impl Into<String>) -> Self {
        Principal::Federated(BTreeSet::from([arn.into()]))
    }

    /// AWS principal for a single account id or ARN
    pub fn aws(id: impl Into<String>) -> Self {
        Principal::Aws(BTreeSet::from([id.into()]))
    }

    /// Service principal for a single service name
    pub fn service(name: impl Into<String>) -> Self {
        Principal::Service(BTreeSet::from([name.into()]))
    }

    /// JSON key of this principal type (`None` for the wildcard)
    pub fn type_key(&self) -> Option<&'static str> {
        match self {
            Principal::Wildcard => None,
            Principal::Aws(_) => Some(AWS_KEY),
            Principal::Federated(_) => Some(FEDERATED_KEY),
            Principal::Service(_) => Some(SERVICE_KEY),
        }
    }

    /// Identifiers held by this principal (empty for the wildcard)
    pub fn identifiers(&self) -> Option<&BTreeSet<String>> {
        match self {
            Principal::Wildcard => None,
            Principal::Aws(ids) | Principal::Federated(ids) | Principal::Service(ids) => Some(ids),
        }
    }

    /// Add an identifier; a no-op on the wildcard
    pub fn insert(&mut self, id: impl Into<String>) {
        match self {
            Principal::Wildcard => {}
            Principal::Aws(ids) | Principal::Federated(ids) | Principal::Service(ids) => {
                ids.insert(id.into());
            }
        }
    }

    /// Provider paths (`gitlab.com`, `oidc.eks.../id/X`) of federated OIDC ARNs
    ///
    /// These prefix the provider's condition keys, as in `gitlab.com:sub`.
    pub fn oidc_provider_paths(&self) -> Vec<&str> {
        match self {
            Principal::Federated(arns) => arns
                .iter()
                .filter_map(|arn| arn.split_once(":oidc-provider/").map(|(_, path)| path))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Canonical JSON value (single identifiers collapse to a string)
    pub fn to_json_value(&self) -> Value {
        match (self.type_key(), self.identifiers()) {
            (Some(key), Some(ids)) => {
                let mut map = Map::new();
                map.insert(key.to_string(), one_or_many(ids));
                Value::Object(map)
            }
            _ => Value::String("*".to_string()),
        }
    }
}

/// A set rendered the way IAM writes it: a bare string for one element
pub(crate) fn one_or_many(values: &BTreeSet<String>) -> Value {
    if values.len() == 1 {
        values
            .iter()
            .next()
            .map(|v| Value::String(v.clone()))
            .unwrap_or(Value::Null)
    } else {
        Value::Array(values.iter().cloned().map(Value::String).collect())
    }
}

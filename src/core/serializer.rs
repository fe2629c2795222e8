//! Canonical JSON serialization
//!
//! Output key order is fixed: `Version`, `Statement`, then per statement `Sid`,
//! `Effect`, `Principal`, `Action`, `Condition`. Operators, keys and value sets
//! are sorted and a single-element set is written as a bare string, so equal
//! documents always produce identical bytes.

use crate::error::Result;
use crate::iam::{Effect, ParseOptions, PolicyDocument, Principal, Statement, ValidatedPolicy};
use crate::validation::Validator;
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, warn};

/// What `serialize_draft` does with a document that fails validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Override {
    /// Fail with `NotValidated`
    #[default]
    Refuse,
    /// Serialize anyway and log a warning
    Force,
}

#[derive(Serialize)]
struct WireDocument<'a> {
    #[serde(rename = "Version")]
    version: &'a str,
    #[serde(rename = "Statement")]
    statement: Vec<WireStatement<'a>>,
}

#[derive(Serialize)]
struct WireStatement<'a> {
    #[serde(rename = "Sid", skip_serializing_if = "Option::is_none")]
    sid: Option<&'a str>,
    #[serde(rename = "Effect")]
    effect: Effect,
    #[serde(rename = "Principal")]
    principal: WirePrincipal<'a>,
    #[serde(rename = "Action")]
    action: OneOrMany<'a>,
    #[serde(rename = "Condition", skip_serializing_if = "BTreeMap::is_empty")]
    condition: BTreeMap<&'a str, BTreeMap<&'a str, OneOrMany<'a>>>,
}

impl<'a> From<&'a Statement> for WireStatement<'a> {
    fn from(stmt: &'a Statement) -> Self {
        let mut condition: BTreeMap<&str, BTreeMap<&str, OneOrMany<'_>>> = BTreeMap::new();
        for entry in stmt.condition.iter() {
            condition
                .entry(entry.operator)
                .or_default()
                .insert(entry.key, OneOrMany(entry.values));
        }

        WireStatement {
            sid: stmt.sid.as_deref(),
            effect: stmt.effect,
            principal: WirePrincipal(&stmt.principal),
            action: OneOrMany(&stmt.action),
            condition,
        }
    }
}

struct WirePrincipal<'a>(&'a Principal);

impl Serialize for WirePrincipal<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        match (self.0.type_key(), self.0.identifiers()) {
            (Some(key), Some(ids)) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry(key, &OneOrMany(ids))?;
                map.end()
            }
            _ => serializer.serialize_str("*"),
        }
    }
}

struct OneOrMany<'a>(&'a BTreeSet<String>);

impl Serialize for OneOrMany<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut iter = self.0.iter();
        match (iter.next(), iter.next()) {
            (Some(only), None) => serializer.serialize_str(only),
            _ => {
                let mut seq = serializer.serialize_seq(Some(self.0.len()))?;
                for value in self.0 {
                    seq.serialize_element(value)?;
                }
                seq.end()
            }
        }
    }
}

fn canonical_string(doc: &PolicyDocument) -> Result<String> {
    let wire = WireDocument {
        version: &doc.version,
        statement: doc.statements.iter().map(WireStatement::from).collect(),
    };
    let mut text = serde_json::to_string_pretty(&wire)?;
    text.push('\n');
    Ok(text)
}

/// Canonical bytes of any document, validated or not
pub(crate) fn canonical_bytes(doc: &PolicyDocument) -> Result<Vec<u8>> {
    canonical_string(doc).map(String::into_bytes)
}

/// Serialize a validated policy to canonical JSON
///
/// # Examples
///
/// ```
/// use trustcheck::{serializer, Validator};
/// use trustcheck::iam::{Effect, PolicyDocument, Principal, Statement};
///
/// let doc = PolicyDocument::new().with_statement(
///     Statement::new(Effect::Allow, Principal::service("ec2.amazonaws.com"))
///         .with_action("sts:AssumeRole"),
/// );
/// let sealed = Validator::default().seal(&doc).unwrap();
/// let bytes = serializer::serialize(&sealed).unwrap();
/// assert!(String::from_utf8(bytes).unwrap().contains("\"Service\": \"ec2.amazonaws.com\""));
/// ```
pub fn serialize(policy: &ValidatedPolicy) -> Result<Vec<u8>> {
    canonical_bytes(policy.document())
}

/// Serialize a validated policy to a canonical JSON string
pub fn to_string(policy: &ValidatedPolicy) -> Result<String> {
    canonical_string(policy.document())
}

/// Serialize a draft, validating it first
///
/// With `Override::Refuse` a document with Error findings fails with
/// `NotValidated`. `Override::Force` writes it anyway.
pub fn serialize_draft(doc: &PolicyDocument, validator: &Validator, mode: Override) -> Result<Vec<u8>> {
    match mode {
        Override::Refuse => serialize(&validator.seal(doc)?),
        Override::Force => {
            let result = validator.validate(doc);
            if result.has_errors() {
                warn!(
                    "Forcing serialization of a policy with {} validation error(s)",
                    result.error_count()
                );
            }
            canonical_bytes(doc)
        }
    }
}

/// Parse JSON bytes into a draft document, skipping unknown fields
pub fn deserialize(bytes: &[u8]) -> Result<PolicyDocument> {
    deserialize_with(bytes, ParseOptions::default())
}

/// Parse JSON bytes into a draft document
pub fn deserialize_with(bytes: &[u8], options: ParseOptions) -> Result<PolicyDocument> {
    debug!("Deserializing {} byte(s)", bytes.len());
    crate::iam::parse::from_slice(bytes, options)
}

/// SHA-256 hex digest of a validated policy's canonical bytes
pub fn fingerprint(policy: &ValidatedPolicy) -> &str {
    policy.fingerprint()
}

/// SHA-256 hex digest of arbitrary bytes
pub fn fingerprint_bytes(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

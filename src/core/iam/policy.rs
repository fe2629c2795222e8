//! IAM trust policy document structure
//!
//! A document is built as a draft (`PolicyDocument`), either parsed from JSON or
//! assembled with builder calls, and becomes a `ValidatedPolicy` only by passing
//! the validator. Editing a validated policy means turning it back into a draft.

use super::parse::{self, ParseOptions};
use super::principal::Principal;
use crate::error::Result;
use crate::validation::Finding;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Policy language version used by AWS since 2012
pub const DEFAULT_VERSION: &str = "2012-10-17";

/// Effect of a policy statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Allow the action
    Allow,
    /// Deny the action (takes precedence over Allow)
    Deny,
}

impl Effect {
    pub fn as_str(&self) -> &'static str {
        match self {
            Effect::Allow => "Allow",
            Effect::Deny => "Deny",
        }
    }
}

impl fmt::Display for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single condition: operator, context key and the patterns it accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub operator: String,
    pub key: String,
    pub values: BTreeSet<String>,
}

impl Condition {
    pub fn new<I, S>(operator: impl Into<String>, key: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Condition {
            operator: operator.into(),
            key: key.into(),
            values: values.into_iter().map(Into::into).collect(),
        }
    }
}

/// Borrowed view of one entry in a condition block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConditionRef<'a> {
    pub operator: &'a str,
    pub key: &'a str,
    pub values: &'a BTreeSet<String>,
}

/// All conditions of a statement, in the IAM shape `operator -> key -> values`
///
/// Entries are kept sorted so that two blocks with the same content compare
/// equal no matter the order they were written in.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionBlock {
    entries: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
}

impl ConditionBlock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a condition, merging values into an existing operator/key entry
    pub fn insert(&mut self, condition: Condition) {
        self.entries
            .entry(condition.operator)
            .or_default()
            .entry(condition.key)
            .or_default()
            .extend(condition.values);
    }

    pub fn get(&self, operator: &str, key: &str) -> Option<&BTreeSet<String>> {
        self.entries.get(operator).and_then(|keys| keys.get(key))
    }

    pub fn remove(&mut self, operator: &str, key: &str) -> Option<BTreeSet<String>> {
        let keys = self.entries.get_mut(operator)?;
        let removed = keys.remove(key);
        if keys.is_empty() {
            self.entries.remove(operator);
        }
        removed
    }

    pub fn is_empty(&self) -> bool {
        self.entries.values().all(|keys| keys.is_empty())
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(|keys| keys.len()).sum()
    }

    /// Iterate entries sorted by operator, then key
    pub fn iter(&self) -> impl Iterator<Item = ConditionRef<'_>> {
        self.entries.iter().flat_map(|(operator, keys)| {
            keys.iter().map(move |(key, values)| ConditionRef {
                operator,
                key,
                values,
            })
        })
    }

    /// Operator names present in the block
    pub fn operators(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}

/// A single policy statement
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Statement {
    /// Statement ID (optional, unique within a document)
    pub sid: Option<String>,

    /// Effect of this statement
    pub effect: Effect,

    /// Who may assume the role
    pub principal: Principal,

    /// Actions this statement applies to, e.g. `sts:AssumeRoleWithWebIdentity`
    pub action: BTreeSet<String>,

    /// Conditions that must all hold (empty when absent)
    pub condition: ConditionBlock,
}

impl Statement {
    /// Create a statement with no actions and no conditions
    pub fn new(effect: Effect, principal: Principal) -> Self {
        Statement {
            sid: None,
            effect,
            principal,
            action: BTreeSet::new(),
            condition: ConditionBlock::new(),
        }
    }

    /// Set the statement id
    pub fn with_sid(mut self, sid: impl Into<String>) -> Self {
        self.sid = Some(sid.into());
        self
    }

    /// Add an action
    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.add_action(action);
        self
    }

    /// Add a condition
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.add_condition(condition);
        self
    }

    pub fn set_sid(&mut self, sid: Option<String>) {
        self.sid = sid;
    }

    pub fn set_effect(&mut self, effect: Effect) {
        self.effect = effect;
    }

    pub fn set_principal(&mut self, principal: Principal) {
        self.principal = principal;
    }

    pub fn add_action(&mut self, action: impl Into<String>) {
        self.action.insert(action.into());
    }

    pub fn remove_action(&mut self, action: &str) -> bool {
        self.action.remove(action)
    }

    pub fn add_condition(&mut self, condition: Condition) {
        self.condition.insert(condition);
    }

    /// Equality ignoring the statement id
    pub fn same_rule_as(&self, other: &Statement) -> bool {
        self.effect == other.effect
            && self.principal == other.principal
            && self.action == other.action
            && self.condition == other.condition
    }
}

/// Trust policy document in draft state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyDocument {
    /// Policy language version
    pub version: String,

    /// Ordered statements
    pub statements: Vec<Statement>,
}

impl PolicyDocument {
    /// Create a new empty draft with the current policy version
    pub fn new() -> Self {
        PolicyDocument {
            version: DEFAULT_VERSION.to_string(),
            statements: Vec::new(),
        }
    }

    /// Parse a draft from a JSON string (lenient: unknown fields are skipped)
    pub fn from_json(json: &str) -> Result<Self> {
        parse::from_slice(json.as_bytes(), ParseOptions::default())
    }

    /// Parse a draft from a JSON string with explicit options
    pub fn from_json_with(json: &str, options: ParseOptions) -> Result<Self> {
        parse::from_slice(json.as_bytes(), options)
    }

    /// Parse a draft from an already decoded JSON value
    pub fn from_value(value: &serde_json::Value, options: ParseOptions) -> Result<Self> {
        parse::document_from_value(value, options)
    }

    pub fn set_version(&mut self, version: impl Into<String>) {
        self.version = version.into();
    }

    /// Add a statement to this policy
    pub fn add_statement(&mut self, statement: Statement) {
        self.statements.push(statement);
    }

    /// Builder-style variant of `add_statement`
    pub fn with_statement(mut self, statement: Statement) -> Self {
        self.add_statement(statement);
        self
    }

    pub fn statement_mut(&mut self, index: usize) -> Option<&mut Statement> {
        self.statements.get_mut(index)
    }

    pub fn remove_statement(&mut self, index: usize) -> Option<Statement> {
        if index < self.statements.len() {
            Some(self.statements.remove(index))
        } else {
            None
        }
    }

    pub fn find_by_sid(&self, sid: &str) -> Option<(usize, &Statement)> {
        self.statements
            .iter()
            .enumerate()
            .find(|(_, s)| s.sid.as_deref() == Some(sid))
    }
}

impl Default for PolicyDocument {
    fn default() -> Self {
        Self::new()
    }
}

/// A document that passed validation with no Error findings
///
/// Only the validator constructs this type. The document is read-only; call
/// `into_draft` to edit it, which drops the validated stamp.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedPolicy {
    document: PolicyDocument,
    warnings: Vec<Finding>,
    fingerprint: String,
}

impl ValidatedPolicy {
    pub(crate) fn new(document: PolicyDocument, warnings: Vec<Finding>, fingerprint: String) -> Self {
        ValidatedPolicy {
            document,
            warnings,
            fingerprint,
        }
    }

    pub fn document(&self) -> &PolicyDocument {
        &self.document
    }

    pub fn statements(&self) -> &[Statement] {
        &self.document.statements
    }

    /// Warning findings surfaced by the validation pass
    pub fn warnings(&self) -> &[Finding] {
        &self.warnings
    }

    /// SHA-256 of the canonical serialization, hex encoded
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Give the document back for editing
    pub fn into_draft(self) -> PolicyDocument {
        self.document
    }
}

impl AsRef<PolicyDocument> for ValidatedPolicy {
    fn as_ref(&self) -> &PolicyDocument {
        &self.document
    }
}

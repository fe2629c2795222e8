//! Structural diff between two trust policies
//!
//! Statements are paired before their fields are compared:
//!
//! 1. by `Sid` when both sides carry the same one
//! 2. by position among sid-less statements with the same effect
//! 3. by structural equality ignoring `Sid`
//!
//! Anything left unpaired is reported as a whole-statement addition or removal.

use crate::iam::principal::one_or_many;
use crate::iam::{PolicyDocument, Statement};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use tracing::debug;

/// Kind of change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

impl ChangeKind {
    fn marker(&self) -> char {
        match self {
            ChangeKind::Added => '+',
            ChangeKind::Removed => '-',
            ChangeKind::Modified => '~',
        }
    }
}

/// One structural change from `a` to `b`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Change {
    /// Location, e.g. `Statement[sid=GitLab]/Condition/StringLike/gitlab.com:sub`
    pub path: String,
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub before: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after: Option<Value>,
}

impl Change {
    fn added(path: String, after: Value) -> Self {
        Change {
            path,
            kind: ChangeKind::Added,
            before: None,
            after: Some(after),
        }
    }

    fn removed(path: String, before: Value) -> Self {
        Change {
            path,
            kind: ChangeKind::Removed,
            before: Some(before),
            after: None,
        }
    }

    fn modified(path: String, before: Value, after: Value) -> Self {
        Change {
            path,
            kind: ChangeKind::Modified,
            before: Some(before),
            after: Some(after),
        }
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.kind.marker(), self.path)?;
        match (&self.before, &self.after) {
            (Some(before), Some(after)) => write!(f, ": {} -> {}", before, after),
            (Some(value), None) | (None, Some(value)) => write!(f, ": {}", value),
            (None, None) => Ok(()),
        }
    }
}

/// Compute the changes that turn `a` into `b`
///
/// Changes for statements of `a` come first, in `a`'s order, followed by
/// statements only present in `b`. `diff(d, d)` is always empty.
///
/// # Examples
///
/// ```
/// use trustcheck::diff::{diff, ChangeKind};
/// use trustcheck::iam::{Effect, PolicyDocument, Principal, Statement};
///
/// let stmt = Statement::new(Effect::Allow, Principal::service("ec2.amazonaws.com"))
///     .with_sid("Ec2")
///     .with_action("sts:AssumeRole");
/// let a = PolicyDocument::new().with_statement(stmt.clone());
/// let b = PolicyDocument::new().with_statement(stmt.with_action("sts:TagSession"));
///
/// let changes = diff(&a, &b);
/// assert_eq!(changes.len(), 1);
/// assert_eq!(changes[0].kind, ChangeKind::Added);
/// assert_eq!(changes[0].path, "Statement[sid=Ec2]/Action");
/// ```
pub fn diff(a: &PolicyDocument, b: &PolicyDocument) -> Vec<Change> {
    let mut changes = Vec::new();

    if a.version != b.version {
        changes.push(Change::modified(
            "Version".to_string(),
            json!(a.version),
            json!(b.version),
        ));
    }

    let pairs = pair_statements(&a.statements, &b.statements);
    let mut matched_b = vec![false; b.statements.len()];

    for (i, stmt) in a.statements.iter().enumerate() {
        let label = statement_label(stmt, i);
        match pairs[i] {
            Some(j) => {
                matched_b[j] = true;
                diff_statement(&label, stmt, &b.statements[j], &mut changes);
            }
            None => changes.push(Change::removed(label, statement_value(stmt))),
        }
    }

    for (j, stmt) in b.statements.iter().enumerate() {
        if !matched_b[j] {
            changes.push(Change::added(statement_label(stmt, j), statement_value(stmt)));
        }
    }

    debug!("Diff produced {} change(s)", changes.len());
    changes
}

/// One change per line, for review output
pub fn render(changes: &[Change]) -> String {
    changes.iter().map(|c| format!("{}\n", c)).collect()
}

/// For each statement of `a`, the index of its counterpart in `b`
fn pair_statements(a: &[Statement], b: &[Statement]) -> Vec<Option<usize>> {
    let mut pairs: Vec<Option<usize>> = vec![None; a.len()];
    let mut taken = vec![false; b.len()];

    // By sid
    for (i, stmt) in a.iter().enumerate() {
        let Some(sid) = stmt.sid.as_deref() else {
            continue;
        };
        if let Some(j) = (0..b.len()).find(|&j| !taken[j] && b[j].sid.as_deref() == Some(sid)) {
            pairs[i] = Some(j);
            taken[j] = true;
        }
    }

    // By position within same-effect groups of sid-less statements
    let mut groups: BTreeMap<_, (Vec<usize>, Vec<usize>)> = BTreeMap::new();
    for (i, stmt) in a.iter().enumerate() {
        if stmt.sid.is_none() && pairs[i].is_none() {
            groups.entry(stmt.effect).or_default().0.push(i);
        }
    }
    for (j, stmt) in b.iter().enumerate() {
        if stmt.sid.is_none() && !taken[j] {
            groups.entry(stmt.effect).or_default().1.push(j);
        }
    }
    for (left, right) in groups.values() {
        for (&i, &j) in left.iter().zip(right) {
            pairs[i] = Some(j);
            taken[j] = true;
        }
    }

    // By structure, ignoring sid
    for (i, stmt) in a.iter().enumerate() {
        if pairs[i].is_some() {
            continue;
        }
        if let Some(j) = (0..b.len()).find(|&j| !taken[j] && stmt.same_rule_as(&b[j])) {
            pairs[i] = Some(j);
            taken[j] = true;
        }
    }

    pairs
}

fn statement_label(stmt: &Statement, index: usize) -> String {
    match &stmt.sid {
        Some(sid) => format!("Statement[sid={}]", sid),
        None => format!("Statement[{}]", index),
    }
}

fn statement_value(stmt: &Statement) -> Value {
    let mut value = json!({
        "Effect": stmt.effect.as_str(),
        "Principal": stmt.principal.to_json_value(),
        "Action": one_or_many(&stmt.action),
    });
    if let Some(sid) = &stmt.sid {
        value["Sid"] = json!(sid);
    }
    if !stmt.condition.is_empty() {
        let mut condition = json!({});
        for entry in stmt.condition.iter() {
            condition[entry.operator][entry.key] = one_or_many(entry.values);
        }
        value["Condition"] = condition;
    }
    value
}

fn diff_statement(label: &str, a: &Statement, b: &Statement, changes: &mut Vec<Change>) {
    let field = |name: &str| format!("{}/{}", label, name);

    match (&a.sid, &b.sid) {
        (Some(before), Some(after)) if before != after => {
            changes.push(Change::modified(field("Sid"), json!(before), json!(after)))
        }
        (Some(before), None) => changes.push(Change::removed(field("Sid"), json!(before))),
        (None, Some(after)) => changes.push(Change::added(field("Sid"), json!(after))),
        _ => {}
    }

    if a.effect != b.effect {
        changes.push(Change::modified(
            field("Effect"),
            json!(a.effect.as_str()),
            json!(b.effect.as_str()),
        ));
    }

    if a.principal != b.principal {
        changes.push(Change::modified(
            field("Principal"),
            a.principal.to_json_value(),
            b.principal.to_json_value(),
        ));
    }

    for action in a.action.difference(&b.action) {
        changes.push(Change::removed(field("Action"), json!(action)));
    }
    for action in b.action.difference(&a.action) {
        changes.push(Change::added(field("Action"), json!(action)));
    }

    let entries = |stmt: &Statement| -> BTreeSet<(String, String)> {
        stmt.condition
            .iter()
            .map(|c| (c.operator.to_string(), c.key.to_string()))
            .collect()
    };
    let keys: BTreeSet<(String, String)> = entries(a).union(&entries(b)).cloned().collect();

    for (operator, key) in keys {
        let path = field(&format!("Condition/{}/{}", operator, key));
        match (a.condition.get(&operator, &key), b.condition.get(&operator, &key)) {
            (Some(before), Some(after)) if before != after => changes.push(Change::modified(
                path,
                one_or_many(before),
                one_or_many(after),
            )),
            (Some(before), None) => changes.push(Change::removed(path, one_or_many(before))),
            (None, Some(after)) => changes.push(Change::added(path, one_or_many(after))),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iam::{Condition, Effect, Principal};

    const GITLAB_PROVIDER: &str = "arn:aws:iam::412381736597:oidc-provider/gitlab.com";

    fn gitlab_statement(project: &str) -> Statement {
        Statement::new(Effect::Allow, Principal::federated(GITLAB_PROVIDER))
            .with_action("sts:AssumeRoleWithWebIdentity")
            .with_condition(Condition::new(
                "StringLike",
                "gitlab.com:sub",
                [format!("project_path:{}:ref_type:branch:ref:*", project)],
            ))
    }

    fn kinds_and_paths(changes: &[Change]) -> Vec<(ChangeKind, &str)> {
        changes.iter().map(|c| (c.kind, c.path.as_str())).collect()
    }

    #[test]
    fn test_identical_documents() {
        let doc = PolicyDocument::new()
            .with_statement(gitlab_statement("g/a").with_sid("A"))
            .with_statement(gitlab_statement("g/b"));
        assert!(diff(&doc, &doc).is_empty());
    }

    #[test]
    fn test_condition_modified() {
        let a = PolicyDocument::new().with_statement(gitlab_statement("g/a"));
        let b = PolicyDocument::new().with_statement(gitlab_statement("g/b"));

        let changes = diff(&a, &b);
        assert_eq!(
            kinds_and_paths(&changes),
            vec![(ChangeKind::Modified, "Statement[0]/Condition/StringLike/gitlab.com:sub")]
        );
        assert_eq!(
            changes[0].before,
            Some(json!("project_path:g/a:ref_type:branch:ref:*"))
        );
        assert_eq!(
            changes[0].to_string(),
            "~ Statement[0]/Condition/StringLike/gitlab.com:sub: \
             \"project_path:g/a:ref_type:branch:ref:*\" -> \"project_path:g/b:ref_type:branch:ref:*\""
        );
    }

    #[test]
    fn test_sid_pairing_ignores_order() {
        let a = PolicyDocument::new()
            .with_statement(gitlab_statement("g/a").with_sid("A"))
            .with_statement(gitlab_statement("g/b").with_sid("B"));
        let b = PolicyDocument::new()
            .with_statement(gitlab_statement("g/b").with_sid("B"))
            .with_statement(gitlab_statement("g/a").with_sid("A"));
        assert!(diff(&a, &b).is_empty());
    }

    #[test]
    fn test_positional_pairing_within_effect() {
        let deny = Statement::new(Effect::Deny, Principal::Wildcard).with_action("sts:AssumeRole");
        let a = PolicyDocument::new()
            .with_statement(deny.clone())
            .with_statement(gitlab_statement("g/a"));
        let b = PolicyDocument::new()
            .with_statement(gitlab_statement("g/a").with_action("sts:TagSession"))
            .with_statement(deny);

        let changes = diff(&a, &b);
        assert_eq!(
            kinds_and_paths(&changes),
            vec![(ChangeKind::Added, "Statement[1]/Action")]
        );
        assert_eq!(changes[0].after, Some(json!("sts:TagSession")));
    }

    #[test]
    fn test_structural_pairing_reports_sid() {
        let a = PolicyDocument::new().with_statement(gitlab_statement("g/a"));
        let b = PolicyDocument::new().with_statement(gitlab_statement("g/a").with_sid("GitLab"));

        let changes = diff(&a, &b);
        assert_eq!(kinds_and_paths(&changes), vec![(ChangeKind::Added, "Statement[0]/Sid")]);
    }

    #[test]
    fn test_unmatched_statements() {
        let a = PolicyDocument::new().with_statement(gitlab_statement("g/a").with_sid("Old"));
        let b = PolicyDocument::new().with_statement(gitlab_statement("g/b").with_sid("New"));

        let changes = diff(&a, &b);
        assert_eq!(
            kinds_and_paths(&changes),
            vec![
                (ChangeKind::Removed, "Statement[sid=Old]"),
                (ChangeKind::Added, "Statement[sid=New]"),
            ]
        );
        let added = changes[1].after.as_ref().unwrap();
        assert_eq!(added["Sid"], json!("New"));
        assert_eq!(added["Principal"]["Federated"], json!(GITLAB_PROVIDER));
    }

    #[test]
    fn test_version_effect_and_principal() {
        let a = PolicyDocument::new().with_statement(gitlab_statement("g/a").with_sid("S"));
        let mut b = a.clone();
        b.set_version("2008-10-17");
        let stmt = b.statement_mut(0).unwrap();
        stmt.set_effect(Effect::Deny);
        stmt.principal.insert("arn:aws:iam::412381736597:oidc-provider/gitlab.example.com");

        let changes = diff(&a, &b);
        assert_eq!(
            kinds_and_paths(&changes),
            vec![
                (ChangeKind::Modified, "Version"),
                (ChangeKind::Modified, "Statement[sid=S]/Effect"),
                (ChangeKind::Modified, "Statement[sid=S]/Principal"),
            ]
        );
        assert_eq!(
            changes[2].after,
            Some(json!({"Federated": [
                "arn:aws:iam::412381736597:oidc-provider/gitlab.com",
                "arn:aws:iam::412381736597:oidc-provider/gitlab.example.com"
            ]}))
        );
    }

    #[test]
    fn test_render() {
        let a = PolicyDocument::new().with_statement(gitlab_statement("g/a"));
        let mut b = a.clone();
        b.statement_mut(0).unwrap().add_condition(Condition::new(
            "StringEquals",
            "gitlab.com:aud",
            ["https://gitlab.com"],
        ));

        let text = render(&diff(&a, &b));
        assert_eq!(
            text,
            "+ Statement[0]/Condition/StringEquals/gitlab.com:aud: \"https://gitlab.com\"\n"
        );
        assert_eq!(render(&[]), "");
    }
}

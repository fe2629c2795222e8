//! Scenario tests for trust policy parsing, validation and evaluation

use super::*;
use crate::error::PolicyError;
use crate::validation::{FindingCode, Validator};
use serde_json::json;

const GITLAB_PROVIDER: &str = "arn:aws:iam::412381736597:oidc-provider/gitlab.com";
const GITHUB_PROVIDER: &str =
    "arn:aws:iam::412381736597:oidc-provider/token.actions.githubusercontent.com";

fn parse(value: serde_json::Value) -> PolicyDocument {
    PolicyDocument::from_value(&value, ParseOptions::default()).unwrap()
}

fn sealed(value: serde_json::Value) -> ValidatedPolicy {
    Validator::default().seal(&parse(value)).unwrap()
}

#[test]
fn test_gitlab_branch_scenario() {
    let policy = sealed(json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {"Federated": GITLAB_PROVIDER},
            "Action": "sts:AssumeRoleWithWebIdentity",
            "Condition": {
                "StringLike": {
                    "gitlab.com:sub": "project_path:vsemeniy/first_ci_cd:ref_type:branch:ref:*"
                }
            }
        }]
    }));
    assert!(policy.warnings().is_empty());

    let mut engine = PolicyEngine::new_default();
    let token = |sub: &str| {
        AssumeRoleRequest::web_identity(GITLAB_PROVIDER).with_claim("gitlab.com:sub", sub)
    };

    // Every branch of the project
    for branch in ["main", "develop", "feature/login", ""] {
        let sub = format!("project_path:vsemeniy/first_ci_cd:ref_type:branch:ref:{}", branch);
        assert_eq!(engine.evaluate(&policy, &token(&sub)), Decision::Allow, "{}", sub);
    }

    // Tags, other projects and lookalike prefixes are refused
    for sub in [
        "project_path:vsemeniy/first_ci_cd:ref_type:tag:ref:v1.0",
        "project_path:vsemeniy/second_ci_cd:ref_type:branch:ref:main",
        "project_path:vsemeniy/first_ci_cd_fork:ref_type:branch:ref:main",
        "project_path:attacker/first_ci_cd:ref_type:branch:ref:main",
    ] {
        assert_eq!(engine.evaluate(&policy, &token(sub)), Decision::ImplicitDeny, "{}", sub);
    }
}

#[test]
fn test_github_main_only_with_audience() {
    let policy = sealed(json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Sid": "GitHubMain",
            "Effect": "Allow",
            "Principal": {"Federated": GITHUB_PROVIDER},
            "Action": "sts:AssumeRoleWithWebIdentity",
            "Condition": {
                "StringEquals": {
                    "token.actions.githubusercontent.com:aud": "sts.amazonaws.com",
                    "token.actions.githubusercontent.com:sub": "repo:octo-org/app:ref:refs/heads/main"
                }
            }
        }]
    }));

    let mut engine = PolicyEngine::new_default();
    let request = |aud: &str, sub: &str| {
        AssumeRoleRequest::web_identity(GITHUB_PROVIDER)
            .with_claim("token.actions.githubusercontent.com:aud", aud)
            .with_claim("token.actions.githubusercontent.com:sub", sub)
    };

    assert!(engine
        .evaluate(&policy, &request("sts.amazonaws.com", "repo:octo-org/app:ref:refs/heads/main"))
        .is_allowed());
    assert!(!engine
        .evaluate(&policy, &request("sts.amazonaws.com", "repo:octo-org/app:ref:refs/heads/dev"))
        .is_allowed());
    assert!(!engine
        .evaluate(&policy, &request("https://example.com", "repo:octo-org/app:ref:refs/heads/main"))
        .is_allowed());
}

#[test]
fn test_deny_overrides_allow_scenario() {
    let policy = sealed(json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Effect": "Allow",
                "Principal": {"Federated": GITLAB_PROVIDER},
                "Action": "sts:AssumeRoleWithWebIdentity",
                "Condition": {"StringLike": {"gitlab.com:sub": "project_path:group/*:ref_type:branch:ref:*"}}
            },
            {
                "Effect": "Deny",
                "Principal": "*",
                "Action": "sts:*",
                "Condition": {"StringLike": {"gitlab.com:sub": "project_path:group/secrets:*"}}
            }
        ]
    }));

    let mut engine = PolicyEngine::new_default();
    let token = |sub: &str| {
        AssumeRoleRequest::web_identity(GITLAB_PROVIDER).with_claim("gitlab.com:sub", sub)
    };

    assert_eq!(
        engine.evaluate(&policy, &token("project_path:group/app:ref_type:branch:ref:main")),
        Decision::Allow
    );
    assert_eq!(
        engine.evaluate(&policy, &token("project_path:group/secrets:ref_type:branch:ref:main")),
        Decision::ExplicitDeny
    );
}

#[test]
fn test_operator_family_scenario() {
    let policy = sealed(json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {"Federated": GITLAB_PROVIDER},
            "Action": "sts:AssumeRoleWithWebIdentity",
            "Condition": {
                "StringLike": {"gitlab.com:sub": "project_path:group/app:*"},
                "StringNotLike": {"gitlab.com:sub": "*:ref:experimental-*"},
                "ForAllValues:StringEquals": {"gitlab.com:groups": ["group", "group/app"]},
                "BoolIfExists": {"gitlab.com:protected": "true"},
                "NumericLessThanEquals": {"gitlab.com:namespace_id": "5000"}
            }
        }]
    }));

    let mut engine = PolicyEngine::new_default();
    let base = AssumeRoleRequest::web_identity(GITLAB_PROVIDER)
        .with_claim("gitlab.com:sub", "project_path:group/app:ref_type:branch:ref:main")
        .with_claim("gitlab.com:namespace_id", "42");

    assert!(engine.evaluate(&policy, &base).is_allowed());

    // Negated operator excludes experimental branches
    let experimental = AssumeRoleRequest::web_identity(GITLAB_PROVIDER)
        .with_claim("gitlab.com:sub", "project_path:group/app:ref_type:branch:ref:experimental-x")
        .with_claim("gitlab.com:namespace_id", "42");
    assert!(!engine.evaluate(&policy, &experimental).is_allowed());

    // ForAllValues: every group must be listed
    let foreign_group = base.clone().with_claim("gitlab.com:groups", "other");
    assert!(!engine.evaluate(&policy, &foreign_group).is_allowed());
    let known_groups = base
        .clone()
        .with_claim("gitlab.com:groups", "group")
        .with_claim("gitlab.com:groups", "group/app");
    assert!(engine.evaluate(&policy, &known_groups).is_allowed());

    // IfExists only applies the test when the claim is present
    let unprotected = base.clone().with_claim("gitlab.com:protected", "false");
    assert!(!engine.evaluate(&policy, &unprotected).is_allowed());

    // Numeric comparison on the namespace id
    let big_namespace = AssumeRoleRequest::web_identity(GITLAB_PROVIDER)
        .with_claim("gitlab.com:sub", "project_path:group/app:ref_type:branch:ref:main")
        .with_claim("gitlab.com:namespace_id", "9000");
    assert!(!engine.evaluate(&policy, &big_namespace).is_allowed());
}

#[test]
fn test_parse_validate_findings_scenario() {
    let doc = parse(json!({
        "Version": "2012-10-17",
        "Statement": [
            {
                "Sid": "Ci",
                "Effect": "Allow",
                "Principal": {"Federated": GITLAB_PROVIDER},
                "Action": [],
                "Condition": {"StringLike": {"gitlab.com:sub": "*"}}
            },
            {
                "Sid": "Ci",
                "Effect": "Allow",
                "Principal": {"Federated": "gitlab.com"},
                "Action": "sts:AssumeRoleWithWebIdentity",
                "Condition": {"StringLike": {"gitlab.com:sub": "project_path:g/p:*"}}
            }
        ]
    }));

    let result = Validator::default().validate(&doc);
    let located: Vec<_> = result
        .findings()
        .iter()
        .map(|f| (f.code, f.statement_index))
        .collect();

    // All rules run and every statement is reported, in rule order
    assert_eq!(
        located,
        vec![
            (FindingCode::EmptyAction, Some(0)),
            (FindingCode::InvalidProviderArn, Some(1)),
            (FindingCode::UnscopedWildcard, Some(0)),
            (FindingCode::DuplicateSid, Some(1)),
        ]
    );

    assert!(matches!(
        Validator::default().seal(&doc),
        Err(PolicyError::NotValidated { errors: 3 })
    ));
}

#[test]
fn test_edit_cycle_requires_revalidation() {
    let policy = sealed(json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {"Federated": GITLAB_PROVIDER},
            "Action": "sts:AssumeRoleWithWebIdentity",
            "Condition": {"StringLike": {"gitlab.com:sub": "project_path:g/p:*"}}
        }]
    }));
    let fingerprint = policy.fingerprint().to_string();

    let mut draft = policy.into_draft();
    draft
        .statement_mut(0)
        .unwrap()
        .add_condition(Condition::new("StringEquals", "gitlab.com:aud", ["https://gitlab.com"]));

    let resealed = Validator::default().seal(&draft).unwrap();
    assert_ne!(resealed.fingerprint(), fingerprint);
    assert_eq!(resealed.statements()[0].condition.len(), 2);
}

#[test]
fn test_cache_performance() {
    let mut engine = PolicyEngine::new(100);
    let policy = sealed(json!({
        "Version": "2012-10-17",
        "Statement": [{
            "Effect": "Allow",
            "Principal": {"Federated": GITLAB_PROVIDER},
            "Action": "sts:AssumeRoleWithWebIdentity",
            "Condition": {"StringLike": {"gitlab.com:sub": "project_path:g/p:ref_type:branch:ref:*"}}
        }]
    }));

    for i in 0..50 {
        let request = AssumeRoleRequest::web_identity(GITLAB_PROVIDER)
            .with_claim("gitlab.com:sub", format!("project_path:g/p:ref_type:branch:ref:b{}", i));
        assert!(engine.evaluate(&policy, &request).is_allowed());
    }
    assert_eq!(engine.cache_size(), 50);

    for i in 0..50 {
        let request = AssumeRoleRequest::web_identity(GITLAB_PROVIDER)
            .with_claim("gitlab.com:sub", format!("project_path:g/p:ref_type:branch:ref:b{}", i));
        assert!(engine.evaluate(&policy, &request).is_allowed());
    }
    assert!(engine.cache_size() <= 100);
}

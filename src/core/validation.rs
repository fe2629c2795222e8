//! Validation for IAM trust policy documents
//!
//! The validator runs five rule groups in priority order and reports every
//! finding it can see; it never stops at the first Error:
//!
//! 1. Structural: statements present, version supported, actions well-formed
//! 2. Principal integrity: provider, account and service identifiers
//! 3. Condition well-formedness: operators, wildcard placement, value types
//! 4. Scoping safety (warnings): trust relationships wider than intended
//! 5. Uniqueness: statement ids
//!
//! Within one rule, the first Error for a statement (or condition entry) ends
//! that rule's checks for it.

use crate::config::ValidatorConfig;
use crate::error::{PolicyError, Result};
use crate::iam::{
    BaseOperator, ConditionOperator, Effect, PatternMatcher, PolicyDocument, Principal,
    Statement, ValidatedPolicy,
};
use crate::serializer;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, info};

/// `arn:<partition>:iam::<account>:oidc-provider/<host>` or `saml-provider/<name>`
const PROVIDER_ARN_PATTERN: &str = r"^arn:aws(-cn|-us-gov)?:iam::\d{12}:(oidc-provider/[A-Za-z0-9][A-Za-z0-9._\-/:]*|saml-provider/[A-Za-z0-9_.+=,@\-]+)$";

/// Account id, account root, IAM user/role, or STS session principal
const AWS_PRINCIPAL_PATTERN: &str = r"^(\d{12}|arn:aws(-cn|-us-gov)?:(iam::\d{12}:(root|user/\S+|role/\S+)|sts::\d{12}:(assumed-role/\S+|federated-user/\S+)))$";

const SERVICE_PRINCIPAL_PATTERN: &str = r"^[a-z0-9][a-z0-9.\-]*\.amazonaws\.com(\.cn)?$";

/// `*` or `service:Action`, where the action part may hold wildcards
const ACTION_PATTERN: &str = r"^(\*|[A-Za-z0-9\-]+:[A-Za-z0-9*?]+)$";

const SID_PATTERN: &str = r"^[A-Za-z0-9]+$";

/// Condition-key namespaces of the built-in web identity providers
const WEB_IDENTITY_NAMESPACES: &[&str] = &[
    "accounts.google.com",
    "cognito-identity.amazonaws.com",
    "graph.facebook.com",
    "www.amazon.com",
];

fn regex(cell: &'static OnceLock<Regex>, pattern: &str) -> &'static Regex {
    cell.get_or_init(|| Regex::new(pattern).expect("built-in pattern compiles"))
}

fn provider_arn_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, PROVIDER_ARN_PATTERN)
}

fn aws_principal_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, AWS_PRINCIPAL_PATTERN)
}

fn service_principal_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, SERVICE_PRINCIPAL_PATTERN)
}

fn action_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, ACTION_PATTERN)
}

fn sid_regex() -> &'static Regex {
    static CELL: OnceLock<Regex> = OnceLock::new();
    regex(&CELL, SID_PATTERN)
}

/// Check that an identity-provider ARN has a known shape
pub fn is_provider_arn(arn: &str) -> bool {
    provider_arn_regex().is_match(arn)
}

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks sealing and serialization
    Error,
    /// Surfaced to the caller, does not block
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => f.write_str("error"),
            Severity::Warning => f.write_str("warning"),
        }
    }
}

/// Machine-readable finding code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FindingCode {
    EmptyDocument,
    UnsupportedVersion,
    EmptyAction,
    InvalidAction,
    EmptyPrincipal,
    InvalidProviderArn,
    UndeclaredProvider,
    InvalidAwsPrincipal,
    InvalidServicePrincipal,
    UnsupportedOperator,
    WildcardOutsideLike,
    EmptyConditionValues,
    InvalidConditionValue,
    UnscopedWildcard,
    WildcardPrincipal,
    MissingSubjectCondition,
    ConditionProviderMismatch,
    DuplicateSid,
    InvalidSid,
}

impl FindingCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FindingCode::EmptyDocument => "EMPTY_DOCUMENT",
            FindingCode::UnsupportedVersion => "UNSUPPORTED_VERSION",
            FindingCode::EmptyAction => "EMPTY_ACTION",
            FindingCode::InvalidAction => "INVALID_ACTION",
            FindingCode::EmptyPrincipal => "EMPTY_PRINCIPAL",
            FindingCode::InvalidProviderArn => "INVALID_PROVIDER_ARN",
            FindingCode::UndeclaredProvider => "UNDECLARED_PROVIDER",
            FindingCode::InvalidAwsPrincipal => "INVALID_AWS_PRINCIPAL",
            FindingCode::InvalidServicePrincipal => "INVALID_SERVICE_PRINCIPAL",
            FindingCode::UnsupportedOperator => "UNSUPPORTED_OPERATOR",
            FindingCode::WildcardOutsideLike => "WILDCARD_OUTSIDE_LIKE",
            FindingCode::EmptyConditionValues => "EMPTY_CONDITION_VALUES",
            FindingCode::InvalidConditionValue => "INVALID_CONDITION_VALUE",
            FindingCode::UnscopedWildcard => "UNSCOPED_WILDCARD",
            FindingCode::WildcardPrincipal => "WILDCARD_PRINCIPAL",
            FindingCode::MissingSubjectCondition => "MISSING_SUBJECT_CONDITION",
            FindingCode::ConditionProviderMismatch => "CONDITION_PROVIDER_MISMATCH",
            FindingCode::DuplicateSid => "DUPLICATE_SID",
            FindingCode::InvalidSid => "INVALID_SID",
        }
    }
}

impl fmt::Display for FindingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single validation outcome
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub severity: Severity,
    pub code: FindingCode,
    /// Index of the statement, `None` for document-level findings
    pub statement_index: Option<usize>,
    pub message: String,
}

impl Finding {
    fn error(code: FindingCode, statement_index: Option<usize>, message: String) -> Self {
        Finding {
            severity: Severity::Error,
            code,
            statement_index,
            message,
        }
    }

    fn warning(code: FindingCode, statement_index: Option<usize>, message: String) -> Self {
        Finding {
            severity: Severity::Warning,
            code,
            statement_index,
            message,
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.statement_index {
            Some(i) => write!(
                f,
                "{} [{}] Statement[{}]: {}",
                self.severity, self.code, i, self.message
            ),
            None => write!(f, "{} [{}] {}", self.severity, self.code, self.message),
        }
    }
}

/// Outcome of a validation pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationResult {
    /// No findings at all
    Valid,
    /// Non-empty, ordered findings (rule priority, then statement order)
    Findings(Vec<Finding>),
}

impl ValidationResult {
    fn from_findings(findings: Vec<Finding>) -> Self {
        if findings.is_empty() {
            ValidationResult::Valid
        } else {
            ValidationResult::Findings(findings)
        }
    }

    /// True only when there are no findings
    pub fn is_valid(&self) -> bool {
        matches!(self, ValidationResult::Valid)
    }

    pub fn findings(&self) -> &[Finding] {
        match self {
            ValidationResult::Valid => &[],
            ValidationResult::Findings(findings) => findings,
        }
    }

    pub fn into_findings(self) -> Vec<Finding> {
        match self {
            ValidationResult::Valid => Vec::new(),
            ValidationResult::Findings(findings) => findings,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &Finding> {
        self.findings().iter().filter(|f| f.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &Finding> {
        self.findings().iter().filter(|f| !f.is_error())
    }

    pub fn error_count(&self) -> usize {
        self.errors().count()
    }

    pub fn warning_count(&self) -> usize {
        self.warnings().count()
    }

    /// Errors block sealing and serialization
    pub fn has_errors(&self) -> bool {
        self.errors().next().is_some()
    }
}

/// Rule engine for trust policies
#[derive(Debug, Clone, Default)]
pub struct Validator {
    config: ValidatorConfig,
}

impl Validator {
    pub fn new(config: ValidatorConfig) -> Self {
        Validator { config }
    }

    pub fn config(&self) -> &ValidatorConfig {
        &self.config
    }

    /// Run every rule and return the full list of findings
    pub fn validate(&self, doc: &PolicyDocument) -> ValidationResult {
        let mut findings = Vec::new();

        self.check_structure(doc, &mut findings);
        self.check_principals(doc, &mut findings);
        self.check_conditions(doc, &mut findings);
        self.check_scoping(doc, &mut findings);
        self.check_uniqueness(doc, &mut findings);

        if self.config.strict {
            for finding in &mut findings {
                finding.severity = Severity::Error;
            }
        }

        let result = ValidationResult::from_findings(findings);
        info!(
            "Validated policy with {} statement(s): {} error(s), {} warning(s)",
            doc.statements.len(),
            result.error_count(),
            result.warning_count()
        );
        result
    }

    /// Validate and, when no Errors are found, stamp the document as validated
    ///
    /// # Errors
    ///
    /// Returns `NotValidated` if any Error finding is present.
    pub fn seal(&self, doc: &PolicyDocument) -> Result<ValidatedPolicy> {
        let result = self.validate(doc);
        if result.has_errors() {
            return Err(PolicyError::NotValidated {
                errors: result.error_count(),
            });
        }

        let bytes = serializer::canonical_bytes(doc)?;
        let fingerprint = serializer::fingerprint_bytes(&bytes);
        info!("Sealed policy document {}", fingerprint);

        let warnings = result.into_findings();
        Ok(ValidatedPolicy::new(doc.clone(), warnings, fingerprint))
    }

    /// Rule 1: document shape, actions and principal identifier sets
    fn check_structure(&self, doc: &PolicyDocument, findings: &mut Vec<Finding>) {
        if doc.statements.is_empty() {
            findings.push(Finding::error(
                FindingCode::EmptyDocument,
                None,
                "document has no statements".to_string(),
            ));
        }

        if !self.config.supported_versions.contains(&doc.version) {
            findings.push(Finding::error(
                FindingCode::UnsupportedVersion,
                None,
                format!(
                    "version \"{}\" is not one of {:?}",
                    doc.version, self.config.supported_versions
                ),
            ));
        }

        for (i, stmt) in doc.statements.iter().enumerate() {
            if let Some(finding) = structural_error(i, stmt) {
                findings.push(finding);
            }
        }
        debug!("Structural rule done, {} finding(s) so far", findings.len());
    }

    /// Rule 2: principal identifiers have the right shape
    fn check_principals(&self, doc: &PolicyDocument, findings: &mut Vec<Finding>) {
        for (i, stmt) in doc.statements.iter().enumerate() {
            let error = match &stmt.principal {
                Principal::Wildcard => None,
                Principal::Federated(arns) => arns.iter().find_map(|arn| {
                    if !is_provider_arn(arn) {
                        Some(Finding::error(
                            FindingCode::InvalidProviderArn,
                            Some(i),
                            format!(
                                "federated principal \"{}\" is not an identity-provider ARN \
                                 (arn:aws:iam::<account>:oidc-provider/<host>)",
                                arn
                            ),
                        ))
                    } else if !self.config.declared_providers.is_empty()
                        && !self.config.declared_providers.contains(arn)
                    {
                        Some(Finding::error(
                            FindingCode::UndeclaredProvider,
                            Some(i),
                            format!("identity provider \"{}\" is not declared", arn),
                        ))
                    } else {
                        None
                    }
                }),
                Principal::Aws(ids) => ids
                    .iter()
                    .find(|id| !aws_principal_regex().is_match(id))
                    .map(|id| {
                        Finding::error(
                            FindingCode::InvalidAwsPrincipal,
                            Some(i),
                            format!("\"{}\" is not an account id or IAM principal ARN", id),
                        )
                    }),
                Principal::Service(names) => names
                    .iter()
                    .find(|name| !service_principal_regex().is_match(name))
                    .map(|name| {
                        Finding::error(
                            FindingCode::InvalidServicePrincipal,
                            Some(i),
                            format!("\"{}\" is not a service principal", name),
                        )
                    }),
            };
            findings.extend(error);
        }
        debug!("Principal rule done, {} finding(s) so far", findings.len());
    }

    /// Rule 3: operators are known, wildcards sit under `*Like`, values are typed
    fn check_conditions(&self, doc: &PolicyDocument, findings: &mut Vec<Finding>) {
        for (i, stmt) in doc.statements.iter().enumerate() {
            for entry in stmt.condition.iter() {
                let operator = match ConditionOperator::parse(entry.operator) {
                    Ok(op) => op,
                    Err(_) => {
                        findings.push(Finding::error(
                            FindingCode::UnsupportedOperator,
                            Some(i),
                            format!("condition operator \"{}\" is not recognized", entry.operator),
                        ));
                        continue;
                    }
                };

                if entry.values.is_empty() {
                    findings.push(Finding::error(
                        FindingCode::EmptyConditionValues,
                        Some(i),
                        format!("{} on \"{}\" has no values", entry.operator, entry.key),
                    ));
                    continue;
                }

                if !operator.base.is_like() {
                    if let Some(pattern) = entry.values.iter().find(|v| PatternMatcher::has_wildcard(v)) {
                        findings.push(Finding::error(
                            FindingCode::WildcardOutsideLike,
                            Some(i),
                            format!(
                                "pattern \"{}\" on \"{}\" uses a wildcard under {}, which only \
                                 *Like operators interpret",
                                pattern, entry.key, entry.operator
                            ),
                        ));
                        continue;
                    }
                }

                if let Some(value) = entry.values.iter().find(|v| !operator.accepts_value(v)) {
                    findings.push(Finding::error(
                        FindingCode::InvalidConditionValue,
                        Some(i),
                        format!(
                            "value \"{}\" on \"{}\" is not valid for {}",
                            value, entry.key, entry.operator
                        ),
                    ));
                }
            }
        }
        debug!("Condition rule done, {} finding(s) so far", findings.len());
    }

    /// Rule 4: warnings for overly permissive trust
    fn check_scoping(&self, doc: &PolicyDocument, findings: &mut Vec<Finding>) {
        for (i, stmt) in doc.statements.iter().enumerate() {
            let allows = stmt.effect == Effect::Allow;

            if allows && stmt.principal == Principal::Wildcard {
                findings.push(Finding::warning(
                    FindingCode::WildcardPrincipal,
                    Some(i),
                    "any principal may assume this role".to_string(),
                ));
            }

            for entry in stmt.condition.iter() {
                let Ok(operator) = ConditionOperator::parse(entry.operator) else {
                    continue;
                };
                if !is_positive_like(&operator) || !self.config.is_sensitive_key(entry.key) {
                    continue;
                }
                if let Some(pattern) = entry.values.iter().find(|v| PatternMatcher::is_bare_wildcard(v)) {
                    findings.push(Finding::warning(
                        FindingCode::UnscopedWildcard,
                        Some(i),
                        format!(
                            "pattern \"{}\" on sensitive claim \"{}\" has no narrowing prefix \
                             and matches every subject",
                            pattern, entry.key
                        ),
                    ));
                }
            }

            let provider_paths = stmt.principal.oidc_provider_paths();
            if provider_paths.is_empty() {
                continue;
            }

            if allows && !self.has_subject_condition(stmt) {
                findings.push(Finding::warning(
                    FindingCode::MissingSubjectCondition,
                    Some(i),
                    format!(
                        "no condition restricts {:?} for the OIDC provider; any identity it \
                         issues tokens for may assume this role",
                        self.config.sensitive_claims
                    ),
                ));
            }

            for entry in stmt.condition.iter() {
                let Some((namespace, _)) = entry.key.rsplit_once(':') else {
                    continue;
                };
                let provider_scoped =
                    namespace.contains('.') && !WEB_IDENTITY_NAMESPACES.contains(&namespace);
                if provider_scoped && !provider_paths.contains(&namespace) {
                    findings.push(Finding::warning(
                        FindingCode::ConditionProviderMismatch,
                        Some(i),
                        format!(
                            "condition key \"{}\" belongs to provider \"{}\", which is not a \
                             principal of this statement; the condition can never match a token",
                            entry.key, namespace
                        ),
                    ));
                }
            }
        }
        debug!("Scoping rule done, {} finding(s) so far", findings.len());
    }

    /// Rule 5: statement ids are well-formed and unique
    fn check_uniqueness(&self, doc: &PolicyDocument, findings: &mut Vec<Finding>) {
        let mut first_seen: HashMap<&str, usize> = HashMap::new();

        for (i, stmt) in doc.statements.iter().enumerate() {
            let Some(sid) = stmt.sid.as_deref() else {
                continue;
            };

            if !sid_regex().is_match(sid) {
                findings.push(Finding::error(
                    FindingCode::InvalidSid,
                    Some(i),
                    format!("sid \"{}\" must be alphanumeric", sid),
                ));
                continue;
            }

            match first_seen.get(sid) {
                Some(&first) => findings.push(Finding::error(
                    FindingCode::DuplicateSid,
                    Some(i),
                    format!("duplicate sid \"{}\" (first used by Statement[{}])", sid, first),
                )),
                None => {
                    first_seen.insert(sid, i);
                }
            }
        }
        debug!("Uniqueness rule done, {} finding(s) so far", findings.len());
    }

    /// A positive, recognized condition on one of the sensitive claims
    fn has_subject_condition(&self, stmt: &Statement) -> bool {
        stmt.condition.iter().any(|entry| {
            self.config.is_sensitive_key(entry.key)
                && ConditionOperator::parse(entry.operator)
                    .map(|op| !op.base.is_negated() && op.base != BaseOperator::Null)
                    .unwrap_or(false)
        })
    }
}

fn is_positive_like(operator: &ConditionOperator) -> bool {
    operator.base.is_like() && !operator.base.is_negated()
}

fn structural_error(i: usize, stmt: &Statement) -> Option<Finding> {
    if stmt.action.is_empty() {
        return Some(Finding::error(
            FindingCode::EmptyAction,
            Some(i),
            "action set is empty".to_string(),
        ));
    }

    if let Some(action) = stmt.action.iter().find(|a| !action_regex().is_match(a)) {
        return Some(Finding::error(
            FindingCode::InvalidAction,
            Some(i),
            format!("action \"{}\" is not \"*\" or \"service:Action\"", action),
        ));
    }

    match stmt.principal.identifiers() {
        Some(ids) if ids.is_empty() => Some(Finding::error(
            FindingCode::EmptyPrincipal,
            Some(i),
            format!(
                "{} principal names no identifiers",
                stmt.principal.type_key().unwrap_or("*")
            ),
        )),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iam::Condition;

    const GITLAB_PROVIDER: &str = "arn:aws:iam::412381736597:oidc-provider/gitlab.com";

    fn gitlab_statement(pattern: &str) -> Statement {
        Statement::new(Effect::Allow, Principal::federated(GITLAB_PROVIDER))
            .with_action("sts:AssumeRoleWithWebIdentity")
            .with_condition(Condition::new("StringLike", "gitlab.com:sub", [pattern]))
    }

    fn gitlab_policy(pattern: &str) -> PolicyDocument {
        PolicyDocument::new().with_statement(gitlab_statement(pattern))
    }

    fn codes(result: &ValidationResult) -> Vec<FindingCode> {
        result.findings().iter().map(|f| f.code).collect()
    }

    #[test]
    fn test_gitlab_policy_is_valid() {
        let result = Validator::default().validate(&gitlab_policy(
            "project_path:vsemeniy/first_ci_cd:ref_type:branch:ref:*",
        ));
        assert!(result.is_valid(), "{:?}", result);
    }

    #[test]
    fn test_empty_action_is_one_error() {
        let mut doc = gitlab_policy("project_path:g/p:ref_type:branch:ref:*");
        doc.statements[0].action.clear();

        let result = Validator::default().validate(&doc);
        assert_eq!(result.error_count(), 1);
        assert_eq!(codes(&result), vec![FindingCode::EmptyAction]);
        assert_eq!(result.findings()[0].statement_index, Some(0));
    }

    #[test]
    fn test_bare_wildcard_subject_is_one_warning() {
        let result = Validator::default().validate(&gitlab_policy("*"));
        assert_eq!(result.error_count(), 0);
        assert_eq!(result.warning_count(), 1);
        assert_eq!(codes(&result), vec![FindingCode::UnscopedWildcard]);
    }

    #[test]
    fn test_duplicate_sid() {
        let doc = PolicyDocument::new()
            .with_statement(gitlab_statement("project_path:g/a:*").with_sid("A"))
            .with_statement(gitlab_statement("project_path:g/b:*").with_sid("A"));

        let result = Validator::default().validate(&doc);
        let dup: Vec<_> = result
            .errors()
            .filter(|f| f.code == FindingCode::DuplicateSid)
            .collect();
        assert_eq!(dup.len(), 1);
        assert_eq!(dup[0].statement_index, Some(1));
        assert!(dup[0].code.as_str().contains("DUPLICATE_SID"));
    }

    #[test]
    fn test_empty_document() {
        let result = Validator::default().validate(&PolicyDocument::new());
        assert_eq!(codes(&result), vec![FindingCode::EmptyDocument]);
    }

    #[test]
    fn test_unsupported_version_and_invalid_action() {
        let mut doc = gitlab_policy("project_path:g/p:*");
        doc.set_version("2024-01-01");
        doc.statements[0].add_action("AssumeRole");

        let result = Validator::default().validate(&doc);
        assert_eq!(
            codes(&result),
            vec![FindingCode::UnsupportedVersion, FindingCode::InvalidAction]
        );
    }

    #[test]
    fn test_provider_arn_shape() {
        assert!(is_provider_arn(GITLAB_PROVIDER));
        assert!(is_provider_arn(
            "arn:aws:iam::123456789012:oidc-provider/oidc.eks.us-east-1.amazonaws.com/id/ABC123"
        ));
        assert!(is_provider_arn("arn:aws-us-gov:iam::123456789012:saml-provider/Okta"));
        assert!(!is_provider_arn("arn:aws:iam::4123817365:oidc-provider/gitlab.com"));
        assert!(!is_provider_arn("arn:aws:iam::412381736597:role/gitlab"));
        assert!(!is_provider_arn("gitlab.com"));

        let mut doc = gitlab_policy("project_path:g/p:*");
        doc.statements[0].set_principal(Principal::federated("arn:aws:iam::412381736597:role/ci"));
        let result = Validator::default().validate(&doc);
        assert!(codes(&result).contains(&FindingCode::InvalidProviderArn));
    }

    #[test]
    fn test_undeclared_provider() {
        let config = ValidatorConfig::default()
            .declare_provider("arn:aws:iam::412381736597:oidc-provider/token.actions.githubusercontent.com");
        let result = Validator::new(config).validate(&gitlab_policy("project_path:g/p:*"));
        assert_eq!(codes(&result), vec![FindingCode::UndeclaredProvider]);

        let config = ValidatorConfig::default().declare_provider(GITLAB_PROVIDER);
        assert!(Validator::new(config)
            .validate(&gitlab_policy("project_path:g/p:*"))
            .is_valid());
    }

    #[test]
    fn test_aws_and_service_principals() {
        let doc = PolicyDocument::new()
            .with_statement(
                Statement::new(Effect::Allow, Principal::aws("arn:aws:iam::123456789012:root"))
                    .with_action("sts:AssumeRole"),
            )
            .with_statement(
                Statement::new(Effect::Allow, Principal::aws("alice"))
                    .with_action("sts:AssumeRole"),
            )
            .with_statement(
                Statement::new(Effect::Allow, Principal::service("ec2.amazonaws.com"))
                    .with_action("sts:AssumeRole"),
            )
            .with_statement(
                Statement::new(Effect::Allow, Principal::service("ec2"))
                    .with_action("sts:AssumeRole"),
            );

        let result = Validator::default().validate(&doc);
        let located: Vec<_> = result
            .findings()
            .iter()
            .map(|f| (f.code, f.statement_index))
            .collect();
        assert_eq!(
            located,
            vec![
                (FindingCode::InvalidAwsPrincipal, Some(1)),
                (FindingCode::InvalidServicePrincipal, Some(3)),
            ]
        );
    }

    #[test]
    fn test_condition_errors() {
        let stmt = Statement::new(Effect::Allow, Principal::federated(GITLAB_PROVIDER))
            .with_action("sts:AssumeRoleWithWebIdentity")
            .with_condition(Condition::new("StringLike", "gitlab.com:sub", ["project_path:g/p:*"]))
            .with_condition(Condition::new("StringGlob", "gitlab.com:ref", ["main"]))
            .with_condition(Condition::new("StringEquals", "gitlab.com:aud", ["https://*"]))
            .with_condition(Condition::new("NumericLessThan", "gitlab.com:iat", ["soon"]))
            .with_condition(Condition::new("StringEquals", "gitlab.com:ref_type", Vec::<String>::new()));

        let result = Validator::default().validate(&PolicyDocument::new().with_statement(stmt));
        let mut found = codes(&result);
        found.sort_by_key(|c| c.as_str());
        assert_eq!(
            found,
            vec![
                FindingCode::EmptyConditionValues,
                FindingCode::InvalidConditionValue,
                FindingCode::UnsupportedOperator,
                FindingCode::WildcardOutsideLike,
            ]
        );
    }

    #[test]
    fn test_wildcard_under_equals_reported_once() {
        // Wildcard placement short-circuits the value-type check for that entry
        let stmt = gitlab_statement("project_path:g/p:*")
            .with_condition(Condition::new("DateLessThan", "aws:CurrentTime", ["2025-*"]));
        let result = Validator::default().validate(&PolicyDocument::new().with_statement(stmt));
        assert_eq!(codes(&result), vec![FindingCode::WildcardOutsideLike]);
    }

    #[test]
    fn test_scoping_warnings() {
        let open = Statement::new(Effect::Allow, Principal::Wildcard).with_action("sts:AssumeRole");
        let unconditioned = Statement::new(Effect::Allow, Principal::federated(GITLAB_PROVIDER))
            .with_action("sts:AssumeRoleWithWebIdentity");
        let wrong_provider = gitlab_statement("project_path:g/p:*").with_condition(Condition::new(
            "StringEquals",
            "token.actions.githubusercontent.com:aud",
            ["sts.amazonaws.com"],
        ));

        let doc = PolicyDocument::new()
            .with_statement(open)
            .with_statement(unconditioned)
            .with_statement(wrong_provider);
        let result = Validator::default().validate(&doc);

        assert_eq!(result.error_count(), 0);
        let located: Vec<_> = result
            .findings()
            .iter()
            .map(|f| (f.code, f.statement_index))
            .collect();
        assert_eq!(
            located,
            vec![
                (FindingCode::WildcardPrincipal, Some(0)),
                (FindingCode::MissingSubjectCondition, Some(1)),
                (FindingCode::ConditionProviderMismatch, Some(2)),
            ]
        );
    }

    #[test]
    fn test_deny_with_wildcard_principal_is_quiet() {
        let deny = Statement::new(Effect::Deny, Principal::Wildcard)
            .with_action("sts:AssumeRoleWithWebIdentity")
            .with_condition(Condition::new("StringNotLike", "gitlab.com:sub", ["*"]));
        let doc = gitlab_policy("project_path:g/p:*").with_statement(deny);
        assert!(Validator::default().validate(&doc).is_valid());
    }

    #[test]
    fn test_strict_upgrades_warnings() {
        let validator = Validator::new(ValidatorConfig::default().with_strict(true));
        let result = validator.validate(&gitlab_policy("*"));
        assert_eq!(result.error_count(), 1);
        assert_eq!(result.warning_count(), 0);
        assert!(matches!(
            validator.seal(&gitlab_policy("*")),
            Err(PolicyError::NotValidated { errors: 1 })
        ));
    }

    #[test]
    fn test_invalid_sid() {
        let doc = gitlab_policy("project_path:g/p:*");
        let doc = PolicyDocument {
            statements: vec![doc.statements[0].clone().with_sid("gitlab ci")],
            ..doc
        };
        let result = Validator::default().validate(&doc);
        assert_eq!(codes(&result), vec![FindingCode::InvalidSid]);
    }

    #[test]
    fn test_seal_keeps_warnings_and_fingerprint() {
        let validator = Validator::default();
        let sealed = validator.seal(&gitlab_policy("*")).unwrap();
        assert_eq!(sealed.warnings().len(), 1);
        assert_eq!(sealed.fingerprint().len(), 64);

        let again = validator.seal(&gitlab_policy("*")).unwrap();
        assert_eq!(sealed.fingerprint(), again.fingerprint());

        let other = validator.seal(&gitlab_policy("project_path:g/p:*")).unwrap();
        assert_ne!(sealed.fingerprint(), other.fingerprint());
    }

    #[test]
    fn test_seal_refuses_errors() {
        let mut doc = gitlab_policy("project_path:g/p:*");
        doc.statements[0].action.clear();
        match Validator::default().seal(&doc) {
            Err(PolicyError::NotValidated { errors }) => assert_eq!(errors, 1),
            other => panic!("expected NotValidated, got {:?}", other),
        }
    }

    #[test]
    fn test_finding_display() {
        let result = Validator::default().validate(&gitlab_policy("*"));
        let line = result.findings()[0].to_string();
        assert!(line.starts_with("warning [UNSCOPED_WILDCARD] Statement[0]:"), "{}", line);
    }
}

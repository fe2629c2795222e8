//! Trust evaluation engine with deny precedence
//!
//! Answers whether a principal may perform an assume-role action under a
//! validated trust policy:
//! - Explicit Deny wins over any Allow
//! - At least one applicable Allow is required
//! - Decisions are cached per policy fingerprint

use super::{
    ConditionOperator, Effect, PatternMatcher, PolicyCache, Principal, Statement, ValidatedPolicy,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use tracing::debug;

/// Action used by OIDC web identity federation
pub const WEB_IDENTITY_ACTION: &str = "sts:AssumeRoleWithWebIdentity";

/// Identity asking to assume the role
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RequestPrincipal {
    /// Identity-provider ARN the token was issued by
    Federated(String),
    /// Account id or IAM principal ARN
    Aws(String),
    /// Service name, e.g. `ec2.amazonaws.com`
    Service(String),
}

/// An assume-role request with its condition context
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AssumeRoleRequest {
    pub principal: RequestPrincipal,
    pub action: String,
    /// Condition keys (e.g. `gitlab.com:sub`) to their request values
    pub context: BTreeMap<String, Vec<String>>,
}

impl AssumeRoleRequest {
    pub fn new(principal: RequestPrincipal, action: impl Into<String>) -> Self {
        AssumeRoleRequest {
            principal,
            action: action.into(),
            context: BTreeMap::new(),
        }
    }

    /// Web identity request from an OIDC provider
    pub fn web_identity(provider_arn: impl Into<String>) -> Self {
        Self::new(RequestPrincipal::Federated(provider_arn.into()), WEB_IDENTITY_ACTION)
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Add a value for a context key (repeat for multi-valued keys)
    pub fn with_claim(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.entry(key.into()).or_default().push(value.into());
        self
    }

    /// Look up a context key; exact match first, then case-insensitive
    fn values(&self, key: &str) -> Option<&[String]> {
        self.context
            .get(key)
            .or_else(|| {
                self.context
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(key))
                    .map(|(_, v)| v)
            })
            .map(Vec::as_slice)
    }
}

/// Outcome of evaluating a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Decision {
    Allow,
    /// A Deny statement applied
    ExplicitDeny,
    /// No Allow statement applied
    ImplicitDeny,
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        *self == Decision::Allow
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("Allow"),
            Decision::ExplicitDeny => f.write_str("ExplicitDeny"),
            Decision::ImplicitDeny => f.write_str("ImplicitDeny"),
        }
    }
}

/// Trust policy evaluation engine
pub struct PolicyEngine {
    cache: PolicyCache,
}

impl PolicyEngine {
    /// Create a new engine with given cache capacity
    pub fn new(cache_capacity: usize) -> Self {
        PolicyEngine {
            cache: PolicyCache::new(cache_capacity),
        }
    }

    /// Create a new engine with default cache (1000 entries)
    pub fn new_default() -> Self {
        Self::new(1000)
    }

    /// Decide whether the request may assume the role
    ///
    /// # Examples
    ///
    /// ```
    /// use trustcheck::iam::{AssumeRoleRequest, Condition, Decision, Effect, PolicyDocument,
    ///     PolicyEngine, Principal, Statement};
    /// use trustcheck::Validator;
    ///
    /// let provider = "arn:aws:iam::412381736597:oidc-provider/gitlab.com";
    /// let doc = PolicyDocument::new().with_statement(
    ///     Statement::new(Effect::Allow, Principal::federated(provider))
    ///         .with_action("sts:AssumeRoleWithWebIdentity")
    ///         .with_condition(Condition::new("StringLike", "gitlab.com:sub", ["project_path:g/p:*"])),
    /// );
    /// let policy = Validator::default().seal(&doc).unwrap();
    /// let mut engine = PolicyEngine::new_default();
    ///
    /// let ok = AssumeRoleRequest::web_identity(provider).with_claim("gitlab.com:sub", "project_path:g/p:ref_type:branch:ref:main");
    /// assert_eq!(engine.evaluate(&policy, &ok), Decision::Allow);
    ///
    /// let other = AssumeRoleRequest::web_identity(provider).with_claim("gitlab.com:sub", "project_path:g/q:ref_type:branch:ref:main");
    /// assert_eq!(engine.evaluate(&policy, &other), Decision::ImplicitDeny);
    /// ```
    pub fn evaluate(&mut self, policy: &ValidatedPolicy, request: &AssumeRoleRequest) -> Decision {
        if let Some(cached) = self.cache.lookup(policy.fingerprint(), request) {
            debug!("Decision cache hit for {:?} {}", request.principal, request.action);
            return cached;
        }

        let decision = evaluate_statements(policy.statements(), request);
        debug!("Evaluated {:?} {} -> {}", request.principal, request.action, decision);

        self.cache.store(policy.fingerprint(), request, decision);
        decision
    }

    /// Clear the decision cache
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }

    /// Number of cached decisions
    pub fn cache_size(&self) -> usize {
        self.cache.len()
    }
}

fn evaluate_statements(statements: &[Statement], request: &AssumeRoleRequest) -> Decision {
    let mut has_allow = false;

    for statement in statements {
        if !statement_applies(statement, request) {
            continue;
        }
        match statement.effect {
            Effect::Deny => return Decision::ExplicitDeny,
            Effect::Allow => has_allow = true,
        }
    }

    if has_allow {
        Decision::Allow
    } else {
        Decision::ImplicitDeny
    }
}

fn statement_applies(statement: &Statement, request: &AssumeRoleRequest) -> bool {
    principal_matches(&statement.principal, &request.principal)
        && statement
            .action
            .iter()
            .any(|pattern| PatternMatcher::matches_ignore_case(pattern, &request.action))
        && statement.condition.iter().all(|entry| {
            match ConditionOperator::parse(entry.operator) {
                Ok(operator) => operator.evaluate(entry.values, request.values(entry.key)),
                Err(_) => false,
            }
        })
}

fn principal_matches(principal: &Principal, request: &RequestPrincipal) -> bool {
    match (principal, request) {
        (Principal::Wildcard, _) => true,
        (Principal::Federated(arns), RequestPrincipal::Federated(arn)) => arns.contains(arn),
        (Principal::Service(names), RequestPrincipal::Service(name)) => names.contains(name),
        (Principal::Aws(ids), RequestPrincipal::Aws(id)) => {
            let account = account_of(id);
            ids.iter().any(|allowed| {
                allowed == id || (account.is_some() && account_of_root(allowed) == account)
            })
        }
        _ => false,
    }
}

/// Account id of a bare account id or any IAM/STS ARN
fn account_of(id: &str) -> Option<&str> {
    if id.len() == 12 && id.bytes().all(|b| b.is_ascii_digit()) {
        return Some(id);
    }
    id.split(':').nth(4).filter(|a| !a.is_empty())
}

/// Account id when the principal names a whole account (`123456789012` or `...:root`)
fn account_of_root(allowed: &str) -> Option<&str> {
    if allowed.starts_with("arn:") && !allowed.ends_with(":root") {
        return None;
    }
    account_of(allowed)
}

//! Trust policy model and evaluation
//!
//! Provides:
//! - Draft policy documents parsed from JSON or built in code
//! - Typed principals and IAM condition blocks
//! - Condition operators with `*`/`?` wildcards under `*Like`
//! - Deny-precedence evaluation with LRU-cached decisions

mod cache;
mod condition;
mod engine;
pub(crate) mod parse;
mod pattern;
mod policy;
pub(crate) mod principal;

pub use cache::PolicyCache;
pub use condition::{matches, BaseOperator, ConditionOperator, SetQualifier, ValueKind};
pub use engine::{
    AssumeRoleRequest, Decision, PolicyEngine, RequestPrincipal, WEB_IDENTITY_ACTION,
};
pub use parse::ParseOptions;
pub use pattern::PatternMatcher;
pub use policy::{
    Condition, ConditionBlock, ConditionRef, Effect, PolicyDocument, Statement, ValidatedPolicy,
    DEFAULT_VERSION,
};
pub use principal::{Principal, AWS_KEY, FEDERATED_KEY, SERVICE_KEY};

#[cfg(test)]
mod tests;

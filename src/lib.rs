//! # trustcheck - IAM Trust Policy Validation and Generation
//!
//! `trustcheck` models AWS IAM trust policies (the documents that decide who may
//! assume a role) and keeps them safe to ship:
//!
//! - **Typed documents**: principals, actions and condition blocks parsed with
//!   exact field paths on failure
//! - **Validator**: prioritized rules with Error/Warning findings, including
//!   unscoped wildcard detection on OIDC subject claims
//! - **Canonical serializer**: stable key order and SHA-256 fingerprints
//! - **Diff**: statement-aware change review between two policies
//! - **Evaluator**: deny-precedence simulation of assume-role requests
//!
//! ## Quick Start
//!
//! ```rust
//! use trustcheck::{serializer, Result, Validator};
//! use trustcheck::iam::PolicyDocument;
//!
//! # fn main() -> Result<()> {
//! let doc = PolicyDocument::from_json(r#"{
//!     "Version": "2012-10-17",
//!     "Statement": [{
//!         "Effect": "Allow",
//!         "Principal": {"Federated": "arn:aws:iam::412381736597:oidc-provider/gitlab.com"},
//!         "Action": "sts:AssumeRoleWithWebIdentity",
//!         "Condition": {
//!             "StringLike": {"gitlab.com:sub": "project_path:group/app:ref_type:branch:ref:*"}
//!         }
//!     }]
//! }"#)?;
//!
//! let validator = Validator::default();
//! assert!(validator.validate(&doc).is_valid());
//!
//! let policy = validator.seal(&doc)?;
//! let json = serializer::serialize(&policy)?;
//! assert_eq!(serializer::deserialize(&json)?, doc);
//! # Ok(())
//! # }
//! ```

pub mod core;

pub use crate::core::{config, diff, error, iam, serializer, validation};

pub use crate::core::{
    config::ValidatorConfig,
    diff::{Change, ChangeKind},
    error::{PolicyError, Result},
    iam::{
        AssumeRoleRequest, Decision, Effect, PolicyDocument, PolicyEngine, Principal, Statement,
        ValidatedPolicy,
    },
    serializer::Override,
    validation::{Finding, FindingCode, Severity, ValidationResult, Validator},
};

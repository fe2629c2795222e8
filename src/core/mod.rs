//! Core trust policy machinery

pub mod config;
pub mod diff;
pub mod error;
pub mod iam;
pub mod serializer;
pub mod validation;

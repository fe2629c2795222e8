//! Condition operators for IAM trust policies
//!
//! An operator string such as `ForAnyValue:StringLikeIfExists` is parsed into a
//! base operator plus its set qualifier and `IfExists` flag:
//! - String operations (Equals, Like, IgnoreCase, and their negations)
//! - ARN operations (component-wise Like)
//! - Numeric and Date comparisons
//! - Bool, Null, IpAddress

use super::PatternMatcher;
use crate::error::{PolicyError, Result};
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

/// Base condition operator, without qualifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BaseOperator {
    StringEquals,
    StringNotEquals,
    StringEqualsIgnoreCase,
    StringNotEqualsIgnoreCase,
    StringLike,
    StringNotLike,
    ArnEquals,
    ArnNotEquals,
    ArnLike,
    ArnNotLike,
    NumericEquals,
    NumericNotEquals,
    NumericLessThan,
    NumericLessThanEquals,
    NumericGreaterThan,
    NumericGreaterThanEquals,
    DateEquals,
    DateNotEquals,
    DateLessThan,
    DateLessThanEquals,
    DateGreaterThan,
    DateGreaterThanEquals,
    Bool,
    Null,
    IpAddress,
    NotIpAddress,
}

/// Kind of value an operator compares
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    String,
    Arn,
    Numeric,
    Date,
    Bool,
    Null,
    Ip,
}

impl BaseOperator {
    pub const ALL: [BaseOperator; 26] = [
        BaseOperator::StringEquals,
        BaseOperator::StringNotEquals,
        BaseOperator::StringEqualsIgnoreCase,
        BaseOperator::StringNotEqualsIgnoreCase,
        BaseOperator::StringLike,
        BaseOperator::StringNotLike,
        BaseOperator::ArnEquals,
        BaseOperator::ArnNotEquals,
        BaseOperator::ArnLike,
        BaseOperator::ArnNotLike,
        BaseOperator::NumericEquals,
        BaseOperator::NumericNotEquals,
        BaseOperator::NumericLessThan,
        BaseOperator::NumericLessThanEquals,
        BaseOperator::NumericGreaterThan,
        BaseOperator::NumericGreaterThanEquals,
        BaseOperator::DateEquals,
        BaseOperator::DateNotEquals,
        BaseOperator::DateLessThan,
        BaseOperator::DateLessThanEquals,
        BaseOperator::DateGreaterThan,
        BaseOperator::DateGreaterThanEquals,
        BaseOperator::Bool,
        BaseOperator::Null,
        BaseOperator::IpAddress,
        BaseOperator::NotIpAddress,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BaseOperator::StringEquals => "StringEquals",
            BaseOperator::StringNotEquals => "StringNotEquals",
            BaseOperator::StringEqualsIgnoreCase => "StringEqualsIgnoreCase",
            BaseOperator::StringNotEqualsIgnoreCase => "StringNotEqualsIgnoreCase",
            BaseOperator::StringLike => "StringLike",
            BaseOperator::StringNotLike => "StringNotLike",
            BaseOperator::ArnEquals => "ArnEquals",
            BaseOperator::ArnNotEquals => "ArnNotEquals",
            BaseOperator::ArnLike => "ArnLike",
            BaseOperator::ArnNotLike => "ArnNotLike",
            BaseOperator::NumericEquals => "NumericEquals",
            BaseOperator::NumericNotEquals => "NumericNotEquals",
            BaseOperator::NumericLessThan => "NumericLessThan",
            BaseOperator::NumericLessThanEquals => "NumericLessThanEquals",
            BaseOperator::NumericGreaterThan => "NumericGreaterThan",
            BaseOperator::NumericGreaterThanEquals => "NumericGreaterThanEquals",
            BaseOperator::DateEquals => "DateEquals",
            BaseOperator::DateNotEquals => "DateNotEquals",
            BaseOperator::DateLessThan => "DateLessThan",
            BaseOperator::DateLessThanEquals => "DateLessThanEquals",
            BaseOperator::DateGreaterThan => "DateGreaterThan",
            BaseOperator::DateGreaterThanEquals => "DateGreaterThanEquals",
            BaseOperator::Bool => "Bool",
            BaseOperator::Null => "Null",
            BaseOperator::IpAddress => "IpAddress",
            BaseOperator::NotIpAddress => "NotIpAddress",
        }
    }

    /// `*Like` operators are the only ones where `*` and `?` are wildcards
    pub fn is_like(&self) -> bool {
        matches!(
            self,
            BaseOperator::StringLike
                | BaseOperator::StringNotLike
                | BaseOperator::ArnLike
                | BaseOperator::ArnNotLike
        )
    }

    /// Negated operators hold when the value matches none of the patterns
    pub fn is_negated(&self) -> bool {
        matches!(
            self,
            BaseOperator::StringNotEquals
                | BaseOperator::StringNotEqualsIgnoreCase
                | BaseOperator::StringNotLike
                | BaseOperator::ArnNotEquals
                | BaseOperator::ArnNotLike
                | BaseOperator::NumericNotEquals
                | BaseOperator::DateNotEquals
                | BaseOperator::NotIpAddress
        )
    }

    pub fn value_kind(&self) -> ValueKind {
        use BaseOperator::*;
        match self {
            StringEquals | StringNotEquals | StringEqualsIgnoreCase
            | StringNotEqualsIgnoreCase | StringLike | StringNotLike => ValueKind::String,
            ArnEquals | ArnNotEquals | ArnLike | ArnNotLike => ValueKind::Arn,
            NumericEquals | NumericNotEquals | NumericLessThan | NumericLessThanEquals
            | NumericGreaterThan | NumericGreaterThanEquals => ValueKind::Numeric,
            DateEquals | DateNotEquals | DateLessThan | DateLessThanEquals | DateGreaterThan
            | DateGreaterThanEquals => ValueKind::Date,
            Bool => ValueKind::Bool,
            Null => ValueKind::Null,
            IpAddress | NotIpAddress => ValueKind::Ip,
        }
    }

    /// Un-negated test of one value against one pattern
    fn test(&self, value: &str, pattern: &str) -> bool {
        use BaseOperator::*;
        match self {
            StringEquals | StringNotEquals | ArnEquals | ArnNotEquals => value == pattern,
            StringEqualsIgnoreCase | StringNotEqualsIgnoreCase => {
                value.to_lowercase() == pattern.to_lowercase()
            }
            StringLike | StringNotLike => PatternMatcher::matches(pattern, value),
            ArnLike | ArnNotLike => arn_like(pattern, value),
            NumericEquals | NumericNotEquals => compare_numeric(value, pattern, |a, b| a == b),
            NumericLessThan => compare_numeric(value, pattern, |a, b| a < b),
            NumericLessThanEquals => compare_numeric(value, pattern, |a, b| a <= b),
            NumericGreaterThan => compare_numeric(value, pattern, |a, b| a > b),
            NumericGreaterThanEquals => compare_numeric(value, pattern, |a, b| a >= b),
            DateEquals | DateNotEquals => compare_date(value, pattern, |a, b| a == b),
            DateLessThan => compare_date(value, pattern, |a, b| a < b),
            DateLessThanEquals => compare_date(value, pattern, |a, b| a <= b),
            DateGreaterThan => compare_date(value, pattern, |a, b| a > b),
            DateGreaterThanEquals => compare_date(value, pattern, |a, b| a >= b),
            Bool => match (parse_bool(value), parse_bool(pattern)) {
                (Some(a), Some(b)) => a == b,
                _ => false,
            },
            // Presence is decided by the caller; a present value only satisfies "false"
            Null => parse_bool(pattern) == Some(false),
            IpAddress | NotIpAddress => ip_in_range(value, pattern),
        }
    }
}

impl FromStr for BaseOperator {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        BaseOperator::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| PolicyError::UnsupportedOperator(s.to_string()))
    }
}

/// Multi-valued key qualifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SetQualifier {
    ForAnyValue,
    ForAllValues,
}

/// A fully parsed condition operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConditionOperator {
    pub base: BaseOperator,
    pub qualifier: Option<SetQualifier>,
    pub if_exists: bool,
}

impl ConditionOperator {
    pub fn new(base: BaseOperator) -> Self {
        ConditionOperator {
            base,
            qualifier: None,
            if_exists: false,
        }
    }

    /// Parse an operator string, e.g. `ForAllValues:StringLikeIfExists`
    pub fn parse(s: &str) -> Result<Self> {
        let unsupported = || PolicyError::UnsupportedOperator(s.to_string());

        let (qualifier, rest) = match s.split_once(':') {
            Some(("ForAnyValue", rest)) => (Some(SetQualifier::ForAnyValue), rest),
            Some(("ForAllValues", rest)) => (Some(SetQualifier::ForAllValues), rest),
            Some(_) => return Err(unsupported()),
            None => (None, s),
        };

        let (name, if_exists) = match rest.strip_suffix("IfExists") {
            Some(name) => (name, true),
            None => (rest, false),
        };

        let base: BaseOperator = name.parse().map_err(|_| unsupported())?;
        if if_exists && base == BaseOperator::Null {
            return Err(unsupported());
        }

        Ok(ConditionOperator {
            base,
            qualifier,
            if_exists,
        })
    }

    /// Test a single value against a single pattern, applying negation
    pub fn matches(&self, value: &str, pattern: &str) -> bool {
        let hit = self.base.test(value, pattern);
        if self.base.is_negated() {
            !hit
        } else {
            hit
        }
    }

    /// Test one request value against every pattern of a condition entry
    ///
    /// Positive operators need one matching pattern; negated operators need the
    /// value to avoid all of them.
    pub fn matches_any_pattern<'a, I>(&self, value: &str, patterns: I) -> bool
    where
        I: IntoIterator<Item = &'a String>,
    {
        let mut patterns = patterns.into_iter();
        if self.base.is_negated() {
            patterns.all(|p| self.matches(value, p))
        } else {
            patterns.any(|p| self.matches(value, p))
        }
    }

    /// Evaluate a full condition entry against the request values for its key
    ///
    /// `values` is `None` when the key is absent from the request context.
    pub fn evaluate(&self, patterns: &BTreeSet<String>, values: Option<&[String]>) -> bool {
        if self.base == BaseOperator::Null {
            let absent = values.map_or(true, |v| v.is_empty());
            return patterns
                .iter()
                .any(|p| parse_bool(p) == Some(absent));
        }

        let values = match values {
            Some(v) if !v.is_empty() => v,
            // Missing key: IfExists, ForAllValues (vacuous truth) and negated operators pass
            _ => {
                return self.if_exists
                    || self.base.is_negated()
                    || self.qualifier == Some(SetQualifier::ForAllValues);
            }
        };

        match self.qualifier {
            Some(SetQualifier::ForAllValues) => values
                .iter()
                .all(|v| self.matches_any_pattern(v, patterns)),
            Some(SetQualifier::ForAnyValue) | None => values
                .iter()
                .any(|v| self.matches_any_pattern(v, patterns)),
        }
    }

    /// Check that a literal is well-typed for this operator
    pub fn accepts_value(&self, value: &str) -> bool {
        match self.base.value_kind() {
            ValueKind::String | ValueKind::Arn => true,
            ValueKind::Numeric => value.trim().parse::<f64>().is_ok(),
            ValueKind::Date => parse_date(value).is_some(),
            ValueKind::Bool | ValueKind::Null => parse_bool(value).is_some(),
            ValueKind::Ip => parse_cidr(value).is_some(),
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.qualifier {
            Some(SetQualifier::ForAnyValue) => write!(f, "ForAnyValue:")?,
            Some(SetQualifier::ForAllValues) => write!(f, "ForAllValues:")?,
            None => {}
        }
        write!(f, "{}", self.base.as_str())?;
        if self.if_exists {
            write!(f, "IfExists")?;
        }
        Ok(())
    }
}

impl FromStr for ConditionOperator {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self> {
        ConditionOperator::parse(s)
    }
}

/// Match a value against a pattern under the named operator
///
/// # Examples
/// ```
/// use trustcheck::iam::matches;
///
/// assert!(matches("ref:main", "ref:*", "StringLike").unwrap());
/// assert!(!matches("ref:main", "ref:*", "StringEquals").unwrap());
/// assert!(matches("ref:main", "ref:*", "StringGlob").is_err());
/// ```
pub fn matches(value: &str, pattern: &str, operator: &str) -> Result<bool> {
    Ok(ConditionOperator::parse(operator)?.matches(value, pattern))
}

/// ArnLike compares each of the six colon-delimited components separately;
/// anything that is not a six-part ARN on both sides never matches
fn arn_like(pattern: &str, value: &str) -> bool {
    let pattern_parts: Vec<&str> = pattern.splitn(6, ':').collect();
    let value_parts: Vec<&str> = value.splitn(6, ':').collect();

    if pattern_parts.len() != 6 || value_parts.len() != 6 {
        return false;
    }

    pattern_parts
        .iter()
        .zip(value_parts.iter())
        .all(|(p, v)| PatternMatcher::matches(p, v))
}

fn compare_numeric(value: &str, pattern: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (value.trim().parse::<f64>(), pattern.trim().parse::<f64>()) {
        (Ok(a), Ok(b)) => cmp(a, b),
        _ => false,
    }
}

fn compare_date(
    value: &str,
    pattern: &str,
    cmp: impl Fn(DateTime<Utc>, DateTime<Utc>) -> bool,
) -> bool {
    match (parse_date(value), parse_date(pattern)) {
        (Some(a), Some(b)) => cmp(a, b),
        _ => false,
    }
}

/// Dates are RFC 3339 timestamps or epoch seconds
pub(crate) fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(|secs| DateTime::from_timestamp(secs, 0))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Parse `addr` or `addr/prefix` into network address and prefix length
fn parse_cidr(value: &str) -> Option<(IpAddr, u8)> {
    let (addr, prefix) = match value.trim().split_once('/') {
        Some((addr, prefix)) => (addr, Some(prefix)),
        None => (value.trim(), None),
    };
    let addr: IpAddr = addr.parse().ok()?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    let prefix = match prefix {
        Some(p) => p.parse::<u8>().ok().filter(|&p| p <= max)?,
        None => max,
    };
    Some((addr, prefix))
}

fn ip_in_range(value: &str, range: &str) -> bool {
    let (Ok(ip), Some((net, prefix))) = (value.trim().parse::<IpAddr>(), parse_cidr(range)) else {
        return false;
    };

    match (ip, net) {
        (IpAddr::V4(ip), IpAddr::V4(net)) => {
            let mask = u32::MAX.checked_shl(32 - u32::from(prefix)).unwrap_or(0);
            u32::from(ip) & mask == u32::from(net) & mask
        }
        (IpAddr::V6(ip), IpAddr::V6(net)) => {
            let mask = u128::MAX.checked_shl(128 - u32::from(prefix)).unwrap_or(0);
            u128::from(ip) & mask == u128::from(net) & mask
        }
        _ => false,
    }
}

//! Pattern matching for IAM condition values and actions
//!
//! Supports wildcards:
//! - `*` - Matches any run of characters, including none
//! - `?` - Matches exactly one character
//!
//! Every other character matches literally. Matching is anchored at both ends
//! and compares characters, not bytes, so `?` consumes one full code point.

/// Glob matcher used by `*Like` operators and action patterns
pub struct PatternMatcher;

impl PatternMatcher {
    /// Check if a value matches a pattern (case-sensitive)
    ///
    /// # Examples
    /// ```
    /// use trustcheck::iam::PatternMatcher;
    ///
    /// assert!(PatternMatcher::matches("ref:*", "ref:main"));
    /// assert!(PatternMatcher::matches("v?", "v1"));
    /// assert!(!PatternMatcher::matches("ref:*", "xref:main"));
    /// ```
    pub fn matches(pattern: &str, value: &str) -> bool {
        let pattern: Vec<char> = pattern.chars().collect();
        let value: Vec<char> = value.chars().collect();
        Self::match_chars(&pattern, &value)
    }

    /// Case-insensitive variant (IAM action names are case-insensitive)
    pub fn matches_ignore_case(pattern: &str, value: &str) -> bool {
        Self::matches(&pattern.to_lowercase(), &value.to_lowercase())
    }

    /// True if the pattern contains a wildcard character
    pub fn has_wildcard(pattern: &str) -> bool {
        pattern.contains(['*', '?'])
    }

    /// True if the pattern is made only of wildcards (`*`, `**`, `*?` ...)
    ///
    /// Such a pattern has no narrowing prefix and matches nearly anything.
    pub fn is_bare_wildcard(pattern: &str) -> bool {
        !pattern.is_empty() && pattern.chars().all(|c| c == '*' || c == '?') && pattern.contains('*')
    }

    /// Greedy matcher with single-star backtracking
    fn match_chars(pattern: &[char], value: &[char]) -> bool {
        let (mut p, mut v) = (0usize, 0usize);
        // Position of the last `*` seen and the value index it is anchored to
        let mut star: Option<(usize, usize)> = None;

        while v < value.len() {
            if p < pattern.len() && pattern[p] == '*' {
                star = Some((p, v));
                p += 1;
            } else if p < pattern.len() && (pattern[p] == '?' || pattern[p] == value[v]) {
                p += 1;
                v += 1;
            } else if let Some((star_p, star_v)) = star {
                // Let the last star swallow one more character
                p = star_p + 1;
                v = star_v + 1;
                star = Some((star_p, star_v + 1));
            } else {
                return false;
            }
        }

        pattern[p..].iter().all(|&c| c == '*')
    }
}

//! Anchored glob matching for role name patterns.
//!
//! Join policies name host roles by pattern: `*` matches any run of
//! characters (including the empty run), `?` matches exactly one character,
//! everything else is literal. Matching is full-string: `dev*` matches
//! `dev-east` but not `sre-dev-east`.
//!
//! Matching is total: every pattern/name pair yields `true` or `false`,
//! never an error. There is no escaping; a pattern that wants a literal
//! `*` cannot express it and simply never matches one.

/// Returns `true` if `pattern` glob-matches the whole of `name`.
///
/// # Example
///
/// ```
/// use conclave_access::glob_matches;
///
/// assert!(glob_matches("dev-*", "dev-east"));
/// assert!(glob_matches("node-?", "node-7"));
/// assert!(!glob_matches("dev-*", "sre-dev"));
/// assert!(glob_matches("*", ""));
/// ```
#[must_use]
pub fn glob_matches(pattern: &str, name: &str) -> bool {
    let p: Vec<char> = pattern.chars().collect();
    let n: Vec<char> = name.chars().collect();

    // Two-pointer scan with single-star backtracking.
    let (mut pi, mut ni) = (0usize, 0usize);
    let mut star: Option<(usize, usize)> = None;

    while ni < n.len() {
        if pi < p.len() && (p[pi] == '?' || p[pi] == n[ni]) {
            pi += 1;
            ni += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star = Some((pi, ni));
            pi += 1;
        } else if let Some((star_pi, star_ni)) = star {
            // Let the last star absorb one more character and retry.
            pi = star_pi + 1;
            ni = star_ni + 1;
            star = Some((star_pi, star_ni + 1));
        } else {
            return false;
        }
    }

    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }

    pi == p.len()
}

/// Returns `true` if any pattern in `patterns` glob-matches `name`.
#[must_use]
pub fn any_glob_matches<S: AsRef<str>>(patterns: &[S], name: &str) -> bool {
    patterns.iter().any(|p| glob_matches(p.as_ref(), name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn literal_match() {
        assert!(glob_matches("auditor", "auditor"));
        assert!(!glob_matches("auditor", "auditors"));
        assert!(!glob_matches("auditors", "auditor"));
    }

    #[test]
    fn star_matches_any_run() {
        assert!(glob_matches("*", "anything"));
        assert!(glob_matches("*", ""));
        assert!(glob_matches("dev-*", "dev-east"));
        assert!(glob_matches("dev-*", "dev-"));
        assert!(glob_matches("*-east", "dev-east"));
        assert!(glob_matches("d*t", "dev-east"));
    }

    #[test]
    fn star_is_anchored() {
        assert!(!glob_matches("dev-*", "sre-dev-east"));
        assert!(!glob_matches("*-east", "dev-east-2"));
    }

    #[test]
    fn question_mark_matches_one_char() {
        assert!(glob_matches("node-?", "node-7"));
        assert!(!glob_matches("node-?", "node-"));
        assert!(!glob_matches("node-?", "node-77"));
    }

    #[test]
    fn mixed_wildcards() {
        assert!(glob_matches("?ev*", "dev-east"));
        assert!(glob_matches("*:participant", "user:participant"));
        assert!(!glob_matches("?*", ""));
    }

    #[test]
    fn multiple_stars_backtrack() {
        assert!(glob_matches("a*b*c", "aXbYc"));
        assert!(glob_matches("a*b*c", "abc"));
        assert!(glob_matches("a*b*c", "aXbXbXc"));
        assert!(!glob_matches("a*b*c", "aXcYb"));
    }

    #[test]
    fn matching_is_total_for_odd_patterns() {
        // No pattern is "malformed"; these all simply answer false or true.
        assert!(!glob_matches("", "name"));
        assert!(glob_matches("", ""));
        assert!(glob_matches("***", "x"));
        assert!(!glob_matches("[a-z]", "a")); // brackets are literal
        assert!(glob_matches("[a-z]", "[a-z]"));
    }

    #[test]
    fn any_pattern_wins() {
        let patterns = ["sre-*", "dev-*"];
        assert!(any_glob_matches(&patterns, "dev-east"));
        assert!(!any_glob_matches(&patterns, "auditor"));
        assert!(!any_glob_matches::<&str>(&[], "auditor"));
    }
}

//! Unified error interface for Conclave crates.
//!
//! Every error enum in the workspace implements [`ErrorCode`]:
//! a stable UPPER_SNAKE_CASE code with a per-crate prefix, plus a
//! recoverability flag that drives retry decisions (tracker CAS conflicts
//! retry; access denials do not).

use thiserror::Error;

/// Machine-readable error code interface.
///
/// # Example
///
/// ```
/// use conclave_types::ErrorCode;
///
/// #[derive(Debug)]
/// enum StoreError {
///     CompareFailed,
///     NotFound(String),
/// }
///
/// impl ErrorCode for StoreError {
///     fn code(&self) -> &'static str {
///         match self {
///             Self::CompareFailed => "STORE_COMPARE_FAILED",
///             Self::NotFound(_) => "STORE_NOT_FOUND",
///         }
///     }
///
///     fn is_recoverable(&self) -> bool {
///         matches!(self, Self::CompareFailed)
///     }
/// }
///
/// assert!(StoreError::CompareFailed.is_recoverable());
/// ```
pub trait ErrorCode {
    /// Returns a stable machine-readable code: UPPER_SNAKE_CASE, prefixed
    /// with the owning crate's domain (`ACCESS_`, `TRACKER_`, `SESSION_`,
    /// `CLIENT_`, ...).
    fn code(&self) -> &'static str;

    /// Returns `true` if retrying the operation may succeed.
    fn is_recoverable(&self) -> bool;
}

/// Errors from parsing the shared wire-level types.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TypeError {
    /// A session kind string that is neither `ssh` nor `k8s`.
    #[error("unknown session kind: {0}")]
    UnknownSessionKind(String),

    /// A participant mode string outside `peer`/`observer`/`moderator`/`*`.
    #[error("unknown session mode: {0}")]
    UnknownSessionMode(String),

    /// A role version tag outside `v1`..`v5`.
    #[error("unsupported role version: {0}")]
    UnknownRoleVersion(String),
}

impl ErrorCode for TypeError {
    fn code(&self) -> &'static str {
        match self {
            Self::UnknownSessionKind(_) => "TYPES_UNKNOWN_SESSION_KIND",
            Self::UnknownSessionMode(_) => "TYPES_UNKNOWN_SESSION_MODE",
            Self::UnknownRoleVersion(_) => "TYPES_UNKNOWN_ROLE_VERSION",
        }
    }

    fn is_recoverable(&self) -> bool {
        // All are configuration errors; retrying the same input cannot help.
        false
    }
}

/// Asserts that an error code follows the workspace conventions:
/// non-empty, prefixed, UPPER_SNAKE_CASE.
///
/// # Panics
///
/// Panics with a descriptive message if validation fails.
pub fn assert_error_code<E: ErrorCode>(err: &E, expected_prefix: &str) {
    let code = err.code();

    assert!(!code.is_empty(), "error code must not be empty");
    assert!(
        code.starts_with(expected_prefix),
        "error code '{code}' must start with prefix '{expected_prefix}'"
    );
    assert!(
        is_upper_snake_case(code),
        "error code '{code}' must be UPPER_SNAKE_CASE"
    );
}

/// Asserts a whole slice of variants at once; use from an `all_variants()`
/// test helper so new variants cannot dodge the check.
pub fn assert_error_codes<E: ErrorCode>(errors: &[E], expected_prefix: &str) {
    for err in errors {
        assert_error_code(err, expected_prefix);
    }
}

fn is_upper_snake_case(s: &str) -> bool {
    if s.is_empty() || s.starts_with('_') || s.ends_with('_') || s.contains("__") {
        return false;
    }

    s.chars()
        .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

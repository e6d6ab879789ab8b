//! Access layer errors.
//!
//! | Error | Code | Recoverable |
//! |-------|------|-------------|
//! | [`AccessError::FilterSyntax`] | `ACCESS_FILTER_SYNTAX` | No |
//! | [`AccessError::FilterType`] | `ACCESS_FILTER_TYPE` | No |
//! | [`AccessError::IdentifierNotFound`] | `ACCESS_IDENTIFIER_NOT_FOUND` | No |
//! | [`AccessError::UnsupportedOnLeave`] | `ACCESS_UNSUPPORTED_ON_LEAVE` | No |
//! | [`AccessError::BadMode`] | `ACCESS_BAD_MODE` | No |
//!
//! All of these are configuration errors: a policy that fails to evaluate
//! must surface upward and never resolves to "allow".

use conclave_types::{ErrorCode, TypeError};
use thiserror::Error;

/// Error from policy evaluation or filter parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccessError {
    /// The filter expression could not be parsed.
    #[error("filter syntax error: {0}")]
    FilterSyntax(String),

    /// The filter parsed but does not evaluate to a boolean, or an
    /// operator was applied to the wrong value type.
    #[error("filter type error: {0}")]
    FilterType(String),

    /// The filter referenced an identifier outside the participant
    /// namespace.
    #[error("{0} is not defined")]
    IdentifierNotFound(String),

    /// A require policy carries an `on_leave` value other than
    /// `terminate` or `pause`.
    #[error("unsupported on_leave policy: {0}")]
    UnsupportedOnLeave(String),

    /// A join policy grants a mode string that is not a known mode.
    #[error("bad participant mode: {0}")]
    BadMode(#[from] TypeError),
}

impl ErrorCode for AccessError {
    fn code(&self) -> &'static str {
        match self {
            Self::FilterSyntax(_) => "ACCESS_FILTER_SYNTAX",
            Self::FilterType(_) => "ACCESS_FILTER_TYPE",
            Self::IdentifierNotFound(_) => "ACCESS_IDENTIFIER_NOT_FOUND",
            Self::UnsupportedOnLeave(_) => "ACCESS_UNSUPPORTED_ON_LEAVE",
            Self::BadMode(_) => "ACCESS_BAD_MODE",
        }
    }

    fn is_recoverable(&self) -> bool {
        // Policy configuration problems; retrying the same evaluation
        // cannot change the outcome.
        false
    }
}

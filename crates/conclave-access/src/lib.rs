//! Session access policy evaluation for Conclave.
//!
//! This crate is the pure decision engine of the subsystem: given the host
//! user's roles and a session kind, it decides whether a session may start
//! with a set of participants and with which modes a user may join. It
//! performs no I/O and never suspends; the orchestrator calls it on every
//! join and leave.
//!
//! # Components
//!
//! - [`Expr`] / [`FilterContext`]: the boolean filter expression language
//!   evaluated over the `participant.*` namespace.
//! - [`glob_matches`]: anchored `*`/`?` matching of join-policy role
//!   patterns against host role names.
//! - [`SessionAccessEvaluator`]: the policy engine combining both.
//!
//! # Failure semantics
//!
//! Evaluation errors (filter syntax, unknown identifiers, unsupported
//! policy values) surface as [`AccessError`] and never resolve to "allow".

mod error;
mod evaluator;
mod filter;
mod pattern;

pub use error::AccessError;
pub use evaluator::{PolicyOptions, SessionAccessEvaluator};
pub use filter::{Expr, FilterContext};
pub use pattern::{any_glob_matches, glob_matches};

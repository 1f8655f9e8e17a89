//! ArchGate Policy
//!
//! Declarative risk policy gating the "apply" decision.
//!
//! # Checks
//!
//! In evaluation order:
//!
//! 1. Sandbox branch prefix (when a branch is known)
//! 2. Blast-radius limits
//! 3. Allow-list, forbidden and protected path globs
//! 4. Binary changes and forbidden extensions
//! 5. Sentinel markers in the payload
//! 6. Commit gate (file checker, module status, `partial_ok` quota)
//!
//! Under `enforce` any violation blocks; `warn` reports without blocking;
//! `off` never blocks. Violations are always returned.

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod engine;
pub mod error;
pub mod mode;
pub mod spec;
pub mod violation;

pub use engine::PolicyEngine;
pub use error::PolicyError;
pub use mode::{PolicyMode, UnknownMode};
pub use spec::{Binaries, Budgets, CommitGate, Limits, Markers, Paths, PolicySpec};
pub use violation::{LimitField, PolicyVerdict, Violation};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

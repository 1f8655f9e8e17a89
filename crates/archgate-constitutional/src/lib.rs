//! ArchGate Constitutional Layer
//!
//! The only part of the gate that writes to the working tree and the run
//! archive.
//!
//! # Core Operations
//!
//! - **Apply**: write an envelope into its target file, idempotently
//! - **Audit**: record snapshots, decisions and console lines for a run
//!
//! # Example
//!
//! ```rust,ignore
//! use archgate_constitutional::{PatchApplier, ApplyAction};
//!
//! let applier = PatchApplier::new(repo_root).with_create_parents(true);
//! let outcome = applier.apply(&mut envelope)?;
//! assert_ne!(outcome.action, ApplyAction::Skip);
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod applier;
pub mod audit;
pub mod error;

pub use applier::{ApplyAction, ApplyOutcome, PatchApplier};
pub use audit::{IndexEntry, RunArchive};
pub use error::{ApplyError, AuditError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

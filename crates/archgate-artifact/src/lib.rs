//! ArchGate Artifacts
//!
//! The data that flows through the gate: change envelopes, their framed
//! payload blocks, payload digests and diff statistics.
//!
//! # Core Concepts
//!
//! - [`ChangeEnvelope`]: one proposed change plus upstream annotations
//! - [`EnvelopeBlock`]: the sentinel-framed payload, with optional markers
//! - [`short_digest`]: truncated SHA-256 used as the idempotency key
//! - [`DiffStats`]: blast radius of a diff as reported by version control
//!
//! # Example
//!
//! ```rust,ignore
//! use archgate_artifact::{ChangeEnvelope, short_digest};
//!
//! let env = ChangeEnvelope::new(text).with_target("app/hello.py");
//! let block = env.block()?;
//! println!("payload hash: {}", short_digest(block.payload()));
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod block;
mod diffstats;
mod envelope;
mod hash;
mod status;

pub use block::{
    BlockError, EnvelopeBlock, FsIntent, InlineMeta, MarkerPair, Sentinels, BEGIN_SENTINEL,
    END_SENTINEL,
};
pub use diffstats::{DiffStats, FileStat};
pub use envelope::{ChangeEnvelope, EnvelopeError, EnvelopeId, EnvelopeMeta};
pub use hash::{short_digest, SHORT_DIGEST_LEN};
pub use status::{ErrorCategory, GlobalStatus, NextAction, StatusParseError};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

//! ArchGate Core - decision routing and orchestration
//!
//! The control plane that decides what happens to a generated change:
//! - Routes upstream checker annotations to apply, retry or rollback
//! - Gates every apply through the policy engine
//! - Dispatches exactly one backend operation per envelope
//! - Keeps an audit trail of every run
//!
//! # Example
//!
//! ```rust,ignore
//! use archgate_core::{GateConfig, GitBackend, Orchestrator};
//!
//! let config = GateConfig::new(".");
//! let mut backend = GitBackend::from_config(&config);
//! let outcome = Orchestrator::from_config(&config).run(envelope, &mut backend, None)?;
//!
//! println!("{}", outcome.decision.summary());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod backend;
pub mod checker;
pub mod config;
pub mod decision;
pub mod error;
pub mod error_policy;
pub mod orchestrator;
pub mod router;

pub use backend::{
    build_commit_message, BackendReport, ConsoleBackend, GitBackend, OrchestrationBackend,
    RegenerationRequest, RollbackEntry, REGENERATION_QUEUE, ROLLBACK_BUNDLE,
};
pub use checker::{Checker, SentinelChecker};
pub use config::GateConfig;
pub use decision::{Action, Decision};
pub use error::{BackendError, CheckerError, ConfigError, NormalizeError, OrchestratorError};
pub use error_policy::action_for_error;
pub use orchestrator::{Orchestrator, PolicyGate, RunOutcome};
pub use router::{split_reasons, DecisionRouter, ReasonNormalizer, MAX_REASON_CHARS};

/// Prelude module for common imports
pub mod prelude {
    //! Common imports for running the gate
    pub use crate::{
        Action, ConsoleBackend, Decision, DecisionRouter, GateConfig, GitBackend,
        OrchestrationBackend, Orchestrator, PolicyGate, RunOutcome,
    };
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

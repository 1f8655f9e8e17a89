//! ArchGate CLI - the operational surface
//!
//! Three subcommands around the gate:
//! - `apply`: route one envelope file through checkers, policy and a backend
//! - `tag-green`: snapshot and tag HEAD as a trusted state
//! - `rollback-green`: restore the newest green tag
//!
//! Every command returns a process exit code; see [`exit`].

#![warn(unreachable_pub)]
#![allow(missing_docs)]

pub mod commands;

use anyhow::Context;
use archgate_core::GateConfig;
use archgate_vcs::{RollbackOptions, RollbackStrategy};
use clap::parser::ValueSource;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::io::Write;
use std::path::PathBuf;

pub use commands::{apply, rollback_green, tag_green, ApplyArgs};

/// Process exit codes
pub mod exit {
    pub const OK: i32 = 0;
    pub const FAILURE: i32 = 1;
    pub const DIRTY_TREE: i32 = 2;
    pub const MISSING_ARCHIVE: i32 = 3;
    /// Missing or duplicate tag, or archive already present
    pub const TAG_CONFLICT: i32 = 4;
    pub const BLOCKED: i32 = 5;
}

/// Build the command-line interface
#[must_use]
pub fn cli() -> Command {
    Command::new("archgate")
        .version(VERSION)
        .about("Decision, policy and green-state gate for generated code changes")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("repo")
                .long("repo")
                .global(true)
                .default_value(".")
                .value_parser(value_parser!(PathBuf))
                .help("Repository root"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Gate configuration file (YAML)"),
        )
        .subcommand(
            Command::new("apply")
                .about("Route an envelope file and dispatch the decision")
                .arg(
                    Arg::new("envelope")
                        .required(true)
                        .value_parser(value_parser!(PathBuf))
                        .help("Envelope file (YAML or JSON)"),
                )
                .arg(
                    Arg::new("policy")
                        .long("policy")
                        .value_parser(value_parser!(PathBuf))
                        .help("Policy file; overrides the configured policy"),
                )
                .arg(
                    Arg::new("branch")
                        .long("branch")
                        .help("Working branch; defaults to the configured branch"),
                )
                .arg(
                    Arg::new("partial-count")
                        .long("partial-count")
                        .default_value("0")
                        .value_parser(value_parser!(u32))
                        .help("partial_ok changes already accepted in this run"),
                )
                .arg(
                    Arg::new("commit")
                        .long("commit")
                        .action(ArgAction::SetTrue)
                        .help("Write and commit through git instead of logging only"),
                ),
        )
        .subcommand(Command::new("tag-green").about("Archive and tag HEAD as green"))
        .subcommand(
            Command::new("rollback-green")
                .about("Restore the newest green tag")
                .arg(
                    Arg::new("strategy")
                        .long("strategy")
                        .default_value("merge")
                        .value_parser(["merge", "reset"])
                        .help("merge --no-ff the green commit, or reset --hard to it"),
                )
                .arg(
                    Arg::new("dry-run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Print the planned commands without running them"),
                )
                .arg(
                    Arg::new("no-clean-check")
                        .long("no-clean-check")
                        .action(ArgAction::SetTrue)
                        .help("Skip the clean working tree precondition"),
                ),
        )
}

/// Resolve the gate configuration from `--config` and `--repo`
///
/// An explicit `--repo` wins over the config file's `repo_root`.
///
/// # Errors
/// Returns an error if the config file cannot be loaded
pub fn resolve_config(matches: &ArgMatches) -> anyhow::Result<GateConfig> {
    let repo = matches
        .get_one::<PathBuf>("repo")
        .cloned()
        .unwrap_or_else(|| PathBuf::from("."));

    let Some(path) = matches.get_one::<PathBuf>("config") else {
        return Ok(GateConfig::new(repo));
    };
    let mut config = GateConfig::load(path)
        .with_context(|| format!("loading config {}", path.display()))?;
    if matches.value_source("repo") == Some(ValueSource::CommandLine) {
        config.repo_root = repo;
    }
    Ok(config)
}

/// Dispatch parsed arguments to a command
///
/// # Errors
/// Returns an error for failures that have no dedicated exit code
pub fn run(matches: &ArgMatches, out: &mut dyn Write) -> anyhow::Result<i32> {
    let config = resolve_config(matches)?;

    match matches.subcommand() {
        Some(("apply", sub)) => {
            let args = ApplyArgs {
                envelope: sub
                    .get_one::<PathBuf>("envelope")
                    .cloned()
                    .context("missing envelope argument")?,
                policy: sub.get_one::<PathBuf>("policy").cloned(),
                branch: sub.get_one::<String>("branch").cloned(),
                partial_count: sub.get_one::<u32>("partial-count").copied().unwrap_or(0),
                commit: sub.get_flag("commit"),
            };
            apply(&config, &args, out)
        }
        Some(("tag-green", _)) => tag_green(&config, chrono::Utc::now(), out),
        Some(("rollback-green", sub)) => {
            let strategy = sub
                .get_one::<String>("strategy")
                .map_or(Ok(RollbackStrategy::default()), |s| s.parse())
                .map_err(anyhow::Error::msg)?;
            let options = RollbackOptions {
                strategy,
                dry_run: sub.get_flag("dry-run"),
                skip_clean_check: sub.get_flag("no-clean-check"),
            };
            rollback_green(&config, options, out)
        }
        _ => {
            cli().print_help()?;
            Ok(exit::FAILURE)
        }
    }
}

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

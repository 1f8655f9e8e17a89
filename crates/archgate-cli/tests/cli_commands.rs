//! Commands driven against scratch repositories

use archgate_cli::{apply, cli, exit, rollback_green, run, tag_green, ApplyArgs};
use archgate_core::GateConfig;
use archgate_test_utils::{accepted_envelope, hello_payload, TempRepo};
use archgate_vcs::{RollbackOptions, RollbackStrategy};
use chrono::Utc;
use pretty_assertions::assert_eq;
use std::path::PathBuf;
use tempfile::TempDir;

fn green_repo() -> TempRepo {
    let repo = TempRepo::new();
    repo.write(".gitignore", ".archcode/\n.arch_runs/\n");
    repo.write("app/state.txt", "green\n");
    repo.commit_all("green state");
    repo
}

fn envelope_file(dir: &TempDir, body: &str) -> PathBuf {
    let env = accepted_envelope("app/hello.py", &hello_payload(body));
    let path = dir.path().join("envelope.yaml");
    std::fs::write(&path, env.to_yaml().unwrap()).unwrap();
    path
}

fn output(buf: Vec<u8>) -> String {
    String::from_utf8(buf).unwrap()
}

#[test]
fn apply_with_commit_writes_and_commits() {
    let repo = green_repo();
    let scratch = tempfile::tempdir().unwrap();
    let config = GateConfig::new(repo.path());
    let head = repo.head();

    let args = ApplyArgs {
        envelope: envelope_file(&scratch, "def hello(): pass"),
        commit: true,
        ..ApplyArgs::default()
    };
    let mut out = Vec::new();
    let code = apply(&config, &args, &mut out).unwrap();
    let text = output(out);

    assert_eq!(code, exit::OK);
    assert_ne!(repo.head(), head);
    assert!(text.contains("dispatched: apply"));
    assert!(text.contains(&format!("commit: {}", repo.head())));
    assert!(repo.read("app/hello.py").contains("def hello(): pass"));
}

#[test]
fn apply_without_commit_leaves_tree_alone() {
    let repo = green_repo();
    let scratch = tempfile::tempdir().unwrap();
    let config = GateConfig::new(repo.path());

    let args = ApplyArgs {
        envelope: envelope_file(&scratch, "def hello(): pass"),
        ..ApplyArgs::default()
    };
    let code = apply(&config, &args, &mut Vec::new()).unwrap();

    assert_eq!(code, exit::OK);
    assert!(!repo.join("app/hello.py").exists());
    assert!(config.run_dir().join("console.log").exists());
}

#[test]
fn apply_blocked_by_policy_exits_five() {
    let repo = green_repo();
    let scratch = tempfile::tempdir().unwrap();
    let policy = scratch.path().join("policy.yaml");
    std::fs::write(&policy, "limits:\n  max_loc_added: 0\n").unwrap();
    let config = GateConfig::new(repo.path());
    let head = repo.head();

    let args = ApplyArgs {
        envelope: envelope_file(&scratch, "def hello(): pass"),
        policy: Some(policy),
        commit: true,
        ..ApplyArgs::default()
    };
    let mut out = Vec::new();
    let code = apply(&config, &args, &mut out).unwrap();
    let text = output(out);

    assert_eq!(code, exit::BLOCKED);
    assert_eq!(repo.head(), head);
    assert!(!repo.join("app/hello.py").exists());
    assert!(text.contains("(policy override)"));
    assert!(text.contains("loc_added=3 > 0"));
}

#[test]
fn apply_policy_rejects_unsandboxed_branch() {
    let repo = green_repo();
    let scratch = tempfile::tempdir().unwrap();
    let policy = scratch.path().join("policy.yaml");
    std::fs::write(&policy, "mode: enforce\n").unwrap();

    let args = ApplyArgs {
        envelope: envelope_file(&scratch, "def hello(): pass"),
        policy: Some(policy),
        branch: Some("main".into()),
        ..ApplyArgs::default()
    };
    let code = apply(&GateConfig::new(repo.path()), &args, &mut Vec::new()).unwrap();
    assert_eq!(code, exit::BLOCKED);
}

#[test]
fn missing_envelope_is_an_error() {
    let repo = green_repo();
    let args = ApplyArgs {
        envelope: repo.join("nope.yaml"),
        ..ApplyArgs::default()
    };
    let err = apply(&GateConfig::new(repo.path()), &args, &mut Vec::new()).unwrap_err();
    assert!(format!("{err:#}").contains("loading envelope"));
}

#[test]
fn tag_then_rollback_restores_green_state() {
    let repo = green_repo();
    let config = GateConfig::new(repo.path());
    let green = repo.head();

    let mut out = Vec::new();
    assert_eq!(tag_green(&config, Utc::now(), &mut out).unwrap(), exit::OK);
    let text = output(out);
    assert!(text.lines().next().unwrap().starts_with("tag: green-"));
    assert!(text.contains("pushed: false"));

    repo.write("app/state.txt", "broken\n");
    repo.commit_all("regression");

    let mut out = Vec::new();
    let options = RollbackOptions {
        strategy: RollbackStrategy::Reset,
        ..RollbackOptions::default()
    };
    assert_eq!(rollback_green(&config, options, &mut out).unwrap(), exit::OK);
    let text = output(out);

    assert_eq!(repo.head(), green);
    assert_eq!(repo.read("app/state.txt"), "green\n");
    assert!(text.contains("strategy: reset"));
    assert!(text.contains("ran: git reset --hard"));
}

#[test]
fn rollback_exit_codes() {
    let repo = green_repo();
    let config = GateConfig::new(repo.path());

    let code = rollback_green(&config, RollbackOptions::default(), &mut Vec::new()).unwrap();
    assert_eq!(code, exit::TAG_CONFLICT);

    tag_green(&config, Utc::now(), &mut Vec::new()).unwrap();
    repo.write("app/state.txt", "uncommitted\n");
    let code = rollback_green(&config, RollbackOptions::default(), &mut Vec::new()).unwrap();
    assert_eq!(code, exit::DIRTY_TREE);

    let dry = RollbackOptions {
        dry_run: true,
        skip_clean_check: true,
        ..RollbackOptions::default()
    };
    let mut out = Vec::new();
    assert_eq!(rollback_green(&config, dry, &mut out).unwrap(), exit::OK);
    assert!(output(out).contains("plan: git merge --no-ff"));
    assert_eq!(repo.read("app/state.txt"), "uncommitted\n");
}

#[test]
fn missing_archive_exits_three() {
    let repo = green_repo();
    let config = GateConfig::new(repo.path());
    tag_green(&config, Utc::now(), &mut Vec::new()).unwrap();

    let archive = repo
        .join(".archcode/archive")
        .join(format!("patch_post_commit_{}.tar.gz", repo.head()));
    std::fs::remove_file(archive).unwrap();

    let mut out = Vec::new();
    let code = rollback_green(&config, RollbackOptions::default(), &mut out).unwrap();
    assert_eq!(code, exit::MISSING_ARCHIVE);
    assert!(output(out).contains("archive missing"));
}

#[test]
fn second_tag_on_same_commit_exits_four() {
    let repo = green_repo();
    let config = GateConfig::new(repo.path());
    let now = Utc::now();

    assert_eq!(tag_green(&config, now, &mut Vec::new()).unwrap(), exit::OK);
    let mut out = Vec::new();
    assert_eq!(tag_green(&config, now, &mut out).unwrap(), exit::TAG_CONFLICT);
    assert!(output(out).starts_with("error: "));
}

#[test]
fn run_dispatches_parsed_arguments() {
    let repo = green_repo();
    let repo_arg = repo.path().to_str().unwrap();
    let matches = cli()
        .try_get_matches_from(["archgate", "--repo", repo_arg, "rollback-green", "--dry-run"])
        .unwrap();

    let code = run(&matches, &mut Vec::new()).unwrap();
    assert_eq!(code, exit::TAG_CONFLICT);
}

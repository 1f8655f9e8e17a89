//! End-to-end runs against a scratch repository

use archgate_artifact::{DiffStats, FileStat, GlobalStatus, NextAction};
use archgate_core::{
    Action, DecisionRouter, GateConfig, GitBackend, Orchestrator, PolicyGate, SentinelChecker,
};
use archgate_policy::{PolicyEngine, PolicySpec};
use archgate_test_utils::{accepted_envelope, annotated_envelope, hello_payload, TempRepo};
use pretty_assertions::assert_eq;

fn config(repo: &TempRepo) -> GateConfig {
    GateConfig::new(repo.path())
}

#[test]
fn hello_scenario_commits_then_skips_then_replaces() {
    let repo = TempRepo::new();
    let config = config(&repo);
    let orchestrator = Orchestrator::from_config(&config)
        .with_checker(Box::new(SentinelChecker::default().with_extensions(["py"])));
    let mut backend = GitBackend::from_config(&config);

    let m1 = accepted_envelope("app/hello.py", &hello_payload("def hello(): pass"));
    let first = orchestrator.run(m1, &mut backend, None).unwrap();
    assert_eq!(first.dispatched, Action::Apply);
    let commit = first.envelope.meta.commit_id().unwrap().to_string();
    assert_eq!(repo.head(), commit);
    assert!(config.run_dir().join("patch_post_commit.yaml").exists());

    let again = accepted_envelope("app/hello.py", &hello_payload("def hello(): pass"));
    let second = orchestrator.run(again, &mut backend, None).unwrap();
    assert_eq!(second.envelope.meta.commit_id(), None);
    assert_eq!(repo.head(), commit);

    let m2 = accepted_envelope("app/hello.py", &hello_payload("def hello(): return 1"));
    let third = orchestrator.run(m2, &mut backend, None).unwrap();
    assert_ne!(repo.head(), commit);
    assert!(third
        .envelope
        .history()
        .iter()
        .any(|e| e.starts_with("fs:replace markers")));
    let text = repo.read("app/hello.py");
    assert!(text.contains("def hello(): return 1"));
    assert!(!text.contains("def hello(): pass"));
}

#[test]
fn policy_block_leaves_tree_untouched() {
    let repo = TempRepo::new();
    let config = config(&repo);
    let head = repo.head();
    let spec = PolicySpec::from_yaml_str("limits:\n  max_loc_added: 0\n").unwrap();
    let engine = PolicyEngine::new(spec).unwrap();

    let diff = DiffStats::from_files(
        vec![FileStat {
            path: "app/hello.py".into(),
            added: 1,
            deleted: 0,
        }],
        false,
        64,
    );

    let env = accepted_envelope("app/hello.py", &hello_payload("def hello(): pass"));
    let gate = PolicyGate {
        engine: &engine,
        diffstats: &diff,
        branch: Some(config.branch.as_str()),
        partial_count: 0,
    };
    let mut backend = GitBackend::from_config(&config);
    let outcome = Orchestrator::from_config(&config)
        .run(env, &mut backend, Some(gate))
        .unwrap();

    assert!(outcome.blocked());
    assert_eq!(outcome.dispatched, Action::Rollback);
    assert_eq!(repo.head(), head);
    assert!(!repo.join("app/hello.py").exists());
    assert!(repo.join("rollback_bundle.yaml").exists());
    let console = std::fs::read_to_string(config.run_dir().join("console.log")).unwrap();
    assert!(console.contains("[policy] BLOCKED: loc_added=1 > 0"));
}

#[test]
fn retry_goes_to_regeneration_queue() {
    let repo = TempRepo::new();
    let config = config(&repo);
    let mut env = annotated_envelope(
        "app/hello.py",
        &hello_payload("def hello(): pass"),
        GlobalStatus::PartialOk,
        NextAction::Retry,
    );
    env.meta.module_comment = Some("missing docstring".into());

    let mut backend = GitBackend::from_config(&config);
    let outcome = Orchestrator::new(DecisionRouter::default())
        .run(env, &mut backend, None)
        .unwrap();

    assert_eq!(outcome.dispatched, Action::Retry);
    let queue = repo.read(".archcode/regeneration_queue.yaml");
    assert!(queue.contains("missing docstring"));
    assert!(!repo.join("app/hello.py").exists());
}

#[test]
fn malformed_envelope_fails_before_branch_switch() {
    let repo = TempRepo::new();
    let config = config(&repo);
    let head = repo.head();

    let env = accepted_envelope("app/hello.py", "def hello(): pass\n");
    let mut backend = GitBackend::from_config(&config);
    let err = Orchestrator::from_config(&config)
        .run(env, &mut backend, None)
        .unwrap_err();

    assert!(err.to_string().contains("apply_and_commit"));
    assert_eq!(repo.git(&["rev-parse", "--abbrev-ref", "HEAD"]), "main");
    assert_eq!(repo.head(), head);
    assert!(!repo.join("app/hello.py").exists());
}

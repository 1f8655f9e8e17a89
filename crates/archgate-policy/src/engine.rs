//! Policy evaluation
//!
//! [`PolicyEngine`] compiles the glob rules of a [`PolicySpec`] once and then
//! evaluates changes against it. Evaluation is pure: the same envelope, diff,
//! branch and partial count always produce the same verdict.

use crate::error::PolicyError;
use crate::mode::PolicyMode;
use crate::spec::PolicySpec;
use crate::violation::{LimitField, PolicyVerdict, Violation};
use archgate_artifact::{ChangeEnvelope, DiffStats, GlobalStatus};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// A compiled glob list that remembers its source patterns
#[derive(Debug, Clone)]
struct PatternSet {
    patterns: Vec<String>,
    set: GlobSet,
}

impl PatternSet {
    fn compile(field: &'static str, patterns: &[String]) -> Result<Self, PolicyError> {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern).map_err(|source| PolicyError::InvalidGlob {
                field,
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
        }
        let set = builder.build().map_err(|source| PolicyError::InvalidGlob {
            field,
            pattern: patterns.join(", "),
            source,
        })?;
        Ok(Self {
            patterns: patterns.to_vec(),
            set,
        })
    }

    fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// First pattern matching `path`, if any
    fn first_match(&self, path: &str) -> Option<&str> {
        self.set
            .matches(path)
            .into_iter()
            .min()
            .map(|i| self.patterns[i].as_str())
    }
}

/// Evaluates changes against a compiled policy
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    spec: PolicySpec,
    allowed: PatternSet,
    forbidden: PatternSet,
    protected: PatternSet,
    extensions: Vec<String>,
}

impl PolicyEngine {
    /// Compile a policy
    ///
    /// # Errors
    /// Returns [`PolicyError::InvalidGlob`] if any path pattern is malformed
    pub fn new(spec: PolicySpec) -> Result<Self, PolicyError> {
        let allowed = PatternSet::compile("paths.allowed", &spec.paths.allowed)?;
        let forbidden = PatternSet::compile("paths.forbidden", &spec.paths.forbidden)?;
        let protected = PatternSet::compile("protected_files", &spec.protected_files)?;
        let extensions = spec
            .binaries
            .forbidden_extensions
            .iter()
            .map(|e| e.to_ascii_lowercase())
            .collect();
        Ok(Self {
            spec,
            allowed,
            forbidden,
            protected,
            extensions,
        })
    }

    /// The policy this engine was built from
    #[must_use]
    pub fn spec(&self) -> &PolicySpec {
        &self.spec
    }

    #[must_use]
    pub fn mode(&self) -> PolicyMode {
        self.spec.mode
    }

    /// Evaluate a change
    ///
    /// `branch` is the branch the change would land on, when known;
    /// `partial_count` is the number of `partial_ok` changes already accepted
    /// in this run.
    #[must_use]
    pub fn evaluate(
        &self,
        envelope: &ChangeEnvelope,
        diff: &DiffStats,
        branch: Option<&str>,
        partial_count: u32,
    ) -> PolicyVerdict {
        let mut violations = Vec::new();

        self.check_branch(branch, &mut violations);
        self.check_limits(diff, &mut violations);
        self.check_paths(diff, &mut violations);
        self.check_binaries(diff, &mut violations);
        self.check_markers(envelope, &mut violations);
        self.check_commit_gate(envelope, partial_count, &mut violations);

        let ok = violations.is_empty() || !self.spec.mode.blocks();
        tracing::debug!(
            policy_id = %self.spec.policy_id,
            mode = %self.spec.mode,
            violations = violations.len(),
            ok,
            "policy evaluated"
        );
        PolicyVerdict { ok, violations }
    }

    fn check_branch(&self, branch: Option<&str>, out: &mut Vec<Violation>) {
        if !self.spec.require_clone {
            return;
        }
        if let Some(branch) = branch {
            if !branch.starts_with(&self.spec.sandbox_prefix) {
                out.push(Violation::BranchNotSandboxed {
                    branch: branch.to_string(),
                    prefix: self.spec.sandbox_prefix.clone(),
                });
            }
        }
    }

    fn check_limits(&self, diff: &DiffStats, out: &mut Vec<Violation>) {
        let limits = &self.spec.limits;
        let checks = [
            (LimitField::FilesChanged, diff.files_changed, limits.max_files_changed),
            (LimitField::LocAdded, diff.loc_added, limits.max_loc_added),
            (LimitField::LocDeleted, diff.loc_deleted, limits.max_loc_deleted),
            (
                LimitField::PatchSizeBytes,
                diff.patch_size_bytes,
                limits.max_patch_size_bytes,
            ),
        ];
        for (field, actual, max) in checks {
            if actual > max {
                out.push(Violation::LimitExceeded { field, actual, max });
            }
        }
    }

    fn check_paths(&self, diff: &DiffStats, out: &mut Vec<Violation>) {
        if !self.allowed.is_empty() {
            for path in &diff.paths {
                if self.allowed.first_match(path).is_none() {
                    out.push(Violation::PathNotAllowed { path: path.clone() });
                }
            }
        }
        for path in &diff.paths {
            if let Some(pattern) = self.forbidden.first_match(path) {
                out.push(Violation::ForbiddenPath {
                    path: path.clone(),
                    pattern: pattern.to_string(),
                });
            }
            if let Some(pattern) = self.protected.first_match(path) {
                out.push(Violation::ProtectedFile {
                    path: path.clone(),
                    pattern: pattern.to_string(),
                });
            }
        }
    }

    fn check_binaries(&self, diff: &DiffStats, out: &mut Vec<Violation>) {
        if diff.has_binary && !self.spec.binaries.allow_binary_changes {
            out.push(Violation::BinaryChange);
        }
        for path in &diff.paths {
            let lower = path.to_ascii_lowercase();
            for ext in &self.extensions {
                if lower.ends_with(ext.as_str()) {
                    out.push(Violation::ForbiddenExtension {
                        path: path.clone(),
                        extension: ext.clone(),
                    });
                }
            }
        }
    }

    fn check_markers(&self, envelope: &ChangeEnvelope, out: &mut Vec<Violation>) {
        let markers = &self.spec.markers;
        if !markers.require_begin_end {
            return;
        }
        if !envelope.payload.contains(&markers.begin) || !envelope.payload.contains(&markers.end) {
            out.push(Violation::MissingMarkers {
                begin: markers.begin.clone(),
                end: markers.end.clone(),
            });
        }
    }

    fn check_commit_gate(
        &self,
        envelope: &ChangeEnvelope,
        partial_count: u32,
        out: &mut Vec<Violation>,
    ) {
        let gate = &self.spec.commit_gate;
        if gate.require_file_checker_ok {
            let file_check = envelope.meta.file_check();
            if !file_check.eq_ignore_ascii_case("ok") {
                out.push(Violation::FileCheckNotOk {
                    actual: file_check.to_string(),
                });
            }
        }

        let Some(status) = envelope.global_status() else {
            return;
        };
        let allowed = gate
            .module_status_allow
            .iter()
            .any(|s| s.trim().eq_ignore_ascii_case(status.as_str()));
        if !allowed {
            out.push(Violation::ModuleStatusNotAllowed {
                actual: status.as_str().to_string(),
            });
        }
        if status == GlobalStatus::PartialOk && partial_count >= gate.max_partial_ok_allowed {
            out.push(Violation::PartialOkQuota {
                count: partial_count,
                max: gate.max_partial_ok_allowed,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use archgate_artifact::{EnvelopeMeta, FileStat, NextAction};
    use pretty_assertions::assert_eq;

    const PAYLOAD: &str = "#{begin_meta: {}}\nM1\nx = 1\nM2\n#{end_meta}";

    fn envelope(file_check: &str) -> ChangeEnvelope {
        ChangeEnvelope::new(PAYLOAD).with_meta(EnvelopeMeta {
            target: Some("app/x.py".into()),
            file_check: Some(file_check.into()),
            ..EnvelopeMeta::default()
        })
    }

    fn diff(paths: &[&str]) -> DiffStats {
        DiffStats::from_files(
            paths
                .iter()
                .map(|p| FileStat {
                    path: (*p).to_string(),
                    added: 1,
                    deleted: 0,
                })
                .collect(),
            false,
            100,
        )
    }

    fn engine() -> PolicyEngine {
        PolicyEngine::new(PolicySpec::default()).unwrap()
    }

    #[test]
    fn clean_change_passes() {
        let verdict = engine().evaluate(&envelope("ok"), &diff(&["app/x.py"]), None, 0);
        assert!(verdict.ok);
        assert!(verdict.violations.is_empty());
    }

    #[test]
    fn branch_outside_sandbox() {
        let verdict = engine().evaluate(&envelope("ok"), &diff(&["app/x.py"]), Some("main"), 0);
        assert!(!verdict.ok);
        assert_eq!(
            verdict.messages(),
            ["branch 'main' does not start with sandbox_prefix 'archcode-self/'"]
        );

        let verdict = engine().evaluate(
            &envelope("ok"),
            &diff(&["app/x.py"]),
            Some("archcode-self/preview"),
            0,
        );
        assert!(verdict.ok);
    }

    #[test]
    fn forbidden_and_protected_paths() {
        let verdict = engine().evaluate(
            &envelope("ok"),
            &diff(&["infra/deploy/main.tf", "core/types.py", ".github/workflows/ci.yml"]),
            None,
            0,
        );
        assert_eq!(
            verdict.messages(),
            [
                "path 'infra/deploy/main.tf' matches paths.forbidden 'infra/**'",
                "path 'core/types.py' matches protected_files 'core/types.py'",
                "path '.github/workflows/ci.yml' matches protected_files '.github/workflows/**'",
            ]
        );
    }

    #[test]
    fn allow_list_applies_to_every_path() {
        let mut spec = PolicySpec::default();
        spec.paths.allowed = vec!["app/**".into()];
        let engine = PolicyEngine::new(spec).unwrap();
        let verdict = engine.evaluate(&envelope("ok"), &diff(&["app/x.py", "lib/y.py"]), None, 0);
        assert_eq!(verdict.violations, [Violation::PathNotAllowed { path: "lib/y.py".into() }]);
    }

    #[test]
    fn binary_flag_and_extensions() {
        let mut stats = diff(&["docs/Logo.PNG"]);
        stats.has_binary = true;
        let verdict = engine().evaluate(&envelope("ok"), &stats, None, 0);
        assert_eq!(
            verdict.violations,
            [
                Violation::BinaryChange,
                Violation::ForbiddenExtension {
                    path: "docs/Logo.PNG".into(),
                    extension: ".png".into()
                },
            ]
        );
    }

    #[test]
    fn forbidden_extension_even_without_binary_flag() {
        let mut spec = PolicySpec::default();
        spec.binaries.allow_binary_changes = true;
        let engine = PolicyEngine::new(spec).unwrap();
        let verdict = engine.evaluate(&envelope("ok"), &diff(&["lib/native.so"]), None, 0);
        assert_eq!(verdict.violations.len(), 1);
        assert_eq!(verdict.violations[0].field(), "binaries.forbidden_extensions");
    }

    #[test]
    fn missing_markers() {
        let env = ChangeEnvelope::new("x = 1").with_meta(EnvelopeMeta {
            file_check: Some("ok".into()),
            ..EnvelopeMeta::default()
        });
        let verdict = engine().evaluate(&env, &diff(&[]), None, 0);
        assert_eq!(verdict.violations.len(), 1);
        assert_eq!(verdict.violations[0].field(), "markers.require_begin_end");
    }

    #[test]
    fn commit_gate() {
        let mut env = envelope("ko");
        env.record_status(GlobalStatus::Rejected, NextAction::Rollback)
            .unwrap();
        let verdict = engine().evaluate(&env, &diff(&[]), None, 0);
        assert_eq!(
            verdict.messages(),
            [
                "file_check='ko' != ok",
                "global_status=rejected not in commit_gate.module_status_allow",
            ]
        );
    }

    #[test]
    fn partial_ok_quota() {
        let mut env = envelope("ok");
        env.record_status(GlobalStatus::PartialOk, NextAction::Accept)
            .unwrap();
        assert!(engine().evaluate(&env, &diff(&[]), None, 1).ok);
        let verdict = engine().evaluate(&env, &diff(&[]), None, 2);
        assert_eq!(
            verdict.violations,
            [Violation::PartialOkQuota { count: 2, max: 2 }]
        );
    }

    #[test]
    fn invalid_glob_fails_at_construction() {
        let mut spec = PolicySpec::default();
        spec.paths.forbidden = vec!["infra/[".into()];
        let err = PolicyEngine::new(spec).unwrap_err();
        assert!(matches!(
            err,
            PolicyError::InvalidGlob { field: "paths.forbidden", .. }
        ));
    }
}

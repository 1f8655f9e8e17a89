//! Gate configuration

use crate::error::ConfigError;
use archgate_policy::{PolicyMode, PolicySpec};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Where runs are archived, which branch changes land on, and how strictly
/// the router treats policy violations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    pub repo_root: PathBuf,
    /// Run archive directory, relative to `repo_root` unless absolute
    pub archive_dir: PathBuf,
    pub branch: String,
    pub mainline: String,
    pub remote: String,
    /// Push the branch after each commit
    pub push: bool,
    pub create_parents: bool,
    pub router_mode: PolicyMode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub policy_path: Option<PathBuf>,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            repo_root: PathBuf::from("."),
            archive_dir: PathBuf::from(".arch_runs/_last"),
            branch: "archcode-self/preview".into(),
            mainline: "main".into(),
            remote: "origin".into(),
            push: false,
            create_parents: true,
            router_mode: PolicyMode::Enforce,
            policy_path: None,
        }
    }
}

impl GateConfig {
    #[must_use]
    pub fn new(repo_root: impl Into<PathBuf>) -> Self {
        Self {
            repo_root: repo_root.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_archive_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.archive_dir = dir.into();
        self
    }

    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    #[must_use]
    pub fn with_mainline(mut self, mainline: impl Into<String>) -> Self {
        self.mainline = mainline.into();
        self
    }

    #[must_use]
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    #[must_use]
    pub fn with_push(mut self, push: bool) -> Self {
        self.push = push;
        self
    }

    #[must_use]
    pub fn with_create_parents(mut self, create: bool) -> Self {
        self.create_parents = create;
        self
    }

    #[must_use]
    pub fn with_router_mode(mut self, mode: PolicyMode) -> Self {
        self.router_mode = mode;
        self
    }

    #[must_use]
    pub fn with_policy_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.policy_path = Some(path.into());
        self
    }

    /// Read a YAML config file; missing keys keep their defaults
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or decoded
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = if text.trim().is_empty() {
            Self::default()
        } else {
            serde_yaml::from_str(&text)?
        };
        tracing::debug!(path = %path.display(), branch = %config.branch, "gate config loaded");
        Ok(config)
    }

    /// Absolute-or-root-relative run archive directory
    #[must_use]
    pub fn run_dir(&self) -> PathBuf {
        self.resolve(&self.archive_dir)
    }

    /// Load the policy named by `policy_path`, if any
    ///
    /// # Errors
    /// Returns [`ConfigError::Policy`] if the policy file is unreadable or invalid
    pub fn load_policy(&self) -> Result<Option<PolicySpec>, ConfigError> {
        self.policy_path
            .as_ref()
            .map(|p| PolicySpec::load(&self.resolve(p)).map_err(ConfigError::from))
            .transpose()
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.repo_root.join(path)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.yaml");
        std::fs::write(&path, "branch: archcode-self/feature\npush: true\nrouter_mode: warn\n").unwrap();

        let config = GateConfig::load(&path).unwrap();
        assert_eq!(config.branch, "archcode-self/feature");
        assert!(config.push);
        assert_eq!(config.router_mode, PolicyMode::Warn);
        assert_eq!(config.mainline, "main");
        assert_eq!(config.archive_dir, PathBuf::from(".arch_runs/_last"));
    }

    #[test]
    fn run_dir_is_relative_to_root() {
        let config = GateConfig::new("/repo");
        assert_eq!(config.run_dir(), PathBuf::from("/repo/.arch_runs/_last"));

        let config = config.with_archive_dir("/tmp/runs");
        assert_eq!(config.run_dir(), PathBuf::from("/tmp/runs"));
    }

    #[test]
    fn policy_loaded_from_root() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("policy.yaml"), "mode: warn\n").unwrap();
        let config = GateConfig::new(dir.path()).with_policy_path("policy.yaml");
        let spec = config.load_policy().unwrap().unwrap();
        assert_eq!(spec.mode, PolicyMode::Warn);

        assert!(GateConfig::default().load_policy().unwrap().is_none());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gate.yaml");
        std::fs::write(&path, "push: [not, a, bool]\n").unwrap();
        assert!(matches!(GateConfig::load(&path), Err(ConfigError::Decode(_))));
    }
}

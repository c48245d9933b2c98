//! Workspace Publisher - The full pipeline
//!
//! discovery → consistency check → sort → publish, with every failure
//! tagged by the phase it happened in.

use log::{info, warn};
use std::path::Path;
use tokio_util::sync::CancellationToken;

use super::publish_orchestrator::{PublishOrchestrator, RunReport};
use crate::core::config::RunOptions;
use crate::core::error::RunError;
use crate::core::traits::{PackagePublisher, VersionOracle};
use crate::validation::consistency_checker::{ConsistencyChecker, ConsistencyWarning};
use crate::validation::dependency_sorter::{self, PublishPlan};
use crate::workspace::discovery;
use crate::workspace::package::PackageSet;

/// Everything known before the first publish
#[derive(Debug, Clone)]
pub struct CheckReport {
    /// Packages with resolved published state, in discovery order
    pub packages: PackageSet,
    pub warnings: Vec<ConsistencyWarning>,
    pub plan: PublishPlan,
}

impl CheckReport {
    /// Plan entries that still need publishing
    pub fn pending(&self) -> Vec<&str> {
        self.plan
            .iter()
            .filter(|name| self.packages.get(name).is_some_and(|p| !p.is_published()))
            .map(String::as_str)
            .collect()
    }
}

pub struct WorkspacePublisher<'a> {
    publisher: &'a dyn PackagePublisher,
    oracle: &'a dyn VersionOracle,
}

impl<'a> WorkspacePublisher<'a> {
    pub fn new(publisher: &'a dyn PackagePublisher, oracle: &'a dyn VersionOracle) -> Self {
        Self { publisher, oracle }
    }

    /// Discover, check and sort without publishing anything
    pub async fn plan(&self, root: &Path) -> Result<CheckReport, RunError> {
        let discovered = discovery::discover(root)?;
        info!(
            "🔍 discovered {} package(s): {}",
            discovered.len(),
            discovered.names().join(", ")
        );

        let checked = ConsistencyChecker::new(self.oracle).check(discovered).await?;
        if !checked.warnings.is_empty() {
            warn!(
                "consistency check finished with {} warning(s)",
                checked.warnings.len()
            );
        }

        let plan = dependency_sorter::sort(&checked.packages)?;
        info!("📋 publish order: {}", plan);

        Ok(CheckReport {
            packages: checked.packages,
            warnings: checked.warnings,
            plan,
        })
    }

    /// Run the whole pipeline
    ///
    /// # Errors
    ///
    /// Returns the first fatal `RunError`; its `phase()` names where the run
    /// stopped.
    pub async fn publish(
        &self,
        root: &Path,
        options: &RunOptions,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        let check = self.plan(root).await?;

        let pending = check.pending();
        if pending.is_empty() {
            info!("nothing to publish: every package is already in the registry");
        } else {
            info!("{} package(s) to publish: {}", pending.len(), pending.join(", "));
        }

        PublishOrchestrator::new(self.publisher, self.oracle, options)
            .run(&check.plan, &check.packages, cancel)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::error::Phase;
    use crate::core::state_machine::PackageState;
    use crate::orchestration::test_support::{FakeRegistry, fast_options};
    use tempfile::TempDir;

    fn write(root: &Path, relative: &str, content: &str) {
        let path = root.join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    /// `app` → `util` → `core`, listed in the opposite order
    fn workspace() -> TempDir {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        write(
            root,
            "Cargo.toml",
            r#"[workspace]
members = ["app", "util", "core"]

[workspace.package]
version = "0.2.0"
"#,
        );
        write(
            root,
            "app/Cargo.toml",
            r#"[package]
name = "app"
version.workspace = true

[dependencies]
util = { path = "../util", version = "0.2.0" }

[dev-dependencies]
core = { path = "../core" }
"#,
        );
        write(
            root,
            "util/Cargo.toml",
            r#"[package]
name = "util"
version.workspace = true

[dependencies]
core = { path = "../core", version = "0.2" }
"#,
        );
        write(
            root,
            "core/Cargo.toml",
            "[package]\nname = \"core\"\nversion.workspace = true\n",
        );
        temp_dir
    }

    #[tokio::test]
    async fn test_publishes_workspace_in_dependency_order() {
        let temp_dir = workspace();
        let registry = FakeRegistry::default();

        let report = WorkspacePublisher::new(&registry, &registry)
            .publish(temp_dir.path(), &fast_options(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(registry.publish_calls(), vec!["core", "util", "app"]);
        assert_eq!(report.count(PackageState::Confirmed), 3);
        let requests = registry.requests();
        assert_eq!(requests[0].manifest_dir, temp_dir.path().join("core"));
    }

    #[tokio::test]
    async fn test_rerun_skips_published_packages() {
        let temp_dir = workspace();
        let registry = FakeRegistry {
            preexisting: ["core@0.2.0".to_string()].into(),
            ..Default::default()
        };

        let report = WorkspacePublisher::new(&registry, &registry)
            .publish(temp_dir.path(), &fast_options(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(registry.publish_calls(), vec!["util", "app"]);
        assert_eq!(report.get("core").unwrap().state, PackageState::Skipped);
    }

    #[tokio::test]
    async fn test_plan_only() {
        let temp_dir = workspace();
        let registry = FakeRegistry {
            preexisting: ["util@0.2.0".to_string()].into(),
            ..Default::default()
        };

        let check = WorkspacePublisher::new(&registry, &registry)
            .plan(temp_dir.path())
            .await
            .unwrap();

        assert_eq!(check.plan.names(), ["core", "util", "app"]);
        assert_eq!(check.pending(), vec!["core", "app"]);
        assert!(registry.publish_calls().is_empty());
        assert_eq!(registry.oracle_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_dry_run_checks_but_never_publishes() {
        let temp_dir = workspace();
        let registry = FakeRegistry::default();
        let options = RunOptions {
            dry_run: true,
            ..fast_options()
        };

        let report = WorkspacePublisher::new(&registry, &registry)
            .publish(temp_dir.path(), &options, &CancellationToken::new())
            .await
            .unwrap();

        assert!(registry.publish_calls().is_empty());
        assert_eq!(registry.oracle_calls().len(), 3);
        assert_eq!(report.names_in(PackageState::DryRun), vec!["core", "util", "app"]);
    }

    #[tokio::test]
    async fn test_empty_root_is_a_discovery_error() {
        let temp_dir = TempDir::new().unwrap();
        let registry = FakeRegistry::default();

        let error = WorkspacePublisher::new(&registry, &registry)
            .publish(temp_dir.path(), &fast_options(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(error.phase(), Phase::Discovery);
        assert!(error.is_before_publish());
    }

    #[tokio::test]
    async fn test_malformed_manifest_reports_parse_cause() {
        let temp_dir = workspace();
        write(temp_dir.path(), "core/Cargo.toml", "[package\nname = \"core\"\n");
        let registry = FakeRegistry::default();

        let error = WorkspacePublisher::new(&registry, &registry)
            .publish(temp_dir.path(), &fast_options(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(error.phase(), Phase::Discovery);
        let report = error.report();
        assert!(report.contains("core/Cargo.toml"));
        assert!(report.contains("TOML parse error"));
    }

    #[tokio::test]
    async fn test_version_mismatch_is_a_consistency_error() {
        let temp_dir = workspace();
        write(
            temp_dir.path(),
            "util/Cargo.toml",
            r#"[package]
name = "util"
version.workspace = true

[dependencies]
core = { path = "../core", version = "0.1" }
"#,
        );
        let registry = FakeRegistry::default();

        let error = WorkspacePublisher::new(&registry, &registry)
            .publish(temp_dir.path(), &fast_options(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(error.phase(), Phase::Consistency);
        assert!(registry.publish_calls().is_empty());
    }

    #[tokio::test]
    async fn test_cycle_is_a_sort_error() {
        let temp_dir = workspace();
        write(
            temp_dir.path(),
            "core/Cargo.toml",
            r#"[package]
name = "core"
version.workspace = true

[build-dependencies]
app = { path = "../app", version = "0.2.0" }
"#,
        );
        let registry = FakeRegistry::default();

        let error = WorkspacePublisher::new(&registry, &registry)
            .publish(temp_dir.path(), &fast_options(), &CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(error.phase(), Phase::Sort);
        match error {
            RunError::Cycle(cycle) => assert_eq!(cycle.participants, vec!["app", "util", "core"]),
            other => panic!("unexpected error: {}", other),
        }
        assert!(registry.publish_calls().is_empty());
    }
}

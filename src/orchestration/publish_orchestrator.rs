//! Publish Orchestrator - Drives the per-package publish loop
//!
//! Packages are handled strictly one after another in plan order:
//!
//! 1. already published → `Skipped`
//! 2. dry-run → `DryRun` (the command is logged, nothing runs)
//! 3. otherwise `Publishing` → `Published`, then, when waiting,
//!    `Confirmed` once the registry shows the version
//!
//! A failed publish or an unconfirmed version stops the run. Nothing is
//! rolled back. Cancellation is honoured between packages and while
//! waiting for confirmation, never during a publish invocation.

use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use semver::Version;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::core::config::RunOptions;
use crate::core::error::{PublishError, RunError, TimeoutError};
use crate::core::retry::{ConfirmationPoller, PollOutcome};
use crate::core::state_machine::{PackageState, PackageStateMachine, StateTransition};
use crate::core::traits::{PackagePublisher, PublishRequest, VersionOracle};
use crate::validation::dependency_sorter::PublishPlan;
use crate::workspace::package::{Package, PackageSet};

/// Outcome for one package
#[derive(Debug, Clone, Serialize)]
pub struct PackageReport {
    pub name: String,
    pub version: Version,
    pub state: PackageState,
    pub transitions: Vec<StateTransition>,
}

impl PackageReport {
    fn from_machine(package: &Package, machine: PackageStateMachine) -> Self {
        Self {
            name: package.name().to_string(),
            version: package.version().clone(),
            state: machine.state(),
            transitions: machine.into_transitions(),
        }
    }
}

/// Report of one publish run
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub dry_run: bool,
    /// Packages in plan order; packages never reached are absent
    pub packages: Vec<PackageReport>,
}

impl RunReport {
    fn new(dry_run: bool) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            dry_run,
            packages: Vec::new(),
        }
    }

    /// Number of packages that ended in `state`
    pub fn count(&self, state: PackageState) -> usize {
        self.packages.iter().filter(|p| p.state == state).count()
    }

    /// Names of packages that ended in `state`, in plan order
    pub fn names_in(&self, state: PackageState) -> Vec<&str> {
        self.packages
            .iter()
            .filter(|p| p.state == state)
            .map(|p| p.name.as_str())
            .collect()
    }

    pub fn get(&self, name: &str) -> Option<&PackageReport> {
        self.packages.iter().find(|p| p.name == name)
    }

    /// One-line summary
    pub fn summary(&self) -> String {
        format!(
            "confirmed: {}, published: {}, skipped: {}, dry-run: {}, failed: {}",
            self.count(PackageState::Confirmed),
            self.count(PackageState::Published),
            self.count(PackageState::Skipped),
            self.count(PackageState::DryRun),
            self.packages.iter().filter(|p| p.state.is_failure()).count()
        )
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Sequential publish loop over a plan
pub struct PublishOrchestrator<'a> {
    publisher: &'a dyn PackagePublisher,
    oracle: &'a dyn VersionOracle,
    options: &'a RunOptions,
}

impl<'a> PublishOrchestrator<'a> {
    pub fn new(
        publisher: &'a dyn PackagePublisher,
        oracle: &'a dyn VersionOracle,
        options: &'a RunOptions,
    ) -> Self {
        Self {
            publisher,
            oracle,
            options,
        }
    }

    /// Publish every package of `plan`
    ///
    /// `packages` must carry resolved published states (see the consistency
    /// checker); the oracle is only used for confirmation here.
    ///
    /// # Errors
    ///
    /// - `RunError::Publish` - the publish step failed
    /// - `RunError::Timeout` - the registry did not confirm in time
    /// - `RunError::Cancelled` - cancelled before the next package
    /// - `RunError::UnknownPackage` - the plan names a package not in `packages`
    pub async fn run(
        &self,
        plan: &PublishPlan,
        packages: &PackageSet,
        cancel: &CancellationToken,
    ) -> Result<RunReport, RunError> {
        let mut report = RunReport::new(self.options.dry_run);
        info!(
            "run {}: {} package(s){}",
            report.run_id,
            plan.len(),
            if self.options.dry_run { " (dry-run)" } else { "" }
        );

        for (index, name) in plan.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(self.abort(
                    report,
                    RunError::Cancelled {
                        remaining: plan.names()[index..].to_vec(),
                    },
                ));
            }

            let Some(package) = packages.get(name) else {
                return Err(self.abort(
                    report,
                    RunError::UnknownPackage {
                        package: name.clone(),
                    },
                ));
            };

            let mut machine = PackageStateMachine::new(name.as_str());
            let result = self.publish_one(package, &mut machine, cancel).await;
            report.packages.push(PackageReport::from_machine(package, machine));

            match result {
                Ok(()) => {}
                Err(RunError::Cancelled { .. }) => {
                    let error = RunError::Cancelled {
                        remaining: plan.names()[index + 1..].to_vec(),
                    };
                    return Err(self.abort(report, error));
                }
                Err(error) => return Err(self.abort(report, error)),
            }
        }

        report.finished_at = Some(Utc::now());
        info!("✅ run {} finished: {}", report.run_id, report.summary());
        Ok(report)
    }

    async fn publish_one(
        &self,
        package: &Package,
        machine: &mut PackageStateMachine,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        if package.is_published() {
            machine.transition(PackageState::Skipped, Some("already published".to_string()))?;
            info!("⏭️  {} is already published, skipping", package.id());
            return Ok(());
        }

        let request = PublishRequest {
            package: package.name().to_string(),
            version: package.version().clone(),
            manifest_dir: package.manifest_dir().to_path_buf(),
            registry: self.options.registry.clone(),
            extra_args: self.options.extra_args.clone(),
        };

        if self.options.dry_run {
            let command = request.command_line();
            info!(
                "[dry-run] would publish {}: `{}` in {}",
                package.id(),
                command,
                request.manifest_dir.display()
            );
            machine.transition(PackageState::DryRun, Some(command))?;
            return Ok(());
        }

        machine.transition(PackageState::Publishing, None)?;
        info!("📦 publishing {}", package.id());

        match self.publisher.publish(&request).await {
            Ok(output) => {
                if !output.stderr.trim().is_empty() {
                    debug!("{} stderr:\n{}", package.name(), output.stderr.trim_end());
                }
                machine.transition(PackageState::Published, None)?;
            }
            Err(e) => {
                let cause = format!("{:#}", e);
                machine.transition(PackageState::Failed, Some(cause.clone()))?;
                return Err(PublishError {
                    package: package.name().to_string(),
                    version: package.version().clone(),
                    cause,
                }
                .into());
            }
        }

        if !self.options.wait {
            info!(
                "{} published; not waiting for the registry to show it",
                package.id()
            );
            return Ok(());
        }

        self.confirm(package, machine, cancel).await
    }

    async fn confirm(
        &self,
        package: &Package,
        machine: &mut PackageStateMachine,
        cancel: &CancellationToken,
    ) -> Result<(), RunError> {
        info!(
            "⏳ waiting for {} to appear in {}",
            package.id(),
            self.oracle.name()
        );

        let poller = ConfirmationPoller::new(self.options.poll.clone());
        let outcome = poller
            .poll(
                || self.oracle.is_version_visible(package.name(), package.version()),
                cancel,
            )
            .await;

        let note = format!(
            "{} attempt(s), {:.1}s",
            outcome.attempts(),
            outcome.elapsed().as_secs_f64()
        );
        match outcome {
            PollOutcome::Confirmed { .. } => {
                machine.transition(PackageState::Confirmed, Some(note))?;
                info!("✅ {} confirmed", package.id());
                Ok(())
            }
            PollOutcome::TimedOut { attempts, elapsed } => {
                machine.transition(PackageState::TimedOut, Some(note))?;
                Err(TimeoutError {
                    package: package.name().to_string(),
                    version: package.version().clone(),
                    attempts,
                    waited: elapsed,
                }
                .into())
            }
            PollOutcome::Cancelled { .. } => Err(RunError::Cancelled {
                remaining: Vec::new(),
            }),
        }
    }

    /// Log what the run got through before `error`, then hand it back
    fn abort(&self, mut report: RunReport, error: RunError) -> RunError {
        report.finished_at = Some(Utc::now());
        warn!("run {} stopped: {}", report.run_id, report.summary());
        for package in &report.packages {
            warn!("  {}@{}: {:?}", package.name, package.version, package.state);
        }
        error
    }
}

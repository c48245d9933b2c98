//! Consistency Checker - Validates a discovered package set as a whole
//!
//! Every rule is evaluated against the full set and all violations are
//! collected before anything is reported, so a single run shows every
//! problem at once. The version oracle is queried at most once per package;
//! the answer is cached onto a fresh [`Package`] snapshot that the
//! orchestrator reuses.

use log::{debug, info, warn};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use super::version_validator::VersionValidator;
use crate::core::error::{ConsistencyError, Violation};
use crate::core::traits::VersionOracle;
use crate::workspace::package::{Package, PackageSet, PublishedState};

/// Non-fatal finding
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConsistencyWarning {
    /// Snapshot said "needs publishing" but the registry already has it
    StaleDiscovery { package: String, version: String },
    /// Non-dev git dependency without a version; the registry will reject it
    GitDependency {
        package: String,
        dependency: String,
        git: String,
    },
}

impl fmt::Display for ConsistencyWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StaleDiscovery { package, version } => write!(
                f,
                "{}@{} は既にレジストリに存在します（スキップされます）",
                package, version
            ),
            Self::GitDependency {
                package,
                dependency,
                git,
            } => write!(
                f,
                "{} の依存関係 {} は git ({}) のみを指定しています",
                package, dependency, git
            ),
        }
    }
}

/// Result of a successful check
#[derive(Debug, Clone)]
pub struct ConsistencyReport {
    /// Fresh snapshots with `published` resolved, in discovery order
    pub packages: PackageSet,
    pub warnings: Vec<ConsistencyWarning>,
}

impl ConsistencyReport {
    /// Count of packages that still need publishing
    pub fn pending_count(&self) -> usize {
        self.packages.iter().filter(|p| !p.is_published()).count()
    }
}

/// Consistency checker
pub struct ConsistencyChecker<'a> {
    oracle: &'a dyn VersionOracle,
    validator: VersionValidator,
}

impl<'a> ConsistencyChecker<'a> {
    pub fn new(oracle: &'a dyn VersionOracle) -> Self {
        Self {
            oracle,
            validator: VersionValidator::new(),
        }
    }

    /// Check the package set
    ///
    /// # Errors
    ///
    /// Returns `ConsistencyError` carrying every violation found.
    pub async fn check(&self, packages: PackageSet) -> Result<ConsistencyReport, ConsistencyError> {
        let mut violations = Vec::new();
        let mut warnings = Vec::new();

        self.check_names(&packages, &mut violations);
        for package in &packages {
            self.check_dependencies(package, &packages, &mut violations, &mut warnings);
        }

        let packages = self
            .resolve_published(packages, &mut violations, &mut warnings)
            .await;

        for warning in &warnings {
            warn!("⚠️  {}", warning);
        }

        if !violations.is_empty() {
            return Err(ConsistencyError { violations });
        }

        let report = ConsistencyReport { packages, warnings };
        info!(
            "consistency check passed: {} package(s), {} to publish",
            report.packages.len(),
            report.pending_count()
        );
        Ok(report)
    }

    fn check_names(&self, packages: &PackageSet, violations: &mut Vec<Violation>) {
        let mut seen: Vec<(&str, Vec<&Package>)> = Vec::new();
        for package in packages {
            match seen.iter_mut().find(|(name, _)| *name == package.name()) {
                Some((_, group)) => group.push(package),
                None => seen.push((package.name(), vec![package])),
            }
        }

        for (name, group) in seen.into_iter().filter(|(_, g)| g.len() > 1) {
            violations.push(Violation::DuplicateName {
                name: name.to_string(),
                count: group.len(),
            });

            let mut versions: Vec<&semver::Version> = Vec::new();
            for package in group.iter().filter(|p| !p.is_published()) {
                if versions.contains(&package.version()) {
                    let target = Violation::DuplicatePublishTarget {
                        name: name.to_string(),
                        version: package.version().to_string(),
                    };
                    if !violations.contains(&target) {
                        violations.push(target);
                    }
                } else {
                    versions.push(package.version());
                }
            }
        }
    }

    fn check_dependencies(
        &self,
        package: &Package,
        packages: &PackageSet,
        violations: &mut Vec<Violation>,
        warnings: &mut Vec<ConsistencyWarning>,
    ) {
        for dependency in package.dependencies() {
            if dependency.name == package.name() {
                if dependency.affects_order() {
                    let violation = Violation::SelfDependency {
                        package: package.name().to_string(),
                    };
                    if !violations.contains(&violation) {
                        violations.push(violation);
                    }
                }
                continue;
            }

            if !dependency.affects_order() {
                continue;
            }

            let Some(target) = packages.get(&dependency.name) else {
                if let Some(path) = &dependency.path {
                    violations.push(Violation::UnresolvedPath {
                        package: package.name().to_string(),
                        dependency: dependency.name.clone(),
                        path: path.clone(),
                    });
                } else if let Some(git) = &dependency.git
                    && dependency.req.is_none()
                {
                    warnings.push(ConsistencyWarning::GitDependency {
                        package: package.name().to_string(),
                        dependency: dependency.name.clone(),
                        git: git.clone(),
                    });
                }
                continue;
            };

            match &dependency.req {
                Some(req) if !self.validator.satisfies(target.version(), req) => {
                    violations.push(Violation::VersionMismatch {
                        package: package.name().to_string(),
                        dependency: dependency.name.clone(),
                        requirement: req.to_string(),
                        actual: target.version().to_string(),
                    });
                }
                Some(_) => {}
                None => violations.push(Violation::MissingVersionRequirement {
                    package: package.name().to_string(),
                    dependency: dependency.name.clone(),
                }),
            }
        }
    }

    /// Resolve `published` for every package not already known to be published
    async fn resolve_published(
        &self,
        packages: PackageSet,
        violations: &mut Vec<Violation>,
        warnings: &mut Vec<ConsistencyWarning>,
    ) -> PackageSet {
        let mut answers: HashMap<(String, semver::Version), bool> = HashMap::new();
        let mut resolved = Vec::with_capacity(packages.len());

        for package in packages.into_vec() {
            if package.is_published() {
                resolved.push(package);
                continue;
            }

            let key = (package.name().to_string(), package.version().clone());
            let visible = match answers.get(&key) {
                Some(visible) => Ok(*visible),
                None => {
                    debug!("asking {} about {}", self.oracle.name(), package.id());
                    self.oracle
                        .is_version_visible(package.name(), package.version())
                        .await
                }
            };

            match visible {
                Ok(visible) => {
                    answers.insert(key, visible);
                    if visible {
                        if package.published() == PublishedState::Unpublished {
                            warnings.push(ConsistencyWarning::StaleDiscovery {
                                package: package.name().to_string(),
                                version: package.version().to_string(),
                            });
                        } else {
                            info!("{} is already published", package.id());
                        }
                        resolved.push(package.with_published(PublishedState::Published));
                    } else {
                        resolved.push(package.with_published(PublishedState::Unpublished));
                    }
                }
                Err(e) => {
                    violations.push(Violation::OracleFailure {
                        package: package.name().to_string(),
                        version: package.version().to_string(),
                        message: format!("{:#}", e),
                    });
                    resolved.push(package);
                }
            }
        }

        PackageSet::new(resolved)
    }
}

/// Check a package set with the given oracle
///
/// Shorthand for `ConsistencyChecker::new(oracle).check(packages)`.
pub async fn check(
    packages: PackageSet,
    oracle: &dyn VersionOracle,
) -> Result<ConsistencyReport, ConsistencyError> {
    ConsistencyChecker::new(oracle).check(packages).await
}

//! Dependency Sorter - Computes the publish order
//!
//! Kahn's algorithm over in-set, non-dev dependency edges. Packages that are
//! ready at the same time are emitted lowest discovery index first, so the
//! same input always yields the same order.

use log::debug;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;

use crate::core::error::CycleError;
use crate::workspace::package::PackageSet;

/// Ordered package names; every package comes after its in-set dependencies
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PublishPlan {
    order: Vec<String>,
}

impl PublishPlan {
    pub fn new(order: Vec<String>) -> Self {
        Self { order }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, String> {
        self.order.iter()
    }

    pub fn names(&self) -> &[String] {
        &self.order
    }

    /// Position of `name` in the plan
    pub fn position(&self, name: &str) -> Option<usize> {
        self.order.iter().position(|n| n == name)
    }
}

impl fmt::Display for PublishPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.order.join(" → "))
    }
}

impl<'a> IntoIterator for &'a PublishPlan {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.order.iter()
    }
}

/// Sort packages into publish order
///
/// # Errors
///
/// Returns `CycleError` naming every package that could not be ordered.
///
/// # Examples
///
/// ```
/// use publish_crates::validation::sort;
/// use publish_crates::workspace::{Dependency, DependencyKind, Package, PackageSet};
/// use semver::Version;
///
/// let packages = PackageSet::new(vec![
///     Package::new("app", Version::new(1, 0, 0), "/ws/app")
///         .with_dependencies(vec![Dependency::new("core", DependencyKind::Normal)]),
///     Package::new("core", Version::new(1, 0, 0), "/ws/core"),
/// ]);
///
/// let plan = sort(&packages).unwrap();
/// assert_eq!(plan.names(), ["core", "app"]);
/// ```
pub fn sort(packages: &PackageSet) -> Result<PublishPlan, CycleError> {
    let count = packages.len();
    // dependents[i]: packages waiting on i
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); count];
    let mut in_degree = vec![0usize; count];

    for (index, package) in packages.iter().enumerate() {
        let mut seen = BTreeSet::new();
        for dependency in package.dependencies().iter().filter(|d| d.affects_order()) {
            let Some(target) = packages.index_of(&dependency.name) else {
                continue;
            };
            if seen.insert(target) {
                dependents[target].push(index);
                in_degree[index] += 1;
            }
        }
    }

    let mut ready: BTreeSet<usize> = (0..count).filter(|&i| in_degree[i] == 0).collect();
    let mut order = Vec::with_capacity(count);

    while let Some(index) = ready.pop_first() {
        order.push(index);
        for &dependent in &dependents[index] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }

    let names: Vec<&str> = packages.names();
    if order.len() < count {
        let participants = (0..count)
            .filter(|&i| in_degree[i] > 0)
            .map(|i| names[i].to_string())
            .collect();
        return Err(CycleError { participants });
    }

    let plan = PublishPlan::new(order.into_iter().map(|i| names[i].to_string()).collect());
    debug!("publish order: {}", plan);
    Ok(plan)
}

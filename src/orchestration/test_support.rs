//! In-memory registry used by orchestration tests

use async_trait::async_trait;
use semver::Version;
use std::collections::HashSet;
use std::sync::Mutex;
use std::time::Duration;

use crate::core::config::RunOptions;
use crate::core::retry::PollPolicy;
use crate::core::traits::{PackagePublisher, PublishOutput, PublishRequest, VersionOracle};
use crate::workspace::package::{Dependency, DependencyKind, Package, PackageSet};

/// Publisher and oracle sharing one fake registry
///
/// A published version becomes visible immediately unless it is listed in
/// `never_visible`. Versions in `preexisting` are visible from the start.
#[derive(Default)]
pub struct FakeRegistry {
    pub preexisting: HashSet<String>,
    pub never_visible: HashSet<String>,
    /// Package names whose publish fails
    pub failing: HashSet<String>,
    pub(crate) published: Mutex<Vec<String>>,
    pub(crate) requests: Mutex<Vec<PublishRequest>>,
    pub(crate) oracle_calls: Mutex<Vec<String>>,
}

impl FakeRegistry {
    /// Package names passed to the publisher, in call order
    pub fn publish_calls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.package.clone())
            .collect()
    }

    pub fn requests(&self) -> Vec<PublishRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn oracle_calls(&self) -> Vec<String> {
        self.oracle_calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl PackagePublisher for FakeRegistry {
    async fn publish(&self, request: &PublishRequest) -> anyhow::Result<PublishOutput> {
        self.requests.lock().unwrap().push(request.clone());
        if self.failing.contains(&request.package) {
            anyhow::bail!("upload rejected for {}", request.package);
        }
        self.published
            .lock()
            .unwrap()
            .push(format!("{}@{}", request.package, request.version));
        Ok(PublishOutput::default())
    }
}

#[async_trait]
impl VersionOracle for FakeRegistry {
    fn name(&self) -> &str {
        "fake-registry"
    }

    async fn is_version_visible(&self, name: &str, version: &Version) -> anyhow::Result<bool> {
        let id = format!("{}@{}", name, version);
        self.oracle_calls.lock().unwrap().push(id.clone());
        if self.preexisting.contains(&id) {
            return Ok(true);
        }
        if self.never_visible.contains(&id) {
            return Ok(false);
        }
        Ok(self.published.lock().unwrap().contains(&id))
    }
}

/// Options with millisecond polling
pub fn fast_options() -> RunOptions {
    RunOptions {
        poll: PollPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_multiplier: 2.0,
            max_attempts: 3,
            max_wait: Duration::from_secs(5),
        },
        ..RunOptions::default()
    }
}

/// `a` depends on `b`, `b` depends on `c`; all at 1.0.0 and unpublished
pub fn chain() -> PackageSet {
    let package = |name: &str, deps: &[&str]| {
        Package::new(name, Version::new(1, 0, 0), format!("/ws/{}", name))
            .with_dependencies(
                deps.iter()
                    .map(|d| {
                        Dependency::new(*d, DependencyKind::Normal)
                            .with_req(semver::VersionReq::parse("1.0.0").unwrap())
                    })
                    .collect(),
            )
            .with_published(crate::workspace::package::PublishedState::Unpublished)
    };

    PackageSet::new(vec![
        package("a", &["b"]),
        package("b", &["c"]),
        package("c", &[]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn request(name: &str) -> PublishRequest {
        PublishRequest {
            package: name.to_string(),
            version: Version::new(1, 0, 0),
            manifest_dir: PathBuf::from(format!("/ws/{}", name)),
            registry: None,
            extra_args: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_never_visible_hides_published_version() {
        let registry = FakeRegistry {
            never_visible: ["b@1.0.0".to_string()].into(),
            ..Default::default()
        };

        registry.publish(&request("a")).await.unwrap();
        registry.publish(&request("b")).await.unwrap();

        let version = Version::new(1, 0, 0);
        assert!(registry.is_version_visible("a", &version).await.unwrap());
        assert!(!registry.is_version_visible("b", &version).await.unwrap());
        assert_eq!(registry.publish_calls(), vec!["a", "b"]);
        assert_eq!(registry.oracle_calls(), vec!["a@1.0.0", "b@1.0.0"]);
    }

    #[tokio::test]
    async fn test_failing_package_is_recorded_but_not_published() {
        let registry = FakeRegistry {
            failing: ["a".to_string()].into(),
            ..Default::default()
        };

        let error = registry.publish(&request("a")).await.unwrap_err();

        assert_eq!(error.to_string(), "upload rejected for a");
        assert_eq!(registry.publish_calls(), vec!["a"]);
        assert!(
            !registry
                .is_version_visible("a", &Version::new(1, 0, 0))
                .await
                .unwrap()
        );
    }
}

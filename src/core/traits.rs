//! Core traits and types for workspace publishing
//!
//! The orchestration logic only talks to the outside world through these
//! two seams: a [`VersionOracle`] answering whether a version is visible in
//! the registry, and a [`PackagePublisher`] running the actual publish step.

use async_trait::async_trait;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Version Oracle
// ============================================================================

/// Answers whether an exact package version is visible in a registry
///
/// Implementations perform a single query and never retry; retrying is the
/// caller's concern.
#[async_trait]
pub trait VersionOracle: Send + Sync {
    /// Oracle name (e.g., "crates-io-api", "sparse-index")
    fn name(&self) -> &str;

    /// Check whether `name@version` exists in the registry
    ///
    /// # Arguments
    ///
    /// * `name` - Package name
    /// * `version` - Exact version, compared structurally
    ///
    /// # Examples
    ///
    /// ```no_run
    /// # use publish_crates::core::VersionOracle;
    /// # use async_trait::async_trait;
    /// # use semver::Version;
    /// struct AlwaysVisible;
    ///
    /// #[async_trait]
    /// impl VersionOracle for AlwaysVisible {
    ///     fn name(&self) -> &str { "always" }
    ///
    ///     async fn is_version_visible(&self, _name: &str, _version: &Version) -> anyhow::Result<bool> {
    ///         Ok(true)
    ///     }
    /// }
    /// ```
    async fn is_version_visible(&self, name: &str, version: &Version) -> anyhow::Result<bool>;
}

// ============================================================================
// Publishing
// ============================================================================

/// A single publish invocation for one package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishRequest {
    pub package: String,
    pub version: Version,
    /// Directory containing the package manifest; the command runs here
    pub manifest_dir: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,
    #[serde(default)]
    pub extra_args: Vec<String>,
}

impl PublishRequest {
    /// Arguments passed to `cargo`
    ///
    /// Extra arguments come first and `--registry` last.
    pub fn cargo_args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(self.extra_args.len() + 3);
        args.push("publish".to_string());
        args.extend(self.extra_args.iter().cloned());
        if let Some(registry) = &self.registry {
            args.push("--registry".to_string());
            args.push(registry.clone());
        }
        args
    }

    /// Full command line for logging
    pub fn command_line(&self) -> String {
        let mut parts = vec!["cargo".to_string()];
        parts.extend(self.cargo_args());
        parts.join(" ")
    }
}

/// Captured output of a successful publish invocation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishOutput {
    pub stdout: String,
    pub stderr: String,
}

/// Runs the external publish step for one package
///
/// A failure is returned as an error and is never retried by the caller.
#[async_trait]
pub trait PackagePublisher: Send + Sync {
    async fn publish(&self, request: &PublishRequest) -> anyhow::Result<PublishOutput>;
}

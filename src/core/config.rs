//! Configuration structures and types for publish-crates
//!
//! [`PublishConfig`] is one loosely populated configuration layer (file,
//! environment or command line). Layers are merged by
//! [`ConfigLoader`](super::config_loader::ConfigLoader) and resolved once into
//! [`Settings`], which is what the rest of the crate consumes.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use super::retry::PollPolicy;

/// Default crates.io web API
pub const DEFAULT_API_URL: &str = "https://crates.io";

/// Default crates.io sparse index
pub const DEFAULT_INDEX_URL: &str = "https://index.crates.io";

/// One configuration layer
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PublishConfig {
    /// Target registry name (default registry if unset)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registry: Option<String>,

    /// Extra arguments forwarded to `cargo publish`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,

    /// Only log what would be published
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dry_run: Option<bool>,

    /// Wait for each published version to become visible
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait: Option<bool>,

    /// Confirmation polling
    #[serde(skip_serializing_if = "Option::is_none")]
    pub poll: Option<PollConfig>,

    /// Version oracle selection
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oracle: Option<OracleConfig>,
}

/// Confirmation polling configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct PollConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_delay_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_multiplier: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_attempts: Option<u32>,

    /// Total time to wait for one package
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
}

/// Version oracle configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct OracleConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<OracleKind>,

    /// Base URL of a crates.io compatible web API
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<String>,

    /// Base URL of a sparse registry index
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_url: Option<String>,
}

/// How published versions are looked up
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OracleKind {
    /// crates.io web API (`/api/v1/crates/{name}`)
    #[default]
    Api,
    /// Sparse index (`{index}/{prefix}/{name}`)
    Sparse,
}

impl OracleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Api => "api",
            Self::Sparse => "sparse",
        }
    }
}

impl fmt::Display for OracleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OracleKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "api" => Ok(Self::Api),
            "sparse" => Ok(Self::Sparse),
            other => Err(format!("unknown oracle kind: {}", other)),
        }
    }
}

// ============================================================================
// Resolved settings
// ============================================================================

/// Typed options consumed by the publish orchestrator
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    pub dry_run: bool,
    pub wait: bool,
    pub registry: Option<String>,
    pub extra_args: Vec<String>,
    pub poll: PollPolicy,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            wait: true,
            registry: None,
            extra_args: Vec::new(),
            poll: PollPolicy::default(),
        }
    }
}

/// Resolved oracle endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OracleSettings {
    pub kind: OracleKind,
    pub api_url: String,
    pub index_url: String,
}

impl Default for OracleSettings {
    fn default() -> Self {
        Self {
            kind: OracleKind::Api,
            api_url: DEFAULT_API_URL.to_string(),
            index_url: DEFAULT_INDEX_URL.to_string(),
        }
    }
}

/// Fully resolved configuration of one run
#[derive(Debug)]
pub struct Settings {
    /// Root directory scanned for packages
    pub root: PathBuf,
    pub run: RunOptions,
    pub oracle: OracleSettings,
    /// Passed to the publish child only, never logged
    pub registry_token: Option<SecretString>,
}

impl PublishConfig {
    /// Resolve this layer into settings, filling unset values with defaults
    ///
    /// Values are not validated here; use `ConfigLoader::resolve` for the
    /// checked path.
    pub fn into_settings(self, root: PathBuf, registry_token: Option<SecretString>) -> Settings {
        let default_poll = PollPolicy::default();
        let poll_config = self.poll.unwrap_or_default();
        let poll = PollPolicy {
            initial_delay: poll_config
                .interval_secs
                .map(Duration::from_secs)
                .unwrap_or(default_poll.initial_delay),
            max_delay: poll_config
                .max_delay_secs
                .map(Duration::from_secs)
                .unwrap_or(default_poll.max_delay),
            backoff_multiplier: poll_config
                .backoff_multiplier
                .unwrap_or(default_poll.backoff_multiplier),
            max_attempts: poll_config
                .max_attempts
                .unwrap_or_else(|| derived_attempts(&poll_config, &default_poll)),
            max_wait: poll_config
                .timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(default_poll.max_wait),
        };

        let oracle_config = self.oracle.unwrap_or_default();
        let oracle = OracleSettings {
            kind: oracle_config.kind.unwrap_or_default(),
            api_url: oracle_config
                .api_url
                .unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            index_url: oracle_config
                .index_url
                .unwrap_or_else(|| DEFAULT_INDEX_URL.to_string()),
        };

        Settings {
            root,
            run: RunOptions {
                dry_run: self.dry_run.unwrap_or(false),
                wait: self.wait.unwrap_or(true),
                registry: self.registry,
                extra_args: self.args.unwrap_or_default(),
                poll,
            },
            oracle,
            registry_token,
        }
    }
}

/// Attempt budget when only interval and timeout are configured
///
/// One probe at the start plus one per interval until the timeout.
fn derived_attempts(config: &PollConfig, defaults: &PollPolicy) -> u32 {
    let interval = config
        .interval_secs
        .unwrap_or(defaults.initial_delay.as_secs())
        .max(1);
    let timeout = config
        .timeout_secs
        .unwrap_or(defaults.max_wait.as_secs());
    u32::try_from(timeout / interval)
        .unwrap_or(u32::MAX - 1)
        .saturating_add(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = PublishConfig::default().into_settings(PathBuf::from("."), None);

        assert!(!settings.run.dry_run);
        assert!(settings.run.wait);
        assert!(settings.run.registry.is_none());
        assert!(settings.run.extra_args.is_empty());
        assert_eq!(settings.run.poll, PollPolicy::default());
        assert_eq!(settings.oracle, OracleSettings::default());
    }

    #[test]
    fn test_attempts_derived_from_interval_and_timeout() {
        let config = PublishConfig {
            poll: Some(PollConfig {
                interval_secs: Some(10),
                timeout_secs: Some(300),
                ..Default::default()
            }),
            ..Default::default()
        };

        let settings = config.into_settings(PathBuf::from("."), None);

        assert_eq!(settings.run.poll.initial_delay, Duration::from_secs(10));
        assert_eq!(settings.run.poll.max_wait, Duration::from_secs(300));
        assert_eq!(settings.run.poll.max_attempts, 31);
    }

    #[test]
    fn test_yaml_layer() {
        let yaml = r#"
registry: internal
args: ["--allow-dirty"]
dryRun: true
poll:
  intervalSecs: 2
  backoffMultiplier: 1.5
oracle:
  kind: sparse
  indexUrl: https://index.example.com
"#;

        let config: PublishConfig = serde_yaml::from_str(yaml).unwrap();

        assert_eq!(config.registry.as_deref(), Some("internal"));
        assert_eq!(config.dry_run, Some(true));
        assert_eq!(config.wait, None);
        let oracle = config.oracle.as_ref().unwrap();
        assert_eq!(oracle.kind, Some(OracleKind::Sparse));
        assert_eq!(
            config.poll.as_ref().unwrap().backoff_multiplier,
            Some(1.5)
        );
    }

    #[test]
    fn test_yaml_rejects_unknown_fields() {
        let result: Result<PublishConfig, _> = serde_yaml::from_str("registryToken: secret\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_oracle_kind_from_str() {
        assert_eq!("API".parse::<OracleKind>(), Ok(OracleKind::Api));
        assert_eq!(" sparse ".parse::<OracleKind>(), Ok(OracleKind::Sparse));
        assert!("git".parse::<OracleKind>().is_err());
    }
}

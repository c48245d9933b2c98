//! Configuration loader for publish-crates
//!
//! Loosely typed inputs (string flags from the command line or the
//! environment, and an optional YAML file) are parsed here, once, into
//! typed configuration. Nothing past this module compares flag strings.

use super::config::*;
use super::error::ConfigError;
use secrecy::SecretString;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;

/// Configuration file name, looked up in the project root
pub const CONFIG_FILENAME: &str = ".publish-crates.yaml";

/// Prefix of all environment variables read by the loader
pub const ENV_PREFIX: &str = "PUBLISH_CRATES_";

/// Raw string inputs, as received from the command line or environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFlags {
    pub args: Option<String>,
    pub registry: Option<String>,
    pub dry_run: Option<String>,
    pub wait: Option<String>,
    pub wait_timeout: Option<String>,
    pub poll_interval: Option<String>,
    pub oracle: Option<String>,
    pub registry_api_url: Option<String>,
    pub index_url: Option<String>,
}

impl RawFlags {
    /// Read `PUBLISH_CRATES_*` variables from an environment map
    pub fn from_env(env: &HashMap<String, String>) -> Self {
        let get = |key: &str| env.get(&format!("{}{}", ENV_PREFIX, key)).cloned();

        Self {
            args: get("ARGS"),
            registry: get("REGISTRY"),
            dry_run: get("DRY_RUN"),
            wait: get("WAIT"),
            wait_timeout: get("WAIT_TIMEOUT"),
            poll_interval: get("POLL_INTERVAL"),
            oracle: get("ORACLE"),
            registry_api_url: get("REGISTRY_API_URL"),
            index_url: get("INDEX_URL"),
        }
    }
}

/// Configuration load options
#[derive(Debug, Clone)]
pub struct ConfigLoadOptions {
    /// Project path to load config from
    pub project_path: PathBuf,

    /// Command line flags (highest priority)
    pub cli_flags: Option<RawFlags>,

    /// Environment variables
    pub env: HashMap<String, String>,
}

/// Configuration validation result
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationResult {
    /// Is configuration valid?
    pub valid: bool,

    /// Validation errors
    pub errors: Vec<ConfigValidationError>,

    /// Validation warnings
    pub warnings: Vec<ConfigValidationWarning>,
}

/// Configuration validation error
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationError {
    /// Field path (e.g., "poll.maxAttempts")
    pub field: String,

    /// Error message
    pub message: String,
}

/// Configuration validation warning
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigValidationWarning {
    /// Field path
    pub field: String,

    /// Warning message
    pub message: String,

    /// Suggestion
    pub suggestion: Option<String>,
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from multiple sources with priority
    ///
    /// Priority (high to low):
    /// 1. Command line flags
    /// 2. Environment variables (`PUBLISH_CRATES_*`)
    /// 3. Project config (`./.publish-crates.yaml`)
    /// 4. Default values
    pub async fn load(options: ConfigLoadOptions) -> Result<PublishConfig, ConfigError> {
        let mut configs: Vec<PublishConfig> = Vec::new();

        if let Some(project_config) = Self::load_project_config(&options.project_path).await? {
            configs.push(project_config);
        }

        if let Some(env_config) = Self::parse_flags(&RawFlags::from_env(&options.env))? {
            configs.push(env_config);
        }

        if let Some(cli_flags) = &options.cli_flags
            && let Some(cli_config) = Self::parse_flags(cli_flags)?
        {
            configs.push(cli_config);
        }

        Ok(Self::merge_configs(configs))
    }

    /// Load `.publish-crates.yaml` from the project root, if present
    async fn load_project_config(
        project_path: &Path,
    ) -> Result<Option<PublishConfig>, ConfigError> {
        let path = project_path.join(CONFIG_FILENAME);
        if !fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(None);
        }

        let content = fs::read_to_string(&path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            })?;

        let config: PublishConfig = serde_yaml::from_str(&content)
            .map_err(|source| ConfigError::Parse { path, source })?;

        Ok(Some(config))
    }

    /// Read the registry token from the environment
    pub fn load_env_token(env: &HashMap<String, String>) -> Option<SecretString> {
        env.get(&format!("{}REGISTRY_TOKEN", ENV_PREFIX))
            .filter(|token| !token.trim().is_empty())
            .map(|token| SecretString::new(token.trim().into()))
    }

    /// Parse string flags into a configuration layer
    ///
    /// Empty values are treated as unset. Returns `None` if no flag is set.
    pub fn parse_flags(flags: &RawFlags) -> Result<Option<PublishConfig>, ConfigError> {
        let mut config = PublishConfig::default();
        let mut has_changes = false;

        if let Some(args) = non_empty(&flags.args) {
            config.args = Some(Self::split_args(args));
            has_changes = true;
        }

        if let Some(registry) = non_empty(&flags.registry) {
            config.registry = Some(registry.to_string());
            has_changes = true;
        }

        if let Some(dry_run) = non_empty(&flags.dry_run) {
            config.dry_run = Some(Self::parse_bool_flag("dry-run", dry_run)?);
            has_changes = true;
        }

        if let Some(wait) = non_empty(&flags.wait) {
            config.wait = Some(Self::parse_bool_flag("wait", wait)?);
            has_changes = true;
        }

        let mut poll = PollConfig::default();
        if let Some(timeout) = non_empty(&flags.wait_timeout) {
            poll.timeout_secs = Some(Self::parse_secs_flag("wait-timeout", timeout)?);
        }
        if let Some(interval) = non_empty(&flags.poll_interval) {
            poll.interval_secs = Some(Self::parse_secs_flag("poll-interval", interval)?);
        }
        if poll != PollConfig::default() {
            config.poll = Some(poll);
            has_changes = true;
        }

        let mut oracle = OracleConfig::default();
        if let Some(kind) = non_empty(&flags.oracle) {
            oracle.kind = Some(kind.parse().map_err(|_| ConfigError::InvalidFlag {
                flag: "oracle".to_string(),
                value: kind.to_string(),
                expected: "api | sparse",
            })?);
        }
        if let Some(url) = non_empty(&flags.registry_api_url) {
            oracle.api_url = Some(url.to_string());
        }
        if let Some(url) = non_empty(&flags.index_url) {
            oracle.index_url = Some(url.to_string());
        }
        if oracle != OracleConfig::default() {
            config.oracle = Some(oracle);
            has_changes = true;
        }

        if has_changes {
            Ok(Some(config))
        } else {
            Ok(None)
        }
    }

    /// Split a freeform argument string on whitespace and newlines
    ///
    /// # Examples
    ///
    /// ```
    /// use publish_crates::core::ConfigLoader;
    ///
    /// let args = ConfigLoader::split_args(" --allow-dirty\n--no-verify  ");
    /// assert_eq!(args, vec!["--allow-dirty", "--no-verify"]);
    /// ```
    pub fn split_args(raw: &str) -> Vec<String> {
        raw.split_whitespace().map(String::from).collect()
    }

    /// Parse a `"true"` / `"false"` flag (case-insensitive)
    pub fn parse_bool_flag(flag: &str, value: &str) -> Result<bool, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "true" => Ok(true),
            "false" => Ok(false),
            _ => Err(ConfigError::InvalidFlag {
                flag: flag.to_string(),
                value: value.to_string(),
                expected: "true | false",
            }),
        }
    }

    fn parse_secs_flag(flag: &str, value: &str) -> Result<u64, ConfigError> {
        value
            .trim()
            .parse::<u64>()
            .map_err(|_| ConfigError::InvalidFlag {
                flag: flag.to_string(),
                value: value.to_string(),
                expected: "seconds as a non-negative integer",
            })
    }

    /// Merge multiple configurations with priority
    fn merge_configs(configs: Vec<PublishConfig>) -> PublishConfig {
        let mut result = PublishConfig::default();

        for config in configs {
            Self::merge_into(&mut result, config);
        }

        result
    }

    /// Merge source config into target
    fn merge_into(target: &mut PublishConfig, source: PublishConfig) {
        if source.registry.is_some() {
            target.registry = source.registry;
        }
        if source.args.is_some() {
            target.args = source.args;
        }
        if source.dry_run.is_some() {
            target.dry_run = source.dry_run;
        }
        if source.wait.is_some() {
            target.wait = source.wait;
        }

        // Poll settings merge field by field
        if let Some(source_poll) = source.poll {
            let target_poll = target.poll.get_or_insert_with(PollConfig::default);

            if source_poll.interval_secs.is_some() {
                target_poll.interval_secs = source_poll.interval_secs;
            }
            if source_poll.max_delay_secs.is_some() {
                target_poll.max_delay_secs = source_poll.max_delay_secs;
            }
            if source_poll.backoff_multiplier.is_some() {
                target_poll.backoff_multiplier = source_poll.backoff_multiplier;
            }
            if source_poll.max_attempts.is_some() {
                target_poll.max_attempts = source_poll.max_attempts;
            }
            if source_poll.timeout_secs.is_some() {
                target_poll.timeout_secs = source_poll.timeout_secs;
            }
        }

        if let Some(source_oracle) = source.oracle {
            let target_oracle = target.oracle.get_or_insert_with(OracleConfig::default);

            if source_oracle.kind.is_some() {
                target_oracle.kind = source_oracle.kind;
            }
            if source_oracle.api_url.is_some() {
                target_oracle.api_url = source_oracle.api_url;
            }
            if source_oracle.index_url.is_some() {
                target_oracle.index_url = source_oracle.index_url;
            }
        }
    }

    /// Validate configuration
    pub fn validate(config: &PublishConfig) -> ConfigValidationResult {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        if let Some(registry) = &config.registry
            && registry.trim().is_empty()
        {
            errors.push(ConfigValidationError {
                field: "registry".to_string(),
                message: "registry name must not be empty".to_string(),
            });
        }

        if let Some(poll) = &config.poll {
            Self::validate_poll(poll, &mut errors, &mut warnings);
        }

        if let Some(oracle) = &config.oracle {
            Self::validate_oracle(oracle, &mut errors);
        }

        // A custom registry is rarely served by the crates.io endpoints
        let oracle_url_set = config
            .oracle
            .as_ref()
            .is_some_and(|o| o.api_url.is_some() || o.index_url.is_some());
        if config.registry.is_some() && !oracle_url_set && config.wait != Some(false) {
            warnings.push(ConfigValidationWarning {
                field: "oracle".to_string(),
                message: "custom registry is confirmed against crates.io".to_string(),
                suggestion: Some(
                    "set oracle.apiUrl or oracle.indexUrl for the target registry".to_string(),
                ),
            });
        }

        if config.dry_run == Some(true) && config.wait == Some(true) {
            warnings.push(ConfigValidationWarning {
                field: "wait".to_string(),
                message: "wait has no effect in dry-run mode".to_string(),
                suggestion: None,
            });
        }

        ConfigValidationResult {
            valid: errors.is_empty(),
            errors,
            warnings,
        }
    }

    fn validate_poll(
        poll: &PollConfig,
        errors: &mut Vec<ConfigValidationError>,
        warnings: &mut Vec<ConfigValidationWarning>,
    ) {
        if let Some(multiplier) = poll.backoff_multiplier
            && !(multiplier.is_finite() && multiplier >= 1.0)
        {
            errors.push(ConfigValidationError {
                field: "poll.backoffMultiplier".to_string(),
                message: format!("must be a finite number >= 1.0, got {}", multiplier),
            });
        }

        if poll.max_attempts == Some(0) {
            errors.push(ConfigValidationError {
                field: "poll.maxAttempts".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if poll.timeout_secs == Some(0) {
            warnings.push(ConfigValidationWarning {
                field: "poll.timeoutSecs".to_string(),
                message: "a zero timeout checks the registry only once".to_string(),
                suggestion: Some("use wait: false to skip confirmation".to_string()),
            });
        }

        if let (Some(interval), Some(max_delay)) = (poll.interval_secs, poll.max_delay_secs)
            && max_delay < interval
        {
            warnings.push(ConfigValidationWarning {
                field: "poll.maxDelaySecs".to_string(),
                message: format!(
                    "max delay {}s is shorter than the interval {}s",
                    max_delay, interval
                ),
                suggestion: None,
            });
        }
    }

    fn validate_oracle(oracle: &OracleConfig, errors: &mut Vec<ConfigValidationError>) {
        let urls = [
            ("oracle.apiUrl", oracle.api_url.as_deref()),
            ("oracle.indexUrl", oracle.index_url.as_deref()),
        ];

        for (field, url) in urls {
            if let Some(url) = url {
                let url = url.strip_prefix("sparse+").unwrap_or(url);
                if !(url.starts_with("https://") || url.starts_with("http://")) {
                    errors.push(ConfigValidationError {
                        field: field.to_string(),
                        message: format!("must be an http(s) URL, got {}", url),
                    });
                }
            }
        }
    }

    /// Validate and resolve configuration into settings
    pub fn resolve(
        config: PublishConfig,
        root: PathBuf,
        registry_token: Option<SecretString>,
    ) -> Result<Settings, ConfigError> {
        let result = Self::validate(&config);
        if !result.valid {
            return Err(ConfigError::Invalid {
                messages: result
                    .errors
                    .iter()
                    .map(|e| format!("{}: {}", e.field, e.message))
                    .collect(),
            });
        }

        Ok(config.into_settings(root, registry_token))
    }

    /// Format validation result as human-readable string
    pub fn format_validation_result(result: &ConfigValidationResult) -> String {
        let mut lines = Vec::new();

        if result.valid {
            lines.push("✅ Configuration validation succeeded".to_string());
        } else {
            lines.push("❌ Configuration has errors".to_string());
        }

        if !result.errors.is_empty() {
            lines.push("\n🔴 Errors:".to_string());
            for error in &result.errors {
                lines.push(format!("  - [{}] {}", error.field, error.message));
            }
        }

        if !result.warnings.is_empty() {
            lines.push("\n🟡 Warnings:".to_string());
            for warning in &result.warnings {
                lines.push(format!("  - [{}] {}", warning.field, warning.message));
                if let Some(suggestion) = &warning.suggestion {
                    lines.push(format!("    Suggestion: {}", suggestion));
                }
            }
        }

        lines.join("\n")
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::time::Duration;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_split_args() {
        assert_eq!(
            ConfigLoader::split_args("--allow-dirty \n\t --features  foo\n"),
            vec!["--allow-dirty", "--features", "foo"]
        );
        assert!(ConfigLoader::split_args("  \n ").is_empty());
    }

    #[test]
    fn test_parse_bool_flag() {
        assert!(ConfigLoader::parse_bool_flag("wait", "true").unwrap());
        assert!(ConfigLoader::parse_bool_flag("wait", " TRUE ").unwrap());
        assert!(!ConfigLoader::parse_bool_flag("wait", "false").unwrap());

        let error = ConfigLoader::parse_bool_flag("dry-run", "yes").unwrap_err();
        assert!(matches!(error, ConfigError::InvalidFlag { ref flag, .. } if flag == "dry-run"));
    }

    #[test]
    fn test_parse_flags_empty_is_none() {
        let flags = RawFlags {
            registry: Some("  ".to_string()),
            ..Default::default()
        };

        assert!(ConfigLoader::parse_flags(&flags).unwrap().is_none());
    }

    #[test]
    fn test_parse_flags() {
        let flags = RawFlags {
            args: Some("--allow-dirty --no-verify".to_string()),
            dry_run: Some("true".to_string()),
            wait: Some("false".to_string()),
            wait_timeout: Some("120".to_string()),
            oracle: Some("sparse".to_string()),
            ..Default::default()
        };

        let config = ConfigLoader::parse_flags(&flags).unwrap().unwrap();

        assert_eq!(
            config.args,
            Some(vec!["--allow-dirty".to_string(), "--no-verify".to_string()])
        );
        assert_eq!(config.dry_run, Some(true));
        assert_eq!(config.wait, Some(false));
        assert_eq!(config.poll.unwrap().timeout_secs, Some(120));
        assert_eq!(config.oracle.unwrap().kind, Some(OracleKind::Sparse));
    }

    #[test]
    fn test_parse_flags_rejects_bad_numbers() {
        let flags = RawFlags {
            poll_interval: Some("5s".to_string()),
            ..Default::default()
        };

        assert!(ConfigLoader::parse_flags(&flags).is_err());
    }

    #[test]
    fn test_load_env_token() {
        let env = env(&[("PUBLISH_CRATES_REGISTRY_TOKEN", " cio-token-123 ")]);

        let token = ConfigLoader::load_env_token(&env).unwrap();
        assert_eq!(token.expose_secret(), "cio-token-123");
        assert!(ConfigLoader::load_env_token(&HashMap::new()).is_none());
    }

    #[tokio::test]
    async fn test_load_priority() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(
            temp_dir.path().join(CONFIG_FILENAME),
            "registry: from-file\nwait: false\npoll:\n  intervalSecs: 9\n  maxAttempts: 4\n",
        )
        .unwrap();

        let options = ConfigLoadOptions {
            project_path: temp_dir.path().to_path_buf(),
            cli_flags: Some(RawFlags {
                registry: Some("from-cli".to_string()),
                ..Default::default()
            }),
            env: env(&[
                ("PUBLISH_CRATES_REGISTRY", "from-env"),
                ("PUBLISH_CRATES_POLL_INTERVAL", "3"),
            ]),
        };

        let config = ConfigLoader::load(options).await.unwrap();

        assert_eq!(config.registry.as_deref(), Some("from-cli"));
        assert_eq!(config.wait, Some(false));
        let poll = config.poll.unwrap();
        assert_eq!(poll.interval_secs, Some(3));
        assert_eq!(poll.max_attempts, Some(4));
    }

    #[tokio::test]
    async fn test_load_without_file() {
        let temp_dir = TempDir::new().unwrap();
        let options = ConfigLoadOptions {
            project_path: temp_dir.path().to_path_buf(),
            cli_flags: None,
            env: HashMap::new(),
        };

        let config = ConfigLoader::load(options).await.unwrap();
        assert_eq!(config, PublishConfig::default());
    }

    #[tokio::test]
    async fn test_load_invalid_yaml() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join(CONFIG_FILENAME), "wait: [not a bool").unwrap();

        let options = ConfigLoadOptions {
            project_path: temp_dir.path().to_path_buf(),
            cli_flags: None,
            env: HashMap::new(),
        };

        let error = ConfigLoader::load(options).await.unwrap_err();
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_validate_poll_errors() {
        let config = PublishConfig {
            poll: Some(PollConfig {
                backoff_multiplier: Some(0.5),
                max_attempts: Some(0),
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = ConfigLoader::validate(&config);

        assert!(!result.valid);
        assert_eq!(result.errors.len(), 2);
        assert_eq!(result.errors[0].field, "poll.backoffMultiplier");
        assert_eq!(result.errors[1].field, "poll.maxAttempts");
    }

    #[test]
    fn test_validate_custom_registry_warning() {
        let config = PublishConfig {
            registry: Some("internal".to_string()),
            ..Default::default()
        };

        let result = ConfigLoader::validate(&config);

        assert!(result.valid);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].field, "oracle");
    }

    #[test]
    fn test_validate_rejects_non_http_urls() {
        let config = PublishConfig {
            oracle: Some(OracleConfig {
                index_url: Some("file:///srv/index".to_string()),
                ..Default::default()
            }),
            ..Default::default()
        };

        let result = ConfigLoader::validate(&config);
        assert!(!result.valid);
        assert_eq!(result.errors[0].field, "oracle.indexUrl");
    }

    #[test]
    fn test_resolve() {
        let config = PublishConfig {
            dry_run: Some(true),
            poll: Some(PollConfig {
                timeout_secs: Some(30),
                ..Default::default()
            }),
            ..Default::default()
        };

        let settings = ConfigLoader::resolve(config, PathBuf::from("/ws"), None).unwrap();

        assert!(settings.run.dry_run);
        assert_eq!(settings.root, PathBuf::from("/ws"));
        assert_eq!(settings.run.poll.max_wait, Duration::from_secs(30));
    }

    #[test]
    fn test_resolve_huge_multiplier_keeps_delay_bounded() {
        let config = PublishConfig {
            poll: Some(PollConfig {
                interval_secs: Some(1),
                backoff_multiplier: Some(1e300),
                max_attempts: Some(3),
                timeout_secs: Some(5),
                ..Default::default()
            }),
            ..Default::default()
        };

        let settings = ConfigLoader::resolve(config, PathBuf::from("/ws"), None).unwrap();
        let poll = &settings.run.poll;

        assert_eq!(poll.next_delay(poll.initial_delay), poll.max_delay);
    }

    #[test]
    fn test_resolve_invalid() {
        let config = PublishConfig {
            registry: Some(String::new()),
            ..Default::default()
        };

        let error = ConfigLoader::resolve(config, PathBuf::from("."), None).unwrap_err();
        assert!(matches!(error, ConfigError::Invalid { .. }));
    }

    #[test]
    fn test_format_validation_result() {
        let result = ConfigValidationResult {
            valid: false,
            errors: vec![ConfigValidationError {
                field: "poll.maxAttempts".to_string(),
                message: "must be at least 1".to_string(),
            }],
            warnings: vec![ConfigValidationWarning {
                field: "oracle".to_string(),
                message: "custom registry is confirmed against crates.io".to_string(),
                suggestion: Some("set oracle.apiUrl".to_string()),
            }],
        };

        let formatted = ConfigLoader::format_validation_result(&result);

        assert!(formatted.contains("❌ Configuration has errors"));
        assert!(formatted.contains("[poll.maxAttempts]"));
        assert!(formatted.contains("🟡 Warnings:"));
        assert!(formatted.contains("Suggestion: set oracle.apiUrl"));
    }
}

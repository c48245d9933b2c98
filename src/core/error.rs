//! Error handling for workspace publishing
//!
//! Every failure is tagged with the phase it happened in, so a run that
//! stops halfway can be reported as a single message naming the phase,
//! the package and the cause.

use semver::Version;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::state_machine::TransitionError;

/// Phase of a publish run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Config,
    Discovery,
    Consistency,
    Sort,
    Publish,
    Confirm,
    Cancelled,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Config => "config",
            Self::Discovery => "discovery",
            Self::Consistency => "consistency",
            Self::Sort => "sort",
            Self::Publish => "publish",
            Self::Confirm => "confirm",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invalid configuration input
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("フラグ {flag} の値が不正です: {value:?} (期待値: {expected})")]
    InvalidFlag {
        flag: String,
        value: String,
        expected: &'static str,
    },

    #[error("設定ファイルを読み込めませんでした: {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("設定ファイルの解析に失敗しました: {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("設定にエラーがあります: {}", .messages.join("; "))]
    Invalid { messages: Vec<String> },
}

/// Package discovery failed before anything was checked
#[derive(Error, Debug)]
pub enum DiscoveryError {
    #[error("パッケージが見つかりませんでした: {}", .root.display())]
    NoPackages { root: PathBuf },

    #[error("マニフェストを読み込めませんでした: {}", .path.display())]
    ManifestRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("マニフェストの解析に失敗しました: {}", .path.display())]
    ManifestParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("{}: 必須フィールド {field} がありません", .path.display())]
    MissingField { path: PathBuf, field: String },

    #[error("{}: 無効なバージョン番号です: {version}", .path.display())]
    InvalidVersion {
        path: PathBuf,
        version: String,
        #[source]
        source: semver::Error,
    },

    #[error("{}: 依存関係 {dependency} のバージョン要件が不正です: {requirement}", .path.display())]
    InvalidRequirement {
        path: PathBuf,
        dependency: String,
        requirement: String,
        #[source]
        source: semver::Error,
    },

    #[error("ワークスペースの解析に失敗しました: {message}")]
    Workspace { message: String },
}

/// A single consistency rule violation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    DuplicateName {
        name: String,
        count: usize,
    },
    SelfDependency {
        package: String,
    },
    UnresolvedPath {
        package: String,
        dependency: String,
        path: PathBuf,
    },
    VersionMismatch {
        package: String,
        dependency: String,
        requirement: String,
        actual: String,
    },
    MissingVersionRequirement {
        package: String,
        dependency: String,
    },
    DuplicatePublishTarget {
        name: String,
        version: String,
    },
    OracleFailure {
        package: String,
        version: String,
        message: String,
    },
}

impl Violation {
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateName { .. } => "DUPLICATE_NAME",
            Self::SelfDependency { .. } => "SELF_DEPENDENCY",
            Self::UnresolvedPath { .. } => "UNRESOLVED_PATH",
            Self::VersionMismatch { .. } => "VERSION_MISMATCH",
            Self::MissingVersionRequirement { .. } => "MISSING_VERSION_REQUIREMENT",
            Self::DuplicatePublishTarget { .. } => "DUPLICATE_PUBLISH_TARGET",
            Self::OracleFailure { .. } => "ORACLE_FAILURE",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateName { name, count } => {
                write!(f, "パッケージ名 {} が {} 回定義されています", name, count)
            }
            Self::SelfDependency { package } => {
                write!(f, "{} が自分自身に依存しています", package)
            }
            Self::UnresolvedPath {
                package,
                dependency,
                path,
            } => write!(
                f,
                "{} のパス依存 {} ({}) がワークスペース内に見つかりません",
                package,
                dependency,
                path.display()
            ),
            Self::VersionMismatch {
                package,
                dependency,
                requirement,
                actual,
            } => write!(
                f,
                "{} は {} {} を要求していますが、ワークスペースのバージョンは {} です",
                package, dependency, requirement, actual
            ),
            Self::MissingVersionRequirement {
                package,
                dependency,
            } => write!(
                f,
                "{} の依存関係 {} にバージョン指定がありません",
                package, dependency
            ),
            Self::DuplicatePublishTarget { name, version } => {
                write!(f, "{}@{} が複数回公開対象になっています", name, version)
            }
            Self::OracleFailure {
                package,
                version,
                message,
            } => write!(
                f,
                "{}@{} の公開状態を確認できませんでした: {}",
                package, version, message
            ),
        }
    }
}

fn format_violations(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|v| format!("\n  - [{}] {}", v.code(), v))
        .collect()
}

/// Every violation found in the package set, reported together
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("整合性チェックで {} 件の違反が見つかりました:{}", .violations.len(), format_violations(.violations))]
pub struct ConsistencyError {
    pub violations: Vec<Violation>,
}

/// The dependency graph is not acyclic
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("依存関係が循環しています: {}", .participants.join(", "))]
pub struct CycleError {
    /// Every package left unsorted, in discovery order
    pub participants: Vec<String>,
}

/// The publish command for a package failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{package}@{version} の公開に失敗しました: {cause}")]
pub struct PublishError {
    pub package: String,
    pub version: Version,
    pub cause: String,
}

/// The registry did not confirm a published version in time
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{package}@{version} がレジストリに反映されませんでした ({attempts} 回確認, {waited:?} 経過)")]
pub struct TimeoutError {
    pub package: String,
    pub version: Version,
    pub attempts: u32,
    pub waited: Duration,
}

/// Top-level error of a publish run
#[derive(Error, Debug)]
pub enum RunError {
    #[error("[config] {0}")]
    Config(#[from] ConfigError),

    #[error("[discovery] {0}")]
    Discovery(#[from] DiscoveryError),

    #[error("[consistency] {0}")]
    Consistency(#[from] ConsistencyError),

    #[error("[sort] {0}")]
    Cycle(#[from] CycleError),

    #[error("[publish] {0}")]
    Publish(#[from] PublishError),

    #[error("[confirm] {0}")]
    Timeout(#[from] TimeoutError),

    #[error("[publish] 公開計画に存在しないパッケージです: {package}")]
    UnknownPackage { package: String },

    #[error("[publish] {0}")]
    State(#[from] TransitionError),

    #[error("[cancelled] 中断されました。未処理のパッケージ: {}", .remaining.join(", "))]
    Cancelled { remaining: Vec<String> },
}

impl RunError {
    /// Phase the run was in when it failed
    pub fn phase(&self) -> Phase {
        match self {
            Self::Config(_) => Phase::Config,
            Self::Discovery(_) => Phase::Discovery,
            Self::Consistency(_) => Phase::Consistency,
            Self::Cycle(_) => Phase::Sort,
            Self::Publish(_) | Self::UnknownPackage { .. } | Self::State(_) => Phase::Publish,
            Self::Timeout(_) => Phase::Confirm,
            Self::Cancelled { .. } => Phase::Cancelled,
        }
    }

    /// Package the failure is attributed to, if any
    pub fn package(&self) -> Option<&str> {
        match self {
            Self::Publish(e) => Some(&e.package),
            Self::Timeout(e) => Some(&e.package),
            Self::UnknownPackage { package } => Some(package),
            Self::State(e) => Some(e.package()),
            _ => None,
        }
    }

    /// Check if nothing has been published when this error is raised
    pub fn is_before_publish(&self) -> bool {
        matches!(
            self.phase(),
            Phase::Config | Phase::Discovery | Phase::Consistency | Phase::Sort
        )
    }

    /// Display text followed by every underlying cause, one per line
    ///
    /// The phase error wrapped by each variant is already part of the
    /// display text, so the chain starts below it.
    pub fn report(&self) -> String {
        let mut message = self.to_string();
        let mut cause =
            std::error::Error::source(self).and_then(|inner| std::error::Error::source(inner));
        while let Some(error) = cause {
            message.push_str(&format!("\n  原因: {}", error));
            cause = std::error::Error::source(error);
        }
        message
    }

    /// Get error code for this error
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Discovery(_) => "DISCOVERY_ERROR",
            Self::Consistency(_) => "CONSISTENCY_ERROR",
            Self::Cycle(_) => "DEPENDENCY_CYCLE",
            Self::Publish(_) => "PUBLISH_FAILED",
            Self::Timeout(_) => "CONFIRMATION_TIMEOUT",
            Self::UnknownPackage { .. } => "UNKNOWN_PACKAGE",
            Self::State(_) => "INVALID_STATE_TRANSITION",
            Self::Cancelled { .. } => "CANCELLED",
        }
    }

    /// Get suggested actions for this error
    pub fn suggested_actions(&self) -> Vec<&'static str> {
        match self {
            Self::Config(_) => vec![
                "フラグと環境変数の値を確認してください",
                ".publish-crates.yaml の内容を確認してください",
            ],
            Self::Discovery(_) => vec![
                "--path がワークスペースのルートを指しているか確認してください",
                "Cargo.toml の構文を確認してください",
            ],
            Self::Consistency(_) => vec![
                "各違反を修正してから再実行してください",
                "パス依存には version も指定してください",
            ],
            Self::Cycle(_) => vec![
                "循環している依存関係を解消してください",
                "テスト専用の依存は dev-dependencies に移動してください",
            ],
            Self::Publish(_) => vec![
                "cargo publish の出力を確認してください",
                "レジストリトークンが正しいか確認してください",
                "公開済みのパッケージはスキップされるため、そのまま再実行できます",
            ],
            Self::Timeout(_) => vec![
                "しばらく待ってから再実行してください（公開済みのパッケージはスキップされます）",
                "--wait-timeout で待機時間を延長できます",
            ],
            Self::UnknownPackage { .. } | Self::State(_) => {
                vec!["公開計画を再計算して再実行してください"]
            }
            Self::Cancelled { .. } => {
                vec!["再実行すると未処理のパッケージから再開されます"]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn version(s: &str) -> Version {
        Version::parse(s).unwrap()
    }

    #[test]
    fn test_phase_tags_in_display() {
        let error = RunError::from(CycleError {
            participants: vec!["a".to_string(), "b".to_string()],
        });

        assert_eq!(error.phase(), Phase::Sort);
        assert_eq!(error.code(), "DEPENDENCY_CYCLE");
        let display = error.to_string();
        assert!(display.starts_with("[sort]"));
        assert!(display.contains("a, b"));
    }

    #[test]
    fn test_publish_error_names_package_and_cause() {
        let error = RunError::from(PublishError {
            package: "core-lib".to_string(),
            version: version("1.2.0"),
            cause: "exit status: 101".to_string(),
        });

        assert_eq!(error.phase(), Phase::Publish);
        assert_eq!(error.package(), Some("core-lib"));
        assert!(!error.is_before_publish());
        let display = error.to_string();
        assert!(display.contains("core-lib@1.2.0"));
        assert!(display.contains("exit status: 101"));
    }

    #[test]
    fn test_timeout_error_is_confirm_phase() {
        let error = RunError::from(TimeoutError {
            package: "b".to_string(),
            version: version("0.3.1"),
            attempts: 12,
            waited: Duration::from_secs(60),
        });

        assert_eq!(error.phase(), Phase::Confirm);
        assert_eq!(error.package(), Some("b"));
        assert_eq!(error.code(), "CONFIRMATION_TIMEOUT");
        assert!(!error.suggested_actions().is_empty());
    }

    #[test]
    fn test_consistency_error_lists_every_violation() {
        let error = ConsistencyError {
            violations: vec![
                Violation::DuplicateName {
                    name: "dup".to_string(),
                    count: 2,
                },
                Violation::SelfDependency {
                    package: "loop".to_string(),
                },
            ],
        };

        let display = error.to_string();
        assert!(display.contains("[DUPLICATE_NAME]"));
        assert!(display.contains("[SELF_DEPENDENCY]"));
        assert!(display.contains("dup"));
        assert!(display.contains("loop"));

        let run_error = RunError::from(error);
        assert!(run_error.is_before_publish());
        assert_eq!(run_error.phase(), Phase::Consistency);
    }

    #[test]
    fn test_cancelled_lists_remaining_packages() {
        let error = RunError::Cancelled {
            remaining: vec!["b".to_string(), "a".to_string()],
        };

        assert_eq!(error.phase(), Phase::Cancelled);
        assert!(error.to_string().contains("b, a"));
        assert_eq!(error.package(), None);
    }

    #[test]
    fn test_report_includes_underlying_cause() {
        let source = Version::parse("1.x").unwrap_err();
        let cause = source.to_string();
        let error = RunError::from(DiscoveryError::InvalidVersion {
            path: PathBuf::from("/ws/core/Cargo.toml"),
            version: "1.x".to_string(),
            source,
        });

        let report = error.report();

        assert!(report.starts_with("[discovery]"));
        assert!(report.contains(&cause));
        assert_eq!(report.matches("無効なバージョン番号です").count(), 1);
        assert!(!error.to_string().contains(&cause));
    }

    #[test]
    fn test_report_without_cause_is_display() {
        let error = RunError::Cancelled {
            remaining: vec!["a".to_string()],
        };

        assert_eq!(error.report(), error.to_string());
    }

    #[test]
    fn test_violation_serialization_is_tagged() {
        let violation = Violation::VersionMismatch {
            package: "app".to_string(),
            dependency: "core".to_string(),
            requirement: "^2".to_string(),
            actual: "1.0.0".to_string(),
        };

        let json = serde_json::to_string(&violation).unwrap();
        assert!(json.contains(r#""kind":"version_mismatch""#));
    }
}

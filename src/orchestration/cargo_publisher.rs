//! `cargo publish` as the publish step

use async_trait::async_trait;
use log::{debug, info};

use crate::core::traits::{PackagePublisher, PublishOutput, PublishRequest};
use crate::security::command_executor::SafeCommandExecutor;
use crate::security::token_manager::SecureTokenManager;

/// Lines of stderr kept in a failure message
const STDERR_SUMMARY_LINES: usize = 8;

/// Publisher running `cargo publish` in the package directory
///
/// The registry token, if any, is set only in the child's environment.
pub struct CargoPublisher {
    tokens: SecureTokenManager,
}

impl CargoPublisher {
    pub fn new(tokens: SecureTokenManager) -> Self {
        Self { tokens }
    }
}

#[async_trait]
impl PackagePublisher for CargoPublisher {
    async fn publish(&self, request: &PublishRequest) -> anyhow::Result<PublishOutput> {
        let executor = SafeCommandExecutor::new(&request.manifest_dir)?;
        let args = request.cargo_args();

        let env_override = self.tokens.env_override();
        let env: Vec<(&str, _)> = env_override
            .iter()
            .map(|(name, token)| (name.as_str(), *token))
            .collect();
        if let Some((name, _)) = &env_override {
            debug!("passing registry token to cargo via {}", name);
        }

        info!(
            "running `{}` in {}",
            request.command_line(),
            request.manifest_dir.display()
        );
        let output = executor
            .execute("cargo", args.as_slice(), env.as_slice())
            .await?;

        let stdout = self
            .tokens
            .mask_tokens_in_string(&String::from_utf8_lossy(&output.stdout));
        let stderr = self
            .tokens
            .mask_tokens_in_string(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            anyhow::bail!(
                "cargo publish が失敗しました ({}): {}",
                output.status,
                summarize_stderr(&stderr)
            );
        }

        Ok(PublishOutput { stdout, stderr })
    }
}

/// Last few non-empty lines of stderr, joined
fn summarize_stderr(stderr: &str) -> String {
    let lines: Vec<&str> = stderr
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect();
    if lines.is_empty() {
        return "(no output)".to_string();
    }

    let start = lines.len().saturating_sub(STDERR_SUMMARY_LINES);
    lines[start..].join("\n")
}

//! SafeCommandExecutor: whitelisted external command execution
//!
//! # Security Features
//!
//! - **Whitelist-based validation**: only `cargo` may run
//! - **No shell**: arguments are passed as a vector, never interpolated
//! - **Working directory validation**: the directory must exist
//! - **Per-invocation environment**: extra variables (the registry token) are
//!   set on the child only; the current process environment is untouched
//! - **Closed stdin**: the child can never block on an interactive prompt
//! - **Own process group** (unix): a terminal Ctrl-C reaches only this
//!   process, so an in-flight publish is never killed by it
//!
//! # Example
//!
//! ```rust,no_run
//! use publish_crates::security::SafeCommandExecutor;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let executor = SafeCommandExecutor::new(std::env::temp_dir())?;
//! let output = executor.execute("cargo", &["--version"], &[]).await?;
//! println!("{}", String::from_utf8_lossy(&output.stdout));
//! # Ok(())
//! # }
//! ```

use secrecy::{ExposeSecret, SecretString};
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use thiserror::Error;
use tokio::process::Command;

/// Commands SafeCommandExecutor may run
const ALLOWED_COMMANDS: &[&str] = &["cargo"];

/// Errors that can occur during command execution
#[derive(Error, Debug)]
pub enum CommandError {
    /// Command is not in the allowed whitelist
    #[error("Command '{0}' is not in the allowed whitelist")]
    CommandNotAllowed(String),

    /// Working directory does not exist or is not a directory
    #[error("Working directory does not exist: {0}")]
    InvalidWorkingDirectory(PathBuf),

    /// Command could not be started (e.g., binary not found, permission denied)
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),
}

/// Safe command executor bound to one working directory
#[derive(Debug)]
pub struct SafeCommandExecutor {
    working_dir: PathBuf,
}

impl SafeCommandExecutor {
    /// Create an executor for `working_dir`
    ///
    /// # Errors
    ///
    /// Returns `CommandError::InvalidWorkingDirectory` if the directory does not exist.
    pub fn new<P: AsRef<Path>>(working_dir: P) -> Result<Self, CommandError> {
        let working_dir = working_dir.as_ref().to_path_buf();

        if !working_dir.is_dir() {
            return Err(CommandError::InvalidWorkingDirectory(working_dir));
        }

        Ok(Self { working_dir })
    }

    /// Build the child command without running it
    ///
    /// # Arguments
    ///
    /// * `command` - Must be in the whitelist
    /// * `args` - Passed verbatim, no shell expansion
    /// * `env` - Variables set on the child only
    pub fn build_command<S: AsRef<str>>(
        &self,
        command: &str,
        args: &[S],
        env: &[(&str, &SecretString)],
    ) -> Result<Command, CommandError> {
        if !ALLOWED_COMMANDS.contains(&command) {
            return Err(CommandError::CommandNotAllowed(command.to_string()));
        }

        let mut child = Command::new(command);
        child
            .args(args.iter().map(AsRef::as_ref))
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        for (name, value) in env {
            child.env(name, value.expose_secret());
        }
        own_process_group(&mut child);

        Ok(child)
    }

    /// Run a command to completion and capture its output
    ///
    /// There is no timeout: the external tool is trusted to terminate.
    ///
    /// # Errors
    ///
    /// - `CommandError::CommandNotAllowed` - Command not in whitelist
    /// - `CommandError::ExecutionFailed` - Binary not found or could not start
    pub async fn execute<S: AsRef<str>>(
        &self,
        command: &str,
        args: &[S],
        env: &[(&str, &SecretString)],
    ) -> Result<Output, CommandError> {
        self.build_command(command, args, env)?
            .output()
            .await
            .map_err(|e| CommandError::ExecutionFailed(e.to_string()))
    }
}

/// Move the child into a new process group so terminal signals skip it
#[cfg(unix)]
fn own_process_group(command: &mut Command) {
    command.process_group(0);
}

#[cfg(not(unix))]
fn own_process_group(_command: &mut Command) {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;
    use tempfile::TempDir;

    #[test]
    fn test_rejected_command() {
        let temp_dir = TempDir::new().unwrap();
        let executor = SafeCommandExecutor::new(temp_dir.path()).unwrap();

        let result = executor.build_command("rm", &["-rf", "/"], &[]);

        assert!(matches!(result, Err(CommandError::CommandNotAllowed(_))));
    }

    #[test]
    fn test_invalid_working_directory() {
        let result = SafeCommandExecutor::new("/nonexistent/directory/that/does/not/exist");
        assert!(matches!(
            result,
            Err(CommandError::InvalidWorkingDirectory(_))
        ));
    }

    #[test]
    fn test_command_shape() {
        let temp_dir = TempDir::new().unwrap();
        let executor = SafeCommandExecutor::new(temp_dir.path()).unwrap();

        let command = executor
            .build_command("cargo", &["publish", "--allow-dirty; rm -rf /"], &[])
            .unwrap();
        let std_command = command.as_std();

        assert_eq!(std_command.get_program(), "cargo");
        let args: Vec<&OsStr> = std_command.get_args().collect();
        assert_eq!(args, vec!["publish", "--allow-dirty; rm -rf /"]);
        assert_eq!(std_command.get_current_dir(), Some(temp_dir.path()));
    }

    #[test]
    fn test_env_is_set_on_child_only() {
        let temp_dir = TempDir::new().unwrap();
        let executor = SafeCommandExecutor::new(temp_dir.path()).unwrap();
        let token = SecretString::new("child-only-token-123".into());
        let name = "CARGO_REGISTRIES_CHILD_ONLY_TEST_TOKEN";

        let command = executor
            .build_command("cargo", &["publish"], &[(name, &token)])
            .unwrap();

        let envs: Vec<(&OsStr, Option<&OsStr>)> = command.as_std().get_envs().collect();
        assert_eq!(
            envs,
            vec![(OsStr::new(name), Some(OsStr::new("child-only-token-123")))]
        );
        assert!(std::env::var_os(name).is_none());
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_child_leads_its_own_process_group() {
        let mut command = Command::new("sh");
        command
            .args(["-c", "echo $$; cut -d' ' -f5 /proc/$$/stat"])
            .stdout(Stdio::piped());
        own_process_group(&mut command);

        let output = command.output().await.unwrap();
        let stdout = String::from_utf8(output.stdout).unwrap();
        let lines: Vec<&str> = stdout.lines().map(str::trim).collect();

        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0], lines[1]);
    }
}

//! Command execution abstraction for the packet-filter control tools.
//!
//! Backends never spawn `pfctl` or `nft` directly; they go through a
//! [`CommandExecutor`] so unit tests can script the tool's answers.

use anyhow::{Context, Result};
use std::io::Write;
use std::process::{Command, Stdio};

#[cfg(test)]
use mockall::automock;

/// Output of a finished command
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    /// Exit code 0
    pub success: bool,
    pub code: Option<i32>,
}

impl CommandOutput {
    /// Diagnostic text of the run: stderr, falling back to stdout.
    pub fn diagnostics(&self) -> String {
        if self.stderr.trim().is_empty() {
            self.stdout.trim().to_string()
        } else {
            self.stderr.trim().to_string()
        }
    }
}

/// Runs external commands.
///
/// `&[String]` instead of `&[&str]` keeps the signature mockable.
#[cfg_attr(test, automock)]
pub trait CommandExecutor: Send + Sync {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput>;

    /// Same as [`CommandExecutor::execute`], feeding `stdin` to the process.
    fn execute_with_stdin(&self, cmd: &str, args: &[String], stdin: &str) -> Result<CommandOutput>;
}

/// Executor spawning real processes.
#[derive(Debug, Clone, Default)]
pub struct RealCommandExecutor;

impl RealCommandExecutor {
    pub fn new() -> Self {
        Self
    }
}

impl CommandExecutor for RealCommandExecutor {
    fn execute(&self, cmd: &str, args: &[String]) -> Result<CommandOutput> {
        let output = Command::new(cmd)
            .args(args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .with_context(|| format!("Failed to execute {}", cmd))?;

        Ok(to_command_output(output))
    }

    fn execute_with_stdin(&self, cmd: &str, args: &[String], stdin_data: &str) -> Result<CommandOutput> {
        let mut child = Command::new(cmd)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .with_context(|| format!("Failed to spawn {}", cmd))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(stdin_data.as_bytes())?;
        }

        let output = child.wait_with_output()?;
        Ok(to_command_output(output))
    }
}

fn to_command_output(output: std::process::Output) -> CommandOutput {
    CommandOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        success: output.status.success(),
        code: output.status.code(),
    }
}

/// Convert a slice of `&str` to owned arguments.
pub fn args_to_strings(args: &[&str]) -> Vec<String> {
    args.iter().map(|s| s.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_to_strings() {
        let args = args_to_strings(&["-t", "bogons", "-T", "show"]);
        assert_eq!(args, vec!["-t", "bogons", "-T", "show"]);
        assert!(args_to_strings(&[]).is_empty());
    }

    #[test]
    fn test_diagnostics_prefers_stderr() {
        let output = CommandOutput {
            stdout: "ignored".to_string(),
            stderr: "pfctl: Table does not exist.\n".to_string(),
            ..Default::default()
        };
        assert_eq!(output.diagnostics(), "pfctl: Table does not exist.");

        let output = CommandOutput {
            stdout: " 3 addresses added.\n".to_string(),
            ..Default::default()
        };
        assert_eq!(output.diagnostics(), "3 addresses added.");
    }

    #[test]
    fn test_real_executor_echo() {
        let output = RealCommandExecutor::new()
            .execute("echo", &args_to_strings(&["-n", "hello"]))
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "hello");
    }

    #[test]
    fn test_real_executor_failure_exit() {
        let output = RealCommandExecutor::new()
            .execute("ls", &args_to_strings(&["--invalid-flag"]))
            .unwrap();
        assert!(!output.success);
    }

    #[test]
    fn test_real_executor_missing_binary() {
        let result = RealCommandExecutor::new().execute("/nonexistent/pfctl", &[]);
        assert!(result.is_err());
    }

    #[test]
    fn test_real_executor_with_stdin() {
        let output = RealCommandExecutor::new()
            .execute_with_stdin("cat", &[], "flush set inet aliastables lan")
            .unwrap();
        assert!(output.success);
        assert_eq!(output.stdout, "flush set inet aliastables lan");
    }

    #[test]
    fn test_mock_executor() {
        let mut mock = MockCommandExecutor::new();
        mock.expect_execute()
            .withf(|cmd, args| cmd == "pfctl" && args == ["-sT".to_string()])
            .times(1)
            .returning(|_, _| {
                Ok(CommandOutput {
                    stdout: "bogons\n".to_string(),
                    success: true,
                    code: Some(0),
                    ..Default::default()
                })
            });

        let output = mock.execute("pfctl", &["-sT".to_string()]).unwrap();
        assert_eq!(output.stdout, "bogons\n");
    }
}

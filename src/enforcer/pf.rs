//! pf backend: tables managed through `pfctl -t NAME -T ...`.

use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;
use tracing::debug;

use super::{TableBackend, PFCTL_PATH};
use crate::cmd_abstraction::{args_to_strings, CommandExecutor, CommandOutput, RealCommandExecutor};

const REJECTION_PREFIX: &str = "pfctl: ";

/// pf backend
pub struct PfBackend<E: CommandExecutor = RealCommandExecutor> {
    executor: E,
}

impl PfBackend<RealCommandExecutor> {
    pub fn new() -> Self {
        Self::with_executor(RealCommandExecutor::new())
    }
}

impl Default for PfBackend<RealCommandExecutor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: CommandExecutor> PfBackend<E> {
    pub fn with_executor(executor: E) -> Self {
        Self { executor }
    }

    fn table_command(&self, table: &str, command: &[&str]) -> Result<CommandOutput> {
        let mut args = vec!["-t", table, "-T"];
        args.extend_from_slice(command);
        debug!("{} {}", PFCTL_PATH, args.join(" "));
        self.executor.execute(PFCTL_PATH, &args_to_strings(&args))
    }
}

#[async_trait]
impl<E: CommandExecutor> TableBackend for PfBackend<E> {
    fn name(&self) -> &'static str {
        "pf"
    }

    fn rejection_prefix(&self) -> &'static str {
        REJECTION_PREFIX
    }

    async fn current_size(&self, table: &str) -> Result<usize> {
        let output = self.table_command(table, &["show"])?;
        if !output.success {
            let diagnostics = output.diagnostics();
            if diagnostics.contains("Table does not exist") {
                return Ok(0);
            }
            anyhow::bail!("pfctl failed: {}", diagnostics);
        }
        Ok(count_table_entries(&output.stdout))
    }

    async fn flush(&self, table: &str) -> Result<String> {
        Ok(self.table_command(table, &["flush"])?.diagnostics())
    }

    async fn replace(&self, table: &str, snapshot: &Path) -> Result<String> {
        let path = snapshot.to_string_lossy();
        Ok(self
            .table_command(table, &["replace", "-f", path.as_ref()])?
            .diagnostics())
    }

    async fn remove(&self, table: &str) -> Result<String> {
        Ok(self.table_command(table, &["kill"])?.diagnostics())
    }
}

/// `pfctl -T show` prints one entry per line.
fn count_table_entries(output: &str) -> usize {
    output.lines().filter(|line| !line.trim().is_empty()).count()
}

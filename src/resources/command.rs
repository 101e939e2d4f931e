use crate::core::probe::{Executor, Probe, ProbeStatus, Resource};
use crate::process::{CommandSpec, HostShell, run_checked};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

/// What tells a [`GuardedCommand`] it has nothing left to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Guard {
    /// Satisfied once this path exists.
    Creates(PathBuf),
    /// Satisfied while this shell snippet exits 0.
    Unless(String),
}

/// An arbitrary shell command made idempotent by a guard.
///
/// A bare command has no way to tell whether it already ran, so a guard is
/// mandatory.
pub struct GuardedCommand {
    command: String,
    guard: Guard,
    cwd: Option<PathBuf>,
    env: BTreeMap<String, String>,
    shell: Arc<dyn HostShell>,
}

impl GuardedCommand {
    pub fn new(command: impl Into<String>, guard: Guard, shell: Arc<dyn HostShell>) -> Self {
        Self {
            command: command.into(),
            guard,
            cwd: None,
            env: BTreeMap::new(),
            shell,
        }
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    fn spec(&self, script: &str) -> CommandSpec {
        let mut spec = CommandSpec::shell(script);
        for (key, value) in &self.env {
            spec = spec.env(key, value);
        }
        if let Some(dir) = &self.cwd {
            spec = spec.current_dir(dir);
        }
        spec
    }
}

#[async_trait]
impl Probe for GuardedCommand {
    async fn check(&self) -> Result<ProbeStatus> {
        match &self.guard {
            Guard::Creates(path) => {
                if tokio::fs::try_exists(path).await? {
                    Ok(ProbeStatus::Satisfied)
                } else {
                    Ok(ProbeStatus::unsatisfied(format!(
                        "{} does not exist",
                        path.display()
                    )))
                }
            }
            Guard::Unless(check) => {
                let output = self.shell.run(&self.spec(check)).await?;
                if output.success() {
                    Ok(ProbeStatus::Satisfied)
                } else {
                    let status = output
                        .status
                        .map_or_else(|| "signal".to_string(), |code| code.to_string());
                    Ok(ProbeStatus::unsatisfied(format!(
                        "guard `{check}` exited {status}"
                    )))
                }
            }
        }
    }
}

#[async_trait]
impl Executor for GuardedCommand {
    async fn apply(&self) -> Result<()> {
        run_checked(self.shell.as_ref(), &self.spec(&self.command)).await?;
        Ok(())
    }
}

impl Resource for GuardedCommand {
    fn describe(&self) -> String {
        match &self.guard {
            Guard::Creates(path) => format!("`{}` creates {}", self.command, path.display()),
            Guard::Unless(check) => format!("`{}` unless `{check}`", self.command),
        }
    }
}

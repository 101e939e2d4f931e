use crate::core::probe::{Executor, Probe, ProbeStatus, Resource};
use crate::process::{CommandSpec, HostShell, run_checked};
use anyhow::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// A systemd unit that must be running, and optionally enabled at boot.
pub struct Service {
    name: String,
    enabled: bool,
    daemon_reload: bool,
    shell: Arc<dyn HostShell>,
}

impl Service {
    pub fn new(name: impl Into<String>, shell: Arc<dyn HostShell>) -> Self {
        Self {
            name: name.into(),
            enabled: true,
            daemon_reload: false,
            shell,
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Reload unit files before starting, for units installed by earlier steps.
    pub fn daemon_reload(mut self, reload: bool) -> Self {
        self.daemon_reload = reload;
        self
    }

    fn systemctl(&self, verb: &str) -> CommandSpec {
        CommandSpec::new("systemctl").args([verb, self.name.as_str()])
    }
}

#[async_trait]
impl Probe for Service {
    async fn check(&self) -> Result<ProbeStatus> {
        let active = self.shell.run(&self.systemctl("is-active")).await?;
        if !active.success() {
            let state = active.text().trim();
            return Ok(ProbeStatus::unsatisfied(format!(
                "service {} is {}",
                self.name,
                if state.is_empty() { "not active" } else { state }
            )));
        }

        if self.enabled {
            let enabled = self.shell.run(&self.systemctl("is-enabled")).await?;
            if !enabled.success() {
                return Ok(ProbeStatus::unsatisfied(format!(
                    "service {} is not enabled ({})",
                    self.name,
                    enabled.text().trim()
                )));
            }
        }

        Ok(ProbeStatus::Satisfied)
    }
}

#[async_trait]
impl Executor for Service {
    async fn apply(&self) -> Result<()> {
        let shell = self.shell.as_ref();
        if self.daemon_reload {
            run_checked(shell, &CommandSpec::new("systemctl").arg("daemon-reload")).await?;
        }

        let start = if self.enabled {
            CommandSpec::new("systemctl").args(["enable", "--now", self.name.as_str()])
        } else {
            self.systemctl("start")
        };
        run_checked(shell, &start).await?;
        Ok(())
    }
}

impl Resource for Service {
    fn describe(&self) -> String {
        if self.enabled {
            format!("service {} running and enabled", self.name)
        } else {
            format!("service {} running", self.name)
        }
    }
}

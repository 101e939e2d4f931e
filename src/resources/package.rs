use crate::core::probe::{Executor, Probe, ProbeStatus, Resource};
use crate::process::{CommandSpec, HostShell, run_checked};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::Arc;

const INSTALLED: &str = "install ok installed";

/// One or more Debian packages that must be installed.
pub struct Package {
    names: Vec<String>,
    update_cache: bool,
    shell: Arc<dyn HostShell>,
}

impl Package {
    pub fn new<I, S>(names: I, shell: Arc<dyn HostShell>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            update_cache: false,
            shell,
        }
    }

    /// Run `apt-get update` before installing.
    pub fn update_cache(mut self, update: bool) -> Self {
        self.update_cache = update;
        self
    }

    async fn missing(&self) -> Result<Vec<&str>> {
        let query = CommandSpec::new("dpkg-query")
            .args(["-W", "-f=${Package} ${Status}\\n"])
            .args(self.names.iter().cloned());
        // Exit status is 1 when any package is unknown; stdout still lists the known ones.
        let output = self.shell.run(&query).await?;

        let installed = output
            .stdout
            .lines()
            .filter_map(|line| {
                let (name, status) = line.split_once(' ')?;
                (status.trim() == INSTALLED).then_some(name.split(':').next().unwrap_or(name))
            })
            .collect::<HashSet<_>>();

        Ok(self
            .names
            .iter()
            .map(String::as_str)
            .filter(|name| !installed.contains(name))
            .collect())
    }
}

#[async_trait]
impl Probe for Package {
    async fn check(&self) -> Result<ProbeStatus> {
        let missing = self.missing().await?;
        if missing.is_empty() {
            Ok(ProbeStatus::Satisfied)
        } else {
            Ok(ProbeStatus::unsatisfied(format!(
                "not installed: {}",
                missing.join(", ")
            )))
        }
    }
}

#[async_trait]
impl Executor for Package {
    async fn apply(&self) -> Result<()> {
        if self.update_cache {
            let update = CommandSpec::new("apt-get")
                .args(["update", "-q"])
                .env("DEBIAN_FRONTEND", "noninteractive");
            run_checked(self.shell.as_ref(), &update).await?;
        }

        let missing = self.missing().await?;
        if missing.is_empty() {
            return Ok(());
        }

        let install = CommandSpec::new("apt-get")
            .args(["install", "-y", "-q", "--no-install-recommends"])
            .args(missing)
            .env("DEBIAN_FRONTEND", "noninteractive");
        run_checked(self.shell.as_ref(), &install).await?;
        Ok(())
    }
}

impl Resource for Package {
    fn describe(&self) -> String {
        format!("package {} installed", self.names.join(" "))
    }
}

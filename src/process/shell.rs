use super::{CommandOutput, CommandSpec};
use anyhow::{Context, Result};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Maximum captured bytes per stream (1 MB).
pub const DEFAULT_MAX_OUTPUT_BYTES: usize = 1_048_576;

/// Environment variables passed through to child processes.
/// Everything else is cleared so provisioning commands see a predictable
/// environment regardless of how the engine was launched.
const SAFE_ENV_VARS: &[&str] = &[
    "PATH", "HOME", "TERM", "LANG", "LC_ALL", "LC_CTYPE", "USER", "SHELL",
];

/// The single seam through which resources reach external programs.
#[async_trait]
pub trait HostShell: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// Spawns real processes on the local host.
#[derive(Debug, Clone)]
pub struct SystemShell {
    max_output_bytes: usize,
}

impl SystemShell {
    pub fn new(max_output_bytes: usize) -> Self {
        Self {
            max_output_bytes: max_output_bytes.max(1),
        }
    }
}

impl Default for SystemShell {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_OUTPUT_BYTES)
    }
}

#[async_trait]
impl HostShell for SystemShell {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        let mut cmd = tokio::process::Command::new(&spec.program);
        cmd.args(&spec.args)
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        for var in SAFE_ENV_VARS {
            if let Ok(val) = std::env::var(var) {
                cmd.env(var, val);
            }
        }
        for (key, value) in &spec.env {
            cmd.env(key, value);
        }
        if let Some(dir) = &spec.cwd {
            cmd.current_dir(dir);
        }

        tracing::debug!(command = %spec, "spawning");
        let mut child = cmd
            .spawn()
            .with_context(|| format!("Failed to spawn `{spec}`"))?;
        let stdout = child.stdout.take().context("child stdout was not piped")?;
        let stderr = child.stderr.take().context("child stderr was not piped")?;

        let limit = self.max_output_bytes;
        let (stdout, stderr, status) = tokio::try_join!(
            read_capped(stdout, limit, "output"),
            read_capped(stderr, limit, "stderr"),
            async {
                child
                    .wait()
                    .await
                    .with_context(|| format!("Failed to wait for `{spec}`"))
            },
        )?;

        Ok(CommandOutput {
            status: status.code(),
            stdout,
            stderr,
        })
    }
}

/// Keeps at most `limit` bytes of `reader` and discards the rest, so the
/// child never blocks on a full pipe and memory stays bounded.
async fn read_capped<R>(mut reader: R, limit: usize, label: &str) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    (&mut reader)
        .take(u64::try_from(limit).unwrap_or(u64::MAX))
        .read_to_end(&mut kept)
        .await
        .with_context(|| format!("Failed to read child {label}"))?;
    let dropped = tokio::io::copy(&mut reader, &mut tokio::io::sink())
        .await
        .with_context(|| format!("Failed to drain child {label}"))?;

    let mut text = String::from_utf8_lossy(&kept).into_owned();
    if dropped > 0 {
        text.push_str(&format!("\n... [{label} truncated at {limit} bytes]"));
    }
    Ok(text)
}

/// Runs `spec` and fails unless it exits 0. Secrets registered on `spec` are
/// masked in the error.
pub async fn run_checked(shell: &dyn HostShell, spec: &CommandSpec) -> Result<CommandOutput> {
    let output = shell.run(spec).await?;
    if !output.success() {
        let status = output
            .status
            .map_or_else(|| "signal".to_string(), |code| code.to_string());
        anyhow::bail!(
            "Command failed (exit {status}): {spec}: {}",
            spec.redact(output.text().trim())
        );
    }
    Ok(output)
}

/// Runs `spec` and returns its text regardless of exit status.
pub async fn run_capture(shell: &dyn HostShell, spec: &CommandSpec) -> Result<String> {
    let output = shell.run(spec).await?;
    Ok(output.text().to_string())
}

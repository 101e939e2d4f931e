use crate::cli::{Commands, OutputFormat};
use crate::config::Config;
use crate::core::plan::Plan;
use crate::core::report::{FindingState, RunStatus, render_findings, render_text, to_json_string};
use crate::core::runner::Runner;
use crate::error::{ConvergeError, Result};
use crate::manifest::{ResourceContext, load_plan};
use crate::process::{HostShell, SystemShell};
use crate::ui::style;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Exit code for errors raised before any step ran.
pub const EXIT_CONFIGURATION: u8 = 4;
/// Exit code for everything else that escapes a command.
pub const EXIT_OTHER: u8 = 1;

/// Runs a parsed command against the real host, printing to stdout.
pub async fn dispatch(command: Commands, config: Config) -> Result<u8> {
    let shell: Arc<dyn HostShell> = Arc::new(SystemShell::new(config.shell.max_output_bytes));
    let mut stdout = std::io::stdout();
    execute(command, &config, shell, &mut stdout).await
}

/// Runs `command` with an explicit shell and output sink. Returns the
/// process exit code.
pub async fn execute(
    command: Commands,
    config: &Config,
    shell: Arc<dyn HostShell>,
    out: &mut dyn Write,
) -> Result<u8> {
    let ctx = ResourceContext {
        shell,
        postgres_user: config.shell.postgres_user.clone(),
    };

    match command {
        Commands::Apply {
            manifest,
            format,
            parallel,
            timeout,
        } => {
            let plan = load(&manifest, &ctx)?;
            let mut options = config.runner_options();
            if let Some(parallel) = parallel {
                options.max_parallel = usize::try_from(parallel).unwrap_or(usize::MAX);
            }
            if let Some(secs) = timeout {
                options.default_timeout = Duration::from_secs(secs);
            }

            info!(
                manifest = %manifest.display(),
                steps = plan.len(),
                max_parallel = options.max_parallel,
                "applying plan"
            );
            let report = Runner::new(options).run(&plan).await;

            match format {
                OutputFormat::Json => writeln!(out, "{}", to_json_string(&report))?,
                OutputFormat::Text => {
                    write!(out, "{}", render_text(&report))?;
                    let summary = report.summary();
                    let line = match report.status() {
                        RunStatus::FullySatisfied => style::success("host converged"),
                        RunStatus::PartialFailure => style::warn(format!(
                            "partial failure: {} step(s) failed",
                            summary.failed
                        )),
                        RunStatus::HaltedOnFatal => style::error(format!(
                            "halted on fatal failure: {} step(s) skipped",
                            summary.skipped
                        )),
                    };
                    writeln!(out, "{line}")?;
                }
            }
            Ok(report.status().exit_code())
        }

        Commands::Check { manifest } => {
            let plan = load(&manifest, &ctx)?;
            let findings = Runner::new(config.runner_options()).probe_all(&plan).await;
            write!(out, "{}", render_findings(&findings))?;

            let drifted = findings
                .iter()
                .any(|finding| !matches!(finding.state, FindingState::Satisfied));
            Ok(if drifted {
                RunStatus::PartialFailure.exit_code()
            } else {
                RunStatus::FullySatisfied.exit_code()
            })
        }

        Commands::Validate { manifest } => {
            let plan = load(&manifest, &ctx)?;
            write_order(&plan, out)?;
            Ok(RunStatus::FullySatisfied.exit_code())
        }
    }
}

fn load(manifest: &Path, ctx: &ResourceContext) -> Result<Plan> {
    load_plan(manifest, ctx).map_err(|source| ConvergeError::manifest(manifest, source))
}

fn write_order(plan: &Plan, out: &mut dyn Write) -> std::io::Result<()> {
    writeln!(
        out,
        "{}",
        style::success(format!("plan valid: {} step(s)", plan.len()))
    )?;
    for (position, step) in plan.execution_order().enumerate() {
        write!(out, "  {:>2}. {}", position + 1, step.id())?;
        if !step.dependencies().is_empty() {
            write!(
                out,
                "  {}",
                style::dim(format!("(requires: {})", step.dependencies().join(", ")))
            )?;
        }
        if step.is_fatal() {
            write!(out, "  {}", style::dim("[fatal]"))?;
        }
        writeln!(out)?;
    }
    Ok(())
}

/// Maps an error that escaped a command to its process exit code.
pub fn exit_code_for(err: &ConvergeError) -> u8 {
    if err.is_configuration() {
        EXIT_CONFIGURATION
    } else {
        EXIT_OTHER
    }
}

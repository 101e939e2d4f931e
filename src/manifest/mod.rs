//! TOML plan manifests.
//!
//! A manifest is parsed into [`Manifest`] and compiled into a validated
//! [`Plan`]. Every problem surfaces as a [`ManifestError`] before any step
//! runs.

pub mod schema;

pub use schema::{Manifest, ResourceSpec, StepSpec};

use crate::core::plan::{Plan, Step};
use crate::error::ManifestError;
use crate::process::HostShell;
use crate::resources::{
    Directory, EnvFile, File, Guard, GuardedCommand, Package, PgDatabase, PgRole, Psql, Service,
    Symlink,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// What compiled resources need from the host.
#[derive(Clone)]
pub struct ResourceContext {
    pub shell: Arc<dyn HostShell>,
    pub postgres_user: String,
}

impl Manifest {
    pub fn from_toml(text: &str) -> Result<Self, ManifestError> {
        let document: toml::Table = toml::from_str(text)?;
        schema::reject_unknown_keys(&document)?;
        Ok(toml::from_str(text)?)
    }

    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let text = std::fs::read_to_string(path).map_err(|source| ManifestError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    /// Builds the plan. Relative paths resolve against `base_dir`.
    pub fn compile(&self, base_dir: &Path, ctx: &ResourceContext) -> Result<Plan, ManifestError> {
        let steps = self
            .steps
            .iter()
            .map(|spec| compile_step(spec, base_dir, ctx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Plan::new(steps)?)
    }
}

/// Loads and compiles the manifest at `path`.
pub fn load_plan(path: &Path, ctx: &ResourceContext) -> Result<Plan, ManifestError> {
    let manifest = Manifest::load(path)?;
    let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
    let plan = manifest.compile(base_dir, ctx)?;
    tracing::debug!(manifest = %path.display(), steps = plan.len(), "compiled plan");
    Ok(plan)
}

fn compile_step(
    spec: &StepSpec,
    base_dir: &Path,
    ctx: &ResourceContext,
) -> Result<Step, ManifestError> {
    let invalid = |reason: String| ManifestError::InvalidStep {
        id: spec.id.clone(),
        reason,
    };

    let mut step = build_resource(&spec.id, &spec.resource, base_dir, ctx).map_err(invalid)?;

    if let Some(description) = &spec.description {
        step = step.with_description(description.clone());
    }
    if let Some(secs) = spec.timeout_secs {
        if secs == 0 {
            return Err(invalid("timeout_secs must be at least 1".into()));
        }
        step = step.with_timeout(Duration::from_secs(secs));
    }
    if spec.retries > 0 {
        step = step.with_retries(
            spec.retries.saturating_add(1),
            Duration::from_millis(spec.retry_backoff_ms),
        );
    }

    Ok(step.requires(spec.requires.iter().cloned()).fatal(spec.fatal))
}

fn build_resource(
    id: &str,
    resource: &ResourceSpec,
    base_dir: &Path,
    ctx: &ResourceContext,
) -> Result<Step, String> {
    let shell = Arc::clone(&ctx.shell);
    let step = match resource {
        ResourceSpec::Package {
            name,
            names,
            update_cache,
        } => {
            let all = name.iter().chain(names).cloned().collect::<Vec<_>>();
            if all.is_empty() {
                return Err("package needs `name` or `names`".into());
            }
            Step::from_resource(id, Package::new(all, shell).update_cache(*update_cache))
        }
        ResourceSpec::Service {
            name,
            enabled,
            daemon_reload,
        } => Step::from_resource(
            id,
            Service::new(name, shell)
                .enabled(*enabled)
                .daemon_reload(*daemon_reload),
        ),
        ResourceSpec::File {
            path,
            content,
            source,
            mode,
        } => {
            let bytes = match (content, source) {
                (Some(text), None) => text.clone().into_bytes(),
                (None, Some(source)) => {
                    let source = resolve(base_dir, source);
                    std::fs::read(&source)
                        .map_err(|e| format!("cannot read source {}: {e}", source.display()))?
                }
                _ => return Err("file needs exactly one of `content` or `source`".into()),
            };
            let mut file = File::new(resolve(base_dir, path), bytes);
            if let Some(mode) = mode {
                file = file.mode(parse_mode(mode)?);
            }
            Step::from_resource(id, file)
        }
        ResourceSpec::Directory { path, mode } => {
            let mut dir = Directory::new(resolve(base_dir, path));
            if let Some(mode) = mode {
                dir = dir.mode(parse_mode(mode)?);
            }
            Step::from_resource(id, dir)
        }
        ResourceSpec::Symlink { path, target } => Step::from_resource(
            id,
            Symlink::new(resolve(base_dir, path), expand(target)),
        ),
        ResourceSpec::EnvFile { path, vars, mode } => {
            let mut env = EnvFile::new(resolve(base_dir, path), vars).map_err(|e| e.to_string())?;
            if let Some(mode) = mode {
                env = env.mode(parse_mode(mode)?);
            }
            Step::from_resource(id, env)
        }
        ResourceSpec::PgRole { name, password } => {
            let mut role = PgRole::new(name, Psql::new(&ctx.postgres_user, shell));
            if let Some(password) = password {
                role = role.password(password);
            }
            Step::from_resource(id, role)
        }
        ResourceSpec::PgDatabase { name, owner } => {
            let mut db = PgDatabase::new(name, Psql::new(&ctx.postgres_user, shell));
            if let Some(owner) = owner {
                db = db.owner(owner);
            }
            Step::from_resource(id, db)
        }
        ResourceSpec::Command {
            command,
            unless,
            creates,
            cwd,
            env,
        } => {
            let guard = match (unless, creates) {
                (Some(check), None) => Guard::Unless(check.clone()),
                (None, Some(path)) => Guard::Creates(resolve(base_dir, path)),
                (None, None) => {
                    return Err("command needs an `unless` or `creates` guard".into());
                }
                (Some(_), Some(_)) => {
                    return Err("command takes only one of `unless` or `creates`".into());
                }
            };
            let mut cmd = GuardedCommand::new(command, guard, shell);
            if let Some(dir) = cwd {
                cmd = cmd.current_dir(resolve(base_dir, dir));
            }
            for (key, value) in env {
                cmd = cmd.env(key, value);
            }
            Step::from_resource(id, cmd)
        }
    };
    Ok(step)
}

fn expand(raw: &str) -> PathBuf {
    PathBuf::from(shellexpand::tilde(raw).into_owned())
}

/// `~` expanded, then joined onto `base_dir` when still relative.
fn resolve(base_dir: &Path, raw: &str) -> PathBuf {
    let path = expand(raw);
    if path.is_relative() {
        base_dir.join(path)
    } else {
        path
    }
}

fn parse_mode(raw: &str) -> Result<u32, String> {
    let digits = raw.trim().trim_start_matches("0o");
    u32::from_str_radix(digits, 8)
        .ok()
        .filter(|mode| *mode <= 0o7777)
        .ok_or_else(|| format!("invalid mode {raw:?}, expected octal like \"0644\""))
}

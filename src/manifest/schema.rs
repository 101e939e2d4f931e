use crate::error::ManifestError;
use serde::Deserialize;
use std::collections::BTreeMap;

/// Keys every `[[step]]` accepts regardless of kind.
const STEP_KEYS: &[&str] = &[
    "id",
    "description",
    "requires",
    "fatal",
    "timeout_secs",
    "retries",
    "retry_backoff_ms",
    "kind",
];

fn default_true() -> bool {
    true
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

/// Top-level TOML document: a list of `[[step]]` tables.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Manifest {
    #[serde(default, rename = "step")]
    pub steps: Vec<StepSpec>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StepSpec {
    pub id: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub requires: Vec<String>,
    #[serde(default)]
    pub fatal: bool,
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Extra apply attempts after the first failure.
    #[serde(default)]
    pub retries: u32,
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,
    #[serde(flatten)]
    pub resource: ResourceSpec,
}

/// One variant per resource kind, selected by the step's `kind` key.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResourceSpec {
    Package {
        #[serde(default)]
        name: Option<String>,
        #[serde(default)]
        names: Vec<String>,
        #[serde(default)]
        update_cache: bool,
    },
    Service {
        name: String,
        #[serde(default = "default_true")]
        enabled: bool,
        #[serde(default)]
        daemon_reload: bool,
    },
    File {
        path: String,
        #[serde(default)]
        content: Option<String>,
        /// Read from disk when the manifest is compiled.
        #[serde(default)]
        source: Option<String>,
        /// Octal, e.g. `"0644"`.
        #[serde(default)]
        mode: Option<String>,
    },
    Directory {
        path: String,
        #[serde(default)]
        mode: Option<String>,
    },
    Symlink {
        path: String,
        target: String,
    },
    EnvFile {
        path: String,
        #[serde(default)]
        vars: BTreeMap<String, String>,
        /// Defaults to `"0600"`.
        #[serde(default)]
        mode: Option<String>,
    },
    PgRole {
        name: String,
        #[serde(default)]
        password: Option<String>,
    },
    PgDatabase {
        name: String,
        #[serde(default)]
        owner: Option<String>,
    },
    Command {
        command: String,
        #[serde(default)]
        unless: Option<String>,
        #[serde(default)]
        creates: Option<String>,
        #[serde(default)]
        cwd: Option<String>,
        #[serde(default)]
        env: BTreeMap<String, String>,
    },
}

impl ResourceSpec {
    /// Keys accepted by `kind` on top of the common step keys, or `None` for
    /// an unknown kind.
    pub fn keys_for(kind: &str) -> Option<&'static [&'static str]> {
        let keys: &'static [&'static str] = match kind {
            "package" => &["name", "names", "update_cache"],
            "service" => &["name", "enabled", "daemon_reload"],
            "file" => &["path", "content", "source", "mode"],
            "directory" => &["path", "mode"],
            "symlink" => &["path", "target"],
            "env_file" => &["path", "vars", "mode"],
            "pg_role" => &["name", "password"],
            "pg_database" => &["name", "owner"],
            "command" => &["command", "unless", "creates", "cwd", "env"],
            _ => return None,
        };
        Some(keys)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::Package { .. } => "package",
            Self::Service { .. } => "service",
            Self::File { .. } => "file",
            Self::Directory { .. } => "directory",
            Self::Symlink { .. } => "symlink",
            Self::EnvFile { .. } => "env_file",
            Self::PgRole { .. } => "pg_role",
            Self::PgDatabase { .. } => "pg_database",
            Self::Command { .. } => "command",
        }
    }
}

/// Rejects keys serde would otherwise drop, such as a misspelt `requires`.
///
/// Steps with a missing or unknown `kind` are left to the typed parse, which
/// reports them with position information.
pub(crate) fn reject_unknown_keys(document: &toml::Table) -> Result<(), ManifestError> {
    if let Some(key) = document.keys().find(|key| key.as_str() != "step") {
        return Err(ManifestError::UnknownSection(key.clone()));
    }
    let Some(toml::Value::Array(steps)) = document.get("step") else {
        return Ok(());
    };

    for (position, step) in steps.iter().enumerate() {
        let toml::Value::Table(table) = step else {
            continue;
        };
        let Some(kind) = table.get("kind").and_then(toml::Value::as_str) else {
            continue;
        };
        let Some(kind_keys) = ResourceSpec::keys_for(kind) else {
            continue;
        };

        let unknown = table
            .keys()
            .find(|key| !STEP_KEYS.contains(&key.as_str()) && !kind_keys.contains(&key.as_str()));
        if let Some(key) = unknown {
            let id = table
                .get("id")
                .and_then(toml::Value::as_str)
                .map_or_else(|| format!("#{}", position + 1), str::to_string);
            return Err(ManifestError::InvalidStep {
                id,
                reason: format!("unknown key `{key}` for kind {kind}"),
            });
        }
    }
    Ok(())
}

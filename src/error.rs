use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

// ─── Top-level error hierarchy ───────────────────────────────────────────────

/// Structured error hierarchy for `hostconverge`.
///
/// Configuration-class errors (`Config`, `Plan`, `Manifest`) are raised before
/// any step touches the host. Per-step failures never surface here; they are
/// recorded as [`StepError`] inside the run report.
#[derive(Debug, Error)]
pub enum ConvergeError {
    // ── Runner config ───────────────────────────────────────────────────
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    // ── Plan graph ──────────────────────────────────────────────────────
    #[error("plan: {0}")]
    Plan(#[from] PlanError),

    // ── Manifest ────────────────────────────────────────────────────────
    #[error("invalid manifest {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: ManifestError,
    },

    // ── Report sink ─────────────────────────────────────────────────────
    #[error("failed to write output: {0}")]
    Output(#[from] std::io::Error),

    // ── Generic fallthrough (wraps anyhow for interop) ──────────────────
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConvergeError {
    pub fn manifest(path: impl Into<PathBuf>, source: ManifestError) -> Self {
        Self::Manifest {
            path: path.into(),
            source,
        }
    }

    /// True for every error detected before execution starts.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_) | Self::Plan(_) | Self::Manifest { .. }
        )
    }
}

// ─── Config errors ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config {path}: {message}")]
    Load { path: PathBuf, message: String },

    #[error("validation failed: {0}")]
    Validation(String),
}

// ─── Plan errors (configuration errors on the dependency graph) ─────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    #[error("step id cannot be empty")]
    EmptyId,

    #[error("duplicate step id: {0}")]
    DuplicateId(String),

    #[error("step {step} requires unknown step {dependency} (known steps: [{known}])")]
    UnknownDependency {
        step: String,
        dependency: String,
        known: String,
    },

    #[error("step {step} requires {dependency}, which is declared after it")]
    ForwardDependency { step: String, dependency: String },

    #[error("step {step} lists dependency {dependency} more than once")]
    DuplicateDependency { step: String, dependency: String },

    #[error("cycle detected: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

// ─── Manifest errors ─────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("unknown top-level key `{0}`; a manifest holds only [[step]] tables")]
    UnknownSection(String),

    #[error("step {id}: {reason}")]
    InvalidStep { id: String, reason: String },

    #[error(transparent)]
    Plan(#[from] PlanError),
}

// ─── Step errors (recorded per step, never propagated) ──────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum StepError {
    #[error("execution failed: {0}")]
    Execution(String),

    #[error("post-condition not met: {0}")]
    PostCondition(String),

    #[error("probe failed: {0}")]
    Probe(String),

    #[error("timeout")]
    Timeout,
}

// ─── Convenience re-exports ─────────────────────────────────────────────────

/// Shorthand result type for the crate.
pub type Result<T> = std::result::Result<T, ConvergeError>;

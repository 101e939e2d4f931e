mod format;

pub use format::{render_findings, render_json, render_text, to_json_string};

use crate::error::StepError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Result of converging a single step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Outcome {
    AlreadySatisfied,
    Converged,
    Failed(StepError),
    SkippedDueToDependency,
}

impl Outcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// Dependents of a step with this outcome must not run.
    pub fn blocks_dependents(&self) -> bool {
        matches!(self, Self::Failed(_) | Self::SkippedDueToDependency)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RunStatus {
    FullySatisfied,
    PartialFailure,
    HaltedOnFatal,
}

impl RunStatus {
    pub fn exit_code(self) -> u8 {
        match self {
            Self::FullySatisfied => 0,
            Self::PartialFailure => 2,
            Self::HaltedOnFatal => 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepReport {
    pub id: String,
    pub description: String,
    pub outcome: Outcome,
    pub elapsed_ms: u64,
}

/// Immutable record of one run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    run_id: String,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    status: RunStatus,
    steps: Vec<StepReport>,
}

impl Report {
    pub(crate) fn new(
        started_at: DateTime<Utc>,
        steps: Vec<StepReport>,
        halted: bool,
    ) -> Self {
        let status = if halted {
            RunStatus::HaltedOnFatal
        } else if steps.iter().any(|step| step.outcome.is_failed()) {
            RunStatus::PartialFailure
        } else {
            RunStatus::FullySatisfied
        };

        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at,
            finished_at: Utc::now(),
            status,
            steps,
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn steps(&self) -> &[StepReport] {
        &self.steps
    }

    pub fn outcome(&self, id: &str) -> Option<&Outcome> {
        self.steps
            .iter()
            .find(|step| step.id == id)
            .map(|step| &step.outcome)
    }

    /// `(id, outcome)` pairs in report order.
    pub fn outcomes(&self) -> Vec<(&str, &Outcome)> {
        self.steps
            .iter()
            .map(|step| (step.id.as_str(), &step.outcome))
            .collect()
    }

    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for step in &self.steps {
            match step.outcome {
                Outcome::AlreadySatisfied => summary.already_satisfied += 1,
                Outcome::Converged => summary.converged += 1,
                Outcome::Failed(_) => summary.failed += 1,
                Outcome::SkippedDueToDependency => summary.skipped += 1,
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Summary {
    pub already_satisfied: usize,
    pub converged: usize,
    pub failed: usize,
    pub skipped: usize,
}

/// Probe-only observation of a step, produced by drift checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Finding {
    pub id: String,
    pub description: String,
    #[serde(flatten)]
    pub state: FindingState,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum FindingState {
    Satisfied,
    Unsatisfied(String),
    Error(String),
}

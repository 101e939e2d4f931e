use crate::core::plan::{Plan, Step};
use crate::core::probe::{Executor, Probe, ProbeStatus};
use crate::core::report::{Finding, FindingState, Outcome, Report, StepReport};
use crate::error::{PlanError, StepError};
use chrono::Utc;
use futures_util::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunnerOptions {
    /// Upper bound on steps in flight at once. `1` is strictly sequential.
    pub max_parallel: usize,
    /// Timeout applied to a step that has no override of its own.
    pub default_timeout: Duration,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            max_parallel: 1,
            default_timeout: Duration::from_secs(DEFAULT_STEP_TIMEOUT_SECS),
        }
    }
}

/// Converges a plan against the live host.
#[derive(Debug, Clone, Default)]
pub struct Runner {
    options: RunnerOptions,
}

impl Runner {
    pub fn new(options: RunnerOptions) -> Self {
        Self {
            options: RunnerOptions {
                max_parallel: options.max_parallel.max(1),
                ..options
            },
        }
    }

    pub fn options(&self) -> RunnerOptions {
        self.options
    }

    /// Validates `steps` into a plan and runs it. Nothing executes when the
    /// plan is rejected.
    pub async fn converge(&self, steps: Vec<Step>) -> Result<Report, PlanError> {
        let plan = Plan::new(steps)?;
        Ok(self.run(&plan).await)
    }

    /// Walks the plan in dependency order and records exactly one outcome per
    /// step.
    ///
    /// This loop is the only writer of outcomes. Steps are spawned once all of
    /// their dependencies have an outcome; a failed fatal step cancels the
    /// halt token so no further step starts, while steps already in flight are
    /// allowed to finish.
    pub async fn run(&self, plan: &Plan) -> Report {
        let started_at = Utc::now();
        let steps = plan.steps();
        let halt = CancellationToken::new();

        let mut outcomes: Vec<Option<Outcome>> = vec![None; steps.len()];
        let mut entries = Vec::with_capacity(steps.len());
        let mut pending = plan.order().to_vec();
        let mut in_flight = JoinSet::new();

        info!(
            steps = steps.len(),
            max_parallel = self.options.max_parallel,
            "converging plan"
        );

        loop {
            if !halt.is_cancelled() {
                let mut cursor = 0;
                while cursor < pending.len() && in_flight.len() < self.options.max_parallel {
                    let index = pending[cursor];
                    let deps = plan.dependency_indices(index);

                    if deps.iter().any(|&dep| outcomes[dep].is_none()) {
                        cursor += 1;
                        continue;
                    }
                    pending.remove(cursor);

                    let step = &steps[index];
                    if let Some(&blocker) = deps.iter().find(|&&dep| {
                        outcomes[dep]
                            .as_ref()
                            .is_some_and(Outcome::blocks_dependents)
                    }) {
                        info!(
                            step = step.id(),
                            blocked_by = steps[blocker].id(),
                            "skipping step, dependency not met"
                        );
                        record(
                            &mut outcomes,
                            &mut entries,
                            step,
                            index,
                            Outcome::SkippedDueToDependency,
                            Duration::ZERO,
                        );
                        continue;
                    }

                    let timeout = step.timeout().unwrap_or(self.options.default_timeout);
                    let probe = step.probe();
                    let executor = step.executor();
                    let token = halt.clone();
                    let id = step.id().to_string();
                    in_flight.spawn(async move {
                        let started = Instant::now();
                        if token.is_cancelled() {
                            return (index, Outcome::SkippedDueToDependency, Duration::ZERO);
                        }
                        let outcome = AssertUnwindSafe(run_step(&id, probe, executor, timeout))
                            .catch_unwind()
                            .await
                            .unwrap_or_else(|_| {
                                Outcome::Failed(StepError::Execution("step panicked".into()))
                            });
                        (index, outcome, started.elapsed())
                    });
                }
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };

            let (index, outcome, elapsed) = match joined {
                Ok(done) => done,
                Err(join_error) => {
                    warn!("step task did not complete: {join_error}");
                    continue;
                }
            };

            let step = &steps[index];
            if outcome.is_failed() && step.is_fatal() && !halt.is_cancelled() {
                warn!(step = step.id(), "fatal step failed, halting run");
                halt.cancel();
            }
            record(&mut outcomes, &mut entries, step, index, outcome, elapsed);
        }

        for &index in plan.order() {
            if outcomes[index].is_some() {
                continue;
            }
            let outcome = if pending.contains(&index) {
                Outcome::SkippedDueToDependency
            } else {
                Outcome::Failed(StepError::Execution("step task aborted".into()))
            };
            record(
                &mut outcomes,
                &mut entries,
                &steps[index],
                index,
                outcome,
                Duration::ZERO,
            );
        }

        let report = Report::new(started_at, entries, halt.is_cancelled());
        info!(
            run_id = report.run_id(),
            status = %report.status(),
            "run finished"
        );
        report
    }

    /// Probes every step without executing anything. Dependencies are not
    /// enforced: each probe reports the state of the host as it is now.
    pub async fn probe_all(&self, plan: &Plan) -> Vec<Finding> {
        let mut findings = Vec::with_capacity(plan.len());

        for step in plan.execution_order() {
            let timeout = step.timeout().unwrap_or(self.options.default_timeout);
            let probe = step.probe();
            let state = match tokio::time::timeout(timeout, probe.check()).await {
                Ok(Ok(ProbeStatus::Satisfied)) => FindingState::Satisfied,
                Ok(Ok(ProbeStatus::Unsatisfied(detail))) => FindingState::Unsatisfied(detail),
                Ok(Err(e)) => FindingState::Error(format!("{e:#}")),
                Err(_) => FindingState::Error("timeout".to_string()),
            };
            debug!(step = step.id(), ?state, "probed");
            findings.push(Finding {
                id: step.id().to_string(),
                description: step.description().to_string(),
                state,
            });
        }

        findings
    }
}

fn record(
    outcomes: &mut [Option<Outcome>],
    entries: &mut Vec<StepReport>,
    step: &Step,
    index: usize,
    outcome: Outcome,
    elapsed: Duration,
) {
    let elapsed_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    match &outcome {
        Outcome::Failed(reason) => warn!(step = step.id(), elapsed_ms, "failed: {reason}"),
        other => info!(step = step.id(), elapsed_ms, outcome = %other, "step finished"),
    }

    outcomes[index] = Some(outcome.clone());
    entries.push(StepReport {
        id: step.id().to_string(),
        description: step.description().to_string(),
        outcome,
        elapsed_ms,
    });
}

async fn run_step(
    id: &str,
    probe: Arc<dyn Probe>,
    executor: Arc<dyn Executor>,
    timeout: Duration,
) -> Outcome {
    match tokio::time::timeout(timeout, converge_step(id, probe.as_ref(), executor.as_ref())).await
    {
        Ok(outcome) => outcome,
        Err(_) => Outcome::Failed(StepError::Timeout),
    }
}

/// Probe, apply when unsatisfied, then probe once more to confirm.
async fn converge_step(id: &str, probe: &dyn Probe, executor: &dyn Executor) -> Outcome {
    let detail = match probe.check().await {
        Ok(ProbeStatus::Satisfied) => return Outcome::AlreadySatisfied,
        Ok(ProbeStatus::Unsatisfied(detail)) => detail,
        Err(e) => return Outcome::Failed(StepError::Probe(format!("{e:#}"))),
    };

    debug!(step = id, %detail, "unsatisfied, applying");
    if let Err(e) = executor.apply().await {
        return Outcome::Failed(StepError::Execution(format!("{e:#}")));
    }

    match probe.check().await {
        Ok(ProbeStatus::Satisfied) => Outcome::Converged,
        Ok(ProbeStatus::Unsatisfied(detail)) => Outcome::Failed(StepError::PostCondition(detail)),
        Err(e) => Outcome::Failed(StepError::Probe(format!("{e:#}"))),
    }
}

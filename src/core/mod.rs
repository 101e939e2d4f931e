//! The engine: steps and their probes, the validated plan, the runner that
//! converges it, and the report it produces.

pub mod plan;
pub mod probe;
pub mod report;
pub mod runner;

pub use plan::{Plan, Step};
pub use probe::{Executor, Probe, ProbeStatus, Resource, Retry, executor_fn, probe_fn};
pub use report::{Finding, FindingState, Outcome, Report, RunStatus, StepReport, Summary};
pub use runner::{DEFAULT_STEP_TIMEOUT_SECS, Runner, RunnerOptions};

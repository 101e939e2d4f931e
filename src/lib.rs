#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    clippy::struct_field_names,
    clippy::must_use_candidate,
    clippy::new_without_default,
    clippy::return_self_not_must_use
)]

pub mod app;
pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod manifest;
pub mod process;
pub mod resources;
pub mod ui;

pub use config::Config;
pub use core::{Outcome, Plan, Report, RunStatus, Runner, RunnerOptions, Step};
pub use error::{ConfigError, ConvergeError, ManifestError, PlanError, StepError};

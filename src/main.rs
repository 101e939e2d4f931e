#![warn(clippy::all, clippy::pedantic)]

use clap::Parser;
use hostconverge::app::{dispatch, exit_code_for};
use hostconverge::cli::Cli;
use hostconverge::config::Config;
use hostconverge::error::ConvergeError;
use hostconverge::ui::style;
use std::process::ExitCode;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return fail(&ConvergeError::from(e)),
    };

    // Logs go to stderr; stdout carries the report.
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        config.log_level()
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Warning: failed to install log subscriber: {e}");
    }

    match dispatch(cli.command, config).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => fail(&e),
    }
}

fn fail(err: &ConvergeError) -> ExitCode {
    eprintln!("{} {err}", style::error("error:"));
    ExitCode::from(exit_code_for(err))
}

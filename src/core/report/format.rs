use super::{Finding, FindingState, Outcome, Report};
use std::fmt::Write;

const MAX_DETAIL_CHARS: usize = 160;

/// One line per step plus a header and a summary line. No colour, no I/O.
pub fn render_text(report: &Report) -> String {
    let width = report
        .steps()
        .iter()
        .map(|step| step.id.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    let _ = writeln!(out, "run {} ({})", report.run_id(), report.status());

    for step in report.steps() {
        let (marker, label) = outcome_label(&step.outcome);
        let _ = write!(out, "  {marker} {:<width$}  {label}", step.id);
        if matches!(step.outcome, Outcome::Converged | Outcome::Failed(_)) {
            let _ = write!(out, " ({}ms)", step.elapsed_ms);
        }
        if step.description != step.id {
            let _ = write!(out, "  # {}", step.description);
        }
        out.push('\n');
    }

    let summary = report.summary();
    let _ = writeln!(
        out,
        "{} already satisfied, {} converged, {} failed, {} skipped",
        summary.already_satisfied, summary.converged, summary.failed, summary.skipped
    );
    out
}

/// Structured form for machine consumption.
pub fn render_json(report: &Report) -> serde_json::Value {
    let mut value = serde_json::to_value(report).unwrap_or(serde_json::Value::Null);
    if let Some(map) = value.as_object_mut() {
        if let Ok(summary) = serde_json::to_value(report.summary()) {
            map.insert("summary".into(), summary);
        }
    }
    value
}

pub fn to_json_string(report: &Report) -> String {
    serde_json::to_string_pretty(&render_json(report)).unwrap_or_else(|_| "{}".to_string())
}

/// Drift listing produced by probe-only checks.
pub fn render_findings(findings: &[Finding]) -> String {
    let width = findings
        .iter()
        .map(|finding| finding.id.len())
        .max()
        .unwrap_or(0);

    let mut out = String::new();
    let mut drifted = 0_usize;
    for finding in findings {
        let (marker, label) = match &finding.state {
            FindingState::Satisfied => ("ok", "satisfied".to_string()),
            FindingState::Unsatisfied(detail) => {
                drifted += 1;
                ("~~", format!("would change: {}", truncate(detail)))
            }
            FindingState::Error(detail) => {
                drifted += 1;
                ("!!", format!("probe error: {}", truncate(detail)))
            }
        };
        let _ = writeln!(out, "  {marker} {:<width$}  {label}", finding.id);
    }
    let _ = writeln!(out, "{drifted} of {} step(s) not satisfied", findings.len());
    out
}

fn outcome_label(outcome: &Outcome) -> (&'static str, String) {
    match outcome {
        Outcome::AlreadySatisfied => ("ok", "already satisfied".to_string()),
        Outcome::Converged => ("++", "converged".to_string()),
        Outcome::Failed(reason) => ("!!", format!("failed: {}", truncate(&reason.to_string()))),
        Outcome::SkippedDueToDependency => ("--", "skipped (dependency not met)".to_string()),
    }
}

fn truncate(s: &str) -> String {
    let first_line = s.lines().next().unwrap_or("");
    match first_line.char_indices().nth(MAX_DETAIL_CHARS) {
        Some((idx, _)) => format!("{}...", first_line[..idx].trim_end()),
        None => first_line.to_string(),
    }
}

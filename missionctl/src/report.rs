//! Human-readable mission report.

use anyhow::Result;
use minijinja::{Environment, context};
use serde::Serialize;
use serde_json::Value;

use crate::core::plan::StepSpec;
use crate::core::types::{MissionReport, Step, StepStatus};

const REPORT_TEMPLATE: &str = include_str!("../templates/report.txt");

/// One rendered step line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportLine {
    pub marker: &'static str,
    pub name: String,
    pub summary: Option<String>,
}

/// Only `done` gets the quiet marker; everything else stands out.
pub fn marker(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Done => "[ok]",
        StepStatus::Skipped => "[SKIPPED]",
        StepStatus::Failed => "[FAILED]",
        StepStatus::Pending => "[PENDING]",
    }
}

/// Lines in declared order, followed by any recorded step the plan does not name.
pub fn report_lines(plan: &[StepSpec], report: &MissionReport) -> Vec<ReportLine> {
    let mut lines: Vec<ReportLine> = plan
        .iter()
        .map(|spec| line_for(&spec.name, report.steps.get(&spec.name)))
        .collect();
    for (name, step) in &report.steps {
        if !plan.iter().any(|spec| &spec.name == name) {
            lines.push(line_for(name, Some(step)));
        }
    }
    lines
}

fn line_for(name: &str, step: Option<&Step>) -> ReportLine {
    let Some(step) = step else {
        return ReportLine {
            marker: marker(StepStatus::Pending),
            name: name.to_string(),
            summary: Some("not run".to_string()),
        };
    };
    let summary = match step.status {
        StepStatus::Done => match &step.output {
            Value::Object(map) if !map.is_empty() => Some(format!(
                "keys: {}",
                map.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
            )),
            _ => None,
        },
        StepStatus::Failed => match &step.output {
            Value::String(message) => Some(message.clone()),
            Value::Null => None,
            other => Some(other.to_string()),
        },
        StepStatus::Skipped => step
            .output
            .get("note")
            .and_then(Value::as_str)
            .map(str::to_string),
        StepStatus::Pending => None,
    };
    ReportLine {
        marker: marker(step.status),
        name: name.to_string(),
        summary,
    }
}

/// Render the text report. `error` is the terminal error of an aborted run.
pub fn render_text(
    plan: &[StepSpec],
    report: &MissionReport,
    error: Option<&str>,
) -> Result<String> {
    let mut env = Environment::new();
    env.add_template("report", REPORT_TEMPLATE)?;
    let rendered = env.get_template("report")?.render(context! {
        mission_id => &report.mission_id,
        target => report.target.as_deref(),
        status => report.status.as_str(),
        lines => report_lines(plan, report),
        error => error,
    })?;
    Ok(rendered)
}

use std::fmt::Write as _;

use action_flow::StepStatus;
use agent_core::StructuredTask;
use anyhow::Result;
use clap::ValueEnum;
use serde::Serialize;

use crate::orchestrator::{ExecutionResult, ExecutionStatus};

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Human,
    Json,
    Yaml,
}

/// One line of `taskpilot providers`.
#[derive(Debug, Clone, Serialize)]
pub struct ProviderRow {
    pub name: String,
    pub intents: Vec<String>,
    pub available: bool,
    pub missing_credentials: Vec<String>,
    pub default: bool,
}

fn structured<T: Serialize>(value: &T, format: OutputFormat) -> Result<Option<String>> {
    Ok(match format {
        OutputFormat::Human => None,
        OutputFormat::Json => Some(serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => Some(serde_yaml::to_string(value)?),
    })
}

fn status_label(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Succeeded => "succeeded",
        ExecutionStatus::PartiallyFailed => "partially failed",
        ExecutionStatus::Failed => "failed",
    }
}

fn step_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Completed => "completed",
        StepStatus::AlreadyCompleted => "already completed",
        StepStatus::Skipped => "skipped",
    }
}

pub fn render_result(result: &ExecutionResult, format: OutputFormat) -> Result<String> {
    if let Some(text) = structured(result, format)? {
        return Ok(text);
    }

    let mut out = String::new();
    writeln!(
        out,
        "Task {}: {} ({}, {} ms)",
        result.task_id,
        status_label(result.status),
        result.provider.as_deref().unwrap_or("no provider"),
        result.latency_ms
    )?;
    writeln!(out, "  {}", result.message)?;
    if let Some(kind) = result.error_kind {
        writeln!(out, "  Error kind: {kind}")?;
    }
    if !result.steps.is_empty() {
        writeln!(
            out,
            "  Steps ({} of {} planned):",
            result.steps.len(),
            result.steps_planned
        )?;
        for step in &result.steps {
            write!(
                out,
                "    {:<8} {:<16} {:<18} attempts={}",
                step.step_id,
                step.label,
                step_label(step.status),
                step.attempts
            )?;
            if let Some(selector) = &step.selector {
                write!(out, "  [{selector}]")?;
            }
            out.push('\n');
        }
    }
    if let Some(artifacts) = &result.artifacts {
        writeln!(out, "  Artifacts:")?;
        if let Some(path) = &artifacts.screenshot {
            writeln!(out, "    screenshot: {}", path.display())?;
        }
        if let Some(path) = &artifacts.dom_snapshot {
            writeln!(out, "    dom snapshot: {}", path.display())?;
        }
    }
    Ok(out)
}

pub fn render_task(task: &StructuredTask, format: OutputFormat) -> Result<String> {
    if let Some(text) = structured(task, format)? {
        return Ok(text);
    }

    let mut out = String::new();
    writeln!(out, "Intent:     {}", task.intent())?;
    writeln!(out, "Provider:   {}", task.provider_hint().unwrap_or("auto"))?;
    writeln!(out, "Recipients: {}", task.recipients().join(", "))?;
    writeln!(out, "Subject:    {}", task.subject())?;
    writeln!(out, "Body:       {}", task.body())?;
    writeln!(
        out,
        "Source:     {} (confidence {:.2})",
        task.source(),
        task.confidence()
    )?;
    Ok(out)
}

pub fn render_providers(rows: &[ProviderRow], format: OutputFormat) -> Result<String> {
    if let Some(text) = structured(&rows, format)? {
        return Ok(text);
    }

    let mut out = String::new();
    for row in rows {
        let marker = if row.default { " (default)" } else { "" };
        let state = if row.available {
            "ready".to_string()
        } else {
            format!("missing {}", row.missing_credentials.join(", "))
        };
        writeln!(
            out,
            "{}{marker}: {} [{}]",
            row.name,
            row.intents.join(", "),
            state
        )?;
    }
    if rows.is_empty() {
        out.push_str("No providers registered\n");
    }
    Ok(out)
}

//! Output formatting for CLI commands.
//!
//! This module provides formatting utilities for displaying plans, reports,
//! and state to the user in text or JSON form.

use colored::Colorize;
use serde::Serialize;
use std::fmt::Write;
use tabled::{Table, Tabled};

use crate::planner::{ActionOutcome, ActionType, ExecutionReport, Plan};
use crate::state::DeployedState;

use super::commands::OutputFormat;

/// Output formatter for CLI.
#[derive(Debug)]
pub struct OutputFormatter {
    /// Output format.
    format: OutputFormat,
}

/// Plan action row for table display.
#[derive(Tabled)]
struct PlanActionRow {
    #[tabled(rename = "#")]
    index: usize,
    #[tabled(rename = "Action")]
    action: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

/// State record row for table display.
#[derive(Tabled)]
struct RecordRow {
    #[tabled(rename = "Resource")]
    resource: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Seq")]
    seq: u64,
    #[tabled(rename = "Fingerprint")]
    fingerprint: String,
    #[tabled(rename = "Updated")]
    updated: String,
}

/// JSON shape for execution reports.
#[derive(Serialize)]
struct ReportJson {
    applied: usize,
    skipped: usize,
    failed: usize,
    success: bool,
    halt: Option<String>,
    results: Vec<ReportResultJson>,
}

/// JSON shape for a single action result.
#[derive(Serialize)]
struct ReportResultJson {
    resource: String,
    action: ActionType,
    outcome: &'static str,
    error: Option<String>,
}

impl OutputFormatter {
    /// Creates a new output formatter.
    #[must_use]
    pub const fn new(format: OutputFormat) -> Self {
        Self { format }
    }

    /// Formats a reconciliation plan for display.
    #[must_use]
    pub fn format_plan(&self, plan: &Plan) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(plan).unwrap_or_default(),
            OutputFormat::Text => Self::format_plan_text(plan),
        }
    }

    /// Formats a plan as text.
    fn format_plan_text(plan: &Plan) -> String {
        if plan.is_unchanged() {
            return format!(
                "{} No changes required - infrastructure is up to date.\n",
                "OK".green()
            );
        }

        let mut output = String::new();

        let title = if plan.destroy {
            "Teardown Plan"
        } else {
            "Reconciliation Plan"
        };
        let _ = write!(output, "\n{title}\n");
        let _ = write!(
            output,
            "   Config hash: {}\n\n",
            &plan.config_hash[..8.min(plan.config_hash.len())]
        );

        let rows: Vec<PlanActionRow> = plan
            .changes()
            .iter()
            .enumerate()
            .map(|(i, a)| PlanActionRow {
                index: i + 1,
                action: Self::format_action_type(a.action_type),
                kind: a.resource_kind.to_string(),
                resource: a.resource_id.clone(),
                reason: Self::truncate(&a.reason, 40),
            })
            .collect();

        if !rows.is_empty() {
            let table = Table::new(rows).to_string();
            output.push_str(&table);
            output.push('\n');
        }

        let _ = write!(
            output,
            "\nPlan: {} to create, {} to update, {} to delete, {} unchanged\n",
            plan.create_count().to_string().green(),
            plan.update_count().to_string().yellow(),
            plan.delete_count().to_string().red(),
            plan.noop_count()
        );

        output
    }

    /// Formats an execution report.
    #[must_use]
    pub fn format_report(&self, report: &ExecutionReport) -> String {
        match self.format {
            OutputFormat::Json => {
                serde_json::to_string_pretty(&ReportJson::from(report)).unwrap_or_default()
            }
            OutputFormat::Text => Self::format_report_text(report),
        }
    }

    /// Formats an execution report as text.
    fn format_report_text(report: &ExecutionReport) -> String {
        let status = if report.success {
            format!("{} Apply complete", "OK".green())
        } else {
            format!("{} Apply halted", "FAILED".red())
        };

        let mut output = format!("{status}\n\n");
        let _ = writeln!(output, "   Applied: {}", report.applied);
        let _ = writeln!(output, "   Skipped: {}", report.skipped);
        let _ = writeln!(output, "   Failed: {}", report.failed);

        if let Some(halt) = &report.halt {
            let _ = write!(output, "\n{} {halt}\n", "!".yellow());
            output.push_str("   Partial state was preserved; re-run apply to resume.\n");
        }

        output
    }

    /// Formats deployed state.
    #[must_use]
    pub fn format_state(&self, state: &DeployedState) -> String {
        match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(state).unwrap_or_default(),
            OutputFormat::Text => Self::format_state_text(state),
        }
    }

    /// Formats deployed state as text.
    fn format_state_text(state: &DeployedState) -> String {
        let mut output = String::new();

        let _ = write!(output, "\nState: {}/{}\n\n", state.project, state.environment);
        let _ = writeln!(output, "   Version: {} (serial {})", state.version, state.serial);
        let _ = writeln!(
            output,
            "   Config hash: {}",
            &state.config_hash[..8.min(state.config_hash.len())]
        );
        let _ = writeln!(output, "   Last updated: {}", state.last_updated);
        let _ = writeln!(output, "   Resources: {}", state.resources.len());

        if !state.resources.is_empty() {
            let rows: Vec<RecordRow> = state
                .records_newest_first()
                .iter()
                .map(|r| RecordRow {
                    resource: r.id.clone(),
                    kind: r.kind.to_string(),
                    seq: r.seq,
                    fingerprint: Self::truncate(&r.fingerprint, 8),
                    updated: r.updated_at.format("%Y-%m-%d %H:%M").to_string(),
                })
                .collect();

            output.push('\n');
            output.push_str(&Table::new(rows).to_string());
            output.push('\n');
        }

        if !state.history.is_empty() {
            let _ = writeln!(output, "\n   Recent history ({}):", state.history.len());
            for entry in state.history.iter().rev().take(5) {
                let status = if entry.success { "ok" } else { "failed" };
                let _ = writeln!(
                    output,
                    "     [{status}] {} - {} ({})",
                    entry.timestamp.format("%Y-%m-%d %H:%M"),
                    entry.operation,
                    entry.resources.join(", ")
                );
            }
        }

        output
    }

    /// Formats an action type with color.
    fn format_action_type(action_type: ActionType) -> String {
        match action_type {
            ActionType::Create => "+create".green().to_string(),
            ActionType::Update => "~update".yellow().to_string(),
            ActionType::Delete => "-delete".red().to_string(),
            ActionType::Noop => "noop".to_string(),
        }
    }

    /// Truncates a string for table display.
    fn truncate(s: &str, max: usize) -> String {
        if s.len() <= max {
            s.to_string()
        } else {
            format!("{}...", &s[..max.saturating_sub(3)])
        }
    }
}

impl From<&ExecutionReport> for ReportJson {
    fn from(report: &ExecutionReport) -> Self {
        Self {
            applied: report.applied,
            skipped: report.skipped,
            failed: report.failed,
            success: report.success,
            halt: report.halt.as_ref().map(ToString::to_string),
            results: report
                .results
                .iter()
                .map(|r| ReportResultJson {
                    resource: r.action.resource_id.clone(),
                    action: r.action.action_type,
                    outcome: match r.outcome {
                        ActionOutcome::Applied => "applied",
                        ActionOutcome::Skipped => "skipped",
                        ActionOutcome::Failed => "failed",
                    },
                    error: r.error.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ResourceKind;

    fn sample_plan() -> Plan {
        Plan {
            config_hash: String::from("abcdef1234567890"),
            destroy: false,
            actions: vec![
                crate::planner::Action {
                    action_type: ActionType::Create,
                    resource_id: String::from("match-table"),
                    resource_kind: ResourceKind::Table,
                    reason: String::from("Resource declared but not provisioned"),
                    new_fingerprint: Some(String::from("fp1")),
                },
                crate::planner::Action {
                    action_type: ActionType::Noop,
                    resource_id: String::from("team-table"),
                    resource_kind: ResourceKind::Table,
                    reason: String::new(),
                    new_fingerprint: Some(String::from("fp2")),
                },
            ],
        }
    }

    #[test]
    fn test_text_plan_lists_changes_only() {
        let formatter = OutputFormatter::new(OutputFormat::Text);
        let output = formatter.format_plan(&sample_plan());

        assert!(output.contains("match-table"));
        assert!(output.contains("1 to create"));
        assert!(output.contains("1 unchanged"));
    }

    #[test]
    fn test_json_plan_roundtrips() {
        let formatter = OutputFormatter::new(OutputFormat::Json);
        let output = formatter.format_plan(&sample_plan());

        let value: serde_json::Value =
            serde_json::from_str(&output).expect("output should be valid JSON");
        assert_eq!(value["config_hash"], "abcdef1234567890");
        assert_eq!(value["actions"][0]["action_type"], "create");
    }

    #[test]
    fn test_truncate() {
        assert_eq!(OutputFormatter::truncate("short", 10), "short");
        assert_eq!(
            OutputFormatter::truncate("a-very-long-reason", 10),
            "a-very-..."
        );
    }
}

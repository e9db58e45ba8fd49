use serde::Serialize;

use crate::sync::coordinator::PassReport;
use crate::ui::UiEvent;

// ---------------------------------------------------------------------------
// JSON output structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct StepJson {
    pub index: usize,
    pub step: &'static str,
    pub detail: String,
    /// Milliseconds since the replay started
    pub at_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayJson {
    pub script: String,
    /// RFC 3339 wall-clock start
    pub started_at: String,
    pub steps: Vec<StepJson>,
    pub events: Vec<UiEvent>,
    pub passes: Vec<PassReport>,
    pub backend_calls: Vec<String>,
    pub outline: Vec<String>,
}

// ---------------------------------------------------------------------------
// Text formatting
// ---------------------------------------------------------------------------

pub fn format_step(step: &StepJson) -> String {
    let verdict = match step.accepted {
        Some(true) => " -> accepted",
        Some(false) => " -> rejected",
        None => "",
    };
    format!(
        "{:>3} {:>6}ms {:<8} {}{}",
        step.index, step.at_ms, step.step, step.detail, verdict
    )
}

pub fn format_replay(report: &ReplayJson) -> Vec<String> {
    let mut lines = vec![format!("replay {} ({})", report.script, report.started_at)];

    lines.push(String::new());
    lines.push("steps:".to_string());
    lines.extend(report.steps.iter().map(format_step));

    lines.push(String::new());
    lines.push("ui:".to_string());
    if report.events.is_empty() {
        lines.push("  (nothing)".to_string());
    }
    lines.extend(report.events.iter().map(|e| format!("  {}", e)));

    lines.push(String::new());
    lines.push(format!("passes: {}", report.passes.len()));
    lines.extend(report.passes.iter().map(|p| format!("  {}", p)));

    lines.push(String::new());
    lines.push("outline:".to_string());
    lines.extend(report.outline.iter().map(|l| format!("  {}", l)));
    lines
}

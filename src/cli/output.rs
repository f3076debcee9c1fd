//! CLI output formatting

use crate::{
    core::{NodeKind, PipelineNode, RunStatus, Session},
    execution::ExecutionEvent,
    persistence::RunRecord,
};
use console::Emoji;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "!");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");

/// Create a spinner for an operation of unknown length
pub fn create_spinner(message: &str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(template) = ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed}] {msg}") {
        spinner.set_style(template);
    }
    spinner.set_message(message.to_string());
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}

/// Format a run status for display
pub fn format_status(status: RunStatus) -> String {
    match status {
        RunStatus::Pending => style("PENDING").dim().to_string(),
        RunStatus::Running => style("RUNNING").yellow().to_string(),
        RunStatus::Completed => style("COMPLETED").green().to_string(),
        RunStatus::Failed => style("FAILED").red().to_string(),
        RunStatus::Cancelled => style("CANCELLED").yellow().to_string(),
    }
}

pub fn format_kind(kind: NodeKind) -> String {
    match kind {
        NodeKind::Input => style("input").cyan().to_string(),
        NodeKind::Transform => style("transform").magenta().to_string(),
        NodeKind::Output => style("output").green().to_string(),
    }
}

/// Format a run record for display
pub fn format_run_record(record: &RunRecord) -> String {
    let status_icon = match record.status {
        RunStatus::Completed => CHECK,
        RunStatus::Failed => CROSS,
        RunStatus::Running => SPINNER,
        _ => INFO,
    };

    let mut line = format!(
        "{} {} - {} - {} - {} - {}",
        status_icon,
        style(&record.run_id.to_string()[..8]).dim(),
        style(record.started_at.format("%Y-%m-%d %H:%M:%S")).dim(),
        style(&record.session_id).bold(),
        style(&record.transform_id).cyan(),
        format_status(record.status),
    );
    if let Some(duration) = record
        .completed_at
        .and_then(|end| end.signed_duration_since(record.started_at).to_std().ok())
    {
        line.push_str(&format!(" ({})", format_duration(duration)));
    }
    if let Some(error) = &record.error {
        line.push_str(&format!("\n      {}", style(first_line(error)).red()));
    }
    line
}

/// Spinner message for an execution event, if it changes what is shown
pub fn progress_message(event: &ExecutionEvent) -> Option<String> {
    match event {
        ExecutionEvent::RunStarted { transform_id, .. } => {
            Some(format!("{} Preparing {}", ROCKET, style(transform_id).cyan()))
        }
        ExecutionEvent::WorkspaceReady { .. } => Some("Compiling...".to_string()),
        ExecutionEvent::Compiled { .. } => Some("Compiled".to_string()),
        ExecutionEvent::ProcessStarted => Some("Running transformation... (Ctrl-C to cancel)".to_string()),
        _ => None,
    }
}

/// One line per node, children indented under their parent
pub fn render_tree(session: &Session) -> Vec<String> {
    let mut lines = Vec::new();
    for root in session.roots() {
        render_node(session, root, 0, &mut lines);
    }
    lines
}

fn render_node(session: &Session, node: &PipelineNode, depth: usize, lines: &mut Vec<String>) {
    let branch = if depth == 0 { String::new() } else { format!("{}└─ ", "   ".repeat(depth - 1)) };
    lines.push(format!(
        "{}{} {} {}",
        branch,
        format_kind(node.kind),
        style(&node.label).bold(),
        style(&node.id).dim()
    ));
    for child in session.children_of(&node.id) {
        render_node(session, child, depth + 1, lines);
    }
}

/// Format transform output with truncation
pub fn format_output(output: &str, max_lines: usize) -> String {
    let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80);
    let lines: Vec<String> = output.lines().map(|line| clip(line, width)).collect();

    if lines.len() <= max_lines {
        lines.join("\n")
    } else {
        let truncated = lines[..max_lines].join("\n");
        format!(
            "{}\n{}... ({} more lines)",
            truncated,
            style("[truncated]").dim(),
            lines.len() - max_lines
        )
    }
}

fn clip(line: &str, width: usize) -> String {
    if line.chars().count() <= width {
        line.to_string()
    } else {
        let kept: String = line.chars().take(width.saturating_sub(1)).collect();
        format!("{}…", kept)
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or(text)
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{}s", secs)
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SessionId;

    #[test]
    fn test_render_tree_nests_children() {
        let mut session = Session::empty(SessionId::parse("s1").unwrap());
        session.nodes.push(PipelineNode::input("data.json").with_id("in"));
        session.nodes.push(PipelineNode::transform("t.ts", "in").with_id("t"));
        session.nodes.push(PipelineNode::output("o.json", "t").with_id("o"));
        session.nodes.push(PipelineNode::input("other.txt").with_id("in2"));

        let lines = render_tree(&session);
        assert_eq!(lines.len(), 4);
        assert!(lines[0].contains("data.json"));
        assert!(lines[1].contains("t.ts") && lines[1].contains("└─"));
        assert!(lines[2].contains("o.json"));
        assert!(lines[3].contains("other.txt"));
    }

    #[test]
    fn test_format_output_truncates() {
        let output = (1..=10).map(|n| n.to_string()).collect::<Vec<_>>().join("\n");
        let formatted = format_output(&output, 3);
        assert!(formatted.starts_with("1\n2\n3\n"));
        assert!(formatted.contains("(7 more lines)"));

        assert_eq!(format_output("[1, 2]", 3), "[1, 2]");
    }

    #[test]
    fn test_clip_long_lines() {
        assert_eq!(clip("abcdef", 4), "abc…");
        assert_eq!(clip("abc", 4), "abc");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(250)), "250ms");
        assert_eq!(format_duration(Duration::from_secs(75)), "1m 15s");
    }
}

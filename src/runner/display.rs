use crate::runner::report::{RunSummary, Status, StepReport, TestReport};

/// Format a status label for terminal output.
fn status_label(status: Status) -> &'static str {
    match status {
        Status::Pass => "PASSED",
        Status::Fail => "FAILED",
        Status::Skip => "SKIPPED",
        Status::Running => "RUNNING",
        Status::Pending => "PENDING",
    }
}

/// Format one step line. Passing steps are only listed when `verbose`.
pub fn format_step(step: &StepReport, depth: usize, verbose: bool) -> Option<String> {
    if step.status == Status::Pass && !verbose {
        return None;
    }
    let indent = "  ".repeat(depth + 2);
    let mut line = format!(
        "{indent}{} {} {}",
        step.phase, step.action_type, step.selector
    );
    if let Some(value) = &step.value {
        line.push_str(&format!(" = {value}"));
    }
    line.push_str(&format!(" ({}ms)", step.execution_time_ms));
    if step.status != Status::Pass {
        line.push_str(&format!(" [{}]", status_label(step.status)));
    }
    if let Some(err) = &step.error_message {
        line.push_str(&format!("\n{indent}  → {err}"));
    }
    if let Some(path) = &step.screenshot_path {
        line.push_str(&format!("\n{indent}  screenshot: {path}"));
    }
    Some(line)
}

/// Format a report tree, one test per line, children indented.
pub fn format_report(report: &TestReport, verbose: bool) -> String {
    let mut lines = Vec::new();
    push_report(&mut lines, report, 0, verbose);
    lines.join("\n")
}

fn push_report(lines: &mut Vec<String>, report: &TestReport, depth: usize, verbose: bool) {
    let indent = "  ".repeat(depth + 1);
    let duration_secs = report.duration as f64 / 1000.0;
    lines.push(format!(
        "{indent}[{}] {} ({duration_secs:.1}s)",
        status_label(report.status),
        report.test_name
    ));
    for step in &report.steps {
        if let Some(line) = format_step(step, depth, verbose) {
            lines.push(line);
        }
    }
    if let Some(err) = &report.error_message {
        lines.push(format!("{indent}  → {err}"));
    }
    for child in &report.children {
        push_report(lines, child, depth + 1, verbose);
    }
}

/// Format the final summary after the run completes.
pub fn format_summary(summary: &RunSummary) -> String {
    let mut parts = Vec::new();

    if summary.passed > 0 {
        parts.push(format!("{} passed", summary.passed));
    }
    if summary.failed > 0 {
        parts.push(format!("{} failed", summary.failed));
    }
    if summary.skipped > 0 {
        parts.push(format!("{} skipped", summary.skipped));
    }

    if parts.is_empty() {
        parts.push("0 tests".into());
    }

    format!(
        "\nResults: {} of {} tests ({})",
        parts.join(", "),
        summary.total_tests,
        summary.formatted_duration
    )
}

/// Format the run header line.
pub fn format_run_header(path: &str, browser: &str) -> String {
    format!("Running {path} ({browser})...\n")
}

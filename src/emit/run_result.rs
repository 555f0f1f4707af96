use std::fmt::Write;

use serde::{Deserialize, Serialize};

use crate::emit::util::xml_escape;
use crate::runner::report::{RunSummary, Status, StepReport, TestReport};

/// A serialized run: the summary followed by the report tree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunDocument {
    pub summary: RunSummary,
    pub report: TestReport,
}

impl RunDocument {
    pub fn new(report: TestReport) -> Self {
        Self {
            summary: RunSummary::from_reports(std::slice::from_ref(&report)),
            report,
        }
    }
}

/// Emit a run as YAML.
pub fn emit_run_yaml(doc: &RunDocument) -> String {
    serde_yaml::to_string(doc).unwrap_or_else(|e| format!("# Error serializing report: {e}"))
}

/// Emit a run as JSON.
pub fn emit_run_json(doc: &RunDocument) -> String {
    serde_json::to_string_pretty(doc).unwrap_or_else(|e| format!("{{ \"error\": \"{e}\" }}"))
}

/// Emit a run as JUnit XML, one testcase per test node.
pub fn emit_run_junit(doc: &RunDocument) -> String {
    let mut out = String::new();
    let summary = &doc.summary;
    let name = xml_escape(&doc.report.test_name);
    let tests = summary.total_tests;
    let failures = summary.failed;
    let skipped = summary.skipped;
    let time_secs = summary.total_duration as f64 / 1000.0;
    let timestamp = summary
        .execution_start_time
        .map(|t| format!(r#" timestamp="{}""#, t.to_rfc3339()))
        .unwrap_or_default();

    let _ = writeln!(out, r#"<?xml version="1.0" encoding="UTF-8"?>"#);
    let _ = writeln!(
        out,
        r#"<testsuites name="{name}" tests="{tests}" failures="{failures}" skipped="{skipped}" time="{time_secs:.1}">"#
    );
    let _ = writeln!(
        out,
        r#"  <testsuite name="{name}" tests="{tests}" failures="{failures}" skipped="{skipped}" time="{time_secs:.1}"{timestamp}>"#
    );

    for test in doc.report.flatten() {
        write_testcase(&mut out, test, &name);
    }

    let _ = writeln!(out, "  </testsuite>");
    let _ = writeln!(out, "</testsuites>");
    out
}

fn write_testcase(out: &mut String, test: &TestReport, suite: &str) {
    let case = xml_escape(&test.test_name);
    let class = test
        .parent_test
        .as_deref()
        .map_or_else(|| suite.to_owned(), xml_escape);
    let time = test.duration as f64 / 1000.0;
    let _ = writeln!(
        out,
        r#"    <testcase name="{case}" classname="{class}" time="{time:.1}">"#
    );

    match test.status {
        Status::Fail => {
            let message = failure_message(test);
            let _ = writeln!(out, r#"      <failure message="{}">"#, xml_escape(&message));
            if let Some(trace) = failed_trace(test) {
                let _ = writeln!(out, "{}", xml_escape(trace));
            }
            let _ = writeln!(out, "      </failure>");
        }
        Status::Skip => {
            let reason = test.error_message.as_deref().unwrap_or("not run");
            let _ = writeln!(out, r#"      <skipped message="{}"/>"#, xml_escape(reason));
        }
        _ => {}
    }

    if !test.steps.is_empty() {
        let _ = writeln!(out, "      <system-out>");
        for step in &test.steps {
            let _ = writeln!(out, "        {}", xml_escape(&step_line(step)));
        }
        let _ = writeln!(out, "      </system-out>");
    }

    let _ = writeln!(out, "    </testcase>");
}

/// The node's own message, else its first failed step's, else a child's.
fn failure_message(test: &TestReport) -> String {
    if let Some(message) = &test.error_message {
        return message.clone();
    }
    if let Some(message) = test
        .steps
        .iter()
        .find(|s| s.status == Status::Fail)
        .and_then(|s| s.error_message.clone())
    {
        return message;
    }
    match test.children.iter().find(|c| c.status == Status::Fail) {
        Some(child) => format!("child test failed: {}", child.test_name),
        None => "test failed".to_owned(),
    }
}

fn failed_trace(test: &TestReport) -> Option<&str> {
    test.stack_trace.as_deref().or_else(|| {
        test.steps
            .iter()
            .find(|s| s.status == Status::Fail)
            .and_then(|s| s.stack_trace.as_deref())
    })
}

fn step_line(step: &StepReport) -> String {
    let mut line = format!("[{}] {} {}", step.phase, step.action_type, step.selector);
    if let Some(value) = &step.value {
        let _ = write!(line, " = {value}");
    }
    let _ = write!(line, " [{}]", step.status);
    line
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::report::Phase;

    fn step(phase: Phase, action: &str, selector: &str, ok: bool) -> StepReport {
        let mut step = StepReport::new(phase, action, selector, None);
        step.start();
        if ok {
            step.pass();
        } else {
            step.fail("expected text to equal \"Welcome\", got \"Error\"", None);
        }
        step
    }

    fn sample() -> RunDocument {
        let mut root = TestReport::new("Login <main>", None);
        root.start();
        root.add_step(step(Phase::Navigation, "goto", "url", true));
        root.add_step(step(Phase::Assert, "textContent", "h1", false));
        let mut child = TestReport::new("Dashboard", Some("Login <main>"));
        child.skip("parent failed");
        root.add_child(child);
        root.complete();
        RunDocument::new(root)
    }

    #[test]
    fn summary_counts_whole_tree() {
        let doc = sample();
        assert_eq!(doc.summary.total_tests, 2);
        assert_eq!(doc.summary.failed, 1);
        assert_eq!(doc.summary.skipped, 1);
        assert!(!doc.summary.success());
    }

    #[test]
    fn yaml_uses_camel_case_and_upper_statuses() {
        let yaml = emit_run_yaml(&sample());
        assert!(yaml.contains("testName: Dashboard"));
        assert!(yaml.contains("status: FAIL"));
        assert!(yaml.contains("status: SKIP"));
        assert!(yaml.contains("totalTests: 2"));
        assert!(yaml.contains("parentTest:"));
    }

    #[test]
    fn json_parses_back() {
        let json = emit_run_json(&sample());
        let parsed: RunDocument = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.report.children.len(), 1);
        assert_eq!(parsed.report.steps[1].status, Status::Fail);
        assert_eq!(parsed.summary.failed, 1);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["report"]["steps"][0]["executionTimeMs"].is_number());
        assert!(value["summary"]["formattedDuration"].is_string());
    }

    #[test]
    fn junit_marks_failures_and_skips() {
        let xml = emit_run_junit(&sample());
        assert!(xml.contains(r#"<?xml version="1.0""#));
        assert!(xml.contains(r#"tests="2" failures="1" skipped="1""#));
        assert!(xml.contains(r#"<testcase name="Login &lt;main&gt;""#));
        assert!(xml.contains(r#"<failure message="expected text to equal &quot;Welcome&quot;, got &quot;Error&quot;">"#));
        assert!(xml.contains(r#"<skipped message="parent failed"/>"#));
        assert!(xml.contains(r#"classname="Login &lt;main&gt;""#));
    }

    #[test]
    fn junit_lists_steps_in_system_out() {
        let xml = emit_run_junit(&sample());
        assert!(xml.contains("<system-out>"));
        assert!(xml.contains("[NAVIGATION] goto url [PASS]"));
        assert!(xml.contains("[ASSERT] textContent h1 [FAIL]"));
    }

    #[test]
    fn failure_message_falls_back_to_child() {
        let mut root = TestReport::new("Root", None);
        root.start();
        let mut child = TestReport::new("Child", Some("Root"));
        child.start();
        child.fail("boom", None);
        root.add_child(child);
        root.complete();
        assert_eq!(failure_message(&root), "child test failed: Child");
    }
}

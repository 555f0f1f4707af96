use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state shared by steps and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Status {
    Pending,
    Running,
    Pass,
    Fail,
    Skip,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "PENDING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Pass => write!(f, "PASS"),
            Self::Fail => write!(f, "FAIL"),
            Self::Skip => write!(f, "SKIP"),
        }
    }
}

/// The part of a test a step belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Phase {
    Fill,
    Submit,
    Assert,
    Action,
    Dialog,
    Navigation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fill => write!(f, "FILL"),
            Self::Submit => write!(f, "SUBMIT"),
            Self::Assert => write!(f, "ASSERT"),
            Self::Action => write!(f, "ACTION"),
            Self::Dialog => write!(f, "DIALOG"),
            Self::Navigation => write!(f, "NAVIGATION"),
        }
    }
}

const SENSITIVE_KEYWORDS: [&str; 5] = ["password", "token", "secret", "key", "credential"];

/// Replace values that look like secrets with `****`.
pub fn mask_value(value: &str) -> String {
    let lower = value.to_lowercase();
    if SENSITIVE_KEYWORDS.iter().any(|k| lower.contains(k)) {
        "****".to_owned()
    } else {
        value.to_owned()
    }
}

fn millis_between(start: Option<DateTime<Utc>>, end: DateTime<Utc>) -> u64 {
    start.map_or(0, |s| {
        u64::try_from((end - s).num_milliseconds()).unwrap_or(0)
    })
}

/// The record of one executed (or skipped) step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepReport {
    pub phase: Phase,
    pub action_type: String,
    #[serde(default)]
    pub selector: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl StepReport {
    /// A pending step. `value` is masked before it is stored.
    pub fn new(phase: Phase, action_type: &str, selector: &str, value: Option<&str>) -> Self {
        Self {
            phase,
            action_type: action_type.to_owned(),
            selector: selector.to_owned(),
            value: value.filter(|v| !v.is_empty()).map(mask_value),
            status: Status::Pending,
            start_time: None,
            end_time: None,
            execution_time_ms: 0,
            screenshot_path: None,
            error_message: None,
            stack_trace: None,
        }
    }

    pub fn start(&mut self) {
        self.start_time = Some(Utc::now());
        self.status = Status::Running;
    }

    pub fn pass(&mut self) {
        self.finish();
        self.status = Status::Pass;
    }

    pub fn fail(&mut self, message: impl Into<String>, stack_trace: Option<String>) {
        self.finish();
        self.status = Status::Fail;
        self.error_message = Some(message.into());
        self.stack_trace = stack_trace;
    }

    /// Mark the step as never attempted. No end time is recorded.
    pub fn skip(&mut self, reason: &str) {
        self.status = Status::Skip;
        self.error_message = Some(reason.to_owned());
    }

    pub fn attach_screenshot(&mut self, path: String) {
        self.screenshot_path = Some(path);
    }

    fn finish(&mut self) {
        let end = Utc::now();
        self.execution_time_ms = millis_between(self.start_time, end);
        self.end_time = Some(end);
    }
}

/// The record of one test node and its subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestReport {
    pub test_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_test: Option<String>,
    pub status: Status,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    /// Milliseconds between start and end.
    #[serde(default)]
    pub duration: u64,
    #[serde(default)]
    pub steps: Vec<StepReport>,
    #[serde(default)]
    pub children: Vec<TestReport>,
    /// Captures not tied to a single step, in the order taken.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub screenshots: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
}

impl TestReport {
    pub fn new(test_name: &str, parent_test: Option<&str>) -> Self {
        Self {
            test_name: test_name.to_owned(),
            parent_test: parent_test.map(str::to_owned),
            status: Status::Pending,
            start_time: None,
            end_time: None,
            duration: 0,
            steps: Vec::new(),
            children: Vec::new(),
            screenshots: Vec::new(),
            error_message: None,
            stack_trace: None,
        }
    }

    pub fn start(&mut self) {
        self.start_time = Some(Utc::now());
        self.status = Status::Running;
    }

    /// Settle a running test from its direct steps and children.
    ///
    /// FAIL if any direct step or child failed, PASS otherwise. Tests that
    /// already left RUNNING keep their status.
    pub fn complete(&mut self) {
        self.finish();
        if self.status != Status::Running {
            return;
        }
        let failed = self.steps.iter().any(|s| s.status == Status::Fail)
            || self.children.iter().any(|c| c.status == Status::Fail);
        self.status = if failed { Status::Fail } else { Status::Pass };
    }

    /// Force FAIL regardless of step results.
    pub fn fail(&mut self, message: impl Into<String>, stack_trace: Option<String>) {
        self.finish();
        self.status = Status::Fail;
        self.error_message = Some(message.into());
        self.stack_trace = stack_trace;
    }

    /// Mark the test as never attempted.
    pub fn skip(&mut self, reason: &str) {
        self.status = Status::Skip;
        self.error_message = Some(reason.to_owned());
    }

    pub fn add_step(&mut self, step: StepReport) -> &mut StepReport {
        self.steps.push(step);
        let last = self.steps.len() - 1;
        &mut self.steps[last]
    }

    pub fn add_child(&mut self, child: TestReport) {
        self.children.push(child);
    }

    pub fn steps_in(&self, phase: Phase) -> impl Iterator<Item = &StepReport> {
        self.steps.iter().filter(move |s| s.phase == phase)
    }

    /// This test followed by every descendant, depth first.
    pub fn flatten(&self) -> Vec<&TestReport> {
        let mut out = vec![self];
        for child in &self.children {
            out.extend(child.flatten());
        }
        out
    }

    fn finish(&mut self) {
        let end = Utc::now();
        self.duration = millis_between(self.start_time, end);
        self.end_time = Some(end);
    }
}

/// Counts and time range over whole report trees.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub total_tests: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub execution_start_time: Option<DateTime<Utc>>,
    pub execution_end_time: Option<DateTime<Utc>>,
    /// Milliseconds between the earliest start and the latest end.
    pub total_duration: u64,
    pub formatted_duration: String,
}

impl RunSummary {
    /// Build a summary over every node of the given trees.
    pub fn from_reports(roots: &[TestReport]) -> Self {
        let all: Vec<&TestReport> = roots.iter().flat_map(TestReport::flatten).collect();
        let count = |status: Status| all.iter().filter(|t| t.status == status).count();

        let start = all.iter().filter_map(|t| t.start_time).min();
        let end = all.iter().filter_map(|t| t.end_time).max();
        let total_duration = match (start, end) {
            (Some(s), Some(e)) => millis_between(Some(s), e),
            _ => 0,
        };

        Self {
            total_tests: all.len(),
            passed: count(Status::Pass),
            failed: count(Status::Fail),
            skipped: count(Status::Skip),
            execution_start_time: start,
            execution_end_time: end,
            total_duration,
            formatted_duration: format_duration(total_duration),
        }
    }

    pub fn success(&self) -> bool {
        self.failed == 0
    }
}

/// `MMm SSs` when at least a minute elapsed, `Ss` otherwise.
pub fn format_duration(millis: u64) -> String {
    let seconds = millis / 1000;
    let minutes = seconds / 60;
    let remaining = seconds % 60;
    if minutes > 0 {
        format!("{minutes:02}m {remaining:02}s")
    } else {
        format!("{remaining}s")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn finished(name: &str, status: Status) -> TestReport {
        let mut report = TestReport::new(name, None);
        report.status = status;
        report
    }

    #[test]
    fn mask_hides_sensitive_values() {
        assert_eq!(mask_value("secretToken123"), "****");
        assert_eq!(mask_value("MyPassword"), "****");
        assert_eq!(mask_value("api-KEY-1"), "****");
        assert_eq!(mask_value("alice"), "alice");
    }

    #[test]
    fn step_value_is_masked_on_creation() {
        let step = StepReport::new(Phase::Fill, "fill-input", "#pw", Some("secretToken123"));
        assert_eq!(step.value.as_deref(), Some("****"));
        let empty = StepReport::new(Phase::Action, "click", "#go", Some(""));
        assert!(empty.value.is_none());
    }

    #[test]
    fn step_lifecycle() {
        let mut step = StepReport::new(Phase::Action, "click", "#go", None);
        assert_eq!(step.status, Status::Pending);
        step.start();
        assert_eq!(step.status, Status::Running);
        assert!(step.start_time.is_some());
        step.pass();
        assert_eq!(step.status, Status::Pass);
        assert!(step.end_time.is_some());
        assert!(step.end_time >= step.start_time);
    }

    #[test]
    fn step_fail_records_error() {
        let mut step = StepReport::new(Phase::Assert, "textContent", "h1", None);
        step.start();
        step.fail("boom", Some("trace".into()));
        assert_eq!(step.status, Status::Fail);
        assert_eq!(step.error_message.as_deref(), Some("boom"));
        assert_eq!(step.stack_trace.as_deref(), Some("trace"));
    }

    #[test]
    fn step_skip_has_no_end_time() {
        let mut step = StepReport::new(Phase::Assert, "textContent", "h1", None);
        step.skip("previous step failed");
        assert_eq!(step.status, Status::Skip);
        assert!(step.end_time.is_none());
        assert_eq!(step.error_message.as_deref(), Some("previous step failed"));
    }

    #[test]
    fn complete_passes_when_nothing_failed() {
        let mut report = TestReport::new("root", None);
        report.start();
        let step = report.add_step(StepReport::new(Phase::Action, "click", "#a", None));
        step.start();
        step.pass();
        report.add_child(finished("child", Status::Skip));
        report.complete();
        assert_eq!(report.status, Status::Pass);
        assert!(report.end_time.is_some());
    }

    #[test]
    fn complete_fails_on_failed_step_or_child() {
        let mut by_step = TestReport::new("a", None);
        by_step.start();
        let step = by_step.add_step(StepReport::new(Phase::Action, "click", "#a", None));
        step.start();
        step.fail("nope", None);
        by_step.complete();
        assert_eq!(by_step.status, Status::Fail);

        let mut by_child = TestReport::new("b", None);
        by_child.start();
        by_child.add_child(finished("c", Status::Fail));
        by_child.complete();
        assert_eq!(by_child.status, Status::Fail);
    }

    #[test]
    fn complete_ignores_grandchildren() {
        let mut child = finished("child", Status::Pass);
        child.add_child(finished("grandchild", Status::Fail));
        let mut root = TestReport::new("root", None);
        root.start();
        root.add_child(child);
        root.complete();
        assert_eq!(root.status, Status::Pass);
    }

    #[test]
    fn complete_keeps_explicit_failure() {
        let mut report = TestReport::new("root", None);
        report.start();
        report.fail("load failed", None);
        report.complete();
        assert_eq!(report.status, Status::Fail);
        assert_eq!(report.error_message.as_deref(), Some("load failed"));
    }

    #[test]
    fn serializes_camel_case_uppercase_status() {
        let mut report = TestReport::new("root", Some("parent"));
        report.add_step(StepReport::new(Phase::Navigation, "goto", "", Some("https://a.test")));
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["testName"], "root");
        assert_eq!(json["parentTest"], "parent");
        assert_eq!(json["status"], "PENDING");
        assert_eq!(json["steps"][0]["phase"], "NAVIGATION");
        assert_eq!(json["steps"][0]["actionType"], "goto");
        assert_eq!(json["steps"][0]["executionTimeMs"], 0);
    }

    #[test]
    fn summary_counts_whole_tree() {
        let mut root = finished("root", Status::Fail);
        root.start_time = Some(Utc.timestamp_millis_opt(1_000).unwrap());
        root.end_time = Some(Utc.timestamp_millis_opt(76_000).unwrap());
        let mut child = finished("child", Status::Pass);
        child.add_child(finished("skipped", Status::Skip));
        root.add_child(child);
        root.add_child(finished("failed", Status::Fail));

        let summary = RunSummary::from_reports(&[root]);
        assert_eq!(summary.total_tests, 4);
        assert_eq!(summary.passed, 1);
        assert_eq!(summary.failed, 2);
        assert_eq!(summary.skipped, 1);
        assert_eq!(summary.total_duration, 75_000);
        assert_eq!(summary.formatted_duration, "01m 15s");
        assert!(!summary.success());
    }

    #[test]
    fn format_duration_short_and_long() {
        assert_eq!(format_duration(0), "0s");
        assert_eq!(format_duration(42_999), "42s");
        assert_eq!(format_duration(600_000), "10m 00s");
    }
}

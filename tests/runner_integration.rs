//! End-to-end tests for the orchestrator.
//!
//! Test trees are written to a temporary directory and executed against an
//! in-memory page, so the whole load → dispatch → report flow runs without a
//! browser.

use std::fs;
use std::path::Path;
use std::time::Duration;

use uiflow::cli::commands::{RunOptions, run_with_page};
use uiflow::config::{ReportFormat, RunConfig};
use uiflow::emit::run_result::RunDocument;
use uiflow::loader::TestFileLoader;
use uiflow::page::DialogResponse;
use uiflow::page::memory::{MemoryElement, MemoryPage};
use uiflow::runner::action::ActionSettings;
use uiflow::runner::orchestrator::{OrchestratorConfig, PARENT_FAILED, TestOrchestrator};
use uiflow::runner::report::{Phase, Status, TestReport};
use uiflow::screenshot::DirectorySink;

fn write(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, body).unwrap();
}

fn fast_config() -> OrchestratorConfig {
    OrchestratorConfig {
        actions: ActionSettings {
            visibility_timeout: Duration::ZERO,
            settle_delay: Duration::ZERO,
        },
        assertion_timeout: Duration::ZERO,
        navigation_timeout: Duration::ZERO,
        ..OrchestratorConfig::default()
    }
}

fn run(dir: &Path, root: &str, page: MemoryPage) -> (TestReport, MemoryPage) {
    let loader = TestFileLoader::with_base_dir(dir);
    let mut orch = TestOrchestrator::new(page, loader, fast_config());
    let report = orch.run_file(root).expect("root should load");
    assert!(orch.loader().in_flight().is_empty());
    (report, orch.into_page())
}

fn login_page() -> MemoryPage {
    MemoryPage::new("about:blank")
        .with_element("#user", MemoryElement::input())
        .with_element("#go", MemoryElement::button())
        .with_element("h1", MemoryElement::text("h1", "Welcome"))
}

#[test]
fn failing_assertion_skips_children() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Login
url: https://app.test/login
actions:
  - type: click
    selector: '#go'
assertions:
  - type: textContent
    selector: h1
    expected: Goodbye
children:
  - path: never-loaded.yaml
",
    );

    let (report, _) = run(dir.path(), "root.yaml", login_page());

    assert_eq!(report.status, Status::Fail);
    let statuses: Vec<Status> = report.steps.iter().map(|s| s.status).collect();
    assert_eq!(statuses, vec![Status::Pass, Status::Pass, Status::Fail]);
    assert_eq!(report.steps[0].phase, Phase::Navigation);
    assert_eq!(report.steps[1].phase, Phase::Action);
    assert_eq!(report.steps[2].phase, Phase::Assert);

    assert_eq!(report.children.len(), 1);
    let child = &report.children[0];
    assert_eq!(child.status, Status::Skip);
    assert_eq!(child.test_name, "never-loaded.yaml");
    assert_eq!(child.error_message.as_deref(), Some(PARENT_FAILED));
    assert!(child.steps.is_empty());
    assert_eq!(child.parent_test.as_deref(), Some("Login"));
}

#[test]
fn failing_action_halts_remaining_steps() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Broken
actions:
  - type: fill
    selector: '#user'
    value: alice
  - type: click
    selector: '#missing'
  - type: click
    selector: '#go'
children:
  - name: Inline
",
    );

    let (report, page) = run(dir.path(), "root.yaml", login_page());

    assert_eq!(report.status, Status::Fail);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.steps[0].action_type, "fill-input");
    assert_eq!(report.steps[0].phase, Phase::Fill);
    let failed = &report.steps[1];
    assert_eq!(failed.status, Status::Fail);
    assert!(failed.error_message.as_deref().unwrap().contains("#missing"));
    assert!(failed.stack_trace.as_deref().unwrap().contains("caused by"));
    assert_eq!(page.count("click"), 0);
    assert_eq!(page.element("#user").unwrap().value, "alice");
    assert_eq!(report.children[0].status, Status::Skip);
}

#[test]
fn nested_files_resolve_relative_to_parent() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Root
url: https://app.test/home
children:
  - path: flows/login.yaml
  - path: flows/search.yaml
",
    );
    write(
        dir.path(),
        "flows/login.yaml",
        r"
name: Login
actions:
  - selector:
      by: id
      value: user
    value: alice
  - type: click
    selector: '#go'
assertions:
  - type: urlContains
    expected: /dashboard
",
    );
    write(
        dir.path(),
        "flows/search.yaml",
        r"
name: Search
assertions:
  - type: url
    expectedUrl: /home
children:
  - path: ../shared/footer.yaml
",
    );
    write(
        dir.path(),
        "shared/footer.yaml",
        r"
name: Footer
assertions:
  - type: exists
    selector: h1
",
    );

    let mut page = login_page();
    page.element_mut("#go").unwrap().navigates_to = Some("https://app.test/dashboard".into());

    let (report, page) = run(dir.path(), "root.yaml", page);

    assert_eq!(report.status, Status::Pass, "{report:#?}");
    let names: Vec<&str> = report.flatten().iter().map(|r| r.test_name.as_str()).collect();
    assert_eq!(names, vec!["Root", "Login", "Search", "Footer"]);
    // Search starts back on the parent's page after Login navigated away
    assert_eq!(page.count("navigate https://app.test/home"), 2);
    assert_eq!(report.children[1].children[0].parent_test.as_deref(), Some("Search"));
}

#[test]
fn runtime_cycle_fails_the_offending_child() {
    let dir = tempfile::tempdir().unwrap();
    write(dir.path(), "a.yaml", "name: A\nchildren:\n  - path: b.yaml\n");
    write(dir.path(), "b.yaml", "name: B\nchildren:\n  - path: c.yaml\n");
    write(dir.path(), "c.yaml", "name: C\nchildren:\n  - path: a.yaml\n");

    let (report, _) = run(dir.path(), "a.yaml", MemoryPage::new("about:blank"));

    assert_eq!(report.status, Status::Fail);
    let b = &report.children[0];
    let c = &b.children[0];
    let again = &c.children[0];
    assert_eq!(b.status, Status::Fail);
    assert_eq!(c.status, Status::Fail);
    assert_eq!(again.test_name, "a.yaml");
    let message = again.error_message.as_deref().unwrap();
    assert!(message.starts_with("circular reference detected"));
    let order: Vec<usize> = ["a.yaml", "b.yaml", "c.yaml"]
        .iter()
        .map(|f| message.find(f).unwrap())
        .collect();
    assert!(order[0] < order[1] && order[1] < order[2]);
}

#[test]
fn shared_file_in_two_branches_is_not_a_cycle() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        "name: Root\nchildren:\n  - path: a.yaml\n  - path: x.yaml\n",
    );
    write(dir.path(), "x.yaml", "name: X\nchildren:\n  - path: a.yaml\n");
    write(dir.path(), "a.yaml", "name: A\n");

    let loader = TestFileLoader::with_base_dir(dir.path());
    let mut orch = TestOrchestrator::new(MemoryPage::new("about:blank"), loader, fast_config());
    let report = orch.run_file("root.yaml").unwrap();

    assert_eq!(report.status, Status::Pass);
    assert_eq!(report.flatten().len(), 4);
    assert!(orch.loader().is_cached(&dir.path().join("a.yaml")));
}

#[test]
fn sensitive_values_are_masked_in_report() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Secrets
actions:
  - type: fill-input
    selector: '#user'
    value: secretToken123
",
    );

    let (report, page) = run(dir.path(), "root.yaml", login_page());

    assert_eq!(report.status, Status::Pass);
    assert_eq!(report.steps[0].value.as_deref(), Some("****"));
    // the page still received the real value
    assert_eq!(page.element("#user").unwrap().value, "secretToken123");
}

#[test]
fn dialog_steps_answer_and_capture() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Delete item
actions:
  - type: click
    selector: '#delete'
  - type: dialog
    action: accept
    capture: true
    captureDelayMs: 0
  - type: click
    selector: '#cancel'
  - type: dialog
    action: dismiss
",
    );
    let page = MemoryPage::new("about:blank")
        .with_element("#delete", MemoryElement::button().opens_dialog("Delete?"))
        .with_element("#cancel", MemoryElement::button().opens_dialog("Discard changes?"));

    let out = tempfile::tempdir().unwrap();
    let loader = TestFileLoader::with_base_dir(dir.path());
    let mut orch = TestOrchestrator::with_screenshots(
        page,
        DirectorySink::new(out.path()),
        loader,
        fast_config(),
    );
    let report = orch.run_file("root.yaml").unwrap();

    assert_eq!(report.status, Status::Pass);
    let dialogs: Vec<_> = report.steps_in(Phase::Dialog).collect();
    assert_eq!(dialogs.len(), 2);
    let shot = dialogs[0].screenshot_path.as_deref().unwrap();
    assert!(shot.starts_with("screenshots/Delete_item_DIALOG_1_"));
    assert!(out.path().join(shot).is_file());
    assert!(dialogs[1].screenshot_path.is_none());

    let answered = &orch.page().answered_dialogs;
    assert_eq!(answered.len(), 2);
    assert_eq!(answered[0].0, "Delete?");
    assert_eq!(answered[0].1, DialogResponse::Accept);
    assert_eq!(answered[1].1, DialogResponse::Dismiss);
}

#[test]
fn failure_screenshot_attached_to_failed_step() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Heading
assertions:
  - type: textContent
    selector: h1
    expected: Nope
",
    );

    let out = tempfile::tempdir().unwrap();
    let loader = TestFileLoader::with_base_dir(dir.path());
    let mut orch = TestOrchestrator::with_screenshots(
        login_page(),
        DirectorySink::new(out.path()),
        loader,
        fast_config(),
    );
    let report = orch.run_file("root.yaml").unwrap();

    let step = &report.steps[0];
    assert_eq!(step.status, Status::Fail);
    let shot = step.screenshot_path.as_deref().unwrap();
    assert!(shot.contains("Heading_FAILURE_0_"));
    assert!(out.path().join(shot).is_file());
}

#[test]
fn checkbox_is_detected_and_normalized() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Terms
actions:
  - selector: '#agree'
    value: 'yes'
  - selector: '#news'
    value: 'off'
assertions:
  - type: visible
    selector: '#agree'
  - type: hidden
    selector: '#promo'
",
    );
    let page = MemoryPage::new("about:blank")
        .with_element("#agree", MemoryElement::checkbox())
        .with_element("#news", MemoryElement::checkbox())
        .with_element("#promo", MemoryElement::text("div", "Sale").hidden());

    let (report, page) = run(dir.path(), "root.yaml", page);

    assert_eq!(report.status, Status::Pass, "{report:#?}");
    assert_eq!(report.steps[0].action_type, "checkbox");
    assert!(page.element("#agree").unwrap().checked);
    assert!(!page.element("#news").unwrap().checked);
}

#[test]
fn stop_on_failure_false_keeps_asserting() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Soft
assertions:
  - type: textContent
    selector: h1
    expected: Wrong
    stopOnFailure: false
  - type: textContent
    selector: h1
    operator: contains
    expected: Wel
",
    );

    let (report, _) = run(dir.path(), "root.yaml", login_page());

    assert_eq!(report.status, Status::Fail);
    assert_eq!(report.steps.len(), 2);
    assert_eq!(report.steps[1].status, Status::Pass);
}

#[test]
fn root_load_error_is_returned() {
    let dir = tempfile::tempdir().unwrap();
    let loader = TestFileLoader::with_base_dir(dir.path());
    let mut orch = TestOrchestrator::new(MemoryPage::new("about:blank"), loader, fast_config());
    let err = orch.run_file("missing.yaml").unwrap_err();
    assert!(err.to_string().contains("test file not found"));
}

#[test]
fn run_with_page_writes_report() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Smoke
url: https://app.test/
assertions:
  - type: urlContains
    expected: app.test
",
    );

    let mut config = RunConfig::default();
    config.report.output_dir = dir.path().join("out");
    config.report.format = ReportFormat::Json;
    config.test_execution.settle_delay_ms = 0;
    config.test_execution.assertion_timeout_ms = 0;

    let root = dir.path().join("root.yaml");
    let outcome = run_with_page(
        MemoryPage::new("about:blank"),
        &root,
        &config,
        &RunOptions::default(),
    )
    .unwrap();

    assert!(outcome.passed);
    assert_eq!(outcome.report_path, dir.path().join("out").join("report.json"));
    assert!(outcome.console.contains("[PASSED] Smoke"));
    assert!(outcome.console.contains("Results: 1 passed of 1 tests"));

    let json = fs::read_to_string(&outcome.report_path).unwrap();
    let doc: RunDocument = serde_json::from_str(&json).unwrap();
    assert_eq!(doc.report.test_name, "Smoke");
    assert_eq!(doc.summary.passed, 1);
}

#[test]
fn dialog_raised_while_loading_is_answered_from_queue() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Editor
url: https://app.test/editor
actions:
  - type: dialog
    action: accept
assertions:
  - type: urlContains
    expected: /editor
",
    );
    let page = MemoryPage::new("about:blank")
        .with_load_dialog("https://app.test/editor", "Restore unsaved draft?");

    let (report, page) = run(dir.path(), "root.yaml", page);

    assert_eq!(report.status, Status::Pass);
    assert_eq!(report.steps[0].phase, Phase::Navigation);
    assert_eq!(report.steps[0].status, Status::Pass);
    assert_eq!(
        page.answered_dialogs,
        vec![("Restore unsaved draft?".to_owned(), DialogResponse::Accept)]
    );
}

#[test]
fn queued_response_does_not_leak_into_child() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Parent
actions:
  - type: click
    selector: '#noop'
  - type: dialog
    action: accept
children:
  - name: Child
    actions:
      - type: click
        selector: '#delete'
",
    );
    let page = MemoryPage::new("about:blank")
        .with_element("#noop", MemoryElement::button())
        .with_element("#delete", MemoryElement::button().opens_dialog("Delete?"));

    let (report, page) = run(dir.path(), "root.yaml", page);

    assert_eq!(report.status, Status::Pass);
    assert_eq!(report.children[0].status, Status::Pass);
    assert_eq!(
        page.answered_dialogs,
        vec![("Delete?".to_owned(), DialogResponse::Dismiss)]
    );
}

#[test]
fn popup_window_is_followed_and_left() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Share post
url: https://app.test/post
actions:
  - type: click
    selector: '#share'
  - type: fill
    selector: '#comment'
    value: nice
  - type: click
    selector: '#send'
assertions:
  - type: urlContains
    expected: /post
",
    );
    let page = MemoryPage::new("about:blank")
        .with_element(
            "#share",
            MemoryElement::button().opens_popup("https://app.test/share"),
        )
        .with_popup(
            "https://app.test/share",
            [
                ("#comment", MemoryElement::textarea()),
                ("#send", MemoryElement::button().closes_window()),
            ],
        );

    let (report, page) = run(dir.path(), "root.yaml", page);

    assert_eq!(report.status, Status::Pass);
    assert_eq!(page.window_count(), 1);
    assert_eq!(page.count("popup https://app.test/share"), 1);
    assert_eq!(page.count("fill #comment nice"), 1);
    assert_eq!(page.count("close-popup https://app.test/share"), 1);
}

fn run_with_sink(dir: &Path, out: &Path, page: MemoryPage) -> TestReport {
    let loader = TestFileLoader::with_base_dir(dir);
    let mut orch =
        TestOrchestrator::with_screenshots(page, DirectorySink::new(out), loader, fast_config());
    orch.run_file("root.yaml").unwrap()
}

#[test]
fn submit_click_gets_fallback_screenshots() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Sign in
actions:
  - type: fill
    selector: '#user'
    value: alice
  - type: click
    selector: '#go'
",
    );
    let out = tempfile::tempdir().unwrap();
    let report = run_with_sink(dir.path(), out.path(), login_page());

    assert_eq!(report.status, Status::Pass);
    assert_eq!(report.screenshots.len(), 2);
    assert!(report.screenshots[0].starts_with("screenshots/Sign_in_BEFORE_SUBMIT_1_"));
    assert!(report.screenshots[1].starts_with("screenshots/Sign_in_AFTER_SUBMIT_1_"));
    for shot in &report.screenshots {
        assert!(out.path().join(shot).is_file());
    }
    assert!(report.steps.iter().all(|s| s.screenshot_path.is_none()));
}

#[test]
fn legacy_submit_list_is_captured_as_one_submit() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Legacy
fillData:
  - selector: '#user'
    value: alice
submit:
  - type: click
    selector: '#go'
  - type: waitForNavigation
",
    );
    let out = tempfile::tempdir().unwrap();
    let report = run_with_sink(dir.path(), out.path(), login_page());

    assert_eq!(report.status, Status::Pass);
    assert_eq!(report.screenshots.len(), 2);
    assert!(report.screenshots[0].starts_with("screenshots/Legacy_BEFORE_SUBMIT_1_"));
    assert!(report.screenshots[1].starts_with("screenshots/Legacy_AFTER_SUBMIT_2_"));
}

#[test]
fn explicit_capture_turns_off_fallback_screenshots() {
    let dir = tempfile::tempdir().unwrap();
    write(
        dir.path(),
        "root.yaml",
        r"
name: Sign in
actions:
  - type: fill
    selector: '#user'
    value: alice
    capture: true
  - type: click
    selector: '#go'
",
    );
    let out = tempfile::tempdir().unwrap();
    let report = run_with_sink(dir.path(), out.path(), login_page());

    assert_eq!(report.status, Status::Pass);
    assert!(report.screenshots.is_empty());
    assert!(report.steps[0].screenshot_path.is_some());
}

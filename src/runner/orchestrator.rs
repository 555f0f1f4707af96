use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::definition::{
    ActionSpec, AssertionSpec, ChildSpec, SelectorSpec, TestDefinition, value_text,
};
use crate::loader::{LoadError, TestFileLoader};
use crate::page::{DialogResponse, Page, PageError};
use crate::runner::action::{ActionDispatcher, ActionKind, ActionSettings, ActionType};
use crate::runner::assertion::AssertionDispatcher;
use crate::runner::context::{ContextStack, ExecutionContext};
use crate::runner::dialog::{DialogQueue, PendingDialog};
use crate::runner::error::DispatchError;
use crate::runner::report::{Phase, Status, StepReport, TestReport};
use crate::runner::selector;
use crate::screenshot::{
    AFTER_SUBMIT_TAG, BEFORE_SUBMIT_TAG, FAILURE_TAG, NoScreenshots, ScreenshotSink, Shot,
};

/// Skip reason for children of a test whose own steps failed.
pub const PARENT_FAILED: &str = "parent failed";

/// Skip reason for siblings after a failure with `stop_on_child_failure`.
pub const PREVIOUS_CHILD_FAILED: &str = "previous child failed";

const UNNAMED_CHILD: &str = "Unknown Child";

/// Run-level behaviour of the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrchestratorConfig {
    pub actions: ActionSettings,
    pub assertion_timeout: Duration,
    pub navigation_timeout: Duration,
    /// Skip the remaining siblings once a child fails.
    pub stop_on_child_failure: bool,
    /// Navigate back to the parent's URL between children.
    pub restore_browser_state: bool,
    /// Keep evaluating assertions after one fails.
    pub continue_on_assertion_failure: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            actions: ActionSettings::default(),
            assertion_timeout: Duration::from_millis(10_000),
            navigation_timeout: Duration::from_millis(30_000),
            stop_on_child_failure: false,
            restore_browser_state: true,
            continue_on_assertion_failure: false,
        }
    }
}

/// Which list of a definition a step came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepList {
    Actions,
    FillData,
    Submit,
}

#[derive(Debug, Clone, Copy)]
enum Planned<'d> {
    Navigate(&'d str),
    Action {
        spec: &'d ActionSpec,
        list: StepList,
    },
    Assertion(&'d AssertionSpec),
}

impl Planned<'_> {
    fn is_dialog(&self) -> bool {
        matches!(
            self,
            Self::Action { spec, .. }
                if matches!(ActionType::parse(spec.kind.as_deref()), Ok(ActionType::Dialog))
        )
    }
}

/// Flatten a definition into execution order.
fn plan(def: &TestDefinition) -> Vec<Planned<'_>> {
    let mut steps = Vec::with_capacity(def.step_count());
    if let Some(url) = def.url.as_deref() {
        steps.push(Planned::Navigate(url));
    }
    let lists = [
        (&def.actions, StepList::Actions),
        (&def.fill_data, StepList::FillData),
        (&def.submit, StepList::Submit),
    ];
    for (specs, list) in lists {
        steps.extend(specs.iter().map(|spec| Planned::Action { spec, list }));
    }
    steps.extend(def.assertions.iter().map(Planned::Assertion));
    steps
}

fn phase_for(list: StepList, action: ActionType, kind: Option<ActionKind>) -> Phase {
    match (action, list) {
        (ActionType::Dialog, _) => Phase::Dialog,
        (ActionType::WaitForNavigation, _) => Phase::Navigation,
        (_, StepList::FillData) => Phase::Fill,
        (_, StepList::Submit) => Phase::Submit,
        (_, StepList::Actions) => match kind {
            Some(kind) if !kind.is_fill() => Phase::Action,
            _ => Phase::Fill,
        },
    }
}

fn display_name(def: &TestDefinition) -> &str {
    if def.name.trim().is_empty() {
        UNNAMED_CHILD
    } else {
        &def.name
    }
}

fn skipped(name: &str, parent: &str, reason: &str) -> TestReport {
    let mut report = TestReport::new(name, Some(parent));
    report.skip(reason);
    report
}

fn trace(err: &DispatchError) -> Option<String> {
    std::error::Error::source(err).map(|_| err.chain())
}

fn selector_label(spec: Option<&SelectorSpec>) -> String {
    spec.map(|s| {
        selector::resolve(s).map_or_else(|_| selector::describe(s), |l| l.to_string())
    })
    .unwrap_or_default()
}

/// Per-test bookkeeping while its steps run.
#[derive(Debug, Default)]
struct NodeState {
    /// Plan indices of dialog steps whose response is already queued.
    registered: HashSet<usize>,
    /// `(plan index, report step position)` of recorded dialog steps.
    dialog_steps: Vec<(usize, usize)>,
    /// Take fallback captures around submits; set when no step asks for one.
    fallback: bool,
}

/// Drives a test tree against one page.
///
/// Each test runs its own steps first. Its children run only if every step
/// passed, in declared order, on the same page. A child's outcome never
/// changes how its siblings run unless `stop_on_child_failure` is set.
pub struct TestOrchestrator<P, S = NoScreenshots> {
    page: P,
    sink: S,
    loader: TestFileLoader,
    config: OrchestratorConfig,
    actions: ActionDispatcher,
    assertions: AssertionDispatcher,
    dialogs: DialogQueue,
    contexts: ContextStack,
}

impl<P: Page> TestOrchestrator<P> {
    /// Create an orchestrator that never takes screenshots.
    pub fn new(page: P, loader: TestFileLoader, config: OrchestratorConfig) -> Self {
        Self::with_screenshots(page, NoScreenshots, loader, config)
    }
}

impl<P: Page, S: ScreenshotSink> TestOrchestrator<P, S> {
    pub fn with_screenshots(
        page: P,
        sink: S,
        loader: TestFileLoader,
        config: OrchestratorConfig,
    ) -> Self {
        Self {
            actions: ActionDispatcher::new(config.actions),
            assertions: AssertionDispatcher::new(config.assertion_timeout),
            page,
            sink,
            loader,
            config,
            dialogs: DialogQueue::new(),
            contexts: ContextStack::new(),
        }
    }

    pub fn page(&self) -> &P {
        &self.page
    }

    pub fn loader(&self) -> &TestFileLoader {
        &self.loader
    }

    pub fn into_page(self) -> P {
        self.page
    }

    /// Load the document at `path` and run it as the root of a tree.
    ///
    /// # Errors
    ///
    /// Returns the [`LoadError`] if the root document cannot be loaded.
    /// Failures below the root are recorded in the returned report.
    pub fn run_file(&mut self, path: &str) -> Result<TestReport, LoadError> {
        let root = self.loader.load(path, None)?;
        Ok(self.run_definition(&root))
    }

    /// Run an already parsed definition as the root of a tree.
    ///
    /// File children resolve against the definition's source, or the
    /// loader's base directory when it has none.
    pub fn run_definition(&mut self, root: &TestDefinition) -> TestReport {
        self.contexts.clear();
        self.execute_node(root, None, None)
    }

    fn execute_node(
        &mut self,
        def: &TestDefinition,
        parent: Option<&str>,
        inherited_base: Option<&Path>,
    ) -> TestReport {
        let name = display_name(def).to_owned();
        let base: Option<PathBuf> = def
            .source
            .clone()
            .or_else(|| inherited_base.map(Path::to_path_buf));

        info!(test = %name, depth = self.contexts.depth(), "executing test");
        let mut report = TestReport::new(&name, parent);
        report.start();
        self.dialogs.reset();

        self.run_steps(def, &name, &mut report);

        let steps_failed = report.steps.iter().any(|s| s.status == Status::Fail);
        if steps_failed {
            if !def.children.is_empty() {
                warn!(
                    test = %name,
                    children = def.children.len(),
                    "test failed, skipping children"
                );
            }
            for child in &def.children {
                report.add_child(skipped(child.label(), &name, PARENT_FAILED));
            }
        } else if !def.children.is_empty() {
            self.run_children(def, &name, base.as_deref(), &mut report);
        }

        report.complete();
        info!(test = %name, status = %report.status, duration_ms = report.duration, "test finished");
        report
    }

    fn run_steps(&mut self, def: &TestDefinition, name: &str, report: &mut TestReport) {
        let steps = plan(def);
        let mut state = NodeState {
            fallback: !def.has_explicit_capture(),
            ..NodeState::default()
        };

        for (index, planned) in steps.iter().enumerate() {
            let (before_submit, after_submit) = if state.fallback {
                self.submit_edges(&steps, index)
            } else {
                (false, false)
            };
            if before_submit {
                self.capture_fallback(BEFORE_SUBMIT_TAG, name, index, report);
            }

            let (step, halt) = match *planned {
                Planned::Navigate(url) => {
                    self.run_navigation(&steps, index, url, name, &mut state)
                }
                Planned::Action { spec, list } => {
                    self.run_action(&steps, index, spec, list, name, &mut state)
                }
                Planned::Assertion(spec) => self.run_assertion(spec, name, index),
            };
            let failed = step.status == Status::Fail;
            if step.phase == Phase::Dialog {
                state.dialog_steps.push((index, report.steps.len()));
            }
            report.add_step(step);
            if failed && halt {
                debug!(test = %name, step = index, "halting after failed step");
                break;
            }
            if after_submit && !failed {
                if let Err(e) = self.page.wait_for_load(self.config.navigation_timeout) {
                    debug!(test = %name, error = %e, "page not settled after submit");
                }
                self.capture_fallback(AFTER_SUBMIT_TAG, name, index, report);
            }
        }

        for (index, position) in state.dialog_steps {
            if let Some(path) = self.dialogs.capture_for(index) {
                let step = &mut report.steps[position];
                if step.screenshot_path.is_none() {
                    step.attach_screenshot(path.to_owned());
                }
            }
        }
    }

    fn run_children(
        &mut self,
        def: &TestDefinition,
        name: &str,
        base: Option<&Path>,
        report: &mut TestReport,
    ) {
        if let Some(path) = def.source.as_deref() {
            self.loader.enter(path);
        }

        let url = self.page.current_url().unwrap_or_else(|e| {
            warn!(test = %name, error = %e, "could not read current URL");
            String::new()
        });
        info!(test = %name, %url, children = def.children.len(), "captured context");
        self.contexts.push(ExecutionContext::new(name, &url));

        let mut stop = false;
        for (i, child) in def.children.iter().enumerate() {
            if stop {
                report.add_child(skipped(child.label(), name, PREVIOUS_CHILD_FAILED));
                continue;
            }
            if i > 0 {
                self.restore_context();
            }
            let child_report = self.execute_child(child, name, base);
            if child_report.status == Status::Fail && self.config.stop_on_child_failure {
                warn!(test = %name, child = %child_report.test_name, "stopping after child failure");
                stop = true;
            }
            report.add_child(child_report);
        }

        self.contexts.pop();
        if let Some(path) = def.source.as_deref() {
            self.loader.leave(path);
        }
    }

    fn execute_child(&mut self, child: &ChildSpec, parent: &str, base: Option<&Path>) -> TestReport {
        match child {
            ChildSpec::File { path } => match self.loader.load(path, base) {
                Ok(def) => self.execute_node(&def, Some(parent), base),
                Err(e) => {
                    warn!(child = %path, error = %e, "could not load child test");
                    let mut report = TestReport::new(path, Some(parent));
                    report.start();
                    report.fail(e.to_string(), None);
                    report
                }
            },
            ChildSpec::Inline(def) => self.execute_node(def, Some(parent), base),
        }
    }

    /// Navigate back to the innermost snapshot if the page moved away.
    fn restore_context(&mut self) {
        if !self.config.restore_browser_state {
            return;
        }
        let Some(snapshot) = self.contexts.current().cloned() else {
            return;
        };
        if snapshot.url.is_empty() {
            return;
        }
        match self.page.current_url() {
            Ok(current) if !snapshot.has_drifted(&current) => {
                debug!(url = %snapshot.url, "context already at snapshot URL");
            }
            _ => {
                info!(test = %snapshot.test_name, url = %snapshot.url, "restoring context");
                let timeout = self.config.navigation_timeout;
                let loaded = self.page.navigate(&snapshot.url, timeout);
                if let Err(e) = self.settle_load(loaded, timeout, &snapshot.test_name) {
                    warn!(url = %snapshot.url, error = %e, "context restore failed");
                }
            }
        }
    }

    /// Whether the step at `index` opens and/or closes a form submit.
    ///
    /// The legacy `submit` list counts as one submit. In `actions`, a click
    /// on a submit button is a submit of its own.
    fn submit_edges(&mut self, steps: &[Planned<'_>], index: usize) -> (bool, bool) {
        let in_submit = |i: usize| {
            matches!(
                steps.get(i),
                Some(Planned::Action {
                    list: StepList::Submit,
                    ..
                })
            )
        };
        match steps.get(index) {
            Some(Planned::Action {
                list: StepList::Submit,
                ..
            }) => (index == 0 || !in_submit(index - 1), !in_submit(index + 1)),
            Some(Planned::Action {
                spec,
                list: StepList::Actions,
            }) if self.is_submit_click(spec) => (true, true),
            _ => (false, false),
        }
    }

    fn is_submit_click(&mut self, spec: &ActionSpec) -> bool {
        if !matches!(
            ActionType::parse(spec.kind.as_deref()),
            Ok(ActionType::Element(ActionKind::Click))
        ) {
            return false;
        }
        let Some(Ok(locator)) = spec.selector.as_ref().map(selector::resolve) else {
            return false;
        };
        self.page
            .element_kind(&locator)
            .is_ok_and(|kind| kind.is_submit())
    }

    /// Answer dialogs raised while a page loaded, then confirm the load.
    ///
    /// A dialog opened by page script blocks the load check; it is answered
    /// from the queue before the check runs again.
    fn settle_load(
        &mut self,
        loaded: Result<(), PageError>,
        timeout: Duration,
        name: &str,
    ) -> Result<(), PageError> {
        match loaded {
            Ok(()) => self.sweep_dialogs(name),
            Err(PageError::AlertOpen(message)) => {
                debug!(test = %name, %message, "dialog opened during page load");
                self.sweep_dialogs(name)?;
                self.page.wait_for_load(timeout)?;
                self.sweep_dialogs(name)
            }
            Err(e) => {
                if let Err(sweep) = self.sweep_dialogs(name) {
                    warn!(error = %sweep, "could not clear dialogs after failed load");
                }
                Err(e)
            }
        }
    }

    fn run_navigation(
        &mut self,
        steps: &[Planned<'_>],
        index: usize,
        url: &str,
        name: &str,
        state: &mut NodeState,
    ) -> (StepReport, bool) {
        let mut step = StepReport::new(Phase::Navigation, "goto", "url", Some(url));
        self.register_following_dialogs(steps, index, state);
        step.start();
        info!(test = %name, %url, "navigating");
        let timeout = self.config.navigation_timeout;
        let loaded = self.page.navigate(url, timeout);
        match self.settle_load(loaded, timeout, name) {
            Ok(()) => step.pass(),
            Err(e) => self.fail_step(&mut step, name, index, &DispatchError::from(e)),
        }
        (step, true)
    }

    fn run_action(
        &mut self,
        steps: &[Planned<'_>],
        index: usize,
        spec: &ActionSpec,
        list: StepList,
        name: &str,
        state: &mut NodeState,
    ) -> (StepReport, bool) {
        let selector = selector_label(spec.selector.as_ref());
        let action = match ActionType::parse(spec.kind.as_deref()) {
            Ok(action) => action,
            Err(e) => {
                let label = spec.kind.as_deref().unwrap_or("fill");
                let mut step = StepReport::new(phase_for(list, ActionType::Detect, None), label, &selector, None);
                step.start();
                self.fail_step(&mut step, name, index, &e);
                return (step, true);
            }
        };

        match action {
            ActionType::Dialog => (self.run_dialog_step(index, spec, state), true),
            ActionType::WaitForNavigation => {
                let timeout = spec
                    .timeout
                    .map_or(self.config.navigation_timeout, Duration::from_millis);
                let mut step = StepReport::new(Phase::Navigation, action.label(), "page", None);
                self.register_following_dialogs(steps, index, state);
                step.start();
                let loaded = self.page.wait_for_load(timeout);
                match self.settle_load(loaded, timeout, name) {
                    Ok(()) => step.pass(),
                    Err(e) => self.fail_step(&mut step, name, index, &DispatchError::from(e)),
                }
                (step, true)
            }
            ActionType::Element(_) | ActionType::Detect => {
                let declared = match action {
                    ActionType::Element(kind) => Some(kind),
                    _ => None,
                };
                let value = spec.value.as_ref().map(value_text);
                let mut step = StepReport::new(
                    phase_for(list, action, declared),
                    action.label(),
                    &selector,
                    value.as_deref(),
                );

                self.register_following_dialogs(steps, index, state);
                step.start();
                match self.actions.dispatch(&mut self.page, spec, declared) {
                    Ok(kind) => {
                        step.action_type = kind.name().to_owned();
                        step.phase = phase_for(list, action, Some(kind));
                        match self.sweep_dialogs(name) {
                            Ok(()) => {
                                step.pass();
                                if spec.capture {
                                    self.capture_step(&mut step, spec, name, index);
                                }
                            }
                            Err(e) => self.fail_step(&mut step, name, index, &DispatchError::from(e)),
                        }
                    }
                    Err(e) => {
                        if let Err(sweep) = self.sweep_dialogs(name) {
                            warn!(error = %sweep, "could not clear dialogs after failed action");
                        }
                        self.fail_step(&mut step, name, index, &e);
                    }
                }
                (step, true)
            }
        }
    }

    /// Queue responses for the dialog steps directly after `index`.
    fn register_following_dialogs(
        &mut self,
        steps: &[Planned<'_>],
        index: usize,
        state: &mut NodeState,
    ) {
        for (next, planned) in steps.iter().enumerate().skip(index + 1) {
            let Planned::Action { spec, .. } = planned else {
                break;
            };
            if !planned.is_dialog() {
                break;
            }
            if state.registered.insert(next) {
                self.dialogs.register(self.pending_dialog(next, spec));
            }
        }
    }

    fn pending_dialog(&self, index: usize, spec: &ActionSpec) -> PendingDialog {
        PendingDialog {
            response: DialogResponse::parse(spec.action.as_deref().unwrap_or("dismiss")),
            step_index: index,
            capture: spec.capture,
            capture_delay: spec
                .capture_delay_ms
                .map_or(self.config.actions.settle_delay, Duration::from_millis),
        }
    }

    fn run_dialog_step(&mut self, index: usize, spec: &ActionSpec, state: &mut NodeState) -> StepReport {
        let response = DialogResponse::parse(spec.action.as_deref().unwrap_or("dismiss"));
        let keyword = response.to_string();
        let mut step = StepReport::new(Phase::Dialog, "dialog", "dialog", Some(&keyword));
        step.start();
        if state.registered.insert(index) {
            self.dialogs.register(self.pending_dialog(index, spec));
        } else {
            debug!(step = index, "dialog response already queued");
        }
        step.pass();
        step
    }

    fn run_assertion(&mut self, spec: &AssertionSpec, name: &str, index: usize) -> (StepReport, bool) {
        let label = spec.kind.as_deref().unwrap_or("assertion");
        let selector = if spec.selector.is_some() {
            selector_label(spec.selector.as_ref())
        } else {
            "url".to_owned()
        };
        let expected = spec.expected.as_ref().map(value_text);
        let mut step = StepReport::new(Phase::Assert, label, &selector, expected.as_deref());
        step.start();

        match self.assertions.check(&mut self.page, spec) {
            Ok(result) if result.passed => {
                debug!(test = %name, message = %result.message, "assertion passed");
                step.pass();
                (step, false)
            }
            Ok(result) => {
                warn!(test = %name, message = %result.message, "assertion failed");
                self.capture_failure(&mut step, name, index);
                step.fail(result.message, None);
                let keep_going = spec.stop_on_failure == Some(false)
                    || self.config.continue_on_assertion_failure;
                (step, !keep_going)
            }
            Err(e) => {
                self.fail_step(&mut step, name, index, &e);
                (step, true)
            }
        }
    }

    fn sweep_dialogs(&mut self, name: &str) -> Result<(), PageError> {
        self.dialogs
            .sweep(&mut self.page, &mut self.sink, name)
            .map(|_| ())
    }

    fn capture_step(&mut self, step: &mut StepReport, spec: &ActionSpec, name: &str, index: usize) {
        if let Some(delay) = spec.capture_delay_ms.filter(|d| *d > 0) {
            thread::sleep(Duration::from_millis(delay));
        }
        let tag = step.phase.to_string();
        let shot = Shot {
            test_name: name,
            tag: &tag,
            step_index: index,
        };
        if let Some(path) = self.sink.capture(&mut self.page, &shot) {
            step.attach_screenshot(path);
        }
    }

    fn capture_fallback(&mut self, tag: &str, name: &str, index: usize, report: &mut TestReport) {
        let shot = Shot {
            test_name: name,
            tag,
            step_index: index,
        };
        if let Some(path) = self.sink.capture(&mut self.page, &shot) {
            debug!(test = %name, tag, %path, "fallback screenshot");
            report.screenshots.push(path);
        }
    }

    fn capture_failure(&mut self, step: &mut StepReport, name: &str, index: usize) {
        let shot = Shot {
            test_name: name,
            tag: FAILURE_TAG,
            step_index: index,
        };
        if let Some(path) = self.sink.capture(&mut self.page, &shot) {
            step.attach_screenshot(path);
        }
    }

    fn fail_step(&mut self, step: &mut StepReport, name: &str, index: usize, err: &DispatchError) {
        warn!(test = %name, step = index, error = %err, "step failed");
        self.capture_failure(step, name, index);
        step.fail(err.to_string(), trace(err));
    }
}

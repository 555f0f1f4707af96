use std::fs;
use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::{ReportFormat, RunConfig};
use crate::emit::dot::emit_dot;
use crate::emit::mermaid::emit_mermaid;
use crate::emit::run_result::{RunDocument, emit_run_json, emit_run_junit, emit_run_yaml};
use crate::graph::analysis::{max_depth, shared_nodes, total_steps};
use crate::graph::builder::build;
use crate::loader::{TestFileLoader, TreeNode};
use crate::page::Page;
use crate::page::webdriver::WebDriverPage;
use crate::runner::display::{format_report, format_run_header, format_summary};
use crate::runner::orchestrator::TestOrchestrator;
use crate::runner::report::Status;
use crate::screenshot::DirectorySink;

/// Options for the `run` command. `None` and `false` keep the config value.
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub config: Option<PathBuf>,
    pub webdriver: Option<String>,
    pub browser: Option<String>,
    pub headless: bool,
    pub format: Option<String>,
    pub output: Option<PathBuf>,
    pub stop_on_child_failure: bool,
    pub no_restore: bool,
    pub continue_on_assertion_failure: bool,
    pub verbose: bool,
}

impl RunOptions {
    /// Layer the command-line flags over a loaded config.
    ///
    /// # Errors
    ///
    /// Returns an error string for an unknown report format.
    pub fn apply(&self, config: &mut RunConfig) -> Result<(), String> {
        if let Some(url) = &self.webdriver {
            config.browser.webdriver_url.clone_from(url);
        }
        if let Some(browser) = &self.browser {
            config.browser.kind.clone_from(browser);
        }
        if self.headless {
            config.browser.headless = true;
        }
        if let Some(format) = &self.format {
            config.report.format = ReportFormat::parse(format).map_err(|e| e.to_string())?;
        }
        let exec = &mut config.test_execution;
        if self.stop_on_child_failure {
            exec.stop_on_child_failure = true;
        }
        if self.no_restore {
            exec.restore_browser_state = false;
        }
        if self.continue_on_assertion_failure {
            exec.continue_on_assertion_failure = true;
        }
        Ok(())
    }
}

/// What a finished run produced.
#[derive(Debug)]
pub struct RunOutcome {
    /// Report tree and summary for the terminal.
    pub console: String,
    /// Where the serialized report was written.
    pub report_path: PathBuf,
    /// Whether the root test passed.
    pub passed: bool,
}

fn path_str(file: &Path) -> Result<&str, String> {
    file.to_str()
        .ok_or_else(|| format!("path is not valid UTF-8: {}", file.display()))
}

fn current_loader() -> Result<TestFileLoader, String> {
    TestFileLoader::new().map_err(|e| format!("failed to read working directory: {e}"))
}

/// Run the `run` command: drive a browser through the test tree at `file`.
///
/// # Errors
///
/// Returns an error string if the config cannot be loaded, the browser
/// session cannot be opened, the root document cannot be loaded, or the
/// report cannot be written.
pub fn run_run(file: &Path, options: &RunOptions) -> Result<RunOutcome, String> {
    let cwd = std::env::current_dir().map_err(|e| format!("failed to read working directory: {e}"))?;
    let mut config = RunConfig::discover(options.config.as_deref(), &cwd).map_err(|e| e.to_string())?;
    options.apply(&mut config)?;

    eprint!("{}", format_run_header(&file.display().to_string(), &config.browser.kind));
    let page = WebDriverPage::connect(&config.webdriver())
        .map_err(|e| format!("failed to start browser session: {e}"))?;
    run_with_page(page, file, &config, options)
}

/// Run the test tree at `file` on an already opened page.
///
/// # Errors
///
/// Returns an error string if the root document cannot be loaded or the
/// report cannot be written.
pub fn run_with_page<P: Page>(
    page: P,
    file: &Path,
    config: &RunConfig,
    options: &RunOptions,
) -> Result<RunOutcome, String> {
    let mut sink = DirectorySink::new(&config.report.output_dir);
    sink.enabled = config.screenshots.enabled;
    sink.on_failure = config.screenshots.on_failure;

    let mut orchestrator =
        TestOrchestrator::with_screenshots(page, sink, current_loader()?, config.orchestrator());
    let report = orchestrator
        .run_file(path_str(file)?)
        .map_err(|e| e.to_string())?;
    let passed = report.status == Status::Pass;

    let doc = RunDocument::new(report);
    let format = config.report.format;
    let rendered = match format {
        ReportFormat::Yaml => emit_run_yaml(&doc),
        ReportFormat::Json => emit_run_json(&doc),
        ReportFormat::Junit => emit_run_junit(&doc),
    };

    let report_path = options.output.clone().unwrap_or_else(|| {
        config
            .report
            .output_dir
            .join(format!("report.{}", format.extension()))
    });
    if let Some(parent) = report_path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .map_err(|e| format!("failed to create {}: {e}", parent.display()))?;
    }
    fs::write(&report_path, rendered)
        .map_err(|e| format!("failed to write {}: {e}", report_path.display()))?;
    info!(path = %report_path.display(), "report written");

    let console = format!(
        "{}\n{}",
        format_report(&doc.report, options.verbose),
        format_summary(&doc.summary)
    );
    Ok(RunOutcome {
        console,
        report_path,
        passed,
    })
}

/// Statically load a whole tree, following every file child.
fn load_tree(file: &Path) -> Result<TreeNode, String> {
    current_loader()?
        .load_tree(path_str(file)?)
        .map_err(|e| e.to_string())
}

/// Run the `validate` command: load each tree and report its shape.
///
/// # Errors
///
/// Returns an error string for the first tree that fails to load.
pub fn run_validate(files: &[PathBuf]) -> Result<String, String> {
    let mut results = Vec::new();

    for file in files {
        let tree = load_tree(file)?;
        let ig = build(&tree);
        let shared = shared_nodes(&ig).len();
        let mut line = format!(
            "{}: {} is valid ({} tests, {} files, {} steps, depth {})",
            file.display(),
            tree.definition.name,
            tree.count(),
            tree.file_count(),
            total_steps(&ig),
            max_depth(&ig),
        );
        if shared > 0 {
            line.push_str(&format!(", {shared} shared"));
        }
        results.push(line);
    }

    Ok(results.join("\n"))
}

/// Run the `visualize` command: output the inclusion graph of a tree.
///
/// # Errors
///
/// Returns an error string if loading fails, the format is unknown, or the
/// output cannot be written.
pub fn run_visualize(file: &Path, format: &str, output: Option<&PathBuf>) -> Result<String, String> {
    let tree = load_tree(file)?;
    let ig = build(&tree);

    let diagram = match format {
        "dot" => emit_dot(&ig),
        "mermaid" => emit_mermaid(&ig),
        other => return Err(format!("unknown format '{other}' (expected: dot, mermaid)")),
    };

    if let Some(out_path) = output {
        fs::write(out_path, &diagram)
            .map_err(|e| format!("failed to write {}: {e}", out_path.display()))?;
        Ok(format!("diagram written to {}", out_path.display()))
    } else {
        Ok(diagram)
    }
}

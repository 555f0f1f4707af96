use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::page::webdriver::WebDriverConfig;
use crate::runner::action::ActionSettings;
use crate::runner::orchestrator::OrchestratorConfig;

/// File picked up from the working directory when no `--config` is given.
pub const DEFAULT_CONFIG_FILE: &str = "uiflow.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("invalid config value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// Report output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    #[serde(alias = "yml")]
    Yaml,
    Json,
    #[serde(alias = "xml")]
    Junit,
}

impl ReportFormat {
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] for anything but `yaml`, `json`,
    /// `junit` (or its alias `xml`).
    pub fn parse(value: &str) -> Result<Self, ConfigError> {
        match value.trim().to_ascii_lowercase().as_str() {
            "yaml" | "yml" => Ok(Self::Yaml),
            "json" => Ok(Self::Json),
            "junit" | "xml" => Ok(Self::Junit),
            other => Err(ConfigError::Invalid {
                field: "report.format",
                reason: format!("unknown format '{other}' (expected: yaml, json, junit)"),
            }),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Yaml => "yaml",
            Self::Json => "json",
            Self::Junit => "xml",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1535,
            height: 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct BrowserConfig {
    pub webdriver_url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub headless: bool,
    pub viewport: Viewport,
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            webdriver_url: "http://localhost:9515".to_owned(),
            kind: "chrome".to_owned(),
            headless: false,
            viewport: Viewport::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ReportConfig {
    pub output_dir: PathBuf,
    pub format: ReportFormat,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("report"),
            format: ReportFormat::Yaml,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScreenshotConfig {
    pub enabled: bool,
    pub on_failure: bool,
}

impl Default for ScreenshotConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            on_failure: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ExecutionConfig {
    pub stop_on_child_failure: bool,
    pub restore_browser_state: bool,
    pub continue_on_assertion_failure: bool,
    pub action_timeout_ms: u64,
    pub assertion_timeout_ms: u64,
    pub navigation_timeout_ms: u64,
    pub settle_delay_ms: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            stop_on_child_failure: false,
            restore_browser_state: true,
            continue_on_assertion_failure: false,
            action_timeout_ms: 5000,
            assertion_timeout_ms: 10_000,
            navigation_timeout_ms: 30_000,
            settle_delay_ms: 300,
        }
    }
}

/// Settings for one `run` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RunConfig {
    pub browser: BrowserConfig,
    pub report: ReportConfig,
    pub screenshots: ScreenshotConfig,
    pub test_execution: ExecutionConfig,
}

impl RunConfig {
    /// Read a config file. Missing sections and keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] or [`ConfigError::Parse`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let config = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Load `explicit` if given, else [`DEFAULT_CONFIG_FILE`] from `dir` if
    /// it exists, else the defaults.
    ///
    /// # Errors
    ///
    /// Returns the load error of whichever file was chosen.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let fallback = dir.join(DEFAULT_CONFIG_FILE);
        if fallback.is_file() {
            Self::load(&fallback)
        } else {
            Ok(Self::default())
        }
    }

    pub fn webdriver(&self) -> WebDriverConfig {
        WebDriverConfig {
            endpoint: self.browser.webdriver_url.clone(),
            browser: self.browser.kind.clone(),
            headless: self.browser.headless,
            viewport: (self.browser.viewport.width, self.browser.viewport.height),
            ..WebDriverConfig::default()
        }
    }

    pub fn orchestrator(&self) -> OrchestratorConfig {
        let exec = &self.test_execution;
        OrchestratorConfig {
            actions: ActionSettings {
                visibility_timeout: Duration::from_millis(exec.action_timeout_ms),
                settle_delay: Duration::from_millis(exec.settle_delay_ms),
            },
            assertion_timeout: Duration::from_millis(exec.assertion_timeout_ms),
            navigation_timeout: Duration::from_millis(exec.navigation_timeout_ms),
            stop_on_child_failure: exec.stop_on_child_failure,
            restore_browser_state: exec.restore_browser_state,
            continue_on_assertion_failure: exec.continue_on_assertion_failure,
        }
    }
}

use std::path::PathBuf;

use serde::Deserialize;
use serde_yaml::Value;

/// A test node parsed from a YAML document.
///
/// Every list is optional in the document and defaults to empty. `source`
/// is never read from YAML; the loader fills it with the resolved path of
/// the file the definition came from.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestDefinition {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub actions: Vec<ActionSpec>,
    /// Legacy fill phase, executed after `actions`.
    #[serde(default)]
    pub fill_data: Vec<ActionSpec>,
    /// Legacy submit phase, executed after `fill_data`.
    #[serde(default)]
    pub submit: Vec<ActionSpec>,
    #[serde(default)]
    pub assertions: Vec<AssertionSpec>,
    #[serde(default)]
    pub children: Vec<ChildSpec>,
    #[serde(skip)]
    pub source: Option<PathBuf>,
}

impl TestDefinition {
    /// Number of steps this node declares, navigation included.
    pub fn step_count(&self) -> usize {
        usize::from(self.url.is_some())
            + self.actions.len()
            + self.fill_data.len()
            + self.submit.len()
            + self.assertions.len()
    }

    /// Whether any step asks for its own screenshot.
    pub fn has_explicit_capture(&self) -> bool {
        self.actions
            .iter()
            .chain(&self.fill_data)
            .chain(&self.submit)
            .any(|action| action.capture)
    }
}

/// One action step descriptor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionSpec {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub selector: Option<SelectorSpec>,
    #[serde(default, alias = "inputValue")]
    pub value: Option<Value>,
    #[serde(default)]
    pub capture: bool,
    #[serde(default)]
    pub capture_delay_ms: Option<u64>,
    #[serde(default)]
    pub options: ActionOptions,
    /// Dialog response (`accept` or `dismiss`) for `dialog` steps.
    #[serde(default)]
    pub action: Option<String>,
    /// Timeout in milliseconds for `waitForNavigation` steps.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// Per-action tuning knobs.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionOptions {
    /// Settle delay after the action, in milliseconds.
    #[serde(default)]
    pub delay: Option<u64>,
    /// `value`, `label` or `index` for dropdowns.
    #[serde(default)]
    pub select_by: Option<String>,
    /// Visibility wait before the action, in milliseconds.
    #[serde(default)]
    pub timeout: Option<u64>,
}

/// One assertion descriptor.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssertionSpec {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub selector: Option<SelectorSpec>,
    #[serde(default, alias = "expectedText", alias = "expectedUrl")]
    pub expected: Option<Value>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub timeout: Option<u64>,
    /// CSS property for `style` assertions.
    #[serde(default)]
    pub property: Option<String>,
    #[serde(default)]
    pub stop_on_failure: Option<bool>,
}

/// A selector as written in a document: a raw locator string or `{by, value}`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum SelectorSpec {
    Raw(String),
    Structured {
        #[serde(default)]
        by: Option<String>,
        #[serde(default)]
        value: Option<String>,
    },
}

impl SelectorSpec {
    /// Shorthand for a structured selector.
    pub fn by(by: &str, value: &str) -> Self {
        Self::Structured {
            by: Some(by.to_owned()),
            value: Some(value.to_owned()),
        }
    }
}

/// A child entry: a file reference or an inline definition.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum ChildSpec {
    File { path: String },
    Inline(Box<TestDefinition>),
}

impl ChildSpec {
    /// Display name used when the child is reported without being loaded.
    pub fn label(&self) -> &str {
        match self {
            Self::File { path } => path,
            Self::Inline(def) if def.name.is_empty() => "Unknown Child",
            Self::Inline(def) => &def.name,
        }
    }
}

/// Render a YAML scalar the way it would be typed into a page.
///
/// Strings are returned unquoted, `null` becomes the empty string, and
/// sequences or mappings fall back to their compact YAML form.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim_end().to_owned())
            .unwrap_or_default(),
    }
}

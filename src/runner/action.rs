use std::fmt;
use std::thread;
use std::time::Duration;

use serde_yaml::Value;
use tracing::{debug, warn};

use crate::definition::{ActionSpec, value_text};
use crate::page::{Locator, OptionChoice, Page, WaitState};
use crate::runner::error::DispatchError;
use crate::runner::selector;

/// Every `type` accepted in an action list.
pub const SUPPORTED_ACTIONS: &[&str] = &[
    "fill-input",
    "fill-textarea",
    "select-dropdown",
    "checkbox",
    "radio-button",
    "click",
    "fill",
    "dialog",
    "waitForNavigation",
];

const TRUTHY: [&str; 6] = ["true", "yes", "1", "checked", "check", "on"];
const FALSY: [&str; 7] = ["false", "no", "0", "unchecked", "uncheck", "off", ""];

/// Element operations performed by the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionKind {
    FillInput,
    FillTextarea,
    SelectDropdown,
    Checkbox,
    RadioButton,
    Click,
}

impl ActionKind {
    /// Pick the operation for an element from its tag and `type` attribute.
    pub fn detect(kind: &crate::page::ElementKind) -> Self {
        match (kind.tag.as_str(), kind.input_type.as_deref()) {
            ("textarea", _) => Self::FillTextarea,
            ("select", _) => Self::SelectDropdown,
            ("input", Some("checkbox")) => Self::Checkbox,
            ("input", Some("radio")) => Self::RadioButton,
            _ => Self::FillInput,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::FillInput => "fill-input",
            Self::FillTextarea => "fill-textarea",
            Self::SelectDropdown => "select-dropdown",
            Self::Checkbox => "checkbox",
            Self::RadioButton => "radio-button",
            Self::Click => "click",
        }
    }

    /// Whether the operation enters data rather than triggering something.
    pub fn is_fill(self) -> bool {
        !matches!(self, Self::Click)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What a step descriptor asks for, before any element is inspected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Element(ActionKind),
    /// `fill` or no type: inspect the element to choose.
    Detect,
    Dialog,
    WaitForNavigation,
}

impl ActionType {
    /// Parse a step's `type`, accepting aliases case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnsupportedActionType`] for unknown types.
    pub fn parse(kind: Option<&str>) -> Result<Self, DispatchError> {
        let Some(raw) = kind else {
            return Ok(Self::Detect);
        };
        let parsed = match raw.trim().to_ascii_lowercase().as_str() {
            "fill-input" | "input" => Self::Element(ActionKind::FillInput),
            "fill-textarea" | "textarea" => Self::Element(ActionKind::FillTextarea),
            "select-dropdown" | "select" => Self::Element(ActionKind::SelectDropdown),
            "checkbox" => Self::Element(ActionKind::Checkbox),
            "radio-button" | "radio" => Self::Element(ActionKind::RadioButton),
            "click" => Self::Element(ActionKind::Click),
            "fill" | "" => Self::Detect,
            "dialog" => Self::Dialog,
            "waitfornavigation" => Self::WaitForNavigation,
            _ => {
                return Err(DispatchError::UnsupportedActionType {
                    kind: raw.to_owned(),
                    supported: SUPPORTED_ACTIONS,
                });
            }
        };
        Ok(parsed)
    }

    /// Label used in reports before the element kind is known.
    pub fn label(self) -> &'static str {
        match self {
            Self::Element(kind) => kind.name(),
            Self::Detect => "fill",
            Self::Dialog => "dialog",
            Self::WaitForNavigation => "waitForNavigation",
        }
    }
}

/// Interpret a document value as a boolean flag.
///
/// The checkbox vocabulary is always recognised; `extra_true` and
/// `extra_false` add context-specific words. Anything else falls back to
/// plain truthiness.
pub fn normalize_flag(value: &Value, extra_true: &[&str], extra_false: &[&str]) -> bool {
    if let Value::Bool(b) = value {
        return *b;
    }
    let text = value_text(value).trim().to_lowercase();
    if TRUTHY.contains(&text.as_str()) || extra_true.contains(&text.as_str()) {
        return true;
    }
    if FALSY.contains(&text.as_str()) || extra_false.contains(&text.as_str()) {
        return false;
    }
    match value {
        Value::Null => false,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        _ => true,
    }
}

/// Timing knobs for element actions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActionSettings {
    /// How long to wait for the target to become visible.
    pub visibility_timeout: Duration,
    /// Pause after each action so the page can react.
    pub settle_delay: Duration,
}

impl Default for ActionSettings {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_millis(5000),
            settle_delay: Duration::from_millis(300),
        }
    }
}

/// Turns element action descriptors into page operations.
#[derive(Debug, Clone, Default)]
pub struct ActionDispatcher {
    settings: ActionSettings,
}

impl ActionDispatcher {
    pub fn new(settings: ActionSettings) -> Self {
        Self { settings }
    }

    /// Run one element action and return the operation that was performed.
    ///
    /// Waits for the target to be visible, picks the operation (inspecting
    /// the element when `declared` is `None`), performs it and then sleeps
    /// for the settle delay.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::ElementNotFound`] when the target never
    /// becomes visible, selector and option errors from the descriptor, and
    /// [`DispatchError::Page`] when the page rejects the operation.
    pub fn dispatch(
        &self,
        page: &mut dyn Page,
        spec: &ActionSpec,
        declared: Option<ActionKind>,
    ) -> Result<ActionKind, DispatchError> {
        let locator = selector::require(spec.selector.as_ref(), "action")?;
        let timeout = spec
            .options
            .timeout
            .map_or(self.settings.visibility_timeout, Duration::from_millis);

        page.wait_for(&locator, WaitState::Visible, timeout)
            .map_err(|source| DispatchError::ElementNotFound {
                locator: locator.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                source,
            })?;

        let kind = match declared {
            Some(kind) => kind,
            None => detect(page, &locator),
        };
        debug!(action = %kind, %locator, "executing action");
        perform(page, kind, &locator, spec)?;

        let delay = spec
            .options
            .delay
            .map_or(self.settings.settle_delay, Duration::from_millis);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
        Ok(kind)
    }
}

fn detect(page: &mut dyn Page, locator: &Locator) -> ActionKind {
    match page.element_kind(locator) {
        Ok(kind) => {
            debug!(%locator, tag = %kind.tag, input_type = ?kind.input_type, "detected element");
            ActionKind::detect(&kind)
        }
        Err(e) => {
            warn!(%locator, error = %e, "could not detect element type, defaulting to fill-input");
            ActionKind::FillInput
        }
    }
}

fn perform(
    page: &mut dyn Page,
    kind: ActionKind,
    locator: &Locator,
    spec: &ActionSpec,
) -> Result<(), DispatchError> {
    let text = spec.value.as_ref().map(value_text).unwrap_or_default();
    match kind {
        ActionKind::FillInput | ActionKind::FillTextarea => page.fill(locator, &text)?,
        ActionKind::SelectDropdown => {
            let choice = option_choice(spec.options.select_by.as_deref(), &text)?;
            page.select_option(locator, &choice)?;
        }
        ActionKind::Checkbox => {
            let checked = spec
                .value
                .as_ref()
                .is_some_and(|v| normalize_flag(v, &[], &[]));
            page.set_checked(locator, checked)?;
        }
        ActionKind::RadioButton => page.set_checked(locator, true)?,
        ActionKind::Click => page.click(locator)?,
    }
    Ok(())
}

fn option_choice(select_by: Option<&str>, text: &str) -> Result<OptionChoice, DispatchError> {
    match select_by.map(str::trim).unwrap_or("value") {
        "value" => Ok(OptionChoice::Value(text.to_owned())),
        "label" => Ok(OptionChoice::Label(text.to_owned())),
        "index" => text
            .trim()
            .parse()
            .map(OptionChoice::Index)
            .map_err(|_| DispatchError::InvalidOption {
                option: "option index",
                value: text.to_owned(),
            }),
        other => Err(DispatchError::InvalidOption {
            option: "selectBy (expected value, label or index)",
            value: other.to_owned(),
        }),
    }
}

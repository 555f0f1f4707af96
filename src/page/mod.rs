//! The page capability: everything the engine needs from a browser.
//!
//! The orchestrator and dispatchers only talk to [`Page`]. Adapters live in
//! submodules: [`webdriver`] drives a real browser over the W3C WebDriver
//! protocol, [`memory`] is a scripted element table for running trees
//! without one.

pub mod memory;
pub mod webdriver;

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// A resolved, page-addressable reference to zero or more DOM elements.
///
/// Locators carrying the `xpath=` marker are XPath expressions; everything
/// else is treated as a CSS selector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Locator(String);

/// Marker prefix for XPath locators.
pub const XPATH_MARKER: &str = "xpath=";

impl Locator {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The XPath expression, if this is an XPath locator.
    pub fn xpath(&self) -> Option<&str> {
        self.0.strip_prefix(XPATH_MARKER)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Element state a wait can target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitState {
    /// Present in the DOM.
    Attached,
    /// Present and rendered.
    Visible,
    /// Absent or not rendered.
    Hidden,
}

impl fmt::Display for WaitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Attached => write!(f, "attached"),
            Self::Visible => write!(f, "visible"),
            Self::Hidden => write!(f, "hidden"),
        }
    }
}

/// Tag name and `type` attribute of an element, used for action auto-detection.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ElementKind {
    pub tag: String,
    pub input_type: Option<String>,
}

impl ElementKind {
    pub fn new(tag: &str, input_type: Option<&str>) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            input_type: input_type.map(str::to_ascii_lowercase),
        }
    }

    /// Whether clicking the element submits its form.
    pub fn is_submit(&self) -> bool {
        match (self.tag.as_str(), self.input_type.as_deref()) {
            ("button", Some("button" | "reset")) => false,
            ("button", _) => true,
            ("input", Some("submit" | "image")) => true,
            _ => false,
        }
    }
}

/// How a dropdown option is chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionChoice {
    Value(String),
    Label(String),
    Index(usize),
}

impl fmt::Display for OptionChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => write!(f, "value \"{v}\""),
            Self::Label(l) => write!(f, "label \"{l}\""),
            Self::Index(i) => write!(f, "index {i}"),
        }
    }
}

/// A native dialog currently open on the page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dialog {
    pub message: String,
}

/// How to close a dialog.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialogResponse {
    Accept,
    Dismiss,
}

impl DialogResponse {
    /// Parse a response keyword. Anything other than `accept` dismisses.
    pub fn parse(keyword: &str) -> Self {
        if keyword.trim().eq_ignore_ascii_case("accept") {
            Self::Accept
        } else {
            Self::Dismiss
        }
    }
}

impl fmt::Display for DialogResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Accept => write!(f, "accept"),
            Self::Dismiss => write!(f, "dismiss"),
        }
    }
}

/// Errors raised by page adapters.
#[derive(Debug, Error)]
pub enum PageError {
    #[error("timed out after {}ms waiting for {what}", .timeout.as_millis())]
    Timeout { what: String, timeout: Duration },

    #[error("no element matches {0}")]
    NoSuchElement(String),

    #[error("no dialog is open")]
    NoSuchAlert,

    /// The command was refused because a dialog is waiting for an answer.
    #[error("a dialog is open: {0}")]
    AlertOpen(String),

    #[error("browser rejected command: {0}")]
    Protocol(String),

    #[error("could not reach browser: {0}")]
    Transport(String),
}

/// Browser operations consumed by the engine.
///
/// Calls block until the browser has finished the operation. Waits poll
/// until `timeout` elapses and fail with [`PageError::Timeout`].
pub trait Page {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), PageError>;

    fn current_url(&mut self) -> Result<String, PageError>;

    fn wait_for(
        &mut self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), PageError>;

    /// Wait until the current document has finished loading.
    fn wait_for_load(&mut self, timeout: Duration) -> Result<(), PageError>;

    fn element_kind(&mut self, locator: &Locator) -> Result<ElementKind, PageError>;

    /// Replace the element's value with `value`.
    fn fill(&mut self, locator: &Locator, value: &str) -> Result<(), PageError>;

    fn click(&mut self, locator: &Locator) -> Result<(), PageError>;

    fn set_checked(&mut self, locator: &Locator, checked: bool) -> Result<(), PageError>;

    fn select_option(&mut self, locator: &Locator, choice: &OptionChoice)
    -> Result<(), PageError>;

    fn read_text(&mut self, locator: &Locator) -> Result<String, PageError>;

    fn read_value(&mut self, locator: &Locator) -> Result<String, PageError>;

    fn read_computed_style(&mut self, locator: &Locator, property: &str)
    -> Result<String, PageError>;

    fn is_visible(&mut self, locator: &Locator) -> Result<bool, PageError>;

    fn is_enabled(&mut self, locator: &Locator) -> Result<bool, PageError>;

    /// The dialog currently open, if any. Dialogs are reported until answered.
    fn take_dialog(&mut self) -> Result<Option<Dialog>, PageError>;

    fn respond_to_dialog(&mut self, response: DialogResponse) -> Result<(), PageError>;

    /// PNG bytes of the current viewport.
    fn screenshot(&mut self) -> Result<Vec<u8>, PageError>;
}

use std::fmt;
use std::thread;
use std::time::{Duration, Instant};

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::definition::{AssertionSpec, value_text};
use crate::page::{Locator, Page, PageError, WaitState};
use crate::runner::action::normalize_flag;
use crate::runner::error::DispatchError;
use crate::runner::selector;

/// Every `type` accepted in an assertion list.
pub const SUPPORTED_ASSERTIONS: &[&str] = &[
    "textContent",
    "inputValue",
    "visibility",
    "enabled",
    "style",
    "exists",
    "urlContains",
];

const URL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Outcome of one check. A failed check is a result, not an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionResult {
    pub passed: bool,
    pub actual: String,
    pub expected: String,
    pub message: String,
}

impl AssertionResult {
    fn new(passed: bool, actual: &str, expected: &str, message: String) -> Self {
        Self {
            passed,
            actual: actual.to_owned(),
            expected: expected.to_owned(),
            message,
        }
    }
}

/// Assertion families with their alias-derived defaults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssertionKind {
    TextContent,
    InputValue,
    /// `visible_by_default` is false for the `hidden` alias.
    Visibility { visible_by_default: bool },
    /// `enabled_by_default` is false for the `disabled` alias.
    Enabled { enabled_by_default: bool },
    Style,
    Exists,
    UrlContains,
}

impl AssertionKind {
    /// Parse an assertion `type`, accepting aliases case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::MissingField`] when no type is given and
    /// [`DispatchError::UnsupportedAssertionType`] for unknown types.
    pub fn parse(kind: Option<&str>) -> Result<Self, DispatchError> {
        let raw = kind
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| DispatchError::missing("type", "assertion"))?;
        let parsed = match raw.trim().to_ascii_lowercase().as_str() {
            "textcontent" | "text" => Self::TextContent,
            "inputvalue" | "value" => Self::InputValue,
            "visibility" | "visible" => Self::Visibility {
                visible_by_default: true,
            },
            "hidden" => Self::Visibility {
                visible_by_default: false,
            },
            "enabled" => Self::Enabled {
                enabled_by_default: true,
            },
            "disabled" => Self::Enabled {
                enabled_by_default: false,
            },
            "style" | "css" => Self::Style,
            "exists" => Self::Exists,
            "urlcontains" | "url" => Self::UrlContains,
            _ => {
                return Err(DispatchError::UnsupportedAssertionType {
                    kind: raw.to_owned(),
                    supported: SUPPORTED_ASSERTIONS,
                });
            }
        };
        Ok(parsed)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::TextContent => "textContent",
            Self::InputValue => "inputValue",
            Self::Visibility { .. } => "visibility",
            Self::Enabled { .. } => "enabled",
            Self::Style => "style",
            Self::Exists => "exists",
            Self::UrlContains => "urlContains",
        }
    }

    /// Whether the check targets an element.
    pub fn needs_selector(self) -> bool {
        !matches!(self, Self::UrlContains)
    }
}

impl fmt::Display for AssertionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Comparison applied to text and value checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Equals,
    Contains,
    Regex,
}

impl Operator {
    fn parse(
        operator: Option<&str>,
        assertion: AssertionKind,
        allow_regex: bool,
    ) -> Result<Self, DispatchError> {
        let Some(raw) = operator else {
            return Ok(Self::Equals);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "equals" | "equal" | "==" => Ok(Self::Equals),
            "contains" | "includes" => Ok(Self::Contains),
            "regex" | "regexp" | "matches" if allow_regex => Ok(Self::Regex),
            _ => Err(DispatchError::UnsupportedOperator {
                operator: raw.to_owned(),
                assertion: assertion.name(),
            }),
        }
    }
}

/// Evaluates assertion descriptors against a page.
#[derive(Debug, Clone)]
pub struct AssertionDispatcher {
    default_timeout: Duration,
}

impl Default for AssertionDispatcher {
    fn default() -> Self {
        Self::new(Duration::from_millis(10_000))
    }
}

impl AssertionDispatcher {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }

    /// Evaluate one assertion.
    ///
    /// # Errors
    ///
    /// Returns a [`DispatchError`] when the descriptor is malformed or the
    /// target of a text or value check never appears. Checks that simply
    /// do not hold are reported through [`AssertionResult::passed`].
    pub fn check(
        &self,
        page: &mut dyn Page,
        spec: &AssertionSpec,
    ) -> Result<AssertionResult, DispatchError> {
        let kind = AssertionKind::parse(spec.kind.as_deref())?;
        let timeout = spec.timeout.map_or(self.default_timeout, Duration::from_millis);
        let expected = spec.expected.as_ref().map(value_text).unwrap_or_default();
        let expected = expected.trim();

        if !kind.needs_selector() {
            return Ok(url_contains(page, expected, timeout)?);
        }
        let locator = selector::require(spec.selector.as_ref(), "assertion")?;
        debug!(assertion = %kind, %locator, "checking");
        check_element(page, kind, &locator, spec, expected, timeout)
    }
}

fn check_element(
    page: &mut dyn Page,
    kind: AssertionKind,
    locator: &Locator,
    spec: &AssertionSpec,
    expected: &str,
    timeout: Duration,
) -> Result<AssertionResult, DispatchError> {
    match kind {
        AssertionKind::TextContent => {
            let operator = Operator::parse(spec.operator.as_deref(), kind, true)?;
            wait_visible(page, locator, timeout)?;
            let actual = page.read_text(locator)?;
            compare("text", actual.trim(), expected, operator)
        }
        AssertionKind::InputValue => {
            let operator = Operator::parse(spec.operator.as_deref(), kind, false)?;
            wait_visible(page, locator, timeout)?;
            let actual = page.read_value(locator)?;
            compare("input value", actual.trim(), expected, operator)
        }
        AssertionKind::Visibility { visible_by_default } => {
            let want_visible = spec.expected.as_ref().map_or(visible_by_default, |v| {
                normalize_flag(v, &["visible", "shown"], &["hidden", "invisible"])
            });
            Ok(visibility(page, locator, want_visible, timeout)?)
        }
        AssertionKind::Enabled { enabled_by_default } => {
            let want_enabled = spec
                .expected
                .as_ref()
                .map_or(enabled_by_default, |v| normalize_flag(v, &["enabled"], &["disabled"]));
            Ok(enabled(page, locator, want_enabled, timeout)?)
        }
        AssertionKind::Style => {
            let property = spec
                .property
                .as_deref()
                .filter(|p| !p.trim().is_empty())
                .ok_or_else(|| DispatchError::missing("property", "style assertion"))?;
            Ok(style(page, locator, property.trim(), expected, timeout)?)
        }
        AssertionKind::Exists => Ok(exists(page, locator, timeout)?),
        AssertionKind::UrlContains => Ok(url_contains(page, expected, timeout)?),
    }
}

fn wait_visible(page: &mut dyn Page, locator: &Locator, timeout: Duration) -> Result<(), DispatchError> {
    page.wait_for(locator, WaitState::Visible, timeout)
        .map_err(|source| DispatchError::ElementNotFound {
            locator: locator.to_string(),
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            source,
        })
}

fn compare(
    what: &str,
    actual: &str,
    expected: &str,
    operator: Operator,
) -> Result<AssertionResult, DispatchError> {
    let result = match operator {
        Operator::Equals => {
            let passed = actual == expected;
            let message = if passed {
                format!("{what} matches \"{actual}\"")
            } else {
                format!("expected {what} to equal \"{expected}\", got \"{actual}\"")
            };
            AssertionResult::new(passed, actual, expected, message)
        }
        Operator::Contains => {
            let passed = actual.contains(expected);
            let message = if passed {
                format!("{what} contains \"{expected}\"")
            } else {
                format!("expected {what} to contain \"{expected}\", got \"{actual}\"")
            };
            AssertionResult::new(passed, actual, expected, message)
        }
        Operator::Regex => {
            let pattern = Regex::new(expected).map_err(|source| DispatchError::InvalidPattern {
                pattern: expected.to_owned(),
                source,
            })?;
            let passed = pattern.is_match(actual);
            let message = if passed {
                format!("{what} matches /{expected}/")
            } else {
                format!("expected {what} to match /{expected}/, got \"{actual}\"")
            };
            AssertionResult::new(passed, actual, expected, message)
        }
    };
    Ok(result)
}

fn state_word(flag: bool, yes: &'static str, no: &'static str) -> &'static str {
    if flag { yes } else { no }
}

fn visibility(
    page: &mut dyn Page,
    locator: &Locator,
    want_visible: bool,
    timeout: Duration,
) -> Result<AssertionResult, PageError> {
    let expected = state_word(want_visible, "visible", "hidden");
    let opposite = state_word(want_visible, "hidden", "visible");
    let state = if want_visible {
        WaitState::Visible
    } else {
        WaitState::Hidden
    };
    match page.wait_for(locator, state, timeout) {
        Ok(()) => {}
        Err(e @ PageError::Timeout { .. }) => {
            return Ok(AssertionResult::new(
                false,
                opposite,
                expected,
                format!("visibility check failed: {e}"),
            ));
        }
        Err(e) => return Err(e),
    }
    let actual = state_word(page.is_visible(locator)?, "visible", "hidden");
    let passed = actual == expected;
    let message = if passed {
        format!("{locator} is {actual}")
    } else {
        format!("expected {locator} to be {expected}, but it is {actual}")
    };
    Ok(AssertionResult::new(passed, actual, expected, message))
}

fn enabled(
    page: &mut dyn Page,
    locator: &Locator,
    want_enabled: bool,
    timeout: Duration,
) -> Result<AssertionResult, PageError> {
    let expected = state_word(want_enabled, "enabled", "disabled");
    if let Err(e) = page.wait_for(locator, WaitState::Attached, timeout) {
        return match e {
            PageError::Timeout { .. } | PageError::NoSuchElement(_) => Ok(AssertionResult::new(
                false,
                "unknown",
                expected,
                format!("enabled check failed: {e}"),
            )),
            other => Err(other),
        };
    }
    let actual = state_word(page.is_enabled(locator)?, "enabled", "disabled");
    let passed = actual == expected;
    let message = if passed {
        format!("{locator} is {actual}")
    } else {
        format!("expected {locator} to be {expected}, but it is {actual}")
    };
    Ok(AssertionResult::new(passed, actual, expected, message))
}

fn style(
    page: &mut dyn Page,
    locator: &Locator,
    property: &str,
    expected: &str,
    timeout: Duration,
) -> Result<AssertionResult, PageError> {
    if let Err(e) = page.wait_for(locator, WaitState::Visible, timeout) {
        return match e {
            PageError::Timeout { .. } | PageError::NoSuchElement(_) => Ok(AssertionResult::new(
                false,
                "unknown",
                expected,
                format!("style check failed: {e}"),
            )),
            other => Err(other),
        };
    }
    let actual = page.read_computed_style(locator, property)?;
    let actual = actual.trim();
    let passed = actual == expected;
    let message = if passed {
        format!("style \"{property}\" matches \"{actual}\"")
    } else {
        format!("expected style \"{property}\" to be \"{expected}\", got \"{actual}\"")
    };
    Ok(AssertionResult::new(passed, actual, expected, message))
}

fn exists(
    page: &mut dyn Page,
    locator: &Locator,
    timeout: Duration,
) -> Result<AssertionResult, PageError> {
    match page.wait_for(locator, WaitState::Attached, timeout) {
        Ok(()) => Ok(AssertionResult::new(
            true,
            "present",
            "present",
            format!("{locator} exists"),
        )),
        Err(e @ PageError::Timeout { .. }) => Ok(AssertionResult::new(
            false,
            "absent",
            "present",
            format!("expected {locator} to exist: {e}"),
        )),
        Err(e) => Err(e),
    }
}

fn url_contains(
    page: &mut dyn Page,
    expected: &str,
    timeout: Duration,
) -> Result<AssertionResult, PageError> {
    let deadline = Instant::now() + timeout;
    loop {
        let url = page.current_url()?;
        if url.contains(expected) {
            return Ok(AssertionResult::new(
                true,
                &url,
                expected,
                format!("URL contains \"{expected}\""),
            ));
        }
        if Instant::now() >= deadline {
            return Ok(AssertionResult::new(
                false,
                &url,
                expected,
                format!("expected URL to contain \"{expected}\", got \"{url}\""),
            ));
        }
        thread::sleep(URL_POLL_INTERVAL);
    }
}

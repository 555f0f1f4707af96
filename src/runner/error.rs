use thiserror::Error;

use crate::page::PageError;

/// Errors that abort the current step.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("unsupported action type \"{kind}\" (supported: {})", .supported.join(", "))]
    UnsupportedActionType {
        kind: String,
        supported: &'static [&'static str],
    },

    #[error("unsupported assertion type \"{kind}\" (supported: {})", .supported.join(", "))]
    UnsupportedAssertionType {
        kind: String,
        supported: &'static [&'static str],
    },

    #[error("unsupported selector kind \"{0}\" (supported: id, name, css, xpath)")]
    UnsupportedSelectorKind(String),

    #[error("unsupported operator \"{operator}\" for {assertion} assertion")]
    UnsupportedOperator {
        operator: String,
        assertion: &'static str,
    },

    #[error("missing required field \"{field}\" in {context}")]
    MissingField {
        field: &'static str,
        context: &'static str,
    },

    #[error("invalid {option}: \"{value}\"")]
    InvalidOption { option: &'static str, value: String },

    #[error("invalid regular expression \"{pattern}\": {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("element {locator} not visible within {timeout_ms}ms")]
    ElementNotFound {
        locator: String,
        timeout_ms: u64,
        #[source]
        source: PageError,
    },

    #[error(transparent)]
    Page(#[from] PageError),
}

impl DispatchError {
    pub(crate) fn missing(field: &'static str, context: &'static str) -> Self {
        Self::MissingField { field, context }
    }

    /// The error followed by each underlying cause, one per line.
    pub fn chain(&self) -> String {
        let mut out = self.to_string();
        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            out.push_str("\ncaused by: ");
            out.push_str(&cause.to_string());
            source = cause.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn unsupported_action_lists_supported_set() {
        let err = DispatchError::UnsupportedActionType {
            kind: "hover".into(),
            supported: &["click", "fill-input"],
        };
        assert_eq!(
            err.to_string(),
            "unsupported action type \"hover\" (supported: click, fill-input)"
        );
    }

    #[test]
    fn chain_includes_sources() {
        let err = DispatchError::ElementNotFound {
            locator: "#go".into(),
            timeout_ms: 5000,
            source: PageError::Timeout {
                what: "#go to be visible".into(),
                timeout: Duration::from_millis(5000),
            },
        };
        assert_eq!(
            err.chain(),
            "element #go not visible within 5000ms\ncaused by: timed out after 5000ms waiting for #go to be visible"
        );
    }

    #[test]
    fn page_errors_are_transparent() {
        let err: DispatchError = PageError::NoSuchAlert.into();
        assert_eq!(err.to_string(), "no dialog is open");
        assert_eq!(err.chain(), "no dialog is open");
    }
}

use crate::definition::SelectorSpec;
use crate::page::{Locator, XPATH_MARKER};
use crate::runner::error::DispatchError;

/// Selector kinds accepted in `{by, value}` descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectorKind {
    Id,
    Name,
    Css,
    XPath,
}

impl SelectorKind {
    /// Parse a `by` keyword.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError::UnsupportedSelectorKind`] for anything other
    /// than `id`, `name`, `css` or `xpath` (case-insensitive).
    pub fn parse(by: &str) -> Result<Self, DispatchError> {
        match by.trim().to_ascii_lowercase().as_str() {
            "id" => Ok(Self::Id),
            "name" => Ok(Self::Name),
            "css" => Ok(Self::Css),
            "xpath" => Ok(Self::XPath),
            _ => Err(DispatchError::UnsupportedSelectorKind(by.to_owned())),
        }
    }

    fn locator(self, value: &str) -> String {
        match self {
            Self::Id if value.starts_with('#') => value.to_owned(),
            Self::Id => format!("#{value}"),
            Self::Name => format!("[name='{}']", value.replace('\'', "\\'")),
            Self::Css => value.to_owned(),
            Self::XPath => {
                let mut expr = value;
                while let Some(rest) = expr.strip_prefix(XPATH_MARKER) {
                    expr = rest;
                }
                format!("{XPATH_MARKER}{expr}")
            }
        }
    }
}

/// Turn a selector descriptor into a page locator.
///
/// Raw strings pass through untouched.
///
/// # Errors
///
/// Returns [`DispatchError::MissingField`] when `by` or `value` is absent or
/// empty, and [`DispatchError::UnsupportedSelectorKind`] for an unknown `by`.
pub fn resolve(spec: &SelectorSpec) -> Result<Locator, DispatchError> {
    match spec {
        SelectorSpec::Raw(raw) => Ok(Locator::new(raw.as_str())),
        SelectorSpec::Structured { by, value } => {
            let by = by
                .as_deref()
                .filter(|b| !b.trim().is_empty())
                .ok_or_else(|| DispatchError::missing("by", "selector"))?;
            let value = value
                .as_deref()
                .filter(|v| !v.is_empty())
                .ok_or_else(|| DispatchError::missing("value", "selector"))?;
            Ok(Locator::new(SelectorKind::parse(by)?.locator(value)))
        }
    }
}

/// Resolve an optional selector, reporting `context` when it is absent.
pub(crate) fn require(
    spec: Option<&SelectorSpec>,
    context: &'static str,
) -> Result<Locator, DispatchError> {
    spec.map_or_else(|| Err(DispatchError::missing("selector", context)), resolve)
}

/// Human-readable form of a selector for reports.
pub fn describe(spec: &SelectorSpec) -> String {
    match spec {
        SelectorSpec::Raw(raw) => raw.clone(),
        SelectorSpec::Structured { by, value } => format!(
            "{}={}",
            by.as_deref().unwrap_or("?"),
            value.as_deref().unwrap_or("")
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolved(by: &str, value: &str) -> String {
        resolve(&SelectorSpec::by(by, value))
            .unwrap()
            .as_str()
            .to_owned()
    }

    #[test]
    fn id_gets_hash_prefix_once() {
        assert_eq!(resolved("id", "user"), "#user");
        assert_eq!(resolved("id", "#user"), "#user");
    }

    #[test]
    fn name_escapes_single_quotes() {
        assert_eq!(resolved("name", "email"), "[name='email']");
        assert_eq!(resolved("name", "em'l"), "[name='em\\'l']");
    }

    #[test]
    fn css_passes_through() {
        assert_eq!(resolved("css", "form > .btn"), "form > .btn");
    }

    #[test]
    fn xpath_marker_is_normalized() {
        assert_eq!(resolved("xpath", "//a"), "xpath=//a");
        assert_eq!(resolved("xpath", "xpath=//a"), resolved("xpath", "//a"));
        assert_eq!(resolved("xpath", "xpath=xpath=//a"), "xpath=//a");
    }

    #[test]
    fn by_is_case_insensitive() {
        assert_eq!(resolved("ID", "user"), "#user");
    }

    #[test]
    fn raw_string_is_opaque() {
        let loc = resolve(&SelectorSpec::Raw("text=Sign in".into())).unwrap();
        assert_eq!(loc.as_str(), "text=Sign in");
    }

    #[test]
    fn unknown_kind_is_rejected() {
        let err = resolve(&SelectorSpec::by("tag", "div")).unwrap_err();
        assert!(matches!(err, DispatchError::UnsupportedSelectorKind(k) if k == "tag"));
    }

    #[test]
    fn missing_parts_are_rejected() {
        let no_by = SelectorSpec::Structured {
            by: None,
            value: Some("x".into()),
        };
        assert!(matches!(
            resolve(&no_by),
            Err(DispatchError::MissingField { field: "by", .. })
        ));
        let empty_value = SelectorSpec::by("id", "");
        assert!(matches!(
            resolve(&empty_value),
            Err(DispatchError::MissingField { field: "value", .. })
        ));
    }

    #[test]
    fn require_reports_absent_selector() {
        let err = require(None, "click action").unwrap_err();
        assert_eq!(
            err.to_string(),
            "missing required field \"selector\" in click action"
        );
    }

    #[test]
    fn describe_formats_both_shapes() {
        assert_eq!(describe(&SelectorSpec::Raw("#a".into())), "#a");
        assert_eq!(describe(&SelectorSpec::by("name", "q")), "name=q");
    }
}

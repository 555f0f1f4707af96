/// Escape text for use in XML attributes and character data.
pub(crate) fn xml_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

/// Escape text for a double-quoted DOT or Mermaid label.
pub(crate) fn label_escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup() {
        assert_eq!(
            xml_escape(r#"<a href="x">Tom & Jerry's</a>"#),
            "&lt;a href=&quot;x&quot;&gt;Tom &amp; Jerry&apos;s&lt;/a&gt;"
        );
    }

    #[test]
    fn plain_text_unchanged() {
        assert_eq!(xml_escape("Login flow"), "Login flow");
        assert_eq!(label_escape("Login flow"), "Login flow");
    }

    #[test]
    fn escapes_quotes_in_labels() {
        assert_eq!(label_escape(r#"say "hi""#), r#"say \"hi\""#);
        assert_eq!(label_escape(r"a\b"), r"a\\b");
    }
}

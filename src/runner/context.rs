use chrono::{DateTime, Utc};

/// Browser state captured before descending into a test's children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    pub test_name: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionContext {
    pub fn new(test_name: &str, url: &str) -> Self {
        Self {
            test_name: test_name.to_owned(),
            url: url.to_owned(),
            timestamp: Utc::now(),
        }
    }

    /// Whether the page has moved away from the captured URL.
    pub fn has_drifted(&self, current_url: &str) -> bool {
        self.url != current_url
    }
}

/// Stack of [`ExecutionContext`] snapshots, one per ancestor being run.
///
/// The depth equals the nesting level of the test whose children are
/// currently executing.
#[derive(Debug, Default)]
pub struct ContextStack {
    frames: Vec<ExecutionContext>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, context: ExecutionContext) {
        self.frames.push(context);
    }

    pub fn pop(&mut self) -> Option<ExecutionContext> {
        self.frames.pop()
    }

    /// The innermost snapshot.
    pub fn current(&self) -> Option<&ExecutionContext> {
        self.frames.last()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stack_is_lifo() {
        let mut stack = ContextStack::new();
        assert!(stack.is_empty());
        stack.push(ExecutionContext::new("root", "https://a.test/"));
        stack.push(ExecutionContext::new("child", "https://a.test/child"));
        assert_eq!(stack.depth(), 2);
        assert_eq!(stack.current().unwrap().test_name, "child");

        assert_eq!(stack.pop().unwrap().url, "https://a.test/child");
        assert_eq!(stack.current().unwrap().test_name, "root");
        stack.clear();
        assert!(stack.pop().is_none());
    }

    #[test]
    fn drift_compares_urls() {
        let ctx = ExecutionContext::new("root", "https://a.test/home");
        assert!(!ctx.has_drifted("https://a.test/home"));
        assert!(ctx.has_drifted("https://a.test/other"));
    }
}

use std::fs;
use std::path::PathBuf;

use chrono::Utc;
use tracing::{debug, warn};

use crate::page::Page;

/// Tag used for captures taken after a failing step.
pub const FAILURE_TAG: &str = "FAILURE";

/// Tag used for captures taken while a dialog is open.
pub const DIALOG_TAG: &str = "DIALOG";

/// Tag used for the fallback capture taken just before a form submit.
pub const BEFORE_SUBMIT_TAG: &str = "BEFORE_SUBMIT";

/// Tag used for the fallback capture taken once a form submit settled.
pub const AFTER_SUBMIT_TAG: &str = "AFTER_SUBMIT";

/// Identifies one capture request.
#[derive(Debug, Clone, Copy)]
pub struct Shot<'a> {
    pub test_name: &'a str,
    /// Phase name or one of the `*_TAG` constants.
    pub tag: &'a str,
    pub step_index: usize,
}

impl Shot<'_> {
    pub fn is_failure(&self) -> bool {
        self.tag == FAILURE_TAG
    }
}

/// Destination for screenshots.
///
/// Capturing never fails the caller: a sink that cannot store an image
/// logs the problem and returns `None`.
pub trait ScreenshotSink {
    /// Capture the page and return a reference to the stored image.
    fn capture(&mut self, page: &mut dyn Page, shot: &Shot<'_>) -> Option<String>;
}

/// A sink that never captures anything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoScreenshots;

impl ScreenshotSink for NoScreenshots {
    fn capture(&mut self, _page: &mut dyn Page, _shot: &Shot<'_>) -> Option<String> {
        None
    }
}

/// Stores PNG files under `<output_dir>/screenshots/`.
///
/// The returned reference is the path relative to `output_dir`, suitable
/// for embedding in reports written to the same directory.
#[derive(Debug, Clone)]
pub struct DirectorySink {
    output_dir: PathBuf,
    /// Capture steps that request it with `capture: true`.
    pub enabled: bool,
    /// Capture after a failing step.
    pub on_failure: bool,
}

impl DirectorySink {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            enabled: true,
            on_failure: true,
        }
    }

    pub fn screenshots_dir(&self) -> PathBuf {
        self.output_dir.join("screenshots")
    }

    fn store(&self, bytes: &[u8], shot: &Shot<'_>) -> std::io::Result<String> {
        let dir = self.screenshots_dir();
        fs::create_dir_all(&dir)?;
        let filename = file_name(shot, Utc::now().timestamp_millis());
        fs::write(dir.join(&filename), bytes)?;
        Ok(format!("screenshots/{filename}"))
    }
}

impl ScreenshotSink for DirectorySink {
    fn capture(&mut self, page: &mut dyn Page, shot: &Shot<'_>) -> Option<String> {
        let wanted = if shot.is_failure() {
            self.on_failure
        } else {
            self.enabled
        };
        if !wanted {
            return None;
        }

        let bytes = match page.screenshot() {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(test = shot.test_name, tag = shot.tag, error = %e, "screenshot failed");
                return None;
            }
        };
        match self.store(&bytes, shot) {
            Ok(reference) => {
                debug!(%reference, "screenshot stored");
                Some(reference)
            }
            Err(e) => {
                warn!(
                    dir = %self.screenshots_dir().display(),
                    error = %e,
                    "could not write screenshot"
                );
                None
            }
        }
    }
}

/// `<sanitized test name>_<tag>_<step index>_<millis>.png`
fn file_name(shot: &Shot<'_>, millis: i64) -> String {
    let sanitized: String = shot
        .test_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("{sanitized}_{}_{}_{millis}.png", shot.tag, shot.step_index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::memory::MemoryPage;

    fn shot<'a>(tag: &'a str) -> Shot<'a> {
        Shot {
            test_name: "Login flow/1",
            tag,
            step_index: 3,
        }
    }

    #[test]
    fn file_name_is_sanitized() {
        assert_eq!(
            file_name(&shot("ACTION"), 1700),
            "Login_flow_1_ACTION_3_1700.png"
        );
    }

    #[test]
    fn directory_sink_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path());
        let mut page = MemoryPage::new("https://a.test/");

        let reference = sink.capture(&mut page, &shot("ACTION")).unwrap();
        assert!(reference.starts_with("screenshots/Login_flow_1_ACTION_3_"));
        assert!(dir.path().join(&reference).is_file());
    }

    #[test]
    fn directory_sink_respects_flags() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = DirectorySink::new(dir.path());
        sink.enabled = false;
        let mut page = MemoryPage::new("https://a.test/");

        assert!(sink.capture(&mut page, &shot("ACTION")).is_none());
        assert!(sink.capture(&mut page, &shot(FAILURE_TAG)).is_some());

        sink.on_failure = false;
        assert!(sink.capture(&mut page, &shot(FAILURE_TAG)).is_none());
    }

    #[test]
    fn no_screenshots_returns_none() {
        let mut page = MemoryPage::new("https://a.test/");
        assert!(NoScreenshots.capture(&mut page, &shot("ACTION")).is_none());
    }
}

use std::collections::VecDeque;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::page::{DialogResponse, Page, PageError};
use crate::screenshot::{DIALOG_TAG, ScreenshotSink, Shot};

/// Upper bound on dialogs answered in one sweep, so a page that reopens a
/// dialog forever cannot hang the run.
const MAX_DIALOGS_PER_SWEEP: usize = 16;

/// A response waiting for the next dialog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingDialog {
    pub response: DialogResponse,
    /// Index of the dialog step that registered this response.
    pub step_index: usize,
    /// Capture the page before answering.
    pub capture: bool,
    pub capture_delay: Duration,
}

impl PendingDialog {
    pub fn new(response: DialogResponse, step_index: usize) -> Self {
        Self {
            response,
            step_index,
            capture: false,
            capture_delay: Duration::ZERO,
        }
    }
}

/// A dialog that was answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandledDialog {
    pub message: String,
    pub response: DialogResponse,
    /// `None` when no response was queued and the dialog was dismissed.
    pub step_index: Option<usize>,
    pub screenshot: Option<String>,
}

/// FIFO of dialog responses for the current test.
///
/// Responses are consumed in registration order. A dialog that appears
/// with nothing queued is dismissed.
#[derive(Debug, Default)]
pub struct DialogQueue {
    pending: VecDeque<PendingDialog>,
    handled: Vec<HandledDialog>,
}

impl DialogQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, pending: PendingDialog) {
        debug!(response = %pending.response, step = pending.step_index, "dialog response queued");
        self.pending.push_back(pending);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Drop everything queued or recorded. Called once per test.
    pub fn reset(&mut self) {
        if !self.pending.is_empty() {
            warn!(
                unused = self.pending.len(),
                "dialog responses were queued but no dialog appeared"
            );
        }
        self.pending.clear();
        self.handled.clear();
    }

    /// Dialogs answered since the last reset, in order.
    pub fn handled(&self) -> &[HandledDialog] {
        &self.handled
    }

    /// Screenshot taken for the dialog registered by `step_index`, if any.
    pub fn capture_for(&self, step_index: usize) -> Option<&str> {
        self.handled
            .iter()
            .find(|h| h.step_index == Some(step_index))
            .and_then(|h| h.screenshot.as_deref())
    }

    /// Answer every dialog currently open on `page`.
    ///
    /// Returns how many dialogs were answered.
    ///
    /// # Errors
    ///
    /// Returns the page error if the dialog cannot be inspected or answered.
    pub fn sweep(
        &mut self,
        page: &mut dyn Page,
        sink: &mut dyn ScreenshotSink,
        test_name: &str,
    ) -> Result<usize, PageError> {
        let mut answered = 0;
        while answered < MAX_DIALOGS_PER_SWEEP {
            let Some(dialog) = page.take_dialog()? else {
                break;
            };
            info!(message = %dialog.message, "dialog detected");

            let handled = match self.pending.pop_front() {
                Some(pending) => {
                    let screenshot = if pending.capture {
                        if !pending.capture_delay.is_zero() {
                            thread::sleep(pending.capture_delay);
                        }
                        sink.capture(
                            page,
                            &Shot {
                                test_name,
                                tag: DIALOG_TAG,
                                step_index: pending.step_index,
                            },
                        )
                    } else {
                        None
                    };
                    HandledDialog {
                        message: dialog.message,
                        response: pending.response,
                        step_index: Some(pending.step_index),
                        screenshot,
                    }
                }
                None => {
                    warn!(message = %dialog.message, "unexpected dialog, dismissing");
                    HandledDialog {
                        message: dialog.message,
                        response: DialogResponse::Dismiss,
                        step_index: None,
                        screenshot: None,
                    }
                }
            };

            page.respond_to_dialog(handled.response)?;
            info!(response = %handled.response, "dialog answered");
            self.handled.push(handled);
            answered += 1;
        }
        Ok(answered)
    }
}

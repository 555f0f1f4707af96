use std::collections::{HashMap, HashSet};
use std::time::Duration;

use crate::page::{
    Dialog, DialogResponse, ElementKind, Locator, OptionChoice, Page, PageError, WaitState,
};

/// Minimal PNG signature returned by [`MemoryPage::screenshot`].
const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// An element in a [`MemoryPage`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MemoryElement {
    pub tag: String,
    pub input_type: Option<String>,
    pub text: String,
    pub value: String,
    pub visible: bool,
    pub enabled: bool,
    pub checked: bool,
    pub styles: HashMap<String, String>,
    /// `(value, label)` pairs for `<select>` elements.
    pub options: Vec<(String, String)>,
    /// URL the page moves to when this element is clicked.
    pub navigates_to: Option<String>,
    /// Message of the dialog opened when this element is clicked.
    pub opens_dialog: Option<String>,
    /// URL of the popup window opened when this element is clicked.
    pub opens_popup: Option<String>,
    /// Clicking this element closes the window it lives in.
    pub closes_window: bool,
}

impl MemoryElement {
    fn with_tag(tag: &str, input_type: Option<&str>) -> Self {
        Self {
            tag: tag.to_owned(),
            input_type: input_type.map(str::to_owned),
            visible: true,
            enabled: true,
            ..Self::default()
        }
    }

    pub fn input() -> Self {
        Self::with_tag("input", Some("text"))
    }

    pub fn textarea() -> Self {
        Self::with_tag("textarea", None)
    }

    pub fn checkbox() -> Self {
        Self::with_tag("input", Some("checkbox"))
    }

    pub fn radio() -> Self {
        Self::with_tag("input", Some("radio"))
    }

    pub fn button() -> Self {
        Self::with_tag("button", None)
    }

    pub fn select(options: &[(&str, &str)]) -> Self {
        let mut element = Self::with_tag("select", None);
        element.options = options
            .iter()
            .map(|(v, l)| ((*v).to_owned(), (*l).to_owned()))
            .collect();
        element
    }

    /// A non-form element showing `text`.
    pub fn text(tag: &str, text: &str) -> Self {
        let mut element = Self::with_tag(tag, None);
        element.text = text.to_owned();
        element
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }

    pub fn with_value(mut self, value: &str) -> Self {
        self.value = value.to_owned();
        self
    }

    pub fn with_style(mut self, property: &str, value: &str) -> Self {
        self.styles.insert(property.to_owned(), value.to_owned());
        self
    }

    pub fn navigates_to(mut self, url: &str) -> Self {
        self.navigates_to = Some(url.to_owned());
        self
    }

    pub fn opens_dialog(mut self, message: &str) -> Self {
        self.opens_dialog = Some(message.to_owned());
        self
    }

    pub fn opens_popup(mut self, url: &str) -> Self {
        self.opens_popup = Some(url.to_owned());
        self
    }

    pub fn closes_window(mut self) -> Self {
        self.closes_window = true;
        self
    }
}

/// A scripted in-memory page.
///
/// Elements are keyed by their exact locator string. Waits resolve
/// immediately against the current element table. While a dialog is open
/// every command except the dialog ones fails with [`PageError::AlertOpen`],
/// the way a browser behaves. A popup becomes the current window until it
/// closes, then its opener is current again.
/// Each operation is appended to [`MemoryPage::history`].
#[derive(Debug, Clone, Default)]
pub struct MemoryPage {
    url: String,
    elements: HashMap<String, MemoryElement>,
    unreachable: HashSet<String>,
    /// Dialogs raised by page script while a URL loads.
    load_dialogs: HashMap<String, String>,
    /// Element tables of popup windows, by URL.
    popups: HashMap<String, HashMap<String, MemoryElement>>,
    /// Suspended opener windows, innermost last.
    openers: Vec<(String, HashMap<String, MemoryElement>)>,
    open_dialog: Option<Dialog>,
    /// Operations performed, in order (`navigate <url>`, `click <locator>`, ...).
    pub history: Vec<String>,
    /// Dialogs answered, in order.
    pub answered_dialogs: Vec<(String, DialogResponse)>,
}

impl MemoryPage {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            ..Self::default()
        }
    }

    pub fn with_element(mut self, locator: &str, element: MemoryElement) -> Self {
        self.elements.insert(locator.to_owned(), element);
        self
    }

    /// Make navigation to `url` fail with a transport error.
    pub fn with_unreachable(mut self, url: &str) -> Self {
        self.unreachable.insert(url.to_owned());
        self
    }

    /// Raise a dialog with `message` whenever `url` is loaded.
    pub fn with_load_dialog(mut self, url: &str, message: &str) -> Self {
        self.load_dialogs.insert(url.to_owned(), message.to_owned());
        self
    }

    /// Elements shown by the popup window at `url`.
    pub fn with_popup<'a>(
        mut self,
        url: &str,
        elements: impl IntoIterator<Item = (&'a str, MemoryElement)>,
    ) -> Self {
        let table = elements
            .into_iter()
            .map(|(locator, element)| (locator.to_owned(), element))
            .collect();
        self.popups.insert(url.to_owned(), table);
        self
    }

    /// Open a popup window at `url` and make it current.
    pub fn open_popup(&mut self, url: &str) {
        let elements = self.popups.get(url).cloned().unwrap_or_default();
        let opener_elements = std::mem::replace(&mut self.elements, elements);
        let opener_url = std::mem::replace(&mut self.url, url.to_owned());
        self.openers.push((opener_url, opener_elements));
        self.history.push(format!("popup {url}"));
    }

    /// Close the current popup and return to its opener.
    /// Returns `false` when only the main window is open.
    pub fn close_popup(&mut self) -> bool {
        let Some((url, elements)) = self.openers.pop() else {
            return false;
        };
        self.history.push(format!("close-popup {}", self.url));
        self.url = url;
        self.elements = elements;
        true
    }

    pub fn window_count(&self) -> usize {
        self.openers.len() + 1
    }

    pub fn element(&self, locator: &str) -> Option<&MemoryElement> {
        self.elements.get(locator)
    }

    pub fn element_mut(&mut self, locator: &str) -> Option<&mut MemoryElement> {
        self.elements.get_mut(locator)
    }

    /// Open a dialog as if page script had called `alert()`.
    pub fn raise_dialog(&mut self, message: &str) {
        self.open_dialog = Some(Dialog {
            message: message.to_owned(),
        });
    }

    /// Number of recorded operations starting with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.history.iter().filter(|h| h.starts_with(prefix)).count()
    }

    fn guard(&self) -> Result<(), PageError> {
        match &self.open_dialog {
            Some(dialog) => Err(PageError::AlertOpen(dialog.message.clone())),
            None => Ok(()),
        }
    }

    fn lookup(&self, locator: &Locator) -> Result<&MemoryElement, PageError> {
        self.guard()?;
        self.elements
            .get(locator.as_str())
            .ok_or_else(|| PageError::NoSuchElement(locator.to_string()))
    }

    fn lookup_mut(&mut self, locator: &Locator) -> Result<&mut MemoryElement, PageError> {
        self.guard()?;
        self.elements
            .get_mut(locator.as_str())
            .ok_or_else(|| PageError::NoSuchElement(locator.to_string()))
    }
}

impl Page for MemoryPage {
    fn navigate(&mut self, url: &str, _timeout: Duration) -> Result<(), PageError> {
        self.guard()?;
        self.history.push(format!("navigate {url}"));
        if self.unreachable.contains(url) {
            return Err(PageError::Transport(format!("connection refused: {url}")));
        }
        self.url = url.to_owned();
        if let Some(message) = self.load_dialogs.get(url).cloned() {
            self.raise_dialog(&message);
        }
        // load check
        self.guard()
    }

    fn current_url(&mut self) -> Result<String, PageError> {
        self.guard()?;
        Ok(self.url.clone())
    }

    fn wait_for(
        &mut self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), PageError> {
        self.guard()?;
        let element = self.elements.get(locator.as_str());
        let reached = match state {
            WaitState::Attached => element.is_some(),
            WaitState::Visible => element.is_some_and(|e| e.visible),
            WaitState::Hidden => element.is_none_or(|e| !e.visible),
        };
        if reached {
            Ok(())
        } else {
            Err(PageError::Timeout {
                what: format!("{locator} to be {state}"),
                timeout,
            })
        }
    }

    fn wait_for_load(&mut self, _timeout: Duration) -> Result<(), PageError> {
        self.guard()?;
        self.history.push("wait-for-load".to_owned());
        Ok(())
    }

    fn element_kind(&mut self, locator: &Locator) -> Result<ElementKind, PageError> {
        let element = self.lookup(locator)?;
        Ok(ElementKind::new(&element.tag, element.input_type.as_deref()))
    }

    fn fill(&mut self, locator: &Locator, value: &str) -> Result<(), PageError> {
        self.lookup_mut(locator)?.value = value.to_owned();
        self.history.push(format!("fill {locator} {value}"));
        Ok(())
    }

    fn click(&mut self, locator: &Locator) -> Result<(), PageError> {
        let element = self.lookup_mut(locator)?;
        match element.input_type.as_deref() {
            Some("checkbox") => element.checked = !element.checked,
            Some("radio") => element.checked = true,
            _ => {}
        }
        let navigates_to = element.navigates_to.clone();
        let opens_dialog = element.opens_dialog.clone();
        let opens_popup = element.opens_popup.clone();
        let closes_window = element.closes_window;
        self.history.push(format!("click {locator}"));
        if let Some(url) = navigates_to {
            self.url = url;
        }
        if let Some(message) = opens_dialog {
            self.raise_dialog(&message);
        }
        if let Some(url) = opens_popup {
            self.open_popup(&url);
        }
        if closes_window {
            self.close_popup();
        }
        Ok(())
    }

    fn set_checked(&mut self, locator: &Locator, checked: bool) -> Result<(), PageError> {
        self.lookup_mut(locator)?.checked = checked;
        self.history.push(format!("check {locator} {checked}"));
        Ok(())
    }

    fn select_option(
        &mut self,
        locator: &Locator,
        choice: &OptionChoice,
    ) -> Result<(), PageError> {
        let element = self.lookup_mut(locator)?;
        let picked = match choice {
            OptionChoice::Value(v) => element.options.iter().find(|(value, _)| value == v),
            OptionChoice::Label(l) => element.options.iter().find(|(_, label)| label == l),
            OptionChoice::Index(i) => element.options.get(*i),
        }
        .map(|(value, _)| value.clone())
        .ok_or_else(|| PageError::NoSuchElement(format!("option with {choice} in {locator}")))?;
        element.value = picked.clone();
        self.history.push(format!("select {locator} {picked}"));
        Ok(())
    }

    fn read_text(&mut self, locator: &Locator) -> Result<String, PageError> {
        Ok(self.lookup(locator)?.text.clone())
    }

    fn read_value(&mut self, locator: &Locator) -> Result<String, PageError> {
        Ok(self.lookup(locator)?.value.clone())
    }

    fn read_computed_style(
        &mut self,
        locator: &Locator,
        property: &str,
    ) -> Result<String, PageError> {
        Ok(self
            .lookup(locator)?
            .styles
            .get(property)
            .cloned()
            .unwrap_or_default())
    }

    fn is_visible(&mut self, locator: &Locator) -> Result<bool, PageError> {
        self.guard()?;
        Ok(self
            .elements
            .get(locator.as_str())
            .is_some_and(|e| e.visible))
    }

    fn is_enabled(&mut self, locator: &Locator) -> Result<bool, PageError> {
        Ok(self.lookup(locator)?.enabled)
    }

    fn take_dialog(&mut self) -> Result<Option<Dialog>, PageError> {
        Ok(self.open_dialog.clone())
    }

    fn respond_to_dialog(&mut self, response: DialogResponse) -> Result<(), PageError> {
        let dialog = self.open_dialog.take().ok_or(PageError::NoSuchAlert)?;
        self.history.push(format!("dialog {response}"));
        self.answered_dialogs.push((dialog.message, response));
        Ok(())
    }

    fn screenshot(&mut self) -> Result<Vec<u8>, PageError> {
        self.history.push("screenshot".to_owned());
        Ok(PNG_SIGNATURE.to_vec())
    }
}

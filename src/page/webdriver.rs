use std::thread;
use std::time::{Duration, Instant};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::page::{
    Dialog, DialogResponse, ElementKind, Locator, OptionChoice, Page, PageError, WaitState,
};

/// W3C key under which element references are returned.
const ELEMENT_KEY: &str = "element-6066-11e4-a52e-4f735466cecf";

/// Delay between polls while waiting for an element state.
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// How long a newly opened popup may take to finish loading.
const POPUP_LOAD_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for a WebDriver server (chromedriver, geckodriver, ...).
#[derive(Debug, Clone)]
pub struct WebDriverConfig {
    /// Server endpoint, e.g. `http://localhost:9515`.
    pub endpoint: String,
    /// `chrome`, `msedge`, `firefox` or `safari`.
    pub browser: String,
    pub headless: bool,
    pub viewport: (u32, u32),
    /// Upper bound for a single HTTP round trip.
    pub request_timeout: Duration,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:9515".to_owned(),
            browser: "chrome".to_owned(),
            headless: false,
            viewport: (1535, 1024),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// A [`Page`] backed by one WebDriver session.
///
/// Prompts are left open by the server (`unhandledPromptBehavior: ignore`)
/// so that the engine's dialog queue decides how each one is answered.
/// Windows opened by a click become current; when one closes, its opener
/// is current again. The session is deleted when the page is dropped.
pub struct WebDriverPage {
    agent: ureq::Agent,
    endpoint: String,
    session_id: String,
    /// Window handles from the main window to the current popup.
    windows: Vec<String>,
    closed: bool,
}

impl WebDriverPage {
    /// Open a new browser session.
    ///
    /// # Errors
    ///
    /// Returns [`PageError::Transport`] if the server cannot be reached and
    /// [`PageError::Protocol`] if it refuses the session.
    pub fn connect(config: &WebDriverConfig) -> Result<Self, PageError> {
        let agent_config = ureq::config::Config::builder()
            .http_status_as_error(false)
            .timeout_global(Some(config.request_timeout))
            .build();
        let agent = ureq::Agent::new_with_config(agent_config);
        let endpoint = config.endpoint.trim_end_matches('/').to_owned();

        let created = send(
            &agent,
            Method::Post,
            &format!("{endpoint}/session"),
            Some(&new_session_body(config)),
        )?;
        let session_id = created
            .get("sessionId")
            .and_then(Value::as_str)
            .ok_or_else(|| PageError::Protocol("session response has no sessionId".into()))?
            .to_owned();
        info!(browser = %config.browser, session = %session_id, "webdriver session started");

        let mut page = Self {
            agent,
            endpoint,
            session_id,
            windows: Vec::new(),
            closed: false,
        };
        match page.command(Method::Get, "window", None) {
            Ok(handle) => page.windows.extend(handle.as_str().map(str::to_owned)),
            Err(e) => warn!(error = %e, "could not read main window handle"),
        }
        let (width, height) = config.viewport;
        if let Err(e) = page.command(
            Method::Post,
            "window/rect",
            Some(&json!({ "width": width, "height": height })),
        ) {
            warn!(error = %e, "could not resize browser window");
        }
        Ok(page)
    }

    /// Delete the session. Called automatically on drop.
    ///
    /// # Errors
    ///
    /// Returns the error reported while deleting the session.
    pub fn quit(&mut self) -> Result<(), PageError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        let url = format!("{}/session/{}", self.endpoint, self.session_id);
        send(&self.agent, Method::Delete, &url, None).map(|_| ())
    }

    fn command(&self, method: Method, path: &str, body: Option<&Value>) -> Result<Value, PageError> {
        let url = format!("{}/session/{}/{path}", self.endpoint, self.session_id);
        send(&self.agent, method, &url, body)
    }

    fn find(&self, locator: &Locator) -> Result<String, PageError> {
        let found = self
            .command(Method::Post, "element", Some(&locator_body(locator)))
            .map_err(|e| match e {
                PageError::NoSuchElement(_) => PageError::NoSuchElement(locator.to_string()),
                other => other,
            })?;
        element_id(&found)
    }

    fn element_get(&self, id: &str, what: &str) -> Result<Value, PageError> {
        self.command(Method::Get, &format!("element/{id}/{what}"), None)
    }

    fn displayed(&self, id: &str) -> Result<bool, PageError> {
        Ok(self.element_get(id, "displayed")?.as_bool().unwrap_or(false))
    }

    fn execute(&self, script: &str, args: Value) -> Result<Value, PageError> {
        self.command(
            Method::Post,
            "execute/sync",
            Some(&json!({ "script": script, "args": args })),
        )
    }

    /// Switch to a window opened by the last command, or back to the opener
    /// if the current window was closed. Failures are logged.
    fn follow_windows(&mut self) {
        if let Err(e) = self.sync_windows() {
            warn!(error = %e, "could not check browser windows");
        }
    }

    fn sync_windows(&mut self) -> Result<(), PageError> {
        let listed = self.command(Method::Get, "window/handles", None)?;
        let open: Vec<String> = listed
            .as_array()
            .map(|handles| {
                handles
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();

        match window_switch(&mut self.windows, &open) {
            WindowSwitch::Stay => Ok(()),
            WindowSwitch::Popup(handle) => {
                info!(window = %handle, "popup opened, following it");
                self.switch_to(&handle)?;
                if let Err(e) = self.wait_for_load(POPUP_LOAD_TIMEOUT) {
                    warn!(window = %handle, error = %e, "popup did not finish loading");
                }
                Ok(())
            }
            WindowSwitch::Back(handle) => {
                info!(window = %handle, "popup closed, returning to opener");
                self.switch_to(&handle)
            }
        }
    }

    fn switch_to(&self, handle: &str) -> Result<(), PageError> {
        self.command(Method::Post, "window", Some(&json!({ "handle": handle })))?;
        Ok(())
    }

    /// Check `state` once. `Ok(false)` means "not yet".
    fn check_state(&self, locator: &Locator, state: WaitState) -> Result<bool, PageError> {
        match (self.find(locator), state) {
            (Ok(_), WaitState::Attached) => Ok(true),
            (Ok(id), WaitState::Visible) => self.displayed(&id),
            (Ok(id), WaitState::Hidden) => Ok(!self.displayed(&id)?),
            (Err(PageError::NoSuchElement(_)), WaitState::Hidden) => Ok(true),
            (Err(PageError::NoSuchElement(_)), _) => Ok(false),
            (Err(e), _) => Err(e),
        }
    }
}

impl Drop for WebDriverPage {
    fn drop(&mut self) {
        if let Err(e) = self.quit() {
            warn!(error = %e, "failed to close webdriver session");
        }
    }
}

impl Page for WebDriverPage {
    fn navigate(&mut self, url: &str, timeout: Duration) -> Result<(), PageError> {
        debug!(%url, "navigate");
        self.command(Method::Post, "url", Some(&json!({ "url": url })))?;
        self.wait_for_load(timeout)
    }

    fn current_url(&mut self) -> Result<String, PageError> {
        let value = self.command(Method::Get, "url", None)?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }

    fn wait_for(
        &mut self,
        locator: &Locator,
        state: WaitState,
        timeout: Duration,
    ) -> Result<(), PageError> {
        let deadline = Instant::now() + timeout;
        loop {
            if self.check_state(locator, state)? {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PageError::Timeout {
                    what: format!("{locator} to be {state}"),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn wait_for_load(&mut self, timeout: Duration) -> Result<(), PageError> {
        let deadline = Instant::now() + timeout;
        loop {
            let state = self.execute("return document.readyState;", json!([]))?;
            if state.as_str() == Some("complete") {
                return Ok(());
            }
            if Instant::now() >= deadline {
                return Err(PageError::Timeout {
                    what: "page load".into(),
                    timeout,
                });
            }
            thread::sleep(POLL_INTERVAL);
        }
    }

    fn element_kind(&mut self, locator: &Locator) -> Result<ElementKind, PageError> {
        let id = self.find(locator)?;
        let tag = self.element_get(&id, "name")?;
        let input_type = self.element_get(&id, "attribute/type")?;
        Ok(ElementKind::new(
            tag.as_str().unwrap_or_default(),
            input_type.as_str(),
        ))
    }

    fn fill(&mut self, locator: &Locator, value: &str) -> Result<(), PageError> {
        let id = self.find(locator)?;
        self.command(Method::Post, &format!("element/{id}/clear"), Some(&json!({})))?;
        self.command(
            Method::Post,
            &format!("element/{id}/value"),
            Some(&json!({ "text": value })),
        )?;
        Ok(())
    }

    fn click(&mut self, locator: &Locator) -> Result<(), PageError> {
        let id = self.find(locator)?;
        self.command(Method::Post, &format!("element/{id}/click"), Some(&json!({})))?;
        self.follow_windows();
        Ok(())
    }

    fn set_checked(&mut self, locator: &Locator, checked: bool) -> Result<(), PageError> {
        let id = self.find(locator)?;
        let selected = self.element_get(&id, "selected")?.as_bool().unwrap_or(false);
        if selected != checked {
            self.command(Method::Post, &format!("element/{id}/click"), Some(&json!({})))?;
            self.follow_windows();
        }
        Ok(())
    }

    fn select_option(
        &mut self,
        locator: &Locator,
        choice: &OptionChoice,
    ) -> Result<(), PageError> {
        let select = self.find(locator)?;
        let body = json!({ "using": "xpath", "value": option_xpath(choice) });
        let option = self
            .command(Method::Post, &format!("element/{select}/element"), Some(&body))
            .map_err(|e| match e {
                PageError::NoSuchElement(_) => {
                    PageError::NoSuchElement(format!("option with {choice} in {locator}"))
                }
                other => other,
            })?;
        let option = element_id(&option)?;
        self.command(Method::Post, &format!("element/{option}/click"), Some(&json!({})))?;
        Ok(())
    }

    fn read_text(&mut self, locator: &Locator) -> Result<String, PageError> {
        let id = self.find(locator)?;
        let text = self.execute(
            "return arguments[0].textContent;",
            json!([{ ELEMENT_KEY: id }]),
        )?;
        Ok(text.as_str().unwrap_or_default().to_owned())
    }

    fn read_value(&mut self, locator: &Locator) -> Result<String, PageError> {
        let id = self.find(locator)?;
        let value = self.element_get(&id, "property/value")?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }

    fn read_computed_style(
        &mut self,
        locator: &Locator,
        property: &str,
    ) -> Result<String, PageError> {
        let id = self.find(locator)?;
        let value = self.element_get(&id, &format!("css/{property}"))?;
        Ok(value.as_str().unwrap_or_default().to_owned())
    }

    fn is_visible(&mut self, locator: &Locator) -> Result<bool, PageError> {
        match self.find(locator) {
            Ok(id) => self.displayed(&id),
            Err(PageError::NoSuchElement(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn is_enabled(&mut self, locator: &Locator) -> Result<bool, PageError> {
        let id = self.find(locator)?;
        Ok(self.element_get(&id, "enabled")?.as_bool().unwrap_or(false))
    }

    fn take_dialog(&mut self) -> Result<Option<Dialog>, PageError> {
        match self.command(Method::Get, "alert/text", None) {
            Ok(text) => Ok(Some(Dialog {
                message: text.as_str().unwrap_or_default().to_owned(),
            })),
            Err(PageError::NoSuchAlert) => Ok(None),
            Err(e) => Err(e),
        }
    }

    fn respond_to_dialog(&mut self, response: DialogResponse) -> Result<(), PageError> {
        let path = match response {
            DialogResponse::Accept => "alert/accept",
            DialogResponse::Dismiss => "alert/dismiss",
        };
        self.command(Method::Post, path, Some(&json!({})))?;
        self.follow_windows();
        Ok(())
    }

    fn screenshot(&mut self) -> Result<Vec<u8>, PageError> {
        let encoded = self.command(Method::Get, "screenshot", None)?;
        STANDARD
            .decode(encoded.as_str().unwrap_or_default())
            .map_err(|e| PageError::Protocol(format!("screenshot is not base64: {e}")))
    }
}

/// What to do after the set of open windows changed.
#[derive(Debug, PartialEq, Eq)]
enum WindowSwitch {
    Stay,
    Popup(String),
    Back(String),
}

/// Reconcile the window stack with the handles the browser reports open.
fn window_switch(stack: &mut Vec<String>, open: &[String]) -> WindowSwitch {
    let current = stack.last().cloned();
    stack.retain(|handle| open.contains(handle));
    if let Some(new) = open.iter().find(|handle| !stack.contains(handle)) {
        stack.push(new.clone());
        return WindowSwitch::Popup(new.clone());
    }
    match stack.last() {
        Some(top) if current.as_ref() != Some(top) => WindowSwitch::Back(top.clone()),
        _ => WindowSwitch::Stay,
    }
}

#[derive(Debug, Clone, Copy)]
enum Method {
    Get,
    Post,
    Delete,
}

/// Perform one WebDriver round trip and unwrap the `value` member.
fn send(
    agent: &ureq::Agent,
    method: Method,
    url: &str,
    body: Option<&Value>,
) -> Result<Value, PageError> {
    let result = match method {
        Method::Get => agent.get(url).call(),
        Method::Delete => agent.delete(url).call(),
        Method::Post => {
            let payload = body.map_or_else(|| "{}".to_owned(), Value::to_string);
            agent
                .post(url)
                .header("Content-Type", "application/json")
                .send(payload.as_bytes())
        }
    };

    let mut response = result.map_err(|e| PageError::Transport(format!("{url}: {e}")))?;
    let status = response.status().as_u16();
    let text = response
        .body_mut()
        .read_to_string()
        .map_err(|e| PageError::Transport(format!("failed to read response from {url}: {e}")))?;
    parse_response(status, &text)
}

/// Unwrap a WebDriver response body, mapping W3C error codes to [`PageError`].
fn parse_response(status: u16, text: &str) -> Result<Value, PageError> {
    let parsed: Value = if text.trim().is_empty() {
        Value::Null
    } else {
        serde_json::from_str(text)
            .map_err(|e| PageError::Protocol(format!("invalid response body: {e}")))?
    };
    let value = parsed.get("value").cloned().unwrap_or(Value::Null);

    let error = value.get("error").and_then(Value::as_str);
    if status < 400 && error.is_none() {
        return Ok(value);
    }

    let error = error.unwrap_or("unknown error");
    let message = value
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_owned();
    Err(match error {
        "no such element" | "stale element reference" => PageError::NoSuchElement(message),
        "no such alert" => PageError::NoSuchAlert,
        "unexpected alert open" => PageError::AlertOpen(message),
        "timeout" | "script timeout" => PageError::Timeout {
            what: message,
            timeout: Duration::ZERO,
        },
        other => PageError::Protocol(format!("{other} (HTTP {status}): {message}")),
    })
}

fn element_id(value: &Value) -> Result<String, PageError> {
    value
        .get(ELEMENT_KEY)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| PageError::Protocol("response is not an element reference".into()))
}

fn locator_body(locator: &Locator) -> Value {
    match locator.xpath() {
        Some(xpath) => json!({ "using": "xpath", "value": xpath }),
        None => json!({ "using": "css selector", "value": locator.as_str() }),
    }
}

fn new_session_body(config: &WebDriverConfig) -> Value {
    let (width, height) = config.viewport;
    let browser = config.browser.to_ascii_lowercase();
    let mut caps = json!({ "unhandledPromptBehavior": "ignore" });

    match browser.as_str() {
        "firefox" => {
            caps["browserName"] = json!("firefox");
            let args: Vec<&str> = if config.headless { vec!["-headless"] } else { vec![] };
            caps["moz:firefoxOptions"] = json!({ "args": args });
        }
        "safari" | "webkit" => {
            caps["browserName"] = json!("safari");
        }
        "msedge" | "edge" => {
            caps["browserName"] = json!("MicrosoftEdge");
            caps["ms:edgeOptions"] = json!({ "args": chromium_args(config.headless, width, height) });
        }
        _ => {
            caps["browserName"] = json!("chrome");
            caps["goog:chromeOptions"] =
                json!({ "args": chromium_args(config.headless, width, height) });
        }
    }

    json!({ "capabilities": { "alwaysMatch": caps } })
}

fn chromium_args(headless: bool, width: u32, height: u32) -> Vec<String> {
    let mut args = vec![format!("--window-size={width},{height}")];
    if headless {
        args.push("--headless=new".to_owned());
    }
    args
}

/// XPath (relative to a `<select>`) for the option matching `choice`.
fn option_xpath(choice: &OptionChoice) -> String {
    match choice {
        OptionChoice::Value(v) => format!(".//option[@value={}]", xpath_literal(v)),
        OptionChoice::Label(l) => format!(".//option[normalize-space(.)={}]", xpath_literal(l.trim())),
        OptionChoice::Index(i) => format!("(.//option)[{}]", i + 1),
    }
}

/// Quote `s` as an XPath 1.0 string literal.
fn xpath_literal(s: &str) -> String {
    if !s.contains('\'') {
        format!("'{s}'")
    } else if !s.contains('"') {
        format!("\"{s}\"")
    } else {
        let parts: Vec<String> = s.split('\'').map(|p| format!("'{p}'")).collect();
        format!("concat({})", parts.join(", \"'\", "))
    }
}

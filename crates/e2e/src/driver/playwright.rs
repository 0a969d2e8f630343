//! Playwright browser automation
//!
//! A small Node.js bridge script is written to a temp directory and kept
//! running for the lifetime of the page. Requests and responses are
//! newline-delimited JSON over the bridge's stdio, one request in flight at
//! a time.

use async_trait::async_trait;
use base64::Engine;
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tracing::{debug, info, warn};

use surfcheck_common::{BrowserKind, Config, Error, Result, Viewport};

use super::{
    ClickOptions, Cookie, ElementHandle, MouseButton, Page, StorageKind, StorageSnapshot, WaitState,
};

/// Extra time granted to a bridge round trip on top of the operation timeout
const RPC_SLACK: Duration = Duration::from_secs(5);

const BRIDGE_SCRIPT: &str = r#"
const pw = require('playwright');
const readline = require('readline');

const handles = new Map();
let nextHandle = 0;
let browser, context, page;

function reply(msg) {
  process.stdout.write(JSON.stringify(msg) + '\n');
}

function handle(id) {
  const h = handles.get(id);
  if (!h) {
    const err = new Error('stale element handle ' + id);
    err.name = 'StaleElementError';
    throw err;
  }
  return h;
}

function register(h) {
  if (!h) return null;
  const id = 'h' + (++nextHandle);
  handles.set(id, h);
  return id;
}

const methods = {
  async launch(p) {
    browser = await pw[p.browser].launch({ headless: p.headless });
    context = await browser.newContext({ viewport: p.viewport });
    page = await context.newPage();
    return null;
  },
  async goto(p) { handles.clear(); await page.goto(p.url, { timeout: p.timeout }); return null; },
  async reload(p) { handles.clear(); await page.reload({ timeout: p.timeout }); return null; },
  async title() { return page.title(); },
  async url() { return page.url(); },
  async content() { return page.content(); },
  async screenshot(p) {
    const buf = await page.screenshot({ fullPage: p.fullPage });
    return buf.toString('base64');
  },
  async waitForSelector(p) {
    const h = await page.waitForSelector(p.selector, { state: p.state, timeout: p.timeout });
    return register(h);
  },
  async waitForElement(p) {
    const state = p.state === 'attached' ? 'stable' : p.state;
    await handle(p.handle).waitForElementState(state, { timeout: p.timeout });
    return null;
  },
  async queryAll(p) { return (await page.$$(p.selector)).map(register); },
  async isVisible(p) { return page.isVisible(p.selector); },
  async click(p) {
    await handle(p.handle).click({
      button: p.button, clickCount: p.clickCount, delay: p.delay, force: p.force, timeout: p.timeout,
    });
    return null;
  },
  async fill(p) { await handle(p.handle).fill(p.value, { timeout: p.timeout }); return null; },
  async type(p) { await handle(p.handle).type(p.text, { delay: p.delay, timeout: p.timeout }); return null; },
  async press(p) { await handle(p.handle).press(p.key, { timeout: p.timeout }); return null; },
  async keyboardPress(p) { await page.keyboard.press(p.key); return null; },
  async selectOption(p) { return handle(p.handle).selectOption(p.values, { timeout: p.timeout }); },
  async hover(p) { await handle(p.handle).hover({ timeout: p.timeout }); return null; },
  async setChecked(p) { await handle(p.handle).setChecked(p.checked, { timeout: p.timeout }); return null; },
  async textContent(p) { return (await handle(p.handle).textContent()) || ''; },
  async inputValue(p) { return handle(p.handle).inputValue(); },
  async getAttribute(p) { return handle(p.handle).getAttribute(p.name); },
  async clickViaScript(p) { await handle(p.handle).evaluate((el) => el.click()); return null; },
  async fillViaScript(p) {
    await handle(p.handle).evaluate((el, value) => {
      el.value = value;
      el.dispatchEvent(new Event('input', { bubbles: true }));
      el.dispatchEvent(new Event('change', { bubbles: true }));
    }, p.value);
    return null;
  },
  async setDefaultTimeout(p) { page.setDefaultTimeout(p.timeout); return null; },
  async setDefaultNavigationTimeout(p) { page.setDefaultNavigationTimeout(p.timeout); return null; },
  async setViewport(p) { await page.setViewportSize(p.viewport); return null; },
  async cookies() { return context.cookies(); },
  async addCookie(p) { await context.addCookies([p.cookie]); return null; },
  async clearCookies() { await context.clearCookies(); return null; },
  async storage() {
    try {
      return await page.evaluate(() => ({
        local: Object.assign({}, window.localStorage),
        session: Object.assign({}, window.sessionStorage),
      }));
    } catch (e) {
      return { local: {}, session: {} };
    }
  },
  async setStorageItem(p) {
    await page.evaluate(([kind, key, value]) => {
      (kind === 'local' ? window.localStorage : window.sessionStorage).setItem(key, value);
    }, [p.kind, p.key, p.value]);
    return null;
  },
  async clearStorage() {
    try {
      await page.evaluate(() => { window.localStorage.clear(); window.sessionStorage.clear(); });
    } catch (e) {
      // about:blank and error pages have no storage
    }
    return null;
  },
  async close() { if (browser) await browser.close(); return null; },
};

readline.createInterface({ input: process.stdin }).on('line', async (line) => {
  let msg;
  try { msg = JSON.parse(line); } catch (e) { return; }
  try {
    const result = await methods[msg.method](msg.params || {});
    reply({ id: msg.id, ok: true, result: result === undefined ? null : result });
  } catch (e) {
    reply({ id: msg.id, ok: false, error: { name: e.name || 'Error', message: e.message || String(e) } });
  }
  if (msg.method === 'close') process.exit(0);
});
"#;

/// Browser launch settings
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub browser: BrowserKind,
    pub headless: bool,
    pub viewport: Viewport,
    /// Bound on browser startup
    pub launch_timeout: Duration,
    /// Directory whose `node_modules` provides `playwright`
    pub project_dir: PathBuf,
    pub node_binary: String,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            browser: BrowserKind::Chromium,
            headless: true,
            viewport: Viewport::default(),
            launch_timeout: Duration::from_secs(60),
            project_dir: PathBuf::from("."),
            node_binary: "node".to_string(),
        }
    }
}

impl LaunchOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            browser: config.browser,
            headless: config.headless,
            viewport: config.viewport,
            launch_timeout: config.timeouts.long,
            ..Default::default()
        }
    }
}

#[derive(Debug, Deserialize)]
struct BridgeResponse {
    id: u64,
    ok: bool,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    error: Option<BridgeError>,
}

#[derive(Debug, Deserialize)]
struct BridgeError {
    name: String,
    message: String,
}

struct BridgeIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

/// [`Page`] backed by a real Playwright browser
pub struct PlaywrightPage {
    io: tokio::sync::Mutex<BridgeIo>,
    child: Mutex<Option<Child>>,
    next_id: AtomicU64,
    closed: AtomicBool,
    default_timeout: Mutex<Duration>,
    // Holds the bridge script until the page is dropped
    _script_dir: tempfile::TempDir,
}

impl PlaywrightPage {
    /// Start the bridge, launch the browser and open a page
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        Self::check_playwright_installed(&options)?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("surfcheck-bridge.js");
        std::fs::write(&script_path, BRIDGE_SCRIPT)?;

        let project_dir = std::fs::canonicalize(&options.project_dir)?;
        debug!("Starting Playwright bridge: {}", script_path.display());

        let mut child = TokioCommand::new(&options.node_binary)
            .arg(&script_path)
            .current_dir(&project_dir)
            .env("NODE_PATH", project_dir.join("node_modules"))
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Driver(format!("failed to start {}: {}", options.node_binary, e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| Error::Driver("bridge stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Driver("bridge stdout unavailable".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "surfcheck::playwright", "{}", line);
                }
            });
        }

        let page = Self {
            io: tokio::sync::Mutex::new(BridgeIo {
                stdin,
                stdout: BufReader::new(stdout).lines(),
            }),
            child: Mutex::new(Some(child)),
            next_id: AtomicU64::new(1),
            closed: AtomicBool::new(false),
            default_timeout: Mutex::new(Duration::from_secs(30)),
            _script_dir: script_dir,
        };

        page.call(
            "launch",
            json!({
                "browser": options.browser.as_str(),
                "headless": options.headless,
                "viewport": { "width": options.viewport.width, "height": options.viewport.height },
            }),
            options.launch_timeout,
        )
        .await?;

        info!(
            "Launched {} (headless: {})",
            options.browser.as_str(),
            options.headless
        );
        Ok(page)
    }

    /// Check if Playwright is installed
    fn check_playwright_installed(options: &LaunchOptions) -> Result<()> {
        let status = Command::new("npx")
            .args(["playwright", "--version"])
            .current_dir(&options.project_dir)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();

        match status {
            Ok(status) if status.success() => Ok(()),
            _ => Err(Error::Driver(
                "Playwright not found. Install with: npm install playwright && npx playwright install"
                    .to_string(),
            )),
        }
    }

    async fn call(&self, method: &str, params: Value, timeout: Duration) -> Result<Value> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Driver(format!("{}: page is closed", method)));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let mut line = serde_json::to_string(&json!({ "id": id, "method": method, "params": params }))?;
        line.push('\n');

        let mut guard = self.io.lock().await;
        let io = &mut *guard;
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.flush().await?;

        let bound = timeout + RPC_SLACK;
        let response = tokio::time::timeout(bound, read_response(io, id))
            .await
            .map_err(|_| Error::timeout(format!("{} (no reply from Playwright bridge)", method), bound))??;

        if response.ok {
            return Ok(response.result);
        }

        let error = response.error.unwrap_or(BridgeError {
            name: "Error".to_string(),
            message: "unknown bridge error".to_string(),
        });
        // Playwright messages carry a multi-line call log after the first line
        let summary = error.message.lines().next().unwrap_or_default().to_string();
        Err(match error.name.as_str() {
            "TimeoutError" => Error::timeout(format!("{}: {}", method, summary), timeout),
            "StaleElementError" => Error::ElementNotFound(summary),
            _ => Error::Driver(format!("{}: {}", method, error.message)),
        })
    }

    fn default_timeout(&self) -> Duration {
        *self.default_timeout.lock()
    }

    async fn call_on(&self, method: &str, element: &ElementHandle, mut params: Value, timeout: Duration) -> Result<Value> {
        params["handle"] = json!(element.id());
        self.call(method, params, timeout).await
    }

    fn stop(&self) {
        let Some(mut child) = self.child.lock().take() else {
            return;
        };

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = child.id() {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
        }

        let _ = child.start_kill();
    }
}

async fn read_response(io: &mut BridgeIo, id: u64) -> Result<BridgeResponse> {
    loop {
        let Some(line) = io.stdout.next_line().await? else {
            return Err(Error::Driver("Playwright bridge exited".to_string()));
        };
        match serde_json::from_str::<BridgeResponse>(&line) {
            Ok(response) if response.id == id => return Ok(response),
            Ok(response) => debug!("Dropping late bridge response {}", response.id),
            Err(_) => debug!(target: "surfcheck::playwright", "{}", line),
        }
    }
}

fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

fn string(value: Value) -> Result<String> {
    match value {
        Value::String(s) => Ok(s),
        Value::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

#[async_trait]
impl Page for PlaywrightPage {
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()> {
        self.call("goto", json!({ "url": url, "timeout": millis(timeout) }), timeout)
            .await
            .map(|_| ())
    }

    async fn reload(&self, timeout: Duration) -> Result<()> {
        self.call("reload", json!({ "timeout": millis(timeout) }), timeout)
            .await
            .map(|_| ())
    }

    async fn title(&self) -> Result<String> {
        string(self.call("title", Value::Null, self.default_timeout()).await?)
    }

    async fn url(&self) -> Result<String> {
        string(self.call("url", Value::Null, self.default_timeout()).await?)
    }

    async fn content(&self) -> Result<String> {
        string(self.call("content", Value::Null, self.default_timeout()).await?)
    }

    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>> {
        let encoded = string(
            self.call("screenshot", json!({ "fullPage": full_page }), self.default_timeout())
                .await?,
        )?;
        base64::engine::general_purpose::STANDARD
            .decode(encoded)
            .map_err(|e| Error::Driver(format!("screenshot: invalid image data: {}", e)))
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>> {
        let result = self
            .call(
                "waitForSelector",
                json!({ "selector": selector, "state": state.as_str(), "timeout": millis(timeout) }),
                timeout,
            )
            .await?;
        Ok(result.as_str().map(|id| ElementHandle::new(id, selector)))
    }

    async fn wait_for_element(
        &self,
        element: &ElementHandle,
        state: WaitState,
        timeout: Duration,
    ) -> Result<()> {
        self.call_on(
            "waitForElement",
            element,
            json!({ "state": state.as_str(), "timeout": millis(timeout) }),
            timeout,
        )
        .await
        .map(|_| ())
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let result = self
            .call("queryAll", json!({ "selector": selector }), self.default_timeout())
            .await?;
        Ok(result
            .as_array()
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(|id| ElementHandle::new(id, selector))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let result = self
            .call("isVisible", json!({ "selector": selector }), self.default_timeout())
            .await?;
        Ok(result.as_bool().unwrap_or(false))
    }

    async fn click(&self, element: &ElementHandle, options: &ClickOptions) -> Result<()> {
        let button = match options.button {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        };
        self.call_on(
            "click",
            element,
            json!({
                "button": button,
                "clickCount": options.click_count.max(1),
                "delay": options.delay.map(millis).unwrap_or(0),
                "force": options.force,
                "timeout": millis(options.timeout),
            }),
            options.timeout,
        )
        .await
        .map(|_| ())
    }

    async fn fill(&self, element: &ElementHandle, value: &str, timeout: Duration) -> Result<()> {
        self.call_on("fill", element, json!({ "value": value, "timeout": millis(timeout) }), timeout)
            .await
            .map(|_| ())
    }

    async fn type_text(
        &self,
        element: &ElementHandle,
        text: &str,
        delay: Option<Duration>,
        timeout: Duration,
    ) -> Result<()> {
        let delay = delay.unwrap_or_default();
        // Typing time grows with the text, so the bridge bound has to as well
        let bound = timeout + delay * text.chars().count() as u32;
        self.call_on(
            "type",
            element,
            json!({ "text": text, "delay": millis(delay), "timeout": millis(timeout) }),
            bound,
        )
        .await
        .map(|_| ())
    }

    async fn press(&self, element: &ElementHandle, key: &str, timeout: Duration) -> Result<()> {
        self.call_on("press", element, json!({ "key": key, "timeout": millis(timeout) }), timeout)
            .await
            .map(|_| ())
    }

    async fn keyboard_press(&self, key: &str) -> Result<()> {
        self.call("keyboardPress", json!({ "key": key }), self.default_timeout())
            .await
            .map(|_| ())
    }

    async fn select_option(
        &self,
        element: &ElementHandle,
        values: &[String],
        timeout: Duration,
    ) -> Result<Vec<String>> {
        let result = self
            .call_on(
                "selectOption",
                element,
                json!({ "values": values, "timeout": millis(timeout) }),
                timeout,
            )
            .await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn hover(&self, element: &ElementHandle, timeout: Duration) -> Result<()> {
        self.call_on("hover", element, json!({ "timeout": millis(timeout) }), timeout)
            .await
            .map(|_| ())
    }

    async fn set_checked(&self, element: &ElementHandle, checked: bool, timeout: Duration) -> Result<()> {
        self.call_on(
            "setChecked",
            element,
            json!({ "checked": checked, "timeout": millis(timeout) }),
            timeout,
        )
        .await
        .map(|_| ())
    }

    async fn text_content(&self, element: &ElementHandle) -> Result<String> {
        string(self.call_on("textContent", element, json!({}), self.default_timeout()).await?)
    }

    async fn input_value(&self, element: &ElementHandle) -> Result<String> {
        string(self.call_on("inputValue", element, json!({}), self.default_timeout()).await?)
    }

    async fn get_attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        let result = self
            .call_on("getAttribute", element, json!({ "name": name }), self.default_timeout())
            .await?;
        Ok(result.as_str().map(str::to_string))
    }

    async fn click_via_script(&self, element: &ElementHandle) -> Result<()> {
        self.call_on("clickViaScript", element, json!({}), self.default_timeout())
            .await
            .map(|_| ())
    }

    async fn fill_via_script(&self, element: &ElementHandle, value: &str) -> Result<()> {
        self.call_on("fillViaScript", element, json!({ "value": value }), self.default_timeout())
            .await
            .map(|_| ())
    }

    async fn set_default_timeout(&self, timeout: Duration) -> Result<()> {
        self.call("setDefaultTimeout", json!({ "timeout": millis(timeout) }), RPC_SLACK)
            .await?;
        *self.default_timeout.lock() = timeout;
        Ok(())
    }

    async fn set_default_navigation_timeout(&self, timeout: Duration) -> Result<()> {
        self.call(
            "setDefaultNavigationTimeout",
            json!({ "timeout": millis(timeout) }),
            RPC_SLACK,
        )
        .await
        .map(|_| ())
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.call(
            "setViewport",
            json!({ "viewport": { "width": viewport.width, "height": viewport.height } }),
            self.default_timeout(),
        )
        .await
        .map(|_| ())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>> {
        let result = self.call("cookies", Value::Null, self.default_timeout()).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn add_cookie(&self, cookie: Cookie) -> Result<()> {
        self.call("addCookie", json!({ "cookie": cookie }), self.default_timeout())
            .await
            .map(|_| ())
    }

    async fn clear_cookies(&self) -> Result<()> {
        self.call("clearCookies", Value::Null, self.default_timeout())
            .await
            .map(|_| ())
    }

    async fn storage(&self) -> Result<StorageSnapshot> {
        let result = self.call("storage", Value::Null, self.default_timeout()).await?;
        Ok(serde_json::from_value(result)?)
    }

    async fn set_storage_item(&self, kind: StorageKind, key: &str, value: &str) -> Result<()> {
        self.call(
            "setStorageItem",
            json!({ "kind": kind, "key": key, "value": value }),
            self.default_timeout(),
        )
        .await
        .map(|_| ())
    }

    async fn clear_storage(&self) -> Result<()> {
        self.call("clearStorage", Value::Null, self.default_timeout())
            .await
            .map(|_| ())
    }

    async fn close(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }
        let result = self.call("close", Value::Null, self.default_timeout()).await;
        self.closed.store(true, Ordering::SeqCst);
        if let Err(e) = &result {
            warn!("Browser did not close cleanly: {}", e);
        }
        self.stop();
        result.map(|_| ())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for PlaywrightPage {
    fn drop(&mut self) {
        self.stop();
    }
}

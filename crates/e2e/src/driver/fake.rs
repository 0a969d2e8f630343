//! In-memory page
//!
//! `FakePage` renders routed [`FakeDocument`]s instead of driving a browser.
//! It keeps the behaviors the fixtures depend on: delayed visibility,
//! timeouts, cookies and storage, Enter-to-submit inputs, elements that only
//! accept script clicks, and a page that can be closed underneath a test.

use async_trait::async_trait;
use image::{ImageBuffer, ImageOutputFormat, Rgb};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::fmt;
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use surfcheck_common::{Error, Result, Viewport};

use super::{
    ClickOptions, Cookie, ElementHandle, Page, StorageKind, StorageSnapshot, WaitState,
};

const POLL_INTERVAL: Duration = Duration::from_millis(2);

/// What happens when an element is clicked
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickEffect {
    /// Navigate to a path relative to the current URL
    Navigate(String),
    /// Hide every element matching the selector
    Hide(String),
    /// Set a cookie for the current page
    SetCookie(String, String),
}

#[derive(Debug, Clone)]
pub struct FakeElement {
    selector: String,
    tag: String,
    text: String,
    value: String,
    attributes: BTreeMap<String, String>,
    visible_after: Duration,
    hidden: bool,
    script_only: bool,
    on_click: Option<ClickEffect>,
    submit_to: Option<String>,
    options: Vec<String>,
    checked: bool,
}

impl FakeElement {
    pub fn new(selector: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            selector: selector.into(),
            tag: tag.into(),
            text: String::new(),
            value: String::new(),
            attributes: BTreeMap::new(),
            visible_after: Duration::ZERO,
            hidden: false,
            script_only: false,
            on_click: None,
            submit_to: None,
            options: Vec::new(),
            checked: false,
        }
    }

    pub fn input(selector: impl Into<String>) -> Self {
        Self::new(selector, "input")
    }

    pub fn textarea(selector: impl Into<String>) -> Self {
        Self::new(selector, "textarea")
    }

    pub fn button(selector: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(selector, "button").with_text(text)
    }

    pub fn heading(selector: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(selector, "h3").with_text(text)
    }

    pub fn select(selector: impl Into<String>, options: &[&str]) -> Self {
        let mut el = Self::new(selector, "select");
        el.options = options.iter().map(|o| o.to_string()).collect();
        el.value = el.options.first().cloned().unwrap_or_default();
        el
    }

    pub fn checkbox(selector: impl Into<String>) -> Self {
        Self::new(selector, "input").with_attr("type", "checkbox")
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = text.into();
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = value.into();
        self
    }

    pub fn with_attr(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    /// Becomes visible `delay` after the document loads
    pub fn visible_after(mut self, delay: Duration) -> Self {
        self.visible_after = delay;
        self
    }

    /// Attached but never visible
    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Native clicks are intercepted; only script clicks reach it
    pub fn script_only(mut self) -> Self {
        self.script_only = true;
        self
    }

    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.on_click = Some(effect);
        self
    }

    /// Pressing Enter navigates to `path` with the value as query parameter
    /// named after the element's `name` attribute
    pub fn submits_to(mut self, path: impl Into<String>) -> Self {
        self.submit_to = Some(path.into());
        self
    }

    fn is_editable(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea")
            && self.attributes.get("type").map(|t| t != "checkbox").unwrap_or(true)
    }

    fn is_visible(&self, loaded_at: Instant) -> bool {
        !self.hidden && loaded_at.elapsed() >= self.visible_after
    }

    fn render(&self) -> String {
        let attrs: String = self
            .attributes
            .iter()
            .map(|(k, v)| format!(" {}=\"{}\"", k, v))
            .collect();
        format!("<{tag}{attrs}>{text}</{tag}>", tag = self.tag, attrs = attrs, text = self.text)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeDocument {
    title: String,
    elements: Vec<FakeElement>,
}

impl FakeDocument {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            elements: Vec::new(),
        }
    }

    pub fn with(mut self, element: FakeElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    fn not_found(url: &Url) -> Self {
        Self::new("404 Not Found").with(FakeElement::new("h1", "h1").with_text(url.path().to_string()))
    }
}

type Render = Arc<dyn Fn(&Url) -> FakeDocument + Send + Sync>;

/// Path-routed collection of documents
#[derive(Clone, Default)]
pub struct FakeSite {
    routes: Vec<(String, Render)>,
}

impl fmt::Debug for FakeSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeSite")
            .field("routes", &self.routes.iter().map(|(p, _)| p).collect::<Vec<_>>())
            .finish()
    }
}

impl FakeSite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve a static document at `path`
    pub fn page(self, path: &str, document: FakeDocument) -> Self {
        self.route(path, move |_| document.clone())
    }

    /// Serve a document built from the requested URL at `path`
    pub fn route<F>(mut self, path: &str, render: F) -> Self
    where
        F: Fn(&Url) -> FakeDocument + Send + Sync + 'static,
    {
        self.routes.push((path.to_string(), Arc::new(render)));
        self
    }

    pub fn render(&self, url: &Url) -> FakeDocument {
        self.routes
            .iter()
            .find(|(path, _)| path == url.path())
            .map(|(_, render)| render(url))
            .unwrap_or_else(|| FakeDocument::not_found(url))
    }
}

struct Loaded {
    url: Url,
    document: FakeDocument,
    loaded_at: Instant,
}

struct FakeState {
    site: FakeSite,
    current: Option<Loaded>,
    generation: u64,
    cookies: Vec<Cookie>,
    /// Keyed by origin, like a browser context
    storage: BTreeMap<String, StorageSnapshot>,
    closed: bool,
    default_timeout: Option<Duration>,
    navigation_timeout: Option<Duration>,
    viewport: Viewport,
    fail_screenshots: bool,
    actions: Vec<String>,
}

impl FakeState {
    /// Origin of the loaded document; `None` on about:blank
    fn origin(&self) -> Option<String> {
        self.current
            .as_ref()
            .map(|c| c.url.origin())
            .filter(|origin| origin.is_tuple())
            .map(|origin| origin.ascii_serialization())
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            return Err(Error::Driver(
                "Target page, context or browser has been closed".to_string(),
            ));
        }
        Ok(())
    }

    fn handle(&self, index: usize) -> ElementHandle {
        let selector = self
            .current
            .as_ref()
            .and_then(|c| c.document.elements.get(index))
            .map(|e| e.selector.clone())
            .unwrap_or_default();
        ElementHandle::new(format!("{}:{}", self.generation, index), selector)
    }

    fn index_of(&self, element: &ElementHandle) -> Option<usize> {
        let (generation, index) = element.id().split_once(':')?;
        if generation.parse::<u64>().ok()? != self.generation {
            return None;
        }
        let index = index.parse::<usize>().ok()?;
        self.current
            .as_ref()
            .filter(|c| index < c.document.elements.len())
            .map(|_| index)
    }

    fn element(&self, element: &ElementHandle) -> Result<&FakeElement> {
        self.index_of(element)
            .and_then(|i| self.current.as_ref().map(|c| &c.document.elements[i]))
            .ok_or_else(|| stale(element))
    }

    fn element_mut(&mut self, element: &ElementHandle) -> Result<&mut FakeElement> {
        let index = self.index_of(element).ok_or_else(|| stale(element))?;
        self.current
            .as_mut()
            .map(|c| &mut c.document.elements[index])
            .ok_or_else(|| stale(element))
    }

    fn matching(&self, selector: &str) -> Vec<(usize, bool)> {
        match &self.current {
            Some(loaded) => loaded
                .document
                .elements
                .iter()
                .enumerate()
                .filter(|(_, e)| e.selector == selector)
                .map(|(i, e)| (i, e.is_visible(loaded.loaded_at)))
                .collect(),
            None => Vec::new(),
        }
    }

    fn load(&mut self, url: Url) {
        let document = self.site.render(&url);
        self.generation += 1;
        self.actions.push(format!("goto:{}", url));
        self.current = Some(Loaded {
            url,
            document,
            loaded_at: Instant::now(),
        });
    }

    fn resolve(&self, path: &str) -> Result<Url> {
        match &self.current {
            Some(loaded) => Ok(loaded.url.join(path)?),
            None => Ok(Url::parse(path)?),
        }
    }

    fn apply(&mut self, effect: ClickEffect) -> Result<()> {
        match effect {
            ClickEffect::Navigate(path) => {
                let url = self.resolve(&path)?;
                self.load(url);
            }
            ClickEffect::Hide(selector) => {
                if let Some(loaded) = self.current.as_mut() {
                    for el in loaded.document.elements.iter_mut().filter(|e| e.selector == selector) {
                        el.hidden = true;
                    }
                }
            }
            ClickEffect::SetCookie(name, value) => {
                let url = self.current.as_ref().map(|c| c.url.to_string());
                self.cookies.retain(|c| c.name != name);
                self.cookies.push(Cookie {
                    name,
                    value,
                    url,
                    ..Default::default()
                });
            }
        }
        Ok(())
    }
}

fn stale(element: &ElementHandle) -> Error {
    Error::ElementNotFound(format!(
        "{} (handle {} is not attached to the current document)",
        element.selector(),
        element.id()
    ))
}

/// In-memory [`Page`] implementation
pub struct FakePage {
    state: Mutex<FakeState>,
}

impl FakePage {
    pub fn new(site: FakeSite) -> Self {
        Self {
            state: Mutex::new(FakeState {
                site,
                current: None,
                generation: 0,
                cookies: Vec::new(),
                storage: BTreeMap::new(),
                closed: false,
                default_timeout: None,
                navigation_timeout: None,
                viewport: Viewport::default(),
                fail_screenshots: false,
                actions: Vec::new(),
            }),
        }
    }

    /// Make every screenshot fail while the page stays open
    pub fn fail_screenshots(&self, fail: bool) {
        self.state.lock().fail_screenshots = fail;
    }

    /// Driver calls seen so far, e.g. `click:#submit` or `click_via_script:#submit`
    pub fn actions(&self) -> Vec<String> {
        self.state.lock().actions.clone()
    }

    pub fn viewport(&self) -> Viewport {
        self.state.lock().viewport
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.state.lock().default_timeout
    }

    pub fn navigation_timeout(&self) -> Option<Duration> {
        self.state.lock().navigation_timeout
    }

    /// Origins that still hold storage entries
    pub fn stored_origins(&self) -> Vec<String> {
        self.state
            .lock()
            .storage
            .iter()
            .filter(|(_, snapshot)| !snapshot.is_empty())
            .map(|(origin, _)| origin.clone())
            .collect()
    }

    fn record(&self, action: String) {
        self.state.lock().actions.push(action);
    }

    async fn poll_until<T, F>(&self, what: String, timeout: Duration, mut check: F) -> Result<T>
    where
        F: FnMut(&FakeState) -> Result<Option<T>>,
    {
        let deadline = Instant::now() + timeout;
        loop {
            {
                let state = self.state.lock();
                state.ensure_open()?;
                if let Some(found) = check(&state)? {
                    return Ok(found);
                }
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::timeout(what, timeout));
            }
            tokio::time::sleep(POLL_INTERVAL.min(remaining)).await;
        }
    }

    async fn actionable(&self, element: &ElementHandle, timeout: Duration) -> Result<()> {
        self.wait_for_element(element, WaitState::Visible, timeout).await
    }

    fn png(viewport: Viewport) -> Result<Vec<u8>> {
        let image = ImageBuffer::from_pixel(viewport.width.max(1), viewport.height.max(1), Rgb([255u8, 255, 255]));
        let mut bytes = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(image)
            .write_to(&mut bytes, ImageOutputFormat::Png)
            .map_err(|e| Error::Driver(format!("screenshot encoding failed: {}", e)))?;
        Ok(bytes.into_inner())
    }
}

#[async_trait]
impl Page for FakePage {
    async fn goto(&self, url: &str, _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let url = Url::parse(url)?;
        state.load(url);
        Ok(())
    }

    async fn reload(&self, _timeout: Duration) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let url = state
            .current
            .as_ref()
            .map(|c| c.url.clone())
            .ok_or_else(|| Error::Driver("nothing to reload".to_string()))?;
        state.load(url);
        Ok(())
    }

    async fn title(&self) -> Result<String> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state
            .current
            .as_ref()
            .map(|c| c.document.title.clone())
            .unwrap_or_default())
    }

    async fn url(&self) -> Result<String> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state
            .current
            .as_ref()
            .map(|c| c.url.to_string())
            .unwrap_or_else(|| "about:blank".to_string()))
    }

    async fn content(&self) -> Result<String> {
        let state = self.state.lock();
        state.ensure_open()?;
        let (title, body) = match &state.current {
            Some(loaded) => (
                loaded.document.title.clone(),
                loaded
                    .document
                    .elements
                    .iter()
                    .filter(|e| !e.hidden)
                    .map(FakeElement::render)
                    .collect::<Vec<_>>()
                    .join("\n"),
            ),
            None => (String::new(), String::new()),
        };
        Ok(format!(
            "<html><head><title>{}</title></head><body>\n{}\n</body></html>",
            title, body
        ))
    }

    async fn screenshot(&self, _full_page: bool) -> Result<Vec<u8>> {
        let viewport = {
            let mut state = self.state.lock();
            state.ensure_open()?;
            if state.fail_screenshots {
                return Err(Error::Driver("screenshot capture failed".to_string()));
            }
            state.actions.push("screenshot".to_string());
            state.viewport
        };
        Self::png(viewport)
    }

    async fn wait_for_selector(
        &self,
        selector: &str,
        wait: WaitState,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>> {
        let what = format!("waiting for '{}' to be {}", selector, wait);
        self.poll_until(what, timeout, |state| {
            let matching = state.matching(selector);
            let found = match wait {
                WaitState::Visible => matching
                    .iter()
                    .find(|(_, visible)| *visible)
                    .map(|(i, _)| Some(state.handle(*i))),
                WaitState::Attached => matching.first().map(|(i, _)| Some(state.handle(*i))),
                WaitState::Hidden => (!matching.iter().any(|(_, visible)| *visible)).then_some(None),
                WaitState::Detached => matching.is_empty().then_some(None),
            };
            Ok(found)
        })
        .await
    }

    async fn wait_for_element(
        &self,
        element: &ElementHandle,
        wait: WaitState,
        timeout: Duration,
    ) -> Result<()> {
        let what = format!("waiting for '{}' to be {}", element.selector(), wait);
        self.poll_until(what, timeout, |state| {
            let attached = state.index_of(element);
            let visible = attached
                .and_then(|i| state.current.as_ref().map(|c| c.document.elements[i].is_visible(c.loaded_at)))
                .unwrap_or(false);
            match wait {
                WaitState::Visible | WaitState::Attached if attached.is_none() => Err(stale(element)),
                WaitState::Visible => Ok(visible.then_some(())),
                WaitState::Attached => Ok(Some(())),
                WaitState::Hidden => Ok((!visible).then_some(())),
                WaitState::Detached => Ok(attached.is_none().then_some(())),
            }
        })
        .await
    }

    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state
            .matching(selector)
            .into_iter()
            .map(|(i, _)| state.handle(i))
            .collect())
    }

    async fn is_visible(&self, selector: &str) -> Result<bool> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.matching(selector).iter().any(|(_, visible)| *visible))
    }

    async fn click(&self, element: &ElementHandle, options: &ClickOptions) -> Result<()> {
        self.actionable(element, options.timeout).await?;
        let mut state = self.state.lock();
        state.ensure_open()?;
        let el = state.element(element)?;
        if el.script_only {
            return Err(Error::Driver(format!(
                "element {} click intercepted: another element would receive the click",
                element.selector()
            )));
        }
        let effect = el.on_click.clone();
        for _ in 0..options.click_count.max(1) {
            state.actions.push(format!("click:{}", element.selector()));
        }
        if let Some(effect) = effect {
            state.apply(effect)?;
        }
        Ok(())
    }

    async fn fill(&self, element: &ElementHandle, value: &str, timeout: Duration) -> Result<()> {
        self.actionable(element, timeout).await?;
        let mut state = self.state.lock();
        state.ensure_open()?;
        let el = state.element_mut(element)?;
        if !el.is_editable() {
            return Err(Error::Driver(format!(
                "element {} is not an <input> or <textarea>",
                element.selector()
            )));
        }
        el.value = value.to_string();
        state.actions.push(format!("fill:{}", element.selector()));
        Ok(())
    }

    async fn type_text(
        &self,
        element: &ElementHandle,
        text: &str,
        delay: Option<Duration>,
        timeout: Duration,
    ) -> Result<()> {
        self.actionable(element, timeout).await?;
        if let Some(delay) = delay {
            tokio::time::sleep(delay * text.chars().count() as u32).await;
        }
        let mut state = self.state.lock();
        state.ensure_open()?;
        let el = state.element_mut(element)?;
        if !el.is_editable() {
            return Err(Error::Driver(format!("element {} is not editable", element.selector())));
        }
        el.value.push_str(text);
        state.actions.push(format!("type:{}", element.selector()));
        Ok(())
    }

    async fn press(&self, element: &ElementHandle, key: &str, timeout: Duration) -> Result<()> {
        self.actionable(element, timeout).await?;
        let mut state = self.state.lock();
        state.ensure_open()?;
        let el = state.element(element)?;
        let submit = match (key, &el.submit_to) {
            ("Enter", Some(path)) => {
                let name = el.attributes.get("name").cloned().unwrap_or_else(|| "q".to_string());
                Some((path.clone(), name, el.value.clone()))
            }
            _ => None,
        };
        state.actions.push(format!("press:{}:{}", element.selector(), key));
        if let Some((path, name, value)) = submit {
            let mut url = state.resolve(&path)?;
            url.query_pairs_mut().clear().append_pair(&name, &value);
            state.load(url);
        }
        Ok(())
    }

    async fn keyboard_press(&self, key: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.actions.push(format!("keyboard:{}", key));
        Ok(())
    }

    async fn select_option(
        &self,
        element: &ElementHandle,
        values: &[String],
        timeout: Duration,
    ) -> Result<Vec<String>> {
        self.actionable(element, timeout).await?;
        let mut state = self.state.lock();
        state.ensure_open()?;
        let el = state.element_mut(element)?;
        if let Some(missing) = values.iter().find(|v| !el.options.contains(v)) {
            return Err(Error::Driver(format!(
                "option '{}' not found in {}",
                missing,
                element.selector()
            )));
        }
        if let Some(first) = values.first() {
            el.value = first.clone();
        }
        state.actions.push(format!("select:{}", element.selector()));
        Ok(values.to_vec())
    }

    async fn hover(&self, element: &ElementHandle, timeout: Duration) -> Result<()> {
        self.actionable(element, timeout).await?;
        self.record(format!("hover:{}", element.selector()));
        Ok(())
    }

    async fn set_checked(&self, element: &ElementHandle, checked: bool, timeout: Duration) -> Result<()> {
        self.actionable(element, timeout).await?;
        let mut state = self.state.lock();
        state.ensure_open()?;
        let el = state.element_mut(element)?;
        el.checked = checked;
        if checked {
            el.attributes.insert("checked".to_string(), String::new());
        } else {
            el.attributes.remove("checked");
        }
        state.actions.push(format!("check:{}:{}", element.selector(), checked));
        Ok(())
    }

    async fn text_content(&self, element: &ElementHandle) -> Result<String> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.element(element)?.text.clone())
    }

    async fn input_value(&self, element: &ElementHandle) -> Result<String> {
        let state = self.state.lock();
        state.ensure_open()?;
        let el = state.element(element)?;
        if !el.is_editable() && el.tag != "select" {
            return Err(Error::Driver(format!(
                "element {} is not an <input>, <textarea> or <select>",
                element.selector()
            )));
        }
        Ok(el.value.clone())
    }

    async fn get_attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.element(element)?.attributes.get(name).cloned())
    }

    async fn click_via_script(&self, element: &ElementHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let effect = state.element(element)?.on_click.clone();
        state.actions.push(format!("click_via_script:{}", element.selector()));
        if let Some(effect) = effect {
            state.apply(effect)?;
        }
        Ok(())
    }

    async fn fill_via_script(&self, element: &ElementHandle, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.element_mut(element)?.value = value.to_string();
        state.actions.push(format!("fill_via_script:{}", element.selector()));
        Ok(())
    }

    async fn set_default_timeout(&self, timeout: Duration) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.default_timeout = Some(timeout);
        Ok(())
    }

    async fn set_default_navigation_timeout(&self, timeout: Duration) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.navigation_timeout = Some(timeout);
        Ok(())
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.viewport = viewport;
        Ok(())
    }

    async fn cookies(&self) -> Result<Vec<Cookie>> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.cookies.clone())
    }

    async fn add_cookie(&self, cookie: Cookie) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.cookies.retain(|c| c.name != cookie.name);
        state.cookies.push(cookie);
        Ok(())
    }

    async fn clear_cookies(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.cookies.clear();
        Ok(())
    }

    async fn storage(&self) -> Result<StorageSnapshot> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state
            .origin()
            .and_then(|origin| state.storage.get(&origin).cloned())
            .unwrap_or_default())
    }

    async fn set_storage_item(&self, kind: StorageKind, key: &str, value: &str) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let origin = state
            .origin()
            .ok_or_else(|| Error::Driver("storage is not available on about:blank".to_string()))?;
        let snapshot = state.storage.entry(origin).or_default();
        let area = match kind {
            StorageKind::Local => &mut snapshot.local,
            StorageKind::Session => &mut snapshot.session,
        };
        area.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn clear_storage(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        if let Some(origin) = state.origin() {
            state.storage.remove(&origin);
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.closed = true;
        state.current = None;
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> FakeSite {
        FakeSite::new()
            .page(
                "/",
                FakeDocument::new("Home")
                    .with(FakeElement::input("#q").with_attr("name", "q").submits_to("/find"))
                    .with(FakeElement::button("#late", "Late").visible_after(Duration::from_millis(20)))
                    .with(FakeElement::button("#ghost", "Ghost").hidden())
                    .with(FakeElement::button("#covered", "Covered").script_only().on_click(ClickEffect::Navigate("/done".into()))),
            )
            .route("/find", |url| {
                let q = url
                    .query_pairs()
                    .find(|(k, _)| k == "q")
                    .map(|(_, v)| v.to_string())
                    .unwrap_or_default();
                FakeDocument::new(format!("Results for {}", q))
            })
            .page("/done", FakeDocument::new("Done"))
    }

    #[tokio::test]
    async fn test_visibility_delay_and_timeout() {
        let page = FakePage::new(site());
        page.goto("https://fake.test/", Duration::from_secs(1)).await.unwrap();

        let late = page
            .wait_for_selector("#late", WaitState::Visible, Duration::from_secs(1))
            .await
            .unwrap();
        assert!(late.is_some());

        let err = page
            .wait_for_selector("#ghost", WaitState::Visible, Duration::from_millis(5))
            .await
            .unwrap_err();
        assert!(err.is_timeout());
        assert!(page
            .wait_for_selector("#ghost", WaitState::Hidden, Duration::from_millis(5))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_enter_submits_form_and_invalidates_handles() {
        let page = FakePage::new(site());
        page.goto("https://fake.test/", Duration::from_secs(1)).await.unwrap();
        let input = page
            .wait_for_selector("#q", WaitState::Visible, Duration::from_secs(1))
            .await
            .unwrap()
            .unwrap();

        page.fill(&input, "rust lang", Duration::from_secs(1)).await.unwrap();
        page.press(&input, "Enter", Duration::from_secs(1)).await.unwrap();

        assert_eq!(page.title().await.unwrap(), "Results for rust lang");
        assert_eq!(page.url().await.unwrap(), "https://fake.test/find?q=rust+lang");
        assert!(matches!(
            page.input_value(&input).await,
            Err(Error::ElementNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_script_only_element_rejects_native_click() {
        let page = FakePage::new(site());
        page.goto("https://fake.test/", Duration::from_secs(1)).await.unwrap();
        let covered = page.query_all("#covered").await.unwrap().remove(0);

        let err = page.click(&covered, &ClickOptions::default()).await.unwrap_err();
        assert!(err.to_string().contains("intercepted"));

        page.click_via_script(&covered).await.unwrap();
        assert_eq!(page.title().await.unwrap(), "Done");
        assert!(page.actions().contains(&"click_via_script:#covered".to_string()));
    }

    #[tokio::test]
    async fn test_closed_page_rejects_calls() {
        let page = FakePage::new(site());
        page.close().await.unwrap();
        assert!(page.is_closed());
        assert!(matches!(page.screenshot(true).await, Err(Error::Driver(_))));
        assert!(page.clear_cookies().await.is_err());
    }

    #[tokio::test]
    async fn test_storage_is_scoped_to_origin() {
        let page = FakePage::new(site());
        let wait = Duration::from_secs(1);
        assert!(page.set_storage_item(StorageKind::Local, "k", "v").await.is_err());

        page.goto("https://fake.test/", wait).await.unwrap();
        page.set_storage_item(StorageKind::Local, "theme", "dark").await.unwrap();
        page.goto("https://other.test/", wait).await.unwrap();
        assert!(page.storage().await.unwrap().is_empty());
        page.set_storage_item(StorageKind::Session, "cart", "3").await.unwrap();

        page.clear_storage().await.unwrap();
        assert!(page.storage().await.unwrap().is_empty());
        assert_eq!(page.stored_origins(), vec!["https://fake.test".to_string()]);

        page.goto("https://fake.test/", wait).await.unwrap();
        assert_eq!(page.storage().await.unwrap().local.get("theme").map(String::as_str), Some("dark"));
    }

    #[tokio::test]
    async fn test_screenshot_is_png_of_viewport() {
        let page = FakePage::new(site());
        page.set_viewport(Viewport { width: 32, height: 16 }).await.unwrap();
        let bytes = page.screenshot(false).await.unwrap();
        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (32, 16));
    }
}

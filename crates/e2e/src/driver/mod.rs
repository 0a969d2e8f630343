//! Browser driver seam
//!
//! Everything above this module talks to a browser through the [`Page`]
//! trait. [`PlaywrightPage`] drives a real browser; [`FakePage`] is an
//! in-memory page used to exercise fixtures and page objects without one.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use surfcheck_common::{Result, Viewport};

pub mod fake;
pub mod playwright;

pub use fake::{ClickEffect, FakeDocument, FakeElement, FakePage, FakeSite};
pub use playwright::{LaunchOptions, PlaywrightPage};

/// Element state a wait resolves on
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitState {
    #[default]
    Visible,
    Hidden,
    Attached,
    Detached,
}

impl WaitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WaitState::Visible => "visible",
            WaitState::Hidden => "hidden",
            WaitState::Attached => "attached",
            WaitState::Detached => "detached",
        }
    }
}

impl std::fmt::Display for WaitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MouseButton {
    #[default]
    Left,
    Right,
    Middle,
}

/// Reference to an element resolved by the driver.
///
/// Handles are only valid for the document they were resolved in; using one
/// after a navigation fails with `ElementNotFound`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementHandle {
    id: String,
    selector: String,
}

impl ElementHandle {
    pub fn new(id: impl Into<String>, selector: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            selector: selector.into(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Selector the handle was resolved from
    pub fn selector(&self) -> &str {
        &self.selector
    }
}

/// Pointer click parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClickOptions {
    pub button: MouseButton,
    pub click_count: u32,
    pub delay: Option<Duration>,
    pub force: bool,
    pub timeout: Duration,
}

impl Default for ClickOptions {
    fn default() -> Self {
        Self {
            button: MouseButton::Left,
            click_count: 1,
            delay: None,
            force: false,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cookie {
    pub name: String,
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl Cookie {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            ..Default::default()
        }
    }

    pub fn for_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    Local,
    Session,
}

/// Contents of `localStorage` and `sessionStorage` for the current origin
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageSnapshot {
    #[serde(default)]
    pub local: BTreeMap<String, String>,
    #[serde(default)]
    pub session: BTreeMap<String, String>,
}

impl StorageSnapshot {
    pub fn is_empty(&self) -> bool {
        self.local.is_empty() && self.session.is_empty()
    }
}

/// A live browser page.
///
/// Every waiting operation takes its timeout explicitly and fails with
/// `Error::Timeout` once it expires. Element operations act on handles
/// obtained from [`Page::wait_for_selector`] or [`Page::query_all`].
#[async_trait]
pub trait Page: Send + Sync {
    // Navigation and inspection
    async fn goto(&self, url: &str, timeout: Duration) -> Result<()>;
    async fn reload(&self, timeout: Duration) -> Result<()>;
    async fn title(&self) -> Result<String>;
    async fn url(&self) -> Result<String>;
    async fn content(&self) -> Result<String>;
    async fn screenshot(&self, full_page: bool) -> Result<Vec<u8>>;

    // Element resolution
    async fn wait_for_selector(
        &self,
        selector: &str,
        state: WaitState,
        timeout: Duration,
    ) -> Result<Option<ElementHandle>>;
    async fn wait_for_element(
        &self,
        element: &ElementHandle,
        state: WaitState,
        timeout: Duration,
    ) -> Result<()>;
    async fn query_all(&self, selector: &str) -> Result<Vec<ElementHandle>>;
    async fn is_visible(&self, selector: &str) -> Result<bool>;

    // Element actions
    async fn click(&self, element: &ElementHandle, options: &ClickOptions) -> Result<()>;
    async fn fill(&self, element: &ElementHandle, value: &str, timeout: Duration) -> Result<()>;
    async fn type_text(
        &self,
        element: &ElementHandle,
        text: &str,
        delay: Option<Duration>,
        timeout: Duration,
    ) -> Result<()>;
    async fn press(&self, element: &ElementHandle, key: &str, timeout: Duration) -> Result<()>;
    async fn keyboard_press(&self, key: &str) -> Result<()>;
    async fn select_option(
        &self,
        element: &ElementHandle,
        values: &[String],
        timeout: Duration,
    ) -> Result<Vec<String>>;
    async fn hover(&self, element: &ElementHandle, timeout: Duration) -> Result<()>;
    async fn set_checked(&self, element: &ElementHandle, checked: bool, timeout: Duration) -> Result<()>;
    async fn text_content(&self, element: &ElementHandle) -> Result<String>;
    async fn input_value(&self, element: &ElementHandle) -> Result<String>;
    async fn get_attribute(&self, element: &ElementHandle, name: &str) -> Result<Option<String>>;

    // Script bypass paths: DOM manipulation instead of simulated input
    async fn click_via_script(&self, element: &ElementHandle) -> Result<()>;
    async fn fill_via_script(&self, element: &ElementHandle, value: &str) -> Result<()>;

    // Page settings
    async fn set_default_timeout(&self, timeout: Duration) -> Result<()>;
    async fn set_default_navigation_timeout(&self, timeout: Duration) -> Result<()>;
    async fn set_viewport(&self, viewport: Viewport) -> Result<()>;

    // Cookies and storage
    async fn cookies(&self) -> Result<Vec<Cookie>>;
    async fn add_cookie(&self, cookie: Cookie) -> Result<()>;
    async fn clear_cookies(&self) -> Result<()>;
    async fn storage(&self) -> Result<StorageSnapshot>;
    async fn set_storage_item(&self, kind: StorageKind, key: &str, value: &str) -> Result<()>;
    async fn clear_storage(&self) -> Result<()>;

    async fn close(&self) -> Result<()>;
    fn is_closed(&self) -> bool;
}

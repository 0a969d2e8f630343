//! Page objects
//!
//! A page object exposes domain verbs for one page of the application under
//! test. The shared [`BasePage`] owns the page handle and keeps it private to
//! this module tree; subclasses get navigation and inspection helpers.

use std::path::PathBuf;
use std::sync::Arc;

use surfcheck_common::utils::{dates, files};
use surfcheck_common::{Config, Error, Logger, Result};
use url::Url;

use crate::actions::ActionContext;
use crate::driver::Page;
use crate::fixture::TestContext;
use crate::report::Reporter;

pub mod search;

pub use search::SearchPage;

/// Lifecycle of a page object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PageState {
    Unopened,
    Loaded,
    Populated,
    Closed,
}

impl std::fmt::Display for PageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PageState::Unopened => "unopened",
            PageState::Loaded => "loaded",
            PageState::Populated => "populated",
            PageState::Closed => "closed",
        };
        f.write_str(name)
    }
}

pub struct BasePage {
    name: &'static str,
    page: Arc<dyn Page>,
    logger: Logger,
    reporter: Arc<Reporter>,
    config: Arc<Config>,
    actions: ActionContext,
    state: PageState,
}

impl BasePage {
    pub fn new(name: &'static str, ctx: &TestContext) -> Self {
        Self {
            name,
            page: ctx.page.clone(),
            logger: ctx.logger.scoped(name),
            reporter: ctx.reporter.clone(),
            config: ctx.config.clone(),
            actions: ctx.actions.clone(),
            state: PageState::Unopened,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> PageState {
        self.state
    }

    pub(crate) fn actions(&self) -> &ActionContext {
        &self.actions
    }

    pub(crate) fn logger(&self) -> &Logger {
        &self.logger
    }

    /// Log and report a domain step before acting
    pub(crate) fn step(&self, name: &str) {
        self.reporter.add_step(&format!("{}: {}", self.name, name), None);
    }

    /// Fail unless the page is loaded and not yet closed
    pub(crate) fn require_open(&self, verb: &str) -> Result<()> {
        match self.state {
            PageState::Loaded | PageState::Populated => Ok(()),
            other => Err(Error::PageState {
                page: self.name.to_string(),
                expected: format!("loaded before {}", verb),
                actual: other.to_string(),
            }),
        }
    }

    pub(crate) fn mark_populated(&mut self) {
        if self.state == PageState::Loaded {
            self.state = PageState::Populated;
        }
    }

    /// Join `path` onto the configured base URL. Absolute URLs pass through.
    pub(crate) fn resolve_url(&self, path: &str) -> Result<Url> {
        resolve_url(&self.config.base_url, path)
    }

    pub(crate) async fn navigate(&mut self, path: &str) -> Result<()> {
        if self.state == PageState::Closed {
            return Err(Error::PageState {
                page: self.name.to_string(),
                expected: "open".to_string(),
                actual: self.state.to_string(),
            });
        }
        let url = self.resolve_url(path)?;
        self.logger.info(format!("Navigating to {}", url));
        self.page
            .goto(url.as_str(), self.config.timeouts.navigation)
            .await?;
        self.state = PageState::Loaded;
        Ok(())
    }

    pub(crate) async fn reload(&mut self) -> Result<()> {
        self.require_open("reload")?;
        self.page.reload(self.config.timeouts.navigation).await?;
        self.state = PageState::Loaded;
        Ok(())
    }

    pub(crate) async fn title(&self) -> Result<String> {
        self.page.title().await
    }

    pub(crate) async fn current_url(&self) -> Result<String> {
        self.page.url().await
    }

    pub(crate) async fn content(&self) -> Result<String> {
        self.page.content().await
    }

    /// Save a full-page screenshot under the screenshots directory and
    /// attach it to the report
    pub(crate) async fn screenshot(&self, name: &str) -> Result<PathBuf> {
        let png = self.page.screenshot(true).await?;
        let file_name = format!(
            "{}_{}.png",
            files::sanitize_file_name(name),
            dates::file_timestamp()
        );
        let path = self.config.paths.screenshots.join(file_name);
        files::write_bytes(&path, &png)?;
        self.reporter.add_screenshot(name, png, Some(&path));
        Ok(path)
    }

    pub(crate) fn close(&mut self) {
        self.logger.debug(format!("{} closed", self.name));
        self.state = PageState::Closed;
    }
}

pub fn resolve_url(base: &str, path: &str) -> Result<Url> {
    if let Ok(absolute) = Url::parse(path) {
        return Ok(absolute);
    }
    let base = Url::parse(base)?;
    Ok(base.join(path)?)
}

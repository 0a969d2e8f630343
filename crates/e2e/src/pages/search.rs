//! Search engine page object

use std::path::PathBuf;
use std::time::Duration;

use surfcheck_common::Result;

use super::{BasePage, PageState};
use crate::actions::{self, ActionOptions};
use crate::driver::{ClickEffect, FakeDocument, FakeElement, FakeSite, Page};
use crate::fixture::TestContext;

pub const SEARCH_INPUT: &str = r#"textarea[name="q"]"#;
pub const RESULT_TITLES: &str = "#search h3";
pub const CONSENT_BUTTON: &str = "button#L2AGLb";

pub struct SearchPage {
    base: BasePage,
}

impl SearchPage {
    pub fn new(ctx: &TestContext) -> Self {
        Self {
            base: BasePage::new("SearchPage", ctx),
        }
    }

    pub fn state(&self) -> PageState {
        self.base.state()
    }

    pub async fn open_home(&mut self) -> Result<()> {
        self.base.step("Open home page");
        self.base.navigate("/").await?;
        self.accept_consent_if_present().await?;
        Ok(())
    }

    /// Dismiss the cookie consent dialog if one is showing
    pub async fn accept_consent_if_present(&mut self) -> Result<bool> {
        self.base.require_open("accepting consent")?;
        if !actions::is_visible(self.base.actions(), CONSENT_BUTTON).await? {
            return Ok(false);
        }
        self.base.step("Accept cookie consent");
        actions::click(self.base.actions(), CONSENT_BUTTON, &ActionOptions::default()).await?;
        Ok(true)
    }

    pub async fn fill_search(&mut self, query: &str) -> Result<()> {
        self.base.require_open("filling the search box")?;
        self.base.step(&format!("Fill search with '{}'", query));
        actions::fill(self.base.actions(), SEARCH_INPUT, query, &ActionOptions::default()).await?;
        self.base.mark_populated();
        Ok(())
    }

    /// Submit with Enter and wait for results to render
    pub async fn submit_search_with_enter(&mut self) -> Result<()> {
        self.base.require_open("submitting a search")?;
        self.base.step("Submit search with Enter");
        actions::press(self.base.actions(), SEARCH_INPUT, "Enter", &ActionOptions::default()).await?;
        actions::wait_visible(self.base.actions(), RESULT_TITLES, &ActionOptions::default()).await?;
        self.base.mark_populated();
        Ok(())
    }

    pub async fn search(&mut self, query: &str) -> Result<()> {
        self.fill_search(query).await?;
        self.submit_search_with_enter().await
    }

    pub async fn clear_search(&mut self) -> Result<()> {
        self.base.require_open("clearing the search box")?;
        self.base.step("Clear search box");
        actions::clear(self.base.actions(), SEARCH_INPUT, &ActionOptions::default()).await
    }

    pub async fn search_box_value(&self) -> Result<String> {
        self.base.require_open("reading the search box")?;
        actions::value_of(self.base.actions(), SEARCH_INPUT, &ActionOptions::default()).await
    }

    pub async fn result_count(&self) -> Result<usize> {
        self.base.require_open("counting results")?;
        let count = self.base.actions().page().query_all(RESULT_TITLES).await?.len();
        self.base.logger().info(format!("{} result(s) on page", count));
        Ok(count)
    }

    pub async fn result_titles(&self) -> Result<Vec<String>> {
        self.base.require_open("reading results")?;
        let handles = self.base.actions().page().query_all(RESULT_TITLES).await?;
        let quiet = ActionOptions::default().quiet();
        let mut titles = Vec::with_capacity(handles.len());
        for handle in &handles {
            titles.push(actions::text_of(self.base.actions(), handle, &quiet).await?);
        }
        Ok(titles)
    }

    pub async fn first_result_text(&self) -> Result<String> {
        self.base.require_open("reading the first result")?;
        self.base.step("Read first result");
        let first = actions::wait_visible(self.base.actions(), RESULT_TITLES, &ActionOptions::default().quiet()).await?;
        actions::text_of(self.base.actions(), &first, &ActionOptions::default()).await
    }

    pub async fn title(&self) -> Result<String> {
        self.base.step("Read page title");
        self.base.title().await
    }

    pub async fn url(&self) -> Result<String> {
        self.base.step("Read page URL");
        self.base.current_url().await
    }

    pub async fn page_source(&self) -> Result<String> {
        self.base.require_open("reading the page source")?;
        self.base.content().await
    }

    pub async fn reload(&mut self) -> Result<()> {
        self.base.step("Reload page");
        self.base.reload().await
    }

    /// Screenshot the page into the screenshots directory and the report
    pub async fn capture(&self, name: &str) -> Result<PathBuf> {
        self.base.step(&format!("Capture '{}'", name));
        self.base.screenshot(name).await
    }

    pub fn close(&mut self) {
        self.base.step("Close page");
        self.base.close();
    }

    /// In-memory stand-in for the search engine, for tests that must not
    /// touch the network
    pub fn fake_site() -> FakeSite {
        let search_box = |value: &str| {
            FakeElement::textarea(SEARCH_INPUT)
                .with_attr("name", "q")
                .with_value(value)
                .submits_to("/search")
        };

        let home = FakeDocument::new("Google")
            .with(FakeElement::button(CONSENT_BUTTON, "Accept all").on_click(ClickEffect::Hide(CONSENT_BUTTON.to_string())))
            .with(search_box(""));

        FakeSite::new().page("/", home).route("/search", move |url| {
            let query = url
                .query_pairs()
                .find(|(k, _)| k == "q")
                .map(|(_, v)| v.to_string())
                .unwrap_or_default();

            let mut doc = FakeDocument::new(format!("{} - Google Search", query)).with(search_box(&query));
            if !query.trim().is_empty() {
                for title in [
                    format!("{} - Official Site", query),
                    format!("Learn {} in 10 minutes", query),
                    format!("{} - Wikipedia", query),
                ] {
                    doc = doc.with(FakeElement::heading(RESULT_TITLES, title).visible_after(Duration::from_millis(15)));
                }
            }
            doc
        })
    }
}

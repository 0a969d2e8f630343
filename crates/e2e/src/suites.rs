//! Built-in suites

use futures::future::BoxFuture;
use std::sync::Arc;

use surfcheck_common::Result;

use crate::expect;
use crate::fixture::TestContext;
use crate::pages::SearchPage;
use crate::runner::{Suite, TestCase};

pub const SEARCH_SUITE: &str = "search";

/// Inputs for the search scenario
#[derive(Debug, Clone)]
pub struct SearchScenario {
    /// Regex the home page title must match
    pub title_pattern: String,
    pub first_query: String,
    pub second_query: String,
}

impl Default for SearchScenario {
    fn default() -> Self {
        Self {
            title_pattern: "(?i)google".to_string(),
            first_query: "Playwright".to_string(),
            second_query: "Rust language".to_string(),
        }
    }
}

pub fn search_suite() -> Suite {
    search_suite_with(SearchScenario::default())
}

pub fn search_suite_with(scenario: SearchScenario) -> Suite {
    let scenario = Arc::new(scenario);

    let home = {
        let scenario = scenario.clone();
        TestCase::new("home page loads", move |ctx| home_page_loads(ctx, scenario.clone()))
            .tag("smoke")
    };
    let search = {
        let scenario = scenario.clone();
        TestCase::new("search shows results", move |ctx| search_shows_results(ctx, scenario.clone()))
            .tag("smoke")
    };
    let refine = {
        let scenario = scenario.clone();
        TestCase::new("second search changes results", move |ctx| {
            second_search_changes_results(ctx, scenario.clone())
        })
        .tag("regression")
    };

    Suite::new(SEARCH_SUITE).case(home).case(search).case(refine)
}

fn home_page_loads(ctx: TestContext, scenario: Arc<SearchScenario>) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let mut page = SearchPage::new(&ctx);
        page.open_home().await?;
        let title = page.title().await?;
        expect::matches("home page title", &title, &scenario.title_pattern)
    })
}

fn search_shows_results(ctx: TestContext, scenario: Arc<SearchScenario>) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let mut page = SearchPage::new(&ctx);
        page.open_home().await?;
        page.search(&scenario.first_query).await?;

        let url = page.url().await?;
        expect::contains("results URL", &url, &form_encoded("q", &scenario.first_query))?;

        let count = page.result_count().await?;
        expect::at_least("results", count, 1)?;
        ctx.logger.info(format!("'{}' returned {} result(s)", scenario.first_query, count));
        Ok(())
    })
}

fn second_search_changes_results(
    ctx: TestContext,
    scenario: Arc<SearchScenario>,
) -> BoxFuture<'static, Result<()>> {
    Box::pin(async move {
        let mut page = SearchPage::new(&ctx);
        page.open_home().await?;
        page.search(&scenario.first_query).await?;
        let first = page.first_result_text().await?;

        page.clear_search().await?;
        expect::equal("search box after clearing", &page.search_box_value().await?, &String::new())?;

        page.search(&scenario.second_query).await?;
        let url = page.url().await?;
        expect::contains("results URL", &url, &form_encoded("q", &scenario.second_query))?;
        expect::at_least("results", page.result_count().await?, 1)?;

        let second = page.first_result_text().await?;
        expect::not_equal("first result", &second, &first)?;

        let titles = page.result_titles().await?.join(" | ");
        let keyword = scenario
            .second_query
            .split_whitespace()
            .next()
            .unwrap_or(&scenario.second_query);
        expect::mentions("result titles", &titles, keyword)
    })
}

/// `key=value` the way a browser encodes a submitted form field
fn form_encoded(key: &str, value: &str) -> String {
    url::form_urlencoded::Serializer::new(String::new())
        .append_pair(key, value)
        .finish()
}

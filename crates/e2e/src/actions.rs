//! UI action utilities
//!
//! Each action resolves its target, waits for it to become visible, performs
//! the action, then logs it and records a report step. Script variants
//! (`click_via_script`, `fill_via_script`) manipulate the DOM directly and
//! are only used when a caller asks for them.

use std::sync::Arc;
use std::time::Duration;

use surfcheck_common::{Error, Logger, Result};

use crate::driver::{ClickOptions, ElementHandle, MouseButton, Page, WaitState};
use crate::report::Reporter;

/// What an action operates on
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    Selector(&'a str),
    Element(&'a ElementHandle),
}

impl<'a> Target<'a> {
    pub fn describe(&self) -> &'a str {
        match self {
            Target::Selector(selector) => selector,
            Target::Element(element) => element.selector(),
        }
    }
}

impl<'a> From<&'a str> for Target<'a> {
    fn from(selector: &'a str) -> Self {
        Target::Selector(selector)
    }
}

impl<'a> From<&'a String> for Target<'a> {
    fn from(selector: &'a String) -> Self {
        Target::Selector(selector)
    }
}

impl<'a> From<&'a ElementHandle> for Target<'a> {
    fn from(element: &'a ElementHandle) -> Self {
        Target::Element(element)
    }
}

/// Per-call action settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionOptions {
    /// Overrides the context's default timeout
    pub timeout: Option<Duration>,
    /// Skip the driver's actionability checks on click
    pub force: bool,
    /// Delay between mouse down/up, or between typed keys
    pub delay: Option<Duration>,
    pub click_count: u32,
    pub button: MouseButton,
    /// Record a report step for this action
    pub report: bool,
}

impl Default for ActionOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            force: false,
            delay: None,
            click_count: 1,
            button: MouseButton::Left,
            report: true,
        }
    }
}

impl ActionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn force(mut self) -> Self {
        self.force = true;
        self
    }

    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn button(mut self, button: MouseButton) -> Self {
        self.button = button;
        self
    }

    pub fn quiet(mut self) -> Self {
        self.report = false;
        self
    }
}

/// Handles every action needs: the page plus logging and reporting
#[derive(Clone)]
pub struct ActionContext {
    page: Arc<dyn Page>,
    logger: Logger,
    reporter: Arc<Reporter>,
    default_timeout: Duration,
}

impl ActionContext {
    pub fn new(page: Arc<dyn Page>, logger: Logger, reporter: Arc<Reporter>, default_timeout: Duration) -> Self {
        Self {
            page,
            logger: logger.scoped("actions"),
            reporter,
            default_timeout,
        }
    }

    pub fn default_timeout(&self) -> Duration {
        self.default_timeout
    }

    pub(crate) fn page(&self) -> &Arc<dyn Page> {
        &self.page
    }

    fn timeout(&self, options: &ActionOptions) -> Duration {
        options.timeout.unwrap_or(self.default_timeout)
    }

    fn record(&self, options: &ActionOptions, action: &str, target: &str, details: Option<&str>) {
        let name = format!("{} {}", action, target);
        if options.report {
            self.reporter.add_step(&name, details);
        } else {
            self.logger.debug(name);
        }
    }

    fn failed(&self, action: &str, target: &str, error: &Error) {
        self.logger
            .error(format!("{} {} failed: {}", action, target, error));
    }

    async fn resolve(&self, target: Target<'_>, timeout: Duration) -> Result<ElementHandle> {
        match target {
            Target::Selector(selector) => self
                .page
                .wait_for_selector(selector, WaitState::Visible, timeout)
                .await?
                .ok_or_else(|| Error::ElementNotFound(selector.to_string())),
            Target::Element(element) => {
                self.page
                    .wait_for_element(element, WaitState::Visible, timeout)
                    .await?;
                Ok(element.clone())
            }
        }
    }

    /// Resolve, act, and log/report in one place
    async fn perform<T, F, Fut>(
        &self,
        action: &str,
        target: Target<'_>,
        options: &ActionOptions,
        details: Option<&str>,
        act: F,
    ) -> Result<T>
    where
        F: FnOnce(ElementHandle, Duration) -> Fut,
        Fut: std::future::Future<Output = Result<T>>,
    {
        let timeout = self.timeout(options);
        let described = target.describe();
        let result = async {
            let element = self.resolve(target, timeout).await?;
            act(element, timeout).await
        }
        .await;

        match &result {
            Ok(_) => self.record(options, action, described, details),
            Err(e) => self.failed(action, described, e),
        }
        result
    }
}

pub async fn click<'a>(ctx: &ActionContext, target: impl Into<Target<'a>>, options: &ActionOptions) -> Result<()> {
    let click = ClickOptions {
        button: options.button,
        click_count: options.click_count.max(1),
        delay: options.delay,
        force: options.force,
        timeout: ctx.timeout(options),
    };
    ctx.perform("Click", target.into(), options, None, |el, _| async move {
        ctx.page.click(&el, &click).await
    })
    .await
}

pub async fn double_click<'a>(
    ctx: &ActionContext,
    target: impl Into<Target<'a>>,
    options: &ActionOptions,
) -> Result<()> {
    let options = ActionOptions {
        click_count: 2,
        ..options.clone()
    };
    click(ctx, target, &options).await
}

/// Click through `element.click()` in the page instead of a pointer event
pub async fn click_via_script<'a>(
    ctx: &ActionContext,
    target: impl Into<Target<'a>>,
    options: &ActionOptions,
) -> Result<()> {
    ctx.perform("Click (script)", target.into(), options, None, |el, _| async move {
        ctx.page.click_via_script(&el).await
    })
    .await
}

pub async fn fill<'a>(
    ctx: &ActionContext,
    target: impl Into<Target<'a>>,
    value: &str,
    options: &ActionOptions,
) -> Result<()> {
    ctx.perform("Fill", target.into(), options, Some(value), |el, timeout| async move {
        ctx.page.fill(&el, value, timeout).await
    })
    .await
}

/// Assign the value in the page and fire `input`/`change` events
pub async fn fill_via_script<'a>(
    ctx: &ActionContext,
    target: impl Into<Target<'a>>,
    value: &str,
    options: &ActionOptions,
) -> Result<()> {
    ctx.perform("Fill (script)", target.into(), options, Some(value), |el, _| async move {
        ctx.page.fill_via_script(&el, value).await
    })
    .await
}

pub async fn clear<'a>(ctx: &ActionContext, target: impl Into<Target<'a>>, options: &ActionOptions) -> Result<()> {
    ctx.perform("Clear", target.into(), options, None, |el, timeout| async move {
        ctx.page.fill(&el, "", timeout).await
    })
    .await
}

/// Type key by key, honoring `options.delay`
pub async fn type_text<'a>(
    ctx: &ActionContext,
    target: impl Into<Target<'a>>,
    text: &str,
    options: &ActionOptions,
) -> Result<()> {
    let delay = options.delay;
    ctx.perform("Type", target.into(), options, Some(text), |el, timeout| async move {
        ctx.page.type_text(&el, text, delay, timeout).await
    })
    .await
}

pub async fn press<'a>(
    ctx: &ActionContext,
    target: impl Into<Target<'a>>,
    key: &str,
    options: &ActionOptions,
) -> Result<()> {
    ctx.perform("Press", target.into(), options, Some(key), |el, timeout| async move {
        ctx.page.press(&el, key, timeout).await
    })
    .await
}

/// Press a key on whatever currently has focus
pub async fn press_key(ctx: &ActionContext, key: &str, options: &ActionOptions) -> Result<()> {
    match ctx.page.keyboard_press(key).await {
        Ok(()) => {
            ctx.record(options, "Press", "keyboard", Some(key));
            Ok(())
        }
        Err(e) => {
            ctx.failed("Press", "keyboard", &e);
            Err(e)
        }
    }
}

pub async fn select_option<'a>(
    ctx: &ActionContext,
    target: impl Into<Target<'a>>,
    values: &[&str],
    options: &ActionOptions,
) -> Result<Vec<String>> {
    let values: Vec<String> = values.iter().map(|v| v.to_string()).collect();
    let details = values.join(", ");
    ctx.perform("Select", target.into(), options, Some(&details), |el, timeout| {
        let values = &values;
        async move { ctx.page.select_option(&el, values, timeout).await }
    })
    .await
}

pub async fn hover<'a>(ctx: &ActionContext, target: impl Into<Target<'a>>, options: &ActionOptions) -> Result<()> {
    ctx.perform("Hover", target.into(), options, None, |el, timeout| async move {
        ctx.page.hover(&el, timeout).await
    })
    .await
}

pub async fn check<'a>(ctx: &ActionContext, target: impl Into<Target<'a>>, options: &ActionOptions) -> Result<()> {
    ctx.perform("Check", target.into(), options, None, |el, timeout| async move {
        ctx.page.set_checked(&el, true, timeout).await
    })
    .await
}

pub async fn uncheck<'a>(ctx: &ActionContext, target: impl Into<Target<'a>>, options: &ActionOptions) -> Result<()> {
    ctx.perform("Uncheck", target.into(), options, None, |el, timeout| async move {
        ctx.page.set_checked(&el, false, timeout).await
    })
    .await
}

pub async fn text_of<'a>(ctx: &ActionContext, target: impl Into<Target<'a>>, options: &ActionOptions) -> Result<String> {
    let options = ActionOptions {
        report: false,
        ..options.clone()
    };
    ctx.perform("Read text of", target.into(), &options, None, |el, _| async move {
        ctx.page.text_content(&el).await
    })
    .await
}

pub async fn value_of<'a>(ctx: &ActionContext, target: impl Into<Target<'a>>, options: &ActionOptions) -> Result<String> {
    let options = ActionOptions {
        report: false,
        ..options.clone()
    };
    ctx.perform("Read value of", target.into(), &options, None, |el, _| async move {
        ctx.page.input_value(&el).await
    })
    .await
}

pub async fn attribute_of<'a>(
    ctx: &ActionContext,
    target: impl Into<Target<'a>>,
    name: &str,
    options: &ActionOptions,
) -> Result<Option<String>> {
    let options = ActionOptions {
        report: false,
        ..options.clone()
    };
    ctx.perform("Read attribute of", target.into(), &options, Some(name), |el, _| async move {
        ctx.page.get_attribute(&el, name).await
    })
    .await
}

/// Wait until the target is visible and return its handle
pub async fn wait_visible<'a>(
    ctx: &ActionContext,
    target: impl Into<Target<'a>>,
    options: &ActionOptions,
) -> Result<ElementHandle> {
    ctx.perform("Wait for", target.into(), options, Some("visible"), |el, _| async move { Ok(el) })
        .await
}

pub async fn wait_hidden<'a>(ctx: &ActionContext, target: impl Into<Target<'a>>, options: &ActionOptions) -> Result<()> {
    let target = target.into();
    let timeout = ctx.timeout(options);
    let result = match target {
        Target::Selector(selector) => ctx
            .page
            .wait_for_selector(selector, WaitState::Hidden, timeout)
            .await
            .map(|_| ()),
        Target::Element(element) => ctx.page.wait_for_element(element, WaitState::Hidden, timeout).await,
    };
    match &result {
        Ok(()) => ctx.record(options, "Wait for", target.describe(), Some("hidden")),
        Err(e) => ctx.failed("Wait for hidden", target.describe(), e),
    }
    result
}

/// Visible right now, without waiting
pub async fn is_visible(ctx: &ActionContext, selector: &str) -> Result<bool> {
    let visible = ctx.page.is_visible(selector).await?;
    ctx.logger.debug(format!("{} visible: {}", selector, visible));
    Ok(visible)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::{ClickEffect, FakeDocument, FakeElement, FakePage, FakeSite};

    async fn context() -> (Arc<FakePage>, ActionContext, tempfile::TempDir) {
        let site = FakeSite::new()
            .page(
                "/form",
                FakeDocument::new("Form")
                    .with(FakeElement::input("#name"))
                    .with(FakeElement::select("#size", &["s", "m", "l"]))
                    .with(FakeElement::checkbox("#terms"))
                    .with(
                        FakeElement::button("#submit", "Submit")
                            .script_only()
                            .on_click(ClickEffect::Navigate("/done".into())),
                    )
                    .with(FakeElement::button("#never", "Never").hidden())
                    .with(FakeElement::button("#slow", "Slow").visible_after(Duration::from_millis(30))),
            )
            .page("/done", FakeDocument::new("Done"));

        let page = Arc::new(FakePage::new(site));
        page.goto("https://fake.test/form", Duration::from_secs(1)).await.unwrap();

        let dir = tempfile::tempdir().unwrap();
        let reporter = Arc::new(Reporter::new(dir.path(), Logger::new("test")));
        reporter.start_test("actions", "unit");
        let ctx = ActionContext::new(page.clone(), Logger::new("test"), reporter, Duration::from_secs(2));
        (page, ctx, dir)
    }

    #[tokio::test]
    async fn test_fill_select_check_and_read_back() {
        let (_page, ctx, _dir) = context().await;
        let opts = ActionOptions::default();

        fill(&ctx, "#name", "Grace", &opts).await.unwrap();
        assert_eq!(value_of(&ctx, "#name", &opts).await.unwrap(), "Grace");
        type_text(&ctx, "#name", " Hopper", &opts).await.unwrap();
        assert_eq!(value_of(&ctx, "#name", &opts).await.unwrap(), "Grace Hopper");
        clear(&ctx, "#name", &opts).await.unwrap();
        assert_eq!(value_of(&ctx, "#name", &opts).await.unwrap(), "");

        assert_eq!(select_option(&ctx, "#size", &["m"], &opts).await.unwrap(), vec!["m"]);
        check(&ctx, "#terms", &opts).await.unwrap();
        assert_eq!(attribute_of(&ctx, "#terms", "checked", &opts).await.unwrap(), Some(String::new()));
        uncheck(&ctx, "#terms", &opts).await.unwrap();
        assert_eq!(attribute_of(&ctx, "#terms", "checked", &opts).await.unwrap(), None);

        let steps = ctx.reporter.snapshot().unwrap().steps;
        assert!(steps.iter().any(|s| s.name == "Fill #name" && s.details.as_deref() == Some("Grace")));
        assert!(!steps.iter().any(|s| s.name.starts_with("Read value of")));
    }

    #[tokio::test]
    async fn test_script_click_is_never_substituted() {
        let (page, ctx, _dir) = context().await;

        let err = click(&ctx, "#submit", &ActionOptions::default()).await.unwrap_err();
        assert!(matches!(err, Error::Driver(_)));
        assert!(!page.actions().iter().any(|a| a.starts_with("click_via_script")));

        click_via_script(&ctx, "#submit", &ActionOptions::default()).await.unwrap();
        assert_eq!(page.title().await.unwrap(), "Done");
    }

    #[tokio::test]
    async fn test_wait_beyond_timeout_is_classified_as_timeout() {
        let (_page, ctx, _dir) = context().await;
        let opts = ActionOptions::new().timeout(Duration::from_millis(5));

        let err = click(&ctx, "#never", &opts).await.unwrap_err();
        assert!(err.is_timeout(), "unexpected error: {}", err);
        assert!(err.to_string().starts_with("TimeoutError"));
    }

    #[tokio::test]
    async fn test_accepts_resolved_handles() {
        let (_page, ctx, _dir) = context().await;
        let slow = wait_visible(&ctx, "#slow", &ActionOptions::default()).await.unwrap();
        hover(&ctx, &slow, &ActionOptions::default()).await.unwrap();
        assert_eq!(text_of(&ctx, &slow, &ActionOptions::default()).await.unwrap(), "Slow");
        wait_hidden(&ctx, "#never", &ActionOptions::new().timeout(Duration::from_millis(5)))
            .await
            .unwrap();
        assert!(!is_visible(&ctx, "#never").await.unwrap());
    }
}

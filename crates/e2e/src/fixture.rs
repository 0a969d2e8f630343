//! Per-test lifecycle
//!
//! [`Lifecycle::run_test`] owns the sequence around one test body:
//!
//! ```text
//! isolate ─► apply defaults ─► start report ─► body ─┬─ Ok ──► "Test passed" ─────────────┐
//!                                                    └─ Err ─► "Test failed", screenshot, │
//!                                                              error details ─────────────┤
//!                                                                   end report ◄──────────┘
//!                                                                   isolate
//! ```
//!
//! Anything that goes wrong outside the body is logged and absorbed, so the
//! body's own result always decides the test's status.

use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use surfcheck_common::utils::{dates, files};
use surfcheck_common::{Config, Error, ErrorKind, Logger, Result};

use crate::actions::ActionContext;
use crate::driver::Page;
use crate::report::{Reporter, Status, TestRecord};

/// Identity of a test
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestInfo {
    pub name: String,
    pub suite: String,
    pub tags: Vec<String>,
}

impl TestInfo {
    pub fn new(name: impl Into<String>, suite: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            suite: suite.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_tags(mut self, tags: &[String]) -> Self {
        self.tags = tags.to_vec();
        self
    }
}

/// Fixtures handed to a test body
#[derive(Clone)]
pub struct TestContext {
    pub info: TestInfo,
    pub page: Arc<dyn Page>,
    pub logger: Logger,
    pub reporter: Arc<Reporter>,
    pub config: Arc<Config>,
    pub actions: ActionContext,
}

impl TestContext {
    /// Fixtures outside a lifecycle, for ad-hoc scripts and unit tests.
    /// Report calls are ignored until a test is started on the reporter.
    pub fn standalone(page: Arc<dyn Page>, config: Arc<Config>, name: &str) -> Self {
        let logger = Logger::default().for_test(name);
        let reporter = Arc::new(Reporter::new(config.paths.allure_results.clone(), logger.clone()));
        let actions = ActionContext::new(page.clone(), logger.clone(), reporter.clone(), config.timeouts.default);
        Self {
            info: TestInfo::new(name, "standalone"),
            page,
            logger,
            reporter,
            config,
            actions,
        }
    }

    pub fn step(&self, name: &str) {
        self.reporter.add_step(name, None);
    }
}

/// What happened to one test
#[derive(Debug, Clone)]
pub struct TestOutcome {
    pub name: String,
    pub status: Status,
    pub error: Option<String>,
    pub error_kind: Option<ErrorKind>,
    pub duration: Duration,
    /// Failure screenshot saved on disk
    pub screenshot: Option<PathBuf>,
    /// The flushed report entry; `None` for discarded attempts
    pub record: Option<TestRecord>,
}

impl TestOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(self.status, Status::Failed | Status::Broken)
    }
}

/// Terminal status for a body result
pub fn status_for(result: &Result<()>) -> Status {
    match result {
        Ok(()) => Status::Passed,
        Err(e) => match e.kind() {
            ErrorKind::Skipped => Status::Skipped,
            ErrorKind::Assertion | ErrorKind::Timeout => Status::Failed,
            ErrorKind::Infrastructure | ErrorKind::Configuration => Status::Broken,
        },
    }
}

pub struct Lifecycle {
    page: Arc<dyn Page>,
    reporter: Arc<Reporter>,
    logger: Logger,
    config: Arc<Config>,
}

impl Lifecycle {
    pub fn new(page: Arc<dyn Page>, reporter: Arc<Reporter>, logger: Logger, config: Arc<Config>) -> Self {
        Self {
            page,
            reporter,
            logger: logger.scoped("lifecycle"),
            config,
        }
    }

    pub fn reporter(&self) -> &Arc<Reporter> {
        &self.reporter
    }

    pub fn config(&self) -> &Arc<Config> {
        &self.config
    }

    /// Run one test body between setup and teardown
    pub async fn run_test<F, Fut>(&self, info: TestInfo, body: F) -> TestOutcome
    where
        F: FnOnce(TestContext) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        self.run_attempt(info, body, true).await
    }

    /// Like [`run_test`](Self::run_test), but a failed attempt is dropped
    /// from the report instead of written when `keep_failure` is false
    pub async fn run_attempt<F, Fut>(&self, info: TestInfo, body: F, keep_failure: bool) -> TestOutcome
    where
        F: FnOnce(TestContext) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let started = Instant::now();
        let logger = self.logger.for_test(&info.name);

        if let Err(e) = self.isolate().await {
            logger.warn(format!("Could not reset browser state before test: {}", e));
        }
        self.apply_defaults(&logger).await;

        self.reporter.start_test(&info.name, &info.suite);
        for tag in &info.tags {
            self.reporter.add_label("tag", tag);
        }
        logger.info(format!("Test started: {}", info.name));
        self.reporter.add_step("Test started", Some(&info.name));

        let ctx = self.context(info.clone(), logger.clone());
        let result = match AssertUnwindSafe(async move { body(ctx).await })
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(payload) => Err(Error::Assertion(format!("test panicked: {}", panic_message(payload)))),
        };

        let status = status_for(&result);
        let mut screenshot = None;
        match &result {
            Ok(()) => {
                logger.pass(&info.name);
                self.reporter.add_step("Test passed", None);
            }
            Err(e) if status == Status::Skipped => {
                logger.info(format!("Test skipped: {}", e));
                self.reporter.add_step("Test skipped", Some(&e.to_string()));
            }
            Err(e) => {
                logger.fail(format!("{}: {}", info.name, e));
                self.reporter.add_step("Test failed", Some(&e.to_string()));
                screenshot = self.capture_failure(&logger, &info).await;
                self.reporter.add_error_details(e);
            }
        }

        let message = result.as_ref().err().map(|e| e.to_string());
        let failed = matches!(status, Status::Failed | Status::Broken);
        let record = if failed && !keep_failure {
            self.reporter.discard_test();
            None
        } else {
            self.reporter.end_test(status, message.clone())
        };

        if let Err(e) = self.isolate().await {
            logger.warn(format!("Could not reset browser state after test: {}", e));
        }

        TestOutcome {
            name: info.name,
            status,
            error: message,
            error_kind: result.as_ref().err().map(Error::kind),
            duration: started.elapsed(),
            screenshot,
            record,
        }
    }

    /// Report a test as skipped without running it
    pub fn record_skipped(&self, info: TestInfo, reason: &str) -> TestOutcome {
        let logger = self.logger.for_test(&info.name);
        logger.info(format!("Test skipped: {}", reason));
        self.reporter.start_test(&info.name, &info.suite);
        self.reporter.add_step("Test skipped", Some(reason));
        let record = self
            .reporter
            .end_test(Status::Skipped, Some(reason.to_string()));

        TestOutcome {
            name: info.name,
            status: Status::Skipped,
            error: Some(reason.to_string()),
            error_kind: Some(ErrorKind::Skipped),
            duration: Duration::ZERO,
            screenshot: None,
            record,
        }
    }

    /// Clear cookies plus local and session storage.
    ///
    /// Cookies are cleared for the whole browser context. Storage can only
    /// be cleared for the origin the page is on, so a test that visits
    /// several origins leaves storage behind on all but the last one.
    pub async fn isolate(&self) -> Result<()> {
        let cookies = self.page.clear_cookies().await;
        let storage = self.page.clear_storage().await;
        cookies.and(storage)
    }

    fn context(&self, info: TestInfo, logger: Logger) -> TestContext {
        let actions = ActionContext::new(
            self.page.clone(),
            logger.clone(),
            self.reporter.clone(),
            self.config.timeouts.default,
        );
        TestContext {
            info,
            page: self.page.clone(),
            logger,
            reporter: self.reporter.clone(),
            config: self.config.clone(),
            actions,
        }
    }

    async fn apply_defaults(&self, logger: &Logger) {
        let timeouts = &self.config.timeouts;
        if let Err(e) = self.page.set_default_timeout(timeouts.default).await {
            logger.warn(format!("Could not set default timeout: {}", e));
        }
        if let Err(e) = self.page.set_default_navigation_timeout(timeouts.navigation).await {
            logger.warn(format!("Could not set navigation timeout: {}", e));
        }
        if let Err(e) = self.page.set_viewport(self.config.viewport).await {
            logger.warn(format!("Could not set viewport: {}", e));
        }
    }

    /// Full-page screenshot saved to disk and attached to the open entry.
    /// Never fails: a page that is already gone just yields no screenshot.
    async fn capture_failure(&self, logger: &Logger, info: &TestInfo) -> Option<PathBuf> {
        let bound = self.config.timeouts.short;
        let png = match tokio::time::timeout(bound, self.page.screenshot(true)).await {
            Ok(Ok(png)) => png,
            Ok(Err(e)) => {
                logger.warn(format!("Could not capture failure screenshot: {}", e));
                return None;
            }
            Err(_) => {
                logger.warn(format!("Failure screenshot timed out after {}ms", bound.as_millis()));
                return None;
            }
        };

        let path = self.config.paths.screenshots.join(format!(
            "{}_{}.png",
            files::sanitize_file_name(&info.name),
            dates::file_timestamp()
        ));
        let saved = match files::write_bytes(&path, &png) {
            Ok(()) => {
                logger.info(format!("Failure screenshot saved to {}", path.display()));
                Some(path)
            }
            Err(e) => {
                logger.warn(format!("Could not save failure screenshot: {}", e));
                None
            }
        };

        self.reporter
            .add_screenshot("Failure Screenshot", png, saved.as_deref());
        saved
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use test_case::test_case;

    #[test_case(Ok(()), Status::Passed)]
    #[test_case(Err(Error::assertion("x")), Status::Failed)]
    #[test_case(Err(Error::timeout("wait", Duration::from_millis(5))), Status::Failed)]
    #[test_case(Err(Error::Driver("gone".into())), Status::Broken)]
    #[test_case(Err(Error::MissingConfig("BASE_URL".into())), Status::Broken)]
    #[test_case(Err(Error::Skipped("later".into())), Status::Skipped)]
    fn test_status_mapping(result: Result<()>, expected: Status) {
        assert_eq!(status_for(&result), expected);
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(7u8)), "non-string panic payload");
    }
}

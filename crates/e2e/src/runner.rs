//! Suite runner: executes test cases one at a time through the lifecycle

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, warn};

use surfcheck_common::utils::files;
use surfcheck_common::Result;

use crate::fixture::{Lifecycle, TestContext, TestInfo, TestOutcome};
use crate::report::Status;

pub type TestBody = Arc<dyn Fn(TestContext) -> BoxFuture<'static, Result<()>> + Send + Sync>;

/// A named, runnable test
#[derive(Clone)]
pub struct TestCase {
    pub name: String,
    pub tags: Vec<String>,
    /// Reason to skip, if the case is disabled
    pub skip: Option<String>,
    body: TestBody,
}

impl TestCase {
    pub fn new<F, Fut>(name: impl Into<String>, body: F) -> Self
    where
        F: Fn(TestContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        Self {
            name: name.into(),
            tags: Vec::new(),
            skip: None,
            body: Arc::new(move |ctx| -> BoxFuture<'static, Result<()>> { Box::pin(body(ctx)) }),
        }
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn skip(mut self, reason: impl Into<String>) -> Self {
        self.skip = Some(reason.into());
        self
    }
}

impl std::fmt::Debug for TestCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestCase")
            .field("name", &self.name)
            .field("tags", &self.tags)
            .field("skip", &self.skip)
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct Suite {
    pub name: String,
    pub cases: Vec<TestCase>,
}

impl Suite {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cases: Vec::new(),
        }
    }

    pub fn case(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }
}

/// Which cases of a suite to run
#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub tag: Option<String>,
    pub name: Option<String>,
}

impl Filter {
    pub fn matches(&self, case: &TestCase) -> bool {
        let tag_ok = self
            .tag
            .as_ref()
            .map(|tag| case.tags.contains(tag))
            .unwrap_or(true);
        let name_ok = self
            .name
            .as_ref()
            .map(|name| &case.name == name)
            .unwrap_or(true);
        tag_ok && name_ok
    }
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CaseResult {
    pub name: String,
    pub status: Status,
    pub attempts: u32,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot: Option<PathBuf>,
}

/// Result of running a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteResult {
    pub suite: String,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub broken: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub results: Vec<CaseResult>,
}

impl SuiteResult {
    /// Every case passed or was skipped
    pub fn success(&self) -> bool {
        self.failed == 0 && self.broken == 0
    }
}

pub struct SuiteRunner {
    lifecycle: Lifecycle,
}

impl SuiteRunner {
    pub fn new(lifecycle: Lifecycle) -> Self {
        Self { lifecycle }
    }

    pub fn lifecycle(&self) -> &Lifecycle {
        &self.lifecycle
    }

    /// Run the matching cases of `suite` sequentially
    pub async fn run(&self, suite: &Suite, filter: &Filter) -> SuiteResult {
        let start = Instant::now();
        let cases: Vec<&TestCase> = suite.cases.iter().filter(|c| filter.matches(c)).collect();
        let config = self.lifecycle.config();
        if config.workers > 1 {
            warn!(
                "{} workers requested; tests run sequentially within one process",
                config.workers
            );
        }

        info!("Running {} test(s) from '{}'...", cases.len(), suite.name);

        let mut results = Vec::with_capacity(cases.len());
        for case in cases {
            let (outcome, attempts) = self.run_case(&suite.name, case).await;
            match outcome.status {
                Status::Passed => info!("✓ {} ({} ms)", outcome.name, outcome.duration.as_millis()),
                Status::Skipped => info!("- {} (skipped)", outcome.name),
                _ => error!(
                    "✗ {} - {}",
                    outcome.name,
                    outcome.error.as_deref().unwrap_or("unknown error")
                ),
            }
            results.push(CaseResult {
                name: outcome.name,
                status: outcome.status,
                attempts,
                duration_ms: outcome.duration.as_millis() as u64,
                error: outcome.error,
                screenshot: outcome.screenshot,
            });
        }

        let count = |status: Status| results.iter().filter(|r| r.status == status).count();
        let result = SuiteResult {
            suite: suite.name.clone(),
            total: results.len(),
            passed: count(Status::Passed),
            failed: count(Status::Failed),
            broken: count(Status::Broken),
            skipped: count(Status::Skipped),
            duration_ms: start.elapsed().as_millis() as u64,
            results,
        };

        info!(
            "Test Results: {} passed, {} failed, {} broken, {} skipped ({} ms)",
            result.passed, result.failed, result.broken, result.skipped, result.duration_ms
        );
        result
    }

    /// Run one case, re-running failed attempts up to the configured retry
    /// count. Only the final attempt is written to the report.
    async fn run_case(&self, suite: &str, case: &TestCase) -> (TestOutcome, u32) {
        let info = TestInfo::new(case.name.clone(), suite).with_tags(&case.tags);
        if let Some(reason) = &case.skip {
            return (self.lifecycle.record_skipped(info, reason), 0);
        }

        let retries = self.lifecycle.config().retries;
        let mut attempt = 0;
        loop {
            attempt += 1;
            let last = attempt > retries;
            let body = case.body.clone();
            let outcome = self
                .lifecycle
                .run_attempt(info.clone(), move |ctx| body(ctx), last)
                .await;

            if !outcome.is_failure() || last {
                return (outcome, attempt);
            }
            warn!(
                "{} failed on attempt {} of {}: {}; retrying",
                case.name,
                attempt,
                retries + 1,
                outcome.error.as_deref().unwrap_or("unknown error")
            );
        }
    }

    /// Write test results to JSON file
    pub fn write_results(&self, results: &SuiteResult) -> Result<PathBuf> {
        let path = self.lifecycle.config().paths.temp.join("test-results.json");
        files::write_json(&path, results)?;
        info!("Results written to: {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(_: TestContext) -> BoxFuture<'static, Result<()>> {
        Box::pin(async { Ok(()) })
    }

    #[test]
    fn test_filter() {
        let smoke = TestCase::new("home loads", noop).tag("smoke");
        let other = TestCase::new("search works", noop);

        let by_tag = Filter {
            tag: Some("smoke".into()),
            name: None,
        };
        assert!(by_tag.matches(&smoke));
        assert!(!by_tag.matches(&other));

        let by_name = Filter {
            tag: None,
            name: Some("search works".into()),
        };
        assert!(by_name.matches(&other));
        assert!(Filter::default().matches(&smoke));
    }

    #[test]
    fn test_success_counts_broken_as_failure() {
        let result = SuiteResult {
            suite: "s".into(),
            total: 2,
            passed: 1,
            failed: 0,
            broken: 1,
            skipped: 0,
            duration_ms: 0,
            results: vec![],
        };
        assert!(!result.success());
    }
}

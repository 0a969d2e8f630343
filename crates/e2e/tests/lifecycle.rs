//! Lifecycle, reporting and suite runs against the in-memory page

use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use surfcheck_common::utils::files;
use surfcheck_common::{Config, Error, ErrorKind, Logger, Paths};
use surfcheck_e2e::actions::{self, ActionOptions};
use surfcheck_e2e::driver::{Cookie, FakePage, Page, StorageKind};
use surfcheck_e2e::pages::SearchPage;
use surfcheck_e2e::report::{Reporter, Status};
use surfcheck_e2e::runner::{Filter, Suite, SuiteRunner, TestCase};
use surfcheck_e2e::{suites, Lifecycle, TestInfo};
use tempfile::TempDir;

struct Harness {
    dir: TempDir,
    page: Arc<FakePage>,
    config: Arc<Config>,
    lifecycle: Lifecycle,
}

fn harness_with(retries: u32) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let mut config = Config::with_base_url("https://www.google.com");
    config.paths = Paths::under(dir.path());
    config.timeouts.default = Duration::from_secs(2);
    config.timeouts.short = Duration::from_secs(1);
    config.retries = retries;
    let config = Arc::new(config);

    let page = Arc::new(FakePage::new(SearchPage::fake_site()));
    let logger = Logger::new("lifecycle-test");
    let reporter = Arc::new(Reporter::new(config.paths.allure_results.clone(), logger.clone()));
    let lifecycle = Lifecycle::new(page.clone(), reporter, logger, config.clone());

    Harness {
        dir,
        page,
        config,
        lifecycle,
    }
}

fn harness() -> Harness {
    harness_with(0)
}

fn result_files(dir: &Path) -> Vec<serde_json::Value> {
    files::list_files(dir, Some("json"))
        .unwrap_or_default()
        .into_iter()
        .filter(|p| p.to_string_lossy().ends_with("-result.json"))
        .map(|p| files::read_json(&p).unwrap())
        .collect()
}

#[tokio::test]
async fn test_passing_test_writes_one_record() {
    let h = harness();

    let outcome = h
        .lifecycle
        .run_test(TestInfo::new("opens home", "lifecycle"), |ctx| async move {
            let mut page = SearchPage::new(&ctx);
            page.open_home().await?;
            Ok(())
        })
        .await;

    assert_eq!(outcome.status, Status::Passed);
    assert!(outcome.screenshot.is_none());

    let record = outcome.record.unwrap();
    let steps: Vec<_> = record.steps.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(steps.first(), Some(&"Test started"));
    assert_eq!(steps.last(), Some(&"Test passed"));

    let results = result_files(&h.config.paths.allure_results);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["status"], "passed");
    assert_eq!(results[0]["name"], "opens home");
    assert!(!h.lifecycle.reporter().has_open_test());
}

#[tokio::test]
async fn test_assertion_failure_captures_screenshot_and_details() {
    let h = harness();

    let outcome = h
        .lifecycle
        .run_test(TestInfo::new("wrong title", "lifecycle"), |ctx| async move {
            let mut page = SearchPage::new(&ctx);
            page.open_home().await?;
            let title = page.title().await?;
            surfcheck_e2e::expect::equal("title", &title, &"Bing".to_string())
        })
        .await;

    assert_eq!(outcome.status, Status::Failed);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Assertion));

    let screenshot = outcome.screenshot.clone().unwrap();
    assert!(screenshot.exists());
    assert!(screenshot.starts_with(&h.config.paths.screenshots));
    let file_name = screenshot.file_name().unwrap().to_string_lossy().to_string();
    assert!(file_name.starts_with("wrong_title_"));
    assert!(file_name.ends_with(".png"));

    let record = outcome.record.unwrap();
    assert!(record.attachment("Failure Screenshot").is_some());
    let details = record.attachment("Error Details").unwrap();
    let details: serde_json::Value = serde_json::from_slice(details.content.as_bytes()).unwrap();
    assert_eq!(details["name"], "AssertionError");
    assert_eq!(details["kind"], "assertion");
    assert!(details["message"].as_str().unwrap().contains("Bing"));
    assert!(record.steps.iter().any(|s| s.name == "Test failed"));

    let results = result_files(&h.config.paths.allure_results);
    assert_eq!(results.len(), 1);
    assert_eq!(results[0]["status"], "failed");
    assert!(results[0]["attachments"].as_array().unwrap().len() >= 2);
}

#[tokio::test]
async fn test_short_visibility_wait_times_out() {
    let h = harness();

    let outcome = h
        .lifecycle
        .run_test(TestInfo::new("never visible", "lifecycle"), |ctx| async move {
            let mut page = SearchPage::new(&ctx);
            page.open_home().await?;
            let options = ActionOptions::new().timeout(Duration::from_millis(5));
            actions::wait_visible(&ctx.actions, "#does-not-exist", &options).await?;
            Ok(())
        })
        .await;

    assert_eq!(outcome.status, Status::Failed);
    assert_eq!(outcome.error_kind, Some(ErrorKind::Timeout));
    assert!(outcome.error.as_deref().unwrap().contains("TimeoutError"));
    assert!(outcome.error.as_deref().unwrap().contains("5ms"));
    assert!(outcome.screenshot.is_some());
    assert!(outcome.record.unwrap().attachment("Failure Screenshot").is_some());
}

#[tokio::test]
async fn test_browser_state_is_cleared_between_tests() {
    let h = harness();

    let first = h
        .lifecycle
        .run_test(TestInfo::new("dirties state", "lifecycle"), |ctx| async move {
            SearchPage::new(&ctx).open_home().await?;
            ctx.page.add_cookie(Cookie::new("session", "abc")).await?;
            ctx.page.set_storage_item(StorageKind::Local, "theme", "dark").await?;
            ctx.page.set_storage_item(StorageKind::Session, "cart", "3").await?;
            Ok(())
        })
        .await;
    assert_eq!(first.status, Status::Passed);

    let second = h
        .lifecycle
        .run_test(TestInfo::new("sees clean state", "lifecycle"), |ctx| async move {
            SearchPage::new(&ctx).open_home().await?;
            let cookies = ctx.page.cookies().await?;
            let storage = ctx.page.storage().await?;
            if !cookies.is_empty() || !storage.is_empty() {
                return Err(Error::assertion("state leaked from previous test"));
            }
            Ok(())
        })
        .await;
    assert_eq!(second.status, Status::Passed, "{:?}", second.error);
}

#[tokio::test]
async fn test_isolation_clears_only_the_current_origin() {
    let h = harness();

    let outcome = h
        .lifecycle
        .run_test(TestInfo::new("visits two origins", "lifecycle"), |ctx| async move {
            let wait = Duration::from_secs(1);
            ctx.page.goto("https://accounts.example.test/", wait).await?;
            ctx.page.set_storage_item(StorageKind::Local, "token", "t").await?;
            SearchPage::new(&ctx).open_home().await?;
            ctx.page.set_storage_item(StorageKind::Local, "theme", "dark").await?;
            Ok(())
        })
        .await;
    assert_eq!(outcome.status, Status::Passed, "{:?}", outcome.error);

    assert!(h.page.storage().await.unwrap().is_empty());
    assert_eq!(h.page.stored_origins(), vec!["https://accounts.example.test".to_string()]);
}

#[tokio::test]
async fn test_defaults_applied_before_body() {
    let h = harness();

    h.lifecycle
        .run_test(TestInfo::new("defaults", "lifecycle"), |_ctx| async move { Ok(()) })
        .await;

    assert_eq!(h.page.default_timeout(), Some(h.config.timeouts.default));
    assert_eq!(h.page.navigation_timeout(), Some(h.config.timeouts.navigation));
    assert_eq!(h.page.viewport(), h.config.viewport);
}

#[tokio::test]
async fn test_closed_page_does_not_mask_failure() {
    let h = harness();

    let outcome = h
        .lifecycle
        .run_test(TestInfo::new("closes page", "lifecycle"), |ctx| async move {
            ctx.page.close().await?;
            Err(Error::assertion("failed after closing"))
        })
        .await;

    assert_eq!(outcome.status, Status::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("failed after closing"));
    assert!(outcome.screenshot.is_none());

    let record = outcome.record.unwrap();
    assert!(record.attachment("Failure Screenshot").is_none());
    assert!(record.attachment("Error Details").is_some());
    assert_eq!(result_files(&h.config.paths.allure_results).len(), 1);
}

#[tokio::test]
async fn test_screenshot_failure_is_absorbed() {
    let h = harness();
    h.page.fail_screenshots(true);

    let outcome = h
        .lifecycle
        .run_test(TestInfo::new("no screenshot", "lifecycle"), |_ctx| async move {
            Err(Error::Driver("element detached".into()))
        })
        .await;

    assert_eq!(outcome.status, Status::Broken);
    assert!(outcome.screenshot.is_none());
    assert!(outcome.record.unwrap().attachment("Error Details").is_some());
}

#[tokio::test]
async fn test_panic_is_reported_as_failure() {
    let h = harness();

    let outcome = h
        .lifecycle
        .run_test(TestInfo::new("panics", "lifecycle"), |_ctx| async move {
            if Path::new("/").exists() {
                panic!("boom");
            }
            Ok(())
        })
        .await;

    assert_eq!(outcome.status, Status::Failed);
    assert!(outcome.error.as_deref().unwrap().contains("test panicked: boom"));
    assert!(outcome.screenshot.is_some());
    assert_eq!(result_files(&h.config.paths.allure_results).len(), 1);
}

#[tokio::test]
async fn test_skipped_body_is_not_a_failure() {
    let h = harness();

    let outcome = h
        .lifecycle
        .run_test(TestInfo::new("not today", "lifecycle"), |_ctx| async move {
            Err(Error::Skipped("feature flag off".into()))
        })
        .await;

    assert_eq!(outcome.status, Status::Skipped);
    assert!(!outcome.is_failure());
    assert!(outcome.screenshot.is_none());
    assert_eq!(result_files(&h.config.paths.allure_results)[0]["status"], "skipped");
}

#[tokio::test]
async fn test_retries_produce_one_record() {
    let h = harness_with(2);
    let calls = Arc::new(AtomicU32::new(0));

    let counter = calls.clone();
    let flaky = TestCase::new("flaky", move |_ctx| {
        let counter = counter.clone();
        async move {
            if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(Error::assertion("not yet"))
            } else {
                Ok(())
            }
        }
    });
    let disabled = TestCase::new("disabled", |_ctx| async move { Ok(()) }).skip("quarantined");
    let suite = Suite::new("retries").case(flaky).case(disabled);

    let runner = SuiteRunner::new(h.lifecycle);
    let result = runner.run(&suite, &Filter::default()).await;

    assert_eq!(calls.load(Ordering::SeqCst), 3);
    assert_eq!(result.total, 2);
    assert_eq!(result.passed, 1);
    assert_eq!(result.skipped, 1);
    assert!(result.success());
    assert_eq!(result.results[0].attempts, 3);
    assert_eq!(result.results[1].attempts, 0);

    let results = result_files(&h.config.paths.allure_results);
    assert_eq!(results.len(), 2);
    let mut statuses: Vec<_> = results.iter().map(|r| r["status"].as_str().unwrap().to_string()).collect();
    statuses.sort();
    assert_eq!(statuses, ["passed", "skipped"]);
}

#[tokio::test]
async fn test_exhausted_retries_keep_final_failure() {
    let h = harness_with(1);
    let suite = Suite::new("retries").case(TestCase::new("always fails", |_ctx| async move {
        Err(Error::assertion("still broken"))
    }));

    let runner = SuiteRunner::new(h.lifecycle);
    let result = runner.run(&suite, &Filter::default()).await;

    assert_eq!(result.failed, 1);
    assert_eq!(result.results[0].attempts, 2);
    assert!(!result.success());
    assert_eq!(result_files(&h.config.paths.allure_results).len(), 1);
}

#[tokio::test]
async fn test_search_suite_passes_against_fake_site() {
    let h = harness();
    let runner = SuiteRunner::new(h.lifecycle);

    let result = runner.run(&suites::search_suite(), &Filter::default()).await;

    assert_eq!(result.total, 3);
    assert!(result.success(), "{:?}", result.results);
    assert_eq!(result_files(&h.config.paths.allure_results).len(), 3);

    let written = runner.write_results(&result).unwrap();
    assert!(written.starts_with(h.dir.path()));
    let back: surfcheck_e2e::SuiteResult = files::read_json(&written).unwrap();
    assert_eq!(back.passed, 3);
}

#[tokio::test]
async fn test_search_suite_tag_filter() {
    let h = harness();
    let runner = SuiteRunner::new(h.lifecycle);

    let filter = Filter {
        tag: Some("regression".into()),
        name: None,
    };
    let result = runner.run(&suites::search_suite(), &filter).await;

    assert_eq!(result.total, 1);
    assert_eq!(result.results[0].name, "second search changes results");
    assert_eq!(result.passed, 1);
}

//! Global setup and teardown

use std::time::Duration;

use surfcheck_common::{BrowserKind, Config, Paths};
use surfcheck_e2e::global::{self, SetupOptions, StepOutcome, TeardownOptions};

#[test]
fn test_setup_loads_environment_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let env_specific = format!(
        "BASE_URL=https://staging.example.test\n\
         RETRIES=2\n\
         BROWSER=firefox\n\
         LOG_DIR={out}/logs\n\
         SCREENSHOT_DIR={out}/screenshots\n\
         ALLURE_RESULTS_DIR={out}/allure-results\n\
         REPORTS_DIR={out}/reports\n\
         TEMP_DIR={out}/tmp\n",
        out = out.display()
    );
    std::fs::write(dir.path().join(".env.ci"), env_specific).unwrap();
    std::fs::write(dir.path().join(".env"), "RETRIES=5\nWORKERS=3\n").unwrap();

    let config = global::global_setup(&SetupOptions {
        env_dir: dir.path().to_path_buf(),
        environment: Some("ci".to_string()),
        init_logging: false,
    })
    .unwrap();

    assert_eq!(config.environment, "ci");
    assert_eq!(config.base_url, "https://staging.example.test");
    assert_eq!(config.retries, 2);
    assert_eq!(config.workers, 3);
    assert_eq!(config.browser, BrowserKind::Firefox);

    for path in config.paths.all() {
        assert!(path.is_dir(), "{} not created", path.display());
    }
    let properties =
        std::fs::read_to_string(out.join("allure-results").join("environment.properties")).unwrap();
    assert!(properties.contains("base_url=https://staging.example.test"));
    assert!(properties.contains("environment=ci"));
}

fn teardown_config(root: &std::path::Path) -> Config {
    let mut config = Config::with_base_url("https://example.test");
    config.paths = Paths::under(root);
    for dir in config.paths.all() {
        std::fs::create_dir_all(dir).unwrap();
    }
    std::fs::write(config.paths.allure_results.join("abc-result.json"), "{}").unwrap();
    std::fs::write(config.paths.temp.join("scratch.txt"), "x").unwrap();
    let old_log = config.paths.logs.join("old.log");
    std::fs::write(&old_log, "old").unwrap();
    std::fs::File::options()
        .write(true)
        .open(&old_log)
        .unwrap()
        .set_modified(std::time::SystemTime::now() - Duration::from_secs(10 * 24 * 3600))
        .unwrap();
    std::fs::write(config.paths.logs.join("fresh.log"), "new").unwrap();
    std::fs::write(config.paths.logs.join("keep.txt"), "keep").unwrap();
    config
}

#[tokio::test]
async fn test_teardown_completes_when_report_generation_fails() {
    let dir = tempfile::tempdir().unwrap();
    let config = teardown_config(dir.path());

    let report = global::global_teardown(
        &config,
        &TeardownOptions {
            allure_command: "surfcheck-missing-allure-binary".to_string(),
            ..Default::default()
        },
    )
    .await;

    assert!(report.generate.is_failed());
    assert_eq!(report.relocate, StepOutcome::Skipped);
    assert_eq!(report.clean, StepOutcome::Done);
    assert_eq!(report.prune, StepOutcome::Done);
    assert!(!report.all_ok());

    assert!(!config.paths.allure_results.exists());
    assert!(!config.paths.temp.exists());
    assert_eq!(report.pruned_logs, vec![config.paths.logs.join("old.log")]);
    assert!(config.paths.logs.join("keep.txt").exists());
    assert!(config.paths.logs.join("fresh.log").exists());
}

#[tokio::test]
async fn test_teardown_keeps_results_when_asked() {
    let dir = tempfile::tempdir().unwrap();
    let config = teardown_config(dir.path());

    let report = global::global_teardown(
        &config,
        &TeardownOptions {
            generate_report: false,
            clean_results: false,
            ..Default::default()
        },
    )
    .await;

    assert_eq!(report.generate, StepOutcome::Skipped);
    assert_eq!(report.clean, StepOutcome::Skipped);
    assert!(report.all_ok());
    assert!(config.paths.allure_results.join("abc-result.json").exists());
    assert_eq!(report.pruned_logs.len(), 1);
}

#[cfg(unix)]
#[tokio::test]
async fn test_generated_report_is_relocated() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let config = teardown_config(&dir.path().join("run"));

    // generate <results> --clean -o <output>
    let fake_allure = dir.path().join("fake-allure");
    std::fs::write(&fake_allure, "#!/bin/sh\nmkdir -p \"$5\"\necho report > \"$5/index.html\"\n").unwrap();
    std::fs::set_permissions(&fake_allure, std::fs::Permissions::from_mode(0o755)).unwrap();

    let report = global::global_teardown(
        &config,
        &TeardownOptions {
            allure_command: fake_allure.display().to_string(),
            ..Default::default()
        },
    )
    .await;

    assert_eq!(report.generate, StepOutcome::Done, "{:?}", report);
    assert_eq!(report.relocate, StepOutcome::Done);
    assert!(config.paths.reports.join("allure-report").join("index.html").exists());
    assert!(!config.paths.temp.exists());
}

//! Global setup with an unusable log directory

use surfcheck_e2e::global::{self, SetupOptions};

#[test]
fn test_setup_survives_unusable_log_dir() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("out");
    let blocker = dir.path().join("plain-file");
    std::fs::write(&blocker, "x").unwrap();

    let env_file = format!(
        "BASE_URL=https://example.test\n\
         LOG_DIR={blocked}/logs\n\
         SCREENSHOT_DIR={out}/screenshots\n\
         ALLURE_RESULTS_DIR={out}/allure-results\n\
         REPORTS_DIR={out}/reports\n\
         TEMP_DIR={out}/tmp\n",
        blocked = blocker.display(),
        out = out.display()
    );
    std::fs::write(dir.path().join(".env.logless"), env_file).unwrap();

    let config = global::global_setup(&SetupOptions {
        env_dir: dir.path().to_path_buf(),
        environment: Some("logless".to_string()),
        init_logging: true,
    })
    .unwrap();

    assert!(!config.paths.logs.exists());
    assert!(config.paths.screenshots.is_dir());
    assert!(config.paths.allure_results.join("environment.properties").exists());
}

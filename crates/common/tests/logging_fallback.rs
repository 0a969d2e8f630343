//! A log directory that cannot be created leaves console logging in place

use surfcheck_common::logging::{self, LogConfig};
use surfcheck_common::Logger;

#[test]
fn test_unusable_log_dir_does_not_fail_init() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("plain-file");
    std::fs::write(&blocker, "x").unwrap();

    let config = LogConfig {
        dir: blocker.join("logs"),
        ..Default::default()
    };

    logging::init(&config);
    Logger::new("fixture").warn("still logging");
    logging::shutdown();

    assert!(!config.file_path().exists());
    assert!(tracing::dispatcher::has_been_set());
}

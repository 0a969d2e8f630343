//! One-shot setup and teardown around a whole test run

use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, error, info, warn};

use surfcheck_common::config::{self, Config};
use surfcheck_common::utils::files;
use surfcheck_common::{logging, Error, Result};

use crate::report;

/// Log files older than this are deleted at teardown
pub const LOG_RETENTION: Duration = Duration::from_secs(7 * 24 * 60 * 60);

#[derive(Debug, Clone)]
pub struct SetupOptions {
    /// Directory holding `.env` and `.env.<environment>`
    pub env_dir: PathBuf,
    /// Overrides `ENVIRONMENT` / `ENV`
    pub environment: Option<String>,
    /// Install the process-wide log subscriber
    pub init_logging: bool,
}

impl Default for SetupOptions {
    fn default() -> Self {
        Self {
            env_dir: PathBuf::from("."),
            environment: None,
            init_logging: true,
        }
    }
}

/// Load configuration and prepare output directories.
///
/// A missing or malformed configuration value aborts the run here, before
/// any test starts.
pub fn global_setup(options: &SetupOptions) -> Result<Arc<Config>> {
    let environment = options
        .environment
        .clone()
        .unwrap_or_else(|| config::selected_environment(|key| std::env::var(key).ok()));

    let loaded = config::load_env_files(&options.env_dir, &environment)?;
    let mut config = Config::from_env()?;
    config.environment = environment;

    // An unusable log directory only costs the log file
    let mut log_dir_error = None;
    for dir in config.paths.all() {
        if dir == config.paths.logs.as_path() {
            log_dir_error = files::ensure_dir(dir).err();
        } else {
            files::ensure_dir(dir)?;
        }
    }

    if options.init_logging {
        logging::init(&config.log);
    }
    if let Some(e) = log_dir_error {
        warn!("Log directory {} unusable: {}", config.paths.logs.display(), e);
    }

    info!(
        environment = %config.environment,
        base_url = %config.base_url,
        env_files = loaded.len(),
        "Global setup complete"
    );

    if let Err(e) = report::write_environment(&config.paths.allure_results, &config) {
        error!("Could not write report environment file: {}", e);
    }

    Ok(Arc::new(config))
}

#[derive(Debug, Clone)]
pub struct TeardownOptions {
    /// Allure command line executable
    pub allure_command: String,
    pub generate_report: bool,
    /// Delete the results and temp directories once the report is built
    pub clean_results: bool,
    pub log_retention: Duration,
    /// Bound on the report generator
    pub command_timeout: Duration,
}

impl Default for TeardownOptions {
    fn default() -> Self {
        Self {
            allure_command: "allure".to_string(),
            generate_report: true,
            clean_results: true,
            log_retention: LOG_RETENTION,
            command_timeout: Duration::from_secs(120),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum StepOutcome {
    Done,
    Skipped,
    Failed(String),
}

impl StepOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, StepOutcome::Failed(_))
    }
}

/// What each teardown step did
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TeardownReport {
    pub generate: StepOutcome,
    pub relocate: StepOutcome,
    pub clean: StepOutcome,
    pub prune: StepOutcome,
    pub pruned_logs: Vec<PathBuf>,
}

impl TeardownReport {
    pub fn all_ok(&self) -> bool {
        ![&self.generate, &self.relocate, &self.clean, &self.prune]
            .iter()
            .any(|s| s.is_failed())
    }
}

/// Build the report, move it into place, delete transient results and prune
/// old logs. Every step runs even if an earlier one failed; failures are
/// logged and recorded, never returned.
pub async fn global_teardown(config: &Config, options: &TeardownOptions) -> TeardownReport {
    let generated = config.paths.temp.join("allure-report");
    let destination = config.paths.reports.join("allure-report");

    let generate = if !options.generate_report {
        StepOutcome::Skipped
    } else if !has_results(&config.paths.allure_results) {
        info!("No report results to generate from");
        StepOutcome::Skipped
    } else {
        settle("report generation", generate_report(config, options, &generated).await)
    };

    let relocate = if generated.exists() {
        settle("report relocation", files::move_dir(&generated, &destination))
    } else {
        StepOutcome::Skipped
    };

    let clean = if options.clean_results {
        settle("result cleanup", clean_transient(config))
    } else {
        StepOutcome::Skipped
    };

    let (prune, pruned_logs) =
        match files::prune_older_than(&config.paths.logs, options.log_retention, Some("log")) {
            Ok(pruned) => (StepOutcome::Done, pruned),
            Err(e) => (settle("log pruning", Err(e)), Vec::new()),
        };

    let report = TeardownReport {
        generate,
        relocate,
        clean,
        prune,
        pruned_logs,
    };
    info!(
        pruned_logs = report.pruned_logs.len(),
        ok = report.all_ok(),
        "Global teardown complete"
    );
    report
}

fn settle(step: &str, result: Result<()>) -> StepOutcome {
    match result {
        Ok(()) => StepOutcome::Done,
        Err(e) => {
            error!("Global teardown: {} failed: {}", step, e);
            StepOutcome::Failed(e.to_string())
        }
    }
}

fn has_results(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|mut entries| entries.next().is_some())
        .unwrap_or(false)
}

async fn generate_report(config: &Config, options: &TeardownOptions, output: &Path) -> Result<()> {
    debug!(
        "Running {} generate {} -o {}",
        options.allure_command,
        config.paths.allure_results.display(),
        output.display()
    );

    let run = Command::new(&options.allure_command)
        .arg("generate")
        .arg(&config.paths.allure_results)
        .arg("--clean")
        .arg("-o")
        .arg(output)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let result = tokio::time::timeout(options.command_timeout, run)
        .await
        .map_err(|_| Error::timeout("allure generate", options.command_timeout))?
        .map_err(|e| Error::Report(format!("failed to run {}: {}", options.allure_command, e)))?;

    if !result.status.success() {
        return Err(Error::Report(format!(
            "{} generate exited with {}: {}",
            options.allure_command,
            result.status,
            String::from_utf8_lossy(&result.stderr).trim()
        )));
    }

    info!("Report generated at {}", output.display());
    Ok(())
}

fn clean_transient(config: &Config) -> Result<()> {
    for dir in [&config.paths.allure_results, &config.paths.temp] {
        if files::remove_dir_if_exists(dir)? {
            debug!("Removed {}", dir.display());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_flags_failures() {
        let report = TeardownReport {
            generate: StepOutcome::Failed("no allure".into()),
            relocate: StepOutcome::Skipped,
            clean: StepOutcome::Done,
            prune: StepOutcome::Done,
            pruned_logs: vec![],
        };
        assert!(!report.all_ok());
        assert!(report.generate.is_failed());
    }

    #[test]
    fn test_has_results() {
        let dir = tempfile::tempdir().unwrap();
        assert!(!has_results(dir.path()));
        assert!(!has_results(&dir.path().join("missing")));
        std::fs::write(dir.path().join("x-result.json"), "{}").unwrap();
        assert!(has_results(dir.path()));
    }
}

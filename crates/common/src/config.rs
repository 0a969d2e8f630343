//! Run configuration loaded from the environment

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

use crate::error::{Error, Result};
use crate::logging::{LogConfig, LogLevel};

/// Environment used when neither `ENVIRONMENT` nor `ENV` is set
pub const DEFAULT_ENVIRONMENT: &str = "local";

/// Complete run configuration. Loaded once, then shared read-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Name of the selected environment (`local`, `staging`, ...)
    pub environment: String,

    /// Base URL every relative navigation is joined onto
    pub base_url: String,

    /// Timeout tiers
    pub timeouts: Timeouts,

    /// How often a failed test is re-run
    pub retries: u32,

    /// Requested worker count. Tests still run one at a time per process.
    pub workers: u32,

    /// Run the browser without a window
    pub headless: bool,

    /// Browser engine
    pub browser: BrowserKind,

    /// Viewport applied to every page
    pub viewport: Viewport,

    /// Output locations
    pub paths: Paths,

    /// Logging configuration
    pub log: LogConfig,

    /// Database settings, present when any `DB_*` key is set
    pub database: Option<DatabaseConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Timeouts {
    pub default: Duration,
    pub short: Duration,
    pub long: Duration,
    pub navigation: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default: Duration::from_millis(30_000),
            short: Duration::from_millis(5_000),
            long: Duration::from_millis(60_000),
            navigation: Duration::from_millis(30_000),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self { width: 1280, height: 720 }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BrowserKind {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BrowserKind::Chromium => "chromium",
            BrowserKind::Firefox => "firefox",
            BrowserKind::Webkit => "webkit",
        }
    }
}

impl FromStr for BrowserKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(BrowserKind::Chromium),
            "firefox" => Ok(BrowserKind::Firefox),
            "webkit" | "safari" => Ok(BrowserKind::Webkit),
            _ => Err(Error::InvalidConfig {
                key: "BROWSER".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Output directories
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Paths {
    pub logs: PathBuf,
    pub screenshots: PathBuf,
    pub allure_results: PathBuf,
    pub reports: PathBuf,
    pub temp: PathBuf,
}

impl Default for Paths {
    fn default() -> Self {
        Self {
            logs: PathBuf::from("logs"),
            screenshots: PathBuf::from("screenshots"),
            allure_results: PathBuf::from("allure-results"),
            reports: PathBuf::from("reports"),
            temp: PathBuf::from("test-results"),
        }
    }
}

impl Paths {
    /// Place every directory under `root`
    pub fn under(root: &Path) -> Self {
        let defaults = Self::default();
        Self {
            logs: root.join(defaults.logs),
            screenshots: root.join(defaults.screenshots),
            allure_results: root.join(defaults.allure_results),
            reports: root.join(defaults.reports),
            temp: root.join(defaults.temp),
        }
    }

    pub fn all(&self) -> [&Path; 5] {
        [
            &self.logs,
            &self.screenshots,
            &self.allure_results,
            &self.reports,
            &self.temp,
        ]
    }
}

/// Database connection settings for suites that verify persisted data
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub user: Option<String>,
    #[serde(skip_serializing)]
    pub password: Option<String>,
    pub connect_string: Option<String>,
    pub host: Option<String>,
    pub database: Option<String>,
    pub port: Option<u16>,
}

impl Config {
    /// Build a configuration with defaults for everything but the base URL
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let paths = Paths::default();
        Self {
            environment: DEFAULT_ENVIRONMENT.to_string(),
            base_url: base_url.into(),
            timeouts: Timeouts::default(),
            retries: 0,
            workers: 1,
            headless: true,
            browser: BrowserKind::default(),
            viewport: Viewport::default(),
            log: LogConfig {
                dir: paths.logs.clone(),
                ..LogConfig::default()
            },
            paths,
            database: None,
        }
    }

    /// Read configuration from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let base_url = get("BASE_URL").ok_or_else(|| Error::MissingConfig("BASE_URL".to_string()))?;
        url::Url::parse(&base_url).map_err(|_| Error::InvalidConfig {
            key: "BASE_URL".to_string(),
            value: base_url.clone(),
        })?;

        let mut config = Self::with_base_url(base_url);
        config.environment = selected_environment(&lookup);

        let defaults = Timeouts::default();
        config.timeouts = Timeouts {
            default: parse_millis(&get, "DEFAULT_TIMEOUT", defaults.default)?,
            short: parse_millis(&get, "SHORT_TIMEOUT", defaults.short)?,
            long: parse_millis(&get, "LONG_TIMEOUT", defaults.long)?,
            navigation: parse_millis(&get, "NAVIGATION_TIMEOUT", defaults.navigation)?,
        };
        config.retries = parse_or(&get, "RETRIES", 0)?;
        config.workers = parse_or(&get, "WORKERS", 1)?;
        config.headless = parse_bool(&get, "HEADLESS", true)?;
        if let Some(browser) = get("BROWSER") {
            config.browser = browser.parse()?;
        }
        config.viewport = Viewport {
            width: parse_or(&get, "VIEWPORT_WIDTH", Viewport::default().width)?,
            height: parse_or(&get, "VIEWPORT_HEIGHT", Viewport::default().height)?,
        };

        let mut paths = Paths::default();
        for (key, slot) in [
            ("LOG_DIR", &mut paths.logs),
            ("SCREENSHOT_DIR", &mut paths.screenshots),
            ("ALLURE_RESULTS_DIR", &mut paths.allure_results),
            ("REPORTS_DIR", &mut paths.reports),
            ("TEMP_DIR", &mut paths.temp),
        ] {
            if let Some(value) = get(key) {
                *slot = PathBuf::from(value);
            }
        }
        config.log.dir = paths.logs.clone();
        config.paths = paths;

        if let Some(level) = get("LOG_LEVEL") {
            config.log.level = level.parse()?;
        }

        config.database = database_from(&get)?;

        debug!(
            environment = %config.environment,
            base_url = %config.base_url,
            "configuration loaded"
        );
        Ok(config)
    }

    /// Flat key/value view, used for report environment files
    pub fn summary(&self) -> Vec<(String, String)> {
        vec![
            ("environment".to_string(), self.environment.clone()),
            ("base_url".to_string(), self.base_url.clone()),
            ("browser".to_string(), self.browser.as_str().to_string()),
            ("headless".to_string(), self.headless.to_string()),
            (
                "viewport".to_string(),
                format!("{}x{}", self.viewport.width, self.viewport.height),
            ),
            (
                "default_timeout_ms".to_string(),
                self.timeouts.default.as_millis().to_string(),
            ),
            ("retries".to_string(), self.retries.to_string()),
            ("workers".to_string(), self.workers.to_string()),
        ]
    }
}

/// Environment name selected by `ENVIRONMENT`, falling back to `ENV`
pub fn selected_environment<F>(lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    lookup("ENVIRONMENT")
        .or_else(|| lookup("ENV"))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_ENVIRONMENT.to_string())
}

/// Load `.env.<environment>` and then `.env` from `dir` into the process
/// environment. Variables already set are never overridden, so the
/// environment-specific file wins over the shared one. Returns the files
/// that were found.
pub fn load_env_files(dir: &Path, environment: &str) -> Result<Vec<PathBuf>> {
    let mut loaded = Vec::new();
    for candidate in [dir.join(format!(".env.{}", environment)), dir.join(".env")] {
        if !candidate.is_file() {
            continue;
        }
        dotenvy::from_path(&candidate).map_err(|e| Error::InvalidConfig {
            key: candidate.display().to_string(),
            value: e.to_string(),
        })?;
        loaded.push(candidate);
    }
    Ok(loaded)
}

fn database_from<G>(get: &G) -> Result<Option<DatabaseConfig>>
where
    G: Fn(&str) -> Option<String>,
{
    let db = DatabaseConfig {
        user: get("DB_USER"),
        password: get("DB_PASSWORD"),
        connect_string: get("DB_CONNECT_STRING"),
        host: get("DB_HOST"),
        database: get("DB_NAME"),
        port: get("DB_PORT")
            .map(|p| {
                p.parse::<u16>().map_err(|_| Error::InvalidConfig {
                    key: "DB_PORT".to_string(),
                    value: p.clone(),
                })
            })
            .transpose()?,
    };

    if db == DatabaseConfig::default() {
        Ok(None)
    } else {
        Ok(Some(db))
    }
}

fn parse_or<G, T>(get: &G, key: &str, default: T) -> Result<T>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match get(key) {
        Some(value) => value.parse::<T>().map_err(|_| Error::InvalidConfig {
            key: key.to_string(),
            value,
        }),
        None => Ok(default),
    }
}

fn parse_millis<G>(get: &G, key: &str, default: Duration) -> Result<Duration>
where
    G: Fn(&str) -> Option<String>,
{
    parse_or(get, key, default.as_millis() as u64).map(Duration::from_millis)
}

fn parse_bool<G>(get: &G, key: &str, default: bool) -> Result<bool>
where
    G: Fn(&str) -> Option<String>,
{
    match get(key) {
        Some(value) => match value.to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(Error::InvalidConfig {
                key: key.to_string(),
                value,
            }),
        },
        None => Ok(default),
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(Error::InvalidConfig {
                key: "LOG_LEVEL".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use test_case::test_case;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_missing_base_url_is_fatal() {
        let err = Config::from_lookup(lookup(&[])).unwrap_err();
        assert!(matches!(err, Error::MissingConfig(ref k) if k == "BASE_URL"));
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_defaults_apply() {
        let config = Config::from_lookup(lookup(&[("BASE_URL", "https://www.google.com")])).unwrap();
        assert_eq!(config.environment, "local");
        assert_eq!(config.timeouts, Timeouts::default());
        assert_eq!(config.retries, 0);
        assert!(config.headless);
        assert_eq!(config.viewport, Viewport { width: 1280, height: 720 });
        assert!(config.database.is_none());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("BASE_URL", "https://example.test"),
            ("ENV", "staging"),
            ("DEFAULT_TIMEOUT", "15000"),
            ("SHORT_TIMEOUT", "2000"),
            ("RETRIES", "2"),
            ("HEADLESS", "false"),
            ("BROWSER", "firefox"),
            ("VIEWPORT_WIDTH", "1920"),
            ("VIEWPORT_HEIGHT", "1080"),
            ("DB_HOST", "db.internal"),
            ("DB_PORT", "1521"),
        ]))
        .unwrap();

        assert_eq!(config.environment, "staging");
        assert_eq!(config.timeouts.default, Duration::from_secs(15));
        assert_eq!(config.timeouts.short, Duration::from_secs(2));
        assert_eq!(config.retries, 2);
        assert!(!config.headless);
        assert_eq!(config.browser, BrowserKind::Firefox);
        assert_eq!(config.viewport.width, 1920);
        let db = config.database.unwrap();
        assert_eq!(db.host.as_deref(), Some("db.internal"));
        assert_eq!(db.port, Some(1521));
    }

    #[test_case("DEFAULT_TIMEOUT", "soon" ; "timeout not a number")]
    #[test_case("HEADLESS", "maybe" ; "headless not a bool")]
    #[test_case("BROWSER", "netscape" ; "unknown browser")]
    #[test_case("DB_PORT", "99999" ; "port out of range")]
    fn test_malformed_values_are_rejected(key: &str, value: &str) {
        let err = Config::from_lookup(lookup(&[("BASE_URL", "https://example.test"), (key, value)]))
            .unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { key: ref k, .. } if k == key));
    }

    #[test]
    fn test_environment_precedence() {
        assert_eq!(selected_environment(lookup(&[("ENV", "qa")])), "qa");
        assert_eq!(
            selected_environment(lookup(&[("ENV", "qa"), ("ENVIRONMENT", "prod")])),
            "prod"
        );
        assert_eq!(selected_environment(lookup(&[])), DEFAULT_ENVIRONMENT);
    }

    #[test]
    fn test_load_env_files_reports_found_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(".env.surfcheck-unit"),
            "SURFCHECK_UNIT_ONLY_KEY=from-env-file\n",
        )
        .unwrap();

        let loaded = load_env_files(dir.path(), "surfcheck-unit").unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(
            std::env::var("SURFCHECK_UNIT_ONLY_KEY").unwrap(),
            "from-env-file"
        );
    }
}

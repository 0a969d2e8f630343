//! Allure-compatible test reporting
//!
//! The [`Reporter`] holds at most one open [`TestRecord`]. Steps, labels and
//! attachments are added to that record; [`Reporter::end_test`] stamps the
//! terminal status and flushes the record as `<uuid>-result.json` plus one
//! file per attachment into the results directory, where the external
//! `allure` command picks them up.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::time::Duration;
use uuid::Uuid;

use surfcheck_common::utils::{dates, files};
use surfcheck_common::{Config, Error, Logger, Result};

/// Terminal status of a test
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
    Broken,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Passed => "PASSED",
            Status::Failed => "FAILED",
            Status::Skipped => "SKIPPED",
            Status::Broken => "BROKEN",
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Running,
    Finished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Label {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub name: String,
    pub details: Option<String>,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttachmentContent {
    Text(String),
    Binary(Vec<u8>),
}

impl AttachmentContent {
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            AttachmentContent::Text(text) => text.as_bytes(),
            AttachmentContent::Binary(bytes) => bytes,
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Named artifact bound to one test record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub name: String,
    pub mime: String,
    pub content: AttachmentContent,
    /// File the content was read from or saved to, if any
    pub source_path: Option<PathBuf>,
}

impl Attachment {
    pub fn text(name: impl Into<String>, mime: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            content: AttachmentContent::Text(text.into()),
            source_path: None,
        }
    }

    pub fn binary(name: impl Into<String>, mime: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime: mime.into(),
            content: AttachmentContent::Binary(bytes),
            source_path: None,
        }
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source_path = Some(path.into());
        self
    }

    /// File extension used when the attachment is written out
    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/png" => "png",
            "image/jpeg" => "jpg",
            "application/json" => "json",
            "text/html" => "html",
            "text/plain" => "txt",
            "video/webm" => "webm",
            _ => "bin",
        }
    }
}

/// One test's report entry
#[derive(Debug, Clone)]
pub struct TestRecord {
    pub id: Uuid,
    pub name: String,
    pub suite: String,
    /// `None` while the test is still running
    pub status: Option<Status>,
    pub start: DateTime<Utc>,
    pub end: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub trace: Option<String>,
    pub steps: Vec<Step>,
    pub attachments: Vec<Attachment>,
    pub labels: Vec<Label>,
}

impl TestRecord {
    fn open(name: &str, suite: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            suite: suite.to_string(),
            status: None,
            start: Utc::now(),
            end: None,
            error: None,
            trace: None,
            steps: Vec::new(),
            attachments: Vec::new(),
            labels: vec![
                Label {
                    name: "suite".to_string(),
                    value: suite.to_string(),
                },
                Label {
                    name: "framework".to_string(),
                    value: "surfcheck".to_string(),
                },
            ],
        }
    }

    pub fn duration(&self) -> Option<Duration> {
        self.end
            .map(|end| (end - self.start).to_std().unwrap_or_default())
    }

    pub fn full_name(&self) -> String {
        format!("{}::{}", self.suite, self.name)
    }

    /// Stable across runs, lets Allure track a test's history
    pub fn history_id(&self) -> String {
        hex::encode(Sha256::digest(self.full_name().as_bytes()))
    }

    pub fn attachment(&self, name: &str) -> Option<&Attachment> {
        self.attachments.iter().find(|a| a.name == name)
    }

    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|l| l.name == name)
            .map(|l| l.value.as_str())
    }
}

// On-disk Allure result format

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllureResult {
    pub uuid: String,
    pub history_id: String,
    pub name: String,
    pub full_name: String,
    pub status: Status,
    pub status_details: StatusDetails,
    pub stage: Stage,
    pub start: i64,
    pub stop: i64,
    pub labels: Vec<Label>,
    pub steps: Vec<AllureStep>,
    pub attachments: Vec<AllureAttachment>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AllureStep {
    pub name: String,
    pub status: Status,
    pub stage: Stage,
    pub start: i64,
    pub stop: i64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parameters: Vec<AllureParameter>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllureParameter {
    pub name: String,
    pub value: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AllureAttachment {
    pub name: String,
    pub source: String,
    #[serde(rename = "type")]
    pub mime: String,
}

/// Reporting adapter. One per worker process, shared through the fixtures.
pub struct Reporter {
    results_dir: PathBuf,
    logger: Logger,
    current: Mutex<Option<TestRecord>>,
}

impl Reporter {
    pub fn new(results_dir: impl Into<PathBuf>, logger: Logger) -> Self {
        Self {
            results_dir: results_dir.into(),
            logger: logger.scoped("reporter"),
            current: Mutex::new(None),
        }
    }

    pub fn results_dir(&self) -> &Path {
        &self.results_dir
    }

    pub fn has_open_test(&self) -> bool {
        self.current.lock().is_some()
    }

    /// Copy of the open record
    pub fn snapshot(&self) -> Option<TestRecord> {
        self.current.lock().clone()
    }

    /// Open a report entry. An entry still open from a previous test is
    /// closed as broken first, so it is written exactly once.
    pub fn start_test(&self, name: &str, suite: &str) -> Uuid {
        let record = TestRecord::open(name, suite);
        let id = record.id;
        let previous = self.current.lock().replace(record);

        if let Some(mut previous) = previous {
            self.logger.warn(format!(
                "Test '{}' was still open when '{}' started; closing it as broken",
                previous.name, name
            ));
            previous.status = Some(Status::Broken);
            previous.error = Some(format!("superseded by {}", name));
            previous.end = Some(Utc::now());
            self.flush(&previous);
        }

        self.logger.info(format!("Report: started '{}' ({})", name, suite));
        id
    }

    /// Close the open entry with its terminal status and write it out.
    /// Returns the flushed record, or `None` when no test was open.
    pub fn end_test(&self, status: Status, message: Option<String>) -> Option<TestRecord> {
        let Some(mut record) = self.current.lock().take() else {
            self.logger
                .warn(format!("Report: end_test({}) called with no open test", status));
            return None;
        };

        record.status = Some(status);
        record.end = Some(Utc::now());
        if message.is_some() {
            record.error = message;
        }

        self.flush(&record);
        self.logger.info(format!(
            "Report: '{}' finished {} in {}ms",
            record.name,
            status,
            record.duration().unwrap_or_default().as_millis()
        ));
        Some(record)
    }

    /// Drop the open entry without writing it
    pub fn discard_test(&self) -> Option<TestRecord> {
        let record = self.current.lock().take();
        if let Some(record) = &record {
            self.logger
                .debug(format!("Report: discarded attempt of '{}'", record.name));
        }
        record
    }

    pub fn add_step(&self, name: &str, details: Option<&str>) {
        self.logger.step(match details {
            Some(details) => format!("{} - {}", name, details),
            None => name.to_string(),
        });
        self.with_current("add_step", |record| {
            record.steps.push(Step {
                name: name.to_string(),
                details: details.map(str::to_string),
                at: Utc::now(),
            });
        });
    }

    pub fn add_label(&self, name: &str, value: &str) {
        self.with_current("add_label", |record| {
            record.labels.push(Label {
                name: name.to_string(),
                value: value.to_string(),
            });
        });
    }

    pub fn add_attachment(&self, attachment: Attachment) {
        self.logger.info_with(
            format!("Report: attaching '{}'", attachment.name),
            &serde_json::json!({
                "mime": attachment.mime,
                "bytes": attachment.content.len(),
                "source": attachment.source_path.as_ref().map(|p| p.display().to_string()),
            }),
        );
        self.with_current("add_attachment", move |record| {
            record.attachments.push(attachment);
        });
    }

    pub fn add_screenshot(&self, name: &str, png: Vec<u8>, source: Option<&Path>) {
        let mut attachment = Attachment::binary(name, "image/png", png);
        if let Some(source) = source {
            attachment = attachment.with_source(source);
        }
        self.add_attachment(attachment);
    }

    pub fn add_json(&self, name: &str, value: &serde_json::Value) {
        match serde_json::to_string_pretty(value) {
            Ok(json) => self.add_attachment(Attachment::text(name, "application/json", json)),
            Err(e) => self.logger.warn(format!("Report: cannot serialize '{}': {}", name, e)),
        }
    }

    pub fn add_text(&self, name: &str, text: &str) {
        self.add_attachment(Attachment::text(name, "text/plain", text));
    }

    /// Attach a structured description of `error` and label the entry with it
    pub fn add_error_details(&self, error: &Error) {
        let details = error_details(error);
        self.logger.error_with("Report: error details", &details);
        self.add_json("Error Details", &details);
        self.add_label("error", &error.to_string());
        self.with_current("add_error_details", |record| {
            record.trace = Some(format!("{:?}", error));
        });
    }

    fn with_current<F>(&self, call: &str, f: F)
    where
        F: FnOnce(&mut TestRecord),
    {
        let mut current = self.current.lock();
        if let Some(record) = current.as_mut() {
            f(record);
            return;
        }
        drop(current);
        self.logger
            .warn(format!("Report: {} called with no open test; ignored", call));
    }

    /// Write the record and its attachments. Failures are logged only.
    fn flush(&self, record: &TestRecord) {
        if let Err(e) = self.write_record(record) {
            self.logger.error(format!(
                "Report: failed to write results for '{}': {}",
                record.name, e
            ));
        }
    }

    fn write_record(&self, record: &TestRecord) -> Result<PathBuf> {
        files::ensure_dir(&self.results_dir)?;

        let mut attachments = Vec::with_capacity(record.attachments.len());
        for attachment in &record.attachments {
            let source = format!("{}-attachment.{}", Uuid::new_v4(), attachment.extension());
            files::write_bytes(&self.results_dir.join(&source), attachment.content.as_bytes())?;
            attachments.push(AllureAttachment {
                name: attachment.name.clone(),
                source,
                mime: attachment.mime.clone(),
            });
        }

        let status = record.status.unwrap_or(Status::Broken);
        let stop = record.end.unwrap_or_else(Utc::now);
        let steps = record
            .steps
            .iter()
            .map(|step| AllureStep {
                name: step.name.clone(),
                status: Status::Passed,
                stage: Stage::Finished,
                start: dates::to_epoch_millis(&step.at),
                stop: dates::to_epoch_millis(&step.at),
                parameters: step
                    .details
                    .iter()
                    .map(|d| AllureParameter {
                        name: "details".to_string(),
                        value: d.clone(),
                    })
                    .collect(),
            })
            .collect();

        let result = AllureResult {
            uuid: record.id.to_string(),
            history_id: record.history_id(),
            name: record.name.clone(),
            full_name: record.full_name(),
            status,
            status_details: StatusDetails {
                message: record.error.clone(),
                trace: record.trace.clone(),
            },
            stage: Stage::Finished,
            start: dates::to_epoch_millis(&record.start),
            stop: dates::to_epoch_millis(&stop),
            labels: record.labels.clone(),
            steps,
            attachments,
        };

        let path = self.results_dir.join(format!("{}-result.json", record.id));
        files::write_json(&path, &result)?;
        Ok(path)
    }
}

/// `{name, message, kind, stack, timestamp}` description of an error
pub fn error_details(error: &Error) -> serde_json::Value {
    let mut stack = vec![format!("{}: {}", error.name(), error)];
    let mut source = std::error::Error::source(error);
    while let Some(cause) = source {
        stack.push(format!("caused by: {}", cause));
        source = cause.source();
    }

    serde_json::json!({
        "name": error.name(),
        "message": error.to_string(),
        "kind": error.kind().as_str(),
        "stack": stack.join("\n"),
        "timestamp": dates::iso_now(),
    })
}

/// Write Allure's `environment.properties` describing this run
pub fn write_environment(results_dir: &Path, config: &Config) -> Result<PathBuf> {
    files::ensure_dir(results_dir)?;
    let body: String = config
        .summary()
        .into_iter()
        .map(|(key, value)| format!("{}={}\n", key, value))
        .collect();
    let path = results_dir.join("environment.properties");
    std::fs::write(&path, body)?;
    Ok(path)
}

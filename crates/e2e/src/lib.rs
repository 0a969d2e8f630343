//! surfcheck E2E harness
//!
//! This crate drives a browser through Playwright and wraps every test in a
//! fixed lifecycle:
//! - A driver seam (`Page`) with a Playwright bridge and an in-memory fake
//! - Action utilities that wait for visibility, log, and record report steps
//! - Page objects with an explicit open/closed state
//! - A lifecycle coordinator that isolates tests and captures failures
//! - Allure-format result files and report generation at teardown
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  global_setup(SetupOptions)                 │
//! │    .env files -> Config, output dirs, logging, environment  │
//! ├─────────────────────────────────────────────────────────────┤
//! │  SuiteRunner                                                │
//! │    └── run(Suite, Filter) -> SuiteResult                    │
//! │          └── Lifecycle::run_attempt(TestInfo, body)         │
//! │                ├── isolate / apply defaults                 │
//! │                ├── Reporter::start_test                     │
//! │                ├── body(TestContext)                        │
//! │                │     ├── pages::SearchPage                  │
//! │                │     └── actions::{click, fill, press, ..}  │
//! │                │           └── dyn Page (Playwright|Fake)   │
//! │                ├── failure: screenshot + error details      │
//! │                └── Reporter::end_test -> *-result.json      │
//! ├─────────────────────────────────────────────────────────────┤
//! │                  global_teardown(TeardownOptions)           │
//! │    allure generate, relocate report, clean, prune logs      │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod actions;
pub mod driver;
pub mod expect;
pub mod fixture;
pub mod global;
pub mod pages;
pub mod report;
pub mod runner;
pub mod suites;

pub use actions::{ActionContext, ActionOptions, Target};
pub use driver::{ElementHandle, FakePage, Page, PlaywrightPage, WaitState};
pub use fixture::{Lifecycle, TestContext, TestInfo, TestOutcome};
pub use global::{global_setup, global_teardown, SetupOptions, TeardownOptions, TeardownReport};
pub use report::{Reporter, Status, TestRecord};
pub use runner::{Filter, Suite, SuiteResult, SuiteRunner, TestCase};

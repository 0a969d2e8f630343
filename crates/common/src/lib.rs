//! surfcheck Common Library
//!
//! Configuration, error taxonomy, logging and small utilities shared by the
//! surfcheck crates.

pub mod config;
pub mod error;
pub mod logging;
pub mod utils;

// Re-export commonly used types
pub use config::{BrowserKind, Config, DatabaseConfig, Paths, Timeouts, Viewport};
pub use error::{Error, ErrorKind, Result};
pub use logging::{LogConfig, LogLevel, Logger};

/// surfcheck version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

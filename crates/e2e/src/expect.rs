//! Assertion helpers that fail a test with `Error::Assertion`

use regex::Regex;
use std::fmt::Debug;

use surfcheck_common::{Error, Result};

pub fn equal<T: PartialEq + Debug>(what: &str, actual: &T, expected: &T) -> Result<()> {
    if actual == expected {
        Ok(())
    } else {
        Err(Error::assertion(format!(
            "expected {} to equal {:?}, was {:?}",
            what, expected, actual
        )))
    }
}

pub fn not_equal<T: PartialEq + Debug>(what: &str, actual: &T, unexpected: &T) -> Result<()> {
    if actual != unexpected {
        Ok(())
    } else {
        Err(Error::assertion(format!(
            "expected {} to change from {:?}",
            what, unexpected
        )))
    }
}

pub fn contains(what: &str, haystack: &str, needle: &str) -> Result<()> {
    if haystack.contains(needle) {
        Ok(())
    } else {
        Err(Error::assertion(format!(
            "expected {} {:?} to contain {:?}",
            what, haystack, needle
        )))
    }
}

/// Case-insensitive containment
pub fn mentions(what: &str, haystack: &str, needle: &str) -> Result<()> {
    if haystack.to_lowercase().contains(&needle.to_lowercase()) {
        Ok(())
    } else {
        Err(Error::assertion(format!(
            "expected {} {:?} to mention {:?}",
            what, haystack, needle
        )))
    }
}

/// `pattern` is a regex; an invalid pattern is an error, not a failed assertion
pub fn matches(what: &str, actual: &str, pattern: &str) -> Result<()> {
    let re = Regex::new(pattern)?;
    if re.is_match(actual) {
        Ok(())
    } else {
        Err(Error::assertion(format!(
            "expected {} {:?} to match /{}/",
            what, actual, pattern
        )))
    }
}

pub fn at_least(what: &str, actual: usize, minimum: usize) -> Result<()> {
    if actual >= minimum {
        Ok(())
    } else {
        Err(Error::assertion(format!(
            "expected at least {} {}, found {}",
            minimum, what, actual
        )))
    }
}

pub fn is_true(what: &str, value: bool) -> Result<()> {
    if value {
        Ok(())
    } else {
        Err(Error::assertion(format!("expected {}", what)))
    }
}

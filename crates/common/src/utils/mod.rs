//! Small helpers shared by fixtures, reporters and global setup

pub mod dates;
pub mod files;
pub mod random;

pub use random::RandomData;

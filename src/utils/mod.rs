//! Shared helpers.
//!
//! - [`encoding`] - varint, delta and postings codecs plus little-endian I/O
//! - [`app_config`] - user defaults for the command-line driver
//! - [`progress`] - build progress reporting

pub mod app_config;
pub mod encoding;
pub mod progress;

pub use app_config::*;
pub use encoding::*;
pub use progress::{BuildProgress, REPORT_INTERVAL};

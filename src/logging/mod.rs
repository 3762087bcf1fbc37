//! Logging for the merge tool
//!
//! This module provides:
//! - Bracketed event formatting
//! - Dual logging (file + stdout)
//! - Timestamped log files under a per-user data directory

mod formatter;
mod setup;

pub use formatter::BracketedFormatter;
pub use setup::{default_log_dir, setup_logging};

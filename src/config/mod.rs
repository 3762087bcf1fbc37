//! On-disk merge configuration.

mod merge_config;

pub use merge_config::{DatasetEntry, MergeConfig, DEFAULT_CONFIG_FILE};

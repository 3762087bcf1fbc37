//! Merge several YOLO-format detection datasets into one.
//!
//! Source classes are remapped onto a shared set of target classes, images
//! are sampled per target under quotas and per-edge limits with a seeded,
//! reproducible order, and the result is written as a standard
//! `train/val/test` tree with a `data.yaml` manifest and a JSON audit report.

pub mod config;
pub mod core;
pub mod error;
pub mod logging;

pub use crate::config::{DatasetEntry, MergeConfig};
pub use crate::core::merge::{
    preview, run_merge, CancelToken, MergeOptions, MergeOutcome, MergePlan, MergeRun,
    MergeSummary, SelectionResult,
};
pub use crate::error::{MergeError, MergeResult};

//! Merge planning and execution.
//!
//! Data flows plan + sources -> [`EdgeIndex`] -> [`SelectionResult`] ->
//! [`merge_execute`] -> `data.yaml` and the JSON report.

mod edge_index;
mod executor;
mod manifest;
mod pipeline;
mod plan;
mod progress;
mod report;
mod selector;

pub use edge_index::{EdgeGroup, EdgeIndex, ScanStats};
pub use executor::{merge_execute, MergeOutcome, MergeSummary};
pub use manifest::{read_data_yaml, write_data_yaml, DataYaml, MANIFEST_FILE_NAME};
pub use pipeline::{preview, run_merge, MergeOptions, MergeRun};
pub use plan::{
    BalanceMode, CollisionPolicy, CopyMode, EdgeKey, ImageKey, MergePlan, SplitNames,
    SplitStrategy, TargetClass, TargetIndex,
};
pub use progress::{CancelToken, MergeProgressMessage, Progress, ProgressCallback};
pub use report::{write_report, REPORT_DIR_NAME, REPORT_FILE_NAME};
pub use selector::{allocate, select_with_quotas, EdgePreview, SelectionResult, TargetPreview};

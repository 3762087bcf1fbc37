use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::edge_index::EdgeIndex;
use super::executor::{merge_execute, MergeOutcome};
use super::plan::MergePlan;
use super::progress::{CancelToken, ProgressCallback};
use super::report::write_report;
use super::selector::{select_with_quotas, SelectionResult};
use crate::core::dataset::DatasetSource;
use crate::error::{IoContext, MergeError, MergeResult};

/// Switches for a full merge run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOptions {
    /// Skip quota selection and take every image that survives mapping
    pub take_all: bool,
    /// Merge into an output directory that already has content
    pub allow_non_empty_output: bool,
    pub write_report: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            take_all: false,
            allow_non_empty_output: false,
            write_report: true,
        }
    }
}

/// Everything a finished (or cancelled) run produced.
#[derive(Debug, Clone)]
pub struct MergeRun {
    pub outcome: MergeOutcome,
    /// `None` for take-all runs
    pub selection: Option<SelectionResult>,
    pub report_path: Option<PathBuf>,
}

/// Index and select without touching the output directory.
pub fn preview<S: DatasetSource>(plan: &MergePlan, sources: &[S]) -> MergeResult<SelectionResult> {
    plan.validate()?;
    let index = EdgeIndex::build(plan, sources);
    Ok(select_with_quotas(plan, &index))
}

/// Run the whole merge: index, select, execute, report.
///
/// # Arguments
/// * `plan` - Validated merge plan
/// * `sources` - Datasets in merge order
/// * `options` - Selection and safety switches
/// * `progress_cb` - Called after every source image
/// * `cancel` - Checked before every source image
///
/// # Returns
/// * The run outcome; the report is only written for completed runs
pub fn run_merge<S: DatasetSource>(
    plan: &MergePlan,
    sources: &[S],
    options: MergeOptions,
    progress_cb: Option<ProgressCallback<'_>>,
    cancel: Option<&CancelToken>,
) -> MergeResult<MergeRun> {
    plan.validate()?;
    if !options.allow_non_empty_output && !is_empty_dir(&plan.output_dir)? {
        return Err(MergeError::OutputNotEmpty(plan.output_dir.clone()));
    }

    let selection = if options.take_all {
        info!("Taking every mapped image, quotas ignored");
        None
    } else {
        Some(preview(plan, sources)?)
    };

    let outcome = merge_execute(
        plan,
        sources,
        selection.as_ref().map(|s| &s.selected_images),
        progress_cb,
        cancel,
    )?;

    let report_path = match outcome {
        MergeOutcome::Completed(_) if options.write_report => {
            Some(write_report(plan, selection.as_ref())?)
        }
        MergeOutcome::Completed(_) => None,
        MergeOutcome::Cancelled(_) => {
            warn!("Merge cancelled, no report written");
            None
        }
    };

    Ok(MergeRun {
        outcome,
        selection,
        report_path,
    })
}

/// A missing directory counts as empty.
fn is_empty_dir(dir: &Path) -> MergeResult<bool> {
    if !dir.exists() {
        return Ok(true);
    }
    let mut entries = std::fs::read_dir(dir).with_path(dir)?;
    Ok(entries.next().is_none())
}

use serde::Serialize;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use super::plan::MergePlan;
use super::selector::SelectionResult;
use crate::core::operations::{safe_mkdirs, write_atomic};
use crate::error::MergeResult;

pub const REPORT_DIR_NAME: &str = "reports";
pub const REPORT_FILE_NAME: &str = "merge_report.json";

#[derive(Debug, Serialize)]
struct Totals {
    selected_images: usize,
    by_target: BTreeMap<String, usize>,
}

#[derive(Debug, Serialize)]
struct MergeReport<'a> {
    created_at: String,
    os: String,
    plan: &'a MergePlan,
    preview_supply: Map<String, Value>,
    preview_edges: Map<String, Value>,
    warnings: &'a [String],
    totals: Totals,
}

/// Write `reports/merge_report.json` under the output directory.
///
/// Without a selection (take-all runs) the preview sections are empty and
/// the totals are zero.
///
/// # Arguments
/// * `plan` - Plan that was executed, embedded verbatim
/// * `selection` - Selection used for the run, if any
///
/// # Returns
/// * Path of the written report
pub fn write_report(plan: &MergePlan, selection: Option<&SelectionResult>) -> MergeResult<PathBuf> {
    let report_dir = plan.output_dir.join(REPORT_DIR_NAME);
    safe_mkdirs(&report_dir)?;

    let mut preview_supply = Map::new();
    let mut preview_edges = Map::new();
    let mut by_target = BTreeMap::new();
    let mut warnings: &[String] = &[];
    let mut selected_images = 0;

    if let Some(selection) = selection {
        for (target, row) in &selection.preview_supply {
            preview_supply.insert(
                target.to_string(),
                json!({ "supply": row.supply, "quota": row.quota, "selected": row.selected }),
            );
        }
        for (target, edges) in &selection.preview_edges {
            let rows: Vec<Value> = edges
                .iter()
                .map(|e| json!([[e.edge.dataset, e.edge.class_id], e.supply, e.taken]))
                .collect();
            preview_edges.insert(target.to_string(), Value::Array(rows));
        }
        for (target, images) in &selection.by_target {
            by_target.insert(target.to_string(), images.len());
        }
        warnings = selection.warnings.as_slice();
        selected_images = selection.selected_count();
    }

    let report = MergeReport {
        created_at: chrono::Utc::now().to_rfc3339(),
        os: format!("{} {}", std::env::consts::OS, std::env::consts::ARCH),
        plan,
        preview_supply,
        preview_edges,
        warnings,
        totals: Totals {
            selected_images,
            by_target,
        },
    };

    let path = report_dir.join(REPORT_FILE_NAME);
    let text = serde_json::to_string_pretty(&report)?;
    write_atomic(&path, text.as_bytes())?;
    info!("Wrote merge report {:?}", path);
    Ok(path)
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use super::plan::MergePlan;
use crate::core::operations::write_atomic;
use crate::error::{IoContext, MergeResult};

pub const MANIFEST_FILE_NAME: &str = "data.yaml";

/// Ultralytics-style dataset manifest of the merged output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataYaml {
    pub path: String,
    pub train: String,
    pub val: String,
    pub test: String,
    pub nc: usize,
    pub names: Vec<String>,
}

impl DataYaml {
    pub fn from_plan(plan: &MergePlan) -> Self {
        let names = plan.class_names();
        let images_dir = |split: &str| format!("{}/images", split);
        Self {
            path: ".".to_string(),
            train: images_dir(&plan.split_names.train),
            val: images_dir(&plan.split_names.val),
            test: images_dir(&plan.split_names.test),
            nc: names.len(),
            names,
        }
    }
}

/// Write `data.yaml` into the plan's output directory.
pub fn write_data_yaml(plan: &MergePlan) -> MergeResult<PathBuf> {
    let path = plan.output_dir.join(MANIFEST_FILE_NAME);
    let yaml = serde_yaml::to_string(&DataYaml::from_plan(plan))?;
    write_atomic(&path, yaml.as_bytes())?;
    info!("Wrote manifest {:?}", path);
    Ok(path)
}

pub fn read_data_yaml(path: &Path) -> MergeResult<DataYaml> {
    let content = std::fs::read_to_string(path).with_path(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::merge::plan::TargetClass;

    #[test]
    fn test_manifest_lists_classes_and_split_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let mut plan = MergePlan::new(
            "m",
            dir.path(),
            vec![TargetClass::new(0, "person"), TargetClass::new(1, "car")],
        );
        plan.split_names.val = "valid".to_string();

        let path = write_data_yaml(&plan).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("path:"));

        let manifest = read_data_yaml(&path).unwrap();
        assert_eq!(manifest.path, ".");
        assert_eq!(manifest.train, "train/images");
        assert_eq!(manifest.val, "valid/images");
        assert_eq!(manifest.test, "test/images");
        assert_eq!(manifest.nc, 2);
        assert_eq!(manifest.names, vec!["person", "car"]);
    }
}

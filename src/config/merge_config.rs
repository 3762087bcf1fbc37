use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::core::dataset::DatasetRepository;
use crate::core::merge::{BalanceMode, EdgeKey, MergePlan, TargetClass};
use crate::core::operations::write_atomic;
use crate::error::{IoContext, MergeError, MergeResult};

pub const DEFAULT_CONFIG_FILE: &str = "merge.json";

/// One source dataset of the merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetEntry {
    /// Unique id; used in mapping keys, rename suffixes and `subdirs` folders
    pub id: String,
    pub root: PathBuf,
    /// Display name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Datasets plus the plan that merges them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    pub datasets: Vec<DatasetEntry>,
    pub plan: MergePlan,
}

impl MergeConfig {
    /// Load and validate a configuration file.
    ///
    /// Relative dataset roots and a relative output directory are resolved
    /// against the directory holding the file.
    pub fn load(path: &Path) -> MergeResult<Self> {
        info!("Loading merge configuration from: {:?}", path);
        let contents = fs::read_to_string(path).with_path(path)?;
        let mut config: MergeConfig = serde_json::from_str(&contents)?;

        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        config.validate()?;

        info!(
            "Loaded plan '{}': {} datasets, {} target classes",
            config.plan.name,
            config.datasets.len(),
            config.plan.target_classes.len()
        );
        Ok(config)
    }

    /// Save the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> MergeResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        write_atomic(path, json.as_bytes())?;
        info!("Configuration saved to: {:?}", path);
        Ok(())
    }

    /// Example configuration written by `yolo-merge init`.
    pub fn template() -> Self {
        let mut plan = MergePlan::new(
            "merged",
            "merged_dataset",
            vec![TargetClass::new(0, "person"), TargetClass::new(1, "vehicle")],
        );
        plan.mapping.insert(EdgeKey::new("coco_subset", 0), Some(0));
        plan.mapping.insert(EdgeKey::new("coco_subset", 2), Some(1));
        plan.mapping.insert(EdgeKey::new("coco_subset", 7), None);
        plan.mapping.insert(EdgeKey::new("street_cams", 0), Some(1));
        plan.mapping.insert(EdgeKey::new("street_cams", 1), Some(0));
        plan.target_quota.insert(0, 500);
        plan.target_quota.insert(1, 500);
        plan.edge_limit.insert(EdgeKey::new("street_cams", 1), 200);
        plan.balance_mode = BalanceMode::Proportional;

        Self {
            datasets: vec![
                DatasetEntry {
                    id: "coco_subset".to_string(),
                    root: PathBuf::from("datasets/coco_subset"),
                    name: Some("COCO subset".to_string()),
                },
                DatasetEntry {
                    id: "street_cams".to_string(),
                    root: PathBuf::from("datasets/street_cams"),
                    name: None,
                },
            ],
            plan,
        }
    }

    /// Check dataset ids and re-check the plan.
    ///
    /// Ids become folder names under the `subdirs` policy, so path
    /// separators and `..` are rejected.
    pub fn validate(&self) -> MergeResult<()> {
        let mut seen = HashSet::new();
        for entry in &self.datasets {
            let id = entry.id.trim();
            if id.is_empty() {
                return Err(MergeError::Config("dataset id must not be empty".to_string()));
            }
            if id.contains(['/', '\\']) || id == "." || id == ".." {
                return Err(MergeError::Config(format!(
                    "dataset id '{}' must not contain path separators or be '.'/'..'",
                    entry.id
                )));
            }
            if !seen.insert(entry.id.as_str()) {
                return Err(MergeError::Config(format!("duplicate dataset id '{}'", entry.id)));
            }
        }

        for edge in self.plan.mapping.keys() {
            if !seen.contains(edge.dataset.as_str()) {
                warn!("Mapping entry {} refers to an unknown dataset", edge);
            }
        }

        self.plan.validate()
    }

    /// Open every configured dataset, in configuration order.
    pub fn open_sources(&self) -> Vec<DatasetRepository> {
        self.datasets
            .iter()
            .map(|entry| DatasetRepository::open(entry.id.clone(), entry.root.clone()))
            .collect()
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for entry in &mut self.datasets {
            if entry.root.is_relative() {
                entry.root = base.join(&entry.root);
            }
        }
        if self.plan.output_dir.is_relative() {
            self.plan.output_dir = base.join(&self.plan.output_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::DatasetSource;

    #[test]
    fn test_template_is_valid() {
        let config = MergeConfig::template();
        assert!(config.validate().is_ok());
        assert_eq!(config.datasets.len(), 2);
        assert_eq!(config.plan.target_for("street_cams", 1), Some(0));
    }

    #[test]
    fn test_save_load_roundtrip_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        let config = MergeConfig::template();
        config.save(&path).unwrap();

        let loaded = MergeConfig::load(&path).unwrap();
        assert_eq!(loaded.plan.mapping, config.plan.mapping);
        assert_eq!(loaded.plan.target_quota, config.plan.target_quota);
        assert_eq!(loaded.plan.balance_mode, BalanceMode::Proportional);
        assert_eq!(loaded.datasets[0].root, dir.path().join("datasets/coco_subset"));
        assert_eq!(loaded.datasets[1].name, None);
        assert_eq!(loaded.plan.output_dir, dir.path().join("merged_dataset"));
    }

    #[test]
    fn test_minimal_document_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merge.json");
        fs::write(
            &path,
            r#"{
                "datasets": [{"id": "A", "root": "/data/a"}],
                "plan": {
                    "name": "m",
                    "output_dir": "/data/out",
                    "target_classes": [{"index": 0, "name": "cat"}],
                    "mapping": [{"source": {"dataset": "A", "class_id": 3}, "target": 0}]
                }
            }"#,
        )
        .unwrap();

        let config = MergeConfig::load(&path).unwrap();
        assert_eq!(config.plan.random_seed, 1337);
        assert!(config.plan.drop_empty_images);
        assert_eq!(config.plan.split_names.val, "val");
        assert_eq!(config.plan.target_for("A", 3), Some(0));
        assert_eq!(config.datasets[0].root, PathBuf::from("/data/a"));
    }

    #[test]
    fn test_rejects_bad_dataset_ids() {
        let mut config = MergeConfig::template();
        config.datasets[1].id = "coco_subset".to_string();
        assert!(matches!(config.validate(), Err(MergeError::Config(_))));

        config.datasets[1].id = "../escape".to_string();
        assert!(matches!(config.validate(), Err(MergeError::Config(_))));

        config.datasets[1].id = "  ".to_string();
        assert!(matches!(config.validate(), Err(MergeError::Config(_))));
    }

    #[test]
    fn test_invalid_plan_fails_to_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("merge.json");
        fs::write(
            &path,
            r#"{"datasets": [], "plan": {"name": "m", "output_dir": "/o",
                "target_classes": [{"index": 1, "name": "cat"}]}}"#,
        )
        .unwrap();
        assert!(MergeConfig::load(&path).is_err());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let result = MergeConfig::load(&dir.path().join("absent.json"));
        assert!(matches!(result, Err(MergeError::Io { .. })));
    }

    #[test]
    fn test_open_sources_keeps_order() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = MergeConfig::template();
        for entry in &mut config.datasets {
            entry.root = dir.path().join(&entry.id);
        }
        let sources = config.open_sources();
        let ids: Vec<&str> = sources.iter().map(|s| s.id()).collect();
        assert_eq!(ids, vec!["coco_subset", "street_cams"]);
        assert!(sources.iter().all(|s| s.image_count() == 0));
    }
}

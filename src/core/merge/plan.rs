//! Immutable description of one merge run.
//!
//! A `MergePlan` is built once from user configuration and is only read by
//! the selector and executor. Its JSON form is the portable document used
//! both in configuration files and in the audit report.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use crate::core::dataset::DatasetSplit;
use crate::core::operations::{posix_string, stable_int_key, DEFAULT_SEED};
use crate::error::{MergeError, MergeResult};

/// Emitted class id of a target class.
pub type TargetIndex = u32;

/// A (source dataset, source class) pair: one potential edge into a target.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EdgeKey {
    pub dataset: String,
    pub class_id: u32,
}

impl EdgeKey {
    pub fn new(dataset: impl Into<String>, class_id: u32) -> Self {
        Self {
            dataset: dataset.into(),
            class_id,
        }
    }
}

impl std::fmt::Display for EdgeKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.dataset, self.class_id)
    }
}

/// Identity of a source image across all datasets.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ImageKey {
    pub dataset_id: String,
    pub image_path: PathBuf,
}

impl ImageKey {
    pub fn new(dataset_id: impl Into<String>, image_path: impl Into<PathBuf>) -> Self {
        Self {
            dataset_id: dataset_id.into(),
            image_path: image_path.into(),
        }
    }

    /// Seeded sort key over `"<dataset_id>::<posix path>"`.
    pub fn stable_key(&self, seed: u64) -> u64 {
        stable_int_key(
            &[
                self.dataset_id.as_str(),
                "::",
                posix_string(&self.image_path).as_str(),
            ],
            seed,
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetClass {
    pub index: TargetIndex,
    pub name: String,
}

impl TargetClass {
    pub fn new(index: TargetIndex, name: impl Into<String>) -> Self {
        Self {
            index,
            name: name.into(),
        }
    }
}

/// How a target's quota is split across its contributing edges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BalanceMode {
    /// Same share per edge, remainder to the first edges
    #[default]
    #[serde(rename = "equal")]
    Equal,
    /// Share proportional to each edge's supply
    #[serde(rename = "prop")]
    Proportional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SplitStrategy {
    /// Keep train/val/test partitioning of the sources
    #[default]
    Keep,
    /// Put everything in the train bucket
    Flatten,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CopyMode {
    #[default]
    Hardlink,
    Copy,
}

/// What to do when two sources land on the same destination file name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CollisionPolicy {
    /// Append a deterministic `__<dataset>_<hash>` suffix
    #[default]
    Rename,
    /// Nest every file under a per-dataset directory
    Subdirs,
    /// Keep the first file, drop later ones
    Skip,
}

/// Destination split folder names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SplitNames {
    pub train: String,
    pub val: String,
    pub test: String,
}

impl Default for SplitNames {
    fn default() -> Self {
        Self {
            train: "train".to_string(),
            val: "val".to_string(),
            test: "test".to_string(),
        }
    }
}

impl SplitNames {
    pub fn get(&self, split: DatasetSplit) -> &str {
        match split {
            DatasetSplit::Train => &self.train,
            DatasetSplit::Val => &self.val,
            DatasetSplit::Test => &self.test,
        }
    }

    pub fn all(&self) -> [&str; 3] {
        [&self.train, &self.val, &self.test]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PlanDocument", into = "PlanDocument")]
pub struct MergePlan {
    pub name: String,
    pub output_dir: PathBuf,
    pub target_classes: Vec<TargetClass>,
    /// `None` drops the source class; absent keys are dropped too.
    pub mapping: IndexMap<EdgeKey, Option<TargetIndex>>,
    /// Desired image count per target; absent means "take all supply".
    pub target_quota: BTreeMap<TargetIndex, usize>,
    /// Maximum images contributed by an edge; absent means unlimited.
    pub edge_limit: IndexMap<EdgeKey, usize>,
    pub balance_mode: BalanceMode,
    pub random_seed: u64,
    pub split_strategy: SplitStrategy,
    pub copy_mode: CopyMode,
    pub collision_policy: CollisionPolicy,
    pub drop_empty_images: bool,
    pub split_names: SplitNames,
}

impl MergePlan {
    /// Plan with default policies and an empty mapping.
    pub fn new(
        name: impl Into<String>,
        output_dir: impl Into<PathBuf>,
        target_classes: Vec<TargetClass>,
    ) -> Self {
        Self {
            name: name.into(),
            output_dir: output_dir.into(),
            target_classes,
            mapping: IndexMap::new(),
            target_quota: BTreeMap::new(),
            edge_limit: IndexMap::new(),
            balance_mode: BalanceMode::default(),
            random_seed: DEFAULT_SEED,
            split_strategy: SplitStrategy::default(),
            copy_mode: CopyMode::default(),
            collision_policy: CollisionPolicy::default(),
            drop_empty_images: true,
            split_names: SplitNames::default(),
        }
    }

    /// Target for a source class, or `None` when it is dropped or unmapped.
    pub fn target_for(&self, dataset_id: &str, class_id: u32) -> Option<TargetIndex> {
        self.mapping
            .get(&EdgeKey::new(dataset_id, class_id))
            .copied()
            .flatten()
    }

    pub fn quota_for(&self, target: TargetIndex) -> Option<usize> {
        self.target_quota.get(&target).copied()
    }

    pub fn limit_for(&self, edge: &EdgeKey) -> Option<usize> {
        self.edge_limit.get(edge).copied()
    }

    pub fn target_name(&self, target: TargetIndex) -> Option<&str> {
        self.target_classes
            .iter()
            .find(|tc| tc.index == target)
            .map(|tc| tc.name.as_str())
    }

    pub fn class_names(&self) -> Vec<String> {
        self.target_classes.iter().map(|tc| tc.name.clone()).collect()
    }

    pub fn prefer_hardlink(&self) -> bool {
        self.copy_mode == CopyMode::Hardlink
    }

    /// Destination split folder for a source split name.
    pub fn destination_split(&self, source_split: &str) -> &str {
        match self.split_strategy {
            SplitStrategy::Flatten => &self.split_names.train,
            SplitStrategy::Keep => self.split_names.get(DatasetSplit::normalize(source_split)),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Check structural consistency of the plan.
    pub fn validate(&self) -> MergeResult<()> {
        let invalid = |msg: String| Err(MergeError::InvalidPlan(msg));

        if self.target_classes.is_empty() {
            return invalid("at least one target class is required".to_string());
        }
        for (position, tc) in self.target_classes.iter().enumerate() {
            if tc.index as usize != position {
                return invalid(format!(
                    "target class indices must be contiguous from 0, found {} at position {}",
                    tc.index, position
                ));
            }
            if tc.name.trim().is_empty() {
                return invalid(format!("target class {} has an empty name", tc.index));
            }
        }

        let n_targets = self.target_classes.len();
        let in_range = |t: TargetIndex| (t as usize) < n_targets;

        for (edge, target) in &self.mapping {
            if let Some(t) = target {
                if !in_range(*t) {
                    return invalid(format!("mapping {} points at unknown target {}", edge, t));
                }
            }
        }
        for target in self.target_quota.keys() {
            if !in_range(*target) {
                return invalid(format!("quota set for unknown target {}", target));
            }
        }

        let names = self.split_names.all();
        if names.iter().any(|n| n.trim().is_empty()) {
            return invalid("split folder names must not be empty".to_string());
        }
        let distinct: HashSet<&str> = names.iter().copied().collect();
        if distinct.len() != names.len() {
            return invalid(format!("split folder names must be distinct: {:?}", names));
        }

        Ok(())
    }
}

// ============================================================================
// PORTABLE JSON DOCUMENT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
struct MappingEntry {
    source: EdgeKey,
    target: Option<TargetIndex>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct EdgeLimitEntry {
    source: EdgeKey,
    limit: usize,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

fn default_true() -> bool {
    true
}

fn default_train_name() -> String {
    "train".to_string()
}

fn default_val_name() -> String {
    "val".to_string()
}

fn default_test_name() -> String {
    "test".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PlanDocument {
    name: String,
    output_dir: PathBuf,
    target_classes: Vec<TargetClass>,
    #[serde(default)]
    mapping: Vec<MappingEntry>,
    #[serde(default)]
    target_quota: BTreeMap<TargetIndex, usize>,
    #[serde(default)]
    edge_limit: Vec<EdgeLimitEntry>,
    #[serde(default)]
    balance_mode: BalanceMode,
    #[serde(default = "default_seed")]
    random_seed: u64,
    #[serde(default)]
    split_strategy: SplitStrategy,
    #[serde(default)]
    copy_mode: CopyMode,
    #[serde(default)]
    collision_policy: CollisionPolicy,
    #[serde(default = "default_true")]
    drop_empty_images: bool,
    #[serde(default = "default_train_name")]
    target_train_name: String,
    #[serde(default = "default_val_name")]
    target_val_name: String,
    #[serde(default = "default_test_name")]
    target_test_name: String,
}

impl TryFrom<PlanDocument> for MergePlan {
    type Error = MergeError;

    fn try_from(doc: PlanDocument) -> Result<Self, Self::Error> {
        let mut mapping = IndexMap::new();
        for entry in doc.mapping {
            if mapping.insert(entry.source.clone(), entry.target).is_some() {
                return Err(MergeError::InvalidPlan(format!(
                    "duplicate mapping for {}",
                    entry.source
                )));
            }
        }

        let mut edge_limit = IndexMap::new();
        for entry in doc.edge_limit {
            if edge_limit.insert(entry.source.clone(), entry.limit).is_some() {
                return Err(MergeError::InvalidPlan(format!(
                    "duplicate edge limit for {}",
                    entry.source
                )));
            }
        }

        let plan = MergePlan {
            name: doc.name,
            output_dir: doc.output_dir,
            target_classes: doc.target_classes,
            mapping,
            target_quota: doc.target_quota,
            edge_limit,
            balance_mode: doc.balance_mode,
            random_seed: doc.random_seed,
            split_strategy: doc.split_strategy,
            copy_mode: doc.copy_mode,
            collision_policy: doc.collision_policy,
            drop_empty_images: doc.drop_empty_images,
            split_names: SplitNames {
                train: doc.target_train_name,
                val: doc.target_val_name,
                test: doc.target_test_name,
            },
        };
        plan.validate()?;
        Ok(plan)
    }
}

impl From<MergePlan> for PlanDocument {
    fn from(plan: MergePlan) -> Self {
        PlanDocument {
            name: plan.name,
            output_dir: plan.output_dir,
            target_classes: plan.target_classes,
            mapping: plan
                .mapping
                .into_iter()
                .map(|(source, target)| MappingEntry { source, target })
                .collect(),
            target_quota: plan.target_quota,
            edge_limit: plan
                .edge_limit
                .into_iter()
                .map(|(source, limit)| EdgeLimitEntry { source, limit })
                .collect(),
            balance_mode: plan.balance_mode,
            random_seed: plan.random_seed,
            split_strategy: plan.split_strategy,
            copy_mode: plan.copy_mode,
            collision_policy: plan.collision_policy,
            drop_empty_images: plan.drop_empty_images,
            target_train_name: plan.split_names.train,
            target_val_name: plan.split_names.val,
            target_test_name: plan.split_names.test,
        }
    }
}

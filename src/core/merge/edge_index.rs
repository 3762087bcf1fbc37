use indexmap::{IndexMap, IndexSet};
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::plan::{EdgeKey, ImageKey, MergePlan, TargetIndex};
use crate::core::dataset::{parse_label_file, DatasetSource};

/// Unique images contributed by one (dataset, source class) edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeGroup {
    pub edge: EdgeKey,
    pub target: TargetIndex,
    /// In discovery order, without duplicates
    pub images: Vec<ImageKey>,
}

/// Counters gathered while scanning labels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanStats {
    pub images_scanned: usize,
    pub rows_mapped: usize,
    pub rows_dropped: usize,
}

/// Target index -> contributing edge groups.
///
/// Edge groups keep the order in which their edge was first seen during the
/// scan (dataset, split, image, row), which is the order equal-share
/// remainders are handed out in.
#[derive(Debug, Clone, Default)]
pub struct EdgeIndex {
    per_target: BTreeMap<TargetIndex, Vec<EdgeGroup>>,
    stats: ScanStats,
}

impl EdgeIndex {
    /// Scan every label of every dataset once and group images by edge.
    ///
    /// Rows whose class is mapped to DROP, or not mapped at all, are ignored.
    pub fn build<S: DatasetSource>(plan: &MergePlan, sources: &[S]) -> Self {
        let mut per_edge: IndexMap<EdgeKey, (TargetIndex, IndexSet<ImageKey>)> = IndexMap::new();
        let mut stats = ScanStats::default();

        for source in sources {
            let dataset_id = source.id();
            debug!("Indexing dataset '{}' ({} images)", dataset_id, source.image_count());

            for (split, images) in source.splits() {
                for image_path in images {
                    stats.images_scanned += 1;
                    let rows = parse_label_file(&source.label_path_for(image_path));

                    for row in rows {
                        let Some(target) = plan.target_for(dataset_id, row.class_id) else {
                            stats.rows_dropped += 1;
                            continue;
                        };
                        stats.rows_mapped += 1;
                        let edge = EdgeKey::new(dataset_id, row.class_id);
                        per_edge
                            .entry(edge)
                            .or_insert_with(|| (target, IndexSet::new()))
                            .1
                            .insert(ImageKey::new(dataset_id, image_path.clone()));
                    }
                }
                debug!("Indexed split '{}' of '{}'", split, dataset_id);
            }
        }

        let mut per_target: BTreeMap<TargetIndex, Vec<EdgeGroup>> = BTreeMap::new();
        for (edge, (target, images)) in per_edge {
            per_target.entry(target).or_default().push(EdgeGroup {
                edge,
                target,
                images: images.into_iter().collect(),
            });
        }

        info!(
            "Edge index built: {} images scanned, {} rows mapped, {} rows dropped, {} targets",
            stats.images_scanned,
            stats.rows_mapped,
            stats.rows_dropped,
            per_target.len()
        );

        Self { per_target, stats }
    }

    /// Drop candidate images that fail a host-supplied filter (dedup,
    /// quality checks). Edge groups left empty are kept with zero supply.
    pub fn retain_images<F>(&mut self, mut keep: F)
    where
        F: FnMut(&ImageKey) -> bool,
    {
        for groups in self.per_target.values_mut() {
            for group in groups.iter_mut() {
                group.images.retain(|image| keep(image));
            }
        }
    }

    pub fn groups(&self, target: TargetIndex) -> &[EdgeGroup] {
        self.per_target
            .get(&target)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Targets in ascending order with their edge groups.
    pub fn iter(&self) -> impl Iterator<Item = (TargetIndex, &[EdgeGroup])> {
        self.per_target.iter().map(|(t, g)| (*t, g.as_slice()))
    }

    pub fn targets(&self) -> impl Iterator<Item = TargetIndex> + '_ {
        self.per_target.keys().copied()
    }

    pub fn stats(&self) -> ScanStats {
        self.stats
    }

    pub fn is_empty(&self) -> bool {
        self.per_target.is_empty()
    }

    /// Build directly from groups, e.g. for a host that indexes elsewhere.
    pub fn from_groups(groups: impl IntoIterator<Item = EdgeGroup>) -> Self {
        let mut per_target: BTreeMap<TargetIndex, Vec<EdgeGroup>> = BTreeMap::new();
        for group in groups {
            per_target.entry(group.target).or_default().push(group);
        }
        Self {
            per_target,
            stats: ScanStats::default(),
        }
    }
}

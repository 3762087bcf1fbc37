//! Deterministic, quota-driven image selection.
//!
//! Each target is handled on its own. Candidate images of every edge are
//! ordered by their seeded stable key, capped by the edge limit, and the
//! target quota is shared out across edges (equal or proportional) with
//! shortfalls handed to the edges that still have spare supply.

use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info, warn};

use super::edge_index::{EdgeGroup, EdgeIndex};
use super::plan::{BalanceMode, EdgeKey, ImageKey, MergePlan, TargetIndex};

/// Supply/quota/selected counts for one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TargetPreview {
    pub supply: usize,
    pub quota: usize,
    pub selected: usize,
}

/// Supply and taken count of one edge within its target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgePreview {
    pub edge: EdgeKey,
    pub supply: usize,
    pub taken: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionResult {
    pub selected_images: BTreeSet<ImageKey>,
    pub by_target: BTreeMap<TargetIndex, BTreeSet<ImageKey>>,
    pub by_edge: BTreeMap<EdgeKey, BTreeSet<ImageKey>>,
    pub preview_supply: BTreeMap<TargetIndex, TargetPreview>,
    pub preview_edges: BTreeMap<TargetIndex, Vec<EdgePreview>>,
    pub warnings: Vec<String>,
}

impl SelectionResult {
    pub fn contains(&self, image: &ImageKey) -> bool {
        self.selected_images.contains(image)
    }

    pub fn selected_count(&self) -> usize {
        self.selected_images.len()
    }

    pub fn target_count(&self, target: TargetIndex) -> usize {
        self.by_target.get(&target).map(BTreeSet::len).unwrap_or(0)
    }
}

/// Select images for every target of the plan.
///
/// Targets declared in the plan but absent from the index still get a
/// preview row and a "no available images" warning.
pub fn select_with_quotas(plan: &MergePlan, index: &EdgeIndex) -> SelectionResult {
    let mut result = SelectionResult::default();

    let targets: BTreeSet<TargetIndex> = plan
        .target_classes
        .iter()
        .map(|tc| tc.index)
        .chain(index.targets())
        .collect();

    for target in targets {
        select_for_target(plan, target, index.groups(target), &mut result);
    }

    info!(
        "Selection complete: {} unique images across {} targets, {} warnings",
        result.selected_images.len(),
        result.by_target.len(),
        result.warnings.len()
    );
    result
}

fn select_for_target(
    plan: &MergePlan,
    target: TargetIndex,
    groups: &[EdgeGroup],
    result: &mut SelectionResult,
) {
    let label = target_label(plan, target);

    let supplies: Vec<(&EdgeGroup, Vec<&ImageKey>)> = groups
        .iter()
        .map(|group| (group, ordered_candidates(plan, group)))
        .collect();

    let total_supply: usize = supplies.iter().map(|(_, imgs)| imgs.len()).sum();
    let quota = plan.quota_for(target).unwrap_or(total_supply);
    result.preview_supply.insert(
        target,
        TargetPreview {
            supply: total_supply,
            quota,
            selected: 0,
        },
    );

    if total_supply == 0 {
        let msg = format!("Target {}: no available images after mapping/limits.", label);
        warn!("{}", msg);
        result.warnings.push(msg);
        return;
    }

    let sizes: Vec<usize> = supplies.iter().map(|(_, imgs)| imgs.len()).collect();
    let want = allocate(plan.balance_mode, quota, &sizes);
    debug!("Target {}: supply {:?}, want {:?}", label, sizes, want);

    let target_set = result.by_target.entry(target).or_default();
    let edge_rows = result.preview_edges.entry(target).or_default();
    let mut taken_total = 0;

    for ((group, imgs), need) in supplies.iter().zip(want) {
        let mut chosen: Vec<&ImageKey> = Vec::with_capacity(need);

        // Prefer images no earlier edge has claimed for this target.
        for &image in imgs {
            if chosen.len() >= need {
                break;
            }
            if !target_set.contains(image) {
                chosen.push(image);
            }
        }
        // Backfill with already-claimed images so the edge still meets its share.
        if chosen.len() < need {
            for &image in imgs {
                if chosen.len() >= need {
                    break;
                }
                if target_set.contains(image) {
                    chosen.push(image);
                }
            }
        }

        let edge_set = result.by_edge.entry(group.edge.clone()).or_default();
        for &image in &chosen {
            result.selected_images.insert(image.clone());
            target_set.insert(image.clone());
            edge_set.insert(image.clone());
        }

        taken_total += chosen.len();
        edge_rows.push(EdgePreview {
            edge: group.edge.clone(),
            supply: imgs.len(),
            taken: chosen.len(),
        });
    }

    if let Some(preview) = result.preview_supply.get_mut(&target) {
        preview.selected = taken_total;
    }

    if taken_total < quota {
        let msg = format!(
            "Target {}: selected {}/{} (supply/limits).",
            label, taken_total, quota
        );
        warn!("{}", msg);
        result.warnings.push(msg);
    } else {
        info!("Target {}: selected {}/{}", label, taken_total, quota);
    }
}

fn target_label(plan: &MergePlan, target: TargetIndex) -> String {
    match plan.target_name(target) {
        Some(name) => format!("{} ({})", target, name),
        None => target.to_string(),
    }
}

/// Candidate images of an edge in seeded stable-key order, capped by the
/// edge limit.
fn ordered_candidates<'a>(plan: &MergePlan, group: &'a EdgeGroup) -> Vec<&'a ImageKey> {
    let mut images: Vec<&ImageKey> = group.images.iter().collect();
    images.sort_by_cached_key(|image| image.stable_key(plan.random_seed));
    if let Some(limit) = plan.limit_for(&group.edge) {
        images.truncate(limit);
    }
    images
}

/// Desired per-edge counts for a quota given each edge's (capped) supply.
///
/// Never assigns an edge more than its supply. When the edges together
/// cannot cover the quota, the result sums to less than the quota.
pub fn allocate(mode: BalanceMode, quota: usize, supplies: &[usize]) -> Vec<usize> {
    let k = supplies.len();
    if k == 0 {
        return Vec::new();
    }
    let total: usize = supplies.iter().sum();

    let mut want: Vec<usize> = match mode {
        BalanceMode::Equal => {
            let base = quota / k;
            let rem = quota % k;
            (0..k).map(|i| base + usize::from(i < rem)).collect()
        }
        BalanceMode::Proportional => supplies
            .iter()
            .map(|&s| {
                if total == 0 {
                    0
                } else {
                    (quota.saturating_mul(s) as f64 / total as f64).round_ties_even() as usize
                }
            })
            .collect(),
    };

    // Rounding can leave the shares off by a few images.
    let mut short = 0;
    let assigned: usize = want.iter().sum();
    if assigned > quota {
        trim_surplus(&mut want, assigned - quota);
    } else {
        short += quota - assigned;
    }

    for (w, &s) in want.iter_mut().zip(supplies) {
        if *w > s {
            short += *w - s;
            *w = s;
        }
    }

    if short > 0 {
        let residual = redistribute_shortfall(&mut want, supplies, short);
        if residual > 0 {
            debug!("Quota {} under-supplied by {} after redistribution", quota, residual);
        }
    }
    want
}

/// Hand `short` extra images to edges with the most spare capacity first.
/// Returns what could not be placed.
fn redistribute_shortfall(want: &mut [usize], supplies: &[usize], mut short: usize) -> usize {
    let mut spare: Vec<(usize, usize)> = want
        .iter()
        .zip(supplies)
        .enumerate()
        .map(|(i, (&w, &s))| (i, s - w))
        .collect();
    // Stable: equal spare keeps edge order.
    spare.sort_by(|a, b| b.1.cmp(&a.1));

    for (i, capacity) in spare {
        if short == 0 {
            break;
        }
        let give = short.min(capacity);
        want[i] += give;
        short -= give;
    }
    short
}

/// Remove `surplus` images, one at a time, from the edge with the largest
/// share (earliest edge on ties).
fn trim_surplus(want: &mut [usize], mut surplus: usize) {
    while surplus > 0 {
        let Some(i) = (0..want.len())
            .filter(|&i| want[i] > 0)
            .max_by(|&a, &b| want[a].cmp(&want[b]).then(b.cmp(&a)))
        else {
            break;
        };
        want[i] -= 1;
        surplus -= 1;
    }
}

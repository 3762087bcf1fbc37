//! Materializes a merge plan into the output directory tree.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{debug, info, trace, warn};

use super::manifest::write_data_yaml;
use super::plan::{CollisionPolicy, ImageKey, MergePlan};
use super::progress::{CancelToken, Progress, ProgressCallback};
use crate::core::dataset::{parse_label_file, save_label_file, DatasetSource, YoloDetection};
use crate::core::operations::{hardlink_or_copy, safe_mkdirs, with_hashed_suffix, LinkOutcome};
use crate::error::MergeResult;

/// Counters for one executor run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MergeSummary {
    /// Images iterated, including skipped ones
    pub processed: usize,
    /// Image/label pairs written
    pub written: usize,
    pub skipped_unselected: usize,
    pub skipped_empty: usize,
    /// Dropped because the destination existed under the `skip` policy
    pub skipped_collisions: usize,
    /// Source paths without a file name
    pub skipped_invalid: usize,
    pub renamed: usize,
    pub hardlinked: usize,
    pub copied: usize,
    /// Destination image already existed and was left alone
    pub already_present: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Completed(MergeSummary),
    Cancelled(MergeSummary),
}

impl MergeOutcome {
    pub fn summary(&self) -> &MergeSummary {
        match self {
            MergeOutcome::Completed(summary) | MergeOutcome::Cancelled(summary) => summary,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, MergeOutcome::Cancelled(_))
    }
}

/// Where one source image and its label go.
struct Destination {
    image: PathBuf,
    label: PathBuf,
    renamed: bool,
}

/// Copy or link every surviving image and write its remapped label.
///
/// `selection` of `None` takes every image that survives class mapping.
/// Progress advances once per source image, skipped ones included, so the
/// final value equals the total image count of all sources. Cancellation is
/// checked before each image; files already written stay in place.
/// `data.yaml` is only written when the loop finishes.
pub fn merge_execute<S: DatasetSource>(
    plan: &MergePlan,
    sources: &[S],
    selection: Option<&BTreeSet<ImageKey>>,
    mut progress_cb: Option<ProgressCallback<'_>>,
    cancel: Option<&CancelToken>,
) -> MergeResult<MergeOutcome> {
    let out_root = &plan.output_dir;
    for split in plan.split_names.all() {
        safe_mkdirs(&out_root.join(split).join("images"))?;
        safe_mkdirs(&out_root.join(split).join("labels"))?;
    }

    let total: usize = sources.iter().map(|s| s.image_count()).sum();
    let mut progress = Progress::new(total);
    let mut summary = MergeSummary::default();
    info!(
        "Merging {} source images from {} datasets into {:?}",
        total,
        sources.len(),
        out_root
    );

    let mut advance = |progress: &mut Progress, summary: &mut MergeSummary| {
        progress.step(1);
        summary.processed += 1;
        if let Some(cb) = progress_cb.as_mut() {
            cb(&*progress);
        }
    };

    for source in sources {
        let dataset_id = source.id();

        for (split, images) in source.splits() {
            let dst_split = plan.destination_split(split);
            debug!("Merging '{}' split '{}' into '{}'", dataset_id, split, dst_split);

            for image_path in images {
                if cancel.is_some_and(CancelToken::is_cancelled) {
                    warn!("Merge cancelled at {}/{}", progress.value, progress.total);
                    return Ok(MergeOutcome::Cancelled(summary));
                }

                if let Some(selected) = selection {
                    if !selected.contains(&ImageKey::new(dataset_id, image_path.clone())) {
                        summary.skipped_unselected += 1;
                        advance(&mut progress, &mut summary);
                        continue;
                    }
                }

                let Some(file_name) = image_path.file_name() else {
                    warn!("Skipping {:?}: path has no file name", image_path);
                    summary.skipped_invalid += 1;
                    advance(&mut progress, &mut summary);
                    continue;
                };

                let rows = remap_rows(plan, dataset_id, &source.label_path_for(image_path));
                if plan.drop_empty_images && rows.is_empty() {
                    trace!("No mapped boxes left in {:?}", image_path);
                    summary.skipped_empty += 1;
                    advance(&mut progress, &mut summary);
                    continue;
                }

                let Some(dest) = destination_for(plan, dst_split, dataset_id, image_path, file_name) else {
                    debug!("Skipping {:?}: destination already taken", image_path);
                    summary.skipped_collisions += 1;
                    advance(&mut progress, &mut summary);
                    continue;
                };

                match hardlink_or_copy(image_path, &dest.image, plan.prefer_hardlink())? {
                    LinkOutcome::Linked => summary.hardlinked += 1,
                    LinkOutcome::Copied => summary.copied += 1,
                    LinkOutcome::AlreadyPresent => summary.already_present += 1,
                }
                save_label_file(&dest.label, &rows)?;

                if dest.renamed {
                    debug!("Renamed {:?} -> {:?}", image_path, dest.image);
                    summary.renamed += 1;
                }
                summary.written += 1;
                advance(&mut progress, &mut summary);
            }
        }
    }

    write_data_yaml(plan)?;
    info!(
        "Merge complete: {} written, {} unselected, {} empty, {} collisions skipped, {} invalid, {} renamed",
        summary.written,
        summary.skipped_unselected,
        summary.skipped_empty,
        summary.skipped_collisions,
        summary.skipped_invalid,
        summary.renamed
    );
    Ok(MergeOutcome::Completed(summary))
}

/// Label rows of an image with classes remapped to targets; dropped and
/// unmapped classes are removed.
fn remap_rows(plan: &MergePlan, dataset_id: &str, label_path: &Path) -> Vec<YoloDetection> {
    parse_label_file(label_path)
        .into_iter()
        .filter_map(|row| {
            plan.target_for(dataset_id, row.class_id)
                .map(|target| row.with_class(target))
        })
        .collect()
}

/// Resolve image and label destinations under the collision policy.
///
/// A destination counts as taken when either the image or its label file
/// exists, since images with the same stem share one label name. Returns
/// `None` when the `skip` policy rejects the image.
fn destination_for(
    plan: &MergePlan,
    dst_split: &str,
    dataset_id: &str,
    image_path: &Path,
    file_name: &OsStr,
) -> Option<Destination> {
    let images_dir = plan.output_dir.join(dst_split).join("images");
    let labels_dir = plan.output_dir.join(dst_split).join("labels");

    let (images_dir, labels_dir) = match plan.collision_policy {
        CollisionPolicy::Subdirs => (images_dir.join(dataset_id), labels_dir.join(dataset_id)),
        CollisionPolicy::Rename | CollisionPolicy::Skip => (images_dir, labels_dir),
    };

    let wanted = Destination::at(images_dir.join(file_name), &labels_dir, false);
    if plan.collision_policy == CollisionPolicy::Subdirs || !wanted.is_taken() {
        return Some(wanted);
    }

    match plan.collision_policy {
        CollisionPolicy::Skip => None,
        _ => {
            let renamed = with_hashed_suffix(&wanted.image, image_path, dataset_id);
            Some(Destination::at(renamed, &labels_dir, true))
        }
    }
}

impl Destination {
    /// Image at `image`, label named after its stem in `labels_dir`.
    fn at(image: PathBuf, labels_dir: &Path, renamed: bool) -> Self {
        let mut label_name = image
            .file_stem()
            .map(OsStr::to_os_string)
            .unwrap_or_default();
        label_name.push(".txt");
        let label = labels_dir.join(label_name);
        Self {
            image,
            label,
            renamed,
        }
    }

    fn is_taken(&self) -> bool {
        self.image.exists() || self.label.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::dataset::DatasetRepository;
    use crate::core::merge::manifest::read_data_yaml;
    use crate::core::merge::plan::{CopyMode, EdgeKey, SplitStrategy, TargetClass};
    use crate::core::dataset::SplitMap;
    use std::fs;

    fn write_image(root: &Path, split: &str, name: &str, label: Option<&str>) -> PathBuf {
        let image = root.join(split).join("images").join(name);
        fs::create_dir_all(image.parent().unwrap()).unwrap();
        fs::write(&image, format!("pixels of {}", image.display())).unwrap();
        if let Some(label) = label {
            let label_path = root
                .join(split)
                .join("labels")
                .join(Path::new(name).with_extension("txt"));
            fs::create_dir_all(label_path.parent().unwrap()).unwrap();
            fs::write(label_path, label).unwrap();
        }
        image
    }

    /// Datasets A and B each holding `train/images/img001.jpg` with class 0.
    fn colliding_sources(root: &Path) -> Vec<DatasetRepository> {
        let a = root.join("A");
        let b = root.join("B");
        write_image(&a, "train", "img001.jpg", Some("0 0.5 0.5 0.2 0.2\n"));
        write_image(&b, "train", "img001.jpg", Some("0 0.4 0.4 0.1 0.1\n"));
        vec![DatasetRepository::open("A", &a), DatasetRepository::open("B", &b)]
    }

    fn cat_plan(out: &Path) -> MergePlan {
        let mut plan = MergePlan::new("m", out, vec![TargetClass::new(0, "cat")]);
        plan.mapping.insert(EdgeKey::new("A", 0), Some(0));
        plan.mapping.insert(EdgeKey::new("B", 0), Some(0));
        plan.copy_mode = CopyMode::Copy;
        plan
    }

    fn file_names(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(dir)
            .unwrap()
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[test]
    fn test_rename_collision_is_deterministic() {
        let dir = tempfile::tempdir().unwrap();
        let sources = colliding_sources(dir.path());

        let mut renamed_names = Vec::new();
        for run in 0..2 {
            let out = dir.path().join(format!("out{}", run));
            let outcome = merge_execute(&cat_plan(&out), &sources, None, None, None).unwrap();
            assert_eq!(outcome.summary().written, 2);
            assert_eq!(outcome.summary().renamed, 1);

            let names = file_names(&out.join("train/images"));
            assert_eq!(names.len(), 2);
            assert_eq!(names[0], "img001.jpg");
            assert!(names[1].starts_with("img001__b_"));
            assert!(names[1].ends_with(".jpg"));

            let renamed_stem = names[1].trim_end_matches(".jpg");
            let label = out.join("train/labels").join(format!("{}.txt", renamed_stem));
            assert_eq!(fs::read_to_string(label).unwrap(), "0 0.400000 0.400000 0.100000 0.100000\n");
            renamed_names.push(names[1].clone());
        }
        assert_eq!(renamed_names[0], renamed_names[1]);
    }

    #[test]
    fn test_same_stem_different_extension_gets_own_label() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("A");
        let b = dir.path().join("B");
        write_image(&a, "train", "x.jpg", Some("0 0.1 0.1 0.2 0.2\n"));
        write_image(&b, "train", "x.png", Some("0 0.9 0.9 0.2 0.2\n"));
        let sources = vec![DatasetRepository::open("A", &a), DatasetRepository::open("B", &b)];

        let out = dir.path().join("out");
        let outcome = merge_execute(&cat_plan(&out), &sources, None, None, None).unwrap();
        assert_eq!(outcome.summary().written, 2);
        assert_eq!(outcome.summary().renamed, 1);

        let images = file_names(&out.join("train/images"));
        assert_eq!(images.len(), 2);
        assert_eq!(images[0], "x.jpg");
        assert!(images[1].starts_with("x__b_") && images[1].ends_with(".png"));

        let labels = file_names(&out.join("train/labels"));
        assert_eq!(labels.len(), 2);
        assert_eq!(
            fs::read_to_string(out.join("train/labels/x.txt")).unwrap(),
            "0 0.100000 0.100000 0.200000 0.200000\n"
        );
        let renamed_label = format!("{}.txt", images[1].trim_end_matches(".png"));
        assert_eq!(
            fs::read_to_string(out.join("train/labels").join(renamed_label)).unwrap(),
            "0 0.900000 0.900000 0.200000 0.200000\n"
        );
    }

    #[test]
    fn test_skip_policy_treats_taken_label_as_collision() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("A");
        let b = dir.path().join("B");
        write_image(&a, "train", "x.jpg", Some("0 0.1 0.1 0.2 0.2\n"));
        write_image(&b, "train", "x.png", Some("0 0.9 0.9 0.2 0.2\n"));
        let sources = vec![DatasetRepository::open("A", &a), DatasetRepository::open("B", &b)];

        let out = dir.path().join("out");
        let mut plan = cat_plan(&out);
        plan.collision_policy = CollisionPolicy::Skip;
        let outcome = merge_execute(&plan, &sources, None, None, None).unwrap();

        assert_eq!(outcome.summary().written, 1);
        assert_eq!(outcome.summary().skipped_collisions, 1);
        assert_eq!(file_names(&out.join("train/images")), vec!["x.jpg"]);
        assert_eq!(
            fs::read_to_string(out.join("train/labels/x.txt")).unwrap(),
            "0 0.100000 0.100000 0.200000 0.200000\n"
        );
    }

    #[test]
    fn test_path_without_file_name_is_counted_as_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let mut splits = SplitMap::new();
        splits.insert("train".to_string(), vec![dir.path().join("A").join("..")]);
        let sources = vec![DatasetRepository::from_splits("A", splits)];

        let out = dir.path().join("out");
        let outcome = merge_execute(&cat_plan(&out), &sources, None, None, None).unwrap();
        assert_eq!(outcome.summary().skipped_invalid, 1);
        assert_eq!(outcome.summary().skipped_collisions, 0);
        assert_eq!(outcome.summary().processed, 1);
        assert!(file_names(&out.join("train/images")).is_empty());
    }

    #[test]
    fn test_subdirs_policy_nests_by_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let sources = colliding_sources(dir.path());
        let out = dir.path().join("out");
        let mut plan = cat_plan(&out);
        plan.collision_policy = CollisionPolicy::Subdirs;

        merge_execute(&plan, &sources, None, None, None).unwrap();
        assert!(out.join("train/images/A/img001.jpg").exists());
        assert!(out.join("train/images/B/img001.jpg").exists());
        assert!(out.join("train/labels/A/img001.txt").exists());
        assert!(out.join("train/labels/B/img001.txt").exists());
    }

    #[test]
    fn test_skip_policy_keeps_first_image() {
        let dir = tempfile::tempdir().unwrap();
        let sources = colliding_sources(dir.path());
        let out = dir.path().join("out");
        let mut plan = cat_plan(&out);
        plan.collision_policy = CollisionPolicy::Skip;

        let outcome = merge_execute(&plan, &sources, None, None, None).unwrap();
        assert_eq!(outcome.summary().written, 1);
        assert_eq!(outcome.summary().skipped_collisions, 1);
        assert_eq!(file_names(&out.join("train/images")), vec!["img001.jpg"]);
        assert_eq!(
            fs::read_to_string(out.join("train/labels/img001.txt")).unwrap(),
            "0 0.500000 0.500000 0.200000 0.200000\n"
        );
    }

    #[test]
    fn test_remap_drop_and_empty_images() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("A");
        write_image(&a, "train", "mixed.jpg", Some("3 0.1 0.1 0.1 0.1\n5 0.2 0.2 0.2 0.2\n9 0.3 0.3 0.3 0.3\n"));
        write_image(&a, "train", "dropped.jpg", Some("5 0.2 0.2 0.2 0.2\n"));
        write_image(&a, "val", "nolabel.jpg", None);
        let sources = vec![DatasetRepository::open("A", &a)];

        let out = dir.path().join("out");
        let mut plan = MergePlan::new(
            "m",
            &out,
            vec![TargetClass::new(0, "person"), TargetClass::new(1, "car")],
        );
        plan.mapping.insert(EdgeKey::new("A", 3), Some(1));
        plan.mapping.insert(EdgeKey::new("A", 5), None);

        let outcome = merge_execute(&plan, &sources, None, None, None).unwrap();
        assert_eq!(outcome.summary().written, 1);
        assert_eq!(outcome.summary().skipped_empty, 2);
        assert_eq!(
            fs::read_to_string(out.join("train/labels/mixed.txt")).unwrap(),
            "1 0.100000 0.100000 0.100000 0.100000\n"
        );
        assert!(!out.join("train/images/dropped.jpg").exists());
        assert!(!out.join("val/images/nolabel.jpg").exists());

        // Keeping empty images writes them with an empty label file.
        let out2 = dir.path().join("out2");
        plan.output_dir = out2.clone();
        plan.drop_empty_images = false;
        let outcome = merge_execute(&plan, &sources, None, None, None).unwrap();
        assert_eq!(outcome.summary().written, 3);
        assert_eq!(fs::read_to_string(out2.join("val/labels/nolabel.txt")).unwrap(), "");
    }

    #[test]
    fn test_selection_filters_and_progress_counts_everything() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("A");
        let keep = write_image(&a, "train", "keep.jpg", Some("0 0.5 0.5 0.1 0.1\n"));
        write_image(&a, "train", "other.jpg", Some("0 0.5 0.5 0.1 0.1\n"));
        write_image(&a, "test", "third.jpg", Some("0 0.5 0.5 0.1 0.1\n"));
        let sources = vec![DatasetRepository::open("A", &a)];

        let out = dir.path().join("out");
        let mut plan = MergePlan::new("m", &out, vec![TargetClass::new(0, "cat")]);
        plan.mapping.insert(EdgeKey::new("A", 0), Some(0));

        let selection: BTreeSet<ImageKey> = [ImageKey::new("A", keep)].into_iter().collect();
        let mut seen = Vec::new();
        let mut cb = |p: &Progress| seen.push((p.value, p.total));

        let outcome =
            merge_execute(&plan, &sources, Some(&selection), Some(&mut cb), None).unwrap();
        assert_eq!(outcome.summary().written, 1);
        assert_eq!(outcome.summary().skipped_unselected, 2);
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
        assert_eq!(file_names(&out.join("train/images")), vec!["keep.jpg"]);
        assert!(file_names(&out.join("test/images")).is_empty());
    }

    #[test]
    fn test_flatten_and_renamed_splits() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("A");
        write_image(&a, "train", "t.jpg", Some("0 0.5 0.5 0.1 0.1\n"));
        write_image(&a, "valid", "v.jpg", Some("0 0.5 0.5 0.1 0.1\n"));
        let sources = vec![DatasetRepository::open("A", &a)];

        let out = dir.path().join("keep");
        let mut plan = MergePlan::new("m", &out, vec![TargetClass::new(0, "cat")]);
        plan.mapping.insert(EdgeKey::new("A", 0), Some(0));
        plan.split_names.val = "validation".to_string();
        merge_execute(&plan, &sources, None, None, None).unwrap();
        assert!(out.join("validation/images/v.jpg").exists());
        assert!(out.join("test/images").is_dir());

        let flat = dir.path().join("flat");
        plan.output_dir = flat.clone();
        plan.split_strategy = SplitStrategy::Flatten;
        merge_execute(&plan, &sources, None, None, None).unwrap();
        assert_eq!(file_names(&flat.join("train/images")), vec!["t.jpg", "v.jpg"]);
    }

    #[test]
    fn test_cancelled_run_stops_before_next_image() {
        let dir = tempfile::tempdir().unwrap();
        let sources = colliding_sources(dir.path());
        let out = dir.path().join("out");
        let plan = cat_plan(&out);

        let token = CancelToken::new();
        let handle = token.clone();
        let mut cb = move |p: &Progress| {
            if p.value == 1 {
                handle.cancel();
            }
        };
        let outcome = merge_execute(&plan, &sources, None, Some(&mut cb), Some(&token)).unwrap();

        assert!(outcome.is_cancelled());
        assert_eq!(outcome.summary().written, 1);
        assert_eq!(file_names(&out.join("train/images")), vec!["img001.jpg"]);
        assert!(!out.join("data.yaml").exists());
    }

    #[test]
    fn test_manifest_written_on_completion() {
        let dir = tempfile::tempdir().unwrap();
        let sources = colliding_sources(dir.path());
        let out = dir.path().join("out");
        merge_execute(&cat_plan(&out), &sources, None, None, None).unwrap();

        let manifest = read_data_yaml(&out.join("data.yaml")).unwrap();
        assert_eq!(manifest.names, vec!["cat"]);
        assert_eq!(manifest.nc, 1);
    }

    #[test]
    fn test_missing_source_image_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("A");
        let ghost = root.join("train/images/ghost.jpg");
        let label = root.join("train/labels/ghost.txt");
        fs::create_dir_all(label.parent().unwrap()).unwrap();
        fs::write(&label, "0 0.5 0.5 0.1 0.1\n").unwrap();

        let mut splits = SplitMap::new();
        splits.insert("train".to_string(), vec![ghost]);
        let sources = vec![DatasetRepository::from_splits("A", splits)];

        let out = dir.path().join("out");
        let result = merge_execute(&cat_plan(&out), &sources, None, None, None);
        assert!(result.is_err());
    }

    #[test]
    fn test_hardlink_mode_shares_content() {
        let dir = tempfile::tempdir().unwrap();
        let sources = colliding_sources(dir.path());
        let out = dir.path().join("out");
        let mut plan = cat_plan(&out);
        plan.copy_mode = CopyMode::Hardlink;

        let outcome = merge_execute(&plan, &sources, None, None, None).unwrap();
        let summary = outcome.summary();
        assert_eq!(summary.hardlinked + summary.copied, 2);
        assert_eq!(
            fs::read(out.join("train/images/img001.jpg")).unwrap(),
            fs::read(dir.path().join("A/train/images/img001.jpg")).unwrap()
        );
    }
}

use indexmap::IndexMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::core::operations::get_label_path_for_image;

/// Image extensions picked up when scanning a dataset.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "webp", "tif", "tiff"];

/// Split folder names probed on disk, in probe order.
const SPLIT_DIR_NAMES: [&str; 5] = ["train", "val", "valid", "eval", "test"];

/// Ordered split name -> image paths.
pub type SplitMap = IndexMap<String, Vec<PathBuf>>;

/// A resolved, read-only dataset the merge engine can pull images from.
pub trait DatasetSource {
    /// Unique id used in mappings, keys and rename suffixes.
    fn id(&self) -> &str;

    /// Split name -> image paths, in iteration order.
    fn splits(&self) -> &SplitMap;

    /// Label file for an image. The file may not exist.
    fn label_path_for(&self, image_path: &Path) -> PathBuf;

    fn image_count(&self) -> usize {
        self.splits().values().map(Vec::len).sum()
    }
}

/// Dataset rooted at a directory, laid out as YOLO `images/` + `labels/`.
#[derive(Debug, Clone)]
pub struct DatasetRepository {
    id: String,
    splits: SplitMap,
}

impl DatasetRepository {
    /// Wrap an already resolved layout.
    pub fn from_splits(id: impl Into<String>, splits: SplitMap) -> Self {
        Self {
            id: id.into(),
            splits,
        }
    }

    /// Resolve the layout under `root` by trying each known strategy in turn.
    ///
    /// An unrecognised layout yields an empty repository rather than an error;
    /// it simply contributes no images.
    pub fn open(id: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        let id = id.into();
        let root = root.into();

        for strategy in LayoutStrategy::ordered() {
            if let Some(splits) = strategy.try_resolve(&root) {
                let count: usize = splits.values().map(Vec::len).sum();
                info!(
                    "Dataset '{}' resolved as {:?} layout: {} images in {} splits",
                    id,
                    strategy,
                    count,
                    splits.len()
                );
                return Self::from_splits(id, splits);
            }
        }

        warn!("No known layout found for dataset '{}' at {:?}", id, root);
        Self::from_splits(id, SplitMap::new())
    }
}

impl DatasetSource for DatasetRepository {
    fn id(&self) -> &str {
        &self.id
    }

    fn splits(&self) -> &SplitMap {
        &self.splits
    }

    fn label_path_for(&self, image_path: &Path) -> PathBuf {
        get_label_path_for_image(image_path)
    }
}

/// Known on-disk layouts, tried in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutStrategy {
    /// `<root>/<split>/images/**`
    SplitThenImages,
    /// `<root>/images/<split>/**`
    ImagesThenSplit,
    /// `<root>/<split>/*.jpg`
    FlatSplit,
}

impl LayoutStrategy {
    pub fn ordered() -> [LayoutStrategy; 3] {
        [
            LayoutStrategy::SplitThenImages,
            LayoutStrategy::ImagesThenSplit,
            LayoutStrategy::FlatSplit,
        ]
    }

    /// Resolve the split map, or `None` if this layout finds no images.
    pub fn try_resolve(&self, root: &Path) -> Option<SplitMap> {
        let mut splits = SplitMap::new();

        for split in SPLIT_DIR_NAMES {
            let images = match self {
                LayoutStrategy::SplitThenImages => {
                    scan_images_recursive(&root.join(split).join("images"))
                }
                LayoutStrategy::ImagesThenSplit => {
                    scan_images_recursive(&root.join("images").join(split))
                }
                LayoutStrategy::FlatSplit => scan_images_flat(&root.join(split)),
            };
            if !images.is_empty() {
                splits.insert(split.to_string(), images);
            }
        }

        if splits.is_empty() {
            None
        } else {
            Some(splits)
        }
    }
}

pub fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| {
            let ext = ext.to_string_lossy().to_lowercase();
            IMAGE_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

fn scan_images_recursive(dir: &Path) -> Vec<PathBuf> {
    if !dir.is_dir() {
        return Vec::new();
    }
    let mut images: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| match entry {
            Ok(entry) => Some(entry),
            Err(e) => {
                debug!("Skipping unreadable entry under {:?}: {}", dir, e);
                None
            }
        })
        .filter(|entry| entry.file_type().is_file() && is_image(entry.path()))
        .map(|entry| entry.into_path())
        .collect();
    images.sort();
    images.dedup();
    images
}

fn scan_images_flat(dir: &Path) -> Vec<PathBuf> {
    let Ok(entries) = fs::read_dir(dir) else {
        return Vec::new();
    };
    let mut images: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_image(path))
        .collect();
    images.sort();
    images
}

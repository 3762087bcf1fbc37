use std::ffi::OsString;
use std::fs;
use std::path::{Component, Path, PathBuf};
use tracing::{debug, trace};

use super::hashing::{posix_string, short_hex_digest};
use crate::error::{IoContext, MergeResult};

/// What `hardlink_or_copy` ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkOutcome {
    /// A hard link was created
    Linked,
    /// The bytes were copied
    Copied,
    /// Destination already existed, nothing was written
    AlreadyPresent,
}

/// Create a directory and all missing parents.
pub fn safe_mkdirs(dir: &Path) -> MergeResult<()> {
    fs::create_dir_all(dir).with_path(dir)
}

/// Place `src` at `dst`, preferring a hard link.
///
/// # Arguments
/// * `src` - Source file path
/// * `dst` - Destination file path
/// * `prefer_hardlink` - Try `fs::hard_link` first
///
/// # Returns
/// * `Ok(LinkOutcome::AlreadyPresent)` if `dst` exists; it is never overwritten
/// * `Ok(LinkOutcome::Linked)` / `Ok(LinkOutcome::Copied)` otherwise
/// * `Err(MergeError::Io)` if the copy itself failed
///
/// A failed hard link (cross-device, permissions, unsupported filesystem)
/// silently falls back to a byte copy.
pub fn hardlink_or_copy(src: &Path, dst: &Path, prefer_hardlink: bool) -> MergeResult<LinkOutcome> {
    if let Some(parent) = dst.parent() {
        safe_mkdirs(parent)?;
    }
    if dst.exists() {
        trace!("Destination already present: {:?}", dst);
        return Ok(LinkOutcome::AlreadyPresent);
    }

    if prefer_hardlink {
        match fs::hard_link(src, dst) {
            Ok(()) => return Ok(LinkOutcome::Linked),
            Err(e) => debug!("Hard link {:?} -> {:?} failed ({}), copying instead", src, dst, e),
        }
    }

    fs::copy(src, dst).with_path(dst)?;
    copy_timestamps(src, dst);
    Ok(LinkOutcome::Copied)
}

/// Carry access/modification times over to a copied file. Best effort:
/// permissions are already preserved by `fs::copy`.
fn copy_timestamps(src: &Path, dst: &Path) {
    let Ok(meta) = fs::metadata(src) else {
        return;
    };
    let mut times = fs::FileTimes::new();
    if let Ok(accessed) = meta.accessed() {
        times = times.set_accessed(accessed);
    }
    if let Ok(modified) = meta.modified() {
        times = times.set_modified(modified);
    }
    let result = fs::OpenOptions::new()
        .write(true)
        .open(dst)
        .and_then(|file| file.set_times(times));
    if let Err(e) = result {
        debug!("Could not preserve timestamps on {:?}: {}", dst, e);
    }
}

/// Write `contents` to `path` through a sibling `.tmp` file and a rename,
/// so readers never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> MergeResult<()> {
    if let Some(parent) = path.parent() {
        safe_mkdirs(parent)?;
    }
    let tmp = tmp_sibling(path);
    fs::write(&tmp, contents).with_path(&tmp)?;
    fs::rename(&tmp, path).with_path(path)
}

fn tmp_sibling(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Lowercase alphanumerics, everything else becomes `-`, trimmed of dashes.
pub fn slugify(raw: &str) -> String {
    let slug: String = raw
        .chars()
        .flat_map(|ch| {
            if ch.is_alphanumeric() {
                ch.to_lowercase().collect::<Vec<_>>()
            } else {
                vec!['-']
            }
        })
        .collect();
    slug.trim_matches('-').to_string()
}

/// Suffix of the form `__<slug>_<10 hex chars>` for a source file.
pub fn hashed_suffix(src: &Path, dataset_id: &str) -> String {
    let digest = short_hex_digest(&format!("{}:{}", dataset_id, posix_string(src)));
    format!("__{}_{}", slugify(dataset_id), digest)
}

/// Return `dst` if it is free, otherwise a deterministic alternative name
/// derived from the dataset id and source path.
///
/// `img001.jpg` coming from dataset `B` becomes `img001__b_<hash>.jpg`, and the
/// same source always maps to the same renamed file.
pub fn resolve_collision_name(dst: &Path, src: &Path, dataset_id: &str) -> PathBuf {
    if !dst.exists() {
        return dst.to_path_buf();
    }
    with_hashed_suffix(dst, src, dataset_id)
}

/// `dst` with the deterministic `__<slug>_<hash>` suffix inserted before
/// its extension, whether or not `dst` exists.
pub fn with_hashed_suffix(dst: &Path, src: &Path, dataset_id: &str) -> PathBuf {
    let stem = dst
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let ext = dst
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    dst.with_file_name(format!("{}{}{}", stem, hashed_suffix(src, dataset_id), ext))
}

/// Get the corresponding label file path for an image file path.
///
/// The last `images` directory component (any case) becomes `labels`, and
/// `Image` becomes `Labels`; the extension changes to `.txt`. Images that do
/// not live under such a directory use a sibling `.txt` file.
pub fn get_label_path_for_image(image_path: &Path) -> PathBuf {
    let components: Vec<Component> = image_path.components().collect();
    let dir_count = components.len().saturating_sub(1);

    for i in (0..dir_count).rev() {
        let Component::Normal(name) = components[i] else {
            continue;
        };
        let replacement = match name.to_str() {
            Some("Image") => "Labels",
            Some(n) if n.eq_ignore_ascii_case("images") => "labels",
            _ => continue,
        };
        let mut label_path = PathBuf::new();
        for (j, component) in components.iter().enumerate() {
            if j == i {
                label_path.push(replacement);
            } else {
                label_path.push(component.as_os_str());
            }
        }
        return label_path.with_extension("txt");
    }

    image_path.with_extension("txt")
}

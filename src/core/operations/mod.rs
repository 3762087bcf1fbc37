mod file_ops;
mod hashing;

pub use file_ops::{
    get_label_path_for_image, hardlink_or_copy, hashed_suffix, resolve_collision_name,
    safe_mkdirs, slugify, with_hashed_suffix, write_atomic, LinkOutcome,
};
pub use hashing::{posix_string, short_hex_digest, stable_int_key, DEFAULT_SEED};

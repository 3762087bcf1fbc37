use std::path::Path;

use blake2::digest::consts::{U5, U8};
use blake2::{Blake2s, Digest};

type Blake2s64 = Blake2s<U8>;
type Blake2s40 = Blake2s<U5>;

/// Seed used when a plan does not specify one.
pub const DEFAULT_SEED: u64 = 1337;

/// Compute a stable 64-bit key from string parts and a seed.
///
/// The parts are hashed in order, followed by the decimal representation of
/// the seed, with BLAKE2s truncated to an 8-byte digest and read big-endian.
/// The same inputs give the same key on every platform and every run, which
/// is what makes seeded sampling reproducible.
pub fn stable_int_key<S: AsRef<str>>(parts: &[S], seed: u64) -> u64 {
    let mut hasher = Blake2s64::new();
    for part in parts {
        hasher.update(part.as_ref().as_bytes());
    }
    hasher.update(seed.to_string().as_bytes());

    let digest = hasher.finalize();
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest);
    u64::from_be_bytes(bytes)
}

/// Short hex digest (10 chars) used to tag renamed files.
pub fn short_hex_digest(input: &str) -> String {
    let digest = Blake2s40::digest(input.as_bytes());
    hex::encode(digest)
}

/// Render a path with forward slashes so keys do not depend on the host OS.
pub fn posix_string(path: &Path) -> String {
    let raw = path.to_string_lossy();
    if cfg!(windows) {
        raw.replace('\\', "/")
    } else {
        raw.into_owned()
    }
}

use std::path::{Path, PathBuf};

/// Result type for merge operations
pub type MergeResult<T> = Result<T, MergeError>;

/// Error types for merge planning and execution.
///
/// Malformed labels and quota shortfalls are not errors; they are skipped
/// or reported as warnings. Only configuration problems and filesystem
/// failures end up here.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid merge plan: {0}")]
    InvalidPlan(String),

    #[error("Output directory {0:?} is not empty")]
    OutputNotEmpty(PathBuf),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

impl MergeError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        MergeError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }
}

/// Attach a path to a raw `io::Result`.
pub(crate) trait IoContext<T> {
    fn with_path(self, path: impl AsRef<Path>) -> MergeResult<T>;
}

impl<T> IoContext<T> for std::io::Result<T> {
    fn with_path(self, path: impl AsRef<Path>) -> MergeResult<T> {
        self.map_err(|e| MergeError::io(path, e))
    }
}

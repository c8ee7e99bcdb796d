//! Error types.

use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum PlacematchError {
    #[error("Wrapped anyhow error: {0}")]
    AnyhowError(#[from] anyhow::Error),
    #[error("Wrapped polars error: {0}")]
    PolarsError(#[from] polars::error::PolarsError),
    #[error("Missing column '{column}' in {path}")]
    MissingColumn { column: String, path: PathBuf },
    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(PathBuf),
    #[error("Review file not found: {0}. Run `match` and review the file first.")]
    MissingReviewFile(PathBuf),
    #[error("Review file already exists: {0}. Refusing to overwrite manual corrections.")]
    ReviewFileExists(PathBuf),
    #[error("Rows per chunk must be greater than zero")]
    InvalidChunkSize,
    #[error("Upload of '{key}' failed with status {status}: {body}")]
    UploadFailed {
        key: String,
        status: u16,
        body: String,
    },
    #[error("No [storage] section in configuration")]
    MissingStorageConfig,
}

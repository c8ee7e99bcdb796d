use placematch::error::PlacematchError;
use polars::error::PolarsError;

#[derive(thiserror::Error, Debug)]
pub enum PlacematchCliError {
    #[error("Anyhow error: {0}")]
    Anyhow(#[from] anyhow::Error),
    #[error("polars error: {0}")]
    PolarsError(#[from] PolarsError),
    #[error("placematch error: {0}")]
    PlacematchError(#[from] PlacematchError),
    #[error("std IO error: {0}")]
    IOError(#[from] std::io::Error),
}

pub type PlacematchCliResult<T> = Result<T, PlacematchCliError>;

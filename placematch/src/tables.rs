//! Reading and writing the tabular files the pipeline consumes and produces.

use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, info};
use polars::prelude::*;

use crate::error::PlacematchError;

/// Read a `.csv` or `.parquet` table.
///
/// When `infer_types` is false, CSV columns are all read as strings so that codes such as `012`
/// survive unchanged.
pub fn read_table(path: &Path, infer_types: bool) -> Result<DataFrame> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_ascii_lowercase);
    debug!("Reading table '{}'", path.display());
    match extension.as_deref() {
        Some("csv") => {
            let infer_schema_length = if infer_types { Some(100) } else { Some(0) };
            CsvReadOptions::default()
                .with_has_header(true)
                .with_infer_schema_length(infer_schema_length)
                .try_into_reader_with_file_path(Some(path.to_path_buf()))?
                .finish()
                .with_context(|| format!("Failed to read '{}'", path.display()))
        }
        Some("parquet") => {
            let file = File::open(path)
                .with_context(|| format!("Failed to open '{}'", path.display()))?;
            ParquetReader::new(file)
                .finish()
                .with_context(|| format!("Failed to read '{}'", path.display()))
        }
        _ => Err(PlacematchError::UnsupportedFormat(path.to_path_buf()).into()),
    }
}

/// A column coerced to strings, or an all-null string column when it is absent.
pub fn text_column(df: &DataFrame, name: &str) -> PolarsResult<Series> {
    match df.column(name) {
        Ok(series) => series.cast(&DataType::String),
        Err(_) => Ok(Series::full_null(name, df.height(), &DataType::String)),
    }
}

/// Same as `text_column` but absence is an error.
pub fn required_text_column(df: &DataFrame, name: &str, path: &Path) -> Result<Series> {
    if df.column(name).is_err() {
        return Err(PlacematchError::MissingColumn {
            column: name.to_string(),
            path: path.to_path_buf(),
        }
        .into());
    }
    Ok(text_column(df, name)?)
}

/// Trimmed value, or `None` when blank.
pub fn non_blank(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_owned)
}

pub fn write_csv(path: &Path, df: &mut DataFrame) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file =
        File::create(path).with_context(|| format!("Failed to create '{}'", path.display()))?;
    CsvWriter::new(&mut file).finish(df)?;
    info!("Wrote {} rows to '{}'", df.height(), path.display());
    Ok(())
}

/// Write `df` as `<stem>_000.csv`, `<stem>_001.csv`, ... with at most `rows_per_chunk` rows each.
/// An empty frame still produces one file holding the header.
pub fn write_chunked_csv(
    df: &DataFrame,
    dir: &Path,
    stem: &str,
    rows_per_chunk: usize,
) -> Result<Vec<PathBuf>> {
    if rows_per_chunk == 0 {
        return Err(PlacematchError::InvalidChunkSize.into());
    }
    let offsets: Vec<usize> = if df.height() == 0 {
        vec![0]
    } else {
        (0..df.height()).step_by(rows_per_chunk).collect()
    };
    offsets
        .into_iter()
        .enumerate()
        .map(|(idx, offset)| {
            let path = dir.join(format!("{stem}_{idx:03}.csv"));
            let mut chunk = df.slice(offset as i64, rows_per_chunk);
            write_csv(&path, &mut chunk)?;
            Ok(path)
        })
        .collect()
}

//! Variable dictionary: a description of every column of every survey year file.

use anyhow::Result;
use log::{info, warn};
use polars::prelude::*;

use crate::{config::SurveyConfig, tables::read_table, COL};

#[derive(Clone, Debug, PartialEq)]
pub struct VariableSummary {
    pub year: i32,
    pub file: String,
    pub variable: String,
    pub dtype: String,
    pub non_null: u64,
    pub unique_values: u64,
    pub example: Option<String>,
}

fn summarize(year: i32, file: &str, series: &Series) -> PolarsResult<VariableSummary> {
    let values = series.drop_nulls();
    let example = values
        .cast(&DataType::String)?
        .str()?
        .into_iter()
        .flatten()
        .next()
        .map(str::to_owned);
    Ok(VariableSummary {
        year,
        file: file.to_string(),
        variable: series.name().to_string(),
        dtype: series.dtype().to_string(),
        non_null: values.len() as u64,
        unique_values: values.n_unique()? as u64,
        example,
    })
}

/// Summaries of every column of the survey files present on disk, with inferred types.
pub fn variable_summaries(config: &SurveyConfig) -> Result<Vec<VariableSummary>> {
    let mut summaries = vec![];
    for &year in &config.years {
        let path = config.path_for_year(year);
        if !path.exists() {
            warn!("No survey file for {year} at '{}'", path.display());
            continue;
        }
        let df = read_table(&path, true)?;
        let file = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        for series in df.get_columns() {
            summaries.push(summarize(year, &file, series)?);
        }
    }
    info!("Described {} survey variables", summaries.len());
    Ok(summaries)
}

pub fn dictionary_to_df(summaries: &[VariableSummary]) -> PolarsResult<DataFrame> {
    let text = |name: &str, f: fn(&VariableSummary) -> &str| {
        Series::new(name, summaries.iter().map(f).collect::<Vec<_>>())
    };
    DataFrame::new(vec![
        Series::new(
            COL::YEAR,
            summaries.iter().map(|s| s.year).collect::<Vec<_>>(),
        ),
        text(COL::DICTIONARY_FILE, |s| s.file.as_str()),
        text(COL::DICTIONARY_VARIABLE, |s| s.variable.as_str()),
        text(COL::DICTIONARY_DTYPE, |s| s.dtype.as_str()),
        Series::new(
            COL::DICTIONARY_NON_NULL,
            summaries.iter().map(|s| s.non_null).collect::<Vec<_>>(),
        ),
        Series::new(
            COL::DICTIONARY_UNIQUE,
            summaries.iter().map(|s| s.unique_values).collect::<Vec<_>>(),
        ),
        Series::new(
            COL::DICTIONARY_EXAMPLE,
            summaries
                .iter()
                .map(|s| s.example.as_deref())
                .collect::<Vec<_>>(),
        ),
    ])
}

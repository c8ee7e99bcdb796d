//! Extraction of the location fields from the yearly survey files.

use anyhow::Result;
use itertools::izip;
use log::{debug, info, warn};
use polars::prelude::*;

use crate::{
    config::{SurveyColumns, SurveyConfig},
    normalize::{normalize, NormalizedName},
    tables::read_table,
    COL,
};

/// Output columns holding the location fields, in table order.
const LOCATION_FIELDS: [&str; 7] = [
    COL::OBSERVATORY_CODE,
    COL::OBSERVATORY_NAME,
    COL::MUNICIPALITY_CODE,
    COL::MUNICIPALITY_RAW,
    COL::VILLAGE_CODE,
    COL::VILLAGE_NAME,
    COL::SITE_CODE,
];

/// One distinct combination of location fields reported in a survey year, with the number of
/// survey rows that reported it.
#[derive(Clone, Debug, PartialEq)]
pub struct LocationRecord {
    pub observatory_code: Option<String>,
    pub observatory_name: Option<String>,
    pub municipality_code: Option<String>,
    pub municipality_raw: Option<String>,
    pub municipality_normalized: Option<NormalizedName>,
    pub village_code: Option<String>,
    pub village_name: Option<String>,
    pub site_code: Option<String>,
    pub year: i32,
    pub occurrences: u64,
}

/// The fields a location record is expected to be unique on.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NaturalKey {
    pub observatory_code: Option<String>,
    pub municipality_raw: Option<String>,
    pub village_name: Option<String>,
    pub site_code: Option<String>,
    pub year: i32,
}

impl LocationRecord {
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            observatory_code: self.observatory_code.clone(),
            municipality_raw: self.municipality_raw.clone(),
            village_name: self.village_name.clone(),
            site_code: self.site_code.clone(),
            year: self.year,
        }
    }

    /// Build records from a frame produced by `extract_locations`, normalizing the municipality.
    pub fn from_df(df: &DataFrame) -> Result<Vec<Self>> {
        let years = df.column(COL::YEAR)?.cast(&DataType::Int32)?;
        let occurrences = df.column(COL::OCCURRENCES)?.cast(&DataType::UInt64)?;
        let records = izip!(
            df.column(COL::OBSERVATORY_CODE)?.str()?,
            df.column(COL::OBSERVATORY_NAME)?.str()?,
            df.column(COL::MUNICIPALITY_CODE)?.str()?,
            df.column(COL::MUNICIPALITY_RAW)?.str()?,
            df.column(COL::VILLAGE_CODE)?.str()?,
            df.column(COL::VILLAGE_NAME)?.str()?,
            df.column(COL::SITE_CODE)?.str()?,
            years.i32()?,
            occurrences.u64()?,
        )
        .map(
            |(
                observatory_code,
                observatory_name,
                municipality_code,
                municipality_raw,
                village_code,
                village_name,
                site_code,
                year,
                occurrences,
            )| LocationRecord {
                observatory_code: observatory_code.map(str::to_owned),
                observatory_name: observatory_name.map(str::to_owned),
                municipality_code: municipality_code.map(str::to_owned),
                municipality_raw: municipality_raw.map(str::to_owned),
                municipality_normalized: municipality_raw.map(normalize),
                village_code: village_code.map(str::to_owned),
                village_name: village_name.map(str::to_owned),
                site_code: site_code.map(str::to_owned),
                year: year.unwrap_or_default(),
                occurrences: occurrences.unwrap_or_default(),
            },
        )
        .collect();
        Ok(records)
    }
}

/// Select the location fields of one survey year under their output names. A mapped column that
/// the file lacks becomes an all-null column.
fn select_location_fields(df: DataFrame, columns: &SurveyColumns, year: i32) -> LazyFrame {
    let sources = [
        &columns.observatory_code,
        &columns.observatory_name,
        &columns.municipality_code,
        &columns.municipality_name,
        &columns.village_code,
        &columns.village_name,
        &columns.site_code,
    ];
    let mut exprs: Vec<Expr> = sources
        .iter()
        .zip(LOCATION_FIELDS)
        .map(|(source, target)| {
            if df.column(source).is_ok() {
                col(source).cast(DataType::String).alias(target)
            } else {
                warn!("Survey {year} has no column '{source}', {target} will be empty");
                lit(NULL).cast(DataType::String).alias(target)
            }
        })
        .collect();
    exprs.push(lit(year).alias(COL::YEAR));
    df.lazy().select(exprs)
}

fn empty_locations() -> PolarsResult<DataFrame> {
    let mut columns: Vec<Series> = LOCATION_FIELDS
        .iter()
        .map(|name| Series::new_empty(name, &DataType::String))
        .collect();
    columns.push(Series::new_empty(COL::YEAR, &DataType::Int32));
    columns.push(Series::new_empty(COL::OCCURRENCES, &DataType::UInt64));
    DataFrame::new(columns)
}

/// Read every configured survey year and return the distinct location rows with their
/// occurrence counts. Years without a file are skipped.
pub fn extract_locations(config: &SurveyConfig) -> Result<DataFrame> {
    let mut frames: Vec<LazyFrame> = vec![];
    for &year in &config.years {
        let path = config.path_for_year(year);
        if !path.exists() {
            warn!(
                "No survey file for {year} at '{}', skipping year",
                path.display()
            );
            continue;
        }
        info!("Reading survey {year} from '{}'", path.display());
        let df = read_table(&path, false)?;
        debug!("Survey {year} has shape {:?}", df.shape());
        frames.push(select_location_fields(
            df,
            config.columns_for_year(year),
            year,
        ));
    }
    if frames.is_empty() {
        warn!("No survey files found in '{}'", config.dir.display());
        return Ok(empty_locations()?);
    }

    let keys: Vec<Expr> = LOCATION_FIELDS
        .iter()
        .map(|name| col(name))
        .chain(std::iter::once(col(COL::YEAR)))
        .collect();
    let locations = concat(frames, UnionArgs::default())?
        .group_by_stable(keys)
        .agg([len().cast(DataType::UInt64).alias(COL::OCCURRENCES)])
        .collect()?;
    info!("Extracted locations with shape: {:?}", locations.shape());
    Ok(locations)
}

/// Convert records back to a frame, including the normalized municipality name.
pub fn locations_to_df(records: &[LocationRecord]) -> PolarsResult<DataFrame> {
    let text = |name: &str, f: fn(&LocationRecord) -> Option<&str>| {
        Series::new(name, records.iter().map(f).collect::<Vec<_>>())
    };
    DataFrame::new(vec![
        text(COL::OBSERVATORY_CODE, |r| r.observatory_code.as_deref()),
        text(COL::OBSERVATORY_NAME, |r| r.observatory_name.as_deref()),
        text(COL::MUNICIPALITY_CODE, |r| r.municipality_code.as_deref()),
        text(COL::MUNICIPALITY_RAW, |r| r.municipality_raw.as_deref()),
        text(COL::MUNICIPALITY_NORMALIZED, |r| {
            r.municipality_normalized.as_ref().map(NormalizedName::as_str)
        }),
        text(COL::VILLAGE_CODE, |r| r.village_code.as_deref()),
        text(COL::VILLAGE_NAME, |r| r.village_name.as_deref()),
        text(COL::SITE_CODE, |r| r.site_code.as_deref()),
        Series::new(COL::YEAR, records.iter().map(|r| r.year).collect::<Vec<_>>()),
        Series::new(
            COL::OCCURRENCES,
            records.iter().map(|r| r.occurrences).collect::<Vec<_>>(),
        ),
    ])
}

/// Wide table of survey rows per observatory (rows) and year (columns).
pub fn survey_counts(locations: &DataFrame, years: &[i32]) -> Result<DataFrame> {
    let mut aggs = vec![col(COL::OBSERVATORY_NAME)
        .drop_nulls()
        .first()
        .alias(COL::OBSERVATORY_NAME)];
    aggs.extend(years.iter().map(|year| {
        col(COL::OCCURRENCES)
            .filter(col(COL::YEAR).eq(lit(*year)))
            .sum()
            .alias(&year.to_string())
    }));
    Ok(locations
        .clone()
        .lazy()
        .group_by([col(COL::OBSERVATORY_CODE)])
        .agg(aggs)
        .sort([COL::OBSERVATORY_CODE], SortMultipleOptions::default())
        .collect()?)
}

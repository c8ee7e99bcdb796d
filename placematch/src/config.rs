use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Placeholder substituted with the survey year in `SurveyConfig::file_pattern`.
pub const YEAR_PLACEHOLDER: &str = "{year}";

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub survey: SurveyConfig,
    pub gazetteer: GazetteerConfig,
    pub matching: MatchingConfig,
    pub output: OutputConfig,
    /// Only required by the `upload` command.
    pub storage: Option<StorageConfig>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SurveyConfig {
    pub dir: PathBuf,
    /// File name of a survey year, e.g. `res_deb_{year}.csv`. The extension selects the reader.
    pub file_pattern: String,
    pub years: Vec<i32>,
    pub columns: SurveyColumns,
    /// Column mappings for years whose files use different variable names. Keyed by year.
    pub column_overrides: BTreeMap<String, SurveyColumns>,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("data/survey"),
            file_pattern: format!("res_deb_{YEAR_PLACEHOLDER}.csv"),
            years: (1995..=2015).collect(),
            columns: SurveyColumns::default(),
            column_overrides: BTreeMap::new(),
        }
    }
}

impl SurveyConfig {
    pub fn path_for_year(&self, year: i32) -> PathBuf {
        self.dir
            .join(self.file_pattern.replace(YEAR_PLACEHOLDER, &year.to_string()))
    }

    pub fn columns_for_year(&self, year: i32) -> &SurveyColumns {
        self.column_overrides
            .get(&year.to_string())
            .unwrap_or(&self.columns)
    }
}

/// Names of the survey variables holding each location field.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct SurveyColumns {
    pub observatory_code: String,
    pub observatory_name: String,
    pub municipality_code: String,
    pub municipality_name: String,
    pub village_code: String,
    pub village_name: String,
    pub site_code: String,
}

impl Default for SurveyColumns {
    fn default() -> Self {
        Self {
            observatory_code: "j0".into(),
            observatory_name: "j0_name".into(),
            municipality_code: "j4".into(),
            municipality_name: "j4_name".into(),
            village_code: "j5".into(),
            village_name: "j5_name".into(),
            site_code: "j42".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct GazetteerConfig {
    /// `.csv` or `.parquet` file at the finest subdivision level.
    pub path: PathBuf,
    pub name_column: String,
    pub id_column: String,
    pub district_column: String,
    pub region_column: String,
    pub province_column: String,
    /// Optional WKT boundary column, needed for GeoJSON output.
    pub geometry_column: String,
}

impl Default for GazetteerConfig {
    fn default() -> Self {
        // GADM level 4 field names
        Self {
            path: PathBuf::from("data/gadm41_MDG_4.csv"),
            name_column: "NAME_4".into(),
            id_column: "GID_4".into(),
            district_column: "NAME_3".into(),
            region_column: "NAME_2".into(),
            province_column: "NAME_1".into(),
            geometry_column: "geometry".into(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MatchingConfig {
    /// Key candidates by observatory as well as municipality name, since the same reported name
    /// can designate different municipalities in different observatories.
    pub by_observatory: bool,
    /// Candidates with a relative distance above this percentage are exported for review.
    pub review_threshold: f64,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            by_observatory: true,
            review_threshold: 0.0,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct OutputConfig {
    pub dir: PathBuf,
    pub rows_per_chunk: usize,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("output"),
            rows_per_chunk: 1000,
        }
    }
}

impl OutputConfig {
    pub fn path(&self, file_name: &str) -> PathBuf {
        self.dir.join(file_name)
    }

    pub fn review_file(&self) -> PathBuf {
        self.path(paths::REVIEW)
    }
}

/// Names of the files written under `OutputConfig::dir`.
pub mod paths {
    pub const LOCATIONS: &str = "locations.csv";
    pub const CANDIDATES: &str = "match_candidates.csv";
    pub const REVIEW: &str = "match_review.csv";
    pub const MERGED: &str = "locations_matched.csv";
    pub const MERGED_GEOJSON: &str = "locations_matched.geojson";
    pub const DUPLICATES: &str = "duplicates.csv";
    pub const COUNTS: &str = "survey_counts.csv";
    pub const DICTIONARY_STEM: &str = "variable_dictionary";
}

/// Object storage settings. Passed explicitly to `storage::BlobUploader`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// e.g. `https://<account>.blob.core.windows.net`
    pub account_url: String,
    pub container: String,
    /// Shared access signature, without the leading `?`.
    pub sas_token: Option<String>,
    /// Files larger than this are uploaded as a list of blocks of this size.
    pub block_size: usize,
    pub prefix: Option<String>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            account_url: String::new(),
            container: String::new(),
            sas_token: None,
            block_size: 8 * 1024 * 1024,
            prefix: None,
        }
    }
}

impl StorageConfig {
    /// Object key for a local file, honouring the configured prefix.
    pub fn key_for(&self, path: &Path, prefix: Option<&str>) -> String {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_default();
        match prefix.or(self.prefix.as_deref()) {
            Some(prefix) if !prefix.is_empty() => {
                format!("{}/{file_name}", prefix.trim_end_matches('/'))
            }
            _ => file_name,
        }
    }
}

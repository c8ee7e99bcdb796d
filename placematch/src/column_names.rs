//! This module stores the column names of the tables produced by the pipeline. Source column
//! names (survey variables, gazetteer fields) are configurable and live in `config` instead.

pub const YEAR: &str = "year";
pub const OCCURRENCES: &str = "occurrences";

pub const OBSERVATORY_CODE: &str = "observatory_code";
pub const OBSERVATORY_NAME: &str = "observatory_name";
pub const MUNICIPALITY_CODE: &str = "municipality_code";
pub const MUNICIPALITY_RAW: &str = "municipality_raw";
pub const MUNICIPALITY_NORMALIZED: &str = "municipality_normalized";
pub const VILLAGE_CODE: &str = "village_code";
pub const VILLAGE_NAME: &str = "village_name";
pub const SITE_CODE: &str = "site_code";

pub const MATCH_NAME: &str = "match_name";
pub const MATCH_ID: &str = "match_id";
pub const DISTANCE: &str = "distance";
pub const RELATIVE_DISTANCE: &str = "relative_distance";
pub const TIED_MATCHES: &str = "tied_matches";
pub const MATCH_METHOD: &str = "match_method";

pub const CORRECTED_NAME: &str = "corrected_name";
pub const CORRECTED_ID: &str = "corrected_id";
pub const CORRECTION_SOURCE: &str = "correction_source";

pub const GAZETTEER_NAME: &str = "gazetteer_name";
pub const GAZETTEER_ID: &str = "gazetteer_id";
pub const DISTRICT: &str = "district";
pub const REGION: &str = "region";
pub const PROVINCE: &str = "province";
pub const GEOMETRY: &str = "geometry";

pub const DUPLICATE_STAGE: &str = "duplicate_stage";
pub const DUPLICATE_GROUP: &str = "duplicate_group";

pub const DICTIONARY_FILE: &str = "file";
pub const DICTIONARY_VARIABLE: &str = "variable";
pub const DICTIONARY_DTYPE: &str = "dtype";
pub const DICTIONARY_NON_NULL: &str = "non_null";
pub const DICTIONARY_UNIQUE: &str = "unique_values";
pub const DICTIONARY_EXAMPLE: &str = "example";

//! Approximate matching of normalized survey names against the gazetteer.
//!
//! Every distinct query is compared with every reference using the Levenshtein distance and the
//! nearest reference is kept. Ties are broken by reference order: the first reference at the
//! minimum distance wins.

use std::collections::{BTreeMap, BTreeSet};

use log::{debug, info, warn};
use polars::prelude::*;

use crate::{
    gazetteer::Gazetteer,
    normalize::{normalize, NormalizedName},
    survey::LocationRecord,
    COL,
};

/// Character based edit distance.
pub fn levenshtein(a: &NormalizedName, b: &NormalizedName) -> usize {
    strsim::levenshtein(a.as_str(), b.as_str())
}

/// `100 * distance / chars(query)`. Undefined for an empty query.
pub fn relative_distance(distance: usize, query: &NormalizedName) -> Option<f64> {
    let len = query.char_len();
    (len > 0).then(|| 100.0 * distance as f64 / len as f64)
}

/// Position of the smallest value, the number of values sharing it, and the value itself.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ArgMin {
    pub index: usize,
    pub distance: usize,
    pub ties: usize,
}

/// Argmin keeping the first index on ties.
fn stable_argmin(values: impl IntoIterator<Item = usize>) -> Option<ArgMin> {
    values
        .into_iter()
        .enumerate()
        .fold(None, |best: Option<ArgMin>, (index, distance)| match best {
            Some(best) if distance > best.distance => Some(best),
            Some(best) if distance == best.distance => Some(ArgMin {
                ties: best.ties + 1,
                ..best
            }),
            _ => Some(ArgMin {
                index,
                distance,
                ties: 1,
            }),
        })
}

/// Distances between `n` queries (rows) and `m` references (columns).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DistanceMatrix {
    rows: usize,
    columns: usize,
    cells: Vec<usize>,
}

impl DistanceMatrix {
    pub fn compute(queries: &[NormalizedName], references: &[NormalizedName]) -> Self {
        let cells = queries
            .iter()
            .flat_map(|query| references.iter().map(|reference| levenshtein(query, reference)))
            .collect();
        Self {
            rows: queries.len(),
            columns: references.len(),
            cells,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.columns)
    }

    pub fn get(&self, row: usize, column: usize) -> Option<usize> {
        (row < self.rows && column < self.columns)
            .then(|| self.cells[row * self.columns + column])
    }

    pub fn row(&self, row: usize) -> &[usize] {
        if row >= self.rows {
            return &[];
        }
        &self.cells[row * self.columns..(row + 1) * self.columns]
    }

    /// Nearest reference for a query.
    pub fn row_argmin(&self, row: usize) -> Option<ArgMin> {
        stable_argmin(self.row(row).iter().copied())
    }

    /// Nearest query for a reference. Not the inverse of `row_argmin` in general.
    pub fn column_argmin(&self, column: usize) -> Option<ArgMin> {
        if column >= self.columns {
            return None;
        }
        stable_argmin((0..self.rows).map(|row| self.cells[row * self.columns + column]))
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct NearestMatch {
    /// Index into the reference slice.
    pub reference: usize,
    pub distance: usize,
    pub relative_distance: f64,
    /// Number of references at the minimum distance, including the chosen one.
    pub ties: usize,
}

/// Nearest reference for each query, in query order. Empty queries and an empty reference set
/// give `None`.
pub fn nearest_matches(
    queries: &[NormalizedName],
    references: &[NormalizedName],
) -> Vec<Option<NearestMatch>> {
    let matrix = DistanceMatrix::compute(queries, references);
    debug!("Computed distance matrix of shape {:?}", matrix.shape());
    queries
        .iter()
        .enumerate()
        .map(|(row, query)| {
            let argmin = matrix.row_argmin(row)?;
            let relative_distance = relative_distance(argmin.distance, query)?;
            Some(NearestMatch {
                reference: argmin.index,
                distance: argmin.distance,
                relative_distance,
                ties: argmin.ties,
            })
        })
        .collect()
}

/// Key a candidate is looked up by: the observatory (when matching by observatory) and the
/// municipality name as reported.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MatchKey {
    pub observatory_code: Option<String>,
    pub municipality: String,
}

impl MatchKey {
    pub fn new(observatory_code: Option<&str>, municipality: &str) -> Self {
        Self {
            observatory_code: observatory_code.map(str::to_owned),
            municipality: municipality.to_string(),
        }
    }

    pub fn for_record(record: &LocationRecord, by_observatory: bool) -> Self {
        Self {
            observatory_code: record
                .observatory_code
                .clone()
                .filter(|_| by_observatory),
            municipality: record.municipality_raw.clone().unwrap_or_default(),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    Automatic {
        distance: usize,
        relative_distance: f64,
        ties: usize,
    },
    /// Empty name or empty gazetteer.
    Unmatched,
    /// Overridden by a reviewer. Distances no longer apply.
    Manual { source: Option<String> },
}

impl Resolution {
    pub fn method(&self) -> &'static str {
        match self {
            Resolution::Automatic { .. } => "automatic",
            Resolution::Unmatched => "unmatched",
            Resolution::Manual { .. } => "manual",
        }
    }

    pub fn distance(&self) -> Option<usize> {
        match self {
            Resolution::Automatic { distance, .. } => Some(*distance),
            _ => None,
        }
    }

    pub fn relative_distance(&self) -> Option<f64> {
        match self {
            Resolution::Automatic {
                relative_distance, ..
            } => Some(*relative_distance),
            _ => None,
        }
    }

    pub fn ties(&self) -> Option<usize> {
        match self {
            Resolution::Automatic { ties, .. } => Some(*ties),
            _ => None,
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Resolution::Manual { source } => source.as_deref(),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MatchCandidate {
    pub key: MatchKey,
    pub normalized: NormalizedName,
    pub gazetteer_name: Option<String>,
    pub gazetteer_id: Option<String>,
    pub resolution: Resolution,
}

/// Match every distinct key of `records` against the gazetteer. Each distinct normalized name is
/// matched once. Candidates are returned sorted by key.
pub fn match_locations(
    records: &[LocationRecord],
    gazetteer: &Gazetteer,
    by_observatory: bool,
) -> Vec<MatchCandidate> {
    let keys: BTreeMap<MatchKey, NormalizedName> = records
        .iter()
        .map(|record| {
            let normalized = record
                .municipality_normalized
                .clone()
                .unwrap_or_else(|| normalize(""));
            (MatchKey::for_record(record, by_observatory), normalized)
        })
        .collect();
    let queries: Vec<NormalizedName> = keys
        .values()
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    if gazetteer.is_empty() {
        warn!("Gazetteer is empty, every location will be unmatched");
    }
    info!(
        "Matching {} distinct names from {} keys against {} gazetteer units",
        queries.len(),
        keys.len(),
        gazetteer.len()
    );
    let nearest: BTreeMap<&NormalizedName, Option<NearestMatch>> = queries
        .iter()
        .zip(nearest_matches(&queries, &gazetteer.names()))
        .collect();

    keys.into_iter()
        .map(|(key, normalized)| {
            let matched = nearest.get(&normalized).copied().flatten().and_then(|m| {
                gazetteer.get(m.reference).map(|entry| (m, entry))
            });
            match matched {
                Some((m, entry)) => MatchCandidate {
                    key,
                    gazetteer_name: Some(entry.normalized.to_string()),
                    gazetteer_id: Some(entry.id.clone()),
                    resolution: Resolution::Automatic {
                        distance: m.distance,
                        relative_distance: m.relative_distance,
                        ties: m.ties,
                    },
                    normalized,
                },
                None => {
                    debug!("No match for {key:?}");
                    MatchCandidate {
                        key,
                        normalized,
                        gazetteer_name: None,
                        gazetteer_id: None,
                        resolution: Resolution::Unmatched,
                    }
                }
            }
        })
        .collect()
}

pub fn candidates_to_df(candidates: &[MatchCandidate]) -> PolarsResult<DataFrame> {
    DataFrame::new(vec![
        Series::new(
            COL::OBSERVATORY_CODE,
            candidates
                .iter()
                .map(|c| c.key.observatory_code.as_deref())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            COL::MUNICIPALITY_RAW,
            candidates
                .iter()
                .map(|c| c.key.municipality.as_str())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            COL::MUNICIPALITY_NORMALIZED,
            candidates
                .iter()
                .map(|c| c.normalized.as_str())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            COL::MATCH_NAME,
            candidates
                .iter()
                .map(|c| c.gazetteer_name.as_deref())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            COL::MATCH_ID,
            candidates
                .iter()
                .map(|c| c.gazetteer_id.as_deref())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            COL::DISTANCE,
            candidates
                .iter()
                .map(|c| c.resolution.distance().map(|d| d as u64))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            COL::RELATIVE_DISTANCE,
            candidates
                .iter()
                .map(|c| c.resolution.relative_distance())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            COL::TIED_MATCHES,
            candidates
                .iter()
                .map(|c| c.resolution.ties().map(|t| t as u64))
                .collect::<Vec<_>>(),
        ),
        Series::new(
            COL::MATCH_METHOD,
            candidates
                .iter()
                .map(|c| c.resolution.method())
                .collect::<Vec<_>>(),
        ),
        Series::new(
            COL::CORRECTION_SOURCE,
            candidates
                .iter()
                .map(|c| c.resolution.source())
                .collect::<Vec<_>>(),
        ),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gazetteer::GazetteerEntry;

    fn names(raw: &[&str]) -> Vec<NormalizedName> {
        raw.iter().map(|name| normalize(name)).collect()
    }

    fn record(observatory: &str, municipality: &str, year: i32) -> LocationRecord {
        LocationRecord {
            observatory_code: Some(observatory.to_string()),
            observatory_name: None,
            municipality_code: None,
            municipality_raw: Some(municipality.to_string()),
            municipality_normalized: Some(normalize(municipality)),
            village_code: None,
            village_name: None,
            site_code: None,
            year,
            occurrences: 1,
        }
    }

    #[test]
    fn exact_match_should_have_zero_distance() {
        let references = names(&["AMBANO", "AMBOHIMAHASOA"]);
        let matches = nearest_matches(&names(&["AMBANO"]), &references);
        assert_eq!(
            matches,
            vec![Some(NearestMatch {
                reference: 0,
                distance: 0,
                relative_distance: 0.0,
                ties: 1,
            })]
        );
    }

    #[test]
    fn equal_strings_should_have_zero_distance() {
        for raw in ["AMBANO", "FERAMANGA AVARATRA", "Î", "A"] {
            let name = normalize(raw);
            assert_eq!(levenshtein(&name, &name), 0);
            assert_eq!(relative_distance(0, &name), Some(0.0));
        }
    }

    #[test]
    fn relative_distance_should_scale_by_query_length() {
        let query = normalize("AMBANA");
        let reference = normalize("AMBANO");
        assert_eq!(levenshtein(&query, &reference), 1);
        let relative = relative_distance(1, &query).unwrap();
        assert!((relative - 100.0 / 6.0).abs() < 1e-9);
        // Unbounded when the reference is much longer than the query
        assert_eq!(relative_distance(12, &normalize("AB")), Some(600.0));
    }

    #[test]
    fn ties_should_resolve_to_first_reference() {
        let query = names(&["AMBANO"]);
        let matches = nearest_matches(&query, &names(&["AMBANA", "AMBANE"]));
        assert_eq!(matches[0].map(|m| (m.reference, m.ties)), Some((0, 2)));
        let matches = nearest_matches(&query, &names(&["AMBANE", "AMBANA"]));
        assert_eq!(matches[0].map(|m| (m.reference, m.ties)), Some((0, 2)));
    }

    #[test]
    fn row_and_column_argmin_can_differ() {
        let matrix =
            DistanceMatrix::compute(&names(&["AMBANO", "AMBANA"]), &names(&["AMBANA", "ZZZZ"]));
        assert_eq!(matrix.shape(), (2, 2));
        assert_eq!(matrix.get(0, 0), Some(1));
        assert_eq!(matrix.get(1, 0), Some(0));
        assert_eq!(matrix.get(2, 0), None);
        // AMBANO's nearest reference is AMBANA, but AMBANA's nearest query is AMBANA itself
        assert_eq!(matrix.row_argmin(0).map(|a| a.index), Some(0));
        assert_eq!(matrix.column_argmin(0).map(|a| a.index), Some(1));
    }

    #[test]
    fn empty_inputs_should_be_unmatched() {
        let matches = nearest_matches(&names(&["", "AMBANO"]), &names(&["AMBANO"]));
        assert_eq!(matches[0], None);
        assert!(matches[1].is_some());
        assert_eq!(nearest_matches(&names(&["AMBANO"]), &[]), vec![None]);
        assert!(nearest_matches(&[], &names(&["AMBANO"])).is_empty());
    }

    #[test]
    fn locations_should_be_matched_once_per_key() {
        let gazetteer = Gazetteer::new(vec![
            GazetteerEntry::new("Ambano", "MDG.1_1"),
            GazetteerEntry::new("Ambohimahasoa", "MDG.2_1"),
        ]);
        let records = vec![
            record("1", "Ambano", 2000),
            record("1", "Ambano", 2001),
            record("2", "ambano", 2000),
            record("2", "Ambohimahasoa Centre", 2000),
            record("3", "", 2000),
        ];
        let candidates = match_locations(&records, &gazetteer, true);
        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0].key, MatchKey::new(Some("1"), "Ambano"));
        assert_eq!(candidates[0].gazetteer_id.as_deref(), Some("MDG.1_1"));
        assert_eq!(candidates[0].gazetteer_name.as_deref(), Some("AMBANO"));
        assert_eq!(candidates[0].resolution.distance(), Some(0));
        assert_eq!(
            candidates[1].key,
            MatchKey::new(Some("2"), "Ambohimahasoa Centre")
        );
        assert_eq!(candidates[1].gazetteer_id.as_deref(), Some("MDG.2_1"));
        assert_eq!(candidates[2].gazetteer_id.as_deref(), Some("MDG.1_1"));
        assert_eq!(candidates[3].resolution, Resolution::Unmatched);

        let without_observatory = match_locations(&records, &gazetteer, false);
        assert_eq!(without_observatory.len(), 4);
        assert!(without_observatory
            .iter()
            .all(|c| c.key.observatory_code.is_none()));

        let df = candidates_to_df(&candidates).unwrap();
        assert_eq!(df.shape(), (4, 10));
        assert_eq!(df.column(COL::DISTANCE).unwrap().null_count(), 1);
    }

    #[test]
    fn empty_gazetteer_should_leave_everything_unmatched() {
        let candidates =
            match_locations(&[record("1", "Ambano", 2000)], &Gazetteer::default(), true);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].resolution, Resolution::Unmatched);
        assert_eq!(candidates[0].gazetteer_name, None);
    }
}

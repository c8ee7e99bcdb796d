//! Joining resolved matches back onto the location records, and the duplicate key report.

use std::collections::{BTreeMap, HashMap};

use log::{info, warn};
use nonempty::NonEmpty;
use polars::prelude::*;

use crate::{
    gazetteer::{Gazetteer, GazetteerEntry},
    matcher::{MatchCandidate, MatchKey},
    normalize::normalize,
    survey::{locations_to_df, LocationRecord},
    COL,
};

/// A location record with its resolved match, if any, and the gazetteer unit the match points to.
#[derive(Clone, Debug, PartialEq)]
pub struct MergedRecord {
    pub location: LocationRecord,
    pub candidate: Option<MatchCandidate>,
    pub entry: Option<GazetteerEntry>,
}

impl From<LocationRecord> for MergedRecord {
    fn from(location: LocationRecord) -> Self {
        Self {
            location,
            candidate: None,
            entry: None,
        }
    }
}

fn lookup_entry(candidate: &MatchCandidate, gazetteer: &Gazetteer) -> Option<GazetteerEntry> {
    let entry = candidate
        .gazetteer_id
        .as_deref()
        .and_then(|id| gazetteer.by_id(id))
        .or_else(|| {
            candidate
                .gazetteer_name
                .as_deref()
                .and_then(|name| gazetteer.by_name(&normalize(name)))
        });
    if entry.is_none() && candidate.gazetteer_name.is_some() {
        warn!(
            "Match {:?} / {:?} for {:?} is not in the gazetteer",
            candidate.gazetteer_name, candidate.gazetteer_id, candidate.key
        );
    }
    entry.cloned()
}

/// Left join of the records onto the candidates by key. Every record is kept, in order.
pub fn merge_locations(
    records: &[LocationRecord],
    candidates: &[MatchCandidate],
    gazetteer: &Gazetteer,
    by_observatory: bool,
) -> Vec<MergedRecord> {
    let resolved: HashMap<&MatchKey, (&MatchCandidate, Option<GazetteerEntry>)> = candidates
        .iter()
        .map(|candidate| (&candidate.key, (candidate, lookup_entry(candidate, gazetteer))))
        .collect();
    let merged: Vec<MergedRecord> = records
        .iter()
        .map(|record| {
            let key = MatchKey::for_record(record, by_observatory);
            match resolved.get(&key) {
                Some((candidate, entry)) => MergedRecord {
                    location: record.clone(),
                    candidate: Some((*candidate).clone()),
                    entry: entry.clone(),
                },
                None => MergedRecord::from(record.clone()),
            }
        })
        .collect();
    info!(
        "Merged {} location records, {} with a gazetteer unit",
        merged.len(),
        merged.iter().filter(|row| row.entry.is_some()).count()
    );
    merged
}

/// Groups of two or more rows sharing a key but not all identical, in key order. Rows keep their
/// input order within a group.
pub fn find_duplicates<T, K>(rows: &[T], key: impl Fn(&T) -> K) -> Vec<NonEmpty<T>>
where
    T: Clone + PartialEq,
    K: Ord,
{
    let mut groups: BTreeMap<K, Vec<T>> = BTreeMap::new();
    for row in rows {
        groups.entry(key(row)).or_default().push(row.clone());
    }
    groups
        .into_values()
        .filter(|group| group.len() > 1 && group.iter().any(|row| row != &group[0]))
        .filter_map(NonEmpty::from_vec)
        .collect()
}

/// Rows sharing a natural key, before and after the merge. Reported, never collapsed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DuplicateReport {
    pub pre_merge: Vec<NonEmpty<LocationRecord>>,
    pub post_merge: Vec<NonEmpty<MergedRecord>>,
}

impl DuplicateReport {
    pub fn check(records: &[LocationRecord], merged: &[MergedRecord]) -> Self {
        let report = Self {
            pre_merge: find_duplicates(records, LocationRecord::natural_key),
            post_merge: find_duplicates(merged, |row| row.location.natural_key()),
        };
        if !report.is_empty() {
            warn!(
                "Found {} duplicate keys before merging and {} after",
                report.pre_merge.len(),
                report.post_merge.len()
            );
        }
        report
    }

    pub fn is_empty(&self) -> bool {
        self.pre_merge.is_empty() && self.post_merge.is_empty()
    }

    /// Merged columns plus the stage (`pre_merge` or `post_merge`) and group number of each row.
    pub fn to_df(&self) -> PolarsResult<DataFrame> {
        let mut rows: Vec<MergedRecord> = vec![];
        let mut stages: Vec<&str> = vec![];
        let mut groups: Vec<u32> = vec![];
        for (idx, group) in self.pre_merge.iter().enumerate() {
            for record in group.iter() {
                rows.push(MergedRecord::from(record.clone()));
                stages.push("pre_merge");
                groups.push(idx as u32);
            }
        }
        for (idx, group) in self.post_merge.iter().enumerate() {
            for row in group.iter() {
                rows.push(row.clone());
                stages.push("post_merge");
                groups.push(idx as u32);
            }
        }
        let mut df = merged_to_df(&rows, false)?;
        df.with_column(Series::new(COL::DUPLICATE_STAGE, stages))?;
        df.with_column(Series::new(COL::DUPLICATE_GROUP, groups))?;
        Ok(df)
    }
}

/// Location columns followed by the match and the gazetteer parents. The WKT geometry column is
/// only added when `include_geometry` is set.
pub fn merged_to_df(rows: &[MergedRecord], include_geometry: bool) -> PolarsResult<DataFrame> {
    let locations: Vec<LocationRecord> = rows.iter().map(|row| row.location.clone()).collect();
    let mut df = locations_to_df(&locations)?;

    let candidate_text = |name: &str, f: fn(&MatchCandidate) -> Option<&str>| {
        Series::new(
            name,
            rows.iter()
                .map(|row| row.candidate.as_ref().and_then(f))
                .collect::<Vec<_>>(),
        )
    };
    let entry_text = |name: &str, f: fn(&GazetteerEntry) -> Option<&str>| {
        Series::new(
            name,
            rows.iter()
                .map(|row| row.entry.as_ref().and_then(f))
                .collect::<Vec<_>>(),
        )
    };
    let mut columns = vec![
        candidate_text(COL::MATCH_NAME, |c| c.gazetteer_name.as_deref()),
        candidate_text(COL::MATCH_ID, |c| c.gazetteer_id.as_deref()),
        candidate_text(COL::MATCH_METHOD, |c| Some(c.resolution.method())),
        Series::new(
            COL::DISTANCE,
            rows.iter()
                .map(|row| {
                    row.candidate
                        .as_ref()
                        .and_then(|c| c.resolution.distance())
                        .map(|d| d as u64)
                })
                .collect::<Vec<_>>(),
        ),
        Series::new(
            COL::RELATIVE_DISTANCE,
            rows.iter()
                .map(|row| {
                    row.candidate
                        .as_ref()
                        .and_then(|c| c.resolution.relative_distance())
                })
                .collect::<Vec<_>>(),
        ),
        candidate_text(COL::CORRECTION_SOURCE, |c| c.resolution.source()),
        entry_text(COL::GAZETTEER_NAME, |e| Some(e.name.as_str())),
        entry_text(COL::DISTRICT, |e| e.district.as_deref()),
        entry_text(COL::REGION, |e| e.region.as_deref()),
        entry_text(COL::PROVINCE, |e| e.province.as_deref()),
    ];
    if include_geometry {
        columns.push(entry_text(COL::GEOMETRY, |e| e.geometry.as_deref()));
    }
    for column in columns {
        df.with_column(column)?;
    }
    Ok(df)
}

//! Human review of automatic matches.
//!
//! Phase one writes the low-confidence candidates to a CSV file with three empty `corrected_*`
//! columns. A reviewer fills them in and phase two reads the edited file back and overlays the
//! corrections on the candidates by key.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::Result;
use itertools::izip;
use log::{info, warn};
use polars::prelude::*;

use crate::{
    error::PlacematchError,
    gazetteer::{Gazetteer, GazetteerEntry},
    matcher::{candidates_to_df, MatchCandidate, MatchKey, Resolution},
    normalize::normalize,
    tables::{non_blank, read_table, required_text_column, text_column, write_csv},
    COL,
};

/// Columns of the review file, in order.
pub const REVIEW_COLUMNS: [&str; 11] = [
    COL::OBSERVATORY_CODE,
    COL::MUNICIPALITY_RAW,
    COL::MUNICIPALITY_NORMALIZED,
    COL::MATCH_NAME,
    COL::MATCH_ID,
    COL::DISTANCE,
    COL::RELATIVE_DISTANCE,
    COL::TIED_MATCHES,
    COL::CORRECTED_NAME,
    COL::CORRECTED_ID,
    COL::CORRECTION_SOURCE,
];

/// A reviewer's decision for one key. A blank field is filled in from the unit the other field
/// points to, so name and identifier always refer to the same gazetteer unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Correction {
    pub key: MatchKey,
    pub gazetteer_name: Option<String>,
    pub gazetteer_id: Option<String>,
    pub source: Option<String>,
}

impl Correction {
    /// The unit the reviewer chose: by identifier when given, otherwise by name.
    pub fn entry<'a>(&self, gazetteer: &'a Gazetteer) -> Option<&'a GazetteerEntry> {
        match (&self.gazetteer_id, &self.gazetteer_name) {
            (Some(id), _) => gazetteer.by_id(id),
            (None, Some(name)) => gazetteer.by_name(&normalize(name)),
            (None, None) => None,
        }
    }

    fn apply(&self, candidate: &MatchCandidate, gazetteer: &Gazetteer) -> MatchCandidate {
        let entry = self.entry(gazetteer);
        if entry.is_none() {
            warn!(
                "Correction {:?} / {:?} for {:?} is not in the gazetteer",
                self.gazetteer_name, self.gazetteer_id, self.key
            );
        }
        MatchCandidate {
            gazetteer_name: self
                .gazetteer_name
                .clone()
                .or_else(|| entry.map(|e| e.normalized.as_str().to_string())),
            gazetteer_id: self
                .gazetteer_id
                .clone()
                .or_else(|| entry.map(|e| e.id.clone())),
            resolution: Resolution::Manual {
                source: self.source.clone(),
            },
            ..candidate.clone()
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct OverrideOutcome {
    pub candidates: Vec<MatchCandidate>,
    /// Number of candidates a correction was applied to.
    pub applied: usize,
    /// Corrections whose key matches no candidate.
    pub orphaned: Vec<Correction>,
}

/// Whether a candidate should be looked at by a reviewer.
pub fn needs_review(candidate: &MatchCandidate, threshold: f64) -> bool {
    match &candidate.resolution {
        Resolution::Unmatched => true,
        Resolution::Automatic {
            relative_distance, ..
        } => *relative_distance > threshold,
        Resolution::Manual { .. } => false,
    }
}

/// Candidates needing review, worst first: unmatched, then by decreasing relative distance.
pub fn review_frame(candidates: &[MatchCandidate], threshold: f64) -> PolarsResult<DataFrame> {
    let mut selected: Vec<MatchCandidate> = candidates
        .iter()
        .filter(|candidate| needs_review(candidate, threshold))
        .cloned()
        .collect();
    selected.sort_by(review_order);

    let blank = vec![None::<&str>; selected.len()];
    let mut df = candidates_to_df(&selected)?.select(&REVIEW_COLUMNS[..8])?;
    for name in &REVIEW_COLUMNS[8..] {
        df.with_column(Series::new(name, &blank))?;
    }
    Ok(df)
}

fn review_order(a: &MatchCandidate, b: &MatchCandidate) -> Ordering {
    let priority = |c: &MatchCandidate| c.resolution.relative_distance().unwrap_or(f64::INFINITY);
    priority(b)
        .total_cmp(&priority(a))
        .then_with(|| a.key.cmp(&b.key))
}

/// Write the review file. An existing file holds a reviewer's work and is only replaced when
/// `force` is set. Returns the number of rows written.
pub fn write_review_file(
    candidates: &[MatchCandidate],
    threshold: f64,
    path: &Path,
    force: bool,
) -> Result<usize> {
    if path.exists() && !force {
        return Err(PlacematchError::ReviewFileExists(path.to_path_buf()).into());
    }
    let mut df = review_frame(candidates, threshold)?;
    info!(
        "{} of {} candidates need review (relative distance > {threshold})",
        df.height(),
        candidates.len()
    );
    write_csv(path, &mut df)?;
    Ok(df.height())
}

/// Read the corrections from an edited review file. Rows without a corrected name or id are
/// ignored. When a key appears more than once the last row wins.
pub fn read_corrections(path: &Path, by_observatory: bool) -> Result<Vec<Correction>> {
    if !path.exists() {
        return Err(PlacematchError::MissingReviewFile(path.to_path_buf()).into());
    }
    let df = read_table(path, false)?;
    let observatories = required_text_column(&df, COL::OBSERVATORY_CODE, path)?;
    let municipalities = required_text_column(&df, COL::MUNICIPALITY_RAW, path)?;
    let names = required_text_column(&df, COL::CORRECTED_NAME, path)?;
    let ids = required_text_column(&df, COL::CORRECTED_ID, path)?;
    let sources = text_column(&df, COL::CORRECTION_SOURCE)?;

    let mut corrections: BTreeMap<MatchKey, Correction> = BTreeMap::new();
    for (observatory, municipality, name, id, source) in izip!(
        observatories.str()?,
        municipalities.str()?,
        names.str()?,
        ids.str()?,
        sources.str()?,
    ) {
        let (gazetteer_name, gazetteer_id) = (non_blank(name), non_blank(id));
        if gazetteer_name.is_none() && gazetteer_id.is_none() {
            continue;
        }
        let key = MatchKey::new(
            observatory.filter(|_| by_observatory),
            municipality.unwrap_or_default(),
        );
        let correction = Correction {
            key: key.clone(),
            gazetteer_name,
            gazetteer_id,
            source: non_blank(source),
        };
        if corrections.insert(key, correction).is_some() {
            warn!(
                "Several corrections for {:?} / '{}' in '{}', keeping the last one",
                observatory,
                municipality.unwrap_or_default(),
                path.display()
            );
        }
    }
    info!(
        "Read {} corrections from '{}'",
        corrections.len(),
        path.display()
    );
    Ok(corrections.into_values().collect())
}

/// Overlay corrections on the candidates by key. Applying the same corrections again gives the
/// same result.
pub fn apply_corrections(
    candidates: &[MatchCandidate],
    corrections: &[Correction],
    gazetteer: &Gazetteer,
) -> OverrideOutcome {
    let by_key: BTreeMap<&MatchKey, &Correction> = corrections
        .iter()
        .map(|correction| (&correction.key, correction))
        .collect();
    let mut applied = 0;
    let candidates: Vec<MatchCandidate> = candidates
        .iter()
        .map(|candidate| match by_key.get(&candidate.key) {
            Some(correction) => {
                applied += 1;
                correction.apply(candidate, gazetteer)
            }
            None => candidate.clone(),
        })
        .collect();

    let known: BTreeSet<&MatchKey> = candidates.iter().map(|c| &c.key).collect();
    let orphaned: Vec<Correction> = by_key
        .into_values()
        .filter(|correction| !known.contains(&correction.key))
        .cloned()
        .collect();
    for correction in &orphaned {
        warn!(
            "Correction for {:?} / '{}' matches no candidate and was not applied",
            correction.key.observatory_code, correction.key.municipality
        );
    }
    info!(
        "Applied {applied} corrections, {} orphaned",
        orphaned.len()
    );
    OverrideOutcome {
        candidates,
        applied,
        orphaned,
    }
}

use std::path::PathBuf;

use anyhow::{Context, Result};
use gazetteer::Gazetteer;
use log::{debug, info};
use matcher::MatchCandidate;
use merge::{DuplicateReport, MergedRecord};
use polars::frame::DataFrame;
use review::OverrideOutcome;
use survey::LocationRecord;

use crate::config::{paths, Config};

// Re-exports
pub use column_names as COL;

// Modules
pub mod column_names;
pub mod config;
pub mod dictionary;
pub mod error;
#[cfg(feature = "formatters")]
pub mod formatters;
pub mod gazetteer;
pub mod matcher;
pub mod merge;
pub mod normalize;
pub mod review;
pub mod storage;
pub mod survey;
pub mod tables;

/// Result of phase one.
#[derive(Debug)]
pub struct MatchPhase {
    pub candidates: Vec<MatchCandidate>,
    pub review_rows: usize,
    pub review_file: PathBuf,
}

/// Result of phase two.
#[derive(Debug)]
pub struct ResolvePhase {
    pub outcome: OverrideOutcome,
    pub merged: Vec<MergedRecord>,
    pub duplicates: DuplicateReport,
}

impl ResolvePhase {
    pub fn merged_df(&self, include_geometry: bool) -> Result<DataFrame> {
        Ok(merge::merged_to_df(&self.merged, include_geometry)?)
    }
}

/// Entry point to the reconciliation pipeline
pub struct Placematch {
    pub config: Config,
}

impl Placematch {
    pub fn new(config: Config) -> Self {
        debug!("config: {config:?}");
        Self { config }
    }

    /// Distinct location records of every survey year
    pub fn locations(&self) -> Result<Vec<LocationRecord>> {
        let df = survey::extract_locations(&self.config.survey)?;
        LocationRecord::from_df(&df)
    }

    pub fn gazetteer(&self) -> Result<Gazetteer> {
        Gazetteer::load(&self.config.gazetteer).with_context(|| {
            format!(
                "Failed to load gazetteer '{}'",
                self.config.gazetteer.path.display()
            )
        })
    }

    fn match_candidates(
        &self,
        records: &[LocationRecord],
        gazetteer: &Gazetteer,
    ) -> Vec<MatchCandidate> {
        matcher::match_locations(records, gazetteer, self.config.matching.by_observatory)
    }

    /// Extract, match and write the candidate table and the review file. An existing review file
    /// is only replaced when `force` is set.
    pub fn run_match_phase(&self, force: bool) -> Result<MatchPhase> {
        let records = self.locations()?;
        let gazetteer = self.gazetteer()?;
        let candidates = self.match_candidates(&records, &gazetteer);

        let review_file = self.config.output.review_file();
        let review_rows = review::write_review_file(
            &candidates,
            self.config.matching.review_threshold,
            &review_file,
            force,
        )?;
        let mut df = matcher::candidates_to_df(&candidates)?;
        tables::write_csv(&self.config.output.path(paths::CANDIDATES), &mut df)?;
        info!(
            "Wrote {review_rows} candidates for review to '{}'",
            review_file.display()
        );
        Ok(MatchPhase {
            candidates,
            review_rows,
            review_file,
        })
    }

    /// Read the reviewed file, redo the matching, apply the corrections, merge and write the
    /// duplicate report. The merged table is returned for the caller to write.
    pub fn run_resolve_phase(&self) -> Result<ResolvePhase> {
        let by_observatory = self.config.matching.by_observatory;
        let corrections =
            review::read_corrections(&self.config.output.review_file(), by_observatory)?;
        let records = self.locations()?;
        let gazetteer = self.gazetteer()?;
        let candidates = self.match_candidates(&records, &gazetteer);
        let outcome = review::apply_corrections(&candidates, &corrections, &gazetteer);

        let merged =
            merge::merge_locations(&records, &outcome.candidates, &gazetteer, by_observatory);
        let duplicates = DuplicateReport::check(&records, &merged);
        let mut df = duplicates.to_df()?;
        tables::write_csv(&self.config.output.path(paths::DUPLICATES), &mut df)?;
        Ok(ResolvePhase {
            outcome,
            merged,
            duplicates,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{GazetteerConfig, OutputConfig, SurveyConfig, YEAR_PLACEHOLDER},
        error::PlacematchError,
        matcher::Resolution,
    };
    use tempfile::TempDir;

    fn test_config(dir: &TempDir) -> Config {
        std::fs::write(
            dir.path().join("res_deb_2000.csv"),
            "j0,j0_name,j4,j4_name,j5,j5_name,j42\n\
             1,Antalaha,10,Ambano,101,Tsararano,A\n\
             1,Antalaha,11,FERAMANGA-AVARATRA,111,Ambodisatrana,B\n\
             1,Antalaha,11,FERAMANGA-AVARATRA,112,Ambodisatrana,B\n",
        )
        .unwrap();
        std::fs::write(
            dir.path().join("gadm.csv"),
            "GID_4,NAME_4,NAME_3,NAME_2,NAME_1\n\
             MDG.1_1,Ambano,Antsirabe II,Vakinankaratra,Antananarivo\n\
             MDG.2_1,Feramanga,Antalaha,Sava,Antsiranana\n\
             MDG.3_1,Ambandrika,Antalaha,Sava,Antsiranana\n",
        )
        .unwrap();
        Config {
            survey: SurveyConfig {
                dir: dir.path().to_path_buf(),
                file_pattern: format!("res_deb_{YEAR_PLACEHOLDER}.csv"),
                years: vec![2000],
                ..Default::default()
            },
            gazetteer: GazetteerConfig {
                path: dir.path().join("gadm.csv"),
                ..Default::default()
            },
            output: OutputConfig {
                dir: dir.path().join("output"),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn resolve_without_review_file_should_fail() {
        let dir = TempDir::new().unwrap();
        let placematch = Placematch::new(test_config(&dir));
        let err = placematch.run_resolve_phase().unwrap_err();
        assert!(matches!(
            err.downcast_ref::<PlacematchError>(),
            Some(PlacematchError::MissingReviewFile(_))
        ));
    }

    #[test]
    fn two_phases_should_apply_reviewed_corrections() -> anyhow::Result<()> {
        let dir = TempDir::new()?;
        let placematch = Placematch::new(test_config(&dir));

        let phase_one = placematch.run_match_phase(false)?;
        assert_eq!(phase_one.candidates.len(), 2);
        // Only FERAMANGA-AVARATRA is an inexact match
        assert_eq!(phase_one.review_rows, 1);
        assert!(placematch
            .config
            .output
            .path(paths::CANDIDATES)
            .exists());
        assert!(placematch.run_match_phase(false).is_err());

        // The reviewer fills in the correction columns
        let review = std::fs::read_to_string(&phase_one.review_file)?;
        let mut lines: Vec<String> = review.lines().map(str::to_owned).collect();
        assert_eq!(lines.len(), 2);
        lines[1] = format!(
            "{},AMBANDRIKA,MDG.3_1,field visit",
            lines[1].trim_end_matches(',')
        );
        std::fs::write(&phase_one.review_file, lines.join("\n"))?;

        let phase_two = placematch.run_resolve_phase()?;
        assert_eq!(phase_two.outcome.applied, 1);
        assert!(phase_two.outcome.orphaned.is_empty());
        assert_eq!(phase_two.merged.len(), 3);
        for row in &phase_two.merged[1..] {
            let candidate = row.candidate.as_ref().unwrap();
            assert_eq!(candidate.gazetteer_name.as_deref(), Some("AMBANDRIKA"));
            assert_eq!(
                candidate.resolution,
                Resolution::Manual {
                    source: Some("field visit".into())
                }
            );
            assert_eq!(
                row.entry.as_ref().and_then(|e| e.region.as_deref()),
                Some("Sava")
            );
        }
        // Same observatory, municipality, village, site and year but different village codes
        assert_eq!(phase_two.duplicates.pre_merge.len(), 1);
        assert!(placematch.config.output.path(paths::DUPLICATES).exists());
        assert_eq!(phase_two.merged_df(false)?.height(), 3);
        Ok(())
    }
}

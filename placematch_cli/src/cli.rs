use std::fs::File;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{command, Args, Parser, Subcommand};
use enum_dispatch::enum_dispatch;
use log::{debug, info};
use polars::frame::DataFrame;
use placematch::{
    config::{paths, Config},
    dictionary::{dictionary_to_df, variable_summaries},
    error::PlacematchError,
    formatters::{CSVFormatter, GeoJSONFormatter, OutputFormatter, OutputGenerator},
    storage::BlobUploader,
    survey::{extract_locations, locations_to_df, survey_counts, LocationRecord},
    tables::write_chunked_csv,
    Placematch,
};
use serde::{Deserialize, Serialize};
use spinners::{Spinner, Spinners};
use strum_macros::EnumString;

use crate::display::{display_counts, display_gazetteer, display_orphaned};
use crate::error::PlacematchCliResult;

const DEFAULT_PROGRESS_SPINNER: Spinners = Spinners::Dots;
const COMPLETE_PROGRESS_STRING: &str = "✔";
const RUNNING_TAIL_STRING: &str = "...";

/// Defines the output formats the merged table can be written in.
#[derive(Clone, Debug, Deserialize, Serialize, EnumString, PartialEq, Eq)]
#[strum(ascii_case_insensitive)]
pub enum OutputFormat {
    GeoJSON,
    Csv,
}

impl From<&OutputFormat> for OutputFormatter {
    fn from(value: &OutputFormat) -> Self {
        match value {
            OutputFormat::GeoJSON => OutputFormatter::GeoJSON(GeoJSONFormatter),
            OutputFormat::Csv => OutputFormatter::Csv(CSVFormatter),
        }
    }
}

fn write_output<T, U>(output_generator: T, mut data: DataFrame, output_file: U) -> PlacematchCliResult<()>
where
    T: OutputGenerator,
    U: AsRef<Path>,
{
    let output_file = output_file.as_ref();
    if let Some(parent) = output_file.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut f = File::create(output_file).context("Failed to write output")?;
    output_generator.save(&mut f, &mut data)?;
    println!("Wrote {} rows to '{}'", data.height(), output_file.display());
    Ok(())
}

fn start_spinner(quiet: bool, message: &str) -> Option<Spinner> {
    (!quiet).then(|| {
        Spinner::with_timer(
            DEFAULT_PROGRESS_SPINNER,
            message.to_string() + RUNNING_TAIL_STRING,
        )
    })
}

fn stop_spinner(sp: Option<Spinner>) {
    if let Some(mut s) = sp {
        s.stop_with_symbol(COMPLETE_PROGRESS_STRING);
    }
}

/// Trait that defines what to run when a given subcommand is invoked.
#[enum_dispatch]
pub trait RunCommand {
    async fn run(&self, config: Config) -> PlacematchCliResult<()>;
}

/// The `extract` command writes the distinct survey locations of every year.
#[derive(Args, Debug)]
pub struct ExtractCommand {
    #[arg(short = 'o', long, help = "Output file, defaults to the output directory")]
    output_file: Option<PathBuf>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ExtractCommand {
    async fn run(&self, config: Config) -> PlacematchCliResult<()> {
        info!("Running `extract` subcommand");
        let sp = start_spinner(self.quiet, "Extracting survey locations");
        let records = LocationRecord::from_df(&extract_locations(&config.survey)?)?;
        stop_spinner(sp);
        let output_file = self
            .output_file
            .clone()
            .unwrap_or_else(|| config.output.path(paths::LOCATIONS));
        write_output(CSVFormatter, locations_to_df(&records)?, output_file)
    }
}

/// The `gazetteer` command summarises the loaded gazetteer.
#[derive(Args, Debug)]
pub struct GazetteerCommand {
    #[arg(short = 'n', long, help = "Maximum number of units to show")]
    max: Option<usize>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for GazetteerCommand {
    async fn run(&self, config: Config) -> PlacematchCliResult<()> {
        info!("Running `gazetteer` subcommand");
        let sp = start_spinner(self.quiet, "Loading gazetteer");
        let gazetteer = Placematch::new(config).gazetteer()?;
        stop_spinner(sp);
        display_gazetteer(gazetteer.to_df()?, self.max)?;
        Ok(())
    }
}

/// The `match` command runs the first phase: extraction, matching and the review file.
#[derive(Args, Debug)]
pub struct MatchCommand {
    #[arg(
        long,
        default_value_t = false,
        help = "Overwrite an existing review file, discarding its corrections"
    )]
    force: bool,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for MatchCommand {
    async fn run(&self, config: Config) -> PlacematchCliResult<()> {
        info!("Running `match` subcommand");
        let sp = start_spinner(self.quiet, "Matching survey locations");
        let phase = Placematch::new(config).run_match_phase(self.force)?;
        stop_spinner(sp);
        println!(
            "Matched {} keys, {} need review.\nFill in the corrected columns of '{}' and run \
             `placematch resolve`.",
            phase.candidates.len(),
            phase.review_rows,
            phase.review_file.display()
        );
        Ok(())
    }
}

/// The `resolve` command runs the second phase on a reviewed file and writes the merged table.
#[derive(Args, Debug)]
pub struct ResolveCommand {
    #[arg(
        short = 'f',
        long,
        value_name = "csv|geojson",
        default_value = "csv",
        help = "Output format for the merged table"
    )]
    output_format: OutputFormat,
    #[arg(short = 'o', long, help = "Output file, defaults to the output directory")]
    output_file: Option<PathBuf>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for ResolveCommand {
    async fn run(&self, config: Config) -> PlacematchCliResult<()> {
        info!("Running `resolve` subcommand");
        let output_file = self.output_file.clone().unwrap_or_else(|| {
            config.output.path(match self.output_format {
                OutputFormat::GeoJSON => paths::MERGED_GEOJSON,
                OutputFormat::Csv => paths::MERGED,
            })
        });
        let sp = start_spinner(self.quiet, "Applying corrections and merging");
        let phase = Placematch::new(config).run_resolve_phase()?;
        stop_spinner(sp);
        debug!("{:?}", phase.outcome);

        println!(
            "Applied {} corrections. {} duplicate groups before merging, {} after.",
            phase.outcome.applied,
            phase.duplicates.pre_merge.len(),
            phase.duplicates.post_merge.len()
        );
        if !phase.outcome.orphaned.is_empty() {
            display_orphaned(&phase.outcome.orphaned);
        }
        let include_geometry = self.output_format == OutputFormat::GeoJSON;
        let formatter: OutputFormatter = (&self.output_format).into();
        write_output(formatter, phase.merged_df(include_geometry)?, output_file)
    }
}

/// The `counts` command tabulates survey rows per observatory and year.
#[derive(Args, Debug)]
pub struct CountsCommand {
    #[arg(short = 'o', long, help = "Write the table to a CSV file instead of printing it")]
    output_file: Option<PathBuf>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for CountsCommand {
    async fn run(&self, config: Config) -> PlacematchCliResult<()> {
        info!("Running `counts` subcommand");
        let sp = start_spinner(self.quiet, "Counting survey rows");
        let locations = extract_locations(&config.survey)?;
        let counts = survey_counts(&locations, &config.survey.years)?;
        stop_spinner(sp);
        match &self.output_file {
            Some(output_file) => write_output(CSVFormatter, counts, output_file)?,
            None => display_counts(&counts)?,
        }
        Ok(())
    }
}

/// The `dictionary` command describes every variable of every survey file.
#[derive(Args, Debug)]
pub struct DictionaryCommand {
    #[arg(long, help = "Rows per exported file, defaults to the configured value")]
    rows_per_chunk: Option<usize>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for DictionaryCommand {
    async fn run(&self, config: Config) -> PlacematchCliResult<()> {
        info!("Running `dictionary` subcommand");
        let sp = start_spinner(self.quiet, "Describing survey variables");
        let dictionary = dictionary_to_df(&variable_summaries(&config.survey)?)?;
        stop_spinner(sp);
        let files = write_chunked_csv(
            &dictionary,
            &config.output.dir,
            paths::DICTIONARY_STEM,
            self.rows_per_chunk.unwrap_or(config.output.rows_per_chunk),
        )?;
        println!(
            "Wrote {} variables to {} files in '{}'",
            dictionary.height(),
            files.len(),
            config.output.dir.display()
        );
        Ok(())
    }
}

/// The `upload` command sends local files to the configured object storage.
#[derive(Args, Debug)]
pub struct UploadCommand {
    #[arg(required = true, help = "Files to upload")]
    files: Vec<PathBuf>,
    #[arg(long, help = "Key prefix, overrides the configured one")]
    key_prefix: Option<String>,
    #[arg(from_global)]
    quiet: bool,
}

impl RunCommand for UploadCommand {
    async fn run(&self, config: Config) -> PlacematchCliResult<()> {
        info!("Running `upload` subcommand");
        let storage = config.storage.ok_or(PlacematchError::MissingStorageConfig)?;
        let uploader = BlobUploader::new(storage);
        for file in &self.files {
            let key = uploader
                .config()
                .key_for(file, self.key_prefix.as_deref());
            let sp = start_spinner(self.quiet, &format!("Uploading '{}'", file.display()));
            let summary = uploader.upload(file, &key).await?;
            stop_spinner(sp);
            println!(
                "Uploaded '{}' to '{}' ({} bytes)",
                file.display(),
                summary.key,
                summary.bytes
            );
        }
        Ok(())
    }
}

/// The entrypoint for the CLI.
#[derive(Parser, Debug)]
#[command(version, about="Placematch reconciles survey place names with an administrative gazetteer", long_about = None, name="placematch")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
    #[arg(
        short = 'c',
        long = "config",
        help = "Configuration file, defaults to `placematch/config.toml` in the user config directory",
        global = true
    )]
    pub config: Option<PathBuf>,
    #[arg(
        short = 'q',
        long = "quiet",
        help = "\
            Do not print progress bar to stdout. Results and logs (when `RUST_LOG`\n\
            is set) will still be printed.",
        global = true
    )]
    quiet: bool,
}

/// Subcommands of the CLI, each implementing [`RunCommand`]. `match` and `resolve` are the two
/// phases around the manual review.
#[derive(Subcommand, Debug)]
#[enum_dispatch(RunCommand)]
pub enum Commands {
    /// Write the distinct locations reported in the survey files
    Extract(ExtractCommand),
    /// Show the gazetteer units names are matched against
    Gazetteer(GazetteerCommand),
    /// Phase one: match locations and write the review file
    Match(MatchCommand),
    /// Phase two: apply the reviewed corrections and write the merged table
    Resolve(ResolveCommand),
    /// Count survey rows per observatory and year
    Counts(CountsCommand),
    /// Export a dictionary of the survey variables
    Dictionary(DictionaryCommand),
    /// Upload files to object storage
    Upload(UploadCommand),
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use placematch::config::{OutputConfig, SurveyConfig, YEAR_PLACEHOLDER};
    use tempfile::TempDir;

    use super::*;

    fn test_config(dir: &TempDir) -> Config {
        std::fs::write(
            dir.path().join("res_deb_2000.csv"),
            "j0,j0_name,j4,j4_name,j5,j5_name,j42\n\
             1,Antalaha,10,Ambano,101,Tsararano,A\n\
             2,Marovoay,20,Ambohimahasoa,201,Ampanavoana,B\n",
        )
        .unwrap();
        Config {
            survey: SurveyConfig {
                dir: dir.path().to_path_buf(),
                file_pattern: format!("res_deb_{YEAR_PLACEHOLDER}.csv"),
                years: vec![2000],
                ..Default::default()
            },
            output: OutputConfig {
                dir: dir.path().join("output"),
                rows_per_chunk: 4,
            },
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn extract_command_should_write_locations() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let output_file = config.output.path(paths::LOCATIONS);
        let command = ExtractCommand {
            output_file: None,
            quiet: true,
        };
        command.run(config).await.unwrap();
        let content = std::fs::read_to_string(output_file).unwrap();
        assert_eq!(content.lines().count(), 3);
        assert!(content.contains("AMBOHIMAHASOA"));
    }

    #[tokio::test]
    async fn counts_command_should_write_wide_table() {
        let dir = TempDir::new().unwrap();
        let output_file = dir.path().join("counts.csv");
        let command = CountsCommand {
            output_file: Some(output_file.clone()),
            quiet: true,
        };
        command.run(test_config(&dir)).await.unwrap();
        let content = std::fs::read_to_string(output_file).unwrap();
        assert_eq!(content.lines().next(), Some("observatory_code,observatory_name,2000"));
    }

    #[tokio::test]
    async fn dictionary_command_should_write_chunks() {
        let dir = TempDir::new().unwrap();
        let config = test_config(&dir);
        let output_dir = config.output.dir.clone();
        let command = DictionaryCommand {
            rows_per_chunk: None,
            quiet: true,
        };
        command.run(config).await.unwrap();
        // Seven variables in chunks of four
        assert!(output_dir.join("variable_dictionary_000.csv").exists());
        assert!(output_dir.join("variable_dictionary_001.csv").exists());
        assert!(!output_dir.join("variable_dictionary_002.csv").exists());
    }

    #[tokio::test]
    async fn resolve_without_review_file_should_fail() {
        let dir = TempDir::new().unwrap();
        let command = ResolveCommand {
            output_format: OutputFormat::Csv,
            output_file: None,
            quiet: true,
        };
        assert!(command.run(test_config(&dir)).await.is_err());
    }

    #[tokio::test]
    async fn upload_without_storage_config_should_fail() {
        let dir = TempDir::new().unwrap();
        let command = UploadCommand {
            files: vec![dir.path().join("res_deb_2000.csv")],
            key_prefix: None,
            quiet: true,
        };
        let result = command.run(test_config(&dir)).await;
        assert!(matches!(
            result,
            Err(crate::error::PlacematchCliError::PlacematchError(
                PlacematchError::MissingStorageConfig
            ))
        ));
    }

    #[test]
    fn output_type_should_deserialize_properly() {
        let output_format = OutputFormat::from_str("GeoJSON");
        assert_eq!(
            output_format.unwrap(),
            OutputFormat::GeoJSON,
            "geojson format should be parsed correctly"
        );
        let output_format = OutputFormat::from_str("csv");
        assert_eq!(
            output_format.unwrap(),
            OutputFormat::Csv,
            "parsing should be case insensitive"
        );
        let output_format = OutputFormat::from_str("geoparquet");
        assert!(output_format.is_err(), "non listed formats should fail");
    }

    #[test]
    fn cli_should_be_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

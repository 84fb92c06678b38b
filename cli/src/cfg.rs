//! Configuration options specifically for the CLI portion of BRANCH
use std::path::PathBuf;

use clap::{AppSettings, Parser, Subcommand};

use branch_core::cfg::{SampleConfig, SummaryOutputConfig};

/// Configuration options for BRANCH command line app subcommands
#[derive(Parser)]
#[clap(version, about = "Bounded-coalescent sampler of within-host genealogies")]
pub struct CliConfig {
    /// Subcommands of BRANCH
    #[clap(subcommand)]
    pub command: CliCommand,
}

/// Subcommand definitions
#[derive(Subcommand)]
#[clap(setting = AppSettings::DeriveDisplayOrder)]
pub enum CliCommand {
    /// Draw genealogies
    Sample(SampleCliConfig),
    /// Reproduce results from a previous sampling run
    Reproduce(ReproduceConfig),
}

/// Run the BRANCH sampler
#[derive(Parser)]
#[clap(version, setting = AppSettings::DeriveDisplayOrder)]
pub struct SampleCliConfig {
    /// Output options for the CLI
    #[clap(flatten)]
    pub output_cfg: CliOutputConfig,

    /// Sampler options
    #[clap(flatten)]
    pub sample_cfg: SampleConfig,
}

/// Reproduce results of a previous run of the BRANCH sampler
#[derive(Parser)]
#[clap(version, setting = AppSettings::DeriveDisplayOrder)]
pub struct ReproduceConfig {
    /// Path of the input file, which came from a previous run and contains the information needed
    /// to reproduce the results
    pub input_path: PathBuf,

    /// Output options for the CLI
    #[clap(flatten)]
    pub output_cfg: CliOutputConfig,
}

/// Command line inputs needed to output results
#[derive(Parser)]
#[clap(setting = AppSettings::DeriveDisplayOrder)]
pub struct CliOutputConfig {
    /// The rate at which samples should be recorded
    #[clap(short = 'f', long, default_value = "1")]
    pub recording_frequency: u32,

    /// Path to output the summarized sampling results (as CSV), which contains the likelihood and
    /// other enabled stats per sample
    #[clap(short = 'o', long = "summary-output")]
    pub summary_output_path: Option<PathBuf>,

    /// Path to output the full raw genealogies (as ndjson), which includes times, edges, and the
    /// node table for each recorded sample
    #[clap(short = 'j', long = "raw-output")]
    pub raw_output_path: Option<PathBuf>,

    /// Path to output the per-sample node tables (as CSV) in the layout the stitching layer
    /// consumes
    #[clap(long = "node-table-output")]
    pub node_table_output_path: Option<PathBuf>,

    /// Path to output a tally of ranked tree shapes over the whole batch (as CSV)
    #[clap(long = "shape-tally-output")]
    pub shape_tally_output_path: Option<PathBuf>,

    /// Options for the summary output
    #[clap(flatten)]
    pub summary_cfg: SummaryOutputConfig,
}

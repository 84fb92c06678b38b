//! Configuration options for the sampler and output, with CLI parsing traits derived

// The effective population size is conventionally written "Ne" and keeps that
// capitalization in flag names
use clap::{AppSettings, Parser};
use serde::{Deserialize, Serialize};

/// Options for summary output statistics
#[derive(Clone, Parser)]
#[clap(setting = AppSettings::DeriveDisplayOrder)]
pub struct SummaryOutputConfig {
    /// Output the sample likelihood
    #[clap(skip = true)]
    pub likelihood: bool,
    /// Output the distance from the most recent leaf down to the root
    #[clap(long)]
    pub tree_height: bool,
    /// Output the sum of all edge lengths
    #[clap(long)]
    pub total_branch_length: bool,
    /// Output the mean coalescence time
    #[clap(long)]
    pub mean_coalescent_time: bool,
    /// Output the earliest coalescence time
    #[clap(long)]
    pub min_coalescent_time: bool,
    /// Output the number of internal nodes whose children are both leaves
    #[clap(long)]
    pub cherry_count: bool,
    /// Output the Colless imbalance of the sampled topology
    #[clap(long)]
    pub colless_index: bool,
}

/// Options for the bounded-coalescent sampler
#[derive(Clone, Parser, Serialize, Deserialize)]
#[clap(setting = AppSettings::DeriveDisplayOrder)]
pub struct SampleConfig {
    /// Times at which leaves were sampled, strictly increasing
    #[clap(short = 't', long, multiple_values = true, required = true)]
    pub leaf_times: Vec<f64>,
    /// Number of leaves sampled at each leaf time
    #[clap(short = 'l', long, multiple_values = true, required = true)]
    pub leaves: Vec<u32>,
    /// Effective population size
    #[clap(long = "Ne", default_value = "1.0")]
    pub effective_size: f64,
    /// Infection time of the host; every coalescence must fall strictly above it
    #[clap(short = 'b', long, default_value = "0.0", allow_hyphen_values = true)]
    pub bound: f64,
    /// Number of independent genealogies to draw
    #[clap(short = 'n', long, default_value = "1")]
    pub samples: u32,
    /// Significance-loss threshold below which the constraint resolver falls back to a
    /// deterministic median split and zeroes the sample likelihood
    #[clap(long, default_value = "1E-10")]
    pub significance_tolerance: f64,
    /// Seed for the RNG
    #[clap(long)]
    pub seed: Option<u64>,
}

//! Library for concerns and functions specific to the BRANCH CLI, rather than the BRANCH library
//!
//! This is kept separate to "dogfood" the BRANCH lib interface by making the CLI use it,
//! to prevent overly tight coupling of the CLI and the main lib, and to keep CLI concerns totally
//! out of the public BRANCH interface.

use std::time;

use anyhow::{Error, Result};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};

use branch_core::cfg::SampleConfig;
use branch_core::sim::SamplerHandler;

use cfg::{CliCommand, CliOutputConfig, ReproduceConfig};
use io::{extract_sample_config_from_path, outputter_group_for_cli};

mod cfg;
mod io;

pub use cfg::CliConfig;

/// Run the CLI as specified by some `CliConfig`
pub fn run_cli_config(cfg: CliConfig) {
    match cfg.command {
        CliCommand::Sample(sample_cli_cfg) => {
            run_samples(&sample_cli_cfg.output_cfg, sample_cli_cfg.sample_cfg)
        }
        CliCommand::Reproduce(reproduce_cfg) => reproduce_samples(&reproduce_cfg),
    }
}

/// Run the sampler with command line display and display error results if applicable
fn run_samples(output_cfg: &CliOutputConfig, sample_cfg: SampleConfig) {
    if let Err(e) = run_samples_inner(output_cfg, sample_cfg) {
        report_error("Error: Failed to draw or output samples.", e);
    }
}

/// Reproduce sampling results by extracting settings and handing off to the normal `Sample`
/// subcommand
fn reproduce_samples(cfg: &ReproduceConfig) {
    match extract_sample_config_from_path(&cfg.input_path) {
        Ok(sample_cfg) => {
            if sample_cfg.seed.is_none() {
                eprintln!(
                    "Note: The samples were previously drawn without a seed. \
                       Sampling will be run with the same settings but results will not be identical."
                );
            }

            run_samples(&cfg.output_cfg, sample_cfg);
        }
        Err(e) => {
            report_error("Error: Failed to read sampler options for reproduction", e);
        }
    }
}

/// Run the sampler with command line display and pass error results up
fn run_samples_inner(output_cfg: &CliOutputConfig, sample_cfg: SampleConfig) -> Result<()> {
    // Create the progress bar
    const TARGET_UPDATE_INTERVAL: time::Duration = time::Duration::from_millis(500);
    let mut bar_handler = ProgressBarHandler::new(
        TARGET_UPDATE_INTERVAL,
        styled_bar(sample_cfg.samples as u64, "Sample:"),
    );

    // Objects which manage the underlying sampler and the outputting of results
    let mut output_handler = outputter_group_for_cli(output_cfg, &sample_cfg)?;
    let mut sampler_handler = SamplerHandler::new(sample_cfg)?;

    while let Some(state) = sampler_handler.next_state()? {
        output_handler.record_genealogy(state.sample, state.genealogy)?;
        bar_handler.maybe_set_position(state.sample as u64);
    }

    // Tally outputters write their accumulated results here
    output_handler.finish()?;

    Ok(())
}

/// Report an `error` and a `message` to the user
fn report_error(message: &str, error: Error) {
    eprintln!("{}", message);
    eprintln!("{:#}", error);
    eprintln!("Details:\n{:#?}", error);
}

/// Get `ProgressBar` with style options and a custom prefix set to use for displaying progress
fn styled_bar(len: u64, prefix: &str) -> ProgressBar {
    let bar = ProgressBar::with_draw_target(len, ProgressDrawTarget::stderr_nohz())
        .with_style(ProgressStyle::default_bar().template("{prefix} {wide_bar} [{pos}/{len}]"));
    bar.set_prefix(prefix);

    bar
}

/// Handler for an `indicatif::ProgressBar` with rate-limited updates
struct ProgressBarHandler {
    bar: ProgressBar,
    update_interval: time::Duration,
    last_update: time::Instant,
}

impl ProgressBarHandler {
    /// Create new `ProgressBarHandler` taking ownership of the underlying progress bar
    pub fn new(update_interval: time::Duration, bar: ProgressBar) -> Self {
        // ProgressBars are Arc under the hood, clone is Arc clone
        // Need to do this so the bar doesn't interfere with panic messages
        let handle = bar.clone();
        let old_hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            handle.abandon();

            old_hook(info);
        }));

        let result = Self {
            bar,
            update_interval,
            last_update: time::Instant::now(),
        };
        // Make sure the bar starts cleared out
        result.bar.set_position(0);
        result
    }

    /// Set position of the handled bar only if enough time has elapsed
    pub fn maybe_set_position(&mut self, position: u64) {
        if self.last_update.elapsed() >= self.update_interval {
            self.bar.set_position(position);
            self.last_update = time::Instant::now();
        }
    }
}

impl Drop for ProgressBarHandler {
    fn drop(&mut self) {
        // Clear the progress bar
        self.bar.finish_and_clear();
    }
}

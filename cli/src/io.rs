//! IO helpers specifically for the CLI portion of BRANCH

use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

use anyhow::Result;

use branch_core::cfg::SampleConfig;
use branch_core::io::{
    extract_sample_config, NodeTableOutputter, OutputterGroup, OutputterGroupBuilder,
    RawOutputter, ShapeTallyOutputter, SummaryOutputter,
};

use crate::cfg::CliOutputConfig;

/// Get an `OutputterGroup` to generate output corresponding to the provided configs
pub fn outputter_group_for_cli(
    output_cfg: &CliOutputConfig,
    sample_cfg: &SampleConfig,
) -> Result<OutputterGroup> {
    let mut builder =
        OutputterGroupBuilder::default().sample_recording_frequency(output_cfg.recording_frequency);

    if let Some(path) = &output_cfg.raw_output_path {
        builder = builder.genealogy_outputter(Box::new(RawOutputter::new(
            create_buffered_file(path)?,
            sample_cfg,
        )?));
    }

    if let Some(path) = &output_cfg.summary_output_path {
        builder = builder.genealogy_outputter(Box::new(SummaryOutputter::new(
            create_buffered_file(path)?,
            output_cfg.summary_cfg.clone(),
            sample_cfg,
        )?));
    }

    if let Some(path) = &output_cfg.node_table_output_path {
        builder = builder.genealogy_outputter(Box::new(NodeTableOutputter::new(
            create_buffered_file(path)?,
            sample_cfg,
        )?));
    }

    if let Some(path) = &output_cfg.shape_tally_output_path {
        builder = builder.tally_outputter(Box::new(ShapeTallyOutputter::new(
            create_buffered_file(path)?,
            sample_cfg,
        )?));
    }

    Ok(builder.build()?)
}

/// Buffer capacity to use for files
/// Set at 8 MB
const FILE_BUFFER_CAPACITY: usize = 8 * (1 << 20);

/// Create a buffered `File` to use
fn create_buffered_file<P: AsRef<Path>>(path: P) -> std::io::Result<BufWriter<File>> {
    Ok(BufWriter::with_capacity(
        FILE_BUFFER_CAPACITY,
        File::create(path)?,
    ))
}

/// Extract the `SampleConfig` stored in the header of a previous run's output file
pub fn extract_sample_config_from_path<P: AsRef<Path>>(path: P) -> Result<SampleConfig> {
    Ok(extract_sample_config(File::open(path)?)?)
}

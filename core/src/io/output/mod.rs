//! Output tools for BRANCH

use std::io::Write;

use anyhow::Result;
use derive_builder::Builder;

use crate::cfg::SampleConfig;
use crate::sim::Genealogy;

use crate::io::header::{OutputHeader, OutputKind};

mod outputter_impls;

pub use outputter_impls::{
    NodeTableOutputter, RawOutputter, ShapeTallyOutputter, SummaryOutputter,
};

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
// OutputterGroup
////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// A handler which broadcasts recording functions to a group of underlying outputters
#[allow(missing_docs)] // Builder will not have doc comment
#[derive(Builder)]
#[builder(pattern = "owned")]
pub struct OutputterGroup {
    /// Frequency in samples at which managed per-sample outputters will be recorded to,
    /// only samples whose index is a multiple of this number will actually be passed on.
    ///
    /// No effect on tally outputs, defaults to `1`
    #[builder(default = "1")]
    sample_recording_frequency: u32,
    /// Outputters recording individual samples
    #[builder(setter(each(name = "genealogy_outputter")), default)]
    genealogy_outputters: Vec<Box<dyn GenealogyOutputter>>,
    /// Outputters accumulating over the whole batch; these see every sample
    #[builder(setter(each(name = "tally_outputter")), default)]
    tally_outputters: Vec<Box<dyn GenealogyOutputter>>,
}

impl OutputterGroup {
    /// Record one sampled `Genealogy` in all of the managed outputters
    pub fn record_genealogy(&mut self, sample: u32, genealogy: &Genealogy) -> Result<()> {
        if sample % self.sample_recording_frequency == 0 {
            for outputter in &mut self.genealogy_outputters {
                outputter.record_genealogy(sample, genealogy)?;
            }
        }
        for outputter in &mut self.tally_outputters {
            outputter.record_genealogy(sample, genealogy)?;
        }
        Ok(())
    }

    /// Finalize all managed outputters once the batch is complete
    ///
    /// Tally outputters write their accumulated results here, so skipping this loses them
    pub fn finish(&mut self) -> Result<()> {
        for outputter in &mut self.genealogy_outputters {
            outputter.finalize()?;
        }
        for outputter in &mut self.tally_outputters {
            outputter.finalize()?;
        }
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
// Traits
////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// An outputter that can record sampled genealogies
pub trait GenealogyOutputter {
    /// Record the data for one sampled `genealogy`, at a specific sample number
    fn record_genealogy(&mut self, sample: u32, genealogy: &Genealogy) -> Result<()>;

    /// Called once after the last sample; outputters accumulating batch-level state write
    /// it out here
    fn finalize(&mut self) -> Result<()> {
        Ok(())
    }
}

////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////
// Utils
////////////////////////////////////////////////////////////////////////////////////////////////////////////////////////

/// Manually moving onto the next record in the `csv` crate requires writing an empty record
const EMPTY_CSV_RECORD: [&[u8]; 0] = [];

/// Buffer capacity to use for CSV writer
///
/// Set at 128 KB
const CSV_BUFFER_CAPACITY: usize = 128 * (1 << 10);

/// Stamp the output header onto `writer` as a CSV comment line and get a `csv::Writer`
/// over the underlying `writer`
fn initialize_output_as_csv<W: Write>(
    mut writer: W,
    sample_cfg: &SampleConfig,
    kind: OutputKind,
) -> Result<csv::Writer<W>> {
    OutputHeader::new(kind, sample_cfg).write(&mut writer, "# ")?;

    Ok(csv::WriterBuilder::new()
        .buffer_capacity(CSV_BUFFER_CAPACITY)
        .from_writer(writer))
}

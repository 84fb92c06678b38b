//! Output of sampled genealogies and recovery of the sampler options embedded in past
//! output headers

mod header;
mod output;

pub use header::{extract_sample_config, HeaderError};
pub use output::{
    GenealogyOutputter, NodeTableOutputter, OutputterGroup, OutputterGroupBuilder, RawOutputter,
    ShapeTallyOutputter, SummaryOutputter,
};

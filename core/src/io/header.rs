//! Self-describing header stamped onto every BRANCH output file
//!
//! The first line of every output is one JSON object carrying the tool name, the crate
//! version, the payload kind, and the full sampler configuration. Any output file is
//! thereby its own reproduction recipe: feeding it back recovers the exact options that
//! produced it, and nothing else about the file needs to be parsed

use std::io::{BufRead, BufReader, Read, Write};

use anyhow::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cfg::SampleConfig;

/// Tool name stamped into every header, distinguishing BRANCH files from other
/// line-oriented JSON
const TOOL_NAME: &str = "branch";

/// Version stamp compiled into every header, from Cargo.toml
fn crate_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Kind of payload that follows the header line
#[derive(Serialize, Deserialize, Copy, Clone, Debug, PartialEq, Eq)]
pub(super) enum OutputKind {
    /// Full genealogy data for each sample, as ndjson
    Raw,
    /// Per-sample summary information only, as CSV
    Summary,
    /// Node table rows for every sample, as CSV
    NodeTable,
    /// Ranked-shape tally over the whole batch, as CSV
    ShapeTally,
}

/// The header object serialized onto the first line of an output file
#[derive(Serialize, Deserialize)]
pub(super) struct OutputHeader {
    /// Always [`TOOL_NAME`]
    tool: String,
    /// Crate version that produced the file
    version: String,
    /// Payload kind that follows
    kind: OutputKind,
    /// Sampler options the file was produced with
    cfg: SampleConfig,
}

impl OutputHeader {
    /// Stamp a header for the given payload kind and sampler options
    pub fn new(kind: OutputKind, cfg: &SampleConfig) -> Self {
        Self {
            tool: TOOL_NAME.to_string(),
            version: crate_version().to_string(),
            kind,
            cfg: cfg.clone(),
        }
    }

    /// Write the header as one JSON line
    ///
    /// CSV payloads pass `"# "` as the prefix so downstream tabular readers can skip the
    /// line as a comment; ndjson payloads pass `""`
    pub fn write<W: Write>(&self, writer: &mut W, line_prefix: &str) -> Result<()> {
        write!(writer, "{}", line_prefix)?;
        serde_json::to_writer(writer.by_ref(), self)?;
        writeln!(writer)?;
        Ok(())
    }
}

/// Recover the `SampleConfig` a previous BRANCH output was produced with
///
/// Only the first line is read. The header is accepted only from this tool at this exact
/// version: a config written by another version may be missing fields or carry renamed
/// ones, so no cross-version compatibility is attempted
pub fn extract_sample_config<R: Read>(source: R) -> Result<SampleConfig, HeaderError> {
    let mut first_line = String::new();
    BufReader::new(source).read_line(&mut first_line)?;

    // Tolerate the comment prefix used for CSV payloads
    let json = first_line.trim_start_matches('#').trim();
    let header: OutputHeader =
        serde_json::from_str(json).map_err(|_| HeaderError::NotABranchOutput)?;

    if header.tool != TOOL_NAME {
        return Err(HeaderError::NotABranchOutput);
    }
    if header.version != crate_version() {
        return Err(HeaderError::VersionMismatch {
            found: header.version,
        });
    }

    Ok(header.cfg)
}

/// An error raised while recovering sampler options from a previous output
#[derive(Error, Debug)]
pub enum HeaderError {
    /// The file could not be read at all
    #[error("could not read the header line: {0}")]
    Unreadable(#[from] std::io::Error),
    /// The first line is not a BRANCH output header
    #[error("the file does not start with a BRANCH output header")]
    NotABranchOutput,
    /// The header was written by a different version of the tool
    #[error("the file was written by BRANCH {found}; this build cannot reuse its options")]
    VersionMismatch {
        /// Version recorded in the file
        found: String,
    },
}

//! Types used for storing schedules, scratch state, and sampled genealogies

use itertools::izip;
use serde::Serialize;
use serde_tuple::Serialize_tuple;
use thiserror::Error;

/// An error raised while validating inputs or drawing a sample
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SampleError {
    /// Leaf times and leaf counts disagree in length
    #[error("leaf times and leaf counts have mismatched lengths ({times} vs {leaves})")]
    LengthMismatch {
        /// Number of leaf times supplied
        times: usize,
        /// Number of leaf counts supplied
        leaves: usize,
    },
    /// No sampling epochs were supplied
    #[error("at least one sampling epoch is required")]
    EmptySchedule,
    /// Leaf times are not finite and strictly increasing
    #[error("leaf times must be finite and strictly increasing")]
    UnorderedLeafTimes,
    /// An epoch was supplied with no leaves
    #[error("every sampling epoch must carry at least one leaf")]
    EmptyEpoch,
    /// The bound does not predate the first sampling epoch
    #[error("bound {bound} must lie strictly below the first leaf time {first}")]
    BoundTooLate {
        /// Supplied bound
        bound: f64,
        /// First leaf time in the schedule
        first: f64,
    },
    /// The effective population size is not a positive finite number
    #[error("effective population size must be positive and finite, got {0}")]
    NonPositiveEffectiveSize(f64),
    /// No lineage-count trajectory carries probability mass for this schedule
    ///
    /// Raised when a smoothed-posterior denominator is exactly zero, which means the drawn
    /// path is numerically unreachable
    #[error("no lineage-count trajectory is numerically reachable for this schedule")]
    InfeasibleSample,
    /// A supplied or sampled trajectory cannot be reconciled with the leaf schedule
    #[error("lineage-count trajectory is inconsistent with the leaf schedule")]
    InconsistentTrajectory,
}

/// The sampling schedule: when leaves were observed and how many at each time
///
/// Immutable once built; all sampler stages borrow it
#[derive(Debug, Clone)]
pub struct Schedule {
    /// Epoch times, strictly increasing
    times: Vec<f64>,
    /// Leaves observed at each epoch, all positive
    leaves: Vec<u32>,
    /// Total leaf count, cached at construction
    total: u32,
}

impl Schedule {
    /// Build a schedule after checking the ordering and multiplicity invariants
    pub fn new(times: Vec<f64>, leaves: Vec<u32>) -> Result<Self, SampleError> {
        if times.len() != leaves.len() {
            return Err(SampleError::LengthMismatch {
                times: times.len(),
                leaves: leaves.len(),
            });
        }
        if times.is_empty() {
            return Err(SampleError::EmptySchedule);
        }
        if times.iter().any(|t| !t.is_finite())
            || times.windows(2).any(|pair| pair[0] >= pair[1])
        {
            return Err(SampleError::UnorderedLeafTimes);
        }
        if leaves.iter().any(|&m| m == 0) {
            return Err(SampleError::EmptyEpoch);
        }

        let total = leaves.iter().sum();
        Ok(Self {
            times,
            leaves,
            total,
        })
    }

    /// Epoch times, strictly increasing
    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Leaf multiplicities, parallel to `times`
    pub fn leaves(&self) -> &[u32] {
        &self.leaves
    }

    /// Number of sampling epochs
    pub fn epochs(&self) -> usize {
        self.times.len()
    }

    /// Total number of leaves across all epochs
    pub fn total_leaves(&self) -> u32 {
        self.total
    }
}

/// Check the remaining preconditions of a sampling problem against a schedule
pub(super) fn validate_problem(
    schedule: &Schedule,
    effective_size: f64,
    bound: f64,
) -> Result<(), SampleError> {
    if !(effective_size > 0.0) || !effective_size.is_finite() {
        return Err(SampleError::NonPositiveEffectiveSize(effective_size));
    }
    let first = schedule.times()[0];
    if !bound.is_finite() || bound >= first {
        return Err(SampleError::BoundTooLate { bound, first });
    }
    Ok(())
}

/// One per-coalescence constraint record during resolution
///
/// `lineages` is the count at the upper end of the interval; `events` is the number of
/// coalescences the interval still holds
#[derive(Copy, Clone, Debug)]
pub(super) struct Constraint {
    /// Lower time limit of the interval
    pub lower: f64,
    /// Upper time limit of the interval
    pub upper: f64,
    /// Lineages extant at `upper`
    pub lineages: u32,
    /// Coalescent events remaining inside the interval
    pub events: u32,
}

/// Container for constraint records in parallel-vector form
///
/// Records are rewritten in place as intervals are bisected, so the component vectors are
/// mutated mid-iteration and must stay the same length throughout
#[derive(Default, Debug)]
pub(super) struct ConstraintSet {
    /// Lower interval limits
    lower: Vec<f64>,
    /// Upper interval limits
    upper: Vec<f64>,
    /// Lineage counts at the upper limits
    lineages: Vec<u32>,
    /// Events remaining per interval
    events: Vec<u32>,
}

impl ConstraintSet {
    /// Remove all records, keeping the allocations
    pub fn clear(&mut self) {
        self.lower.clear();
        self.upper.clear();
        self.lineages.clear();
        self.events.clear();
    }

    /// Number of records held
    pub fn len(&self) -> usize {
        self.lower.len()
    }

    /// Append a record
    pub fn push(&mut self, record: Constraint) {
        self.lower.push(record.lower);
        self.upper.push(record.upper);
        self.lineages.push(record.lineages);
        self.events.push(record.events);
    }

    /// Read the record at `index`
    pub fn get(&self, index: usize) -> Constraint {
        Constraint {
            lower: self.lower[index],
            upper: self.upper[index],
            lineages: self.lineages[index],
            events: self.events[index],
        }
    }

    /// Overwrite the record at `index`
    pub fn set(&mut self, index: usize, record: Constraint) {
        self.lower[index] = record.lower;
        self.upper[index] = record.upper;
        self.lineages[index] = record.lineages;
        self.events[index] = record.events;
    }

    /// Iterate over the records in order
    pub fn records(&self) -> impl Iterator<Item = Constraint> + '_ {
        izip!(&self.lower, &self.upper, &self.lineages, &self.events).map(
            |(&lower, &upper, &lineages, &events)| Constraint {
                lower,
                upper,
                lineages,
                events,
            },
        )
    }

    /// Asserts that the length of all component vectors is equal to `len`
    ///
    /// # Panics
    /// Panics if any of the component vectors have lengths different than `len`
    pub fn assert_len_eq(&self, len: usize) {
        assert_eq!(self.lower.len(), len);
        assert_eq!(self.upper.len(), len);
        assert_eq!(self.lineages.len(), len);
        assert_eq!(self.events.len(), len);
    }
}

/// Scratch buffers for one sampling pipeline
///
/// Owned by the caller so batch sampling amortizes allocation; every stage clears the
/// buffers it writes, so no reset is needed between samples
#[derive(Default, Debug)]
pub struct Workspace {
    /// Lineage counts per epoch column, bound first
    pub(super) trajectory: Vec<u32>,
    /// Constraint records under resolution
    pub(super) constraints: ConstraintSet,
    /// Sampled coalescence times, ascending
    pub(super) coalescence_times: Vec<f64>,
    /// Node ids active during the topology walk
    pub(super) active_ids: Vec<u32>,
    /// Ages parallel to `active_ids`
    pub(super) active_ages: Vec<f64>,
}

impl Workspace {
    /// Create an empty workspace
    pub fn new() -> Self {
        Self::default()
    }
}

/// One row of the node table
///
/// `left = right = 0` marks a leaf; `left ≠ 0, right = 0` marks a unary node, which the
/// sampler itself only emits for the degenerate single-leaf genealogy
#[derive(Copy, Clone, Debug, PartialEq, Serialize_tuple)]
pub struct NodeRow {
    /// Age of the node
    pub t: f64,
    /// Node id: leaves count up from 1, internals continue up to `2L − 1`
    pub id: u32,
    /// First child id, or 0
    pub left: u32,
    /// Second child id, or 0
    pub right: u32,
}

/// A directed parent → child edge of the genealogy
#[derive(Copy, Clone, Debug, PartialEq, Serialize_tuple)]
pub struct Edge {
    /// Internal node id of the parent
    pub parent: u32,
    /// Child node id
    pub child: u32,
}

/// One sampled genealogy together with its likelihood
#[derive(Debug, Clone, Serialize)]
pub struct Genealogy {
    /// Coalescence times, ascending, all strictly above the bound
    pub coalescence_times: Vec<f64>,
    /// Directed edges, two per coalescence
    pub edges: Vec<Edge>,
    /// Edge lengths parallel to `edges`
    pub edge_lengths: Vec<f64>,
    /// Node table rows for all `2L − 1` nodes
    pub nodes: Vec<NodeRow>,
    /// Joint likelihood of the draw, 0 when the resolver fell back to a median split
    pub likelihood: f64,
}

impl Genealogy {
    /// The degenerate single-leaf genealogy: one unary edge from the bound to the leaf,
    /// encoded entirely in the node table
    pub(super) fn degenerate(leaf_time: f64, bound: f64) -> Self {
        Self {
            coalescence_times: Vec::new(),
            edges: Vec::new(),
            edge_lengths: Vec::new(),
            nodes: vec![
                NodeRow {
                    t: leaf_time,
                    id: 1,
                    left: 0,
                    right: 0,
                },
                NodeRow {
                    t: bound,
                    id: 0,
                    left: 1,
                    right: 0,
                },
            ],
            likelihood: 1.0,
        }
    }

    /// Look up a node row by id
    pub fn node(&self, id: u32) -> Option<&NodeRow> {
        self.nodes.iter().find(|row| row.id == id)
    }

    /// Number of leaf rows in the node table
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|row| row.left == 0 && row.right == 0)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schedule_rejects_mismatched_lengths() {
        let err = Schedule::new(vec![1.0, 2.0], vec![1]).unwrap_err();
        assert_eq!(err, SampleError::LengthMismatch { times: 2, leaves: 1 });
    }

    #[test]
    fn schedule_rejects_unordered_times() {
        assert_eq!(
            Schedule::new(vec![2.0, 1.0], vec![1, 1]).unwrap_err(),
            SampleError::UnorderedLeafTimes
        );
        assert_eq!(
            Schedule::new(vec![1.0, 1.0], vec![1, 1]).unwrap_err(),
            SampleError::UnorderedLeafTimes
        );
    }

    #[test]
    fn schedule_rejects_empty_epochs() {
        assert_eq!(
            Schedule::new(vec![1.0, 2.0], vec![1, 0]).unwrap_err(),
            SampleError::EmptyEpoch
        );
        assert_eq!(
            Schedule::new(Vec::new(), Vec::new()).unwrap_err(),
            SampleError::EmptySchedule
        );
    }

    #[test]
    fn schedule_totals_leaves() {
        let schedule = Schedule::new(vec![1.0, 2.0, 4.0], vec![2, 1, 3]).unwrap();
        assert_eq!(schedule.total_leaves(), 6);
        assert_eq!(schedule.epochs(), 3);
    }

    #[test]
    fn problem_validation_guards_bound_and_size() {
        let schedule = Schedule::new(vec![1.0], vec![2]).unwrap();
        assert!(validate_problem(&schedule, 1.0, 0.0).is_ok());
        assert!(matches!(
            validate_problem(&schedule, 0.0, 0.0),
            Err(SampleError::NonPositiveEffectiveSize(_))
        ));
        assert!(matches!(
            validate_problem(&schedule, 1.0, 1.0),
            Err(SampleError::BoundTooLate { .. })
        ));
    }

    #[test]
    fn degenerate_genealogy_matches_contract() {
        let genealogy = Genealogy::degenerate(2.0, 1.0);
        assert_eq!(genealogy.nodes.len(), 2);
        assert_eq!(
            genealogy.nodes[0],
            NodeRow {
                t: 2.0,
                id: 1,
                left: 0,
                right: 0
            }
        );
        assert_eq!(
            genealogy.nodes[1],
            NodeRow {
                t: 1.0,
                id: 0,
                left: 1,
                right: 0
            }
        );
        assert!(genealogy.edges.is_empty());
        assert_eq!(genealogy.likelihood, 1.0);
    }
}

//! Code for running the bounded-coalescent sampler and types for storing genealogies
//!
//! The pipeline per sample: the forward recursion smooths lineage-count mass against the
//! bound, the backward pass draws a count trajectory, the constraint resolver pins each
//! coalescence into its own interval, and the time and topology stages turn the records
//! into a time-scaled binary genealogy

// The effective population size "Ne" is expressed here with capitalization that does not
// match the normal Rust snake-case guidelines
#![allow(non_snake_case)]

use rand::prelude::*;
use rand_pcg::Pcg64;

use crate::cfg::SampleConfig;

use crate::sim::kernel::pair_rate;

mod backward;
mod constrain;
mod distr;
mod forward;
mod kernel;
mod topology;
mod types;

pub mod summarize;

pub use forward::ForwardMatrix;
pub use kernel::{significance_loss, transition_probability};
pub use types::{Edge, Genealogy, NodeRow, SampleError, Schedule, Workspace};

/// Significance-loss threshold below which the constraint resolver falls back to a
/// deterministic median split and zeroes the sample likelihood
pub const DEFAULT_SIGNIFICANCE_TOLERANCE: f64 = 1e-10;

/// Handler to run a batch of samples from config, exposing each genealogy with an
/// iterator-like interface
///
/// The forward matrix is computed once per schedule; scratch buffers are shared across
/// the batch
pub struct SamplerHandler {
    /// Current sample, 1-indexed once started
    sample: u32,
    /// Sampler options
    cfg: InternalSampleConfig,
    /// Forward probabilities, fixed for the whole batch
    forward: ForwardMatrix,
    /// Scratch buffers reused between samples
    workspace: Workspace,
    /// Most recently drawn genealogy
    genealogy: Option<Genealogy>,
    /// RNG to use for all samples
    rng: SimRng,
}

impl SamplerHandler {
    /// Create a new `SamplerHandler`, validating the configuration
    ///
    /// To start, there will be no `current_state`; `next_state` needs to be called to go
    /// through all of the samples including the first one
    pub fn new(cfg: SampleConfig) -> Result<Self, SampleError> {
        let rng = default_sim_rng(&cfg);
        let cfg = InternalSampleConfig::new(cfg)?;
        let forward = ForwardMatrix::new(&cfg.schedule, cfg.inner.effective_size, cfg.inner.bound)?;

        Ok(Self {
            sample: 0,
            forward,
            workspace: Workspace::new(),
            genealogy: None,
            rng,
            cfg,
        })
    }

    /// Get the state for the most recently drawn sample, or `None` if no sample has been
    /// drawn yet
    pub fn current_state(&self) -> Option<SampleState<'_>> {
        self.genealogy.as_ref().map(|genealogy| SampleState {
            sample: self.sample,
            is_last: self.sample == self.cfg.inner.samples,
            genealogy,
        })
    }

    /// If samples remain, draw the next genealogy and return its state, or do nothing and
    /// return `Ok(None)` with the state left unchanged
    pub fn next_state(&mut self) -> Result<Option<SampleState<'_>>, SampleError> {
        if self.sample >= self.cfg.inner.samples {
            return Ok(None);
        }
        self.sample += 1;

        let genealogy = draw_genealogy(
            &self.cfg.schedule,
            self.cfg.inner.effective_size,
            self.cfg.inner.bound,
            self.cfg.inner.significance_tolerance,
            &self.forward,
            &mut self.workspace,
            &mut self.rng,
        )?;
        self.genealogy = Some(genealogy);

        Ok(self.current_state())
    }

    /// Whether the batch is finished
    ///
    /// This function returning `true` means `next_state` will return `Ok(None)` and vice
    /// versa
    pub fn is_finished(&self) -> bool {
        self.sample == self.cfg.inner.samples
    }
}

/// A snapshot of one drawn sample
pub struct SampleState<'a> {
    /// Sample number this state is for, 1-indexed
    pub sample: u32,
    /// Whether this is the last sample of the batch
    pub is_last: bool,
    /// The drawn genealogy
    pub genealogy: &'a Genealogy,
}

/// Sampler options after validation, including the parsed schedule
struct InternalSampleConfig {
    /// Underlying external config
    pub inner: SampleConfig,
    /// Validated sampling schedule
    pub schedule: Schedule,
}

impl InternalSampleConfig {
    /// Build an `InternalSampleConfig` from a normal `SampleConfig`, validating every
    /// input precondition before any sampling happens
    pub fn new(cfg: SampleConfig) -> Result<Self, SampleError> {
        let schedule = Schedule::new(cfg.leaf_times.clone(), cfg.leaves.clone())?;
        types::validate_problem(&schedule, cfg.effective_size, cfg.bound)?;
        Ok(Self {
            inner: cfg,
            schedule,
        })
    }
}

/// RNG used for the sampler
/// Will be a type that implements the `Rng` trait from `rand`
type SimRng = Pcg64;

/// Instantiate RNG to use for the sampler
///
/// Uses seed if one is given, otherwise seeds from system entropy
fn default_sim_rng(cfg: &SampleConfig) -> SimRng {
    match cfg.seed {
        Some(seed) => SimRng::seed_from_u64(seed),
        None => SimRng::from_entropy(),
    }
}

/// Draw one genealogy, validating inputs and allocating fresh buffers
///
/// Convenience wrapper over [`draw_genealogy`] for one-off draws; batch callers should
/// build the forward matrix and workspace once instead
pub fn sample_genealogy<R: Rng>(
    schedule: &Schedule,
    Ne: f64,
    bound: f64,
    rng: &mut R,
) -> Result<Genealogy, SampleError> {
    let forward = ForwardMatrix::new(schedule, Ne, bound)?;
    let mut workspace = Workspace::new();
    draw_genealogy(
        schedule,
        Ne,
        bound,
        DEFAULT_SIGNIFICANCE_TOLERANCE,
        &forward,
        &mut workspace,
        rng,
    )
}

/// Draw a batch of independent genealogies, sharing the forward matrix and scratch buffers
pub fn sample_genealogies<R: Rng>(
    schedule: &Schedule,
    Ne: f64,
    bound: f64,
    samples: u32,
    rng: &mut R,
) -> Result<Vec<Genealogy>, SampleError> {
    let forward = ForwardMatrix::new(schedule, Ne, bound)?;
    let mut workspace = Workspace::new();
    (0..samples)
        .map(|_| {
            draw_genealogy(
                schedule,
                Ne,
                bound,
                DEFAULT_SIGNIFICANCE_TOLERANCE,
                &forward,
                &mut workspace,
                rng,
            )
        })
        .collect()
}

/// Draw one genealogy against a prebuilt forward matrix and workspace
///
/// The single-leaf schedule short-circuits to the degenerate two-row node table with
/// likelihood 1; otherwise the joint likelihood is the product of the trajectory, split,
/// time, and topology factors, and is 0 exactly when the resolver used its
/// ill-conditioned fallback
pub fn draw_genealogy<R: Rng>(
    schedule: &Schedule,
    Ne: f64,
    bound: f64,
    significance_tolerance: f64,
    forward: &ForwardMatrix,
    workspace: &mut Workspace,
    rng: &mut R,
) -> Result<Genealogy, SampleError> {
    debug_assert_eq!(forward.leaf_total(), schedule.total_leaves());

    if schedule.total_leaves() == 1 {
        return Ok(Genealogy::degenerate(schedule.times()[0], bound));
    }

    let trajectory_likelihood = backward::sample_trajectory(
        forward,
        schedule,
        Ne,
        bound,
        1,
        &mut workspace.trajectory,
        rng,
    )?;
    let split_likelihood = constrain::resolve_constraints(
        &workspace.trajectory,
        schedule,
        Ne,
        bound,
        significance_tolerance,
        &mut workspace.constraints,
        rng,
    )?;
    let time_likelihood = topology::sample_times(
        &workspace.constraints,
        Ne,
        &mut workspace.coalescence_times,
        rng,
    );
    let (nodes, edges, edge_lengths, topology_likelihood) = topology::sample_topology(
        schedule,
        &workspace.coalescence_times,
        &mut workspace.active_ids,
        &mut workspace.active_ages,
        rng,
    )?;

    Ok(Genealogy {
        coalescence_times: workspace.coalescence_times.clone(),
        edges,
        edge_lengths,
        nodes,
        likelihood: trajectory_likelihood
            * split_likelihood
            * time_likelihood
            * topology_likelihood,
    })
}

/// Normalized bounded-coalescent density of an externally supplied set of coalescence times
///
/// The unnormalized density walks epochs and events together from the most recent leaf
/// downward, multiplying the exponential waiting factor of every inter-event gap and the
/// pairwise rate at every coalescence; dividing by the bound mass conditions on every
/// coalescence clearing the bound. Returns 0 for any configuration that cannot reduce to a
/// single lineage strictly above the bound: a time at or below the bound, a coalescence
/// with fewer than two extant lineages, a wrong-length time vector, or sampling epochs
/// left below the earliest coalescence
pub fn times_likelihood(
    schedule: &Schedule,
    Ne: f64,
    bound: f64,
    forward: &ForwardMatrix,
    coalescence_times: &[f64],
) -> f64 {
    if coalescence_times.len() != schedule.total_leaves() as usize - 1 {
        return 0.0;
    }
    let norm = forward.bound_mass();
    if norm <= 0.0 {
        return 0.0;
    }

    let mut events = coalescence_times.to_vec();
    events.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());

    let times = schedule.times();
    let leaves = schedule.leaves();
    let mut epoch = schedule.epochs();
    let mut event = events.len();
    let mut lineages: u32 = 0;
    let mut current = 0.0;
    let mut density = 1.0;

    while epoch > 0 || event > 0 {
        let next_epoch = if epoch > 0 {
            times[epoch - 1]
        } else {
            f64::NEG_INFINITY
        };
        if event == 0 || (epoch > 0 && next_epoch >= events[event - 1]) {
            if lineages > 0 {
                density *= (-(pair_rate(lineages) / Ne) * (current - next_epoch)).exp();
            }
            lineages += leaves[epoch - 1];
            current = next_epoch;
            epoch -= 1;
        } else {
            let coalescence = events[event - 1];
            if coalescence <= bound || lineages < 2 {
                return 0.0;
            }
            let rate = pair_rate(lineages) / Ne;
            density *= (-rate * (current - coalescence)).exp() * rate;
            lineages -= 1;
            current = coalescence;
            event -= 1;
        }
    }

    if lineages != 1 {
        return 0.0;
    }
    density / norm
}

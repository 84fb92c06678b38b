//! Constraint resolver partitioning multi-coalescent intervals into single-event records
//!
//! Seeds one record per coalescence from the sampled trajectory, then bisects every
//! interval holding more than one event until each record holds exactly one. The split of
//! events between the two halves is itself drawn from the transition kernel, so the record
//! rewrite is a conditional sample, not a heuristic

// The effective population size "Ne" keeps its conventional capitalization here
#![allow(non_snake_case)]

use rand::Rng;

use crate::sim::distr::sample_categorical;
use crate::sim::kernel::{significance_loss, transition_probability};
use crate::sim::types::{Constraint, ConstraintSet, SampleError, Schedule};

/// Resolve a lineage-count trajectory into single-event constraint records
///
/// On success `constraints` holds exactly one record per coalescence, ordered from the
/// bound upward, and the returned value is the product of the conditional split
/// probabilities. An ill-conditioned split (significance loss at or below
/// `significance_tolerance`, or a vanished split normalization) falls back to a
/// deterministic median split and zeroes the likelihood; the records stay well-formed
pub(super) fn resolve_constraints<R: Rng>(
    trajectory: &[u32],
    schedule: &Schedule,
    Ne: f64,
    bound: f64,
    significance_tolerance: f64,
    constraints: &mut ConstraintSet,
    rng: &mut R,
) -> Result<f64, SampleError> {
    seed_records(trajectory, schedule, bound, constraints)?;

    let mut likelihood = 1.0;
    let mut index = 0;
    while index < constraints.len() {
        loop {
            let record = constraints.get(index);
            if record.events <= 1 {
                break;
            }
            if record.lineages <= record.events {
                return Err(SampleError::InconsistentTrajectory);
            }

            let midpoint = 0.5 * (record.lower + record.upper);
            let half = 0.5 * (record.upper - record.lower);
            let lineages = record.lineages;
            let events = record.events;
            let settled = lineages - events;

            let norm = transition_probability(lineages, settled, 2.0 * half, Ne);
            let sig = significance_loss(lineages, settled, half, Ne);

            let chosen = if sig > significance_tolerance && norm > 0.0 {
                sample_categorical(
                    (0..=events).map(|events_lhs| {
                        let events_rhs = events - events_lhs;
                        transition_probability(lineages, lineages - events_rhs, half, Ne)
                            * transition_probability(lineages - events_rhs, settled, half, Ne)
                            / norm
                    }),
                    rng,
                )
            } else {
                None
            };

            let events_lhs = match chosen {
                Some((events_lhs, probability)) => {
                    likelihood *= probability;
                    events_lhs as u32
                }
                None => {
                    // Median split keeps the records well-formed; the zeroed likelihood
                    // marks the sample as rejected for importance-sampling callers
                    likelihood = 0.0;
                    events / 2
                }
            };
            let events_rhs = events - events_lhs;

            // Rewrite the `events` consecutive records of this interval in place; the
            // outer loop re-visits the current index afterwards
            for offset in 0..events as usize {
                let mut slot = constraints.get(index + offset);
                if (offset as u32) < events_lhs {
                    slot.upper = midpoint;
                    slot.lineages -= events_rhs;
                    slot.events = events_lhs;
                } else {
                    slot.lower = midpoint;
                    slot.events = events_rhs;
                }
                constraints.set(index + offset, slot);
            }
        }
        index += 1;
    }

    Ok(likelihood)
}

/// Emit one record per coalescent event implied by the trajectory
fn seed_records(
    trajectory: &[u32],
    schedule: &Schedule,
    bound: f64,
    constraints: &mut ConstraintSet,
) -> Result<(), SampleError> {
    let times = schedule.times();
    let leaves = schedule.leaves();
    if trajectory.len() != schedule.epochs() + 1 {
        return Err(SampleError::InconsistentTrajectory);
    }

    constraints.clear();

    let events = trajectory[1]
        .checked_sub(trajectory[0])
        .ok_or(SampleError::InconsistentTrajectory)?;
    for _ in 0..events {
        constraints.push(Constraint {
            lower: bound,
            upper: times[0],
            lineages: trajectory[1],
            events,
        });
    }

    for k in 2..=schedule.epochs() {
        let events = (leaves[k - 2] + trajectory[k])
            .checked_sub(trajectory[k - 1])
            .ok_or(SampleError::InconsistentTrajectory)?;
        for _ in 0..events {
            constraints.push(Constraint {
                lower: times[k - 2],
                upper: times[k - 1],
                lineages: trajectory[k],
                events,
            });
        }
    }

    let expected = schedule
        .total_leaves()
        .checked_sub(trajectory[0])
        .ok_or(SampleError::InconsistentTrajectory)?;
    if constraints.len() != expected as usize {
        return Err(SampleError::InconsistentTrajectory);
    }
    constraints.assert_len_eq(expected as usize);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn assert_resolved(constraints: &ConstraintSet, bound: f64, last_time: f64) {
        for (index, record) in constraints.records().enumerate() {
            assert_eq!(record.events, 1, "record {} left unresolved", index);
            assert!(record.lower < record.upper);
            assert!(record.lower >= bound && record.upper <= last_time);
            assert!(record.lineages >= 2);
        }
        // Records stay ordered from the bound upward
        let mut previous_upper = bound;
        for record in constraints.records() {
            assert!(record.lower >= previous_upper - 1e-12);
            previous_upper = record.upper;
        }
    }

    #[test]
    fn homochronous_triple_resolves_to_single_events() {
        let schedule = Schedule::new(vec![1.0], vec![3]).unwrap();
        let mut constraints = ConstraintSet::default();
        let mut rng = Pcg64::seed_from_u64(31);
        let likelihood = resolve_constraints(
            &[1, 3],
            &schedule,
            1.0,
            0.0,
            1e-10,
            &mut constraints,
            &mut rng,
        )
        .unwrap();
        assert_eq!(constraints.len(), 2);
        assert!(likelihood > 0.0);
        assert_resolved(&constraints, 0.0, 1.0);
    }

    #[test]
    fn heterochronous_records_cover_every_event() {
        let schedule = Schedule::new(vec![0.5, 1.0, 1.75], vec![2, 2, 1]).unwrap();
        let mut constraints = ConstraintSet::default();
        let mut rng = Pcg64::seed_from_u64(32);
        for _ in 0..100 {
            // All three lineages above the first epoch coalesce in the bound interval,
            // one more event sits between the first two epochs
            let likelihood = resolve_constraints(
                &[1, 4, 3, 1],
                &schedule,
                0.6,
                0.0,
                1e-10,
                &mut constraints,
                &mut rng,
            )
            .unwrap();
            assert_eq!(constraints.len(), 4);
            assert!(likelihood > 0.0);
            assert_resolved(&constraints, 0.0, 1.75);
        }
    }

    #[test]
    fn impossible_trajectories_are_rejected() {
        let schedule = Schedule::new(vec![1.0, 2.0], vec![2, 2]).unwrap();
        let mut constraints = ConstraintSet::default();
        let mut rng = Pcg64::seed_from_u64(33);

        // Backward step would need more lineages than the leaves can supply
        assert_eq!(
            resolve_constraints(&[1, 4, 1], &schedule, 1.0, 0.0, 1e-10, &mut constraints, &mut rng),
            Err(SampleError::InconsistentTrajectory)
        );
        // Event total disagrees with the leaf count
        assert_eq!(
            resolve_constraints(&[1, 2, 4], &schedule, 1.0, 0.0, 1e-10, &mut constraints, &mut rng),
            Err(SampleError::InconsistentTrajectory)
        );
    }

    #[test]
    fn forced_fallback_splits_at_the_median() {
        let schedule = Schedule::new(vec![1.0], vec![4]).unwrap();
        let mut constraints = ConstraintSet::default();
        let mut rng = Pcg64::seed_from_u64(34);
        // A tolerance above 1 can never be exceeded, so every split takes the fallback
        let likelihood = resolve_constraints(
            &[1, 4],
            &schedule,
            1.0,
            0.0,
            2.0,
            &mut constraints,
            &mut rng,
        )
        .unwrap();
        assert_eq!(likelihood, 0.0);
        assert_eq!(constraints.len(), 3);
        assert_resolved(&constraints, 0.0, 1.0);

        // Median splits are deterministic: 3 events put one below the midpoint, then the
        // remaining pair splits again at the upper quartile
        let resolved: Vec<_> = constraints.records().collect();
        assert_eq!(
            (resolved[0].lower, resolved[0].upper, resolved[0].lineages),
            (0.0, 0.5, 2)
        );
        assert_eq!(
            (resolved[1].lower, resolved[1].upper, resolved[1].lineages),
            (0.5, 0.75, 3)
        );
        assert_eq!(
            (resolved[2].lower, resolved[2].upper, resolved[2].lineages),
            (0.75, 1.0, 4)
        );
    }
}

//! Backward stochastic sampler drawing a lineage-count trajectory anchored at the bound

// The effective population size "Ne" keeps its conventional capitalization here
#![allow(non_snake_case)]

use rand::Rng;

use crate::sim::distr::sample_categorical;
use crate::sim::forward::ForwardMatrix;
use crate::sim::kernel::transition_probability;
use crate::sim::types::{SampleError, Schedule};

/// Draw a lineage-count trajectory from the smoothed posterior induced by the forward matrix
///
/// The trajectory is written into `trajectory`, bound entry first, one entry per forward
/// column. Returns the product of the smoothed conditional probabilities actually chosen,
/// which downstream likelihood composition needs
///
/// A zero smoothed-posterior denominator means the anchored path carries no mass and
/// surfaces as [`SampleError::InfeasibleSample`]
pub(super) fn sample_trajectory<R: Rng>(
    forward: &ForwardMatrix,
    schedule: &Schedule,
    Ne: f64,
    bound: f64,
    bound_size: u32,
    trajectory: &mut Vec<u32>,
    rng: &mut R,
) -> Result<f64, SampleError> {
    let times = schedule.times();
    let leaves = schedule.leaves();
    let leaf_total = schedule.total_leaves();

    trajectory.clear();
    trajectory.push(bound_size);

    let mut likelihood = 1.0;
    for k in 1..=schedule.epochs() {
        let anchored = trajectory[k - 1];
        let denominator = forward.get(anchored, k);
        if denominator <= 0.0 {
            return Err(SampleError::InfeasibleSample);
        }

        // Just before the leaves merged at the lower end of this interval are removed
        let reference = if k == 1 {
            anchored
        } else {
            anchored
                .checked_sub(leaves[k - 2])
                .ok_or(SampleError::InconsistentTrajectory)?
        };
        let elapsed = if k == 1 {
            times[0] - bound
        } else {
            times[k - 1] - times[k - 2]
        };

        let smoothed = (1..=leaf_total).map(|n| {
            transition_probability(n, reference, elapsed, Ne) * forward.get(n, k + 1)
                / denominator
        });
        let (index, probability) =
            sample_categorical(smoothed, rng).ok_or(SampleError::InfeasibleSample)?;

        trajectory.push(index as u32 + 1);
        likelihood *= probability;
    }

    Ok(likelihood)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn drawn_trajectory(
        times: Vec<f64>,
        leaves: Vec<u32>,
        Ne: f64,
        bound: f64,
        seed: u64,
    ) -> (Vec<u32>, f64) {
        let schedule = Schedule::new(times, leaves).unwrap();
        let forward = ForwardMatrix::new(&schedule, Ne, bound).unwrap();
        let mut rng = Pcg64::seed_from_u64(seed);
        let mut trajectory = Vec::new();
        let likelihood = sample_trajectory(
            &forward,
            &schedule,
            Ne,
            bound,
            1,
            &mut trajectory,
            &mut rng,
        )
        .unwrap();
        (trajectory, likelihood)
    }

    #[test]
    fn homochronous_pair_is_forced() {
        let (trajectory, likelihood) = drawn_trajectory(vec![3.0], vec![2], 1.0, 0.0, 21);
        assert_eq!(trajectory, vec![1, 2]);
        assert_relative_eq!(likelihood, 1.0, max_relative = 1e-12);
    }

    #[test]
    fn serial_singletons_are_forced() {
        // One leaf at each of two epochs: the counts have no freedom at all
        let (trajectory, likelihood) = drawn_trajectory(vec![1.0, 2.0], vec![1, 1], 0.5, 0.0, 22);
        assert_eq!(trajectory, vec![1, 2, 1]);
        assert_relative_eq!(likelihood, 1.0, max_relative = 1e-12);
    }

    #[test]
    fn trajectories_respect_the_leaf_schedule() {
        let times = vec![0.5, 1.0, 1.75, 2.5];
        let leaves = vec![2u32, 1, 2, 1];
        let schedule = Schedule::new(times.clone(), leaves.clone()).unwrap();
        let forward = ForwardMatrix::new(&schedule, 0.7, 0.0).unwrap();
        let mut rng = Pcg64::seed_from_u64(23);
        let mut trajectory = Vec::new();

        for _ in 0..200 {
            let likelihood = sample_trajectory(
                &forward,
                &schedule,
                0.7,
                0.0,
                1,
                &mut trajectory,
                &mut rng,
            )
            .unwrap();
            assert!(likelihood > 0.0 && likelihood <= 1.0 + 1e-12);
            assert_eq!(trajectory.len(), schedule.epochs() + 1);
            assert_eq!(trajectory[0], 1);
            // The most recent column holds exactly the leaves of the last epoch
            assert_eq!(trajectory[schedule.epochs()], *leaves.last().unwrap());
            for k in 1..schedule.epochs() {
                // Counts above each epoch stay within what the schedule can supply
                assert!(trajectory[k] > leaves[k - 1]);
                assert!(trajectory[k] - leaves[k - 1] <= trajectory[k + 1]);
            }
        }
    }
}

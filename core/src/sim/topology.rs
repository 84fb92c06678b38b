//! Coalescence-time draws and binary topology assembly
//!
//! Times are drawn independently inside their resolved constraint intervals; the topology
//! then wires lineages together walking from the most recent event backward, joining two
//! uniformly chosen active nodes at each coalescence

// The effective population size "Ne" keeps its conventional capitalization here
#![allow(non_snake_case)]

use rand::Rng;

use crate::sim::distr::{sample_categorical, truncated_coalescent_time};
use crate::sim::types::{ConstraintSet, Edge, NodeRow, SampleError, Schedule};

/// Draw one coalescence time per resolved record by inversion sampling
///
/// Records are already ordered from the bound upward, so the pushed times come out
/// ascending. Returns the product of the conditional time densities
pub(super) fn sample_times<R: Rng>(
    constraints: &ConstraintSet,
    Ne: f64,
    coalescence_times: &mut Vec<f64>,
    rng: &mut R,
) -> f64 {
    coalescence_times.clear();
    let mut likelihood = 1.0;
    for record in constraints.records() {
        let (time, density) =
            truncated_coalescent_time(record.lineages, record.lower, record.upper, Ne, rng);
        coalescence_times.push(time);
        likelihood *= density;
    }
    likelihood
}

/// Assemble the binary topology over the sampled coalescence times
///
/// Walks sampling epochs and coalescences together, most recent first. Epochs activate
/// fresh leaves (ids decrementing from `L`, most recent epoch first); each coalescence
/// deactivates two uniformly chosen nodes without replacement and activates a fresh
/// internal node (ids decrementing from `2L − 1`). The first child's uniform variate is
/// consumed before the second child's
///
/// Returns the node table, edges, edge lengths, and the topology likelihood
pub(super) fn sample_topology<R: Rng>(
    schedule: &Schedule,
    coalescence_times: &[f64],
    active_ids: &mut Vec<u32>,
    active_ages: &mut Vec<f64>,
    rng: &mut R,
) -> Result<(Vec<NodeRow>, Vec<Edge>, Vec<f64>, f64), SampleError> {
    let times = schedule.times();
    let leaves = schedule.leaves();
    let leaf_total = schedule.total_leaves();

    active_ids.clear();
    active_ages.clear();

    let mut nodes = Vec::with_capacity(2 * leaf_total as usize - 1);
    let mut edges = Vec::with_capacity(2 * coalescence_times.len());
    let mut edge_lengths = Vec::with_capacity(2 * coalescence_times.len());

    let mut next_leaf_id = leaf_total;
    let mut next_internal_id = 2 * leaf_total - 1;
    let mut epoch = schedule.epochs();
    let mut event = coalescence_times.len();
    let mut likelihood = 1.0;

    while event > 0 {
        let coalescence = coalescence_times[event - 1];

        // Activate any epoch at or above the next coalescence, most recent epoch first
        if epoch > 0 && times[epoch - 1] >= coalescence {
            for _ in 0..leaves[epoch - 1] {
                nodes.push(NodeRow {
                    t: times[epoch - 1],
                    id: next_leaf_id,
                    left: 0,
                    right: 0,
                });
                active_ids.push(next_leaf_id);
                active_ages.push(times[epoch - 1]);
                next_leaf_id -= 1;
            }
            epoch -= 1;
            continue;
        }

        let total_active = active_ids.len();
        if total_active < 2 {
            return Err(SampleError::InconsistentTrajectory);
        }

        let (first, first_age) = remove_uniform_active(active_ids, active_ages, rng);
        // The factor of 2 accounts for the unordered-pair convention
        likelihood *= 2.0 / total_active as f64;
        let (second, second_age) = remove_uniform_active(active_ids, active_ages, rng);
        likelihood *= 1.0 / (total_active - 1) as f64;

        let parent = next_internal_id;
        next_internal_id -= 1;
        nodes.push(NodeRow {
            t: coalescence,
            id: parent,
            left: first,
            right: second,
        });
        edges.push(Edge {
            parent,
            child: first,
        });
        edge_lengths.push(first_age - coalescence);
        edges.push(Edge {
            parent,
            child: second,
        });
        edge_lengths.push(second_age - coalescence);
        active_ids.push(parent);
        active_ages.push(coalescence);

        event -= 1;
    }

    if epoch > 0 || active_ids.len() != 1 {
        return Err(SampleError::InconsistentTrajectory);
    }

    Ok((nodes, edges, edge_lengths, likelihood))
}

/// Remove and return one uniformly chosen active node, preserving activation order
fn remove_uniform_active<R: Rng>(
    active_ids: &mut Vec<u32>,
    active_ages: &mut Vec<f64>,
    rng: &mut R,
) -> (u32, f64) {
    let weight = (active_ids.len() as f64).recip();
    let (index, _) = sample_categorical((0..active_ids.len()).map(|_| weight), rng).unwrap();
    (active_ids.remove(index), active_ages.remove(index))
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn assemble(
        times: Vec<f64>,
        leaves: Vec<u32>,
        coalescence_times: &[f64],
        seed: u64,
    ) -> Result<(Vec<NodeRow>, Vec<Edge>, Vec<f64>, f64), SampleError> {
        let schedule = Schedule::new(times, leaves).unwrap();
        let mut rng = Pcg64::seed_from_u64(seed);
        sample_topology(
            &schedule,
            coalescence_times,
            &mut Vec::new(),
            &mut Vec::new(),
            &mut rng,
        )
    }

    #[test]
    fn pair_joins_at_the_root() {
        let (nodes, edges, edge_lengths, likelihood) =
            assemble(vec![3.0], vec![2], &[1.2], 41).unwrap();

        assert_eq!(nodes.len(), 3);
        assert_eq!(nodes[0], NodeRow { t: 3.0, id: 2, left: 0, right: 0 });
        assert_eq!(nodes[1], NodeRow { t: 3.0, id: 1, left: 0, right: 0 });
        let root = nodes[2];
        assert_eq!((root.t, root.id), (1.2, 3));
        assert!(root.left != root.right && root.left >= 1 && root.left <= 2);

        assert_eq!(edges.len(), 2);
        assert!(edges.iter().all(|edge| edge.parent == 3));
        for length in edge_lengths {
            assert_relative_eq!(length, 1.8);
        }
        assert_relative_eq!(likelihood, 1.0);
    }

    #[test]
    fn internal_ids_decrement_latest_first() {
        let (nodes, edges, _, likelihood) =
            assemble(vec![1.0], vec![3], &[0.5, 0.8], 42).unwrap();

        assert_eq!(nodes.len(), 5);
        // Most recent coalescence takes the highest internal id, the root ends at L + 1
        let cherry = nodes.iter().find(|row| row.id == 5).unwrap();
        assert_eq!(cherry.t, 0.8);
        assert!(cherry.left <= 3 && cherry.right <= 3);
        let root = nodes.iter().find(|row| row.id == 4).unwrap();
        assert_eq!(root.t, 0.5);

        assert_eq!(edges.len(), 4);
        assert!(!edges.iter().any(|edge| edge.child == 4), "root has no parent");
        assert_relative_eq!(likelihood, 1.0 / 3.0, max_relative = 1e-12);
    }

    #[test]
    fn serial_leaves_activate_before_their_join() {
        let (nodes, _, edge_lengths, likelihood) =
            assemble(vec![1.0, 2.0], vec![1, 1], &[0.5], 43).unwrap();

        // Most recent epoch holds the highest leaf id
        assert!(nodes.contains(&NodeRow { t: 2.0, id: 2, left: 0, right: 0 }));
        assert!(nodes.contains(&NodeRow { t: 1.0, id: 1, left: 0, right: 0 }));
        let mut sorted = edge_lengths.clone();
        sorted.sort_unstable_by(|a, b| a.partial_cmp(b).unwrap());
        assert_relative_eq!(sorted[0], 0.5);
        assert_relative_eq!(sorted[1], 1.5);
        assert_relative_eq!(likelihood, 1.0);
    }

    #[test]
    fn inconsistent_event_counts_are_rejected() {
        // A coalescence above every active lineage
        assert_eq!(
            assemble(vec![0.5, 1.0], vec![1, 1], &[0.2, 1.5], 44).unwrap_err(),
            SampleError::InconsistentTrajectory
        );
        // Too few events to join everything
        assert_eq!(
            assemble(vec![1.0, 2.0], vec![1, 1], &[1.5], 45).unwrap_err(),
            SampleError::InconsistentTrajectory
        );
    }
}

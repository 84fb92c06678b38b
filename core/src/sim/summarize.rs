//! Summarizing operations for sampled genealogies

use hashbrown::HashMap;

use crate::sim::types::{Genealogy, NodeRow};

/// Likelihood of the sampled genealogy
pub fn likelihood(genealogy: &Genealogy) -> f64 {
    genealogy.likelihood
}

/// Distance from the most recent leaf down to the root
pub fn tree_height(genealogy: &Genealogy) -> f64 {
    let newest_leaf = genealogy
        .nodes
        .iter()
        .filter(|row| row.left == 0 && row.right == 0)
        .map(|row| row.t)
        .fold(f64::NEG_INFINITY, f64::max);

    newest_leaf - root(genealogy).t
}

/// Sum of all edge lengths
pub fn total_branch_length(genealogy: &Genealogy) -> f64 {
    genealogy.edge_lengths.iter().sum()
}

/// Arithmetic mean of the coalescence times, or NaN for the degenerate single-leaf case
pub fn mean_coalescent_time(genealogy: &Genealogy) -> f64 {
    let times = &genealogy.coalescence_times;
    times.iter().sum::<f64>() / times.len() as f64
}

/// Earliest coalescence time, or NaN for the degenerate single-leaf case
pub fn min_coalescent_time(genealogy: &Genealogy) -> f64 {
    genealogy
        .coalescence_times
        .first()
        .copied()
        .unwrap_or(f64::NAN)
}

/// Number of internal nodes whose children are both leaves
pub fn cherry_count(genealogy: &Genealogy) -> usize {
    let rows = row_index(genealogy);
    genealogy
        .nodes
        .iter()
        .filter(|row| {
            row.left != 0
                && row.right != 0
                && is_leaf(&rows, row.left)
                && is_leaf(&rows, row.right)
        })
        .count()
}

/// Colless imbalance: the sum over internal nodes of the absolute difference between the
/// two child clade sizes
pub fn colless_index(genealogy: &Genealogy) -> u32 {
    let rows = row_index(genealogy);
    let mut sizes: HashMap<u32, u32> = HashMap::new();

    // Children always carry larger ids than their parent, so descending id order settles
    // every clade before it is needed
    let mut internal_ids: Vec<u32> = genealogy
        .nodes
        .iter()
        .filter(|row| row.left != 0 && row.right != 0)
        .map(|row| row.id)
        .collect();
    internal_ids.sort_unstable_by(|a, b| b.cmp(a));

    let mut total = 0;
    for id in internal_ids {
        let row = rows[&id];
        let left = clade_size(&sizes, row.left);
        let right = clade_size(&sizes, row.right);
        sizes.insert(id, left + right);
        total += left.abs_diff(right);
    }
    total
}

/// Canonical encoding of the unlabeled ranked shape of the genealogy
///
/// Leaves encode as `1`; an internal node encodes as its two child encodings sorted and
/// parenthesized, so topologically identical shapes always produce the same string
pub fn ranked_shape(genealogy: &Genealogy) -> String {
    let rows = row_index(genealogy);
    encode_shape(&rows, root(genealogy).id)
}

/// Root row: the unique node that is nobody's child
fn root(genealogy: &Genealogy) -> &NodeRow {
    let mut children: Vec<u32> = Vec::with_capacity(genealogy.nodes.len());
    for row in &genealogy.nodes {
        if row.left != 0 {
            children.push(row.left);
        }
        if row.right != 0 {
            children.push(row.right);
        }
    }
    genealogy
        .nodes
        .iter()
        .find(|row| !children.contains(&row.id))
        .expect("a well-formed genealogy always has a root")
}

fn row_index(genealogy: &Genealogy) -> HashMap<u32, &NodeRow> {
    genealogy.nodes.iter().map(|row| (row.id, row)).collect()
}

fn is_leaf(rows: &HashMap<u32, &NodeRow>, id: u32) -> bool {
    rows.get(&id)
        .map_or(false, |row| row.left == 0 && row.right == 0)
}

fn clade_size(sizes: &HashMap<u32, u32>, id: u32) -> u32 {
    sizes.get(&id).copied().unwrap_or(1)
}

fn encode_shape(rows: &HashMap<u32, &NodeRow>, id: u32) -> String {
    let row = rows[&id];
    if row.left == 0 && row.right == 0 {
        return "1".to_string();
    }
    if row.right == 0 {
        // Unary nodes only occur in the degenerate single-leaf table
        return encode_shape(rows, row.left);
    }
    let mut left = encode_shape(rows, row.left);
    let mut right = encode_shape(rows, row.right);
    if right < left {
        std::mem::swap(&mut left, &mut right);
    }
    format!("({},{})", left, right)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    use crate::sim::types::Edge;

    /// Four leaves: a cherry of leaves 1 and 2 under the root, with leaves 3 and 4 joining
    /// the spine one at a time
    fn caterpillar() -> Genealogy {
        Genealogy {
            coalescence_times: vec![0.2, 0.5, 0.8],
            edges: vec![
                Edge { parent: 7, child: 1 },
                Edge { parent: 7, child: 2 },
                Edge { parent: 6, child: 7 },
                Edge { parent: 6, child: 3 },
                Edge { parent: 5, child: 6 },
                Edge { parent: 5, child: 4 },
            ],
            edge_lengths: vec![0.2, 0.2, 0.3, 0.5, 0.3, 0.8],
            nodes: vec![
                NodeRow { t: 1.0, id: 4, left: 0, right: 0 },
                NodeRow { t: 1.0, id: 3, left: 0, right: 0 },
                NodeRow { t: 1.0, id: 2, left: 0, right: 0 },
                NodeRow { t: 1.0, id: 1, left: 0, right: 0 },
                NodeRow { t: 0.8, id: 7, left: 1, right: 2 },
                NodeRow { t: 0.5, id: 6, left: 7, right: 3 },
                NodeRow { t: 0.2, id: 5, left: 6, right: 4 },
            ],
            likelihood: 0.25,
        }
    }

    #[test]
    fn heights_and_lengths_add_up() {
        let genealogy = caterpillar();
        assert_relative_eq!(tree_height(&genealogy), 0.8);
        assert_relative_eq!(total_branch_length(&genealogy), 2.3);
        assert_relative_eq!(mean_coalescent_time(&genealogy), 0.5);
        assert_relative_eq!(min_coalescent_time(&genealogy), 0.2);
        assert_relative_eq!(likelihood(&genealogy), 0.25);
    }

    #[test]
    fn shape_statistics_identify_the_caterpillar() {
        let genealogy = caterpillar();
        assert_eq!(cherry_count(&genealogy), 1);
        // |1-1| + |2-1| + |3-1| over the three internal nodes
        assert_eq!(colless_index(&genealogy), 3);
        assert_eq!(ranked_shape(&genealogy), "(1,(1,(1,1)))");
    }

    #[test]
    fn degenerate_table_still_summarizes() {
        let genealogy = Genealogy::degenerate(2.0, 1.0);
        assert_relative_eq!(tree_height(&genealogy), 1.0);
        assert_eq!(cherry_count(&genealogy), 0);
        assert_eq!(colless_index(&genealogy), 0);
        assert_eq!(ranked_shape(&genealogy), "1");
        assert!(min_coalescent_time(&genealogy).is_nan());
    }
}

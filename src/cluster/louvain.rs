//! Multi-level Louvain: gain-based local moving plus community aggregation.
//!
//! Each level shuffles the visit order with the caller's seeded RNG, moves
//! nodes to the neighbor community with the best resolution-scaled gain
//! until no move helps, then collapses communities into super-nodes
//! (internal weight becomes a self loop) and repeats. Node count strictly
//! decreases between levels, so the loop always terminates.

use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;

use super::Adjacency;

const MAX_PASSES: usize = 32;
const MIN_GAIN: f64 = 1e-12;

/// Full multi-level run. Returns a compact membership over the original
/// nodes of `adj`.
pub(crate) fn cluster(adj: &Adjacency, resolution: f64, rng: &mut ChaCha8Rng) -> Vec<usize> {
    let mut membership: Vec<usize> = (0..adj.node_count()).collect();
    let mut level = adj.clone();

    loop {
        let identity: Vec<usize> = (0..level.node_count()).collect();
        let (local, _) = local_moving(&level, identity, resolution, rng);
        let (compacted, count) = compact(&local);
        for slot in membership.iter_mut() {
            *slot = compacted[*slot];
        }
        if count == level.node_count() || count <= 1 {
            break;
        }
        level = aggregate(&level, &compacted, count);
    }

    membership
}

/// One local-moving phase starting from `membership`. Moves each visited
/// node into the community with the highest gain
/// `k_i_in - resolution * sigma_tot * k_i / 2m`, keeping the current
/// community on ties. Community ids in `membership` must be `< n`.
///
/// Returns the updated membership and whether any node moved.
pub(crate) fn local_moving(
    adj: &Adjacency,
    mut membership: Vec<usize>,
    resolution: f64,
    rng: &mut ChaCha8Rng,
) -> (Vec<usize>, bool) {
    let n = adj.node_count();
    let m2 = 2.0 * adj.total_weight;
    if m2 <= 0.0 {
        return (membership, false);
    }

    let mut sigma_tot = vec![0.0; n];
    for node in 0..n {
        sigma_tot[membership[node]] += adj.degrees[node];
    }

    let mut order: Vec<usize> = (0..n).collect();
    let mut link_weights: FxHashMap<usize, f64> = FxHashMap::default();
    let mut improved = false;

    for _ in 0..MAX_PASSES {
        order.shuffle(rng);
        let mut moved = false;

        for &node in &order {
            let current = membership[node];
            let k_i = adj.degrees[node];

            link_weights.clear();
            for &(nbr, w) in &adj.neighbors[node] {
                *link_weights.entry(membership[nbr]).or_insert(0.0) += w;
            }

            // Evaluate gains with the node taken out of its community.
            sigma_tot[current] -= k_i;
            let own_links = link_weights.get(&current).copied().unwrap_or(0.0);
            let mut best_community = current;
            let mut best_gain = own_links - resolution * sigma_tot[current] * k_i / m2;
            for (&community, &links) in &link_weights {
                if community == current {
                    continue;
                }
                let gain = links - resolution * sigma_tot[community] * k_i / m2;
                if gain > best_gain + MIN_GAIN {
                    best_gain = gain;
                    best_community = community;
                }
            }
            sigma_tot[best_community] += k_i;

            if best_community != current {
                membership[node] = best_community;
                moved = true;
                improved = true;
            }
        }

        if !moved {
            break;
        }
    }

    (membership, improved)
}

/// Renumber community ids to be contiguous from 0 in first-use order.
pub(crate) fn compact(membership: &[usize]) -> (Vec<usize>, usize) {
    let mut relabel: FxHashMap<usize, usize> = FxHashMap::default();
    let mut next = 0usize;
    let compacted = membership
        .iter()
        .map(|&c| {
            *relabel.entry(c).or_insert_with(|| {
                let id = next;
                next += 1;
                id
            })
        })
        .collect();
    (compacted, next)
}

/// Collapse each community into one super-node. Intra-community weight
/// (including existing self loops) becomes the super-node's self loop, so
/// total weight and degree sums are conserved across levels.
fn aggregate(adj: &Adjacency, membership: &[usize], count: usize) -> Adjacency {
    let mut self_loops = vec![0.0; count];
    let mut cross: Vec<FxHashMap<usize, f64>> = vec![FxHashMap::default(); count];

    for u in 0..adj.node_count() {
        let cu = membership[u];
        self_loops[cu] += adj.self_loops[u];
        for &(v, w) in &adj.neighbors[u] {
            if v <= u {
                continue; // each undirected edge once
            }
            let cv = membership[v];
            if cu == cv {
                self_loops[cu] += w;
            } else {
                *cross[cu].entry(cv).or_insert(0.0) += w;
                *cross[cv].entry(cu).or_insert(0.0) += w;
            }
        }
    }

    let neighbors: Vec<Vec<(usize, f64)>> = cross
        .into_iter()
        .map(|map| {
            let mut list: Vec<(usize, f64)> = map.into_iter().collect();
            list.sort_unstable_by(|a, b| a.0.cmp(&b.0));
            list
        })
        .collect();
    let degrees = (0..count)
        .map(|c| neighbors[c].iter().map(|(_, w)| w).sum::<f64>() + 2.0 * self_loops[c])
        .collect();

    Adjacency {
        neighbors,
        self_loops,
        degrees,
        total_weight: adj.total_weight,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    /// Unit-weight adjacency from an edge list.
    fn adjacency(n: usize, edges: &[(usize, usize)]) -> Adjacency {
        let mut neighbors: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        for &(u, v) in edges {
            neighbors[u].push((v, 1.0));
            neighbors[v].push((u, 1.0));
        }
        for list in &mut neighbors {
            list.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        }
        let degrees = neighbors
            .iter()
            .map(|l| l.iter().map(|(_, w)| w).sum())
            .collect();
        Adjacency {
            neighbors,
            self_loops: vec![0.0; n],
            degrees,
            total_weight: edges.len() as f64,
        }
    }

    #[test]
    fn triangle_collapses_to_one_community() {
        let adj = adjacency(3, &[(0, 1), (1, 2), (0, 2)]);
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let membership = cluster(&adj, 1.0, &mut rng);
        assert!(membership.iter().all(|&c| c == membership[0]));
    }

    #[test]
    fn compact_renumbers_in_first_use_order() {
        let (compacted, count) = compact(&[5, 5, 2, 7, 2]);
        assert_eq!(compacted, vec![0, 0, 1, 2, 1]);
        assert_eq!(count, 3);
    }

    #[test]
    fn aggregate_conserves_weight_and_degrees() {
        // two triangles joined by one edge, pre-grouped per triangle
        let adj = adjacency(6, &[(0, 1), (1, 2), (0, 2), (3, 4), (4, 5), (3, 5), (2, 3)]);
        let membership = vec![0, 0, 0, 1, 1, 1];
        let coarse = aggregate(&adj, &membership, 2);

        assert_eq!(coarse.node_count(), 2);
        assert_eq!(coarse.total_weight, adj.total_weight);
        assert_eq!(coarse.self_loops, vec![3.0, 3.0]);
        assert_eq!(coarse.neighbors[0], vec![(1, 1.0)]);
        // degree = cross edge + twice the internal weight
        assert_eq!(coarse.degrees, vec![7.0, 7.0]);
        let total_degree: f64 = adj.degrees.iter().sum();
        let coarse_degree: f64 = coarse.degrees.iter().sum();
        assert_eq!(total_degree, coarse_degree);
    }

    #[test]
    fn local_moving_respects_given_start() {
        let adj = adjacency(4, &[(0, 1), (2, 3)]);
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        let start = vec![0, 0, 1, 1];
        let (membership, moved) = local_moving(&adj, start.clone(), 1.0, &mut rng);
        // already optimal: nothing to move
        assert!(!moved);
        assert_eq!(membership, start);
    }

    #[test]
    fn high_resolution_keeps_singletons() {
        let adj = adjacency(4, &[(0, 1), (1, 2), (2, 3), (0, 3)]);
        let mut rng = ChaCha8Rng::seed_from_u64(9);
        let membership = cluster(&adj, 16.0, &mut rng);
        let (_, count) = compact(&membership);
        assert_eq!(count, 4);
    }
}

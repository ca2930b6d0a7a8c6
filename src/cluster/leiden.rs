//! Leiden refinement on top of the Louvain result.
//!
//! Two steps over the original (never aggregated) graph: re-run the gain
//! sweep so boundary vertices settle against the final communities, then
//! split every community that is not internally connected into its
//! connected components. Louvain alone can leave a community whose members
//! only touch through outside vertices; after this pass that cannot happen.

use std::collections::VecDeque;

use rand_chacha::ChaCha8Rng;

use super::louvain::{compact, local_moving};
use super::Adjacency;

pub(crate) fn refine(
    adj: &Adjacency,
    membership: Vec<usize>,
    resolution: f64,
    rng: &mut ChaCha8Rng,
) -> Vec<usize> {
    let (membership, _) = local_moving(adj, membership, resolution, rng);
    let (mut membership, count) = compact(&membership);
    split_disconnected(adj, &mut membership, count);
    membership
}

/// Give every connected component of a community its own id. Ids in
/// `membership` must be contiguous in `0..count`. The first component keeps
/// the original id; extras get fresh ids past `count`.
fn split_disconnected(adj: &Adjacency, membership: &mut [usize], count: usize) {
    let mut groups: Vec<Vec<usize>> = vec![Vec::new(); count];
    for (node, &community) in membership.iter().enumerate() {
        groups[community].push(node);
    }

    let mut next_id = count;
    let mut visited = vec![false; adj.node_count()];
    let mut queue = VecDeque::new();

    for (community, members) in groups.iter().enumerate() {
        if members.len() <= 1 {
            continue;
        }
        let mut first_component = true;
        for &start in members {
            if visited[start] {
                continue;
            }
            let component_id = if first_component {
                community
            } else {
                let id = next_id;
                next_id += 1;
                id
            };
            first_component = false;

            // Flood one component along intra-community edges. `members` is
            // ascending by construction, so membership tests are a binary
            // search against the pristine member list, not the partially
            // rewritten `membership`.
            visited[start] = true;
            queue.push_back(start);
            while let Some(u) = queue.pop_front() {
                membership[u] = component_id;
                for &(v, _) in &adj.neighbors[u] {
                    if !visited[v] && members.binary_search(&v).is_ok() {
                        visited[v] = true;
                        queue.push_back(v);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

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
    fn disconnected_community_is_split() {
        // 0-1 and 2-3 share no edge but start in one community
        let adj = adjacency(4, &[(0, 1), (2, 3)]);
        let mut membership = vec![0, 0, 0, 0];
        split_disconnected(&adj, &mut membership, 1);
        assert_eq!(membership[0], membership[1]);
        assert_eq!(membership[2], membership[3]);
        assert_ne!(membership[0], membership[2]);
    }

    #[test]
    fn connected_communities_untouched() {
        let adj = adjacency(4, &[(0, 1), (1, 2), (2, 3)]);
        let mut membership = vec![0, 0, 1, 1];
        let before = membership.clone();
        split_disconnected(&adj, &mut membership, 2);
        assert_eq!(membership, before);
    }

    #[test]
    fn isolated_vertex_communities_survive_refine() {
        // a triangle plus an isolated vertex already in its own community
        let adj = adjacency(4, &[(0, 1), (1, 2), (0, 2)]);
        let mut rng = ChaCha8Rng::seed_from_u64(5);
        let refined = refine(&adj, vec![0, 0, 0, 1], 1.0, &mut rng);
        assert_eq!(refined[0], refined[1]);
        assert_eq!(refined[1], refined[2]);
        assert_ne!(refined[3], refined[0]);
    }

    #[test]
    fn refine_yields_connected_communities() {
        // two pairs bridged through an outside hub: {1,2,4,5} is
        // disconnected without node 3
        let adj = adjacency(6, &[(0, 1), (1, 2), (2, 3), (3, 4), (4, 5)]);
        let mut membership = vec![0, 1, 1, 0, 1, 1];
        split_disconnected(&adj, &mut membership, 2);
        // {1,2} and {4,5} must no longer share an id
        assert_eq!(membership[1], membership[2]);
        assert_eq!(membership[4], membership[5]);
        assert_ne!(membership[1], membership[4]);
        // {0,3} is also disconnected
        assert_ne!(membership[0], membership[3]);
    }
}

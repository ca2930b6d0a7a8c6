//! Community detection over interaction graphs.
//!
//! [`detect`] is a pure function: graph in, [`Partition`] plus modularity
//! out, no state between calls. Determinism is part of the contract — the
//! caller supplies a seed, and identical inputs always produce the identical
//! partition. Louvain is the multi-level optimizer; Leiden (the default)
//! runs the same optimizer and then refines the result on the original
//! graph, splitting any community that is internally disconnected.

mod leiden;
mod louvain;

use std::fmt;
use std::str::FromStr;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::annotation::EntityId;
use crate::error::CoreError;
use crate::graph::InteractionGraph;

// ── Options ───────────────────────────────────────────────────────────────

/// Which modularity optimizer to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// Louvain plus a refinement pass; communities are always connected.
    Leiden,
    /// Plain multi-level Louvain, kept for comparison runs.
    Louvain,
}

impl Default for Algorithm {
    fn default() -> Self {
        Self::Leiden
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Leiden => f.write_str("leiden"),
            Self::Louvain => f.write_str("louvain"),
        }
    }
}

impl FromStr for Algorithm {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "leiden" => Ok(Self::Leiden),
            "louvain" => Ok(Self::Louvain),
            _ => Err(CoreError::UnknownAlgorithm(s.to_owned())),
        }
    }
}

/// Detection parameters.
///
/// `resolution` steers granularity: above 1.0 favors more, smaller
/// communities; below 1.0 fewer, larger ones. `seed` fixes the node visit
/// order, which is the only randomness in the optimizer, so it fully
/// determines tie-breaking between equal-quality partitions.
#[derive(Debug, Clone, Copy)]
pub struct DetectOptions {
    pub algorithm: Algorithm,
    pub resolution: f64,
    pub seed: u64,
}

impl Default for DetectOptions {
    fn default() -> Self {
        Self {
            algorithm: Algorithm::Leiden,
            resolution: 1.0,
            seed: 0,
        }
    }
}

// ── Partition ─────────────────────────────────────────────────────────────

/// Immutable community assignment: one id per vertex, contiguous from 0,
/// numbered by first appearance in vertex order so equal partitions always
/// carry identical labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Partition {
    entities: Vec<EntityId>,
    assignments: Vec<u32>,
    community_count: u32,
}

impl Partition {
    pub(crate) fn new(entities: Vec<EntityId>, raw: &[usize]) -> Self {
        assert_eq!(
            entities.len(),
            raw.len(),
            "partition must assign every vertex exactly one community"
        );
        let mut relabel: FxHashMap<usize, u32> = FxHashMap::default();
        let mut next: u32 = 0;
        let assignments: Vec<u32> = raw
            .iter()
            .map(|&c| {
                *relabel.entry(c).or_insert_with(|| {
                    let id = next;
                    next += 1;
                    id
                })
            })
            .collect();
        Self {
            entities,
            assignments,
            community_count: next,
        }
    }

    pub fn community_count(&self) -> u32 {
        self.community_count
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Entities in vertex order.
    pub fn entities(&self) -> &[EntityId] {
        &self.entities
    }

    /// Community ids aligned with [`entities`](Self::entities).
    pub fn assignments(&self) -> &[u32] {
        &self.assignments
    }

    pub fn iter(&self) -> impl Iterator<Item = (&EntityId, u32)> {
        self.entities.iter().zip(self.assignments.iter().copied())
    }

    pub fn community_of(&self, entity: &EntityId) -> Option<u32> {
        self.entities
            .iter()
            .position(|e| e == entity)
            .map(|i| self.assignments[i])
    }

    /// Members of one community, in vertex order.
    pub fn members(&self, community: u32) -> impl Iterator<Item = &EntityId> {
        self.iter()
            .filter(move |(_, c)| *c == community)
            .map(|(e, _)| e)
    }

    /// All communities as owned member lists, indexed by community id.
    pub fn communities(&self) -> Vec<Vec<EntityId>> {
        let mut groups: Vec<Vec<EntityId>> = vec![Vec::new(); self.community_count as usize];
        for (entity, community) in self.iter() {
            groups[community as usize].push(entity.clone());
        }
        groups
    }
}

/// Result of [`detect`]: the partition and its standard weighted modularity
/// (γ = 1, range [-1, 1]) — a quality signal, not a correctness gate.
#[derive(Debug, Clone, Serialize)]
pub struct Detection {
    pub partition: Partition,
    pub modularity: f64,
}

// ── Internal adjacency ────────────────────────────────────────────────────

/// Flat adjacency view the optimizer works on. Neighbor lists exclude self
/// loops; aggregated levels keep internal weight in `self_loops`. Degrees
/// count a self loop twice, `total_weight` counts every edge once.
#[derive(Debug, Clone)]
pub(crate) struct Adjacency {
    pub neighbors: Vec<Vec<(usize, f64)>>,
    pub self_loops: Vec<f64>,
    pub degrees: Vec<f64>,
    pub total_weight: f64,
}

impl Adjacency {
    pub(crate) fn from_graph(graph: &InteractionGraph) -> Self {
        let n = graph.entity_count();
        let mut neighbors: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];
        let mut total_weight = 0.0;
        for (u, v, w) in graph.indexed_edges() {
            neighbors[u].push((v, w));
            neighbors[v].push((u, w));
            total_weight += w;
        }
        for list in &mut neighbors {
            list.sort_unstable_by(|a, b| a.0.cmp(&b.0));
        }
        let degrees = neighbors
            .iter()
            .map(|list| list.iter().map(|(_, w)| w).sum())
            .collect();
        Self {
            neighbors,
            self_loops: vec![0.0; n],
            degrees,
            total_weight,
        }
    }

    pub(crate) fn node_count(&self) -> usize {
        self.neighbors.len()
    }
}

/// Resolution-scaled weighted modularity of `membership` on `adj`.
pub(crate) fn modularity(adj: &Adjacency, membership: &[usize], gamma: f64) -> f64 {
    let m = adj.total_weight;
    if m <= 0.0 {
        return 0.0;
    }
    let count = membership.iter().copied().max().map_or(0, |c| c + 1);
    let mut internal = vec![0.0; count];
    let mut degree_sum = vec![0.0; count];
    for u in 0..adj.node_count() {
        let cu = membership[u];
        degree_sum[cu] += adj.degrees[u];
        internal[cu] += adj.self_loops[u];
        for &(v, w) in &adj.neighbors[u] {
            if v > u && membership[v] == cu {
                internal[cu] += w;
            }
        }
    }
    let m2 = 2.0 * m;
    (0..count)
        .map(|c| internal[c] / m - gamma * (degree_sum[c] / m2).powi(2))
        .sum()
}

// ── Entry point ───────────────────────────────────────────────────────────

/// Partition `graph` into communities.
///
/// Rejects a non-finite or non-positive resolution. A zero-edge graph
/// yields one singleton community per vertex with modularity 0.0 — a valid
/// degenerate outcome, not an error.
pub fn detect(graph: &InteractionGraph, opts: &DetectOptions) -> Result<Detection, CoreError> {
    if !(opts.resolution.is_finite() && opts.resolution > 0.0) {
        return Err(CoreError::InvalidResolution(opts.resolution));
    }

    let entities: Vec<EntityId> = graph.entities().cloned().collect();
    let n = entities.len();

    if graph.edge_count() == 0 {
        let singletons: Vec<usize> = (0..n).collect();
        return Ok(Detection {
            partition: Partition::new(entities, &singletons),
            modularity: 0.0,
        });
    }

    debug!(
        nodes = n,
        edges = graph.edge_count(),
        algorithm = %opts.algorithm,
        resolution = opts.resolution,
        seed = opts.seed,
        "detecting communities"
    );

    let adj = Adjacency::from_graph(graph);
    let mut rng = ChaCha8Rng::seed_from_u64(opts.seed);
    let mut membership = louvain::cluster(&adj, opts.resolution, &mut rng);
    if opts.algorithm == Algorithm::Leiden {
        membership = leiden::refine(&adj, membership, opts.resolution, &mut rng);
    }

    let score = modularity(&adj, &membership, 1.0);
    let partition = Partition::new(entities, &membership);
    debug!(
        communities = partition.community_count(),
        modularity = score,
        "partition complete"
    );
    Ok(Detection {
        partition,
        modularity: score,
    })
}

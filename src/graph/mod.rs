//! Interaction-graph construction.
//!
//! [`GraphBuilder`] turns an entity list plus the store's interaction records
//! into an immutable [`InteractionGraph`]: one vertex per requested entity
//! (isolated vertices included), one undirected edge per qualifying record.
//! Built graphs are shared as `Arc`s through an injected [`GraphCache`] keyed
//! by a fingerprint of the build parameters, so overlapping requests reuse
//! the same graph instead of re-reading the store.

pub mod cache;

use std::sync::Arc;

use petgraph::graph::{NodeIndex, UnGraph};
use petgraph::visit::EdgeRef;
use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;

use crate::annotation::{dedup_ordered, AnnotationStore, EntityId, InteractionRecord};
use crate::error::CoreError;

pub use cache::{fingerprint, GraphCache, MemoryGraphCache};

/// Edge payload: the original confidence score and its normalized weight.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EdgeInfo {
    pub confidence: u16,
    /// `confidence / 1000.0`.
    pub weight: f64,
}

/// Immutable undirected weighted graph over a fixed vertex set.
///
/// The vertex set is exactly the requested entity set, in request order; a
/// zero-edge graph is valid. Never mutated after construction — cached and
/// shared behind an `Arc`.
#[derive(Debug)]
pub struct InteractionGraph {
    graph: UnGraph<EntityId, EdgeInfo>,
    index: FxHashMap<EntityId, NodeIndex>,
    fingerprint: String,
    min_confidence: u16,
}

impl InteractionGraph {
    pub fn entity_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Cache key this graph was built under.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    /// Confidence threshold the edges were filtered with.
    pub fn min_confidence(&self) -> u16 {
        self.min_confidence
    }

    /// Entities in vertex order (the deduplicated request order).
    pub fn entities(&self) -> impl Iterator<Item = &EntityId> {
        self.graph.node_weights()
    }

    pub fn contains(&self, entity: &EntityId) -> bool {
        self.index.contains_key(entity)
    }

    /// Edge payload between two entities, if they interact.
    pub fn edge(&self, a: &EntityId, b: &EntityId) -> Option<&EdgeInfo> {
        let (a, b) = (self.index.get(a)?, self.index.get(b)?);
        let edge = self.graph.find_edge(*a, *b)?;
        self.graph.edge_weight(edge)
    }

    pub fn has_edge(&self, a: &EntityId, b: &EntityId) -> bool {
        self.edge(a, b).is_some()
    }

    pub fn degree(&self, entity: &EntityId) -> usize {
        match self.index.get(entity) {
            Some(idx) => self.graph.neighbors(*idx).count(),
            None => 0,
        }
    }

    /// Edges as vertex positions (0-based, in vertex order) plus weight.
    /// Positions are stable because vertices are added in request order.
    pub(crate) fn indexed_edges(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        self.graph
            .edge_references()
            .map(|e| (e.source().index(), e.target().index(), e.weight().weight))
    }

    /// Node/edge structure for the consuming layer (serialized as-is).
    pub fn export(&self) -> GraphExport {
        let nodes = self
            .graph
            .node_indices()
            .map(|idx| NodeExport {
                id: self.graph[idx].clone(),
                degree: self.graph.neighbors(idx).count(),
            })
            .collect();
        let edges = self
            .graph
            .edge_references()
            .map(|e| EdgeExport {
                source: self.graph[e.source()].clone(),
                target: self.graph[e.target()].clone(),
                confidence: e.weight().confidence,
                weight: e.weight().weight,
            })
            .collect();
        GraphExport { nodes, edges }
    }
}

/// JSON-ready graph shape consumed by the visualization layer.
#[derive(Debug, Clone, Serialize)]
pub struct GraphExport {
    pub nodes: Vec<NodeExport>,
    pub edges: Vec<EdgeExport>,
}

#[derive(Debug, Clone, Serialize)]
pub struct NodeExport {
    pub id: EntityId,
    pub degree: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EdgeExport {
    pub source: EntityId,
    pub target: EntityId,
    pub confidence: u16,
    pub weight: f64,
}

/// Assemble a graph from pre-fetched records. Records are dropped silently
/// when an endpoint is outside the entity set, the confidence is below the
/// threshold, or source equals target; the last record for a pair wins.
pub(crate) fn assemble(
    entities: Vec<EntityId>,
    records: &[InteractionRecord],
    min_confidence: u16,
    fingerprint: String,
) -> InteractionGraph {
    let mut graph = UnGraph::with_capacity(entities.len(), records.len());
    let mut index = FxHashMap::default();
    index.reserve(entities.len());
    for entity in &entities {
        let idx = graph.add_node(entity.clone());
        index.insert(entity.clone(), idx);
    }

    for record in records {
        if record.confidence < min_confidence {
            continue;
        }
        let (a, b) = match (index.get(&record.source), index.get(&record.target)) {
            (Some(&a), Some(&b)) => (a, b),
            _ => continue,
        };
        if a == b {
            continue;
        }
        // Normalized orientation so duplicate pairs land on the same edge.
        let (a, b) = if a.index() <= b.index() { (a, b) } else { (b, a) };
        graph.update_edge(
            a,
            b,
            EdgeInfo {
                confidence: record.confidence,
                weight: f64::from(record.confidence) / 1000.0,
            },
        );
    }

    InteractionGraph {
        graph,
        index,
        fingerprint,
        min_confidence,
    }
}

/// Builds and caches interaction graphs on top of an annotation store.
pub struct GraphBuilder {
    store: Arc<dyn AnnotationStore>,
    cache: Arc<dyn GraphCache>,
    max_entities: usize,
}

impl GraphBuilder {
    pub fn new(
        store: Arc<dyn AnnotationStore>,
        cache: Arc<dyn GraphCache>,
        max_entities: usize,
    ) -> Self {
        Self {
            store,
            cache,
            max_entities,
        }
    }

    /// Build the graph for `entity_ids` (deduplicated, order kept) with edges
    /// at `confidence >= min_confidence`.
    ///
    /// Fails fast on an empty set or one above the entity cap; no interaction
    /// data yields a valid zero-edge graph. A cache hit returns the resident
    /// graph without touching the store.
    pub fn build(
        &self,
        entity_ids: &[EntityId],
        min_confidence: u16,
    ) -> Result<Arc<InteractionGraph>, CoreError> {
        let entities = dedup_ordered(entity_ids);
        if entities.is_empty() {
            return Err(CoreError::EmptyEntitySet);
        }
        if entities.len() > self.max_entities {
            return Err(CoreError::TooManyEntities {
                requested: entities.len(),
                limit: self.max_entities,
            });
        }

        let key = cache::fingerprint(&entities, min_confidence, &self.store.source_version());
        if let Some(graph) = self.cache.get(&key) {
            debug!(fingerprint = %&key[..12], "graph cache hit");
            return Ok(graph);
        }

        let records = self.store.interactions(&entities)?;
        debug!(
            entities = entities.len(),
            records = records.len(),
            min_confidence,
            "assembling interaction graph"
        );
        let graph = Arc::new(assemble(entities, &records, min_confidence, key.clone()));
        self.cache.put(&key, Arc::clone(&graph));
        Ok(graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::MemoryAnnotations;
    use std::time::Duration;

    fn ids(names: &[&str]) -> Vec<EntityId> {
        names.iter().map(|s| (*s).into()).collect()
    }

    fn assemble_with(records: &[InteractionRecord], min_confidence: u16) -> InteractionGraph {
        assemble(ids(&["A", "B", "C", "D"]), records, min_confidence, "fp".into())
    }

    #[test]
    fn vertex_set_matches_input_even_without_records() {
        let g = assemble_with(&[], 400);
        assert_eq!(g.entity_count(), 4);
        assert_eq!(g.edge_count(), 0);
        let entities: Vec<&str> = g.entities().map(EntityId::as_str).collect();
        assert_eq!(entities, vec!["A", "B", "C", "D"]);
    }

    #[test]
    fn confidence_and_membership_filtering() {
        let records = vec![
            InteractionRecord::new("A", "B", 900),
            InteractionRecord::new("B", "C", 900),
            InteractionRecord::new("C", "D", 100),  // below threshold
            InteractionRecord::new("A", "X", 950),  // X not requested
        ];
        let g = assemble_with(&records, 400);
        assert_eq!(g.edge_count(), 2);
        assert!(g.has_edge(&"A".into(), &"B".into()));
        assert!(g.has_edge(&"B".into(), &"C".into()));
        assert!(!g.has_edge(&"C".into(), &"D".into()));
        assert_eq!(g.degree(&"D".into()), 0);
    }

    #[test]
    fn self_loops_dropped() {
        let records = vec![InteractionRecord::new("A", "A", 999)];
        let g = assemble_with(&records, 0);
        assert_eq!(g.edge_count(), 0);
    }

    #[test]
    fn duplicate_pair_last_record_wins() {
        let records = vec![
            InteractionRecord::new("A", "B", 500),
            InteractionRecord::new("B", "A", 700), // same pair, reversed
        ];
        let g = assemble_with(&records, 400);
        assert_eq!(g.edge_count(), 1);
        let edge = g.edge(&"A".into(), &"B".into()).unwrap();
        assert_eq!(edge.confidence, 700);
        assert!((edge.weight - 0.7).abs() < 1e-12);
    }

    #[test]
    fn export_carries_nodes_and_edges() {
        let records = vec![InteractionRecord::new("A", "B", 800)];
        let g = assemble_with(&records, 400);
        let export = g.export();
        assert_eq!(export.nodes.len(), 4);
        assert_eq!(export.edges.len(), 1);
        assert_eq!(export.edges[0].confidence, 800);
        let json = serde_json::to_value(&export).unwrap();
        assert!(json["nodes"].is_array());
    }

    fn builder(max_entities: usize) -> GraphBuilder {
        let mut store = MemoryAnnotations::new("v1");
        store.add_interaction("A", "B", 900);
        store.add_interaction("B", "C", 900);
        store.add_interaction("C", "D", 100);
        let cache = MemoryGraphCache::new(Duration::from_secs(60), 4);
        GraphBuilder::new(Arc::new(store), Arc::new(cache), max_entities)
    }

    #[test]
    fn empty_entity_set_rejected() {
        let b = builder(10);
        assert!(matches!(b.build(&[], 400), Err(CoreError::EmptyEntitySet)));
    }

    #[test]
    fn entity_cap_rejected_with_counts() {
        let b = builder(3);
        let err = b.build(&ids(&["A", "B", "C", "D"]), 400).unwrap_err();
        match err {
            CoreError::TooManyEntities { requested, limit } => {
                assert_eq!(requested, 4);
                assert_eq!(limit, 3);
            }
            other => panic!("expected TooManyEntities, got {other}"),
        }
    }

    #[test]
    fn duplicate_ids_collapse_to_one_vertex() {
        let b = builder(10);
        let g = b.build(&ids(&["A", "B", "A", "B"]), 400).unwrap();
        assert_eq!(g.entity_count(), 2);
    }

    #[test]
    fn second_build_returns_cached_graph() {
        let b = builder(10);
        let first = b.build(&ids(&["A", "B", "C", "D"]), 400).unwrap();
        let second = b.build(&ids(&["A", "B", "C", "D"]), 400).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn different_threshold_is_a_different_graph() {
        let b = builder(10);
        let loose = b.build(&ids(&["A", "B", "C", "D"]), 50).unwrap();
        let strict = b.build(&ids(&["A", "B", "C", "D"]), 400).unwrap();
        assert!(!Arc::ptr_eq(&loose, &strict));
        assert_eq!(loose.edge_count(), 3);
        assert_eq!(strict.edge_count(), 2);
    }
}

//! Interaction-network analysis core: graph assembly, community detection,
//! and term enrichment for entity panels.
//!
//! The pipeline has three stages, composable but independent:
//!
//! 1. [`graph::GraphBuilder`] turns an entity set plus scored interactions
//!    from an [`annotation::AnnotationStore`] into an undirected
//!    [`graph::InteractionGraph`], memoized by content fingerprint.
//! 2. [`cluster::detect`] partitions a graph into communities (Leiden by
//!    default, Louvain as the alternative) with seeded, reproducible
//!    tie-breaking.
//! 3. [`enrich::EnrichmentEngine`] tests candidate sets for term
//!    over-representation — locally with the exact hypergeometric test and
//!    Benjamini–Hochberg correction, or against a remote service that
//!    degrades to a sentinel instead of failing.
//!
//! The binary in `src/main.rs` wires the stages into a batch CLI; library
//! consumers can drive any stage directly.

pub mod annotation;
pub mod cluster;
pub mod config;
pub mod enrich;
pub mod error;
pub mod graph;
pub mod logger;

pub use annotation::{AnnotationStore, EntityId, InteractionRecord, MemoryAnnotations, TermId};
pub use cluster::{detect, Algorithm, DetectOptions, Detection, Partition};
pub use config::Config;
pub use enrich::{EnrichmentEngine, EnrichmentResult, RemoteEnricher, RemoteEnrichment};
pub use error::CoreError;
pub use graph::{GraphBuilder, GraphCache, InteractionGraph, MemoryGraphCache};

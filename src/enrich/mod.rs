//! Term-enrichment testing.
//!
//! Two independent paths behind one engine: [`EnrichmentEngine::enrich_exact`]
//! runs the one-sided hypergeometric test with Benjamini–Hochberg correction
//! locally against the annotation store; [`EnrichmentEngine::enrich_remote`]
//! delegates to an external gene-set service with rate limiting and a hard
//! timeout, degrading to [`RemoteEnrichment::Unavailable`] instead of
//! failing. Both produce the same [`EnrichmentResult`] row shape. Neither
//! path knows anything about graphs or partitions — any entity subset is a
//! valid candidate set.

mod exact;
mod remote;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::annotation::{AnnotationStore, EntityId, TermId};
use crate::error::CoreError;

pub use remote::{RemoteEnricher, RemoteEnrichment};

/// One tested term that passed the reporting filter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichmentResult {
    pub term_id: TermId,
    /// Resolved lazily, absent when the source knows no label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub term_name: Option<String>,
    /// Raw one-sided p-value (for the remote path, the service's corrected
    /// value — it reports nothing rawer).
    pub p_value: f64,
    /// Benjamini–Hochberg corrected value the output is filtered and
    /// sorted on.
    pub fdr: f64,
    pub overlap_count: u64,
    pub candidate_set_size: u64,
    pub background_count: u64,
    pub universe_size: u64,
    /// Candidate-set members carrying the term, in candidate order.
    pub matched_entities: Vec<EntityId>,
}

/// Shared output ordering: fdr ascending, ties by overlap descending, then
/// term id for full determinism.
pub(crate) fn sort_results(results: &mut [EnrichmentResult]) {
    results.sort_by(|x, y| {
        x.fdr
            .total_cmp(&y.fdr)
            .then_with(|| y.overlap_count.cmp(&x.overlap_count))
            .then_with(|| x.term_id.cmp(&y.term_id))
    });
}

/// Enrichment front door. Owns the store handle for the exact path and,
/// optionally, a [`RemoteEnricher`] for the remote one.
pub struct EnrichmentEngine {
    store: Arc<dyn AnnotationStore>,
    remote: Option<Arc<RemoteEnricher>>,
}

impl EnrichmentEngine {
    pub fn new(store: Arc<dyn AnnotationStore>) -> Self {
        Self {
            store,
            remote: None,
        }
    }

    pub fn with_remote(mut self, remote: Arc<RemoteEnricher>) -> Self {
        self.remote = Some(remote);
        self
    }

    /// Exact one-sided over-representation test of `candidate` against
    /// `universe`, corrected over every tested term, filtered to
    /// `fdr < fdr_threshold`.
    ///
    /// CPU-bound and synchronous; callers on an async runtime should wrap
    /// it in `spawn_blocking`. Zero qualifying terms yields an empty list.
    pub fn enrich_exact(
        &self,
        candidate: &[EntityId],
        universe: &[EntityId],
        fdr_threshold: f64,
    ) -> Result<Vec<EnrichmentResult>, CoreError> {
        exact::run(self.store.as_ref(), candidate, universe, fdr_threshold)
    }

    /// Remote gene-set enrichment with per-call `timeout`. Never errors:
    /// every failure mode comes back as [`RemoteEnrichment::Unavailable`].
    pub async fn enrich_remote(
        &self,
        symbols: &[String],
        collection: &str,
        timeout: Duration,
    ) -> RemoteEnrichment {
        match &self.remote {
            Some(remote) => remote.enrich(symbols, collection, timeout).await,
            None => RemoteEnrichment::Unavailable {
                reason: "remote enrichment not configured".into(),
            },
        }
    }
}

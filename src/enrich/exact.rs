//! Local over-representation testing.
//!
//! For every term carried by at least one candidate entity, builds the 2x2
//! contingency table against the universe and computes the one-sided
//! ("greater") hypergeometric tail. Terms present only in the background are
//! never tested and never counted toward the correction. The
//! Benjamini–Hochberg pass runs over all tested terms in term-id order, so
//! identical inputs always correct over the identical family.

use rustc_hash::{FxHashMap, FxHashSet};
use statrs::distribution::{DiscreteCDF, Hypergeometric};
use tracing::debug;

use crate::annotation::{dedup_ordered, AnnotationStore, EntityId, TermId};
use crate::error::CoreError;

use super::{sort_results, EnrichmentResult};

pub(crate) fn run(
    store: &dyn AnnotationStore,
    candidate: &[EntityId],
    universe: &[EntityId],
    fdr_threshold: f64,
) -> Result<Vec<EnrichmentResult>, CoreError> {
    if !(fdr_threshold > 0.0 && fdr_threshold <= 1.0) {
        return Err(CoreError::InvalidFdrThreshold(fdr_threshold));
    }
    let candidate = dedup_ordered(candidate);
    let universe = dedup_ordered(universe);
    if candidate.is_empty() || universe.is_empty() {
        return Err(CoreError::EmptyEntitySet);
    }
    let universe_set: FxHashSet<&EntityId> = universe.iter().collect();
    if let Some(stray) = candidate.iter().find(|e| !universe_set.contains(*e)) {
        return Err(CoreError::CandidateOutsideUniverse(stray.clone()));
    }

    let memberships = store.term_memberships(&universe)?;

    // Background carrier counts over the whole universe.
    let mut background: FxHashMap<&TermId, u64> = FxHashMap::default();
    for entity in &universe {
        if let Some(terms) = memberships.get(entity) {
            for term in terms {
                *background.entry(term).or_insert(0) += 1;
            }
        }
    }

    // Candidate-side overlaps, members kept in candidate order.
    let mut overlap: FxHashMap<&TermId, Vec<&EntityId>> = FxHashMap::default();
    for entity in &candidate {
        if let Some(terms) = memberships.get(entity) {
            for term in terms {
                overlap.entry(term).or_default().push(entity);
            }
        }
    }

    // The tested family: exactly the candidate-carried terms, in a stable
    // order so the correction is reproducible.
    let mut tested: Vec<&TermId> = overlap.keys().copied().collect();
    tested.sort();

    let universe_size = universe.len() as u64;
    let candidate_size = candidate.len() as u64;
    let mut p_values = Vec::with_capacity(tested.len());
    for term in &tested {
        let drawn = overlap[*term].len() as u64;
        let carriers = background[*term];
        let dist = Hypergeometric::new(universe_size, carriers, candidate_size).map_err(|e| {
            CoreError::Statistics(format!(
                "hypergeometric({universe_size}, {carriers}, {candidate_size}): {e}"
            ))
        })?;
        // P[X >= drawn] via the survival function; drawn >= 1 for every
        // tested term.
        p_values.push(dist.sf(drawn - 1));
    }
    let fdrs = benjamini_hochberg(&p_values);

    let mut results = Vec::new();
    for (i, term) in tested.iter().enumerate() {
        if fdrs[i] >= fdr_threshold {
            continue;
        }
        let members = &overlap[*term];
        results.push(EnrichmentResult {
            term_id: (*term).clone(),
            term_name: store.term_name(term)?,
            p_value: p_values[i],
            fdr: fdrs[i],
            overlap_count: members.len() as u64,
            candidate_set_size: candidate_size,
            background_count: background[*term],
            universe_size,
            matched_entities: members.iter().map(|e| (*e).clone()).collect(),
        });
    }
    sort_results(&mut results);
    debug!(
        candidate = candidate.len(),
        universe = universe.len(),
        tested = tested.len(),
        reported = results.len(),
        "exact enrichment complete"
    );
    Ok(results)
}

/// Benjamini–Hochberg step-up correction. Returns adjusted values in the
/// input's order: `min(p * n / rank, 1)` with the running minimum taken from
/// the largest rank down, which keeps the output monotone in p.
pub(crate) fn benjamini_hochberg(p_values: &[f64]) -> Vec<f64> {
    let n = p_values.len();
    if n == 0 {
        return Vec::new();
    }
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| p_values[a].total_cmp(&p_values[b]));
    let mut adjusted = vec![0.0; n];
    let mut running = 1.0f64;
    for rank in (1..=n).rev() {
        let idx = order[rank - 1];
        let value = (p_values[idx] * n as f64 / rank as f64).min(1.0);
        running = running.min(value);
        adjusted[idx] = running;
    }
    adjusted
}

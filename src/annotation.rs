//! Annotation-store boundary — typed entity/interaction/term inputs.
//!
//! Everything the core consumes arrives through [`AnnotationStore`]: pairwise
//! interaction records for graph construction and term memberships for exact
//! enrichment. The store is read-only from the core's point of view; whatever
//! loosely-typed rows back it must be converted into [`InteractionRecord`]s
//! before they get here — the core never parses semi-structured data itself.
//!
//! [`MemoryAnnotations`] is the bundled implementation: built up in code by
//! tests and loaded from tab-separated files by the CLI.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ── Identifiers ───────────────────────────────────────────────────────────

/// Opaque entity identifier (a gene id or symbol). The core never looks
/// inside it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(String);

impl EntityId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque annotation-term identifier (e.g. a phenotype or ontology accession).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TermId(String);

impl TermId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TermId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<String> for TermId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl fmt::Display for TermId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One pairwise interaction with a pre-normalized confidence score (0–1000).
///
/// Records below the caller's confidence threshold are excluded at graph
/// build time. Duplicate pairs are legal; the last record wins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionRecord {
    pub source: EntityId,
    pub target: EntityId,
    pub confidence: u16,
}

impl InteractionRecord {
    pub fn new(source: impl Into<EntityId>, target: impl Into<EntityId>, confidence: u16) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            confidence,
        }
    }
}

/// Collapse duplicates keeping first occurrence, preserving input order.
pub(crate) fn dedup_ordered(ids: &[EntityId]) -> Vec<EntityId> {
    let mut seen = std::collections::HashSet::with_capacity(ids.len());
    let mut out = Vec::with_capacity(ids.len());
    for id in ids {
        if seen.insert(id) {
            out.push(id.clone());
        }
    }
    out
}

// ── Store interface ───────────────────────────────────────────────────────

/// Read-only annotation lookup the core is built against.
///
/// Implementations are `Send + Sync` and may block; the callers that need an
/// async surface wrap these calls in `spawn_blocking`.
pub trait AnnotationStore: Send + Sync {
    /// Interaction records whose endpoints are both in `entities`.
    fn interactions(&self, entities: &[EntityId]) -> Result<Vec<InteractionRecord>, CoreError>;

    /// Term memberships for each of `entities`. Entities carrying no terms
    /// may be absent from the returned map.
    fn term_memberships(
        &self,
        entities: &[EntityId],
    ) -> Result<HashMap<EntityId, BTreeSet<TermId>>, CoreError>;

    /// Human-readable name for a term, if one is known. Resolved lazily —
    /// only for terms that actually get reported.
    fn term_name(&self, term: &TermId) -> Result<Option<String>, CoreError>;

    /// Version tag of the underlying interaction source. Part of the graph
    /// cache fingerprint, so bumping it invalidates cached graphs.
    fn source_version(&self) -> String;
}

// ── In-memory implementation ──────────────────────────────────────────────

/// In-memory [`AnnotationStore`] backed by plain maps.
///
/// Populated either programmatically (`add_interaction` / `annotate`) or from
/// tab-separated files. Immutable once shared; no interior locking needed.
pub struct MemoryAnnotations {
    interactions: Vec<InteractionRecord>,
    terms: HashMap<EntityId, BTreeSet<TermId>>,
    term_names: HashMap<TermId, String>,
    version: String,
}

impl MemoryAnnotations {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            interactions: Vec::new(),
            terms: HashMap::new(),
            term_names: HashMap::new(),
            version: version.into(),
        }
    }

    pub fn add_interaction(
        &mut self,
        source: impl Into<EntityId>,
        target: impl Into<EntityId>,
        confidence: u16,
    ) {
        self.interactions
            .push(InteractionRecord::new(source, target, confidence));
    }

    pub fn annotate(&mut self, entity: impl Into<EntityId>, term: impl Into<TermId>) {
        self.terms
            .entry(entity.into())
            .or_default()
            .insert(term.into());
    }

    pub fn name_term(&mut self, term: impl Into<TermId>, name: impl Into<String>) {
        self.term_names.insert(term.into(), name.into());
    }

    /// Load interaction records from a `source<TAB>target<TAB>confidence`
    /// file. Blank lines and `#` comments are skipped.
    pub fn load_interactions(&mut self, path: &Path) -> Result<usize, CoreError> {
        let text = std::fs::read_to_string(path)?;
        let mut loaded = 0;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let (source, target, confidence) = match (fields.next(), fields.next(), fields.next()) {
                (Some(s), Some(t), Some(c)) => (s, t, c),
                _ => {
                    return Err(CoreError::Annotation(format!(
                        "{}:{}: expected source<TAB>target<TAB>confidence",
                        path.display(),
                        lineno + 1
                    )))
                }
            };
            let confidence: u16 = confidence.trim().parse().map_err(|_| {
                CoreError::Annotation(format!(
                    "{}:{}: confidence '{}' is not an integer",
                    path.display(),
                    lineno + 1,
                    confidence
                ))
            })?;
            self.add_interaction(source, target, confidence);
            loaded += 1;
        }
        Ok(loaded)
    }

    /// Load term annotations from an `entity<TAB>term[<TAB>name]` file.
    pub fn load_terms(&mut self, path: &Path) -> Result<usize, CoreError> {
        let text = std::fs::read_to_string(path)?;
        let mut loaded = 0;
        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut fields = line.split('\t');
            let (entity, term) = match (fields.next(), fields.next()) {
                (Some(e), Some(t)) => (e, t),
                _ => {
                    return Err(CoreError::Annotation(format!(
                        "{}:{}: expected entity<TAB>term",
                        path.display(),
                        lineno + 1
                    )))
                }
            };
            self.annotate(entity, term);
            if let Some(name) = fields.next() {
                if !name.is_empty() {
                    self.name_term(term, name);
                }
            }
            loaded += 1;
        }
        Ok(loaded)
    }
}

impl AnnotationStore for MemoryAnnotations {
    fn interactions(&self, entities: &[EntityId]) -> Result<Vec<InteractionRecord>, CoreError> {
        let wanted: std::collections::HashSet<&EntityId> = entities.iter().collect();
        Ok(self
            .interactions
            .iter()
            .filter(|r| wanted.contains(&r.source) && wanted.contains(&r.target))
            .cloned()
            .collect())
    }

    fn term_memberships(
        &self,
        entities: &[EntityId],
    ) -> Result<HashMap<EntityId, BTreeSet<TermId>>, CoreError> {
        let mut out = HashMap::new();
        for entity in entities {
            if let Some(terms) = self.terms.get(entity) {
                out.insert(entity.clone(), terms.clone());
            }
        }
        Ok(out)
    }

    fn term_name(&self, term: &TermId) -> Result<Option<String>, CoreError> {
        Ok(self.term_names.get(term).cloned())
    }

    fn source_version(&self) -> String {
        self.version.clone()
    }
}

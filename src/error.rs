//! Crate-wide error types.
//!
//! Caller mistakes get their own variants so the calling layer can map each
//! kind to a distinct user-facing message. Sparse data (an edgeless graph, an
//! empty enrichment table) is never an error, and transient remote failures
//! are reported through [`crate::enrich::RemoteEnrichment::Unavailable`]
//! instead of this enum.

use thiserror::Error;

use crate::annotation::EntityId;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("entity set is empty")]
    EmptyEntitySet,

    #[error("entity set has {requested} entries, limit is {limit}")]
    TooManyEntities { requested: usize, limit: usize },

    #[error("resolution must be a positive, finite number, got {0}")]
    InvalidResolution(f64),

    #[error("fdr threshold must be in (0, 1], got {0}")]
    InvalidFdrThreshold(f64),

    #[error("unknown clustering algorithm '{0}', expected 'leiden' or 'louvain'")]
    UnknownAlgorithm(String),

    #[error("candidate entity '{0}' is not part of the universe")]
    CandidateOutsideUniverse(EntityId),

    #[error("annotation store error: {0}")]
    Annotation(String),

    #[error("statistics error: {0}")]
    Statistics(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("logger error: {0}")]
    Logger(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

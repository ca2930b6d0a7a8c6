//! Configuration loading with env-var overrides.
//!
//! Reads a TOML file (explicit path, or `netenrich.toml` in the working
//! directory when present), fills in per-field defaults, then applies
//! `NETENRICH_LOG_LEVEL` and `NETENRICH_REMOTE_URL` env overrides. A missing
//! default-path file is not an error — every field has a usable default.

use std::{env, fs, path::Path, time::Duration};

use serde::Deserialize;

use crate::cluster::Algorithm;
use crate::error::CoreError;

/// Graph construction limits and cache sizing.
#[derive(Debug, Clone)]
pub struct GraphConfig {
    /// Hard cap on the number of entities per build request.
    pub max_entities: usize,
    /// Default confidence threshold (0–1000) when the caller gives none.
    pub min_confidence: u16,
    pub cache: CacheConfig,
}

/// Bounds for the in-memory graph cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// How long a cached graph stays valid.
    pub ttl: Duration,
    /// Maximum resident graphs before LRU eviction.
    pub max_graphs: usize,
}

/// Community-detection defaults.
#[derive(Debug, Clone)]
pub struct ClusterConfig {
    pub algorithm: Algorithm,
    pub resolution: f64,
    /// RNG seed for reproducible partitions.
    pub seed: u64,
}

/// Enrichment defaults for both the exact and the remote path.
#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    /// Exact-path significance cutoff on corrected values.
    pub fdr_threshold: f64,
    pub remote: RemoteConfig,
}

/// Remote gene-set enrichment endpoint configuration.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// Full profile-endpoint URL.
    pub api_base_url: String,
    /// Organism tag sent with every query.
    pub organism: String,
    /// Default per-call HTTP timeout.
    pub timeout: Duration,
    /// Minimum spacing between consecutive remote calls.
    pub min_interval: Duration,
}

/// Fully-resolved configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub graph: GraphConfig,
    pub cluster: ClusterConfig,
    pub enrichment: EnrichmentConfig,
}

impl Config {
    /// Detection options seeded from the `[cluster]` section.
    pub fn detect_options(&self) -> crate::cluster::DetectOptions {
        crate::cluster::DetectOptions {
            algorithm: self.cluster.algorithm,
            resolution: self.cluster.resolution,
            seed: self.cluster.seed,
        }
    }
}

/// Raw TOML shape — `serde` target before resolution.
#[derive(Deserialize, Default)]
struct RawConfig {
    #[serde(default)]
    log_level: Option<String>,
    #[serde(default)]
    graph: RawGraph,
    #[serde(default)]
    cluster: RawCluster,
    #[serde(default)]
    enrichment: RawEnrichment,
}

#[derive(Deserialize)]
struct RawGraph {
    #[serde(default = "default_max_entities")]
    max_entities: usize,
    #[serde(default = "default_min_confidence")]
    min_confidence: u16,
    #[serde(default)]
    cache: RawCache,
}

impl Default for RawGraph {
    fn default() -> Self {
        Self {
            max_entities: default_max_entities(),
            min_confidence: default_min_confidence(),
            cache: RawCache::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawCache {
    #[serde(default = "default_cache_ttl_seconds")]
    ttl_seconds: u64,
    #[serde(default = "default_cache_max_graphs")]
    max_graphs: usize,
}

impl Default for RawCache {
    fn default() -> Self {
        Self {
            ttl_seconds: default_cache_ttl_seconds(),
            max_graphs: default_cache_max_graphs(),
        }
    }
}

#[derive(Deserialize)]
struct RawCluster {
    #[serde(default = "default_algorithm")]
    algorithm: String,
    #[serde(default = "default_resolution")]
    resolution: f64,
    #[serde(default)]
    seed: u64,
}

impl Default for RawCluster {
    fn default() -> Self {
        Self {
            algorithm: default_algorithm(),
            resolution: default_resolution(),
            seed: 0,
        }
    }
}

#[derive(Deserialize)]
struct RawEnrichment {
    #[serde(default = "default_fdr_threshold")]
    fdr_threshold: f64,
    #[serde(default)]
    remote: RawRemote,
}

impl Default for RawEnrichment {
    fn default() -> Self {
        Self {
            fdr_threshold: default_fdr_threshold(),
            remote: RawRemote::default(),
        }
    }
}

#[derive(Deserialize)]
struct RawRemote {
    #[serde(default = "default_remote_url")]
    api_base_url: String,
    #[serde(default = "default_organism")]
    organism: String,
    #[serde(default = "default_remote_timeout_seconds")]
    timeout_seconds: u64,
    #[serde(default = "default_remote_min_interval_ms")]
    min_interval_ms: u64,
}

impl Default for RawRemote {
    fn default() -> Self {
        Self {
            api_base_url: default_remote_url(),
            organism: default_organism(),
            timeout_seconds: default_remote_timeout_seconds(),
            min_interval_ms: default_remote_min_interval_ms(),
        }
    }
}

fn default_max_entities() -> usize { 2000 }
fn default_min_confidence() -> u16 { 400 }
fn default_cache_ttl_seconds() -> u64 { 3600 }
fn default_cache_max_graphs() -> usize { 32 }
fn default_algorithm() -> String { "leiden".to_string() }
fn default_resolution() -> f64 { 1.0 }
fn default_fdr_threshold() -> f64 { 0.05 }
fn default_remote_url() -> String { "https://biit.cs.ut.ee/gprofiler/api/gost/profile/".to_string() }
fn default_organism() -> String { "hsapiens".to_string() }
fn default_remote_timeout_seconds() -> u64 { 30 }
fn default_remote_min_interval_ms() -> u64 { 2000 }

const DEFAULT_PATH: &str = "netenrich.toml";

/// Load config from `path` (or `netenrich.toml` if `None`), then apply
/// env-var overrides.
pub fn load(path: Option<&Path>) -> Result<Config, CoreError> {
    let log_level_override = env::var("NETENRICH_LOG_LEVEL").ok();
    let remote_url_override = env::var("NETENRICH_REMOTE_URL").ok();
    load_from(
        path,
        log_level_override.as_deref(),
        remote_url_override.as_deref(),
    )
}

/// Internal loader — accepts an explicit path and optional overrides.
/// Tests pass overrides directly instead of mutating env vars.
pub fn load_from(
    path: Option<&Path>,
    log_level_override: Option<&str>,
    remote_url_override: Option<&str>,
) -> Result<Config, CoreError> {
    let parsed: RawConfig = match path {
        Some(p) => {
            let raw = fs::read_to_string(p)
                .map_err(|e| CoreError::Config(format!("cannot read {}: {e}", p.display())))?;
            toml::from_str(&raw)
                .map_err(|e| CoreError::Config(format!("parse error in {}: {e}", p.display())))?
        }
        None => {
            let default = Path::new(DEFAULT_PATH);
            if default.exists() {
                let raw = fs::read_to_string(default).map_err(|e| {
                    CoreError::Config(format!("cannot read {}: {e}", default.display()))
                })?;
                toml::from_str(&raw).map_err(|e| {
                    CoreError::Config(format!("parse error in {}: {e}", default.display()))
                })?
            } else {
                RawConfig::default()
            }
        }
    };

    let algorithm: Algorithm = parsed
        .cluster
        .algorithm
        .parse()
        .map_err(|e: CoreError| CoreError::Config(format!("cluster.algorithm: {e}")))?;

    let config = Config {
        log_level: log_level_override
            .map(str::to_owned)
            .or(parsed.log_level)
            .unwrap_or_else(|| "info".to_string()),
        graph: GraphConfig {
            max_entities: parsed.graph.max_entities,
            min_confidence: parsed.graph.min_confidence,
            cache: CacheConfig {
                ttl: Duration::from_secs(parsed.graph.cache.ttl_seconds),
                max_graphs: parsed.graph.cache.max_graphs,
            },
        },
        cluster: ClusterConfig {
            algorithm,
            resolution: parsed.cluster.resolution,
            seed: parsed.cluster.seed,
        },
        enrichment: EnrichmentConfig {
            fdr_threshold: parsed.enrichment.fdr_threshold,
            remote: RemoteConfig {
                api_base_url: remote_url_override
                    .map(str::to_owned)
                    .unwrap_or(parsed.enrichment.remote.api_base_url),
                organism: parsed.enrichment.remote.organism,
                timeout: Duration::from_secs(parsed.enrichment.remote.timeout_seconds),
                min_interval: Duration::from_millis(parsed.enrichment.remote.min_interval_ms),
            },
        },
    };

    validate(&config)?;
    Ok(config)
}

/// Reject configurations the core would refuse at call time anyway, naming
/// the offending field.
fn validate(config: &Config) -> Result<(), CoreError> {
    crate::logger::parse_level(&config.log_level)
        .map_err(|e| CoreError::Config(format!("log_level: {e}")))?;
    if config.graph.max_entities == 0 {
        return Err(CoreError::Config("graph.max_entities must be >= 1".into()));
    }
    if config.graph.min_confidence > 1000 {
        return Err(CoreError::Config(
            "graph.min_confidence must be <= 1000".into(),
        ));
    }
    if config.graph.cache.max_graphs == 0 {
        return Err(CoreError::Config(
            "graph.cache.max_graphs must be >= 1".into(),
        ));
    }
    if config.graph.cache.ttl.is_zero() {
        return Err(CoreError::Config(
            "graph.cache.ttl_seconds must be >= 1".into(),
        ));
    }
    if !(config.cluster.resolution.is_finite() && config.cluster.resolution > 0.0) {
        return Err(CoreError::Config(
            "cluster.resolution must be a positive, finite number".into(),
        ));
    }
    if !(config.enrichment.fdr_threshold > 0.0 && config.enrichment.fdr_threshold <= 1.0) {
        return Err(CoreError::Config(
            "enrichment.fdr_threshold must be in (0, 1]".into(),
        ));
    }
    if config.enrichment.remote.timeout.is_zero() {
        return Err(CoreError::Config(
            "enrichment.remote.timeout_seconds must be >= 1".into(),
        ));
    }
    Ok(())
}

// ── test helpers ──────────────────────────────────────────────────────────────

/// Safe `Config` for unit tests — local-only remote URL, short timeouts.
#[cfg(test)]
impl Config {
    pub fn test_default() -> Self {
        Self {
            log_level: "info".into(),
            graph: GraphConfig {
                max_entities: 2000,
                min_confidence: 400,
                cache: CacheConfig {
                    ttl: Duration::from_secs(3600),
                    max_graphs: 8,
                },
            },
            cluster: ClusterConfig {
                algorithm: Algorithm::Leiden,
                resolution: 1.0,
                seed: 0,
            },
            enrichment: EnrichmentConfig {
                fdr_threshold: 0.05,
                remote: RemoteConfig {
                    api_base_url: "http://127.0.0.1:0/profile".into(),
                    organism: "hsapiens".into(),
                    timeout: Duration::from_secs(1),
                    min_interval: Duration::from_millis(0),
                },
            },
        }
    }
}

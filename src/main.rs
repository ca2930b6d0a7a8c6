//! `netenrich` — batch network-enrichment pipeline.
//!
//! Builds the interaction graph for an entity panel, partitions it into
//! communities, runs exact term enrichment per community, and prints one
//! JSON report to stdout. Logs go to stderr.
//!
//! # Usage
//!
//! ```text
//! netenrich [OPTIONS] <entities.txt> <interactions.tsv> [annotations.tsv]
//!
//! Inputs:
//!   entities.txt      one entity id per line; `#` starts a comment
//!   interactions.tsv  source <TAB> target <TAB> confidence (0..=1000)
//!   annotations.tsv   entity <TAB> term [<TAB> term name]
//!
//! Options:
//!   --config <path>          config file (default: ./netenrich.toml if present)
//!   --min-confidence <int>   edge confidence threshold, 0..=1000
//!   --algorithm <name>       leiden | louvain
//!   --resolution <float>     community granularity, > 0
//!   --seed <int>             tie-breaking seed
//!   --fdr <float>            enrichment reporting threshold, (0, 1]
//!   --collection <source>    also query the remote service (e.g. GO:BP)
//!   --help, -h               print this help
//! ```

use std::path::{Path, PathBuf};
use std::process;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use netenrich::annotation::{AnnotationStore, EntityId, MemoryAnnotations};
use netenrich::cluster;
use netenrich::config;
use netenrich::enrich::{EnrichmentEngine, EnrichmentResult, RemoteEnricher, RemoteEnrichment};
use netenrich::error::CoreError;
use netenrich::graph::{GraphBuilder, GraphExport, MemoryGraphCache};
use netenrich::logger;

// ── CLI arg parsing ────────────────────────────────────────────────────────

struct Args {
    config: Option<PathBuf>,
    min_confidence: Option<String>,
    algorithm: Option<String>,
    resolution: Option<String>,
    seed: Option<String>,
    fdr: Option<String>,
    collection: Option<String>,
    entities: Option<PathBuf>,
    interactions: Option<PathBuf>,
    annotations: Option<PathBuf>,
}

fn parse_args() -> Args {
    let mut args = Args {
        config: None,
        min_confidence: None,
        algorithm: None,
        resolution: None,
        seed: None,
        fdr: None,
        collection: None,
        entities: None,
        interactions: None,
        annotations: None,
    };
    let mut iter = std::env::args().skip(1).peekable();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => args.config = iter.next().map(PathBuf::from),
            "--min-confidence" => args.min_confidence = iter.next(),
            "--algorithm" => args.algorithm = iter.next(),
            "--resolution" => args.resolution = iter.next(),
            "--seed" => args.seed = iter.next(),
            "--fdr" => args.fdr = iter.next(),
            "--collection" => args.collection = iter.next(),
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            s if s.starts_with('-') => {
                eprintln!("error: unknown flag: {s}");
                eprintln!("  run 'netenrich --help' for usage");
                process::exit(1);
            }
            _ if args.entities.is_none() => args.entities = Some(PathBuf::from(arg)),
            _ if args.interactions.is_none() => args.interactions = Some(PathBuf::from(arg)),
            _ if args.annotations.is_none() => args.annotations = Some(PathBuf::from(arg)),
            _ => {
                eprintln!("error: unexpected argument: {arg}");
                process::exit(1);
            }
        }
    }

    args
}

fn print_help() {
    eprintln!("usage: netenrich [OPTIONS] <entities.txt> <interactions.tsv> [annotations.tsv]");
    eprintln!();
    eprintln!("inputs:");
    eprintln!("  entities.txt      one entity id per line; '#' starts a comment");
    eprintln!("  interactions.tsv  source <TAB> target <TAB> confidence (0..=1000)");
    eprintln!("  annotations.tsv   entity <TAB> term [<TAB> term name]");
    eprintln!();
    eprintln!("options:");
    eprintln!("  --config <path>          config file (default: ./netenrich.toml if present)");
    eprintln!("  --min-confidence <int>   edge confidence threshold, 0..=1000");
    eprintln!("  --algorithm <name>       leiden | louvain");
    eprintln!("  --resolution <float>     community granularity, > 0");
    eprintln!("  --seed <int>             tie-breaking seed");
    eprintln!("  --fdr <float>            enrichment reporting threshold, (0, 1]");
    eprintln!("  --collection <source>    also query the remote service (e.g. GO:BP)");
    eprintln!("  --help, -h               print this help");
}

fn parse_flag<T: FromStr>(name: &str, value: &str) -> Result<T, CoreError>
where
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| CoreError::Config(format!("invalid {name} '{value}': {e}")))
}

// ── Report shape ───────────────────────────────────────────────────────────

#[derive(Serialize)]
struct Report {
    fingerprint: String,
    algorithm: String,
    resolution: f64,
    min_confidence: u16,
    modularity: f64,
    graph: GraphExport,
    communities: Vec<CommunityReport>,
}

#[derive(Serialize)]
struct CommunityReport {
    id: u32,
    size: usize,
    members: Vec<EntityId>,
    enrichment: Vec<EnrichmentResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    remote: Option<RemoteEnrichment>,
}

// ── Entry point ────────────────────────────────────────────────────────────

fn main() {
    let args = parse_args();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<(), CoreError> {
    // Load .env if present — ignore errors (file is optional).
    let _ = dotenvy::dotenv();

    let mut config = config::load(args.config.as_deref())?;
    if let Some(raw) = &args.min_confidence {
        let value: u16 = parse_flag("--min-confidence", raw)?;
        if value > 1000 {
            return Err(CoreError::Config(format!(
                "--min-confidence must be 0..=1000, got {value}"
            )));
        }
        config.graph.min_confidence = value;
    }
    if let Some(raw) = &args.algorithm {
        config.cluster.algorithm = raw.parse()?;
    }
    if let Some(raw) = &args.resolution {
        config.cluster.resolution = parse_flag("--resolution", raw)?;
    }
    if let Some(raw) = &args.seed {
        config.cluster.seed = parse_flag("--seed", raw)?;
    }
    if let Some(raw) = &args.fdr {
        config.enrichment.fdr_threshold = parse_flag("--fdr", raw)?;
    }

    logger::init(&config.log_level)?;

    let entities_path = args
        .entities
        .ok_or_else(|| CoreError::Config("missing <entities.txt> argument".into()))?;
    let interactions_path = args
        .interactions
        .ok_or_else(|| CoreError::Config("missing <interactions.tsv> argument".into()))?;

    let panel = read_entities(&entities_path)?;
    let mut annotations = MemoryAnnotations::new(interactions_path.display().to_string());
    let records = annotations.load_interactions(&interactions_path)?;
    let terms = match &args.annotations {
        Some(path) => annotations.load_terms(path)?,
        None => 0,
    };
    info!(
        entities = panel.len(),
        interactions = records,
        annotations = terms,
        "inputs loaded"
    );

    let store: Arc<dyn AnnotationStore> = Arc::new(annotations);
    let cache = Arc::new(MemoryGraphCache::new(
        config.graph.cache.ttl,
        config.graph.cache.max_graphs,
    ));
    let builder = GraphBuilder::new(Arc::clone(&store), cache, config.graph.max_entities);
    let mut engine = EnrichmentEngine::new(Arc::clone(&store));
    if args.collection.is_some() {
        engine = engine.with_remote(Arc::new(RemoteEnricher::new(&config.enrichment.remote)?));
    }

    let graph = builder.build(&panel, config.graph.min_confidence)?;
    info!(
        entities = graph.entity_count(),
        edges = graph.edge_count(),
        "graph ready"
    );

    let detection = cluster::detect(&graph, &config.detect_options())?;
    info!(
        communities = detection.partition.community_count(),
        modularity = detection.modularity,
        "partition ready"
    );

    let universe: Vec<EntityId> = graph.entities().cloned().collect();
    let mut communities = Vec::new();
    for (id, members) in detection.partition.communities().into_iter().enumerate() {
        let enrichment = engine.enrich_exact(&members, &universe, config.enrichment.fdr_threshold)?;
        communities.push(CommunityReport {
            id: id as u32,
            size: members.len(),
            members,
            enrichment,
            remote: None,
        });
    }

    if let Some(collection) = &args.collection {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        rt.block_on(async {
            for community in &mut communities {
                let symbols: Vec<String> = community
                    .members
                    .iter()
                    .map(|e| e.as_str().to_string())
                    .collect();
                let outcome = engine
                    .enrich_remote(&symbols, collection, config.enrichment.remote.timeout)
                    .await;
                community.remote = Some(outcome);
            }
        });
    }

    let report = Report {
        fingerprint: graph.fingerprint().to_string(),
        algorithm: config.cluster.algorithm.to_string(),
        resolution: config.cluster.resolution,
        min_confidence: config.graph.min_confidence,
        modularity: detection.modularity,
        graph: graph.export(),
        communities,
    };
    let json = serde_json::to_string_pretty(&report)
        .map_err(|e| CoreError::Io(std::io::Error::other(e)))?;
    println!("{json}");

    Ok(())
}

/// Read the entity panel: one id per line, blanks and `#` comments skipped.
fn read_entities(path: &Path) -> Result<Vec<EntityId>, CoreError> {
    let text = std::fs::read_to_string(path)?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(EntityId::from)
        .collect())
}
